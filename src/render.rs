use macroquad::{
    prelude::*,
    texture::FilterMode as TextureFilter,
};
use thiserror::Error;

use crate::{
    capture::FrameSource,
    config::{STROKE_COLOR, STROKE_WIDTH},
    filter::FilterMode,
    store::LoopStore,
    surface::Frame,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    #[error("analyser is being written by the audio thread")]
    AnalyserBusy,
    #[error("analyser lock is poisoned")]
    AnalyserPoisoned,
}

/// 2D output surface the render tick draws onto.
pub trait Canvas {
    fn size(&self) -> Vec2;
    fn clear(&mut self);
    /// Draws `frame` stretched over the whole canvas.
    fn composite(&mut self, frame: &Frame);
    fn stroke_polyline(&mut self, points: &[Vec2], thickness: f32, color: Color);
}

/// What one tick managed to draw.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub composited: bool,
    pub loops_drawn: usize,
    pub loops_skipped: usize,
}

/// Draws one complete frame: camera through the filter, the reference line,
/// then one waveform per loop in store order. A loop whose analyser cannot
/// be read is skipped without affecting the others.
pub fn render_tick<C, F>(
    canvas: &mut C,
    scratch: &mut Frame,
    source: Option<&F>,
    filter: FilterMode,
    store: &LoopStore,
) -> TickReport
where
    C: Canvas + ?Sized,
    F: FrameSource + ?Sized,
{
    let mut report = TickReport::default();
    let size = canvas.size();
    canvas.clear();

    if source.is_some_and(|source| source.copy_latest(scratch)) {
        filter.apply(scratch);
        canvas.composite(scratch);
        report.composited = true;
    }

    canvas.stroke_polyline(
        &[vec2(0.0, 0.0), vec2(0.0, size.y)],
        STROKE_WIDTH,
        STROKE_COLOR,
    );

    for entry in store.iter() {
        match entry.waveform() {
            Ok(samples) => {
                let points = waveform_points(&samples, size.x, size.y);
                canvas.stroke_polyline(&points, STROKE_WIDTH, STROKE_COLOR);
                report.loops_drawn += 1;
            }
            Err(RenderError::AnalyserBusy) => {
                tracing::trace!(id = %entry.id(), "analyser busy, waveform skipped");
                report.loops_skipped += 1;
            }
            Err(err) => {
                tracing::warn!(id = %entry.id(), "waveform skipped: {err}");
                report.loops_skipped += 1;
            }
        }
    }
    report
}

/// Maps samples in `[-1, 1]` across the full width; zero sits on the centre
/// line. The trace is closed at the right edge on the centre line.
pub fn waveform_points(samples: &[f32], width: f32, height: f32) -> Vec<Vec2> {
    if samples.is_empty() {
        return Vec::new();
    }
    let slice_width = width / samples.len() as f32;
    let half = height * 0.5;
    let mut points: Vec<Vec2> = samples
        .iter()
        .enumerate()
        .map(|(i, sample)| vec2(i as f32 * slice_width, half * (1.0 + sample)))
        .collect();
    points.push(vec2(width, half));
    points
}

/// Canvas backed by the macroquad window.
pub struct ScreenCanvas {
    size: Vec2,
    texture: Option<Texture2D>,
}

impl ScreenCanvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: vec2(width, height),
            texture: None,
        }
    }

    fn upload(&mut self, frame: &Frame) -> Texture2D {
        match &self.texture {
            Some(texture)
                if texture.width() as u32 == frame.width()
                    && texture.height() as u32 == frame.height() =>
            {
                texture.update_from_bytes(frame.width(), frame.height(), frame.pixels());
                texture.clone()
            }
            _ => {
                let texture = Texture2D::from_rgba8(
                    frame.width() as u16,
                    frame.height() as u16,
                    frame.pixels(),
                );
                texture.set_filter(TextureFilter::Nearest);
                self.texture = Some(texture.clone());
                texture
            }
        }
    }
}

impl Canvas for ScreenCanvas {
    fn size(&self) -> Vec2 {
        self.size
    }

    fn clear(&mut self) {
        clear_background(BLACK);
    }

    fn composite(&mut self, frame: &Frame) {
        let size = self.size;
        let texture = self.upload(frame);
        draw_texture_ex(
            &texture,
            0.0,
            0.0,
            WHITE,
            DrawTextureParams {
                dest_size: Some(size),
                ..Default::default()
            },
        );
    }

    fn stroke_polyline(&mut self, points: &[Vec2], thickness: f32, color: Color) {
        for pair in points.windows(2) {
            draw_line(pair[0].x, pair[0].y, pair[1].x, pair[1].y, thickness, color);
        }
    }
}
