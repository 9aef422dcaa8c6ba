use clap::Parser;
use macroquad::prelude::Color;

use crate::{
    analyser::DEFAULT_FFT_SIZE,
    capture::{CaptureRequest, VideoRequest},
};

pub const CANVAS_WIDTH: u32 = 640;
pub const CANVAS_HEIGHT: u32 = 480;
pub const STROKE_WIDTH: f32 = 1.0;

// #000fff
pub const STROKE_COLOR: Color = Color {
    r: 0.0,
    g: 15.0 / 255.0,
    b: 1.0,
    a: 1.0,
};

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Live audio loop recorder with camera filters and waveform overlay", long_about = None)]
pub struct Args {
    /// Index of the camera to capture from.
    #[arg(short, long, default_value_t = 0)]
    pub camera: u32,
    /// Use a generated test pattern instead of a camera.
    #[arg(long)]
    pub pattern: bool,
    /// Analyser window per loop; the drawn waveform is half of it.
    #[arg(long, default_value_t = DEFAULT_FFT_SIZE, value_parser = parse_fft_size)]
    pub fft_size: usize,
    /// Log filter, e.g. `debug` or `loopcam=trace`. Overrides RUST_LOG.
    #[arg(long)]
    pub log: Option<String>,
}

impl Args {
    pub fn capture_request(&self) -> CaptureRequest {
        let video = if self.pattern {
            VideoRequest::Pattern
        } else {
            VideoRequest::Camera(self.camera)
        };
        CaptureRequest { video }
    }
}

fn parse_fft_size(value: &str) -> Result<usize, String> {
    let size: usize = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if !size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&size) {
        return Err(format!(
            "fft size must be a power of two between {MIN_FFT_SIZE} and {MAX_FFT_SIZE}"
        ));
    }
    Ok(size)
}
