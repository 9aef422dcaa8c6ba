mod analyser;
mod capture;
mod config;
mod controls;
mod filter;
mod output;
mod playback;
mod recorder;
mod render;
mod station;
mod store;
mod surface;

use clap::Parser;
use macroquad::prelude::*;
use tokio::{runtime::Runtime, task::JoinHandle};
use tracing_subscriber::EnvFilter;

use capture::{CapturePipeline, SetupError};
use config::{Args, CANVAS_HEIGHT, CANVAS_WIDTH};
use controls::KeyboardControls;
use output::{AudioOutput, OutputGraph};
use render::ScreenCanvas;
use station::LoopStation;

const HUD_FONT_SIZE: f32 = 20.0;
const HELP_FONT_SIZE: f32 = 14.0;
const HUD_MARGIN: f32 = 12.0;

const RECORD_RED: Color = Color {
    r: 0.92,
    g: 0.12,
    b: 0.12,
    a: 1.0,
};
const HUD_TEXT: Color = Color {
    r: 1.0,
    g: 1.0,
    b: 1.0,
    a: 0.85,
};
const HUD_SHADE: Color = Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 0.45,
};

type PendingCapture = JoinHandle<Result<CapturePipeline, SetupError>>;

#[macroquad::main(window_conf)]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log.as_deref());

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("could not start async runtime: {err}");
            return;
        }
    };

    let graph = OutputGraph::new();
    let _audio = match AudioOutput::start(graph.clone()) {
        Ok(output) => Some(output),
        Err(err) => {
            tracing::warn!("audio output unavailable, loops will be silent: {err:#}");
            None
        }
    };

    let mut station = LoopStation::new(graph, args.fft_size);
    let controls = KeyboardControls::new();
    let mut canvas = ScreenCanvas::new(CANVAS_WIDTH as f32, CANVAS_HEIGHT as f32);
    let mut pending = Some(runtime.spawn(CapturePipeline::open(args.capture_request())));

    loop {
        if let Err(err) = poll_capture(&runtime, &mut pending, &mut station) {
            tracing::error!("capture setup failed: {err:#}");
            return;
        }

        for command in controls.poll() {
            if let Err(err) = station.dispatch(command) {
                tracing::error!(?command, "command failed: {err}");
            }
        }
        station.pump();

        station.render(&mut canvas);
        draw_hud(&station, &controls, pending.is_some());

        next_frame().await;
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: "LoopCam".into(),
        fullscreen: false,
        sample_count: 1,
        window_width: CANVAS_WIDTH as i32,
        window_height: CANVAS_HEIGHT as i32,
        high_dpi: false,
        window_resizable: false,
        ..Default::default()
    }
}

fn init_tracing(filter: Option<&str>) {
    let filter = filter
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Hands the capture pipeline to the station once setup has finished.
/// Rendering carries on without it until then.
fn poll_capture(
    runtime: &Runtime,
    pending: &mut Option<PendingCapture>,
    station: &mut LoopStation,
) -> anyhow::Result<()> {
    if !pending.as_ref().is_some_and(JoinHandle::is_finished) {
        return Ok(());
    }
    let Some(handle) = pending.take() else {
        return Ok(());
    };
    let pipeline = runtime.block_on(handle)??;
    let (video, audio) = pipeline.into_parts();
    station.attach_capture(Box::new(video), Box::new(audio));
    Ok(())
}

fn draw_hud(station: &LoopStation, controls: &KeyboardControls, waiting: bool) {
    let status = if waiting {
        "WAITING FOR CAMERA / MIC".to_string()
    } else {
        let store = station.store();
        let playing = store.iter().filter(|entry| entry.is_playing()).count();
        format!(
            "{}  LOOPS {}  PLAYING {}",
            station.filter().label(),
            store.len(),
            playing
        )
    };
    let width = CANVAS_WIDTH as f32;
    let height = CANVAS_HEIGHT as f32;

    draw_rectangle(0.0, 0.0, width, HUD_FONT_SIZE + HUD_MARGIN, HUD_SHADE);
    draw_text(&status, HUD_MARGIN, HUD_FONT_SIZE, HUD_FONT_SIZE, HUD_TEXT);
    if station.is_recording() {
        draw_circle(width - 60.0, HUD_FONT_SIZE * 0.65, 6.0, RECORD_RED);
        draw_text("REC", width - 48.0, HUD_FONT_SIZE, HUD_FONT_SIZE, RECORD_RED);
    }

    let help = controls.help_line();
    draw_rectangle(
        0.0,
        height - HELP_FONT_SIZE - HUD_MARGIN,
        width,
        HELP_FONT_SIZE + HUD_MARGIN,
        HUD_SHADE,
    );
    draw_text(
        &help,
        HUD_MARGIN,
        height - HUD_MARGIN * 0.5,
        HELP_FONT_SIZE,
        HUD_TEXT,
    );
}
