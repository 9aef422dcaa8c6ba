use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use cpal::{
    SampleFormat, Stream,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};

use crate::{analyser::SharedAnalyser, playback::SharedVoice, store::LoopId};

const DEFAULT_OUTPUT_RATE: f32 = 44_100.0;

struct Route {
    id: LoopId,
    voice: SharedVoice,
    analyser: SharedAnalyser,
}

struct GraphState {
    routes: Vec<Route>,
    sample_rate: f32,
}

/// The processing graph behind the shared output sink. Every route is
/// `voice -> analyser -> sink`; the sink sums all routes.
#[derive(Clone)]
pub struct OutputGraph {
    state: Arc<Mutex<GraphState>>,
}

impl OutputGraph {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GraphState {
                routes: Vec::new(),
                sample_rate: DEFAULT_OUTPUT_RATE,
            })),
        }
    }

    pub fn set_sample_rate(&self, rate: f32) {
        self.lock().sample_rate = rate.max(1.0);
    }

    pub fn connect(&self, id: LoopId, voice: SharedVoice, analyser: SharedAnalyser) {
        self.lock().routes.push(Route {
            id,
            voice,
            analyser,
        });
    }

    /// Detaches the route for `id`. Returns false when nothing was connected.
    pub fn disconnect(&self, id: LoopId) -> bool {
        let mut state = self.lock();
        let before = state.routes.len();
        state.routes.retain(|route| route.id != id);
        state.routes.len() != before
    }

    #[cfg(test)]
    pub fn route_count(&self) -> usize {
        self.lock().routes.len()
    }

    /// Fills one mono block. Each route's sample is passed through its
    /// analyser before being added to the mix.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let state = self.lock();
        let rate = state.sample_rate;
        for route in &state.routes {
            let mut voice = route.voice.lock().unwrap_or_else(PoisonError::into_inner);
            let mut analyser = route
                .analyser
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for slot in out.iter_mut() {
                *slot += analyser.push(voice.next_sample(rate));
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for OutputGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the cpal output stream alive for as long as it is held.
pub struct AudioOutput {
    _stream: Stream,
}

impl AudioOutput {
    pub fn start(graph: OutputGraph) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default audio output"))?;
        let supported = device.default_output_config()?;
        let config = supported.config();
        graph.set_sample_rate(config.sample_rate.0 as f32);
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream_f32(&device, &config, graph)?,
            SampleFormat::I16 => build_stream_i16(&device, &config, graph)?,
            SampleFormat::U16 => build_stream_u16(&device, &config, graph)?,
            _ => build_stream_f32(&device, &config, graph)?,
        };
        stream.play()?;
        tracing::info!(
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio output running"
        );
        Ok(Self { _stream: stream })
    }
}

fn build_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    graph: OutputGraph,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let mut mix = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |output: &mut [f32], _| {
            fill_output_buffer(output, channels, &graph, &mut mix, |sample| sample);
        },
        |err| tracing::error!("audio output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn build_stream_i16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    graph: OutputGraph,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let mut mix = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |output: &mut [i16], _| {
            fill_output_buffer(output, channels, &graph, &mut mix, |sample| {
                (sample * i16::MAX as f32) as i16
            });
        },
        |err| tracing::error!("audio output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn build_stream_u16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    graph: OutputGraph,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let mut mix = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |output: &mut [u16], _| {
            fill_output_buffer(output, channels, &graph, &mut mix, |sample| {
                let scaled = (sample * 0.5 + 0.5).clamp(0.0, 1.0);
                (scaled * u16::MAX as f32) as u16
            });
        },
        |err| tracing::error!("audio output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn fill_output_buffer<T, F>(
    output: &mut [T],
    channels: usize,
    graph: &OutputGraph,
    mix: &mut Vec<f32>,
    mut convert: F,
) where
    F: FnMut(f32) -> T,
    T: Copy,
{
    let frames = output.len() / channels.max(1);
    mix.resize(frames, 0.0);
    graph.render(mix);
    for (frame, sample) in output.chunks_mut(channels.max(1)).zip(mix.iter()) {
        let value = convert(sample.clamp(-0.98, 0.98));
        for channel in frame {
            *channel = value;
        }
    }
}
