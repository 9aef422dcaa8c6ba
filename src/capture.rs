use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use cpal::{
    SampleFormat, SizedSample, Stream,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use crossbeam_channel::{self as xchan, TryRecvError};
use thiserror::Error;
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{
    config::{CANVAS_HEIGHT, CANVAS_WIDTH},
    surface::Frame,
};

const PATTERN_FRAME_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no default audio input device")]
    NoInputDevice,
    #[error("audio input configuration unavailable: {0}")]
    InputConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build audio input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start audio input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("camera capture requested but this build has no camera support (enable the `camera` feature or pass --pattern)")]
    CameraSupportMissing,
    #[error("camera {index} unavailable: {reason}")]
    Camera { index: u32, reason: String },
    #[error("capture task ended before reporting its state")]
    TaskVanished,
}

/// Block of mono samples emitted by the recording sink.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
}

/// Live visual source sampled once per render tick.
pub trait FrameSource {
    /// Copies the newest frame into `target`, scaling to its size. Returns
    /// false when no frame has arrived yet.
    fn copy_latest(&self, target: &mut Frame) -> bool;
}

/// Start/stop control over the recordable audio of a live stream.
pub trait RecordingSink {
    fn sample_rate(&self) -> u32;
    /// Arms the sink. Anything emitted before arming is discarded.
    fn start(&mut self);
    /// Chunks emitted since the last call.
    fn drain(&mut self) -> Vec<AudioChunk>;
    /// Disarms the sink and returns whatever is still pending.
    fn stop(&mut self) -> Vec<AudioChunk>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoRequest {
    Camera(u32),
    Pattern,
}

#[derive(Clone, Copy, Debug)]
pub struct CaptureRequest {
    pub video: VideoRequest,
}

type FrameSlot = Arc<Mutex<Option<Frame>>>;

/// Whether the input callback may forward blocks. Locked only across
/// arm/disarm, so once `stop` holds it no armed block is still in flight.
type ArmGate = Arc<Mutex<bool>>;

/// Dropping every `Release` lets the worker behind a track exit. Nothing is
/// ever sent on it.
type Release = xchan::Sender<()>;
type ReleaseSignal = xchan::Receiver<()>;

fn released(signal: &ReleaseSignal) -> bool {
    matches!(signal.try_recv(), Err(TryRecvError::Disconnected))
}

pub struct VideoTrack {
    slot: FrameSlot,
    _release: Release,
}

impl FrameSource for VideoTrack {
    fn copy_latest(&self, target: &mut Frame) -> bool {
        let guard = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(frame) => {
                target.copy_scaled_from(frame);
                true
            }
            None => false,
        }
    }
}

pub struct AudioTrack {
    chunks: xchan::Receiver<AudioChunk>,
    gate: ArmGate,
    sample_rate: u32,
    _release: Release,
}

impl AudioTrack {
    fn new(
        chunks: xchan::Receiver<AudioChunk>,
        gate: ArmGate,
        sample_rate: u32,
        release: Release,
    ) -> Self {
        Self {
            chunks,
            gate,
            sample_rate,
            _release: release,
        }
    }

    fn gate(&self) -> MutexGuard<'_, bool> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordingSink for AudioTrack {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) {
        let mut armed = self.gate();
        let stale = self.chunks.try_iter().count();
        if stale > 0 {
            tracing::debug!(stale, "discarded chunks queued before recording");
        }
        *armed = true;
    }

    fn drain(&mut self) -> Vec<AudioChunk> {
        self.chunks.try_iter().collect()
    }

    fn stop(&mut self) -> Vec<AudioChunk> {
        *self.gate() = false;
        self.chunks.try_iter().collect()
    }
}

/// Combined live stream: camera (or pattern) frames plus recordable audio.
pub struct CapturePipeline {
    video: VideoTrack,
    audio: AudioTrack,
}

impl CapturePipeline {
    /// Opens video and audio concurrently. Either failing fails the setup.
    pub async fn open(request: CaptureRequest) -> Result<Self, SetupError> {
        let (video, audio) = tokio::try_join!(open_video(request.video), open_audio())?;
        tracing::info!(
            video = ?request.video,
            sample_rate = audio.sample_rate,
            "capture pipeline ready"
        );
        Ok(Self { video, audio })
    }

    pub fn into_parts(self) -> (VideoTrack, AudioTrack) {
        (self.video, self.audio)
    }
}

async fn open_video(request: VideoRequest) -> Result<VideoTrack, SetupError> {
    let slot: FrameSlot = Arc::new(Mutex::new(None));
    let (release, signal) = xchan::bounded(0);
    match request {
        VideoRequest::Pattern => {
            spawn_pattern(slot.clone(), signal);
        }
        VideoRequest::Camera(index) => {
            let (ready_tx, ready_rx) = oneshot::channel();
            spawn_camera(index, slot.clone(), signal, ready_tx)?;
            ready_rx.await.map_err(|_| SetupError::TaskVanished)??;
        }
    }
    Ok(VideoTrack {
        slot,
        _release: release,
    })
}

fn spawn_pattern(slot: FrameSlot, signal: ReleaseSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PATTERN_FRAME_INTERVAL);
        let mut tick = 0u32;
        while !released(&signal) {
            interval.tick().await;
            let frame = pattern_frame(CANVAS_WIDTH, CANVAS_HEIGHT, tick);
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            tick = tick.wrapping_add(1);
        }
    })
}

/// Scrolling colour bars used when no camera is requested.
pub fn pattern_frame(width: u32, height: u32, tick: u32) -> Frame {
    const BARS: [[u8; 4]; 7] = [
        [235, 235, 235, 255],
        [235, 235, 16, 255],
        [16, 235, 235, 255],
        [16, 235, 16, 255],
        [235, 16, 235, 255],
        [235, 16, 16, 255],
        [16, 16, 235, 255],
    ];
    let mut frame = Frame::new(width, height);
    let bar_width = (width as usize / BARS.len()).max(1);
    let offset = tick as usize * 4;
    let row_len = width as usize * 4;
    for (y, row) in frame.pixels_mut().chunks_exact_mut(row_len).enumerate() {
        for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
            let bar = ((x + offset + y / 8) / bar_width) % BARS.len();
            pixel.copy_from_slice(&BARS[bar]);
        }
    }
    frame
}

#[cfg(feature = "camera")]
fn spawn_camera(
    index: u32,
    slot: FrameSlot,
    signal: ReleaseSignal,
    ready: oneshot::Sender<Result<(), SetupError>>,
) -> Result<(), SetupError> {
    use nokhwa::{
        Camera,
        pixel_format::RgbAFormat,
        utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    };

    tokio::task::spawn_blocking(move || {
        let opened = Camera::new(
            CameraIndex::Index(index),
            RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        )
        .and_then(|mut camera| camera.open_stream().map(|_| camera));
        let mut camera = match opened {
            Ok(mut camera) => {
                if ready.send(Ok(())).is_err() {
                    tracing::debug!("capture setup abandoned, closing camera");
                    let _ = camera.stop_stream();
                    return;
                }
                camera
            }
            Err(err) => {
                let _ = ready.send(Err(SetupError::Camera {
                    index,
                    reason: err.to_string(),
                }));
                return;
            }
        };
        while !released(&signal) {
            let decoded = camera
                .frame()
                .and_then(|buffer| buffer.decode_image::<RgbAFormat>());
            match decoded {
                Ok(image) => {
                    let (width, height) = (image.width(), image.height());
                    if let Some(frame) = Frame::from_rgba(width, height, image.into_raw()) {
                        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
                    }
                }
                Err(err) => tracing::trace!("camera frame dropped: {err}"),
            }
        }
        if let Err(err) = camera.stop_stream() {
            tracing::warn!("camera did not stop cleanly: {err}");
        }
    });
    Ok(())
}

#[cfg(not(feature = "camera"))]
fn spawn_camera(
    _index: u32,
    _slot: FrameSlot,
    _signal: ReleaseSignal,
    _ready: oneshot::Sender<Result<(), SetupError>>,
) -> Result<(), SetupError> {
    Err(SetupError::CameraSupportMissing)
}

/// The cpal stream lives on a blocking task for its whole lifetime; only the
/// chunk receiver and the arm gate leave it.
async fn open_audio() -> Result<AudioTrack, SetupError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (chunk_tx, chunk_rx) = xchan::unbounded();
    let (release, signal) = xchan::bounded(0);
    let gate: ArmGate = Arc::new(Mutex::new(false));
    let thread_gate = gate.clone();

    tokio::task::spawn_blocking(move || match build_input(chunk_tx, thread_gate) {
        Ok((stream, sample_rate)) => hold_until_released(stream, sample_rate, ready_tx, &signal),
        Err(err) => {
            let _ = ready_tx.send(Err(err));
        }
    });

    let sample_rate = ready_rx.await.map_err(|_| SetupError::TaskVanished)??;
    Ok(AudioTrack::new(chunk_rx, gate, sample_rate, release))
}

/// Reports a successful open and keeps `device` alive until the track that
/// owns the release side is dropped. Gives the device up at once when the
/// setup future is gone, e.g. because the other half of the pipeline failed.
fn hold_until_released<D, T>(
    device: D,
    opened: T,
    ready: oneshot::Sender<Result<T, SetupError>>,
    signal: &ReleaseSignal,
) {
    if ready.send(Ok(opened)).is_err() {
        tracing::debug!("capture setup abandoned, releasing device");
        return;
    }
    // Returns with an error once every sender is dropped.
    let _ = signal.recv();
    drop(device);
}

fn build_input(
    sender: xchan::Sender<AudioChunk>,
    gate: ArmGate,
) -> Result<(Stream, u32), SetupError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(SetupError::NoInputDevice)?;
    let supported = device.default_input_config()?;
    let config = supported.config();
    let sample_rate = config.sample_rate.0;
    let stream = match supported.sample_format() {
        SampleFormat::I16 => build_input_stream::<i16>(&device, &config, sender, gate, |s| {
            s as f32 / i16::MAX as f32
        })?,
        SampleFormat::U16 => build_input_stream::<u16>(&device, &config, sender, gate, |s| {
            (s as f32 / u16::MAX as f32) * 2.0 - 1.0
        })?,
        _ => build_input_stream::<f32>(&device, &config, sender, gate, |s| s)?,
    };
    stream.play()?;
    Ok((stream, sample_rate))
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sender: xchan::Sender<AudioChunk>,
    gate: ArmGate,
    convert: fn(T) -> f32,
) -> Result<Stream, SetupError>
where
    T: SizedSample + 'static,
{
    let channels = config.channels as usize;
    let stream = device.build_input_stream(
        config,
        move |input: &[T], _| {
            forward_while_armed(&gate, &sender, || downmix(input, channels, convert));
        },
        |err| tracing::error!("audio input stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

/// Sends one block if the gate is open. The send happens under the gate, so a
/// block seen as armed is queued before any disarm returns. A busy gate means
/// the block straddles an arm/disarm and is dropped.
fn forward_while_armed(
    gate: &Mutex<bool>,
    sender: &xchan::Sender<AudioChunk>,
    samples: impl FnOnce() -> Vec<f32>,
) {
    let Ok(armed) = gate.try_lock() else {
        return;
    };
    if *armed {
        let _ = sender.send(AudioChunk { samples: samples() });
    }
}

fn downmix<T: Copy>(input: &[T], channels: usize, convert: fn(T) -> f32) -> Vec<f32> {
    let channels = channels.max(1);
    input
        .chunks(channels)
        .map(|frame| frame.iter().map(|s| convert(*s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        thread,
    };

    use super::*;

    fn track() -> (xchan::Sender<AudioChunk>, ArmGate, AudioTrack) {
        let (tx, rx) = xchan::unbounded();
        let gate: ArmGate = Arc::new(Mutex::new(false));
        let (release, _signal) = xchan::bounded(0);
        let track = AudioTrack::new(rx, gate.clone(), 8_000, release);
        (tx, gate, track)
    }

    fn chunk(value: f32) -> AudioChunk {
        AudioChunk {
            samples: vec![value],
        }
    }

    struct Device(Arc<AtomicBool>);

    impl Drop for Device {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn start_discards_stale_chunks_and_arms() {
        let (tx, gate, mut track) = track();
        tx.send(chunk(0.9)).unwrap();

        track.start();
        assert!(*gate.lock().unwrap());
        tx.send(chunk(0.1)).unwrap();
        assert_eq!(track.drain(), vec![chunk(0.1)]);
    }

    #[test]
    fn stop_disarms_and_returns_pending_chunks() {
        let (tx, gate, mut track) = track();
        track.start();
        tx.send(chunk(0.2)).unwrap();
        tx.send(chunk(0.3)).unwrap();

        assert_eq!(track.stop(), vec![chunk(0.2), chunk(0.3)]);
        assert!(!*gate.lock().unwrap());
        assert!(track.drain().is_empty());
    }

    #[test]
    fn blocks_are_forwarded_only_between_start_and_stop() {
        let (tx, gate, mut track) = track();
        forward_while_armed(&gate, &tx, || vec![0.9]);

        track.start();
        forward_while_armed(&gate, &tx, || vec![0.4]);
        assert_eq!(track.stop(), vec![chunk(0.4)]);

        forward_while_armed(&gate, &tx, || vec![0.7]);
        track.start();
        assert!(track.drain().is_empty());
    }

    #[test]
    fn block_during_a_transition_is_dropped() {
        let (tx, gate, mut track) = track();
        track.start();
        {
            let _transition = gate.lock().unwrap();
            forward_while_armed(&gate, &tx, || vec![0.6]);
        }
        assert!(track.stop().is_empty());
    }

    #[test]
    fn no_armed_block_lands_after_stop_returns() {
        let (tx, gate, mut track) = track();
        track.start();
        let callback = {
            let gate = gate.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    forward_while_armed(&gate, &tx, || vec![0.5]);
                }
            })
        };
        thread::sleep(Duration::from_millis(1));

        let recorded = track.stop();
        callback.join().unwrap();
        assert!(recorded.iter().all(|c| *c == chunk(0.5)));
        assert!(track.drain().is_empty());
    }

    #[test]
    fn abandoned_setup_releases_the_device_at_once() {
        let dropped = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<u32, SetupError>>();
        let (_release, signal) = xchan::bounded::<()>(0);
        drop(ready_rx);

        let device = Device(dropped.clone());
        let worker = thread::spawn(move || hold_until_released(device, 48_000, ready_tx, &signal));
        worker.join().unwrap();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn device_is_held_until_the_track_side_is_dropped() {
        let dropped = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (release, signal) = xchan::bounded::<()>(0);

        let device = Device(dropped.clone());
        let worker = thread::spawn(move || hold_until_released(device, 44_100u32, ready_tx, &signal));
        assert_eq!(ready_rx.blocking_recv().unwrap().unwrap(), 44_100);
        assert!(!dropped.load(Ordering::SeqCst));

        drop(release);
        worker.join().unwrap();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn pattern_task_ends_once_released() {
        let slot: FrameSlot = Arc::new(Mutex::new(None));
        let (release, signal) = xchan::bounded(0);
        let task = spawn_pattern(slot.clone(), signal);

        tokio::time::sleep(PATTERN_FRAME_INTERVAL * 2).await;
        assert!(slot.lock().unwrap().is_some());

        drop(release);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("pattern task still running")
            .unwrap();
    }

    #[test]
    fn downmix_averages_interleaved_channels() {
        let input = [0.5_f32, -0.5, 1.0, 0.0];
        assert_eq!(downmix(&input, 2, |s: f32| s), vec![0.0, 0.5]);

        let ints = [i16::MAX, i16::MAX];
        assert_eq!(downmix(&ints, 1, |s: i16| s as f32 / i16::MAX as f32), vec![1.0, 1.0]);
    }

    #[test]
    fn video_track_reports_missing_frame_then_copies() {
        let slot: FrameSlot = Arc::new(Mutex::new(None));
        let (release, _signal) = xchan::bounded(0);
        let track = VideoTrack {
            slot: slot.clone(),
            _release: release,
        };
        let mut target = Frame::new(4, 4);
        assert!(!track.copy_latest(&mut target));

        *slot.lock().unwrap() = Some(Frame::filled(2, 2, [9, 8, 7, 255]));
        assert!(track.copy_latest(&mut target));
        assert_eq!(target.pixel(3, 3), Some([9, 8, 7, 255]));
    }

    #[test]
    fn pattern_frames_are_opaque_and_move() {
        let first = pattern_frame(64, 8, 0);
        let later = pattern_frame(64, 8, 3);
        assert_eq!(first.width(), 64);
        assert!(first.pixels().chunks_exact(4).all(|px| px[3] == 255));
        assert_ne!(first, later);
    }

    #[cfg(not(feature = "camera"))]
    #[tokio::test]
    async fn camera_request_without_support_is_a_setup_error() {
        let result = open_video(VideoRequest::Camera(0)).await;
        assert!(matches!(result, Err(SetupError::CameraSupportMissing)));
    }
}
