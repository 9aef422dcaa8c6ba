use crate::{
    capture::{FrameSource, RecordingSink},
    config::{CANVAS_HEIGHT, CANVAS_WIDTH},
    filter::{FilterMode, FilterState},
    output::OutputGraph,
    recorder::{RecorderController, RecorderError},
    render::{self, Canvas, TickReport},
    store::LoopStore,
    surface::Frame,
};

/// The user-facing commands. Each is a one-shot trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    SelectFilter(FilterMode),
    StartRecording,
    StopRecording,
    PlayAll,
    RemoveLast,
    ClearAll,
}

/// Owns every piece of mutable state: filter, recorder, loops and the
/// capture handles once they exist. Commands and render ticks both go
/// through here, one at a time.
pub struct LoopStation {
    filter: FilterState,
    recorder: RecorderController,
    store: LoopStore,
    frames: Option<Box<dyn FrameSource>>,
    sink: Option<Box<dyn RecordingSink>>,
    scratch: Frame,
}

impl LoopStation {
    pub fn new(graph: OutputGraph, fft_size: usize) -> Self {
        Self {
            filter: FilterState::new(),
            recorder: RecorderController::new(fft_size),
            store: LoopStore::new(graph),
            frames: None,
            sink: None,
            scratch: Frame::new(CANVAS_WIDTH, CANVAS_HEIGHT),
        }
    }

    pub fn attach_capture(&mut self, frames: Box<dyn FrameSource>, sink: Box<dyn RecordingSink>) {
        self.frames = Some(frames);
        self.sink = Some(sink);
    }

    pub fn dispatch(&mut self, command: Command) -> Result<(), RecorderError> {
        tracing::debug!(?command, "dispatch");
        match command {
            Command::SelectFilter(mode) => self.filter.select(mode),
            Command::StartRecording => self.recorder.start(self.sink.as_deref_mut())?,
            Command::StopRecording => {
                self.recorder
                    .stop(self.sink.as_deref_mut(), &mut self.store);
            }
            Command::PlayAll => self.store.play_all(),
            Command::RemoveLast => {
                self.store.remove_last();
            }
            Command::ClearAll => self.store.clear(),
        }
        Ok(())
    }

    /// Collects audio recorded since the previous call.
    pub fn pump(&mut self) {
        self.recorder.pump(self.sink.as_deref_mut());
    }

    pub fn render<C>(&mut self, canvas: &mut C) -> TickReport
    where
        C: Canvas + ?Sized,
    {
        render::render_tick(
            canvas,
            &mut self.scratch,
            self.frames.as_deref(),
            self.filter.mode(),
            &self.store,
        )
    }

    pub fn filter(&self) -> FilterMode {
        self.filter.mode()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn store(&self) -> &LoopStore {
        &self.store
    }
}
