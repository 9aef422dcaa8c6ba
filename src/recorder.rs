use std::{mem, time::Instant};

use thiserror::Error;

use crate::{
    capture::{AudioChunk, RecordingSink},
    playback::AudioAsset,
    store::{Loop, LoopId, LoopStore},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error("no capture stream is available to record from")]
    NoCaptureStream,
}

/// Buffer of one recording in progress. Only exists while recording.
#[derive(Debug)]
pub struct Session {
    chunks: Vec<AudioChunk>,
    started: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            chunks: Vec::new(),
            started: Instant::now(),
        }
    }

    #[cfg(test)]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

#[derive(Debug, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording(Session),
}

#[derive(Debug)]
pub struct RecorderController {
    state: RecorderState,
    fft_size: usize,
}

impl RecorderController {
    pub fn new(fft_size: usize) -> Self {
        Self {
            state: RecorderState::Idle,
            fft_size,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording(_))
    }

    #[cfg(test)]
    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    /// Begins a session. Already recording is a no-op; a missing capture
    /// stream is an error and leaves the controller idle.
    pub fn start<S>(&mut self, sink: Option<&mut S>) -> Result<(), RecorderError>
    where
        S: RecordingSink + ?Sized,
    {
        if self.is_recording() {
            tracing::debug!("start ignored: already recording");
            return Ok(());
        }
        let sink = sink.ok_or(RecorderError::NoCaptureStream)?;
        sink.start();
        self.state = RecorderState::Recording(Session::new());
        tracing::info!("recording started");
        Ok(())
    }

    /// Moves chunks emitted so far into the session buffer.
    pub fn pump<S>(&mut self, sink: Option<&mut S>)
    where
        S: RecordingSink + ?Sized,
    {
        if let (RecorderState::Recording(session), Some(sink)) = (&mut self.state, sink) {
            session.chunks.extend(sink.drain());
        }
    }

    /// Finishes the session into a new looping Loop appended to `store`.
    /// Idle is a no-op and returns `None`.
    pub fn stop<S>(&mut self, sink: Option<&mut S>, store: &mut LoopStore) -> Option<LoopId>
    where
        S: RecordingSink + ?Sized,
    {
        let RecorderState::Recording(mut session) = mem::take(&mut self.state) else {
            tracing::debug!("stop ignored: not recording");
            return None;
        };
        let sample_rate = match sink {
            Some(sink) => {
                session.chunks.extend(sink.stop());
                sink.sample_rate()
            }
            None => 0,
        };
        let elapsed = session.started.elapsed();
        let chunk_count = session.chunks.len();
        let asset = AudioAsset::from_chunks(session.chunks, sample_rate);
        let id = store.next_id();
        store.append(Loop::new(id, asset, self.fft_size));
        tracing::info!(%id, chunk_count, ?elapsed, "recording finished");
        Some(id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::output::OutputGraph;

    /// Sink that emits whatever the test queues, only while armed.
    #[derive(Default)]
    pub(crate) struct FakeSink {
        pub armed: bool,
        pub pending: Vec<AudioChunk>,
        pub starts: usize,
    }

    impl FakeSink {
        pub fn emit(&mut self, value: f32) {
            if self.armed {
                self.pending.push(AudioChunk {
                    samples: vec![value; 4],
                });
            }
        }
    }

    impl RecordingSink for FakeSink {
        fn sample_rate(&self) -> u32 {
            8
        }

        fn start(&mut self) {
            self.pending.clear();
            self.armed = true;
            self.starts += 1;
        }

        fn drain(&mut self) -> Vec<AudioChunk> {
            mem::take(&mut self.pending)
        }

        fn stop(&mut self) -> Vec<AudioChunk> {
            self.armed = false;
            mem::take(&mut self.pending)
        }
    }

    fn store() -> LoopStore {
        LoopStore::new(OutputGraph::new())
    }

    #[test]
    fn start_stop_creates_one_looping_loop_at_zero() {
        let mut recorder = RecorderController::new(8);
        let mut sink = FakeSink::default();
        let mut store = store();

        recorder.start(Some(&mut sink)).unwrap();
        sink.emit(0.3);
        let id = recorder.stop(Some(&mut sink), &mut store);

        assert!(id.is_some());
        assert!(!recorder.is_recording());
        assert_eq!(store.len(), 1);
        let created = store.last().unwrap();
        assert_eq!(created.position_secs(), 0.0);
        assert!(created.is_looping());
        assert!(!created.is_playing());
        assert_eq!(created.duration_secs(), 0.5);
    }

    #[test]
    fn loops_created_equal_completed_pairs() {
        let mut recorder = RecorderController::new(8);
        let mut sink = FakeSink::default();
        let mut store = store();

        for pairs in 1..=4 {
            recorder.start(Some(&mut sink)).unwrap();
            recorder.start(Some(&mut sink)).unwrap();
            sink.emit(0.1);
            recorder.pump(Some(&mut sink));
            recorder.stop(Some(&mut sink), &mut store);
            recorder.stop(Some(&mut sink), &mut store);
            assert_eq!(store.len(), pairs);
        }
        assert_eq!(sink.starts, 4);
    }

    #[test]
    fn session_holds_exactly_its_own_chunks() {
        let mut recorder = RecorderController::new(8);
        let mut sink = FakeSink::default();
        let mut store = store();

        recorder.start(Some(&mut sink)).unwrap();
        sink.emit(0.1);
        recorder.pump(Some(&mut sink));
        sink.emit(0.2);
        recorder.stop(Some(&mut sink), &mut store);
        sink.emit(0.9);

        recorder.start(Some(&mut sink)).unwrap();
        sink.emit(0.4);
        recorder.stop(Some(&mut sink), &mut store);

        let durations: Vec<f32> = store.iter().map(Loop::duration_secs).collect();
        assert_eq!(durations, vec![1.0, 0.5]);
    }

    #[test]
    fn pump_fills_the_session_buffer() {
        let mut recorder = RecorderController::new(8);
        let mut sink = FakeSink::default();
        recorder.start(Some(&mut sink)).unwrap();
        sink.emit(0.1);
        sink.emit(0.1);
        recorder.pump(Some(&mut sink));

        match recorder.state() {
            RecorderState::Recording(session) => assert_eq!(session.chunk_count(), 2),
            RecorderState::Idle => panic!("should be recording"),
        }
    }

    #[test]
    fn stop_while_idle_is_a_noop() {
        let mut recorder = RecorderController::new(8);
        let mut sink = FakeSink::default();
        let mut store = store();
        assert_eq!(recorder.stop(Some(&mut sink), &mut store), None);
        assert!(store.is_empty());
    }

    #[test]
    fn start_without_capture_fails_and_stays_idle() {
        let mut recorder = RecorderController::new(8);
        assert_eq!(recorder.start(None::<&mut FakeSink>), Err(RecorderError::NoCaptureStream));
        assert!(!recorder.is_recording());
    }

    #[test]
    fn empty_session_still_yields_a_loop() {
        let mut recorder = RecorderController::new(8);
        let mut sink = FakeSink::default();
        let mut store = store();
        recorder.start(Some(&mut sink)).unwrap();
        recorder.stop(Some(&mut sink), &mut store);
        assert_eq!(store.len(), 1);
        assert_eq!(store.last().unwrap().duration_secs(), 0.0);
    }
}
