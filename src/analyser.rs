use std::sync::{Arc, Mutex, TryLockError};

use crate::render::RenderError;

pub const DEFAULT_FFT_SIZE: usize = 2048;

pub type SharedAnalyser = Arc<Mutex<Analyser>>;

/// Non-destructive tap on a voice's output. Keeps the most recent
/// `fft_size` samples; the waveform exposed for drawing is the newest half of
/// that window, every value in `[-1, 1]`.
pub struct Analyser {
    buffer: Vec<f32>,
    cursor: usize,
}

impl Analyser {
    pub fn new(fft_size: usize) -> Self {
        Self {
            buffer: vec![0.0; fft_size.max(2)],
            cursor: 0,
        }
    }

    pub fn shared(fft_size: usize) -> SharedAnalyser {
        Arc::new(Mutex::new(Self::new(fft_size)))
    }

    pub fn waveform_len(&self) -> usize {
        self.buffer.len() / 2
    }

    /// Passes `value` through, recording it on the way.
    pub fn push(&mut self, value: f32) -> f32 {
        if let Some(slot) = self.buffer.get_mut(self.cursor) {
            *slot = value.clamp(-1.0, 1.0);
        }
        self.cursor = (self.cursor + 1) % self.buffer.len();
        value
    }

    /// Oldest-to-newest copy of the last `waveform_len()` samples.
    pub fn time_domain_data(&self) -> Vec<f32> {
        let len = self.buffer.len();
        let count = self.waveform_len();
        let start = (self.cursor + len - count) % len;
        (0..count).map(|i| self.buffer[(start + i) % len]).collect()
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.cursor = 0;
    }
}

/// Reads the waveform without waiting on the audio thread.
pub fn try_waveform(analyser: &SharedAnalyser) -> Result<Vec<f32>, RenderError> {
    match analyser.try_lock() {
        Ok(guard) => Ok(guard.time_domain_data()),
        Err(TryLockError::WouldBlock) => Err(RenderError::AnalyserBusy),
        Err(TryLockError::Poisoned(_)) => Err(RenderError::AnalyserPoisoned),
    }
}
