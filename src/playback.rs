use std::sync::{Arc, Mutex};

use crate::capture::AudioChunk;

pub type SharedVoice = Arc<Mutex<Voice>>;

/// Immutable mono audio built from the chunks of one recording session.
#[derive(Clone, Debug)]
pub struct AudioAsset {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioAsset {
    pub fn from_chunks(chunks: Vec<AudioChunk>, sample_rate: u32) -> Self {
        let total = chunks.iter().map(|chunk| chunk.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for chunk in chunks {
            samples.extend(chunk.samples);
        }
        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Playback state over one asset: playhead, loop flag and transport.
#[derive(Debug)]
pub struct Voice {
    asset: AudioAsset,
    position: f64,
    playing: bool,
    looping: bool,
}

impl Voice {
    pub fn new(asset: AudioAsset) -> Self {
        Self {
            asset,
            position: 0.0,
            playing: false,
            looping: false,
        }
    }

    pub fn shared(asset: AudioAsset) -> SharedVoice {
        Arc::new(Mutex::new(Self::new(asset)))
    }

    pub fn asset(&self) -> &AudioAsset {
        &self.asset
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn seek_to_start(&mut self) {
        self.position = 0.0;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position_secs(&self) -> f32 {
        (self.position / self.asset.sample_rate as f64) as f32
    }

    /// Produces one output sample at `output_rate`, advancing the playhead.
    /// Yields silence while paused.
    pub fn next_sample(&mut self, output_rate: f32) -> f32 {
        if !self.playing {
            return 0.0;
        }
        let len = self.asset.samples.len();
        if len == 0 {
            if !self.looping {
                self.playing = false;
            }
            return 0.0;
        }
        let index = self.position as usize;
        if index >= len {
            if self.looping {
                self.position = 0.0;
            } else {
                self.playing = false;
                self.position = len as f64;
                return 0.0;
            }
        }
        let sample = self.asset.samples[self.position as usize];
        let step = self.asset.sample_rate as f64 / output_rate.max(1.0) as f64;
        self.position += step;
        if self.position >= len as f64 && self.looping {
            self.position -= len as f64;
        }
        sample
    }
}
