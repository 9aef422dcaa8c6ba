use crate::surface::Frame;

const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    Origin,
    Grayscale,
    Negative,
}

impl FilterMode {
    pub const VALUES: [FilterMode; 3] = [
        FilterMode::Origin,
        FilterMode::Grayscale,
        FilterMode::Negative,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FilterMode::Origin => "ORIGIN",
            FilterMode::Grayscale => "GRAYSCALE",
            FilterMode::Negative => "NEGATIVE",
        }
    }

    /// Transforms the frame in place. Origin leaves it untouched.
    pub fn apply(&self, frame: &mut Frame) {
        match self {
            FilterMode::Origin => {}
            FilterMode::Grayscale => grayscale(frame.pixels_mut()),
            FilterMode::Negative => negative(frame.pixels_mut()),
        }
    }
}

/// Holds the one active video filter. Only a single mode can be stored, so
/// selecting one implicitly deactivates the others.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilterState {
    mode: FilterMode,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, mode: FilterMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    #[cfg(test)]
    pub fn is_active(&self, mode: FilterMode) -> bool {
        self.mode == mode
    }
}

pub fn grayscale(rgba: &mut [u8]) {
    for pixel in rgba.chunks_exact_mut(4) {
        let luma = LUMA_R * pixel[0] as f32 + LUMA_G * pixel[1] as f32 + LUMA_B * pixel[2] as f32;
        let value = luma.round().clamp(0.0, 255.0) as u8;
        pixel[0] = value;
        pixel[1] = value;
        pixel[2] = value;
    }
}

pub fn negative(rgba: &mut [u8]) {
    for pixel in rgba.chunks_exact_mut(4) {
        pixel[0] = 255 - pixel[0];
        pixel[1] = 255 - pixel[1];
        pixel[2] = 255 - pixel[2];
    }
}
