/// Owned RGBA8 pixel buffer. Used both for frames coming off the capture
/// device and for the intermediate surface the filter is applied to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Wraps raw RGBA bytes. Returns `None` when the length does not match
    /// the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Copies `source` over the whole of `self`, nearest-neighbour scaling
    /// when the dimensions differ.
    pub fn copy_scaled_from(&mut self, source: &Frame) {
        if source.width == self.width && source.height == self.height {
            self.pixels.copy_from_slice(&source.pixels);
            return;
        }
        if source.width == 0 || source.height == 0 {
            self.clear();
            return;
        }
        let dst_w = self.width as usize;
        let src_w = source.width as usize;
        for y in 0..self.height as usize {
            let sy = y * source.height as usize / self.height as usize;
            for x in 0..dst_w {
                let sx = x * src_w / dst_w;
                let src = (sy * src_w + sx) * 4;
                let dst = (y * dst_w + x) * 4;
                self.pixels[dst..dst + 4].copy_from_slice(&source.pixels[src..src + 4]);
            }
        }
    }
}
