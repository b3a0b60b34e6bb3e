//! Framebuffer snapshot types.
//!
//! A [`RawFrame`] is what the transport hands out when asked for the
//! current contents of the remote display, and what a thumbnail stores
//! after down-sampling.

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a framebuffer snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// An uncompressed copy of the remote display.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may exceed `width * bytes_per_pixel` when the producer
/// pads rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes.
    pub stride: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// A tightly packed frame (`stride == width * bpp`) filled with zeros.
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width * format.bytes_per_pixel() as u32;
        Self {
            width,
            height,
            stride,
            format,
            data: vec![0; stride as usize * height as usize],
        }
    }

    /// Total byte size the bitmap occupies.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Returns a row slice (including possible padding bytes).
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let end = start + self.stride as usize;
        &self.data[start..end]
    }

    /// Returns the pixel bytes at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride as usize + x as usize * bpp;
        &self.data[offset..offset + bpp]
    }

    /// Nearest-neighbour copy of this frame scaled to `width × height`.
    ///
    /// The result is tightly packed and keeps the pixel format.
    pub fn resample(&self, width: u32, height: u32) -> RawFrame {
        let bpp = self.format.bytes_per_pixel();
        let mut out = RawFrame::blank(width, height, self.format);
        if self.width == 0 || self.height == 0 || width == 0 || height == 0 {
            return out;
        }

        let out_stride = out.stride as usize;
        for y in 0..height {
            let src_y = (y as u64 * self.height as u64 / height as u64) as u32;
            let src_row = self.row(src_y);
            let dst_row = &mut out.data[y as usize * out_stride..(y as usize + 1) * out_stride];
            for x in 0..width {
                let src_x = (x as u64 * self.width as u64 / width as u64) as usize;
                let src = &src_row[src_x * bpp..src_x * bpp + bpp];
                dst_row[x as usize * bpp..x as usize * bpp + bpp].copy_from_slice(src);
            }
        }
        out
    }
}

// ── Tests ────────────────────────────────────────────────────────
