//! Linear-space RGBA pixel buffers: the working surface every slot rule writes into.
//!
//! Source textures arrive as 8-bit RGBA tagged with a [`ColorSpace`]. They are decoded
//! to linear `f32` once, processed, composited, and only re-encoded when an atlas is
//! exported. Resampling is point sampling only.

use glam::Vec4;
use image::imageops::{self, FilterType};
use image::{Rgba, Rgba32FImage, RgbaImage};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ColorSpace
// ---------------------------------------------------------------------------

/// How the RGB channels of 8-bit texel data are encoded. Alpha is always linear.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Gamma-encoded colour data (albedo, emission).
    #[default]
    Srgb,
    /// Raw data stored as-is (normals, masks, heights).
    Linear,
}

impl ColorSpace {
    /// Decodes one 8-bit channel to a linear value in `[0, 1]`.
    pub fn decode(self, channel: u8) -> f32 {
        let c = f32::from(channel) / 255.0;
        match self {
            ColorSpace::Srgb => srgb_to_linear(c),
            ColorSpace::Linear => c,
        }
    }

    /// Encodes a linear value to an 8-bit channel, clamping out-of-range input.
    pub fn encode(self, value: f32) -> u8 {
        let v = value.clamp(0.0, 1.0);
        let c = match self {
            ColorSpace::Srgb => linear_to_srgb(v),
            ColorSpace::Linear => v,
        };
        (c * 255.0).round() as u8
    }
}

/// sRGB electro-optical transfer function.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Inverse of [`srgb_to_linear`].
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

// ---------------------------------------------------------------------------
// PixelBuffer
// ---------------------------------------------------------------------------

/// A 2D buffer of linear RGBA texels.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    image: Rgba32FImage,
}

impl PixelBuffer {
    /// Creates a buffer cleared to transparent black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: Rgba32FImage::new(width, height),
        }
    }

    /// Creates a buffer filled with a single linear colour.
    pub fn solid(width: u32, height: u32, color: Vec4) -> Self {
        Self {
            image: Rgba32FImage::from_pixel(width, height, Rgba(color.to_array())),
        }
    }

    /// Decodes 8-bit texels into linear space.
    pub fn from_rgba8(image: &RgbaImage, color_space: ColorSpace) -> Self {
        let mut buffer = Self::new(image.width(), image.height());
        for (dst, src) in buffer.image.pixels_mut().zip(image.pixels()) {
            let [r, g, b, a] = src.0;
            dst.0 = [
                color_space.decode(r),
                color_space.decode(g),
                color_space.decode(b),
                f32::from(a) / 255.0,
            ];
        }
        buffer
    }

    /// Encodes the buffer to 8-bit texels in the requested colour space.
    pub fn to_rgba8(&self, color_space: ColorSpace) -> RgbaImage {
        let mut out = RgbaImage::new(self.width(), self.height());
        for (dst, src) in out.pixels_mut().zip(self.image.pixels()) {
            let [r, g, b, a] = src.0;
            dst.0 = [
                color_space.encode(r),
                color_space.encode(g),
                color_space.encode(b),
                ColorSpace::Linear.encode(a),
            ];
        }
        out
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Returns `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Reads one texel.
    ///
    /// # Panics
    ///
    /// Panics if `x >= width` or `y >= height`.
    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        Vec4::from_array(self.image.get_pixel(x, y).0)
    }

    /// Applies `f` to every texel in place.
    pub fn map_texels(&mut self, f: impl Fn(Vec4) -> Vec4) {
        for px in self.image.pixels_mut() {
            px.0 = f(Vec4::from_array(px.0)).to_array();
        }
    }

    /// Returns `true` if every texel equals `color` within `epsilon`.
    pub fn is_uniform(&self, color: Vec4, epsilon: f32) -> bool {
        self.image
            .pixels()
            .all(|px| (Vec4::from_array(px.0) - color).abs().max_element() <= epsilon)
    }

    /// Point-sampled copy at a new resolution.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        if width == 0 || height == 0 || self.width() == 0 || self.height() == 0 {
            return Self::new(width, height);
        }
        Self {
            image: imageops::resize(&self.image, width, height, FilterType::Nearest),
        }
    }

    /// Copies `src` over this buffer with its top-left corner at `(x, y)`.
    ///
    /// Texels are replaced, not blended. Parts of `src` falling outside are clipped.
    pub fn blit(&mut self, src: &PixelBuffer, x: u32, y: u32) {
        imageops::replace(&mut self.image, &src.image, i64::from(x), i64::from(y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_transparent_black() {
        let buffer = PixelBuffer::new(4, 3);
        assert_eq!(buffer.dimensions(), (4, 3));
        assert!(buffer.is_uniform(Vec4::ZERO, 0.0));
    }

    #[test]
    fn test_srgb_roundtrip_preserves_bytes() {
        for value in [0u8, 1, 10, 64, 128, 200, 254, 255] {
            let linear = ColorSpace::Srgb.decode(value);
            assert_eq!(ColorSpace::Srgb.encode(linear), value, "byte {value}");
        }
    }

    #[test]
    fn test_srgb_mid_grey_is_darker_in_linear() {
        let linear = ColorSpace::Srgb.decode(128);
        assert!((linear - 0.2158).abs() < 1e-3, "got {linear}");
        assert!((ColorSpace::Linear.decode(128) - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_alpha_is_never_gamma_encoded() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 128]));
        let buffer = PixelBuffer::from_rgba8(&image, ColorSpace::Srgb);
        assert!((buffer.texel(0, 0).w - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_resized_solid_stays_solid() {
        let color = Vec4::new(0.2, 0.4, 0.6, 1.0);
        let buffer = PixelBuffer::solid(4, 4, color).resized(16, 8);
        assert_eq!(buffer.dimensions(), (16, 8));
        assert!(buffer.is_uniform(color, 1e-6));
    }

    #[test]
    fn test_resized_to_zero_is_empty() {
        let buffer = PixelBuffer::solid(4, 4, Vec4::ONE).resized(0, 4);
        assert_eq!(buffer.dimensions(), (0, 4));
    }

    #[test]
    fn test_blit_replaces_region_only() {
        let mut atlas = PixelBuffer::new(8, 8);
        let cell = PixelBuffer::solid(2, 3, Vec4::new(1.0, 0.0, 0.0, 1.0));
        atlas.blit(&cell, 4, 2);

        assert_eq!(atlas.texel(4, 2), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(atlas.texel(5, 4), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(atlas.texel(3, 2), Vec4::ZERO);
        assert_eq!(atlas.texel(6, 2), Vec4::ZERO);
        assert_eq!(atlas.texel(4, 5), Vec4::ZERO);
    }

    #[test]
    fn test_blit_clips_at_edges() {
        let mut atlas = PixelBuffer::new(4, 4);
        let cell = PixelBuffer::solid(4, 4, Vec4::ONE);
        atlas.blit(&cell, 2, 2);
        assert_eq!(atlas.texel(3, 3), Vec4::ONE);
        assert_eq!(atlas.texel(1, 1), Vec4::ZERO);
    }

    #[test]
    fn test_to_rgba8_encodes_per_color_space() {
        let buffer = PixelBuffer::solid(1, 1, Vec4::new(0.5, 0.5, 0.5, 0.5));
        let srgb = buffer.to_rgba8(ColorSpace::Srgb);
        let linear = buffer.to_rgba8(ColorSpace::Linear);
        assert_eq!(srgb.get_pixel(0, 0).0, [188, 188, 188, 128]);
        assert_eq!(linear.get_pixel(0, 0).0, [128, 128, 128, 128]);
    }
}
