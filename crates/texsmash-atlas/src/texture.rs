//! Host-facing read interface: source textures and the material parameters slot rules query.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use glam::{UVec2, Vec4};
use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::pixel::{ColorSpace, PixelBuffer};

// ---------------------------------------------------------------------------
// SourceTexture
// ---------------------------------------------------------------------------

/// A read-only 8-bit RGBA texture owned by the host.
///
/// Groups only ever borrow these; compositing works on decoded copies.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceTexture {
    image: RgbaImage,
    color_space: ColorSpace,
}

impl SourceTexture {
    pub fn new(image: RgbaImage, color_space: ColorSpace) -> Self {
        Self { image, color_space }
    }

    /// A texture filled with one 8-bit colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], color_space: ColorSpace) -> Self {
        Self::new(
            RgbaImage::from_pixel(width, height, image::Rgba(rgba)),
            color_space,
        )
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Texel dimensions as a vector.
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.image.width(), self.image.height())
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Raw 8-bit texels.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Decodes the full texture to linear space.
    pub fn to_linear(&self) -> PixelBuffer {
        PixelBuffer::from_rgba8(&self.image, self.color_space)
    }

    /// Point-samples the texture to `size` and decodes the result to linear space.
    ///
    /// Resampling before decoding touches only the target texel count.
    pub fn to_linear_resized(&self, size: UVec2) -> PixelBuffer {
        if self.size() == size {
            return self.to_linear();
        }
        if size.x == 0 || size.y == 0 || self.width() == 0 || self.height() == 0 {
            return PixelBuffer::new(size.x, size.y);
        }
        let sampled = imageops::resize(&self.image, size.x, size.y, FilterType::Nearest);
        PixelBuffer::from_rgba8(&sampled, self.color_space)
    }
}

// ---------------------------------------------------------------------------
// MaterialSource
// ---------------------------------------------------------------------------

/// Everything the atlas pipeline needs to read from a host material.
///
/// Materials are identified by [`MaterialSource::name`] within one group; two
/// distinct materials sharing a name are treated as the same material.
pub trait MaterialSource: Sync {
    /// Unique material name.
    fn name(&self) -> &str;

    /// Name of the shader this material is an instance of.
    fn shader(&self) -> &str;

    /// Every texture-bearing slot the shader exposes, whether or not a texture is bound.
    fn texture_slots(&self) -> Vec<&str>;

    /// The texture bound to `slot`, if any.
    fn texture(&self, slot: &str) -> Option<&SourceTexture>;

    /// A scalar parameter.
    fn float(&self, name: &str) -> Option<f32>;

    /// A colour parameter in linear RGBA.
    fn color(&self, name: &str) -> Option<Vec4>;
}

// ---------------------------------------------------------------------------
// Material
// ---------------------------------------------------------------------------

/// In-memory material: a shader name, parameters, and shared texture handles.
#[derive(Clone, Debug, Default)]
pub struct Material {
    pub name: String,
    pub shader: String,
    pub floats: HashMap<String, f32>,
    /// Linear RGBA colours.
    pub colors: HashMap<String, Vec4>,
    /// Slot name → bound texture. `None` keeps an exposed but empty slot.
    pub textures: BTreeMap<String, Option<Arc<SourceTexture>>>,
}

impl Material {
    pub fn new(name: impl Into<String>, shader: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shader: shader.into(),
            ..Default::default()
        }
    }

    pub fn with_float(mut self, name: impl Into<String>, value: f32) -> Self {
        self.floats.insert(name.into(), value);
        self
    }

    pub fn with_color(mut self, name: impl Into<String>, value: Vec4) -> Self {
        self.colors.insert(name.into(), value);
        self
    }

    /// Binds a texture to `slot`, sharing the handle.
    pub fn with_texture(mut self, slot: impl Into<String>, texture: Arc<SourceTexture>) -> Self {
        self.textures.insert(slot.into(), Some(texture));
        self
    }

    /// Exposes `slot` without binding a texture to it.
    pub fn with_empty_slot(mut self, slot: impl Into<String>) -> Self {
        self.textures.insert(slot.into(), None);
        self
    }
}

impl MaterialSource for Material {
    fn name(&self) -> &str {
        &self.name
    }

    fn shader(&self) -> &str {
        &self.shader
    }

    fn texture_slots(&self) -> Vec<&str> {
        self.textures.keys().map(String::as_str).collect()
    }

    fn texture(&self, slot: &str) -> Option<&SourceTexture> {
        self.textures.get(slot).and_then(|t| t.as_deref())
    }

    fn float(&self, name: &str) -> Option<f32> {
        self.floats.get(name).copied()
    }

    fn color(&self, name: &str) -> Option<Vec4> {
        self.colors.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_exposes_empty_slots() {
        let tex = Arc::new(SourceTexture::solid(8, 4, [255, 0, 0, 255], ColorSpace::Srgb));
        let material = Material::new("brick", "Standard")
            .with_texture("_MainTex", tex)
            .with_empty_slot("_BumpMap");

        assert_eq!(material.texture_slots(), vec!["_BumpMap", "_MainTex"]);
        assert!(material.texture("_BumpMap").is_none());
        assert_eq!(material.texture("_MainTex").map(|t| t.size()), Some(UVec2::new(8, 4)));
        assert!(material.texture("_Missing").is_none());
    }

    #[test]
    fn test_shared_texture_handle() {
        let tex = Arc::new(SourceTexture::solid(2, 2, [0, 0, 0, 255], ColorSpace::Linear));
        let a = Material::new("a", "Standard").with_texture("_MainTex", Arc::clone(&tex));
        let b = Material::new("b", "Standard").with_texture("_MainTex", Arc::clone(&tex));
        assert!(std::ptr::eq(
            a.texture("_MainTex").unwrap(),
            b.texture("_MainTex").unwrap()
        ));
    }

    #[test]
    fn test_parameters_lookup() {
        let material = Material::new("m", "Standard")
            .with_float("_Metallic", 0.25)
            .with_color("_Color", Vec4::new(1.0, 0.5, 0.0, 1.0));
        assert_eq!(material.float("_Metallic"), Some(0.25));
        assert_eq!(material.float("_Glossiness"), None);
        assert_eq!(material.color("_Color"), Some(Vec4::new(1.0, 0.5, 0.0, 1.0)));
    }

    #[test]
    fn test_resized_decode_uses_texture_color_space() {
        let srgb = SourceTexture::solid(4, 4, [128, 128, 128, 255], ColorSpace::Srgb);
        let linear = SourceTexture::solid(4, 4, [128, 128, 128, 255], ColorSpace::Linear);

        let a = srgb.to_linear_resized(UVec2::new(2, 2));
        let b = linear.to_linear_resized(UVec2::new(2, 2));
        assert_eq!(a.dimensions(), (2, 2));
        assert!(a.texel(1, 1).x < b.texel(1, 1).x);
    }
}
