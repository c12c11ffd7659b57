//! Shader archetypes: per-slot processing rules that bake material parameters into atlas texels.
//!
//! An archetype is plain data. Each slot name maps to one [`SlotRule`] from a small closed
//! set; slots without a rule are copied (or left blank), and excluded slots are never
//! atlased. All arithmetic happens on linear-space buffers.

use std::collections::{BTreeMap, BTreeSet};

use glam::{UVec2, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pixel::{ColorSpace, PixelBuffer};
use crate::texture::{MaterialSource, SourceTexture};

/// Slot and parameter names of the built-in standard archetype.
pub mod standard {
    pub const MAIN_TEX: &str = "_MainTex";
    pub const METALLIC_GLOSS_MAP: &str = "_MetallicGlossMap";
    pub const BUMP_MAP: &str = "_BumpMap";
    pub const PARALLAX_MAP: &str = "_ParallaxMap";
    pub const OCCLUSION_MAP: &str = "_OcclusionMap";
    pub const EMISSION_MAP: &str = "_EmissionMap";

    pub const DETAIL_MASK: &str = "_DetailMask";
    pub const DETAIL_ALBEDO_MAP: &str = "_DetailAlbedoMap";
    pub const DETAIL_NORMAL_MAP: &str = "_DetailNormalMap";

    pub const COLOR: &str = "_Color";
    pub const METALLIC: &str = "_Metallic";
    pub const GLOSS_MAP_SCALE: &str = "_GlossMapScale";
    pub const BUMP_SCALE: &str = "_BumpScale";
    pub const PARALLAX: &str = "_Parallax";
    pub const OCCLUSION_STRENGTH: &str = "_OcclusionStrength";
    pub const EMISSION_COLOR: &str = "_EmissionColor";

    /// Useful range of the parallax height scale.
    pub const PARALLAX_RANGE: (f32, f32) = (0.005, 0.08);

    /// Colour of an undisturbed tangent-space normal.
    pub const NEUTRAL_NORMAL: [f32; 4] = [0.5, 0.5, 1.0, 1.0];
}

// ---------------------------------------------------------------------------
// ArchetypeError
// ---------------------------------------------------------------------------

/// A slot rule asked for a parameter the material's shader does not have.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ArchetypeError {
    #[error("material '{material}' has no float '{parameter}' (needed by slot '{slot}')")]
    MissingFloat {
        material: String,
        slot: String,
        parameter: String,
    },

    #[error("material '{material}' has no colour '{parameter}' (needed by slot '{slot}')")]
    MissingColor {
        material: String,
        slot: String,
        parameter: String,
    },
}

fn require_float<M: MaterialSource + ?Sized>(
    material: &M,
    slot: &str,
    parameter: &str,
) -> Result<f32, ArchetypeError> {
    material
        .float(parameter)
        .ok_or_else(|| ArchetypeError::MissingFloat {
            material: material.name().to_string(),
            slot: slot.to_string(),
            parameter: parameter.to_string(),
        })
}

fn require_color<M: MaterialSource + ?Sized>(
    material: &M,
    slot: &str,
    parameter: &str,
) -> Result<Vec4, ArchetypeError> {
    material
        .color(parameter)
        .ok_or_else(|| ArchetypeError::MissingColor {
            material: material.name().to_string(),
            slot: slot.to_string(),
            parameter: parameter.to_string(),
        })
}

// ---------------------------------------------------------------------------
// SlotRule
// ---------------------------------------------------------------------------

/// How one slot's atlas contribution is derived from a material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SlotRule {
    /// Multiplies every texel (white when no texture is bound) by a colour parameter.
    ColorTint {
        /// Colour parameter name.
        color: String,
    },

    /// Multiplies every texel by an RGBA intensity built from up to four float parameters.
    /// Unset channels contribute `1.0`.
    ChannelIntensityMix {
        /// Parameter feeding R, G, B and A respectively.
        channels: [Option<String>; 4],
        /// Whether the multiply also runs over the synthesized default buffer, which
        /// is already filled with the intensity colour.
        mix_synthesized: bool,
    },

    /// Without a texture, a solid default colour. With one, every texel is lerped toward
    /// the default by `1 - strength` (`strength` when `invert` is false).
    DefaultOrBlend {
        default: [f32; 4],
        /// Float parameter name.
        strength: String,
        invert: bool,
    },

    /// Without a texture, solid black. With one, RGB is scaled by the strength parameter
    /// normalized into `[0, 1]` over `range`.
    ParallaxScale {
        /// Float parameter name.
        strength: String,
        range: (f32, f32),
    },
}

impl SlotRule {
    /// Runs the rule. `base` is the bound texture already resampled to `target`.
    ///
    /// Parameters are resolved before any texel is touched, so a mismatch leaves no
    /// partial output.
    pub fn apply<M: MaterialSource + ?Sized>(
        &self,
        material: &M,
        slot: &str,
        base: Option<PixelBuffer>,
        target: UVec2,
    ) -> Result<PixelBuffer, ArchetypeError> {
        match self {
            SlotRule::ColorTint { color } => {
                let tint = require_color(material, slot, color)?;
                let mut buffer =
                    base.unwrap_or_else(|| PixelBuffer::solid(target.x, target.y, Vec4::ONE));
                buffer.map_texels(|texel| texel * tint);
                Ok(buffer)
            }
            SlotRule::ChannelIntensityMix {
                channels,
                mix_synthesized,
            } => {
                let mut intensity = Vec4::ONE;
                for (i, channel) in channels.iter().enumerate() {
                    if let Some(parameter) = channel {
                        intensity[i] = require_float(material, slot, parameter)?;
                    }
                }
                let (mut buffer, run_mixer) = match base {
                    Some(buffer) => (buffer, true),
                    None => (
                        PixelBuffer::solid(target.x, target.y, intensity),
                        *mix_synthesized,
                    ),
                };
                if run_mixer {
                    buffer.map_texels(|texel| texel * intensity);
                }
                Ok(buffer)
            }
            SlotRule::DefaultOrBlend {
                default,
                strength,
                invert,
            } => {
                let strength = require_float(material, slot, strength)?;
                let default = Vec4::from_array(*default);
                let t = if *invert { 1.0 - strength } else { strength };
                Ok(match base {
                    Some(mut buffer) => {
                        buffer.map_texels(|texel| texel.lerp(default, t));
                        buffer
                    }
                    None => PixelBuffer::solid(target.x, target.y, default),
                })
            }
            SlotRule::ParallaxScale { strength, range } => {
                let raw = require_float(material, slot, strength)?;
                let span = (range.1 - range.0).max(f32::EPSILON);
                let normalized = ((raw - range.0) / span).clamp(0.0, 1.0);
                Ok(match base {
                    Some(mut buffer) => {
                        buffer.map_texels(|texel| (texel.truncate() * normalized).extend(texel.w));
                        buffer
                    }
                    None => PixelBuffer::solid(target.x, target.y, Vec4::new(0.0, 0.0, 0.0, 1.0)),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ShaderArchetype
// ---------------------------------------------------------------------------

/// The slot rules bound to one shader. Shared read-only by every material of that shader.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderArchetype {
    /// Slot name → processing rule.
    pub rules: BTreeMap<String, SlotRule>,
    /// Slots that never enter the atlas.
    pub excluded: BTreeSet<String>,
    /// Slots whose atlas is exported gamma-encoded. Everything else is exported linear.
    pub srgb_slots: BTreeSet<String>,
}

impl ShaderArchetype {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, slot: impl Into<String>, rule: SlotRule) -> Self {
        self.rules.insert(slot.into(), rule);
        self
    }

    pub fn with_excluded(mut self, slot: impl Into<String>) -> Self {
        self.excluded.insert(slot.into());
        self
    }

    pub fn with_srgb_slot(mut self, slot: impl Into<String>) -> Self {
        self.srgb_slots.insert(slot.into());
        self
    }

    /// The built-in archetype for the standard PBR shader.
    pub fn standard() -> Self {
        use standard::*;

        Self::new()
            .with_rule(
                MAIN_TEX,
                SlotRule::ColorTint {
                    color: COLOR.to_string(),
                },
            )
            .with_rule(
                METALLIC_GLOSS_MAP,
                SlotRule::ChannelIntensityMix {
                    channels: [
                        Some(METALLIC.to_string()),
                        Some(METALLIC.to_string()),
                        Some(METALLIC.to_string()),
                        Some(GLOSS_MAP_SCALE.to_string()),
                    ],
                    mix_synthesized: false,
                },
            )
            .with_rule(
                BUMP_MAP,
                SlotRule::DefaultOrBlend {
                    default: NEUTRAL_NORMAL,
                    strength: BUMP_SCALE.to_string(),
                    invert: true,
                },
            )
            .with_rule(
                PARALLAX_MAP,
                SlotRule::ParallaxScale {
                    strength: PARALLAX.to_string(),
                    range: PARALLAX_RANGE,
                },
            )
            .with_rule(
                OCCLUSION_MAP,
                SlotRule::DefaultOrBlend {
                    default: [1.0; 4],
                    strength: OCCLUSION_STRENGTH.to_string(),
                    invert: true,
                },
            )
            .with_rule(
                EMISSION_MAP,
                SlotRule::ColorTint {
                    color: EMISSION_COLOR.to_string(),
                },
            )
            .with_excluded(DETAIL_MASK)
            .with_excluded(DETAIL_ALBEDO_MAP)
            .with_excluded(DETAIL_NORMAL_MAP)
            .with_srgb_slot(MAIN_TEX)
            .with_srgb_slot(EMISSION_MAP)
    }

    /// Returns `true` unless `slot` is excluded from atlasing.
    pub fn is_atlased(&self, slot: &str) -> bool {
        !self.excluded.contains(slot)
    }

    pub fn rule(&self, slot: &str) -> Option<&SlotRule> {
        self.rules.get(slot)
    }

    /// Colour space the slot's atlas should be exported in.
    pub fn color_space(&self, slot: &str) -> ColorSpace {
        if self.srgb_slots.contains(slot) {
            ColorSpace::Srgb
        } else {
            ColorSpace::Linear
        }
    }

    /// Produces the `target`-sized contribution of `material` to `slot`'s atlas.
    ///
    /// Slots without a rule copy the bound texture, or yield a blank buffer.
    pub fn process<M: MaterialSource + ?Sized>(
        &self,
        material: &M,
        slot: &str,
        source: Option<&SourceTexture>,
        target: UVec2,
    ) -> Result<PixelBuffer, ArchetypeError> {
        let base = source.map(|texture| texture.to_linear_resized(target));
        match self.rules.get(slot) {
            Some(rule) => rule.apply(material, slot, base, target),
            None => Ok(base.unwrap_or_else(|| PixelBuffer::new(target.x, target.y))),
        }
    }
}
