//! Texture atlasing: greedy rectangle packing, per-slot compositing driven by shader
//! archetypes, and UV remapping for meshes whose materials are merged into one.

mod archetype;
mod driver;
mod geometry;
mod group;
mod packer;
mod pixel;
mod registry;
mod texture;

pub use archetype::{ArchetypeError, ShaderArchetype, SlotRule, standard};
pub use driver::{
    AtlasedGroup, BuildReport, BuildSettings, DriverError, MeshData, RetainReason,
    RetainedSubmesh, SplitVertex, Submesh, atlas_material_name, build_atlases,
};
pub use geometry::{PixelRect, UvRect, scale_floor};
pub use group::{
    AtlasOutput, GroupError, GroupSettings, MaterialGroup, MaterialInfo, MaterialState,
    Placement, SkippedSlot, TextureSlotInfo,
};
pub use packer::{DEFAULT_SKIP_DISTANCE, PackableRect, PackingResult, RectPacker, pack_rects};
pub use pixel::{ColorSpace, PixelBuffer, linear_to_srgb, srgb_to_linear};
pub use registry::{ArchetypeManifest, ArchetypeRegistry, RegistryError, STANDARD_SHADER};
pub use texture::{Material, MaterialSource, SourceTexture};
