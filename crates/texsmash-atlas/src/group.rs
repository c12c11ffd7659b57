//! Material groups: every material of one shader packed, remapped, and composited into
//! one set of per-slot atlases.
//!
//! A pass runs in order: canonical sizes, packing, rejection of unfit materials, UV
//! remapping, per-slot resolution coefficients, and compositing. Each material moves
//! from [`MaterialState::Pending`] to [`MaterialState::Placed`] or
//! [`MaterialState::Rejected`]; rejected materials never re-enter later passes.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use glam::{UVec2, Vec2};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archetype::{ArchetypeError, ShaderArchetype};
use crate::geometry::{PixelRect, UvRect, scale_floor};
use crate::packer::{DEFAULT_SKIP_DISTANCE, PackableRect, RectPacker};
use crate::pixel::PixelBuffer;
use crate::texture::{MaterialSource, SourceTexture};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that abort a packing pass before anything is mutated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GroupError {
    #[error("canvas must be non-empty, got {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },

    #[error(
        "material '{material}' references vertex {index} but the UV buffer has {vertex_count} entries"
    )]
    VertexOutOfRange {
        material: String,
        index: u32,
        vertex_count: usize,
    },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tunables for a group's packing passes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupSettings {
    /// Packer scan step in texels.
    pub skip_distance: u32,
    /// Cell size given to materials without any bound texture.
    pub min_cell_size: UVec2,
    /// Upper bound on every slot atlas. Coefficients are capped to stay within it.
    pub max_atlas_size: UVec2,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            skip_distance: DEFAULT_SKIP_DISTANCE,
            min_cell_size: UVec2::splat(4),
            max_atlas_size: UVec2::splat(8192),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-material bookkeeping
// ---------------------------------------------------------------------------

/// Where a material stands after the most recent pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialState {
    /// Added, not yet packed.
    Pending,
    /// Placed at the given canvas rect by the last pass.
    Placed(PixelRect),
    /// Did not fit; excluded from every later pass.
    Rejected,
}

/// Snapshot of one atlas-eligible slot, taken when the material joins the group.
#[derive(Clone, Debug)]
pub struct TextureSlotInfo<'a> {
    pub slot: String,
    pub texture: Option<&'a SourceTexture>,
}

/// A material's textures, triangles, and packing state.
#[derive(Debug)]
pub struct MaterialInfo<'a, M: ?Sized> {
    material: &'a M,
    textures: Vec<TextureSlotInfo<'a>>,
    triangles: Vec<u32>,
    state: MaterialState,
}

impl<'a, M: MaterialSource + ?Sized> MaterialInfo<'a, M> {
    pub fn material(&self) -> &'a M {
        self.material
    }

    pub fn textures(&self) -> &[TextureSlotInfo<'a>] {
        &self.textures
    }

    /// Vertex indices of every triangle using this material, three per triangle.
    pub fn triangles(&self) -> &[u32] {
        &self.triangles
    }

    pub fn state(&self) -> MaterialState {
        self.state
    }

    /// Component-wise maximum of the bound textures' sizes, zero when none are bound.
    pub fn canonical_size(&self) -> UVec2 {
        self.textures
            .iter()
            .filter_map(|t| t.texture)
            .fold(UVec2::ZERO, |acc, tex| acc.max(tex.size()))
    }

    fn texture(&self, slot: &str) -> Option<&'a SourceTexture> {
        self.textures
            .iter()
            .find(|t| t.slot == slot)
            .and_then(|t| t.texture)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Where one material ended up.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub material: String,
    /// Cell in canvas texels.
    pub rect: PixelRect,
    /// Same cell in UV space.
    pub uv_rect: UvRect,
}

/// A slot cell left blank because its rule could not run.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedSlot {
    pub material: String,
    pub slot: String,
    pub error: ArchetypeError,
}

/// Result of [`MaterialGroup::pack`].
#[derive(Clone, Debug)]
pub struct AtlasOutput {
    /// Slot name → composited atlas, sized `canvas * coefficient`.
    pub slots: BTreeMap<String, PixelBuffer>,
    /// Slot name → resolution coefficient used for that atlas, after capping.
    pub coefficients: BTreeMap<String, Vec2>,
    /// Triangles of every placed material, concatenated in placement order.
    pub triangles: Vec<u32>,
    /// Materials that did not fit, in packing order.
    pub unfitted: Vec<String>,
    pub placements: Vec<Placement>,
    pub skipped: Vec<SkippedSlot>,
}

// ---------------------------------------------------------------------------
// MaterialGroup
// ---------------------------------------------------------------------------

/// All materials of one shader archetype that are being merged into one atlas.
pub struct MaterialGroup<'a, M: MaterialSource + ?Sized> {
    archetype: &'a ShaderArchetype,
    settings: GroupSettings,
    materials: Vec<MaterialInfo<'a, M>>,
    by_name: HashMap<String, usize>,
}

struct CellJob<'s> {
    material: usize,
    slot: &'s str,
    cell: PixelRect,
}

impl<'a, M: MaterialSource + ?Sized> MaterialGroup<'a, M> {
    pub fn new(archetype: &'a ShaderArchetype) -> Self {
        Self::with_settings(archetype, GroupSettings::default())
    }

    pub fn with_settings(archetype: &'a ShaderArchetype, settings: GroupSettings) -> Self {
        Self {
            archetype,
            settings,
            materials: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn archetype(&self) -> &'a ShaderArchetype {
        self.archetype
    }

    pub fn settings(&self) -> &GroupSettings {
        &self.settings
    }

    /// Registers `material` with the triangles that use it.
    ///
    /// The first call snapshots the material's atlas-eligible slots. Later calls for the
    /// same material only append triangles.
    pub fn add_material(&mut self, material: &'a M, triangles: &[u32]) {
        if let Some(&idx) = self.by_name.get(material.name()) {
            self.materials[idx].triangles.extend_from_slice(triangles);
            return;
        }

        let textures = material
            .texture_slots()
            .into_iter()
            .filter(|slot| self.archetype.is_atlased(slot))
            .map(|slot| TextureSlotInfo {
                slot: slot.to_string(),
                texture: material.texture(slot),
            })
            .collect();

        self.by_name
            .insert(material.name().to_string(), self.materials.len());
        self.materials.push(MaterialInfo {
            material,
            textures,
            triangles: triangles.to_vec(),
            state: MaterialState::Pending,
        });
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn materials(&self) -> &[MaterialInfo<'a, M>] {
        &self.materials
    }

    pub fn info(&self, name: &str) -> Option<&MaterialInfo<'a, M>> {
        self.by_name.get(name).map(|&idx| &self.materials[idx])
    }

    pub fn state(&self, name: &str) -> Option<MaterialState> {
        self.info(name).map(MaterialInfo::state)
    }

    /// Names and cells of materials placed by the last pass.
    pub fn placed(&self) -> Vec<(&str, PixelRect)> {
        self.materials
            .iter()
            .filter_map(|m| match m.state {
                MaterialState::Placed(rect) => Some((m.material.name(), rect)),
                _ => None,
            })
            .collect()
    }

    /// Names of materials rejected by any pass so far.
    pub fn rejected(&self) -> Vec<&str> {
        self.materials
            .iter()
            .filter(|m| m.state == MaterialState::Rejected)
            .map(|m| m.material.name())
            .collect()
    }

    /// Size of the cell a material asks the packer for.
    fn cell_size(&self, info: &MaterialInfo<'a, M>) -> UVec2 {
        let canonical = info.canonical_size();
        if canonical.x == 0 || canonical.y == 0 {
            self.settings.min_cell_size.max(canonical)
        } else {
            canonical
        }
    }

    /// Packs every non-rejected material into `canvas`, rewrites `uvs` in place, and
    /// composites one atlas per slot.
    ///
    /// UVs are remapped relative to their current values, so each pass expects the
    /// mesh's original UVs.
    ///
    /// # Errors
    ///
    /// [`GroupError::InvalidCanvas`] for a zero-sized canvas and
    /// [`GroupError::VertexOutOfRange`] when a triangle indexes past `uvs`. Both are
    /// detected before any state changes.
    pub fn pack(&mut self, uvs: &mut [Vec2], canvas: UVec2) -> Result<AtlasOutput, GroupError> {
        if canvas.x == 0 || canvas.y == 0 {
            return Err(GroupError::InvalidCanvas {
                width: canvas.x,
                height: canvas.y,
            });
        }
        for info in self.active() {
            if let Some(&index) = info.triangles.iter().find(|&&i| i as usize >= uvs.len()) {
                return Err(GroupError::VertexOutOfRange {
                    material: info.material.name().to_string(),
                    index,
                    vertex_count: uvs.len(),
                });
            }
        }

        let mut packer = RectPacker::with_skip_distance(self.settings.skip_distance);
        for (idx, info) in self.materials.iter().enumerate() {
            if info.state != MaterialState::Rejected {
                packer.add(PackableRect::new(idx, self.cell_size(info)));
            }
        }
        let packing = packer.pack(canvas, true);

        let mut unfitted = Vec::with_capacity(packing.unfitted.len());
        for &idx in &packing.unfitted {
            let info = &mut self.materials[idx];
            info.state = MaterialState::Rejected;
            warn!(
                material = info.material.name(),
                canvas_width = canvas.x,
                canvas_height = canvas.y,
                "material does not fit in atlas"
            );
            unfitted.push(info.material.name().to_string());
        }
        for rect in &packing.placed {
            self.materials[*rect.key()].state = MaterialState::Placed(rect.rect());
        }

        let placed: Vec<(usize, PixelRect)> = packing
            .placed
            .iter()
            .map(|rect| (*rect.key(), rect.rect()))
            .collect();
        let (triangles, placements) = self.remap_uvs(uvs, canvas, &placed);

        let coefficients = self.capped_coefficients(self.slot_coefficients(), canvas);
        let (slots, skipped) = self.composite(canvas, &placed, &coefficients);

        info!(
            placed = placements.len(),
            unfitted = unfitted.len(),
            slots = slots.len(),
            skipped = skipped.len(),
            "material group packed"
        );

        Ok(AtlasOutput {
            slots,
            coefficients,
            triangles,
            unfitted,
            placements,
            skipped,
        })
    }

    fn active(&self) -> impl Iterator<Item = &MaterialInfo<'a, M>> {
        self.materials
            .iter()
            .filter(|m| m.state != MaterialState::Rejected)
    }

    /// Moves every referenced vertex's UV into its material's cell, once per vertex.
    fn remap_uvs(
        &self,
        uvs: &mut [Vec2],
        canvas: UVec2,
        placed: &[(usize, PixelRect)],
    ) -> (Vec<u32>, Vec<Placement>) {
        let mut owners: HashMap<u32, usize> = HashMap::new();
        let mut triangles = Vec::new();
        let mut placements = Vec::with_capacity(placed.len());

        for &(idx, rect) in placed {
            let info = &self.materials[idx];
            let uv_rect = rect.normalized(canvas);
            let mut shared = 0usize;

            for &index in &info.triangles {
                match owners.entry(index) {
                    Entry::Vacant(slot) => {
                        slot.insert(idx);
                        let uv = &mut uvs[index as usize];
                        *uv = uv_rect.remap(*uv);
                    }
                    Entry::Occupied(owner) if *owner.get() != idx => shared += 1,
                    Entry::Occupied(_) => {}
                }
            }
            if shared > 0 {
                warn!(
                    material = info.material.name(),
                    references = shared,
                    "vertices already remapped for another material were left in place"
                );
            }

            debug!(
                material = info.material.name(),
                x = rect.min.x,
                y = rect.min.y,
                width = rect.size.x,
                height = rect.size.y,
                "placed material"
            );
            triangles.extend_from_slice(&info.triangles);
            placements.push(Placement {
                material: info.material.name().to_string(),
                rect,
                uv_rect,
            });
        }

        (triangles, placements)
    }

    /// Per-slot supersampling multiplier relative to canvas resolution.
    ///
    /// The largest texture bound to a slot anywhere in the group, divided by the smallest
    /// canonical size among textured materials. Slots with no bound texture get `1`.
    /// [`MaterialGroup::pack`] caps these against [`GroupSettings::max_atlas_size`].
    pub fn slot_coefficients(&self) -> BTreeMap<String, Vec2> {
        let smallest = self
            .active()
            .map(MaterialInfo::canonical_size)
            .filter(|size| size.x > 0 && size.y > 0)
            .min_by_key(|size| u64::from(size.x) * u64::from(size.y))
            .map(|size| size.as_vec2());

        let mut largest: BTreeMap<String, UVec2> = BTreeMap::new();
        for info in self.active() {
            for slot in &info.textures {
                let size = slot.texture.map(SourceTexture::size).unwrap_or(UVec2::ZERO);
                let entry = largest.entry(slot.slot.clone()).or_insert(UVec2::ZERO);
                *entry = entry.max(size);
            }
        }

        largest
            .into_iter()
            .map(|(slot, max)| {
                let coefficient = match smallest {
                    Some(smallest) if max.x > 0 && max.y > 0 => max.as_vec2() / smallest,
                    _ => Vec2::ONE,
                };
                (slot, coefficient)
            })
            .collect()
    }

    /// Lowers any coefficient whose atlas would exceed `max_atlas_size`. Never below 1.
    fn capped_coefficients(
        &self,
        coefficients: BTreeMap<String, Vec2>,
        canvas: UVec2,
    ) -> BTreeMap<String, Vec2> {
        let limit = (self.settings.max_atlas_size.as_vec2() / canvas.as_vec2()).max(Vec2::ONE);
        coefficients
            .into_iter()
            .map(|(slot, requested)| {
                let applied = requested.min(limit);
                if applied != requested {
                    warn!(
                        slot = slot.as_str(),
                        requested_x = requested.x,
                        requested_y = requested.y,
                        applied_x = applied.x,
                        applied_y = applied.y,
                        "slot atlas resolution capped"
                    );
                }
                (slot, applied)
            })
            .collect()
    }

    /// Runs every slot rule for every placed material and blits the cells into the
    /// slot atlases. Rules run in parallel; blits are sequential.
    fn composite(
        &self,
        canvas: UVec2,
        placed: &[(usize, PixelRect)],
        coefficients: &BTreeMap<String, Vec2>,
    ) -> (BTreeMap<String, PixelBuffer>, Vec<SkippedSlot>) {
        let mut jobs = Vec::with_capacity(coefficients.len() * placed.len());
        for (slot, &coefficient) in coefficients {
            for &(material, rect) in placed {
                jobs.push(CellJob {
                    material,
                    slot: slot.as_str(),
                    cell: rect.scaled(coefficient),
                });
            }
        }

        let results: Vec<Result<PixelBuffer, ArchetypeError>> = jobs
            .par_iter()
            .map(|job| {
                let info = &self.materials[job.material];
                self.archetype.process(
                    info.material,
                    job.slot,
                    info.texture(job.slot),
                    job.cell.size,
                )
            })
            .collect();

        let mut slots = BTreeMap::new();
        for (slot, &coefficient) in coefficients {
            let size = scale_floor(canvas, coefficient).max(UVec2::ONE);
            debug!(
                slot = slot.as_str(),
                coefficient_x = coefficient.x,
                coefficient_y = coefficient.y,
                width = size.x,
                height = size.y,
                "allocated slot atlas"
            );
            slots.insert(slot.clone(), PixelBuffer::new(size.x, size.y));
        }
        let mut skipped = Vec::new();

        for (job, result) in jobs.iter().zip(results) {
            let material = self.materials[job.material].material.name();
            match result {
                Ok(cell) => {
                    if let Some(atlas) = slots.get_mut(job.slot) {
                        atlas.blit(&cell, job.cell.min.x, job.cell.min.y);
                    }
                }
                Err(error) => {
                    warn!(material, slot = job.slot, %error, "slot skipped");
                    skipped.push(SkippedSlot {
                        material: material.to_string(),
                        slot: job.slot.to_string(),
                        error,
                    });
                }
            }
        }

        (slots, skipped)
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
