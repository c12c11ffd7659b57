//! Mesh-level driver: groups a mesh's submeshes by shader, atlases each group, and
//! rebuilds the submesh list.
//!
//! Everything is packed onto a single canvas; materials that do not fit and shaders
//! with no archetype keep their own submesh. Vertices shared by several materials are
//! split first, so every UV belongs to exactly one material and is remapped at most
//! once.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use glam::{UVec2, Vec2};
use thiserror::Error;
use tracing::{info, warn};

use crate::group::{AtlasOutput, GroupError, GroupSettings, MaterialGroup, MaterialState};
use crate::registry::ArchetypeRegistry;
use crate::texture::MaterialSource;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    #[error("submesh {submesh} uses unknown material '{material}'")]
    UnknownMaterial { submesh: usize, material: String },

    #[error("submesh {submesh} references vertex {index} but the mesh has {vertex_count} UVs")]
    VertexOutOfRange {
        submesh: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("material group for shader '{shader}' failed: {source}")]
    Group {
        shader: String,
        #[source]
        source: GroupError,
    },
}

// ---------------------------------------------------------------------------
// Mesh data
// ---------------------------------------------------------------------------

/// One material's share of a mesh, as a flat triangle list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Submesh {
    pub material: String,
    pub triangles: Vec<u32>,
}

impl Submesh {
    pub fn new(material: impl Into<String>, triangles: Vec<u32>) -> Self {
        Self {
            material: material.into(),
            triangles,
        }
    }
}

/// The parts of a mesh the driver reads and rewrites.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    /// Primary texture coordinates, rewritten in place.
    pub uvs: Vec<Vec2>,
    /// Lightmap coordinates. Carried through untouched.
    pub lightmap_uvs: Vec<Vec2>,
    pub submeshes: Vec<Submesh>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetainReason {
    /// The material's shader has no registered archetype.
    NoArchetype,
    /// The material did not fit on the canvas.
    Unfit,
}

/// A submesh left on its original material.
#[derive(Clone, Debug, PartialEq)]
pub struct RetainedSubmesh {
    pub material: String,
    pub shader: String,
    pub reason: RetainReason,
}

/// The atlases produced for one shader.
#[derive(Clone, Debug)]
pub struct AtlasedGroup {
    pub shader: String,
    /// Name given to the merged material's submesh.
    pub material: String,
    pub output: AtlasOutput,
}

/// A vertex duplicated because a second material referenced it.
///
/// Hosts carrying per-vertex attributes beyond UVs copy `original` to `copy`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitVertex {
    pub original: u32,
    pub copy: u32,
    /// Material whose triangles now reference `copy`.
    pub material: String,
}

#[derive(Clone, Debug, Default)]
pub struct BuildReport {
    pub groups: Vec<AtlasedGroup>,
    pub retained: Vec<RetainedSubmesh>,
    pub split_vertices: Vec<SplitVertex>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildSettings {
    pub canvas: UVec2,
    pub group: GroupSettings,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            canvas: UVec2::splat(4096),
            group: GroupSettings::default(),
        }
    }
}

/// Name of the merged material for a shader's atlas.
pub fn atlas_material_name(shader: &str) -> String {
    format!("{shader}_atlas")
}

// ---------------------------------------------------------------------------
// build_atlases
// ---------------------------------------------------------------------------

/// Atlases every shader group in `mesh`.
///
/// On success `mesh.submeshes` holds one submesh per atlased shader, in shader-name
/// order, followed by the retained submeshes in their original order. Split vertices
/// are appended to `mesh.uvs` (and `mesh.lightmap_uvs` when it has one entry per UV).
///
/// # Errors
///
/// [`DriverError::UnknownMaterial`] and [`DriverError::VertexOutOfRange`] are reported
/// before anything is modified. A [`DriverError::Group`] leaves UVs of earlier groups
/// already rewritten.
pub fn build_atlases<M: MaterialSource>(
    mesh: &mut MeshData,
    materials: &[M],
    registry: &ArchetypeRegistry,
    settings: &BuildSettings,
) -> Result<BuildReport, DriverError> {
    let by_name: HashMap<&str, &M> = materials.iter().map(|m| (m.name(), m)).collect();

    let mut resolved = Vec::with_capacity(mesh.submeshes.len());
    for (submesh_index, submesh) in mesh.submeshes.iter().enumerate() {
        let material = by_name.get(submesh.material.as_str()).copied().ok_or_else(|| {
            DriverError::UnknownMaterial {
                submesh: submesh_index,
                material: submesh.material.clone(),
            }
        })?;
        if let Some(&index) = submesh
            .triangles
            .iter()
            .find(|&&i| i as usize >= mesh.uvs.len())
        {
            return Err(DriverError::VertexOutOfRange {
                submesh: submesh_index,
                index,
                vertex_count: mesh.uvs.len(),
            });
        }
        resolved.push(material);
    }

    let mut report = BuildReport {
        split_vertices: split_shared_vertices(mesh),
        ..Default::default()
    };

    let mut by_shader: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, material) in resolved.iter().enumerate() {
        by_shader.entry(material.shader()).or_default().push(index);
    }

    let mut kept = vec![None; mesh.submeshes.len()];
    let mut atlased = Vec::new();

    for (shader, indices) in by_shader {
        let Some(archetype) = registry.get(shader) else {
            warn!(shader, submeshes = indices.len(), "no archetype for shader, keeping submeshes");
            for &index in &indices {
                kept[index] = Some(RetainReason::NoArchetype);
            }
            continue;
        };

        let mut group = MaterialGroup::with_settings(archetype, settings.group);
        for &index in &indices {
            group.add_material(resolved[index], &mesh.submeshes[index].triangles);
        }
        let output = group
            .pack(&mut mesh.uvs, settings.canvas)
            .map_err(|source| DriverError::Group {
                shader: shader.to_string(),
                source,
            })?;

        for &index in &indices {
            if group.state(resolved[index].name()) == Some(MaterialState::Rejected) {
                kept[index] = Some(RetainReason::Unfit);
            }
        }

        if output.placements.is_empty() {
            continue;
        }
        let material = atlas_material_name(shader);
        atlased.push(Submesh::new(material.clone(), output.triangles.clone()));
        report.groups.push(AtlasedGroup {
            shader: shader.to_string(),
            material,
            output,
        });
    }

    let mut submeshes = atlased;
    for (index, submesh) in std::mem::take(&mut mesh.submeshes).into_iter().enumerate() {
        if let Some(reason) = kept[index] {
            report.retained.push(RetainedSubmesh {
                material: submesh.material.clone(),
                shader: resolved[index].shader().to_string(),
                reason,
            });
            submeshes.push(submesh);
        }
    }
    mesh.submeshes = submeshes;

    info!(
        groups = report.groups.len(),
        retained = report.retained.len(),
        split_vertices = report.split_vertices.len(),
        submeshes = mesh.submeshes.len(),
        "atlas build finished"
    );
    Ok(report)
}

/// Gives every material its own vertices.
///
/// The first material (in submesh order) to reference a vertex keeps it. Each later
/// material gets one appended copy, and its triangle indices are rewritten to it.
fn split_shared_vertices(mesh: &mut MeshData) -> Vec<SplitVertex> {
    let lightmap_aligned = mesh.lightmap_uvs.len() == mesh.uvs.len();
    let mut material_ids: HashMap<String, usize> = HashMap::new();
    let mut owners: HashMap<u32, usize> = HashMap::new();
    let mut copies: HashMap<(usize, u32), u32> = HashMap::new();
    let mut splits = Vec::new();

    for submesh in &mut mesh.submeshes {
        let next_id = material_ids.len();
        let material = *material_ids.entry(submesh.material.clone()).or_insert(next_id);

        for index in &mut submesh.triangles {
            let original = *index;
            if *owners.entry(original).or_insert(material) == material {
                continue;
            }
            *index = match copies.entry((material, original)) {
                Entry::Occupied(copy) => *copy.get(),
                Entry::Vacant(slot) => {
                    let copy = mesh.uvs.len() as u32;
                    mesh.uvs.push(mesh.uvs[original as usize]);
                    if lightmap_aligned {
                        mesh.lightmap_uvs.push(mesh.lightmap_uvs[original as usize]);
                    }
                    splits.push(SplitVertex {
                        original,
                        copy,
                        material: submesh.material.clone(),
                    });
                    *slot.insert(copy)
                }
            };
        }
    }

    if !splits.is_empty() {
        warn!(vertices = splits.len(), "vertices shared between materials were split");
    }
    splits
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec4;

    use super::*;
    use crate::archetype::ShaderArchetype;
    use crate::archetype::standard::*;
    use crate::pixel::ColorSpace;
    use crate::texture::{Material, SourceTexture};

    fn texture(size: u32) -> Arc<SourceTexture> {
        Arc::new(SourceTexture::solid(size, size, [255; 4], ColorSpace::Srgb))
    }

    fn tinted(name: &str, size: u32) -> Material {
        Material::new(name, "Standard")
            .with_color(COLOR, Vec4::ONE)
            .with_texture(MAIN_TEX, texture(size))
    }

    fn mesh(submeshes: Vec<Submesh>, vertices: usize) -> MeshData {
        let uvs: Vec<Vec2> = (0..vertices).map(|i| Vec2::splat(i as f32 / vertices as f32)).collect();
        MeshData {
            lightmap_uvs: uvs.clone(),
            uvs,
            submeshes,
        }
    }

    /// Unit quad corners, one vertex each.
    fn quad_mesh(submeshes: Vec<Submesh>) -> MeshData {
        let uvs = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        MeshData {
            lightmap_uvs: uvs.clone(),
            uvs,
            submeshes,
        }
    }

    fn settings(canvas: u32) -> BuildSettings {
        BuildSettings {
            canvas: UVec2::splat(canvas),
            ..Default::default()
        }
    }

    #[test]
    fn test_same_shader_merges_into_one_submesh() {
        let materials = vec![tinted("a", 32), tinted("b", 32)];
        let mut mesh = mesh(
            vec![Submesh::new("a", vec![0, 1, 2]), Submesh::new("b", vec![3, 4, 5])],
            6,
        );

        let report = build_atlases(
            &mut mesh,
            &materials,
            &ArchetypeRegistry::with_standard(),
            &settings(128),
        )
        .unwrap();

        assert_eq!(report.groups.len(), 1);
        assert!(report.retained.is_empty());
        assert_eq!(
            mesh.submeshes,
            vec![Submesh::new("Standard_atlas", vec![0, 1, 2, 3, 4, 5])]
        );
        assert!(report.groups[0].output.slots.contains_key(MAIN_TEX));
    }

    #[test]
    fn test_unknown_shader_is_retained() {
        let materials = vec![tinted("a", 32), Material::new("water", "Water")];
        let mut mesh = mesh(
            vec![
                Submesh::new("water", vec![3, 4, 5]),
                Submesh::new("a", vec![0, 1, 2]),
            ],
            6,
        );
        let before = mesh.uvs.clone();

        let report = build_atlases(
            &mut mesh,
            &materials,
            &ArchetypeRegistry::with_standard(),
            &settings(128),
        )
        .unwrap();

        assert_eq!(
            report.retained,
            vec![RetainedSubmesh {
                material: "water".to_string(),
                shader: "Water".to_string(),
                reason: RetainReason::NoArchetype,
            }]
        );
        assert_eq!(mesh.submeshes.len(), 2);
        assert_eq!(mesh.submeshes[0].material, "Standard_atlas");
        assert_eq!(mesh.submeshes[1], Submesh::new("water", vec![3, 4, 5]));
        assert_eq!(&mesh.uvs[3..], &before[3..]);
    }

    #[test]
    fn test_unfit_material_keeps_own_submesh() {
        let materials = vec![tinted("small", 32), tinted("huge", 512)];
        let mut mesh = mesh(
            vec![
                Submesh::new("small", vec![0, 1, 2]),
                Submesh::new("huge", vec![3, 4, 5]),
            ],
            6,
        );

        let report = build_atlases(
            &mut mesh,
            &materials,
            &ArchetypeRegistry::with_standard(),
            &settings(128),
        )
        .unwrap();

        assert_eq!(report.groups[0].output.unfitted, vec!["huge".to_string()]);
        assert_eq!(report.retained[0].reason, RetainReason::Unfit);
        assert_eq!(
            mesh.submeshes,
            vec![
                Submesh::new("Standard_atlas", vec![0, 1, 2]),
                Submesh::new("huge", vec![3, 4, 5]),
            ]
        );
    }

    #[test]
    fn test_unknown_material_fails_before_mutation() {
        let materials = vec![tinted("a", 32)];
        let mut mesh = mesh(vec![Submesh::new("ghost", vec![0, 1, 2])], 3);
        let before = mesh.clone();

        let err = build_atlases(
            &mut mesh,
            &materials,
            &ArchetypeRegistry::with_standard(),
            &settings(128),
        )
        .unwrap_err();

        assert_eq!(
            err,
            DriverError::UnknownMaterial {
                submesh: 0,
                material: "ghost".to_string(),
            }
        );
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_lightmap_uvs_untouched() {
        let materials = vec![tinted("a", 32)];
        let mut mesh = mesh(vec![Submesh::new("a", vec![0, 1, 2])], 3);
        let lightmap = mesh.lightmap_uvs.clone();

        build_atlases(
            &mut mesh,
            &materials,
            &ArchetypeRegistry::with_standard(),
            &settings(128),
        )
        .unwrap();

        assert_eq!(mesh.lightmap_uvs, lightmap);
        assert_ne!(mesh.uvs[1], lightmap[1]);
    }

    #[test]
    fn test_material_split_over_submeshes_is_placed_once() {
        let materials = vec![tinted("a", 32)];
        let mut mesh = mesh(
            vec![Submesh::new("a", vec![0, 1, 2]), Submesh::new("a", vec![2, 1, 3])],
            4,
        );

        let report = build_atlases(
            &mut mesh,
            &materials,
            &ArchetypeRegistry::with_standard(),
            &settings(128),
        )
        .unwrap();

        assert_eq!(report.groups[0].output.placements.len(), 1);
        assert_eq!(mesh.submeshes[0].triangles, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn test_vertex_shared_across_shaders_is_split() {
        let materials = vec![
            tinted("a", 32),
            Material::new("b", "Unlit").with_texture(MAIN_TEX, texture(64)),
        ];
        let mut registry = ArchetypeRegistry::with_standard();
        registry.register("Unlit", ShaderArchetype::new());
        let mut mesh = quad_mesh(vec![
            Submesh::new("a", vec![0, 1, 2]),
            Submesh::new("b", vec![2, 3, 0]),
        ]);

        let report = build_atlases(&mut mesh, &materials, &registry, &settings(128)).unwrap();

        assert_eq!(
            report.split_vertices,
            vec![
                SplitVertex {
                    original: 2,
                    copy: 4,
                    material: "b".to_string(),
                },
                SplitVertex {
                    original: 0,
                    copy: 5,
                    material: "b".to_string(),
                },
            ]
        );
        assert_eq!(
            mesh.submeshes,
            vec![
                Submesh::new("Standard_atlas", vec![0, 1, 2]),
                Submesh::new("Unlit_atlas", vec![4, 3, 5]),
            ]
        );

        // a sits in a 32-texel cell, b in a 64-texel cell of its own atlas.
        assert_eq!(mesh.uvs[2], Vec2::splat(0.25));
        assert_eq!(mesh.uvs[4], Vec2::splat(0.5));
        assert_eq!(mesh.uvs[3], Vec2::new(0.0, 0.5));
        assert_eq!(mesh.lightmap_uvs.len(), 6);
        assert_eq!(mesh.lightmap_uvs[4], Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_vertex_shared_with_retained_submesh_keeps_original_uv() {
        let materials = vec![tinted("a", 32), Material::new("water", "Water")];
        let mut mesh = quad_mesh(vec![
            Submesh::new("water", vec![0, 1, 2]),
            Submesh::new("a", vec![2, 3, 0]),
        ]);
        let before = mesh.uvs.clone();

        let report = build_atlases(
            &mut mesh,
            &materials,
            &ArchetypeRegistry::with_standard(),
            &settings(128),
        )
        .unwrap();

        assert_eq!(report.retained[0].reason, RetainReason::NoArchetype);
        assert_eq!(&mesh.uvs[..3], &before[..3]);
        assert_eq!(
            mesh.submeshes,
            vec![
                Submesh::new("Standard_atlas", vec![4, 3, 5]),
                Submesh::new("water", vec![0, 1, 2]),
            ]
        );
        assert_eq!(mesh.uvs[4], Vec2::splat(0.25));
        assert_eq!(mesh.uvs[5], Vec2::ZERO);
    }

    #[test]
    fn test_vertex_out_of_range_fails_before_mutation() {
        let materials = vec![tinted("a", 32)];
        let mut mesh = quad_mesh(vec![Submesh::new("a", vec![0, 1, 9])]);
        let before = mesh.clone();

        let err = build_atlases(
            &mut mesh,
            &materials,
            &ArchetypeRegistry::with_standard(),
            &settings(128),
        )
        .unwrap_err();

        assert_eq!(
            err,
            DriverError::VertexOutOfRange {
                submesh: 0,
                index: 9,
                vertex_count: 4,
            }
        );
        assert_eq!(mesh, before);
    }
}
