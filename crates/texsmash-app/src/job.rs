//! Job files: the materials and mesh to atlas, authored in RON.
//!
//! ```ron
//! (
//!     archetypes: Some("archetypes.ron"),
//!     materials: [
//!         (
//!             name: "brick",
//!             shader: "Standard",
//!             floats: { "_BumpScale": 1.0 },
//!             colors: { "_Color": (1.0, 1.0, 1.0, 1.0) },
//!             textures: {
//!                 "_MainTex": Some((path: "brick.png")),
//!                 "_BumpMap": Some((path: "brick_n.png", color_space: Linear)),
//!                 "_OcclusionMap": None,
//!             },
//!         ),
//!     ],
//!     mesh: (
//!         uvs: [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)],
//!         submeshes: [(material: "brick", triangles: [0, 1, 2])],
//!     ),
//! )
//! ```
//!
//! Paths are relative to the job file. Colours are linear RGBA.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};
use texsmash_atlas::{
    ArchetypeRegistry, ColorSpace, Material, MeshData, RegistryError, SourceTexture, Submesh,
};
use thiserror::Error;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse job file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("failed to load texture {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to load archetypes: {0}")]
    Registry(#[from] RegistryError),
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobFile {
    /// Extra archetype manifest, merged over the built-in standard archetype.
    #[serde(default)]
    pub archetypes: Option<PathBuf>,
    pub materials: Vec<MaterialSpec>,
    pub mesh: MeshSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MaterialSpec {
    pub name: String,
    pub shader: String,
    #[serde(default)]
    pub floats: BTreeMap<String, f32>,
    #[serde(default)]
    pub colors: BTreeMap<String, [f32; 4]>,
    /// Slot → texture. `None` exposes the slot without binding anything.
    #[serde(default)]
    pub textures: BTreeMap<String, Option<TextureRef>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextureRef {
    pub path: PathBuf,
    #[serde(default)]
    pub color_space: ColorSpace,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MeshSpec {
    pub uvs: Vec<[f32; 2]>,
    #[serde(default)]
    pub lightmap_uvs: Vec<[f32; 2]>,
    pub submeshes: Vec<SubmeshSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubmeshSpec {
    pub material: String,
    pub triangles: Vec<u32>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// A job with its textures decoded and archetypes resolved.
pub struct LoadedJob {
    pub materials: Vec<Material>,
    pub mesh: MeshData,
    pub registry: ArchetypeRegistry,
}

impl JobFile {
    /// Reads and parses a job file without touching any texture.
    pub fn read(path: &Path) -> Result<Self, JobError> {
        let contents = std::fs::read_to_string(path).map_err(|source| JobError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| JobError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads every referenced texture and manifest, resolving paths against `base_dir`.
    /// Each `(path, colour space)` pair is decoded once and shared.
    pub fn resolve(self, base_dir: &Path) -> Result<LoadedJob, JobError> {
        let mut registry = ArchetypeRegistry::with_standard();
        if let Some(manifest) = &self.archetypes {
            let added = registry.merge_ron(&base_dir.join(manifest))?;
            info!(manifest = %manifest.display(), added, "loaded archetype manifest");
        }

        let mut cache: HashMap<(PathBuf, ColorSpace), Arc<SourceTexture>> = HashMap::new();
        let mut materials = Vec::with_capacity(self.materials.len());
        for spec in self.materials {
            let mut material = Material::new(spec.name, spec.shader);
            for (name, value) in spec.floats {
                material = material.with_float(name, value);
            }
            for (name, rgba) in spec.colors {
                material = material.with_color(name, Vec4::from_array(rgba));
            }
            for (slot, texture) in spec.textures {
                material = match texture {
                    Some(texture) => {
                        let handle = load_texture(&mut cache, base_dir, &texture)?;
                        material.with_texture(slot, handle)
                    }
                    None => material.with_empty_slot(slot),
                };
            }
            materials.push(material);
        }
        info!(
            materials = materials.len(),
            textures = cache.len(),
            "job resolved"
        );

        let mesh = MeshData {
            uvs: self.mesh.uvs.into_iter().map(Vec2::from_array).collect(),
            lightmap_uvs: self.mesh.lightmap_uvs.into_iter().map(Vec2::from_array).collect(),
            submeshes: self
                .mesh
                .submeshes
                .into_iter()
                .map(|s| Submesh::new(s.material, s.triangles))
                .collect(),
        };

        Ok(LoadedJob {
            materials,
            mesh,
            registry,
        })
    }
}

/// Reads `path` and resolves it against its own directory.
pub fn load(path: &Path) -> Result<LoadedJob, JobError> {
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    JobFile::read(path)?.resolve(base_dir)
}

fn load_texture(
    cache: &mut HashMap<(PathBuf, ColorSpace), Arc<SourceTexture>>,
    base_dir: &Path,
    texture: &TextureRef,
) -> Result<Arc<SourceTexture>, JobError> {
    let path = base_dir.join(&texture.path);
    let key = (path, texture.color_space);
    if let Some(handle) = cache.get(&key) {
        return Ok(Arc::clone(handle));
    }

    let image = image::open(&key.0)
        .map_err(|source| JobError::Image {
            path: key.0.clone(),
            source,
        })?
        .to_rgba8();
    debug!(
        path = %key.0.display(),
        width = image.width(),
        height = image.height(),
        "loaded texture"
    );
    let handle = Arc::new(SourceTexture::new(image, texture.color_space));
    cache.insert(key, Arc::clone(&handle));
    Ok(handle)
}
