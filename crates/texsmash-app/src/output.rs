//! Writes atlases as PNG files and the build report as RON.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::Serialize;
use texsmash_atlas::{ArchetypeRegistry, BuildReport, MeshData, RetainReason};
use thiserror::Error;
use tracing::info;

/// File name of the build report inside the output directory.
pub const REPORT_FILE_NAME: &str = "report.ron";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] ron::Error),
}

/// `<shader>_<slot>.png`, with anything outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn atlas_file_name(shader: &str, slot: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!("{}_{}.png", sanitize(shader), sanitize(slot))
}

/// Encodes every slot atlas in `report` into `dir`, using each slot's colour space.
pub fn write_atlases(
    report: &BuildReport,
    registry: &ArchetypeRegistry,
    dir: &Path,
) -> Result<Vec<PathBuf>, OutputError> {
    std::fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for group in &report.groups {
        let archetype = registry.get(&group.shader);
        for (slot, atlas) in &group.output.slots {
            let color_space = archetype.map(|a| a.color_space(slot)).unwrap_or_default();
            let path = dir.join(atlas_file_name(&group.shader, slot));
            atlas
                .to_rgba8(color_space)
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|source| OutputError::Image {
                    path: path.clone(),
                    source,
                })?;
            info!(
                path = %path.display(),
                width = atlas.width(),
                height = atlas.height(),
                ?color_space,
                "wrote atlas"
            );
            written.push(path);
        }
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct JobReport {
    pub uvs: Vec<[f32; 2]>,
    pub submeshes: Vec<ReportSubmesh>,
    pub groups: Vec<ReportGroup>,
    pub retained: Vec<ReportRetained>,
    /// `(original, copy)` pairs for vertices split between materials.
    pub split_vertices: Vec<[u32; 2]>,
}

#[derive(Debug, Serialize)]
pub struct ReportSubmesh {
    pub material: String,
    pub triangles: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct ReportGroup {
    pub shader: String,
    pub material: String,
    pub atlases: Vec<String>,
    pub placements: Vec<ReportPlacement>,
    pub unfitted: Vec<String>,
    pub skipped: Vec<ReportSkipped>,
}

#[derive(Debug, Serialize)]
pub struct ReportPlacement {
    pub material: String,
    pub rect: [u32; 4],
    pub uv_origin: [f32; 2],
    pub uv_size: [f32; 2],
}

#[derive(Debug, Serialize)]
pub struct ReportSkipped {
    pub material: String,
    pub slot: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ReportRetained {
    pub material: String,
    pub shader: String,
    pub reason: String,
}

impl JobReport {
    pub fn new(mesh: &MeshData, report: &BuildReport) -> Self {
        let groups = report
            .groups
            .iter()
            .map(|group| ReportGroup {
                shader: group.shader.clone(),
                material: group.material.clone(),
                atlases: group
                    .output
                    .slots
                    .keys()
                    .map(|slot| atlas_file_name(&group.shader, slot))
                    .collect(),
                placements: group
                    .output
                    .placements
                    .iter()
                    .map(|p| ReportPlacement {
                        material: p.material.clone(),
                        rect: [p.rect.min.x, p.rect.min.y, p.rect.size.x, p.rect.size.y],
                        uv_origin: p.uv_rect.origin.to_array(),
                        uv_size: p.uv_rect.size.to_array(),
                    })
                    .collect(),
                unfitted: group.output.unfitted.clone(),
                skipped: group
                    .output
                    .skipped
                    .iter()
                    .map(|s| ReportSkipped {
                        material: s.material.clone(),
                        slot: s.slot.clone(),
                        error: s.error.to_string(),
                    })
                    .collect(),
            })
            .collect();

        let retained = report
            .retained
            .iter()
            .map(|r| ReportRetained {
                material: r.material.clone(),
                shader: r.shader.clone(),
                reason: match r.reason {
                    RetainReason::NoArchetype => "no archetype".to_string(),
                    RetainReason::Unfit => "unfit".to_string(),
                },
            })
            .collect();

        Self {
            uvs: mesh.uvs.iter().map(|uv| uv.to_array()).collect(),
            submeshes: mesh
                .submeshes
                .iter()
                .map(|s| ReportSubmesh {
                    material: s.material.clone(),
                    triangles: s.triangles.clone(),
                })
                .collect(),
            groups,
            retained,
            split_vertices: report
                .split_vertices
                .iter()
                .map(|split| [split.original, split.copy])
                .collect(),
        }
    }

    /// Writes the report to `dir/report.ron`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, OutputError> {
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty)?;

        let path = dir.join(REPORT_FILE_NAME);
        std::fs::write(&path, serialized).map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atlas_file_name_is_sanitized() {
        assert_eq!(atlas_file_name("Standard", "_MainTex"), "Standard__MainTex.png");
        assert_eq!(
            atlas_file_name("Custom/Lit Shader", "_Bump.Map"),
            "Custom_Lit_Shader__Bump_Map.png"
        );
    }

    #[test]
    fn test_empty_report_writes() {
        let dir = tempfile::tempdir().unwrap();
        let report = JobReport::new(&MeshData::default(), &BuildReport::default());
        let path = report.write(dir.path()).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("groups"));
        assert!(text.contains("retained"));
    }
}
