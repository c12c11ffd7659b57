//! The `texsmash` command: loads a job, atlases its mesh, and writes the results.

pub mod job;
pub mod output;
pub mod platform;

use std::path::{Path, PathBuf};

use glam::UVec2;
use texsmash_atlas::{BuildSettings, DriverError, GroupSettings, build_atlases};
use texsmash_config::{Config, ConfigError};
use thiserror::Error;
use tracing::{info, warn};

use crate::job::JobError;
use crate::output::{JobReport, OutputError};
use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// What a finished run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub atlases: Vec<PathBuf>,
    pub report: Option<PathBuf>,
    pub retained: usize,
}

/// Packer settings taken from the config.
pub fn build_settings(config: &Config) -> BuildSettings {
    BuildSettings {
        canvas: UVec2::new(config.atlas.width, config.atlas.height),
        group: GroupSettings {
            skip_distance: config.atlas.skip_distance,
            min_cell_size: UVec2::splat(config.atlas.min_cell_size),
            max_atlas_size: UVec2::splat(config.atlas.max_atlas_size),
        },
    }
}

/// Runs one job end to end.
pub fn run(job_path: &Path, config: &Config) -> Result<RunSummary, AppError> {
    config.validate()?;

    let mut job = job::load(job_path)?;
    let report = build_atlases(
        &mut job.mesh,
        &job.materials,
        &job.registry,
        &build_settings(config),
    )?;

    for retained in &report.retained {
        warn!(
            material = retained.material.as_str(),
            shader = retained.shader.as_str(),
            reason = ?retained.reason,
            "submesh kept on its own material"
        );
    }

    let dir = &config.output.directory;
    let atlases = output::write_atlases(&report, &job.registry, dir)?;
    let report_path = if config.output.write_report {
        Some(JobReport::new(&job.mesh, &report).write(dir)?)
    } else {
        None
    };

    info!(
        atlases = atlases.len(),
        retained = report.retained.len(),
        output = %dir.display(),
        "job finished"
    );
    Ok(RunSummary {
        atlases,
        report: report_path,
        retained: report.retained.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"(
    materials: [
        (
            name: "red",
            shader: "Standard",
            colors: { "_Color": (1.0, 1.0, 1.0, 1.0) },
            textures: { "_MainTex": Some((path: "red.png")) },
        ),
        (
            name: "blue",
            shader: "Standard",
            colors: { "_Color": (0.0, 0.0, 1.0, 1.0) },
            textures: { "_MainTex": None },
        ),
        (name: "glass", shader: "Glass"),
    ],
    mesh: (
        uvs: [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.5, 0.5)],
        submeshes: [
            (material: "red", triangles: [0, 1, 2]),
            (material: "blue", triangles: [2, 1, 3]),
            (material: "glass", triangles: [4, 3, 2]),
        ],
    ),
)"#;

    fn config(out: &Path) -> Config {
        let mut config = Config::default();
        config.atlas.width = 64;
        config.atlas.height = 64;
        config.output.directory = out.to_path_buf();
        config
    }

    #[test]
    fn test_run_writes_atlases_and_report() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbaImage::from_pixel(16, 16, image::Rgba([255, 0, 0, 255]))
            .save(dir.path().join("red.png"))
            .unwrap();
        let job_path = dir.path().join("job.ron");
        std::fs::write(&job_path, JOB).unwrap();
        let out = dir.path().join("out");

        let summary = run(&job_path, &config(&out)).unwrap();

        assert_eq!(summary.atlases, vec![out.join("Standard__MainTex.png")]);
        assert_eq!(summary.retained, 1);

        let atlas = image::open(&summary.atlases[0]).unwrap().to_rgba8();
        assert_eq!(atlas.dimensions(), (64, 64));
        // red is the larger cell and lands at the origin; blue follows on the same row.
        assert_eq!(atlas.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(atlas.get_pixel(16, 0).0, [0, 0, 255, 255]);
        assert_eq!(atlas.get_pixel(40, 40).0, [0, 0, 0, 0]);

        let report = std::fs::read_to_string(summary.report.unwrap()).unwrap();
        assert!(report.contains("Standard_atlas"));
        assert!(report.contains("no archetype"));

        // blue and glass both reuse vertices of earlier materials.
        #[derive(serde::Deserialize)]
        struct Splits {
            split_vertices: Vec<[u32; 2]>,
        }
        let splits: Splits = ron::from_str(&report).unwrap();
        assert_eq!(splits.split_vertices, vec![[2, 5], [1, 6], [3, 7], [2, 8]]);
    }

    #[test]
    fn test_invalid_config_fails_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.atlas.skip_distance = 0;

        let result = run(&dir.path().join("missing.ron"), &config);
        assert!(matches!(result, Err(AppError::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn test_build_settings_from_config() {
        let mut config = Config::default();
        config.atlas.min_cell_size = 2;
        let settings = build_settings(&config);
        assert_eq!(settings.canvas, UVec2::splat(4096));
        assert_eq!(settings.group.skip_distance, 8);
        assert_eq!(settings.group.min_cell_size, UVec2::splat(2));
        assert_eq!(settings.group.max_atlas_size, UVec2::splat(8192));
    }
}
