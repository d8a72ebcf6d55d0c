//! Drive Coverage - command-line checker for bidirectional road coverage
//!
//! Loads road segments from GPX files, flags every segment without a nearby,
//! nearly parallel counterpart and optionally exports the flagged segments as GPX
//! and a JSON report.

mod logging;
mod report;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use drive_coverage_lib::{CoverageChecker, CoverageReport, io};
use report::JsonReport;
use settings::Settings;
use std::time::Instant;

fn main() -> Result<()> {
    let settings = Settings::parse();
    let _logging = logging::setup_logging(settings.log_level());

    let report = run(&settings)?;
    println!(
        "{} of {} segments lack an opposite-direction counterpart ({} degenerate)",
        report.errors.len(),
        report.checked,
        report.degenerate
    );
    Ok(())
}

/// Load, check and export according to the settings
fn run(settings: &Settings) -> Result<CoverageReport> {
    #[cfg(feature = "profiling")]
    profiling::scope!("main::run");

    let started = Instant::now();
    let config = settings.coverage_config(started)?;

    let collection = io::load_gpx_files(&settings.gpx_files, settings.projection())
        .context("Failed to load GPX input")?;
    collection.ensure_not_empty()?;

    let checker = CoverageChecker::new(config);
    let report = checker
        .check(&collection)
        .context("Coverage check failed")?;

    if let Some(path) = &settings.output_gpx {
        io::save_errors_gpx(&report.errors, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if let Some(path) = &settings.output_json {
        JsonReport::new(&report, collection.get_info(), checker.config()).save(path)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_coverage_lib::DataError;
    use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
    use std::path::{Path, PathBuf};

    /// Write a GPX file with one track segment per polyline of (lat, lon) points
    fn write_gpx(path: &Path, segments: &[&[(f64, f64)]]) {
        let mut gpx = Gpx::default();
        gpx.version = GpxVersion::Gpx11;
        let mut track = Track::default();
        for points in segments {
            let mut segment = TrackSegment::default();
            for &(lat, lon) in *points {
                segment
                    .points
                    .push(Waypoint::new(geo::Point::new(lon, lat)));
            }
            track.segments.push(segment);
        }
        gpx.tracks.push(track);
        gpx::write(&gpx, std::fs::File::create(path).unwrap()).unwrap();
    }

    fn settings_for(files: Vec<PathBuf>, extra: &[&str]) -> Settings {
        let mut args = vec!["drive-coverage".to_string()];
        args.extend(files.iter().map(|p| p.display().to_string()));
        args.extend(extra.iter().map(|s| s.to_string()));
        Settings::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_run_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("roads.gpx");
        write_gpx(
            &input,
            &[
                &[(51.50000, -0.12800), (51.50000, -0.12700)],
                &[(51.50003, -0.12700), (51.50003, -0.12800)],
                &[(51.50100, -0.12500), (51.50200, -0.12500)],
            ],
        );
        let gpx_out = dir.path().join("errors.gpx");
        let json_out = dir.path().join("errors.json");

        let settings = settings_for(
            vec![input],
            &[
                "--output-gpx",
                gpx_out.to_str().unwrap(),
                "--output-json",
                json_out.to_str().unwrap(),
                "--parallel",
            ],
        );
        let report = run(&settings).unwrap();
        assert_eq!(report.errors.indices(), vec![2]);

        let written = gpx::read(std::fs::File::open(&gpx_out).unwrap()).unwrap();
        assert_eq!(written.tracks.len(), 1);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_out).unwrap()).unwrap();
        assert_eq!(json["errors"].as_array().unwrap().len(), 1);
        assert!((json["errors"][0]["centroid"]["lon"].as_f64().unwrap() - -0.125).abs() < 1e-6);
    }

    #[test]
    fn test_run_empty_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.gpx");
        write_gpx(&input, &[]);

        let err = run(&settings_for(vec![input], &[])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::EmptyInput)
        ));
    }

    #[test]
    fn test_run_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&settings_for(vec![dir.path().join("nope.gpx")], &[])).unwrap_err();
        assert!(err.to_string().contains("Failed to load GPX input"));
    }
}
