//! JSON report of a coverage run
//!
//! Alongside the raw geometry, each error carries its centroid in WGS84
//! latitude/longitude so it can be located on a map without reprojecting.

use anyhow::{Context, Result};
use drive_coverage_lib::utils::{CRS_WEB_MERCATOR, CRS_WGS84, mercator_to_wgs84};
use drive_coverage_lib::{
    CollectionInfo, CoverageConfig, CoverageReport, ErrorKind, FlaggedSegment,
};
use geo::Centroid;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// One erroneous segment
#[derive(Serialize, Debug, Clone)]
pub struct ErrorEntry {
    pub index: usize,
    pub kind: ErrorKind,
    pub orientation_deg: Option<f64>,
    /// Length in CRS units
    pub length: f64,
    /// Centroid in WGS84, when the CRS can be converted
    pub centroid: Option<LatLon>,
    /// Points in CRS units, `[x, y]`
    pub coordinates: Vec<[f64; 2]>,
}

impl ErrorEntry {
    fn new(flagged: &FlaggedSegment, crs: Option<&str>) -> Self {
        let centroid = flagged
            .geometry
            .centroid()
            .and_then(|point| match crs {
                Some(CRS_WEB_MERCATOR) => {
                    let (lat, lon) = mercator_to_wgs84(point.x(), point.y());
                    Some(LatLon { lat, lon })
                }
                Some(CRS_WGS84) => Some(LatLon {
                    lat: point.y(),
                    lon: point.x(),
                }),
                _ => None,
            });

        Self {
            index: flagged.index,
            kind: flagged.kind,
            orientation_deg: flagged.orientation_deg,
            length: flagged.length,
            centroid,
            coordinates: flagged.geometry.coords().map(|c| [c.x, c.y]).collect(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Summary {
    pub checked: usize,
    pub covered: usize,
    pub uncovered: usize,
    pub degenerate: usize,
    pub elapsed_ms: f64,
}

/// Everything written to `--output-json`
#[derive(Serialize, Debug, Clone)]
pub struct JsonReport {
    pub crs: Option<String>,
    pub config: CoverageConfig,
    pub input: CollectionInfo,
    pub summary: Summary,
    pub errors: Vec<ErrorEntry>,
}

impl JsonReport {
    pub fn new(report: &CoverageReport, input: CollectionInfo, config: &CoverageConfig) -> Self {
        let crs = report.errors.crs();
        Self {
            crs: crs.map(str::to_owned),
            config: config.clone(),
            input,
            summary: Summary {
                checked: report.checked,
                covered: report.covered,
                uncovered: report.uncovered,
                degenerate: report.degenerate,
                elapsed_ms: report.elapsed.as_secs_f64() * 1000.0,
            },
            errors: report
                .errors
                .iter()
                .map(|flagged| ErrorEntry::new(flagged, crs))
                .collect(),
        }
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self).context("Failed to serialize JSON report")
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Wrote JSON report to {}", path.display());
        Ok(())
    }
}
