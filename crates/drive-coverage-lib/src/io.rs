//! GPX loading and error export
//!
//! Every track segment (`<trkseg>`) of a GPX document becomes one segment of the
//! collection, so multi-segment tracks are split into their single-part pieces.
//! Coordinates are projected to Web Mercator by default so that lengths and
//! distances are in meters; the exporter projects back to WGS84 on the way out.

use crate::{ErrorSet, Result, SegmentCollection, utils};

use geo::{Coord, LineString, Point};
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use rayon::prelude::*;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// How waypoint coordinates are turned into planar coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Project to Web Mercator meters (EPSG:3857)
    #[default]
    WebMercator,
    /// Keep raw longitude/latitude degrees (EPSG:4326)
    None,
}

impl Projection {
    /// CRS tag of collections loaded with this projection
    pub fn crs(self) -> &'static str {
        match self {
            Projection::WebMercator => utils::CRS_WEB_MERCATOR,
            Projection::None => utils::CRS_WGS84,
        }
    }

    fn project(self, waypoint: &Waypoint) -> Option<Coord<f64>> {
        let point = match self {
            Projection::WebMercator => utils::waypoint_to_mercator(waypoint),
            Projection::None => waypoint.point(),
        };

        let finite = point.x().is_finite() && point.y().is_finite();
        let in_bounds = match self {
            Projection::WebMercator => utils::is_valid_mercator(&point),
            Projection::None => true,
        };
        (finite && in_bounds).then(|| point.into())
    }
}

/// Extract one polyline per track segment of a parsed GPX document
///
/// Points that cannot be projected are skipped; track segments left without points
/// are dropped.
pub fn gpx_line_strings(gpx: &Gpx, projection: Projection) -> Vec<LineString<f64>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("io::gpx_line_strings");

    let mut lines = Vec::new();
    for (track_idx, track) in gpx.tracks.iter().enumerate() {
        for (segment_idx, segment) in track.segments.iter().enumerate() {
            let coords: Vec<Coord<f64>> = segment
                .points
                .iter()
                .filter_map(|waypoint| {
                    let coord = projection.project(waypoint);
                    if coord.is_none() {
                        tracing::warn!(
                            "Skipping point outside projection bounds: ({}, {})",
                            waypoint.point().y(),
                            waypoint.point().x()
                        );
                    }
                    coord
                })
                .collect();

            if coords.is_empty() {
                tracing::warn!(track_idx, segment_idx, "Skipping track segment without points");
                continue;
            }
            lines.push(LineString::new(coords));
        }
    }
    lines
}

/// Load a collection from a single GPX document
pub fn load_gpx<R: Read>(reader: R, projection: Projection) -> Result<SegmentCollection> {
    let gpx = gpx::read(BufReader::new(reader))?;
    SegmentCollection::from_line_strings(
        Some(projection.crs().to_owned()),
        gpx_line_strings(&gpx, projection),
    )
}

/// Load a collection from several GPX files
///
/// Files are parsed in parallel; segments are indexed in file order, then in document
/// order within each file.
pub fn load_gpx_files<P>(paths: &[P], projection: Projection) -> Result<SegmentCollection>
where
    P: AsRef<Path> + Sync,
{
    #[cfg(feature = "profiling")]
    profiling::scope!("io::load_gpx_files");

    let per_file: Result<Vec<Vec<LineString<f64>>>> = paths
        .par_iter()
        .map(|path| {
            let file = std::fs::File::open(path.as_ref())?;
            let gpx = gpx::read(BufReader::new(file))?;
            let lines = gpx_line_strings(&gpx, projection);
            tracing::debug!(
                "Loaded {} track segments from {}",
                lines.len(),
                path.as_ref().display()
            );
            Ok(lines)
        })
        .collect();

    let collection = SegmentCollection::from_line_strings(
        Some(projection.crs().to_owned()),
        per_file?.into_iter().flatten(),
    )?;

    let info = collection.get_info();
    tracing::info!(
        "Loaded {} segments ({} points, {} degenerate) from {} files",
        info.segment_count,
        info.total_points,
        info.degenerate_count,
        paths.len()
    );
    Ok(collection)
}

/// Convert a planar coordinate back to a GPX waypoint according to the CRS tag
fn coord_to_waypoint(coord: Coord<f64>, crs: Option<&str>) -> Waypoint {
    match crs {
        Some(utils::CRS_WEB_MERCATOR) => {
            let (lat, lon) = utils::mercator_to_wgs84(coord.x, coord.y);
            Waypoint::new(Point::new(lon, lat))
        }
        _ => Waypoint::new(Point::from(coord)),
    }
}

/// Build a GPX document with one track per flagged segment
pub fn errors_to_gpx(errors: &ErrorSet) -> Gpx {
    match errors.crs() {
        Some(utils::CRS_WEB_MERCATOR) | Some(utils::CRS_WGS84) | None => {}
        Some(crs) => {
            tracing::warn!("Exporting {crs} coordinates unchanged as GPX longitude/latitude")
        }
    }

    let tracks = errors
        .iter()
        .map(|flagged| {
            let mut segment = TrackSegment::default();
            segment.points = flagged
                .geometry
                .coords()
                .map(|coord| coord_to_waypoint(*coord, errors.crs()))
                .collect();

            let mut track = Track::default();
            track.name = Some(format!("segment {}", flagged.index));
            track.description = Some(match flagged.orientation_deg {
                Some(angle) => format!("{:?} | Angle: {:.2}°", flagged.kind, angle),
                None => format!("{:?}", flagged.kind),
            });
            track.segments.push(segment);
            track
        })
        .collect();

    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some(concat!("drive-coverage ", env!("CARGO_PKG_VERSION")).to_owned());
    gpx.tracks = tracks;
    gpx
}

/// Write the error set as a GPX document
pub fn write_errors_gpx<W: Write>(errors: &ErrorSet, writer: W) -> Result<()> {
    gpx::write(&errors_to_gpx(errors), writer)?;
    Ok(())
}

/// Write the error set to a GPX file, replacing any existing file
pub fn save_errors_gpx<P: AsRef<Path>>(errors: &ErrorSet, path: P) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    write_errors_gpx(errors, &mut writer)?;
    writer.flush()?;
    tracing::info!(
        "Wrote {} error segments to {}",
        errors.len(),
        path.as_ref().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoverageChecker, ErrorKind};

    fn create_test_waypoint(lat: f64, lon: f64) -> Waypoint {
        Waypoint::new(Point::new(lon, lat))
    }

    /// Two opposite lanes roughly 4 m apart and a lone side street, near Madrid
    fn create_test_gpx() -> Gpx {
        let mut gpx = Gpx::default();
        gpx.version = GpxVersion::Gpx11;

        let mut track = Track::default();
        let mut outbound = TrackSegment::default();
        outbound.points.push(create_test_waypoint(40.41680, -3.70380));
        outbound.points.push(create_test_waypoint(40.41680, -3.70280));
        let mut inbound = TrackSegment::default();
        inbound.points.push(create_test_waypoint(40.41683, -3.70280));
        inbound.points.push(create_test_waypoint(40.41683, -3.70380));
        track.segments.push(outbound);
        track.segments.push(inbound);
        gpx.tracks.push(track);

        let mut side = Track::default();
        let mut street = TrackSegment::default();
        street.points.push(create_test_waypoint(40.41800, -3.70100));
        street.points.push(create_test_waypoint(40.41900, -3.70100));
        side.segments.push(street);
        side.segments.push(TrackSegment::default());
        gpx.tracks.push(side);

        gpx
    }

    fn gpx_bytes(gpx: &Gpx) -> Vec<u8> {
        let mut bytes = Vec::new();
        gpx::write(gpx, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_load_splits_track_segments() {
        let bytes = gpx_bytes(&create_test_gpx());
        let collection = load_gpx(bytes.as_slice(), Projection::WebMercator).unwrap();

        // Empty track segment dropped
        assert_eq!(collection.len(), 3);
        assert_eq!(collection.crs(), Some(utils::CRS_WEB_MERCATOR));

        // ~85 m of longitude at this latitude, in Mercator meters (~111 m)
        let length = collection[0].length();
        assert!(length > 100.0 && length < 120.0, "length was {length}");
    }

    #[test]
    fn test_load_without_projection_keeps_degrees() {
        let bytes = gpx_bytes(&create_test_gpx());
        let collection = load_gpx(bytes.as_slice(), Projection::None).unwrap();

        assert_eq!(collection.crs(), Some(utils::CRS_WGS84));
        let first = collection[0].geometry().0[0];
        assert!((first.x - -3.70380).abs() < 1e-9);
        assert!((first.y - 40.41680).abs() < 1e-9);
    }

    #[test]
    fn test_load_invalid_document_fails() {
        let result = load_gpx("not a gpx document".as_bytes(), Projection::WebMercator);
        assert!(matches!(result, Err(crate::DataError::GpxParse(_))));
    }

    #[test]
    fn test_load_files_preserves_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.gpx");
        let second = dir.path().join("second.gpx");
        std::fs::write(&first, gpx_bytes(&create_test_gpx())).unwrap();

        let mut single = Gpx::default();
        single.version = GpxVersion::Gpx11;
        let mut track = Track::default();
        let mut segment = TrackSegment::default();
        segment.points.push(create_test_waypoint(10.0, 10.0));
        segment.points.push(create_test_waypoint(10.001, 10.0));
        track.segments.push(segment);
        single.tracks.push(track);
        std::fs::write(&second, gpx_bytes(&single)).unwrap();

        let collection = load_gpx_files(&[&first, &second], Projection::None).unwrap();
        assert_eq!(collection.len(), 4);
        assert!((collection[3].geometry().0[0].y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.gpx");
        let result = load_gpx_files(&[missing], Projection::WebMercator);
        assert!(matches!(result, Err(crate::DataError::Io(_))));
    }

    #[test]
    fn test_export_reprojects_errors() {
        let bytes = gpx_bytes(&create_test_gpx());
        let collection = load_gpx(bytes.as_slice(), Projection::WebMercator).unwrap();
        let report = CoverageChecker::default().check(&collection).unwrap();

        // Only the side street lacks a counterpart
        assert_eq!(report.errors.indices(), vec![2]);
        assert_eq!(report.errors.entries()[0].kind, ErrorKind::Uncovered);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.gpx");
        save_errors_gpx(&report.errors, &path).unwrap();

        let written = gpx::read(BufReader::new(std::fs::File::open(&path).unwrap())).unwrap();
        assert_eq!(written.tracks.len(), 1);
        assert_eq!(written.tracks[0].name.as_deref(), Some("segment 2"));

        let points = &written.tracks[0].segments[0].points;
        assert_eq!(points.len(), 2);
        assert!((points[0].point().y() - 40.41800).abs() < 1e-6);
        assert!((points[0].point().x() - -3.70100).abs() < 1e-6);
    }

    #[test]
    fn test_export_empty_error_set() {
        let mut bytes = Vec::new();
        write_errors_gpx(&ErrorSet::default(), &mut bytes).unwrap();

        let written = gpx::read(bytes.as_slice()).unwrap();
        assert!(written.tracks.is_empty());
    }
}
