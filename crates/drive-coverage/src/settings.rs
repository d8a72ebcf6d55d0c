use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use drive_coverage_lib::io::Projection;
use drive_coverage_lib::{CoverageConfig, CoverageMode};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Evaluation strategy for the covering relation
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Each segment looks for its own counterpart (first match wins)
    Independent,
    /// Every pair is tested once and a match covers both segments
    Symmetric,
}

impl From<Mode> for CoverageMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Independent => CoverageMode::Independent,
            Mode::Symmetric => CoverageMode::Symmetric,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Drive Coverage - report road segments that lack an opposite-direction counterpart
pub struct Settings {
    /// GPX files to check; every track segment is one road segment
    #[clap(value_name = "FILE", required = true)]
    pub gpx_files: Vec<PathBuf>,

    /// Angular tolerance in degrees (accepted for compatibility, matching uses --parallel-threshold)
    #[clap(long, default_value = "30.0")]
    pub angle_threshold: f64,

    /// Maximum orientation difference in degrees for two segments to count as parallel
    #[clap(short, long, default_value = "10.0")]
    pub parallel_threshold: f64,

    /// Allowed distance to the counterpart, as a fraction of the longer segment's length
    #[clap(short, long, default_value = "0.2")]
    pub distance_factor: f64,

    /// How the covering relation is evaluated
    #[clap(short, long, value_enum, default_value = "independent")]
    pub mode: Mode,

    /// Check segments on all CPU cores
    #[clap(long)]
    pub parallel: bool,

    /// Abort the check after this many seconds
    #[clap(long, value_name = "SECONDS")]
    pub timeout_secs: Option<f64>,

    /// Write the erroneous segments to this GPX file
    #[clap(long, value_name = "FILE")]
    pub output_gpx: Option<PathBuf>,

    /// Write a JSON report of the run to this file
    #[clap(long, value_name = "FILE")]
    pub output_json: Option<PathBuf>,

    /// Keep raw longitude/latitude degrees instead of projecting to Web Mercator meters
    #[clap(long)]
    pub no_projection: bool,

    /// More log output (repeatable)
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output (repeatable)
    #[clap(short, long, action = ArgAction::Count)]
    pub quiet: u8,
}

impl Settings {
    /// Checker configuration for a run that started at `started`
    pub fn coverage_config(&self, started: Instant) -> Result<CoverageConfig> {
        let deadline = self
            .timeout_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map(|timeout| started + timeout)
                    .with_context(|| format!("Invalid timeout: {secs} seconds"))
            })
            .transpose()?;

        let config = CoverageConfig {
            angle_threshold_deg: self.angle_threshold,
            parallel_threshold_deg: self.parallel_threshold,
            distance_factor: self.distance_factor,
            mode: self.mode.into(),
            parallel: self.parallel,
            deadline,
        };
        config.validate()?;
        Ok(config)
    }

    /// Projection applied to GPX coordinates on load
    pub fn projection(&self) -> Projection {
        if self.no_projection {
            Projection::None
        } else {
            Projection::WebMercator
        }
    }

    /// Default log level when `RUST_LOG` is not set
    pub fn log_level(&self) -> &'static str {
        match i16::from(self.verbose) - i16::from(self.quiet) {
            i16::MIN..=-2 => "error",
            -1 => "warn",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Settings {
        Settings::try_parse_from(std::iter::once("drive-coverage").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_command_is_well_formed() {
        Settings::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_library() {
        let settings = parse(&["roads.gpx"]);
        let config = settings.coverage_config(Instant::now()).unwrap();
        let defaults = CoverageConfig::default();

        assert_eq!(config.angle_threshold_deg, defaults.angle_threshold_deg);
        assert_eq!(config.parallel_threshold_deg, defaults.parallel_threshold_deg);
        assert_eq!(config.distance_factor, defaults.distance_factor);
        assert_eq!(config.mode, defaults.mode);
        assert_eq!(config.parallel, defaults.parallel);
        assert!(config.deadline.is_none());
        assert_eq!(settings.projection(), Projection::WebMercator);
        assert_eq!(settings.log_level(), "info");
    }

    #[test]
    fn test_requires_input_files() {
        assert!(Settings::try_parse_from(["drive-coverage"]).is_err());
    }

    #[test]
    fn test_all_flags() {
        let settings = parse(&[
            "a.gpx",
            "b.gpx",
            "-p",
            "5",
            "-d",
            "0.5",
            "--mode",
            "symmetric",
            "--parallel",
            "--timeout-secs",
            "2.5",
            "--no-projection",
            "-vv",
        ]);
        assert_eq!(settings.gpx_files.len(), 2);

        let started = Instant::now();
        let config = settings.coverage_config(started).unwrap();
        assert_eq!(config.parallel_threshold_deg, 5.0);
        assert_eq!(config.distance_factor, 0.5);
        assert_eq!(config.mode, CoverageMode::Symmetric);
        assert!(config.parallel);
        assert_eq!(config.deadline, Some(started + Duration::from_millis(2500)));
        assert_eq!(settings.projection(), Projection::None);
        assert_eq!(settings.log_level(), "trace");
    }

    #[test]
    fn test_quiet_lowers_log_level() {
        assert_eq!(parse(&["a.gpx", "-q"]).log_level(), "warn");
        assert_eq!(parse(&["a.gpx", "-qqq"]).log_level(), "error");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let settings = parse(&["a.gpx", "--timeout-secs=-1"]);
        assert!(settings.coverage_config(Instant::now()).is_err());

        let settings = parse(&["a.gpx", "--parallel-threshold", "120"]);
        assert!(settings.coverage_config(Instant::now()).is_err());
    }
}
