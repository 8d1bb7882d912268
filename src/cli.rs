//! Defines command-line interface options using `clap` for the timelapse-tools binary.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use timelapse_tools::driver::parse_fixed;
use timelapse_tools::{AxisSelection, DimensionTag, IndexRange, Selector};

/// Inspect and reduce large microscopy timelapse stacks
#[derive(Parser, Debug)]
#[command(
    name = "timelapse-tools",
    version,
    about = "Lazy access and streaming reductions over microscopy timelapse stacks"
)]
pub struct Args {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Number of threads for parallel plane reads. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the file summary and lazy array layout
    Describe {
        /// Path to the stack file
        file: PathBuf,
    },

    /// Stream one dimension and report the global intensity range
    Minmax {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Stream one dimension and report per-step intensity distributions
    Distribution {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Stream one dimension and report 8-bit normalized intensities per step
    Normalize {
        #[command(flatten)]
        run: RunArgs,

        /// Lower and upper percentile, formatted as <low>:<high>
        #[arg(long, value_parser = parse_percentiles, default_value = "50.0:99.8")]
        percentiles: (f64, f64),
    },

    /// Stream one dimension and max-project every step along one axis
    Project {
        #[command(flatten)]
        run: RunArgs,

        /// Axis to project along
        #[arg(short, long, value_parser = parse_tag, default_value = "Z")]
        axis: DimensionTag,
    },

    /// Read a selection of the lazy array and print its statistics
    Materialize {
        /// Path to the stack file
        file: PathBuf,

        /// Axis selection, formatted as <tag>=<index> or <tag>=<start>:<stop>[:<step>]
        #[arg(short, long = "select", value_parser = parse_selection)]
        selections: Vec<(DimensionTag, AxisSelection)>,
    },

    /// Write a synthetic stack file
    Synth {
        /// Output path
        output: PathBuf,

        /// Layout such as S1T5C2Y64X64; a tag may carry @begin, e.g. T5@10
        #[arg(short, long, default_value = "T5Y64X64")]
        layout: String,

        /// Element type
        #[arg(short, long, value_enum, default_value_t = SynthType::Uint16)]
        dtype: SynthType,

        /// Pixel pattern
        #[arg(short, long, value_enum, default_value_t = Pattern::Time)]
        pattern: Pattern,
    },
}

/// Options shared by the streaming commands
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to the stack file
    pub file: PathBuf,

    /// Operating dimension to stream over
    #[arg(short, long, value_parser = parse_tag, default_value = "T")]
    pub dim: DimensionTag,

    /// Absolute index range of the operating dimension, formatted as <start>:<stop>[:<step>]
    #[arg(short, long, value_parser = parse_range)]
    pub range: Option<IndexRange>,

    /// Fixed selector, formatted as <tag>=<index> or <tag>=<start>:<stop>[:<step>]
    #[arg(short, long = "fix", value_parser = parse_fixed_arg)]
    pub fixed: Vec<(DimensionTag, Selector)>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthType {
    Uint8,
    Uint16,
    Uint32,
    Float32,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// Every pixel holds its time index
    Time,
    /// Diagonal ramp offset by time, channel and depth
    Ramp,
    /// Deterministic pseudo-random noise
    Noise,
}

fn parse_tag(s: &str) -> Result<DimensionTag, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_range(s: &str) -> Result<IndexRange, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_fixed_arg(s: &str) -> Result<(DimensionTag, Selector), String> {
    parse_fixed(s).map_err(|e| format!("{e}"))
}

fn parse_selection(s: &str) -> Result<(DimensionTag, AxisSelection), String> {
    let (tag, selection) = s
        .split_once('=')
        .ok_or_else(|| "Invalid format: Expected '<tag>=<selection>'.".to_string())?;
    let tag = parse_tag(tag)?;
    let selection = selection.parse().map_err(|e| format!("{e}"))?;
    Ok((tag, selection))
}

fn parse_percentiles(s: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [low, high] => {
            let low = low
                .trim()
                .parse()
                .map_err(|_| format!("Invalid lower percentile '{low}'"))?;
            let high = high
                .trim()
                .parse()
                .map_err(|_| format!("Invalid upper percentile '{high}'"))?;
            Ok((low, high))
        }
        _ => Err("Invalid format: Expected '<low>:<high>'.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            parse_selection("t=2").unwrap(),
            (DimensionTag::Time, AxisSelection::Index(2))
        );
        assert_eq!(
            parse_selection("Z=1:3").unwrap(),
            (DimensionTag::Depth, AxisSelection::Range(IndexRange::new(1, 3)))
        );
        assert!(parse_selection("Q=1").is_err());
        assert!(parse_selection("T").is_err());
    }

    #[test]
    fn test_parse_percentiles() {
        assert_eq!(parse_percentiles("2:98").unwrap(), (2.0, 98.0));
        assert!(parse_percentiles("2").is_err());
    }

    #[test]
    fn test_project_defaults_to_depth() {
        let args = Args::try_parse_from(["timelapse-tools", "project", "movie.tls", "-f", "C=0"]).unwrap();
        match args.command {
            Command::Project { run, axis } => {
                assert_eq!(axis, DimensionTag::Depth);
                assert_eq!(run.dim, DimensionTag::Time);
                assert_eq!(run.fixed, vec![(DimensionTag::Channel, Selector::Index(0))]);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let args = Args::try_parse_from(["timelapse-tools", "project", "movie.tls", "--axis", "y"]).unwrap();
        assert!(matches!(args.command, Command::Project { axis: DimensionTag::Y, .. }));
    }
}
