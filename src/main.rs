//! Entry point for the timelapse-tools application.
//! Handles CLI parsing, logging setup, and dispatches each subcommand over the stack file's element type.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timelapse_tools::processors::{
    IntensityDistribution, MaxProject, MinMaxFinder, PercentileNormalize,
};
use timelapse_tools::{
    build_lazy_array, open_any, run, run_with, summarize, write_stack_file, AnyStackFile,
    DimensionMap, DimensionTag, FileHandle, ParallelConfig, Pixel, ReadSelectors, Result,
    RunOptions, StackFile, SyntheticFile, TracingSink,
};

mod cli;

use cli::{Args, Command, Pattern, RunArgs, SynthType};

/// Run a generic command body over whichever element type the file stores
macro_rules! with_stack_file {
    ($any:expr, $file:ident => $body:expr) => {
        match $any {
            AnyStackFile::Uint8($file) => $body,
            AnyStackFile::Uint16($file) => $body,
            AnyStackFile::Uint32($file) => $body,
            AnyStackFile::Float32($file) => $body,
        }
    };
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    println!(
        r#"
------------------------------------------------------------------
                       timelapse-tools
        lazy access and streaming reductions for timelapses
------------------------------------------------------------------
"#
    );

    match dispatch(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "timelapse_tools=debug"
    } else {
        "timelapse_tools=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn dispatch(args: &Args) -> Result<()> {
    let parallel = match args.threads {
        Some(n) => ParallelConfig::with_threads(n),
        None => ParallelConfig::all_cores(),
    };

    match &args.command {
        Command::Describe { file } => describe(file),
        Command::Minmax { run } => {
            with_stack_file!(open_any(&run.file)?, file => minmax(&file, run))
        }
        Command::Distribution { run } => {
            with_stack_file!(open_any(&run.file)?, file => distribution(&file, run))
        }
        Command::Normalize { run, percentiles } => {
            with_stack_file!(open_any(&run.file)?, file => normalize(&file, run, *percentiles))
        }
        Command::Project { run, axis } => {
            with_stack_file!(open_any(&run.file)?, file => project(&file, run, *axis))
        }
        Command::Materialize { file, selections } => {
            with_stack_file!(open_any(file)?, f => materialize(f, selections, parallel))
        }
        Command::Synth {
            output,
            layout,
            dtype,
            pattern,
        } => match dtype {
            SynthType::Uint8 => synth::<u8>(output, layout, *pattern),
            SynthType::Uint16 => synth::<u16>(output, layout, *pattern),
            SynthType::Uint32 => synth::<u32>(output, layout, *pattern),
            SynthType::Float32 => synth::<f32>(output, layout, *pattern),
        },
    }
}

fn run_options(args: &RunArgs) -> RunOptions {
    let mut options = RunOptions::new(args.dim);
    if let Some(range) = args.range {
        options = options.with_range(range);
    }
    for &(tag, selector) in &args.fixed {
        options = options.fix(tag, selector);
    }
    options
}

fn describe(path: &Path) -> Result<()> {
    let summary = summarize(path)?;
    println!("{summary}");

    with_stack_file!(open_any(path)?, file => {
        let array = build_lazy_array(Arc::new(file))?;
        println!("Array dims: {}", array.dims_string());
        println!("Array shape: {:?}", array.shape());
        println!("Planes: {}", array.plane_count());
    });
    Ok(())
}

fn minmax<T: Pixel>(file: &StackFile<T>, args: &RunArgs) -> Result<()> {
    println!("🔄 Streaming '{}' of {}", args.dim, file.identifier());
    let finder = run(file, MinMaxFinder::new(), &run_options(args), TracingSink)?;

    match finder.range() {
        Some((min, max)) => {
            println!("✅ Processed {} steps", finder.steps());
            println!("   Minimum intensity: {min}");
            println!("   Maximum intensity: {max}");
        }
        None => println!("⚠️  No steps in the selected range"),
    }
    Ok(())
}

fn distribution<T: Pixel>(file: &StackFile<T>, args: &RunArgs) -> Result<()> {
    println!("🔄 Computing intensity distributions over '{}'", args.dim);
    let processor = IntensityDistribution::new(args.dim);
    let distribution = run(file, processor, &run_options(args), TracingSink)?;

    let (Some(histogram), Some(offset)) =
        (distribution.histogram(), distribution.histogram_offset())
    else {
        println!("⚠️  No steps in the selected range");
        return Ok(());
    };

    let begin = file
        .header()
        .dims
        .get(args.dim)
        .map_or(0, |bounds| bounds.begin);
    for index in distribution.filled_indices() {
        let counts = histogram.row(index - begin);
        let (mode, peak) = counts
            .iter()
            .enumerate()
            .max_by_key(|(_, count)| **count)
            .map_or((0, 0), |(bin, &count)| (bin as i64 + offset, count));
        let x_median = distribution
            .profile(DimensionTag::X)
            .map(|profile| profile.column(index - begin).mean().unwrap_or(f64::NAN));
        println!(
            "   {}={index}: mode {mode} ({peak} px), mean X-median profile {}",
            args.dim,
            x_median.map_or_else(|| "n/a".to_string(), |m| format!("{m:.2}"))
        );
    }
    Ok(())
}

fn normalize<T: Pixel>(file: &StackFile<T>, args: &RunArgs, percentiles: (f64, f64)) -> Result<()> {
    let normalizer = PercentileNormalize::new(percentiles.0, percentiles.1)?;
    println!(
        "🔄 Normalizing '{}' between percentiles {} and {}",
        args.dim,
        normalizer.low(),
        normalizer.high()
    );

    run_with(file, normalizer, &run_options(args), TracingSink, |index, slice| {
        let saturated = slice.iter().filter(|&&v| v == u8::MAX).count();
        let mean = slice.iter().map(|&v| f64::from(v)).sum::<f64>() / slice.len().max(1) as f64;
        println!(
            "   {}={index}: mean {mean:.1}, {saturated} of {} px saturated",
            args.dim,
            slice.len()
        );
        Ok(())
    })?;
    Ok(())
}

fn project<T: Pixel>(file: &StackFile<T>, args: &RunArgs, axis: DimensionTag) -> Result<()> {
    println!("🔄 Max-projecting along '{axis}' for every '{}' step", args.dim);

    run_with(file, MaxProject::new(axis), &run_options(args), TracingSink, |index, projection| {
        let mut finder = MinMaxFinder::new();
        finder.update(&projection);
        let peak = finder
            .max()
            .map_or_else(|| "n/a".to_string(), |max| max.to_string());
        println!(
            "   {}={index}: projection shape {:?}, peak {peak}",
            args.dim,
            projection.shape()
        );
        Ok(())
    })?;
    Ok(())
}

fn materialize<T: Pixel>(
    file: StackFile<T>,
    selections: &[(DimensionTag, timelapse_tools::AxisSelection)],
    parallel: ParallelConfig,
) -> Result<()> {
    let mut array = build_lazy_array(Arc::new(file))?;
    for &(tag, selection) in selections {
        array = array.select(tag, selection)?;
    }
    println!(
        "🔄 Reading {} planes for dims {} with shape {:?}",
        array.plane_count(),
        array.dims_string(),
        array.shape()
    );

    let pool = parallel.build_pool()?;
    let data = array.materialize_in(&pool)?;

    let mut finder = MinMaxFinder::new();
    finder.update(&data);
    let mean = data.iter().filter_map(|v| v.to_f64()).sum::<f64>() / data.len().max(1) as f64;
    println!("✅ Materialized {} elements", data.len());
    if let Some((min, max)) = finder.range() {
        println!("   Minimum: {min}");
        println!("   Maximum: {max}");
    }
    println!("   Mean: {mean:.3}");
    Ok(())
}

fn synth<T: Pixel + num_traits::NumCast>(output: &Path, layout: &str, pattern: Pattern) -> Result<()> {
    let dims = DimensionMap::from_spec(layout)?;
    let generator = move |c: &timelapse_tools::PixelCoords| -> T {
        let value = match pattern {
            Pattern::Time => c.index(DimensionTag::Time) as f64,
            Pattern::Ramp => (c.index(DimensionTag::Y)
                + c.index(DimensionTag::X)
                + 10 * c.index(DimensionTag::Time)
                + 100 * c.index(DimensionTag::Channel)
                + 1000 * c.index(DimensionTag::Depth)) as f64,
            Pattern::Noise => {
                let mut h = (c.index(DimensionTag::Time) as u64) << 40
                    ^ (c.index(DimensionTag::Channel) as u64) << 32
                    ^ (c.index(DimensionTag::Y) as u64) << 16
                    ^ c.index(DimensionTag::X) as u64;
                h = h.wrapping_mul(0x9E37_79B9_7F4A_7C15);
                ((h >> 56) & 0xFF) as f64
            }
        };
        num_traits::cast(value).unwrap_or_else(T::max_value)
    };

    let file = SyntheticFile::new(dims.clone(), generator);
    let data = file.read(&ReadSelectors::new())?.data;
    let header = write_stack_file(output, &dims, &data)?;
    println!(
        "✅ Wrote {} {} elements to {}",
        header.element_count(),
        header.dtype,
        output.display()
    );
    Ok(())
}
