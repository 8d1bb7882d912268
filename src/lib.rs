//! timelapse-tools: lazy access and streaming reductions for microscopy timelapses
//!
//! Multi-dimensional timelapse files (scene, time, channel, depth and two
//! spatial axes) are usually far too large to load at once. This library
//! exposes them two ways:
//!
//! - as a lazily evaluated N-D array that can be sliced freely and only reads
//!   the planes a caller actually materializes, and
//! - as a streaming driver that walks one dimension index by index and feeds
//!   each read to a stateful [`Processor`](processors::Processor).
//!
//! ## Module Organization
//!
//! - [`dimensions`]: dimension tags and the canonical dimension descriptor
//! - [`file_handle`]: the file collaborator trait and pixel element types
//! - [`plane`]: single plane reads and selectors
//! - [`lazy_array`]: the lazily evaluated array
//! - [`driver`]: the sequential streaming driver
//! - [`processors`]: min/max, intensity distribution, normalization and projection processors
//! - [`stream`]: async step stream over the same driver plan
//! - [`diagnostics`]: structured run diagnostics and sinks
//! - [`stack_file`]: the on-disk stack file format
//! - [`synthetic`]: closure-backed in-memory files
//! - [`summary`]: human readable file summaries
//! - [`parallel`]: thread pool configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage Examples
//!
//! ### Streaming reduction
//! ```rust
//! use timelapse_tools::prelude::*;
//!
//! // Every pixel of timepoint t holds t
//! let file = SyntheticFile::<u16>::from_spec("T5Y2X2", |c| c.index(DimensionTag::Time) as u16).unwrap();
//! let finder = run(&file, MinMaxFinder::new(), &RunOptions::new(DimensionTag::Time), NullSink).unwrap();
//! assert_eq!(finder.range(), Some((0, 4)));
//! ```
//!
//! ### Lazy array
//! ```rust
//! use std::sync::Arc;
//! use timelapse_tools::prelude::*;
//!
//! let file = Arc::new(SyntheticFile::<u8>::from_spec("S1T3Y4X4", |_| 7).unwrap());
//! let array = build_lazy_array(Arc::clone(&file)).unwrap();
//! assert_eq!(array.shape(), vec![1, 3, 4, 4]);
//! assert_eq!(array.dims_string(), "STYX");
//!
//! let second = array.select(DimensionTag::Time, AxisSelection::Index(1)).unwrap();
//! assert_eq!(second.materialize().unwrap().shape(), &[1, 4, 4]);
//! ```

// Core modules
pub mod dimensions;
pub mod driver;
pub mod file_handle;
pub mod lazy_array;
pub mod plane;
pub mod processors;

// Supporting modules
pub mod diagnostics;
pub mod errors;
pub mod parallel;
pub mod stack_file;
pub mod stream;
pub mod summary;
pub mod synthetic;

// Direct re-exports for the public API
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticsSink, NullSink, TracingSink};
pub use dimensions::{describe, DimensionBounds, DimensionDescriptor, DimensionMap, DimensionTag};
pub use driver::{plan_run, run, run_with, FixedSelectors, RunOptions, RunPlan};
pub use errors::{Result, TimelapseError};
pub use file_handle::{DataType, DimensionSource, FileHandle, Pixel, RawRead, ReadSelectors};
pub use lazy_array::{build_lazy_array, open_lazy_array, AxisSelection, ImageSource, LazyArray};
pub use parallel::ParallelConfig;
pub use plane::{load_plane, IndexRange, LazyPlane, LoadedPlane, Selector};
pub use stack_file::{open_any, read_header, write_stack_file, AnyStackFile, StackFile, StackHeader};
pub use summary::{summarize, FileSummary};
pub use synthetic::{PixelCoords, SyntheticFile};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::diagnostics::{CollectingSink, Diagnostic, DiagnosticsSink, NullSink, TracingSink};
    pub use crate::dimensions::{DimensionMap, DimensionTag};
    pub use crate::driver::{run, run_with, RunOptions};
    pub use crate::errors::{Result, TimelapseError};
    pub use crate::file_handle::{DimensionSource, FileHandle, Pixel, ReadSelectors};
    pub use crate::lazy_array::{build_lazy_array, open_lazy_array, AxisSelection, LazyArray};
    pub use crate::parallel::ParallelConfig;
    pub use crate::plane::{IndexRange, Selector};
    pub use crate::processors::{
        IntensityDistribution, MaxProject, MinMaxFinder, Passthrough, PercentileNormalize,
        Processor, RangeNormalize,
    };
    pub use crate::stack_file::{StackFile, write_stack_file};
    pub use crate::synthetic::SyntheticFile;
}
