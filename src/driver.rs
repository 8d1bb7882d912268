//! Streaming iteration driver
//!
//! Walks one operating dimension index by index, performs one real read per
//! step and hands the result to a [`Processor`]. Steps run strictly in
//! ascending order and never overlap: step `i + 1` is not read before the
//! processor returned from step `i`.
//!
//! All indices here are absolute, i.e. in the file's own coordinates
//! starting at each dimension's `begin`.

use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::dimensions::{describe_map, DimensionBounds, DimensionTag};
use crate::errors::{Result, TimelapseError};
use crate::file_handle::{DimensionSource, FileHandle, ReadSelectors};
use crate::plane::{load_plane, IndexRange, LoadedPlane, Selector};
use crate::processors::Processor;
use tracing::debug;

/// Dimensions pinned for a whole driver run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedSelectors {
    entries: Vec<(DimensionTag, Selector)>,
}

impl FixedSelectors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the selector for `tag`, replacing any previous one
    pub fn set(&mut self, tag: DimensionTag, selector: Selector) {
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = selector,
            None => self.entries.push((tag, selector)),
        }
    }

    #[must_use]
    pub fn with(mut self, tag: DimensionTag, selector: Selector) -> Self {
        self.set(tag, selector);
        self
    }

    #[must_use]
    pub fn get(&self, tag: DimensionTag) -> Option<Selector> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, selector)| *selector)
    }

    #[must_use]
    pub fn contains(&self, tag: DimensionTag) -> bool {
        self.get(tag).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(DimensionTag, Selector)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(DimensionTag, Selector)> for FixedSelectors {
    fn from_iter<I: IntoIterator<Item = (DimensionTag, Selector)>>(iter: I) -> Self {
        let mut fixed = Self::new();
        for (tag, selector) in iter {
            fixed.set(tag, selector);
        }
        fixed
    }
}

/// Parse a `TAG=SELECTOR` assignment such as `C=1` or `Z=2:6`
///
/// # Errors
///
/// `InvalidArgument` for a missing `=` or a malformed selector,
/// `InvalidDimension` for an unknown tag.
pub fn parse_fixed(assignment: &str) -> Result<(DimensionTag, Selector)> {
    let (tag, selector) = assignment.split_once('=').ok_or_else(|| {
        TimelapseError::invalid_argument(format!(
            "invalid selector '{assignment}': expected TAG=INDEX or TAG=START:STOP[:STEP]"
        ))
    })?;
    Ok((tag.parse()?, selector.parse()?))
}

/// Configuration of one driver run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub operating_dim: DimensionTag,
    /// Absolute indices of the operating dimension to visit
    pub range: IndexRange,
    pub fixed: FixedSelectors,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            operating_dim: DimensionTag::Time,
            range: IndexRange::full(),
            fixed: FixedSelectors::new(),
        }
    }
}

impl RunOptions {
    /// Visit every index of `operating_dim`
    #[must_use]
    pub fn new(operating_dim: DimensionTag) -> Self {
        Self {
            operating_dim,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_range(mut self, range: IndexRange) -> Self {
        self.range = range;
        self
    }

    #[must_use]
    pub fn fix(mut self, tag: DimensionTag, selector: Selector) -> Self {
        self.fixed.set(tag, selector);
        self
    }

    #[must_use]
    pub fn fix_index(self, tag: DimensionTag, index: usize) -> Self {
        self.fix(tag, Selector::Index(index))
    }

    #[must_use]
    pub fn fix_range(self, tag: DimensionTag, range: IndexRange) -> Self {
        self.fix(tag, Selector::Range(range))
    }
}

/// A validated driver run, ready to execute
#[derive(Debug, Clone)]
pub struct RunPlan {
    operating_dim: DimensionTag,
    operating_bounds: DimensionBounds,
    steps: Vec<usize>,
    /// Fixed indices plus the block pinned at its begin
    base: ReadSelectors,
    /// Fixed ranges as positions relative to each dimension's begin
    range_selections: Vec<(DimensionTag, Vec<usize>)>,
    defaulted: Vec<(DimensionTag, usize)>,
}

impl RunPlan {
    #[must_use]
    pub fn operating_dim(&self) -> DimensionTag {
        self.operating_dim
    }

    #[must_use]
    pub fn operating_bounds(&self) -> DimensionBounds {
        self.operating_bounds
    }

    /// Absolute operating indices, ascending
    #[must_use]
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    /// Dimensions that will be read at full extent, with their lengths
    #[must_use]
    pub fn defaulted(&self) -> &[(DimensionTag, usize)] {
        &self.defaulted
    }

    /// Read selectors for the step at absolute `index`
    #[must_use]
    pub fn selectors_for(&self, index: usize) -> ReadSelectors {
        self.base.clone().with(self.operating_dim, index)
    }

    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.defaulted
            .iter()
            .map(|&(dim, len)| Diagnostic::FullExtentRead {
                dim,
                len,
                operating_dim: self.operating_dim,
            })
            .collect()
    }

    /// Perform the read for the step at absolute `index`
    ///
    /// # Errors
    ///
    /// Read failures propagate unmodified.
    pub fn read_step<F: FileHandle + ?Sized>(
        &self,
        file: &F,
        index: usize,
    ) -> Result<(LoadedPlane<F::Elem>, ReadSelectors)> {
        let selectors = self.selectors_for(index);
        let mut plane = load_plane(file, &selectors)?;
        for (tag, positions) in &self.range_selections {
            plane = plane.select_positions(*tag, positions)?;
        }
        Ok((plane, selectors))
    }
}

/// Validate `options` against `file` without reading any plane
///
/// Conflicts are reported before anything else.
///
/// # Errors
///
/// - `ConflictingArguments` if a fixed selector targets the operating dimension
/// - `InvalidDimension` if the operating dimension or a fixed dimension is
///   absent, spatial or the block, or a fixed index is out of bounds
/// - `InvalidArgument` for malformed ranges, including a zero step
pub fn plan_run<S: DimensionSource + ?Sized>(file: &S, options: &RunOptions) -> Result<RunPlan> {
    let operating_dim = options.operating_dim;
    if let Some(selector) = options.fixed.get(operating_dim) {
        return Err(TimelapseError::conflicting(format!(
            "'{operating_dim}' is the operating dimension and cannot also be fixed ({selector:?})"
        )));
    }

    let map = file.dims()?;
    let descriptor = describe_map(&map)?;

    if operating_dim.is_spatial() || operating_dim == DimensionTag::Block {
        return Err(TimelapseError::invalid_dimension(
            operating_dim,
            "cannot be the operating dimension",
        ));
    }
    let operating_bounds = descriptor
        .get(operating_dim)
        .ok_or_else(|| TimelapseError::invalid_dimension(operating_dim, "not found in file"))?;

    let mut base = ReadSelectors::new();
    let mut range_selections = Vec::new();
    for &(tag, selector) in options.fixed.iter() {
        if tag.is_spatial() || tag == DimensionTag::Block {
            return Err(TimelapseError::invalid_dimension(tag, "cannot be fixed"));
        }
        let bounds = descriptor
            .get(tag)
            .ok_or_else(|| TimelapseError::invalid_dimension(tag, "not found in file"))?;

        match selector {
            Selector::Index(index) => {
                if !bounds.contains(index) {
                    return Err(TimelapseError::invalid_dimension(
                        tag,
                        format!(
                            "fixed index {index} outside [{}, {})",
                            bounds.begin,
                            bounds.end()
                        ),
                    ));
                }
                base.set(tag, index);
            }
            Selector::Range(range) => {
                let positions = range
                    .resolve(bounds.begin, bounds.end())?
                    .into_iter()
                    .map(|index| index - bounds.begin)
                    .collect();
                range_selections.push((tag, positions));
            }
        }
    }

    let steps = options
        .range
        .resolve(operating_bounds.begin, operating_bounds.end())?;

    if let Some(block) = descriptor.block() {
        base.set(DimensionTag::Block, block.begin);
    }

    let defaulted = descriptor
        .non_spatial()
        .iter()
        .filter(|(tag, _)| *tag != operating_dim && !options.fixed.contains(*tag))
        .map(|(tag, bounds)| (*tag, bounds.len))
        .collect();

    Ok(RunPlan {
        operating_dim,
        operating_bounds,
        steps,
        base,
        range_selections,
        defaulted,
    })
}

/// Run `processor` over every step and return it
///
/// Outputs of normalization processors are dropped; use [`run_with`] to
/// receive them.
///
/// # Errors
///
/// See [`run_with`].
pub fn run<F, P, S>(file: &F, processor: P, options: &RunOptions, sink: S) -> Result<P>
where
    F: FileHandle,
    P: Processor<F::Elem>,
    S: DiagnosticsSink,
{
    run_with(file, processor, options, sink, |_, _| Ok(()))
}

/// Run `processor` over every step, passing each output with its absolute
/// operating index to `on_output`
///
/// Diagnostics for dimensions read at full extent are emitted once, before
/// the first read.
///
/// # Errors
///
/// Validation errors from [`plan_run`] before any I/O. Afterwards the first
/// error from a read, from `process` or from `on_output` aborts the run.
pub fn run_with<F, P, S, C>(
    file: &F,
    mut processor: P,
    options: &RunOptions,
    mut sink: S,
    mut on_output: C,
) -> Result<P>
where
    F: FileHandle,
    P: Processor<F::Elem>,
    S: DiagnosticsSink,
    C: FnMut(usize, P::Output) -> Result<()>,
{
    let plan = plan_run(file, options)?;
    for diagnostic in plan.diagnostics() {
        sink.emit(diagnostic);
    }

    debug!(
        "Streaming {} steps over '{}' of {}",
        plan.steps().len(),
        plan.operating_dim(),
        file.identifier()
    );

    for &index in plan.steps() {
        let (plane, selectors) = plan.read_step(file, index)?;
        debug!("Processing step {}={index}", plan.operating_dim());
        if let Some(output) = processor.process(plane.data, &plane.dims, file, &selectors)? {
            on_output(index, output)?;
        }
    }

    Ok(processor)
}
