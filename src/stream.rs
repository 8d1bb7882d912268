//! Async, strictly ordered step stream
//!
//! Same validation and step order as [`run`](crate::driver::run), but each
//! read is yielded to the caller instead of a processor. Reads run on tokio's
//! blocking pool; the next read is only issued once the previous step has
//! been polled out of the stream.

use crate::diagnostics::DiagnosticsSink;
use crate::dimensions::DimensionTag;
use crate::driver::{plan_run, RunOptions};
use crate::errors::{Result, TimelapseError};
use crate::file_handle::{FileHandle, ReadSelectors};
use crate::processors::Processor;
use futures::{Stream, StreamExt};
use ndarray::ArrayD;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// One driver step
#[derive(Debug, Clone)]
pub struct Step<T> {
    /// Absolute operating index
    pub index: usize,
    pub data: ArrayD<T>,
    pub dims: Vec<(DimensionTag, usize)>,
    pub selectors: ReadSelectors,
}

pub type StepStream<T> = Pin<Box<dyn Stream<Item = Result<Step<T>>> + Send + 'static>>;

/// Stream the steps of a driver run
///
/// Validation happens immediately and diagnostics are emitted into `sink`
/// before the stream is returned. The stream ends after the first error.
///
/// # Errors
///
/// Validation errors, see [`plan_run`].
pub fn stream_steps<F, S>(file: Arc<F>, options: &RunOptions, mut sink: S) -> Result<StepStream<F::Elem>>
where
    F: FileHandle + 'static,
    S: DiagnosticsSink,
{
    let plan = Arc::new(plan_run(file.as_ref(), options)?);
    for diagnostic in plan.diagnostics() {
        sink.emit(diagnostic);
    }

    Ok(Box::pin(async_stream::stream! {
        for index in plan.steps().to_vec() {
            let task_file = Arc::clone(&file);
            let task_plan = Arc::clone(&plan);
            let read = tokio::task::spawn_blocking(move || task_plan.read_step(task_file.as_ref(), index)).await;

            match read {
                Ok(Ok((plane, selectors))) => {
                    debug!("Streamed step {}={index}", plan.operating_dim());
                    yield Ok(Step {
                        index,
                        data: plane.data,
                        dims: plane.dims,
                        selectors,
                    });
                }
                Ok(Err(e)) => {
                    yield Err(e);
                    return;
                }
                Err(e) => {
                    yield Err(TimelapseError::corrupt(format!("read task for step {index} failed: {e}")));
                    return;
                }
            }
        }
    }))
}

/// Feed a step stream into `processor`, collecting its outputs in order
///
/// # Errors
///
/// The first error from the stream or from `process`.
pub async fn drive<F, P>(
    file: &F,
    mut processor: P,
    mut steps: StepStream<F::Elem>,
) -> Result<(P, Vec<(usize, P::Output)>)>
where
    F: FileHandle,
    P: Processor<F::Elem>,
{
    let mut outputs = Vec::new();
    while let Some(step) = steps.next().await {
        let step = step?;
        if let Some(output) = processor.process(step.data, &step.dims, file, &step.selectors)? {
            outputs.push((step.index, output));
        }
    }
    Ok((processor, outputs))
}
