//! Structured run diagnostics
//!
//! The streaming driver never logs on its own. Anything worth telling the
//! caller about, such as a dimension that will be read at full extent on every
//! step, is emitted as a [`Diagnostic`] into a caller-supplied
//! [`DiagnosticsSink`].

use crate::dimensions::DimensionTag;
use std::fmt;
use tracing::warn;

/// Non-fatal observation about a driver run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `dim` is neither fixed nor operated on, so every step reads all `len`
    /// of its indices
    FullExtentRead {
        dim: DimensionTag,
        len: usize,
        operating_dim: DimensionTag,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullExtentRead {
                dim,
                len,
                operating_dim,
            } => write!(
                f,
                "No selector for dimension '{dim}': each step over '{operating_dim}' reads all \
                 {len} of its planes, raising memory use and read time {len}x"
            ),
        }
    }
}

/// Receiver of run diagnostics
pub trait DiagnosticsSink {
    fn emit(&mut self, diagnostic: Diagnostic);
}

impl<S: DiagnosticsSink + ?Sized> DiagnosticsSink for &mut S {
    fn emit(&mut self, diagnostic: Diagnostic) {
        (**self).emit(diagnostic);
    }
}

/// Forwards diagnostics to `tracing` at warn level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        warn!("{diagnostic}");
    }
}

/// Discards diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn emit(&mut self, _diagnostic: Diagnostic) {}
}

/// Keeps diagnostics for later inspection
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl DiagnosticsSink for CollectingSink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
