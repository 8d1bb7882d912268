//! Human readable file summaries

use crate::dimensions::{DimensionMap, DimensionTag};
use crate::errors::Result;
use crate::file_handle::DataType;
use crate::stack_file::{check_input_path, read_header};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

const SIZE_UNITS: [&str; 8] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB"];

/// Format a byte count with one decimal and a binary-prefixed unit, e.g.
/// `"1.5 KB"`
#[must_use]
pub fn human_readable_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in &SIZE_UNITS[..SIZE_UNITS.len() - 1] {
        if size < 1024.0 {
            return format!("{size:3.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} {}", SIZE_UNITS[SIZE_UNITS.len() - 1])
}

/// Lengths of the scene, time, channel and depth dimensions, e.g. `"S1_T5_C2"`
#[must_use]
pub fn dimension_string(dims: &DimensionMap) -> String {
    [
        DimensionTag::Scene,
        DimensionTag::Time,
        DimensionTag::Channel,
        DimensionTag::Depth,
    ]
    .iter()
    .filter_map(|&tag| dims.get(tag).map(|bounds| format!("{tag}{}", bounds.len)))
    .collect::<Vec<_>>()
    .join("_")
}

/// Summary of one stack file
#[derive(Debug, Clone, PartialEq)]
pub struct FileSummary {
    pub path: PathBuf,
    pub size: u64,
    pub human_size: String,
    pub dimensions: String,
    pub dtype: DataType,
    pub created: Option<DateTime<Utc>>,
}

impl fmt::Display for FileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.path.display())?;
        writeln!(f, "Size: {}", self.human_size)?;
        writeln!(f, "Dimensions: {}", self.dimensions)?;
        writeln!(f, "Data type: {}", self.dtype)?;
        match self.created {
            Some(created) => write!(f, "Created: {}", created.date_naive()),
            None => write!(f, "Created: Unavailable"),
        }
    }
}

/// Summarize the stack file at `path` from its header alone
///
/// # Errors
///
/// See [`read_header`].
pub fn summarize(path: impl AsRef<Path>) -> Result<FileSummary> {
    let path = check_input_path(path.as_ref())?;
    let (header, _) = read_header(&path)?;
    let size = std::fs::metadata(&path)?.len();

    Ok(FileSummary {
        human_size: human_readable_size(size),
        dimensions: dimension_string(&header.dims),
        dtype: header.dtype,
        created: header.created,
        size,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_readable_size() {
        assert_eq!(human_readable_size(0), "0.0 B");
        assert_eq!(human_readable_size(1023), "1023.0 B");
        assert_eq!(human_readable_size(1536), "1.5 KB");
        assert_eq!(human_readable_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_dimension_string_skips_absent_and_spatial() -> Result<()> {
        let dims = DimensionMap::from_spec("B1S1T5Z3Y4X4")?;
        assert_eq!(dimension_string(&dims), "S1_T5_Z3");
        Ok(())
    }
}
