//! The file collaborator boundary
//!
//! The physical file format is opaque to this crate. Anything that can report
//! its dimension bounds and read a selection of planes implements
//! [`FileHandle`]; the lazy array builder, the streaming driver and every
//! processor only ever talk to that trait.

use crate::dimensions::{DimensionMap, DimensionTag};
use crate::errors::{Result, TimelapseError};
use ndarray::ArrayD;
use num_traits::{Bounded, ToPrimitive, Zero};
use std::fmt::{self, Debug, Display};
use std::str::FromStr;

/// Element type tag of a file's pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Uint8,
    Uint16,
    Uint32,
    Float32,
}

impl DataType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Float32 => "float32",
        }
    }

    /// Size of one element in bytes
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Uint16 => 2,
            Self::Uint32 | Self::Float32 => 4,
        }
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        !matches!(self, Self::Float32)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = TimelapseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uint8" | "u8" => Ok(Self::Uint8),
            "uint16" | "u16" => Ok(Self::Uint16),
            "uint32" | "u32" => Ok(Self::Uint32),
            "float32" | "f32" => Ok(Self::Float32),
            other => Err(TimelapseError::invalid_argument(format!(
                "unsupported element type '{other}'"
            ))),
        }
    }
}

/// Pixel element types a file may store
pub trait Pixel:
    Copy + Debug + Display + PartialOrd + Send + Sync + 'static + ToPrimitive + Bounded + Zero
{
    const DTYPE: DataType;

    /// Decode one element from exactly `DTYPE.size()` little-endian bytes
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding of `self`
    fn write_le(self, out: &mut Vec<u8>);

    /// Inclusive representable range for integer element types
    fn integer_range() -> Option<(i64, i64)> {
        if Self::DTYPE.is_integer() {
            Some((Self::min_value().to_i64()?, Self::max_value().to_i64()?))
        } else {
            None
        }
    }
}

macro_rules! impl_pixel {
    ($ty:ty, $dtype:expr, $size:expr) => {
        impl Pixel for $ty {
            const DTYPE: DataType = $dtype;

            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $size];
                raw.copy_from_slice(&bytes[..$size]);
                <$ty>::from_le_bytes(raw)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_pixel!(u8, DataType::Uint8, 1);
impl_pixel!(u16, DataType::Uint16, 2);
impl_pixel!(u32, DataType::Uint32, 4);
impl_pixel!(f32, DataType::Float32, 4);

/// Absolute single-index selectors for one read; absent tags read full extent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSelectors {
    entries: Vec<(DimensionTag, usize)>,
}

impl ReadSelectors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `tag` to the absolute `index`, replacing any previous value
    pub fn set(&mut self, tag: DimensionTag, index: usize) {
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = index,
            None => self.entries.push((tag, index)),
        }
    }

    #[must_use]
    pub fn with(mut self, tag: DimensionTag, index: usize) -> Self {
        self.set(tag, index);
        self
    }

    #[must_use]
    pub fn get(&self, tag: DimensionTag) -> Option<usize> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, index)| *index)
    }

    #[must_use]
    pub fn contains(&self, tag: DimensionTag) -> bool {
        self.get(tag).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(DimensionTag, usize)> {
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

impl FromIterator<(DimensionTag, usize)> for ReadSelectors {
    fn from_iter<I: IntoIterator<Item = (DimensionTag, usize)>>(iter: I) -> Self {
        let mut selectors = Self::new();
        for (tag, index) in iter {
            selectors.set(tag, index);
        }
        selectors
    }
}

impl Display for ReadSelectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(tag, index)| format!("{tag}={index}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Buffer and ordered `(tag, size)` axes returned by a collaborator read
#[derive(Debug, Clone)]
pub struct RawRead<T> {
    pub data: ArrayD<T>,
    pub dims: Vec<(DimensionTag, usize)>,
}

/// Anything that can report its dimension bounds
pub trait DimensionSource {
    /// Ordered mapping of tag to `(begin, length)`
    ///
    /// # Errors
    ///
    /// Implementations return `CorruptSource` or `Io` when the layout cannot
    /// be determined.
    fn dims(&self) -> Result<DimensionMap>;
}

/// Open reference to one image file
///
/// `read` must be reentrant: the lazy array may evaluate many planes of the
/// same handle concurrently. Implementations backed by a single OS file handle
/// serialize access internally.
pub trait FileHandle: DimensionSource + Send + Sync {
    type Elem: Pixel;

    /// Read the selection described by `selectors`.
    ///
    /// Selected tags return one absolute index, either squeezed out of the
    /// result or kept as a size-1 axis. Unselected tags return their full
    /// extent.
    ///
    /// # Errors
    ///
    /// Any failure of the underlying source; no retry is attempted by callers.
    fn read(&self, selectors: &ReadSelectors) -> Result<RawRead<Self::Elem>>;

    /// Identifier for logging
    fn identifier(&self) -> String {
        String::from("<anonymous>")
    }
}
