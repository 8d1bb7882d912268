//! Dimension tags, file-reported bounds and the canonical dimension descriptor
//!
//! Files report their layout as an ordered mapping of single-character tags to
//! `(begin, length)` bounds. [`describe`] turns that irregular layout into a
//! [`DimensionDescriptor`]: the block tag is dropped, the non-spatial tags keep
//! their declared order, and the spatial tags `Y`, `X` always come last.

use crate::errors::{Result, TimelapseError};
use crate::file_handle::DimensionSource;
use std::fmt;
use std::str::FromStr;

/// The closed set of dimension tags a timelapse file may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DimensionTag {
    /// Acquisition block, always read at its first index
    Block,
    Scene,
    Time,
    Channel,
    /// Spatial depth
    Depth,
    Y,
    X,
}

impl DimensionTag {
    /// Every known tag
    pub const ALL: [Self; 7] = [
        Self::Block,
        Self::Scene,
        Self::Time,
        Self::Channel,
        Self::Depth,
        Self::Y,
        Self::X,
    ];

    /// Tags that may vary across logical array positions
    pub const OPERABLE: [Self; 4] = [Self::Time, Self::Scene, Self::Channel, Self::Depth];

    /// The two plane axes, in canonical order
    pub const SPATIAL: [Self; 2] = [Self::Y, Self::X];

    /// Single uppercase character used in dims strings
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Block => 'B',
            Self::Scene => 'S',
            Self::Time => 'T',
            Self::Channel => 'C',
            Self::Depth => 'Z',
            Self::Y => 'Y',
            Self::X => 'X',
        }
    }

    /// Human readable name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Scene => "scene",
            Self::Time => "time",
            Self::Channel => "channel",
            Self::Depth => "depth",
            Self::Y => "y",
            Self::X => "x",
        }
    }

    #[must_use]
    pub const fn is_spatial(self) -> bool {
        matches!(self, Self::Y | Self::X)
    }

    #[must_use]
    pub const fn is_operable(self) -> bool {
        matches!(self, Self::Time | Self::Scene | Self::Channel | Self::Depth)
    }

    /// Parse a tag character, case-insensitively
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimension` for any character outside the known set.
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'B' => Ok(Self::Block),
            'S' => Ok(Self::Scene),
            'T' => Ok(Self::Time),
            'C' => Ok(Self::Channel),
            'Z' => Ok(Self::Depth),
            'Y' => Ok(Self::Y),
            'X' => Ok(Self::X),
            other => Err(TimelapseError::invalid_dimension(
                other,
                "unrecognized dimension tag, expected one of B, S, T, C, Z, Y, X",
            )),
        }
    }
}

impl fmt::Display for DimensionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl TryFrom<char> for DimensionTag {
    type Error = TimelapseError;

    fn try_from(c: char) -> Result<Self> {
        Self::from_char(c)
    }
}

impl FromStr for DimensionTag {
    type Err = TimelapseError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(TimelapseError::invalid_dimension(
                s,
                "dimension tags are single characters",
            )),
        }
    }
}

/// File-reported extent of one dimension, in absolute indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionBounds {
    pub begin: usize,
    pub len: usize,
}

impl DimensionBounds {
    #[must_use]
    pub const fn new(begin: usize, len: usize) -> Self {
        Self { begin, len }
    }

    /// One past the last absolute index, saturating at `usize::MAX`
    #[must_use]
    pub const fn end(&self) -> usize {
        self.begin.saturating_add(self.len)
    }

    #[must_use]
    pub const fn contains(&self, index: usize) -> bool {
        index >= self.begin && index < self.end()
    }
}

/// Ordered mapping of dimension tag to bounds, as reported by a file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionMap {
    entries: Vec<(DimensionTag, DimensionBounds)>,
}

impl DimensionMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a dimension. Replacing keeps the original position.
    pub fn insert(&mut self, tag: DimensionTag, begin: usize, len: usize) {
        let bounds = DimensionBounds::new(begin, len);
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = bounds,
            None => self.entries.push((tag, bounds)),
        }
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with(mut self, tag: DimensionTag, begin: usize, len: usize) -> Self {
        self.insert(tag, begin, len);
        self
    }

    pub fn remove(&mut self, tag: DimensionTag) -> Option<DimensionBounds> {
        let position = self.entries.iter().position(|(t, _)| *t == tag)?;
        Some(self.entries.remove(position).1)
    }

    #[must_use]
    pub fn get(&self, tag: DimensionTag) -> Option<DimensionBounds> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, bounds)| *bounds)
    }

    #[must_use]
    pub fn contains(&self, tag: DimensionTag) -> bool {
        self.get(tag).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(DimensionTag, DimensionBounds)> {
        self.entries.iter()
    }

    pub fn tags(&self) -> impl Iterator<Item = DimensionTag> + '_ {
        self.entries.iter().map(|(tag, _)| *tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a compact layout such as `"S1T5C2Z3Y64X64"` or `"T5@10Y4X4"`.
    ///
    /// Each tag is followed by its length and, optionally, `@begin`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimension` for unknown tags and `InvalidArgument` for
    /// missing or malformed numbers.
    pub fn from_spec(spec: &str) -> Result<Self> {
        let mut map = Self::new();
        let mut chars = spec.trim().chars().peekable();

        while let Some(c) = chars.next() {
            let tag = DimensionTag::from_char(c)?;
            let len = take_number(&mut chars).ok_or_else(|| {
                TimelapseError::invalid_argument(format!(
                    "missing length after '{tag}' in layout '{spec}'"
                ))
            })?;
            let begin = if chars.peek() == Some(&'@') {
                chars.next();
                take_number(&mut chars).ok_or_else(|| {
                    TimelapseError::invalid_argument(format!(
                        "missing begin index after '{tag}@' in layout '{spec}'"
                    ))
                })?
            } else {
                0
            };
            map.insert(tag, begin, len);
        }

        Ok(map)
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits.parse().ok()
}

impl FromIterator<(DimensionTag, DimensionBounds)> for DimensionMap {
    fn from_iter<I: IntoIterator<Item = (DimensionTag, DimensionBounds)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (tag, bounds) in iter {
            map.insert(tag, bounds.begin, bounds.len);
        }
        map
    }
}

/// Canonical, ordered dimension layout of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionDescriptor {
    /// Non-spatial entries in declared order, then `Y`, `X`
    entries: Vec<(DimensionTag, DimensionBounds)>,
    /// Block bounds, when the file reports a block dimension
    block: Option<DimensionBounds>,
}

impl DimensionDescriptor {
    #[must_use]
    pub fn entries(&self) -> &[(DimensionTag, DimensionBounds)] {
        &self.entries
    }

    /// Entries before the two trailing spatial axes
    #[must_use]
    pub fn non_spatial(&self) -> &[(DimensionTag, DimensionBounds)] {
        &self.entries[..self.entries.len() - 2]
    }

    /// The `Y` and `X` entries
    #[must_use]
    pub fn spatial(&self) -> &[(DimensionTag, DimensionBounds)] {
        &self.entries[self.entries.len() - 2..]
    }

    #[must_use]
    pub fn block(&self) -> Option<DimensionBounds> {
        self.block
    }

    #[must_use]
    pub fn get(&self, tag: DimensionTag) -> Option<DimensionBounds> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, bounds)| *bounds)
    }

    #[must_use]
    pub fn contains(&self, tag: DimensionTag) -> bool {
        self.get(tag).is_some()
    }

    pub fn tags(&self) -> impl Iterator<Item = DimensionTag> + '_ {
        self.entries.iter().map(|(tag, _)| *tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenated tags, e.g. `"STCZYX"`
    #[must_use]
    pub fn dims_string(&self) -> String {
        self.tags().map(DimensionTag::as_char).collect()
    }
}

/// Derive the canonical descriptor from a file
///
/// # Errors
///
/// - `CorruptSource` if the file reports no dimensions or lacks a spatial axis
/// - `InvalidDimension` if any reported dimension has zero length
pub fn describe<S: DimensionSource + ?Sized>(file: &S) -> Result<DimensionDescriptor> {
    describe_map(&file.dims()?)
}

/// [`describe`] over an already fetched dimension map
///
/// # Errors
///
/// See [`describe`].
pub fn describe_map(map: &DimensionMap) -> Result<DimensionDescriptor> {
    if map.is_empty() {
        return Err(TimelapseError::corrupt("file reports zero dimensions"));
    }

    if let Some((tag, _)) = map.iter().find(|(_, bounds)| bounds.len == 0) {
        return Err(TimelapseError::invalid_dimension(
            tag,
            "declared length must be positive",
        ));
    }

    if let Some((tag, bounds)) = map
        .iter()
        .find(|(_, bounds)| bounds.begin.checked_add(bounds.len).is_none())
    {
        return Err(TimelapseError::invalid_dimension(
            tag,
            format!("extent {}+{} overflows", bounds.begin, bounds.len),
        ));
    }

    let mut entries: Vec<(DimensionTag, DimensionBounds)> = map
        .iter()
        .filter(|(tag, _)| *tag != DimensionTag::Block && !tag.is_spatial())
        .copied()
        .collect();

    for tag in DimensionTag::SPATIAL {
        let bounds = map.get(tag).ok_or_else(|| {
            TimelapseError::corrupt(format!("file does not report spatial dimension '{tag}'"))
        })?;
        entries.push((tag, bounds));
    }

    Ok(DimensionDescriptor {
        entries,
        block: map.get(DimensionTag::Block),
    })
}
