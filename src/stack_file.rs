//! Single-file timelapse stacks on disk
//!
//! A stack file is the crate's one concrete, path-openable [`FileHandle`]:
//!
//! ```text
//! b"TLSTACK1" | header length (u32 LE) | JSON header | element data
//! ```
//!
//! The JSON header lists the dimensions in storage order, the element type and
//! a creation stamp:
//!
//! ```json
//! {"dims": [["T", 0, 5], ["Y", 0, 64], ["X", 0, 64]], "dtype": "uint16",
//!  "created": "2024-03-01T12:00:00+00:00"}
//! ```
//!
//! Element data follows in row-major order of the header dims, little-endian.
//! Reads go through one OS file handle guarded by a mutex, so concurrent plane
//! evaluation is safe but serialized at the seek+read.

use crate::dimensions::{describe_map, DimensionMap, DimensionTag};
use crate::errors::{Result, TimelapseError};
use crate::file_handle::{DataType, DimensionSource, FileHandle, Pixel, RawRead, ReadSelectors};
use chrono::{DateTime, Utc};
use ndarray::{indices, ArrayD, Dimension, IxDyn};
use serde_json::{json, Value as JsonValue};
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Leading bytes of every stack file
pub const STACK_MAGIC: &[u8; 8] = b"TLSTACK1";

/// Conventional file extension
pub const STACK_EXTENSION: &str = "tls";

/// Parsed stack file header
#[derive(Debug, Clone, PartialEq)]
pub struct StackHeader {
    pub dims: DimensionMap,
    pub dtype: DataType,
    pub created: Option<DateTime<Utc>>,
}

impl StackHeader {
    /// Header stamped with the current time
    #[must_use]
    pub fn new(dims: DimensionMap, dtype: DataType) -> Self {
        Self {
            dims,
            dtype,
            created: Some(Utc::now()),
        }
    }

    /// Total number of stored elements, saturating at `usize::MAX`
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.checked_element_count().unwrap_or(usize::MAX)
    }

    fn checked_element_count(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |count, (_, bounds)| count.checked_mul(bounds.len))
    }

    /// Size of the element data in bytes, `None` if it overflows
    #[must_use]
    pub fn data_len(&self) -> Option<u64> {
        let count = u64::try_from(self.checked_element_count()?).ok()?;
        count.checked_mul(self.dtype.size() as u64)
    }

    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let dims: Vec<JsonValue> = self
            .dims
            .iter()
            .map(|(tag, bounds)| json!([tag.to_string(), bounds.begin, bounds.len]))
            .collect();

        let mut header = json!({
            "dims": dims,
            "dtype": self.dtype.as_str(),
        });
        if let Some(created) = self.created {
            header["created"] = JsonValue::String(created.to_rfc3339());
        }
        header
    }

    /// # Errors
    ///
    /// `CorruptSource` for missing or malformed fields, `InvalidDimension`
    /// for unknown tags.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let entries = value["dims"]
            .as_array()
            .ok_or_else(|| TimelapseError::corrupt("Missing dims in stack header"))?;

        let mut dims = DimensionMap::new();
        for entry in entries {
            let malformed =
                || TimelapseError::corrupt(format!("Malformed dims entry in stack header: {entry}"));
            let tag: DimensionTag = entry[0].as_str().ok_or_else(malformed)?.parse()?;
            let index = |value: &JsonValue| {
                value
                    .as_u64()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(malformed)
            };
            let begin = index(&entry[1])?;
            let len = index(&entry[2])?;
            if begin.checked_add(len).is_none() {
                return Err(TimelapseError::corrupt(format!(
                    "'{tag}' extent {begin}+{len} overflows in stack header"
                )));
            }
            dims.insert(tag, begin, len);
        }

        let dtype: DataType = value["dtype"]
            .as_str()
            .ok_or_else(|| TimelapseError::corrupt("Missing dtype in stack header"))?
            .parse()
            .map_err(|_| TimelapseError::corrupt(format!("Unsupported dtype {}", value["dtype"])))?;

        let created = value["created"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        let header = Self {
            dims,
            dtype,
            created,
        };
        if header.data_len().is_none() {
            return Err(TimelapseError::corrupt(
                "Stack header declares more data than can be addressed",
            ));
        }
        Ok(header)
    }
}

/// Reject missing paths and directories
pub(crate) fn check_input_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(TimelapseError::NotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_dir() {
        return Err(TimelapseError::IsADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(path.to_path_buf())
}

/// Read only the header of a stack file
///
/// Returns the header and the byte offset of the element data.
///
/// # Errors
///
/// `NotFound` / `IsADirectory` for unusable paths, `InvalidArgument` if the
/// file is not a stack file, `CorruptSource` for an unreadable header.
pub fn read_header(path: impl AsRef<Path>) -> Result<(StackHeader, u64)> {
    let path = check_input_path(path.as_ref())?;
    let mut file = File::open(&path)?;
    read_header_from(&mut file, &path)
}

fn read_header_from(reader: &mut File, path: &Path) -> Result<(StackHeader, u64)> {
    let not_a_stack = || {
        TimelapseError::invalid_argument(format!(
            "{} is not a recognized timelapse stack file",
            path.display()
        ))
    };

    let mut magic = [0u8; 8];
    match reader.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(not_a_stack()),
        Err(e) => return Err(e.into()),
    }
    if &magic != STACK_MAGIC {
        return Err(not_a_stack());
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;

    let data_offset = (STACK_MAGIC.len() + 4 + header_len) as u64;
    if data_offset > reader.metadata()?.len() {
        return Err(TimelapseError::corrupt("Stack header is truncated"));
    }

    let mut header_bytes = vec![0u8; header_len];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|_| TimelapseError::corrupt("Stack header is truncated"))?;

    let value: JsonValue = serde_json::from_slice(&header_bytes)
        .map_err(|e| TimelapseError::corrupt(format!("Failed to parse stack header: {e}")))?;
    let header = StackHeader::from_json(&value)?;

    Ok((header, data_offset))
}

/// Open stack file with element type `T`
#[derive(Debug)]
pub struct StackFile<T> {
    path: PathBuf,
    header: StackHeader,
    data_offset: u64,
    file: Mutex<File>,
    _elem: PhantomData<T>,
}

impl<T: Pixel> StackFile<T> {
    /// Open and validate a stack file
    ///
    /// # Errors
    ///
    /// - `NotFound`, `IsADirectory` for unusable paths
    /// - `InvalidArgument` if the file is not a stack file or stores a
    ///   different element type than `T`
    /// - `CorruptSource`, `InvalidDimension` for an invalid layout or
    ///   truncated data
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = check_input_path(path.as_ref())?;
        let mut file = File::open(&path)?;
        let (header, data_offset) = read_header_from(&mut file, &path)?;

        if header.dtype != T::DTYPE {
            return Err(TimelapseError::invalid_argument(format!(
                "{} stores {} elements, opened as {}",
                path.display(),
                header.dtype,
                T::DTYPE
            )));
        }
        describe_map(&header.dims)?;

        let expected = header
            .data_len()
            .and_then(|len| len.checked_add(data_offset))
            .ok_or_else(|| TimelapseError::corrupt("Stack header declares more data than can be addressed"))?;
        let actual = file.metadata()?.len();
        if actual < expected {
            return Err(TimelapseError::corrupt(format!(
                "{} is truncated: expected {expected} bytes, found {actual}",
                path.display()
            )));
        }

        debug!(
            "Opened stack file {} ({}, {} elements)",
            path.display(),
            header.dtype,
            header.element_count()
        );

        Ok(Self {
            path,
            header,
            data_offset,
            file: Mutex::new(file),
            _elem: PhantomData,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> &StackHeader {
        &self.header
    }
}

impl<T: Pixel> DimensionSource for StackFile<T> {
    fn dims(&self) -> Result<DimensionMap> {
        Ok(self.header.dims.clone())
    }
}

impl<T: Pixel> FileHandle for StackFile<T> {
    type Elem = T;

    fn read(&self, selectors: &ReadSelectors) -> Result<RawRead<T>> {
        let axes: Vec<_> = self.header.dims.iter().copied().collect();

        for (tag, index) in selectors.iter() {
            let bounds = self.header.dims.get(*tag).ok_or_else(|| {
                TimelapseError::invalid_dimension(tag, format!("not found in {}", self.path.display()))
            })?;
            if !bounds.contains(*index) {
                return Err(TimelapseError::invalid_dimension(
                    tag,
                    format!(
                        "index {index} outside [{}, {})",
                        bounds.begin,
                        bounds.end()
                    ),
                ));
            }
        }

        // Element strides over the stored layout
        let lens: Vec<usize> = axes.iter().map(|(_, bounds)| bounds.len).collect();
        let mut strides = vec![1usize; lens.len()];
        for axis in (0..lens.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * lens[axis + 1];
        }

        // Trailing unselected axes form one contiguous run per read
        let split = axes
            .iter()
            .rposition(|(tag, _)| selectors.contains(*tag))
            .map_or(0, |axis| axis + 1);
        let run: usize = lens[split..].iter().product();

        let fixed: Vec<Option<usize>> = axes
            .iter()
            .map(|(tag, bounds)| selectors.get(*tag).map(|index| index - bounds.begin))
            .collect();
        let walk: Vec<usize> = (0..split)
            .map(|axis| if fixed[axis].is_some() { 1 } else { lens[axis] })
            .collect();

        let size = T::DTYPE.size();
        let mut bytes = vec![0u8; run * size];
        let mut values = Vec::with_capacity(walk.iter().product::<usize>() * run);
        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| TimelapseError::corrupt("stack file lock poisoned by a failed read"))?;

            for leading in indices(IxDyn(&walk)) {
                let element: usize = leading
                    .slice()
                    .iter()
                    .enumerate()
                    .map(|(axis, &i)| fixed[axis].unwrap_or(i) * strides[axis])
                    .sum();
                file.seek(SeekFrom::Start(self.data_offset + (element * size) as u64))?;
                file.read_exact(&mut bytes)?;
                values.extend(bytes.chunks_exact(size).map(T::from_le_slice));
            }
        }

        let dims: Vec<(DimensionTag, usize)> = axes
            .iter()
            .filter(|(tag, _)| !selectors.contains(*tag))
            .map(|(tag, bounds)| (*tag, bounds.len))
            .collect();
        let shape: Vec<usize> = dims.iter().map(|(_, len)| *len).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;

        Ok(RawRead { data, dims })
    }

    fn identifier(&self) -> String {
        self.path.display().to_string()
    }
}

/// A stack file opened with whatever element type its header declares
#[derive(Debug)]
pub enum AnyStackFile {
    Uint8(StackFile<u8>),
    Uint16(StackFile<u16>),
    Uint32(StackFile<u32>),
    Float32(StackFile<f32>),
}

impl AnyStackFile {
    #[must_use]
    pub fn dtype(&self) -> DataType {
        self.header().dtype
    }

    #[must_use]
    pub fn header(&self) -> &StackHeader {
        match self {
            Self::Uint8(f) => f.header(),
            Self::Uint16(f) => f.header(),
            Self::Uint32(f) => f.header(),
            Self::Float32(f) => f.header(),
        }
    }
}

/// Open a stack file without knowing its element type up front
///
/// # Errors
///
/// See [`StackFile::open`].
pub fn open_any(path: impl AsRef<Path>) -> Result<AnyStackFile> {
    let path = path.as_ref();
    let (header, _) = read_header(path)?;
    Ok(match header.dtype {
        DataType::Uint8 => AnyStackFile::Uint8(StackFile::open(path)?),
        DataType::Uint16 => AnyStackFile::Uint16(StackFile::open(path)?),
        DataType::Uint32 => AnyStackFile::Uint32(StackFile::open(path)?),
        DataType::Float32 => AnyStackFile::Float32(StackFile::open(path)?),
    })
}

/// Write `data`, laid out as `dims`, to a new stack file
///
/// # Errors
///
/// `InvalidArgument` if the data shape does not match the declared lengths,
/// layout errors from the dimension descriptor, and I/O errors.
pub fn write_stack_file<T: Pixel>(
    path: impl AsRef<Path>,
    dims: &DimensionMap,
    data: &ArrayD<T>,
) -> Result<StackHeader> {
    let path = path.as_ref();
    describe_map(dims)?;

    let declared: Vec<usize> = dims.iter().map(|(_, bounds)| bounds.len).collect();
    if data.shape() != declared.as_slice() {
        return Err(TimelapseError::invalid_argument(format!(
            "data shape {:?} does not match declared dims {:?}",
            data.shape(),
            declared
        )));
    }

    let header = StackHeader::new(dims.clone(), T::DTYPE);
    let header_bytes = serde_json::to_vec(&header.to_json()).map_err(std::io::Error::other)?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| TimelapseError::invalid_argument("stack header too large"))?;

    debug!(
        "Writing stack file {} with shape {:?}",
        path.display(),
        data.shape()
    );

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(STACK_MAGIC)?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(&header_bytes)?;

    let mut buffer = Vec::with_capacity(data.len() * T::DTYPE.size());
    for &value in data.iter() {
        value.write_le(&mut buffer);
    }
    writer.write_all(&buffer)?;
    writer.flush()?;

    Ok(header)
}
