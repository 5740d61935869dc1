//! Container access - the seam between the checks and the file library.
//!
//! Checks only ever see a [`Container`]: a read-only view that resolves named
//! paths, lists group members and hands back raw little-endian element bytes.

use std::fmt;
use std::io::{self, Read};

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use thiserror::Error;

#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod memory;

#[cfg(feature = "hdf5")]
pub use self::hdf5::Hdf5Container;
pub use memory::MemoryContainer;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("'{0}' not found")]
    NotFound(String),

    #[error("'{0}' is not a group")]
    NotAGroup(String),

    #[error("'{0}' is not a dataset")]
    NotADataset(String),

    #[error("'{path}' has unsupported element type {found}")]
    UnsupportedType { path: String, found: String },

    #[error("'{path}' is not a scalar [shape: {shape:?}]")]
    NotScalar { path: String, shape: Vec<usize> },

    #[error("'{path}' has no frame {frame} [shape: {shape:?}]")]
    FrameOutOfRange { path: String, frame: usize, shape: Vec<usize> },

    #[error("'{path}' holds {found} bytes, expected {expected}")]
    SizeMismatch { path: String, expected: usize, found: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] ::hdf5::Error),
}

impl ContainerError {
    /// Failures of the storage layer itself rather than of the file layout.
    pub fn is_io(&self) -> bool {
        match self {
            ContainerError::Io(_) => true,
            #[cfg(feature = "hdf5")]
            ContainerError::Hdf5(_) => true,
            _ => false,
        }
    }
}

/// Closed set of element types the downstream reader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl ElementType {
    pub const INTEGERS: [ElementType; 8] = [
        ElementType::Int8,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::UInt8,
        ElementType::UInt16,
        ElementType::UInt32,
        ElementType::UInt64,
    ];

    pub const FLOATS: [ElementType; 2] = [ElementType::Float32, ElementType::Float64];

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
            ElementType::Int64 | ElementType::UInt64 | ElementType::Float64 => 8,
        }
    }

    /// True for types that can hold negative values.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ElementType::Int8
                | ElementType::Int16
                | ElementType::Int32
                | ElementType::Int64
                | ElementType::Float32
                | ElementType::Float64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::Int8 => "int8",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::UInt8 => "uint8",
            ElementType::UInt16 => "uint16",
            ElementType::UInt32 => "uint32",
            ElementType::UInt64 => "uint64",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structural description of a dataset, read without touching its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetInfo {
    pub element_type: ElementType,
    pub shape: Vec<usize>,
    /// `None` for contiguous (unchunked) storage.
    pub chunks: Option<Vec<usize>>,
}

impl DatasetInfo {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn byte_len(&self) -> usize {
        self.element_count() * self.element_type.size()
    }

    pub fn is_chunked(&self) -> bool {
        self.chunks.is_some()
    }

    /// Bytes in one `(rows, cols)` frame of a rank-3 dataset.
    pub fn frame_byte_len(&self) -> Option<usize> {
        match self.shape.as_slice() {
            [_, rows, cols] => Some(rows * cols * self.element_type.size()),
            _ => None,
        }
    }
}

/// A single decoded value. Floats keep their stored width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Int(i64),
    UInt(u64),
    Float32(f32),
    Float(f64),
}

impl ScalarValue {
    /// Decode the first element of little-endian `bytes`.
    pub fn decode(element_type: ElementType, bytes: &[u8]) -> Option<Self> {
        if bytes.len() < element_type.size() {
            return None;
        }
        let value = match element_type {
            ElementType::Int8 => ScalarValue::Int(bytes[0] as i8 as i64),
            ElementType::Int16 => ScalarValue::Int(LittleEndian::read_i16(bytes) as i64),
            ElementType::Int32 => ScalarValue::Int(LittleEndian::read_i32(bytes) as i64),
            ElementType::Int64 => ScalarValue::Int(LittleEndian::read_i64(bytes)),
            ElementType::UInt8 => ScalarValue::UInt(bytes[0] as u64),
            ElementType::UInt16 => ScalarValue::UInt(LittleEndian::read_u16(bytes) as u64),
            ElementType::UInt32 => ScalarValue::UInt(LittleEndian::read_u32(bytes) as u64),
            ElementType::UInt64 => ScalarValue::UInt(LittleEndian::read_u64(bytes)),
            ElementType::Float32 => ScalarValue::Float32(LittleEndian::read_f32(bytes)),
            ElementType::Float64 => ScalarValue::Float(LittleEndian::read_f64(bytes)),
        };
        Some(value)
    }

    pub fn is_positive(&self) -> bool {
        match *self {
            ScalarValue::Int(v) => v > 0,
            ScalarValue::UInt(v) => v > 0,
            ScalarValue::Float32(v) => v > 0.0,
            ScalarValue::Float(v) => v > 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            ScalarValue::Int(v) => v as f64,
            ScalarValue::UInt(v) => v as f64,
            ScalarValue::Float32(v) => v as f64,
            ScalarValue::Float(v) => v,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::UInt(v) => write!(f, "{v}"),
            ScalarValue::Float32(v) => write!(f, "{v:e}"),
            ScalarValue::Float(v) => write!(f, "{v:e}"),
        }
    }
}

/// Index of the first negative element in little-endian `bytes`, if any.
///
/// Unsigned types never report a negative value.
pub fn first_negative(element_type: ElementType, bytes: &[u8]) -> Option<usize> {
    if !element_type.is_signed() {
        return None;
    }
    bytes
        .chunks_exact(element_type.size())
        .position(|element| match ScalarValue::decode(element_type, element) {
            Some(ScalarValue::Int(v)) => v < 0,
            Some(ScalarValue::Float32(v)) => v < 0.0,
            Some(ScalarValue::Float(v)) => v < 0.0,
            _ => false,
        })
}

/// Read-only view of an opened container.
///
/// Paths are absolute and slash-delimited. Implementations return
/// [`ContainerError::NotFound`] for a path that does not exist, so callers
/// can tell an absent optional field from a broken one.
pub trait Container {
    /// Human-readable origin, usually the file path.
    fn source(&self) -> &str;

    /// Reader positioned at byte zero of the underlying file.
    fn raw_reader(&self) -> Result<Box<dyn Read + '_>, ContainerError>;

    /// Member names of the group at `path`, in storage order.
    fn group_members(&self, path: &str) -> Result<Vec<String>, ContainerError>;

    fn dataset(&self, path: &str) -> Result<DatasetInfo, ContainerError>;

    /// Entire payload as little-endian element bytes in row-major order.
    fn read_raw(&self, path: &str) -> Result<Vec<u8>, ContainerError>;

    /// Payload of frame `frame` of a rank-3 dataset.
    fn read_frame(&self, path: &str, frame: usize) -> Result<Vec<u8>, ContainerError> {
        let info = self.dataset(path)?;
        let frame_len = info.frame_byte_len().ok_or_else(|| ContainerError::FrameOutOfRange {
            path: path.to_string(),
            frame,
            shape: info.shape.clone(),
        })?;
        if frame >= info.shape[0] {
            return Err(ContainerError::FrameOutOfRange {
                path: path.to_string(),
                frame,
                shape: info.shape,
            });
        }
        let raw = self.read_raw(path)?;
        let start = frame * frame_len;
        raw.get(start..start + frame_len)
            .map(<[u8]>::to_vec)
            .ok_or(ContainerError::SizeMismatch {
                path: path.to_string(),
                expected: info.byte_len(),
                found: raw.len(),
            })
    }

    /// Value of a rank-0 or single-element dataset.
    fn read_scalar(&self, path: &str) -> Result<ScalarValue, ContainerError> {
        let info = self.dataset(path)?;
        if info.element_count() != 1 {
            return Err(ContainerError::NotScalar {
                path: path.to_string(),
                shape: info.shape,
            });
        }
        let raw = self.read_raw(path)?;
        ScalarValue::decode(info.element_type, &raw).ok_or(ContainerError::SizeMismatch {
            path: path.to_string(),
            expected: info.element_type.size(),
            found: raw.len(),
        })
    }
}

impl<C: Container + ?Sized> Container for &C {
    fn source(&self) -> &str {
        (**self).source()
    }

    fn raw_reader(&self) -> Result<Box<dyn Read + '_>, ContainerError> {
        (**self).raw_reader()
    }

    fn group_members(&self, path: &str) -> Result<Vec<String>, ContainerError> {
        (**self).group_members(path)
    }

    fn dataset(&self, path: &str) -> Result<DatasetInfo, ContainerError> {
        (**self).dataset(path)
    }

    fn read_raw(&self, path: &str) -> Result<Vec<u8>, ContainerError> {
        (**self).read_raw(path)
    }

    fn read_frame(&self, path: &str, frame: usize) -> Result<Vec<u8>, ContainerError> {
        (**self).read_frame(path, frame)
    }

    fn read_scalar(&self, path: &str) -> Result<ScalarValue, ContainerError> {
        (**self).read_scalar(path)
    }
}
