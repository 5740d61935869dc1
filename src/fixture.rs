//! Fixture Descriptor - golden values for the compatibility suite
//!
//! Reads an already-validated file and renders the `CheckHdf5(...)` literal
//! the reader's test suite compares against. Any missing field aborts the
//! whole description; nothing is rendered from a partial read.

use serde::Serialize;
use thiserror::Error;

use crate::container::{Container, ContainerError, ElementType};
use crate::contract::{
    classify_entry_name, entry_path, DATA_GROUP, FLATFIELD, PIXEL_MASK, X_PIXELS_IN_DETECTOR,
    X_PIXEL_SIZE, Y_PIXEL_SIZE,
};
use crate::hashing::{lookup3, RollingChecksum};
use crate::print::shape_tuple;
use crate::superblock::{Superblock, SuperblockError};

#[derive(Debug, Error)]
pub enum DescribeError {
    #[error(transparent)]
    Superblock(#[from] SuperblockError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("required field '{0}' not found")]
    MissingField(String),

    #[error("no image data entries found in '{0}'")]
    NoImageData(String),

    #[error("unsupported dtype for '{path}': {found}")]
    UnsupportedType { path: String, found: ElementType },

    #[error("'{path}' must be {rank}-dimensional [shape: {shape}]")]
    Rank {
        path: String,
        rank: usize,
        shape: String,
    },
}

impl DescribeError {
    /// False when the file could not be read, true when it was read and
    /// does not fit the fixture.
    pub fn is_contract_failure(&self) -> bool {
        match self {
            DescribeError::Superblock(SuperblockError::Io(_)) => false,
            DescribeError::Container(e) => !e.is_io(),
            _ => true,
        }
    }
}

/// Floating-point parameter of the expected-values template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatWidth {
    Float,
    Double,
}

impl FloatWidth {
    pub fn from_element(path: &str, element_type: ElementType) -> Result<Self, DescribeError> {
        match element_type {
            ElementType::Float32 => Ok(FloatWidth::Float),
            ElementType::Float64 => Ok(FloatWidth::Double),
            found => Err(DescribeError::UnsupportedType {
                path: path.to_string(),
                found,
            }),
        }
    }

    pub fn c_type(self) -> &'static str {
        match self {
            FloatWidth::Float => "float",
            FloatWidth::Double => "double",
        }
    }

    /// Shortest literal that reads back to the stored value at this width.
    pub fn literal(self, value: f64) -> String {
        match self {
            FloatWidth::Float => format!("{:e}", value as f32),
            FloatWidth::Double => format!("{value:e}"),
        }
    }
}

/// Unsigned-integer parameter of the expected-values template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UIntWidth {
    U8,
    U16,
    U32,
    U64,
}

impl UIntWidth {
    fn from_element(
        path: &str,
        element_type: ElementType,
        allowed: &[UIntWidth],
    ) -> Result<Self, DescribeError> {
        let width = match element_type {
            ElementType::UInt8 => Some(UIntWidth::U8),
            ElementType::UInt16 => Some(UIntWidth::U16),
            ElementType::UInt32 => Some(UIntWidth::U32),
            ElementType::UInt64 => Some(UIntWidth::U64),
            _ => None,
        };
        width
            .filter(|w| allowed.contains(w))
            .ok_or_else(|| DescribeError::UnsupportedType {
                path: path.to_string(),
                found: element_type,
            })
    }

    pub fn c_type(self) -> &'static str {
        match self {
            UIntWidth::U8 => "uint8_t",
            UIntWidth::U16 => "uint16_t",
            UIntWidth::U32 => "uint32_t",
            UIntWidth::U64 => "uint64_t",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetDigest {
    pub entry: String,
    pub shape: [usize; 3],
    /// Rolling lookup3 over the frames in storage order.
    pub checksum: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureDescriptor {
    pub source: String,
    pub superblock_version: u8,
    /// Pixel-mask columns.
    pub width: usize,
    /// Pixel-mask rows.
    pub height: usize,
    pub x_pixel_size: f64,
    pub y_pixel_size: f64,
    pub float_type: FloatWidth,
    pub int_type: UIntWidth,
    pub pixel_type: UIntWidth,
    pub flatfield_checksum: u32,
    pub pixel_mask_checksum: u32,
    pub datasets: Vec<DatasetDigest>,
}

impl FixtureDescriptor {
    /// C++ literal for the compatibility suite.
    pub fn render_literal(&self) -> String {
        let datasets: Vec<_> = self
            .datasets
            .iter()
            .map(|d| {
                format!(
                    "{{\"{}\", {{{}, {}, {}}}, {}}}",
                    d.entry, d.shape[0], d.shape[1], d.shape[2], d.checksum
                )
            })
            .collect();
        format!(
            "CheckHdf5(\n        {source:?},\n        ExpectedValues<{float}, {int}, {pixel}>{{\n                {version},\n                {width},\n                {height},\n                {x},\n                {y},\n                {ff},\n                {pm},\n                {{{datasets}}},\n        }});\n",
            source = self.source,
            float = self.float_type.c_type(),
            int = self.int_type.c_type(),
            pixel = self.pixel_type.c_type(),
            version = self.superblock_version,
            width = self.width,
            height = self.height,
            x = self.float_type.literal(self.x_pixel_size),
            y = self.float_type.literal(self.y_pixel_size),
            ff = self.flatfield_checksum,
            pm = self.pixel_mask_checksum,
            datasets = datasets.join(", "),
        )
    }
}

/// Map "not found" to the emitter's missing-field abort.
fn require<T>(path: &str, result: Result<T, ContainerError>) -> Result<T, DescribeError> {
    result.map_err(|e| match e {
        ContainerError::NotFound(_) => DescribeError::MissingField(path.to_string()),
        other => DescribeError::Container(other),
    })
}

/// Rolling digest of every frame of a rank-3 dataset.
fn frame_digest<C: Container + ?Sized>(
    container: &C,
    path: &str,
    frames: usize,
) -> Result<u32, DescribeError> {
    let mut rolling = RollingChecksum::new();
    for frame in 0..frames {
        rolling.update(&container.read_frame(path, frame)?);
    }
    tracing::debug!(path, frames = rolling.buffers(), checksum = rolling.digest(), "entry digested");
    Ok(rolling.digest())
}

/// Extract the fixture fields from one container.
pub fn describe<C: Container + ?Sized>(container: &C) -> Result<FixtureDescriptor, DescribeError> {
    tracing::info!(source = container.source(), "describing");
    let superblock = Superblock::read(container.raw_reader()?)?;

    let entries: Vec<String> = require(DATA_GROUP, container.group_members(DATA_GROUP))?
        .into_iter()
        .filter(|name| classify_entry_name(name).is_accepted())
        .collect();
    if entries.is_empty() {
        return Err(DescribeError::NoImageData(DATA_GROUP.to_string()));
    }

    let x_info = require(X_PIXEL_SIZE, container.dataset(X_PIXEL_SIZE))?;
    let float_type = FloatWidth::from_element(X_PIXEL_SIZE, x_info.element_type)?;
    let x_pixel_size = require(X_PIXEL_SIZE, container.read_scalar(X_PIXEL_SIZE))?.as_f64();
    let y_pixel_size = require(Y_PIXEL_SIZE, container.read_scalar(Y_PIXEL_SIZE))?.as_f64();

    let count_info = require(X_PIXELS_IN_DETECTOR, container.dataset(X_PIXELS_IN_DETECTOR))?;
    let int_type = UIntWidth::from_element(
        X_PIXELS_IN_DETECTOR,
        count_info.element_type,
        &[UIntWidth::U32, UIntWidth::U64],
    )?;

    let mask_info = require(PIXEL_MASK, container.dataset(PIXEL_MASK))?;
    let &[height, width] = mask_info.shape.as_slice() else {
        return Err(DescribeError::Rank {
            path: PIXEL_MASK.to_string(),
            rank: 2,
            shape: shape_tuple(&mask_info.shape),
        });
    };
    let pixel_mask_checksum = lookup3(&require(PIXEL_MASK, container.read_raw(PIXEL_MASK))?, 0);
    let flatfield_checksum = lookup3(&require(FLATFIELD, container.read_raw(FLATFIELD))?, 0);

    let mut pixel_type = None;
    let mut datasets = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = entry_path(&entry);
        let info = require(&path, container.dataset(&path))?;
        if pixel_type.is_none() {
            pixel_type = Some(UIntWidth::from_element(
                &path,
                info.element_type,
                &[UIntWidth::U8, UIntWidth::U16, UIntWidth::U32],
            )?);
        }
        let &[frames, rows, cols] = info.shape.as_slice() else {
            return Err(DescribeError::Rank {
                path,
                rank: 3,
                shape: shape_tuple(&info.shape),
            });
        };
        let checksum = frame_digest(container, &path, frames)?;
        datasets.push(DatasetDigest {
            entry,
            shape: [frames, rows, cols],
            checksum,
        });
    }
    let pixel_type = pixel_type.ok_or_else(|| DescribeError::NoImageData(DATA_GROUP.to_string()))?;

    Ok(FixtureDescriptor {
        source: container.source().to_string(),
        superblock_version: superblock.version,
        width,
        height,
        x_pixel_size,
        y_pixel_size,
        float_type,
        int_type,
        pixel_type,
        flatfield_checksum,
        pixel_mask_checksum,
        datasets,
    })
}
