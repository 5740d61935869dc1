//! libhdf5-backed container.

use std::fs::File as RawFile;
use std::io::Read;
use std::path::{Path, PathBuf};

use ::hdf5::types::{FloatSize, IntSize, TypeDescriptor};
use ::hdf5::{Dataset, File, LocationType};
use ndarray::s;

use super::{Container, ContainerError, DatasetInfo, ElementType};

/// Read-only handle on an HDF5 file. The library handle closes on drop.
pub struct Hdf5Container {
    path: PathBuf,
    source: String,
    file: File,
}

impl Hdf5Container {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContainerError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        tracing::debug!(path = %path.display(), "opened HDF5 file");
        Ok(Self {
            source: path.display().to_string(),
            path,
            file,
        })
    }

    /// Checks each prefix of `path`, since libhdf5 rejects link queries
    /// through a missing intermediate group.
    fn exists(&self, path: &str) -> bool {
        let mut prefix = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            prefix.push('/');
            prefix.push_str(part);
            if !self.file.link_exists(&prefix) {
                return false;
            }
        }
        true
    }

    /// Type of the object behind `path`. A link that exists but does not
    /// resolve (an external link to a missing file) keeps the library error.
    fn object_type(&self, path: &str) -> Result<LocationType, ContainerError> {
        if !self.exists(path) {
            return Err(ContainerError::NotFound(path.to_string()));
        }
        Ok(self.file.loc_type_by_name(path)?)
    }

    fn open_dataset(&self, path: &str) -> Result<Dataset, ContainerError> {
        match self.object_type(path)? {
            LocationType::Dataset => Ok(self.file.dataset(path)?),
            _ => Err(ContainerError::NotADataset(path.to_string())),
        }
    }
}

fn element_type(dataset: &Dataset, path: &str) -> Result<ElementType, ContainerError> {
    let descriptor = dataset.dtype()?.to_descriptor()?;
    let element_type = match descriptor {
        TypeDescriptor::Integer(IntSize::U1) => ElementType::Int8,
        TypeDescriptor::Integer(IntSize::U2) => ElementType::Int16,
        TypeDescriptor::Integer(IntSize::U4) => ElementType::Int32,
        TypeDescriptor::Integer(IntSize::U8) => ElementType::Int64,
        TypeDescriptor::Unsigned(IntSize::U1) => ElementType::UInt8,
        TypeDescriptor::Unsigned(IntSize::U2) => ElementType::UInt16,
        TypeDescriptor::Unsigned(IntSize::U4) => ElementType::UInt32,
        TypeDescriptor::Unsigned(IntSize::U8) => ElementType::UInt64,
        TypeDescriptor::Float(FloatSize::U4) => ElementType::Float32,
        TypeDescriptor::Float(FloatSize::U8) => ElementType::Float64,
        other => {
            return Err(ContainerError::UnsupportedType {
                path: path.to_string(),
                found: format!("{other:?}"),
            })
        }
    };
    Ok(element_type)
}

/// Flatten typed values into little-endian bytes.
macro_rules! le_bytes {
    ($values:expr) => {
        $values
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect::<Vec<u8>>()
    };
}

impl Container for Hdf5Container {
    fn source(&self) -> &str {
        &self.source
    }

    fn raw_reader(&self) -> Result<Box<dyn Read + '_>, ContainerError> {
        Ok(Box::new(RawFile::open(&self.path)?))
    }

    fn group_members(&self, path: &str) -> Result<Vec<String>, ContainerError> {
        match self.object_type(path)? {
            LocationType::Group => Ok(self.file.group(path)?.member_names()?),
            _ => Err(ContainerError::NotAGroup(path.to_string())),
        }
    }

    fn dataset(&self, path: &str) -> Result<DatasetInfo, ContainerError> {
        let dataset = self.open_dataset(path)?;
        Ok(DatasetInfo {
            element_type: element_type(&dataset, path)?,
            shape: dataset.shape(),
            chunks: dataset.chunk(),
        })
    }

    fn read_raw(&self, path: &str) -> Result<Vec<u8>, ContainerError> {
        let dataset = self.open_dataset(path)?;
        let bytes = match element_type(&dataset, path)? {
            ElementType::Int8 => le_bytes!(dataset.read_raw::<i8>()?),
            ElementType::Int16 => le_bytes!(dataset.read_raw::<i16>()?),
            ElementType::Int32 => le_bytes!(dataset.read_raw::<i32>()?),
            ElementType::Int64 => le_bytes!(dataset.read_raw::<i64>()?),
            ElementType::UInt8 => le_bytes!(dataset.read_raw::<u8>()?),
            ElementType::UInt16 => le_bytes!(dataset.read_raw::<u16>()?),
            ElementType::UInt32 => le_bytes!(dataset.read_raw::<u32>()?),
            ElementType::UInt64 => le_bytes!(dataset.read_raw::<u64>()?),
            ElementType::Float32 => le_bytes!(dataset.read_raw::<f32>()?),
            ElementType::Float64 => le_bytes!(dataset.read_raw::<f64>()?),
        };
        Ok(bytes)
    }

    /// Reads a single `(1, rows, cols)` hyperslab instead of the whole payload.
    fn read_frame(&self, path: &str, frame: usize) -> Result<Vec<u8>, ContainerError> {
        let dataset = self.open_dataset(path)?;
        let shape = dataset.shape();
        if shape.len() != 3 || frame >= shape[0] {
            return Err(ContainerError::FrameOutOfRange {
                path: path.to_string(),
                frame,
                shape,
            });
        }
        let selection = s![frame, .., ..];
        let bytes = match element_type(&dataset, path)? {
            ElementType::Int8 => le_bytes!(dataset.read_slice_2d::<i8, _>(selection)?),
            ElementType::Int16 => le_bytes!(dataset.read_slice_2d::<i16, _>(selection)?),
            ElementType::Int32 => le_bytes!(dataset.read_slice_2d::<i32, _>(selection)?),
            ElementType::Int64 => le_bytes!(dataset.read_slice_2d::<i64, _>(selection)?),
            ElementType::UInt8 => le_bytes!(dataset.read_slice_2d::<u8, _>(selection)?),
            ElementType::UInt16 => le_bytes!(dataset.read_slice_2d::<u16, _>(selection)?),
            ElementType::UInt32 => le_bytes!(dataset.read_slice_2d::<u32, _>(selection)?),
            ElementType::UInt64 => le_bytes!(dataset.read_slice_2d::<u64, _>(selection)?),
            ElementType::Float32 => le_bytes!(dataset.read_slice_2d::<f32, _>(selection)?),
            ElementType::Float64 => le_bytes!(dataset.read_slice_2d::<f64, _>(selection)?),
        };
        Ok(bytes)
    }
}
