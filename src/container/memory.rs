//! In-memory container.
//!
//! Holds a header prefix, a group tree and typed payloads. Used to synthesize
//! files that satisfy (or deliberately break) the contract without libhdf5.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use super::{Container, ContainerError, DatasetInfo, ElementType};
use crate::superblock::SIGNATURE;

#[derive(Debug, Clone)]
struct StoredDataset {
    info: DatasetInfo,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
enum Node {
    /// Member names in insertion order.
    Group(Vec<String>),
    Dataset(StoredDataset),
}

#[derive(Debug, Clone)]
pub struct MemoryContainer {
    source: String,
    header: Vec<u8>,
    nodes: BTreeMap<String, Node>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

fn split_parent(path: &str) -> Option<(&str, &str)> {
    let (parent, name) = path.rsplit_once('/')?;
    Some((if parent.is_empty() { "/" } else { parent }, name))
}

impl MemoryContainer {
    /// Empty container whose header carries the given superblock version.
    pub fn new(source: impl Into<String>, superblock_version: u8) -> Self {
        let mut header = SIGNATURE.to_vec();
        header.push(superblock_version);
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Group(Vec::new()));
        Self {
            source: source.into(),
            header,
            nodes,
        }
    }

    /// Replace the leading file bytes (signature and version).
    pub fn with_header(mut self, header: impl Into<Vec<u8>>) -> Self {
        self.header = header.into();
        self
    }

    pub fn header_mut(&mut self) -> &mut Vec<u8> {
        &mut self.header
    }

    /// Create `path` and any missing parent groups.
    pub fn add_group(&mut self, path: &str) -> &mut Self {
        let path = normalize(path);
        if path == "/" || self.nodes.contains_key(&path) {
            return self;
        }
        if let Some((parent, name)) = split_parent(&path) {
            let (parent, name) = (parent.to_string(), name.to_string());
            self.add_group(&parent);
            if let Some(Node::Group(members)) = self.nodes.get_mut(&parent) {
                members.push(name);
            }
        }
        self.nodes.insert(path, Node::Group(Vec::new()));
        self
    }

    /// Store a dataset from little-endian element bytes.
    ///
    /// Parent groups are created on demand; an existing node is replaced.
    pub fn add_dataset(
        &mut self,
        path: &str,
        element_type: ElementType,
        shape: &[usize],
        chunks: Option<&[usize]>,
        bytes: Vec<u8>,
    ) -> &mut Self {
        let path = normalize(path);
        if let Some((parent, name)) = split_parent(&path) {
            let (parent, name) = (parent.to_string(), name.to_string());
            self.add_group(&parent);
            if let Some(Node::Group(members)) = self.nodes.get_mut(&parent) {
                if !members.contains(&name) {
                    members.push(name);
                }
            }
        }
        let info = DatasetInfo {
            element_type,
            shape: shape.to_vec(),
            chunks: chunks.map(<[usize]>::to_vec),
        };
        self.nodes.insert(path, Node::Dataset(StoredDataset { info, bytes }));
        self
    }

    /// Zero-filled dataset of the given shape.
    pub fn add_zeroed(
        &mut self,
        path: &str,
        element_type: ElementType,
        shape: &[usize],
        chunks: Option<&[usize]>,
    ) -> &mut Self {
        let len = shape.iter().product::<usize>() * element_type.size();
        self.add_dataset(path, element_type, shape, chunks, vec![0u8; len])
    }

    pub fn add_scalar_f32(&mut self, path: &str, value: f32) -> &mut Self {
        self.add_dataset(path, ElementType::Float32, &[], None, value.to_le_bytes().to_vec())
    }

    pub fn add_scalar_f64(&mut self, path: &str, value: f64) -> &mut Self {
        self.add_dataset(path, ElementType::Float64, &[], None, value.to_le_bytes().to_vec())
    }

    pub fn add_scalar_u32(&mut self, path: &str, value: u32) -> &mut Self {
        self.add_dataset(path, ElementType::UInt32, &[], None, value.to_le_bytes().to_vec())
    }

    pub fn add_scalar_u64(&mut self, path: &str, value: u64) -> &mut Self {
        self.add_dataset(path, ElementType::UInt64, &[], None, value.to_le_bytes().to_vec())
    }

    pub fn add_scalar_i64(&mut self, path: &str, value: i64) -> &mut Self {
        self.add_dataset(path, ElementType::Int64, &[], None, value.to_le_bytes().to_vec())
    }

    /// Remove a dataset or a whole subtree.
    pub fn remove(&mut self, path: &str) -> &mut Self {
        let path = normalize(path);
        let prefix = format!("{path}/");
        self.nodes.retain(|key, _| key != &path && !key.starts_with(&prefix));
        if let Some((parent, name)) = split_parent(&path) {
            if let Some(Node::Group(members)) = self.nodes.get_mut(parent) {
                members.retain(|member| member != name);
            }
        }
        self
    }

    fn node(&self, path: &str) -> Result<&Node, ContainerError> {
        let key = normalize(path);
        self.nodes
            .get(&key)
            .ok_or(ContainerError::NotFound(key))
    }

    fn stored(&self, path: &str) -> Result<&StoredDataset, ContainerError> {
        match self.node(path)? {
            Node::Dataset(stored) => Ok(stored),
            Node::Group(_) => Err(ContainerError::NotADataset(normalize(path))),
        }
    }
}

impl Container for MemoryContainer {
    fn source(&self) -> &str {
        &self.source
    }

    fn raw_reader(&self) -> Result<Box<dyn Read + '_>, ContainerError> {
        Ok(Box::new(Cursor::new(self.header.as_slice())))
    }

    fn group_members(&self, path: &str) -> Result<Vec<String>, ContainerError> {
        match self.node(path)? {
            Node::Group(members) => Ok(members.clone()),
            Node::Dataset(_) => Err(ContainerError::NotAGroup(normalize(path))),
        }
    }

    fn dataset(&self, path: &str) -> Result<DatasetInfo, ContainerError> {
        Ok(self.stored(path)?.info.clone())
    }

    fn read_raw(&self, path: &str) -> Result<Vec<u8>, ContainerError> {
        let stored = self.stored(path)?;
        let expected = stored.info.byte_len();
        if stored.bytes.len() != expected {
            return Err(ContainerError::SizeMismatch {
                path: normalize(path),
                expected,
                found: stored.bytes.len(),
            });
        }
        Ok(stored.bytes.clone())
    }

    /// Slices the stored payload instead of copying it whole.
    fn read_frame(&self, path: &str, frame: usize) -> Result<Vec<u8>, ContainerError> {
        let stored = self.stored(path)?;
        let info = &stored.info;
        if stored.bytes.len() != info.byte_len() {
            return Err(ContainerError::SizeMismatch {
                path: normalize(path),
                expected: info.byte_len(),
                found: stored.bytes.len(),
            });
        }
        let frame_len = match info.frame_byte_len() {
            Some(len) if frame < info.shape[0] => len,
            _ => {
                return Err(ContainerError::FrameOutOfRange {
                    path: normalize(path),
                    frame,
                    shape: info.shape.clone(),
                })
            }
        };
        let start = frame * frame_len;
        Ok(stored.bytes[start..start + frame_len].to_vec())
    }
}
