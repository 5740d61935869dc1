//! Superblock signature and version.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use thiserror::Error;

/// Eight-byte HDF5 format signature at offset zero.
pub const SIGNATURE: &[u8; 8] = b"\x89HDF\r\n\x1a\n";

/// Superblock versions the downstream reader can resolve paths for.
pub const SUPPORTED_VERSIONS: [u8; 3] = [0, 2, 3];

#[derive(Error, Debug)]
pub enum SuperblockError {
    #[error("not a HDF5 file (signature {found:02x?})")]
    InvalidSignature { found: Vec<u8> },
    #[error("superblock version {0} not supported")]
    UnsupportedVersion(u8),
    #[error("file too short to hold a superblock ({0} bytes)")]
    Truncated(usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub version: u8,
}

impl Superblock {
    pub fn read<R: Read>(reader: R) -> Result<Self, SuperblockError> {
        let mut header = Vec::with_capacity(SIGNATURE.len() + 1);
        reader
            .take(SIGNATURE.len() as u64 + 1)
            .read_to_end(&mut header)?;

        if header.len() < SIGNATURE.len() || &header[..SIGNATURE.len()] != SIGNATURE {
            let end = header.len().min(SIGNATURE.len());
            return Err(SuperblockError::InvalidSignature {
                found: header[..end].to_vec(),
            });
        }
        let version = *header
            .get(SIGNATURE.len())
            .ok_or(SuperblockError::Truncated(header.len()))?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(SuperblockError::UnsupportedVersion(version));
        }
        Ok(Self { version })
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self, SuperblockError> {
        Self::read(File::open(path)?)
    }
}
