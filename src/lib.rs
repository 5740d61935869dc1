//! h5contract Core - structural contract checks for detector master files
//!
//! The downstream reader opens a handful of fixed paths and trusts what it
//! finds there. This crate checks those paths before the reader does and
//! produces lookup3 digests for compatibility fixtures.
//!
//! 1. Signature First - nothing else is read from a file with a bad header
//! 2. First Fatal Wins - one broken assumption invalidates the rest
//! 3. Contract Is Data - required paths and types live in one table
//! 4. Deterministic Digests - same bytes, same seed, same checksum

pub mod container;
pub mod contract;
pub mod fixture;
pub mod hashing;
pub mod pipeline;
pub mod print;
pub mod superblock;
pub mod validation;

pub use container::{Container, ContainerError, DatasetInfo, ElementType, MemoryContainer, ScalarValue};
#[cfg(feature = "hdf5")]
pub use container::Hdf5Container;
pub use fixture::{describe, DescribeError, FixtureDescriptor};
pub use hashing::{hashlittle2, lookup3, rolling_lookup3, RollingChecksum};
pub use pipeline::{BatchPipeline, BatchPolicy, BatchSummary, FileOutcome, PipelineError};
pub use superblock::{Superblock, SuperblockError};
pub use validation::{validate, Diagnostic, Severity, ValidationReport, Validator};

pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
