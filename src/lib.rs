//! vmprog is a library for building and verifying VMPROG program packages.
//!
//! A package is a single content-addressed file bundling an FPGA video
//! program's configuration record with one or more compiled bitstreams. A
//! fixed header is followed by a table of contents and the payloads; every
//! payload is covered by a SHA-256 digest, the whole file by a package
//! digest computed with the digest field zeroed, and a detached Ed25519
//! signature over a compact descriptor authenticates the lot.
//!
//! Building and verifying are pure functions over bytes: the same inputs
//! produce the same package, and [`PackageReader::verify`] re-derives every
//! invariant from the file alone.
//!
//! # Examples
//!
//! ```no_run
//! use vmprog::{Diagnostics, EntryKind, PackageBuilder, ProgramConfig, Value};
//!
//! # fn demo(tree: Value, bitstream: Vec<u8>) -> Result<(), vmprog::Error> {
//! let mut diag = Diagnostics::new();
//! let config = ProgramConfig::from_tree(&tree, &mut diag)?;
//!
//! let mut builder = PackageBuilder::new(config.to_bytes()?)?;
//! builder.add_artifact(EntryKind::BitstreamHdDual, bitstream)?;
//! let package = builder.build()?;
//!
//! vmprog::PackageReader::new(&package)?.verify(None, &mut diag)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod builder;
pub mod config;
mod consts;
pub mod descriptor;
mod error;
mod pack;
pub mod reader;
pub mod signing;
pub mod value;

pub use ed25519_dalek;
pub use flagset;

#[doc(inline)]
pub use builder::PackageBuilder;
pub use config::{ParameterConfig, ProgramConfig};
pub use consts::{
    CoreKind, EntryKind, HardwareFlag, PackageFlag, ParameterId, BITSTREAM_FILES, CONFIG_SIZE,
    CONTROL_MODE_LINEAR, DESCRIPTOR_SIZE, DIGEST_SIZE, FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR,
    KEY_SIZE, MAX_ARTIFACTS, MAX_CONTROL_MODE, MAX_PACKAGE_SIZE, MAX_PARAMETERS,
    MAX_PARAMETER_VALUE, MAX_TOC_ENTRIES, MAX_VALUE_LABELS, PACKAGE_HEADER_SIZE, PACKAGE_MAGIC,
    PARAMETER_SIZE, SIGNATURE_SIZE, TOC_ENTRY_SIZE,
};
pub use descriptor::SignedDescriptor;
pub use error::Error;
#[doc(inline)]
pub use reader::{ConfigReader, PackageReader, ParameterReader, Toc, TocEntry};
pub use signing::{load_verifying_key, SigningKeys};
pub use value::{AbiRange, Diagnostics, SemVer, Value};
