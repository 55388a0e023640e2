use thiserror::Error;

use crate::consts::EntryKind;

/// Represents an error raised while building or verifying a package.
///
/// Machine-readable callers distinguish cases by variant; the messages are
/// for humans.
#[derive(Debug, Error)]
pub enum Error {
    /// The package length is out of range or disagrees with the header's
    /// file_size field.
    #[error("invalid file size: expected {expected} bytes, got {actual}")]
    InvalidFileSize {
        /// The length the header (or the format's limits) requires
        expected: u32,
        /// The actual buffer length
        actual: u32,
    },

    /// The first four bytes were not the package magic.
    #[error("invalid magic 0x{0:08x}")]
    InvalidMagic(u32),

    /// The header's format version is not supported.
    #[error("unsupported format version {major}.{minor}")]
    InvalidVersion {
        /// Stored major version
        major: u16,
        /// Stored minor version
        minor: u16,
    },

    /// The header's header_size field was not 64.
    #[error("invalid header size {0}")]
    InvalidHeaderSize(u16),

    /// The TOC does not start directly after the header or runs past the
    /// end of the file.
    #[error("invalid TOC offset {0}")]
    InvalidTocOffset(u32),

    /// The header's toc_bytes field disagrees with its entry count.
    #[error("invalid TOC size {0}")]
    InvalidTocSize(u32),

    /// The header claims more TOC entries than the format allows.
    #[error("invalid TOC entry count {0}")]
    InvalidTocCount(u32),

    /// A recomputed SHA-256 digest does not match the stored one.
    #[error(
        "digest mismatch for bytes at offset {offset}: expected {}, got {}",
        hex::encode(.expected),
        hex::encode(.actual)
    )]
    InvalidHash {
        /// File offset of the digested bytes
        offset: u32,
        /// The digest stored in the file
        expected: [u8; 32],
        /// The digest recomputed from the bytes
        actual: [u8; 32],
    },

    /// A TOC entry's payload range lies outside the payload region.
    #[error("TOC entry {index}: payload [{offset}, {offset}+{size}) outside the payload region")]
    InvalidPayloadOffset {
        /// Index of the offending TOC entry
        index: usize,
        /// Stored payload offset
        offset: u32,
        /// Stored payload size
        size: u32,
    },

    /// A TOC entry carries an unknown entry type.
    #[error("TOC entry {index}: unknown entry type {kind}")]
    InvalidTocEntry {
        /// Index of the offending TOC entry
        index: usize,
        /// The unrecognized type value
        kind: u32,
    },

    /// A fixed-size payload has the wrong length.
    #[error("{} payload is {actual} bytes, expected {expected}", .kind.name())]
    InvalidPayloadSize {
        /// Entry type of the payload
        kind: EntryKind,
        /// Required payload size
        expected: u32,
        /// Stored payload size
        actual: u32,
    },

    /// A required entry type is absent.
    #[error("package has no {} entry", .0.name())]
    MissingEntry(EntryKind),

    /// An entry type that must be unique appears more than once.
    #[error("package has more than one {} entry", .0.name())]
    DuplicateEntry(EntryKind),

    /// The SIGNED_PKG header flag and the presence of a SIGNATURE entry
    /// disagree.
    #[error("signature entry does not match the header's signed flag")]
    SignatureFlagMismatch,

    /// Ed25519 verification of the descriptor signature failed.
    #[error("Ed25519 signature verification failed")]
    InvalidSignature,

    /// The package is signed but no trusted public key was supplied.
    #[error("package is signed but no public key was provided")]
    MissingPublicKey,

    /// The ABI range endpoints are not strictly ascending.
    #[error("ABI range >={min_major}.{min_minor},<{max_major}.{max_minor} is not ascending")]
    InvalidAbiRange {
        /// Lower endpoint major version
        min_major: u16,
        /// Lower endpoint minor version
        min_minor: u16,
        /// Upper endpoint major version
        max_major: u16,
        /// Upper endpoint minor version
        max_minor: u16,
    },

    /// A string does not fit its fixed-width field with a null terminator.
    #[error("{field}: string of {len} bytes does not fit in {max} bytes")]
    StringTooLong {
        /// Name of the offending field
        field: String,
        /// UTF-8 byte length of the string
        len: usize,
        /// Width of the field, including the terminator
        max: usize,
    },

    /// A value in the program description failed semantic validation.
    #[error("{field}: {reason}")]
    Validation {
        /// Name of the offending field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The descriptor's artifact count exceeds the format limit.
    #[error("descriptor artifact count {0} exceeds 8")]
    InvalidArtifactCount(u8),

    /// A descriptor artifact's type is outside the bitstream range.
    #[error("descriptor artifact {index}: type {kind} is not a bitstream type")]
    InvalidArtifactType {
        /// Index of the artifact record
        index: usize,
        /// The stored type value
        kind: u32,
    },

    /// The descriptor's config hash does not match the CONFIG entry.
    #[error("descriptor config hash does not match the CONFIG entry")]
    ConfigHashMismatch,

    /// A descriptor artifact has no matching TOC entry.
    #[error("descriptor artifact {index} has no matching TOC entry")]
    ArtifactMismatch {
        /// Index of the artifact record
        index: usize,
    },

    /// The assembled package would exceed the 1 MiB limit.
    #[error("package size {0} exceeds the 1 MiB limit")]
    PackageTooLarge(usize),

    /// A key file does not hold exactly 32 bytes.
    #[error("key file {path}: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Path of the offending key file
        path: String,
        /// Required key length
        expected: usize,
        /// Actual file length
        actual: usize,
    },

    /// A key file does not hold a valid Ed25519 key.
    #[error("key file {0} does not contain a valid Ed25519 public key")]
    InvalidKey(String),

    /// An I/O error at the file boundary.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
