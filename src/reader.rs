//! Contains all relevant structures for reading and verifying packages.
//!
//! The root of the reading is [`PackageReader`], through which it is
//! possible to access every field of a package file. [`PackageReader::verify`]
//! re-derives every format invariant from the bytes alone; the reader never
//! mutates its input.
//!
//! # Examples
//!
//! ```no_run
//! let bytes = std::fs::read("passthru.vmprog").unwrap();
//! let reader = vmprog::PackageReader::new(&bytes)?;
//! let mut diag = vmprog::Diagnostics::new();
//! reader.verify(None, &mut diag)?;
//! # Ok::<(), vmprog::Error>(())
//! ```

use std::ffi::CStr;

use ed25519_dalek::VerifyingKey;
use flagset::FlagSet;
use num_traits::FromPrimitive;

use crate::consts::*;
use crate::descriptor::SignedDescriptor;
use crate::error::Error;
use crate::pack::sha256;
use crate::signing::verify_signature;
use crate::value::{AbiRange, Diagnostics, SemVer};

/// Reads the fields of a package from a byte buffer.
///
/// Fields are read lazily at their fixed offsets; constructing the reader
/// only checks that the buffer can hold a header. Everything else is proven
/// by [`PackageReader::verify`].
#[derive(Debug, Clone)]
pub struct PackageReader<'data> {
    bytes: &'data [u8],
}

impl<'reader, 'data> PackageReader<'data> {
    /// Creates a new [`PackageReader`] over a byte buffer, or an error if
    /// the buffer cannot be a package at all.
    pub fn new(bytes: &'data [u8]) -> Result<Self, Error> {
        if bytes.len() < PACKAGE_HEADER_SIZE {
            return Err(Error::InvalidFileSize {
                expected: PACKAGE_HEADER_SIZE as u32,
                actual: bytes.len() as u32,
            });
        }
        if bytes.len() > MAX_PACKAGE_SIZE {
            return Err(Error::InvalidFileSize {
                expected: MAX_PACKAGE_SIZE as u32,
                actual: bytes.len() as u32,
            });
        }

        Ok(Self { bytes })
    }

    /// Returns a reference to the data.
    pub fn bytes(&self) -> &'data [u8] {
        self.bytes
    }

    fn read_u16(&self, index: usize) -> u16 {
        u16::from_le_bytes(self.bytes[index..index + 2].try_into().unwrap())
    }

    fn read_u32(&self, index: usize) -> u32 {
        u32::from_le_bytes(self.bytes[index..index + 4].try_into().unwrap())
    }

    /// The magic value in the first four bytes.
    pub fn magic(&self) -> u32 {
        self.read_u32(HDR_MAGIC)
    }

    /// The format version as (major, minor).
    pub fn version(&self) -> (u16, u16) {
        (
            self.read_u16(HDR_VERSION_MAJOR),
            self.read_u16(HDR_VERSION_MINOR),
        )
    }

    /// The header size stored in the header.
    pub fn header_size(&self) -> u16 {
        self.read_u16(HDR_HEADER_SIZE)
    }

    /// The total file size stored in the header.
    pub fn file_size(&self) -> u32 {
        self.read_u32(HDR_FILE_SIZE)
    }

    /// The raw header flags.
    pub fn flags(&self) -> u32 {
        self.read_u32(HDR_FLAGS)
    }

    /// Whether the SIGNED_PKG flag is set.
    pub fn is_signed(&self) -> bool {
        self.flags() & FlagSet::from(PackageFlag::Signed).bits() != 0
    }

    /// The TOC offset stored in the header.
    pub fn toc_offset(&self) -> u32 {
        self.read_u32(HDR_TOC_OFFSET)
    }

    /// The TOC size in bytes stored in the header.
    pub fn toc_bytes(&self) -> u32 {
        self.read_u32(HDR_TOC_BYTES)
    }

    /// The number of TOC entries stored in the header.
    pub fn toc_count(&self) -> u32 {
        self.read_u32(HDR_TOC_COUNT)
    }

    /// The package digest stored in the header.
    pub fn package_sha256(&self) -> &'data [u8; 32] {
        self.bytes[HDR_PACKAGE_SHA256..HDR_PACKAGE_SHA256 + 32]
            .try_into()
            .unwrap()
    }

    /// Returns a [`Toc`] object that can be used to access the TOC entries,
    /// or an error if the header's TOC fields are inconsistent.
    pub fn toc(&'reader self) -> Result<Toc<'reader, 'data>, Error> {
        Toc::new(self)
    }

    /// Proves every format invariant from the bytes alone.
    ///
    /// `public_key` is the trusted key signatures must verify against; it is
    /// required when the package's SIGNED_PKG flag is set. Non-fatal
    /// findings (non-zero reserved bytes) are reported through `diag`.
    pub fn verify(
        &self,
        public_key: Option<&VerifyingKey>,
        diag: &mut Diagnostics,
    ) -> Result<(), Error> {
        if self.magic() != PACKAGE_MAGIC {
            return Err(Error::InvalidMagic(self.magic()));
        }

        let (major, minor) = self.version();
        if (major, minor) != (FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR) {
            return Err(Error::InvalidVersion { major, minor });
        }

        if self.header_size() != PACKAGE_HEADER_SIZE as u16 {
            return Err(Error::InvalidHeaderSize(self.header_size()));
        }

        let actual = self.bytes.len() as u32;
        if self.file_size() != actual {
            return Err(Error::InvalidFileSize {
                expected: self.file_size(),
                actual,
            });
        }

        self.toc()?;

        // The package digest covers the whole file with the digest field
        // itself zeroed.
        let mut scratch = self.bytes.to_vec();
        scratch[HDR_PACKAGE_SHA256..HDR_PACKAGE_SHA256 + 32].fill(0);
        let digest = sha256(&scratch);
        if digest != *self.package_sha256() {
            return Err(Error::InvalidHash {
                offset: HDR_PACKAGE_SHA256 as u32,
                expected: *self.package_sha256(),
                actual: digest,
            });
        }

        let mut config_entry = None;
        let mut descriptor_entry = None;
        let mut signature_entry = None;

        for entry in self.toc()? {
            let kind = entry.kind().ok_or(Error::InvalidTocEntry {
                index: entry.index(),
                kind: entry.kind_raw(),
            })?;

            let payload = entry.payload()?;
            let digest = sha256(payload);
            if digest != *entry.sha256() {
                return Err(Error::InvalidHash {
                    offset: entry.offset(),
                    expected: *entry.sha256(),
                    actual: digest,
                });
            }

            match kind {
                EntryKind::Config => set_unique(&mut config_entry, entry, kind)?,
                EntryKind::SignedDescriptor => set_unique(&mut descriptor_entry, entry, kind)?,
                EntryKind::Signature => set_unique(&mut signature_entry, entry, kind)?,
                _ => {}
            }
        }

        let config_entry = config_entry.ok_or(Error::MissingEntry(EntryKind::Config))?;
        let descriptor_entry =
            descriptor_entry.ok_or(Error::MissingEntry(EntryKind::SignedDescriptor))?;

        let config = ConfigReader::new(config_entry.payload()?)?;
        config.validate(diag)?;

        let descriptor_payload = descriptor_entry.payload()?;
        let descriptor = SignedDescriptor::from_bytes(descriptor_payload, diag)?;

        if self.is_signed() != signature_entry.is_some() {
            return Err(Error::SignatureFlagMismatch);
        }
        if let Some(entry) = &signature_entry {
            let signature = entry.payload()?;
            if signature.len() != SIGNATURE_SIZE {
                return Err(Error::InvalidPayloadSize {
                    kind: EntryKind::Signature,
                    expected: SIGNATURE_SIZE as u32,
                    actual: signature.len() as u32,
                });
            }

            let key = public_key.ok_or(Error::MissingPublicKey)?;
            verify_signature(key, descriptor_payload, signature)?;
        }

        if descriptor.config_sha256 != *config_entry.sha256() {
            return Err(Error::ConfigHashMismatch);
        }
        for (index, (kind, digest)) in descriptor.artifacts.iter().enumerate() {
            let matched = self
                .toc()?
                .into_iter()
                .any(|entry| entry.kind() == Some(*kind) && entry.sha256() == digest);
            if !matched {
                return Err(Error::ArtifactMismatch { index });
            }
        }

        Ok(())
    }
}

fn set_unique<'reader, 'data>(
    slot: &mut Option<TocEntry<'reader, 'data>>,
    entry: TocEntry<'reader, 'data>,
    kind: EntryKind,
) -> Result<(), Error> {
    if slot.is_some() {
        return Err(Error::DuplicateEntry(kind));
    }

    *slot = Some(entry);
    Ok(())
}

/// An object that can be used to read the table of contents of a package.
#[derive(Debug, Clone)]
pub struct Toc<'reader, 'data> {
    pkg: &'reader PackageReader<'data>,
    count: usize,
}

impl<'reader, 'data> Toc<'reader, 'data> {
    fn new(pkg: &'reader PackageReader<'data>) -> Result<Self, Error> {
        let offset = pkg.toc_offset();
        let bytes = pkg.toc_bytes();
        let count = pkg.toc_count();

        if count > MAX_TOC_ENTRIES {
            return Err(Error::InvalidTocCount(count));
        }
        if bytes as usize != count as usize * TOC_ENTRY_SIZE {
            return Err(Error::InvalidTocSize(bytes));
        }
        if offset as usize != PACKAGE_HEADER_SIZE
            || offset as usize + bytes as usize > pkg.bytes().len()
        {
            return Err(Error::InvalidTocOffset(offset));
        }

        Ok(Self {
            pkg,
            count: count as usize,
        })
    }

    /// The number of entries in the table.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the [`TocEntry`] at the specified index in the table.
    pub fn get(&self, index: usize) -> Option<TocEntry<'reader, 'data>> {
        if index >= self.count {
            return None;
        }

        Some(TocEntry {
            pkg: self.pkg,
            offset: PACKAGE_HEADER_SIZE + index * TOC_ENTRY_SIZE,
            index,
        })
    }
}

impl<'reader, 'data> IntoIterator for Toc<'reader, 'data> {
    type Item = TocEntry<'reader, 'data>;
    type IntoIter = TocIter<'reader, 'data>;

    fn into_iter(self) -> Self::IntoIter {
        TocIter { toc: self, index: 0 }
    }
}

/// An iterator over all entries in a package's table of contents.
#[derive(Debug, Clone)]
pub struct TocIter<'reader, 'data> {
    toc: Toc<'reader, 'data>,
    index: usize,
}

impl<'reader, 'data> Iterator for TocIter<'reader, 'data> {
    type Item = TocEntry<'reader, 'data>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.toc.get(self.index);
        self.index += 1;

        entry
    }
}

/// One entry in a package's table of contents.
#[derive(Debug, Clone)]
pub struct TocEntry<'reader, 'data> {
    pkg: &'reader PackageReader<'data>,
    offset: usize,
    index: usize,
}

impl<'data> TocEntry<'_, 'data> {
    fn read_u32(&self, offset: usize) -> u32 {
        self.pkg.read_u32(self.offset + offset)
    }

    /// The index of the entry in the table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The raw entry type value.
    pub fn kind_raw(&self) -> u32 {
        self.read_u32(TOC_TYPE)
    }

    /// The entry type, or [`None`] for unknown values.
    pub fn kind(&self) -> Option<EntryKind> {
        EntryKind::from_u32(self.kind_raw())
    }

    /// The entry flags, reserved and zero in current packages.
    pub fn flags(&self) -> u32 {
        self.read_u32(TOC_FLAGS)
    }

    /// The file offset of the entry's payload.
    pub fn offset(&self) -> u32 {
        self.read_u32(TOC_OFFSET)
    }

    /// The size of the entry's payload in bytes.
    pub fn size(&self) -> u32 {
        self.read_u32(TOC_SIZE)
    }

    /// The SHA-256 digest of the entry's payload.
    pub fn sha256(&self) -> &'data [u8; 32] {
        self.pkg.bytes[self.offset + TOC_SHA256..self.offset + TOC_SHA256 + 32]
            .try_into()
            .unwrap()
    }

    /// Returns the payload bytes, or an error if the payload range reaches
    /// into the header, the TOC, or past the end of the file.
    pub fn payload(&self) -> Result<&'data [u8], Error> {
        let start = self.offset() as usize;
        let size = self.size() as usize;
        let payload_start =
            PACKAGE_HEADER_SIZE + self.pkg.toc_count() as usize * TOC_ENTRY_SIZE;

        let end = start.checked_add(size).filter(|end| {
            start >= payload_start && *end <= self.pkg.bytes.len()
        });
        let end = end.ok_or(Error::InvalidPayloadOffset {
            index: self.index,
            offset: self.offset(),
            size: self.size(),
        })?;

        Ok(&self.pkg.bytes[start..end])
    }
}

/// Reads the fields of an embedded configuration record.
#[derive(Debug, Clone)]
pub struct ConfigReader<'data> {
    bytes: &'data [u8],
}

impl<'data> ConfigReader<'data> {
    /// Wraps a configuration record payload, rejecting any other length.
    pub fn new(bytes: &'data [u8]) -> Result<Self, Error> {
        if bytes.len() != CONFIG_SIZE {
            return Err(Error::InvalidPayloadSize {
                kind: EntryKind::Config,
                expected: CONFIG_SIZE as u32,
                actual: bytes.len() as u32,
            });
        }

        Ok(Self { bytes })
    }

    fn read_u16(&self, index: usize) -> u16 {
        u16::from_le_bytes(self.bytes[index..index + 2].try_into().unwrap())
    }

    fn read_u32(&self, index: usize) -> u32 {
        u32::from_le_bytes(self.bytes[index..index + 4].try_into().unwrap())
    }

    fn field_str(&self, name: &str, offset: usize, width: usize) -> Result<&'data str, Error> {
        field_str(self.bytes, name, offset, width)
    }

    /// The unique program identifier.
    pub fn program_id(&self) -> Result<&'data str, Error> {
        self.field_str("program_id", CFG_PROGRAM_ID, CFG_PROGRAM_ID_LEN)
    }

    /// The program version.
    pub fn version(&self) -> SemVer {
        SemVer {
            major: self.read_u16(CFG_VERSION_MAJOR),
            minor: self.read_u16(CFG_VERSION_MINOR),
            patch: self.read_u16(CFG_VERSION_PATCH),
        }
    }

    /// The inclusive lower ABI endpoint as (major, minor).
    pub fn abi_min(&self) -> (u16, u16) {
        (
            self.read_u16(CFG_ABI_MIN_MAJOR),
            self.read_u16(CFG_ABI_MIN_MINOR),
        )
    }

    /// The exclusive upper ABI endpoint as (major, minor).
    pub fn abi_max(&self) -> (u16, u16) {
        (
            self.read_u16(CFG_ABI_MAX_MAJOR),
            self.read_u16(CFG_ABI_MAX_MINOR),
        )
    }

    /// The ABI compatibility range, or an error if the endpoints are not
    /// ascending.
    pub fn abi(&self) -> Result<AbiRange, Error> {
        AbiRange::new(self.abi_min(), self.abi_max())
    }

    /// The raw hardware compatibility mask.
    pub fn hw_mask(&self) -> u32 {
        self.read_u32(CFG_HW_MASK)
    }

    /// The raw core architecture value.
    pub fn core_raw(&self) -> u32 {
        self.read_u32(CFG_CORE_ID)
    }

    /// The core architecture, or [`None`] for unknown values.
    pub fn core(&self) -> Option<CoreKind> {
        CoreKind::from_u32(self.core_raw())
    }

    /// The program display name.
    pub fn program_name(&self) -> Result<&'data str, Error> {
        self.field_str("program_name", CFG_PROGRAM_NAME, CFG_PROGRAM_NAME_LEN)
    }

    /// The program author.
    pub fn author(&self) -> Result<&'data str, Error> {
        self.field_str("author", CFG_AUTHOR, CFG_AUTHOR_LEN)
    }

    /// The license identifier.
    pub fn license(&self) -> Result<&'data str, Error> {
        self.field_str("license", CFG_LICENSE, CFG_LICENSE_LEN)
    }

    /// The browsing category.
    pub fn category(&self) -> Result<&'data str, Error> {
        self.field_str("category", CFG_CATEGORY, CFG_CATEGORY_LEN)
    }

    /// The one-line description.
    pub fn description(&self) -> Result<&'data str, Error> {
        self.field_str("description", CFG_DESCRIPTION, CFG_DESCRIPTION_LEN)
    }

    /// The project URL.
    pub fn url(&self) -> Result<&'data str, Error> {
        self.field_str("url", CFG_URL, CFG_URL_LEN)
    }

    /// The number of live parameters.
    pub fn parameter_count(&self) -> u16 {
        self.read_u16(CFG_PARAMETER_COUNT)
    }

    /// Returns a [`ParameterReader`] of the parameter record at `index`, or
    /// [`None`] beyond the live parameter count.
    pub fn parameter(&self, index: usize) -> Option<ParameterReader<'data>> {
        if index >= usize::from(self.parameter_count().min(MAX_PARAMETERS as u16)) {
            return None;
        }

        let start = CFG_PARAMETERS + index * PARAMETER_SIZE;
        Some(ParameterReader {
            bytes: &self.bytes[start..start + PARAMETER_SIZE],
        })
    }

    /// Runs the record-level semantic checks: every string field is
    /// null-terminated, the ABI range ascends, and the parameter count is in
    /// range. Non-zero reserved bytes are a warning.
    pub fn validate(&self, diag: &mut Diagnostics) -> Result<(), Error> {
        for (name, offset, width) in CFG_STRING_FIELDS {
            self.field_str(name, offset, width)?;
        }

        self.abi()?;

        let count = self.parameter_count();
        if usize::from(count) > MAX_PARAMETERS {
            return Err(Error::Validation {
                field: "parameter_count".to_owned(),
                reason: format!("{count} exceeds the limit of {MAX_PARAMETERS}"),
            });
        }

        if self.bytes[CFG_RESERVED_PAD..CFG_RESERVED_PAD + 2] != [0, 0]
            || self.bytes[CFG_RESERVED_TAIL..] != [0, 0]
        {
            diag.warn("config: reserved bytes are not zero".to_owned());
        }

        Ok(())
    }
}

/// Reads the fields of one parameter record.
#[derive(Debug, Clone)]
pub struct ParameterReader<'data> {
    bytes: &'data [u8],
}

impl<'data> ParameterReader<'data> {
    fn read_u16(&self, index: usize) -> u16 {
        u16::from_le_bytes(self.bytes[index..index + 2].try_into().unwrap())
    }

    fn read_u32(&self, index: usize) -> u32 {
        u32::from_le_bytes(self.bytes[index..index + 4].try_into().unwrap())
    }

    /// The raw parameter id value.
    pub fn id_raw(&self) -> u32 {
        self.read_u32(PAR_ID)
    }

    /// The control slot, or [`None`] for unknown values.
    pub fn id(&self) -> Option<ParameterId> {
        ParameterId::from_u32(self.id_raw())
    }

    /// The control mode value.
    pub fn control_mode(&self) -> u32 {
        self.read_u32(PAR_CONTROL_MODE)
    }

    /// The lowest raw value.
    pub fn min_value(&self) -> u16 {
        self.read_u16(PAR_MIN)
    }

    /// The highest raw value.
    pub fn max_value(&self) -> u16 {
        self.read_u16(PAR_MAX)
    }

    /// The raw value selected at program load.
    pub fn initial_value(&self) -> u16 {
        self.read_u16(PAR_INITIAL)
    }

    /// The display value mapped to the lowest raw value.
    pub fn display_min_value(&self) -> i16 {
        self.read_u16(PAR_DISPLAY_MIN) as i16
    }

    /// The display value mapped to the highest raw value.
    pub fn display_max_value(&self) -> i16 {
        self.read_u16(PAR_DISPLAY_MAX) as i16
    }

    /// The number of fractional digits shown for display values.
    pub fn display_float_digits(&self) -> u8 {
        self.bytes[PAR_FLOAT_DIGITS]
    }

    /// The number of value labels; zero for a numeric parameter.
    pub fn value_label_count(&self) -> u8 {
        self.bytes[PAR_LABEL_COUNT]
    }

    /// The display name of the control.
    pub fn name_label(&self) -> Result<&'data str, Error> {
        self.field_str("name_label", PAR_NAME, PAR_LABEL_LEN)
    }

    /// The value label at `index`, or [`None`] beyond the label count.
    pub fn value_label(&self, index: usize) -> Option<Result<&'data str, Error>> {
        if index >= usize::from(self.value_label_count().min(MAX_VALUE_LABELS as u8)) {
            return None;
        }

        Some(self.field_str(
            "value_labels",
            PAR_VALUE_LABELS + index * PAR_LABEL_LEN,
            PAR_LABEL_LEN,
        ))
    }

    /// The unit suffix shown after display values.
    pub fn suffix_label(&self) -> Result<&'data str, Error> {
        self.field_str("suffix_label", PAR_SUFFIX, PAR_SUFFIX_LEN)
    }

    fn field_str(&self, name: &str, offset: usize, width: usize) -> Result<&'data str, Error> {
        field_str(self.bytes, name, offset, width)
    }
}

/// Reads a null-terminated UTF-8 string out of a fixed-width field.
fn field_str<'data>(
    bytes: &'data [u8],
    name: &str,
    offset: usize,
    width: usize,
) -> Result<&'data str, Error> {
    let field = &bytes[offset..offset + width];
    let cstr = CStr::from_bytes_until_nul(field).map_err(|_| Error::Validation {
        field: name.to_owned(),
        reason: "no null terminator within the field".to_owned(),
    })?;

    cstr.to_str().map_err(|_| Error::Validation {
        field: name.to_owned(),
        reason: "not valid UTF-8".to_owned(),
    })
}
