//! Contains everything required for assembling program packages.
//!
//! The main type is [`PackageBuilder`], which collects the configuration
//! record, the bitstream artifacts, and an optional signer, and lays out the
//! complete package image in memory.

use std::time::{SystemTime, UNIX_EPOCH};

use flagset::FlagSet;
use num_traits::ToPrimitive;

use crate::consts::*;
use crate::descriptor::SignedDescriptor;
use crate::error::Error;
use crate::pack::{put_u16, put_u32, sha256};
use crate::signing::SigningKeys;

/// A builder for program packages.
///
/// Payload order in the built image is fixed: the configuration record, the
/// signed descriptor, the signature when signing is enabled, then the
/// artifacts ascending by entry type.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    config: Vec<u8>,
    artifacts: Vec<(EntryKind, Vec<u8>)>,
    signer: Option<SigningKeys>,
    build_id: Option<u32>,
}

impl PackageBuilder {
    /// Creates a builder around a 7,372-byte configuration record.
    pub fn new(config: Vec<u8>) -> Result<Self, Error> {
        if config.len() != CONFIG_SIZE {
            return Err(Error::InvalidPayloadSize {
                kind: EntryKind::Config,
                expected: CONFIG_SIZE as u32,
                actual: config.len() as u32,
            });
        }

        Ok(PackageBuilder {
            config,
            artifacts: Vec::new(),
            signer: None,
            build_id: None,
        })
    }

    /// Adds a bitstream artifact. Each bitstream type can appear once and at
    /// most eight artifacts fit in the descriptor.
    pub fn add_artifact(&mut self, kind: EntryKind, data: Vec<u8>) -> Result<(), Error> {
        if !kind.is_bitstream() {
            return Err(Error::InvalidArtifactType {
                index: self.artifacts.len(),
                kind: kind.to_u32().unwrap(),
            });
        }
        if self.artifacts.iter().any(|(existing, _)| *existing == kind) {
            return Err(Error::DuplicateEntry(kind));
        }
        if self.artifacts.len() == MAX_ARTIFACTS {
            return Err(Error::InvalidArtifactCount(MAX_ARTIFACTS as u8 + 1));
        }

        self.artifacts.push((kind, data));
        Ok(())
    }

    /// Enables signing. The built package gets a SIGNATURE payload and the
    /// SIGNED_PKG header flag.
    pub fn sign_with(&mut self, keys: SigningKeys) {
        self.signer = Some(keys);
    }

    /// Pins the descriptor's build id. Without this the builder stamps the
    /// current Unix time, which makes otherwise-identical builds differ.
    pub fn set_build_id(&mut self, build_id: u32) {
        self.build_id = Some(build_id);
    }

    /// Lays out and returns the complete package image.
    pub fn build(&self) -> Result<Vec<u8>, Error> {
        let mut artifacts: Vec<(EntryKind, &[u8])> = self
            .artifacts
            .iter()
            .map(|(kind, data)| (*kind, data.as_slice()))
            .collect();
        artifacts.sort_by_key(|(kind, _)| kind.to_u32().unwrap());

        let build_id = self.build_id.unwrap_or_else(unix_build_id);
        let descriptor = SignedDescriptor::new(&self.config, &artifacts, build_id)?;
        let descriptor_bytes = descriptor.to_bytes();
        let signature = self
            .signer
            .as_ref()
            .map(|keys| keys.sign(&descriptor_bytes));

        let mut payloads: Vec<(EntryKind, &[u8])> = vec![
            (EntryKind::Config, self.config.as_slice()),
            (EntryKind::SignedDescriptor, &descriptor_bytes),
        ];
        if let Some(signature) = &signature {
            payloads.push((EntryKind::Signature, signature.as_slice()));
        }
        payloads.extend_from_slice(&artifacts);

        let toc_count = payloads.len();
        let toc_bytes = toc_count * TOC_ENTRY_SIZE;
        let payload_start = PACKAGE_HEADER_SIZE + toc_bytes;
        let file_size =
            payload_start + payloads.iter().map(|(_, data)| data.len()).sum::<usize>();
        if file_size > MAX_PACKAGE_SIZE {
            return Err(Error::PackageTooLarge(file_size));
        }

        let mut image = vec![0u8; file_size];

        put_u32(&mut image, HDR_MAGIC, PACKAGE_MAGIC);
        put_u16(&mut image, HDR_VERSION_MAJOR, FORMAT_VERSION_MAJOR);
        put_u16(&mut image, HDR_VERSION_MINOR, FORMAT_VERSION_MINOR);
        put_u16(&mut image, HDR_HEADER_SIZE, PACKAGE_HEADER_SIZE as u16);
        put_u32(&mut image, HDR_FILE_SIZE, file_size as u32);
        let flags = if signature.is_some() {
            FlagSet::from(PackageFlag::Signed).bits()
        } else {
            0
        };
        put_u32(&mut image, HDR_FLAGS, flags);
        put_u32(&mut image, HDR_TOC_OFFSET, PACKAGE_HEADER_SIZE as u32);
        put_u32(&mut image, HDR_TOC_BYTES, toc_bytes as u32);
        put_u32(&mut image, HDR_TOC_COUNT, toc_count as u32);

        let mut offset = payload_start;
        for (index, (kind, data)) in payloads.iter().enumerate() {
            let entry = PACKAGE_HEADER_SIZE + index * TOC_ENTRY_SIZE;
            put_u32(&mut image, entry + TOC_TYPE, kind.to_u32().unwrap());
            put_u32(&mut image, entry + TOC_FLAGS, 0);
            put_u32(&mut image, entry + TOC_OFFSET, offset as u32);
            put_u32(&mut image, entry + TOC_SIZE, data.len() as u32);
            let digest = sha256(data);
            image[entry + TOC_SHA256..entry + TOC_SHA256 + 32].copy_from_slice(&digest);

            image[offset..offset + data.len()].copy_from_slice(data);
            offset += data.len();
        }

        // The package digest covers the image with its own field zeroed,
        // which it still is at this point.
        let digest = sha256(&image);
        image[HDR_PACKAGE_SHA256..HDR_PACKAGE_SHA256 + 32].copy_from_slice(&digest);

        Ok(image)
    }
}

fn unix_build_id() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}
