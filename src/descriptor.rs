//! The signed descriptor, the package's canonical signing manifest.
//!
//! The descriptor pins the SHA-256 of the configuration record and of every
//! artifact payload, and is the only input to the Ed25519 signature. A
//! firmware loader that trusts the descriptor's signature can therefore
//! trust every payload it covers.

use num_traits::{FromPrimitive, ToPrimitive};

use crate::consts::*;
use crate::error::Error;
use crate::pack::{put_u32, put_u8, sha256};
use crate::value::Diagnostics;

/// The 332-byte manifest covering the config record and the artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDescriptor {
    /// SHA-256 of the configuration record payload
    pub config_sha256: [u8; 32],
    /// Artifact (type, SHA-256) pairs, at most eight
    pub artifacts: Vec<(EntryKind, [u8; 32])>,
    /// Descriptor flags, currently always zero
    pub flags: u32,
    /// Build tag distinguishing otherwise-identical builds
    pub build_id: u32,
}

impl SignedDescriptor {
    /// Computes a descriptor over a config record and artifact payloads.
    pub fn new(
        config: &[u8],
        artifacts: &[(EntryKind, &[u8])],
        build_id: u32,
    ) -> Result<Self, Error> {
        if artifacts.len() > MAX_ARTIFACTS {
            return Err(Error::InvalidArtifactCount(artifacts.len() as u8));
        }
        for (index, (kind, _)) in artifacts.iter().enumerate() {
            if !kind.is_bitstream() {
                return Err(Error::InvalidArtifactType {
                    index,
                    kind: kind.to_u32().unwrap(),
                });
            }
        }

        Ok(SignedDescriptor {
            config_sha256: sha256(config),
            artifacts: artifacts
                .iter()
                .map(|(kind, data)| (*kind, sha256(data)))
                .collect(),
            flags: 0,
            build_id,
        })
    }

    /// Serializes the descriptor to its 332-byte wire form. Artifact slots
    /// beyond the artifact count are left zero.
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut buf = [0u8; DESCRIPTOR_SIZE];

        buf[DESC_CONFIG_SHA256..DESC_CONFIG_SHA256 + 32].copy_from_slice(&self.config_sha256);
        put_u8(&mut buf, DESC_ARTIFACT_COUNT, self.artifacts.len() as u8);
        for (index, (kind, digest)) in self.artifacts.iter().enumerate() {
            let start = DESC_ARTIFACTS + index * DESC_ARTIFACT_SIZE;
            put_u32(&mut buf, start, kind.to_u32().unwrap());
            buf[start + 4..start + 4 + 32].copy_from_slice(digest);
        }
        put_u32(&mut buf, DESC_FLAGS, self.flags);
        put_u32(&mut buf, DESC_BUILD_ID, self.build_id);

        buf
    }

    /// Parses a descriptor payload, validating the artifact count and the
    /// artifact types. Non-zero reserved padding is a warning, not an error.
    pub fn from_bytes(bytes: &[u8], diag: &mut Diagnostics) -> Result<Self, Error> {
        if bytes.len() != DESCRIPTOR_SIZE {
            return Err(Error::InvalidPayloadSize {
                kind: EntryKind::SignedDescriptor,
                expected: DESCRIPTOR_SIZE as u32,
                actual: bytes.len() as u32,
            });
        }

        let artifact_count = bytes[DESC_ARTIFACT_COUNT];
        if usize::from(artifact_count) > MAX_ARTIFACTS {
            return Err(Error::InvalidArtifactCount(artifact_count));
        }

        if bytes[DESC_ARTIFACT_COUNT + 1..DESC_ARTIFACTS] != [0, 0, 0] {
            diag.warn("descriptor: reserved padding is not zero".to_owned());
        }

        let mut artifacts = Vec::with_capacity(usize::from(artifact_count));
        for index in 0..usize::from(artifact_count) {
            let start = DESC_ARTIFACTS + index * DESC_ARTIFACT_SIZE;
            let raw_kind = u32::from_le_bytes(bytes[start..start + 4].try_into().unwrap());
            let kind = EntryKind::from_u32(raw_kind)
                .filter(|kind| kind.is_bitstream())
                .ok_or(Error::InvalidArtifactType {
                    index,
                    kind: raw_kind,
                })?;
            let digest: [u8; 32] = bytes[start + 4..start + 4 + 32].try_into().unwrap();
            artifacts.push((kind, digest));
        }

        Ok(SignedDescriptor {
            config_sha256: bytes[DESC_CONFIG_SHA256..DESC_CONFIG_SHA256 + 32]
                .try_into()
                .unwrap(),
            artifacts,
            flags: u32::from_le_bytes(bytes[DESC_FLAGS..DESC_FLAGS + 4].try_into().unwrap()),
            build_id: u32::from_le_bytes(
                bytes[DESC_BUILD_ID..DESC_BUILD_ID + 4].try_into().unwrap(),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_reparse() {
        let config = vec![0xaa; CONFIG_SIZE];
        let bitstream = [0x55u8; 16];
        let descriptor = SignedDescriptor::new(
            &config,
            &[(EntryKind::BitstreamHdDual, &bitstream)],
            0x1234_5678,
        )
        .unwrap();

        let bytes = descriptor.to_bytes();
        assert_eq!(bytes[DESC_ARTIFACT_COUNT], 1);
        assert_eq!(bytes[DESC_ARTIFACTS..DESC_ARTIFACTS + 4], [10, 0, 0, 0]);
        assert_eq!(bytes[DESC_BUILD_ID..], [0x78, 0x56, 0x34, 0x12]);
        // unused artifact slots stay zero
        assert!(bytes[DESC_ARTIFACTS + DESC_ARTIFACT_SIZE..DESC_FLAGS]
            .iter()
            .all(|byte| *byte == 0));

        let mut diag = Diagnostics::new();
        let reparsed = SignedDescriptor::from_bytes(&bytes, &mut diag).unwrap();
        assert_eq!(reparsed, descriptor);
        assert!(diag.is_empty());
    }

    #[test]
    fn too_many_artifacts_rejected() {
        let config = vec![0u8; CONFIG_SIZE];
        let bitstream = [0u8; 4];
        let artifacts: Vec<(EntryKind, &[u8])> = (0..9)
            .map(|_| (EntryKind::BitstreamSdAnalog, &bitstream[..]))
            .collect();

        let err = SignedDescriptor::new(&config, &artifacts, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArtifactCount(9)));
    }

    #[test]
    fn non_bitstream_artifact_rejected() {
        let config = vec![0u8; CONFIG_SIZE];
        let err =
            SignedDescriptor::new(&config, &[(EntryKind::Config, &config[..])], 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArtifactType { index: 0, kind: 1 }));
    }

    #[test]
    fn reserved_padding_warns() {
        let config = vec![0u8; CONFIG_SIZE];
        let descriptor = SignedDescriptor::new(&config, &[], 7).unwrap();
        let mut bytes = descriptor.to_bytes();
        bytes[DESC_ARTIFACT_COUNT + 1] = 1;

        let mut diag = Diagnostics::new();
        SignedDescriptor::from_bytes(&bytes, &mut diag).unwrap();
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn wrong_size_rejected() {
        let mut diag = Diagnostics::new();
        let err = SignedDescriptor::from_bytes(&[0u8; 331], &mut diag).unwrap_err();
        assert!(matches!(err, Error::InvalidPayloadSize { .. }));
    }
}
