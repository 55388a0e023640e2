use vmprog::{Diagnostics, EntryKind, Error, PackageReader, SigningKeys};

mod common;

// Payload offsets in the minimal unsigned package (3 TOC entries).
const CONFIG_START: usize = 64 + 3 * 64;
const DESCRIPTOR_START: usize = CONFIG_START + 7372;

fn verify(package: &[u8]) -> (Result<(), Error>, Diagnostics) {
    let mut diag = Diagnostics::new();
    let result = PackageReader::new(package)
        .unwrap()
        .verify(None, &mut diag);

    (result, diag)
}

#[test]
fn truncated_package_rejected() {
    let mut package = common::build_package(false);
    package.pop();

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::InvalidFileSize { expected: 7976, actual: 7975 }
    ));
}

#[test]
fn short_buffer_rejected_outright() {
    assert!(matches!(
        PackageReader::new(&[0u8; 40]).unwrap_err(),
        Error::InvalidFileSize { .. }
    ));
}

#[test]
fn bad_magic_rejected() {
    let mut package = common::build_package(false);
    package[0] ^= 0xff;

    let (result, _) = verify(&package);
    assert!(matches!(result.unwrap_err(), Error::InvalidMagic(_)));
}

#[test]
fn bad_version_rejected() {
    let mut package = common::build_package(false);
    package[4] = 2;

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::InvalidVersion { major: 2, minor: 0 }
    ));
}

#[test]
fn bad_header_size_rejected() {
    let mut package = common::build_package(false);
    package[8] = 32;

    let (result, _) = verify(&package);
    assert!(matches!(result.unwrap_err(), Error::InvalidHeaderSize(32)));
}

#[test]
fn toc_header_inconsistencies_rejected() {
    // TOC not directly after the header
    let mut package = common::build_package(false);
    package[20] = 128;
    let (result, _) = verify(&package);
    assert!(matches!(result.unwrap_err(), Error::InvalidTocOffset(128)));

    // entry count over the format limit, with toc_bytes kept consistent
    let mut package = common::build_package(false);
    package[24..28].copy_from_slice(&(300u32 * 64).to_le_bytes());
    package[28..32].copy_from_slice(&300u32.to_le_bytes());
    let (result, _) = verify(&package);
    assert!(matches!(result.unwrap_err(), Error::InvalidTocCount(300)));

    // toc_bytes disagreeing with the entry count
    let mut package = common::build_package(false);
    package[24..28].copy_from_slice(&(4u32 * 64).to_le_bytes());
    let (result, _) = verify(&package);
    assert!(matches!(result.unwrap_err(), Error::InvalidTocSize(256)));
}

#[test]
fn package_hash_tamper_detected() {
    // flip one bitstream byte without fixing anything up
    let mut package = common::build_package(false);
    let last = package.len() - 1;
    package[last] ^= 0x01;

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::InvalidHash { offset: 32, .. }
    ));
}

#[test]
fn entry_hash_tamper_detected() {
    // flip one bitstream byte, fix up only the package digest
    let mut package = common::build_package(false);
    let last = package.len() - 1;
    package[last] ^= 0x01;
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::InvalidHash { offset: 7960, .. }
    ));
}

#[test]
fn every_flipped_bit_is_detected() {
    let package = common::build_package(true);
    let keys = SigningKeys::from_seed(common::TEST_SEED);
    let key = *keys.verifying_key();

    let mut scratch = package.clone();
    for index in 0..scratch.len() {
        scratch[index] ^= 0x01;

        let mut diag = Diagnostics::new();
        let result = match PackageReader::new(&scratch) {
            Ok(reader) => reader.verify(Some(&key), &mut diag),
            Err(error) => Err(error),
        };
        assert!(result.is_err(), "flip at byte {index} went undetected");

        scratch[index] ^= 0x01;
    }
    assert_eq!(scratch, package);
}

#[test]
fn resigned_signature_tamper_fails_ed25519() {
    // 4 entries: config, descriptor, signature, bitstream
    let mut package = common::build_package(true);
    let signature_start = 64 + 4 * 64 + 7372 + 332;
    package[signature_start] ^= 0x01;

    // fix the digests up so verification reaches the signature check
    common::reseal_entry(&mut package, 2);
    common::reseal(&mut package);

    let keys = SigningKeys::from_seed(common::TEST_SEED);
    let mut diag = Diagnostics::new();
    let result = PackageReader::new(&package)
        .unwrap()
        .verify(Some(keys.verifying_key()), &mut diag);
    assert!(matches!(result.unwrap_err(), Error::InvalidSignature));
}

#[test]
fn signed_package_needs_a_key() {
    let package = common::build_package(true);

    let (result, _) = verify(&package);
    assert!(matches!(result.unwrap_err(), Error::MissingPublicKey));
}

#[test]
fn wrong_public_key_rejected() {
    let package = common::build_package(true);
    let other = SigningKeys::from_seed([8u8; 32]);

    let mut diag = Diagnostics::new();
    let result = PackageReader::new(&package)
        .unwrap()
        .verify(Some(other.verifying_key()), &mut diag);
    assert!(matches!(result.unwrap_err(), Error::InvalidSignature));
}

#[test]
fn signed_flag_without_signature_entry_rejected() {
    let mut package = common::build_package(false);
    package[16] |= 0x01;
    common::reseal(&mut package);

    let keys = SigningKeys::from_seed(common::TEST_SEED);
    let mut diag = Diagnostics::new();
    let result = PackageReader::new(&package)
        .unwrap()
        .verify(Some(keys.verifying_key()), &mut diag);
    assert!(matches!(
        result.unwrap_err(),
        Error::SignatureFlagMismatch
    ));
}

#[test]
fn signature_entry_without_flag_rejected() {
    let mut package = common::build_package(true);
    package[16] &= !0x01;
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::SignatureFlagMismatch
    ));
}

#[test]
fn inverted_abi_in_config_payload_rejected() {
    let mut package = common::build_package(false);
    // abi_min_major lives at offset 70 of the config record
    package[CONFIG_START + 70..CONFIG_START + 72].copy_from_slice(&9u16.to_le_bytes());
    common::reseal_entry(&mut package, 0);
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::InvalidAbiRange { min_major: 9, .. }
    ));
}

#[test]
fn unterminated_config_string_rejected() {
    let mut package = common::build_package(false);
    package[CONFIG_START..CONFIG_START + 64].fill(b'a');
    common::reseal_entry(&mut package, 0);
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::Validation { ref field, .. } if field == "program_id"
    ));
}

#[test]
fn nonzero_reserved_bytes_warn_only() {
    let mut package = common::build_package(false);
    package[CONFIG_START + 7370] = 1;
    let config_hash = common::sha256(&package[CONFIG_START..CONFIG_START + 7372]);
    package[DESCRIPTOR_START..DESCRIPTOR_START + 32].copy_from_slice(&config_hash);
    common::reseal_entry(&mut package, 0);
    common::reseal_entry(&mut package, 1);
    common::reseal(&mut package);

    let (result, diag) = verify(&package);
    result.unwrap();
    assert_eq!(diag.warnings().len(), 1);
}

#[test]
fn descriptor_config_hash_mismatch_rejected() {
    let mut package = common::build_package(false);
    package[DESCRIPTOR_START] ^= 0xff;
    common::reseal_entry(&mut package, 1);
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(result.unwrap_err(), Error::ConfigHashMismatch));
}

#[test]
fn descriptor_artifact_mismatch_rejected() {
    let mut package = common::build_package(false);
    // first artifact digest lives at offset 36 + 4 of the descriptor
    package[DESCRIPTOR_START + 40] ^= 0xff;
    common::reseal_entry(&mut package, 1);
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::ArtifactMismatch { index: 0 }
    ));
}

#[test]
fn unknown_entry_type_rejected() {
    let mut package = common::build_package(false);
    package[64 + 2 * 64..64 + 2 * 64 + 4].copy_from_slice(&99u32.to_le_bytes());
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::InvalidTocEntry { index: 2, kind: 99 }
    ));
}

#[test]
fn payload_reaching_outside_the_file_rejected() {
    let mut package = common::build_package(false);
    let entry = 64 + 2 * 64;
    let package_len = package.len() as u32;
    package[entry + 8..entry + 12].copy_from_slice(&package_len.to_le_bytes());
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::InvalidPayloadOffset { index: 2, .. }
    ));
}

#[test]
fn payload_overlapping_the_header_rejected() {
    let mut package = common::build_package(false);
    package[64 + 8..64 + 12].copy_from_slice(&0u32.to_le_bytes());
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::InvalidPayloadOffset { index: 0, .. }
    ));
}

#[test]
fn missing_config_entry_rejected() {
    let mut package = common::build_package(false);
    // retype the CONFIG entry as a generic bitstream; its digest still holds
    package[64..64 + 4].copy_from_slice(&4u32.to_le_bytes());
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::MissingEntry(EntryKind::Config)
    ));
}

#[test]
fn duplicate_config_entry_rejected() {
    let mut package = common::build_package(false);
    package[64 + 2 * 64..64 + 2 * 64 + 4].copy_from_slice(&1u32.to_le_bytes());
    common::reseal(&mut package);

    let (result, _) = verify(&package);
    assert!(matches!(
        result.unwrap_err(),
        Error::DuplicateEntry(EntryKind::Config)
    ));
}
