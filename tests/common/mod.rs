#![allow(dead_code)]

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use vmprog::{Diagnostics, EntryKind, PackageBuilder, ProgramConfig, SigningKeys, Value};

pub const TEST_SEED: [u8; 32] = [7u8; 32];
pub const TEST_BUILD_ID: u32 = 0x2024_0101;

pub fn table(entries: Vec<(&str, Value)>) -> Value {
    Value::Table(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// The minimal valid program description used across the suites.
pub fn passthru_tree() -> Value {
    table(vec![
        ("program_id", Value::Str("passthru".to_owned())),
        ("program_name", Value::Str("Passthru".to_owned())),
        ("version", Value::Str("1.0.0".to_owned())),
        ("abi", Value::Str(">=1.0,<2.0".to_owned())),
    ])
}

pub fn config_bytes() -> Vec<u8> {
    let mut diag = Diagnostics::new();
    let config = ProgramConfig::from_tree(&passthru_tree(), &mut diag).unwrap();
    assert!(diag.is_empty());

    config.to_bytes().unwrap()
}

/// Sixteen bytes 0x00..0x0f standing in for a compiled bitstream.
pub fn bitstream() -> Vec<u8> {
    (0u8..16).collect()
}

/// Builds the passthru package with one hd_dual bitstream and a pinned
/// build id, optionally signed with [`TEST_SEED`].
pub fn build_package(signed: bool) -> Vec<u8> {
    let mut builder = PackageBuilder::new(config_bytes()).unwrap();
    builder
        .add_artifact(EntryKind::BitstreamHdDual, bitstream())
        .unwrap();
    builder.set_build_id(TEST_BUILD_ID);
    if signed {
        builder.sign_with(SigningKeys::from_seed(TEST_SEED));
    }

    builder.build().unwrap()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Recomputes the package digest after a test mutated the image.
pub fn reseal(package: &mut [u8]) {
    package[32..64].fill(0);
    let digest = sha256(package);
    package[32..64].copy_from_slice(&digest);
}

/// Recomputes one TOC entry's payload digest after a test mutated the
/// payload.
pub fn reseal_entry(package: &mut [u8], index: usize) {
    let entry = 64 + index * 64;
    let offset =
        u32::from_le_bytes(package[entry + 8..entry + 12].try_into().unwrap()) as usize;
    let size =
        u32::from_le_bytes(package[entry + 12..entry + 16].try_into().unwrap()) as usize;

    let digest = sha256(&package[offset..offset + size]);
    package[entry + 16..entry + 48].copy_from_slice(&digest);
}
