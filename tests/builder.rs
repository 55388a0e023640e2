use vmprog::{
    Diagnostics, EntryKind, Error, PackageBuilder, PackageReader, SignedDescriptor, SigningKeys,
    CONFIG_SIZE, DESCRIPTOR_SIZE, MAX_PACKAGE_SIZE, PACKAGE_HEADER_SIZE, PACKAGE_MAGIC,
    TOC_ENTRY_SIZE,
};

mod common;

#[test]
fn minimal_unsigned_package() {
    let package = common::build_package(false);

    // header, three TOC entries, config, descriptor, bitstream
    let expected_size =
        PACKAGE_HEADER_SIZE + 3 * TOC_ENTRY_SIZE + CONFIG_SIZE + DESCRIPTOR_SIZE + 16;
    assert_eq!(package.len(), expected_size);
    assert_eq!(package.len(), 7976);
    assert_eq!(&package[0..4], b"VMPG");

    let reader = PackageReader::new(&package).unwrap();
    assert_eq!(reader.magic(), PACKAGE_MAGIC);
    assert_eq!(reader.version(), (1, 0));
    assert_eq!(reader.header_size(), 64);
    assert_eq!(reader.file_size() as usize, package.len());
    assert_eq!(reader.flags(), 0);
    assert!(!reader.is_signed());
    assert_eq!(reader.toc_offset(), 64);
    assert_eq!(reader.toc_count(), 3);
    assert_eq!(reader.toc_bytes(), 3 * 64);

    let toc: Vec<_> = reader.toc().unwrap().into_iter().collect();
    let kinds: Vec<_> = toc.iter().map(|entry| entry.kind().unwrap()).collect();
    assert_eq!(
        kinds,
        [
            EntryKind::Config,
            EntryKind::SignedDescriptor,
            EntryKind::BitstreamHdDual,
        ]
    );

    // payloads are laid out back to back and end at the file size
    let payload_start = PACKAGE_HEADER_SIZE + 3 * TOC_ENTRY_SIZE;
    assert_eq!(toc[0].offset() as usize, payload_start);
    assert_eq!(toc[0].size() as usize, CONFIG_SIZE);
    assert_eq!(toc[1].offset() as usize, payload_start + CONFIG_SIZE);
    assert_eq!(toc[1].size() as usize, DESCRIPTOR_SIZE);
    assert_eq!(
        toc[2].offset() as usize,
        payload_start + CONFIG_SIZE + DESCRIPTOR_SIZE
    );
    assert_eq!(toc[2].size(), 16);
    assert_eq!(
        toc[2].offset() as usize + toc[2].size() as usize,
        package.len()
    );

    for entry in &toc {
        assert_eq!(*entry.sha256(), common::sha256(entry.payload().unwrap()));
        assert_eq!(entry.flags(), 0);
    }

    let mut diag = Diagnostics::new();
    let descriptor =
        SignedDescriptor::from_bytes(toc[1].payload().unwrap(), &mut diag).unwrap();
    assert_eq!(descriptor.artifacts.len(), 1);
    assert_eq!(descriptor.artifacts[0].0, EntryKind::BitstreamHdDual);
    assert_eq!(descriptor.artifacts[0].1, common::sha256(&common::bitstream()));
    assert_eq!(descriptor.config_sha256, *toc[0].sha256());
    assert_eq!(descriptor.flags, 0);
    assert_eq!(descriptor.build_id, common::TEST_BUILD_ID);
}

#[test]
fn package_digest_covers_zeroed_field() {
    let package = common::build_package(false);

    let mut scratch = package.clone();
    scratch[32..64].fill(0);
    assert_eq!(package[32..64], common::sha256(&scratch));
}

#[test]
fn signed_package() {
    let package = common::build_package(true);

    let reader = PackageReader::new(&package).unwrap();
    assert_eq!(reader.flags(), 0x0001);
    assert!(reader.is_signed());
    assert_eq!(reader.toc_count(), 4);

    let toc: Vec<_> = reader.toc().unwrap().into_iter().collect();
    assert_eq!(toc[2].kind(), Some(EntryKind::Signature));
    assert_eq!(toc[2].size(), 64);

    let keys = SigningKeys::from_seed(common::TEST_SEED);
    let mut diag = Diagnostics::new();
    reader.verify(Some(keys.verifying_key()), &mut diag).unwrap();
    assert!(diag.is_empty());
}

#[test]
fn builds_are_deterministic() {
    assert_eq!(common::build_package(true), common::build_package(true));
    assert_eq!(common::build_package(false), common::build_package(false));
}

#[test]
fn artifacts_are_ordered_by_type() {
    let mut builder = PackageBuilder::new(common::config_bytes()).unwrap();
    builder
        .add_artifact(EntryKind::BitstreamHdDual, vec![1, 2, 3])
        .unwrap();
    builder
        .add_artifact(EntryKind::BitstreamSdAnalog, vec![4, 5, 6])
        .unwrap();
    builder.set_build_id(0);

    let package = builder.build().unwrap();
    let reader = PackageReader::new(&package).unwrap();
    let kinds: Vec<_> = reader
        .toc()
        .unwrap()
        .into_iter()
        .map(|entry| entry.kind().unwrap())
        .collect();
    assert_eq!(
        kinds,
        [
            EntryKind::Config,
            EntryKind::SignedDescriptor,
            EntryKind::BitstreamSdAnalog,
            EntryKind::BitstreamHdDual,
        ]
    );
}

#[test]
fn duplicate_artifact_rejected() {
    let mut builder = PackageBuilder::new(common::config_bytes()).unwrap();
    builder
        .add_artifact(EntryKind::BitstreamSdHdmi, vec![1])
        .unwrap();

    let err = builder
        .add_artifact(EntryKind::BitstreamSdHdmi, vec![2])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DuplicateEntry(EntryKind::BitstreamSdHdmi)
    ));
}

#[test]
fn non_bitstream_artifact_rejected() {
    let mut builder = PackageBuilder::new(common::config_bytes()).unwrap();

    let err = builder.add_artifact(EntryKind::Config, vec![1]).unwrap_err();
    assert!(matches!(err, Error::InvalidArtifactType { kind: 1, .. }));
}

#[test]
fn wrong_config_size_rejected() {
    let err = PackageBuilder::new(vec![0u8; 7240]).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidPayloadSize {
            kind: EntryKind::Config,
            expected: 7372,
            actual: 7240,
        }
    ));
}

#[test]
fn oversized_package_rejected() {
    let mut builder = PackageBuilder::new(common::config_bytes()).unwrap();
    builder
        .add_artifact(EntryKind::BitstreamHdHdmi, vec![0u8; MAX_PACKAGE_SIZE])
        .unwrap();

    let err = builder.build().unwrap_err();
    assert!(matches!(err, Error::PackageTooLarge(_)));
}

#[test]
fn unsigned_and_signed_verify_round_trip() {
    for signed in [false, true] {
        let package = common::build_package(signed);
        let keys = SigningKeys::from_seed(common::TEST_SEED);
        let key = signed.then(|| *keys.verifying_key());

        let mut diag = Diagnostics::new();
        PackageReader::new(&package)
            .unwrap()
            .verify(key.as_ref(), &mut diag)
            .unwrap();
        assert!(diag.is_empty());
    }
}
