//! Producer-side end-to-end tests against a real directory tree.

use std::fs;
use std::sync::Arc;

use sluice_config::{CollisionPolicy, EndpointSettings};
use sluice_core::NamePattern;
use sluice_events::EventBus;
use sluice_fsops::{Body, FileProducer, FsOpsError};
use sluice_telemetry::Metrics;
use sluice_test_support::fixtures::{temp_root, write_file};

fn producer_at(root: &std::path::Path, mut settings: EndpointSettings) -> FileProducer {
    settings.directory = root.to_path_buf();
    let settings = Arc::new(settings.validated().expect("valid settings"));
    FileProducer::new(settings, EventBus::new(), Metrics::new().expect("metrics"))
        .expect("producer")
}

#[tokio::test]
async fn nested_target_is_created_with_auto_create() {
    let root = temp_root();
    let producer = producer_at(root.path(), EndpointSettings::new("placeholder"));

    let target = producer
        .produce("out/sub/file.txt", Some(Body::Bytes(b"x")), None)
        .await
        .expect("produce");

    assert!(root.path().join("out").is_dir());
    assert!(root.path().join("out/sub").is_dir());
    assert_eq!(fs::read(&target).expect("read"), b"x");
}

#[tokio::test]
async fn append_policy_preserves_existing_content() {
    let root = temp_root();
    write_file(root.path(), "b.txt", b"old");
    let mut settings = EndpointSettings::new("placeholder");
    settings.file_exist = CollisionPolicy::Append;
    let producer = producer_at(root.path(), settings);

    producer
        .produce("b.txt", Some(Body::Bytes(b"new")), None)
        .await
        .expect("produce");

    assert_eq!(fs::read(root.path().join("b.txt")).expect("read"), b"oldnew");
}

#[tokio::test]
async fn collision_policies_behave_per_contract() {
    let root = temp_root();

    // Override truncates and rewrites.
    write_file(root.path(), "o.txt", b"previous");
    let producer = producer_at(root.path(), EndpointSettings::new("placeholder"));
    producer
        .produce("o.txt", Some(Body::Bytes(b"new")), None)
        .await
        .expect("override");
    assert_eq!(fs::read(root.path().join("o.txt")).expect("read"), b"new");

    // Fail raises without touching the target.
    write_file(root.path(), "f.txt", b"keep");
    let mut settings = EndpointSettings::new("placeholder");
    settings.file_exist = CollisionPolicy::Fail;
    let producer = producer_at(root.path(), settings);
    let err = producer
        .produce("f.txt", Some(Body::Bytes(b"new")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FsOpsError::TargetExists { .. }));
    assert_eq!(fs::read(root.path().join("f.txt")).expect("read"), b"keep");

    // Ignore leaves the target untouched and reports success.
    write_file(root.path(), "i.txt", b"keep");
    let mut settings = EndpointSettings::new("placeholder");
    settings.file_exist = CollisionPolicy::Ignore;
    let producer = producer_at(root.path(), settings);
    producer
        .produce("i.txt", Some(Body::Bytes(b"new")), None)
        .await
        .expect("ignore");
    assert_eq!(fs::read(root.path().join("i.txt")).expect("read"), b"keep");

    // Move relocates the prior file before the new write.
    write_file(root.path(), "m.txt", b"prior");
    let mut settings = EndpointSettings::new("placeholder");
    settings.file_exist = CollisionPolicy::Move;
    settings.move_existing = Some(NamePattern::parse("${file:name}.old").expect("pattern"));
    let producer = producer_at(root.path(), settings);
    producer
        .produce("m.txt", Some(Body::Bytes(b"new")), None)
        .await
        .expect("move");
    assert_eq!(fs::read(root.path().join("m.txt")).expect("read"), b"new");
    assert_eq!(
        fs::read(root.path().join("m.txt.old")).expect("read"),
        b"prior"
    );
}

#[tokio::test]
async fn jail_rejects_parent_escapes_only_when_enabled() {
    let outer = temp_root();
    let inner = outer.path().join("root");
    fs::create_dir(&inner).expect("mkdir");

    let producer = producer_at(&inner, EndpointSettings::new("placeholder"));
    let err = producer
        .produce("../escape.txt", Some(Body::Bytes(b"x")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FsOpsError::OutsideRoot { .. }));
    assert!(!outer.path().join("escape.txt").exists());

    let mut settings = EndpointSettings::new("placeholder");
    settings.jail_starting_directory = false;
    let producer = producer_at(&inner, settings);
    producer
        .produce("../escape.txt", Some(Body::Bytes(b"x")), None)
        .await
        .expect("unjailed produce");
    assert!(outer.path().join("escape.txt").exists());
}

#[tokio::test]
async fn temp_staging_leaves_no_artifacts() {
    let root = temp_root();
    let mut settings = EndpointSettings::new("placeholder");
    settings.temp_file_name = Some(NamePattern::parse("${file:onlyname}.writing").expect("pattern"));
    let producer = producer_at(root.path(), settings);

    producer
        .produce("payload.bin", Some(Body::Bytes(b"data")), None)
        .await
        .expect("produce");

    assert_eq!(
        fs::read(root.path().join("payload.bin")).expect("read"),
        b"data"
    );
    let leftovers: Vec<_> = fs::read_dir(root.path())
        .expect("list")
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .ends_with(".writing")
        })
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn done_and_checksum_sidecars_are_emitted() {
    let root = temp_root();
    let mut settings = EndpointSettings::new("placeholder");
    settings.done_file_name =
        Some(sluice_core::DoneFilePattern::parse("${file:name}.done").expect("pattern"));
    settings.checksum_file_algorithm = Some(sluice_config::ChecksumAlgorithm::Sha256);
    let producer = producer_at(root.path(), settings);

    producer
        .produce("report.csv", Some(Body::Bytes(b"abc")), None)
        .await
        .expect("produce");

    assert!(root.path().join("report.csv.done").exists());
    let digest = fs::read_to_string(root.path().join("report.csv.sha256")).expect("read digest");
    assert_eq!(
        digest,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[tokio::test]
async fn concurrent_writers_to_one_name_serialise() {
    let root = temp_root();
    let producer = Arc::new(producer_at(root.path(), EndpointSettings::new("placeholder")));

    let mut handles = Vec::new();
    for index in 0..8 {
        let producer = Arc::clone(&producer);
        handles.push(tokio::spawn(async move {
            let body = format!("writer-{index}");
            producer
                .produce("contested.txt", Some(Body::Bytes(body.as_bytes())), None)
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("produce");
    }

    // Whichever writer went last, the file is a complete single payload.
    let content = fs::read_to_string(root.path().join("contested.txt")).expect("read");
    assert!(content.starts_with("writer-"));
    assert_eq!(content.len(), "writer-0".len());
}
