//! WatchTarget validation: invocation arguments in, typed target or error out.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rstest::rstest;
use treemirror_core::{MirrorOptions, TargetError, WatchTarget};

#[test]
fn existing_directory_is_accepted_and_canonicalised() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let source = tmp.child("sg180");
    source.create_dir_all().expect("mkdir");

    // Reach the same directory through a `..` detour.
    let detour = source.path().join("..").join("sg180");
    let target = WatchTarget::new(
        &detour,
        "shore:/gliders/sg180",
        tmp.path().join("sg180.log"),
        MirrorOptions::default(),
    )
    .expect("target");

    assert_eq!(target.source, std::fs::canonicalize(source.path()).unwrap());
    assert_eq!(target.destination.0, "shore:/gliders/sg180");
    tmp.child("sg180.log").assert(predicate::path::missing());
}

#[test]
fn missing_source_is_rejected() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let err = WatchTarget::new(
        tmp.path().join("nope"),
        "shore:/x",
        tmp.path().join("x.log"),
        MirrorOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TargetError::NotADirectory { .. }), "got: {err}");
    assert!(err.to_string().contains("is not a directory"));
}

#[test]
fn regular_file_source_is_rejected() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let file = tmp.child("file.txt");
    file.write_str("data").expect("write");
    let err = WatchTarget::new(
        file.path(),
        "shore:/x",
        tmp.path().join("x.log"),
        MirrorOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TargetError::NotADirectory { .. }), "got: {err}");
}

#[rstest]
#[case("")]
#[case("   ")]
fn blank_destination_is_rejected(#[case] destination: &str) {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let err = WatchTarget::new(
        tmp.path(),
        destination,
        tmp.path().join("x.log"),
        MirrorOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TargetError::EmptyDestination), "got: {err}");
}

#[test]
fn directory_as_log_path_is_rejected() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let err = WatchTarget::new(tmp.path(), "shore:/x", tmp.path(), MirrorOptions::default())
        .unwrap_err();
    assert!(matches!(err, TargetError::InvalidLogPath { .. }), "got: {err}");
}

#[test]
fn signature_ignores_log_path_and_options() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let a = WatchTarget::new(
        tmp.path(),
        "shore:/x",
        tmp.path().join("a.log"),
        MirrorOptions::default(),
    )
    .expect("a");
    let b = WatchTarget::new(
        tmp.path(),
        "shore:/x",
        tmp.path().join("b.log"),
        MirrorOptions {
            delete: true,
            ..MirrorOptions::default()
        },
    )
    .expect("b");
    assert_eq!(a.signature(), b.signature());
    assert_eq!(a.signature().key(), b.signature().key());
}
