//! File access through `Host`

use std::io::{Read, Seek, SeekFrom, Write};

use hostrun_core::{Host, HostError, OpenMode};

#[test]
fn write_append_read() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("notes.txt").to_string_lossy().into_owned();

    let mut host = Host::local();
    host.write(&target, b"one\n").unwrap();
    host.append(&target, b"two\n").unwrap();
    assert_eq!(host.read(&target).unwrap(), b"one\ntwo\n");

    host.write(&target, b"reset\n").unwrap();
    assert_eq!(host.read(&target).unwrap(), b"reset\n");
}

#[test]
fn handle_supports_seek_and_size() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("data.bin").to_string_lossy().into_owned();

    let mut host = Host::local();
    host.write(&target, b"0123456789").unwrap();

    let mode: OpenMode = "r+b".parse().unwrap();
    let mut file = host.open(&target, mode).unwrap();
    assert_eq!(file.size().unwrap(), 10);

    file.seek(SeekFrom::Start(4)).unwrap();
    file.write_all(b"xy").unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut content = String::new();
    file.read_to_string(&mut content).unwrap();
    assert_eq!(content, "0123xy6789");
}

#[test]
fn reading_a_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing").to_string_lossy().into_owned();
    let mut host = Host::local();
    assert!(matches!(host.read(&target), Err(HostError::Io(_))));
}

#[test]
fn invalid_open_mode_is_rejected() {
    assert!("x".parse::<OpenMode>().is_err());
    assert_eq!("rt".parse::<OpenMode>().unwrap(), OpenMode::Read);
    assert_eq!("ab".parse::<OpenMode>().unwrap(), OpenMode::Append);
}
