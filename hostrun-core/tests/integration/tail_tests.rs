//! Following local files through `Host::tail`

use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;

use hostrun_core::{Backend, HandleSource, Host, LocalBackend, OpenMode, TailFollower};

const INTERVAL: Duration = Duration::from_millis(20);

fn append(path: &std::path::Path, data: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(data.as_bytes()).unwrap();
}

#[test]
fn follows_appends_and_truncation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(&path, "A\nB\n").unwrap();

    let mut host = Host::local();
    let target = path.to_string_lossy().into_owned();
    let mut tail = host.tail(&target, INTERVAL);

    assert_eq!(tail.next().unwrap().unwrap(), "A");
    assert_eq!(tail.next().unwrap().unwrap(), "B");

    append(&path, "C\n");
    assert_eq!(tail.next().unwrap().unwrap(), "C");

    std::fs::write(&path, "D\n").unwrap();
    assert_eq!(tail.next().unwrap().unwrap(), "D");
    assert_eq!(tail.last_size(), 2);
}

#[test]
fn replaced_file_is_reread() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(&path, "old line\n").unwrap();

    let mut host = Host::local();
    let target = path.to_string_lossy().into_owned();
    let mut tail = host.tail(&target, INTERVAL);
    assert_eq!(tail.next().unwrap().unwrap(), "old line");

    let rotated = dir.path().join("app.log.1");
    std::fs::rename(&path, &rotated).unwrap();
    std::fs::write(&path, "new\n").unwrap();
    assert_eq!(tail.next().unwrap().unwrap(), "new");
}

#[test]
fn missing_file_yields_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("absent").to_string_lossy().into_owned();
    let mut host = Host::local();
    let mut tail = host.tail(&target, INTERVAL);
    assert!(tail.next().unwrap().is_err());
}

#[test]
fn open_handle_skipping_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(&path, "before\n").unwrap();

    let handle = LocalBackend::new()
        .open(&path.to_string_lossy(), OpenMode::Read)
        .unwrap();
    let mut tail = TailFollower::new(HandleSource::new(handle), INTERVAL).skip_existing();

    let writer = std::thread::spawn({
        let path = path.clone();
        move || {
            std::thread::sleep(Duration::from_millis(200));
            append(&path, "after\n");
        }
    });
    assert_eq!(tail.next().unwrap().unwrap(), "after");
    writer.join().unwrap();
}
