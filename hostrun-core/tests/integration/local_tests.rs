//! Local execution through `/bin/sh`

use std::collections::BTreeMap;

use hostrun_core::{Command, Host, LocalBackend, Output, StreamChunk};

/// Local host without the locale prefix, so raw shell syntax can be the base
fn bare_host() -> Host {
    let mut host = Host::local();
    host.set_control("locale", "").unwrap();
    host
}

#[test]
fn execute_captures_stdout_verbatim() {
    let mut host = Host::local();
    let result = host.execute(&Command::new("echo").arg("hello")).unwrap();
    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.text(), "hello\n");
    assert!(result.stderr.is_empty());
    assert_eq!(host.return_code(), 0);
}

#[test]
fn non_zero_exit_is_a_result_not_an_error() {
    let mut host = bare_host();
    let result = host.execute(&Command::new("echo oops >&2; exit 3")).unwrap();
    assert!(!result.success);
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stderr.text(), "oops\n");
    assert_eq!(host.return_code(), 3);
}

#[test]
fn escaped_argument_is_passed_literally() {
    let mut host = Host::local();
    let result = host.execute(&Command::new("echo").arg("a b;ls")).unwrap();
    assert_eq!(result.stdout.text(), "a b;ls\n");
}

#[test]
fn unescaped_argument_is_shell_syntax() {
    let mut host = bare_host();
    host.set_control("escape_args", false).unwrap();
    let result = host.execute(&Command::new("echo").arg("a;echo b")).unwrap();
    assert_eq!(result.stdout.lines(), ["a", "b"]);
}

#[test]
fn options_and_placement() {
    let mut host = bare_host();
    let command = Command::new("printf").arg("%s|").arg("x").opt("v", false);
    assert_eq!(host.execute(&command).unwrap().stdout.text(), "x|");

    host.set_control("options_place", "after").unwrap();
    let command = Command::new("head").arg("-").opt("n", 1);
    let formatted = host.format(&command);
    assert_eq!(formatted.line, "head - -n 1");
}

#[test]
fn envs_and_locale_reach_the_command() {
    let mut host = Host::local();
    let mut envs = BTreeMap::new();
    envs.insert("HOSTRUN_TEST".to_string(), "two words".to_string());
    host.set_control("envs", envs).unwrap();
    host.set_control("locale", "C").unwrap();

    let result = host
        .execute(&Command::new("printenv").arg("HOSTRUN_TEST").arg("LC_ALL"))
        .unwrap();
    assert_eq!(result.stdout.lines(), ["two words", "C"]);
}

#[test]
fn shell_wrapping_runs_through_the_named_shell() {
    let mut host = bare_host();
    host.set_control("shell", "/bin/sh").unwrap();
    let result = host.execute(&Command::new("echo").arg("it's")).unwrap();
    assert_eq!(result.stdout.text(), "it's\n");
}

#[test]
fn raw_decode_keeps_bytes() {
    let mut host = bare_host();
    host.set_control("decode", "").unwrap();
    let result = host.execute(&Command::new("printf '\\377\\001'")).unwrap();
    assert_eq!(result.stdout, Output::Bytes(vec![0xff, 0x01]));
}

#[test]
fn redirections_write_and_append() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out file.txt");
    let target = path.to_string_lossy().into_owned();

    let mut host = Host::local();
    host.execute(&Command::new("echo").arg("one").stdout(target.clone()))
        .unwrap();
    host.execute(&Command::new("echo").arg("two").stdout(format!("+{target}")))
        .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
}

#[test]
fn stream_yields_every_line_then_one_status() {
    let mut host = bare_host();
    let script = "echo o1; echo e1 >&2; echo o2; echo e2 >&2; printf o3";
    let chunks: Vec<StreamChunk> = host
        .stream(&Command::new(script))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let stdout: Vec<&str> = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Stdout(line) => Some(line.as_str()),
            _ => None,
        })
        .collect();
    let stderr: Vec<&str> = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Stderr(line) => Some(line.as_str()),
            _ => None,
        })
        .collect();
    let statuses = chunks
        .iter()
        .filter(|c| matches!(c, StreamChunk::Status { .. }))
        .count();

    assert_eq!(stdout, ["o1", "o2", "o3"]);
    assert_eq!(stderr, ["e1", "e2"]);
    assert_eq!(statuses, 1);
    assert_eq!(chunks.last(), Some(&StreamChunk::status(0)));
    assert_eq!(host.return_code(), 0);
}

#[test]
fn stream_status_carries_exit_code() {
    let mut host = bare_host();
    let last = host
        .stream(&Command::new("echo x; exit 4"))
        .unwrap()
        .last()
        .unwrap()
        .unwrap();
    assert_eq!(
        last,
        StreamChunk::Status {
            success: false,
            exit_code: 4
        }
    );
    assert_eq!(host.return_code(), 4);
}

#[test]
fn dropping_a_stream_early_is_clean() {
    let mut host = bare_host();
    {
        let mut stream = host
            .stream(&Command::new("echo first; sleep 30"))
            .unwrap();
        assert_eq!(
            stream.next().unwrap().unwrap(),
            StreamChunk::Stdout("first".into())
        );
    }
    let result = host.execute(&Command::new("true")).unwrap();
    assert!(result.success);
}

#[test]
fn interactive_flag_runs_attached() {
    let mut host = bare_host();
    let result = host
        .execute(&Command::new("exit 2").interactive(true))
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.exit_code, 2);
    assert!(result.stdout.is_empty());
    assert_eq!(host.return_code(), 2);
}

#[test]
fn missing_interpreter_reports_failed_result() {
    let backend = LocalBackend::new().with_interpreter("/nonexistent/bin/sh");
    let mut host = Host::with_backend(Box::new(backend));
    let result = host.execute(&Command::new("echo").arg("x")).unwrap();
    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    assert!(result.stdout.is_empty());
    assert!(!result.stderr.text().is_empty());
    assert_eq!(host.return_code(), -1);
}
