//! Deadlines on local executions

use std::time::{Duration, Instant};

use hostrun_core::{Command, Host, HostError, NO_RETURN_CODE, StreamChunk};

fn sleep(seconds: u32) -> Command {
    Command::new("sleep").arg(seconds.to_string())
}

#[test]
fn execute_times_out_near_the_deadline() {
    let mut host = Host::local();
    host.set_control("timeout", 1u64).unwrap();

    let started = Instant::now();
    let err = host.execute(&sleep(5)).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, HostError::Timeout { seconds: 1 }));
    assert!(err.is_timeout());
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    assert_eq!(host.return_code(), NO_RETURN_CODE);
}

#[test]
fn fast_command_is_unaffected_by_deadline() {
    let mut host = Host::local();
    host.set_control("timeout", 5u64).unwrap();
    let result = host.execute(&Command::new("echo").arg("quick")).unwrap();
    assert_eq!(result.stdout.text(), "quick\n");
}

#[test]
fn scoped_timeout_is_restored() {
    let mut host = Host::local();
    let started = Instant::now();
    let result = host.with_controls([("timeout", 1u64)], |h| h.execute(&sleep(5)));
    assert!(matches!(result, Err(HostError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(host.controls().timeout, 0);
}

#[test]
fn stream_times_out_and_ends() {
    let mut host = Host::local();
    host.set_control("locale", "").unwrap();
    host.set_control("timeout", 1u64).unwrap();

    let started = Instant::now();
    let items: Vec<_> = host
        .stream(&Command::new("echo start; sleep 5"))
        .unwrap()
        .collect();
    assert!(started.elapsed() < Duration::from_secs(3));

    assert!(matches!(items.first(), Some(Ok(_))));
    assert!(matches!(
        items.last(),
        Some(Err(HostError::Timeout { seconds: 1 }))
    ));
    assert_eq!(host.return_code(), NO_RETURN_CODE);
}

#[test]
fn stream_times_out_after_pipes_close() {
    let mut host = Host::local();
    host.set_control("locale", "").unwrap();
    host.set_control("timeout", 1u64).unwrap();

    let started = Instant::now();
    let items: Vec<_> = host
        .stream(&Command::new("echo hi; exec >/dev/null 2>&1; sleep 5"))
        .unwrap()
        .collect();
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");

    assert!(matches!(items.first(), Some(Ok(StreamChunk::Stdout(line))) if line == "hi"));
    assert!(matches!(
        items.last(),
        Some(Err(HostError::Timeout { seconds: 1 }))
    ));
    assert!(
        !items
            .iter()
            .any(|item| matches!(item, Ok(StreamChunk::Status { .. })))
    );
    assert_eq!(host.return_code(), NO_RETURN_CODE);
}

#[test]
fn interactive_times_out() {
    let mut host = Host::local();
    host.set_control("timeout", 1u64).unwrap();
    let started = Instant::now();
    let err = host.interactive(&sleep(5)).unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(3));
}
