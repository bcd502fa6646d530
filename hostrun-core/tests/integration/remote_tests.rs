//! Remote execution against a scripted SSH transport

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hostrun_core::{
    Command, ConnectOptions, Host, HostError, NO_RETURN_CODE, RemoteBackend, RemoteConnection,
    Session, StreamChunk, Transport,
};

use super::mock_ssh::{
    MockConnector, MockTransport, Reply, SharedTerminal, TableResolver, WEB1_FQDN, WEB1_V4,
    connect,
};

fn interactive_host(reply: Reply) -> (Host, Arc<MockTransport>, SharedTerminal) {
    let (connection, transport) = connect(reply);
    let terminal = SharedTerminal::default();
    let backend = RemoteBackend::with_terminal(connection, Box::new(terminal.clone()));
    (Host::with_backend(Box::new(backend)), transport, terminal)
}

#[test]
fn connection_reports_resolution() {
    let (connection, _) = connect(Reply::default());
    assert_eq!(connection.target(), "web1");
    assert_eq!(connection.ipv4(), Some(WEB1_V4));
    assert_eq!(connection.ipv6(), None);
    assert_eq!(connection.fqdn(), Some(WEB1_FQDN));
    assert_eq!(connection.address(), IpAddr::V4(WEB1_V4));
    assert_eq!(connection.port(), 22);
    assert_eq!(connection.username(), "root");
    assert!(connection.is_connected().is_ok());
}

#[test]
fn refused_connection_is_a_connection_error() {
    let connector = MockConnector {
        transport: MockTransport::new(Reply::default()),
        refuse: true,
    };
    let err = RemoteConnection::connect_with("web1", &ConnectOptions::new(), &TableResolver, &connector)
        .unwrap_err();
    assert!(matches!(err, HostError::Connection(_)));
    assert!(err.is_connection_failure());
}

#[test]
fn unknown_target_does_not_resolve() {
    let connector = MockConnector {
        transport: MockTransport::new(Reply::default()),
        refuse: false,
    };
    let result =
        RemoteConnection::connect_with("nowhere", &ConnectOptions::new(), &TableResolver, &connector);
    assert!(matches!(result, Err(HostError::Connection(_))));
}

#[test]
fn execute_sends_formatted_line_and_captures_output() {
    let (connection, transport) = connect(Reply::output("a b\n", "warn\n", 0));
    let mut host = Host::remote(connection);
    assert_eq!(host.backend_name(), "ssh");

    let result = host.execute(&Command::new("echo").arg("a b")).unwrap();
    assert!(result.success);
    assert_eq!(result.stdout.text(), "a b\n");
    assert_eq!(result.stderr.text(), "warn\n");
    assert_eq!(host.return_code(), 0);

    let journal = transport.journal();
    assert_eq!(
        journal.lines,
        ["LANG=en_US.UTF-8 LANGUAGE=en_US.UTF-8 LC_ALL=en_US.UTF-8 echo 'a b'"]
    );
    assert_eq!(journal.agent_requests, 1);
    assert_eq!(journal.pty_requests, 0);
    assert_eq!(journal.channels_opened, 1);
    assert_eq!(journal.channels_closed, 1);
}

#[test]
fn remote_failure_is_not_an_error() {
    let (connection, _) = connect(Reply::output("", "no such file\n", 2));
    let mut host = Host::remote(connection);
    let result = host.execute(&Command::new("ls").arg("/missing")).unwrap();
    assert!(!result.success);
    assert_eq!(result.exit_code, 2);
    assert_eq!(result.stderr.text(), "no such file\n");
    assert_eq!(host.return_code(), 2);
}

#[test]
fn agent_forwarding_can_be_disabled() {
    let transport = MockTransport::new(Reply::default());
    let connector = MockConnector {
        transport: Arc::clone(&transport),
        refuse: false,
    };
    let options = ConnectOptions::new().with_forward_agent(false);
    let connection =
        RemoteConnection::connect_with("web1", &options, &TableResolver, &connector).unwrap();
    Host::remote(connection).execute(&Command::new("true")).unwrap();
    assert_eq!(transport.journal().agent_requests, 0);
}

#[test]
fn stream_yields_lines_then_one_status() {
    let (connection, transport) = connect(Reply::output("o1\no2\no3", "e1\n", 5));
    let mut host = Host::remote(connection);
    let chunks: Vec<StreamChunk> = host
        .stream(&Command::new("job"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(
        chunks,
        [
            StreamChunk::Stdout("o1".into()),
            StreamChunk::Stdout("o2".into()),
            StreamChunk::Stderr("e1".into()),
            StreamChunk::Stdout("o3".into()),
            StreamChunk::status(5),
        ]
    );
    assert_eq!(host.return_code(), 5);
    assert_eq!(transport.journal().channels_closed, 1);
}

#[test]
fn interactive_restores_terminal_after_normal_end() {
    let (mut host, transport, terminal) = interactive_host(Reply::output("screen\n", "", 0));
    let result = host.interactive(&Command::new("top")).unwrap();
    assert!(result.success);
    assert!(result.stdout.is_empty());
    assert_eq!(host.return_code(), 0);

    let state = terminal.state.lock().unwrap();
    assert!(!state.raw);
    assert_eq!((state.enters, state.restores), (1, 1));
    assert_eq!(state.output, b"screen\n");
    assert_eq!(transport.journal().pty_requests, 1);
}

#[test]
fn interactive_restores_terminal_after_transport_error() {
    let reply = Reply {
        fail_reads: true,
        ..Reply::default()
    };
    let (mut host, _, terminal) = interactive_host(reply);
    let err = host.interactive(&Command::new("top")).unwrap_err();
    assert!(matches!(err, HostError::Transport(_)));
    assert_eq!(host.return_code(), NO_RETURN_CODE);

    let state = terminal.state.lock().unwrap();
    assert!(!state.raw);
    assert_eq!((state.enters, state.restores), (1, 1));
}

#[test]
fn execute_marked_interactive_uses_the_terminal() {
    let (mut host, transport, terminal) = interactive_host(Reply::output("x", "", 0));
    let result = host
        .execute(&Command::new("vi").interactive(true))
        .unwrap();
    assert!(result.success);
    assert_eq!(transport.journal().pty_requests, 1);
    assert_eq!(terminal.state.lock().unwrap().output, b"x");
}

#[test]
fn clones_share_the_session() {
    let (connection, transport) = connect(Reply::output("ok\n", "", 0));
    let mut host = Host::remote(connection);
    let mut clone = host.try_clone().unwrap();
    clone.execute(&Command::new("true")).unwrap();
    assert_eq!(transport.journal().channels_opened, 1);

    clone.disconnect().unwrap();
    assert!(matches!(clone.is_connected(), Err(HostError::NotConnected)));
    assert!(matches!(host.is_connected(), Err(HostError::NotConnected)));
    assert!(matches!(
        host.execute(&Command::new("true")),
        Err(HostError::NotConnected)
    ));
    assert!(matches!(host.disconnect(), Err(HostError::NotConnected)));
    assert!(matches!(host.try_clone(), Err(HostError::NotConnected)));
    assert_eq!(transport.journal().closes, 1);
}

#[test]
fn session_disconnects_on_drop() {
    let (connection, transport) = connect(Reply::default());
    {
        let mut session = Session::from_host(Host::remote(connection));
        session.execute(&Command::new("true")).unwrap();
    }
    assert_eq!(transport.journal().closes, 1);
    assert!(!transport.is_alive());
}

#[test]
fn remote_timeout_aborts_a_hung_command() {
    let reply = Reply {
        hang: true,
        ..Reply::default()
    };
    let (connection, _) = connect(reply);
    let mut host = Host::remote(connection);
    host.set_control("timeout", 1u64).unwrap();

    let started = Instant::now();
    let err = host.execute(&Command::new("sleep").arg("60")).unwrap_err();
    assert!(matches!(err, HostError::Timeout { seconds: 1 }));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(host.return_code(), NO_RETURN_CODE);
}

#[test]
fn remote_open_surfaces_transport_errors() {
    let (connection, _) = connect(Reply::default());
    let mut host = Host::remote(connection);
    assert!(matches!(host.read("/etc/motd"), Err(HostError::NotFound(_))));
}

#[test]
fn stream_drains_stderr_after_stdout_closes() {
    let reply = Reply {
        stderr_after_stdout: true,
        chunk_size: 3,
        status_delay: 5,
        ..Reply::output("o1\n", "e1\ne2\ne3", 2)
    };
    let (connection, transport) = connect(reply);
    let mut host = Host::remote(connection);
    let chunks: Vec<StreamChunk> = host
        .stream(&Command::new("job"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(
        chunks,
        [
            StreamChunk::Stdout("o1".into()),
            StreamChunk::Stderr("e1".into()),
            StreamChunk::Stderr("e2".into()),
            StreamChunk::Stderr("e3".into()),
            StreamChunk::status(2),
        ]
    );
    assert_eq!(host.return_code(), 2);
    assert_eq!(transport.journal().channels_closed, 1);
}

#[test]
fn execute_waits_for_late_exit_status() {
    let reply = Reply {
        status_delay: 3,
        ..Reply::output("done\n", "", 0)
    };
    let (connection, _) = connect(reply);
    let mut host = Host::remote(connection);
    let result = host.execute(&Command::new("job")).unwrap();
    assert!(result.success);
    assert_eq!(result.stdout.text(), "done\n");
}

#[test]
fn remote_stream_times_out_while_hung() {
    let reply = Reply {
        hang: true,
        ..Reply::default()
    };
    let (connection, _) = connect(reply);
    let mut host = Host::remote(connection);
    host.set_control("timeout", 1u64).unwrap();

    let started = Instant::now();
    let items: Vec<_> = host.stream(&Command::new("tail -f log")).unwrap().collect();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(HostError::Timeout { seconds: 1 })));
    assert_eq!(host.return_code(), NO_RETURN_CODE);
}

#[test]
fn remote_stream_timeout_interrupts_a_blocked_exec() {
    let reply = Reply {
        block_exec: true,
        ..Reply::default()
    };
    let (connection, transport) = connect(reply);
    let mut host = Host::remote(connection);
    host.set_control("timeout", 1u64).unwrap();

    let started = Instant::now();
    let result = host.stream(&Command::new("job"));
    assert!(matches!(result, Err(HostError::Timeout { seconds: 1 })));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!transport.is_alive());
    assert_eq!(host.return_code(), NO_RETURN_CODE);
}
