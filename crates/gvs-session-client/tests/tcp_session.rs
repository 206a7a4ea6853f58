// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sessions over real loopback sockets.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Read;
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use gvs_proto::wire::decode_message;
use gvs_proto::{ClientTextPayload, Message};
use gvs_session_client::{ConnectionSession, ConnectionState, MessageSink};

#[test]
fn connect_to_dead_port_respects_max_wait() {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let started = Instant::now();
    let session =
        ConnectionSession::connect(&format!("127.0.0.1:{port}"), Duration::from_millis(100));
    let elapsed = started.elapsed();
    assert!(!session.is_connected());
    assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
}

#[test]
fn sink_text_reaches_the_server() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        bytes
    });

    let mut session = ConnectionSession::connect(&addr, Duration::from_secs(2));
    assert!(session.is_connected());
    let mut sink = MessageSink::new(&session, "loopback");
    sink.append("hello ").append(&42);
    assert!(sink.send());
    sink.append("second");
    assert!(sink.send());
    session.stop();

    let bytes = server.join().unwrap();
    let (first, ts0, used) = decode_message(&bytes).unwrap();
    let (second, ts1, rest) = decode_message(&bytes[used..]).unwrap();
    assert_eq!(used + rest, bytes.len());
    assert_eq!(
        first,
        Message::ClientText(ClientTextPayload {
            client_id: "loopback".into(),
            content: "hello 42".into(),
        })
    );
    assert_eq!(
        second,
        Message::ClientText(ClientTextPayload {
            client_id: "loopback".into(),
            content: "second".into(),
        })
    );
    assert!(ts1 > ts0);
}

#[test]
fn server_hangup_is_reported_as_not_connected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (hang_up_tx, hang_up_rx) = mpsc::channel::<()>();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        hang_up_rx.recv().unwrap();
        drop(stream);
    });

    let mut session = ConnectionSession::connect(&addr, Duration::from_secs(2));
    let (tx, rx) = mpsc::channel();
    session
        .run_supervised(move |state: ConnectionState| {
            let _ = tx.send(state);
        })
        .unwrap();
    let step = Duration::from_secs(2);
    assert_eq!(rx.recv_timeout(step).unwrap(), ConnectionState::Connected);

    hang_up_tx.send(()).unwrap();
    server.join().unwrap();
    assert_eq!(rx.recv_timeout(step).unwrap(), ConnectionState::NotConnected);

    let mut sink = MessageSink::new(&session, "loopback");
    sink.append("into the void");
    assert!(!sink.send());
    session.stop();
}
