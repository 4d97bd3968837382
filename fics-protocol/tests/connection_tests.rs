//! End-to-end tests against a fake server on a local socket.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fics_protocol::{
    handshake_steps, Connection, ConnectionConfig, Event, EventHandlers, EventKind, FicsError,
    SessionState,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const LOGIN_LINE: &str = "**** Starting FICS session as AlexTheGreat(TM) ****";

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("fics_protocol=trace")
        .with_test_writer()
        .try_init();
}

/// The server side of one accepted connection.
struct Peer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn read_line(&mut self) -> String {
        let mut line = String::new();
        within(self.reader.read_line(&mut line)).await.unwrap();
        line.trim_end_matches('\n').to_string()
    }

    async fn write(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Read the credentials written right after connecting.
    async fn expect_credentials(&mut self, username: &str, password: &str) {
        assert_eq!(self.read_line().await, username);
        assert_eq!(self.read_line().await, password);
    }
}

async fn listen() -> (TcpListener, ConnectionConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut config = ConnectionConfig::new("127.0.0.1", port, "alex").with_password("secret");
    config.interface = "fics-protocol tests".into();
    (listener, config)
}

async fn accept(listener: &TcpListener) -> Peer {
    let (stream, _) = within(listener.accept()).await.unwrap();
    let (read_half, write_half) = stream.into_split();
    Peer {
        reader: BufReader::new(read_half),
        writer: write_half,
    }
}

/// Open a connection and accept it on the fake server.
async fn open(listener: &TcpListener, config: ConnectionConfig, handlers: EventHandlers) -> (Connection, Peer) {
    let (connection, mut peer) = tokio::join!(Connection::open(config, handlers), accept(listener));
    let connection = connection.unwrap();
    peer.expect_credentials("alex", "secret").await;
    (connection, peer)
}

fn text_channel(handlers: EventHandlers) -> (EventHandlers, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handlers = handlers.on_text(move |line| {
        let _ = tx.send(line.to_string());
    });
    (handlers, rx)
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    within(rx.recv()).await.expect("channel closed")
}

mod login_tests {
    use super::*;

    #[tokio::test]
    async fn server_confirmed_name_overrides_requested_one() {
        init_tracing();
        let (listener, config) = listen().await;
        let (connection, mut peer) = open(&listener, config, EventHandlers::new()).await;
        assert_eq!(connection.username(), "alex");

        peer.write(&format!("fics% {}\n\r", LOGIN_LINE)).await;
        let info = within(connection.login()).await.unwrap();

        assert_eq!(info.username, "AlexTheGreat");
        assert_eq!(info.titles.as_deref(), Some("(TM)"));
        assert_eq!(connection.username(), "AlexTheGreat");
        assert!(connection.state().is_logged_in());
    }

    #[tokio::test]
    async fn handshake_follows_login() {
        let (listener, config) = listen().await;
        let expected: Vec<String> = handshake_steps(&config)
            .into_iter()
            .map(|step| step.command)
            .collect();
        let (connection, mut peer) = open(&listener, config, EventHandlers::new()).await;

        peer.write(&format!("{}\n", LOGIN_LINE)).await;
        within(connection.login()).await.unwrap();

        for command in expected {
            assert_eq!(peer.read_line().await, command);
        }
    }

    #[tokio::test]
    async fn invalid_password_fails_login() {
        let (listener, config) = listen().await;
        let (connection, mut peer) = open(&listener, config, EventHandlers::new()).await;

        peer.write("**** Invalid password! ****\n").await;

        match within(connection.login()).await {
            Err(FicsError::LoginFailed(reason)) => assert_eq!(reason, "Invalid password"),
            other => panic!("Expected LoginFailed, got {:?}", other),
        }
        assert_eq!(
            connection.state(),
            SessionState::Failed {
                reason: "Invalid password".into()
            }
        );
    }

    #[tokio::test]
    async fn login_outcome_is_taken_once() {
        let (listener, config) = listen().await;
        let (connection, mut peer) = open(&listener, config, EventHandlers::new()).await;

        peer.write(&format!("{}\n", LOGIN_LINE)).await;
        within(connection.login()).await.unwrap();

        assert!(matches!(
            connection.login().await,
            Err(FicsError::LoginAlreadyResolved)
        ));
    }

    #[tokio::test]
    async fn abandoned_login_wait_can_be_retried() {
        let (listener, config) = listen().await;
        let (connection, mut peer) = open(&listener, config, EventHandlers::new()).await;

        let early = tokio::time::timeout(Duration::from_millis(50), connection.login()).await;
        assert!(early.is_err());

        peer.write(&format!("{}\n", LOGIN_LINE)).await;
        let info = within(connection.login()).await.unwrap();
        assert_eq!(info.username, "AlexTheGreat");
    }

    #[tokio::test]
    async fn login_callback_sees_outcome() {
        let (listener, config) = listen().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handlers = EventHandlers::new().on_login(move |state| {
            let _ = tx.send(state.clone());
        });
        let (connection, mut peer) = open(&listener, config, handlers).await;

        peer.write(&format!("{}\n", LOGIN_LINE)).await;

        assert_eq!(next(&mut rx).await.username(), Some("AlexTheGreat"));
        within(connection.login()).await.unwrap();
    }
}

mod delivery_tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Seen {
        Tell(String),
        Text(String),
    }

    #[tokio::test]
    async fn handshake_echo_is_swallowed_once() {
        let (listener, config) = listen().await;
        let (handlers, mut texts) = text_channel(EventHandlers::new());
        let (connection, mut peer) = open(&listener, config.clone(), handlers).await;

        peer.write(&format!("{}\n", LOGIN_LINE)).await;
        within(connection.login()).await.unwrap();
        for _ in handshake_steps(&config) {
            peer.read_line().await;
        }

        peer.write("Style 12 set.\nStyle 12 set.\nfics% marker\n").await;

        assert_eq!(next(&mut texts).await, LOGIN_LINE);
        assert_eq!(next(&mut texts).await, "Style 12 set.");
        assert_eq!(next(&mut texts).await, "marker");
    }

    #[tokio::test]
    async fn send_filtered_registers_before_sending() {
        let (listener, config) = listen().await;
        let (handlers, mut texts) = text_channel(EventHandlers::new());
        let (connection, mut peer) = open(&listener, config, handlers).await;

        connection
            .send_filtered("set style 12", "Style 12 set.")
            .await
            .unwrap();
        assert_eq!(peer.read_line().await, "set style 12");

        peer.write("Style 12 set.\nafter\n").await;
        assert_eq!(next(&mut texts).await, "after");
    }

    #[tokio::test]
    async fn unrecognized_lines_pass_through_unmodified() {
        let (listener, config) = listen().await;
        let (handlers, mut texts) = text_channel(EventHandlers::new());
        let (_connection, mut peer) = open(&listener, config, handlers).await;

        peer.write("fics% \n  Welcome to FICS  \r\n\nfics% fics% done\n").await;

        assert_eq!(next(&mut texts).await, "  Welcome to FICS  ");
        assert_eq!(next(&mut texts).await, "");
        assert_eq!(next(&mut texts).await, "done");
    }

    #[tokio::test]
    async fn events_and_text_keep_wire_order() {
        let (listener, config) = listen().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handlers = {
            let (tell_tx, text_tx) = (tx.clone(), tx);
            EventHandlers::new()
                .on(EventKind::PersonalTell, move |event| {
                    if let Event::PersonalTell { message, .. } = event {
                        let _ = tell_tx.send(Seen::Tell(message.clone()));
                    }
                    true
                })
                .on_text(move |line| {
                    let _ = text_tx.send(Seen::Text(line.to_string()));
                })
        };
        let (_connection, mut peer) = open(&listener, config, handlers).await;

        let mut burst = String::new();
        let mut expected = Vec::new();
        for i in 0..300 {
            if i % 3 == 0 {
                burst.push_str(&format!("BobSmith tells you: {}\n", i));
                expected.push(Seen::Tell(i.to_string()));
            } else {
                burst.push_str(&format!("line {}\n", i));
                expected.push(Seen::Text(format!("line {}", i)));
            }
        }
        peer.write(&burst).await;

        for want in expected {
            assert_eq!(next(&mut rx).await, want);
        }
    }

    #[tokio::test]
    async fn malformed_line_is_text_when_grammar_is_lenient() {
        let (listener, config) = listen().await;
        let (handlers, mut texts) = text_channel(EventHandlers::new());
        let (_connection, mut peer) =
            open(&listener, config.with_strict_grammar(false), handlers).await;

        peer.write("<d1> 1 2 P/e2-e4\nafter\n").await;

        assert_eq!(next(&mut texts).await, "<d1> 1 2 P/e2-e4");
        assert_eq!(next(&mut texts).await, "after");
    }

    #[tokio::test]
    async fn commands_reach_the_server() {
        let (listener, config) = listen().await;
        let (connection, mut peer) = open(&listener, config, EventHandlers::new()).await;

        connection.send("finger").await.unwrap();
        connection.send("tell BobSmith hi").await.unwrap();

        assert_eq!(peer.read_line().await, "finger");
        assert_eq!(peer.read_line().await, "tell BobSmith hi");
    }
}

mod disconnect_tests {
    use super::*;

    fn counting() -> (EventHandlers, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handlers = {
            let count = count.clone();
            EventHandlers::new().on_disconnect(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        (handlers, count)
    }

    #[tokio::test]
    async fn server_close_mid_login_fails_login() {
        let (listener, config) = listen().await;
        let (handlers, count) = counting();
        let (connection, peer) = open(&listener, config, handlers).await;

        drop(peer);

        assert!(matches!(
            within(connection.login()).await,
            Err(FicsError::Disconnected)
        ));
        within(connection.closed()).await;
        assert_eq!(connection.state(), SessionState::Disconnected);
        assert!(!connection.is_connected());

        within(connection.disconnect()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn write_failure_closes_the_connection() {
        let (listener, config) = listen().await;
        let (handlers, count) = counting();

        // Hold the first text line until released. The reader then parks on
        // the full inbound queue and never sees the server go away, so only
        // the writes can notice.
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let mut gate = Some(gate);
        let handlers = handlers.on_text(move |_| {
            if let Some(gate) = gate.take() {
                let _ = gate.recv();
            }
        });
        let (connection, mut peer) = open(&listener, config, handlers).await;

        peer.write(&"x\n".repeat(64 * 50)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(peer);

        let error = within(async {
            loop {
                match connection.send("finger").await {
                    Ok(()) => tokio::time::sleep(Duration::from_millis(10)).await,
                    Err(e) => break e,
                }
            }
        })
        .await;
        assert!(matches!(error, FicsError::Io(_)), "got {:?}", error);
        assert!(!connection.is_connected());

        release.send(()).unwrap();
        within(connection.closed()).await;

        assert_eq!(connection.state(), SessionState::Disconnected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(matches!(
            connection.send("finger").await,
            Err(FicsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn explicit_disconnect_unblocks_login() {
        let (listener, config) = listen().await;
        let (handlers, count) = counting();
        let (connection, _peer) = open(&listener, config, handlers).await;

        let (login, ()) = within(async { tokio::join!(connection.login(), connection.disconnect()) }).await;

        assert!(matches!(login, Err(FicsError::Disconnected)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_fires_once() {
        let (listener, config) = listen().await;
        let (handlers, count) = counting();
        let (connection, mut peer) = open(&listener, config, handlers).await;

        peer.write(&format!("{}\n", LOGIN_LINE)).await;
        within(connection.login()).await.unwrap();

        within(connection.disconnect()).await;
        within(connection.disconnect()).await;
        drop(peer);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(connection.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn send_after_disconnect_is_rejected() {
        let (listener, config) = listen().await;
        let (connection, _peer) = open(&listener, config, EventHandlers::new()).await;

        within(connection.disconnect()).await;

        assert!(matches!(
            connection.send("finger").await,
            Err(FicsError::NotConnected)
        ));
        assert!(matches!(
            connection.register_filter("Bell off."),
            Err(FicsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn server_sees_eof_after_disconnect() {
        let (listener, config) = listen().await;
        let (connection, mut peer) = open(&listener, config, EventHandlers::new()).await;

        within(connection.disconnect()).await;

        assert_eq!(peer.read_line().await, "");
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let (listener, config) = listen().await;
        drop(listener);

        assert!(matches!(
            Connection::open(config, EventHandlers::new()).await,
            Err(FicsError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_connecting() {
        let config = ConnectionConfig::new("127.0.0.1", 0, "alex");
        assert!(matches!(
            Connection::open(config, EventHandlers::new()).await,
            Err(FicsError::InvalidConfig(_))
        ));
    }
}
