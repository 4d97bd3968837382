//! One connection to a FICS server: socket lifecycle, the reading task, the
//! ordered delivery task and the public API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::command::CommandChannel;
use crate::config::ConnectionConfig;
use crate::dispatch::{Dispatcher, EventHandlers};
use crate::error::{FicsError, FicsResult};
use crate::lines::read_lines;
use crate::session::{LoginInfo, LoginOutcome, SessionState, SessionTracker, Transition};

/// Why the connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    Requested,
    ServerClosed,
    ReadFailed,
    WriteFailed,
}

/// Line batches the reader may queue ahead of the delivery task. Once the
/// queue is full the reader stops reading the socket.
const INBOUND_BATCHES: usize = 32;

/// A command sent during the post-login handshake and the echo it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeStep {
    pub command: String,
    pub echo: Option<String>,
}

impl HandshakeStep {
    fn new(command: impl Into<String>, echo: Option<&str>) -> Self {
        Self {
            command: command.into(),
            echo: echo.map(str::to_string),
        }
    }
}

/// The commands sent after a successful login, in order.
pub fn handshake_steps(config: &ConnectionConfig) -> Vec<HandshakeStep> {
    let style_echo = format!("Style {} set.", config.style);
    let mut steps = vec![
        HandshakeStep::new(format!("set style {}", config.style), Some(style_echo.as_str())),
        HandshakeStep::new(format!("set interface {}", config.interface), None),
        HandshakeStep::new("iset nowrap 1", Some("nowrap set.")),
        HandshakeStep::new("iset ms 1", Some("ms set.")),
    ];
    if config.game_info {
        steps.push(HandshakeStep::new("iset gameinfo 1", Some("gameinfo set.")));
    }
    if config.pending_info {
        steps.push(HandshakeStep::new("iset pendinfo 1", Some("pendinfo set.")));
    }
    steps.push(HandshakeStep::new("iset showownseek 1", Some("showownseek set.")));
    steps.push(HandshakeStep::new("iset movecase 1", Some("movecase set.")));
    if config.seek_info {
        steps.push(HandshakeStep::new("iset seekinfo 1", Some("seekinfo set.")));
        steps.push(HandshakeStep::new("iset seekremove 1", Some("seekremove set.")));
    }
    steps.push(HandshakeStep::new("set bell 0", Some("Bell off.")));
    if config.lock_ivars {
        steps.push(HandshakeStep::new("iset lock 1", Some("lock set.")));
    }
    steps
}

/// State shared by the handle and both tasks.
struct Shared {
    commands: CommandChannel,
    filters: mpsc::UnboundedSender<String>,
    close_cause: watch::Sender<Option<CloseCause>>,
    closing: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// The single close path. Only the first call has any effect.
    fn close(&self, cause: CloseCause) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Closing connection ({:?})", cause);

        self.commands.mark_closed();
        if let Some(reader) = self.reader.lock().ok().and_then(|mut r| r.take()) {
            reader.abort();
        }
        self.close_cause.send_replace(Some(cause));
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

pub struct Connection {
    config: ConnectionConfig,
    shared: Arc<Shared>,
    state: watch::Receiver<SessionState>,
    /// Stays in place until it resolves, so a cancelled `login()` can be
    /// retried.
    outcome: tokio::sync::Mutex<Option<oneshot::Receiver<LoginOutcome>>>,
    /// Flips to `true` once the delivery task has run its teardown.
    delivered_close: watch::Receiver<bool>,
}

impl Connection {
    /// Open the socket, start the reading and delivery tasks and write the
    /// credentials. Does not wait for the server's answer; see [`login`].
    ///
    /// If the credentials cannot be written the session still ends in
    /// `Disconnected` and the disconnect callback runs before the error is
    /// returned. A failed TCP connect returns before any callback.
    ///
    /// [`login`]: Connection::login
    #[tracing::instrument(level = "info", skip_all, fields(host = %config.host, port = config.port))]
    pub async fn open(config: ConnectionConfig, handlers: EventHandlers) -> FicsResult<Self> {
        config.validate()?;

        let (mut session, state, outcome) = SessionTracker::new();
        session.apply(Transition::Connect);

        let addr = config.address();
        tracing::info!("Connecting to {}", addr);
        let stream = TcpStream::connect(&addr).await.map_err(|source| {
            tracing::error!("Failed to connect to {}: {}", addr, source);
            FicsError::Connect {
                addr: addr.clone(),
                source,
            }
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY: {}", e);
        }
        session.apply(Transition::SocketEstablished);

        let (read_half, write_half) = stream.into_split();
        let commands = CommandChannel::new(write_half);

        // Nobody reads the socket yet, so the server's answer waits in the
        // kernel buffer until the delivery task owns the session.
        if let Err(e) = write_credentials(&commands, &config).await {
            tracing::error!("Failed to send credentials: {}", e);
            commands.shutdown().await;
            abandon(session, handlers);
            return Err(e);
        }
        session.apply(Transition::CredentialsWritten);
        let dispatcher =
            Dispatcher::new(session, handlers).with_strict_grammar(config.strict_grammar);

        let (filters_tx, filters_rx) = mpsc::unbounded_channel();
        let (lines_tx, lines_rx) = mpsc::channel(INBOUND_BATCHES);
        let (close_tx, close_rx) = watch::channel(None);
        let shared = Arc::new(Shared {
            commands,
            filters: filters_tx,
            close_cause: close_tx,
            closing: AtomicBool::new(false),
            reader: Mutex::new(None),
        });

        let (done_tx, done_rx) = watch::channel(false);
        let span = tracing::info_span!("fics", host = %config.host, port = config.port);
        let inbound = Inbound {
            lines: lines_rx,
            filters: filters_rx,
            close: close_rx,
        };
        tokio::spawn(deliver(dispatcher, inbound, shared.clone(), done_tx).instrument(span.clone()));
        let reader = tokio::spawn(read(read_half, lines_tx, shared.clone()).instrument(span));
        if let Ok(mut slot) = shared.reader.lock() {
            *slot = Some(reader);
        }

        Ok(Self {
            config,
            shared,
            state,
            outcome: tokio::sync::Mutex::new(Some(outcome)),
            delivered_close: done_rx,
        })
    }

    /// [`open`](Connection::open) followed by [`login`](Connection::login).
    pub async fn connect(config: ConnectionConfig, handlers: EventHandlers) -> FicsResult<Self> {
        let connection = Self::open(config, handlers).await?;
        connection.login().await?;
        Ok(connection)
    }

    /// Wait for the server to accept or reject the credentials. On success
    /// the handshake is sent and the server-confirmed identity returned.
    ///
    /// The outcome can be taken once; later calls fail with
    /// [`FicsError::LoginAlreadyResolved`]. Dropping the future before the
    /// server answers leaves the outcome in place for the next call.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn login(&self) -> FicsResult<LoginInfo> {
        let mut slot = self.outcome.lock().await;
        let outcome = slot.as_mut().ok_or(FicsError::LoginAlreadyResolved)?;
        let resolved = outcome.await;
        slot.take();
        drop(slot);

        let info = resolved.map_err(|_| FicsError::Disconnected)??;
        tracing::info!("Logged in as {}", info.username);

        for step in handshake_steps(&self.config) {
            match &step.echo {
                Some(echo) => self.send_filtered(&step.command, echo).await?,
                None => self.send(&step.command).await?,
            }
        }
        tracing::debug!("Handshake sent");

        Ok(info)
    }

    /// Send one command line. A write failure closes the connection.
    pub async fn send(&self, command: &str) -> FicsResult<()> {
        match self.shared.commands.send(command).await {
            Err(FicsError::Io(e)) => {
                self.shared.close(CloseCause::WriteFailed);
                Err(FicsError::Io(e))
            }
            other => other,
        }
    }

    /// Register `echo` to be swallowed once, then send `command`.
    pub async fn send_filtered(&self, command: &str, echo: &str) -> FicsResult<()> {
        self.register_filter(echo)?;
        self.send(command).await
    }

    /// Swallow the next occurrence of `line` instead of passing it to the
    /// text sink.
    pub fn register_filter(&self, line: impl Into<String>) -> FicsResult<()> {
        if self.shared.is_closing() {
            return Err(FicsError::NotConnected);
        }
        self.shared
            .filters
            .send(line.into())
            .map_err(|_| FicsError::NotConnected)
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// A receiver that sees every session state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// The server-confirmed name once logged in, the requested one before.
    pub fn username(&self) -> String {
        match self.state.borrow().username() {
            Some(name) => name.to_string(),
            None => self.config.username.clone(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.is_closing() && self.state.borrow().is_connected()
    }

    /// Close the connection and wait until the disconnect has been
    /// delivered. Calling it again is a no-op.
    pub async fn disconnect(&self) {
        self.shared.close(CloseCause::Requested);
        self.closed().await;
    }

    /// Resolves once the session is `Disconnected` and the disconnect
    /// callback has run.
    pub async fn closed(&self) {
        let mut done = self.delivered_close.clone();
        // An error means the delivery task is gone, which only happens after
        // its teardown.
        let _ = done.wait_for(|done| *done).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.close(CloseCause::Requested);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.config.address())
            .field("state", &*self.state.borrow())
            .field("closing", &self.shared.is_closing())
            .finish()
    }
}

/// Teardown for a socket that never got as far as the delivery task.
fn abandon(session: SessionTracker, handlers: EventHandlers) {
    Dispatcher::new(session, handlers).close();
}

async fn write_credentials(commands: &CommandChannel, config: &ConnectionConfig) -> FicsResult<()> {
    commands.send(&config.username).await?;
    commands
        .send_secret(config.password.as_deref().unwrap_or_default())
        .await
}

/// The delivery task's inputs.
struct Inbound {
    lines: mpsc::Receiver<Vec<String>>,
    filters: mpsc::UnboundedReceiver<String>,
    close: watch::Receiver<Option<CloseCause>>,
}

impl Inbound {
    /// Filters registered so far. A filter is always sent before the command
    /// whose echo it swallows, so draining here before each batch is enough.
    fn drain_filters(&mut self, dispatcher: &mut Dispatcher) {
        while let Ok(line) = self.filters.try_recv() {
            dispatcher.register_filter(line);
        }
    }

    fn dispatch(&mut self, dispatcher: &mut Dispatcher, batch: Vec<String>) {
        self.drain_filters(dispatcher);
        dispatcher.handle_batch(batch);
    }
}

async fn read(reader: OwnedReadHalf, lines: mpsc::Sender<Vec<String>>, shared: Arc<Shared>) {
    let result = read_lines(reader, &lines).await;

    let cause = match result {
        Ok(()) => {
            tracing::info!("Server closed the connection");
            CloseCause::ServerClosed
        }
        Err(e) => {
            tracing::warn!("Read failed: {}", e);
            CloseCause::ReadFailed
        }
    };
    shared.close(cause);
}

async fn deliver(
    mut dispatcher: Dispatcher,
    mut inbound: Inbound,
    shared: Arc<Shared>,
    done: watch::Sender<bool>,
) {
    let mut close = inbound.close.clone();
    loop {
        tokio::select! {
            biased;
            batch = inbound.lines.recv() => match batch {
                Some(batch) => inbound.dispatch(&mut dispatcher, batch),
                None => break,
            },
            _ = async { let _ = close.wait_for(Option::is_some).await; } => break,
        }
    }

    // Lines read before the close are still delivered, in order.
    while let Ok(batch) = inbound.lines.try_recv() {
        inbound.dispatch(&mut dispatcher, batch);
    }
    shared.close(CloseCause::ServerClosed);
    let cause = *inbound.close.borrow();
    tracing::debug!("Delivering disconnect ({:?})", cause);

    shared.commands.shutdown().await;
    dispatcher.close();
    done.send_replace(true);
    tracing::debug!("Delivery task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(config: &ConnectionConfig) -> Vec<String> {
        handshake_steps(config)
            .into_iter()
            .map(|step| step.command)
            .collect()
    }

    #[test]
    fn test_default_handshake() {
        let mut config = ConnectionConfig::new("localhost", 5000, "guest");
        config.interface = "fics-console 0.1".into();

        let steps = handshake_steps(&config);
        assert_eq!(
            steps[0],
            HandshakeStep::new("set style 12", Some("Style 12 set."))
        );
        assert_eq!(steps[1], HandshakeStep::new("set interface fics-console 0.1", None));
        assert_eq!(
            commands(&config),
            vec![
                "set style 12",
                "set interface fics-console 0.1",
                "iset nowrap 1",
                "iset ms 1",
                "iset gameinfo 1",
                "iset pendinfo 1",
                "iset showownseek 1",
                "iset movecase 1",
                "set bell 0",
                "iset lock 1",
            ]
        );
    }

    #[test]
    fn test_handshake_with_seeks_and_without_optional_ivars() {
        let mut config = ConnectionConfig::new("localhost", 5000, "guest").with_seek_info(true);
        config.game_info = false;
        config.pending_info = false;
        config.lock_ivars = false;

        let commands = commands(&config);
        assert!(commands.contains(&"iset seekinfo 1".to_string()));
        assert!(commands.contains(&"iset seekremove 1".to_string()));
        assert!(!commands.iter().any(|c| c.contains("gameinfo")));
        assert!(!commands.iter().any(|c| c.contains("pendinfo")));
        assert_ne!(commands.last().map(String::as_str), Some("iset lock 1"));
    }

    #[test]
    fn test_abandoned_open_notifies_once() {
        let (mut session, state, outcome) = SessionTracker::new();
        session.apply(Transition::Connect);
        session.apply(Transition::SocketEstablished);

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let handlers = {
            let calls = calls.clone();
            EventHandlers::new().on_disconnect(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        abandon(session, handlers);

        assert_eq!(*state.borrow(), SessionState::Disconnected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            outcome.blocking_recv(),
            Ok(Err(FicsError::Disconnected))
        ));
    }

    #[test]
    fn test_every_ivar_step_has_an_echo() {
        let config = ConnectionConfig::new("localhost", 5000, "guest").with_seek_info(true);
        for step in handshake_steps(&config) {
            if step.command.starts_with("iset ") {
                assert!(step.echo.is_some(), "{} has no echo", step.command);
            }
        }
    }
}
