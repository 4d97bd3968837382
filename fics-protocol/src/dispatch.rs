//! The ordered delivery path: classify each line, update the session, run
//! the consumer's handlers and fall back to filters and raw text.

use std::collections::HashMap;

use crate::events::{Event, EventKind};
use crate::filter::FilterRegistry;
use crate::grammar::{Classified, Grammar};
use crate::session::{SessionState, SessionTracker, Transition};

/// Returns `true` if the event was fully handled. `false` lets the line fall
/// through to the filters and the text sink.
pub type EventHandler = Box<dyn FnMut(&Event) -> bool + Send>;
pub type TextSink = Box<dyn FnMut(&str) + Send>;
pub type LoginCallback = Box<dyn FnOnce(&SessionState) + Send>;
pub type DisconnectCallback = Box<dyn FnOnce() + Send>;

/// The consumer's sinks, registered before the connection is opened.
#[derive(Default)]
pub struct EventHandlers {
    events: HashMap<EventKind, EventHandler>,
    text: Option<TextSink>,
    login: Option<LoginCallback>,
    disconnect: Option<DisconnectCallback>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle every event of `kind`. Replaces an earlier handler for it.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: FnMut(&Event) -> bool + Send + 'static,
    {
        self.events.insert(kind, Box::new(handler));
        self
    }

    /// Receives every line nobody handled and no filter swallowed.
    pub fn on_text<F>(mut self, sink: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.text = Some(Box::new(sink));
        self
    }

    /// Called once with `LoggedIn` or `Failed` when the server answers the
    /// credentials.
    pub fn on_login<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&SessionState) + Send + 'static,
    {
        self.login = Some(Box::new(callback));
        self
    }

    /// Called exactly once when the connection goes away, whatever the cause.
    pub fn on_disconnect<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.disconnect = Some(Box::new(callback));
        self
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.events.contains_key(&kind)
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("text", &self.text.is_some())
            .field("login", &self.login.is_some())
            .field("disconnect", &self.disconnect.is_some())
            .finish()
    }
}

pub struct Dispatcher {
    grammar: Grammar,
    filters: FilterRegistry,
    session: SessionTracker,
    handlers: EventHandlers,
    strict_grammar: bool,
    closed: bool,
}

impl Dispatcher {
    pub fn new(session: SessionTracker, handlers: EventHandlers) -> Self {
        Self {
            grammar: Grammar::default(),
            filters: FilterRegistry::new(),
            session,
            handlers,
            strict_grammar: cfg!(debug_assertions),
            closed: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Panic when a line matches a recognizer but does not parse. On by
    /// default in debug builds; `Connection` takes it from
    /// [`ConnectionConfig::strict_grammar`](crate::ConnectionConfig::strict_grammar).
    pub fn with_strict_grammar(mut self, strict: bool) -> Self {
        self.strict_grammar = strict;
        self
    }

    pub fn register_filter(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::trace!("Filter registered: {}", line);
        self.filters.register_once(line);
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    pub fn handle_batch(&mut self, lines: Vec<String>) {
        for line in lines {
            self.handle(&line);
        }
    }

    pub fn handle(&mut self, line: &str) {
        tracing::trace!("FICS << {}", line);

        let handled = match self.grammar.classify(line) {
            Some(Classified {
                result: Ok(event), ..
            }) => self.deliver(&event),
            Some(Classified {
                recognizer,
                result: Err(e),
            }) => {
                tracing::error!(recognizer, line, "Line matched but did not parse: {}", e);
                if self.strict_grammar {
                    panic!("{} recognizer failed on {:?}: {}", recognizer, line, e);
                }
                false
            }
            None => false,
        };

        if handled {
            return;
        }

        if self.filters.take_if_present(line) {
            tracing::debug!("Swallowed echo: {}", line);
            return;
        }

        if let Some(sink) = self.handlers.text.as_mut() {
            sink(line);
        }
    }

    /// Tear down: `Disconnected`, fail a pending login, run the disconnect
    /// callback. Only the first call does anything.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.session.apply(Transition::Closed);
        if let Some(callback) = self.handlers.disconnect.take() {
            callback();
        }
    }

    fn deliver(&mut self, event: &Event) -> bool {
        let login = match event {
            Event::LoginSucceeded { username, titles } => Some(Transition::LoginSucceeded {
                username: username.clone(),
                titles: titles.clone(),
            }),
            Event::LoginFailed { reason } => Some(Transition::LoginFailed {
                reason: reason.clone(),
            }),
            _ => None,
        };

        let handled = self
            .handlers
            .events
            .get_mut(&event.kind())
            .is_some_and(|handler| handler(event));

        match login {
            Some(transition) => {
                if self.session.apply(transition) {
                    let state = self.session.state();
                    tracing::info!("Login resolved: {}", state);
                    if let Some(callback) = self.handlers.login.take() {
                        callback(&state);
                    }
                }
                // Login lines always reach the text sink as well.
                false
            }
            None => handled,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("filters", &self.filters)
            .field("session", &self.session)
            .field("handlers", &self.handlers)
            .field("closed", &self.closed)
            .finish()
    }
}
