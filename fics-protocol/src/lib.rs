//! Protocol engine for FICS-style chess servers
//!
//! Owns the socket, splits the byte stream into lines, classifies each line
//! against an ordered grammar and hands the consumer structured events, or
//! the raw line when nothing recognises it.
//!
//! # Example
//!
//! ```no_run
//! use fics_protocol::{Connection, ConnectionConfig, Event, EventHandlers, EventKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handlers = EventHandlers::new()
//!         .on(EventKind::PersonalTell, |event| {
//!             if let Event::PersonalTell { username, message, .. } = event {
//!                 println!("{} tells you: {}", username, message);
//!             }
//!             true
//!         })
//!         .on_text(|line| println!("{}", line));
//!
//!     let connection = Connection::connect(ConnectionConfig::default(), handlers).await?;
//!     connection.send("finger").await?;
//!     connection.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod filter;
pub mod grammar;
pub mod lines;
pub mod session;

pub use command::CommandChannel;
pub use config::ConnectionConfig;
pub use connection::{handshake_steps, CloseCause, Connection, HandshakeStep};
pub use dispatch::{Dispatcher, EventHandlers};
pub use error::{FenError, FicsError, FicsResult, GrammarError};
pub use events::{Event, EventKind};
pub use filter::FilterRegistry;
pub use grammar::{classify, Grammar, Recognizer};
pub use lines::LineAssembler;
pub use session::{LoginInfo, SessionState, SessionTracker, Transition};
