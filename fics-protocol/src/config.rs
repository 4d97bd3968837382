//! Connection configuration.
//!
//! Every tunable has a compile-time default and can be overridden at runtime
//! through a dedicated environment variable. [`ConnectionConfig::default`]
//! reads those, so a caller only has to set what differs.

use serde::{Deserialize, Serialize};

use crate::error::{FicsError, FicsResult};

/// Default server host.
const DEFAULT_HOST: &str = "freechess.org";

/// Default server port.
const DEFAULT_PORT: u16 = 5000;

/// Default login name. FICS hands out a guest handle for it.
const DEFAULT_USERNAME: &str = "guest";

/// Board style requested during the handshake. Only style 12 is parsed.
pub const DEFAULT_STYLE: u8 = 12;

/// Get the server host.
///
/// Priority:
/// 1. `FICS_HOST` env variable if set
/// 2. `freechess.org` as fallback
pub fn get_host() -> String {
    std::env::var("FICS_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string())
}

/// Get the server port.
///
/// Priority:
/// 1. `FICS_PORT` env variable if set (falls back to the default if the value
///    cannot be parsed as a `u16`)
/// 2. `5000` as fallback
pub fn get_port() -> u16 {
    if let Ok(port) = std::env::var("FICS_PORT") {
        return port.parse().unwrap_or(DEFAULT_PORT);
    }

    DEFAULT_PORT
}

/// Get the requested login name.
///
/// Priority:
/// 1. `FICS_USERNAME` env variable if set
/// 2. `guest` as fallback
pub fn get_username() -> String {
    std::env::var("FICS_USERNAME").unwrap_or_else(|_| DEFAULT_USERNAME.to_string())
}

/// Get the password, if any. Guests log in without one.
pub fn get_password() -> Option<String> {
    std::env::var("FICS_PASSWORD").ok().filter(|p| !p.is_empty())
}

/// Get the value for the server's `interface` variable.
///
/// Priority:
/// 1. `FICS_INTERFACE` env variable if set
/// 2. `fics-protocol <version>` as fallback
pub fn get_interface() -> String {
    std::env::var("FICS_INTERFACE")
        .unwrap_or_else(|_| format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
}

/// Everything the engine needs to open a session and run the post-login
/// handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    pub interface: String,
    pub style: u8,
    /// Ask the server to stream `<s>`/`<sr>`/`<sc>` seek lines.
    pub seek_info: bool,
    /// Ask for `<g1>` lines before each game starts.
    pub game_info: bool,
    /// Ask for `<pf>`/`<pt>`/`<pr>` pending offer lines.
    pub pending_info: bool,
    /// Lock the ivars once the handshake is done.
    pub lock_ivars: bool,
    /// Panic when a line matches a message shape but does not parse, instead
    /// of passing it on as text.
    #[serde(default = "default_strict_grammar")]
    pub strict_grammar: bool,
}

fn default_strict_grammar() -> bool {
    cfg!(debug_assertions)
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: get_host(),
            port: get_port(),
            username: get_username(),
            password: get_password(),
            interface: get_interface(),
            style: DEFAULT_STYLE,
            seek_info: false,
            game_info: true,
            pending_info: true,
            lock_ivars: true,
            strict_grammar: default_strict_grammar(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_seek_info(mut self, on: bool) -> Self {
        self.seek_info = on;
        self
    }

    pub fn with_strict_grammar(mut self, strict: bool) -> Self {
        self.strict_grammar = strict;
        self
    }

    /// `host:port` as accepted by `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> FicsResult<()> {
        if self.host.trim().is_empty() {
            return Err(FicsError::InvalidConfig("host is empty".into()));
        }
        if self.port == 0 {
            return Err(FicsError::InvalidConfig("port must be non-zero".into()));
        }
        if self.username.trim().is_empty() {
            return Err(FicsError::InvalidConfig("username is empty".into()));
        }
        if self.username.contains(char::is_whitespace) {
            return Err(FicsError::InvalidConfig(format!(
                "username contains whitespace: {:?}",
                self.username
            )));
        }
        Ok(())
    }
}
