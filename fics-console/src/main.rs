//! fics-console - line-mode FICS client.
//!
//! Connects and logs in, prints every recognised event and every raw line,
//! and forwards each line typed on stdin to the server as a command. EOF on
//! stdin disconnects.
//!
//! Connection settings default to the `FICS_*` environment variables (see
//! [`fics_protocol::config`]).

use std::path::PathBuf;

use clap::Parser;
use fics_protocol::config::{get_host, get_password, get_port, get_username};
use fics_protocol::{Connection, ConnectionConfig, EventHandlers, EventKind, FicsError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod render;

#[derive(Parser)]
#[command(name = "fics-console", about = "Line-mode client for FICS chess servers")]
struct Cli {
    /// Server host.
    #[arg(long, default_value_t = get_host())]
    host: String,

    /// Server port.
    #[arg(short, long, default_value_t = get_port())]
    port: u16,

    /// Login name. `guest` logs in as a guest.
    #[arg(short, long, default_value_t = get_username())]
    username: String,

    /// Password. Defaults to `FICS_PASSWORD`.
    #[arg(long)]
    password: Option<String>,

    /// Ask the server to stream seek announcements.
    #[arg(long)]
    seeks: bool,

    /// Print events as JSON, one per line.
    #[arg(long)]
    json: bool,

    /// Write logs to daily files in this directory instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum ConsoleError {
    #[error("failed to read stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error(transparent)]
    Fics(#[from] FicsError),
}

/// Every event kind the console prints itself. Anything else shows up as raw
/// text.
const PRINTED: &[EventKind] = &[
    EventKind::GameInfo,
    EventKind::BoardSnapshot,
    EventKind::BoardDelta,
    EventKind::SeekAdded,
    EventKind::SeeksRemoved,
    EventKind::SeeksCleared,
    EventKind::GameEnded,
    EventKind::StoppedObserving,
    EventKind::StoppedExamining,
    EventKind::EnteredBoardSetup,
    EventKind::ExitedBoardSetup,
    EventKind::IllegalMoveAttempt,
    EventKind::ChannelTell,
    EventKind::Kibitz,
    EventKind::Whisper,
    EventKind::PartnerTell,
    EventKind::PersonalTell,
    EventKind::SayTell,
    EventKind::TShout,
    EventKind::CShout,
    EventKind::Shout,
    EventKind::IShout,
    EventKind::Announcement,
    EventKind::QTell,
    EventKind::OfferMade,
    EventKind::OfferRemoved,
    EventKind::OfferDeclined,
    EventKind::OfferWithdrawn,
    EventKind::TakebackUpdated,
    EventKind::TakebackCountered,
];

fn init_tracing(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "fics-console");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn handlers(json: bool) -> EventHandlers {
    let mut handlers = EventHandlers::new()
        .on_text(|line| println!("{}", line))
        .on_login(|state| tracing::info!("Login: {}", state))
        .on_disconnect(|| println!("*** disconnected ***"));

    for &kind in PRINTED {
        handlers = handlers.on(kind, move |event| {
            if json {
                match serde_json::to_string(event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("Could not serialise {:?}: {}", kind, e),
                }
            } else {
                println!("{}", render::describe(event));
            }
            true
        });
    }
    handlers
}

async fn run(connection: &Connection) -> Result<(), ConsoleError> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                match line.map_err(ConsoleError::Stdin)? {
                    Some(command) => connection.send(command.trim_end()).await?,
                    None => {
                        tracing::info!("stdin closed");
                        connection.disconnect().await;
                        return Ok(());
                    }
                }
            }
            _ = connection.closed() => return Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref());

    let mut config =
        ConnectionConfig::new(&cli.host, cli.port, &cli.username).with_seek_info(cli.seeks);
    config.password = cli.password.or_else(get_password);

    let connection = Connection::open(config, handlers(cli.json)).await?;
    let info = connection.login().await?;
    println!("Logged in as {}{}", info.username, info.titles.unwrap_or_default());

    run(&connection).await?;
    tracing::info!("fics-console shutting down");
    Ok(())
}
