//! Serialised writes of command lines to the server.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::error::{FicsError, FicsResult};

/// Writer side of the connection. Concurrent `send`s are serialised by the
/// mutex, so the bytes of two commands never interleave.
#[derive(Debug)]
pub struct CommandChannel<W = OwnedWriteHalf> {
    writer: Mutex<Option<W>>,
    open: AtomicBool,
}

impl<W> CommandChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Reject every later `send` without touching the writer.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Write `command` followed by `\n` and flush.
    ///
    /// On a write error the writer is dropped and the channel stays closed.
    /// The caller is responsible for tearing down the rest of the connection.
    pub async fn send(&self, command: &str) -> FicsResult<()> {
        self.write_line(command, false).await
    }

    /// Like [`send`](Self::send) but never logs the line.
    pub(crate) async fn send_secret(&self, line: &str) -> FicsResult<()> {
        self.write_line(line, true).await
    }

    async fn write_line(&self, line: &str, secret: bool) -> FicsResult<()> {
        if !self.is_open() {
            return Err(FicsError::NotConnected);
        }

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(FicsError::NotConnected);
        };

        if secret {
            tracing::trace!("FICS >> ********");
        } else {
            tracing::trace!("FICS >> {}", line);
        }

        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        let written = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            tracing::error!("Failed to write command: {}", e);
            self.mark_closed();
            guard.take();
            return Err(FicsError::Io(e));
        }
        Ok(())
    }

    /// Close the channel and shut the writer down.
    pub async fn shutdown(&self) {
        self.mark_closed();
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Writer shutdown failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::AsyncReadExt;

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_send_appends_newline() {
        let (client, mut server) = tokio::io::duplex(256);
        let channel = CommandChannel::new(client);

        channel.send("set style 12").await.unwrap();
        channel.send_secret("hunter2").await.unwrap();
        channel.shutdown().await;

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "set style 12\nhunter2\n");
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let channel = Arc::new(CommandChannel::new(client));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let channel = channel.clone();
            tasks.push(tokio::spawn(async move {
                let command = format!("tell {} {}", i, "x".repeat(500));
                channel.send(&command).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        channel.shutdown().await;

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        let lines: Vec<_> = received.lines().collect();
        assert_eq!(lines.len(), 16);
        for line in lines {
            let (_, payload) = line.rsplit_once(' ').unwrap();
            assert_eq!(payload.len(), 500);
        }
    }

    #[tokio::test]
    async fn test_write_failure_closes_channel() {
        let channel = CommandChannel::new(BrokenPipe);

        assert!(matches!(channel.send("ping").await, Err(FicsError::Io(_))));
        assert!(!channel.is_open());
        assert!(matches!(
            channel.send("ping").await,
            Err(FicsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_send_after_mark_closed() {
        let (client, _server) = tokio::io::duplex(64);
        let channel = CommandChannel::new(client);
        channel.mark_closed();
        assert!(matches!(
            channel.send("ping").await,
            Err(FicsError::NotConnected)
        ));
    }
}
