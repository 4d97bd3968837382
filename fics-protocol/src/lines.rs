//! Turns the raw server byte stream into batches of logical lines.

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// The prompt the server interleaves with its output.
pub const PROMPT: &str = "fics% ";

/// A batch is handed on as soon as it holds this many lines, even if more
/// bytes are already waiting.
pub const MAX_BATCH_LINES: usize = 64;

const READ_BUFFER_SIZE: usize = 4096;

/// Sans-IO line splitter. Feed it bytes with [`LineAssembler::push`]; it
/// strips `\r`, cuts on `\n`, removes leading prompts and collects the
/// resulting lines into batches.
#[derive(Debug)]
pub struct LineAssembler {
    partial: String,
    batch: Vec<String>,
    max_batch: usize,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::with_batch_size(MAX_BATCH_LINES)
    }

    pub fn with_batch_size(max_batch: usize) -> Self {
        Self {
            partial: String::new(),
            batch: Vec::new(),
            max_batch: max_batch.max(1),
        }
    }

    /// Consume `bytes`. Every time the current batch reaches the size
    /// threshold it is passed to `on_full_batch`.
    pub fn push(&mut self, bytes: &[u8], mut on_full_batch: impl FnMut(Vec<String>)) {
        for &byte in bytes {
            match byte {
                b'\r' => {}
                b'\n' => {
                    let raw = std::mem::take(&mut self.partial);
                    if let Some(line) = strip_prompts(&raw) {
                        self.batch.push(line.to_string());
                        if self.batch.len() >= self.max_batch {
                            on_full_batch(self.take_batch());
                        }
                    }
                }
                // The server speaks 7-bit ASCII; map bytes 1:1 so nothing is lost.
                _ => self.partial.push(byte as char),
            }
        }
    }

    /// Whether complete lines are waiting to be handed on.
    pub fn has_pending(&self) -> bool {
        !self.batch.is_empty()
    }

    pub fn take_batch(&mut self) -> Vec<String> {
        std::mem::take(&mut self.batch)
    }
}

/// Strip any number of leading prompts. Returns `None` for a line that was
/// nothing but prompts.
pub fn strip_prompts(raw: &str) -> Option<&str> {
    let mut rest = raw;
    while let Some(stripped) = rest.strip_prefix(PROMPT) {
        if stripped.is_empty() {
            return None;
        }
        rest = stripped;
    }
    Some(rest)
}

/// Read `reader` until EOF or error, handing line batches to `lines`.
///
/// A non-empty batch is delivered early whenever the next read would block,
/// so a burst followed by a pause is not held back. Sending waits while the
/// queue is full, so a slow consumer stops the reads and the socket's receive
/// window pushes back on the server. The loop ends once the receiver is gone.
pub async fn read_lines<R>(mut reader: R, lines: &mpsc::Sender<Vec<String>>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut assembler = LineAssembler::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut full = Vec::new();

    loop {
        let read = match reader.read(&mut buf).now_or_never() {
            Some(read) => read,
            None => {
                if assembler.has_pending() && lines.send(assembler.take_batch()).await.is_err() {
                    return Ok(());
                }
                reader.read(&mut buf).await
            }
        };

        match read {
            Ok(0) => {
                tracing::debug!("Server closed the stream");
                if assembler.has_pending() {
                    let _ = lines.send(assembler.take_batch()).await;
                }
                return Ok(());
            }
            Ok(n) => {
                assembler.push(&buf[..n], |batch| full.push(batch));
                for batch in full.drain(..) {
                    if lines.send(batch).await.is_err() {
                        return Ok(());
                    }
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
                ) =>
            {
                continue;
            }
            Err(e) => {
                if assembler.has_pending() {
                    let _ = lines.send(assembler.take_batch()).await;
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn assemble(input: &[u8]) -> Vec<String> {
        let mut assembler = LineAssembler::new();
        let mut lines = Vec::new();
        assembler.push(input, |batch| lines.extend(batch));
        lines.extend(assembler.take_batch());
        lines
    }

    #[test]
    fn test_strips_carriage_returns_and_prompts() {
        let lines = assemble(b"fics% hello\r\nfics% fics% again\n\rplain\n");
        assert_eq!(lines, vec!["hello", "again", "plain"]);
    }

    #[test]
    fn test_prompt_only_lines_are_dropped() {
        let lines = assemble(b"fics% \nfics% fics% \nreal\n");
        assert_eq!(lines, vec!["real"]);
    }

    #[test]
    fn test_blank_line_is_content() {
        let lines = assemble(b"\nafter\n");
        assert_eq!(lines, vec!["", "after"]);
    }

    #[test]
    fn test_prompt_in_the_middle_is_kept() {
        let lines = assemble(b"say fics% now\n");
        assert_eq!(lines, vec!["say fics% now"]);
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut assembler = LineAssembler::new();
        assembler.push(b"BobSmith tells", |_| panic!("no batch should fill"));
        assert!(!assembler.has_pending());
        assembler.push(b" you: hi\n", |_| panic!("no batch should fill"));
        assert_eq!(assembler.take_batch(), vec!["BobSmith tells you: hi"]);
    }

    #[test]
    fn test_full_batches_are_flushed_at_threshold() {
        let mut assembler = LineAssembler::with_batch_size(2);
        let mut batches = Vec::new();
        assembler.push(b"a\nb\nc\nd\ne\n", |batch| batches.push(batch));
        assert_eq!(batches, vec![vec!["a", "b"], vec!["c", "d"]]);
        assert_eq!(assembler.take_batch(), vec!["e"]);
    }

    #[tokio::test]
    async fn test_read_lines_until_eof() {
        let input: &[u8] = b"fics% one\n\rtwo\r\ntrailing without newline";
        let (tx, mut rx) = mpsc::channel(4);
        read_lines(input, &tx).await.unwrap();
        drop(tx);

        let mut seen = Vec::new();
        while let Some(batch) = rx.recv().await {
            seen.extend(batch);
        }
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_pending_batch_is_flushed_when_server_pauses() {
        let (mut server, client) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(4);

        let reader = tokio::spawn(async move { read_lines(client, &tx).await });

        server.write_all(b"first\nsecond\n").await.unwrap();
        // No more bytes follow, yet the batch must arrive.
        assert_eq!(rx.recv().await.unwrap(), vec!["first", "second"]);

        server.write_all(b"third\n").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), vec!["third"]);

        drop(server);
        reader.await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stops_when_receiver_is_gone() {
        let (mut server, client) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let reader = tokio::spawn(async move { read_lines(client, &tx).await });
        server.write_all(b"ignored\n").await.unwrap();
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_stops_reading() {
        let (mut server, client) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(1);
        let reader = tokio::spawn(async move { read_lines(client, &tx).await });

        server.write_all(b"one\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        server.write_all(b"two\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // The reader is parked on the full queue, so the pipe fills up and
        // the writer stalls instead of the lines piling up in memory.
        let flood = vec![b'x'; 4096];
        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            server.write_all(&flood),
        )
        .await;
        assert!(stalled.is_err());

        assert_eq!(rx.recv().await.unwrap(), vec!["one"]);
        assert_eq!(rx.recv().await.unwrap(), vec!["two"]);
        drop(rx);
        drop(server);
        reader.await.unwrap().unwrap();
    }
}
