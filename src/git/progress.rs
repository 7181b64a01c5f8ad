//! Line-oriented forwarding of transfer progress.
//!
//! The transfer runs on a blocking thread and pushes raw progress bytes into a
//! bounded channel through a [`ProgressWriter`]. [`forward_lines`] drains the
//! channel on the async side, cuts the bytes into lines and writes each line
//! to the caller's output. Dropping the writer closes the channel. A transfer
//! that stalls keeps its writer alive, so [`forward_lines`] also takes a
//! stop signal after which only the already buffered chunks are drained.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::trace;

/// Number of chunks buffered between the transfer and the consumer.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Producer half of the progress pipe. Closing is done by dropping it.
#[derive(Debug)]
pub struct ProgressWriter {
    tx: mpsc::Sender<Vec<u8>>,
}

/// Create a bounded progress pipe.
pub fn progress_channel() -> (ProgressWriter, mpsc::Receiver<Vec<u8>>) {
    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    (ProgressWriter { tx }, rx)
}

impl ProgressWriter {
    /// Blocking put. Must be called off the async runtime.
    ///
    /// Returns `false` once the consumer is gone.
    pub fn write(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return true;
        }
        self.tx.blocking_send(bytes.to_vec()).is_ok()
    }

    pub fn write_str(&self, text: &str) -> bool {
        self.write(text.as_bytes())
    }
}

/// Reassembles complete lines out of arbitrarily split chunks.
///
/// Both `\n` and `\r` end a line, since servers redraw progress in place with
/// carriage returns. Empty lines are never produced.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Drain the progress pipe into `out`, one line at a time, until the producer
/// closes it. Returns the number of lines written.
///
/// Once `stop` resolves the pipe is closed to further sends and only what is
/// already buffered gets written.
#[tracing::instrument(name = "Forwarding progress", level = "trace", skip_all)]
pub async fn forward_lines<W, S>(
    mut rx: mpsc::Receiver<Vec<u8>>,
    out: &mut W,
    stop: S,
) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(stop);
    let mut stopped = false;
    let mut assembler = LineAssembler::new();
    let mut written = 0;
    loop {
        let chunk = tokio::select! {
            biased;
            chunk = rx.recv() => chunk,
            () = &mut stop, if !stopped => {
                trace!("Progress producer stopped, draining buffered chunks");
                rx.close();
                stopped = true;
                continue;
            }
        };
        let Some(chunk) = chunk else {
            break;
        };
        for line in assembler.push(&chunk) {
            emit(out, &line).await?;
            written += 1;
        }
    }
    if let Some(line) = assembler.finish() {
        emit(out, &line).await?;
        written += 1;
    }
    out.flush().await?;
    Ok(written)
}

async fn emit<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> std::io::Result<()> {
    trace!("remote: {}", line);
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await
}

/// Tracks a percentage so that only changes get reported.
#[derive(Debug, Default)]
pub(crate) struct PercentTracker {
    last: Option<usize>,
}

impl PercentTracker {
    /// Format `<label>: N% (done/total)` if N moved since the last call.
    ///
    /// The final report ends with a newline, intermediate ones with `\r`.
    pub(crate) fn report(&mut self, label: &str, done: usize, total: usize) -> Option<String> {
        if total == 0 {
            return None;
        }
        let percent = done * 100 / total;
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        let end = if done >= total { '\n' } else { '\r' };
        Some(format!("{label}: {percent}% ({done}/{total}){end}"))
    }
}
