//! Newline-delimited JSON envelope source.
//!
//! Stands in for the event-bus client: each line is one serialized
//! [`Envelope`]. Malformed lines are logged and skipped. Sending waits for
//! room in the pipeline channel, so a slow collector throttles the reader.

use std::path::PathBuf;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use firehose_core::event::Envelope;

/// Where envelopes are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    Stdin,
    File(PathBuf),
}

impl SourceInput {
    /// `-` means stdin, anything else is a file path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else {
            Self::File(PathBuf::from(arg))
        }
    }
}

/// Counts reported when the source finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub lines: u64,
    pub sent: u64,
    pub malformed: u64,
}

pub struct JsonLinesSource {
    input: SourceInput,
}

impl JsonLinesSource {
    pub fn new(input: SourceInput) -> Self {
        Self { input }
    }

    /// Read until end of input, shutdown, or the pipeline channel closing.
    pub async fn run(
        self,
        tx: mpsc::Sender<Envelope>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<SourceStats> {
        match &self.input {
            SourceInput::Stdin => {
                tracing::info!("reading envelopes from stdin");
                forward_lines(BufReader::new(tokio::io::stdin()), tx, shutdown_rx).await
            }
            SourceInput::File(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    anyhow::anyhow!("failed to open envelope file {}: {e}", path.display())
                })?;
                tracing::info!(path = %path.display(), "reading envelopes from file");
                forward_lines(BufReader::new(file), tx, shutdown_rx).await
            }
        }
    }
}

/// Parse each line and send it into the pipeline.
///
/// Lines are read as raw bytes, so a line that is not valid UTF-8 counts as
/// malformed like any other unparsable line.
pub async fn forward_lines<R>(
    reader: R,
    tx: mpsc::Sender<Envelope>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<SourceStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut segments = reader.split(b'\n');
    let mut stats = SourceStats::default();

    loop {
        let segment = tokio::select! {
            segment = segments.next_segment() => segment?,
            _ = shutdown_rx.recv() => {
                tracing::debug!("envelope source shutting down");
                break;
            }
        };
        let Some(segment) = segment else {
            break;
        };

        stats.lines += 1;
        let trimmed = segment.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        let envelope = match serde_json::from_slice::<Envelope>(trimmed) {
            Ok(envelope) => envelope,
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!(line = stats.lines, error = %e, "skipping malformed envelope");
                continue;
            }
        };

        if tx.send(envelope).await.is_err() {
            tracing::warn!("pipeline channel closed, stopping envelope source");
            break;
        }
        stats.sent += 1;
    }

    tracing::info!(
        lines = stats.lines,
        sent = stats.sent,
        malformed = stats.malformed,
        "envelope source finished"
    );
    Ok(stats)
}
