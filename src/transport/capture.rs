//! Bounded output capture for an interactive shell.

use std::fmt;
use std::time::Duration;

use tracing::trace;

use super::ShellTransport;
use crate::error::TransportError;
use crate::output::{OutputSanitizer, SanitizerStream};

/// Default wait between sending a command and draining its output.
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(500);

/// Default byte budget for one command's captured output.
pub const DEFAULT_BUDGET_BYTES: usize = 4000;

/// Appended once when output was cut to the budget.
pub const TRUNCATION_MARKER: &str = "\n... (output truncated)";

/// Rendering of [`CommandOutput::Empty`].
pub const NO_OUTPUT: &str = "Command executed (no output)";

/// Capture parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// How long to wait after the write before draining.
    pub settle_window: Duration,
    /// Maximum bytes of text returned before the marker.
    pub budget_bytes: usize,
    /// Strip ANSI/VT control sequences before the budget check.
    pub strip_ansi: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_window: DEFAULT_SETTLE_WINDOW,
            budget_bytes: DEFAULT_BUDGET_BYTES,
            strip_ansi: true,
        }
    }
}

impl CaptureConfig {
    /// Same budget, different settle window (slow commands).
    pub fn with_settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    pub fn with_budget(mut self, budget_bytes: usize) -> Self {
        self.budget_bytes = budget_bytes;
        self
    }
}

/// What one command produced within its capture window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// Captured text, already truncated to the budget.
    Text(String),
    /// Nothing was buffered by the end of the window.
    Empty,
}

impl CommandOutput {
    pub fn is_empty(&self) -> bool {
        matches!(self, CommandOutput::Empty)
    }

    /// The text, or the "no output" sentinel.
    pub fn as_str(&self) -> &str {
        match self {
            CommandOutput::Text(text) => text,
            CommandOutput::Empty => NO_OUTPUT,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, CommandOutput::Text(text) if text.ends_with(TRUNCATION_MARKER))
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wait the settle window, then drain everything currently buffered.
///
/// The drain never blocks: it stops at the first empty poll, or early once
/// the text exceeds the budget (the rest stays buffered on the channel). The
/// budget applies to the text as returned, so with `strip_ansi` set it is
/// measured after control sequences and `\r` are removed. A fault before
/// anything was read is returned; a fault after some output was read is left
/// for the next write to discover through `is_broken`.
pub async fn read_output(
    transport: &mut dyn ShellTransport,
    config: &CaptureConfig,
) -> Result<CommandOutput, TransportError> {
    tokio::time::sleep(config.settle_window).await;

    let mut sink = TextSink::new(config.strip_ansi);
    let mut received = false;
    loop {
        match transport.try_read() {
            Ok(Some(chunk)) => {
                trace!(bytes = chunk.len(), "drained output chunk");
                received = true;
                if sink.push(&chunk) > config.budget_bytes {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) if !received => return Err(e),
            Err(_) => break,
        }
    }

    let text = sink.finish();
    if text.is_empty() {
        return Ok(CommandOutput::Empty);
    }
    Ok(CommandOutput::Text(truncate(text, config.budget_bytes)))
}

/// Accumulates drained bytes as the text that will be returned.
enum TextSink {
    Sanitized(SanitizerStream),
    Raw(Vec<u8>),
}

impl TextSink {
    fn new(strip_ansi: bool) -> Self {
        if strip_ansi {
            TextSink::Sanitized(OutputSanitizer::stream())
        } else {
            TextSink::Raw(Vec::new())
        }
    }

    /// Add a chunk and return the text length so far.
    fn push(&mut self, chunk: &[u8]) -> usize {
        match self {
            TextSink::Sanitized(stream) => {
                stream.feed(chunk);
                stream.len()
            }
            TextSink::Raw(raw) => {
                raw.extend_from_slice(chunk);
                raw.len()
            }
        }
    }

    fn finish(self) -> String {
        match self {
            TextSink::Sanitized(stream) => stream.finish(),
            TextSink::Raw(raw) => String::from_utf8_lossy(&raw).into_owned(),
        }
    }
}

/// Cut `text` to at most `budget` bytes on a char boundary and append the
/// marker. Untouched when it fits.
fn truncate(mut text: String, budget: usize) -> String {
    if text.len() <= budget {
        return text;
    }
    let mut cut = budget;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    text
}
