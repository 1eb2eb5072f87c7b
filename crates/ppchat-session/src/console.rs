//! The console: where an application writes its human-readable lines and
//! where the client reads user input from.
//!
//! The trait is object-safe so applications can hold a `Box<dyn Console>`
//! and tests can swap the terminal for a [`ChannelConsole`].

use std::io::Write;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{Mutex, mpsc};

/// Line-oriented text output and input.
pub trait Console: Send + Sync + 'static {
    /// Writes one line. Never fails from the caller's point of view.
    fn write(&self, line: &str);

    /// Reads the next line of input, without its line ending. `None` means
    /// the input is exhausted.
    fn read_line(&self) -> BoxFuture<'_, Option<String>>;
}

/// The process's stdout and stdin.
pub struct StdConsole {
    input: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdConsole {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn write(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            tracing::debug!(error = %e, "console write failed");
        }
    }

    fn read_line(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            let mut input = self.input.lock().await;
            match input.next_line().await {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read from stdin");
                    None
                }
            }
        })
    }
}

impl std::fmt::Debug for StdConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdConsole").finish_non_exhaustive()
    }
}

/// A console backed by in-memory channels.
///
/// Everything written comes out of [`ConsoleRemote::output`]; lines pushed
/// into [`ConsoleRemote::input`] are what [`read_line`](Console::read_line)
/// returns. Dropping the remote's input sender exhausts the input.
#[derive(Debug)]
pub struct ChannelConsole {
    output: mpsc::UnboundedSender<String>,
    input: Mutex<mpsc::UnboundedReceiver<String>>,
}

/// The far side of a [`ChannelConsole`].
#[derive(Debug)]
pub struct ConsoleRemote {
    pub output: mpsc::UnboundedReceiver<String>,
    pub input: mpsc::UnboundedSender<String>,
}

impl ChannelConsole {
    pub fn new() -> (Self, ConsoleRemote) {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let console = Self {
            output: output_tx,
            input: Mutex::new(input_rx),
        };
        let remote = ConsoleRemote {
            output: output_rx,
            input: input_tx,
        };
        (console, remote)
    }
}

impl Console for ChannelConsole {
    fn write(&self, line: &str) {
        // Nobody listening is fine; the line is just dropped.
        let _ = self.output.send(line.to_string());
    }

    fn read_line(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move { self.input.lock().await.recv().await })
    }
}

impl ConsoleRemote {
    /// Waits for the next written line.
    pub async fn next_output(&mut self) -> Option<String> {
        self.output.recv().await
    }

    /// Queues a line of input. Returns `false` if the console is gone.
    pub fn push_input(&self, line: impl Into<String>) -> bool {
        self.input.send(line.into()).is_ok()
    }
}
