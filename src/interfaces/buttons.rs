//! Button input.
//!
//! Edge detection lives outside this crate. Whatever sees the press (a GPIO helper, a test
//! harness, an operator at a terminal) writes one line per press, `1` for the pay button and
//! `2` for the shutter, to stdin or to a FIFO. Presses are stamped on arrival and queued for
//! the orchestrator without blocking the sender.

use crate::domain::color::Button;
use crate::domain::input::ButtonPress;
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cloneable handle for raising presses from any task or thread.
#[derive(Clone)]
pub struct ButtonSender {
    tx: mpsc::Sender<ButtonPress>,
}

impl ButtonSender {
    /// Queues a press stamped now; drops it if the queue is full or closed.
    pub fn press(&self, button: Button) {
        if let Err(e) = self.tx.try_send(ButtonPress::now(button)) {
            warn!(%button, error = %e, "button press dropped");
        }
    }

    /// True once the orchestrator stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub fn channel(capacity: usize) -> (ButtonSender, mpsc::Receiver<ButtonPress>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ButtonSender { tx }, rx)
}

/// Maps one input line to a button.
pub fn parse_press(line: &str) -> Option<Button> {
    match line.trim().to_ascii_lowercase().as_str() {
        "1" | "b1" | "pay" => Some(Button::Pay),
        "2" | "b2" | "shutter" => Some(Button::Shutter),
        _ => None,
    }
}

/// Forwards presses from `reader` until it reaches end of input.
pub async fn forward_lines<R>(reader: R, sender: &ButtonSender) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_press(&line) {
            Some(button) => {
                debug!(%button, "pressed");
                sender.press(button);
            }
            None => warn!(input = %line, "unknown button input"),
        }
    }
    Ok(())
}

/// Where presses are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonSource {
    Stdin,
    /// A FIFO (or plain file); reopened whenever the writer goes away.
    Path(PathBuf),
}

impl ButtonSource {
    pub fn spawn(self, sender: ButtonSender) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            match self {
                ButtonSource::Stdin => {
                    info!("reading button presses from stdin");
                    forward_lines(BufReader::new(tokio::io::stdin()), &sender).await
                }
                ButtonSource::Path(path) => follow(&path, &sender).await,
            }
        })
    }
}

const RETRY_FIRST: Duration = Duration::from_millis(250);
const RETRY_MAX: Duration = Duration::from_secs(30);

/// Reads presses from `path` for as long as anyone listens.
///
/// A path that cannot be opened or read is retried with a doubling delay, so a FIFO created
/// late or a writer that crashes only costs presses, never the input itself.
async fn follow(path: &Path, sender: &ButtonSender) -> Result<()> {
    info!(path = %path.display(), "reading button presses");
    let mut retry_in = RETRY_FIRST;
    while !sender.is_closed() {
        let failure = match tokio::fs::File::open(path).await {
            Ok(file) => match forward_lines(BufReader::new(file), sender).await {
                Ok(()) if !is_fifo(path) => return Ok(()),
                Ok(()) => {
                    debug!("button writer closed, reopening");
                    retry_in = RETRY_FIRST;
                    continue;
                }
                Err(e) => e,
            },
            Err(e) => e.into(),
        };
        warn!(
            path = %path.display(),
            error = %failure,
            retry_in_ms = retry_in.as_millis() as u64,
            "button input unavailable, retrying"
        );
        tokio::time::sleep(retry_in).await;
        retry_in = (retry_in * 2).min(RETRY_MAX);
    }
    Ok(())
}

#[cfg(unix)]
fn is_fifo(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path).is_ok_and(|meta| meta.file_type().is_fifo())
}

#[cfg(not(unix))]
fn is_fifo(_path: &Path) -> bool {
    false
}
