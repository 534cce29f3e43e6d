use super::color::Button;
use tokio::time::Instant;

/// One physical button press, stamped when the input source saw it.
///
/// The stamp lets the orchestrator drop presses that happened before the last state change,
/// for example while a failure flash was still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub button: Button,
    pub at: Instant,
}

impl ButtonPress {
    pub fn now(button: Button) -> Self {
        Self {
            button,
            at: Instant::now(),
        }
    }
}
