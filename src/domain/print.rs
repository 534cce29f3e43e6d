use std::fmt;

/// Spooler-assigned identifier of a submitted print job, e.g. `DS-RX1-42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of one job, mirroring the IPP `job-state` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Held,
    Processing,
    Stopped,
    Canceled,
    Aborted,
    Completed,
    /// The spooler no longer knows about the job.
    Unknown,
}

impl JobState {
    /// States after which the job will never complete on its own.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            JobState::Held | JobState::Stopped | JobState::Canceled | JobState::Aborted
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Held => "held",
            JobState::Processing => "processing",
            JobState::Stopped => "stopped",
            JobState::Canceled => "canceled",
            JobState::Aborted => "aborted",
            JobState::Completed => "completed",
            JobState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Printer-level state, mirroring IPP `printer-state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterState {
    Idle,
    Processing,
    Stopped,
}

/// One consumable (ribbon, paper) and its remaining level in percent; negative levels
/// mean the printer cannot tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerLevel {
    pub name: String,
    pub level: i32,
}
