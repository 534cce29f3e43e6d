//! CUPS spooler access through its command line tools.
//!
//! `lp` submits, `lpstat` reports the queue and the printer state, `cancel` drops a job and
//! `ipptool` reads job states and consumable levels. The parsers are kept pure so they can be
//! tested against captured output.

use crate::config::PrinterConfig;
use crate::domain::ports::SpoolerBackend;
use crate::domain::print::{JobId, JobState, MarkerLevel, PrinterState};
use crate::error::{KioskError, Result};
use crate::infrastructure::command;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// ipptool request for the state of the job given as `-d job-id=N`.
const JOB_STATE_REQUEST: &str = r#"{
  NAME "Get job state"
  OPERATION Get-Job-Attributes
  GROUP operation-attributes-tag
  ATTR charset attributes-charset utf-8
  ATTR naturalLanguage attributes-natural-language en
  ATTR uri printer-uri $uri
  ATTR integer job-id $job-id
  ATTR name requesting-user-name $user
  ATTR keyword requested-attributes job-state,job-state-reasons
  STATUS successful-ok
}
"#;

pub struct CupsSpooler {
    printer: String,
    ipptool: String,
    ipp_uri: String,
    job_state_request: NamedTempFile,
}

impl CupsSpooler {
    pub fn new(config: &PrinterConfig) -> Result<Self> {
        let mut job_state_request = tempfile::Builder::new()
            .prefix("get-job-state")
            .suffix(".test")
            .tempfile()?;
        job_state_request.write_all(JOB_STATE_REQUEST.as_bytes())?;
        job_state_request.flush()?;
        Ok(Self {
            printer: config.name.clone(),
            ipptool: config.ipptool.clone(),
            ipp_uri: config.ipp_uri(),
            job_state_request,
        })
    }

    async fn lpstat(&self, args: &[&str]) -> Result<String> {
        command::run_checked("lpstat", args, TOOL_TIMEOUT).await
    }
}

/// `request id is DS-RX1-42 (1 file(s))` → `DS-RX1-42`.
pub fn parse_request_id(output: &str) -> Option<JobId> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("request id is "))
        .and_then(|rest| rest.split_whitespace().next())
        .map(|id| JobId(id.to_string()))
}

/// First column of every `lpstat -o` line.
pub fn parse_job_list(output: &str) -> Vec<JobId> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|id| JobId(id.to_string()))
        .collect()
}

/// Reads `lpstat -p`; also returns the job being printed, if any.
pub fn parse_printer_status(output: &str) -> (PrinterState, Option<JobId>) {
    for line in output.lines().filter(|line| line.starts_with("printer ")) {
        if let Some((_, rest)) = line.split_once(" now printing ") {
            let job = rest
                .split_whitespace()
                .next()
                .map(|id| JobId(id.trim_end_matches('.').to_string()));
            return (PrinterState::Processing, job);
        }
        if line.contains(" disabled ") {
            return (PrinterState::Stopped, None);
        }
    }
    (PrinterState::Idle, None)
}

/// Numeric part of a CUPS job id: `DS-RX1-42` → `42`.
pub fn job_number(job: &JobId) -> Option<u32> {
    job.0.rsplit('-').next().and_then(|n| n.parse().ok())
}

/// Reads the `job-state` attribute of verbose `ipptool` output, given either as the IPP
/// enum value (3..9) or as its keyword.
pub fn parse_job_state(output: &str) -> Option<JobState> {
    let value = output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("job-state ") && line.contains(" = "))
        .and_then(|line| line.split_once(" = "))
        .map(|(_, value)| value.trim())?;
    let state = match value {
        "3" | "pending" => JobState::Pending,
        "4" | "pending-held" => JobState::Held,
        "5" | "processing" => JobState::Processing,
        "6" | "processing-stopped" => JobState::Stopped,
        "7" | "canceled" => JobState::Canceled,
        "8" | "aborted" => JobState::Aborted,
        "9" | "completed" => JobState::Completed,
        _ => return None,
    };
    Some(state)
}

/// Pairs the `marker-names` and `marker-levels` attributes of verbose `ipptool` output.
pub fn parse_marker_levels(output: &str) -> Vec<MarkerLevel> {
    fn values<'a>(output: &'a str, attribute: &str) -> Vec<&'a str> {
        output
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with(attribute) && line.contains(" = "))
            .and_then(|line| line.split_once(" = "))
            .map(|(_, values)| values.split(',').map(str::trim).collect())
            .unwrap_or_default()
    }

    let names = values(output, "marker-names ");
    let levels = values(output, "marker-levels ");
    names
        .into_iter()
        .zip(levels)
        .filter_map(|(name, level)| {
            level.parse().ok().map(|level| MarkerLevel {
                name: name.to_string(),
                level,
            })
        })
        .collect()
}

#[async_trait]
impl SpoolerBackend for CupsSpooler {
    async fn submit(&self, file: &Path, title: &str) -> Result<JobId> {
        let file = file.display().to_string();
        let output = command::run_checked(
            "lp",
            ["-d", self.printer.as_str(), "-t", title, file.as_str()],
            TOOL_TIMEOUT,
        )
        .await?;
        let job = parse_request_id(&output)
            .ok_or_else(|| KioskError::PrintError(format!("unexpected lp output: {output}")))?;
        info!(%job, printer = %self.printer, "job submitted");
        Ok(job)
    }

    async fn active_jobs(&self) -> Result<Vec<JobId>> {
        Ok(parse_job_list(&self.lpstat(&["-o", &self.printer]).await?))
    }

    async fn job_state(&self, job: &JobId) -> Result<JobState> {
        let number = job_number(job)
            .ok_or_else(|| KioskError::PrintError(format!("job id {job} has no job number")))?;
        let request = self.job_state_request.path().display().to_string();
        let output = command::run(
            &self.ipptool,
            [
                "-t".to_string(),
                "-v".to_string(),
                "-d".to_string(),
                format!("job-id={number}"),
                self.ipp_uri.clone(),
                request,
            ],
            TOOL_TIMEOUT,
        )
        .await?;

        // A failed request without a job-state means CUPS has forgotten the job.
        let state = parse_job_state(&output.stdout).unwrap_or(JobState::Unknown);
        debug!(%job, %state, code = ?output.code, "job state read");
        Ok(state)
    }

    async fn printer_state(&self) -> Result<PrinterState> {
        let (state, _) = parse_printer_status(&self.lpstat(&["-p", &self.printer]).await?);
        Ok(state)
    }

    async fn cancel(&self, job: &JobId) -> Result<()> {
        command::run_checked("cancel", [job.0.as_str()], TOOL_TIMEOUT).await?;
        info!(%job, "job cancelled");
        Ok(())
    }

    async fn marker_levels(&self) -> Result<Vec<MarkerLevel>> {
        let output = command::run_checked(
            &self.ipptool,
            ["-t", "-v", self.ipp_uri.as_str(), "get-printer-attributes.test"],
            TOOL_TIMEOUT,
        )
        .await?;
        let markers = parse_marker_levels(&output);
        debug!(count = markers.len(), "marker levels read");
        Ok(markers)
    }
}
