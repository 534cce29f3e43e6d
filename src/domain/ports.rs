use super::color::{Button, Color};
use super::payment::StatusReport;
use super::print::{JobId, JobState, MarkerLevel, PrinterState};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The payment provider: one checkout per session, then status lookups.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Asks the card reader to charge the session price; returns the transaction id.
    async fn create_checkout(&self) -> Result<String>;
    /// One status lookup; no retries at this layer.
    async fn transaction_status(&self, transaction_id: &str) -> Result<StatusReport>;
}

/// The camera plus the working directory its photos land in.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Takes and downloads one photo, bumping the running count on success.
    async fn take_photo(&self) -> Result<PathBuf>;
    /// Composes every photo of the session into the printable collage.
    async fn create_collage(&self) -> Result<PathBuf>;
    /// Kills a leftover background process holding the camera, if any.
    async fn release_stale_process(&self);
    /// Deletes leftover photo files from the working directory.
    async fn purge_photos(&self);
    fn reset_count(&self);
    fn current_count(&self) -> u32;
    fn max_count(&self) -> u32;
}

/// Prints a composed image and reports once the paper is out.
#[async_trait]
pub trait PhotoPrinter: Send + Sync {
    async fn print(&self, image: &Path) -> Result<()>;
}

/// The spooler's view of jobs and of the printer, as polled by the job monitor.
#[async_trait]
pub trait SpoolerBackend: Send + Sync {
    async fn submit(&self, file: &Path, title: &str) -> Result<JobId>;
    /// Jobs the spooler has not finished yet.
    async fn active_jobs(&self) -> Result<Vec<JobId>>;
    async fn job_state(&self, job: &JobId) -> Result<JobState>;
    async fn printer_state(&self) -> Result<PrinterState>;
    async fn cancel(&self, job: &JobId) -> Result<()>;
    async fn marker_levels(&self) -> Result<Vec<MarkerLevel>>;
}

/// Lays a composed image out on the printer's page.
#[async_trait]
pub trait PagePreparer: Send + Sync {
    /// Writes the printable page for `source` to `target`.
    async fn prepare(&self, source: &Path, target: &Path) -> Result<()>;
}

/// Raw per-button RGB output. Writes are immediate and idempotent.
pub trait LedDriver: Send + Sync {
    fn write(&self, button: Button, color: Color);
}

/// The countdown chime.
#[async_trait]
pub trait Chime: Send + Sync {
    /// Starts playback and returns immediately.
    async fn play(&self);
    async fn stop(&self);
}

pub type SpoolerBackendBox = Box<dyn SpoolerBackend>;
pub type PagePreparerBox = Box<dyn PagePreparer>;
// The orchestrator's collaborators are shared with its background tasks.
pub type SharedPaymentGateway = Arc<dyn PaymentGateway>;
pub type SharedCaptureDevice = Arc<dyn CaptureDevice>;
pub type SharedPhotoPrinter = Arc<dyn PhotoPrinter>;
/// Shared because every pulse animation task writes through it.
pub type SharedLedDriver = Arc<dyn LedDriver>;
pub type SharedChime = Arc<dyn Chime>;
