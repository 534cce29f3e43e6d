use crate::config::PrinterConfig;
use crate::domain::ports::{PagePreparerBox, PhotoPrinter, SpoolerBackend, SpoolerBackendBox};
use crate::domain::print::{JobId, JobState, PrinterState};
use crate::error::{KioskError, Result};
use crate::metrics::KioskMetrics;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Timeouts for the three observation phases and the polling interval shared by all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorPolicy {
    pub queued_timeout: Duration,
    pub processing_timeout: Duration,
    pub completion_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&PrinterConfig> for MonitorPolicy {
    fn from(config: &PrinterConfig) -> Self {
        Self {
            queued_timeout: Duration::from_secs(config.queued_timeout_secs),
            processing_timeout: Duration::from_secs(config.processing_timeout_secs),
            completion_timeout: Duration::from_secs(config.completion_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Queued,
    Processing,
    Completed,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Queued => "queued",
            Phase::Processing => "processing",
            Phase::Completed => "completed",
        }
    }
}

/// Follows one submitted job through queued → processing → completed.
///
/// Each phase has its own deadline. A timeout, a job error state or a spooler error in any
/// phase cancels the job (best effort) and fails the whole print.
pub struct PrintJobMonitor<'a> {
    backend: &'a dyn SpoolerBackend,
    policy: MonitorPolicy,
}

impl<'a> PrintJobMonitor<'a> {
    pub fn new(backend: &'a dyn SpoolerBackend, policy: MonitorPolicy) -> Self {
        Self { backend, policy }
    }

    pub async fn watch(&self, job: &JobId) -> Result<()> {
        let result = self.observe(job).await;
        if let Err(e) = &result {
            warn!(%job, error = %e, "print job failed, cancelling");
            if let Err(cancel_err) = self.backend.cancel(job).await {
                warn!(%job, error = %cancel_err, "could not cancel print job");
            }
        }
        result
    }

    async fn observe(&self, job: &JobId) -> Result<()> {
        self.wait_for(job, Phase::Queued, self.policy.queued_timeout)
            .await?;
        self.wait_for(job, Phase::Processing, self.policy.processing_timeout)
            .await?;
        self.wait_for(job, Phase::Completed, self.policy.completion_timeout)
            .await
    }

    async fn wait_for(&self, job: &JobId, phase: Phase, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.reached(job, phase).await? {
                info!(%job, phase = phase.label(), "print job reached phase");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(KioskError::PrintTimeout {
                    job: job.to_string(),
                    phase: phase.label(),
                });
            }
            tokio::time::sleep(self.policy.poll_interval.min(deadline - now)).await;
        }
    }

    async fn reached(&self, job: &JobId, phase: Phase) -> Result<bool> {
        match phase {
            Phase::Queued => {
                if self.backend.active_jobs().await?.contains(job) {
                    return Ok(true);
                }
                // Small jobs can finish, or fail, before the first look at the queue.
                Ok(self.checked_job_state(job).await? == JobState::Completed)
            }
            Phase::Processing => {
                let state = self.checked_job_state(job).await?;
                if matches!(state, JobState::Processing | JobState::Completed) {
                    return Ok(true);
                }
                Ok(self.backend.printer_state().await? == PrinterState::Processing)
            }
            Phase::Completed => {
                let state = self.checked_job_state(job).await?;
                if state != JobState::Completed {
                    return Ok(false);
                }
                Ok(self.backend.printer_state().await? == PrinterState::Idle)
            }
        }
    }

    async fn checked_job_state(&self, job: &JobId) -> Result<JobState> {
        let state = self.backend.job_state(job).await?;
        debug!(%job, %state, "job state");
        if state.is_error() {
            return Err(KioskError::PrintJobState {
                job: job.to_string(),
                state: state.to_string(),
            });
        }
        Ok(state)
    }
}

/// Prints the collage and cleans up after it.
///
/// The image is laid out on the printer's page in a private scratch directory before
/// submission. Once the job
/// completes the original is archived under a timestamped name, the working photos and the
/// scratch copy are deleted and the consumable gauges are refreshed.
pub struct PrintService {
    backend: SpoolerBackendBox,
    page: PagePreparerBox,
    policy: MonitorPolicy,
    job_title: String,
    photos_dir: PathBuf,
    archive_dir: PathBuf,
    scratch: TempDir,
    metrics: KioskMetrics,
}

impl PrintService {
    pub fn new(
        backend: SpoolerBackendBox,
        page: PagePreparerBox,
        policy: MonitorPolicy,
        job_title: impl Into<String>,
        photos_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        metrics: KioskMetrics,
    ) -> Result<Self> {
        let archive_dir = archive_dir.into();
        std::fs::create_dir_all(&archive_dir)?;
        Ok(Self {
            backend,
            page,
            policy,
            job_title: job_title.into(),
            photos_dir: photos_dir.into(),
            archive_dir,
            scratch: tempfile::tempdir()?,
            metrics,
        })
    }

    async fn archive(&self, image: &Path) -> Result<PathBuf> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let target = self.archive_dir.join(format!("collage_{timestamp}.jpg"));
        tokio::fs::copy(image, &target).await?;
        info!(path = %target.display(), "collage archived");
        Ok(target)
    }

    async fn clear_photos(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.photos_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                debug!(path = %entry.path().display(), "deleted");
            }
        }
        Ok(())
    }

    async fn refresh_markers(&self) {
        match self.backend.marker_levels().await {
            Ok(markers) => {
                for marker in &markers {
                    info!(marker = %marker.name, level = marker.level, "printer consumable level");
                }
                self.metrics.record_markers(&markers);
            }
            Err(e) => warn!(error = %e, "could not read printer marker levels"),
        }
    }
}

#[async_trait]
impl PhotoPrinter for PrintService {
    async fn print(&self, image: &Path) -> Result<()> {
        let scratch_file = self.scratch.path().join("print_collage.jpg");
        self.page.prepare(image, &scratch_file).await?;

        let job = self.backend.submit(&scratch_file, &self.job_title).await?;
        info!(%job, "collage sent to printer");

        PrintJobMonitor::new(self.backend.as_ref(), self.policy)
            .watch(&job)
            .await?;

        self.archive(image).await?;
        if let Err(e) = self.clear_photos().await {
            warn!(error = %e, "could not clear the photos directory");
        }
        tokio::fs::remove_file(&scratch_file).await?;
        self.refresh_markers().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::print::MarkerLevel;
    use crate::infrastructure::in_memory::{CopyPage, InMemorySpooler};

    fn policy() -> MonitorPolicy {
        MonitorPolicy {
            queued_timeout: Duration::from_secs(5),
            processing_timeout: Duration::from_secs(10),
            completion_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
        }
    }

    async fn submit(spooler: &InMemorySpooler) -> JobId {
        spooler
            .submit(Path::new("collage.jpg"), "test")
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_completes() {
        let spooler = InMemorySpooler::new();
        let job = submit(&spooler).await;

        PrintJobMonitor::new(&spooler, policy())
            .watch(&job)
            .await
            .unwrap();
        assert!(spooler.cancelled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_stuck_processing_is_cancelled() {
        let spooler = InMemorySpooler::with_timeline(vec![
            (Duration::ZERO, JobState::Pending, PrinterState::Idle),
            (Duration::from_secs(1), JobState::Processing, PrinterState::Processing),
        ]);
        let job = submit(&spooler).await;
        let started = Instant::now();

        let result = PrintJobMonitor::new(&spooler, policy()).watch(&job).await;

        assert!(matches!(
            result,
            Err(KioskError::PrintTimeout { phase: "completed", .. })
        ));
        assert_eq!(spooler.cancelled(), vec![job]);
        // Bounded by the phase deadlines, never a hang.
        assert!(started.elapsed() <= Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_never_queued_is_cancelled() {
        let spooler = InMemorySpooler::with_timeline(vec![(
            Duration::ZERO,
            JobState::Unknown,
            PrinterState::Idle,
        )]);
        let job = submit(&spooler).await;

        let result = PrintJobMonitor::new(&spooler, policy()).watch(&job).await;

        assert!(matches!(
            result,
            Err(KioskError::PrintTimeout { phase: "queued", .. })
        ));
        assert_eq!(spooler.cancelled().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_job_fails_immediately() {
        let spooler = InMemorySpooler::with_timeline(vec![
            (Duration::ZERO, JobState::Pending, PrinterState::Idle),
            (Duration::from_secs(1), JobState::Aborted, PrinterState::Idle),
        ]);
        let job = submit(&spooler).await;
        let started = Instant::now();

        let result = PrintJobMonitor::new(&spooler, policy()).watch(&job).await;

        assert!(matches!(
            result,
            Err(KioskError::PrintJobState { ref state, .. }) if state == "aborted"
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(spooler.cancelled().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_finished_before_first_look() {
        let spooler = InMemorySpooler::with_timeline(vec![(
            Duration::ZERO,
            JobState::Completed,
            PrinterState::Idle,
        )]);
        let job = submit(&spooler).await;

        PrintJobMonitor::new(&spooler, policy())
            .watch(&job)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_aborted_before_first_look_fails_at_once() {
        let spooler = InMemorySpooler::with_timeline(vec![(
            Duration::ZERO,
            JobState::Aborted,
            PrinterState::Idle,
        )]);
        let job = submit(&spooler).await;
        let started = Instant::now();

        let result = PrintJobMonitor::new(&spooler, policy()).watch(&job).await;

        assert!(matches!(
            result,
            Err(KioskError::PrintJobState { ref state, .. }) if state == "aborted"
        ));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(spooler.cancelled(), vec![job]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spooler_error_cancels_job() {
        let spooler = InMemorySpooler::new();
        let job = submit(&spooler).await;
        spooler.fail_queries(true);

        let result = PrintJobMonitor::new(&spooler, policy()).watch(&job).await;

        assert!(result.is_err());
        assert_eq!(spooler.cancelled(), vec![job]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_print_service_archives_and_cleans_up() {
        let workspace = tempfile::tempdir().unwrap();
        let photos = workspace.path().join("photos");
        let archive = workspace.path().join("archive");
        std::fs::create_dir_all(&photos).unwrap();
        for name in ["photo_0001.jpg", "photo_0002.jpg", "final_collage.jpg"] {
            std::fs::write(photos.join(name), b"jpeg").unwrap();
        }

        let spooler = InMemorySpooler::new().with_markers(vec![MarkerLevel {
            name: "Ribbon".to_string(),
            level: 63,
        }]);
        let metrics = KioskMetrics::unregistered();
        let service = PrintService::new(
            Box::new(spooler.clone()),
            Box::new(CopyPage),
            policy(),
            "Photobooth Print",
            &photos,
            &archive,
            metrics.clone(),
        )
        .unwrap();

        service.print(&photos.join("final_collage.jpg")).await.unwrap();

        let archived: Vec<_> = std::fs::read_dir(&archive).unwrap().collect();
        assert_eq!(archived.len(), 1);
        let name = archived[0].as_ref().unwrap().file_name();
        assert!(name.to_string_lossy().starts_with("collage_"));
        assert_eq!(std::fs::read_dir(&photos).unwrap().count(), 0);
        assert!(!service.scratch.path().join("print_collage.jpg").exists());
        assert_eq!(spooler.submitted().len(), 1);
        assert_eq!(
            metrics
                .printer_marker_level
                .with_label_values(&["Ribbon"])
                .get(),
            63
        );
    }

    struct BrokenPage;

    #[async_trait]
    impl crate::domain::ports::PagePreparer for BrokenPage {
        async fn prepare(&self, _source: &Path, _target: &Path) -> Result<()> {
            Err(KioskError::PrintError("page preparation failed".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_failure_submits_nothing() {
        let workspace = tempfile::tempdir().unwrap();
        let photos = workspace.path().join("photos");
        std::fs::create_dir_all(&photos).unwrap();
        std::fs::write(photos.join("final_collage.jpg"), b"jpeg").unwrap();

        let spooler = InMemorySpooler::new();
        let service = PrintService::new(
            Box::new(spooler.clone()),
            Box::new(BrokenPage),
            policy(),
            "Photobooth Print",
            &photos,
            workspace.path().join("archive"),
            KioskMetrics::unregistered(),
        )
        .unwrap();

        let result = service.print(&photos.join("final_collage.jpg")).await;

        assert!(matches!(result, Err(KioskError::PrintError(_))));
        assert!(spooler.submitted().is_empty());
        assert!(photos.join("final_collage.jpg").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_print_service_keeps_photos_on_failure() {
        let workspace = tempfile::tempdir().unwrap();
        let photos = workspace.path().join("photos");
        std::fs::create_dir_all(&photos).unwrap();
        std::fs::write(photos.join("final_collage.jpg"), b"jpeg").unwrap();

        let spooler = InMemorySpooler::with_timeline(vec![(
            Duration::ZERO,
            JobState::Held,
            PrinterState::Idle,
        )]);
        let service = PrintService::new(
            Box::new(spooler.clone()),
            Box::new(CopyPage),
            policy(),
            "Photobooth Print",
            &photos,
            workspace.path().join("archive"),
            KioskMetrics::unregistered(),
        )
        .unwrap();

        let result = service.print(&photos.join("final_collage.jpg")).await;

        assert!(result.is_err());
        assert_eq!(spooler.cancelled().len(), 1);
        assert!(photos.join("final_collage.jpg").exists());
    }
}
