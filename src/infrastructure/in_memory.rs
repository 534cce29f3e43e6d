//! In-memory stand-ins for every device, used by `--simulate` and by the tests.

use crate::domain::color::{Button, Color};
use crate::domain::payment::{StatusReport, TransactionStatus};
use crate::domain::ports::{
    CaptureDevice, Chime, LedDriver, PagePreparer, PaymentGateway, SpoolerBackend,
};
use crate::domain::print::{JobId, JobState, MarkerLevel, PrinterState};
use crate::error::{KioskError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every color written to each button.
#[derive(Default)]
pub struct MemoryLeds {
    history: Mutex<[Vec<Color>; 2]>,
}

impl MemoryLeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last color written, or off if nothing was written yet.
    pub fn current(&self, button: Button) -> Color {
        lock(&self.history)[button.index()]
            .last()
            .copied()
            .unwrap_or(Color::OFF)
    }

    pub fn history(&self, button: Button) -> Vec<Color> {
        lock(&self.history)[button.index()].clone()
    }
}

impl LedDriver for MemoryLeds {
    fn write(&self, button: Button, color: Color) {
        lock(&self.history)[button.index()].push(color);
    }
}

/// Counts chime playbacks instead of making noise.
#[derive(Default)]
pub struct SilentChime {
    plays: AtomicU32,
}

impl SilentChime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plays(&self) -> u32 {
        self.plays.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Chime for SilentChime {
    async fn play(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
        debug!("chime");
    }

    async fn stop(&self) {}
}

/// A camera that "takes" photos after a fixed delay.
///
/// Photos are numbered like the real camera's. When a directory is given a small placeholder
/// file is written for each shot and for the collage, so the print path has files to work on.
pub struct SimulatedCamera {
    photos_dir: PathBuf,
    write_files: bool,
    max_photos: u32,
    shot_delay: Duration,
    fail_on_shot: Option<u32>,
    fail_collage: bool,
    count: AtomicU32,
    shots_attempted: AtomicU32,
    releases: AtomicU32,
    purges: AtomicU32,
}

impl SimulatedCamera {
    pub fn new(max_photos: u32) -> Self {
        Self {
            photos_dir: PathBuf::from("photos"),
            write_files: false,
            max_photos,
            shot_delay: Duration::from_millis(300),
            fail_on_shot: None,
            fail_collage: false,
            count: AtomicU32::new(0),
            shots_attempted: AtomicU32::new(0),
            releases: AtomicU32::new(0),
            purges: AtomicU32::new(0),
        }
    }

    /// Writes placeholder files into `dir`.
    pub fn writing_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.photos_dir = dir.into();
        self.write_files = true;
        self
    }

    pub fn with_shot_delay(mut self, delay: Duration) -> Self {
        self.shot_delay = delay;
        self
    }

    /// Makes the `shot`-th capture attempt (1-based, counted over the device lifetime) fail.
    pub fn failing_on_shot(mut self, shot: u32) -> Self {
        self.fail_on_shot = Some(shot);
        self
    }

    pub fn failing_collage(mut self) -> Self {
        self.fail_collage = true;
        self
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn purges(&self) -> u32 {
        self.purges.load(Ordering::SeqCst)
    }

    async fn place(&self, name: &str) -> Result<PathBuf> {
        let path = self.photos_dir.join(name);
        if self.write_files {
            tokio::fs::create_dir_all(&self.photos_dir).await?;
            tokio::fs::write(&path, b"simulated jpeg").await?;
        }
        Ok(path)
    }
}

#[async_trait]
impl CaptureDevice for SimulatedCamera {
    async fn take_photo(&self) -> Result<PathBuf> {
        tokio::time::sleep(self.shot_delay).await;
        let attempt = self.shots_attempted.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_shot == Some(attempt) {
            return Err(KioskError::CaptureError(
                "simulated camera did not respond".to_string(),
            ));
        }
        let number = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.place(&format!("photo_{number:04}.jpg")).await?;
        info!(path = %path.display(), "photo taken");
        Ok(path)
    }

    async fn create_collage(&self) -> Result<PathBuf> {
        if self.fail_collage {
            return Err(KioskError::CaptureError(
                "simulated collage failed".to_string(),
            ));
        }
        self.place("final_collage.jpg").await
    }

    async fn release_stale_process(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    async fn purge_photos(&self) {
        self.purges.fetch_add(1, Ordering::SeqCst);
        if !self.write_files {
            return;
        }
        if let Ok(mut entries) = tokio::fs::read_dir(&self.photos_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
    }

    fn reset_count(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    fn current_count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    fn max_count(&self) -> u32 {
        self.max_photos
    }
}

/// A payment provider that answers from a script.
///
/// Status lookups walk through `statuses` one per call and keep repeating the last entry.
/// `None` entries stand for a transport error on that lookup.
pub struct SimulatedGateway {
    checkout_fails: bool,
    statuses: Vec<Option<TransactionStatus>>,
    checkouts: AtomicU32,
    lookups: AtomicU32,
}

impl SimulatedGateway {
    pub fn with_statuses(statuses: Vec<Option<TransactionStatus>>) -> Self {
        Self {
            checkout_fails: false,
            statuses,
            checkouts: AtomicU32::new(0),
            lookups: AtomicU32::new(0),
        }
    }

    /// Pending for `pending` lookups, then successful.
    pub fn approving_after(pending: usize) -> Self {
        let mut statuses = vec![Some(TransactionStatus::Pending); pending];
        statuses.push(Some(TransactionStatus::Successful));
        Self::with_statuses(statuses)
    }

    pub fn declining() -> Self {
        Self::with_statuses(vec![Some(TransactionStatus::Failed)])
    }

    pub fn rejecting_checkout() -> Self {
        Self {
            checkout_fails: true,
            ..Self::with_statuses(Vec::new())
        }
    }

    pub fn checkouts(&self) -> u32 {
        self.checkouts.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_checkout(&self) -> Result<String> {
        let n = self.checkouts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.checkout_fails {
            return Err(KioskError::PaymentError(
                "reader is offline".to_string(),
            ));
        }
        Ok(format!("sim-{n:04}"))
    }

    async fn transaction_status(&self, transaction_id: &str) -> Result<StatusReport> {
        let n = self.lookups.fetch_add(1, Ordering::SeqCst) as usize;
        let entry = self
            .statuses
            .get(n)
            .or_else(|| self.statuses.last())
            .cloned()
            .flatten();
        match entry {
            Some(status) => Ok(StatusReport {
                status,
                label: Some(format!("LBL-{transaction_id}")),
            }),
            None => Err(KioskError::PaymentError("connection reset".to_string())),
        }
    }
}

/// Hands the image to the spooler as it is.
pub struct CopyPage;

#[async_trait]
impl PagePreparer for CopyPage {
    async fn prepare(&self, source: &Path, target: &Path) -> Result<()> {
        tokio::fs::copy(source, target).await?;
        Ok(())
    }
}

/// One point of a job's scripted life: from `offset` after submission on, the job and the
/// printer report these states.
pub type Milestone = (Duration, JobState, PrinterState);

/// A spooler whose jobs follow a scripted timeline measured from their submission.
///
/// Clones share all state, so a test can keep one handle while the print service owns
/// another.
#[derive(Clone)]
pub struct InMemorySpooler {
    timeline: Arc<Vec<Milestone>>,
    jobs: Arc<Mutex<HashMap<JobId, Instant>>>,
    cancelled: Arc<Mutex<Vec<JobId>>>,
    submitted: Arc<Mutex<Vec<PathBuf>>>,
    markers: Arc<Vec<MarkerLevel>>,
    fail_queries: Arc<AtomicBool>,
    next_id: Arc<AtomicU32>,
}

impl InMemorySpooler {
    /// Queued at once, printing after 2 s, done after 6 s.
    pub fn new() -> Self {
        Self::with_timeline(vec![
            (Duration::ZERO, JobState::Pending, PrinterState::Idle),
            (
                Duration::from_secs(2),
                JobState::Processing,
                PrinterState::Processing,
            ),
            (Duration::from_secs(6), JobState::Completed, PrinterState::Idle),
        ])
    }

    pub fn with_timeline(timeline: Vec<Milestone>) -> Self {
        Self {
            timeline: Arc::new(timeline),
            jobs: Arc::default(),
            cancelled: Arc::default(),
            submitted: Arc::default(),
            markers: Arc::default(),
            fail_queries: Arc::default(),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    pub fn with_markers(mut self, markers: Vec<MarkerLevel>) -> Self {
        self.markers = Arc::new(markers);
        self
    }

    /// Makes every status query fail until switched off again.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn cancelled(&self) -> Vec<JobId> {
        lock(&self.cancelled).clone()
    }

    pub fn submitted(&self) -> Vec<PathBuf> {
        lock(&self.submitted).clone()
    }

    fn check_queries(&self) -> Result<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(KioskError::PrintError("spooler unreachable".to_string()));
        }
        Ok(())
    }

    fn milestone(&self, submitted_at: Instant) -> Option<&Milestone> {
        let elapsed = submitted_at.elapsed();
        self.timeline
            .iter()
            .rev()
            .find(|(offset, _, _)| *offset <= elapsed)
    }

    fn state_of(&self, job: &JobId) -> JobState {
        if lock(&self.cancelled).contains(job) {
            return JobState::Canceled;
        }
        let submitted_at = lock(&self.jobs).get(job).copied();
        submitted_at
            .and_then(|at| self.milestone(at))
            .map_or(JobState::Unknown, |(_, state, _)| *state)
    }
}

impl Default for InMemorySpooler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpoolerBackend for InMemorySpooler {
    async fn submit(&self, file: &Path, title: &str) -> Result<JobId> {
        let id = JobId(format!(
            "SIM-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        lock(&self.jobs).insert(id.clone(), Instant::now());
        lock(&self.submitted).push(file.to_path_buf());
        debug!(job = %id, title, "job accepted");
        Ok(id)
    }

    async fn active_jobs(&self) -> Result<Vec<JobId>> {
        self.check_queries()?;
        let ids: Vec<JobId> = lock(&self.jobs).keys().cloned().collect();
        Ok(ids
            .into_iter()
            .filter(|id| {
                matches!(
                    self.state_of(id),
                    JobState::Pending | JobState::Held | JobState::Processing | JobState::Stopped
                )
            })
            .collect())
    }

    async fn job_state(&self, job: &JobId) -> Result<JobState> {
        self.check_queries()?;
        Ok(self.state_of(job))
    }

    async fn printer_state(&self) -> Result<PrinterState> {
        self.check_queries()?;
        let cancelled = self.cancelled();
        let latest = lock(&self.jobs)
            .iter()
            .filter(|(id, _)| !cancelled.contains(*id))
            .map(|(_, at)| *at)
            .max();
        Ok(latest
            .and_then(|at| self.milestone(at))
            .map_or(PrinterState::Idle, |(_, _, printer)| *printer))
    }

    async fn cancel(&self, job: &JobId) -> Result<()> {
        lock(&self.cancelled).push(job.clone());
        Ok(())
    }

    async fn marker_levels(&self) -> Result<Vec<MarkerLevel>> {
        self.check_queries()?;
        Ok(self.markers.to_vec())
    }
}
