use crate::application::illumination::IlluminationEngine;
use crate::application::payment_poll::{PollPolicy, poll_transaction_status};
use crate::config::KioskConfig;
use crate::domain::color::Button;
use crate::domain::input::ButtonPress;
use crate::domain::payment::TransactionStatus;
use crate::domain::ports::{
    SharedCaptureDevice, SharedChime, SharedLedDriver, SharedPaymentGateway, SharedPhotoPrinter,
};
use crate::domain::session::Session;
use crate::domain::state::{Effect, Event, State};
use crate::metrics::KioskMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Knobs of the session flow that do not belong to any one device.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Skip payment: button-1 goes straight to photo taking.
    pub demo_mode: bool,
    /// Delay between checkout creation and the first status lookup.
    pub status_check_delay: Duration,
    pub poll: PollPolicy,
    pub countdown_ticks: u32,
    pub countdown_tick: Duration,
    pub settle: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &KioskConfig) -> Self {
        let timing = &config.timing;
        Self {
            demo_mode: config.demo_mode,
            status_check_delay: timing.status_check_delay(),
            poll: PollPolicy {
                max_attempts: timing.poll_max_attempts,
                interval: timing.poll_interval(),
            },
            countdown_ticks: timing.countdown_ticks,
            countdown_tick: timing.countdown_tick(),
            settle: timing.settle(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            demo_mode: false,
            status_check_delay: Duration::from_secs(4),
            poll: PollPolicy::default(),
            countdown_ticks: 4,
            countdown_tick: Duration::from_millis(920),
            settle: Duration::from_millis(500),
        }
    }
}

/// Everything the orchestrator talks to.
pub struct Devices {
    pub gateway: SharedPaymentGateway,
    pub camera: SharedCaptureDevice,
    pub printer: SharedPhotoPrinter,
    pub leds: SharedLedDriver,
    pub chime: SharedChime,
}

/// Sequences payment, capture and printing for one customer at a time.
///
/// The session sits behind a single async mutex. Every transition, together with its
/// effects, runs while that lock is held, so button presses, background tasks and the
/// watchdog can never interleave half-applied transitions. Slow work (HTTP, camera, collage,
/// printing) runs outside the lock in background tasks, which carry the session epoch they
/// were started for and stop as soon as a reset has moved the epoch on.
pub struct Orchestrator {
    session: Mutex<Session>,
    capture_gate: Arc<Mutex<()>>,
    illumination: IlluminationEngine,
    gateway: SharedPaymentGateway,
    camera: SharedCaptureDevice,
    printer: SharedPhotoPrinter,
    chime: SharedChime,
    metrics: KioskMetrics,
    settings: SessionSettings,
    transitions: broadcast::Sender<State>,
}

impl Orchestrator {
    pub fn new(devices: Devices, settings: SessionSettings, metrics: KioskMetrics) -> Arc<Self> {
        let (transitions, _) = broadcast::channel(64);
        Arc::new(Self {
            session: Mutex::new(Session::new()),
            capture_gate: Arc::new(Mutex::new(())),
            illumination: IlluminationEngine::new(devices.leds),
            gateway: devices.gateway,
            camera: devices.camera,
            printer: devices.printer,
            chime: devices.chime,
            metrics,
            settings,
            transitions,
        })
    }

    /// Puts the kiosk into its resting state: button-1 breathing, button-2 dark.
    pub async fn start(&self) {
        info!(demo_mode = self.settings.demo_mode, "kiosk ready");
        self.reset_to_idle("startup").await;
    }

    /// Every state entered from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<State> {
        self.transitions.subscribe()
    }

    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }

    pub async fn state(&self) -> State {
        self.session.lock().await.state
    }

    pub fn metrics(&self) -> &KioskMetrics {
        &self.metrics
    }

    /// Consumes button presses until `shutdown` resolves, then blanks the kiosk.
    pub async fn run(
        self: &Arc<Self>,
        mut presses: mpsc::Receiver<ButtonPress>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                press = presses.recv() => match press {
                    Some(press) => self.handle_press(press).await,
                    None => {
                        info!("button source closed");
                        break;
                    }
                },
            }
        }
        self.shutdown().await;
    }

    pub async fn handle_press(self: &Arc<Self>, press: ButtonPress) {
        match press.button {
            Button::Pay => self.on_button1(press).await,
            Button::Shutter => self.on_button2(press).await,
        }
    }

    /// Button-1: starts a session when the kiosk is idle.
    pub async fn on_button1(self: &Arc<Self>, press: ButtonPress) {
        let mut session = self.session.lock().await;
        if !Self::accepts(&session, &press, State::Idle) {
            return;
        }

        if self.settings.demo_mode {
            info!("demo mode, skipping payment");
            self.transition_locked(&mut session, Event::PaymentBypassed).await;
            self.transition_locked(&mut session, Event::ShotsArmed).await;
            return;
        }

        if !self.transition_locked(&mut session, Event::PaymentRequested).await {
            return;
        }
        let epoch = session.epoch;
        drop(session);

        let this = Arc::clone(self);
        tokio::spawn(async move { this.initiate_payment(epoch).await });
    }

    /// Button-2: starts the shot sequence when the kiosk invites the customer to.
    pub async fn on_button2(self: &Arc<Self>, press: ButtonPress) {
        let Ok(gate) = Arc::clone(&self.capture_gate).try_lock_owned() else {
            debug!("capture sequence already running, ignoring button-2");
            return;
        };

        let mut session = self.session.lock().await;
        if !Self::accepts(&session, &press, State::PhotoPulsing) {
            return;
        }
        self.camera.release_stale_process().await;
        if !self.transition_locked(&mut session, Event::ShutterPressed).await {
            return;
        }
        let epoch = session.epoch;
        drop(session);

        let this = Arc::clone(self);
        tokio::spawn(async move { this.capture_sequence(epoch, gate).await });
    }

    fn accepts(session: &Session, press: &ButtonPress, expected: State) -> bool {
        if press.at < session.last_state_change {
            debug!(button = %press.button, state = %session.state, "stale press ignored");
            return false;
        }
        if session.state != expected {
            debug!(button = %press.button, state = %session.state, "press ignored");
            return false;
        }
        true
    }

    async fn initiate_payment(self: Arc<Self>, epoch: u64) {
        let started = Instant::now();
        let checkout = self.gateway.create_checkout().await;
        self.metrics
            .payment_duration
            .observe(started.elapsed().as_secs_f64());

        let transaction_id = match checkout {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "checkout failed");
                self.payment_failed(epoch).await;
                return;
            }
        };
        info!(transaction_id, "checkout created");

        match self.session_for(epoch).await {
            Some(mut session) => session.transaction_id = Some(transaction_id.clone()),
            None => return,
        }

        tokio::time::sleep(self.settings.status_check_delay).await;
        self.check_payment_status(epoch, &transaction_id).await;
    }

    async fn check_payment_status(&self, epoch: u64, transaction_id: &str) {
        if !self.apply(Event::StatusCheckDue, epoch).await {
            return;
        }

        let outcome =
            poll_transaction_status(self.gateway.as_ref(), transaction_id, self.settings.poll)
                .await;
        info!(
            transaction_id,
            status = %outcome.status,
            attempts = outcome.attempts,
            label = outcome.label.as_deref().unwrap_or("-"),
            "payment finished"
        );
        if let Some(mut session) = self.session_for(epoch).await {
            session.transaction_label = outcome.label;
        }

        if outcome.status == TransactionStatus::Successful {
            self.payment_successful(epoch).await;
        } else {
            self.payment_failed(epoch).await;
        }
    }

    async fn payment_successful(&self, epoch: u64) {
        let Some(mut session) = self.session_for(epoch).await else {
            return;
        };
        if self.transition_locked(&mut session, Event::PaymentApproved).await {
            self.transition_locked(&mut session, Event::ShotsArmed).await;
        }
    }

    async fn payment_failed(&self, epoch: u64) {
        self.conclude(Event::PaymentDeclined, epoch).await;
    }

    async fn capture_sequence(self: Arc<Self>, epoch: u64, _gate: OwnedMutexGuard<()>) {
        let max = self.camera.max_count();
        loop {
            self.countdown().await;
            if !self.apply(Event::CountdownElapsed, epoch).await {
                return;
            }

            let photo = match self.camera.take_photo().await {
                Ok(photo) => photo,
                Err(e) => {
                    warn!(error = %e, "capture failed");
                    self.conclude(Event::CaptureFailed, epoch).await;
                    return;
                }
            };

            let Some(mut session) = self.session_for(epoch).await else {
                return;
            };
            session.photo_count = self.camera.current_count();
            info!(photo = %photo.display(), count = session.photo_count, max, "photo saved");
            if !self.transition_locked(&mut session, Event::PhotoSaved).await {
                return;
            }
            if session.photo_count < max {
                self.transition_locked(&mut session, Event::NextShot).await;
                continue;
            }
            self.transition_locked(&mut session, Event::AllShotsTaken).await;
            break;
        }

        self.print_collage(epoch).await;
    }

    async fn countdown(&self) {
        for tick in (1..=self.settings.countdown_ticks).rev() {
            debug!(tick, "countdown");
            tokio::time::sleep(self.settings.countdown_tick).await;
        }
    }

    async fn print_collage(&self, epoch: u64) {
        let collage = match self.camera.create_collage().await {
            Ok(collage) => collage,
            Err(e) => {
                warn!(error = %e, "collage failed");
                self.conclude(Event::PrintFailed, epoch).await;
                return;
            }
        };
        info!(collage = %collage.display(), "collage ready, printing");

        match self.printer.print(&collage).await {
            Ok(()) => self.conclude(Event::PrintSucceeded, epoch).await,
            Err(e) => {
                warn!(error = %e, "print failed");
                self.conclude(Event::PrintFailed, epoch).await;
            }
        }
    }

    /// Applies a session-ending event and resets in the same critical section.
    async fn conclude(&self, event: Event, epoch: u64) {
        let Some(mut session) = self.session_for(epoch).await else {
            return;
        };
        if self.transition_locked(&mut session, event).await {
            self.transition_locked(&mut session, Event::Reset).await;
        }
    }

    /// Back to Idle from wherever the kiosk is.
    pub async fn reset_to_idle(&self, reason: &str) {
        let mut session = self.session.lock().await;
        info!(reason, from = %session.state, "resetting to idle");
        self.transition_locked(&mut session, Event::Reset).await;
    }

    /// Forces a reset when the kiosk has sat outside Idle for longer than `budget`.
    ///
    /// Returns whether it reset. Runs under the session lock, so a stall is reset once.
    pub async fn check_inactivity(&self, budget: Duration) -> bool {
        let mut session = self.session.lock().await;
        let stalled_for = session.last_state_change.elapsed();
        if session.is_idle() || stalled_for <= budget {
            return false;
        }

        warn!(
            state = %session.state,
            stalled_secs = stalled_for.as_secs(),
            "no progress, forcing reset"
        );
        self.metrics.watchdog_resets.inc();
        self.transition_locked(&mut session, Event::Reset).await
    }

    /// Stops all animations, blanks the buttons, silences the chime and frees the camera.
    pub async fn shutdown(&self) {
        self.illumination.shutdown().await;
        self.chime.stop().await;
        self.camera.release_stale_process().await;
        info!("kiosk shut down");
    }

    async fn apply(&self, event: Event, epoch: u64) -> bool {
        match self.session_for(epoch).await {
            Some(mut session) => self.transition_locked(&mut session, event).await,
            None => false,
        }
    }

    /// Locks the session if it is still the one started at `epoch`.
    async fn session_for(&self, epoch: u64) -> Option<MutexGuard<'_, Session>> {
        let session = self.session.lock().await;
        if session.epoch != epoch {
            debug!(
                task_epoch = epoch,
                current_epoch = session.epoch,
                "session was reset, dropping stale task"
            );
            return None;
        }
        Some(session)
    }

    async fn transition_locked(&self, session: &mut Session, event: Event) -> bool {
        let from = session.state;
        let Some(transition) = from.on(event) else {
            debug!(%from, ?event, "event not accepted");
            return false;
        };

        session.enter(transition.next);
        info!(%from, to = %transition.next, ?event, "state transition");
        self.metrics.record_transition(transition.next);
        // Nobody listening is fine.
        let _ = self.transitions.send(transition.next);

        for effect in transition.effects {
            self.perform(session, effect).await;
        }
        true
    }

    async fn perform(&self, session: &mut Session, effect: Effect) {
        match effect {
            Effect::SetColor(button, color) => self.illumination.set_color(button, color),
            Effect::SetPulseColor(button, color) => {
                self.illumination.set_pulse_color(button, color)
            }
            Effect::StartPulse(button) => self.illumination.start_pulse(button),
            Effect::StopPulse(button) => self.illumination.stop_pulse(button).await,
            Effect::Flash {
                button,
                color,
                times,
            } => self.illumination.flash(button, color, times).await,
            Effect::PlayChime => self.chime.play().await,
            Effect::Settle => tokio::time::sleep(self.settings.settle).await,
            Effect::ReleaseCamera => self.camera.release_stale_process().await,
            Effect::PurgePhotos => self.camera.purge_photos().await,
            Effect::ResetPhotoCount => {
                self.camera.reset_count();
                session.photo_count = 0;
            }
            Effect::ClearSession => session.clear(),
        }
    }
}
