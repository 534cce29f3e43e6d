use crate::application::orchestrator::Orchestrator;
use crate::config::TimingConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Forces the kiosk back to Idle when a session stops making progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Watchdog {
    pub interval: Duration,
    pub budget: Duration,
}

impl Watchdog {
    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self {
            interval: timing.watchdog_interval(),
            budget: timing.inactivity_budget(),
        }
    }

    pub fn spawn(self, orchestrator: Arc<Orchestrator>) -> JoinHandle<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            budget_secs = self.budget.as_secs(),
            "watchdog started"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                orchestrator.check_inactivity(self.budget).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::orchestrator::{Devices, SessionSettings};
    use crate::domain::color::Button;
    use crate::domain::input::ButtonPress;
    use crate::domain::ports::PhotoPrinter;
    use crate::domain::state::State;
    use crate::error::Result;
    use crate::infrastructure::in_memory::{
        MemoryLeds, SilentChime, SimulatedCamera, SimulatedGateway,
    };
    use crate::metrics::KioskMetrics;
    use async_trait::async_trait;
    use std::path::Path;

    struct InstantPrinter;

    #[async_trait]
    impl PhotoPrinter for InstantPrinter {
        async fn print(&self, _image: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn demo_kiosk() -> Arc<Orchestrator> {
        let devices = Devices {
            gateway: Arc::new(SimulatedGateway::declining()),
            camera: Arc::new(SimulatedCamera::new(4)),
            printer: Arc::new(InstantPrinter),
            leds: Arc::new(MemoryLeds::new()),
            chime: Arc::new(SilentChime::new()),
        };
        let settings = SessionSettings {
            demo_mode: true,
            ..SessionSettings::default()
        };
        Orchestrator::new(devices, settings, KioskMetrics::unregistered())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_session_is_reset_exactly_once() {
        let kiosk = demo_kiosk();
        kiosk.start().await;
        let watchdog = Watchdog {
            interval: Duration::from_secs(10),
            budget: Duration::from_secs(300),
        }
        .spawn(Arc::clone(&kiosk));

        // The customer walks away without pressing button-2.
        kiosk.on_button1(ButtonPress::now(Button::Pay)).await;
        assert_eq!(kiosk.state().await, State::PhotoPulsing);

        tokio::time::sleep(Duration::from_secs(290)).await;
        assert_eq!(kiosk.state().await, State::PhotoPulsing);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(kiosk.state().await, State::Idle);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(kiosk.metrics().watchdog_resets.get(), 1);

        watchdog.abort();
        kiosk.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_kiosk_is_left_alone() {
        let kiosk = demo_kiosk();
        kiosk.start().await;
        let watchdog = Watchdog {
            interval: Duration::from_secs(10),
            budget: Duration::from_secs(300),
        }
        .spawn(Arc::clone(&kiosk));

        tokio::time::sleep(Duration::from_secs(900)).await;

        assert_eq!(kiosk.metrics().watchdog_resets.get(), 0);
        assert_eq!(kiosk.metrics().transitions_into(State::Idle), 1);
        watchdog.abort();
        kiosk.shutdown().await;
    }
}
