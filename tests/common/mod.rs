#![allow(dead_code)]

use async_trait::async_trait;
use photokiosk::application::orchestrator::{Devices, Orchestrator, SessionSettings};
use photokiosk::domain::ports::PhotoPrinter;
use photokiosk::domain::state::State;
use photokiosk::error::{KioskError, Result};
use photokiosk::infrastructure::in_memory::{
    MemoryLeds, SilentChime, SimulatedCamera, SimulatedGateway,
};
use photokiosk::metrics::KioskMetrics;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Remembers every image it was asked to print, and optionally refuses them all.
#[derive(Default)]
pub struct RecordingPrinter {
    fail: bool,
    printed: Mutex<Vec<PathBuf>>,
}

impl RecordingPrinter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn printed(&self) -> Vec<PathBuf> {
        self.printed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoPrinter for RecordingPrinter {
    async fn print(&self, image: &Path) -> Result<()> {
        self.printed.lock().unwrap().push(image.to_path_buf());
        if self.fail {
            return Err(KioskError::PrintError("ribbon empty".to_string()));
        }
        Ok(())
    }
}

pub struct Kiosk {
    pub orchestrator: Arc<Orchestrator>,
    pub gateway: Arc<SimulatedGateway>,
    pub camera: Arc<SimulatedCamera>,
    pub printer: Arc<RecordingPrinter>,
    pub leds: Arc<MemoryLeds>,
    pub states: broadcast::Receiver<State>,
}

/// Starts a kiosk on simulated devices and subscribes to its transitions.
pub async fn start_kiosk(
    gateway: SimulatedGateway,
    camera: SimulatedCamera,
    printer: RecordingPrinter,
    demo_mode: bool,
) -> Kiosk {
    let gateway = Arc::new(gateway);
    let camera = Arc::new(camera);
    let printer = Arc::new(printer);
    let leds = Arc::new(MemoryLeds::new());
    let devices = Devices {
        gateway: gateway.clone(),
        camera: camera.clone(),
        printer: printer.clone(),
        leds: leds.clone(),
        chime: Arc::new(SilentChime::new()),
    };
    let settings = SessionSettings {
        demo_mode,
        ..SessionSettings::default()
    };
    let orchestrator = Orchestrator::new(devices, settings, KioskMetrics::unregistered());
    orchestrator.start().await;
    let states = orchestrator.subscribe();
    Kiosk {
        orchestrator,
        gateway,
        camera,
        printer,
        leds,
        states,
    }
}

impl Kiosk {
    /// Polls until the kiosk is in `state`, panicking after `within`.
    pub async fn wait_for(&self, state: State, within: Duration) {
        let deadline = tokio::time::Instant::now() + within;
        while self.orchestrator.state().await != state {
            assert!(
                tokio::time::Instant::now() < deadline,
                "kiosk never reached {state}"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Every transition broadcast since the last call.
    pub fn drain(&mut self) -> Vec<State> {
        let mut seen = Vec::new();
        while let Ok(state) = self.states.try_recv() {
            seen.push(state);
        }
        seen
    }
}

pub fn count(states: &[State], state: State) -> usize {
    states.iter().filter(|s| **s == state).count()
}
