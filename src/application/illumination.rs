use crate::domain::color::{Button, Color};
use crate::domain::ports::SharedLedDriver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Discrete brightness steps in one half of a breath (0 → peak).
pub const PULSE_STEPS: u32 = 36;
/// How long `stop_pulse` waits for the animation to notice before aborting it.
pub const STOP_GRACE: Duration = Duration::from_secs(1);
/// On/off cadence of a flash.
pub const FLASH_INTERVAL: Duration = Duration::from_millis(200);

/// Red channel attenuation applied to solid colors and to the pulse animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub solid_red: f32,
    pub pulse_red: f32,
}

impl Calibration {
    pub const fn for_button(button: Button) -> Self {
        match button {
            Button::Pay => Self {
                solid_red: 0.8,
                pulse_red: 0.1,
            },
            Button::Shutter => Self {
                solid_red: 1.0,
                pulse_red: 0.1,
            },
        }
    }
}

/// Sleep between two animation steps; longer at the dark end and near the peak so the
/// breath reads smoothly.
pub fn step_delay(brightness: f32) -> Duration {
    if brightness == 0.0 {
        Duration::from_millis(250)
    } else if brightness <= 0.3 {
        Duration::from_millis(30)
    } else if brightness >= 0.8 {
        Duration::from_millis(45)
    } else {
        Duration::from_millis(40)
    }
}

/// One button's pulse animation state.
struct PulseChannel {
    calibration: Calibration,
    active: Arc<AtomicBool>,
    color: Arc<Mutex<Color>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PulseChannel {
    fn new(button: Button, initial: Color) -> Self {
        Self {
            calibration: Calibration::for_button(button),
            active: Arc::new(AtomicBool::new(false)),
            color: Arc::new(Mutex::new(initial)),
            task: Mutex::new(None),
        }
    }
}

/// Drives both illuminated buttons.
///
/// Solid colors are written straight through the LED driver. Each button can additionally
/// run one breathing animation on its own task; the two animations never affect each other.
pub struct IlluminationEngine {
    driver: SharedLedDriver,
    channels: [PulseChannel; 2],
}

impl IlluminationEngine {
    pub fn new(driver: SharedLedDriver) -> Self {
        Self {
            driver,
            channels: [
                PulseChannel::new(Button::Pay, Color::WHITE),
                PulseChannel::new(Button::Shutter, Color::rgb(1.0, 1.0, 0.0)),
            ],
        }
    }

    fn channel(&self, button: Button) -> &PulseChannel {
        &self.channels[button.index()]
    }

    /// Shows `color` on `button` right away.
    pub fn set_color(&self, button: Button, color: Color) {
        let calibrated = color
            .clamped()
            .with_red_factor(self.channel(button).calibration.solid_red);
        self.driver.write(button, calibrated);
        debug!(%button, ?color, "button color set");
    }

    /// Color the next (and any running) animation breathes in.
    pub fn set_pulse_color(&self, button: Button, color: Color) {
        let channel = self.channel(button);
        if let Ok(mut current) = channel.color.lock() {
            *current = color.clamped();
        }
        debug!(%button, ?color, "pulse color set");
    }

    pub fn is_pulsing(&self, button: Button) -> bool {
        self.channel(button).active.load(Ordering::SeqCst)
    }

    /// Starts the breathing animation; does nothing if it already runs.
    pub fn start_pulse(&self, button: Button) {
        let channel = self.channel(button);
        if channel.active.swap(true, Ordering::SeqCst) {
            return;
        }

        let handle = tokio::spawn(pulse_loop(
            button,
            channel.calibration,
            Arc::clone(&self.driver),
            Arc::clone(&channel.active),
            Arc::clone(&channel.color),
        ));
        if let Ok(mut task) = channel.task.lock() {
            *task = Some(handle);
        }
        info!(%button, "started pulsing");
    }

    /// Stops the animation and leaves the button dark.
    ///
    /// Waits up to [`STOP_GRACE`] for the loop to exit and aborts it otherwise, so no
    /// animation step can land after the button is blanked.
    pub async fn stop_pulse(&self, button: Button) {
        let channel = self.channel(button);
        if !channel.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let handle = channel.task.lock().ok().and_then(|mut task| task.take());
        if let Some(mut handle) = handle
            && tokio::time::timeout(STOP_GRACE, &mut handle).await.is_err()
        {
            handle.abort();
            let _ = handle.await;
        }
        self.driver.write(button, Color::OFF);
        info!(%button, "stopped pulsing and turned off");
    }

    /// Blocks while `button` alternates between `color` and off, `times` times.
    ///
    /// Callers stop a running pulse first; a flash does not interrupt one.
    pub async fn flash(&self, button: Button, color: Color, times: u32) {
        for _ in 0..times {
            self.set_color(button, color);
            tokio::time::sleep(FLASH_INTERVAL).await;
            self.set_color(button, Color::OFF);
            tokio::time::sleep(FLASH_INTERVAL).await;
        }
        debug!(%button, times, "flash finished");
    }

    pub async fn flash_red(&self, button: Button, times: u32) {
        self.flash(button, Color::RED, times).await;
    }

    /// Stops both animations and blanks both buttons.
    pub async fn shutdown(&self) {
        for button in Button::ALL {
            self.stop_pulse(button).await;
            self.set_color(button, Color::OFF);
        }
    }
}

async fn pulse_loop(
    button: Button,
    calibration: Calibration,
    driver: SharedLedDriver,
    active: Arc<AtomicBool>,
    color: Arc<Mutex<Color>>,
) {
    let peak = (PULSE_STEPS - 1) as f32;
    let rising = 0..PULSE_STEPS;
    let falling = (0..PULSE_STEPS).rev();

    'breath: loop {
        for step in rising.clone().chain(falling.clone()) {
            if !active.load(Ordering::SeqCst) {
                break 'breath;
            }
            let brightness = step as f32 / peak;
            let target = color.lock().map(|c| *c).unwrap_or(Color::OFF);
            driver.write(
                button,
                target
                    .scaled(brightness)
                    .with_red_factor(calibration.pulse_red),
            );
            tokio::time::sleep(step_delay(brightness)).await;
        }
    }
    debug!(%button, "pulse loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::MemoryLeds;

    fn engine() -> (IlluminationEngine, Arc<MemoryLeds>) {
        let leds = Arc::new(MemoryLeds::new());
        let engine = IlluminationEngine::new(leds.clone());
        (engine, leds)
    }

    #[test]
    fn test_step_delay_buckets() {
        assert_eq!(step_delay(0.0), Duration::from_millis(250));
        assert_eq!(step_delay(0.2), Duration::from_millis(30));
        assert_eq!(step_delay(0.3), Duration::from_millis(30));
        assert_eq!(step_delay(0.5), Duration::from_millis(40));
        assert_eq!(step_delay(0.8), Duration::from_millis(45));
        assert_eq!(step_delay(1.0), Duration::from_millis(45));
    }

    #[test]
    fn test_set_color_applies_red_calibration() {
        let (engine, leds) = engine();
        engine.set_color(Button::Pay, Color::RED);
        engine.set_color(Button::Shutter, Color::RED);

        assert_eq!(leds.current(Button::Pay), Color::rgb(0.8, 0.0, 0.0));
        assert_eq!(leds.current(Button::Shutter), Color::RED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_breathes_up_and_down() {
        let (engine, leds) = engine();
        engine.set_pulse_color(Button::Shutter, Color::rgb(0.0, 1.0, 0.0));
        engine.start_pulse(Button::Shutter);

        // One full breath: 36 steps up and 36 down.
        tokio::time::sleep(Duration::from_secs(4)).await;
        let greens: Vec<f32> = leds
            .history(Button::Shutter)
            .iter()
            .map(|c| c.green)
            .collect();
        assert!(greens.len() >= 2 * PULSE_STEPS as usize);
        assert_eq!(greens[0], 0.0);
        assert_eq!(greens[PULSE_STEPS as usize - 1], 1.0);
        assert_eq!(greens[2 * PULSE_STEPS as usize - 1], 0.0);

        engine.stop_pulse(Button::Shutter).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_always_leaves_button_dark() {
        for offset_ms in [0_u64, 7, 45, 333, 800, 1234, 2999] {
            let (engine, leds) = engine();
            engine.set_pulse_color(Button::Pay, Color::WHITE);
            engine.start_pulse(Button::Pay);
            tokio::time::sleep(Duration::from_millis(offset_ms)).await;

            engine.stop_pulse(Button::Pay).await;
            assert!(!engine.is_pulsing(Button::Pay));
            assert_eq!(leds.current(Button::Pay), Color::OFF, "offset {offset_ms}ms");

            // Nothing lands after the stop.
            let writes = leds.history(Button::Pay).len();
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(leds.history(Button::Pay).len(), writes);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_runs_one_animation() {
        let (engine, leds) = engine();
        engine.start_pulse(Button::Pay);
        engine.start_pulse(Button::Pay);

        // The first step sits at brightness 0 for 250ms; a second loop would double it.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(leds.history(Button::Pay).len(), 1);

        engine.stop_pulse(Button::Pay).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_buttons_pulse_independently() {
        let (engine, leds) = engine();
        engine.start_pulse(Button::Pay);
        engine.start_pulse(Button::Shutter);
        tokio::time::sleep(Duration::from_millis(600)).await;

        engine.stop_pulse(Button::Shutter).await;
        assert!(engine.is_pulsing(Button::Pay));
        assert!(!engine.is_pulsing(Button::Shutter));

        let before = leds.history(Button::Pay).len();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(leds.history(Button::Pay).len() > before);
        assert_eq!(leds.current(Button::Shutter), Color::OFF);

        engine.stop_pulse(Button::Pay).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_pulse_is_a_no_op() {
        let (engine, leds) = engine();
        engine.set_color(Button::Shutter, Color::DONE);
        engine.stop_pulse(Button::Shutter).await;
        assert_eq!(leds.current(Button::Shutter), Color::DONE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flash_alternates_and_ends_dark() {
        let (engine, leds) = engine();
        let started = tokio::time::Instant::now();
        engine.flash_red(Button::Shutter, 3).await;

        assert_eq!(started.elapsed(), FLASH_INTERVAL * 6);
        assert_eq!(
            leds.history(Button::Shutter),
            vec![
                Color::RED,
                Color::OFF,
                Color::RED,
                Color::OFF,
                Color::RED,
                Color::OFF
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_blanks_both_buttons() {
        let (engine, leds) = engine();
        engine.start_pulse(Button::Pay);
        engine.set_color(Button::Shutter, Color::COUNTING);
        tokio::time::sleep(Duration::from_millis(700)).await;

        engine.shutdown().await;

        assert!(!engine.is_pulsing(Button::Pay));
        assert_eq!(leds.current(Button::Pay), Color::OFF);
        assert_eq!(leds.current(Button::Shutter), Color::OFF);
    }
}
