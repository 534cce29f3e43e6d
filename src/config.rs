//! Kiosk configuration, read from a JSON file next to the binary.

use crate::domain::payment::ChargeAmount;
use crate::error::{KioskError, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
///
/// Only the payment credentials and the price are mandatory; every other section falls back
/// to the values the kiosk shipped with.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KioskConfig {
    pub merchant_code: String,
    #[serde(rename = "readerID", alias = "readerId")]
    pub reader_id: String,
    pub bearer_token: String,
    pub payment: PaymentConfig,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_photos_dir", alias = "photos_dir")]
    pub photos_dir: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Skip payment entirely; used when testing the kiosk at a venue.
    #[serde(default)]
    pub demo_mode: bool,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Absent on machines without PWM wiring; LEDs are then only logged.
    #[serde(default)]
    pub leds: Option<LedConfig>,
    #[serde(default)]
    pub chime: ChimeConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfig {
    pub currency: String,
    pub amount: ChargeAmount,
    #[serde(default = "default_minor_unit")]
    pub minor_unit: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    pub gphoto2: String,
    pub montage: String,
    pub max_photos: u32,
    pub capture_timeout_secs: u64,
    pub collage_timeout_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            gphoto2: "gphoto2".to_string(),
            montage: "montage".to_string(),
            max_photos: 4,
            capture_timeout_secs: 30,
            collage_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrinterConfig {
    pub name: String,
    pub job_title: String,
    /// IPP endpoint queried for job states and consumable levels; derived from `name` when
    /// unset.
    pub ipp_uri: Option<String>,
    pub ipptool: String,
    /// ImageMagick `convert`, used to lay the collage out on the printer's page.
    pub convert: String,
    /// Page size in pixels at the printer's resolution.
    pub page_width: u32,
    pub page_height: u32,
    pub prepare_timeout_secs: u64,
    pub queued_timeout_secs: u64,
    pub processing_timeout_secs: u64,
    pub completion_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl PrinterConfig {
    pub fn ipp_uri(&self) -> String {
        self.ipp_uri
            .clone()
            .unwrap_or_else(|| format!("ipp://localhost/printers/{}", self.name))
    }

    /// Longest a print can take from page preparation to the last phase deadline.
    pub fn worst_case_secs(&self) -> u64 {
        self.prepare_timeout_secs
            + self.queued_timeout_secs
            + self.processing_timeout_secs
            + self.completion_timeout_secs
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            name: "Dai_Nippon_Printing_DS-RX1".to_string(),
            job_title: "Photobooth Print".to_string(),
            ipp_uri: None,
            ipptool: "ipptool".to_string(),
            convert: "convert".to_string(),
            page_width: 1844,
            page_height: 1240,
            prepare_timeout_secs: 30,
            queued_timeout_secs: 20,
            processing_timeout_secs: 60,
            completion_timeout_secs: 120,
            poll_interval_ms: 1000,
        }
    }
}

/// Every delay and budget the session orchestrator works with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimingConfig {
    /// Time the card reader gets to greet the customer before the first status lookup.
    pub status_check_delay_ms: u64,
    pub poll_max_attempts: u32,
    pub poll_interval_ms: u64,
    pub countdown_ticks: u32,
    pub countdown_tick_ms: u64,
    /// Pause between two shots while button-2 shows the waiting color.
    pub settle_ms: u64,
    pub watchdog_interval_secs: u64,
    pub inactivity_budget_secs: u64,
}

impl TimingConfig {
    pub fn status_check_delay(&self) -> Duration {
        Duration::from_millis(self.status_check_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    pub fn inactivity_budget(&self) -> Duration {
        Duration::from_secs(self.inactivity_budget_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            status_check_delay_ms: 4000,
            poll_max_attempts: 60,
            poll_interval_ms: 1000,
            countdown_ticks: 4,
            countdown_tick_ms: 920,
            settle_ms: 500,
            watchdog_interval_secs: 10,
            inactivity_budget_secs: 300,
        }
    }
}

/// Sysfs PWM wiring: one channel per color, per button.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LedConfig {
    pub chip: PathBuf,
    pub period_ns: u64,
    /// PWM channel indices for red, green and blue of button-1.
    pub pay: [u32; 3],
    /// PWM channel indices for red, green and blue of button-2.
    pub shutter: [u32; 3],
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            chip: PathBuf::from("/sys/class/pwm/pwmchip0"),
            period_ns: 1_000_000,
            pay: [0, 1, 2],
            shutter: [3, 4, 5],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChimeConfig {
    pub file: PathBuf,
    pub player: String,
}

impl Default for ChimeConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("timer_audio.wav"),
            player: "aplay".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsConfig {
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

fn default_api_base() -> String {
    "https://api.sumup.com".to_string()
}

fn default_photos_dir() -> PathBuf {
    PathBuf::from("photos")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("archive")
}

fn default_minor_unit() -> u32 {
    2
}

impl KioskConfig {
    /// Reads and validates the configuration file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            KioskError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.bearer_token.trim().is_empty() {
            return Err(KioskError::ConfigError(
                "bearer token is empty in config file".to_string(),
            ));
        }
        if self.merchant_code.trim().is_empty() {
            return Err(KioskError::ConfigError(
                "merchant code is empty in config file".to_string(),
            ));
        }
        if self.camera.max_photos == 0 {
            return Err(KioskError::ConfigError(
                "camera.maxPhotos must be at least 1".to_string(),
            ));
        }
        if self.timing.poll_max_attempts == 0 {
            return Err(KioskError::ConfigError(
                "timing.pollMaxAttempts must be at least 1".to_string(),
            ));
        }
        // Collage and print run inside PhotoComplete without a transition, so the watchdog
        // must not fire before their own deadlines do.
        let print_budget = self.camera.collage_timeout_secs + self.printer.worst_case_secs();
        if print_budget >= self.timing.inactivity_budget_secs {
            return Err(KioskError::ConfigError(format!(
                "collage and print timeouts add up to {print_budget}s, which must stay below \
                 timing.inactivityBudgetSecs ({}s)",
                self.timing.inactivity_budget_secs
            )));
        }
        // The value sent to the reader must be expressible in minor units.
        self.payment.amount.minor_units(self.payment.minor_unit)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MINIMAL: &str = r#"{
        "merchantCode": "MCODE",
        "readerID": "rdr_123",
        "bearerToken": "secret",
        "payment": { "currency": "EUR", "amount": "5.00" }
    }"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = KioskConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.reader_id, "rdr_123");
        assert_eq!(config.payment.amount.value(), dec!(5.00));
        assert_eq!(config.payment.minor_unit, 2);
        assert_eq!(config.photos_dir, PathBuf::from("photos"));
        assert!(!config.demo_mode);
        assert!(config.leds.is_none());
        assert_eq!(config.camera.max_photos, 4);
        assert_eq!(config.timing.status_check_delay(), Duration::from_secs(4));
        assert_eq!(config.timing.poll_max_attempts, 60);
        assert_eq!(config.timing.inactivity_budget(), Duration::from_secs(300));
        assert_eq!(config.timing.watchdog_interval(), Duration::from_secs(10));
        assert_eq!(
            config.printer.ipp_uri(),
            "ipp://localhost/printers/Dai_Nippon_Printing_DS-RX1"
        );
        assert_eq!(config.metrics.listen.port(), 8000);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let raw = r#"{
            "merchantCode": "MCODE",
            "readerID": "rdr_123",
            "bearerToken": "secret",
            "payment": { "currency": "GBP", "amount": 3, "minorUnit": 2 },
            "photos_dir": "/var/kiosk/photos",
            "demoMode": true,
            "timing": { "countdownTicks": 3 },
            "leds": { "pay": [2, 1, 0] }
        }"#;
        let config = KioskConfig::from_json(raw).unwrap();
        assert!(config.demo_mode);
        assert_eq!(config.photos_dir, PathBuf::from("/var/kiosk/photos"));
        assert_eq!(config.timing.countdown_ticks, 3);
        assert_eq!(config.timing.countdown_tick_ms, 920);
        let leds = config.leds.unwrap();
        assert_eq!(leds.pay, [2, 1, 0]);
        assert_eq!(leds.shutter, [3, 4, 5]);
    }

    #[test]
    fn test_empty_bearer_token_is_rejected() {
        let raw = MINIMAL.replace("\"secret\"", "\"  \"");
        let err = KioskConfig::from_json(&raw).unwrap_err();
        assert!(matches!(err, KioskError::ConfigError(msg) if msg.contains("bearer token")));
    }

    #[test]
    fn test_price_with_too_many_decimals_is_rejected() {
        let raw = MINIMAL.replace("\"5.00\"", "\"5.001\"");
        assert!(matches!(
            KioskConfig::from_json(&raw),
            Err(KioskError::ValidationError(_))
        ));
    }

    #[test]
    fn test_default_print_budget_fits_the_watchdog() {
        let config = KioskConfig::from_json(MINIMAL).unwrap();
        let print_budget = config.camera.collage_timeout_secs + config.printer.worst_case_secs();
        assert_eq!(print_budget, 290);
        assert!(print_budget < config.timing.inactivity_budget_secs);
    }

    #[test]
    fn test_print_timeouts_beyond_watchdog_are_rejected() {
        let raw = MINIMAL.replace(
            "\"bearerToken\"",
            r#""printer": { "completionTimeoutSecs": 180 }, "bearerToken""#,
        );
        let err = KioskConfig::from_json(&raw).unwrap_err();
        assert!(matches!(err, KioskError::ConfigError(msg) if msg.contains("350s")));

        let raw = raw.replace(
            "\"bearerToken\"",
            r#""timing": { "inactivityBudgetSecs": 400 }, "bearerToken""#,
        );
        assert!(KioskConfig::from_json(&raw).is_ok());
    }

    #[test]
    fn test_missing_payment_section_is_a_parse_error() {
        let raw = r#"{ "merchantCode": "M", "readerID": "R", "bearerToken": "T" }"#;
        assert!(matches!(
            KioskConfig::from_json(raw),
            Err(KioskError::ConfigParseError(_))
        ));
    }
}
