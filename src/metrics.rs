//! Prometheus metrics for the kiosk.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `kiosk_transitions_total` | Counter | `state` |
//! | `kiosk_current_state` | Gauge | `state` |
//! | `kiosk_payment_initiated_total` | Counter | |
//! | `kiosk_payment_success_total` | Counter | |
//! | `kiosk_payment_failed_total` | Counter | |
//! | `kiosk_photos_taken_total` | Counter | |
//! | `kiosk_capture_failed_total` | Counter | |
//! | `kiosk_print_success_total` | Counter | |
//! | `kiosk_print_failed_total` | Counter | |
//! | `kiosk_watchdog_resets_total` | Counter | |
//! | `kiosk_payment_duration_seconds` | Histogram | |
//! | `kiosk_printer_marker_level` | Gauge | `marker` |

use crate::domain::print::MarkerLevel;
use crate::domain::state::State;
use crate::error::{KioskError, Result};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Checkout creation normally answers within a second; the reader can take up to 10.
const PAYMENT_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// All kiosk metrics, registered against one registry.
///
/// Every handle is reference counted internally, so clones share the same series.
#[derive(Clone)]
pub struct KioskMetrics {
    pub transitions_total: IntCounterVec,
    pub current_state: IntGaugeVec,
    pub payment_initiated: IntCounter,
    pub payment_success: IntCounter,
    pub payment_failed: IntCounter,
    pub photos_taken: IntCounter,
    pub capture_failed: IntCounter,
    pub print_success: IntCounter,
    pub print_failed: IntCounter,
    pub watchdog_resets: IntCounter,
    pub payment_duration: Histogram,
    pub printer_marker_level: IntGaugeVec,
}

impl KioskMetrics {
    /// Creates every metric and registers it with `registry`.
    ///
    /// # Errors
    ///
    /// Fails if a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self> {
        let transitions_total = IntCounterVec::new(
            Opts::new("kiosk_transitions_total", "State transitions, by state entered"),
            &["state"],
        )?;
        let current_state = IntGaugeVec::new(
            Opts::new("kiosk_current_state", "1 for the state the kiosk is in, 0 otherwise"),
            &["state"],
        )?;
        let payment_initiated = IntCounter::new(
            "kiosk_payment_initiated_total",
            "Total number of payment initiations",
        )?;
        let payment_success = IntCounter::new(
            "kiosk_payment_success_total",
            "Total number of successful payments",
        )?;
        let payment_failed =
            IntCounter::new("kiosk_payment_failed_total", "Total number of failed payments")?;
        let photos_taken =
            IntCounter::new("kiosk_photos_taken_total", "Total number of photos taken")?;
        let capture_failed =
            IntCounter::new("kiosk_capture_failed_total", "Total number of failed captures")?;
        let print_success =
            IntCounter::new("kiosk_print_success_total", "Total number of finished prints")?;
        let print_failed = IntCounter::new(
            "kiosk_print_failed_total",
            "Total number of failed collages or prints",
        )?;
        let watchdog_resets = IntCounter::new(
            "kiosk_watchdog_resets_total",
            "Sessions force-reset after inactivity",
        )?;
        let payment_duration = Histogram::with_opts(
            HistogramOpts::new(
                "kiosk_payment_duration_seconds",
                "Duration of checkout creation",
            )
            .buckets(PAYMENT_DURATION_BUCKETS.to_vec()),
        )?;
        let printer_marker_level = IntGaugeVec::new(
            Opts::new(
                "kiosk_printer_marker_level",
                "Remaining printer consumables in percent",
            ),
            &["marker"],
        )?;

        registry.register(Box::new(transitions_total.clone()))?;
        registry.register(Box::new(current_state.clone()))?;
        registry.register(Box::new(payment_initiated.clone()))?;
        registry.register(Box::new(payment_success.clone()))?;
        registry.register(Box::new(payment_failed.clone()))?;
        registry.register(Box::new(photos_taken.clone()))?;
        registry.register(Box::new(capture_failed.clone()))?;
        registry.register(Box::new(print_success.clone()))?;
        registry.register(Box::new(print_failed.clone()))?;
        registry.register(Box::new(watchdog_resets.clone()))?;
        registry.register(Box::new(payment_duration.clone()))?;
        registry.register(Box::new(printer_marker_level.clone()))?;

        Ok(Self {
            transitions_total,
            current_state,
            payment_initiated,
            payment_success,
            payment_failed,
            photos_taken,
            capture_failed,
            print_success,
            print_failed,
            watchdog_resets,
            payment_duration,
            printer_marker_level,
        })
    }

    /// Metrics backed by a private registry, for tests and the simulator.
    pub fn unregistered() -> Self {
        // A fresh registry never holds a duplicate name.
        Self::new(&Registry::new()).expect("fresh registry accepts every kiosk metric")
    }

    /// Records entry into `state`: one transition count, the state gauge, and the
    /// per-category counter the state stands for.
    pub fn record_transition(&self, state: State) {
        self.transitions_total
            .with_label_values(&[state.as_str()])
            .inc();
        for candidate in State::ALL {
            let value = i64::from(candidate == state);
            self.current_state
                .with_label_values(&[candidate.as_str()])
                .set(value);
        }

        match state {
            State::PaymentInitiated => self.payment_initiated.inc(),
            State::PaymentSuccess => self.payment_success.inc(),
            State::PaymentFailed => self.payment_failed.inc(),
            State::PhotoDownloading => self.photos_taken.inc(),
            State::PhotoTakingFailed => self.capture_failed.inc(),
            State::PhotoPrinted => self.print_success.inc(),
            State::PrintFailed => self.print_failed.inc(),
            _ => {}
        }
    }

    pub fn record_markers(&self, markers: &[MarkerLevel]) {
        for marker in markers {
            self.printer_marker_level
                .with_label_values(&[marker.name.as_str()])
                .set(i64::from(marker.level));
        }
    }

    pub fn transitions_into(&self, state: State) -> u64 {
        self.transitions_total
            .with_label_values(&[state.as_str()])
            .get()
    }
}

/// Renders `registry` in the Prometheus text exposition format.
pub fn encode_text(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| KioskError::ValidationError(e.to_string()))
}
