use crate::config::LedConfig;
use crate::domain::color::{Button, Color};
use crate::domain::ports::LedDriver;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One PWM output of a sysfs `pwmchip`.
#[derive(Debug, Clone)]
struct PwmChannel {
    duty_cycle: PathBuf,
}

impl PwmChannel {
    fn open(chip: &Path, index: u32, period_ns: u64) -> Result<Self> {
        let dir = chip.join(format!("pwm{index}"));
        if !dir.exists() {
            fs::write(chip.join("export"), index.to_string())?;
        }
        fs::write(dir.join("period"), period_ns.to_string())?;
        fs::write(dir.join("duty_cycle"), "0")?;
        fs::write(dir.join("enable"), "1")?;
        Ok(Self {
            duty_cycle: dir.join("duty_cycle"),
        })
    }

    fn set(&self, duty_ns: u64) -> std::io::Result<()> {
        fs::write(&self.duty_cycle, duty_ns.to_string())
    }
}

/// Drives the common-cathode RGB LEDs of both buttons through sysfs PWM.
pub struct SysfsPwmLeds {
    period_ns: u64,
    channels: [[PwmChannel; 3]; 2],
}

impl SysfsPwmLeds {
    pub fn open(config: &LedConfig) -> Result<Self> {
        let open_rgb = |indices: [u32; 3]| -> Result<[PwmChannel; 3]> {
            Ok([
                PwmChannel::open(&config.chip, indices[0], config.period_ns)?,
                PwmChannel::open(&config.chip, indices[1], config.period_ns)?,
                PwmChannel::open(&config.chip, indices[2], config.period_ns)?,
            ])
        };
        let channels = [open_rgb(config.pay)?, open_rgb(config.shutter)?];
        info!(chip = %config.chip.display(), "PWM LEDs ready");
        Ok(Self {
            period_ns: config.period_ns,
            channels,
        })
    }

    fn duty(&self, value: f32) -> u64 {
        (f64::from(value.clamp(0.0, 1.0)) * self.period_ns as f64).round() as u64
    }
}

impl LedDriver for SysfsPwmLeds {
    fn write(&self, button: Button, color: Color) {
        let rgb = [color.red, color.green, color.blue];
        for (channel, value) in self.channels[button.index()].iter().zip(rgb) {
            if let Err(e) = channel.set(self.duty(value)) {
                warn!(%button, error = %e, "PWM write failed");
            }
        }
    }
}

/// For machines without LED wiring: colors only show up in the debug log.
pub struct LoggingLeds;

impl LedDriver for LoggingLeds {
    fn write(&self, button: Button, color: Color) {
        debug!(%button, red = color.red, green = color.green, blue = color.blue, "led");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_chip(channels: u32) -> tempfile::TempDir {
        let chip = tempfile::tempdir().unwrap();
        for index in 0..channels {
            fs::create_dir(chip.path().join(format!("pwm{index}"))).unwrap();
        }
        chip
    }

    fn read(chip: &Path, index: u32, file: &str) -> String {
        fs::read_to_string(chip.join(format!("pwm{index}")).join(file)).unwrap()
    }

    #[test]
    fn test_open_enables_every_channel() {
        let chip = fake_chip(6);
        let config = LedConfig {
            chip: chip.path().to_path_buf(),
            ..LedConfig::default()
        };

        SysfsPwmLeds::open(&config).unwrap();

        for index in 0..6 {
            assert_eq!(read(chip.path(), index, "period"), "1000000");
            assert_eq!(read(chip.path(), index, "enable"), "1");
        }
    }

    #[test]
    fn test_write_maps_color_to_duty_cycle() {
        let chip = fake_chip(6);
        let config = LedConfig {
            chip: chip.path().to_path_buf(),
            ..LedConfig::default()
        };
        let leds = SysfsPwmLeds::open(&config).unwrap();

        leds.write(Button::Shutter, Color::rgb(1.0, 0.5, 0.0));

        assert_eq!(read(chip.path(), 3, "duty_cycle"), "1000000");
        assert_eq!(read(chip.path(), 4, "duty_cycle"), "500000");
        assert_eq!(read(chip.path(), 5, "duty_cycle"), "0");
        assert_eq!(read(chip.path(), 0, "duty_cycle"), "0");
    }

    #[test]
    fn test_missing_chip_fails_to_open() {
        let config = LedConfig {
            chip: PathBuf::from("/nonexistent/pwmchip9"),
            ..LedConfig::default()
        };
        assert!(SysfsPwmLeds::open(&config).is_err());
    }
}
