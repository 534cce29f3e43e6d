use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two illuminated push buttons on the kiosk front panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    /// Starts a session (payment).
    Pay,
    /// Starts the shot sequence once payment succeeded.
    Shutter,
}

impl Button {
    pub const ALL: [Button; 2] = [Button::Pay, Button::Shutter];

    pub fn index(self) -> usize {
        match self {
            Button::Pay => 0,
            Button::Shutter => 1,
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::Pay => write!(f, "button-1"),
            Button::Shutter => write!(f, "button-2"),
        }
    }
}

/// An RGB intensity triple, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

impl Color {
    pub const OFF: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const RED: Self = Self::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Self = Self::rgb(0.0, 1.0, 0.0);

    /// Button-1 while a checkout is outstanding.
    pub const PROCESSING: Self = Self::rgb(0.7, 0.0, 1.0);
    /// Button-1 once the payment went through.
    pub const SUCCESS: Self = Self::GREEN;
    /// Button-2 pulse inviting the customer to start shooting.
    pub const INVITE: Self = Self::rgb(0.1, 1.0, 1.0);
    /// Button-2 while a countdown runs.
    pub const COUNTING: Self = Self::rgb(1.0, 0.0, 1.0);
    /// Button-2 between two shots.
    pub const WAITING: Self = Self::rgb(1.0, 0.5, 0.0);
    /// Button-2 once every shot is in.
    pub const DONE: Self = Self::GREEN;

    pub const fn rgb(red: f32, green: f32, blue: f32) -> Self {
        Self { red, green, blue }
    }

    /// Clamps every channel into `[0, 1]`.
    pub fn clamped(self) -> Self {
        Self {
            red: self.red.clamp(0.0, 1.0),
            green: self.green.clamp(0.0, 1.0),
            blue: self.blue.clamp(0.0, 1.0),
        }
    }

    /// Scales every channel by `factor`.
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            red: self.red * factor,
            green: self.green * factor,
            blue: self.blue * factor,
        }
    }

    /// Attenuates the red channel only; red LEDs read brighter than green and blue.
    pub fn with_red_factor(self, factor: f32) -> Self {
        Self {
            red: self.red * factor,
            ..self
        }
    }

    pub fn is_off(&self) -> bool {
        self.red == 0.0 && self.green == 0.0 && self.blue == 0.0
    }
}
