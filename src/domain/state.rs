use super::color::{Button, Color};
use serde::Serialize;
use std::fmt;

/// Times button-1 flashes red after a failed payment.
pub const PAYMENT_FAILURE_FLASHES: u32 = 5;
/// Times button-2 flashes red after a failed capture or print.
pub const SHOT_FAILURE_FLASHES: u32 = 10;
/// Times button-2 flashes green once the print is out.
pub const PRINTED_FLASHES: u32 = 3;

/// Every state the kiosk can be in. `Idle` is the only resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum State {
    Idle,
    PaymentInitiated,
    PaymentChecking,
    PaymentSuccess,
    PaymentFailed,
    PhotoPulsing,
    PhotoCountdown,
    PhotoTaking,
    PhotoDownloading,
    PhotoComplete,
    PhotoPrinted,
    PhotoTakingFailed,
    PrintFailed,
}

impl State {
    pub const ALL: [State; 13] = [
        State::Idle,
        State::PaymentInitiated,
        State::PaymentChecking,
        State::PaymentSuccess,
        State::PaymentFailed,
        State::PhotoPulsing,
        State::PhotoCountdown,
        State::PhotoTaking,
        State::PhotoDownloading,
        State::PhotoComplete,
        State::PhotoPrinted,
        State::PhotoTakingFailed,
        State::PrintFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            State::Idle => "IDLE",
            State::PaymentInitiated => "PAYMENT_INITIATED",
            State::PaymentChecking => "PAYMENT_CHECKING",
            State::PaymentSuccess => "PAYMENT_SUCCESS",
            State::PaymentFailed => "PAYMENT_FAILED",
            State::PhotoPulsing => "PHOTO_PULSING",
            State::PhotoCountdown => "PHOTO_COUNTDOWN",
            State::PhotoTaking => "PHOTO_TAKING",
            State::PhotoDownloading => "PHOTO_DOWNLOADING",
            State::PhotoComplete => "PHOTO_COMPLETE",
            State::PhotoPrinted => "PHOTO_PRINTED",
            State::PhotoTakingFailed => "PHOTO_TAKING_FAILED",
            State::PrintFailed => "PRINT_FAILED",
        }
    }

    /// Looks up the transition table.
    ///
    /// Returns `None` when `event` is not accepted in this state; callers treat that as a
    /// stale or racing request and drop it.
    pub fn on(self, event: Event) -> Option<Transition> {
        use Effect::*;

        let transition = match (self, event) {
            (_, Event::Reset) => Transition::new(
                State::Idle,
                vec![
                    PurgePhotos,
                    ClearSession,
                    ResetPhotoCount,
                    SetPulseColor(Button::Pay, Color::WHITE),
                    StartPulse(Button::Pay),
                    StopPulse(Button::Shutter),
                    SetColor(Button::Shutter, Color::OFF),
                ],
            ),
            (State::Idle, Event::PaymentRequested) => Transition::new(
                State::PaymentInitiated,
                vec![
                    StopPulse(Button::Pay),
                    SetColor(Button::Pay, Color::PROCESSING),
                ],
            ),
            (State::Idle, Event::PaymentBypassed) => Transition::new(
                State::PaymentSuccess,
                vec![StopPulse(Button::Pay), SetColor(Button::Pay, Color::SUCCESS)],
            ),
            (State::PaymentInitiated, Event::StatusCheckDue) => {
                Transition::new(State::PaymentChecking, vec![])
            }
            (State::PaymentChecking, Event::PaymentApproved) => {
                Transition::new(State::PaymentSuccess, vec![SetColor(Button::Pay, Color::SUCCESS)])
            }
            (State::PaymentInitiated | State::PaymentChecking, Event::PaymentDeclined) => {
                Transition::new(
                    State::PaymentFailed,
                    vec![Flash {
                        button: Button::Pay,
                        color: Color::RED,
                        times: PAYMENT_FAILURE_FLASHES,
                    }],
                )
            }
            (State::PaymentSuccess, Event::ShotsArmed) => Transition::new(
                State::PhotoPulsing,
                vec![
                    SetPulseColor(Button::Shutter, Color::INVITE),
                    StartPulse(Button::Shutter),
                ],
            ),
            (State::PhotoPulsing, Event::ShutterPressed) => Transition::new(
                State::PhotoCountdown,
                vec![
                    StopPulse(Button::Shutter),
                    SetColor(Button::Shutter, Color::COUNTING),
                    PlayChime,
                ],
            ),
            (State::PhotoCountdown, Event::CountdownElapsed) => Transition::new(
                State::PhotoTaking,
                vec![SetColor(Button::Shutter, Color::COUNTING)],
            ),
            (State::PhotoTaking, Event::PhotoSaved) => {
                Transition::new(State::PhotoDownloading, vec![])
            }
            (State::PhotoTaking, Event::CaptureFailed) => Transition::new(
                State::PhotoTakingFailed,
                vec![Flash {
                    button: Button::Shutter,
                    color: Color::RED,
                    times: SHOT_FAILURE_FLASHES,
                }],
            ),
            (State::PhotoDownloading, Event::NextShot) => Transition::new(
                State::PhotoCountdown,
                vec![
                    SetColor(Button::Shutter, Color::WAITING),
                    Settle,
                    ReleaseCamera,
                    PlayChime,
                    SetColor(Button::Shutter, Color::COUNTING),
                ],
            ),
            (State::PhotoDownloading, Event::AllShotsTaken) => {
                Transition::new(State::PhotoComplete, vec![SetColor(Button::Shutter, Color::DONE)])
            }
            (State::PhotoComplete, Event::PrintSucceeded) => Transition::new(
                State::PhotoPrinted,
                vec![Flash {
                    button: Button::Shutter,
                    color: Color::GREEN,
                    times: PRINTED_FLASHES,
                }],
            ),
            (State::PhotoComplete, Event::PrintFailed) => Transition::new(
                State::PrintFailed,
                vec![Flash {
                    button: Button::Shutter,
                    color: Color::RED,
                    times: SHOT_FAILURE_FLASHES,
                }],
            ),
            _ => return None,
        };
        Some(transition)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine, raised by button presses, background tasks and the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    PaymentRequested,
    PaymentBypassed,
    StatusCheckDue,
    PaymentApproved,
    PaymentDeclined,
    ShotsArmed,
    ShutterPressed,
    CountdownElapsed,
    PhotoSaved,
    CaptureFailed,
    NextShot,
    AllShotsTaken,
    PrintSucceeded,
    PrintFailed,
    Reset,
}

/// A side effect the orchestrator performs, in order, right after entering a state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    SetColor(Button, Color),
    SetPulseColor(Button, Color),
    StartPulse(Button),
    StopPulse(Button),
    Flash {
        button: Button,
        color: Color,
        times: u32,
    },
    PlayChime,
    /// Short pause between two shots.
    Settle,
    /// Kill whatever desktop helper grabbed the camera.
    ReleaseCamera,
    PurgePhotos,
    ResetPhotoCount,
    /// Drop the transaction and start a new session epoch.
    ClearSession,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: State,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn new(next: State, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}
