//! Application layer: the session orchestrator and the concurrent machinery around it.
//!
//! The orchestrator owns the session and drives the devices through the ports defined in the
//! domain layer. Long-running protocols (payment polling, print job monitoring) and the
//! background loops (button pulses, the inactivity watchdog) live in their own modules.

pub mod illumination;
pub mod orchestrator;
pub mod payment_poll;
pub mod print_monitor;
pub mod watchdog;
