//! Domain layer: the session record, the state machine's transition table and the ports
//! through which the kiosk reaches its hardware and remote services.

pub mod color;
pub mod input;
pub mod payment;
pub mod ports;
pub mod print;
pub mod session;
pub mod state;
