//! Edges of the process: where button presses come in and where metrics go out.

pub mod buttons;
pub mod metrics_http;
