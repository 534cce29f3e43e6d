//! Adapters behind the domain ports: real hardware and services, plus in-memory stand-ins.

pub mod aplay;
pub mod command;
pub mod cups;
pub mod gphoto;
pub mod imagemagick;
pub mod in_memory;
pub mod leds;
pub mod sumup;
