//! signal_cast — author radio-style broadcasts and listen in sync.
//!
//! Authors arrange external clips and synthesized speech on a timeline and
//! take it live; every listener derives the same position from the wall
//! clock. The CLI consumes this crate.

pub mod broadcast;
pub mod clip_source;
pub mod config;
pub mod error;
pub mod fade;
pub mod player;
pub mod radio_fx;
pub mod scheduler;
pub mod session;
pub mod session_runtime;
pub mod station;
pub mod synth;
pub mod timeline;
pub mod wav;

pub use error::{Error, Result};
