//! morsecast: core library for the live code-broadcast engine.
//!
//! Text is encoded into timed symbols, played as tones through a master
//! volume bus, and scrolled as a visual trace. Both channels loop forever,
//! restart when phrases are added, and stop without leaving timers behind.
//! The CLI consumes this crate.

pub mod app_core;
pub mod audio_channel;
pub mod clock;
pub mod config;
pub mod encoder;
pub mod error;
pub mod output;
pub mod persistence;
pub mod phrase;
pub mod phrase_store;
pub mod player;
pub mod runtime;
pub mod scheduler;
pub mod scroll_channel;
pub mod status;
pub mod test_utils;
