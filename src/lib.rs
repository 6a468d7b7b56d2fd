//! Per-guild music playback engine for Discord.
//!
//! [`audio`] holds the engine (queue, driver, registry, voice transport),
//! [`sources`] the yt-dlp resolver and [`bot`] the serenity glue.

pub mod audio;
pub mod bot;
pub mod config;
pub mod sources;
