//! # Audio Module
//!
//! Per-guild playback engine.
//!
//! ## Architecture
//!
//! Each guild gets one player task, created and destroyed only by the
//! [`registry`]. The task owns every piece of mutable state for its guild,
//! so nothing in here needs a lock:
//!
//! ### [`queue`] - Queue Management
//! - Bounded FIFO queue, current track and loop mode
//! - `next_track` picks the track of the next playback cycle
//!
//! ### [`driver`] - Playback Driver
//! - Resolves a fresh stream right before each cycle
//! - Skips unplayable tracks, up to a bounded number in a row
//! - Owns the [`idle`] timer that disconnects an abandoned channel
//!
//! ### [`player`] - Command Handle
//! - Request/response API over the player's mailbox
//!
//! ### [`transport`] - Voice Transport
//! - Seam between the driver and songbird ([`songbird_transport`])
//! - Track end events come back as mailbox messages, tagged with their cycle
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_voice::audio::{player::PlayerSettings, registry::PlayerRegistry};
//! # use std::sync::Arc;
//! # use serenity::all::{ChannelId, GuildId};
//! # async fn example(
//! #     resolver: Arc<dyn open_voice::sources::TrackResolver>,
//! #     transports: Arc<dyn open_voice::audio::transport::TransportFactory>,
//! #     track: open_voice::audio::track::Track,
//! # ) -> anyhow::Result<()> {
//! let registry = PlayerRegistry::new(PlayerSettings::default(), resolver, transports);
//!
//! let player = registry.get_or_create(GuildId::new(123456789));
//! player.connect(ChannelId::new(987654321)).await?;
//! player.enqueue(vec![track]).await?;
//! player.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod idle;
pub mod player;
pub mod queue;
pub mod registry;
pub mod songbird_transport;
pub mod track;
pub mod transport;

#[cfg(test)]
mod testing;
