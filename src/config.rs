use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::audio::player::PlayerSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    #[serde(skip_serializing)]
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo
    pub music_channel_id: Option<u64>,

    // Reproducción
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub inactivity_timeout: Duration,
    pub max_consecutive_failures: usize,

    // yt-dlp
    pub ytdlp_path: String,
    pub resolver_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),
            music_channel_id: std::env::var("MUSIC_CHANNEL_ID")
                .ok()
                .and_then(|s| s.parse().ok()),

            // Reproducción
            default_volume: env_or("DEFAULT_VOLUME", 0.5)?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", 100)?,
            max_playlist_size: env_or("MAX_PLAYLIST_SIZE", 150)?,
            inactivity_timeout: env_duration_or("INACTIVITY_TIMEOUT", Duration::from_secs(300))?,
            max_consecutive_failures: env_or("MAX_CONSECUTIVE_FAILURES", 5)?,

            // yt-dlp
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            resolver_timeout: env_duration_or("RESOLVER_TIMEOUT", Duration::from_secs(30))?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue, playlist and failure limits must be greater than 0
    /// - Timeouts must be non-zero
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.max_consecutive_failures == 0 {
            anyhow::bail!("Max consecutive failures must be greater than 0");
        }

        if self.inactivity_timeout.is_zero() {
            anyhow::bail!("Inactivity timeout must be greater than 0");
        }

        if self.resolver_timeout.is_zero() {
            anyhow::bail!("Resolver timeout must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {} / canal de música {}\n  \
            Audio: {}% vol, cola {}, playlists {}\n  \
            Inactividad: {}, fallos seguidos: {}\n  \
            yt-dlp: {} (timeout {})",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.music_channel_id
                .map_or("cualquiera".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.max_playlist_size,
            humantime::format_duration(self.inactivity_timeout),
            self.max_consecutive_failures,
            self.ytdlp_path,
            humantime::format_duration(self.resolver_timeout),
        )
    }

    /// Parámetros que recibe cada reproductor.
    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            max_queue_size: self.max_queue_size,
            inactivity_timeout: self.inactivity_timeout,
            max_consecutive_failures: self.max_consecutive_failures,
            default_volume: self.default_volume,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,
            music_channel_id: None,

            default_volume: 0.5,
            max_queue_size: 100,
            max_playlist_size: 150,
            inactivity_timeout: Duration::from_secs(300),
            max_consecutive_failures: 5,

            ytdlp_path: "yt-dlp".to_string(),
            resolver_timeout: Duration::from_secs(30),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: {}", key, value)),
        _ => Ok(default),
    }
}

fn env_duration_or(key: &str, default: Duration) -> Result<Duration> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            parse_duration(&value).with_context(|| format!("{} inválido: {}", key, value))
        }
        _ => Ok(default),
    }
}

/// Acepta segundos sueltos (`300`) o el formato de humantime (`5m`, `1h 30s`).
fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    Ok(humantime::parse_duration(value)?)
}
