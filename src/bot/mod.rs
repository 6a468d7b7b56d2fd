//! # Bot Module
//!
//! Discord glue for the playback engine.
//!
//! [`OpenVoiceBot`] implements Serenity's [`EventHandler`]: it registers the
//! slash commands, turns each command into a [`PlayerHandle`] request and maps
//! voice state changes onto the [`PlayerRegistry`]:
//!
//! - **Bot disconnected** (kicked or moved out by a moderator): the guild's
//!   player is removed without touching the voice connection again, unless a
//!   newer connection already replaced the one that left.
//! - **User joins the bot's channel**: the idle countdown restarts.
//!
//! The engine never formats user-facing text; [`handlers`] does.
//!
//! [`PlayerHandle`]: crate::audio::player::PlayerHandle

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::registry::PlayerRegistry, config::Config, sources::TrackResolver};

pub struct OpenVoiceBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Live players, one per guild
    registry: PlayerRegistry,
    /// Search side of the resolver; stream resolution happens inside the players
    resolver: Arc<dyn TrackResolver>,
}

impl OpenVoiceBot {
    pub fn new(config: Config, registry: PlayerRegistry, resolver: Arc<dyn TrackResolver>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            resolver,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate in about a second;
    /// global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenVoiceBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        // El bot fue desconectado desde fuera
        if new.user_id == ctx.cache.current_user().id {
            if old.is_some()
                && new.channel_id.is_none()
                && self.registry.remove_if_disconnected(guild_id).await
            {
                info!("🔌 Bot desconectado en guild {}", guild_id);
            }
            return;
        }

        let Some(joined) = new.channel_id else {
            return;
        };
        if old.and_then(|state| state.channel_id) == Some(joined) {
            return;
        }

        if let Some(player) = self.registry.get(guild_id) {
            if player.participant_joined(joined).is_err() {
                debug!("El reproductor de guild {} ya terminó", guild_id);
            }
        }
    }
}
