use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    audio::{
        player::{EnqueueOutcome, PlayerError, StartOutcome},
        queue::{LoopMode, QueuePage, QueueSnapshot},
        track::{Requester, Track, TrackInfo},
    },
    bot::OpenVoiceBot,
};

const QUEUE_PAGE_SIZE: usize = 10;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenVoiceBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    if let Some(music_channel) = bot.config.music_channel_id {
        if command.channel_id.get() != music_channel {
            return respond(
                ctx,
                &command,
                format!("🎵 Usa los comandos de música en <#{}>", music_channel),
                true,
            )
            .await;
        }
    }

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        _ => respond(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Verificar que el usuario esté en un canal de voz
    let Some(voice_channel) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, "❌ Debes estar en un canal de voz", true).await;
    };

    // Defer la respuesta ya que la búsqueda puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let player = bot.registry.get_or_create(guild_id);
    if let Err(e) = player.connect(voice_channel).await {
        warn!("No se pudo conectar en guild {}: {}", guild_id, e);
        bot.registry.remove(guild_id).await;
        return edit(ctx, command, format!("❌ No pude unirme al canal de voz: {}", e)).await;
    }

    let results = match bot.resolver.search(&query).await {
        Ok(results) => results,
        Err(e) => {
            warn!("Búsqueda fallida para '{}': {}", query, e);
            Vec::new()
        }
    };
    if results.is_empty() {
        return edit(ctx, command, "❌ No se encontraron resultados").await;
    }

    let requester = Requester::new(command.user.id, command.user.display_name());
    let tracks = attach_requester(results, &requester);

    let content = match player.enqueue(tracks).await {
        Ok(outcome) => describe_enqueue(&outcome),
        Err(e) => format!("❌ {}", e),
    };
    edit(ctx, command, content).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let content = match bot.registry.get(guild_id) {
        Some(player) => match player.skip().await {
            Ok(skip) => match skip.next {
                Some(next) => format!("⏭️ Saltada: **{}**\n▶️ Ahora: **{}**", skip.skipped.title, next.title),
                None => format!("⏭️ Saltada: **{}**", skip.skipped.title),
            },
            Err(PlayerError::NothingPlaying) => "❌ No hay nada reproduciéndose".to_string(),
            Err(e) => format!("❌ {}", e),
        },
        None => "❌ No hay nada reproduciéndose".to_string(),
    };

    respond(ctx, command, content, false).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let content = if bot.registry.stop(guild_id).await {
        "⏹️ Reproducción detenida y cola limpiada"
    } else {
        "❌ No estoy en ningún canal de voz"
    };

    respond(ctx, command, content, false).await
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let mode = match string_option(command, "mode").unwrap_or("off").parse::<LoopMode>() {
        Ok(mode) => mode,
        Err(e) => return respond(ctx, command, format!("❌ {}", e), true).await,
    };

    let Some(player) = bot.registry.get(guild_id) else {
        return respond(ctx, command, "❌ No hay reproductor activo", true).await;
    };
    player.set_loop_mode(mode).await?;

    let message = match mode {
        LoopMode::Current => "🔂 Repetir canción activado",
        LoopMode::Queue => "🔁 Repetir cola activado",
        LoopMode::Off => "➡️ Repetición desactivada",
    };
    respond(ctx, command, message, false).await
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let shuffled = match bot.registry.get(guild_id) {
        Some(player) => player.shuffle().await?,
        None => 0,
    };

    let content = if shuffled == 0 {
        "❌ Se necesitan al menos 2 canciones en la cola".to_string()
    } else {
        format!("🔀 Cola mezclada ({} canciones)", shuffled)
    };
    respond(ctx, command, content, false).await
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let removed = match bot.registry.get(guild_id) {
        Some(player) => player.clear().await?,
        None => 0,
    };

    respond(
        ctx,
        command,
        format!("🗑️ Cola limpiada: {} canciones eliminadas", removed),
        false,
    )
    .await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = int_option(command, "page").unwrap_or(1).max(1) as usize;

    let content = match bot.registry.get(guild_id) {
        Some(player) => describe_queue(&player.queue_snapshot().await?, page),
        None => "📭 La cola está vacía".to_string(),
    };
    respond(ctx, command, content, false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let current = match bot.registry.get(guild_id) {
        Some(player) => player.now_playing().await?,
        None => None,
    };

    let content = match current {
        Some(track) => format!("🎵 Reproduciendo: {}", describe_track(&track)),
        None => "❌ No hay nada reproduciéndose".to_string(),
    };
    respond(ctx, command, content, false).await
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let position = int_option(command, "position").unwrap_or(0);
    if position < 1 {
        return respond(ctx, command, "❌ Posición inválida", true).await;
    }

    let removed = match bot.registry.get(guild_id) {
        Some(player) => player.remove(position as usize - 1).await?,
        None => None,
    };

    match removed {
        Some(track) => {
            respond(ctx, command, format!("❌ Eliminada: **{}**", track.title), false).await
        }
        None => respond(ctx, command, "❌ No hay ninguna canción en esa posición", true).await,
    }
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenVoiceBot,
    guild_id: GuildId,
) -> Result<()> {
    let level = int_option(command, "level").unwrap_or(100);

    let Some(player) = bot.registry.get(guild_id) else {
        return respond(ctx, command, "❌ No hay reproductor activo", true).await;
    };

    let content = match player.set_volume(level as f32 / 100.0).await {
        Ok(applied) => format!("🔊 Volumen ajustado a {}%", (applied * 100.0).round() as u32),
        Err(e) => format!("❌ {}", e),
    };
    respond(ctx, command, content, false).await
}

// Funciones auxiliares

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn attach_requester(results: Vec<TrackInfo>, requester: &Requester) -> Vec<Track> {
    results
        .into_iter()
        .map(|track| Arc::new(track.with_requester(requester.clone())))
        .collect()
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn describe_track(track: &TrackInfo) -> String {
    let mut line = format!("**{}**", track.title);
    if let Some(duration) = track.duration {
        line.push_str(&format!(" `{}`", format_duration(duration)));
    }
    if let Some(requester) = &track.requester {
        line.push_str(&format!(" · pedida por {}", requester.display_name));
    }
    line
}

fn describe_enqueue(outcome: &EnqueueOutcome) -> String {
    let mut lines = Vec::new();

    match &outcome.playback {
        Ok(StartOutcome::Started {
            track,
            failed_attempts,
        }) => {
            if *failed_attempts > 0 {
                lines.push(format!("⚠️ {} canciones no se pudieron reproducir", failed_attempts));
            }
            lines.push(format!("🎵 Reproduciendo: {}", describe_track(track)));
        }
        Ok(StartOutcome::AlreadyPlaying) => match outcome.batch.first_position {
            Some(position) if outcome.batch.added == 1 => {
                lines.push(format!("➕ Agregada a la cola en la posición {}", position))
            }
            _ => {}
        },
        Ok(StartOutcome::Idle { failed_attempts }) => lines.push(format!(
            "❌ Ninguna canción se pudo reproducir ({} fallos)",
            failed_attempts
        )),
        Err(e) => lines.push(format!("❌ {}", e)),
    }

    if outcome.batch.added > 1 {
        lines.push(format!("📋 {} canciones agregadas a la cola", outcome.batch.added));
    }
    if outcome.batch.rejected > 0 {
        lines.push(format!(
            "⚠️ {} canciones no cupieron: la cola está llena",
            outcome.batch.rejected
        ));
    }

    lines.join("\n")
}

fn describe_queue(snapshot: &QueueSnapshot, page: usize) -> String {
    let mut lines = Vec::new();

    if let Some(current) = &snapshot.current {
        lines.push(format!("🎵 Ahora: {}", describe_track(current)));
    }

    if snapshot.items.is_empty() {
        lines.push("📭 La cola está vacía".to_string());
        return lines.join("\n");
    }

    let QueuePage {
        items,
        current_page,
        total_pages,
        total_items,
    } = snapshot.page(page, QUEUE_PAGE_SIZE);

    for (position, track) in items {
        lines.push(format!("`{}.` {}", position, describe_track(&track)));
    }
    lines.push(format!(
        "Página {}/{} · {} canciones · {} · repetición: {}",
        current_page,
        total_pages,
        total_items,
        format_duration(snapshot.total_duration),
        snapshot.loop_mode
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::BatchOutcome;
    use pretty_assertions::assert_eq;

    fn track(title: &str, secs: u64) -> Track {
        Arc::new(
            TrackInfo::new(title, format!("https://example.com/{}", title))
                .with_duration(Duration::from_secs(secs)),
        )
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(212)), "3:32");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_describe_enqueue_playlist_with_rejections() {
        let outcome = EnqueueOutcome {
            batch: BatchOutcome {
                added: 3,
                rejected: 2,
                first_position: Some(1),
            },
            playback: Ok(StartOutcome::Started {
                track: track("A", 60),
                failed_attempts: 1,
            }),
        };

        assert_eq!(
            describe_enqueue(&outcome),
            "⚠️ 1 canciones no se pudieron reproducir\n\
             🎵 Reproduciendo: **A** `1:00`\n\
             📋 3 canciones agregadas a la cola\n\
             ⚠️ 2 canciones no cupieron: la cola está llena"
        );
    }

    #[test]
    fn test_describe_enqueue_single_while_playing() {
        let outcome = EnqueueOutcome {
            batch: BatchOutcome {
                added: 1,
                rejected: 0,
                first_position: Some(4),
            },
            playback: Ok(StartOutcome::AlreadyPlaying),
        };

        assert_eq!(
            describe_enqueue(&outcome),
            "➕ Agregada a la cola en la posición 4"
        );
    }

    #[test]
    fn test_attach_requester() {
        let requester = Requester::new(UserId::new(5), "ana");
        let tracks = attach_requester(
            vec![TrackInfo::new("A", "https://example.com/A")],
            &requester,
        );

        assert_eq!(
            tracks[0].requester.as_ref().map(|r| r.display_name.as_str()),
            Some("ana")
        );
    }

    #[test]
    fn test_describe_queue_pages() {
        let snapshot = QueueSnapshot {
            current: Some(track("now", 30)),
            items: (1..=12).map(|i| track(&format!("t{}", i), 10)).collect(),
            loop_mode: LoopMode::Queue,
            total_duration: Duration::from_secs(150),
        };

        let text = describe_queue(&snapshot, 2);
        assert!(text.starts_with("🎵 Ahora: **now**"));
        assert!(text.contains("`11.` **t11**"));
        assert!(!text.contains("`10.`"));
        assert!(text.ends_with("Página 2/2 · 12 canciones · 2:30 · repetición: queue"));
    }
}
