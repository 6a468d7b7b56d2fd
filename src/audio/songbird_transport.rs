//! Voice transport backed by songbird.
//!
//! Track end and track error events are relayed to the player through a
//! [`TrackEndNotifier`]; nothing here touches player state.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    track::ResolvedStream,
    transport::{TrackEndNotifier, TransportError, TransportFactory, VoiceTransport},
};

pub struct SongbirdTransport {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current: Option<TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(guild_id: GuildId, manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self {
            guild_id,
            manager,
            http,
            current: None,
        }
    }

    fn call(&self) -> Option<Arc<Mutex<Call>>> {
        self.manager.get(self.guild_id)
    }

    async fn join(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        let call = self
            .manager
            .join(self.guild_id, channel)
            .await
            .map_err(|e| TransportError::Join(e.to_string()))?;

        // El bot no necesita escuchar el canal
        if let Err(e) = call.lock().await.deafen(true).await {
            warn!("No se pudo ensordecer al bot en guild {}: {:?}", self.guild_id, e);
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        self.join(channel).await?;
        info!("🔊 Conectado al canal de voz {} en guild {}", channel, self.guild_id);
        Ok(())
    }

    async fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        // songbird mueve la llamada existente al volver a unirse
        self.join(channel).await?;
        info!("🔀 Movido al canal de voz {} en guild {}", channel, self.guild_id);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stop().await;

        match self.manager.remove(self.guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            Err(e) => Err(TransportError::Control(e.to_string())),
        }
    }

    async fn is_connected(&self) -> bool {
        match self.call() {
            Some(call) => call.lock().await.current_channel().is_some(),
            None => false,
        }
    }

    async fn current_channel(&self) -> Option<ChannelId> {
        let call = self.call()?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::from(channel.0))
    }

    async fn is_playing(&self) -> bool {
        let Some(track) = &self.current else {
            return false;
        };
        match track.get_info().await {
            Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn play(
        &mut self,
        stream: ResolvedStream,
        volume: f32,
        on_finished: TrackEndNotifier,
    ) -> Result<(), TransportError> {
        let call = self.call().ok_or(TransportError::NotConnected)?;

        debug!(
            "Stream de ciclo {} resuelto hace {:?} en guild {}",
            on_finished.cycle(),
            stream.age(),
            self.guild_id
        );

        let input = Input::from(HttpRequest::new(self.http.clone(), stream.url));
        let track = call.lock().await.play_only_input(input);

        if let Err(e) = track.set_volume(volume) {
            let _ = track.stop();
            return Err(TransportError::Play(e.to_string()));
        }

        for event in [TrackEvent::End, TrackEvent::Error] {
            let relay = TrackEndRelay {
                guild_id: self.guild_id,
                notifier: on_finished.clone(),
            };
            // Sin relay nadie avisaría el fin de este track
            if let Err(e) = track.add_event(Event::Track(event), relay) {
                let _ = track.stop();
                return Err(TransportError::Play(e.to_string()));
            }
        }

        self.current = Some(track);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(track) = self.current.take() {
            if let Err(e) = track.stop() {
                debug!("El track de guild {} ya estaba detenido: {}", self.guild_id, e);
            }
        }
    }

    async fn set_volume(&mut self, volume: f32) -> Result<(), TransportError> {
        match &self.current {
            Some(track) => track
                .set_volume(volume)
                .map_err(|e| TransportError::Control(e.to_string())),
            None => Ok(()),
        }
    }
}

/// Reenvía el fin (o error) de un track al buzón del reproductor.
struct TrackEndRelay {
    guild_id: GuildId,
    notifier: TrackEndNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackEndRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                if let PlayMode::Errored(e) = &state.playing {
                    error!("❌ Error en track de guild {}: {:?}", self.guild_id, e);
                }
            }
        }

        self.notifier.notify();
        None
    }
}

/// Crea un [`SongbirdTransport`] por guild sobre el mismo gestor de songbird.
pub struct SongbirdTransportFactory {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdTransportFactory {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

impl TransportFactory for SongbirdTransportFactory {
    fn create(&self, guild_id: GuildId) -> Box<dyn VoiceTransport> {
        Box::new(SongbirdTransport::new(
            guild_id,
            self.manager.clone(),
            self.http.clone(),
        ))
    }
}
