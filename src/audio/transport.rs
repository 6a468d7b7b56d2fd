use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::{player::PlayerMessage, track::ResolvedStream};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no hay conexión de voz activa")]
    NotConnected,
    #[error("no se pudo conectar al canal de voz: {0}")]
    Join(String),
    #[error("no se pudo iniciar la reproducción: {0}")]
    Play(String),
    #[error("error del transporte de voz: {0}")]
    Control(String),
}

/// Canal de audio hacia Discord (u otro destino) de un solo guild.
///
/// El driver es el único dueño; ninguna implementación debe tocar el estado
/// del reproductor. `play` recibe un [`TrackEndNotifier`] que la
/// implementación debe disparar cuando la canción termine o falle, desde el
/// contexto que sea.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&mut self, channel: ChannelId) -> Result<(), TransportError>;

    async fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;

    async fn is_connected(&self) -> bool;

    async fn current_channel(&self) -> Option<ChannelId>;

    async fn is_playing(&self) -> bool;

    async fn play(
        &mut self,
        stream: ResolvedStream,
        volume: f32,
        on_finished: TrackEndNotifier,
    ) -> Result<(), TransportError>;

    async fn stop(&mut self);

    async fn set_volume(&mut self, volume: f32) -> Result<(), TransportError>;
}

/// Crea un transporte por guild para el registro de reproductores.
pub trait TransportFactory: Send + Sync {
    fn create(&self, guild_id: GuildId) -> Box<dyn VoiceTransport>;
}

/// Aviso de "canción terminada" de un ciclo concreto.
///
/// Solo encola un mensaje en el buzón del reproductor; el cambio de estado
/// ocurre después, dentro de la tarea del driver.
#[derive(Debug, Clone)]
pub struct TrackEndNotifier {
    guild_id: GuildId,
    cycle: u64,
    mailbox: mpsc::UnboundedSender<PlayerMessage>,
}

impl TrackEndNotifier {
    pub(crate) fn new(
        guild_id: GuildId,
        cycle: u64,
        mailbox: mpsc::UnboundedSender<PlayerMessage>,
    ) -> Self {
        Self {
            guild_id,
            cycle,
            mailbox,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn notify(&self) {
        let message = PlayerMessage::TrackEnded { cycle: self.cycle };
        if self.mailbox.send(message).is_err() {
            debug!(
                "Reproductor de guild {} ya no existe, fin de ciclo {} descartado",
                self.guild_id, self.cycle
            );
        }
    }
}
