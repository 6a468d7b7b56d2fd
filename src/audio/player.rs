use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::{
    queue::{BatchOutcome, LoopMode, QueueFull, QueueSnapshot},
    track::Track,
    transport::TransportError,
};
use crate::sources::ResolutionError;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    QueueFull(#[from] QueueFull),
    #[error("no hay nada reproduciéndose")]
    NothingPlaying,
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("ninguna canción se pudo reproducir tras {attempts} intentos seguidos")]
    SessionUnplayable { attempts: usize },
    #[error("el reproductor ya no existe")]
    PlayerGone,
}

/// Parámetros de cada reproductor, derivados de la configuración.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub max_queue_size: usize,
    pub inactivity_timeout: Duration,
    pub max_consecutive_failures: usize,
    pub default_volume: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            inactivity_timeout: Duration::from_secs(300),
            max_consecutive_failures: 5,
            default_volume: 0.5,
        }
    }
}

/// Resultado de intentar arrancar un ciclo de reproducción.
#[derive(Debug)]
pub enum StartOutcome {
    AlreadyPlaying,
    Started {
        track: Track,
        /// Canciones saltadas por fallos antes de lograr reproducir esta.
        failed_attempts: usize,
    },
    /// No quedó nada que reproducir; el temporizador de inactividad quedó armado.
    Idle { failed_attempts: usize },
}

impl StartOutcome {
    pub fn started_track(&self) -> Option<&Track> {
        match self {
            StartOutcome::Started { track, .. } => Some(track),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct EnqueueOutcome {
    pub batch: BatchOutcome,
    /// Qué pasó con la reproducción después de encolar.
    pub playback: Result<StartOutcome, PlayerError>,
}

#[derive(Debug)]
pub struct SkipOutcome {
    pub skipped: Track,
    pub next: Option<Track>,
}

type Reply<T> = oneshot::Sender<T>;

/// Mensajes del buzón de un reproductor. Todo cambio de estado entra por aquí,
/// incluido el aviso de fin de canción que llega desde el transporte.
#[derive(Debug)]
pub(crate) enum PlayerMessage {
    Connect {
        channel: ChannelId,
        reply: Reply<Result<(), PlayerError>>,
    },
    Enqueue {
        tracks: Vec<Track>,
        reply: Reply<Result<EnqueueOutcome, PlayerError>>,
    },
    Skip {
        reply: Reply<Result<SkipOutcome, PlayerError>>,
    },
    Stop {
        reply: Reply<()>,
    },
    SetLoopMode {
        mode: LoopMode,
        reply: Reply<()>,
    },
    Shuffle {
        reply: Reply<usize>,
    },
    Clear {
        reply: Reply<usize>,
    },
    Remove {
        index: usize,
        reply: Reply<Option<Track>>,
    },
    SetVolume {
        volume: f32,
        reply: Reply<Result<f32, PlayerError>>,
    },
    Snapshot {
        reply: Reply<QueueSnapshot>,
    },
    NowPlaying {
        reply: Reply<Option<Track>>,
    },
    IsConnected {
        reply: Reply<bool>,
    },
    ParticipantJoined {
        channel: ChannelId,
    },
    TrackEnded {
        cycle: u64,
    },
}

/// Handle del lado de los comandos hacia el reproductor de un guild.
///
/// Es barato de clonar. Si el reproductor ya fue destruido, todas las
/// operaciones devuelven [`PlayerError::PlayerGone`].
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    guild_id: GuildId,
    mailbox: mpsc::UnboundedSender<PlayerMessage>,
}

impl PlayerHandle {
    pub(crate) fn new(guild_id: GuildId, mailbox: mpsc::UnboundedSender<PlayerMessage>) -> Self {
        Self { guild_id, mailbox }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_alive(&self) -> bool {
        !self.mailbox.is_closed()
    }

    pub fn same_player(&self, other: &PlayerHandle) -> bool {
        self.mailbox.same_channel(&other.mailbox)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> PlayerMessage,
    ) -> Result<T, PlayerError> {
        let (tx, rx) = oneshot::channel();
        self.mailbox
            .send(build(tx))
            .map_err(|_| PlayerError::PlayerGone)?;
        rx.await.map_err(|_| PlayerError::PlayerGone)
    }

    /// Conecta (o mueve) la conexión de voz al canal indicado.
    pub async fn connect(&self, channel: ChannelId) -> Result<(), PlayerError> {
        self.request(|reply| PlayerMessage::Connect { channel, reply })
            .await?
    }

    /// Encola canciones y arranca la reproducción si estaba inactivo.
    ///
    /// Falla con `QueueFull` solo si no cupo ninguna; si cupieron algunas, las
    /// rechazadas se informan en `batch.rejected`.
    pub async fn enqueue(&self, tracks: Vec<Track>) -> Result<EnqueueOutcome, PlayerError> {
        self.request(|reply| PlayerMessage::Enqueue { tracks, reply })
            .await?
    }

    pub async fn skip(&self) -> Result<SkipOutcome, PlayerError> {
        self.request(|reply| PlayerMessage::Skip { reply }).await?
    }

    /// Detiene, limpia la cola y desconecta. El reproductor termina después.
    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.request(|reply| PlayerMessage::Stop { reply }).await
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<(), PlayerError> {
        self.request(|reply| PlayerMessage::SetLoopMode { mode, reply })
            .await
    }

    pub async fn shuffle(&self) -> Result<usize, PlayerError> {
        self.request(|reply| PlayerMessage::Shuffle { reply }).await
    }

    pub async fn clear(&self) -> Result<usize, PlayerError> {
        self.request(|reply| PlayerMessage::Clear { reply }).await
    }

    /// Elimina la canción en `index` (0-based) de la cola.
    pub async fn remove(&self, index: usize) -> Result<Option<Track>, PlayerError> {
        self.request(|reply| PlayerMessage::Remove { index, reply })
            .await
    }

    /// Ajusta el volumen (se limita a `0.0..=2.0`). Devuelve el valor aplicado.
    pub async fn set_volume(&self, volume: f32) -> Result<f32, PlayerError> {
        self.request(|reply| PlayerMessage::SetVolume { volume, reply })
            .await?
    }

    pub async fn queue_snapshot(&self) -> Result<QueueSnapshot, PlayerError> {
        self.request(|reply| PlayerMessage::Snapshot { reply }).await
    }

    pub async fn now_playing(&self) -> Result<Option<Track>, PlayerError> {
        self.request(|reply| PlayerMessage::NowPlaying { reply })
            .await
    }

    /// Si el transporte del reproductor sigue en un canal de voz.
    pub async fn is_connected(&self) -> Result<bool, PlayerError> {
        self.request(|reply| PlayerMessage::IsConnected { reply })
            .await
    }

    /// Alguien entró a un canal de voz del guild; si es el del bot, reinicia
    /// la cuenta atrás de inactividad.
    pub fn participant_joined(&self, channel: ChannelId) -> Result<(), PlayerError> {
        self.mailbox
            .send(PlayerMessage::ParticipantJoined { channel })
            .map_err(|_| PlayerError::PlayerGone)
    }
}
