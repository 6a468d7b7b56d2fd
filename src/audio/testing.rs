//! Dobles de prueba para el driver y el registro.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::{
    track::{ResolvedStream, Track, TrackInfo},
    transport::{TrackEndNotifier, TransportError, TransportFactory, VoiceTransport},
};
use crate::sources::{MockTrackResolver, ResolutionError, TrackResolver};

pub fn track(title: &str) -> Track {
    Arc::new(TrackInfo::new(title, format!("https://example.com/{}", title)))
}

pub fn channel(id: u64) -> ChannelId {
    ChannelId::new(id)
}

/// Resolver que siempre devuelve `stream://<título>` y cuenta las llamadas.
pub fn resolver_ok(calls: Arc<AtomicUsize>) -> Arc<dyn TrackResolver> {
    resolver_failing_for(&[], calls)
}

/// Como [`resolver_ok`], pero falla para los títulos indicados.
pub fn resolver_failing_for(titles: &[&str], calls: Arc<AtomicUsize>) -> Arc<dyn TrackResolver> {
    let failing: Vec<String> = titles.iter().map(|t| t.to_string()).collect();

    let mut resolver = MockTrackResolver::new();
    resolver.expect_resolve_stream().returning(move |track| {
        calls.fetch_add(1, Ordering::SeqCst);
        if failing.contains(&track.title) {
            Err(ResolutionError::Restricted(format!("{} bloqueada", track.title)))
        } else {
            Ok(ResolvedStream::new(format!("stream://{}", track.title)))
        }
    });
    Arc::new(resolver)
}

#[derive(Debug, Default)]
struct FakeState {
    channel: Option<ChannelId>,
    playing: bool,
    volume: f32,
    played: Vec<String>,
    disconnects: usize,
    notifier: Option<TrackEndNotifier>,
    failing_streams: Vec<String>,
}

/// Transporte en memoria. Los clones comparten estado, así el test conserva
/// uno y el driver se queda con el otro.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    /// Simula el fin natural de la canción en curso.
    pub fn finish(&self) {
        let notifier = {
            let mut state = self.state.lock();
            state.playing = false;
            state.notifier.take()
        };
        if let Some(notifier) = notifier {
            notifier.notify();
        }
    }

    /// Hace fallar `play` para los streams de estos títulos.
    pub fn fail_play_for(&self, titles: &[&str]) {
        self.state.lock().failing_streams = titles
            .iter()
            .map(|title| format!("stream://{}", title))
            .collect();
    }

    /// Simula que Discord cortó la conexión sin pasar por `disconnect`.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock();
        state.channel = None;
        state.playing = false;
    }

    pub fn notifier(&self) -> Option<TrackEndNotifier> {
        self.state.lock().notifier.clone()
    }

    pub fn played(&self) -> Vec<String> {
        self.state.lock().played.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    pub fn is_connected_now(&self) -> bool {
        self.state.lock().channel.is_some()
    }

    pub fn is_playing_now(&self) -> bool {
        self.state.lock().playing
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        self.state.lock().channel = Some(channel);
        Ok(())
    }

    async fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        self.connect(channel).await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.channel.take().is_some() {
            state.disconnects += 1;
        }
        state.playing = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().channel.is_some()
    }

    async fn current_channel(&self) -> Option<ChannelId> {
        self.state.lock().channel
    }

    async fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    async fn play(
        &mut self,
        stream: ResolvedStream,
        volume: f32,
        on_finished: TrackEndNotifier,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.channel.is_none() {
            return Err(TransportError::NotConnected);
        }
        if state.failing_streams.contains(&stream.url) {
            return Err(TransportError::Play(format!("{} no se pudo abrir", stream.url)));
        }
        state.playing = true;
        state.volume = volume;
        state.played.push(stream.url);
        state.notifier = Some(on_finished);
        Ok(())
    }

    async fn stop(&mut self) {
        // Como songbird: detener también dispara el fin de la canción
        self.finish();
    }

    async fn set_volume(&mut self, volume: f32) -> Result<(), TransportError> {
        self.state.lock().volume = volume;
        Ok(())
    }
}

/// Fábrica que entrega siempre el mismo transporte compartido por guild.
#[derive(Debug, Default)]
pub struct FakeFactory {
    transports: Mutex<Vec<(GuildId, FakeTransport)>>,
}

impl FakeFactory {
    pub fn transport(&self, guild_id: GuildId) -> Option<FakeTransport> {
        self.transports
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| *id == guild_id)
            .map(|(_, transport)| transport.clone())
    }

    pub fn created(&self) -> usize {
        self.transports.lock().len()
    }
}

impl TransportFactory for FakeFactory {
    fn create(&self, guild_id: GuildId) -> Box<dyn VoiceTransport> {
        let transport = FakeTransport::default();
        self.transports.lock().push((guild_id, transport.clone()));
        Box::new(transport)
    }
}
