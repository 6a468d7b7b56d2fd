use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    driver::{self, ExitReason},
    player::{PlayerHandle, PlayerSettings},
    transport::TransportFactory,
};
use crate::sources::TrackResolver;

/// Dueño único de los reproductores vivos, uno por guild.
///
/// Se construye explícitamente en `main` y se pasa al handler del bot.
/// Quitar un reproductor cancela su tarea, y con ella su temporizador de
/// inactividad, antes de devolver el control.
#[derive(Clone)]
pub struct PlayerRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    players: DashMap<GuildId, PlayerEntry>,
    settings: PlayerSettings,
    resolver: Arc<dyn TrackResolver>,
    transports: Arc<dyn TransportFactory>,
    next_generation: AtomicU64,
}

struct PlayerEntry {
    handle: PlayerHandle,
    cancel: CancellationToken,
    task: JoinHandle<ExitReason>,
    generation: u64,
}

impl PlayerRegistry {
    pub fn new(
        settings: PlayerSettings,
        resolver: Arc<dyn TrackResolver>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                players: DashMap::new(),
                settings,
                resolver,
                transports,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Devuelve el reproductor del guild, creándolo si no existe o si el
    /// anterior ya terminó.
    pub fn get_or_create(&self, guild_id: GuildId) -> PlayerHandle {
        match self.inner.players.entry(guild_id) {
            Entry::Occupied(entry) if entry.get().handle.is_alive() => entry.get().handle.clone(),
            Entry::Occupied(mut entry) => {
                debug!("Reemplazando reproductor terminado de guild {}", guild_id);
                let player = self.spawn_player(guild_id);
                let handle = player.handle.clone();
                entry.insert(player);
                handle
            }
            Entry::Vacant(entry) => {
                let player = self.spawn_player(guild_id);
                let handle = player.handle.clone();
                entry.insert(player);
                handle
            }
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<PlayerHandle> {
        self.inner
            .players
            .get(&guild_id)
            .map(|entry| entry.handle.clone())
            .filter(PlayerHandle::is_alive)
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.inner.players.contains_key(&guild_id)
    }

    /// Destruye el reproductor sin tocar la conexión de voz. No hace nada si
    /// no existe.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, entry)) = self.inner.players.remove(&guild_id) else {
            return false;
        };

        Self::cancel_entry(guild_id, entry).await;
        true
    }

    /// Como [`remove`](Self::remove), pero solo si el transporte del
    /// reproductor ya no está en un canal de voz.
    ///
    /// Para el aviso de Discord de que el bot salió del canal: ese aviso puede
    /// llegar tarde, cuando otro `/play` ya creó y conectó un reproductor nuevo.
    pub async fn remove_if_disconnected(&self, guild_id: GuildId) -> bool {
        let Some((handle, generation)) = self
            .inner
            .players
            .get(&guild_id)
            .map(|entry| (entry.handle.clone(), entry.generation))
        else {
            return false;
        };

        if let Ok(true) = handle.is_connected().await {
            debug!("Guild {} sigue conectado, aviso de salida ignorado", guild_id);
            return false;
        }

        let Some((_, entry)) = self
            .inner
            .players
            .remove_if(&guild_id, |_, entry| entry.generation == generation)
        else {
            return false;
        };

        Self::cancel_entry(guild_id, entry).await;
        true
    }

    /// Detiene la reproducción, desconecta y destruye el reproductor.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        let Some((_, entry)) = self.inner.players.remove(&guild_id) else {
            return false;
        };

        if entry.handle.stop().await.is_err() {
            debug!("El reproductor de guild {} ya había terminado", guild_id);
        }
        if let Err(e) = entry.task.await {
            warn!("La tarea del reproductor de guild {} falló: {}", guild_id, e);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.inner.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.players.is_empty()
    }

    /// Detiene todos los reproductores (apagado del bot).
    pub async fn shutdown_all(&self) {
        let guilds: Vec<GuildId> = self.inner.players.iter().map(|e| *e.key()).collect();
        if guilds.is_empty() {
            return;
        }

        info!("🛑 Deteniendo {} reproductores", guilds.len());
        join_all(guilds.into_iter().map(|guild_id| self.stop(guild_id))).await;
    }

    fn spawn_player(&self, guild_id: GuildId) -> PlayerEntry {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let (handle, driver_task) = driver::spawn(
            guild_id,
            self.inner.settings.clone(),
            self.inner.resolver.clone(),
            self.inner.transports.create(guild_id),
            cancel.clone(),
        );

        // Cuando el driver termina por su cuenta (stop o inactividad) se saca
        // del mapa, pero solo si la entrada sigue siendo la suya.
        let registry = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let reason = match driver_task.await {
                Ok(reason) => reason,
                Err(e) => {
                    warn!("El driver de guild {} terminó con error: {}", guild_id, e);
                    ExitReason::Removed
                }
            };
            if reason != ExitReason::Removed {
                Self::forget(&registry, guild_id, generation);
            }
            reason
        });

        info!("🎛️ Reproductor creado para guild {}", guild_id);
        PlayerEntry {
            handle,
            cancel,
            task,
            generation,
        }
    }

    async fn cancel_entry(guild_id: GuildId, entry: PlayerEntry) {
        entry.cancel.cancel();
        match entry.task.await {
            Ok(reason) => debug!("Reproductor de guild {} quitado ({:?})", guild_id, reason),
            Err(e) => warn!("La tarea del reproductor de guild {} falló: {}", guild_id, e),
        }
        info!("🗑️ Reproductor eliminado para guild {}", guild_id);
    }

    fn forget(registry: &Weak<RegistryInner>, guild_id: GuildId, generation: u64) {
        let Some(inner) = registry.upgrade() else {
            return;
        };
        if inner
            .players
            .remove_if(&guild_id, |_, entry| entry.generation == generation)
            .is_some()
        {
            debug!("Reproductor de guild {} se retiró del registro", guild_id);
        }
    }
}
