//! Playback driver: the per-guild task that owns the queue, the voice
//! transport and the idle timer.
//!
//! Every state change happens inside [`PlayerDriver::run`]. The transport's
//! "finished" callback fires from songbird's event context and only posts a
//! [`PlayerMessage::TrackEnded`] into the mailbox, tagged with the cycle it
//! belongs to; a tag that does not match the current cycle (the track was
//! skipped or stopped meanwhile) is dropped.

use serenity::model::id::{ChannelId, GuildId};
use std::{ops::ControlFlow, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    idle::IdleTimer,
    player::{
        EnqueueOutcome, PlayerError, PlayerHandle, PlayerMessage, PlayerSettings, SkipOutcome,
        StartOutcome,
    },
    queue::{MusicQueue, QueueFull},
    track::Track,
    transport::{TrackEndNotifier, TransportError, VoiceTransport},
};
use crate::sources::TrackResolver;

/// Por qué terminó la tarea de un reproductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Comando stop.
    Stopped,
    /// Venció el temporizador de inactividad.
    IdleTimeout,
    /// El registro lo canceló (desconexión de voz o remove explícito).
    Removed,
}

struct PlayerDriver {
    guild_id: GuildId,
    queue: MusicQueue,
    transport: Box<dyn VoiceTransport>,
    resolver: Arc<dyn TrackResolver>,
    idle: IdleTimer,
    settings: PlayerSettings,
    volume: f32,
    cycle: u64,
    playing: bool,
    mailbox: mpsc::UnboundedSender<PlayerMessage>,
    cancel: CancellationToken,
}

/// Crea el reproductor de un guild y lanza su tarea.
pub fn spawn(
    guild_id: GuildId,
    settings: PlayerSettings,
    resolver: Arc<dyn TrackResolver>,
    transport: Box<dyn VoiceTransport>,
    cancel: CancellationToken,
) -> (PlayerHandle, JoinHandle<ExitReason>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let driver = PlayerDriver {
        guild_id,
        queue: MusicQueue::new(settings.max_queue_size),
        transport,
        resolver,
        idle: IdleTimer::new(settings.inactivity_timeout),
        volume: settings.default_volume,
        settings,
        cycle: 0,
        playing: false,
        mailbox: tx.clone(),
        cancel,
    };

    let task = tokio::spawn(driver.run(rx));
    (PlayerHandle::new(guild_id, tx), task)
}

impl PlayerDriver {
    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<PlayerMessage>) -> ExitReason {
        debug!("Reproductor iniciado para guild {}", self.guild_id);

        let reason = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break ExitReason::Removed,

                message = mailbox.recv() => match message {
                    Some(message) => {
                        if let ControlFlow::Break(reason) = self.handle(message).await {
                            break reason;
                        }
                    }
                    None => break ExitReason::Removed,
                },

                _ = self.idle.expired() => {
                    if self.on_idle_timeout().await {
                        break ExitReason::IdleTimeout;
                    }
                }
            }
        };

        info!("🛑 Reproductor de guild {} terminado: {:?}", self.guild_id, reason);
        reason
    }

    async fn handle(&mut self, message: PlayerMessage) -> ControlFlow<ExitReason> {
        match message {
            PlayerMessage::Connect { channel, reply } => {
                let _ = reply.send(self.connect(channel).await);
            }
            PlayerMessage::Enqueue { tracks, reply } => {
                let _ = reply.send(self.enqueue(tracks).await);
            }
            PlayerMessage::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            PlayerMessage::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
                return ControlFlow::Break(ExitReason::Stopped);
            }
            PlayerMessage::SetLoopMode { mode, reply } => {
                self.queue.set_loop_mode(mode);
                let _ = reply.send(());
            }
            PlayerMessage::Shuffle { reply } => {
                let _ = reply.send(self.queue.shuffle());
            }
            PlayerMessage::Clear { reply } => {
                let _ = reply.send(self.queue.clear());
            }
            PlayerMessage::Remove { index, reply } => {
                let _ = reply.send(self.queue.remove(index));
            }
            PlayerMessage::SetVolume { volume, reply } => {
                let _ = reply.send(self.set_volume(volume).await);
            }
            PlayerMessage::Snapshot { reply } => {
                let _ = reply.send(self.queue.snapshot());
            }
            PlayerMessage::NowPlaying { reply } => {
                let current = if self.playing {
                    self.queue.current().cloned()
                } else {
                    None
                };
                let _ = reply.send(current);
            }
            PlayerMessage::IsConnected { reply } => {
                let _ = reply.send(self.transport.is_connected().await);
            }
            PlayerMessage::ParticipantJoined { channel } => {
                self.on_participant_joined(channel).await;
            }
            PlayerMessage::TrackEnded { cycle } => {
                self.on_track_ended(cycle).await;
            }
        }

        ControlFlow::Continue(())
    }

    async fn connect(&mut self, channel: ChannelId) -> Result<(), PlayerError> {
        match self.transport.current_channel().await {
            Some(current) if current == channel => {}
            Some(_) => {
                info!("🔀 Moviendo a canal {} en guild {}", channel, self.guild_id);
                self.transport.move_to(channel).await?;
            }
            None => {
                info!("🔊 Conectando a canal {} en guild {}", channel, self.guild_id);
                self.transport.connect(channel).await?;
            }
        }

        if !self.playing && self.queue.current().is_none() {
            self.enter_idle();
        }
        Ok(())
    }

    async fn enqueue(&mut self, tracks: Vec<Track>) -> Result<EnqueueOutcome, PlayerError> {
        let batch = self.queue.enqueue_many(tracks);
        if batch.added == 0 && batch.rejected > 0 {
            warn!("Cola llena en guild {}", self.guild_id);
            return Err(QueueFull {
                max: self.queue.max_size(),
            }
            .into());
        }

        let playback = self.start().await;
        Ok(EnqueueOutcome { batch, playback })
    }

    /// Arranca un ciclo con la canción actual o, si no hay, con la siguiente.
    ///
    /// Las canciones que no se pueden resolver o reproducir se saltan, hasta
    /// `max_consecutive_failures` seguidas; al llegar al límite se abandona la
    /// sesión con `SessionUnplayable` en vez de seguir intentando.
    async fn start(&mut self) -> Result<StartOutcome, PlayerError> {
        if self.playing {
            return Ok(StartOutcome::AlreadyPlaying);
        }

        if !self.transport.is_connected().await {
            self.idle.cancel();
            return Err(TransportError::NotConnected.into());
        }

        let mut failures = 0;
        loop {
            let track = match self.queue.current().cloned() {
                Some(track) => track,
                None => match self.queue.next_track() {
                    Some(track) => track,
                    None => {
                        self.enter_idle();
                        return Ok(StartOutcome::Idle {
                            failed_attempts: failures,
                        });
                    }
                },
            };

            match self.begin_cycle(&track).await {
                Ok(()) => {
                    if self.idle.cancel() {
                        debug!("Temporizador de inactividad cancelado en guild {}", self.guild_id);
                    }
                    return Ok(StartOutcome::Started {
                        track,
                        failed_attempts: failures,
                    });
                }
                Err(PlayerError::PlayerGone) => return Err(PlayerError::PlayerGone),
                Err(e) => {
                    failures += 1;
                    warn!(
                        "⏭️ Saltando '{}' en guild {} ({}/{}): {}",
                        track.title,
                        self.guild_id,
                        failures,
                        self.settings.max_consecutive_failures,
                        e
                    );
                    self.queue.skip_current();

                    if failures >= self.settings.max_consecutive_failures {
                        error!(
                            "❌ {} fallos seguidos en guild {}, abandonando la sesión",
                            failures, self.guild_id
                        );
                        self.enter_idle();
                        return Err(PlayerError::SessionUnplayable { attempts: failures });
                    }
                }
            }
        }
    }

    /// Resuelve un stream nuevo para la canción y se lo entrega al transporte.
    async fn begin_cycle(&mut self, track: &Track) -> Result<(), PlayerError> {
        let stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PlayerError::PlayerGone),
            stream = self.resolver.resolve_stream(track) => stream?,
        };

        self.cycle += 1;
        let notifier = TrackEndNotifier::new(self.guild_id, self.cycle, self.mailbox.clone());
        self.transport.play(stream, self.volume, notifier).await?;
        self.playing = true;

        info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, track.title);
        Ok(())
    }

    async fn on_track_ended(&mut self, cycle: u64) {
        if !self.playing || cycle != self.cycle {
            debug!(
                "Fin de ciclo {} ignorado en guild {} (actual {})",
                cycle, self.guild_id, self.cycle
            );
            return;
        }

        self.playing = false;
        self.queue.next_track();

        match self.start().await {
            Ok(StartOutcome::Idle { .. }) => {
                info!("📭 Cola terminada en guild {}", self.guild_id);
            }
            Ok(_) => {}
            Err(e) => error!("Error al reproducir siguiente en guild {}: {}", self.guild_id, e),
        }
    }

    async fn skip(&mut self) -> Result<SkipOutcome, PlayerError> {
        if !self.playing {
            return Err(PlayerError::NothingPlaying);
        }
        let skipped = self
            .queue
            .skip_current()
            .ok_or(PlayerError::NothingPlaying)?;

        // El fin de ciclo que provoque este stop llegará con un ciclo viejo
        self.cycle += 1;
        self.playing = false;
        self.transport.stop().await;
        info!("⏭️ Saltada en guild {}: {}", self.guild_id, skipped.title);

        let next = match self.start().await {
            Ok(outcome) => outcome.started_track().cloned(),
            Err(e) => {
                warn!("No se pudo continuar tras saltar en guild {}: {}", self.guild_id, e);
                None
            }
        };

        Ok(SkipOutcome { skipped, next })
    }

    async fn stop(&mut self) {
        let removed = self.queue.reset();
        self.cycle += 1;
        self.playing = false;
        self.idle.cancel();

        self.transport.stop().await;
        if let Err(e) = self.transport.disconnect().await {
            warn!("Error al desconectar guild {}: {}", self.guild_id, e);
        }
        info!("⏹️ Detenido en guild {} ({} canciones descartadas)", self.guild_id, removed);
    }

    async fn set_volume(&mut self, volume: f32) -> Result<f32, PlayerError> {
        self.volume = volume.clamp(0.0, 2.0);
        if self.playing {
            self.transport.set_volume(self.volume).await?;
        }
        info!("🔊 Volumen en guild {}: {}%", self.guild_id, (self.volume * 100.0) as u32);
        Ok(self.volume)
    }

    async fn on_participant_joined(&mut self, channel: ChannelId) {
        if !self.idle.is_armed() {
            return;
        }
        if self.transport.current_channel().await == Some(channel) {
            debug!(
                "Usuario de vuelta en guild {} (quedaban {:?}), reiniciando inactividad",
                self.guild_id,
                self.idle.remaining()
            );
            self.idle.rearm();
        }
    }

    fn enter_idle(&mut self) {
        self.playing = false;
        if self.idle.arm() {
            info!(
                "⏳ Sin reproducción en guild {}, desconexión en {:?}",
                self.guild_id, self.settings.inactivity_timeout
            );
        }
    }

    /// Devuelve `true` si el reproductor debe terminar.
    async fn on_idle_timeout(&mut self) -> bool {
        if !self.transport.is_connected().await {
            debug!("Inactividad en guild {} sin conexión de voz", self.guild_id);
            return true;
        }

        if self.playing || self.queue.current().is_some() || self.transport.is_playing().await {
            debug!("Inactividad vencida pero hay reproducción en guild {}", self.guild_id);
            return false;
        }

        info!("💤 Desconectando por inactividad en guild {}", self.guild_id);
        if let Err(e) = self.transport.disconnect().await {
            warn!("Error al desconectar por inactividad en guild {}: {}", self.guild_id, e);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::LoopMode,
        testing::{channel, resolver_failing_for, resolver_ok, track, FakeTransport},
    };
    use pretty_assertions::assert_eq;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    const GUILD: GuildId = GuildId::new(1);

    fn settings() -> PlayerSettings {
        PlayerSettings {
            max_queue_size: 10,
            inactivity_timeout: Duration::from_secs(300),
            max_consecutive_failures: 3,
            default_volume: 0.5,
        }
    }

    fn spawn_with(
        resolver: Arc<dyn TrackResolver>,
        transport: &FakeTransport,
    ) -> (PlayerHandle, JoinHandle<ExitReason>, CancellationToken) {
        let cancel = CancellationToken::new();
        let (handle, task) = spawn(
            GUILD,
            settings(),
            resolver,
            Box::new(transport.clone()),
            cancel.clone(),
        );
        (handle, task, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_starts_first_track_with_one_resolution() {
        let resolved = Arc::new(AtomicUsize::new(0));
        let transport = FakeTransport::default();
        let (player, _task, _cancel) = spawn_with(resolver_ok(resolved.clone()), &transport);

        player.connect(channel(10)).await.unwrap();
        let outcome = player
            .enqueue(vec![track("A"), track("B"), track("C")])
            .await
            .unwrap();

        assert_eq!(outcome.batch.added, 3);
        let started = outcome.playback.unwrap();
        assert_eq!(started.started_track().unwrap().title, "A");
        // Solo la canción que va a sonar
        assert_eq!(resolved.load(Ordering::SeqCst), 1);
        assert_eq!(transport.played(), vec!["stream://A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_tracks_play_in_fifo_order_then_idle() {
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        player
            .enqueue(vec![track("A"), track("B"), track("C")])
            .await
            .unwrap();

        for _ in 0..3 {
            transport.finish();
            player.now_playing().await.unwrap();
        }
        assert!(player.now_playing().await.unwrap().is_none());
        assert_eq!(
            transport.played(),
            vec!["stream://A", "stream://B", "stream://C"]
        );
        assert!(transport.is_connected_now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_resolutions_are_skipped_with_bounded_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_failing_for(&["A", "B"], attempts.clone()), &transport);

        player.connect(channel(10)).await.unwrap();
        let outcome = player
            .enqueue(vec![track("A"), track("B"), track("C")])
            .await
            .unwrap();

        match outcome.playback.unwrap() {
            StartOutcome::Started {
                track,
                failed_attempts,
            } => {
                assert_eq!(track.title, "C");
                assert_eq!(failed_attempts, 2);
            }
            other => panic!("se esperaba Started, llegó {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(transport.played(), vec!["stream://C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_playback_start_is_skipped() {
        let resolved = Arc::new(AtomicUsize::new(0));
        let transport = FakeTransport::default();
        transport.fail_play_for(&["A"]);
        let (player, _task, _cancel) = spawn_with(resolver_ok(resolved.clone()), &transport);

        player.connect(channel(10)).await.unwrap();
        let outcome = player.enqueue(vec![track("A"), track("B")]).await.unwrap();

        match outcome.playback.unwrap() {
            StartOutcome::Started {
                track,
                failed_attempts,
            } => {
                assert_eq!(track.title, "B");
                assert_eq!(failed_attempts, 1);
            }
            other => panic!("se esperaba Started, llegó {:?}", other),
        }
        // A se resolvió bien; falló el transporte
        assert_eq!(resolved.load(Ordering::SeqCst), 2);
        assert_eq!(transport.played(), vec!["stream://B"]);
        assert!(player.queue_snapshot().await.unwrap().items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_that_never_starts_is_unplayable() {
        let transport = FakeTransport::default();
        transport.fail_play_for(&["A", "B", "C", "D"]);
        let (player, _task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        let outcome = player
            .enqueue(vec![track("A"), track("B"), track("C"), track("D")])
            .await
            .unwrap();

        assert!(matches!(
            outcome.playback,
            Err(PlayerError::SessionUnplayable { attempts: 3 })
        ));
        assert!(transport.played().is_empty());
        // El límite corta antes de llegar a D
        let snapshot = player.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].title, "D");
        assert!(player.now_playing().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unplayable_queue_gives_up_after_limit() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_failing_for(&["A"], attempts.clone()), &transport);

        player.connect(channel(10)).await.unwrap();
        player.set_loop_mode(LoopMode::Queue).await.unwrap();
        let outcome = player.enqueue(vec![track("A")]).await.unwrap();

        assert!(matches!(
            outcome.playback,
            Err(PlayerError::SessionUnplayable { attempts: 3 })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(transport.played().is_empty());
        // La canción sigue en la cola por el modo Queue
        assert_eq!(player.queue_snapshot().await.unwrap().items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_current_resolves_fresh_stream_each_cycle() {
        let resolved = Arc::new(AtomicUsize::new(0));
        let transport = FakeTransport::default();
        let (player, _task, _cancel) = spawn_with(resolver_ok(resolved.clone()), &transport);

        player.connect(channel(10)).await.unwrap();
        player.set_loop_mode(LoopMode::Current).await.unwrap();
        player.enqueue(vec![track("A"), track("B")]).await.unwrap();

        for _ in 0..2 {
            transport.finish();
            player.now_playing().await.unwrap();
        }

        assert_eq!(player.now_playing().await.unwrap().unwrap().title, "A");
        assert_eq!(resolved.load(Ordering::SeqCst), 3);
        assert_eq!(
            transport.played(),
            vec!["stream://A", "stream://A", "stream://A"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_finish_after_skip_is_ignored() {
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        player
            .enqueue(vec![track("A"), track("B"), track("C")])
            .await
            .unwrap();
        let stale = transport.notifier().unwrap();

        let skip = player.skip().await.unwrap();
        assert_eq!(skip.skipped.title, "A");
        assert_eq!(skip.next.unwrap().title, "B");

        stale.notify();
        assert_eq!(player.now_playing().await.unwrap().unwrap().title, "B");
        assert_eq!(transport.played(), vec!["stream://A", "stream://B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_when_idle_fails() {
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        assert!(matches!(player.skip().await, Err(PlayerError::NothingPlaying)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_is_clamped_and_applied_to_playback() {
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        assert_eq!(player.set_volume(3.5).await.unwrap(), 2.0);

        player.enqueue(vec![track("A")]).await.unwrap();
        assert_eq!(transport.volume(), 2.0);

        assert_eq!(player.set_volume(0.25).await.unwrap(), 0.25);
        assert_eq!(transport.volume(), 0.25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_full_is_reported() {
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        let tracks: Vec<_> = (0..12).map(|i| track(&i.to_string())).collect();
        let outcome = player.enqueue(tracks).await.unwrap();
        assert_eq!(outcome.batch.added, 10);
        assert_eq!(outcome.batch.rejected, 2);

        // Una pasó a sonar, queda un hueco
        player.enqueue(vec![track("x")]).await.unwrap();
        assert!(matches!(
            player.enqueue(vec![track("y")]).await,
            Err(PlayerError::QueueFull(QueueFull { max: 10 }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_without_voice_connection_reports_transport_error() {
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        let outcome = player.enqueue(vec![track("A")]).await.unwrap();
        assert!(matches!(
            outcome.playback,
            Err(PlayerError::Transport(TransportError::NotConnected))
        ));
        assert_eq!(player.queue_snapshot().await.unwrap().items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_disconnects_once() {
        let transport = FakeTransport::default();
        let (player, task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(301)).await;

        assert_eq!(task.await.unwrap(), ExitReason::IdleTimeout);
        assert_eq!(transport.disconnects(), 1);
        assert!(matches!(player.now_playing().await, Err(PlayerError::PlayerGone)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_after_lost_connection_exits_quietly() {
        let transport = FakeTransport::default();
        let (player, task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        transport.drop_connection();
        assert!(!player.is_connected().await.unwrap());

        tokio::time::sleep(Duration::from_secs(301)).await;

        assert_eq!(task.await.unwrap(), ExitReason::IdleTimeout);
        assert_eq!(transport.disconnects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_before_timeout_cancels_timer() {
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;
        player.enqueue(vec![track("A")]).await.unwrap();

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(transport.disconnects(), 0);
        assert_eq!(player.now_playing().await.unwrap().unwrap().title, "A");

        // Al terminar se arma un periodo nuevo completo
        transport.finish();
        assert!(player.now_playing().await.unwrap().is_none());
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(transport.disconnects(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_participant_rejoin_restarts_countdown() {
        let transport = FakeTransport::default();
        let (player, _task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(250)).await;

        // Otro canal no cuenta
        player.participant_joined(channel(99)).unwrap();
        player.participant_joined(channel(10)).unwrap();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(transport.disconnects(), 0);

        tokio::time::sleep(Duration::from_secs(201)).await;
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_and_disconnects() {
        let transport = FakeTransport::default();
        let (player, task, _cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        player.enqueue(vec![track("A"), track("B")]).await.unwrap();
        player.stop().await.unwrap();

        assert_eq!(task.await.unwrap(), ExitReason::Stopped);
        assert_eq!(transport.disconnects(), 1);
        assert!(!transport.is_playing_now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_task_without_side_effects() {
        let transport = FakeTransport::default();
        let (player, task, cancel) =
            spawn_with(resolver_ok(Arc::new(AtomicUsize::new(0))), &transport);

        player.connect(channel(10)).await.unwrap();
        cancel.cancel();

        assert_eq!(task.await.unwrap(), ExitReason::Removed);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(transport.disconnects(), 0);
        assert!(!player.is_alive());
    }
}
