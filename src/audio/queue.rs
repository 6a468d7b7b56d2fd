use rand::seq::SliceRandom;
use std::{collections::VecDeque, fmt, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::{debug, info};

use super::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    /// Repite la canción actual indefinidamente.
    Current,
    /// La canción terminada vuelve al final de la cola.
    Queue,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Current => "current",
            LoopMode::Queue => "queue",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "current" | "track" => Ok(LoopMode::Current),
            "queue" => Ok(LoopMode::Queue),
            other => Err(format!("modo de repetición desconocido: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("la cola está llena (máximo {max} canciones)")]
pub struct QueueFull {
    pub max: usize,
}

/// Resultado de agregar varias canciones de una vez (playlists).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub added: usize,
    pub rejected: usize,
    /// Posición (1-based) de la primera canción agregada.
    pub first_position: Option<usize>,
}

/// Estado de reproducción de un guild: cola FIFO acotada, canción actual y
/// modo de repetición.
///
/// No sabe nada de streams ni de transporte; el driver decide cuándo llamar
/// a [`MusicQueue::next_track`].
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
    loop_mode: LoopMode,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            loop_mode: LoopMode::Off,
            max_size,
        }
    }

    /// Agrega una canción al final. Devuelve su posición (1-based).
    pub fn enqueue(&mut self, track: Track) -> Result<usize, QueueFull> {
        if self.items.len() >= self.max_size {
            debug!("Cola llena, rechazando: {}", track.title);
            return Err(QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);
        Ok(self.items.len())
    }

    /// Agrega hasta llenar la capacidad restante; el resto se rechaza.
    pub fn enqueue_many(&mut self, tracks: Vec<Track>) -> BatchOutcome {
        let total = tracks.len();
        let to_add = total.min(self.remaining_capacity());
        let first_position = (to_add > 0).then(|| self.items.len() + 1);

        self.items.extend(tracks.into_iter().take(to_add));

        info!("➕ Agregadas {} de {} canciones a la cola", to_add, total);
        BatchOutcome {
            added: to_add,
            rejected: total - to_add,
            first_position,
        }
    }

    /// Elige la canción del siguiente ciclo.
    ///
    /// `Current` gana sobre la rotación de `Queue`, y la rotación ocurre antes
    /// del pop: con `Queue` el periodo es `len + 1`.
    pub fn next_track(&mut self) -> Option<Track> {
        if let Some(last) = self.current.take() {
            match self.loop_mode {
                LoopMode::Current => {
                    info!("🔂 Repitiendo: {}", last.title);
                    self.current = Some(last.clone());
                    return Some(last);
                }
                LoopMode::Queue => {
                    debug!("🔁 Rotando al final de la cola: {}", last.title);
                    self.items.push_back(last);
                }
                LoopMode::Off => {}
            }
        }

        self.current = self.items.pop_front();
        match &self.current {
            Some(track) => debug!("➡️ Siguiente en cola: {}", track.title),
            None => debug!("📭 Cola vacía"),
        }
        self.current.clone()
    }

    /// Descarta la canción actual sin repetirla. Con `Queue` vuelve al final.
    pub fn skip_current(&mut self) -> Option<Track> {
        let skipped = self.current.take()?;
        if self.loop_mode == LoopMode::Queue {
            self.items.push_back(skipped.clone());
        }
        Some(skipped)
    }

    /// Permutación aleatoria uniforme de la cola. Devuelve cuántas canciones
    /// se mezclaron (0 si hay menos de dos).
    pub fn shuffle(&mut self) -> usize {
        if self.items.len() < 2 {
            return 0;
        }

        self.items
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
        self.items.len()
    }

    /// Vacía la cola sin tocar la canción actual.
    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada: {} canciones eliminadas", count);
        count
    }

    /// Vacía la cola y olvida la canción actual.
    pub fn reset(&mut self) -> usize {
        self.current = None;
        self.clear()
    }

    /// Elimina la canción en `index` (0-based).
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        let removed = self.items.remove(index)?;
        debug!("❌ Eliminada posición {}: {}", index, removed.title);
        Some(removed)
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        info!("🔁 Modo de repetición: {}", mode);
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn remaining_capacity(&self) -> usize {
        self.max_size.saturating_sub(self.items.len())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            items: self.items.iter().cloned().collect(),
            loop_mode: self.loop_mode,
            total_duration: self.total_duration(),
        }
    }

    fn total_duration(&self) -> Duration {
        self.items
            .iter()
            .chain(self.current.iter())
            .filter_map(|track| track.duration)
            .sum()
    }
}

/// Copia de la cola para que la capa de comandos la presente.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub loop_mode: LoopMode,
    pub total_duration: Duration,
}

impl QueueSnapshot {
    /// Obtiene una página (1-based) de la cola.
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        let per_page = per_page.max(1);
        let total_pages = self.items.len().div_ceil(per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;
        let end = (start + per_page).min(self.items.len());

        QueuePage {
            items: self.items[start..end]
                .iter()
                .cloned()
                .enumerate()
                .map(|(offset, track)| (start + offset + 1, track))
                .collect(),
            current_page,
            total_pages,
            total_items: self.items.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    /// Pares (posición 1-based, canción).
    pub items: Vec<(usize, Track)>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}
