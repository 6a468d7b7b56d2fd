use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

/// Quién pidió una canción. Solo se usa para mostrar, nunca para decidir nada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub display_name: String,
}

impl Requester {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// Metadata inmutable de una canción.
///
/// `page_url` es la referencia estable (la página del video); la URL del
/// stream reproducible nunca se guarda aquí, se obtiene por ciclo como
/// [`ResolvedStream`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub title: String,
    pub page_url: String,
    pub thumbnail_url: Option<String>,
    pub duration: Option<Duration>,
    pub requester: Option<Requester>,
    pub added_at: DateTime<Utc>,
}

impl TrackInfo {
    pub fn new(title: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            page_url: page_url.into(),
            thumbnail_url: None,
            duration: None,
            requester: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail_url = Some(thumbnail);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_requester(mut self, requester: Requester) -> Self {
        self.requester = Some(requester);
        self
    }
}

/// Canción compartida entre la cola, el ciclo actual y los snapshots.
pub type Track = Arc<TrackInfo>;

/// Handle reproducible de un solo uso.
///
/// Se consume al pasarlo al transporte; cada ciclo de reproducción
/// (incluyendo repeticiones) resuelve uno nuevo.
#[derive(Debug)]
pub struct ResolvedStream {
    pub url: String,
    pub resolved_at: Instant,
}

impl ResolvedStream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resolved_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.resolved_at.elapsed()
    }
}
