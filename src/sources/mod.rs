pub mod youtube;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::audio::track::{ResolvedStream, TrackInfo};

pub use youtube::YtDlpResolver;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("consulta vacía")]
    EmptyQuery,
    #[error("no se pudo ejecutar yt-dlp: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("yt-dlp falló: {0}")]
    Extractor(String),
    #[error("la búsqueda superó el tiempo límite ({0:?})")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no se pudo ejecutar yt-dlp: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("contenido restringido: {0}")]
    Restricted(String),
    #[error("yt-dlp falló: {0}")]
    Extractor(String),
    #[error("yt-dlp no devolvió ninguna URL de stream")]
    NoStream,
    #[error("la resolución superó el tiempo límite ({0:?})")]
    Timeout(Duration),
}

/// Fuente de canciones en dos fases.
///
/// `search` es barato y solo trae metadata; `resolve_stream` es caro y se
/// llama justo antes de reproducir, una vez por ciclo, porque las URLs de
/// stream caducan.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Devuelve las canciones que corresponden a la consulta, en orden.
    /// Cero resultados es `Ok(vec![])`, no un error.
    async fn search(&self, query: &str) -> Result<Vec<TrackInfo>, SearchError>;

    async fn resolve_stream(&self, track: &TrackInfo) -> Result<ResolvedStream, ResolutionError>;
}
