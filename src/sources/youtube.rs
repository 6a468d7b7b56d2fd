use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{process::Output, sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::{ResolutionError, SearchError, TrackResolver};
use crate::audio::track::{ResolvedStream, TrackInfo};

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("regex de video id válida"));

/// Títulos que yt-dlp devuelve para entradas no reproducibles de una playlist.
const UNAVAILABLE_TITLES: &[&str] = &["[Private video]", "[Deleted video]", "[Unavailable video]"];

/// Resolver basado en yt-dlp.
///
/// La búsqueda usa `--flat-playlist` para que una playlist de 150 canciones
/// tarde lo mismo que una sola; la URL del stream se pide aparte con
/// `--get-url` justo antes de reproducir.
pub struct YtDlpResolver {
    binary: String,
    max_results: usize,
    timeout: Duration,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Una línea de `--dump-json`
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    webpage_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, max_results: usize, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            max_results,
            timeout,
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Decide si la consulta es un enlace o un texto a buscar.
    pub fn is_url(query: &str) -> bool {
        Url::parse(query)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    fn search_args(&self, query: &str) -> Vec<String> {
        let mut args: Vec<String> = ["--flat-playlist", "--dump-json", "--no-warnings"]
            .into_iter()
            .map(String::from)
            .collect();

        if Self::is_url(query) {
            if !query.contains("list=") {
                args.push("--no-playlist".to_string());
            }
            args.push("--playlist-end".to_string());
            args.push(self.max_results.to_string());
            args.push(query.to_string());
        } else {
            // Texto libre: solo el primer resultado
            args.push(format!("ytsearch1:{}", query));
        }

        args
    }

    async fn run(&self, args: &[String]) -> Option<std::io::Result<Output>> {
        let _permit = self.rate_limiter.acquire().await.ok();

        let mut command = Command::new(&self.binary);
        command.args(args).kill_on_drop(true);

        tokio::time::timeout(self.timeout, command.output()).await.ok()
    }

    /// Convierte la salida de `--dump-json` en canciones, ignorando líneas
    /// inválidas y entradas no reproducibles.
    fn parse_entries(stdout: &str, limit: usize) -> Vec<TrackInfo> {
        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Línea de yt-dlp ignorada: {}", e);
                    None
                }
            })
            .filter_map(Self::entry_to_track)
            .take(limit)
            .collect()
    }

    fn entry_to_track(entry: YtDlpEntry) -> Option<TrackInfo> {
        let title = entry.title.filter(|t| !UNAVAILABLE_TITLES.contains(&t.as_str()))?;
        let page_url = Self::page_url(entry.webpage_url, entry.url, entry.id)?;

        let mut track = TrackInfo::new(title, page_url);

        let thumbnail = entry
            .thumbnail
            .or_else(|| entry.thumbnails.into_iter().last().map(|t| t.url));
        if let Some(thumbnail) = thumbnail {
            track = track.with_thumbnail(thumbnail);
        }

        if let Some(duration) = entry.duration.filter(|d| d.is_finite() && *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(duration));
        }

        Some(track)
    }

    /// Las entradas planas a veces solo traen el id del video.
    fn page_url(
        webpage_url: Option<String>,
        url: Option<String>,
        id: Option<String>,
    ) -> Option<String> {
        if let Some(page) = webpage_url {
            return Some(page);
        }

        match url {
            Some(url) if Self::is_url(&url) => Some(url),
            Some(url) if VIDEO_ID.is_match(&url) => Some(Self::watch_url(&url)),
            _ => id.filter(|id| VIDEO_ID.is_match(id)).map(|id| Self::watch_url(&id)),
        }
    }

    fn watch_url(id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", id)
    }

    /// Errores de yt-dlp que indican restricción de región, edad o formato.
    fn is_restriction(stderr: &str) -> bool {
        let stderr = stderr.to_lowercase();
        stderr.contains("available in your country")
            || stderr.contains("geo restrict")
            || stderr.contains("confirm your age")
            || stderr.contains("requested format is not available")
            || stderr.contains("private video")
            || stderr.contains("video unavailable")
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn search(&self, query: &str) -> Result<Vec<TrackInfo>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        info!("🔍 Buscando: {}", query);

        let args = self.search_args(query);
        let output = self
            .run(&args)
            .await
            .ok_or(SearchError::Timeout(self.timeout))??;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp falló buscando '{}': {}", query, error.trim());
            return Err(SearchError::Extractor(error.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let tracks = Self::parse_entries(&stdout, self.max_results);

        info!("✅ {} resultados para '{}'", tracks.len(), query);
        Ok(tracks)
    }

    async fn resolve_stream(&self, track: &TrackInfo) -> Result<ResolvedStream, ResolutionError> {
        debug!("🎵 Obteniendo URL de stream para: {}", track.page_url);

        let args: Vec<String> = [
            "--no-playlist",
            "-f",
            "bestaudio/best",
            "--get-url",
            "--no-warnings",
            track.page_url.as_str(),
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let output = self
            .run(&args)
            .await
            .ok_or(ResolutionError::Timeout(self.timeout))??;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if Self::is_restriction(&error) {
                return Err(ResolutionError::Restricted(error));
            }
            return Err(ResolutionError::Extractor(error));
        }

        // Con formatos separados yt-dlp imprime una URL por línea; basta la primera
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stream_url = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or(ResolutionError::NoStream)?;

        Ok(ResolvedStream::new(stream_url))
    }
}
