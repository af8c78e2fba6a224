//! Owns the `main`/`pending` playlists and the cursor, and runs the
//! bootstrap → play → swap → refetch state machine.

pub mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::AssetCache;
use crate::errors::AppResult;
use crate::fetcher::BatchFetcher;
use crate::player::PlayerDriver;
use state::PlaylistState;

const BOOTSTRAP_RETRY_BACKOFF: Duration = Duration::from_secs(5);
const REFETCH_BACKOFF: Duration = Duration::from_secs(2);
const PLAYBACK_FAILURE_BACKOFF: Duration = Duration::from_secs(1);

struct PendingFetch {
    handle: JoinHandle<()>,
}

pub struct PlaylistController {
    state_dir: PathBuf,
    fetcher: Arc<BatchFetcher>,
    cache: Arc<AssetCache>,
    player: PlayerDriver,
    restart_after: Option<Duration>,
    state: PlaylistState,
}

impl PlaylistController {
    pub fn new(
        state_dir: PathBuf,
        fetcher: Arc<BatchFetcher>,
        cache: Arc<AssetCache>,
        player: PlayerDriver,
        restart_after: Option<Duration>,
    ) -> Self {
        Self {
            state_dir,
            fetcher,
            cache,
            player,
            restart_after,
            state: PlaylistState::Booting,
        }
    }

    fn main_path(&self) -> PathBuf {
        self.state_dir.join("main.txt")
    }

    fn pending_path(&self) -> PathBuf {
        self.state_dir.join("pending.txt")
    }

    fn index_path(&self) -> PathBuf {
        self.state_dir.join("index.txt")
    }

    fn wrap_flag_path(&self) -> PathBuf {
        self.state_dir.join("wrap.flag")
    }

    /// Run the coordinator loop until `shutdown` is cancelled or the restart
    /// interval elapses. Always leaves the player shut down.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.state_dir).await?;

        self.bootstrap().await?;
        self.state = PlaylistState::Playing;

        let mut pending_fetch = Some(self.spawn_background_fetch(self.read_cursor().await));
        let started_at = Instant::now();

        loop {
            if shutdown.is_cancelled() {
                self.state = PlaylistState::Exiting;
                break;
            }
            if let Some(restart_after) = self.restart_after {
                if started_at.elapsed() >= restart_after {
                    info!("restart interval elapsed, exiting for supervisor restart");
                    self.state = PlaylistState::Exiting;
                    break;
                }
            }

            let urls = self.read_playlist(&self.main_path()).await?;
            if urls.is_empty() {
                self.state = PlaylistState::Refetching;
                warn!("main list empty, refetching");
                if let Err(e) = self.refetch_main().await {
                    warn!(error = %e, "refetch failed, backing off");
                    sleep(REFETCH_BACKOFF).await;
                }
                self.state = PlaylistState::Playing;
                continue;
            }

            for url in &urls {
                if shutdown.is_cancelled() {
                    self.state = PlaylistState::Exiting;
                    break;
                }
                self.play_one(url, shutdown).await;
            }

            if matches!(self.state, PlaylistState::Exiting) {
                break;
            }

            self.state = PlaylistState::Swapping;
            self.swap(&mut pending_fetch).await?;
            self.state = PlaylistState::Playing;
        }

        if let Some(pf) = pending_fetch.take() {
            pf.handle.abort();
        }
        self.player.shutdown().await;
        Ok(())
    }

    async fn play_one(&mut self, url: &str, shutdown: &CancellationToken) {
        if let Err(e) = self.player.ensure_alive().await {
            warn!(error = %e, "player unavailable, skipping this asset");
            sleep(PLAYBACK_FAILURE_BACKOFF).await;
            return;
        }

        match self.cache.get_or_fetch(url).await {
            Ok(local_path) => {
                if let Err(e) = self.player.play(url, &local_path, shutdown).await {
                    warn!(url, error = %e, "playback error, continuing to next asset");
                    sleep(PLAYBACK_FAILURE_BACKOFF).await;
                }
            }
            Err(e) => {
                warn!(url, error = %e, "asset download failed, skipping");
                sleep(PLAYBACK_FAILURE_BACKOFF).await;
            }
        }
    }

    async fn bootstrap(&mut self) -> AppResult<()> {
        loop {
            let cursor = self.read_cursor().await;
            match self.fetcher.fetch(cursor).await {
                Ok(batch) => {
                    self.write_playlist(&self.main_path(), &batch.urls).await?;
                    self.write_cursor(batch.next_cursor).await?;
                    if batch.wrapped {
                        self.mark_wrap().await?;
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "bootstrap fetch failed, retrying in 5s");
                    sleep(BOOTSTRAP_RETRY_BACKOFF).await;
                }
            }
        }
    }

    async fn refetch_main(&mut self) -> AppResult<()> {
        let cursor = self.read_cursor().await;
        let batch = self.fetcher.fetch(cursor).await?;
        self.write_playlist(&self.main_path(), &batch.urls).await?;
        self.write_cursor(batch.next_cursor).await?;
        if batch.wrapped {
            self.mark_wrap().await?;
        }
        Ok(())
    }

    async fn swap(&mut self, pending_fetch: &mut Option<PendingFetch>) -> AppResult<()> {
        if let Some(pf) = pending_fetch.take() {
            // Bounded by the fetcher's own 10s total timeout.
            let _ = pf.handle.await;
        }

        let pending_urls = self.read_playlist(&self.pending_path()).await?;
        if pending_urls.is_empty() {
            warn!("pending list empty at swap boundary, continuing on current main list");
            *pending_fetch = Some(self.spawn_background_fetch(self.read_cursor().await));
            return Ok(());
        }

        tokio::fs::rename(self.pending_path(), self.main_path()).await?;
        self.write_playlist(&self.pending_path(), &[]).await?;
        let _ = tokio::fs::remove_file(self.wrap_flag_path()).await;

        if let Err(e) = self.cache.evict().await {
            warn!(error = %e, "cache eviction failed");
        }

        *pending_fetch = Some(self.spawn_background_fetch(self.read_cursor().await));
        Ok(())
    }

    fn spawn_background_fetch(&self, cursor: u64) -> PendingFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let pending_path = self.pending_path();
        let index_path = self.index_path();
        let wrap_flag_path = self.wrap_flag_path();

        let handle = tokio::spawn(async move {
            match fetcher.fetch(cursor).await {
                Ok(batch) => {
                    if let Err(e) =
                        write_atomic(&pending_path, batch.urls.join("\n").as_bytes()).await
                    {
                        warn!(error = %e, "failed to persist pending playlist");
                        return;
                    }
                    if let Err(e) =
                        write_atomic(&index_path, batch.next_cursor.to_string().as_bytes()).await
                    {
                        warn!(error = %e, "failed to persist cursor");
                        return;
                    }
                    if batch.wrapped {
                        let _ = tokio::fs::write(&wrap_flag_path, b"").await;
                        info!("wrap detected during background fetch");
                    }
                }
                Err(e) => warn!(error = %e, "background prefetch failed"),
            }
        });

        PendingFetch { handle }
    }

    async fn mark_wrap(&self) -> AppResult<()> {
        tokio::fs::write(self.wrap_flag_path(), b"").await?;
        Ok(())
    }

    async fn read_cursor(&self) -> u64 {
        match tokio::fs::read_to_string(self.index_path()).await {
            Ok(s) => s.trim().parse().unwrap_or(0),
            Err(_) => 0,
        }
    }

    async fn write_cursor(&self, cursor: u64) -> AppResult<()> {
        write_atomic(&self.index_path(), cursor.to_string().as_bytes()).await
    }

    async fn read_playlist(&self, path: &Path) -> AppResult<Vec<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_playlist(&self, path: &Path, urls: &[String]) -> AppResult<()> {
        write_atomic(path, urls.join("\n").as_bytes()).await
    }
}

/// Write `bytes` to `path` by writing a `.tmp` sibling and renaming over it,
/// so a concurrent reader never observes a partial write.
async fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
