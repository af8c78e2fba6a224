//! Supervises one long-running media-player child process and drives it
//! over its Unix-domain JSON IPC socket.

mod ipc;

pub use ipc::IpcClient;

use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Signal, System};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};

const RESPAWN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const RESPAWN_TIMEOUT: Duration = Duration::from_secs(8);
const EOF_POLL_INTERVAL: Duration = Duration::from_millis(200);
const UNKNOWN_DURATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const VIDEO_EOF_GRACE: Duration = Duration::from_secs(10);

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

pub struct PlayerConfig {
    pub binary: PathBuf,
    pub socket_path: PathBuf,
    pub orientation: u16,
    pub image_seconds: u64,
}

pub struct PlayerDriver {
    config: PlayerConfig,
    ipc: IpcClient,
    child: Option<Child>,
}

impl PlayerDriver {
    pub fn new(config: PlayerConfig) -> Self {
        let ipc = IpcClient::new(config.socket_path.clone());
        Self {
            config,
            ipc,
            child: None,
        }
    }

    /// Probe the socket; respawn the player if it's dead or stuck.
    pub async fn ensure_alive(&mut self) -> AppResult<()> {
        if self.probe().await {
            return Ok(());
        }

        warn!("player socket is stale or unreachable, restarting player");
        self.kill_socket_holders();
        let _ = tokio::fs::remove_file(&self.config.socket_path).await;
        self.child = Some(self.spawn_player()?);

        let deadline = Instant::now() + RESPAWN_TIMEOUT;
        while Instant::now() < deadline {
            if tokio::fs::metadata(&self.config.socket_path).await.is_ok() {
                info!("player respawned, socket ready");
                return Ok(());
            }
            sleep(RESPAWN_POLL_INTERVAL).await;
        }

        Err(AppError::player(
            "player did not create its ipc socket within the respawn window",
        ))
    }

    async fn probe(&self) -> bool {
        matches!(self.ipc.get_property("idle-active").await, Ok(_))
    }

    fn spawn_player(&self) -> AppResult<Child> {
        let socket_arg = format!(
            "--input-ipc-server={}",
            self.config.socket_path.display()
        );
        let rotate_arg = format!("--video-rotate={}", self.config.orientation);
        let duration_arg = format!("--image-display-duration={}", self.config.image_seconds);

        Command::new(&self.config.binary)
            .arg("--fullscreen")
            .arg("--no-border")
            .arg("--hwdec=auto")
            .arg("--mute=yes")
            .arg("--idle=yes")
            .arg("--force-window=yes")
            .arg("--no-osc")
            .arg("--cursor-autohide=1000")
            .arg(rotate_arg)
            .arg(duration_arg)
            .arg(socket_arg)
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| AppError::player(format!("failed to spawn player process: {e}")))
    }

    fn kill_socket_holders(&self) {
        let mut system = System::new();
        system.refresh_all();
        let needle = format!(
            "input-ipc-server={}",
            self.config.socket_path.display()
        );

        for (pid, process) in system.processes() {
            let cmdline = process.cmd().join(" ");
            if cmdline.contains(&needle) {
                debug!(pid = pid.as_u32(), "terminating stale player process");
                process.kill_with(Signal::Term);
            }
        }
    }

    /// Display one asset. Images display for a fixed duration; videos are
    /// waited out until end-of-file or a safety timeout. `shutdown` lets a
    /// SIGINT/SIGTERM cut a wait short instead of blocking process exit.
    pub async fn play(
        &mut self,
        url: &str,
        local_path: &Path,
        shutdown: &CancellationToken,
    ) -> AppResult<()> {
        let Some(extension) = Self::extension(url) else {
            warn!(url, "asset url has no extension, skipping");
            return Ok(());
        };

        let is_image = IMAGE_EXTENSIONS.contains(&extension.as_str());
        let loop_mode = if is_image { "inf" } else { "no" };
        if let Err(e) = self
            .ipc
            .set_property("loop-file", serde_json::json!(loop_mode))
            .await
        {
            warn!(error = %e, "failed to set loop-file, continuing anyway");
        }

        let local_path_str = local_path.to_string_lossy().to_string();
        if let Err(e) = self.ipc.loadfile(&local_path_str).await {
            warn!(error = %e, "loadfile failed");
        }

        if is_image {
            tokio::select! {
                _ = sleep(Duration::from_secs(self.config.image_seconds)) => {}
                _ = shutdown.cancelled() => {}
            }
            return Ok(());
        }

        self.wait_for_video_eof(shutdown).await
    }

    async fn wait_for_video_eof(&self, shutdown: &CancellationToken) -> AppResult<()> {
        let duration_secs = self
            .ipc
            .get_property("duration")
            .await
            .ok()
            .and_then(|v| v.as_f64());

        let safety_timeout = match duration_secs {
            Some(d) if d > 0.0 => Duration::from_secs_f64(d) + VIDEO_EOF_GRACE,
            _ => UNKNOWN_DURATION_TIMEOUT,
        };

        let poll_eof = async {
            loop {
                match self.ipc.get_property("eof-reached").await {
                    Ok(value) if value.as_bool() == Some(true) => return,
                    _ => sleep(EOF_POLL_INTERVAL).await,
                }
            }
        };

        tokio::select! {
            result = timeout(safety_timeout, poll_eof) => {
                if result.is_err() {
                    warn!("video playback safety timeout reached, stopping");
                    if let Err(e) = self.ipc.stop().await {
                        warn!(error = %e, "stop failed after eof timeout");
                    }
                }
            }
            _ = shutdown.cancelled() => {}
        }

        Ok(())
    }

    fn extension(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let segment = parsed.path_segments()?.next_back()?;
        Path::new(segment)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Stop the player and reclaim its socket. Idempotent; safe to call on
    /// every exit path (normal exit, SIGINT, SIGTERM).
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.ipc.quit().await {
            debug!(error = %e, "quit command failed, player may already be dead");
        }
        self.kill_socket_holders();
        let _ = tokio::fs::remove_file(&self.config.socket_path).await;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_recognizes_image_and_video() {
        assert_eq!(
            PlayerDriver::extension("https://x/y/a.PNG").as_deref(),
            Some("png")
        );
        assert_eq!(
            PlayerDriver::extension("https://x/y/clip.mp4?token=abc").as_deref(),
            Some("mp4")
        );
    }

    #[test]
    fn extension_is_none_for_extensionless_path() {
        assert_eq!(PlayerDriver::extension("https://x/y/stream"), None);
    }

    #[test]
    fn image_extensions_cover_common_formats() {
        for ext in ["jpg", "jpeg", "png", "gif", "bmp", "webp"] {
            assert!(IMAGE_EXTENSIONS.contains(&ext));
        }
        assert!(!IMAGE_EXTENSIONS.contains(&"mp4"));
    }
}
