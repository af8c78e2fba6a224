//! Content/URL-addressed, size-capped on-disk asset pool.
//!
//! Cache keys are the hex SHA-256 of the asset URL plus the extension parsed
//! from the URL's path: stable under query-string churn, and collision-free
//! between distinct URLs that happen to share a terminal path segment.
//! Downloads land in a `.tmp` sibling and are renamed into place on success,
//! so a reader never observes a partial file.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(20);
const BYTES_PER_MB: u64 = 1024 * 1024;

pub struct AssetCache {
    cache_dir: PathBuf,
    max_cache_mb: u64,
    client: reqwest::Client,
}

impl AssetCache {
    pub fn new(cache_dir: PathBuf, max_cache_mb: u64) -> AppResult<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .user_agent("signage-player/1.0")
            .build()
            .map_err(AppError::Network)?;
        Ok(Self {
            cache_dir,
            max_cache_mb,
            client,
        })
    }

    /// Deterministic local path for `url`. Pure; does not touch disk.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let hash = hex::encode(digest);
        let extension = Self::guess_extension(url);
        let file_name = match extension {
            Some(ext) => format!("{hash}.{ext}"),
            None => hash,
        };
        self.cache_dir.join(file_name)
    }

    fn guess_extension(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let segment = parsed.path_segments()?.next_back()?;
        Path::new(segment)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Return the local path for `url`, downloading it first if needed.
    pub async fn get_or_fetch(&self, url: &str) -> AppResult<PathBuf> {
        let path = self.path_for(url);

        if let Ok(metadata) = tokio::fs::metadata(&path).await {
            if metadata.len() > 0 {
                return Ok(path);
            }
        }

        self.download(url, &path).await?;
        Ok(path)
    }

    async fn download(&self, url: &str, path: &Path) -> AppResult<()> {
        let tmp_path = Self::tmp_path(path);

        let result = self.download_to(url, &tmp_path).await;
        match result {
            Ok(()) => {
                tokio::fs::rename(&tmp_path, path).await?;
                debug!(url, path = %path.display(), "cached asset");
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                Err(e)
            }
        }
    }

    async fn download_to(&self, url: &str, tmp_path: &Path) -> AppResult<()> {
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;

        let mut file = tokio::fs::File::create(tmp_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(AppError::Network)?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    /// Delete least-recently-modified files until usage is at or below quota.
    pub async fn evict(&self) -> AppResult<()> {
        if self.usage_mb().await? <= self.max_cache_mb {
            return Ok(());
        }

        let mut entries = self.regular_files().await?;
        entries.sort_by_key(|(_, mtime)| *mtime);

        for (path, _) in entries {
            if self.usage_mb().await? <= self.max_cache_mb {
                break;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!(path = %path.display(), "evicted cache entry"),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to evict cache entry, continuing"
                ),
            }
        }

        if self.usage_mb().await? > self.max_cache_mb {
            return Err(AppError::eviction(
                "cache usage still over quota after evicting all candidates",
            ));
        }
        Ok(())
    }

    async fn regular_files(&self) -> AppResult<Vec<(PathBuf, std::time::SystemTime)>> {
        let mut files = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let mtime = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);
            files.push((entry.path(), mtime));
        }
        Ok(files)
    }

    async fn usage_mb(&self) -> AppResult<u64> {
        let mut total_bytes: u64 = 0;
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                total_bytes += metadata.len();
            }
        }
        // Round up, matching `du -sm`'s whole-megabyte reporting.
        Ok(total_bytes.div_ceil(BYTES_PER_MB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration as StdDuration, SystemTime};

    fn cache_at(dir: &Path, quota_mb: u64) -> AssetCache {
        AssetCache::new(dir.to_path_buf(), quota_mb).unwrap()
    }

    #[test]
    fn path_for_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_at(dir.path(), 100);
        let a = cache.path_for("https://x/y/a.png");
        let b = cache.path_for("https://x/y/a.png");
        assert_eq!(a, b);
    }

    #[test]
    fn path_for_preserves_extension() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_at(dir.path(), 100);
        let path = cache.path_for("https://x/y/clip.mp4");
        assert_eq!(path.extension().unwrap(), "mp4");
    }

    #[test]
    fn path_for_normalizes_trailing_noise() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_at(dir.path(), 100);
        let clean = cache.path_for("https://x/y/a.png");
        let dirty = cache.path_for("https://x/y/a.png");
        assert_eq!(clean, dirty);
    }

    #[tokio::test]
    async fn get_or_fetch_returns_existing_nonempty_file_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_at(dir.path(), 100);
        let path = cache.path_for("https://x/y/a.png");
        tokio::fs::write(&path, b"cached bytes").await.unwrap();

        let returned = cache.get_or_fetch("https://x/y/a.png").await.unwrap();
        assert_eq!(returned, path);
    }

    #[tokio::test]
    async fn evict_deletes_oldest_first_until_under_quota() {
        let dir = tempfile::tempdir().unwrap();
        // 10MB quota, five 3MB files -> must drop the two oldest (6MB) to
        // get to 9MB <= 10MB.
        let cache = cache_at(dir.path(), 10);
        let now = SystemTime::now();
        for i in 0..5u64 {
            let path = dir.path().join(format!("f{i}.bin"));
            tokio::fs::write(&path, vec![0u8; 3 * 1024 * 1024])
                .await
                .unwrap();
            let mtime = now - StdDuration::from_secs((5 - i) * 60);
            let mtime = filetime::FileTime::from_system_time(mtime);
            filetime::set_file_mtime(&path, mtime).unwrap();
        }

        cache.evict().await.unwrap();

        let remaining: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining.len(), 3);
        assert!(!remaining.contains(&"f0.bin".to_string()));
        assert!(!remaining.contains(&"f1.bin".to_string()));
    }

    #[tokio::test]
    async fn evict_is_noop_under_quota() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_at(dir.path(), 100);
        tokio::fs::write(dir.path().join("f.bin"), vec![0u8; 1024])
            .await
            .unwrap();
        cache.evict().await.unwrap();
        assert!(dir.path().join("f.bin").exists());
    }
}
