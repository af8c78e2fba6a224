//! Line-delimited JSON IPC client for the media player's Unix-domain socket.
//!
//! One connection per request: the player process can die and be respawned
//! between calls, so a long-lived connection would just need the same
//! reconnect handling a fresh `connect` already gives us for free.

use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::errors::{AppError, AppResult};

#[derive(Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Send `{"command": command}` and return the decoded response line.
    pub async fn send_command(&self, command: Value) -> AppResult<Value> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| AppError::player(format!("connect to ipc socket failed: {e}")))?;

        let mut reader = BufReader::new(stream);
        let mut request = serde_json::to_vec(&serde_json::json!({ "command": command }))?;
        request.push(b'\n');
        reader
            .get_mut()
            .write_all(&request)
            .await
            .map_err(|e| AppError::player(format!("ipc write failed: {e}")))?;

        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| AppError::player(format!("ipc read failed: {e}")))?;
        if line.is_empty() {
            return Err(AppError::player("ipc socket closed without a response"));
        }

        serde_json::from_str(line.trim())
            .map_err(|e| AppError::player(format!("malformed ipc response: {e}")))
    }

    pub async fn get_property(&self, name: &str) -> AppResult<Value> {
        let response = self
            .send_command(serde_json::json!(["get_property", name]))
            .await?;
        response
            .get("data")
            .cloned()
            .ok_or_else(|| AppError::player(format!("get_property {name} had no data field")))
    }

    pub async fn set_property(&self, name: &str, value: Value) -> AppResult<()> {
        self.send_command(serde_json::json!(["set_property", name, value]))
            .await?;
        Ok(())
    }

    pub async fn loadfile(&self, path: &str) -> AppResult<()> {
        self.send_command(serde_json::json!(["loadfile", path, "replace"]))
            .await?;
        Ok(())
    }

    pub async fn stop(&self) -> AppResult<()> {
        self.send_command(serde_json::json!(["stop"])).await?;
        Ok(())
    }

    pub async fn quit(&self) -> AppResult<()> {
        self.send_command(serde_json::json!(["quit"])).await?;
        Ok(())
    }
}
