//! IPC (Inter-Process Communication) via Unix sockets
//!
//! Provides message-based communication between a settings client and the device.
//! Uses length-prefixed JSON over Unix domain sockets.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod messages;
pub use messages::{
    ChangeSettingsRequest, ClientMessage, FilteringSettings, LegTweaksSettings, ModelSettings,
    ModelToggles, RawGroup, RawModelSettings, ServerMessage, SettingsResponse,
    SteamVrTrackers, TapDetectionSettings,
};

use crate::constants::{ipc::MAX_MESSAGE_SIZE, paths};
use crate::sync::MessageChannel;

/// Get default socket path (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir)
            .join(paths::APP_DIR)
            .join(paths::SOCKET_FILENAME));
    }

    // Fallback to cache dir
    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(paths::APP_DIR).join(paths::SOCKET_FILENAME))
}

/// Live connection to a device
pub struct DeviceConnection {
    /// Outbound half, handed to the sync engine
    pub channel: SocketChannel,
    /// Every message the device sends, in arrival order
    pub inbound: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Outbound half of a device connection.
///
/// Sends are queued to a writer task and never wait for the device.
#[derive(Clone)]
pub struct SocketChannel {
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

impl MessageChannel for SocketChannel {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| anyhow!("Device connection is closed"))
    }
}

/// Connect to the device socket and start the reader/writer tasks
pub async fn connect(path: &Path) -> Result<DeviceConnection> {
    let stream = UnixStream::connect(path)
        .await
        .context(format!("Failed to connect to device at {}", path.display()))?;
    info!(socket = %path.display(), "Connected to device");

    let (mut reader, mut writer) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = write_message(&mut writer, &message).await {
                warn!(error = ?e, "Failed to send message to device, dropping connection");
                break;
            }
        }
        debug!("Device writer stopped");
    });

    tokio::spawn(async move {
        loop {
            match read_message::<_, ServerMessage>(&mut reader).await {
                Ok(message) => {
                    if inbound_tx.send(message).is_err() {
                        debug!("Inbound receiver dropped, stopping device reader");
                        break;
                    }
                }
                Err(e) => {
                    info!(error = %e, "Device connection closed");
                    break;
                }
            }
        }
    });

    Ok(DeviceConnection {
        channel: SocketChannel {
            outbound: outbound_tx,
        },
        inbound: inbound_rx,
    })
}

/// Server listener for the device
pub struct DeviceServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl DeviceServer {
    /// Create server and bind to specific socket path
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        // Create directory if needed
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        // Remove stale socket if exists
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .context(format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        // Set permissions to 0700 (owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept incoming connection
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept IPC connection")?;
        Ok(stream)
    }

    /// Get socket path
    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for DeviceServer {
    fn drop(&mut self) {
        // Clean up socket file
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Write length-prefixed message to stream
pub(crate) async fn write_message<W, T>(stream: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(anyhow!(
            "Message too large: {} bytes (max: {})",
            json.len(),
            MAX_MESSAGE_SIZE
        ));
    }

    // Write length prefix (u32 little-endian)
    let len = json.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .await
        .context("Failed to write message length")?;

    // Write JSON payload
    stream
        .write_all(&json)
        .await
        .context("Failed to write message payload")?;

    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}

/// Read length-prefixed message from stream
pub(crate) async fn read_message<R, T>(stream: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    // Read length prefix
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check (prevent DoS via huge allocation)
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!(
            "Message too large: {} bytes (max: {})",
            len,
            MAX_MESSAGE_SIZE
        ));
    }

    // Read JSON payload
    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .await
        .context("Failed to read message payload")?;

    // Deserialize
    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}
