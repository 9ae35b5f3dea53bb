//! Simulated device serving settings over the IPC socket
//!
//! Holds the authoritative settings. Every accepted change is broadcast to all
//! connected clients: the sender receives it as the echo of its commit, other
//! clients as an unsolicited push.

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::net::UnixStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::ipc::{
    read_message, write_message, ChangeSettingsRequest, ClientMessage, DeviceServer, ServerMessage,
    SettingsResponse,
};
use crate::settings::{defaults, ValueSet};

/// Buffered settings updates per client before it starts lagging
const UPDATE_BUFFER: usize = 32;

/// Authoritative device-side settings
pub struct DeviceState {
    settings: Mutex<ValueSet>,
    updates: broadcast::Sender<SettingsResponse>,
}

impl DeviceState {
    /// Start from `initial`; local-only fields are dropped
    pub fn new(initial: ValueSet) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            settings: Mutex::new(initial.filtered(|path| !path.is_local_only())),
            updates,
        }
    }

    /// Full report of the current settings
    pub async fn report(&self) -> SettingsResponse {
        SettingsResponse::from_values(&*self.settings.lock().await)
    }

    /// Adopt a client's settings and announce them to every client
    pub async fn apply(&self, request: &ChangeSettingsRequest) {
        let report = {
            let mut settings = self.settings.lock().await;
            *settings = request.to_values();
            SettingsResponse::from_values(&settings)
        };

        match self.updates.send(report) {
            Ok(receivers) => debug!(receivers, "Broadcast settings change"),
            Err(_) => debug!("Settings changed with no clients connected"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettingsResponse> {
        self.updates.subscribe()
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(defaults())
    }
}

/// Accept clients until `shutdown` resolves
pub async fn serve(
    server: DeviceServer,
    state: Arc<DeviceState>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    info!(socket = %server.path().display(), "Device listening");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = server.accept() => {
                let stream = match accepted {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!(error = ?e, "Failed to accept client");
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, state).await {
                        warn!(error = ?e, "Client handler failed");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Device shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_client(stream: UnixStream, state: Arc<DeviceState>) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut updates = state.subscribe();

    // Reads are not cancel-safe, so they get their own task
    let (requests_tx, mut requests) = mpsc::unbounded_channel::<ClientMessage>();
    let reader_task = tokio::spawn(async move {
        loop {
            match read_message::<_, ClientMessage>(&mut reader).await {
                Ok(request) => {
                    if requests_tx.send(request).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Client stream ended");
                    break;
                }
            }
        }
    });

    info!("Client connected to device");

    let result = loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(ClientMessage::SettingsRequest) => {
                    debug!("Client requested settings");
                    let response = ServerMessage::SettingsResponse(state.report().await);
                    if let Err(e) = write_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                Some(ClientMessage::ChangeSettings(request)) => {
                    info!("Client changed settings");
                    // The broadcast below carries the echo back to this client too
                    state.apply(&request).await;
                }
                None => break Ok(()),
            },

            update = updates.recv() => match update {
                Ok(report) => {
                    let response = ServerMessage::SettingsResponse(report);
                    if let Err(e) = write_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Client lagging behind settings updates");
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
        }
    };

    reader_task.abort();
    info!("Client disconnected from device");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryPreferences;
    use crate::ipc::connect;
    use crate::settings::{FieldPath, FieldValue};
    use crate::sync::{self, CommitState, SyncEngine};
    use std::time::Duration;
    use tokio::sync::oneshot;

    const WINDOW: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_apply_broadcasts_full_report() {
        let state = DeviceState::default();
        let mut updates = state.subscribe();

        let mut values = defaults();
        values.insert(FieldPath::TrackerKnees, FieldValue::Bool(true));
        state.apply(&ChangeSettingsRequest::from_values(&values)).await;

        let report = updates.recv().await.unwrap();
        assert_eq!(report, state.report().await);
        let trackers = report.steam_vr_trackers.unwrap();
        assert_eq!(trackers.get("knees"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_report_excludes_local_fields() {
        let state = DeviceState::default();
        let report = serde_json::to_value(state.report().await).unwrap();
        assert!(report.get("interface").is_none());
        assert_eq!(report["filtering"]["amount"], serde_json::json!(0.1));
    }

    #[tokio::test]
    async fn test_two_sessions_stay_in_sync() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("device.sock");
        let server = DeviceServer::bind_to(socket.clone()).unwrap();
        let state = Arc::new(DeviceState::default());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let device = tokio::spawn(serve(server, state.clone(), async {
            let _ = stop_rx.await;
        }));

        let start_session = |connection: crate::ipc::DeviceConnection| {
            let engine = SyncEngine::start(
                connection.channel,
                Box::new(MemoryPreferences::default()),
                WINDOW,
            );
            sync::spawn(engine, connection.inbound)
        };
        let editor = start_session(connect(&socket).await.unwrap());
        let observer = start_session(connect(&socket).await.unwrap());

        let mut editor_view = editor.subscribe();
        let mut observer_view = observer.subscribe();
        editor_view.wait_for(|v| v.is_synced()).await.unwrap();
        observer_view.wait_for(|v| v.is_synced()).await.unwrap();

        editor
            .set_field(FieldPath::FilteringAmount, FieldValue::Number(0.5))
            .await
            .unwrap();

        let settled = editor_view
            .wait_for(|v| v.echoes_received == 1 && v.commit_state == CommitState::Idle)
            .await
            .unwrap()
            .clone();
        assert_eq!(settled.values.number(FieldPath::FilteringAmount), Some(0.5));
        assert_eq!(settled.commits_sent, 1);

        let pushed = observer_view
            .wait_for(|v| v.values.number(FieldPath::FilteringAmount) == Some(0.5))
            .await
            .unwrap()
            .clone();
        // The observer only merged; it never committed anything back
        assert_eq!(pushed.commits_sent, 0);

        let report = state.report().await;
        assert_eq!(report.filtering.unwrap().get("amount"), Some(&serde_json::json!(0.5)));

        editor.shutdown().await;
        observer.shutdown().await;
        stop_tx.send(()).unwrap();
        device.await.unwrap().unwrap();
    }
}
