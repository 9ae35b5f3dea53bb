//! Async driver for a [`SyncEngine`]
//!
//! One task owns the engine and serializes everything that touches the draft:
//! presentation commands, device messages and the commit timer. Stopping the
//! session cancels the timer and drops the device subscription.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::ipc::ServerMessage;
use crate::settings::{FieldError, FieldPath, FieldValue, ValueSet, VisibilityMode};

use super::channel::MessageChannel;
use super::commit::CommitState;
use super::engine::SyncEngine;

/// Pending presentation commands before senders wait
const COMMAND_QUEUE: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("sync session has stopped")]
    Closed,

    #[error("timed out waiting for the device to confirm the change")]
    Timeout,
}

/// What the presentation layer gets to see after every change
#[derive(Debug, Clone, PartialEq)]
pub struct DraftView {
    /// Draft fields relevant under `mode`
    pub values: ValueSet,
    pub mode: VisibilityMode,
    pub commit_state: CommitState,
    pub revision: u64,
    pub snapshots_received: u64,
    pub commits_sent: u64,
    pub echoes_received: u64,
}

impl DraftView {
    fn of<C: MessageChannel>(engine: &SyncEngine<C>) -> Self {
        Self {
            values: engine.visible_draft(),
            mode: engine.mode(),
            commit_state: engine.commit_state(),
            revision: engine.revision(),
            snapshots_received: engine.snapshots_received(),
            commits_sent: engine.commits_sent(),
            echoes_received: engine.echoes_received(),
        }
    }

    /// At least one device snapshot has been merged
    pub fn is_synced(&self) -> bool {
        self.snapshots_received > 0
    }
}

enum SessionCommand {
    SetField {
        path: FieldPath,
        value: FieldValue,
        reply: oneshot::Sender<Result<(), FieldError>>,
    },
    Shutdown,
}

/// Handle to a running session
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<DraftView>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Queue a user edit and wait for the engine's verdict
    pub async fn set_field(&self, path: FieldPath, value: FieldValue) -> Result<(), SessionError> {
        let (reply, verdict) = oneshot::channel();
        self.commands
            .send(SessionCommand::SetField { path, value, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        verdict.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    /// Apply an edit and wait until it has settled.
    ///
    /// Device fields settle once the device echoes the resulting commit.
    /// Local-only fields are stored immediately and never reach the device.
    pub async fn set_field_confirmed(
        &self,
        path: FieldPath,
        value: FieldValue,
        timeout: Duration,
    ) -> Result<DraftView, SessionError> {
        let mut view = self.subscribe();
        let echoes_before = view.borrow().echoes_received;

        self.set_field(path, value).await?;
        if path.is_local_only() {
            return Ok(self.current());
        }

        let confirmed = tokio::time::timeout(
            timeout,
            view.wait_for(|v| {
                v.echoes_received > echoes_before && v.commit_state == CommitState::Idle
            }),
        )
        .await
        .map_err(|_| SessionError::Timeout)?
        .map_err(|_| SessionError::Closed)?
        .clone();
        Ok(confirmed)
    }

    pub fn subscribe(&self) -> watch::Receiver<DraftView> {
        self.view.clone()
    }

    pub fn current(&self) -> DraftView {
        self.view.borrow().clone()
    }

    /// Stop the session and wait for its task to finish
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = ?e, "Sync session task failed");
        }
    }
}

/// Run `engine` on its own task, fed by `inbound` device messages
pub fn spawn<C>(
    engine: SyncEngine<C>,
    inbound: mpsc::UnboundedReceiver<ServerMessage>,
) -> SessionHandle
where
    C: MessageChannel + 'static,
{
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
    let (view_tx, view_rx) = watch::channel(DraftView::of(&engine));
    let task = tokio::spawn(run(engine, inbound, commands_rx, view_tx));

    SessionHandle {
        commands: commands_tx,
        view: view_rx,
        task,
    }
}

async fn run<C: MessageChannel>(
    mut engine: SyncEngine<C>,
    mut inbound: mpsc::UnboundedReceiver<ServerMessage>,
    mut commands: mpsc::Receiver<SessionCommand>,
    view: watch::Sender<DraftView>,
) {
    let mut inbound_open = true;

    loop {
        let deadline = engine.next_deadline();

        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::SetField { path, value, reply }) => {
                    let result = engine.set_field(path, value, Instant::now());
                    // Callers read the view right after the reply
                    publish(&engine, &view);
                    let _ = reply.send(result);
                }
                Some(SessionCommand::Shutdown) | None => break,
            },

            message = inbound.recv(), if inbound_open => match message {
                Some(message) => engine.handle_message(message),
                None => {
                    warn!("Device channel closed, no further snapshots will arrive");
                    inbound_open = false;
                }
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                engine.poll(Instant::now());
            }
        }

        publish(&engine, &view);
    }

    engine.shutdown();
    drop(inbound);
    info!("Sync session stopped");
}

fn publish<C: MessageChannel>(engine: &SyncEngine<C>, view: &watch::Sender<DraftView>) {
    let next = DraftView::of(engine);
    view.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryPreferences;
    use crate::ipc::{ChangeSettingsRequest, ClientMessage, SettingsResponse};
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_millis(250);

    struct ForwardingChannel(mpsc::UnboundedSender<ClientMessage>);

    impl MessageChannel for ForwardingChannel {
        fn send(&mut self, message: ClientMessage) -> anyhow::Result<()> {
            self.0
                .send(message)
                .map_err(|_| anyhow::anyhow!("test receiver dropped"))
        }
    }

    struct Harness {
        outbound: mpsc::UnboundedReceiver<ClientMessage>,
        device: mpsc::UnboundedSender<ServerMessage>,
        session: SessionHandle,
    }

    impl Harness {
        fn start() -> Self {
            let (outbound_tx, outbound) = mpsc::unbounded_channel();
            let (device, inbound) = mpsc::unbounded_channel();
            let engine = SyncEngine::start(
                ForwardingChannel(outbound_tx),
                Box::new(MemoryPreferences::default()),
                WINDOW,
            );
            Self {
                outbound,
                device,
                session: spawn(engine, inbound),
            }
        }

        async fn next_commit(&mut self) -> ChangeSettingsRequest {
            match self.outbound.recv().await {
                Some(ClientMessage::ChangeSettings(request)) => request,
                other => panic!("expected a commit, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_then_echo_sends_exactly_once() {
        let mut harness = Harness::start();
        assert_eq!(harness.outbound.recv().await, Some(ClientMessage::SettingsRequest));

        harness
            .session
            .set_field(FieldPath::FilteringAmount, FieldValue::Number(0.5))
            .await
            .unwrap();
        let commit = harness.next_commit().await;
        assert_eq!(commit.filtering.amount, 0.5);

        // Device acknowledges with its new state
        harness
            .device
            .send(ServerMessage::SettingsResponse(SettingsResponse::from_values(
                &commit.to_values(),
            )))
            .unwrap();
        let mut view = harness.session.subscribe();
        view.wait_for(|v| v.echoes_received == 1).await.unwrap();

        tokio::time::sleep(WINDOW * 20).await;
        assert!(harness.outbound.try_recv().is_err());
        assert_eq!(harness.session.current().commit_state, CommitState::Idle);
        assert_eq!(harness.session.current().commits_sent, 1);

        harness.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_coalesce() {
        let mut harness = Harness::start();
        assert_eq!(harness.outbound.recv().await, Some(ClientMessage::SettingsRequest));

        for amount in [0.2, 0.4, 0.6] {
            harness
                .session
                .set_field(FieldPath::FilteringAmount, FieldValue::Number(amount))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let commit = harness.next_commit().await;
        assert_eq!(commit.filtering.amount, 0.6);

        tokio::time::sleep(WINDOW * 20).await;
        assert!(harness.outbound.try_recv().is_err());

        harness.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsolicited_push_updates_view_without_commit() {
        let mut harness = Harness::start();
        assert_eq!(harness.outbound.recv().await, Some(ClientMessage::SettingsRequest));

        let response: SettingsResponse = serde_json::from_value(serde_json::json!({
            "steamVrTrackers": {"feet": true},
            "tapDetectionSettings": {"tapResetDelay": 0.0}
        }))
        .unwrap();
        harness
            .device
            .send(ServerMessage::SettingsResponse(response))
            .unwrap();

        let mut view = harness.session.subscribe();
        let synced = view.wait_for(|v| v.is_synced()).await.unwrap().clone();
        assert_eq!(synced.values.bool(FieldPath::TrackerFeet), Some(true));
        assert_eq!(synced.values.number(FieldPath::TapResetDelay), Some(0.2));

        tokio::time::sleep(WINDOW * 20).await;
        assert!(harness.outbound.try_recv().is_err());

        harness.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_edit_reported_to_caller() {
        let harness = Harness::start();

        let result = harness
            .session
            .set_field(FieldPath::TapResetDelay, FieldValue::Number(0.0))
            .await;
        assert!(matches!(
            result,
            Err(SessionError::Field(FieldError::InvalidFieldValue { .. }))
        ));

        harness.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_commit() {
        let mut harness = Harness::start();
        assert_eq!(harness.outbound.recv().await, Some(ClientMessage::SettingsRequest));

        harness
            .session
            .set_field(FieldPath::FloorClip, FieldValue::Bool(true))
            .await
            .unwrap();
        harness.session.shutdown().await;

        // Engine and its channel are gone; nothing was committed
        assert_eq!(harness.outbound.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_edit_waits_for_echo() {
        let Harness {
            mut outbound,
            device,
            session,
        } = Harness::start();
        assert_eq!(outbound.recv().await, Some(ClientMessage::SettingsRequest));

        let respond = async {
            match outbound.recv().await {
                Some(ClientMessage::ChangeSettings(request)) => {
                    let echo = SettingsResponse::from_values(&request.to_values());
                    device.send(ServerMessage::SettingsResponse(echo)).unwrap();
                }
                other => panic!("expected a commit, got {other:?}"),
            }
        };
        let (confirmed, ()) = tokio::join!(
            session.set_field_confirmed(
                FieldPath::FilteringAmount,
                FieldValue::Number(0.7),
                WINDOW * 4,
            ),
            respond,
        );

        let confirmed = confirmed.unwrap();
        assert_eq!(confirmed.echoes_received, 1);
        assert_eq!(confirmed.commit_state, CommitState::Idle);
        assert_eq!(confirmed.values.number(FieldPath::FilteringAmount), Some(0.7));

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_edit_times_out_without_echo() {
        let mut harness = Harness::start();
        assert_eq!(harness.outbound.recv().await, Some(ClientMessage::SettingsRequest));

        let result = harness
            .session
            .set_field_confirmed(FieldPath::FloorClip, FieldValue::Bool(true), WINDOW * 4)
            .await;
        assert_eq!(result, Err(SessionError::Timeout));
        assert!(harness.next_commit().await.model_settings.toggles.floor_clip);

        harness.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_only_edit_settles_without_device() {
        let mut harness = Harness::start();
        assert_eq!(harness.outbound.recv().await, Some(ClientMessage::SettingsRequest));

        let settled = harness
            .session
            .set_field_confirmed(FieldPath::Devmode, FieldValue::Bool(true), WINDOW * 4)
            .await
            .unwrap();
        assert!(settled.mode.advanced);
        assert_eq!(settled.values.bool(FieldPath::Devmode), Some(true));
        assert_eq!(settled.commit_state, CommitState::Idle);
        // Advanced toggles become visible once the mode flips
        assert!(settled.values.contains(FieldPath::ExtendedSpine));

        tokio::time::sleep(WINDOW * 20).await;
        assert!(harness.outbound.try_recv().is_err());

        harness.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_field_after_shutdown_is_closed() {
        let harness = Harness::start();
        let commands = harness.session.commands.clone();
        harness.session.shutdown().await;

        let (reply, _verdict) = oneshot::channel();
        let sent = commands
            .send(SessionCommand::SetField {
                path: FieldPath::FloorClip,
                value: FieldValue::Bool(true),
                reply,
            })
            .await;
        assert!(sent.is_err());
    }
}
