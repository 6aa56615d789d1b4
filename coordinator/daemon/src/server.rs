//! Daemon Server Implementation
//!
//! Hosts one face coordinator behind a Unix socket:
//! - Accepts connections and spawns a handler task per connection
//! - Translates inbound signals and submits them in the order they were read
//! - Streams render commands and telemetry to subscribed clients
//! - Shuts the coordinator down cleanly (pending timers cancelled)
//!
//! ```text
//!   voice pipeline   navigation bridge   control panel   face renderer
//!        │                  │                  │               ▲
//!        └──────────────────┴─────────┬────────┴───────────────┘
//!                                     │  frames
//!                                DaemonServer
//!                       translate + submit         render broadcast
//!                        │                                ▲
//!                        └─────> Coordinator ──> FanoutSink
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn, Instrument};

use baymax_core::adapters;
use baymax_core::transport::{read_frame, write_frame, FrameDecoder};
use baymax_core::{
    BroadcastSink, ConnectionId, ControlCommand, Coordinator, CoordinatorHandle, FaceConfig,
    FanoutSink, InboundFrame, LlmSignal, OutboundFrame, PublishedEvent, RenderCommand,
    TelemetrySink, Topic, TransportError,
};

/// How long the accept loop waits before re-checking the shutdown flag
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// How long shutdown waits for the coordinator to finish
const COORDINATOR_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-connection bookkeeping
struct ConnectionState {
    /// When the connection was established
    connected_at: Instant,
    /// Peer UID (from SO_PEERCRED)
    peer_uid: Option<u32>,
    /// Handle to abort the connection task
    abort_handle: tokio::task::AbortHandle,
}

/// Everything a connection handler needs
#[derive(Clone)]
struct ConnectionContext {
    coordinator: CoordinatorHandle,
    render: BroadcastSink,
    telemetry: Option<TelemetrySink>,
}

/// The face daemon server
pub struct DaemonServer {
    socket_path: PathBuf,
    config: FaceConfig,
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl DaemonServer {
    /// Create a server for the given configuration
    pub fn new(config: FaceConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            config,
            connection_states: Arc::new(DashMap::new()),
        }
    }

    /// Peer UID via SO_PEERCRED
    fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
        stream.peer_cred().ok().map(|cred| cred.uid())
    }

    /// Create the socket directory and remove a stale socket
    fn prepare_socket(&self) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create socket directory: {parent:?}"))?;
                info!(path = ?parent, "Created socket directory");
            }
        }

        if self.socket_path.exists() {
            warn!(path = ?self.socket_path, "Removing stale socket file");
            fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove stale socket: {:?}", self.socket_path)
            })?;
        }

        Ok(())
    }

    /// Spawn the coordinator behind a render broadcast (plus telemetry)
    fn start_coordinator(
        &self,
    ) -> (
        ConnectionContext,
        tokio::task::JoinHandle<baymax_core::CoordinatorSession>,
    ) {
        let render = BroadcastSink::new(self.config.render_capacity);
        let telemetry = self
            .config
            .telemetry_enabled
            .then(|| TelemetrySink::new(self.config.render_capacity));

        let mut sink = FanoutSink::new().with(render.clone());
        if let Some(ref telemetry) = telemetry {
            sink = sink.with(telemetry.clone());
        }

        let (coordinator, task) = Coordinator::spawn(self.config.coordinator.clone(), sink);

        let context = ConnectionContext {
            coordinator,
            render,
            telemetry,
        };
        (context, task)
    }

    /// Run until `shutdown` is set
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        self.prepare_socket()?;

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind to {:?}", self.socket_path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.socket_path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict {:?}", self.socket_path))?;
        }

        info!(path = ?self.socket_path, "Listening for connections");

        let (context, coordinator_task) = self.start_coordinator();
        // SAFETY: getuid has no preconditions and cannot fail
        let our_uid = unsafe { libc::getuid() };

        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping accept loop");
                break;
            }

            let (stream, _addr) = match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await
            {
                Ok(Ok(accepted)) => accepted,
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                    continue;
                }
                Err(_) => continue,
            };

            if self.connection_states.len() >= self.config.max_connections {
                warn!(
                    max_connections = self.config.max_connections,
                    "Connection limit reached, rejecting new connection"
                );
                continue;
            }

            let peer_uid = Self::get_peer_uid(&stream);
            if let Some(uid) = peer_uid {
                if uid != our_uid && uid != 0 {
                    warn!(peer_uid = uid, our_uid, "Rejecting connection from different user");
                    continue;
                }
            }

            let conn_id = ConnectionId::new();
            info!(
                conn_id = %conn_id,
                peer_uid = ?peer_uid,
                active_connections = self.connection_states.len() + 1,
                "New connection accepted"
            );

            let task = tokio::spawn(
                Self::handle_connection(
                    conn_id,
                    stream,
                    context.clone(),
                    Arc::clone(&self.connection_states),
                )
                .instrument(tracing::info_span!("connection", %conn_id)),
            );

            self.connection_states.insert(
                conn_id,
                ConnectionState {
                    connected_at: Instant::now(),
                    peer_uid,
                    abort_handle: task.abort_handle(),
                },
            );
        }

        self.shutdown(context, coordinator_task).await
    }

    /// Serve one client until it disconnects
    async fn handle_connection(
        conn_id: ConnectionId,
        stream: UnixStream,
        context: ConnectionContext,
        connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
    ) {
        debug!("Connection handler started");

        let (mut reader, mut writer) = stream.into_split();
        let mut decoder = FrameDecoder::new();
        let mut render_rx: Option<broadcast::Receiver<RenderCommand>> = None;
        let mut events_rx: Option<broadcast::Receiver<PublishedEvent>> = None;

        loop {
            let outbound = tokio::select! {
                inbound = read_frame::<InboundFrame, _>(&mut reader, &mut decoder) => {
                    match inbound {
                        Ok(frame) => {
                            Self::route_frame(frame, &context, &mut render_rx, &mut events_rx).await
                        }
                        Err(TransportError::ConnectionClosed) => {
                            info!("Client disconnected (EOF)");
                            break;
                        }
                        Err(e @ (TransportError::ChecksumMismatch { .. }
                        | TransportError::Serialization(_))) => {
                            warn!(error = %e, "Dropping malformed frame");
                            None
                        }
                        Err(e) => {
                            warn!(error = %e, "Closing connection");
                            break;
                        }
                    }
                }

                command = recv_topic(&mut render_rx) => {
                    match command {
                        Ok(command) => Some(OutboundFrame::Render { command }),
                        Err(e) => Self::on_topic_error(e, Topic::Render, &mut render_rx),
                    }
                }

                event = recv_topic(&mut events_rx) => {
                    match event {
                        Ok(event) => Some(OutboundFrame::Event { event }),
                        Err(e) => Self::on_topic_error(e, Topic::Events, &mut events_rx),
                    }
                }
            };

            if let Some(frame) = outbound {
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    error!(error = %e, "Write error");
                    break;
                }
            }
        }

        let _ = writer.shutdown().await;
        if let Some((_, state)) = connection_states.remove(&conn_id) {
            debug!(
                uptime_secs = state.connected_at.elapsed().as_secs(),
                "Connection state released"
            );
        }
        info!(
            active_connections = connection_states.len(),
            "Connection handler finished"
        );
    }

    /// Apply one inbound frame, returning an immediate reply if there is one
    ///
    /// Signals are submitted before the next frame is read, so one client's
    /// signals reach the coordinator in the order they were sent.
    async fn route_frame(
        frame: InboundFrame,
        context: &ConnectionContext,
        render_rx: &mut Option<broadcast::Receiver<RenderCommand>>,
        events_rx: &mut Option<broadcast::Receiver<PublishedEvent>>,
    ) -> Option<OutboundFrame> {
        let event = match frame {
            InboundFrame::Llm { signal, payload } => {
                let signal = LlmSignal {
                    name: signal,
                    payload,
                };
                let event = adapters::llm::translate(&signal);
                if event.is_none() {
                    warn!(signal = %signal.name, "Dropping unrecognized LLM signal");
                }
                event
            }
            InboundFrame::Navigation { state } => Some(adapters::navigation::translate(state)),
            InboundFrame::Control { command, argument } => {
                let command = ControlCommand { command, argument };
                let event = adapters::manual::translate(&command);
                if event.is_none() {
                    warn!(
                        command = %command.command,
                        has_argument = command.argument.is_some(),
                        "Dropping invalid control command"
                    );
                }
                event
            }
            InboundFrame::Subscribe { topics } => {
                for topic in topics {
                    match topic {
                        Topic::Render => {
                            render_rx.get_or_insert_with(|| context.render.subscribe());
                        }
                        Topic::Events => match context.telemetry {
                            Some(ref telemetry) => {
                                events_rx.get_or_insert_with(|| telemetry.subscribe());
                            }
                            None => warn!("Telemetry disabled, ignoring events subscription"),
                        },
                    }
                    debug!(?topic, "Subscribed");
                }
                return None;
            }
            InboundFrame::Status => {
                return match context.coordinator.query_snapshot().await {
                    Ok(snapshot) => Some(OutboundFrame::Status { snapshot }),
                    Err(e) => {
                        warn!(error = %e, "Status query failed");
                        None
                    }
                };
            }
        };

        let event = event?;
        debug!(kind = event.kind(), "Submitting event");
        if context.coordinator.submit(event).await.is_err() {
            warn!("Coordinator stopped, dropping signal");
        }
        None
    }

    fn on_topic_error<T>(
        error: broadcast::error::RecvError,
        topic: Topic,
        rx: &mut Option<broadcast::Receiver<T>>,
    ) -> Option<OutboundFrame> {
        match error {
            broadcast::error::RecvError::Lagged(skipped) => {
                warn!(?topic, skipped, "Client lagging, frames dropped");
            }
            broadcast::error::RecvError::Closed => {
                debug!(?topic, "Topic closed");
                *rx = None;
            }
        }
        None
    }

    /// Abort connections, stop the coordinator, remove the socket
    async fn shutdown(
        &mut self,
        context: ConnectionContext,
        coordinator_task: tokio::task::JoinHandle<baymax_core::CoordinatorSession>,
    ) -> Result<()> {
        info!("Initiating graceful shutdown");

        let conn_ids: Vec<ConnectionId> = self.connection_states.iter().map(|r| *r.key()).collect();
        for conn_id in conn_ids {
            if let Some((_, state)) = self.connection_states.remove(&conn_id) {
                info!(
                    conn_id = %conn_id,
                    peer_uid = ?state.peer_uid,
                    uptime_secs = state.connected_at.elapsed().as_secs(),
                    "Aborting connection"
                );
                state.abort_handle.abort();
            }
        }

        if context.coordinator.shutdown().await.is_err() {
            debug!("Coordinator already stopped");
        }
        drop(context);

        match tokio::time::timeout(COORDINATOR_STOP_TIMEOUT, coordinator_task).await {
            Ok(Ok(session)) => info!(
                state = %session.current_state(),
                status = %session.status(),
                "Coordinator stopped"
            ),
            Ok(Err(e)) => error!(error = %e, "Coordinator task failed"),
            Err(_) => warn!("Coordinator did not stop in time"),
        }

        if self.socket_path.exists() {
            fs::remove_file(&self.socket_path)
                .with_context(|| format!("Failed to remove socket: {:?}", self.socket_path))?;
            info!(path = ?self.socket_path, "Socket file removed");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Number of active connections
    pub fn connection_count(&self) -> usize {
        self.connection_states.len()
    }
}

/// Receive from a subscription, or wait forever if there is none
async fn recv_topic<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
