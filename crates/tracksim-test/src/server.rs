//! Simulated positions server
//!
//! Accepts any number of subscribers on the pub port and command clients on
//! the cmd port. Recorded poses are acknowledged and re-broadcast to every
//! subscriber, the way the real server does.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use tracksim_core::{EntityKey, TimestampedPose, TrackResult};
use tracksim_runtime::ClientConfig;
use tracksim_transport::{read_message, write_message};
use tracksim_wire::Message;

// ============================================================================
// SHARED STATE
// ============================================================================

struct ServerState {
    poses: Mutex<BTreeMap<EntityKey, TimestampedPose>>,
    recorded: Mutex<Vec<(EntityKey, TimestampedPose)>>,
    rejected_keys: Mutex<HashSet<EntityKey>>,
    reply_delay: Mutex<Duration>,
    updates: broadcast::Sender<Message>,
    subscribers: AtomicUsize,
    subscribed: Notify,
}

impl ServerState {
    fn publish(&self, key: EntityKey, pose: TimestampedPose) {
        self.poses.lock().insert(key.clone(), pose.clone());
        // no subscribers is fine
        let _ = self.updates.send(Message::PoseUpdate { key, pose });
    }
}

// ============================================================================
// SERVER
// ============================================================================

/// In-process positions server bound to ephemeral localhost ports
pub struct SimulatedPoseServer {
    pub_addr: SocketAddr,
    cmd_addr: SocketAddr,
    state: Arc<ServerState>,
    tasks: Vec<JoinHandle<()>>,
}

impl SimulatedPoseServer {
    pub async fn start() -> TrackResult<Self> {
        let pub_listener = TcpListener::bind("127.0.0.1:0").await?;
        let cmd_listener = TcpListener::bind("127.0.0.1:0").await?;
        let pub_addr = pub_listener.local_addr()?;
        let cmd_addr = cmd_listener.local_addr()?;

        let (updates, _) = broadcast::channel(1024);
        let state = Arc::new(ServerState {
            poses: Mutex::new(BTreeMap::new()),
            recorded: Mutex::new(Vec::new()),
            rejected_keys: Mutex::new(HashSet::new()),
            reply_delay: Mutex::new(Duration::ZERO),
            updates,
            subscribers: AtomicUsize::new(0),
            subscribed: Notify::new(),
        });

        let tasks = vec![
            tokio::spawn(accept_subscribers(pub_listener, Arc::clone(&state))),
            tokio::spawn(accept_commanders(cmd_listener, Arc::clone(&state))),
        ];
        tracing::debug!(%pub_addr, %cmd_addr, "simulated positions server started");

        Ok(SimulatedPoseServer {
            pub_addr,
            cmd_addr,
            state,
            tasks,
        })
    }

    pub fn pub_port(&self) -> u16 {
        self.pub_addr.port()
    }

    pub fn cmd_port(&self) -> u16 {
        self.cmd_addr.port()
    }

    /// Client configuration pointing at this server
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            host: self.pub_addr.ip().to_string(),
            pub_port: self.pub_port(),
            cmd_port: self.cmd_port(),
            connect_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        }
    }

    /// Broadcast a pose as if a tracker reported it
    pub fn publish(&self, key: impl Into<EntityKey>, pose: TimestampedPose) {
        self.state.publish(key.into(), pose);
    }

    /// Broadcast several poses back to back
    pub fn publish_batch(&self, poses: Vec<(EntityKey, TimestampedPose)>) {
        for (key, pose) in poses {
            self.state.publish(key, pose);
        }
    }

    /// Refuse every future record command for `key`
    pub fn reject_key(&self, key: impl Into<EntityKey>) {
        self.state.rejected_keys.lock().insert(key.into());
    }

    /// Hold every reply for `delay`
    pub fn set_reply_delay(&self, delay: Duration) {
        *self.state.reply_delay.lock() = delay;
    }

    /// Every accepted record command, in arrival order
    pub fn recorded(&self) -> Vec<(EntityKey, TimestampedPose)> {
        self.state.recorded.lock().clone()
    }

    pub fn latest(&self, key: &EntityKey) -> Option<TimestampedPose> {
        self.state.poses.lock().get(key).cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.subscribers.load(Ordering::Acquire)
    }

    /// Wait until at least `count` subscribers are streaming
    pub async fn wait_for_subscribers(&self, count: usize) {
        loop {
            let notified = self.state.subscribed.notified();
            if self.subscriber_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for SimulatedPoseServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

// ============================================================================
// CONNECTION HANDLERS
// ============================================================================

async fn accept_subscribers(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                tracing::debug!(%peer, "subscriber connected");
                tokio::spawn(serve_subscriber(socket, Arc::clone(&state)));
            }
            Err(e) => {
                tracing::warn!("accept failed on pub port: {}", e);
                break;
            }
        }
    }
}

async fn serve_subscriber(mut socket: TcpStream, state: Arc<ServerState>) {
    let mut updates = state.updates.subscribe();
    let current: Vec<_> = state
        .poses
        .lock()
        .iter()
        .map(|(k, p)| (k.clone(), p.clone()))
        .collect();

    for (key, pose) in current {
        if write_message(&mut socket, &Message::PoseUpdate { key, pose })
            .await
            .is_err()
        {
            return;
        }
    }

    state.subscribers.fetch_add(1, Ordering::AcqRel);
    state.subscribed.notify_waiters();

    loop {
        match updates.recv().await {
            Ok(message) => {
                if write_message(&mut socket, &message).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("subscriber lagged, {} updates dropped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    state.subscribers.fetch_sub(1, Ordering::AcqRel);
}

async fn accept_commanders(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                tracing::debug!(%peer, "command client connected");
                tokio::spawn(serve_commands(socket, Arc::clone(&state)));
            }
            Err(e) => {
                tracing::warn!("accept failed on cmd port: {}", e);
                break;
            }
        }
    }
}

async fn serve_commands(mut socket: TcpStream, state: Arc<ServerState>) {
    loop {
        let message = match read_message(&mut socket).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("bad command frame: {}", e);
                break;
            }
        };

        let reply = match message {
            Message::RecordPose { seq, key, pose } => {
                let delay = *state.reply_delay.lock();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                if state.rejected_keys.lock().contains(&key) {
                    Message::Reject {
                        seq,
                        reason: format!("{} is not writable", key),
                    }
                } else {
                    state.recorded.lock().push((key.clone(), pose.clone()));
                    state.publish(key, pose);
                    Message::Ack { seq }
                }
            }
            other => {
                tracing::warn!("unexpected {:?} on command channel", other.kind());
                continue;
            }
        };

        if write_message(&mut socket, &reply).await.is_err() {
            break;
        }
    }
}
