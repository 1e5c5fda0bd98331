//! Positions client - the networked pose store
//!
//! Two TCP connections to the positions server:
//!
//! - Pub: the server pushes `PoseUpdate` frames; bursts are drained into a
//!   single cache update
//! - Cmd: `RecordPose` requests answered by `Ack`/`Reject`, one in flight at
//!   a time, matched by sequence number
//!
//! A record command mutates the local cache only after its ack arrives, and
//! only in the caller's own future.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use tracksim_core::{EntityKey, TimestampedPose, TrackError, TrackResult};
use tracksim_state::{PoseCache, PoseStore};
use tracksim_transport::{connect, start_receive_loop, write_message, MessageReceiver};
use tracksim_wire::Message;

use crate::ClientConfig;

struct CommandRequest {
    key: EntityKey,
    pose: TimestampedPose,
    reply: oneshot::Sender<TrackResult<()>>,
}

/// Pose store backed by a positions server
pub struct PositionsClient {
    cache: Arc<PoseCache>,
    commands: mpsc::Sender<CommandRequest>,
    runtime: Handle,
    tasks: Vec<JoinHandle<()>>,
}

impl PositionsClient {
    /// Connect both channels. No retry: an unreachable server is a
    /// `Connection` error.
    pub async fn connect(config: &ClientConfig) -> TrackResult<Self> {
        let pub_addr = config.pub_addr();
        let cmd_addr = config.cmd_addr();

        let pub_stream = connect(&pub_addr, config.connect_timeout).await?;
        let cmd_stream = connect(&cmd_addr, config.connect_timeout).await?;
        tracing::info!("Connected to positions server (pub {}, cmd {})", pub_addr, cmd_addr);

        let cache = Arc::new(PoseCache::new());

        let (updates, pub_reader) = start_receive_loop(pub_stream, config.receive_buffer);
        let ingest = tokio::spawn(ingest_loop(updates, Arc::clone(&cache)));

        let (cmd_read, cmd_write) = cmd_stream.into_split();
        let (replies, cmd_reader) = start_receive_loop(cmd_read, config.command_queue.max(1));
        let (commands, requests) = mpsc::channel(config.command_queue.max(1));
        let dispatcher = tokio::spawn(command_loop(
            cmd_write,
            replies,
            requests,
            config.command_timeout,
        ));

        Ok(PositionsClient {
            cache,
            commands,
            runtime: Handle::current(),
            tasks: vec![pub_reader, ingest, cmd_reader, dispatcher],
        })
    }

    /// False once either channel has shut down
    pub fn is_connected(&self) -> bool {
        self.tasks.iter().all(|t| !t.is_finished())
    }
}

impl PoseStore for PositionsClient {
    fn cache(&self) -> &PoseCache {
        &self.cache
    }

    fn record_pose(
        &self,
        key: EntityKey,
        pose: TimestampedPose,
    ) -> impl Future<Output = TrackResult<()>> + Send {
        async move {
            let seen = self.cache.revision(&key);
            let (reply, response) = oneshot::channel();
            let request = CommandRequest {
                key: key.clone(),
                pose: pose.clone(),
                reply,
            };
            self.commands
                .send(request)
                .await
                .map_err(|_| TrackError::CommandChannelClosed)?;

            response
                .await
                .map_err(|_| TrackError::CommandChannelClosed)??;

            // a broadcast that landed while the command was in flight is newer
            if !self.cache.apply_unless_superseded(key.clone(), pose, seen) {
                tracing::debug!("Confirmed pose for {} already superseded", key);
            }
            Ok(())
        }
    }

    fn record_pose_blocking(&self, key: EntityKey, pose: TimestampedPose) -> TrackResult<()> {
        match Handle::try_current() {
            Ok(handle) => {
                if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
                    return Err(TrackError::TransportError(
                        "blocking record needs a multi-thread runtime".into(),
                    ));
                }
                tokio::task::block_in_place(|| handle.block_on(self.record_pose(key, pose)))
            }
            Err(_) => self.runtime.block_on(self.record_pose(key, pose)),
        }
    }
}

impl Drop for PositionsClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn ingest_loop(mut updates: MessageReceiver, cache: Arc<PoseCache>) {
    while let Some(first) = updates.recv().await {
        let mut batch = Vec::new();
        push_update(&mut batch, first);
        while let Ok(next) = updates.try_recv() {
            push_update(&mut batch, next);
        }
        cache.apply(batch);
    }
    tracing::debug!("pose subscription ended");
}

fn push_update(batch: &mut Vec<(EntityKey, TimestampedPose)>, message: Message) {
    match message {
        Message::PoseUpdate { key, pose } => batch.push((key, pose)),
        other => tracing::warn!("Unexpected {:?} on pose subscription", other.kind()),
    }
}

async fn command_loop(
    mut writer: OwnedWriteHalf,
    mut replies: MessageReceiver,
    mut requests: mpsc::Receiver<CommandRequest>,
    timeout: Duration,
) {
    let mut seq: u32 = 0;
    while let Some(request) = requests.recv().await {
        if request.reply.is_closed() {
            tracing::debug!("Skipping cancelled command for {}", request.key);
            continue;
        }
        seq = seq.wrapping_add(1);

        let result = exchange(&mut writer, &mut replies, seq, &request, timeout).await;
        let lost = matches!(result, Err(TrackError::TransportError(_)));
        if let Err(e) = &result {
            tracing::warn!("Record command for {} failed: {}", request.key, e);
        }
        let _ = request.reply.send(result);
        if lost {
            break;
        }
    }
    tracing::debug!("command channel closed");
}

async fn exchange(
    writer: &mut OwnedWriteHalf,
    replies: &mut MessageReceiver,
    seq: u32,
    request: &CommandRequest,
    timeout: Duration,
) -> TrackResult<()> {
    let message = Message::RecordPose {
        seq,
        key: request.key.clone(),
        pose: request.pose.clone(),
    };
    write_message(writer, &message).await?;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, replies.recv()).await {
            Err(_) => {
                return Err(TrackError::CommandTimeout {
                    key: request.key.clone(),
                    after: timeout,
                })
            }
            Ok(None) => {
                return Err(TrackError::TransportError(
                    "command channel closed by server".into(),
                ))
            }
            Ok(Some(Message::Ack { seq: acked })) if acked == seq => return Ok(()),
            Ok(Some(Message::Reject {
                seq: rejected,
                reason,
            })) if rejected == seq => {
                return Err(TrackError::CommandRejected {
                    key: request.key.clone(),
                    reason,
                })
            }
            // reply to a command that already timed out
            Ok(Some(stale)) => tracing::debug!(seq = stale.seq(), "discarding stale reply"),
        }
    }
}
