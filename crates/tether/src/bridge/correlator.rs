//! Request/reply correlation over a shared duplex channel.
//!
//! Each [`send_command`](RequestCorrelator::send_command) registers a pending
//! entry keyed by a fresh id, pushes one `tool_call` onto the outbound
//! channel, and suspends until exactly one terminal transition:
//!
//! - a matching reply arrives through
//!   [`handle_response`](RequestCorrelator::handle_response),
//! - the per-call timeout elapses,
//! - the entry is cancelled ([`cancel`](RequestCorrelator::cancel) or
//!   [`cancel_all`](RequestCorrelator::cancel_all)).
//!
//! Every transition removes the entry from the map under the map's lock, and
//! delivery through the oneshot slot happens while that lock is held. The
//! first transition for an id wins; later ones find no entry and are no-ops.
//! Replies may arrive in any order and from any task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::friendly::friendly_message;
use super::protocol::{OutboundMessage, Reply, TOOL_RESPONSE, message_type};
use crate::error::CommandError;

/// Default per-call timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline used when `now + timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelatorConfig {
    pub command_timeout: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl CorrelatorConfig {
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// What [`RequestCorrelator::handle_response`] did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// Delivered to the waiting caller.
    Resolved,
    /// Matched an entry whose caller had already stopped waiting. Discarded.
    CallerGone,
    /// No pending entry for the id (duplicate, late, or foreign reply).
    Unknown,
    /// The message carried no id.
    MissingId,
    /// Not a `tool_response`, or not JSON at all.
    Ignored,
}

enum Resolution {
    Reply(Result<Value, String>),
    Cancelled,
}

struct Pending {
    command: String,
    dispatched_at: Instant,
    slot: oneshot::Sender<Resolution>,
}

type PendingMap = HashMap<String, Pending>;

/// Matches executor replies to the tasks awaiting them.
///
/// Cheap to clone; clones share the pending map and the outbound channel.
#[derive(Clone)]
pub struct RequestCorrelator {
    outbound: mpsc::Sender<OutboundMessage>,
    pending: Arc<Mutex<PendingMap>>,
    config: CorrelatorConfig,
}

impl RequestCorrelator {
    /// Create a correlator writing `tool_call` messages to `outbound`. The
    /// transport owns the receiving half.
    pub fn new(outbound: mpsc::Sender<OutboundMessage>, config: CorrelatorConfig) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Send a command and wait for its reply, using the configured timeout.
    pub async fn send_command(&self, command: &str, params: Value) -> Result<Value, CommandError> {
        self.send_command_with_timeout(command, params, self.config.command_timeout)
            .await
    }

    /// Send a command and wait at most `timeout`, measured from dispatch.
    pub async fn send_command_with_timeout(
        &self,
        command: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CommandError> {
        let deadline = deadline_after(timeout);
        let (slot, mut rx) = oneshot::channel();
        let id = self.register(command, slot);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        let message = OutboundMessage::ToolCall {
            id: id.clone(),
            command: command.to_string(),
            params: params.clone(),
        };
        match tokio::time::timeout_at(deadline, self.outbound.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                warn!("Outbound channel closed; dropping command '{command}' ({id})");
                return Err(CommandError::ChannelClosed {
                    command: command.to_string(),
                });
            }
            Err(_) => return self.expire(&id, command, params, timeout, &mut rx),
        }
        debug!("Dispatched '{command}' ({id})");

        let resolution = match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Resolution::Cancelled,
            Err(_) => return self.expire(&id, command, params, timeout, &mut rx),
        };
        self.finish(&id, command, params, resolution)
    }

    /// Feed one inbound message. Never fails; anything that cannot be
    /// matched is logged and dropped.
    pub fn handle_response(&self, message: &Value) -> ReplyDisposition {
        let Some(reply) = Reply::from_value(message) else {
            warn!("Ignoring reply without an id");
            return ReplyDisposition::MissingId;
        };

        let mut pending = self.lock();
        let Some(entry) = pending.remove(&reply.id) else {
            warn!(
                "No pending command for reply {} (duplicate, late, or unknown)",
                reply.id
            );
            return ReplyDisposition::Unknown;
        };
        let elapsed = entry.dispatched_at.elapsed();
        if entry.slot.send(Resolution::Reply(reply.payload)).is_err() {
            trace!("Caller for '{}' ({}) stopped waiting", entry.command, reply.id);
            return ReplyDisposition::CallerGone;
        }
        debug!(
            "Resolved '{}' ({}) after {}ms",
            entry.command,
            reply.id,
            elapsed.as_millis()
        );
        ReplyDisposition::Resolved
    }

    /// Feed one raw inbound frame. Frames that are not `tool_response`
    /// messages are ignored.
    pub fn handle_text(&self, text: &str) -> ReplyDisposition {
        let Ok(message) = serde_json::from_str::<Value>(text) else {
            debug!("Ignoring malformed inbound frame");
            return ReplyDisposition::Ignored;
        };
        match message_type(&message) {
            Some(kind) if kind != TOOL_RESPONSE => {
                debug!("Ignoring inbound '{kind}' message");
                ReplyDisposition::Ignored
            }
            _ => self.handle_response(&message),
        }
    }

    /// Cancel every pending command. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut pending = self.lock();
        let count = pending.len();
        for (_, entry) in pending.drain() {
            let _ = entry.slot.send(Resolution::Cancelled);
        }
        if count > 0 {
            info!("Cancelled {count} pending commands");
        }
        count
    }

    /// Cancel one pending command. Returns `false` if it was not pending.
    pub fn cancel(&self, id: &str) -> bool {
        match self.lock().remove(id) {
            Some(entry) => {
                let _ = entry.slot.send(Resolution::Cancelled);
                debug!("Cancelled '{}' ({id})", entry.command);
                true
            }
            None => false,
        }
    }

    /// Whether `id` is still awaiting a terminal transition. Transports use
    /// this to skip queued calls whose caller already gave up.
    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Ids of pending commands, sorted.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    // ── Internals ──

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, command: &str, slot: oneshot::Sender<Resolution>) -> String {
        let mut pending = self.lock();
        let id = loop {
            let id = Uuid::new_v4().to_string();
            if !pending.contains_key(&id) {
                break id;
            }
        };
        pending.insert(
            id.clone(),
            Pending {
                command: command.to_string(),
                dispatched_at: Instant::now(),
                slot,
            },
        );
        id
    }

    /// Timer fired. If another transition removed the entry first, its
    /// resolution is already in the slot and wins.
    fn expire(
        &self,
        id: &str,
        command: &str,
        params: Value,
        timeout: Duration,
        rx: &mut oneshot::Receiver<Resolution>,
    ) -> Result<Value, CommandError> {
        if self.lock().remove(id).is_some() {
            warn!(
                "Command '{command}' ({id}) timed out after {}s",
                timeout.as_secs_f64()
            );
            return Err(CommandError::Timeout {
                id: id.to_string(),
                command: command.to_string(),
                after: timeout,
            });
        }
        let resolution = rx.try_recv().unwrap_or(Resolution::Cancelled);
        self.finish(id, command, params, resolution)
    }

    fn finish(
        &self,
        id: &str,
        command: &str,
        params: Value,
        resolution: Resolution,
    ) -> Result<Value, CommandError> {
        match resolution {
            Resolution::Reply(Ok(result)) => Ok(result),
            Resolution::Reply(Err(raw)) => Err(CommandError::RemoteExecution {
                command: command.to_string(),
                params,
                message: friendly_message(&raw),
                raw,
            }),
            Resolution::Cancelled => Err(CommandError::Cancelled {
                id: id.to_string(),
                command: command.to_string(),
            }),
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Removes the pending entry when the caller's future is dropped before a
/// terminal transition.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingMap>,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.remove(self.id).is_some() {
            trace!("Dropped pending entry {} for an abandoned call", self.id);
        }
    }
}
