use {
    crate::domain::id::UserId,
    std::{
        collections::HashMap,
        sync::{
            Arc, Mutex, MutexGuard, PoisonError,
            atomic::{AtomicU64, Ordering},
        },
    },
    tokio::sync::{
        Notify,
        mpsc::{self, error::TryRecvError},
    },
};

/// Frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    Text(String),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub struct ConnectionId(u64);

/// Sending half of a push connection. The socket task owns the receiver;
/// once the last sender is gone its queue ends and the task shuts the socket.
#[derive(Debug, Clone)]
pub struct PushChannel {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<PushFrame>,
    evicted: Arc<Notify>,
}

impl PushChannel {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn push(&self, payload: &str) -> bool {
        self.tx.send(PushFrame::Text(payload.to_owned())).is_ok()
    }

    fn close(self) {
        // A closed receiver means the socket task already exited.
        let _ = self.tx.send(PushFrame::Close);
        // Stored as a permit if the socket task is not waiting yet.
        self.evicted.notify_one();
    }
}

/// Receiving half, owned by the socket task.
#[derive(Debug)]
pub struct PushReceiver {
    frames: mpsc::UnboundedReceiver<PushFrame>,
    evicted: Arc<Notify>,
}

impl PushReceiver {
    pub async fn recv(&mut self) -> Option<PushFrame> {
        self.frames.recv().await
    }

    pub fn try_recv(&mut self) -> Result<PushFrame, TryRecvError> {
        self.frames.try_recv()
    }

    pub fn eviction(&self) -> Eviction {
        Eviction(Arc::clone(&self.evicted))
    }
}

/// Fires once the registry has dropped a connection. Unlike the queued
/// `Close` frame, it is observed even while a socket write is stuck.
#[derive(Debug, Clone)]
pub struct Eviction(Arc<Notify>);

impl Eviction {
    pub async fn wait(&self) {
        self.0.notified().await
    }
}

/// User → single live push channel.
///
/// Every method takes the one internal lock for a map update only; frames are
/// handed to an in-memory queue, so no socket I/O ever happens under the lock.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    channels: Mutex<HashMap<UserId, PushChannel>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh channel pair; the receiver belongs to the socket task.
    pub fn open_channel(&self) -> (PushChannel, PushReceiver) {
        let (tx, frames) = mpsc::unbounded_channel();
        let evicted = Arc::new(Notify::new());
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        (
            PushChannel {
                id,
                tx,
                evicted: Arc::clone(&evicted),
            },
            PushReceiver { frames, evicted },
        )
    }

    /// Installs `channel` for `user`, closing whatever was there before.
    pub fn register(&self, user: UserId, channel: PushChannel) {
        let evicted = self.lock().insert(user, channel);
        if let Some(old) = evicted {
            tracing::info!(
                user_id = %user,
                connection = %old.id(),
                "evicting stale push connection"
            );
            old.close();
        }
    }

    /// Removes the entry only if it still belongs to `connection`.
    pub fn unregister(&self, user: UserId, connection: ConnectionId) -> bool {
        let mut channels = self.lock();
        match channels.get(&user) {
            Some(current) if current.id() == connection => {
                channels.remove(&user);
                true
            }
            _ => false,
        }
    }

    /// Queues `payload` for `user`. Offline users are not an error.
    pub fn send(&self, user: UserId, payload: &str) -> bool {
        let mut channels = self.lock();
        let Some(channel) = channels.get(&user) else {
            tracing::debug!(user_id = %user, "push skipped, user offline");
            return false;
        };

        if channel.push(payload) {
            return true;
        }

        tracing::warn!(
            user_id = %user,
            connection = %channel.id(),
            "push channel closed, evicting"
        );
        if let Some(dead) = channels.remove(&user) {
            dead.close();
        }
        false
    }

    pub fn is_connected(&self, user: UserId) -> bool {
        self.lock().contains_key(&user)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, PushChannel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
