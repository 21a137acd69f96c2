//! Chat hub: fan-out of chat lines to every subscribed session.
//!
//! One feed for the whole server, decoupled from game phase. Each
//! subscriber gets their own unbounded queue, so a slow consumer never
//! stalls delivery to the others, and per-subscriber order always
//! matches publish order. There is no replay: a new subscriber sees
//! only lines published after they attached.

use std::collections::HashMap;

use mafia_protocol::ChatMessage;
use tokio::sync::mpsc;

/// Channel sender delivering chat lines to one subscriber.
pub type ChatSender = mpsc::UnboundedSender<ChatMessage>;

/// The server-wide chat feed.
///
/// Not internally synchronized; the server wraps it in a mutex, and
/// publishing under that lock is what serializes the feed's order.
#[derive(Default)]
pub struct ChatBroadcaster {
    subscribers: HashMap<u64, ChatSender>,
}

impl ChatBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a subscriber under the caller's session id.
    /// Re-subscribing replaces the previous queue.
    pub fn subscribe(&mut self, session: u64, sender: ChatSender) {
        self.subscribers.insert(session, sender);
        tracing::debug!(session, subscribers = self.subscribers.len(), "chat subscribed");
    }

    /// Detaches a subscriber. Their undelivered queue is discarded with
    /// the receiving half; nobody else's delivery is affected.
    pub fn unsubscribe(&mut self, session: u64) {
        self.subscribers.remove(&session);
    }

    /// Delivers a line to every live subscriber, dropping the ones whose
    /// receiving half is gone.
    pub fn publish(&mut self, msg: ChatMessage) {
        self.subscribers
            .retain(|_, sender| sender.send(msg.clone()).is_ok());
        tracing::debug!(
            from = %msg.player_name,
            subscribers = self.subscribers.len(),
            "chat published"
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
