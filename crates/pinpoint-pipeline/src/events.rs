//! In-process domain events.

use tokio::sync::broadcast;
use tracing::debug;

use pinpoint_models::Post;

/// Published once a post and its stats record are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PostCreated {
    pub post: Post,
}

/// Fire-and-forget broadcast of [`PostCreated`] events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PostCreated>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PostCreated> {
        self.sender.subscribe()
    }

    /// Publish an event; dropped when nobody is listening.
    pub fn publish(&self, event: PostCreated) {
        let post_id = event.post.id.clone();
        match self.sender.send(event) {
            Ok(receivers) => debug!(post_id = %post_id, receivers, "Published post created event"),
            Err(_) => debug!(post_id = %post_id, "No listeners for post created event"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
