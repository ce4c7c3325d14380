//! In-process queue over a tokio channel.

use crate::error::MessagingError;
use crate::messaging::{Message, MessageReceiver, MessageSender};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Bounded in-process queue. The receiver reports closed once every sender is dropped.
pub fn queue(capacity: usize) -> (MemorySender, MemoryReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (MemorySender { tx }, MemoryReceiver { rx })
}

#[derive(Clone)]
pub struct MemorySender {
    tx: mpsc::Sender<Message>,
}

#[async_trait]
impl MessageSender for MemorySender {
    async fn send(&self, message: Message) -> Result<(), MessagingError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| MessagingError::Transport("queue closed".into()))
    }
}

pub struct MemoryReceiver {
    rx: mpsc::Receiver<Message>,
}

#[async_trait]
impl MessageReceiver for MemoryReceiver {
    async fn receive(&mut self) -> Result<Option<Message>, MessagingError> {
        Ok(self.rx.recv().await)
    }
}
