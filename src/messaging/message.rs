//! Wire message and the transport seams it travels through.

use crate::error::MessagingError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message as handed to or received from the queue client: text body plus string properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub destination: String,
    pub timestamp: DateTime<Utc>,
    pub body: String,
    #[serde(default)]
    properties: IndexMap<String, String>,
}

impl Message {
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Message {
            id: Uuid::new_v4(),
            destination: destination.into(),
            timestamp: Utc::now(),
            body: body.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn set_string_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.properties
    }
}

/// Outbound half of the queue client.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), MessagingError>;
}

/// Inbound half of the queue client. `Ok(None)` means the source is closed.
#[async_trait]
pub trait MessageReceiver: Send {
    async fn receive(&mut self) -> Result<Option<Message>, MessagingError>;
}

/// Application code handling received messages.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: Message) -> Result<(), MessagingError>;
}
