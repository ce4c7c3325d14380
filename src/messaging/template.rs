//! Outbound side: convert a payload, copy caller properties onto it, send.

use crate::error::MessagingError;
use crate::messaging::{Message, MessageSender};
use crate::tenant::{current_tenant, DEFAULT_TENANT, PROJECT_ID_HEADER};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Caller-supplied message properties. A JSON `null` is a present-but-null property.
pub type MessageProperties = IndexMap<String, Value>;

/// Turns an application payload into a wire message.
pub trait MessageConverter<T: ?Sized>: Send + Sync {
    fn to_message(&self, destination: &str, payload: &T) -> Result<Message, MessagingError>;
}

/// Serializes payloads as JSON text.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonMessageConverter;

impl<T: Serialize + ?Sized> MessageConverter<T> for JsonMessageConverter {
    fn to_message(&self, destination: &str, payload: &T) -> Result<Message, MessagingError> {
        let body = serde_json::to_string(payload).map_err(|e| MessagingError::Conversion(e.to_string()))?;
        Ok(Message::new(destination, body))
    }
}

/// Sends text payloads as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextMessageConverter;

impl MessageConverter<str> for TextMessageConverter {
    fn to_message(&self, destination: &str, payload: &str) -> Result<Message, MessagingError> {
        Ok(Message::new(destination, payload))
    }
}

/// String form of a property value: strings verbatim, everything else as JSON (`null` -> "null").
pub fn property_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Copy `properties` onto `message`. A null tenant property is written as [`DEFAULT_TENANT`].
pub fn apply_properties(message: &mut Message, properties: &MessageProperties) {
    for (key, value) in properties {
        if key == PROJECT_ID_HEADER {
            let tenant_id = match value {
                Value::Null => DEFAULT_TENANT.to_string(),
                other => property_string(other),
            };
            message.set_string_property(PROJECT_ID_HEADER, tenant_id);
        } else {
            message.set_string_property(key.clone(), property_string(value));
        }
    }
}

pub struct TenantMessageTemplate<S, C = JsonMessageConverter> {
    sender: S,
    converter: C,
}

impl<S: MessageSender> TenantMessageTemplate<S, JsonMessageConverter> {
    pub fn json(sender: S) -> Self {
        TenantMessageTemplate::new(sender, JsonMessageConverter)
    }
}

impl<S: MessageSender, C> TenantMessageTemplate<S, C> {
    pub fn new(sender: S, converter: C) -> Self {
        TenantMessageTemplate { sender, converter }
    }

    pub async fn convert_and_send<T>(
        &self,
        destination: &str,
        payload: &T,
        properties: &MessageProperties,
    ) -> Result<(), MessagingError>
    where
        T: ?Sized + Sync,
        C: MessageConverter<T>,
    {
        let mut message = self.converter.to_message(destination, payload)?;
        apply_properties(&mut message, properties);
        tracing::debug!(
            destination = %destination,
            message_id = %message.id,
            tenant_id = message.string_property(PROJECT_ID_HEADER).unwrap_or("-"),
            "sending message"
        );
        self.sender.send(message).await
    }

    /// Send with the caller's current tenant as the tenant property.
    pub async fn send_in_context<T>(&self, destination: &str, payload: &T) -> Result<(), MessagingError>
    where
        T: ?Sized + Sync,
        C: MessageConverter<T>,
    {
        let mut properties = MessageProperties::new();
        properties.insert(PROJECT_ID_HEADER.to_string(), Value::String(current_tenant()));
        self.convert_and_send(destination, payload, &properties).await
    }
}
