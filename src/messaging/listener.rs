//! Inbound side: every received message sets the tenant context before the listener runs.

use crate::error::MessagingError;
use crate::messaging::{Message, MessageListener, MessageReceiver};
use crate::tenant::{self, PROJECT_ID_HEADER};
use std::future::Future;
use tokio::task::JoinHandle;

/// Set the context from the message's tenant property; missing or empty means the default tenant.
pub fn apply_tenant(message: &Message) {
    match message.string_property(PROJECT_ID_HEADER).filter(|t| !t.is_empty()) {
        Some(tenant_id) => tenant::set_current_tenant(tenant_id),
        None => tenant::set_default_tenant(),
    }
}

/// Pulls messages from a receiver and hands them to a listener, one tenant scope per delivery.
pub struct TenantListenerContainer<R> {
    receiver: R,
}

impl<R: MessageReceiver> TenantListenerContainer<R> {
    pub fn new(receiver: R) -> Self {
        TenantListenerContainer { receiver }
    }

    /// Receive the next message and run `handler` on it inside a fresh tenant scope set from
    /// the message. The context ends when the handler does. `Ok(None)` once the source closes.
    pub async fn receive_with<F, Fut, T>(&mut self, handler: F) -> Result<Option<T>, MessagingError>
    where
        F: FnOnce(Message) -> Fut,
        Fut: Future<Output = T>,
    {
        let receiver = &mut self.receiver;
        tenant::scope(async move {
            let Some(message) = receiver.receive().await? else {
                return Ok::<_, MessagingError>(None);
            };
            apply_tenant(&message);
            Ok(Some(handler(message).await))
        })
        .await
    }

    /// Deliver messages until the receiver closes. Listener failures are logged and the loop
    /// continues; receiver failures end it.
    pub async fn run<L: MessageListener>(mut self, listener: L) -> Result<(), MessagingError> {
        let listener = &listener;
        while self
            .receive_with(move |message| deliver(listener, message))
            .await?
            .is_some()
        {}
        tracing::info!("message source closed, listener container stopped");
        Ok(())
    }
}

async fn deliver<L: MessageListener>(listener: &L, message: Message) {
    let message_id = message.id;
    if let Err(e) = listener.on_message(message).await {
        tracing::error!(
            message_id = %message_id,
            tenant_id = %tenant::current_tenant(),
            error = %e,
            "message listener failed"
        );
    }
}

impl<R: MessageReceiver + 'static> TenantListenerContainer<R> {
    pub fn spawn<L: MessageListener + 'static>(self, listener: L) -> JoinHandle<Result<(), MessagingError>> {
        tokio::spawn(self.run(listener))
    }
}
