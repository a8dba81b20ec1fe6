//! Top-level event routing. Implements the inbound port.

use super::approval_service::ApprovalService;
use super::inbox_service::InboxService;
use super::navigator_service::NavigatorService;
use super::relay_service::RelayService;
use crate::domain::{ApprovalAction, CallbackEvent, DomainError, InboundEvent, InboundMessage};
use crate::ports::{EventHandler, SendOptions, Transport};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Router {
    transport: Arc<dyn Transport>,
    inbox: Arc<InboxService>,
    relay: Arc<RelayService>,
    approval: Option<Arc<ApprovalService>>,
    navigator: Option<Arc<NavigatorService>>,
    staff_chats: Vec<i64>,
}

impl Router {
    pub fn new(
        transport: Arc<dyn Transport>,
        inbox: Arc<InboxService>,
        relay: Arc<RelayService>,
        staff_chats: Vec<i64>,
    ) -> Self {
        Self {
            transport,
            inbox,
            relay,
            approval: None,
            navigator: None,
            staff_chats,
        }
    }

    pub fn with_approval(mut self, approval: Arc<ApprovalService>) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<NavigatorService>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    async fn on_message(&self, msg: InboundMessage) -> Result<(), DomainError> {
        if msg.command() == Some("chatid") {
            let text = format!("chat_id = {}", msg.chat_id);
            self.transport
                .send_text(msg.chat_id, &text, SendOptions::default())
                .await?;
            return Ok(());
        }
        if msg.is_private {
            return self.inbox.handle(&msg).await;
        }

        if let Some(approval) = &self.approval {
            // The approval chat never falls through to staff-reply routing.
            if msg.chat_id == approval.approval_chat() {
                if !approval.handle_reply(&msg).await? {
                    debug!(chat_id = msg.chat_id, "approval chat message ignored");
                }
                return Ok(());
            }
        }
        if let Some(navigator) = &self.navigator {
            if msg.chat_id == self.relay.navigator() && navigator.handle_message(&msg).await? {
                return Ok(());
            }
        }
        if self.staff_chats.contains(&msg.chat_id) {
            self.relay.handle_staff_reply(&msg).await?;
        } else {
            debug!(chat_id = msg.chat_id, "message from unknown group ignored");
        }
        Ok(())
    }

    async fn on_callback(&self, cb: CallbackEvent) -> Result<(), DomainError> {
        if ApprovalAction::parse(&cb.data).is_some() {
            if let Some(approval) = &self.approval {
                return approval.handle_callback(&cb).await;
            }
        } else if cb.data.starts_with("broadcast_") {
            if let Some(navigator) = &self.navigator {
                return navigator.handle_callback(&cb).await;
            }
        }
        if let Err(e) = self.transport.answer_callback(&cb.id).await {
            warn!(error = %e, "answer callback failed");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventHandler for Router {
    async fn handle(&self, event: InboundEvent) -> Result<(), DomainError> {
        match event {
            InboundEvent::Message(msg) => self.on_message(msg).await,
            InboundEvent::Callback(cb) => self.on_callback(cb).await,
        }
    }
}
