//! Approval workflow: post the invoice for review, approve or ask for a revision.
//!
//! Items are keyed by the request message id in the approval chat. An item is removed
//! before any side effect of its resolution, so repeated taps and replies are no-ops.

use super::invoice_service::InvoiceService;
use super::relay_service::RelayService;
use crate::domain::{
    ApprovalAction, ApprovalItem, ApprovalState, CallbackEvent, DomainError, Draft,
    InboundMessage, MessageRef,
};
use crate::ports::{ApprovalStore, FileRef, SendOptions, Transport};
use crate::shared::texts::{self, CAPTION_LIMIT, truncate_chars};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ApprovalService {
    transport: Arc<dyn Transport>,
    approvals: Arc<dyn ApprovalStore>,
    invoices: Arc<InvoiceService>,
    relay: Arc<RelayService>,
    approval_chat: i64,
}

impl ApprovalService {
    pub fn new(
        transport: Arc<dyn Transport>,
        approvals: Arc<dyn ApprovalStore>,
        invoices: Arc<InvoiceService>,
        relay: Arc<RelayService>,
        approval_chat: i64,
    ) -> Self {
        Self {
            transport,
            approvals,
            invoices,
            relay,
            approval_chat,
        }
    }

    pub fn approval_chat(&self) -> i64 {
        self.approval_chat
    }

    async fn tell_user(&self, chat_id: i64, text: &str) {
        let opts = SendOptions::keyboard(texts::main_menu());
        if let Err(e) = self.transport.send_text(chat_id, text, opts).await {
            warn!(chat_id, error = %e, "failed to notify user");
        }
    }

    async fn tell_staff(&self, text: &str, reply_to: Option<i32>) {
        let opts = reply_to.map(SendOptions::reply_to).unwrap_or_default();
        if let Err(e) = self.transport.send_text(self.approval_chat, text, opts).await {
            warn!(chat_id = self.approval_chat, error = %e, "failed to post in approval chat");
        }
    }

    /// Hands an application that has nowhere to go to the navigator chat.
    async fn escalate_unrouted(&self, summary: &str) {
        let navigator = self.relay.navigator();
        if navigator == 0 {
            warn!("no navigator chat either, application stays unrouted");
            return;
        }
        let text = format!(
            "⚠️ Чат подтверждения не настроен. Заявка не отправлена:\n\n{}",
            summary
        );
        if let Err(e) = self
            .transport
            .send_text(navigator, &text, SendOptions::default())
            .await
        {
            error!(chat_id = navigator, error = %e, "failed to escalate application");
        }
    }

    /// Generates the invoice and posts it for approval. Every outcome is reported to the user.
    pub async fn submit(&self, user_msg: MessageRef, user_ref: &str, draft: &Draft) {
        let summary = texts::application_summary(user_ref, draft);
        if self.approval_chat == 0 {
            error!(user_chat = user_msg.chat_id, "approval chat not configured");
            self.escalate_unrouted(&summary).await;
            self.tell_user(user_msg.chat_id, texts::APPLICATION_ACCEPTED_NO_APPROVAL)
                .await;
            return;
        }

        let invoice = match self.invoices.generate(draft).await {
            Ok(invoice) => invoice,
            Err(e) => {
                error!(user_chat = user_msg.chat_id, error = %e, "invoice generation failed");
                if matches!(e, DomainError::Invariant(_)) {
                    self.tell_staff(&format!("⚠️ {}", e), None).await;
                }
                self.tell_user(
                    user_msg.chat_id,
                    &format!("Не смог сформировать счёт: {}", e),
                )
                .await;
                return;
            }
        };

        let caption = truncate_chars(
            &format!("Счёт № {} (xlsx)\n\n{}", invoice.number, summary),
            CAPTION_LIMIT,
        );
        let buttons = texts::approval_buttons(
            ApprovalAction::Approve.callback_data(),
            ApprovalAction::RequestRevision.callback_data(),
        );
        let posted = self
            .transport
            .send_document(
                self.approval_chat,
                FileRef::Path(invoice.xlsx.clone()),
                Some(&caption),
                SendOptions::keyboard(buttons),
            )
            .await;
        let key = match posted {
            Ok(id) => id,
            Err(e) => {
                error!(invoice_no = invoice.number, error = %e, "failed to post approval request");
                self.tell_staff(&format!("❌ Не смог отправить XLSX в этот чат: {}", e), None)
                    .await;
                self.tell_user(user_msg.chat_id, texts::APPLICATION_POST_FAILED)
                    .await;
                return;
            }
        };

        let item = ApprovalItem::new(user_msg, summary, invoice.number, invoice.xlsx.clone());
        if let Err(e) = self.approvals.insert(key, item).await {
            error!(invoice_no = invoice.number, error = %e, "failed to store approval item");
        }
        self.relay
            .remember(MessageRef::new(self.approval_chat, key), user_msg)
            .await;

        let navigator = self.relay.navigator();
        if navigator != 0 {
            if let Err(e) = self
                .transport
                .send_document(
                    navigator,
                    FileRef::Path(invoice.xlsx.clone()),
                    Some(&caption),
                    SendOptions::default(),
                )
                .await
            {
                self.tell_staff(&format!("⚠️ Не смог отправить XLSX навигатору: {}", e), None)
                    .await;
            }
        }

        info!(invoice_no = invoice.number, key, user_chat = user_msg.chat_id, "sent for approval");
        self.tell_user(user_msg.chat_id, texts::APPLICATION_SUBMITTED)
            .await;
    }

    /// Approve / request-revision buttons. Always answers the callback.
    pub async fn handle_callback(&self, cb: &CallbackEvent) -> Result<(), DomainError> {
        if let Err(e) = self.transport.answer_callback(&cb.id).await {
            warn!(error = %e, "answer callback failed");
        }
        let (Some(action), Some(message)) = (ApprovalAction::parse(&cb.data), cb.message) else {
            return Ok(());
        };
        if message.chat_id != self.approval_chat {
            return Ok(());
        }
        match action {
            ApprovalAction::Approve => self.approve(message.message_id).await,
            ApprovalAction::RequestRevision => self.request_revision(message.message_id).await,
        }
    }

    async fn approve(&self, key: i32) -> Result<(), DomainError> {
        let Some(item) = self.approvals.remove(key).await? else {
            debug!(key, "approval already resolved");
            return Ok(());
        };
        let file = self.invoices.deliverable(&item.document).await;
        let caption = format!("Счёт на оплату № {}", item.invoice_number);
        let delivered = self
            .transport
            .send_document(
                item.user.chat_id,
                FileRef::Path(file),
                Some(&caption),
                SendOptions::default(),
            )
            .await;
        match delivered {
            Ok(_) => {
                info!(invoice_no = item.invoice_number, user_chat = item.user.chat_id, "invoice approved");
                self.tell_staff("✅ Счёт отправлен пользователю.", Some(key))
                    .await;
            }
            Err(e) => {
                error!(invoice_no = item.invoice_number, error = %e, "invoice delivery failed");
                self.approvals.insert(key, item).await?;
                self.tell_staff(&format!("❌ Не смог отправить счёт пользователю: {}", e), Some(key))
                    .await;
            }
        }
        Ok(())
    }

    async fn request_revision(&self, key: i32) -> Result<(), DomainError> {
        let Some(item) = self.approvals.get(key).await? else {
            return Ok(());
        };
        if item.state == ApprovalState::AwaitingRevisionReason {
            return Ok(());
        }
        let prompt = self
            .transport
            .send_text(
                self.approval_chat,
                "✍️ Ок. Напишите причину правок reply на это сообщение.",
                SendOptions::reply_to(key),
            )
            .await
            .map_err(|e| warn!(key, error = %e, "revision prompt failed"))
            .ok();
        self.approvals.begin_revision(key, prompt).await?;
        Ok(())
    }

    /// A reply in the approval chat. Relays the revision reason when one is awaited.
    /// Returns false when the reply is not a revision reason.
    pub async fn handle_reply(&self, msg: &InboundMessage) -> Result<bool, DomainError> {
        let Some(reply) = msg.reply_to else {
            return Ok(false);
        };
        let reason = msg.text();
        if reason.is_empty() {
            return Ok(false);
        }
        let Some((key, item)) = self.approvals.take_revision(reply.message_id).await? else {
            return Ok(false);
        };
        let text = format!(
            "Заявка не подтверждена. Причина:\n{}\n\nСоставьте заявку заново с правками.",
            reason
        );
        if let Err(e) = self
            .transport
            .send_text(item.user.chat_id, &text, SendOptions::default())
            .await
        {
            error!(invoice_no = item.invoice_number, error = %e, "revision reason delivery failed");
            self.approvals.insert(key, item).await?;
            return Ok(true);
        }
        info!(invoice_no = item.invoice_number, "revision requested");
        self.tell_staff("📨 Причина отправлена пользователю.", Some(key))
            .await;
        Ok(true)
    }
}
