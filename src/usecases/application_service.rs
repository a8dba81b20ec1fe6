//! Application flow driver for the application desk.
//!
//! Loads the user's conversation state, runs one `step`, performs the registry lookup
//! in place, saves the state and then carries out the remaining effects in order.

use super::approval_service::ApprovalService;
use super::relay_service::RelayService;
use crate::domain::application::step;
use crate::domain::{
    ConversationState, DomainError, Effect, FlowInput, InboundMessage, Notice, UserProfile,
};
use crate::ports::{ConversationStore, RegistryLookup, SendOptions, Transport};
use crate::shared::texts;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ApplicationService {
    transport: Arc<dyn Transport>,
    conversations: Arc<dyn ConversationStore>,
    registry: Arc<dyn RegistryLookup>,
    relay: Arc<RelayService>,
    approval: Arc<ApprovalService>,
    companies: Vec<String>,
}

impl ApplicationService {
    pub fn new(
        transport: Arc<dyn Transport>,
        conversations: Arc<dyn ConversationStore>,
        registry: Arc<dyn RegistryLookup>,
        relay: Arc<RelayService>,
        approval: Arc<ApprovalService>,
        companies: Vec<String>,
    ) -> Self {
        Self {
            transport,
            conversations,
            registry,
            relay,
            approval,
            companies,
        }
    }

    /// Handles one private message from an allowed user.
    pub async fn handle(&self, msg: &InboundMessage, from: &UserProfile) -> Result<(), DomainError> {
        let mut state = self.conversations.load(from.user_id).await?;
        let text = msg.text();
        let input = FlowInput {
            text,
            control: texts::control_from_label(text),
            has_content: !text.is_empty() || msg.content.is_media(),
        };
        let before = state.stage;
        let effects = step(&mut state, input, &self.companies);
        if state.stage != before {
            debug!(user_id = from.user_id, from = ?before, to = ?state.stage, "flow transition");
        }

        let mut pending = Vec::with_capacity(effects.len());
        for effect in effects {
            if effect == Effect::LookupRegistry {
                self.lookup_registry(&mut state).await;
            } else {
                pending.push(effect);
            }
        }
        self.conversations.save(from.user_id, state.clone()).await?;

        let user_ref = from.reference();
        for effect in pending {
            self.perform(effect, msg, &user_ref, &state).await?;
        }
        Ok(())
    }

    async fn lookup_registry(&self, state: &mut ConversationState) {
        let tax_id = state.draft.tax_id.clone();
        let result = match self.registry.lookup(&tax_id).await {
            Ok(data) => Ok(data),
            Err(DomainError::Registry(m)) => Err(m),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = &result {
            warn!(tax_id = %tax_id, error = %e, "registry lookup failed");
        }
        state.draft.apply_registry(result);
    }

    async fn perform(
        &self,
        effect: Effect,
        msg: &InboundMessage,
        user_ref: &str,
        state: &ConversationState,
    ) -> Result<(), DomainError> {
        let chat = msg.chat_id;
        match effect {
            Effect::Prompt => {
                if let Some(prompt) = texts::prompt(state) {
                    let kb = texts::keyboard_for(state.stage, &self.companies);
                    self.transport
                        .send_text(chat, &prompt, SendOptions::keyboard(kb))
                        .await?;
                }
            }
            Effect::Reply(notice) => {
                let opts = match notice {
                    Notice::TotalMismatch { .. } => SendOptions::default(),
                    _ => SendOptions::keyboard(texts::keyboard_for(state.stage, &self.companies)),
                };
                self.transport
                    .send_text(chat, &texts::notice(&notice), opts)
                    .await?;
            }
            Effect::RelaySupport => {
                if let Err(e) = self.relay.relay_support(msg, user_ref).await {
                    warn!(chat_id = chat, error = %e, "support relay failed");
                }
            }
            Effect::RelayPlain => {
                let header = format!("От: {}", user_ref);
                if let Err(e) = self.relay.relay(self.relay.navigator(), &header, msg).await {
                    warn!(chat_id = chat, error = %e, "relay to navigator failed");
                }
            }
            Effect::Submit(draft) => {
                info!(chat_id = chat, items = draft.items.len(), "application submitted");
                self.approval.submit(msg.reference(), user_ref, &draft).await;
            }
            Effect::Cancelled => {
                self.transport
                    .send_text(
                        chat,
                        texts::APPLICATION_CANCELLED,
                        SendOptions::keyboard(texts::main_menu()),
                    )
                    .await?;
            }
            // Consumed before the state is saved.
            Effect::LookupRegistry => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::integrations::StaticRegistry;
    use crate::adapters::persistence::{
        MemoryApprovalStore, MemoryConversationStore, MemorySupportTags, SqliteRepo,
    };
    use crate::adapters::telegram::{RecordingTransport, SentKind};
    use crate::adapters::tools::{MemorySheet, MemorySpreadsheet};
    use crate::domain::{CompanyData, Content, MessageRef, Stage};
    use crate::ports::{ApprovalStore, SupportTagStore};
    use crate::shared::clock::LocalClock;
    use crate::usecases::invoice_service::InvoiceService;
    use crate::usecases::test_support::{document, private, private_text, user};
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::path::PathBuf;

    const NAV: i64 = -100;
    const APPROVAL: i64 = -300;
    const USER: i64 = 42;

    struct Fixture {
        _dir: tempfile::TempDir,
        transport: Arc<RecordingTransport>,
        conversations: Arc<MemoryConversationStore>,
        tags: Arc<MemorySupportTags>,
        approvals: Arc<MemoryApprovalStore>,
        svc: ApplicationService,
        next_id: std::cell::Cell<i32>,
    }

    impl Fixture {
        async fn say(&self, text: &str) {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            self.svc
                .handle(&private_text(USER, id, text), &user(USER, Some("ann")))
                .await
                .unwrap();
        }

        async fn send(&self, content: Content) {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            self.svc
                .handle(&private(USER, id, content), &user(USER, Some("ann")))
                .await
                .unwrap();
        }

        async fn stage(&self) -> Stage {
            self.conversations.load(USER).await.unwrap().stage
        }

        async fn last_to_user(&self) -> String {
            self.transport.texts_to(USER).await.pop().unwrap_or_default()
        }
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let repo = Arc::new(SqliteRepo::connect(dir.path(), 1).await.unwrap());
        let tags = Arc::new(MemorySupportTags::new());
        let approvals = Arc::new(MemoryApprovalStore::new());
        let conversations = Arc::new(MemoryConversationStore::new());
        let registry = StaticRegistry::disabled().with_company(
            "7701",
            CompanyData {
                kpp: "770101001".into(),
                name: "ООО «Acme»".into(),
                address: "Москва".into(),
            },
        );
        let relay = Arc::new(RelayService::new(
            transport.clone(),
            repo.clone(),
            tags.clone(),
            HashMap::new(),
            NAV,
            Vec::new(),
        ));
        let invoices = Arc::new(InvoiceService::new(
            repo.clone(),
            Arc::new(MemorySpreadsheet::new(MemorySheet::new())),
            None,
            PathBuf::from("template.xlsx"),
            dir.path().join("invoices"),
            Decimal::from(22),
            LocalClock::new(3),
        ));
        let approval = Arc::new(ApprovalService::new(
            transport.clone(),
            approvals.clone(),
            invoices,
            relay.clone(),
            APPROVAL,
        ));
        let svc = ApplicationService::new(
            transport.clone(),
            conversations.clone(),
            Arc::new(registry),
            relay,
            approval,
            vec!["Компания 1".into(), "Компания 2".into()],
        );
        Fixture {
            _dir: dir,
            transport,
            conversations,
            tags,
            approvals,
            svc,
            next_id: std::cell::Cell::new(1),
        }
    }

    #[tokio::test]
    async fn test_full_application_is_submitted() {
        let f = fixture().await;
        f.say(texts::BTN_MAKE_APPLICATION).await;
        assert_eq!(f.last_to_user().await, "Выберите компанию:");
        f.say("Компания 1").await;
        f.say("7701").await;
        assert_eq!(f.stage().await, Stage::AwaitLegalName);

        f.say("Beta").await;
        assert!(f.last_to_user().await.starts_with("По ИНН 7701 в Rusprofile"));
        f.say("ООО Acme").await;
        assert_eq!(f.stage().await, Stage::AwaitItemName);

        f.say("Bolt").await;
        f.say("3").await;
        f.say("шт").await;
        f.say("100").await;
        f.say("250").await;
        assert_eq!(f.stage().await, Stage::AwaitItemUnitPrice);
        let sent = f.transport.sent_to(USER).await;
        let mismatch = &sent[sent.len() - 2];
        assert!(mismatch.text.starts_with("Сумма не сходится"));
        assert_eq!(mismatch.opts.keyboard, None);

        f.say("100").await;
        f.say("300").await;
        assert_eq!(f.stage().await, Stage::AskMoreItems);
        f.say(texts::BTN_FINISH_ITEMS).await;
        f.say(texts::BTN_SKIP).await;

        assert_eq!(f.stage().await, Stage::Idle);
        assert_eq!(f.last_to_user().await, texts::APPLICATION_SUBMITTED);
        let request = &f.transport.sent_to(APPROVAL).await[0];
        assert!(request.text.contains("1) Bolt; кол-во=3; ед=шт; цена=100.00; итого=300.00"));
        assert!(request.text.contains("КПП: 770101001"));
        assert!(f.approvals.get(request.message_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_registry_failure_does_not_block() {
        let f = fixture().await;
        f.say(texts::BTN_MAKE_APPLICATION).await;
        f.say("Компания 2").await;
        f.say("9999").await;
        let st = f.conversations.load(USER).await.unwrap();
        assert_eq!(st.draft.registry_error.as_deref(), Some("реестр недоступен"));
        f.say("Anything").await;
        assert_eq!(f.stage().await, Stage::AwaitItemName);
    }

    #[tokio::test]
    async fn test_idle_messages_go_to_navigator() {
        let f = fixture().await;
        f.say("hello").await;
        let nav = f.transport.sent_to(NAV).await;
        assert_eq!(nav[0].text, "От: @ann");
        assert_eq!(nav[1].kind, SentKind::Forward(MessageRef::new(USER, 1)));
        assert!(f.transport.sent_to(USER).await.is_empty());
    }

    #[tokio::test]
    async fn test_support_interrupt_resumes_with_draft() {
        let f = fixture().await;
        f.say(texts::BTN_MAKE_APPLICATION).await;
        f.say("Компания 1").await;
        f.say("7701").await;
        f.say("Acme").await;
        f.say("Bolt").await;
        assert_eq!(f.stage().await, Stage::AwaitItemQty);

        f.say(texts::BTN_SUPPORT).await;
        assert_eq!(f.last_to_user().await, texts::SUPPORT_PROMPT);
        f.say("where is my invoice?").await;
        assert_eq!(f.stage().await, Stage::AwaitContinue);
        f.send(document("doc-1", None)).await;
        f.say("one more").await;
        assert!(f.tags.is_tagged(MessageRef::new(USER, 7)).await.unwrap());
        assert!(f.tags.is_tagged(MessageRef::new(USER, 8)).await.unwrap());
        // Three questions, each header + forward.
        assert_eq!(f.transport.sent_to(NAV).await.len(), 6);

        f.say(texts::BTN_CONTINUE).await;
        let st = f.conversations.load(USER).await.unwrap();
        assert_eq!(st.stage, Stage::AwaitItemQty);
        assert_eq!(st.current_item.name, "Bolt");
        assert_eq!(st.draft.tax_id, "7701");
        assert!(f.last_to_user().await.starts_with("Введите количество"));
    }

    #[tokio::test]
    async fn test_cancel_resets() {
        let f = fixture().await;
        f.say(texts::BTN_MAKE_APPLICATION).await;
        f.say("Компания 1").await;
        f.say(texts::BTN_CANCEL).await;
        assert_eq!(f.stage().await, Stage::Idle);
        assert_eq!(f.last_to_user().await, texts::APPLICATION_CANCELLED);
        assert_eq!(
            f.conversations.load(USER).await.unwrap(),
            ConversationState::default()
        );
    }
}
