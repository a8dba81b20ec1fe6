//! Private inbox: access gating and per-desk handling of user messages.
//!
//! Order: responders get the start text only, then upsert, blocked check, `/start`,
//! shared-secret gate, and finally the desk (category relay, accounting relay or
//! the application flow).

use super::application_service::ApplicationService;
use super::relay_service::RelayService;
use crate::domain::{DomainError, InboundMessage, UserProfile, UserRecord};
use crate::ports::{SendOptions, Transport, UserStore};
use crate::shared::config::CategoryChat;
use crate::shared::texts;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// What an allowed user's message turns into.
pub enum Desk {
    /// Relay into the staff chat of the user's chosen category and to the navigator.
    Category(Vec<CategoryChat>),
    /// Relay into one accounting chat and to the navigator.
    Accounting(i64),
    /// Application flow; idle messages go to the navigator.
    Application(Arc<ApplicationService>),
}

pub struct InboxService {
    transport: Arc<dyn Transport>,
    users: Arc<dyn UserStore>,
    relay: Arc<RelayService>,
    desk: Desk,
    access_password: String,
    /// Category choices, used when the store has none.
    category_cache: RwLock<HashMap<i64, String>>,
}

impl InboxService {
    pub fn new(
        transport: Arc<dyn Transport>,
        users: Arc<dyn UserStore>,
        relay: Arc<RelayService>,
        desk: Desk,
        access_password: String,
    ) -> Self {
        Self {
            transport,
            users,
            relay,
            desk,
            access_password,
            category_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn say(&self, chat_id: i64, text: &str, opts: SendOptions) -> Result<(), DomainError> {
        self.transport.send_text(chat_id, text, opts).await.map(|_| ())
    }

    fn category_labels(&self) -> Vec<String> {
        match &self.desk {
            Desk::Category(cats) => cats.iter().map(|c| c.label.clone()).collect(),
            _ => Vec::new(),
        }
    }

    async fn send_picker(&self, chat_id: i64) -> Result<(), DomainError> {
        let kb = texts::category_picker(&self.category_labels());
        self.say(chat_id, texts::CATEGORY_PICKER, SendOptions::keyboard(kb))
            .await
    }

    /// Handles one private message.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<(), DomainError> {
        let Some(from) = msg.from.as_ref() else {
            return Ok(());
        };
        let chat = msg.chat_id;
        let is_start = msg.command() == Some("start");

        if self.relay.is_responder(from.user_id) {
            if is_start {
                self.say(chat, texts::START_TEXT, SendOptions::default()).await?;
            }
            return Ok(());
        }

        self.users
            .upsert(&UserRecord::from_profile(from, chat))
            .await?;
        if self.users.is_blocked(from.user_id).await? {
            debug!(user_id = from.user_id, "blocked user ignored");
            return Ok(());
        }
        let allowed = self.users.is_allowed(from.user_id).await?;

        if is_start {
            return self.start(chat, from, allowed).await;
        }

        if !allowed {
            let text = msg.text();
            if !text.is_empty() && !self.access_password.is_empty() && text == self.access_password {
                self.users.set_allowed(from.user_id, true).await?;
                info!(user_id = from.user_id, "access granted");
                self.granted(chat).await?;
            }
            return Ok(());
        }

        match &self.desk {
            Desk::Application(app) => app.handle(msg, from).await,
            Desk::Accounting(accounting) => {
                let header = format!("От: {}", from.reference());
                self.relay_logged(*accounting, &header, msg).await;
                self.relay_logged(self.relay.navigator(), &header, msg).await;
                Ok(())
            }
            Desk::Category(cats) => self.category_message(msg, from, cats).await,
        }
    }

    async fn start(&self, chat: i64, from: &UserProfile, allowed: bool) -> Result<(), DomainError> {
        if !allowed {
            return self.say(chat, texts::START_TEXT, SendOptions::default()).await;
        }
        match &self.desk {
            Desk::Application(_) => {
                self.say(chat, texts::START_TEXT, SendOptions::keyboard(texts::main_menu()))
                    .await
            }
            Desk::Accounting(_) => {
                self.say(chat, &texts::greeting(from), SendOptions::default())
                    .await
            }
            Desk::Category(_) => {
                self.say(chat, &texts::greeting(from), SendOptions::default())
                    .await?;
                self.send_picker(chat).await
            }
        }
    }

    async fn granted(&self, chat: i64) -> Result<(), DomainError> {
        match &self.desk {
            Desk::Application(_) => {
                self.say(chat, texts::ACCESS_GRANTED, SendOptions::keyboard(texts::main_menu()))
                    .await
            }
            Desk::Accounting(_) => {
                self.say(chat, texts::ACCESS_GRANTED, SendOptions::default())
                    .await
            }
            Desk::Category(_) => {
                self.say(chat, texts::ACCESS_GRANTED, SendOptions::default())
                    .await?;
                self.send_picker(chat).await
            }
        }
    }

    async fn relay_logged(&self, dest: i64, header: &str, msg: &InboundMessage) {
        if let Err(e) = self.relay.relay(dest, header, msg).await {
            warn!(dest_chat = dest, user_chat = msg.chat_id, error = %e, "relay failed");
        }
    }

    async fn category_message(
        &self,
        msg: &InboundMessage,
        from: &UserProfile,
        cats: &[CategoryChat],
    ) -> Result<(), DomainError> {
        let chat = msg.chat_id;
        let text = msg.text();
        if let Some(choice) = cats.iter().find(|c| c.label == text) {
            if let Err(e) = self.users.set_category(from.user_id, &choice.label).await {
                warn!(user_id = from.user_id, error = %e, "failed to persist category");
            }
            self.category_cache
                .write()
                .await
                .insert(from.user_id, choice.label.clone());
            return self
                .say(chat, &texts::category_chosen(&choice.label), SendOptions::default())
                .await;
        }

        let stored = match self.users.category(from.user_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(user_id = from.user_id, error = %e, "category lookup failed");
                None
            }
        };
        let label = match stored {
            Some(label) => Some(label),
            None => self.category_cache.read().await.get(&from.user_id).cloned(),
        };
        let Some(label) = label else {
            return self.send_picker(chat).await;
        };
        let Some(dest) = cats
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.chat_id)
            .filter(|&c| c != 0)
        else {
            warn!(user_id = from.user_id, category = %label, "category chat not configured");
            self.say(chat, texts::CATEGORY_CHAT_MISSING, SendOptions::default())
                .await?;
            return self.send_picker(chat).await;
        };

        let header = format!("От: {}", from.reference());
        self.relay_logged(dest, &header, msg).await;
        let nav_header = format!("{}\nКому: {}", header, label);
        self.relay_logged(self.relay.navigator(), &nav_header, msg)
            .await;
        Ok(())
    }
}
