//! Navigator panel: broadcasts (now or scheduled) and direct messages to one user.
//!
//! One panel per instance, driven from the navigator chat. The panel only consumes
//! messages while a flow is active or when the message is a panel command/button.

use super::broadcaster::Broadcaster;
use super::relay_service::RelayService;
use crate::domain::{BroadcastPayload, CallbackEvent, DomainError, InboundMessage};
use crate::ports::{BroadcastQueue, Keyboard, SendOptions, Transport, UserStore};
use crate::shared::clock::{LocalClock, ddmmyyyy_hhmm};
use crate::shared::texts;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const PANEL_TEXT: &str = "Панель навигатора:\n\n\
    📨 Рассылка — отправка всем пользователям\n\
    ✉️ Написать — написать конкретному пользователю";
const BROADCAST_PROMPT: &str = "Отправьте сообщение, которое нужно разослать всем пользователям.\n\
    Можно прикрепить файл или фото.";
const SCHEDULE_PROMPT: &str = "Введите дату и время отправки в формате DD.MM.YYYY HH:MM (местное время).\n\
    Например: 05.12.2025 10:30";
const DIRECT_PROMPT: &str = "Введите telegram id (число) или @username пользователя (allowed=1 и не в бане).\n\
    Отмена: «❌ Отмена».";
const NOT_ELIGIBLE: &str = "Пользователь не найден/не подходит (нужен allowed=1 и blocked=0).";
const CANCELLED: &str = "Отменено.";

#[derive(Debug, Clone, Default, PartialEq)]
enum Panel {
    #[default]
    Idle,
    AwaitPayload,
    /// Payload captured, waiting for the inline choice.
    AwaitAction(BroadcastPayload),
    AwaitSchedule(BroadcastPayload),
    AwaitDirectTarget,
    AwaitDirectMessage {
        chat_id: i64,
        user_ref: String,
    },
}

pub struct NavigatorService {
    transport: Arc<dyn Transport>,
    users: Arc<dyn UserStore>,
    queue: Arc<dyn BroadcastQueue>,
    broadcaster: Arc<Broadcaster>,
    relay: Arc<RelayService>,
    clock: LocalClock,
    panel: Mutex<Panel>,
}

fn cancel_keyboard() -> Keyboard {
    Keyboard::Reply {
        rows: vec![vec![texts::BTN_CANCEL.to_string()]],
        one_time: false,
    }
}

impl NavigatorService {
    pub fn new(
        transport: Arc<dyn Transport>,
        users: Arc<dyn UserStore>,
        queue: Arc<dyn BroadcastQueue>,
        broadcaster: Arc<Broadcaster>,
        relay: Arc<RelayService>,
        clock: LocalClock,
    ) -> Self {
        Self {
            transport,
            users,
            queue,
            broadcaster,
            relay,
            clock,
            panel: Mutex::new(Panel::Idle),
        }
    }

    async fn say(&self, chat: i64, text: &str, kb: Option<Keyboard>) -> Result<(), DomainError> {
        let opts = kb.map(SendOptions::keyboard).unwrap_or_default();
        self.transport.send_text(chat, text, opts).await.map(|_| ())
    }

    async fn back_to_panel(&self, chat: i64, text: &str) -> Result<(), DomainError> {
        *self.panel.lock().await = Panel::Idle;
        self.say(chat, text, Some(texts::navigator_panel())).await
    }

    /// Handles a message in the navigator chat. Returns false when the panel does not
    /// claim it, so the caller can route it as a staff reply.
    pub async fn handle_message(&self, msg: &InboundMessage) -> Result<bool, DomainError> {
        let chat = msg.chat_id;
        let text = msg.text();
        let is_responder = msg
            .from
            .as_ref()
            .is_some_and(|u| self.relay.is_responder(u.user_id));

        match msg.command() {
            Some("start") => {
                self.back_to_panel(chat, PANEL_TEXT).await?;
                return Ok(true);
            }
            Some("broadcast") => {
                self.start_broadcast(chat).await?;
                return Ok(true);
            }
            _ => {}
        }

        let panel = self.panel.lock().await.clone();
        match panel {
            Panel::Idle | Panel::AwaitAction(_) => match text {
                texts::BTN_BROADCAST => {
                    self.start_broadcast(chat).await?;
                    Ok(true)
                }
                texts::BTN_DIRECT if is_responder => {
                    *self.panel.lock().await = Panel::AwaitDirectTarget;
                    self.say(chat, DIRECT_PROMPT, Some(cancel_keyboard())).await?;
                    Ok(true)
                }
                _ => Ok(false),
            },
            _ if text == texts::BTN_CANCEL => {
                self.back_to_panel(chat, CANCELLED).await?;
                Ok(true)
            }
            Panel::AwaitPayload => {
                self.capture_payload(msg).await?;
                Ok(true)
            }
            Panel::AwaitSchedule(payload) => {
                self.schedule(chat, text, payload).await?;
                Ok(true)
            }
            Panel::AwaitDirectTarget => {
                if is_responder {
                    self.direct_target(chat, text).await?;
                }
                Ok(true)
            }
            Panel::AwaitDirectMessage { chat_id, user_ref } => {
                if is_responder {
                    self.direct_send(msg, chat_id, &user_ref).await?;
                }
                Ok(true)
            }
        }
    }

    async fn start_broadcast(&self, chat: i64) -> Result<(), DomainError> {
        *self.panel.lock().await = Panel::AwaitPayload;
        self.say(chat, BROADCAST_PROMPT, Some(cancel_keyboard()))
            .await
    }

    async fn capture_payload(&self, msg: &InboundMessage) -> Result<(), DomainError> {
        let Some(payload) = BroadcastPayload::from_content(&msg.content) else {
            return self
                .say(msg.chat_id, "Нужно отправить текст или файл/фото (или вместе).", None)
                .await;
        };
        *self.panel.lock().await = Panel::AwaitAction(payload);
        self.say(
            msg.chat_id,
            "Выберите действие с рассылкой:",
            Some(texts::broadcast_actions()),
        )
        .await
    }

    async fn schedule(
        &self,
        chat: i64,
        text: &str,
        payload: BroadcastPayload,
    ) -> Result<(), DomainError> {
        if text.is_empty() {
            return Ok(());
        }
        let Some(when) = self.clock.parse_local(text) else {
            return self
                .say(chat, "Неверный формат. Пример: 05.12.2025 10:30", None)
                .await;
        };
        if when <= self.clock.now() {
            return self
                .say(chat, "Время уже прошло. Укажите будущее время.", None)
                .await;
        }
        let id = self.queue.schedule(when.timestamp(), &payload).await?;
        info!(broadcast_id = id, due_at = when.timestamp(), "broadcast scheduled");
        self.back_to_panel(
            chat,
            &format!("Ок, отправлю рассылку {}.", ddmmyyyy_hhmm(&when)),
        )
        .await
    }

    async fn direct_target(&self, chat: i64, text: &str) -> Result<(), DomainError> {
        if text.is_empty() {
            return Ok(());
        }
        let found = if text.starts_with('@') {
            self.users
                .find_eligible_chat_by_username(text)
                .await
                .map(|c| c.map(|c| (c, text.to_string())))
        } else {
            match text.parse::<i64>() {
                Ok(id) if id > 0 => self
                    .users
                    .find_eligible_chat_by_user_id(id)
                    .await
                    .map(|c| c.map(|c| (c, format!("id:{}", id)))),
                _ => {
                    return self
                        .say(chat, "Неверный формат. Введите telegram id или @username.", None)
                        .await;
                }
            }
        };
        match found {
            Ok(Some((chat_id, user_ref))) => {
                let prompt = format!(
                    "Ок. Теперь отправьте сообщение/файл/фото для {}.\nОтмена: «❌ Отмена».",
                    user_ref
                );
                *self.panel.lock().await = Panel::AwaitDirectMessage { chat_id, user_ref };
                self.say(chat, &prompt, Some(cancel_keyboard())).await
            }
            Ok(None) => self.say(chat, NOT_ELIGIBLE, None).await,
            Err(e) => {
                warn!(error = %e, "direct target lookup failed");
                self.say(chat, "Ошибка поиска пользователя.", None).await
            }
        }
    }

    async fn direct_send(
        &self,
        msg: &InboundMessage,
        target: i64,
        user_ref: &str,
    ) -> Result<(), DomainError> {
        let Some(from) = msg.from.as_ref() else {
            return Ok(());
        };
        let alias = self.relay.alias(from);
        match self.relay.send_as_staff(target, &alias, &msg.content, None).await {
            Ok(Some(_)) => {
                info!(target_chat = target, alias = %alias, "direct message sent");
                self.back_to_panel(msg.chat_id, &format!("Отправлено пользователю {}.", user_ref))
                    .await
            }
            Ok(None) => {
                self.say(msg.chat_id, "Отправьте текст или файл/фото.", None)
                    .await
            }
            Err(e) => {
                warn!(target_chat = target, error = %e, "direct message failed");
                self.say(msg.chat_id, "Не удалось отправить пользователю.", None)
                    .await
            }
        }
    }

    /// Inline broadcast buttons. Always answers the callback.
    pub async fn handle_callback(&self, cb: &CallbackEvent) -> Result<(), DomainError> {
        if let Err(e) = self.transport.answer_callback(&cb.id).await {
            warn!(error = %e, "answer callback failed");
        }
        let Some(chat) = cb.message.map(|m| m.chat_id) else {
            return Ok(());
        };
        let panel = self.panel.lock().await.clone();
        let Panel::AwaitAction(payload) = panel else {
            return Ok(());
        };
        match cb.data.as_str() {
            texts::CB_BROADCAST_SEND_NOW => {
                *self.panel.lock().await = Panel::Idle;
                let reached = self.broadcaster.broadcast(&payload).await?;
                self.say(
                    chat,
                    &format!("Рассылка отправлена {} пользователям.", reached),
                    Some(texts::navigator_panel()),
                )
                .await
            }
            texts::CB_BROADCAST_SCHEDULE => {
                *self.panel.lock().await = Panel::AwaitSchedule(payload);
                self.say(chat, SCHEDULE_PROMPT, Some(cancel_keyboard()))
                    .await
            }
            texts::CB_BROADCAST_CANCEL => self.back_to_panel(chat, "Рассылка отменена.").await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::{MemorySupportTags, SqliteRepo};
    use crate::adapters::telegram::RecordingTransport;
    use crate::domain::{Content, MessageRef, UserProfile, UserRecord};
    use crate::usecases::test_support::{document, group};
    use std::collections::HashMap;

    const NAV: i64 = -100;
    const STAFF: i64 = 7;

    struct Fixture {
        _dir: tempfile::TempDir,
        transport: Arc<RecordingTransport>,
        repo: Arc<SqliteRepo>,
        nav: NavigatorService,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let repo = Arc::new(SqliteRepo::connect(dir.path(), 1).await.unwrap());
        for (id, name) in [(42, "ann"), (43, "bob")] {
            repo.upsert(&UserRecord {
                user_id: id,
                chat_id: id,
                username: Some(name.into()),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap();
        }
        repo.set_allowed(42, true).await.unwrap();
        let relay = Arc::new(RelayService::new(
            transport.clone(),
            repo.clone(),
            Arc::new(MemorySupportTags::new()),
            HashMap::from([(STAFF, "Anna".to_string())]),
            NAV,
            Vec::new(),
        ));
        let broadcaster = Arc::new(Broadcaster::new(transport.clone(), repo.clone(), vec![NAV]));
        let nav = NavigatorService::new(
            transport.clone(),
            repo.clone(),
            repo.clone(),
            broadcaster,
            relay,
            LocalClock::new(3),
        );
        Fixture {
            _dir: dir,
            transport,
            repo,
            nav,
        }
    }

    fn staff_says(id: i32, text: &str) -> InboundMessage {
        group(NAV, STAFF, id, None, Content::Text(text.into()))
    }

    fn tap(data: &str) -> CallbackEvent {
        CallbackEvent {
            id: "cb".into(),
            from: UserProfile::default(),
            message: Some(MessageRef::new(NAV, 1)),
            data: data.into(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_now() {
        let f = fixture().await;
        assert!(f.nav.handle_message(&staff_says(1, "/broadcast")).await.unwrap());
        assert!(f.nav.handle_message(&staff_says(2, "Привет всем")).await.unwrap());
        assert_eq!(
            f.transport.texts_to(NAV).await.last().unwrap(),
            "Выберите действие с рассылкой:"
        );
        f.nav.handle_callback(&tap(texts::CB_BROADCAST_SEND_NOW)).await.unwrap();

        assert_eq!(f.transport.texts_to(42).await, vec!["Привет всем".to_string()]);
        assert_eq!(f.transport.texts_to(43).await, vec!["Привет всем".to_string()]);
        assert_eq!(
            f.transport.texts_to(NAV).await.last().unwrap(),
            "Рассылка отправлена 2 пользователям."
        );
        // A second tap has nothing to send.
        f.nav.handle_callback(&tap(texts::CB_BROADCAST_SEND_NOW)).await.unwrap();
        assert_eq!(f.transport.texts_to(42).await.len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_validates_and_persists() {
        let f = fixture().await;
        f.nav.handle_message(&staff_says(1, texts::BTN_BROADCAST)).await.unwrap();
        f.nav
            .handle_message(&group(NAV, STAFF, 2, None, document("doc", Some("отчёт"))))
            .await
            .unwrap();
        f.nav.handle_callback(&tap(texts::CB_BROADCAST_SCHEDULE)).await.unwrap();

        f.nav.handle_message(&staff_says(3, "tomorrow")).await.unwrap();
        assert!(f.transport.texts_to(NAV).await.last().unwrap().starts_with("Неверный формат"));
        f.nav.handle_message(&staff_says(4, "01.01.2020 10:00")).await.unwrap();
        assert!(f.transport.texts_to(NAV).await.last().unwrap().starts_with("Время уже прошло"));

        f.nav.handle_message(&staff_says(5, "01.01.2099 10:30")).await.unwrap();
        assert_eq!(
            f.transport.texts_to(NAV).await.last().unwrap(),
            "Ок, отправлю рассылку 01.01.2099 10:30."
        );
        let due = LocalClock::new(3).parse_local("01.01.2099 10:30").unwrap().timestamp();
        let claimed = f.repo.claim_due(due).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].payload.document_file_id.as_deref(), Some("doc"));
        assert_eq!(claimed[0].payload.text, "отчёт");
    }

    #[tokio::test]
    async fn test_direct_message_to_eligible_user() {
        let f = fixture().await;
        f.nav.handle_message(&staff_says(1, texts::BTN_DIRECT)).await.unwrap();
        f.nav.handle_message(&staff_says(2, "@bob")).await.unwrap();
        assert_eq!(f.transport.texts_to(NAV).await.last().unwrap(), NOT_ELIGIBLE);
        f.nav.handle_message(&staff_says(3, "abc")).await.unwrap();
        assert!(f.transport.texts_to(NAV).await.last().unwrap().starts_with("Неверный формат"));

        f.nav.handle_message(&staff_says(4, "@ANN")).await.unwrap();
        f.nav.handle_message(&staff_says(5, "Ваш счёт готов")).await.unwrap();
        assert_eq!(f.transport.texts_to(42).await, vec!["Anna:\nВаш счёт готов".to_string()]);
        assert_eq!(
            f.transport.texts_to(NAV).await.last().unwrap(),
            "Отправлено пользователю @ANN."
        );
        // Panel is idle again: ordinary messages are not claimed.
        assert!(!f.nav.handle_message(&staff_says(6, "hi")).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_and_non_responder() {
        let f = fixture().await;
        let stranger = group(NAV, 99, 1, None, Content::Text(texts::BTN_DIRECT.into()));
        assert!(!f.nav.handle_message(&stranger).await.unwrap());

        f.nav.handle_message(&staff_says(2, "/broadcast")).await.unwrap();
        f.nav.handle_message(&staff_says(3, texts::BTN_CANCEL)).await.unwrap();
        assert_eq!(f.transport.texts_to(NAV).await.last().unwrap(), CANCELLED);
        assert!(!f.nav.handle_message(&staff_says(4, "plain")).await.unwrap());
    }
}
