//! Long polling via the teloxide Dispatcher.
//!
//! The dispatcher only maps updates and pushes them into a channel; a single consumer
//! hands them to the EventHandler one at a time, so flow state never sees concurrent updates.

use crate::adapters::telegram::mapper;
use crate::domain::InboundEvent;
use crate::ports::EventHandler;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Bounded inbound queue. Polling waits when the consumer falls behind.
pub const EVENT_QUEUE_SIZE: usize = 100;

/// Start long polling in the background. Updates arrive on the returned receiver.
pub fn spawn_polling(bot: Bot) -> (mpsc::Receiver<InboundEvent>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let msg_tx = tx.clone();
    let cb_tx = tx;

    let handle = tokio::spawn(async move {
        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(move |msg: Message| {
                let tx = msg_tx.clone();
                async move {
                    let event = InboundEvent::Message(mapper::message_to_domain(&msg));
                    if tx.send(event).await.is_err() {
                        warn!("inbound channel closed, dropping message");
                    }
                    respond(())
                }
            }))
            .branch(
                Update::filter_callback_query().endpoint(move |query: CallbackQuery| {
                    let tx = cb_tx.clone();
                    async move {
                        let event = InboundEvent::Callback(mapper::callback_to_domain(&query));
                        if tx.send(event).await.is_err() {
                            warn!("inbound channel closed, dropping callback");
                        }
                        respond(())
                    }
                }),
            );

        info!("starting Telegram long polling");
        Dispatcher::builder(bot, handler)
            .default_handler(|_| async {})
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
        info!("Telegram polling stopped");
    });

    (rx, handle)
}

/// Drain events sequentially until the channel closes. Handler errors are logged, never fatal.
pub async fn run_event_loop(mut rx: mpsc::Receiver<InboundEvent>, handler: Arc<dyn EventHandler>) {
    while let Some(event) = rx.recv().await {
        let kind = match &event {
            InboundEvent::Message(m) => {
                debug!(chat_id = m.chat_id, message_id = m.message_id, "message");
                "message"
            }
            InboundEvent::Callback(c) => {
                debug!(user_id = c.from.user_id, data = %c.data, "callback");
                "callback"
            }
        };
        if let Err(e) = handler.handle(event).await {
            error!(kind, error = %e, "event handling failed");
        }
    }
}
