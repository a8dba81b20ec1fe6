//! Scheduler: daily reminder and the durable scheduled-broadcast queue.
//!
//! Runs on a fixed tick. The reminder fires when the local clock shows the target
//! hour:minute and has not fired today; due broadcasts are claimed atomically, so a
//! broadcast is sent by at most one process.

use super::broadcaster::Broadcaster;
use crate::domain::{Audience, DomainError};
use crate::ports::BroadcastQueue;
use crate::shared::clock::LocalClock;
use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

pub struct Reminder {
    pub hour: u32,
    pub minute: u32,
    pub text: String,
}

pub struct SchedulerService {
    broadcaster: Arc<Broadcaster>,
    queue: Arc<dyn BroadcastQueue>,
    reminder: Option<Reminder>,
    clock: LocalClock,
    tick: Duration,
    last_reminder: Mutex<Option<NaiveDate>>,
}

impl SchedulerService {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        queue: Arc<dyn BroadcastQueue>,
        reminder: Option<Reminder>,
        clock: LocalClock,
        tick: Duration,
    ) -> Self {
        Self {
            broadcaster,
            queue,
            reminder,
            clock,
            tick,
            last_reminder: Mutex::new(None),
        }
    }

    /// Runs forever; one tick at a time.
    pub async fn run(&self) {
        info!(
            tick_secs = self.tick.as_secs(),
            reminder = self.reminder.is_some(),
            "scheduler started"
        );
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick(self.clock.now()).await;
        }
    }

    /// One scheduler pass at local time `now`. Errors are logged.
    pub async fn tick(&self, now: DateTime<FixedOffset>) {
        if let Err(e) = self.remind(now).await {
            error!(error = %e, "reminder failed");
        }
        if let Err(e) = self.send_due(now).await {
            error!(error = %e, "scheduled broadcasts failed");
        }
    }

    async fn remind(&self, now: DateTime<FixedOffset>) -> Result<(), DomainError> {
        let Some(reminder) = &self.reminder else {
            return Ok(());
        };
        if now.hour() != reminder.hour || now.minute() != reminder.minute {
            return Ok(());
        }
        let today = now.date_naive();
        {
            let mut last = self.last_reminder.lock().await;
            if *last == Some(today) {
                return Ok(());
            }
            *last = Some(today);
        }
        let reached = self
            .broadcaster
            .send_text(Audience::Eligible, &reminder.text)
            .await?;
        info!(reached, date = %today, "daily reminder sent");
        Ok(())
    }

    /// A broadcast that fails before reaching anyone is released for the next tick.
    async fn send_due(&self, now: DateTime<FixedOffset>) -> Result<(), DomainError> {
        for due in self.queue.claim_due(now.timestamp()).await? {
            match self.broadcaster.broadcast(&due.payload).await {
                Ok(reached) => info!(broadcast_id = due.id, reached, "scheduled broadcast sent"),
                Err(e) => {
                    error!(broadcast_id = due.id, error = %e, "scheduled broadcast failed");
                    if let Err(e) = self.queue.release(due.id).await {
                        error!(broadcast_id = due.id, error = %e, "failed to release broadcast");
                    }
                }
            }
        }
        Ok(())
    }
}
