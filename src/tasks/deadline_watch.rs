use async_trait::async_trait;
use chrono::Utc;
use poise::serenity_prelude::{self as serenity, CreateMessage};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::db::{deadline, watch};
use crate::error::Result;
use crate::schedule::reminders::{evaluate, ReminderAction, ReminderState, Threshold};
use crate::schedule::WatchKind;
use crate::{Data, Error};

use super::TaskHandler;

const WATCH_INTERVAL: Duration = Duration::from_secs(60);

/// Walks the upcoming deadlines once a minute, firing threshold reminders
/// and retiring items whose due time has passed.
pub struct DeadlineWatchTask;

impl DeadlineWatchTask {
    pub fn new() -> Self {
        Self
    }

    async fn check_all(&self, ctx: &serenity::Context, db: &DatabaseConnection) -> Result<()> {
        let watches = watch::Entity::find()
            .filter(watch::Column::Kind.eq(WatchKind::Deadlines.as_str()))
            .all(db)
            .await?;

        for entry in watches {
            if let Err(e) = self.check_watch(ctx, db, &entry).await {
                warn!("Watch {}: reminder pass failed: {}", entry.id, e);
            }
        }
        Ok(())
    }

    async fn check_watch(
        &self,
        ctx: &serenity::Context,
        db: &DatabaseConnection,
        entry: &watch::Model,
    ) -> Result<()> {
        let now = Utc::now();
        let upcoming = deadline::Entity::find()
            .filter(deadline::Column::WatchId.eq(entry.id))
            .filter(deadline::Column::Status.eq(deadline::STATUS_UPCOMING))
            .all(db)
            .await?;

        // Reminders land in the broadcast channel when one is set.
        let target = serenity::ChannelId::new(
            entry.broadcast_channel_id.unwrap_or(entry.channel_id) as u64,
        );

        for item in upcoming {
            let state = ReminderState {
                week: item.reminded_week,
                day: item.reminded_day,
                hour: item.reminded_hour,
            };

            match evaluate(item.due_at, now, state) {
                ReminderAction::None => {}
                ReminderAction::Retire => {
                    info!("Deadline {:?} is past due", item.title);
                    let mut active: deadline::ActiveModel = item.into();
                    active.status = Set(deadline::STATUS_PAST_DUE.to_string());
                    active.update(db).await?;
                }
                ReminderAction::Remind { fire, spend } => {
                    let course = item
                        .course
                        .as_deref()
                        .map(|c| format!(" ({})", c))
                        .unwrap_or_default();
                    target
                        .send_message(
                            &ctx.http,
                            CreateMessage::new().content(format!(
                                "⏰ **{}**{} is due <t:{}:R> — about {} left!",
                                item.title,
                                course,
                                item.due_at.timestamp(),
                                fire.label()
                            )),
                        )
                        .await?;

                    let mut active: deadline::ActiveModel = item.into();
                    for threshold in spend {
                        match threshold {
                            Threshold::Week => active.reminded_week = Set(true),
                            Threshold::Day => active.reminded_day = Set(true),
                            Threshold::Hour => active.reminded_hour = Set(true),
                        }
                    }
                    active.update(db).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for DeadlineWatchTask {
    fn name(&self) -> &'static str {
        "deadline_watch"
    }

    async fn run(&mut self, ctx: &serenity::Context, data: Data) -> std::result::Result<(), Error> {
        let mut interval = time::interval(WATCH_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = self.check_all(ctx, &data.db).await {
                tracing::error!("Deadline watch cycle failed: {}", e);
            }
        }
    }
}
