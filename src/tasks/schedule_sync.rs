use async_trait::async_trait;
use chrono::Utc;
use poise::serenity_prelude::{self as serenity, CreateMessage, EditMessage};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::db::watch;
use crate::error::{BotError, Result};
use crate::schedule::{
    broadcast_fingerprint, fingerprint, parse_deadlines, parse_rows, render, sync_deadlines,
    WatchKind,
};
use crate::{Data, Error};

use super::TaskHandler;

const SYNC_INTERVAL: Duration = Duration::from_secs(60 * 5);
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Periodically re-fetches every tracked source and touches Discord only
/// when the semantic content actually moved.
pub struct ScheduleSyncTask {
    client: reqwest::Client,
}

impl ScheduleSyncTask {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    async fn sync_all(&self, ctx: &serenity::Context, db: &DatabaseConnection) -> Result<()> {
        let watches = watch::Entity::find().all(db).await?;

        // One broken source must not block the rest.
        for entry in watches {
            let id = entry.id;
            if let Err(e) = self.sync_watch(ctx, db, entry).await {
                warn!("Watch {}: sync failed: {}", id, e);
            }
        }
        Ok(())
    }

    async fn sync_watch(
        &self,
        ctx: &serenity::Context,
        db: &DatabaseConnection,
        entry: watch::Model,
    ) -> Result<()> {
        let Some(kind) = WatchKind::parse(&entry.kind) else {
            warn!("Watch {}: unknown kind {:?}, skipping", entry.id, entry.kind);
            return Ok(());
        };

        let text = self
            .client
            .get(entry.source_url.as_str())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BotError::ExternalService(format!("fetch {}: {}", entry.source_url, e)))?
            .text()
            .await
            .map_err(|e| BotError::ExternalService(format!("read {}: {}", entry.source_url, e)))?;

        let now = Utc::now();
        let rows = parse_rows(&text);
        let new_fingerprint = fingerprint(kind, &rows);

        if entry.fingerprint.as_deref() == Some(new_fingerprint.as_str()) {
            // Rows are unchanged, but items may have slipped past due since
            // the last cycle; keep the broadcast baseline current so their
            // eventual removal from the source stays silent.
            let refreshed = broadcast_fingerprint(kind, &rows, now);
            if entry.broadcast_fingerprint.as_deref() != Some(refreshed.as_str()) {
                let mut active: watch::ActiveModel = entry.into();
                active.broadcast_fingerprint = Set(Some(refreshed));
                active.update(db).await?;
            }
            return Ok(());
        }

        let rendered = render(kind, &rows, now);
        let channel = serenity::ChannelId::new(entry.channel_id as u64);
        let message_id = self
            .upsert_display(ctx, channel, entry.message_id, &rendered)
            .await?;

        let new_broadcast = broadcast_fingerprint(kind, &rows, now);
        let broadcast_moved = entry.broadcast_fingerprint.as_deref() != Some(new_broadcast.as_str());
        // The very first sync posts the display without announcing anything.
        if broadcast_moved && entry.broadcast_fingerprint.is_some() {
            if let Some(broadcast_channel) = entry.broadcast_channel_id {
                serenity::ChannelId::new(broadcast_channel as u64)
                    .send_message(
                        &ctx.http,
                        CreateMessage::new().content(format!(
                            "📢 The {} in <#{}> changed, take a look.",
                            kind.as_str(),
                            entry.channel_id
                        )),
                    )
                    .await?;
            }
        }

        if kind == WatchKind::Deadlines {
            sync_deadlines(db, entry.id, &parse_deadlines(&rows), now).await?;
        }

        info!("Watch {}: display refreshed", entry.id);
        let mut active: watch::ActiveModel = entry.into();
        active.message_id = Set(Some(message_id));
        active.fingerprint = Set(Some(new_fingerprint));
        active.broadcast_fingerprint = Set(Some(new_broadcast));
        active.update(db).await?;

        Ok(())
    }

    /// Edits the existing display message, falling back to a fresh post
    /// when it was deleted out from under us.
    async fn upsert_display(
        &self,
        ctx: &serenity::Context,
        channel: serenity::ChannelId,
        message_id: Option<i64>,
        rendered: &str,
    ) -> Result<i64> {
        if let Some(id) = message_id {
            let edit = channel
                .edit_message(
                    &ctx.http,
                    serenity::MessageId::new(id as u64),
                    EditMessage::new().content(rendered),
                )
                .await;
            match edit {
                Ok(_) => return Ok(id),
                Err(e) => warn!("Display message {} gone ({}), reposting", id, e),
            }
        }

        let message = channel
            .send_message(&ctx.http, CreateMessage::new().content(rendered))
            .await?;
        Ok(message.id.get() as i64)
    }
}

#[async_trait]
impl TaskHandler for ScheduleSyncTask {
    fn name(&self) -> &'static str {
        "schedule_sync"
    }

    async fn run(&mut self, ctx: &serenity::Context, data: Data) -> std::result::Result<(), Error> {
        let mut interval = time::interval(SYNC_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = self.sync_all(ctx, &data.db).await {
                tracing::error!("Schedule sync cycle failed: {}", e);
            }
        }
    }
}
