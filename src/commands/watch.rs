use chrono::Utc;
use poise::serenity_prelude as serenity;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter,
};

use crate::db::{deadline, watch};
use crate::schedule::WatchKind;
use crate::{Context, Error};

/// Track an external schedule export in a channel
#[poise::command(slash_command, subcommands("timetable", "deadlines", "stop"))]
pub async fn watch(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Keep a timetable display up to date in a channel
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn timetable(
    ctx: Context<'_>,
    #[description = "Channel for the display message"] channel: serenity::Channel,
    #[description = "URL of the ;-separated export"] source_url: String,
    #[description = "Channel for change announcements"] announce: Option<serenity::Channel>,
) -> Result<(), Error> {
    create_watch(ctx, WatchKind::Timetable, channel, source_url, announce).await
}

/// Keep a deadline list up to date and remind before each due date
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn deadlines(
    ctx: Context<'_>,
    #[description = "Channel for the display message"] channel: serenity::Channel,
    #[description = "URL of the ;-separated export"] source_url: String,
    #[description = "Channel for announcements and reminders"] announce: Option<serenity::Channel>,
) -> Result<(), Error> {
    create_watch(ctx, WatchKind::Deadlines, channel, source_url, announce).await
}

async fn create_watch(
    ctx: Context<'_>,
    kind: WatchKind,
    channel: serenity::Channel,
    source_url: String,
    announce: Option<serenity::Channel>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command must be used in a server")?;

    if !source_url.starts_with("http://") && !source_url.starts_with("https://") {
        poise::say_reply(ctx, "❌ The source must be an http(s) URL.").await?;
        return Ok(());
    }

    let db = &ctx.data().db;
    let existing = watch::Entity::find()
        .filter(watch::Column::ChannelId.eq(channel.id().get() as i64))
        .filter(watch::Column::Kind.eq(kind.as_str()))
        .one(db)
        .await?;
    if existing.is_some() {
        poise::say_reply(
            ctx,
            format!("❌ <#{}> already has a {} watch.", channel.id(), kind.as_str()),
        )
        .await?;
        return Ok(());
    }

    watch::ActiveModel {
        guild_id: Set(guild_id.get() as i64),
        channel_id: Set(channel.id().get() as i64),
        message_id: Set(None),
        kind: Set(kind.as_str().to_string()),
        source_url: Set(source_url),
        broadcast_channel_id: Set(announce.map(|c| c.id().get() as i64)),
        fingerprint: Set(None),
        broadcast_fingerprint: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    poise::say_reply(
        ctx,
        format!(
            "📌 Now tracking a {} in <#{}>. The first display lands within a few minutes.",
            kind.as_str(),
            channel.id()
        ),
    )
    .await?;
    Ok(())
}

/// Stop tracking a channel's schedule displays
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn stop(
    ctx: Context<'_>,
    #[description = "Channel to stop tracking"] channel: serenity::Channel,
) -> Result<(), Error> {
    let db = &ctx.data().db;
    let entries = watch::Entity::find()
        .filter(watch::Column::ChannelId.eq(channel.id().get() as i64))
        .all(db)
        .await?;

    if entries.is_empty() {
        poise::say_reply(ctx, format!("❌ Nothing is tracked in <#{}>.", channel.id())).await?;
        return Ok(());
    }

    let ids: Vec<i32> = entries.iter().map(|e| e.id).collect();
    deadline::Entity::delete_many()
        .filter(deadline::Column::WatchId.is_in(ids.clone()))
        .exec(db)
        .await?;
    watch::Entity::delete_many()
        .filter(watch::Column::Id.is_in(ids))
        .exec(db)
        .await?;

    poise::say_reply(
        ctx,
        format!("🛑 Stopped {} watch(es) in <#{}>.", entries.len(), channel.id()),
    )
    .await?;
    Ok(())
}
