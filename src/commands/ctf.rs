use chrono::Utc;
use poise::serenity_prelude::{Color, CreateEmbed};
use poise::CreateReply;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, EntityTrait, QueryOrder,
};

use crate::db::ctf_player;
use crate::{Context, Error};

/// CTF team directory and upcoming events
#[poise::command(slash_command, subcommands("join", "leave", "roster", "upcoming"))]
pub async fn ctf(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Put yourself on the CTF team roster
#[poise::command(slash_command, ephemeral)]
pub async fn join(
    ctx: Context<'_>,
    #[description = "Your handle on CTF platforms"] handle: String,
    #[description = "Your main category (pwn, web, crypto, ...)"] category: String,
) -> Result<(), Error> {
    let db = &ctx.data().db;
    let user_id = ctx.author().id.get() as i64;

    let reply = match ctf_player::Entity::find_by_id(user_id).one(db).await? {
        Some(existing) => {
            let mut active: ctf_player::ActiveModel = existing.into();
            active.handle = Set(handle.clone());
            active.category = Set(category.clone());
            active.update(db).await?;
            format!("🚩 Updated your roster entry: **{}** ({}).", handle, category)
        }
        None => {
            ctf_player::ActiveModel {
                user_id: Set(user_id),
                handle: Set(handle.clone()),
                category: Set(category.clone()),
                joined_at: Set(Utc::now()),
            }
            .insert(db)
            .await?;
            format!("🚩 Welcome to the team, **{}** ({})!", handle, category)
        }
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}

/// Take yourself off the CTF team roster
#[poise::command(slash_command, ephemeral)]
pub async fn leave(ctx: Context<'_>) -> Result<(), Error> {
    let db = &ctx.data().db;
    let deleted = ctf_player::Entity::delete_by_id(ctx.author().id.get() as i64)
        .exec(db)
        .await?;

    let reply = if deleted.rows_affected == 0 {
        "❌ You were not on the roster.".to_string()
    } else {
        "👋 You are off the roster. Come back for the next CTF!".to_string()
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}

/// Show who plays for the team
#[poise::command(slash_command)]
pub async fn roster(ctx: Context<'_>) -> Result<(), Error> {
    let db = &ctx.data().db;
    let players = ctf_player::Entity::find()
        .order_by_asc(ctf_player::Column::Category)
        .order_by_asc(ctf_player::Column::Handle)
        .all(db)
        .await?;

    if players.is_empty() {
        poise::say_reply(ctx, "The roster is empty — `/ctf join` to be the first!").await?;
        return Ok(());
    }

    let mut lines = format!("🚩 **CTF roster** ({} players)\n", players.len());
    for player in &players {
        lines.push_str(&format!(
            "• **{}** — {} (<@{}>)\n",
            player.handle, player.category, player.user_id
        ));
    }
    poise::say_reply(ctx, lines).await?;
    Ok(())
}

/// Upcoming CTFs over the next month, from CTFtime
#[poise::command(slash_command)]
pub async fn upcoming(ctx: Context<'_>) -> Result<(), Error> {
    let events = match ctx.data().ctftime.upcoming(8).await {
        Ok(events) => events,
        Err(e) => {
            poise::say_reply(ctx, e.user_message()).await?;
            return Ok(());
        }
    };

    if events.is_empty() {
        poise::say_reply(ctx, "No upcoming events found this month.").await?;
        return Ok(());
    }

    let mut embed = CreateEmbed::default()
        .title("Upcoming CTFs")
        .color(Color::from_rgb(204, 0, 0))
        .timestamp(Utc::now());
    for event in &events {
        embed = embed.field(
            event.title.as_str(),
            format!(
                "{} · starts <t:{}:F> · weight {:.1}\n{}",
                event.format,
                event.start.timestamp(),
                event.weight,
                event.url
            ),
            false,
        );
    }

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
