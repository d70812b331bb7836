use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, QueryFilter,
    QueryOrder,
};

use crate::db::tool;
use crate::{Context, Error};

/// The server's security tool catalogue
#[poise::command(slash_command, subcommands("add", "remove", "search", "list"))]
pub async fn toolbox(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a tool to the catalogue
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Tool name"] name: String,
    #[description = "Category (recon, forensics, pwn, ...)"] category: String,
    #[description = "Homepage or repository"] url: String,
    #[description = "What it is good at"] notes: Option<String>,
) -> Result<(), Error> {
    let db = &ctx.data().db;

    let existing = tool::Entity::find()
        .filter(tool::Column::Name.eq(name.as_str()))
        .one(db)
        .await?;
    if existing.is_some() {
        poise::say_reply(ctx, format!("❌ **{}** is already in the toolbox.", name)).await?;
        return Ok(());
    }

    tool::ActiveModel {
        name: Set(name.clone()),
        category: Set(category.to_lowercase()),
        url: Set(url),
        notes: Set(notes),
        added_by: Set(ctx.author().id.get() as i64),
        added_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    poise::say_reply(ctx, format!("🧰 Added **{}** to the toolbox.", name)).await?;
    Ok(())
}

/// Remove a tool from the catalogue
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD")]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Tool name"] name: String,
) -> Result<(), Error> {
    let db = &ctx.data().db;
    let deleted = tool::Entity::delete_many()
        .filter(tool::Column::Name.eq(name.as_str()))
        .exec(db)
        .await?;

    let reply = if deleted.rows_affected == 0 {
        format!("❌ No tool named **{}** in the toolbox.", name)
    } else {
        format!("🗑️ Removed **{}** from the toolbox.", name)
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}

/// Find tools by name or category
#[poise::command(slash_command)]
pub async fn search(
    ctx: Context<'_>,
    #[description = "Part of a name or category"] query: String,
) -> Result<(), Error> {
    let db = &ctx.data().db;
    let tools = tool::Entity::find()
        .filter(
            Condition::any()
                .add(tool::Column::Name.contains(query.as_str()))
                .add(tool::Column::Category.contains(query.to_lowercase().as_str())),
        )
        .order_by_asc(tool::Column::Name)
        .all(db)
        .await?;

    if tools.is_empty() {
        poise::say_reply(ctx, format!("Nothing in the toolbox matches `{}`.", query)).await?;
        return Ok(());
    }

    poise::say_reply(ctx, format_tools(&tools)).await?;
    Ok(())
}

/// List the catalogue, optionally by category
#[poise::command(slash_command)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Only this category"] category: Option<String>,
) -> Result<(), Error> {
    let db = &ctx.data().db;
    let mut query = tool::Entity::find().order_by_asc(tool::Column::Category);
    if let Some(category) = &category {
        query = query.filter(tool::Column::Category.eq(category.to_lowercase().as_str()));
    }
    let tools = query.order_by_asc(tool::Column::Name).all(db).await?;

    if tools.is_empty() {
        poise::say_reply(ctx, "The toolbox is empty — `/toolbox add` something useful!").await?;
        return Ok(());
    }

    poise::say_reply(ctx, format_tools(&tools)).await?;
    Ok(())
}

fn format_tools(tools: &[tool::Model]) -> String {
    let mut out = format!("🧰 **Toolbox** ({} tools)\n", tools.len());
    for tool in tools {
        out.push_str(&format!("• **{}** [{}] — <{}>", tool.name, tool.category, tool.url));
        if let Some(notes) = &tool.notes {
            out.push_str(&format!(" · {}", notes));
        }
        out.push('\n');
    }
    out
}
