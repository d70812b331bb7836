use async_trait::async_trait;
use chrono::Utc;
use poise::serenity_prelude::{
    self as serenity, ChannelId, PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId,
    UserId,
};
use std::sync::Arc;

use crate::auth::{AuthWorkflow, ClaimOutcome, MemberKind, RoleGrants};
use crate::roster::Cohort;
use crate::{Context, Error};

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum CohortChoice {
    #[name = "M1"]
    M1,
    #[name = "M2"]
    M2,
}

impl From<CohortChoice> for Cohort {
    fn from(choice: CohortChoice) -> Self {
        match choice {
            CohortChoice::M1 => Cohort::M1,
            CohortChoice::M2 => Cohort::M2,
        }
    }
}

/// Role and channel-permission effects, applied through the Discord API.
struct DiscordGrants {
    http: Arc<serenity::Http>,
    guild_id: serenity::GuildId,
}

impl DiscordGrants {
    fn from_ctx(ctx: &Context<'_>) -> Result<Self, Error> {
        let guild_id = ctx
            .guild_id()
            .ok_or("This command must be used in a server")?;
        Ok(Self {
            http: ctx.serenity_context().http.clone(),
            guild_id,
        })
    }
}

#[async_trait]
impl RoleGrants for DiscordGrants {
    async fn grant_role(&self, user_id: u64, role_id: u64) -> crate::error::Result<()> {
        self.http
            .add_member_role(
                self.guild_id,
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("securibot verification"),
            )
            .await?;
        Ok(())
    }

    async fn revoke_role(&self, user_id: u64, role_id: u64) -> crate::error::Result<()> {
        self.http
            .remove_member_role(
                self.guild_id,
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("securibot deauthentication"),
            )
            .await?;
        Ok(())
    }

    async fn grant_channel(&self, user_id: u64, channel_id: u64) -> crate::error::Result<()> {
        ChannelId::new(channel_id)
            .create_permission(
                &self.http,
                PermissionOverwrite {
                    allow: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
                    deny: Permissions::empty(),
                    kind: PermissionOverwriteType::Member(UserId::new(user_id)),
                },
            )
            .await?;
        Ok(())
    }

    async fn revoke_channel(&self, user_id: u64, channel_id: u64) -> crate::error::Result<()> {
        ChannelId::new(channel_id)
            .delete_permission(
                &self.http,
                PermissionOverwriteType::Member(UserId::new(user_id)),
            )
            .await?;
        Ok(())
    }
}

fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{}…@{}", visible, domain)
        }
        None => email.to_string(),
    }
}

fn workflow(data: &crate::Data) -> AuthWorkflow<'_> {
    AuthWorkflow::new(&data.db, &data.roster, &data.tokens, &data.config)
}

/// Link your Discord account to your university identity
#[poise::command(
    slash_command,
    subcommands("student", "staff", "code", "logout", "grant", "ungrant", "lookup")
)]
pub async fn auth(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Request a verification code for your student number
#[poise::command(slash_command, ephemeral)]
pub async fn student(
    ctx: Context<'_>,
    #[description = "Your student number"] student_id: String,
    #[description = "Your year"] cohort: CohortChoice,
) -> Result<(), Error> {
    let data = ctx.data();
    let result = workflow(data)
        .begin_student(
            data.mailer.as_ref(),
            ctx.author().id.get(),
            student_id.trim(),
            cohort.into(),
            Utc::now(),
        )
        .await;

    let reply = match result {
        Ok(ClaimOutcome::MailSent { email }) => format!(
            "📬 A verification code is on its way to {}. Enter it with `/auth code` within the hour.",
            mask_email(&email)
        ),
        Ok(ClaimOutcome::AwaitingToken { email }) => format!(
            "⏳ A code was already sent to {} less than an hour ago. Enter it with `/auth code`.",
            mask_email(&email)
        ),
        Err(e) => e.user_message(),
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}

/// Request a verification code for a staff address
#[poise::command(slash_command, ephemeral)]
pub async fn staff(
    ctx: Context<'_>,
    #[description = "Your university address"] email: String,
    #[description = "Name to display on the server"] display_name: Option<String>,
) -> Result<(), Error> {
    let data = ctx.data();
    let result = workflow(data)
        .begin_staff(
            data.mailer.as_ref(),
            ctx.author().id.get(),
            &email,
            display_name,
            Utc::now(),
        )
        .await;

    let reply = match result {
        Ok(ClaimOutcome::MailSent { email }) => format!(
            "📬 A verification code is on its way to {}. Enter it with `/auth code` within the hour.",
            mask_email(&email)
        ),
        Ok(ClaimOutcome::AwaitingToken { email }) => format!(
            "⏳ A code was already sent to {} less than an hour ago. Enter it with `/auth code`.",
            mask_email(&email)
        ),
        Err(e) => e.user_message(),
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}

/// Enter the verification code from your inbox
#[poise::command(slash_command, ephemeral, guild_only)]
pub async fn code(
    ctx: Context<'_>,
    #[description = "The code from the verification mail"] code: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let grants = DiscordGrants::from_ctx(&ctx)?;
    let result = workflow(data)
        .complete(&grants, ctx.author().id.get(), code.trim(), Utc::now())
        .await;

    let reply = match result {
        Ok(profile) => {
            if let Some(name) = &profile.display_name {
                // Nickname override is best effort; verification already went through.
                if let Err(e) = grants
                    .guild_id
                    .edit_member(
                        ctx.serenity_context(),
                        ctx.author().id,
                        serenity::EditMember::new().nickname(name),
                    )
                    .await
                {
                    tracing::warn!("Could not set nickname for {}: {}", ctx.author().id, e);
                }
            }
            match profile.kind {
                MemberKind::Student => {
                    let cohort = profile
                        .cohort
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "student".to_string());
                    format!("✅ Verified! You now have the {} role. Welcome aboard.", cohort)
                }
                MemberKind::Staff => "✅ Verified! You now have the staff role.".to_string(),
            }
        }
        Err(e) => e.user_message(),
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}

/// Remove your verification and the roles that came with it
#[poise::command(slash_command, ephemeral, guild_only)]
pub async fn logout(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let grants = DiscordGrants::from_ctx(&ctx)?;
    let reply = match workflow(data)
        .deauthenticate(&grants, ctx.author().id.get())
        .await
    {
        Ok(()) => "👋 Your verification was removed and your roles revoked.".to_string(),
        Err(e) => e.user_message(),
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}

/// Give a verified staff member access to an extra channel
#[poise::command(slash_command, ephemeral, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn grant(
    ctx: Context<'_>,
    #[description = "Staff member"] member: serenity::User,
    #[description = "Channel to open up"] channel: serenity::Channel,
) -> Result<(), Error> {
    let data = ctx.data();
    let grants = DiscordGrants::from_ctx(&ctx)?;
    let reply = match workflow(data)
        .add_access(&grants, member.id.get(), channel.id().get())
        .await
    {
        Ok(()) => format!("✅ {} now has access to <#{}>.", member.name, channel.id()),
        Err(e) => e.user_message(),
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}

/// Take a staff member's extra channel access away
#[poise::command(slash_command, ephemeral, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn ungrant(
    ctx: Context<'_>,
    #[description = "Staff member"] member: serenity::User,
    #[description = "Channel to close"] channel: serenity::Channel,
) -> Result<(), Error> {
    let data = ctx.data();
    let grants = DiscordGrants::from_ctx(&ctx)?;
    let reply = match workflow(data)
        .remove_access(&grants, member.id.get(), channel.id().get())
        .await
    {
        Ok(()) => format!("✅ Access to <#{}> was removed for {}.", channel.id(), member.name),
        Err(e) => e.user_message(),
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}

/// Check the enrollment exports for a student number
#[poise::command(slash_command, ephemeral, required_permissions = "MANAGE_ROLES")]
pub async fn lookup(
    ctx: Context<'_>,
    #[description = "Student number to look up"] student_id: String,
    #[description = "Restrict to one year"] cohort: Option<CohortChoice>,
) -> Result<(), Error> {
    let data = ctx.data();
    let cohort = cohort.map(Cohort::from);

    let reply = match data.roster.find_by_id(student_id.trim(), cohort) {
        Some(record) => format!(
            "🎓 `{}` — {} {}, {} {}, {}",
            record.student_id,
            record.given_name,
            record.family_name,
            record.cohort,
            record.track,
            record.email
        ),
        None => {
            let pool = data.roster.list_all(cohort).len();
            format!(
                "❌ No match for `{}` among {} roster entries.",
                student_id.trim(),
                pool
            )
        }
    };
    poise::say_reply(ctx, reply).await?;
    Ok(())
}
