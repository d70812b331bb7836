use poise::serenity_prelude::{self as serenity, ActivityData, CreateMessage, OnlineStatus};
use tracing::{info, warn};

use crate::{Data, Error};

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    _data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!("Logged in as {}", data_about_bot.user.name);
            ctx.set_presence(
                Some(ActivityData::watching("the deadlines pile up")),
                OnlineStatus::Online,
            );
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            let greeting = format!(
                "👋 Welcome, {}!\n\
                Students: run `/auth student <number> <year>` to get verified.\n\
                Staff: run `/auth staff <address>`.\n\
                A verification code lands in your university inbox; enter it with `/auth code`.",
                new_member.user.name
            );
            // Some people close their DMs; the server still works for them.
            if let Err(e) = new_member
                .user
                .direct_message(ctx, CreateMessage::new().content(greeting))
                .await
            {
                warn!("Could not greet {}: {}", new_member.user.name, e);
            }
        }
        _ => {}
    }
    Ok(())
}
