//! User-facing messages for registration and admin verification.

use crate::actions::CallbackAction;
use crate::channels::{Button, OutgoingMessage};
use crate::posting::prompts::main_menu;

fn admin_added_row() -> Vec<Button> {
    vec![Button::callback("✅ Done", CallbackAction::AdminAdded)]
}

/// Steps for granting the bot posting rights.
fn admin_steps(bot_username: &str) -> String {
    format!(
        "1️⃣ Open your channel\n\
         2️⃣ Tap the channel name at the top\n\
         3️⃣ Choose \"Manage channel\"\n\
         4️⃣ Open \"Administrators\"\n\
         5️⃣ Tap \"Add administrator\"\n\
         6️⃣ Find me (@{bot_username}) and add me\n\
         7️⃣ Allow \"Post messages\""
    )
}

pub fn welcome() -> OutgoingMessage {
    OutgoingMessage::text(
        "👋 Hi! I help you write and publish posts to your Telegram channel.\n\n\
         To get started, send me the email you used to sign up.",
    )
}

pub fn already_registered() -> OutgoingMessage {
    main_menu("🎉 You're already registered!\n\nUse the button below to create a post.")
}

pub fn email_not_found_in_text() -> OutgoingMessage {
    OutgoingMessage::text("🤔 I couldn't find an email address in your message. Please send it again.")
}

pub fn email_unknown(email: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "❌ I couldn't find an account for {email}.\n\n\
         Check the spelling or use the email you signed up with."
    ))
}

pub fn email_taken() -> OutgoingMessage {
    OutgoingMessage::text("❌ This email is already linked to another Telegram account.")
}

pub fn email_confirmed() -> OutgoingMessage {
    OutgoingMessage::text(
        "✅ Email confirmed!\n\n\
         Now send me a link to your channel, for example @my_channel or https://t.me/my_channel",
    )
}

pub fn channel_invalid() -> OutgoingMessage {
    OutgoingMessage::text(
        "❌ I couldn't recognise a channel. Send it as one of:\n\
         • @channel_name\n\
         • https://t.me/channel_name",
    )
}

pub fn admin_instructions(channel_url: &str, bot_username: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "📢 Channel saved: {channel_url}\n\n\
         Now add me as an administrator of the channel:\n\n{}\n\n\
         Press \"Done\" when you're finished 👇",
        admin_steps(bot_username)
    ))
    .with_row(admin_added_row())
}

pub fn admin_reminder(channel_url: &str, bot_username: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "🤖 Your channel: {channel_url}\n\n\
         To finish registration, add me as an administrator:\n\n{}\n\n\
         Press \"Done\" when you're finished 👇\n\n\
         💡 To change the channel, just send a new link.",
        admin_steps(bot_username)
    ))
    .with_row(admin_added_row())
}

pub fn admin_confirmed() -> OutgoingMessage {
    main_menu("🎉 All set! I can post to your channel now.\n\nPress the button below to write your first post.")
}

pub fn not_admin() -> OutgoingMessage {
    OutgoingMessage::text(
        "⚠️ I'm not an administrator of your channel yet, or I can't post messages there.\n\n\
         Add me as an administrator with the \"Post messages\" permission and press \"Done\".",
    )
    .with_row(admin_added_row())
}

pub fn channel_not_found() -> OutgoingMessage {
    OutgoingMessage::text(
        "❌ I can't find your channel. Make sure the link is correct and that I've been added to it.\n\n\
         You can send a new channel link at any time.",
    )
    .with_row(admin_added_row())
}

pub fn not_registered() -> OutgoingMessage {
    OutgoingMessage::text("❌ Your registration isn't finished yet. Send /start to continue.")
}
