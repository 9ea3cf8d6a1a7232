//! User-facing messages and keyboards for the post-creation flow.

use crate::actions::CallbackAction;
use crate::channels::{Button, OutgoingMessage};
use crate::config::MAX_MATERIALS;

use super::model::{ButtonType, PostSession};

/// Interview questions, in order. The flow asks the first N.
const QUESTIONS: [&str; 6] = [
    "What is the post about? Describe the main topic in a few sentences.",
    "Who is this post for? Describe your reader.",
    "What is the one thing the reader should take away?",
    "Any facts, numbers or personal examples worth including?",
    "What should the reader do after reading?",
    "Any wishes about tone or style?",
];

/// Canned labels for direct-message buttons.
pub const DM_LABELS: [&str; 4] = [
    "💬 Message me",
    "📩 Contact us",
    "💌 Ask a question",
    "🗣 Talk to the author",
];

/// Canned labels for external-link buttons.
pub const LINK_LABELS: [&str; 4] = [
    "🌐 Visit website",
    "📖 Learn more",
    "🛒 Buy now",
    "📋 Details",
];

pub fn canned_labels(button_type: ButtonType) -> &'static [&'static str] {
    match button_type {
        ButtonType::DirectMessage => &DM_LABELS,
        ButtonType::Link => &LINK_LABELS,
    }
}

/// The "write a post" entry button shown to registered users.
pub fn main_menu(text: impl Into<String>) -> OutgoingMessage {
    OutgoingMessage::text(text).with_row(vec![Button::callback(
        "📝 Write a post",
        CallbackAction::WritePost,
    )])
}

pub fn session_started(question_count: usize) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "✍️ Let's write a post together!\n\n\
         I'll ask you {question_count} short question(s). Answer in text or with a voice message."
    ))
}

/// Question `k` of `n` (1-based).
pub fn question(k: usize, n: usize) -> OutgoingMessage {
    let text = QUESTIONS
        .get(k.saturating_sub(1))
        .copied()
        .unwrap_or("Tell me more.");
    OutgoingMessage::text(format!("❓ Question {k}/{n}\n\n{text}"))
}

fn skip_links_row() -> Vec<Button> {
    vec![Button::callback("⏭ Skip", CallbackAction::SkipLinks)]
}

pub fn links_prompt() -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "🔗 Want to add supporting links?\n\n\
         Send one link per message with a short description, for example:\n\
         Our pricing page https://example.com/pricing\n\n\
         You can add up to {MAX_MATERIALS}. Press Skip when you're done."
    ))
    .with_row(skip_links_row())
}

pub fn link_saved(count: usize) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "✅ Link {count}/{MAX_MATERIALS} saved. Send another one or press Skip."
    ))
    .with_row(skip_links_row())
}

pub fn link_missing_url() -> OutgoingMessage {
    OutgoingMessage::text(
        "❌ I couldn't find a link. Send a description followed by a full URL starting with http:// or https://",
    )
    .with_row(skip_links_row())
}

pub fn link_missing_description() -> OutgoingMessage {
    OutgoingMessage::text(
        "❌ Please add a short description (at least 3 characters) next to the link.",
    )
    .with_row(skip_links_row())
}

pub fn generating() -> OutgoingMessage {
    OutgoingMessage::text("⏳ Writing your post. This usually takes a minute or two...")
}

pub fn generation_failed() -> OutgoingMessage {
    main_menu("😔 Something went wrong while starting the generation. Please try again later.")
}

pub fn generation_timeout() -> OutgoingMessage {
    main_menu(
        "⌛ Generation is taking too long, so I've stopped waiting.\n\n\
         Your answers were cleared. Please start a new post.",
    )
}

/// The generated post with approve/reject buttons.
pub fn review(post: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!("📄 Here is your post:\n\n{post}\n\nIs everything right?"))
        .html()
        .with_row(vec![
            Button::callback("✅ Looks good", CallbackAction::ReviewApproved),
            Button::callback("❌ No", CallbackAction::ReviewRejected),
        ])
}

pub fn restarting() -> OutgoingMessage {
    OutgoingMessage::text("🔄 No problem, let's start over.")
}

pub fn button_type_choice() -> OutgoingMessage {
    OutgoingMessage::text("🔘 Which button should go under the post?").with_column([
        Button::callback(
            "💬 Direct message",
            CallbackAction::ChooseButtonType(ButtonType::DirectMessage),
        ),
        Button::callback(
            "🌐 External link",
            CallbackAction::ChooseButtonType(ButtonType::Link),
        ),
    ])
}

pub fn ask_dm_target() -> OutgoingMessage {
    OutgoingMessage::text(
        "👤 Send the username (without @ or with it) or the numeric user id people should write to.",
    )
}

pub fn ask_link_target() -> OutgoingMessage {
    OutgoingMessage::text("🌐 Send the full link the button should open (https://...).")
}

pub fn invalid_handle() -> OutgoingMessage {
    OutgoingMessage::text(
        "❌ That doesn't look like a username or user id.\n\
         A username has 5 to 32 letters, digits or underscores; an id is digits only.",
    )
}

pub fn invalid_url() -> OutgoingMessage {
    OutgoingMessage::text("❌ That doesn't look like a valid link. It must start with http:// or https://")
}

pub fn button_text_choice(button_type: ButtonType) -> OutgoingMessage {
    let canned = canned_labels(button_type)
        .iter()
        .enumerate()
        .map(|(i, label)| Button::callback(*label, CallbackAction::CannedText(i)));
    OutgoingMessage::text("✏️ Pick a label for the button or write your own.")
        .with_column(canned)
        .with_row(vec![Button::callback("✍️ Custom text", CallbackAction::CustomText)])
}

pub fn ask_custom_text() -> OutgoingMessage {
    OutgoingMessage::text("✍️ Send the button label (up to 100 characters).")
}

pub fn invalid_button_text() -> OutgoingMessage {
    OutgoingMessage::text("❌ The label must be between 1 and 100 characters. Try again.")
}

/// Preview of the post as it will be published, with approve/reject buttons.
pub fn final_review(session: &PostSession) -> OutgoingMessage {
    let post = session.generated_post.as_deref().unwrap_or_default();
    let mut msg = OutgoingMessage::text(format!("👀 Final preview:\n\n{post}")).html();
    if let (Some(text), Some(url)) = (&session.button_text, &session.button_url) {
        msg = msg.with_row(vec![Button::url(text.clone(), url.clone())]);
    }
    msg.with_row(vec![
        Button::callback("🚀 Publish", CallbackAction::FinalApproved),
        Button::callback("❌ Start over", CallbackAction::FinalRejected),
    ])
}

/// The post as it goes out to the channel.
pub fn publication(session: &PostSession) -> OutgoingMessage {
    let mut msg = OutgoingMessage::text(session.generated_post.clone().unwrap_or_default()).html();
    if let (Some(text), Some(url)) = (&session.button_text, &session.button_url) {
        msg = msg.with_row(vec![Button::url(text.clone(), url.clone())]);
    }
    msg
}

pub fn published(channel: &str) -> OutgoingMessage {
    main_menu(format!("🎉 Your post is live in {channel}!"))
}

pub fn publish_failed() -> OutgoingMessage {
    OutgoingMessage::text("😔 I couldn't publish the post. Please try again in a moment.").with_row(vec![
        Button::callback("🚀 Try again", CallbackAction::FinalApproved),
        Button::callback("❌ Start over", CallbackAction::FinalRejected),
    ])
}

pub fn transcribed(text: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!("🎤 I heard:\n\n{text}"))
}

pub fn voice_unavailable() -> OutgoingMessage {
    OutgoingMessage::text("🎤 Voice messages aren't supported right now. Please answer in text.")
}

pub fn voice_not_expected() -> OutgoingMessage {
    OutgoingMessage::text("🎤 Voice messages are only accepted while answering questions.")
}

pub fn voice_failed() -> OutgoingMessage {
    OutgoingMessage::text("😔 I couldn't recognise that voice message. Please try again or answer in text.")
}

pub fn still_generating() -> OutgoingMessage {
    OutgoingMessage::text("⏳ Your post is still being written. I'll send it as soon as it's ready.")
}

pub fn use_buttons() -> OutgoingMessage {
    OutgoingMessage::text("👆 Please use the buttons above.")
}

pub fn session_expired() -> OutgoingMessage {
    main_menu("❌ This session has ended or was replaced.")
}

pub fn idle() -> OutgoingMessage {
    main_menu("Press the button below to write a new post.")
}

pub fn button_inactive() -> OutgoingMessage {
    OutgoingMessage::text("⚠️ This button is no longer active.")
}

pub fn try_again() -> OutgoingMessage {
    OutgoingMessage::text("😔 Something went wrong. Please try again.")
}
