//! End-to-end tests for the post session flow: a real in-memory store wired
//! to recording fakes for the chat gateway, generation backend and alerts.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;

use post_assist::actions::CallbackAction;
use post_assist::channels::{Button, EventKind, IncomingEvent, MemberStatus};
use post_assist::config::FlowConfig;
use post_assist::error::{Error, SessionError};
use post_assist::generation::RequestType;
use post_assist::onboarding::{ChatIdentity, RegistrationStage, User, prompts as registration};
use post_assist::posting::prompts::{self, LINK_LABELS};
use post_assist::posting::{ButtonType, GeneratedPost, SessionStatus};
use post_assist::store::Database;

use common::*;

fn generated(text: &str) -> GeneratedPost {
    GeneratedPost {
        chat_id: CHAT,
        text: text.to_string(),
    }
}

async fn answer_all(h: &Harness, prefix: &str, n: usize) {
    for k in 1..=n {
        h.bot.handle(text(&format!("{prefix} {k}"))).await;
    }
}

async fn status(h: &Harness) -> Option<SessionStatus> {
    h.db.find_active_session(CHAT)
        .await
        .unwrap()
        .map(|s| s.status)
}

/// Start a session, answer everything and skip links.
async fn reach_generating(h: &Harness) {
    h.bot.handle(press(CallbackAction::WritePost)).await;
    answer_all(h, "answer", 5).await;
    h.bot.handle(press(CallbackAction::SkipLinks)).await;
    assert_eq!(status(h).await, Some(SessionStatus::Generating));
}

/// Drive a session all the way to `final_review` with a link button.
async fn reach_final_review(h: &Harness) {
    reach_generating(h).await;
    h.flow
        .ingest_callback(generated("<h2>Title</h2><p>Body</p>"))
        .await
        .unwrap();
    h.bot.handle(press(CallbackAction::ReviewApproved)).await;
    h.bot
        .handle(press(CallbackAction::ChooseButtonType(ButtonType::Link)))
        .await;
    h.bot.handle(text("https://shop.example")).await;
    h.bot.handle(press(CallbackAction::CannedText(0))).await;
    assert_eq!(status(h).await, Some(SessionStatus::FinalReview));
}

#[tokio::test]
async fn answers_go_to_backend_exactly_once() {
    timeout(TEST_TIMEOUT, async {
        let config = FlowConfig {
            collect_links: false,
            ..FlowConfig::default()
        };
        let h = harness(config).await;
        registered_user(&h.db).await;

        h.bot.handle(press(CallbackAction::WritePost)).await;
        assert_eq!(status(&h).await, Some(SessionStatus::Question(1)));
        assert_eq!(h.gateway.last_user_text(), prompts::question(1, 5).text);

        answer_all(&h, "answer", 5).await;
        assert_eq!(status(&h).await, Some(SessionStatus::Generating));

        let requests = h.backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request_type, RequestType::GeneratePost);
        assert_eq!(
            requests[0].answers,
            (1..=5).map(|k| format!("answer {k}")).collect::<Vec<_>>()
        );
        assert_eq!(requests[0].user.telegram_id, Some(CHAT));

        // More text while generating does not dispatch again.
        h.bot.handle(text("hello?")).await;
        assert_eq!(h.backend.requests().len(), 1);
        assert_eq!(h.gateway.last_user_text(), prompts::still_generating().text);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn blank_answer_repeats_question() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;

        h.bot.handle(press(CallbackAction::WritePost)).await;
        h.bot.handle(text("   ")).await;
        assert_eq!(status(&h).await, Some(SessionStatus::Question(1)));
        assert_eq!(h.gateway.last_user_text(), prompts::question(1, 5).text);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn link_collection_validates_and_skips() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;

        h.bot.handle(press(CallbackAction::WritePost)).await;
        answer_all(&h, "answer", 5).await;
        assert_eq!(status(&h).await, Some(SessionStatus::CollectingLinks));

        h.bot.handle(text("https://x.co")).await;
        assert_eq!(h.gateway.last_user_text(), prompts::link_missing_description().text);
        h.bot.handle(text("no link here")).await;
        assert_eq!(h.gateway.last_user_text(), prompts::link_missing_url().text);
        assert_eq!(status(&h).await, Some(SessionStatus::CollectingLinks));

        h.bot.handle(text("Check this https://x.co")).await;
        assert_eq!(h.gateway.last_user_text(), prompts::link_saved(1).text);

        h.bot.handle(press(CallbackAction::SkipLinks)).await;
        assert_eq!(status(&h).await, Some(SessionStatus::Generating));

        let requests = h.backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].materials.len(), 1);
        assert_eq!(requests[0].materials[0].description, "Check this");
        assert_eq!(requests[0].materials[0].url, "https://x.co");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn fifth_link_starts_generation() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;

        h.bot.handle(press(CallbackAction::WritePost)).await;
        answer_all(&h, "answer", 5).await;
        for i in 1..=5 {
            h.bot
                .handle(text(&format!("Source number {i} https://x.co/{i}")))
                .await;
        }
        assert_eq!(status(&h).await, Some(SessionStatus::Generating));
        assert_eq!(h.backend.requests()[0].materials.len(), 5);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn callback_moves_to_review_and_replay_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        reach_generating(&h).await;

        h.flow
            .ingest_callback(generated("<h2>Title</h2><p>Body</p>"))
            .await
            .unwrap();
        assert_eq!(status(&h).await, Some(SessionStatus::Reviewing));

        let review = h.gateway.user_messages().last().cloned().unwrap();
        assert!(review.html);
        assert!(review.text.contains("<b>Title</b>\n\nBody"));
        assert_eq!(
            review.keyboard[0][0],
            Button::callback("✅ Looks good", CallbackAction::ReviewApproved)
        );

        let sent_before = h.gateway.user_messages().len();
        let replay = h.flow.ingest_callback(generated("other")).await;
        assert!(matches!(
            replay,
            Err(Error::Session(SessionError::StateMismatch { .. }))
        ));
        assert_eq!(h.gateway.user_messages().len(), sent_before);

        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(
            session.generated_post.as_deref(),
            Some("<b>Title</b>\n\nBody")
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn callback_without_session_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;

        assert!(matches!(
            h.flow.ingest_callback(generated("post")).await,
            Err(Error::Session(SessionError::NotFound { .. }))
        ));
        let stranger = GeneratedPost {
            chat_id: 9999,
            text: "post".into(),
        };
        assert!(matches!(
            h.flow.ingest_callback(stranger).await,
            Err(Error::Session(SessionError::UserNotFound { .. }))
        ));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn generation_timeout_resets_session() {
    timeout(TEST_TIMEOUT, async {
        let config = FlowConfig {
            generation_timeout: Duration::from_millis(100),
            ..FlowConfig::default()
        };
        let h = harness(config).await;
        let user = registered_user(&h.db).await;
        reach_generating(&h).await;

        tokio::time::sleep(Duration::from_millis(500)).await;

        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Question(1));
        assert!(session.answers.is_empty());
        assert!(session.generation_started_at.is_none());

        assert_eq!(h.gateway.last_user_text(), prompts::generation_timeout().text);
        let alerts = h.alerts.alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("Generation timeout"));

        let requests = h.backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].request_type, RequestType::TimeoutNotification);

        // A late result is refused and nothing reaches the user.
        let sent_before = h.gateway.user_messages().len();
        assert!(h.flow.ingest_callback(generated("late")).await.is_err());
        assert_eq!(h.gateway.user_messages().len(), sent_before);

        // The author can start over right away.
        h.bot.handle(press(CallbackAction::WritePost)).await;
        assert_eq!(status(&h).await, Some(SessionStatus::Question(1)));
        assert_eq!(h.db.count_active_sessions(user.id).await.unwrap(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn callback_before_deadline_wins_over_timer() {
    timeout(TEST_TIMEOUT, async {
        let config = FlowConfig {
            generation_timeout: Duration::from_millis(200),
            ..FlowConfig::default()
        };
        let h = harness(config).await;
        registered_user(&h.db).await;
        reach_generating(&h).await;

        h.flow.ingest_callback(generated("Post")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(status(&h).await, Some(SessionStatus::Reviewing));
        assert!(h.alerts.alerts().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn sweep_recovers_overdue_sessions() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        let user = registered_user(&h.db).await;

        let mut session = h.db.create_session(user.id, CHAT).await.unwrap();
        session.set_answer(1, "stale");
        session.status = SessionStatus::Generating;
        session.generation_started_at = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(h.db.save_session(&session, SessionStatus::Question(1)).await.unwrap());

        assert_eq!(h.flow.supervisor().sweep().await.unwrap(), 1);
        assert_eq!(status(&h).await, Some(SessionStatus::Question(1)));
        assert_eq!(h.alerts.alerts().len(), 1);

        // Nothing left to do on the next pass.
        assert_eq!(h.flow.supervisor().sweep().await.unwrap(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn dispatch_failure_clears_answers_and_alerts() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        h.backend.fail.store(true, Ordering::SeqCst);

        h.bot.handle(press(CallbackAction::WritePost)).await;
        answer_all(&h, "answer", 5).await;
        h.bot.handle(press(CallbackAction::SkipLinks)).await;

        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Question(1));
        assert!(session.answers.is_empty());
        assert_eq!(h.gateway.last_user_text(), prompts::generation_failed().text);

        let alerts = h.alerts.alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("ann@example.com"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn final_rejection_clears_everything() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        reach_final_review(&h).await;

        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(session.button_type, Some(ButtonType::Link));
        assert_eq!(session.button_url.as_deref(), Some("https://shop.example"));
        assert_eq!(session.button_text.as_deref(), Some(LINK_LABELS[0]));

        h.bot.handle(press(CallbackAction::FinalRejected)).await;
        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Question(1));
        assert!(session.answers.is_empty());
        assert!(session.materials.is_empty());
        assert!(session.generated_post.is_none());
        assert!(session.button_type.is_none());
        assert!(session.button_url.is_none());
        assert!(session.button_text.is_none());

        answer_all(&h, "fresh", 5).await;
        h.bot.handle(press(CallbackAction::SkipLinks)).await;

        let requests = h.backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].answers,
            (1..=5).map(|k| format!("fresh {k}")).collect::<Vec<_>>()
        );
        assert!(requests[1].materials.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn review_rejection_restarts() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        reach_generating(&h).await;
        h.flow.ingest_callback(generated("Post")).await.unwrap();

        h.bot.handle(press(CallbackAction::ReviewRejected)).await;
        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Question(1));
        assert!(session.generated_post.is_none());
        assert_eq!(h.gateway.last_user_text(), prompts::question(1, 5).text);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_button_config_stays_put() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        reach_generating(&h).await;
        h.flow.ingest_callback(generated("Post")).await.unwrap();
        h.bot.handle(press(CallbackAction::ReviewApproved)).await;
        h.bot
            .handle(press(CallbackAction::ChooseButtonType(ButtonType::Link)))
            .await;
        assert_eq!(status(&h).await, Some(SessionStatus::ButtonConfig));

        h.bot.handle(text("not a url")).await;
        assert_eq!(status(&h).await, Some(SessionStatus::ButtonConfig));
        assert_eq!(h.gateway.last_user_text(), prompts::invalid_url().text);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn direct_message_button_uses_own_handle() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        reach_generating(&h).await;
        h.flow.ingest_callback(generated("Post")).await.unwrap();
        h.bot.handle(press(CallbackAction::ReviewApproved)).await;

        h.bot
            .handle(press(CallbackAction::ChooseButtonType(ButtonType::DirectMessage)))
            .await;
        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::ButtonTextSelection);
        assert_eq!(
            session.button_url.as_deref(),
            Some("https://t.me/author_handle")
        );

        // Free text counts as a custom label.
        h.bot.handle(text("Write to me")).await;
        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::FinalReview);
        assert_eq!(session.button_text.as_deref(), Some("Write to me"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn final_approval_publishes_to_channel() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        let user = registered_user(&h.db).await;
        reach_final_review(&h).await;
        let session_id = h.db.find_active_session(CHAT).await.unwrap().unwrap().id;

        h.bot.handle(press(CallbackAction::FinalApproved)).await;

        let published = h.gateway.sent_to(CHANNEL);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].text, "<b>Title</b>\n\nBody");
        assert_eq!(
            published[0].keyboard,
            vec![vec![Button::url(LINK_LABELS[0], "https://shop.example")]]
        );

        let session = h.db.get_session(session_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(h.db.find_active_session(CHAT).await.unwrap().is_none());

        let user = h.db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.post_count, 1);
        assert_eq!(
            h.gateway.last_user_text(),
            prompts::published("https://t.me/ann_channel").text
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failed_publication_can_be_retried() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        reach_final_review(&h).await;

        h.gateway.fail_channel_sends.store(true, Ordering::SeqCst);
        h.bot.handle(press(CallbackAction::FinalApproved)).await;
        assert_eq!(status(&h).await, Some(SessionStatus::FinalReview));
        assert_eq!(h.gateway.last_user_text(), prompts::publish_failed().text);

        h.gateway.fail_channel_sends.store(false, Ordering::SeqCst);
        h.bot.handle(press(CallbackAction::FinalApproved)).await;
        assert_eq!(status(&h).await, None);
        assert_eq!(h.gateway.sent_to(CHANNEL).len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn publication_rechecks_admin_rights() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        let user = registered_user(&h.db).await;
        reach_final_review(&h).await;

        h.gateway.set_membership(MemberStatus::Left);
        h.bot.handle(press(CallbackAction::FinalApproved)).await;

        assert_eq!(status(&h).await, Some(SessionStatus::FinalReview));
        assert!(h.gateway.sent_to(CHANNEL).is_empty());
        assert_eq!(h.gateway.last_user_text(), registration::not_admin().text);
        assert!(!h.db.get_user(user.id).await.unwrap().unwrap().is_bot_admin);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn session_start_requires_admin_rights() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        h.gateway.set_membership(MemberStatus::Administrator {
            can_post_messages: false,
        });

        h.bot.handle(press(CallbackAction::WritePost)).await;
        assert_eq!(status(&h).await, None);
        assert_eq!(h.gateway.last_user_text(), registration::not_admin().text);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn concurrent_starts_leave_one_live_session() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        let user = registered_user(&h.db).await;

        let from = identity();
        let starts = (0..8).map(|_| h.flow.start(&from));
        for result in futures::future::join_all(starts).await {
            result.unwrap();
        }
        assert_eq!(h.db.count_active_sessions(user.id).await.unwrap(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn stale_button_changes_nothing() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;

        h.bot.handle(press(CallbackAction::WritePost)).await;
        h.bot.handle(press(CallbackAction::FinalApproved)).await;
        assert_eq!(status(&h).await, Some(SessionStatus::Question(1)));
        assert_eq!(h.gateway.last_user_text(), prompts::button_inactive().text);
        assert!(h.gateway.sent_to(CHANNEL).is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn voice_answers_only_during_questions() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        let voice = || {
            IncomingEvent::new(
                identity(),
                EventKind::Voice {
                    file_id: "file-1".into(),
                    duration_secs: 3,
                },
            )
        };

        h.bot.handle(voice()).await;
        assert_eq!(h.gateway.last_user_text(), prompts::voice_not_expected().text);

        h.bot.handle(press(CallbackAction::WritePost)).await;
        h.bot.handle(voice()).await;

        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Question(2));
        assert_eq!(session.answers, vec!["spoken answer".to_string()]);
        assert!(h
            .gateway
            .user_messages()
            .iter()
            .any(|m| m.text == prompts::transcribed("spoken answer").text));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn registration_walkthrough() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        h.db.insert_user(&User::new("new.author@example.com"))
            .await
            .unwrap();

        let from = ChatIdentity {
            chat_id: CHAT,
            username: Some("newbie".into()),
            first_name: Some("New".into()),
            last_name: Some("Author".into()),
        };
        let event = |kind| IncomingEvent::new(from.clone(), kind);

        h.bot
            .handle(event(EventKind::Command {
                name: "start".into(),
                args: String::new(),
            }))
            .await;
        assert_eq!(h.gateway.last_user_text(), registration::welcome().text);

        h.bot
            .handle(event(EventKind::Text("it's nobody@example.com".into())))
            .await;
        assert_eq!(
            h.gateway.last_user_text(),
            registration::email_unknown("nobody@example.com").text
        );

        h.bot
            .handle(event(EventKind::Text("New.Author@Example.com".into())))
            .await;
        assert_eq!(h.gateway.last_user_text(), registration::email_confirmed().text);

        h.bot
            .handle(event(EventKind::Text("my channel".into())))
            .await;
        assert_eq!(h.gateway.last_user_text(), registration::channel_invalid().text);

        h.bot
            .handle(event(EventKind::Text("t.me/new_channel".into())))
            .await;
        let user = h.db.get_user_by_chat(CHAT).await.unwrap().unwrap();
        assert_eq!(user.registration_stage, RegistrationStage::ChannelAdded);
        assert_eq!(user.channel_url.as_deref(), Some("https://t.me/new_channel"));
        assert!(h.gateway.last_user_text().contains("@post_bot"));

        h.gateway.set_membership(MemberStatus::Member);
        h.bot
            .handle(event(EventKind::Button {
                callback_id: "cb".into(),
                data: CallbackAction::AdminAdded.to_string(),
            }))
            .await;
        assert_eq!(h.gateway.last_user_text(), registration::not_admin().text);

        h.gateway.set_membership(MemberStatus::Creator);
        h.bot
            .handle(event(EventKind::Button {
                callback_id: "cb".into(),
                data: CallbackAction::AdminAdded.to_string(),
            }))
            .await;
        assert_eq!(h.gateway.last_user_text(), registration::admin_confirmed().text);

        let user = h.db.get_user_by_chat(CHAT).await.unwrap().unwrap();
        assert_eq!(user.registration_stage, RegistrationStage::Completed);
        assert!(user.is_bot_admin);

        // Registered users can now start a post.
        h.bot
            .handle(event(EventKind::Button {
                callback_id: "cb".into(),
                data: CallbackAction::WritePost.to_string(),
            }))
            .await;
        assert_eq!(status(&h).await, Some(SessionStatus::Question(1)));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unregistered_users_cannot_start_posts() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;

        h.bot.handle(press(CallbackAction::WritePost)).await;
        assert_eq!(status(&h).await, None);
        assert_eq!(h.gateway.last_user_text(), registration::not_registered().text);
    })
    .await
    .expect("test timed out");
}

/// Walk a handle-less author to the button-type choice and pick a DM button.
async fn choose_dm_without_handle(h: &Harness) {
    let from = identity_without_handle;
    h.bot.handle(press_from(from(), CallbackAction::WritePost)).await;
    for k in 1..=5 {
        h.bot.handle(text_from(from(), &format!("answer {k}"))).await;
    }
    h.bot.handle(press_from(from(), CallbackAction::SkipLinks)).await;
    h.flow.ingest_callback(generated("Post")).await.unwrap();
    h.bot
        .handle(press_from(from(), CallbackAction::ReviewApproved))
        .await;
    h.bot
        .handle(press_from(
            from(),
            CallbackAction::ChooseButtonType(ButtonType::DirectMessage),
        ))
        .await;
}

#[tokio::test]
async fn direct_message_target_is_asked_for_without_a_handle() {
    timeout(TEST_TIMEOUT, async {
        let cases = [
            ("123456", "tg://user?id=123456"),
            ("@some_author", "https://t.me/some_author"),
        ];
        for (input, url) in cases {
            let h = harness(default_config()).await;
            registered_user_with_handle(&h.db, None).await;
            choose_dm_without_handle(&h).await;
            assert_eq!(status(&h).await, Some(SessionStatus::ButtonConfig));
            assert_eq!(h.gateway.last_user_text(), prompts::ask_dm_target().text);

            h.bot.handle(text_from(identity_without_handle(), "abc")).await;
            assert_eq!(status(&h).await, Some(SessionStatus::ButtonConfig));
            assert_eq!(h.gateway.last_user_text(), prompts::invalid_handle().text);

            h.bot.handle(text_from(identity_without_handle(), input)).await;
            let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
            assert_eq!(session.status, SessionStatus::ButtonTextSelection);
            assert_eq!(session.button_url.as_deref(), Some(url));
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn custom_button_text_is_length_checked() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        registered_user(&h.db).await;
        reach_generating(&h).await;
        h.flow.ingest_callback(generated("Post")).await.unwrap();
        h.bot.handle(press(CallbackAction::ReviewApproved)).await;
        h.bot
            .handle(press(CallbackAction::ChooseButtonType(ButtonType::Link)))
            .await;
        h.bot.handle(text("https://shop.example")).await;

        h.bot.handle(press(CallbackAction::CustomText)).await;
        assert_eq!(status(&h).await, Some(SessionStatus::ButtonTextSelection));
        assert_eq!(h.gateway.last_user_text(), prompts::ask_custom_text().text);

        h.bot.handle(text(&"ж".repeat(101))).await;
        assert_eq!(status(&h).await, Some(SessionStatus::ButtonTextSelection));
        assert_eq!(h.gateway.last_user_text(), prompts::invalid_button_text().text);

        h.bot.handle(text("Shop now")).await;
        let session = h.db.find_active_session(CHAT).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::FinalReview);
        assert_eq!(session.button_text.as_deref(), Some("Shop now"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn review_approval_publishes_when_buttons_are_off() {
    timeout(TEST_TIMEOUT, async {
        let config = FlowConfig {
            button_flow: false,
            ..FlowConfig::default()
        };
        let h = harness(config).await;
        let user = registered_user(&h.db).await;
        reach_generating(&h).await;
        h.flow.ingest_callback(generated("<p>Plain post</p>")).await.unwrap();

        h.bot.handle(press(CallbackAction::ReviewApproved)).await;

        let published = h.gateway.sent_to(CHANNEL);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].text, "Plain post");
        assert!(published[0].keyboard.is_empty());
        assert_eq!(status(&h).await, None);
        assert_eq!(h.db.get_user(user.id).await.unwrap().unwrap().post_count, 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn three_question_interview() {
    timeout(TEST_TIMEOUT, async {
        let config = FlowConfig {
            question_count: 3,
            ..FlowConfig::default()
        };
        let h = harness(config).await;
        registered_user(&h.db).await;

        h.bot.handle(press(CallbackAction::WritePost)).await;
        assert_eq!(h.gateway.last_user_text(), prompts::question(1, 3).text);

        answer_all(&h, "short", 3).await;
        assert_eq!(status(&h).await, Some(SessionStatus::CollectingLinks));
        assert_eq!(h.gateway.last_user_text(), prompts::links_prompt().text);

        h.bot.handle(press(CallbackAction::SkipLinks)).await;
        assert_eq!(status(&h).await, Some(SessionStatus::Generating));
        let requests = h.backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].answers, vec!["short 1", "short 2", "short 3"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn published_post_stands_when_the_store_write_fails() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        let user = registered_user(&h.db).await;
        reach_final_review(&h).await;

        h.store.set_fault(Some(SaveFault::Error));
        h.bot.handle(press(CallbackAction::FinalApproved)).await;

        assert_eq!(h.gateway.sent_to(CHANNEL).len(), 1);
        assert_eq!(
            h.gateway.last_user_text(),
            prompts::published("https://t.me/ann_channel").text
        );
        assert_eq!(h.db.get_user(user.id).await.unwrap().unwrap().post_count, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn lost_publication_race_does_not_count_the_post() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(default_config()).await;
        let user = registered_user(&h.db).await;
        reach_final_review(&h).await;

        h.store.set_fault(Some(SaveFault::Lost));
        h.bot.handle(press(CallbackAction::FinalApproved)).await;

        assert_eq!(h.gateway.sent_to(CHANNEL).len(), 1);
        assert_eq!(
            h.gateway.last_user_text(),
            prompts::published("https://t.me/ann_channel").text
        );
        assert_eq!(h.db.get_user(user.id).await.unwrap().unwrap().post_count, 0);
    })
    .await
    .expect("test timed out");
}
