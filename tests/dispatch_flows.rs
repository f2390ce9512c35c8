use ai_studio_bot::ai::AiError;
use ai_studio_bot::bot::background::OperationKind;
use ai_studio_bot::bot::commands::Command;
use ai_studio_bot::bot::preferences::{ImageQuality, ImageSize, Voice};
use ai_studio_bot::bot::state::{ConversationState, Purpose};
use ai_studio_bot::bot::transport::{MessageRef, TransportError, UserId};
use ai_studio_bot::bot::views;
use ai_studio_bot::testing::{ImageCall, Sent, SpeechCall, TestBot};

const USER: i64 = 42;

/// Reference of the first message sent with `text`.
fn sent_message(bot: &TestBot, text: &str) -> MessageRef {
    bot.transport
        .sent()
        .into_iter()
        .find_map(|entry| match entry {
            Sent::Message { id, text: t, .. } if t == text => Some(id),
            _ => None,
        })
        .expect("message was sent")
}

async fn state(bot: &TestBot) -> ConversationState {
    bot.context().states.current(UserId(USER)).await
}

#[tokio::test]
async fn tts_command_acknowledges_then_delivers_voice() {
    let bot = TestBot::new();

    bot.command(USER, Command::Tts("Привіт|nova|1.5".into()))
        .await;
    let status = sent_message(&bot, OperationKind::Speech.status_text());
    bot.settle().await;

    assert_eq!(
        bot.speech.calls(),
        vec![SpeechCall {
            text: "Привіт".into(),
            voice: Voice::Nova,
            speed: 1.5,
        }]
    );
    let voices: Vec<Option<String>> = bot
        .transport
        .sent()
        .into_iter()
        .filter_map(|entry| match entry {
            Sent::Voice { caption, .. } => Some(caption),
            _ => None,
        })
        .collect();
    assert_eq!(voices.len(), 1);
    assert!(voices[0]
        .as_deref()
        .is_some_and(|c| c.contains("Голос: nova, Швидкість: 1.5x")));
    assert_eq!(
        bot.transport.message_text(status).as_deref(),
        Some(views::SPEECH_READY_TEXT)
    );
}

#[tokio::test]
async fn tts_command_fills_missing_values_from_preferences() {
    let bot = TestBot::new();

    bot.press(USER, None, "voice_shimmer").await;
    bot.command(USER, Command::Tts("Добрий день".into())).await;
    bot.settle().await;

    let calls = bot.speech.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!((calls[0].voice, calls[0].speed), (Voice::Shimmer, 1.0));
}

#[tokio::test]
async fn invalid_tts_arguments_are_answered_synchronously() {
    let bot = TestBot::new();

    bot.command(USER, Command::Tts("Привіт|9".into())).await;

    assert_eq!(
        bot.transport.last_text().as_deref(),
        Some("❌ Швидкість повинна бути від 0.25 до 4.0")
    );
    assert_eq!(bot.context().dispatcher.in_flight(), 0);
    assert!(bot.speech.calls().is_empty());
}

#[tokio::test]
async fn image_menu_with_single_result_sends_one_photo() {
    let bot = TestBot::new();
    bot.images.push(Ok(vec![vec![1, 2, 3]]));

    bot.press(USER, None, "size_1024x1536").await;
    bot.press(USER, None, Purpose::Image.payload()).await;
    assert_eq!(
        state(&bot).await,
        ConversationState::AwaitingFreeText(Purpose::Image)
    );

    bot.text(USER, "a red cat").await;
    let status = sent_message(&bot, OperationKind::Image.status_text());
    bot.settle().await;

    assert_eq!(
        bot.images.calls(),
        vec![ImageCall {
            prompt: "a red cat".into(),
            size: ImageSize::Portrait,
            quality: ImageQuality::Auto,
            count: 2,
        }]
    );
    let sent = bot.transport.sent();
    let photos = sent
        .iter()
        .filter(|entry| matches!(entry, Sent::Photo { .. }))
        .count();
    assert_eq!(photos, 1);
    assert!(!sent
        .iter()
        .any(|entry| matches!(entry, Sent::MediaGroup { .. })));
    assert_eq!(
        bot.transport.message_text(status).as_deref(),
        Some(views::IMAGE_PARTIAL_TEXT)
    );
    assert_eq!(state(&bot).await, ConversationState::Idle);
}

#[tokio::test]
async fn two_images_go_out_as_one_media_group() {
    let bot = TestBot::new();

    bot.command(USER, Command::Image("a lighthouse".into()))
        .await;
    let status = sent_message(&bot, OperationKind::Image.status_text());
    bot.settle().await;

    let groups: Vec<(usize, Option<String>)> = bot
        .transport
        .sent()
        .into_iter()
        .filter_map(|entry| match entry {
            Sent::MediaGroup {
                images, caption, ..
            } => Some((images.len(), caption)),
            _ => None,
        })
        .collect();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].0, 2);
    assert!(groups[0]
        .1
        .as_deref()
        .is_some_and(|c| c.starts_with("🖼️ <b>Варіанти 1-2:</b>")));
    assert_eq!(
        bot.transport.message_text(status).as_deref(),
        Some(views::IMAGES_READY_TEXT)
    );
}

#[tokio::test]
async fn provider_failure_rewrites_status_and_leaves_user_idle() {
    let bot = TestBot::new();
    for _ in 0..3 {
        bot.text.push(Err(AiError::Network("connection reset".into())));
    }

    bot.press(USER, None, Purpose::Ask.payload()).await;
    bot.text(USER, "Що таке Rust?").await;
    let status = sent_message(&bot, OperationKind::Ask.status_text());
    bot.settle().await;

    assert_eq!(bot.text.calls().len(), 3);
    let text = bot.transport.message_text(status).expect("status exists");
    assert!(text.starts_with("❌ Виникла помилка при обробці запиту"));
    assert!(text.contains("Спробуйте ще раз"));
    assert_eq!(state(&bot).await, ConversationState::Idle);

    bot.text(USER, "ще раз").await;
    assert_eq!(
        bot.transport.last_text(),
        Some(views::fallback_echo_text("ще раз"))
    );
}

#[tokio::test]
async fn menu_answer_carries_back_button() {
    let bot = TestBot::new();
    bot.text.push(Ok("Rust is a systems language.".into()));

    bot.press(USER, None, Purpose::Explain.payload()).await;
    bot.text(USER, "Rust").await;
    bot.settle().await;

    let last_edit = bot
        .transport
        .sent()
        .into_iter()
        .rev()
        .find_map(|entry| match entry {
            Sent::Edit { text, keyboard, .. } => Some((text, keyboard)),
            _ => None,
        })
        .expect("status was replaced");
    assert!(last_edit.0.starts_with("🎓 <b>Пояснення:</b>"));
    assert_eq!(last_edit.1, Some(views::back_to_menu_keyboard()));
}

#[tokio::test]
async fn stale_status_falls_back_to_fresh_message() {
    let bot = TestBot::new();
    bot.text.push(Ok("Відповідь".into()));
    bot.transport
        .fail_next_edit(TransportError::StaleTarget("message to edit not found".into()));

    bot.command(USER, Command::Ask("Привіт".into())).await;
    bot.settle().await;

    let texts = bot.transport.sent_texts();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0], OperationKind::Ask.status_text());
    assert_eq!(texts[1], "🧠 <b>Відповідь:</b>\n\nВідповідь");
}

#[tokio::test]
async fn custom_speed_reprompts_until_valid() {
    let bot = TestBot::new();

    bot.press(USER, None, views::CB_SPEED_CUSTOM).await;
    assert_eq!(state(&bot).await, ConversationState::AwaitingSpeedInput);
    assert_eq!(
        bot.transport.last_text().as_deref(),
        Some(views::CUSTOM_SPEED_PROMPT)
    );

    bot.text(USER, "швидко").await;
    assert_eq!(
        bot.transport.last_text().as_deref(),
        Some(views::CUSTOM_SPEED_NOT_A_NUMBER)
    );
    assert_eq!(state(&bot).await, ConversationState::AwaitingSpeedInput);

    bot.text(USER, "9").await;
    assert_eq!(
        bot.transport.last_text().as_deref(),
        Some(views::CUSTOM_SPEED_OUT_OF_RANGE)
    );

    bot.text(USER, "1.75").await;
    assert_eq!(
        bot.transport.last_text(),
        Some(views::speed_changed_text(1.75))
    );
    assert_eq!(state(&bot).await, ConversationState::Idle);
    let prefs = bot.context().preferences.get(UserId(USER)).await;
    assert!((prefs.speed - 1.75).abs() < f64::EPSILON);
}

#[tokio::test]
async fn unconfigured_provider_is_reported_without_work() {
    let bot = TestBot::unconfigured();

    bot.command(USER, Command::Ask("Привіт".into())).await;
    assert_eq!(
        bot.transport.last_text().as_deref(),
        Some(views::NOT_CONFIGURED_TEXT)
    );

    bot.press(USER, None, Purpose::Tts.payload()).await;
    assert_eq!(
        bot.transport.last_text().as_deref(),
        Some(views::NOT_CONFIGURED_TEXT)
    );
    assert_eq!(state(&bot).await, ConversationState::Idle);
    assert_eq!(bot.context().dispatcher.in_flight(), 0);
}

#[tokio::test]
async fn callback_is_answered_before_the_screen_changes() {
    let bot = TestBot::new();

    bot.press(USER, Some(MessageRef(7)), "voice_nova").await;

    let sent = bot.transport.sent();
    assert_eq!(
        sent[0],
        Sent::CallbackAnswer {
            id: format!("cb-{USER}-voice_nova"),
            text: Some("Голос змінено на nova".into()),
        }
    );
    assert!(matches!(
        &sent[1],
        Sent::Edit { message, text, .. }
            if *message == MessageRef(7) && *text == views::voice_changed_text(Voice::Nova)
    ));
    let prefs = bot.context().preferences.get(UserId(USER)).await;
    assert_eq!(prefs.voice, Voice::Nova);
}

#[tokio::test]
async fn unknown_button_is_acknowledged_and_ignored() {
    let bot = TestBot::new();

    bot.press(USER, None, "agent_mode").await;

    assert_eq!(
        bot.transport.sent(),
        vec![Sent::CallbackAnswer {
            id: format!("cb-{USER}-agent_mode"),
            text: None,
        }]
    );
}

#[tokio::test]
async fn start_clears_pending_purpose() {
    let bot = TestBot::new();

    bot.press(USER, None, Purpose::Code.payload()).await;
    bot.command(USER, Command::Start).await;
    assert_eq!(state(&bot).await, ConversationState::Idle);

    bot.text(USER, "fn main() {}").await;
    assert!(bot.text.calls().is_empty());
    assert_eq!(
        bot.transport.last_text(),
        Some(views::fallback_echo_text("fn main() {}"))
    );
}

#[tokio::test]
async fn speech_failure_reports_default_hints_when_lookup_fails() {
    let bot = TestBot::new();
    for _ in 0..3 {
        bot.speech.push(Err(AiError::Upstream("HTTP 502".into())));
    }
    bot.speech.fail_hints();

    bot.press(USER, None, Purpose::Tts.payload()).await;
    bot.text(USER, "Привіт").await;
    let status = sent_message(&bot, OperationKind::Speech.status_text());
    bot.settle().await;

    assert_eq!(bot.speech.calls().len(), 3);
    let text = bot.transport.message_text(status).expect("status exists");
    assert!(text.starts_with("❌ Виникла помилка при генерації озвучки"));
    assert!(text.ends_with(&views::default_speech_hints()));
    assert!(!bot
        .transport
        .sent()
        .iter()
        .any(|entry| matches!(entry, Sent::Voice { .. })));
    assert_eq!(state(&bot).await, ConversationState::Idle);
}

#[tokio::test]
async fn failed_photo_delivery_is_reported_on_status() {
    let bot = TestBot::new();
    bot.images.push(Ok(vec![vec![7]]));
    bot.transport
        .fail_next_media(TransportError::Rejected("PHOTO_INVALID_DIMENSIONS".into()));

    bot.command(USER, Command::Image("a red cat".into())).await;
    let status = sent_message(&bot, OperationKind::Image.status_text());
    bot.settle().await;

    let text = bot.transport.message_text(status).expect("status exists");
    assert!(text.starts_with("❌ Виникла помилка при генерації зображення"));
    assert!(text.contains("не вдалося надіслати результат"));
    assert!(!bot
        .transport
        .sent()
        .iter()
        .any(|entry| matches!(entry, Sent::Photo { .. })));
}

#[tokio::test]
async fn failed_callback_answer_does_not_block_the_screen() {
    let bot = TestBot::new();
    bot.transport
        .fail_next_callback(TransportError::Rejected("query is too old".into()));

    bot.press(USER, None, "quality_high").await;

    let sent = bot.transport.sent();
    assert!(!sent
        .iter()
        .any(|entry| matches!(entry, Sent::CallbackAnswer { .. })));
    assert_eq!(
        bot.transport.last_text(),
        Some(views::image_quality_changed_text(ImageQuality::High))
    );
    let prefs = bot.context().preferences.get(UserId(USER)).await;
    assert_eq!(prefs.image_quality, ImageQuality::High);
}

#[tokio::test]
async fn unsupported_voice_reply_is_escaped() {
    let bot = TestBot::new();

    bot.command(USER, Command::Tts("Привіт|<robot>".into()))
        .await;

    let reply = bot.transport.last_text().expect("reply sent");
    assert!(reply.contains("&lt;robot&gt;"));
    assert!(bot.speech.calls().is_empty());
}
