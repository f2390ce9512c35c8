//! Bot UI components
//!
//! Keyboards, callback payloads and message texts. Everything here is pure;
//! handlers decide when to show what.

use crate::bot::background::OperationKind;
use crate::bot::messaging::{TELEGRAM_CAPTION_LIMIT, TELEGRAM_MESSAGE_LIMIT};
use crate::bot::preferences::{
    list_options, ImageQuality, ImageSize, UserPreferences, Voice, MAX_SPEED, MIN_SPEED,
};
use crate::bot::state::Purpose;
use crate::bot::transport::{Button, Keyboard};
use crate::utils::{escape_html, format_speed, split_long_message, truncate_str};

// ─────────────────────────────────────────────────────────────────────────────
// Callback constants
// ─────────────────────────────────────────────────────────────────────────────

/// Back to the main menu
pub const CB_BACK_TO_MENU: &str = "back_to_menu";
/// Settings menu
pub const CB_SETTINGS: &str = "settings";
/// Voice selection
pub const CB_SETTINGS_VOICE: &str = "settings_voice";
/// Speed selection
pub const CB_SETTINGS_SPEED: &str = "settings_speed";
/// Image size selection
pub const CB_SETTINGS_IMAGE_SIZE: &str = "settings_image_size";
/// Image quality selection
pub const CB_SETTINGS_IMAGE_QUALITY: &str = "settings_image_quality";
/// Help screen
pub const CB_HELP: &str = "help";
/// Info screen
pub const CB_INFO: &str = "info";
/// Custom speed input
pub const CB_SPEED_CUSTOM: &str = "speed_custom";
/// Prefix of voice choices (`voice_nova`)
pub const CB_VOICE_PREFIX: &str = "voice_";
/// Prefix of speed choices (`speed_1.5`)
pub const CB_SPEED_PREFIX: &str = "speed_";
/// Prefix of size choices (`size_1024x1024`)
pub const CB_SIZE_PREFIX: &str = "size_";
/// Prefix of quality choices (`quality_high`)
pub const CB_QUALITY_PREFIX: &str = "quality_";

/// Preset speeds on the speed keyboard.
const SPEED_PRESETS: [(&str, &str); 6] = [
    ("🐌", "0.5"),
    ("🚶", "0.75"),
    ("🚶‍♂️", "1.0"),
    ("🏃", "1.25"),
    ("🏃‍♂️", "1.5"),
    ("🚀", "2.0"),
];

// ─────────────────────────────────────────────────────────────────────────────
// Keyboards
// ─────────────────────────────────────────────────────────────────────────────

fn pairs(buttons: Vec<Button>) -> Vec<Vec<Button>> {
    let mut rows = Vec::new();
    let mut iter = buttons.into_iter();
    while let Some(first) = iter.next() {
        let mut row = vec![first];
        row.extend(iter.next());
        rows.push(row);
    }
    rows
}

fn back_to_settings_row() -> Vec<Button> {
    vec![Button::new("🔙 Назад до налаштувань", CB_SETTINGS)]
}

/// Label of a main menu purpose button.
#[must_use]
pub const fn purpose_label(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Ask => "🤖 Запитати AI",
        Purpose::Creative => "✨ Креативне письмо",
        Purpose::Code => "💻 Генерація коду",
        Purpose::Translate => "🌐 Переклад",
        Purpose::Summarize => "📝 Резюме тексту",
        Purpose::Explain => "💡 Пояснення",
        Purpose::Tts => "🎤 Озвучка (TTS)",
        Purpose::Image => "🖼️ Генерація зображень",
    }
}

/// Main menu: capabilities in pairs, then settings/help, then info.
#[must_use]
pub fn main_menu_keyboard() -> Keyboard {
    let mut buttons: Vec<Button> = Purpose::ALL
        .iter()
        .map(|p| Button::new(purpose_label(*p), p.payload()))
        .collect();
    buttons.push(Button::new("⚙️ Налаштування", CB_SETTINGS));
    buttons.push(Button::new("ℹ️ Допомога", CB_HELP));
    buttons.push(Button::new("📊 Інформація", CB_INFO));
    Keyboard::new(pairs(buttons))
}

/// Single "back to menu" button.
#[must_use]
pub fn back_to_menu_keyboard() -> Keyboard {
    Keyboard::single("🏠 Назад до меню", CB_BACK_TO_MENU)
}

/// Settings menu.
#[must_use]
pub fn settings_keyboard() -> Keyboard {
    let mut rows = pairs(vec![
        Button::new("🎤 Голос TTS", CB_SETTINGS_VOICE),
        Button::new("⚡ Швидкість TTS", CB_SETTINGS_SPEED),
        Button::new("📐 Розмір зображення", CB_SETTINGS_IMAGE_SIZE),
        Button::new("🎨 Якість зображення", CB_SETTINGS_IMAGE_QUALITY),
    ]);
    rows.push(vec![Button::new("🏠 Назад до меню", CB_BACK_TO_MENU)]);
    Keyboard::new(rows)
}

const fn voice_icon(voice: Voice) -> &'static str {
    match voice {
        Voice::Alloy => "🎵",
        Voice::Echo => "🔊",
        Voice::Fable => "📚",
        Voice::Onyx => "💎",
        Voice::Nova => "⭐",
        Voice::Shimmer => "✨",
    }
}

/// Voice selection.
#[must_use]
pub fn voice_keyboard() -> Keyboard {
    let buttons = Voice::ALL
        .iter()
        .map(|v| {
            Button::new(
                format!("{} {}", voice_icon(*v), title_case(v.as_str())),
                format!("{CB_VOICE_PREFIX}{v}"),
            )
        })
        .collect();
    let mut rows = pairs(buttons);
    rows.push(back_to_settings_row());
    Keyboard::new(rows)
}

/// Speed selection with presets and custom input.
#[must_use]
pub fn speed_keyboard() -> Keyboard {
    let buttons = SPEED_PRESETS
        .iter()
        .map(|(icon, speed)| Button::new(format!("{icon} {speed}x"), format!("{CB_SPEED_PREFIX}{speed}")))
        .collect();
    let mut rows = pairs(buttons);
    rows.push(vec![Button::new("✏️ Ввести власну", CB_SPEED_CUSTOM)]);
    rows.push(back_to_settings_row());
    Keyboard::new(rows)
}

/// Image size selection.
#[must_use]
pub fn image_size_keyboard() -> Keyboard {
    let buttons = ImageSize::ALL
        .iter()
        .map(|s| {
            let label = match s {
                ImageSize::Square => "📱 1024x1024",
                ImageSize::Portrait => "📄 1024x1536",
                ImageSize::Landscape => "🖥️ 1536x1024",
                ImageSize::Auto => "🤖 Auto",
            };
            Button::new(label, format!("{CB_SIZE_PREFIX}{s}"))
        })
        .collect();
    let mut rows = pairs(buttons);
    rows.push(back_to_settings_row());
    Keyboard::new(rows)
}

/// Image quality selection.
#[must_use]
pub fn image_quality_keyboard() -> Keyboard {
    let buttons = ImageQuality::ALL
        .iter()
        .map(|q| {
            let label = match q {
                ImageQuality::Low => "🔧 Low",
                ImageQuality::Medium => "⚖️ Medium",
                ImageQuality::High => "🎨 High",
                ImageQuality::Auto => "🤖 Auto",
            };
            Button::new(label, format!("{CB_QUALITY_PREFIX}{q}"))
        })
        .collect();
    let mut rows = pairs(buttons);
    rows.push(back_to_settings_row());
    Keyboard::new(rows)
}

/// Back button of the custom speed prompt.
#[must_use]
pub fn custom_speed_keyboard() -> Keyboard {
    Keyboard::single("🔙 Назад", CB_SETTINGS_SPEED)
}

// ─────────────────────────────────────────────────────────────────────────────
// Menu texts
// ─────────────────────────────────────────────────────────────────────────────

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

const fn openai_status(connected: bool) -> &'static str {
    if connected {
        "✅ Підключено"
    } else {
        "❌ Не підключено"
    }
}

/// Welcome text of `/start` and the main menu.
#[must_use]
pub fn welcome_text(first_name: &str, openai_connected: bool) -> String {
    format!(
        "Привіт, {}! 👋\n\n\
         Я розумний телеграм бот з функціями OpenAI.\n\
         Оберіть функцію з меню нижче:\n\n\
         OpenAI: {}",
        escape_html(first_name),
        openai_status(openai_connected)
    )
}

/// Prompt screen shown after a capability button.
#[must_use]
pub const fn purpose_prompt(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Ask => "🤖 <b>Запитати AI</b>\n\nНапишіть ваш запит, і я відповім на нього за допомогою штучного інтелекту.\n\nПриклад: Що таке машинне навчання?",
        Purpose::Creative => "✨ <b>Креативне письмо</b>\n\nОпишіть тему або жанр, і я створю креативний текст.\n\nПриклад: Напиши вірш про зиму",
        Purpose::Code => "💻 <b>Генерація коду</b>\n\nОпишіть, який код потрібно згенерувати.\n\nПриклад: Створи функцію сортування масиву",
        Purpose::Translate => "🌐 <b>Переклад тексту</b>\n\nНапишіть текст, який потрібно перекласти.\n\nПриклад: Hello world",
        Purpose::Summarize => "📝 <b>Резюме тексту</b>\n\nНадішліть текст, який потрібно резюмувати.\n\nПриклад: [ваш довгий текст]",
        Purpose::Explain => "💡 <b>Пояснення концепції</b>\n\nНапишіть концепцію або термін, який потрібно пояснити.\n\nПриклад: Що таке машинне навчання?",
        Purpose::Tts => "🎤 <b>Озвучка тексту</b>\n\nНапишіть текст для озвучування.\n\nПриклад: Привіт, як справи?",
        Purpose::Image => "🖼️ <b>Генерація зображення</b>\n\nОпишіть зображення, яке потрібно згенерувати.\n\nПриклад: Кіт, що грає з м'ячем",
    }
}

/// Settings menu title.
pub const SETTINGS_TEXT: &str = "⚙️ <b>Налаштування</b>\n\nОберіть параметр для зміни:";
/// Voice selection title.
pub const VOICE_SETTINGS_TEXT: &str =
    "🎤 <b>Налаштування голосу TTS</b>\n\nОберіть голос для озвучування:";
/// Speed selection title.
pub const SPEED_SETTINGS_TEXT: &str =
    "⚡ <b>Налаштування швидкості TTS</b>\n\nОберіть швидкість озвучування:";
/// Image size selection title.
pub const IMAGE_SIZE_SETTINGS_TEXT: &str =
    "📐 <b>Налаштування розміру зображення</b>\n\nОберіть розмір для генерації зображень:";
/// Image quality selection title.
pub const IMAGE_QUALITY_SETTINGS_TEXT: &str =
    "🎨 <b>Налаштування якості зображення</b>\n\nОберіть якість для генерації зображень:";
/// Custom speed prompt.
pub const CUSTOM_SPEED_PROMPT: &str =
    "⚡ <b>Введіть власну швидкість</b>\n\nВведіть число від 0.25 до 4.0 (наприклад: 1.5):";
/// Custom speed that isn't a number.
pub const CUSTOM_SPEED_NOT_A_NUMBER: &str =
    "❌ Невірний формат числа. Введіть число від 0.25 до 4.0 (наприклад: 1.5):";
/// Custom speed out of range.
pub const CUSTOM_SPEED_OUT_OF_RANGE: &str =
    "❌ Швидкість повинна бути від 0.25 до 4.0. Спробуйте ще раз:";
/// Toast for a malformed speed payload.
pub const INVALID_SPEED_TOAST: &str = "❌ Невірний формат швидкості";
/// Shown when no OpenAI key is configured.
pub const NOT_CONFIGURED_TEXT: &str =
    "❌ OpenAI API ключ не налаштовано. Зверніться до адміністратора.";

/// Voice change confirmation.
#[must_use]
pub fn voice_changed_text(voice: Voice) -> String {
    format!(
        "✅ <b>Голос змінено на: {}</b>\n\nТепер всі озвучки будуть використовувати голос <b>{voice}</b>",
        title_case(voice.as_str())
    )
}

/// Speed change confirmation.
#[must_use]
pub fn speed_changed_text(speed: f64) -> String {
    let speed = format_speed(speed);
    format!(
        "✅ <b>Швидкість змінено на: {speed}x</b>\n\nТепер всі озвучки будуть використовувати швидкість <b>{speed}x</b>"
    )
}

/// Image size change confirmation.
#[must_use]
pub fn image_size_changed_text(size: ImageSize) -> String {
    format!(
        "✅ <b>Розмір зображення змінено на: {size}</b>\n\nТепер всі зображення будуть генеруватися в розмірі <b>{size}</b>"
    )
}

/// Image quality change confirmation.
#[must_use]
pub fn image_quality_changed_text(quality: ImageQuality) -> String {
    let upper = quality.as_str().to_uppercase();
    format!(
        "✅ <b>Якість зображення змінено на: {upper}</b>\n\nТепер всі зображення будуть генеруватися з якістю <b>{upper}</b>"
    )
}

/// Help screen of the menu button.
pub const HELP_MENU_TEXT: &str = "🤖 <b>Доступні функції:</b>

<b>Основні функції:</b>
🤖 Запитати AI - запитати щось у штучного інтелекту
✨ Креативне письмо - створення креативних текстів
💻 Генерація коду - створення коду на різних мовах
🌐 Переклад - переклад тексту на різні мови
📝 Резюме тексту - створення коротких резюме
💡 Пояснення - пояснення складних концепцій
🎤 Озвучка (TTS) - перетворення тексту в мову
🖼️ Генерація зображень - створення зображень за описом

<b>Як користуватися:</b>
1. Натисніть на потрібну функцію в меню
2. Введіть текст згідно з інструкціями
3. Отримайте результат

<b>Команди:</b>
/start - головне меню
/help - ця допомога";

/// Reply to `/help`.
pub const HELP_COMMAND_TEXT: &str = "🤖 <b>Доступні команди:</b>

<b>Основні команди:</b>
/start - Почати роботу з ботом (показати меню)
/help - Показати це повідомлення
/echo - Повторити ваше повідомлення
/info - Інформація про бота

<b>OpenAI функції:</b>
/ask - Запитати щось у AI (наприклад: /ask Що таке штучний інтелект?)
/creative - Креативне письмо (наприклад: /creative Напиши вірш про зиму)
/code - Генерація коду (наприклад: /code Створи функцію сортування)
/translate - Переклад тексту (наприклад: /translate Hello world)
/summarize - Резюме тексту (наприклад: /summarize [ваш довгий текст])
/explain - Пояснення концепції (наприклад: /explain Що таке машинне навчання?)
/tts - Озвучити текст з налаштуваннями (наприклад: /tts Привіт! | alloy | 1.5)
/tts_settings - Показати налаштування TTS та приклади використання
/image - Згенерувати зображення (наприклад: /image Кіт, що грає з м'ячем)
/image_debug - Діагностика генерації зображень

<b>Інтерактивне меню:</b>
Використовуйте /start для доступу до зручного меню з кнопками!

Просто надішліть мені будь-яке повідомлення, і я його повторю!";

/// Info screen.
#[must_use]
pub fn info_text(openai_connected: bool) -> String {
    format!(
        "📊 <b>Інформація про бота:</b>

• Назва: Розумний Telegram Bot з OpenAI
• Версія: {}
• Основні функції: 8 функцій
• Мова: Rust
• Бібліотека: teloxide
• OpenAI: {}

<b>Цей бот надає:</b>
1. Інтеграцію з OpenAI для розумних відповідей
2. Креативне письмо та генерацію коду
3. Переклад та резюмування тексту
4. Пояснення складних концепцій
5. Генерацію озвучки (TTS)
6. Генерацію зображень",
        env!("CARGO_PKG_VERSION"),
        openai_status(openai_connected)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Command texts
// ─────────────────────────────────────────────────────────────────────────────

/// Usage hint of a command sent without arguments.
#[must_use]
pub const fn usage_text(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Ask => "Напишіть ваш запит після команди /ask\nНаприклад: /ask Що таке штучний інтелект?",
        OperationKind::Creative => "Напишіть тему для креативного письма після команди /creative\nНаприклад: /creative Напиши вірш про зиму",
        OperationKind::Code => "Опишіть код, який потрібно згенерувати після команди /code\nНаприклад: /code Створи функцію сортування масиву",
        OperationKind::Translate => "Напишіть текст для перекладу після команди /translate\nНаприклад: /translate Hello world",
        OperationKind::Summarize => "Надішліть текст для резюмування після команди /summarize\nНаприклад: /summarize [ваш довгий текст]",
        OperationKind::Explain => "Напишіть концепцію для пояснення після команди /explain\nНаприклад: /explain Що таке машинне навчання?",
        OperationKind::Speech => TTS_USAGE_TEXT,
        OperationKind::Image | OperationKind::ImageDebug => "Опишіть зображення, яке потрібно згенерувати після команди /image\nНаприклад: /image Кіт, що грає з м'ячем",
    }
}

/// Usage of `/tts`.
pub const TTS_USAGE_TEXT: &str = "🎤 <b>Озвучка тексту</b>

Використання:
• <code>/tts Привіт, як справи?</code> - звичайна озвучка
• <code>/tts Привіт, як справи? | 1.5</code> - озвучка зі швидкістю 1.5x
• <code>/tts Привіт, як справи? | alloy | 1.5</code> - з голосом та швидкістю

Голоси: alloy, echo, fable, onyx, nova, shimmer
Швидкість: 0.25 - 4.0 (1.0 = нормальна)";

/// Reply to `/echo text`.
#[must_use]
pub fn echo_text(text: &str) -> String {
    format!("Ви написали: {}", escape_html(text))
}

/// `/echo` without text.
pub const ECHO_USAGE_TEXT: &str = "Напишіть щось після команди /echo";

/// Fallback reply to free text.
#[must_use]
pub fn fallback_echo_text(text: &str) -> String {
    format!("🔔 Ви написали: {}", escape_html(text))
}

/// Reply to `/tts_settings`.
#[must_use]
pub fn tts_settings_text(prefs: &UserPreferences, voices: &[Voice], range: (f64, f64)) -> String {
    format!(
        "🎤 <b>Налаштування TTS</b>

<b>Поточні налаштування:</b>
• Голос: <code>{}</code>
• Швидкість: <code>{}x</code>

<b>Доступні голоси:</b>
{}

<b>Діапазон швидкості:</b>
{}x - {}x (1.0 = нормальна)

<b>Приклади використання:</b>
• <code>/tts Привіт!</code> - звичайна озвучка
• <code>/tts Привіт! | 1.5</code> - швидкість 1.5x
• <code>/tts Привіт! | nova</code> - голос nova
• <code>/tts Привіт! | echo | 0.8</code> - голос echo, швидкість 0.8x",
        prefs.voice,
        format_speed(prefs.speed),
        list_options(voices),
        format_speed(range.0),
        format_speed(range.1)
    )
}

/// Option hints shown when speech synthesis fails.
#[must_use]
pub fn speech_hints_text(voices: &[Voice], range: (f64, f64)) -> String {
    format!(
        "Доступні голоси: {}\nШвидкість: {} - {}",
        list_options(voices),
        format_speed(range.0),
        format_speed(range.1)
    )
}

/// Default hints when the live lookup is unavailable.
#[must_use]
pub fn default_speech_hints() -> String {
    speech_hints_text(Voice::ALL, (MIN_SPEED, MAX_SPEED))
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

const fn result_header(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Creative => "✨ <b>Креативний текст:</b>",
        OperationKind::Code => "🔧 <b>Згенерований код:</b>",
        OperationKind::Translate => "🔄 <b>Переклад:</b>",
        OperationKind::Summarize => "📋 <b>Резюме:</b>",
        OperationKind::Explain => "🎓 <b>Пояснення:</b>",
        _ => "🧠 <b>Відповідь:</b>",
    }
}

/// Formats an already sanitized answer into message-sized parts.
///
/// The header goes on the first part; code answers wrap every part in
/// `<code>` so no tag spans two messages.
#[must_use]
pub fn text_result_parts(kind: OperationKind, sanitized: &str) -> Vec<String> {
    let header = result_header(kind);
    let is_code = kind == OperationKind::Code;
    let budget = TELEGRAM_MESSAGE_LIMIT - header.chars().count() - "\n\n<code></code>".len();

    let mut parts: Vec<String> = split_long_message(sanitized, budget)
        .into_iter()
        .map(|part| if is_code { format!("<code>{part}</code>") } else { part })
        .collect();

    match parts.first_mut() {
        Some(first) => *first = format!("{header}\n\n{first}"),
        None => parts.push(format!("{header}\n\n(порожня відповідь)")),
    }
    parts
}

/// Status text after a voice message was delivered.
pub const SPEECH_READY_TEXT: &str = "✅ Озвучка готова!";
/// Status text after two images were delivered.
pub const IMAGES_READY_TEXT: &str = "✅ Згенеровано 2 варіанти зображення!";
/// Status text when only one of two images came back.
pub const IMAGE_PARTIAL_TEXT: &str = "✅ Зображення згенеровано! (Отримано 1 варіант замість 2)";

/// Raw characters of user text quoted in a caption.
const CAPTION_QUOTE_CHARS: usize = 800;

/// Escapes `text`, cutting it on a character boundary so the escaped form
/// plus an ellipsis fits in `budget` characters.
fn escape_within(text: &str, budget: usize) -> String {
    let escaped = escape_html(text);
    if escaped.chars().count() <= budget {
        return escaped;
    }
    let limit = budget.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0;
    let mut buf = [0u8; 4];
    for c in text.chars() {
        let piece = escape_html(c.encode_utf8(&mut buf));
        let len = piece.chars().count();
        if used + len > limit {
            break;
        }
        used += len;
        out.push_str(&piece);
    }
    out.push_str("...");
    out
}

/// `head` + quoted user text + `tail`, within the caption limit. Only the
/// quote is shortened; it is cut before escaping.
fn caption(head: &str, quote: &str, tail: &str) -> String {
    let budget = TELEGRAM_CAPTION_LIMIT
        .saturating_sub(head.chars().count())
        .saturating_sub(tail.chars().count());
    let quote = escape_within(&truncate_str(quote, CAPTION_QUOTE_CHARS), budget);
    format!("{head}{quote}{tail}")
}

/// Caption of a synthesized voice message.
#[must_use]
pub fn speech_caption(text: &str, voice: Voice, speed: f64) -> String {
    let tail = format!("\nГолос: {voice}, Швидкість: {}x", format_speed(speed));
    caption("🔊 <b>Озвучка:</b> ", text, &tail)
}

/// Caption of generated images; `count` is how many were delivered.
#[must_use]
pub fn image_caption(prompt: &str, count: usize, size: ImageSize, quality: ImageQuality) -> String {
    let title = if count > 1 {
        format!("🖼️ <b>Варіанти 1-{count}:</b>")
    } else {
        "🖼️ <b>Згенероване зображення:</b>".to_string()
    };
    let tail = format!(
        "\nРозмір: {size}, Якість: {}",
        quality.as_str().to_uppercase()
    );
    caption(&format!("{title} "), prompt, &tail)
}

/// Header of `/image_debug`.
#[must_use]
pub fn image_debug_header(prompt: &str, model: &str, prefs: &UserPreferences) -> String {
    format!(
        "🔍 <b>Діагностика генерації зображення</b>\n\nПромт: {}\n\n\
         <b>Налаштування:</b>\n• Модель: {}\n• Розмір: {}\n• Якість: {}",
        escape_html(prompt),
        escape_html(model),
        prefs.image_size,
        prefs.image_quality
    )
}

/// Result of `/image_debug`.
#[must_use]
pub fn image_debug_result(images: &[Vec<u8>]) -> String {
    let first = images
        .first()
        .map_or_else(|| "None".to_string(), |img| img.len().to_string());
    format!(
        "<b>Результат:</b>\n• Кількість зображень: {}\n• Розмір першого зображення: {first} байт",
        images.len()
    )
}

/// Caption of the `/image_debug` photo.
pub const IMAGE_DEBUG_CAPTION: &str = "✅ Тестове зображення";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_menu_layout() {
        let keyboard = main_menu_keyboard();
        let sizes: Vec<usize> = keyboard.rows.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 2, 2, 2, 1]);
        assert_eq!(
            keyboard.payloads().collect::<Vec<_>>(),
            vec![
                "ask_ai", "creative", "code", "translate", "summarize", "explain", "tts",
                "image", "settings", "help", "info"
            ]
        );
    }

    #[test]
    fn test_selection_keyboards_payloads() {
        assert!(voice_keyboard().payloads().any(|p| p == "voice_shimmer"));
        assert!(speed_keyboard().payloads().any(|p| p == "speed_0.75"));
        assert!(speed_keyboard().payloads().any(|p| p == CB_SPEED_CUSTOM));
        assert!(image_size_keyboard()
            .payloads()
            .any(|p| p == "size_1536x1024"));
        assert!(image_quality_keyboard().payloads().any(|p| p == "quality_auto"));
        assert_eq!(voice_keyboard().rows[0][0].text, "🎵 Alloy");
    }

    #[test]
    fn test_welcome_escapes_name() {
        let text = welcome_text("<Оля>", true);
        assert!(text.starts_with("Привіт, &lt;Оля&gt;! 👋"));
        assert!(text.ends_with("OpenAI: ✅ Підключено"));
        assert!(welcome_text("Оля", false).ends_with("❌ Не підключено"));
    }

    #[test]
    fn test_confirmations() {
        assert!(voice_changed_text(Voice::Nova).starts_with("✅ <b>Голос змінено на: Nova</b>"));
        assert!(speed_changed_text(1.0).contains("<b>1.0x</b>"));
        assert!(image_quality_changed_text(ImageQuality::High).contains("<b>HIGH</b>"));
    }

    #[test]
    fn test_code_parts_are_wrapped_individually() {
        let body = "let x = 1;\n".repeat(800);
        let parts = text_result_parts(OperationKind::Code, &body);

        assert!(parts.len() > 1);
        assert!(parts[0].starts_with("🔧 <b>Згенерований код:</b>\n\n<code>"));
        assert!(parts
            .iter()
            .all(|p| p.ends_with("</code>") && p.chars().count() <= TELEGRAM_MESSAGE_LIMIT));
    }

    #[test]
    fn test_captions() {
        assert_eq!(
            speech_caption("Привіт", Voice::Nova, 1.5),
            "🔊 <b>Озвучка:</b> Привіт\nГолос: nova, Швидкість: 1.5x"
        );
        assert_eq!(
            image_caption("a red cat", 1, ImageSize::Auto, ImageQuality::High),
            "🖼️ <b>Згенероване зображення:</b> a red cat\nРозмір: auto, Якість: HIGH"
        );
        assert!(image_caption(&"x".repeat(3000), 2, ImageSize::Square, ImageQuality::Low)
            .chars()
            .count()
            <= TELEGRAM_CAPTION_LIMIT);
    }

    #[test]
    fn test_caption_keeps_tail_when_escaping_expands() {
        let caption = speech_caption(&"&".repeat(800), Voice::Nova, 1.5);
        assert!(caption.chars().count() <= TELEGRAM_CAPTION_LIMIT);
        let body = caption
            .strip_suffix("\nГолос: nova, Швидкість: 1.5x")
            .expect("voice line kept");
        assert!(body.ends_with("&amp;..."));

        let caption = image_caption(&"<".repeat(800), 2, ImageSize::Square, ImageQuality::Low);
        assert!(caption.chars().count() <= TELEGRAM_CAPTION_LIMIT);
        assert!(caption.ends_with("&lt;...\nРозмір: 1024x1024, Якість: LOW"));
    }
}
