//! System prompts and prompt framing for the text capabilities.

use super::TextRequest;

/// Language used for `/code` and the code button.
pub const DEFAULT_CODE_LANGUAGE: &str = "python";

/// Target language used for `/translate` and the translate button.
pub const DEFAULT_TRANSLATION_TARGET: &str = "українська";

const CREATIVE_PROMPT: &str = "Ти креативний письменник та помічник. Твоя задача - \
створювати цікавий, захоплюючий контент українською мовою. Відповідай живо, використовуючи \
емодзі та різноманітні стилі викладу. Будь дружнім та корисним.";

const SUMMARIZE_PROMPT: &str = "Ти експерт з аналізу тексту. Твоя задача - створювати \
короткі, але інформативні резюме. Виділяй основні ідеї та ключові моменти.";

const EXPLAIN_PROMPT: &str = "Ти експерт-педагог. Твоя задача - пояснювати складні \
концепції простими словами, з прикладами та аналогіями. Будь зрозумілим та корисним.";

/// Text capability selected by a command or menu button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextTask {
    /// Free-form question
    Ask,
    /// Creative writing
    Creative,
    /// Code generation in a language
    Code {
        /// Programming language
        language: String,
    },
    /// Translation into a language
    Translate {
        /// Target language
        target: String,
    },
    /// Summary of a text
    Summarize,
    /// Simple explanation of a concept
    Explain,
}

impl TextTask {
    /// Code generation in the default language.
    #[must_use]
    pub fn code() -> Self {
        Self::Code {
            language: DEFAULT_CODE_LANGUAGE.to_string(),
        }
    }

    /// Translation into the default target language.
    #[must_use]
    pub fn translate() -> Self {
        Self::Translate {
            target: DEFAULT_TRANSLATION_TARGET.to_string(),
        }
    }

    /// Builds the provider request for user `input`.
    #[must_use]
    pub fn request(&self, input: &str) -> TextRequest {
        match self {
            Self::Ask => TextRequest::new(input),
            Self::Creative => TextRequest::new(input).with_system(CREATIVE_PROMPT),
            Self::Code { language } => TextRequest::new(format!(
                "Створи код на мові {language}: {input}"
            ))
            .with_system(format!(
                "Ти експерт-програміст з {language}. Твоя задача - писати якісний, \
                 чистий та добре прокоментований код. Завжди включай коментарі \
                 українською мовою та пояснення логіки роботи коду."
            )),
            Self::Translate { target } => TextRequest::new(format!(
                "Переклади наступний текст на {target}: {input}"
            ))
            .with_system(format!(
                "Ти професійний перекладач. Твоя задача - точно перекладати текст \
                 на {target}, зберігаючи сенс та стиль оригіналу. \
                 Перекладай природно та зрозуміло."
            )),
            Self::Summarize => TextRequest::new(format!(
                "Створи коротке резюме наступного тексту: {input}"
            ))
            .with_system(SUMMARIZE_PROMPT),
            Self::Explain => {
                TextRequest::new(format!("Поясни простими словами: {input}"))
                    .with_system(EXPLAIN_PROMPT)
            }
        }
    }

    /// Whether the answer should be rendered as code.
    #[must_use]
    pub const fn is_code(&self) -> bool {
        matches!(self, Self::Code { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_has_no_system_prompt() {
        let request = TextTask::Ask.request("Що таке Rust?");
        assert_eq!(request.prompt, "Що таке Rust?");
        assert!(request.system_prompt.is_none());
    }

    #[test]
    fn test_code_frames_language() {
        let request = TextTask::code().request("сортування масиву");
        assert_eq!(request.prompt, "Створи код на мові python: сортування масиву");
        assert!(request
            .system_prompt
            .as_deref()
            .is_some_and(|p| p.starts_with("Ти експерт-програміст з python.")));
        assert!(TextTask::code().is_code());
    }

    #[test]
    fn test_translate_frames_target() {
        let request = TextTask::translate().request("Hello world");
        assert_eq!(
            request.prompt,
            "Переклади наступний текст на українська: Hello world"
        );
        assert!(request
            .system_prompt
            .as_deref()
            .is_some_and(|p| p.contains("на українська, зберігаючи")));
    }
}
