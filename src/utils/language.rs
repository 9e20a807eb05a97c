use std::fmt;

/// Language tags recognised by [`detect_language`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Zh,
    Ja,
    Ko,
    Ar,
    Hi,
    En,
}

impl Language {
    pub fn tag(self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::Ja => "ja",
            Language::Ko => "ko",
            Language::Ar => "ar",
            Language::Hi => "hi",
            Language::En => "en",
        }
    }

    /// Role prefix placed in front of prompts written for this language.
    pub fn role_prefix(self) -> &'static str {
        match self {
            Language::Zh => "作为保险条款分析助手，",
            Language::Ja => "保険約款分析アシスタントとして、",
            Language::Ko => "보험 약관 분석 보조자로서, ",
            Language::Ar => "كمساعد لتحليل وثائق التأمين، ",
            Language::Hi => "एक बीमा पॉलिसी विश्लेषण सहायक के रूप में, ",
            Language::En => "As an insurance policy analysis assistant, ",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// Checked in order; the first block with a hit decides.
const SCRIPT_BLOCKS: &[(Language, &[(char, char)])] = &[
    (Language::Zh, &[('\u{4E00}', '\u{9FFF}')]),
    (
        Language::Ja,
        &[('\u{3040}', '\u{309F}'), ('\u{30A0}', '\u{30FF}')],
    ),
    (
        Language::Ko,
        &[('\u{AC00}', '\u{D7AF}'), ('\u{1100}', '\u{11FF}')],
    ),
    (Language::Ar, &[('\u{0600}', '\u{06FF}')]),
    (Language::Hi, &[('\u{0900}', '\u{097F}')]),
];

/// Classifies a text sample by the Unicode blocks it contains.
/// Falls back to English when no tracked script is present.
pub fn detect_language(text: &str) -> Language {
    for (language, ranges) in SCRIPT_BLOCKS {
        let hit = text
            .chars()
            .any(|c| ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c)));
        if hit {
            return *language;
        }
    }
    Language::En
}
