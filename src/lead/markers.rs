//! Structural markers of a site-form application message.
//!
//! Both the classifier and the extractor read these, so a marker the
//! classifier counts is always one the extractor can capture from.

use std::sync::LazyLock;

use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in marker pattern must compile")
}

/// `Новая заявка № 1234`: group 1 is the application number.
pub(crate) static APPLICATION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)Новая заявка\s*№\s*(\d+)"));

/// `Название формы: Заявка`: group 1 is the form label.
pub(crate) static FORM_NAME: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)Название формы:[ \t]*(Application|Заявка)"));

/// `Данные формы:` section header.
pub(crate) static FORM_DATA: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)Данные формы:"));

/// `Телефон: +7 900 ...`: group 1 is the phone as written.
pub(crate) static PHONE_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)Телефон:[ \t]*([+\d(][+\d \t()\-]*)"));

/// `Куда отправить расчет стоимости` question from the estimate form.
pub(crate) static ESTIMATE_TARGET: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)Куда отправить расч[её]т стоимости"));

/// Phone labels tried in order; the first one found anywhere wins.
pub(crate) static PHONE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        PHONE_LINE.clone(),
        compile(r"(?i)\bтел[.:][ \t]*([+\d(][+\d \t()\-]*)"),
        compile(r"(?i)\bтелефон[.:][ \t]*([+\d(][+\d \t()\-]*)"),
    ]
});

pub(crate) static AREA: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)Площадь строения:[ \t]*([^\r\n]+)"));

pub(crate) static BUDGET: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)бюджет[^:\r\n]*:[ \t]*([^\r\n]+)"));

pub(crate) static LAND: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)земельный участок[^:\r\n]*:[ \t]*([^\r\n]+)"));

/// Capture group 1 of the first match, trimmed. Blank captures count as absent.
pub(crate) fn capture_trimmed(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
