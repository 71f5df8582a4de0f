use std::sync::RwLock;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Locales accepted by the locale switch. Anything else is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Es,
    En,
}

impl Locale {
    pub const ALLOWED: [Locale; 2] = [Locale::Es, Locale::En];

    pub const fn code(self) -> &'static str {
        match self {
            Self::Es => "es",
            Self::En => "en",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, LocaleError> {
        Self::ALLOWED
            .into_iter()
            .find(|locale| locale.code() == raw)
            .ok_or_else(|| LocaleError::Unsupported(raw.to_string()))
    }

    pub fn allowed_codes() -> Vec<&'static str> {
        Self::ALLOWED.iter().map(|locale| locale.code()).collect()
    }

    /// `es`: `$ 1.234,50`, `en`: `$1,234.50`.
    pub fn format_currency(self, amount: Decimal) -> String {
        let rounded = amount.round_dp(2);
        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        let digits = format!("{:.2}", rounded.abs());
        let (integer, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

        match self {
            Self::Es => format!("{sign}$ {},{fraction}", group_thousands(integer, '.')),
            Self::En => format!("{sign}${}.{fraction}", group_thousands(integer, ',')),
        }
    }

    pub const fn yes_no(self, flag: bool) -> &'static str {
        match (self, flag) {
            (Self::Es, true) => "Sí",
            (Self::Es, false) => "No",
            (Self::En, true) => "Yes",
            (Self::En, false) => "No",
        }
    }
}

fn group_thousands(digits: &str, separator: char) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, ch) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(ch);
    }
    grouped
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LocaleError {
    #[error("locale '{0}' is not supported; allowed: es, en")]
    Unsupported(String),
}

/// Active locale shared by the HTTP handlers.
#[derive(Debug, Default)]
pub struct LocaleSetting {
    current: RwLock<Locale>,
}

impl LocaleSetting {
    pub fn new(locale: Locale) -> Self {
        Self {
            current: RwLock::new(locale),
        }
    }

    pub fn current(&self) -> Locale {
        *self.current.read().expect("locale lock poisoned")
    }

    pub fn switch(&self, locale: Locale) {
        *self.current.write().expect("locale lock poisoned") = locale;
    }
}
