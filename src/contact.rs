use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Digits in a Brazilian area code (DDD). The digit right after it marks a mobile line.
pub const AREA_CODE_DIGITS: usize = 2;
pub const MOBILE_MARKER: u8 = b'9';
pub const LANDLINE_DIGITS: usize = 10;
pub const MOBILE_DIGITS: usize = 11;
pub const COUNTRY_CODE: &str = "55";
pub const WHATSAPP_BASE: &str = "https://wa.me/";
/// Stored in place of digits when a card carries no phone at all.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneKind {
    Landline,
    #[serde(rename = "mobile_whatsapp")]
    MobileWhatsApp,
    Indeterminate,
    Invalid,
}

impl PhoneKind {
    pub const ALL: [PhoneKind; 4] = [
        PhoneKind::Landline,
        PhoneKind::MobileWhatsApp,
        PhoneKind::Indeterminate,
        PhoneKind::Invalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhoneKind::Landline => "landline",
            PhoneKind::MobileWhatsApp => "mobile_whatsapp",
            PhoneKind::Indeterminate => "indeterminate",
            PhoneKind::Invalid => "invalid",
        }
    }

    /// Human label shown in tables.
    pub fn label(&self) -> &'static str {
        match self {
            PhoneKind::Landline => "Fixo",
            PhoneKind::MobileWhatsApp => "Celular/WhatsApp",
            PhoneKind::Indeterminate => "Indefinido",
            PhoneKind::Invalid => "Inválido",
        }
    }
}

impl fmt::Display for PhoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhoneKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhoneKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown phone kind: {}", s))
    }
}

/// What to report when a card has no phone at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPhonePolicy {
    #[default]
    Indeterminate,
    Invalid,
}

impl MissingPhonePolicy {
    pub fn kind(self) -> PhoneKind {
        match self {
            MissingPhonePolicy::Indeterminate => PhoneKind::Indeterminate,
            MissingPhonePolicy::Invalid => PhoneKind::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneClassification {
    pub cleaned_digits: String,
    pub kind: PhoneKind,
    /// Empty unless `kind` is `MobileWhatsApp`.
    pub messaging_link: String,
}

/// Normalize a raw, locale-formatted phone and classify it.
///
/// Assumes the number already carries its area code. Pure and total: every
/// input, including `None`, yields a classification.
pub fn classify(raw: Option<&str>, policy: MissingPhonePolicy) -> PhoneClassification {
    let raw = match raw.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => {
            return PhoneClassification {
                cleaned_digits: NOT_AVAILABLE.to_string(),
                kind: policy.kind(),
                messaging_link: String::new(),
            }
        }
    };

    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    let kind = match digits.len() {
        LANDLINE_DIGITS => PhoneKind::Landline,
        MOBILE_DIGITS if digits.as_bytes()[AREA_CODE_DIGITS] == MOBILE_MARKER => {
            PhoneKind::MobileWhatsApp
        }
        _ => PhoneKind::Invalid,
    };

    let messaging_link = match kind {
        PhoneKind::MobileWhatsApp => whatsapp_link(&digits),
        _ => String::new(),
    };

    PhoneClassification {
        cleaned_digits: digits,
        kind,
        messaging_link,
    }
}

fn whatsapp_link(digits: &str) -> String {
    format!("{}{}{}", WHATSAPP_BASE, COUNTRY_CODE, digits)
}
