use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Used when the first line of a card is blank.
pub const UNKNOWN_NAME: &str = "Sem Nome";

/// Brazilian phone as rendered on a result card, e.g. `(13) 99999-8888`.
///
/// Captures:
/// - `area`: two-digit area code, parentheses optional
/// - `sep`: the single optional whitespace after the area code
/// - `first`: first group, 4 digits (landline) or 5 (mobile)
/// - `second`: last 4 digits, optionally preceded by a hyphen
///
/// Digits are ASCII only, matching what the cleaner keeps.
const PHONE_PATTERN: &str =
    r"\(?(?P<area>[0-9]{2})\)?(?P<sep>\s?)(?P<first>[0-9]{4,5})-?(?P<second>[0-9]{4})";

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PHONE_PATTERN).unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneMatch {
    /// Exact substring of the card text that matched.
    pub raw: String,
    pub area: String,
    pub sep: String,
    pub first: String,
    pub second: String,
}

impl PhoneMatch {
    fn from_captures(caps: &Captures) -> Self {
        let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or("").to_string();
        PhoneMatch {
            raw: caps[0].to_string(),
            area: group("area"),
            sep: group("sep"),
            first: group("first"),
            second: group("second"),
        }
    }
}

/// First phone-shaped substring in `text`, if any.
pub fn find_phone(text: &str) -> Option<PhoneMatch> {
    PHONE_RE.captures(text).map(|caps| PhoneMatch::from_captures(&caps))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCard {
    pub name: String,
    pub phone: Option<PhoneMatch>,
}

impl ParsedCard {
    pub fn raw_phone(&self) -> Option<&str> {
        self.phone.as_ref().map(|p| p.raw.as_str())
    }
}

/// Split a card's innerText into display name and phone.
pub fn parse_card(text: &str) -> ParsedCard {
    let name = text
        .lines()
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(UNKNOWN_NAME)
        .to_string();

    ParsedCard {
        name,
        phone: find_phone(text),
    }
}
