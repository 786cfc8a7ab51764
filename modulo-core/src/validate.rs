/// Local input validation, run before a transaction begins.
///
/// Mirrors the checks the persistence service applies so obviously bad input
/// never produces a speculative write that is certain to be rolled back.
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::error::ValidationError;

static HEX_COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap());

pub const ALLOWED_BOARD_ICONS: &[&str] = &[
    "Folder",
    "LayoutDashboard",
    "Layers",
    "Briefcase",
    "ClipboardList",
    "CalendarDays",
    "BarChart3",
    "Target",
    "Users",
    "MessagesSquare",
    "LifeBuoy",
    "Lightbulb",
    "Rocket",
    "Package",
    "Palette",
    "PenTool",
];

pub const ALLOWED_COLUMN_ICONS: &[&str] = &[
    "Circle",
    "Play",
    "CheckCircle",
    "Loader",
    "AlarmClock",
    "Bolt",
    "Sparkles",
    "Target",
    "CalendarCheck",
    "ClipboardList",
    "Lightbulb",
    "Flag",
    "Timer",
    "Ship",
    "Kanban",
    "TrendingUp",
    "Zap",
    "Rocket",
    "BadgeCheck",
];

/// Trim and NFC-normalize a required text field.
pub fn title(value: &str, field: &'static str, max: usize) -> Result<String, ValidationError> {
    let normalized: String = value.trim().nfc().collect();
    if normalized.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    let len = normalized.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(normalized)
}

/// Blank optional text collapses to `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().nfc().collect::<String>())
        .filter(|v| !v.is_empty())
}

/// `#RRGGBB` or nothing; blank input clears the colour.
pub fn color(value: Option<String>, field: &'static str) -> Result<Option<String>, ValidationError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if HEX_COLOR_RE.is_match(v) => Ok(Some(v.to_string())),
        Some(v) => Err(ValidationError::InvalidColor {
            field,
            value: v.to_string(),
        }),
    }
}

pub fn column_icon(value: Option<String>) -> Result<Option<String>, ValidationError> {
    icon(value, "column", ALLOWED_COLUMN_ICONS)
}

pub fn board_icon(value: Option<String>) -> Result<Option<String>, ValidationError> {
    icon(value, "board", ALLOWED_BOARD_ICONS)
}

fn icon(
    value: Option<String>,
    field: &'static str,
    allowed: &[&str],
) -> Result<Option<String>, ValidationError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if allowed.contains(&v) => Ok(Some(v.to_string())),
        Some(v) => Err(ValidationError::InvalidIcon {
            field,
            value: v.to_string(),
        }),
    }
}

pub fn wip_limit(value: Option<i64>) -> Result<Option<i64>, ValidationError> {
    match value {
        Some(limit) if limit < 1 => Err(ValidationError::InvalidWipLimit(limit)),
        other => Ok(other),
    }
}

/// Identifiers supplied by callers must not be blank.
pub fn id(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty { field })
    } else {
        Ok(())
    }
}
