//! Attendance status: canonical values, the synonym table, and option
//! selection against a rendered status control.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical attendance status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Status {
    #[default]
    Present,
    Absent,
    #[serde(rename = "On-Hold")]
    OnHold,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Present, Status::Absent, Status::OnHold];

    /// Display label, also the exact option text tried first on the target.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::OnHold => "On-Hold",
        }
    }

    /// Free-text synonyms accepted from a roster, lowercase.
    fn synonyms(&self) -> &'static [&'static str] {
        match self {
            Self::Present => &["present", "p"],
            Self::Absent => &["absent", "a"],
            Self::OnHold => &["on-hold", "onhold", "on hold", "oh", "on_hold"],
        }
    }

    /// Category keyword test for a lowercase option label.
    fn keyword_matches(&self, option_lower: &str) -> bool {
        match self {
            Self::Present => option_lower.contains("present") || option_lower.contains("pres"),
            Self::Absent => option_lower.contains("absent") || option_lower.contains("abs"),
            Self::OnHold => {
                option_lower.contains("hold")
                    || option_lower.contains("onhold")
                    || option_lower.contains("on_hold")
                    || option_lower.contains("on hold")
                    || option_lower == "oh"
            }
        }
    }

    /// Whether a rendered control label shows this status: a synonym, or a
    /// label the keyword tier of [`select_status_option`] would pick.
    pub fn is_shown_by(&self, shown: &str) -> bool {
        match normalize_status(shown) {
            Some(status) => status == *self,
            None => self.keyword_matches(&shown.trim().to_lowercase()),
        }
    }

    /// Classify a raw roster cell. Blank and unrecognized cells fall back to
    /// `Present`; the caller decides whether to warn.
    pub fn read_cell(raw: Option<&str>) -> StatusReading {
        match raw.map(str::trim) {
            None | Some("") => StatusReading::Blank,
            Some(text) => match normalize_status(text) {
                Some(status) => StatusReading::Recognized(status),
                None => StatusReading::Unrecognized(text.to_string()),
            },
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_status(s).ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Result of reading a roster status cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReading {
    Recognized(Status),
    Blank,
    Unrecognized(String),
}

impl StatusReading {
    pub fn status(&self) -> Status {
        match self {
            Self::Recognized(status) => *status,
            Self::Blank | Self::Unrecognized(_) => Status::Present,
        }
    }
}

/// Map free text onto a canonical status through the synonym table.
///
/// Idempotent: a canonical label normalizes to itself.
pub fn normalize_status(raw: &str) -> Option<Status> {
    let lowered = raw.trim().to_lowercase();
    Status::ALL
        .into_iter()
        .find(|status| status.synonyms().contains(&lowered.as_str()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionMatchMethod {
    Exact,
    CaseInsensitive,
    Keyword,
}

/// The option chosen from a status control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOptionMatch {
    pub option: String,
    pub method: OptionMatchMethod,
}

/// Pick the option to select for `target`: exact label, then
/// case-insensitive label, then category keyword. First option in render
/// order wins within each tier.
pub fn select_status_option(options: &[String], target: Status) -> Option<StatusOptionMatch> {
    let label = target.label();
    let found = |method: OptionMatchMethod, pred: &dyn Fn(&str) -> bool| {
        options
            .iter()
            .map(|option| option.trim())
            .find(|option| pred(option))
            .map(|option| StatusOptionMatch {
                option: option.to_string(),
                method,
            })
    };

    found(OptionMatchMethod::Exact, &|option| option == label)
        .or_else(|| {
            found(OptionMatchMethod::CaseInsensitive, &|option| {
                option.eq_ignore_ascii_case(label)
            })
        })
        .or_else(|| {
            found(OptionMatchMethod::Keyword, &|option| {
                target.keyword_matches(&option.to_lowercase())
            })
        })
}
