use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The two languages the collective publishes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Fr,
}

impl Locale {
    /// The locale consulted when a record has no translation for `self`.
    pub fn fallback(self) -> Locale {
        match self {
            Locale::En => Locale::Fr,
            Locale::Fr => Locale::En,
        }
    }

    /// Pick the translation for `self` from a record's translation map,
    /// falling back to the other locale. Returns the locale actually served.
    pub fn resolve<'a, T>(self, translations: &'a BTreeMap<Locale, T>) -> Option<(Locale, &'a T)> {
        translations
            .get(&self)
            .map(|t| (self, t))
            .or_else(|| translations.get(&self.fallback()).map(|t| (self.fallback(), t)))
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "fr" => Ok(Locale::Fr),
            other => Err(format!("unknown locale '{other}' (expected 'en' or 'fr')")),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::En => write!(f, "en"),
            Locale::Fr => write!(f, "fr"),
        }
    }
}

/// Per-locale content of a news item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsTranslation {
    pub title: String,
    pub body: String,
}

/// A news item stored in redb
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsRecord {
    pub id: String,
    pub slug: String,
    pub published: bool,
    pub published_on: NaiveDate,
    pub translations: BTreeMap<Locale, NewsTranslation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-locale content of a work (production)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkTranslation {
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub body: String,
}

/// A work (production) stored in redb
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub year: Option<i32>,
    pub translations: BTreeMap<Locale, WorkTranslation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One performance date of a work. Showings are replaced wholesale on every
/// work save, in the same transaction as the work row itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowingRecord {
    pub id: String,
    pub work_id: String,
    pub date: NaiveDate,
    pub venue: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// A gallery image owned by exactly one news item or work.
///
/// `position` is the display order within the owner's gallery. At most one
/// image per owner should carry `thumbnail = true`; the flag is taken from
/// client input verbatim and not re-enforced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub owner_id: String,
    /// Opaque media-store key for the backing binary
    pub storage_path: String,
    pub mime_type: String,
    pub byte_size: u64,
    #[serde(default)]
    pub author: Option<String>,
    pub thumbnail: bool,
    pub position: u32,
    pub created_at: DateTime<Utc>,
}
