//! Keyword lookup tables for lecture queries.
//!
//! Each table maps a canonical value (as it appears in the timetable) to the
//! aliases a student may type. Recognition walks a table in order and picks
//! the first entry with an alias contained in the query.
//!
//! The built-in tables cover the seven Arabic weekdays, the four study
//! levels, and the two departments. A `[keywords]` section in the config
//! file replaces any of them field by field:
//!
//! ```toml
//! [keywords]
//! today = ["اليوم", "today"]
//!
//! [[keywords.departments]]
//! canonical = "هندسة برمجيات"
//! aliases = ["برمجيات", "software"]
//! core = "برمجيات"
//! ```

use anyhow::{bail, Result};
use serde::Deserialize;

/// One canonical value and the ways a query can refer to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordEntry {
    pub canonical: String,
    pub aliases: Vec<String>,
    /// Short form a stored label may contain instead of the full canonical
    /// value (e.g. the weekday without its article).
    #[serde(default)]
    pub core: Option<String>,
}

impl KeywordEntry {
    fn new(canonical: &str, aliases: &[&str], core: Option<&str>) -> Self {
        Self {
            canonical: canonical.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            core: core.map(str::to_string),
        }
    }

    /// Whether a stored lecture label refers to this entry.
    ///
    /// Both sides are compared lowercased and trimmed. A blank label never
    /// matches.
    pub fn matches_label(&self, label: &str) -> bool {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return false;
        }
        let target = self.canonical.trim().to_lowercase();
        if label.contains(&target) || target.contains(&label) {
            return true;
        }
        match self.core {
            Some(ref core) => {
                let core = core.trim().to_lowercase();
                !core.is_empty() && label.contains(&core)
            }
            None => false,
        }
    }
}

/// The full set of lookup tables used by the lecture filter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordTables {
    #[serde(default = "default_today")]
    pub today: Vec<String>,
    #[serde(default = "default_days")]
    pub days: Vec<KeywordEntry>,
    #[serde(default = "default_levels")]
    pub levels: Vec<KeywordEntry>,
    #[serde(default = "default_departments")]
    pub departments: Vec<KeywordEntry>,
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            today: default_today(),
            days: default_days(),
            levels: default_levels(),
            departments: default_departments(),
            stop_words: default_stop_words(),
        }
    }
}

impl KeywordTables {
    /// Reject tables that could never match anything.
    pub fn validate(&self) -> Result<()> {
        for (name, table) in [
            ("days", &self.days),
            ("levels", &self.levels),
            ("departments", &self.departments),
        ] {
            for entry in table {
                if entry.canonical.trim().is_empty() {
                    bail!("keywords.{}: canonical value must not be empty", name);
                }
                if entry.aliases.iter().all(|a| a.trim().is_empty()) {
                    bail!(
                        "keywords.{}: entry '{}' needs at least one alias",
                        name,
                        entry.canonical
                    );
                }
            }
        }
        Ok(())
    }

    /// True when the (already lowercased) query refers to the current day.
    pub fn mentions_today(&self, query: &str) -> bool {
        self.today
            .iter()
            .any(|t| !t.is_empty() && query.contains(&t.to_lowercase()))
    }

    pub fn recognize_day(&self, query: &str) -> Option<&KeywordEntry> {
        recognize(&self.days, query)
    }

    pub fn recognize_level(&self, query: &str) -> Option<&KeywordEntry> {
        recognize(&self.levels, query)
    }

    pub fn recognize_department(&self, query: &str) -> Option<&KeywordEntry> {
        recognize(&self.departments, query)
    }

    /// Look up a day entry by canonical name, falling back to a bare entry
    /// when the table does not list it.
    pub fn day_entry(&self, canonical: &str) -> KeywordEntry {
        self.days
            .iter()
            .find(|d| d.canonical == canonical)
            .cloned()
            .unwrap_or_else(|| KeywordEntry {
                canonical: canonical.to_string(),
                aliases: vec![canonical.to_string()],
                core: None,
            })
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.iter().any(|s| s == word)
    }
}

fn recognize<'a>(table: &'a [KeywordEntry], query: &str) -> Option<&'a KeywordEntry> {
    table.iter().find(|entry| {
        entry
            .aliases
            .iter()
            .any(|alias| !alias.is_empty() && query.contains(&alias.to_lowercase()))
    })
}

fn default_today() -> Vec<String> {
    ["اليوم", "هذا اليوم", "الآن"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_days() -> Vec<KeywordEntry> {
    vec![
        KeywordEntry::new("الأحد", &["الأحد", "احد", "sunday"], Some("أحد")),
        KeywordEntry::new("الاثنين", &["الاثنين", "اثنين", "monday"], Some("اثنين")),
        KeywordEntry::new("الثلاثاء", &["الثلاثاء", "ثلاثاء", "tuesday"], Some("ثلاثاء")),
        KeywordEntry::new("الأربعاء", &["الأربعاء", "اربعاء", "wednesday"], Some("أربعاء")),
        KeywordEntry::new("الخميس", &["الخميس", "خميس", "thursday"], Some("خميس")),
        KeywordEntry::new("الجمعة", &["الجمعة", "جمعة", "friday"], Some("جمعة")),
        KeywordEntry::new("السبت", &["السبت", "سبت", "saturday"], Some("سبت")),
    ]
}

fn default_levels() -> Vec<KeywordEntry> {
    vec![
        KeywordEntry::new(
            "المستوى الأول",
            &["مستوى اول", "مستوى 1", "اول", "1"],
            Some("الأول"),
        ),
        KeywordEntry::new(
            "المستوى الثاني",
            &["مستوى ثاني", "مستوى 2", "ثاني", "2"],
            Some("الثاني"),
        ),
        KeywordEntry::new(
            "المستوى الثالث",
            &["مستوى ثالث", "مستوى 3", "ثالث", "3"],
            Some("الثالث"),
        ),
        KeywordEntry::new(
            "المستوى الرابع",
            &["مستوى رابع", "مستوى 4", "رابع", "4"],
            Some("الرابع"),
        ),
    ]
}

fn default_departments() -> Vec<KeywordEntry> {
    vec![
        KeywordEntry::new("علوم حاسوب", &["علوم حاسوب", "حاسوب", "computer"], Some("حاسوب")),
        KeywordEntry::new("تقنية معلومات", &["تقنية معلومات", "معلومات", "it"], None),
    ]
}

fn default_stop_words() -> Vec<String> {
    [
        "في", "من", "إلى", "على", "عن", "مع", "هو", "هي", "أن", "إن", "ما", "متى", "أين", "كيف",
        "لماذا", "ال",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
