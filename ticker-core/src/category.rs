use std::fmt;
use std::path::Path;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CategoryError;

pub const DEFAULT_EMOJI: &str = "📰";
pub const FALLBACK_CATEGORY: &str = "general";

const BUNDLED_TABLE: &str = include_str!("../assets/categories.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub emoji: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Ordered category table. The first matching entry wins, so the order of
/// keys in the source JSON is significant and is kept as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    entries: Vec<(String, Category)>,
}

impl CategoryTable {
    pub fn new(entries: Vec<(String, Category)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(name, mut category)| {
                category.keywords = category
                    .keywords
                    .into_iter()
                    .map(|keyword| keyword.trim().to_lowercase())
                    .filter(|keyword| !keyword.is_empty())
                    .collect();
                (name, category)
            })
            .collect();
        Self { entries }
    }

    /// Single catch-all category used when no table could be loaded.
    pub fn fallback() -> Self {
        Self::new(vec![(
            FALLBACK_CATEGORY.to_owned(),
            Category {
                emoji: DEFAULT_EMOJI.to_owned(),
                keywords: Vec::new(),
            },
        )])
    }

    pub fn from_json(json: &str) -> Result<Self, CategoryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The table compiled into the binary.
    pub fn bundled() -> Self {
        match Self::from_json(BUNDLED_TABLE) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "bundled category table is invalid, using fallback");
                Self::fallback()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, CategoryError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Loads an override file when present, otherwise the bundled table.
    /// A broken override degrades to the fallback table.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::bundled();
        }
        match Self::load_from(path) {
            Ok(table) => {
                debug!(path = %path.display(), categories = table.len(), "loaded category table");
                table
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "category table failed to load, using fallback");
                Self::fallback()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Emoji of the first category with a keyword contained in `title`,
    /// compared case-insensitively.
    pub fn classify(&self, title: &str) -> &str {
        let title = title.to_lowercase();
        self.entries
            .iter()
            .find(|(_, category)| {
                category
                    .keywords
                    .iter()
                    .any(|keyword| title.contains(keyword.as_str()))
            })
            .map(|(_, category)| category.emoji.as_str())
            .unwrap_or(DEFAULT_EMOJI)
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::bundled()
    }
}

impl<'de> Deserialize<'de> for CategoryTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = CategoryTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category name to emoji and keywords")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, category)) = map.next_entry::<String, Category>()? {
                    entries.push((name, category));
                }
                Ok(CategoryTable::new(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}
