//! Expression catalog.
//!
//! An immutable, ordered mapping from expression name to its display record.
//! Loaded once at startup; if the source is missing or malformed the catalog
//! falls back to a single built-in `joyful` entry so the server still starts.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CatalogError;

/// Name of the built-in fallback expression and the preferred initial one.
pub const DEFAULT_EXPRESSION: &str = "joyful";

/// A named visual identity the avatar can display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expression {
    pub name: String,
    #[serde(alias = "image", default)]
    pub image_ref: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "use_cases", default)]
    pub use_cases: String,
}

impl Expression {
    /// The built-in entry used when no catalog can be loaded.
    pub fn fallback() -> Self {
        Self {
            name: DEFAULT_EXPRESSION.to_string(),
            image_ref: format!("{}.png", DEFAULT_EXPRESSION),
            description: "Bright, cheerful default expression".to_string(),
            use_cases: "Greetings, good news, general positive reactions".to_string(),
        }
    }
}

/// Record shape used in the object-keyed catalog file form.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpressionRecord {
    #[serde(alias = "imageRef", default)]
    image: String,
    #[serde(default)]
    description: String,
    #[serde(alias = "use_cases", default)]
    use_cases: String,
}

/// Closed set of expressions for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<Expression>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog from records; later duplicates are ignored.
    ///
    /// A catalog is never empty: with no usable records it holds the
    /// built-in default entry.
    pub fn from_expressions(expressions: impl IntoIterator<Item = Expression>) -> Self {
        let catalog = Self::build(expressions);
        if catalog.is_empty() {
            return Self::build([Expression::fallback()]);
        }
        catalog
    }

    fn build(expressions: impl IntoIterator<Item = Expression>) -> Self {
        let mut entries = Vec::new();
        let mut index = HashMap::new();
        for expression in expressions {
            if expression.name.is_empty() || index.contains_key(&expression.name) {
                tracing::warn!(name = %expression.name, "Skipping empty or duplicate expression name");
                continue;
            }
            index.insert(expression.name.clone(), entries.len());
            entries.push(expression);
        }
        Self { entries, index }
    }

    /// Single-entry catalog containing only the built-in default.
    pub fn fallback() -> Self {
        Self::from_expressions([Expression::fallback()])
    }

    /// Load the catalog from a JSON file, falling back on any failure.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(catalog) => {
                tracing::info!(path = %path.display(), count = catalog.len(), "Loaded expression catalog");
                catalog
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Using built-in fallback expression catalog");
                Self::fallback()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse either an object keyed by name or an array of full records.
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        let value: Value = serde_json::from_str(raw)?;
        let expressions = match value {
            Value::Object(map) => {
                let mut out = Vec::with_capacity(map.len());
                for (name, record) in map {
                    let record: ExpressionRecord = serde_json::from_value(record)?;
                    out.push(Expression {
                        name,
                        image_ref: record.image,
                        description: record.description,
                        use_cases: record.use_cases,
                    });
                }
                out
            }
            other => serde_json::from_value::<Vec<Expression>>(other)?,
        };

        let catalog = Self::build(expressions);
        if catalog.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(catalog)
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<&Expression> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Names in load order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// All records in load order.
    pub fn expressions(&self) -> &[Expression] {
        &self.entries
    }

    /// `joyful` if present, otherwise the first entry.
    pub fn initial(&self) -> &Expression {
        self.lookup(DEFAULT_EXPRESSION).unwrap_or(&self.entries[0])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::fallback()
    }
}
