//! Resource manifest: declared metadata as an ordered key/value multimap.

use indexmap::IndexMap;
use serde::Deserialize;

/// Manifest key naming a resource that must be started first.
pub const DEPENDENCY_KEY: &str = "dependency";
/// Legacy spelling of [`DEPENDENCY_KEY`], still honored.
pub const LEGACY_DEPENDENCY_KEY: &str = "dependencie";
/// Manifest key naming a callable export.
pub const EXPORT_KEY: &str = "export";
/// Manifest key pointing at the resource's UI entry point.
pub const UI_PAGE_KEY: &str = "uiPage";

/// Parsed resource metadata.
///
/// Keys may repeat; values keep their insertion order, both per key and
/// across keys. A manifest is never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pairs: Vec<(String, String)>,
    // key -> positions in `pairs`, keys in first-seen order
    index: IndexMap<String, Vec<usize>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    One(String),
    Many(Vec<String>),
}

impl Manifest {
    /// Build a manifest from raw key/value pairs.
    pub fn parse<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut manifest = Self::default();
        for (key, value) in pairs {
            manifest.push(key.into(), value.into());
        }
        manifest
    }

    fn push(&mut self, key: String, value: String) {
        self.index.entry(key.clone()).or_default().push(self.pairs.len());
        self.pairs.push((key, value));
    }

    /// Parse a JSON object whose values are strings or arrays of strings.
    ///
    /// ```
    /// use citadel_resource::Manifest;
    ///
    /// let manifest = Manifest::from_json(r#"{ "dependency": ["base", "chat"], "uiPage": "ui/index.html" }"#).unwrap();
    /// assert_eq!(manifest.dependencies().collect::<Vec<_>>(), ["base", "chat"]);
    /// assert_eq!(manifest.ui_page(), Some("ui/index.html"));
    /// ```
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let parsed: IndexMap<String, RawValue> = serde_json::from_str(raw)?;
        let mut manifest = Self::default();
        for (key, value) in parsed {
            match value {
                RawValue::One(v) => manifest.push(key, v),
                RawValue::Many(vs) => {
                    for v in vs {
                        manifest.push(key.clone(), v);
                    }
                }
            }
        }
        Ok(manifest)
    }

    /// All values for `key`, in insertion order. Empty if the key is absent.
    ///
    /// The returned iterator is `Clone`, so it can be restarted.
    pub fn entries<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> + Clone + use<'a> {
        self.index
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&position| self.pairs[position].1.as_str())
    }

    /// First value for `key`, if any.
    #[must_use]
    pub fn first(&self, key: &str) -> Option<&str> {
        self.entries(key).next()
    }

    /// First value for `key`, or `default`.
    #[must_use]
    pub fn first_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.first(key).unwrap_or(default)
    }

    /// Declared dependencies under `dependency` or the legacy `dependencie`,
    /// in the order they were declared.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.pairs
            .iter()
            .filter(|(key, _)| key == DEPENDENCY_KEY || key == LEGACY_DEPENDENCY_KEY)
            .map(|(_, value)| value.as_str())
    }

    /// Declared exports.
    pub fn exports(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.entries(EXPORT_KEY)
    }

    /// Whether `name` is declared as an export.
    #[must_use]
    pub fn declares_export(&self, name: &str) -> bool {
        self.exports().any(|export| export == name)
    }

    /// UI entry point, if declared.
    #[must_use]
    pub fn ui_page(&self) -> Option<&str> {
        self.first(UI_PAGE_KEY)
    }

    /// Keys present in the manifest.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Total number of values across all keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the manifest has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
