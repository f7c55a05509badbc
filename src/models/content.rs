//! Content item model shared by all site adapters.
//!
//! A `ContentItem` describes one downloadable unit of remote content. Items
//! are re-created fresh on every indexing pass; only their download status
//! persists across runs, so the `id` must be derived deterministically from
//! stable identifying fields.

use serde::{Deserialize, Serialize};

/// Kind of asset a content item resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Video,
    Article,
    Pdf,
    Audio,
    Transcript,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Article => "article",
            Self::Pdf => "pdf",
            Self::Audio => "audio",
            Self::Transcript => "transcript",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "video" => Some(Self::Video),
            "article" => Some(Self::Article),
            "pdf" => Some(Self::Pdf),
            "audio" => Some(Self::Audio),
            "transcript" => Some(Self::Transcript),
            _ => None,
        }
    }
}

/// Universal descriptor of one downloadable item across all sources.
///
/// Immutable once created by an adapter's indexing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// Stable identifier, unique per source + content. Derived from stable
    /// fields (slug, feed id, guid) so repeated indexing runs converge on
    /// the same ids.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Canonical page/location URL.
    pub url: String,
    /// Kind of asset this item resolves to.
    pub asset_type: AssetType,
    /// Source-defined grouping (top-level directory name).
    pub category: String,
    /// Optional finer grouping, e.g. feed name.
    #[serde(default)]
    pub subcategory: String,
    /// Publication date (ISO-ish), when known.
    #[serde(default)]
    pub date: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Direct-fetch URL distinct from the page URL, when known.
    pub download_url: Option<String>,
    /// Thumbnail URL, when known.
    pub thumbnail: Option<String>,
}

impl ContentItem {
    /// Create an item with the required fields; optional fields default.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        asset_type: AssetType,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            asset_type,
            category: category.into(),
            subcategory: String::new(),
            date: String::new(),
            description: String::new(),
            download_url: None,
            thumbnail: None,
        }
    }
}

/// Reduce arbitrary text to a stable lowercase identifier fragment.
///
/// Non-alphanumeric runs collapse to a single underscore. Used by adapters
/// to derive deterministic content ids from slugs, guids, and titles.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_sep = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("Hello,  World!"), "hello_world");
        assert_eq!(slugify("--a--b--"), "a_b");
        assert_eq!(slugify("already_fine"), "already_fine");
    }

    #[test]
    fn test_slugify_deterministic() {
        let a = slugify("Episode #412: The Future of Compute");
        let b = slugify("Episode #412: The Future of Compute");
        assert_eq!(a, b);
    }

    #[test]
    fn test_asset_type_round_trip() {
        for t in [
            AssetType::Video,
            AssetType::Article,
            AssetType::Pdf,
            AssetType::Audio,
            AssetType::Transcript,
        ] {
            assert_eq!(AssetType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(AssetType::from_str("bogus"), None);
    }
}
