//! Private RSS feed adapter.
//!
//! Works with any pre-authenticated podcast feed URL (Patreon, Supercast,
//! and similar paid feeds embed the subscriber token in the URL, so no
//! separate login step exists). Feeds come from Settings.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::http::audio_extension;
use super::{ItemOutcome, ProgressSink, SiteAdapter, SiteClient, SiteError, SiteMetadata};
use crate::config::{Credentials, FeedConfig, Settings};
use crate::models::{slugify, AssetType, ContentItem};
use crate::utils::{format_size, sanitize_filename};

pub struct PrivateFeedsSite {
    client: SiteClient,
    feeds: Vec<FeedConfig>,
}

/// One `<item>` element of an RSS channel.
#[derive(Debug, Default, Clone)]
struct FeedEntry {
    title: String,
    link: String,
    guid: String,
    pub_date: String,
    description: String,
    enclosure_url: Option<String>,
    enclosure_type: String,
}

impl PrivateFeedsSite {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            client: SiteClient::new(Duration::from_secs(settings.request_timeout_secs))?,
            feeds: settings.feeds.clone(),
        })
    }

    /// Parse RSS channel items out of a feed document.
    fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, SiteError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut entries = Vec::new();
        let mut current: Option<FeedEntry> = None;
        let mut field: Option<&'static str> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"item" => current = Some(FeedEntry::default()),
                    b"title" => field = Some("title"),
                    b"link" => field = Some("link"),
                    b"guid" => field = Some("guid"),
                    b"pubDate" => field = Some("pub_date"),
                    b"description" => field = Some("description"),
                    b"enclosure" => {
                        if let Some(entry) = current.as_mut() {
                            Self::read_enclosure(&e, entry);
                        }
                    }
                    _ => field = None,
                },
                Ok(Event::Empty(e)) => {
                    if e.name().as_ref() == b"enclosure" {
                        if let Some(entry) = current.as_mut() {
                            Self::read_enclosure(&e, entry);
                        }
                    }
                }
                Ok(Event::Text(t)) => {
                    if let (Some(entry), Some(name)) = (current.as_mut(), field) {
                        let text = t
                            .unescape()
                            .map_err(|e| SiteError::Parse(e.to_string()))?
                            .into_owned();
                        Self::assign_field(entry, name, &text);
                    }
                }
                Ok(Event::CData(t)) => {
                    if let (Some(entry), Some(name)) = (current.as_mut(), field) {
                        let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                        Self::assign_field(entry, name, &text);
                    }
                }
                Ok(Event::End(e)) => {
                    field = None;
                    if e.name().as_ref() == b"item" {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(SiteError::Parse(e.to_string())),
            }
        }

        Ok(entries)
    }

    fn assign_field(entry: &mut FeedEntry, name: &str, text: &str) {
        let slot = match name {
            "title" => &mut entry.title,
            "link" => &mut entry.link,
            "guid" => &mut entry.guid,
            "pub_date" => &mut entry.pub_date,
            "description" => &mut entry.description,
            _ => return,
        };
        if slot.is_empty() {
            *slot = text.to_string();
        }
    }

    fn read_enclosure(e: &quick_xml::events::BytesStart<'_>, entry: &mut FeedEntry) {
        for attr in e.attributes().flatten() {
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            match attr.key.as_ref() {
                b"url" => entry.enclosure_url = Some(value),
                b"type" => entry.enclosure_type = value,
                _ => {}
            }
        }
    }

    /// Convert a feed entry into a content item with a stable id.
    fn entry_to_item(entry: &FeedEntry, feed: &FeedConfig) -> Option<ContentItem> {
        if entry.title.is_empty() && entry.guid.is_empty() {
            return None;
        }

        // Prefer the guid for id stability; titles occasionally get edited.
        let stable = if entry.guid.is_empty() {
            slugify(&entry.title)
        } else {
            slugify(&entry.guid)
        };
        if stable.is_empty() {
            return None;
        }

        let title = if entry.title.is_empty() {
            "Untitled Episode".to_string()
        } else {
            entry.title.clone()
        };

        let date = chrono::DateTime::parse_from_rfc2822(&entry.pub_date)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        let download_url = entry
            .enclosure_url
            .clone()
            .filter(|_| entry.enclosure_type.is_empty() || entry.enclosure_type.contains("audio"));

        let mut item = ContentItem::new(
            format!("rss_{}_{}", feed.id, stable),
            title,
            entry.link.clone(),
            AssetType::Audio,
            "podcast",
        );
        item.subcategory = feed.name.clone();
        item.date = date;
        item.description = entry.description.clone();
        item.download_url = download_url;
        Some(item)
    }
}

#[async_trait]
impl SiteAdapter for PrivateFeedsSite {
    fn metadata(&self) -> SiteMetadata {
        SiteMetadata {
            id: "rss",
            name: "Private RSS Feeds",
            requires_auth: false,
            asset_types: &["audio"],
            categories: &["podcast"],
            heavy: true,
        }
    }

    async fn check_auth(&self) -> (bool, String) {
        if self.feeds.is_empty() {
            (false, "No private feeds configured".to_string())
        } else {
            (true, format!("{} feeds configured", self.feeds.len()))
        }
    }

    async fn login(&self, _credentials: &Credentials) -> (bool, String) {
        // Feed URLs are pre-authenticated
        (true, "No authentication required".to_string())
    }

    async fn index_content(&self, progress: &ProgressSink) -> anyhow::Result<Vec<ContentItem>> {
        let mut items = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for feed in &self.feeds {
            progress.send(format!("Indexing {}...", feed.name));

            let xml = match self.client.fetch_text(&feed.url).await {
                Ok(xml) => xml,
                Err(e) => {
                    tracing::warn!(feed = %feed.id, error = %e, "feed fetch failed");
                    progress.send(format!("Error indexing {}: {}", feed.name, e));
                    continue;
                }
            };

            let entries = match Self::parse_feed(&xml) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(feed = %feed.id, error = %e, "feed parse failed");
                    progress.send(format!("Error parsing {}: {}", feed.name, e));
                    continue;
                }
            };

            let before = items.len();
            for entry in &entries {
                if let Some(item) = Self::entry_to_item(entry, feed) {
                    if seen.insert(item.id.clone()) {
                        items.push(item);
                    }
                }
            }
            progress.send(format!(
                "Indexed {} episodes from {}",
                items.len() - before,
                feed.name
            ));
        }

        Ok(items)
    }

    async fn download_item(
        &self,
        item: &ContentItem,
        output_dir: &Path,
        progress: &ProgressSink,
    ) -> ItemOutcome {
        let Some(url) = item.download_url.as_deref() else {
            return ItemOutcome::Failed {
                error: "No audio URL available".to_string(),
            };
        };

        let ext = audio_extension(url);
        let dest = output_dir.join(format!("{}{}", sanitize_filename(&item.title), ext));

        progress.send(format!("Downloading {}...", item.title));
        match self.client.download_file(url, &dest, progress).await {
            Ok(size) => ItemOutcome::Completed {
                local_path: dest,
                size,
                message: format!("Downloaded ({})", format_size(size)),
            },
            Err(e) => ItemOutcome::from_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
          <channel>
            <title>Making Sense</title>
            <item>
              <title><![CDATA[Episode #300: The Mind]]></title>
              <link>https://example.com/ep300</link>
              <guid isPermaLink="false">ms-ep-300</guid>
              <pubDate>Tue, 05 Aug 2025 10:00:00 +0000</pubDate>
              <description><![CDATA[A conversation.]]></description>
              <enclosure url="https://cdn.example.com/ep300.mp3" type="audio/mpeg" length="1234"/>
            </item>
            <item>
              <title>Episode #299</title>
              <link>https://example.com/ep299</link>
              <guid>ms-ep-299</guid>
              <pubDate>bad date</pubDate>
              <enclosure url="https://cdn.example.com/ep299.m4a" type="audio/x-m4a"/>
            </item>
          </channel>
        </rss>
    "#;

    fn feed_config() -> FeedConfig {
        FeedConfig {
            id: "makingsense".to_string(),
            name: "Making Sense".to_string(),
            url: "https://example.com/feed".to_string(),
            author: String::new(),
        }
    }

    #[test]
    fn test_parse_feed_entries() {
        let entries = PrivateFeedsSite::parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Episode #300: The Mind");
        assert_eq!(entries[0].guid, "ms-ep-300");
        assert_eq!(
            entries[0].enclosure_url.as_deref(),
            Some("https://cdn.example.com/ep300.mp3")
        );
        assert_eq!(entries[0].enclosure_type, "audio/mpeg");
    }

    #[test]
    fn test_entry_to_item_stable_ids() {
        let entries = PrivateFeedsSite::parse_feed(FEED).unwrap();
        let feed = feed_config();
        let a = PrivateFeedsSite::entry_to_item(&entries[0], &feed).unwrap();
        let b = PrivateFeedsSite::entry_to_item(&entries[0], &feed).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, "rss_makingsense_ms_ep_300");
        assert_eq!(a.date, "2025-08-05");
        assert_eq!(a.subcategory, "Making Sense");
    }

    #[test]
    fn test_entry_bad_date_tolerated() {
        let entries = PrivateFeedsSite::parse_feed(FEED).unwrap();
        let item = PrivateFeedsSite::entry_to_item(&entries[1], &feed_config()).unwrap();
        assert_eq!(item.date, "");
        assert_eq!(
            item.download_url.as_deref(),
            Some("https://cdn.example.com/ep299.m4a")
        );
    }
}
