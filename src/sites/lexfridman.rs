//! Lex Fridman Podcast adapter.
//!
//! Public site; indexes transcript links from lexfridman.com/podcast and
//! downloads each transcript page as plain text.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::{ItemOutcome, ProgressSink, SiteAdapter, SiteClient, SiteMetadata};
use crate::config::{Credentials, Settings};
use crate::models::{slugify, AssetType, ContentItem};

const BASE_URL: &str = "https://lexfridman.com";
const PODCAST_URL: &str = "https://lexfridman.com/podcast";

pub struct LexFridmanSite {
    client: SiteClient,
}

impl LexFridmanSite {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            client: SiteClient::new(Duration::from_secs(settings.request_timeout_secs))?,
        })
    }

    /// Parse the podcast listing into items. Separated from fetching so the
    /// non-Send DOM never crosses an await point and so indexing is
    /// testable against canned HTML.
    fn parse_listing(html: &str) -> Vec<ContentItem> {
        let document = Html::parse_document(html);
        let anchor = Selector::parse("a[href]").expect("static selector");
        let episode_re = Regex::new(r"#(\d+)").expect("static regex");

        let mut items = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for link in document.select(&anchor) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !href.trim_end_matches('/').ends_with("-transcript") {
                continue;
            }
            if !seen.insert(href.to_string()) {
                continue;
            }

            let full_url = Url::parse(BASE_URL)
                .and_then(|base| base.join(href))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string());

            // Pattern: /guest-name-transcript or /guest-name-N-transcript
            let slug = href
                .trim_matches('/')
                .trim_end_matches("-transcript")
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            if slug.is_empty() {
                continue;
            }

            let link_text = link.text().collect::<String>().trim().to_string();
            let title = if link_text.len() > 10 && !link_text.eq_ignore_ascii_case("transcript") {
                link_text
            } else {
                humanize_slug(&slug)
            };

            let id = match episode_re.captures(&title).and_then(|c| c.get(1)) {
                Some(num) => format!("lex_{}_{}", num.as_str(), slugify(&slug)),
                None => format!("lex_{}", slugify(&slug)),
            };

            let mut item = ContentItem::new(id, title, full_url, AssetType::Transcript, "podcast");
            item.subcategory = "transcripts".to_string();
            items.push(item);
        }

        items
    }

    /// Extract transcript text from an episode page.
    fn parse_transcript(html: &str, fallback_title: &str) -> (String, String) {
        let document = Html::parse_document(html);
        let h1 = Selector::parse("h1").expect("static selector");
        let paragraph = Selector::parse("p").expect("static selector");

        let title = document
            .select(&h1)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title.to_string());

        let mut body = String::new();
        for p in document.select(&paragraph) {
            let text = p.text().collect::<String>();
            let text = text.trim();
            if text.len() < 2 {
                continue;
            }
            body.push_str(text);
            body.push_str("\n\n");
        }

        (title, body)
    }
}

#[async_trait]
impl SiteAdapter for LexFridmanSite {
    fn metadata(&self) -> SiteMetadata {
        SiteMetadata {
            id: "lexfridman",
            name: "Lex Fridman Podcast",
            requires_auth: false,
            asset_types: &["transcript"],
            categories: &["podcast"],
            heavy: false,
        }
    }

    async fn check_auth(&self) -> (bool, String) {
        (true, "No authentication required".to_string())
    }

    async fn login(&self, _credentials: &Credentials) -> (bool, String) {
        (true, "No authentication required".to_string())
    }

    async fn index_content(&self, progress: &ProgressSink) -> anyhow::Result<Vec<ContentItem>> {
        progress.send("Fetching podcast page...");
        let html = self.client.fetch_text(PODCAST_URL).await?;

        let items = Self::parse_listing(&html);
        progress.send(format!("Indexed {} transcripts", items.len()));
        Ok(items)
    }

    async fn download_item(
        &self,
        item: &ContentItem,
        output_dir: &Path,
        progress: &ProgressSink,
    ) -> ItemOutcome {
        progress.send(format!("Fetching transcript: {}", item.title));

        let html = match self.client.fetch_text(&item.url).await {
            Ok(html) => html,
            Err(e) => return ItemOutcome::from_error(e),
        };

        let (title, body) = Self::parse_transcript(&html, &item.title);
        if body.trim().is_empty() {
            return ItemOutcome::Failed {
                error: "No transcript text found on page".to_string(),
            };
        }

        let text = format!("{}\n\n{}", title, body);
        let txt_path = output_dir.join("transcript.txt");
        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            return ItemOutcome::Failed {
                error: e.to_string(),
            };
        }
        if let Err(e) = tokio::fs::write(&txt_path, text.as_bytes()).await {
            return ItemOutcome::Failed {
                error: e.to_string(),
            };
        }

        ItemOutcome::Completed {
            local_path: txt_path,
            size: text.len() as u64,
            message: format!("Saved transcript ({} chars)", text.len()),
        }
    }
}

fn humanize_slug(slug: &str) -> String {
    slug.replace(['-', '_'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div>
            <a href="/jane-doe-3-transcript">Jane Doe #412: On Minds</a>
          </div>
          <div>
            <a href="/john-smith-transcript">Transcript</a>
            <a href="/john-smith-transcript">Transcript</a>
          </div>
          <a href="/about">About</a>
        </body></html>
    "#;

    #[test]
    fn test_parse_listing_extracts_transcript_links() {
        let items = LexFridmanSite::parse_listing(LISTING);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "lex_412_jane_doe_3");
        assert_eq!(items[0].url, "https://lexfridman.com/jane-doe-3-transcript");
        assert_eq!(items[0].asset_type, AssetType::Transcript);
        // Short "Transcript" link text falls back to the humanized slug.
        assert_eq!(items[1].id, "lex_john_smith");
        assert_eq!(items[1].title, "john smith");
    }

    #[test]
    fn test_parse_listing_idempotent_ids() {
        let first = LexFridmanSite::parse_listing(LISTING);
        let second = LexFridmanSite::parse_listing(LISTING);
        let a: Vec<_> = first.iter().map(|i| i.id.clone()).collect();
        let b: Vec<_> = second.iter().map(|i| i.id.clone()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_transcript_collects_paragraphs() {
        let html = r#"
            <html><body>
              <h1>Transcript for Jane Doe</h1>
              <p>Welcome to the show.</p>
              <p>Thanks for having me.</p>
            </body></html>
        "#;
        let (title, body) = LexFridmanSite::parse_transcript(html, "fallback");
        assert_eq!(title, "Transcript for Jane Doe");
        assert!(body.contains("Welcome to the show."));
        assert!(body.contains("Thanks for having me."));
    }
}
