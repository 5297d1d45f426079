//! Listing-page extraction.
//!
//! A listing page is a sequence of repeated item containers. For each item,
//! [`ListingExtractor`] reads the rank, title, score, image and link with
//! CSS selectors and hands the free-text sections to the two-phase
//! [`SectionStrategy`]. Extraction never mutates the parsed document and
//! always yields the same [`ItemExtraction`] for the same node.

pub mod sections;

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ScrapeConfig;
use crate::error::{IngestError, IngestResult};
use crate::models::ExtractedField;

pub use sections::{FallbackMatcher, PrimaryMatcher, SectionLabel, SectionStrategy};

/// Collapses runs of whitespace to a single space and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-collapsed text content of an element.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Whitespace-collapsed text content of an HTML fragment.
pub fn visible_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    element_text(fragment.root_element())
}

fn title_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<title>.*?)\s*\((?P<year>\d{4})\)\s*(?:\d+\s*%)?\s*$")
            .unwrap_or_else(|_| unreachable!("title pattern is valid"))
    })
}

/// Splits `"Movie X (2024) 91%"` into `("Movie X", Some("2024"))`.
///
/// Titles without the parenthesized year are returned unchanged.
pub fn clean_title(raw: &str) -> (String, Option<String>) {
    let raw = collapse_whitespace(raw);
    match title_suffix().captures(&raw) {
        Some(caps) => (
            caps["title"].trim().to_string(),
            Some(caps["year"].to_string()),
        ),
        None => (raw, None),
    }
}

/// Strips the leading rank marker: `"#3"` → `"3"`.
pub fn strip_rank_marker(raw: &str) -> String {
    raw.trim().trim_start_matches('#').trim().to_string()
}

/// Fields read from one listing item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemExtraction {
    pub position: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    /// Display text of the score element, not coerced to a number.
    pub score: Option<String>,
    pub sections: Vec<ExtractedField>,
    pub image_url: Option<String>,
    pub image_alt: Option<String>,
    pub url: Option<String>,
}

/// Compiled selectors plus the section strategy for one listing layout.
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    base_url: Url,
    item: Selector,
    position: Selector,
    title: Selector,
    score: Selector,
    image: Selector,
    link: Selector,
    strategy: SectionStrategy,
}

fn compile(selector: &str) -> IngestResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| IngestError::Setup(format!("invalid selector `{}`: {}", selector, e)))
}

impl ListingExtractor {
    pub fn new(config: &ScrapeConfig) -> IngestResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| IngestError::Setup(format!("invalid base URL {}: {}", config.base_url, e)))?;
        Ok(Self {
            base_url,
            item: compile(&config.selectors.item)?,
            position: compile(&config.selectors.position)?,
            title: compile(&config.selectors.title)?,
            score: compile(&config.selectors.score)?,
            image: compile("img[src]")?,
            link: compile("a[href]")?,
            strategy: SectionStrategy::new(&config.sections),
        })
    }

    pub fn strategy(&self) -> &SectionStrategy {
        &self.strategy
    }

    /// Parses a full page and extracts every item in document order.
    pub fn extract_page(&self, html: &str) -> Vec<ItemExtraction> {
        let document = Html::parse_document(html);
        let items: Vec<ItemExtraction> = document
            .select(&self.item)
            .map(|item| self.extract_item(item))
            .collect();
        tracing::info!(items = items.len(), "listing items found");
        items
    }

    pub fn extract_item(&self, item: ElementRef<'_>) -> ItemExtraction {
        let first_text = |selector: &Selector| {
            item.select(selector)
                .next()
                .map(element_text)
                .filter(|t| !t.is_empty())
        };

        let position = first_text(&self.position)
            .map(|p| strip_rank_marker(&p))
            .filter(|p| !p.is_empty());
        let (title, year) = match first_text(&self.title) {
            Some(raw) => {
                let (title, year) = clean_title(&raw);
                (Some(title).filter(|t| !t.is_empty()), year)
            }
            None => (None, None),
        };
        let score = first_text(&self.score);

        let image = item.select(&self.image).next();
        let image_url = image
            .and_then(|img| img.value().attr("src"))
            .map(|src| self.resolve(src));
        let image_alt = image
            .and_then(|img| img.value().attr("alt"))
            .map(collapse_whitespace)
            .filter(|alt| !alt.is_empty());
        let url = item
            .select(&self.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| self.resolve(href));

        ItemExtraction {
            position,
            title,
            year,
            score,
            sections: self.strategy.extract(item),
            image_url,
            image_alt,
            url,
        }
    }

    /// Resolves `href` against the base URL; unparsable links are kept verbatim.
    fn resolve(&self, href: &str) -> String {
        self.base_url
            .join(href.trim())
            .map(String::from)
            .unwrap_or_else(|_| href.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionMethod;

    const PAGE: &str = r#"
<html><body>
<div class="row countdown-item">
  <div class="article_movie_poster">
    <a href="/m/movie_x"><img src="https://img.test/x.jpg" alt="Movie X poster"></a>
  </div>
  <div class="col-sm-18 col-full-xs countdown-item-content">
    <span class="countdown-index">#1</span>
    <div class="article_movie_title"><h2>Movie X (2024) 91%</h2></div>
    <span class="tMeterScore">91%</span>
    <div class="info critics-consensus">Critics Consensus: Great film.</div>
    <div class="info synopsis"><strong>Synopsis:</strong> A heist goes wrong.</div>
    <div class="info cast"><strong>Starring:</strong> Ana Díaz, Bo Li</div>
  </div>
</div>
<div class="row countdown-item">
  <span class="countdown-index">#2</span>
  <h2>Untitled Sequel</h2>
  <a href="relative/page">link</a>
</div>
</body></html>"#;

    fn extractor() -> ListingExtractor {
        ListingExtractor::new(&ScrapeConfig::default()).unwrap()
    }

    fn section<'a>(item: &'a ItemExtraction, key: &str) -> &'a ExtractedField {
        item.sections.iter().find(|f| f.name == key).unwrap()
    }

    #[test]
    fn clean_title_strips_year_and_score() {
        assert_eq!(
            clean_title("Movie X (2024) 91%"),
            ("Movie X".to_string(), Some("2024".to_string()))
        );
        assert_eq!(
            clean_title("Movie X(2024)91%"),
            ("Movie X".to_string(), Some("2024".to_string()))
        );
        assert_eq!(
            clean_title("Past Lives (2023)"),
            ("Past Lives".to_string(), Some("2023".to_string()))
        );
        assert_eq!(clean_title("1917"), ("1917".to_string(), None));
        assert_eq!(
            clean_title("Movie (Director's Cut)"),
            ("Movie (Director's Cut)".to_string(), None)
        );
    }

    #[test]
    fn rank_marker_is_stripped() {
        assert_eq!(strip_rank_marker(" #12 "), "12");
        assert_eq!(strip_rank_marker("7"), "7");
    }

    #[test]
    fn extracts_full_item() {
        let items = extractor().extract_page(PAGE);
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.position.as_deref(), Some("1"));
        assert_eq!(first.title.as_deref(), Some("Movie X"));
        assert_eq!(first.year.as_deref(), Some("2024"));
        assert_eq!(first.score.as_deref(), Some("91%"));
        assert_eq!(first.image_url.as_deref(), Some("https://img.test/x.jpg"));
        assert_eq!(first.image_alt.as_deref(), Some("Movie X poster"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://editorial.rottentomatoes.com/m/movie_x")
        );

        let consensus = section(first, "critics_consensus");
        assert_eq!(consensus.text.as_deref(), Some("Great film."));
        assert_eq!(consensus.method, ExtractionMethod::Primary);

        let synopsis = section(first, "synopsis");
        assert_eq!(synopsis.text.as_deref(), Some("A heist goes wrong."));
        assert_eq!(synopsis.method, ExtractionMethod::Fallback);

        assert_eq!(
            section(first, "starring").text.as_deref(),
            Some("Ana Díaz, Bo Li")
        );
        assert_eq!(section(first, "directed_by").method, ExtractionMethod::Absent);
    }

    #[test]
    fn sparse_item_degrades_gracefully() {
        let items = extractor().extract_page(PAGE);
        let second = &items[1];
        assert_eq!(second.position.as_deref(), Some("2"));
        assert_eq!(second.title.as_deref(), Some("Untitled Sequel"));
        assert_eq!(second.year, None);
        assert_eq!(second.score, None);
        assert_eq!(second.image_url, None);
        assert_eq!(
            second.url.as_deref(),
            Some("https://editorial.rottentomatoes.com/relative/page")
        );
        assert!(second.sections.iter().all(|f| !f.is_present()));
    }

    #[test]
    fn extraction_is_deterministic() {
        let ex = extractor();
        let a = serde_json::to_vec(&ex.extract_page(PAGE)).unwrap();
        let b = serde_json::to_vec(&ex.extract_page(PAGE)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_selector_is_setup_error() {
        let mut config = ScrapeConfig::default();
        config.selectors.item = "div[".to_string();
        let err = ListingExtractor::new(&config).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn visible_text_collapses_whitespace() {
        assert_eq!(visible_text("<p> a\n\n b </p><p>c</p>"), "a b c");
    }
}
