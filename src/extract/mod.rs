//! Article field extraction and validation.
//!
//! [`PageDocument`] wraps a parsed page and answers selector queries with
//! `Option`/`Vec`, so a missing element only empties one field. A record is
//! usable when its title, authors and abstract are all present.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::AccessError;

#[allow(clippy::expect_used)]
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.title-text").expect("title selector is valid"));

#[allow(clippy::expect_used)]
static AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.author").expect("author selector is valid"));

#[allow(clippy::expect_used)]
static ABSTRACT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.abstract").expect("abstract selector is valid"));

#[allow(clippy::expect_used)]
static KEYWORD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.keyword").expect("keyword selector is valid"));

#[allow(clippy::expect_used)]
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#body").expect("body selector is valid"));

#[allow(clippy::expect_used)]
static DOI: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.doi").expect("DOI selector is valid"));

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Structured article content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Article title.
    pub title: String,
    /// Author names in page order.
    pub authors: Vec<String>,
    /// Abstract text.
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Keywords in page order.
    pub keywords: Vec<String>,
    /// Body text.
    pub full_text: String,
    /// DOI as printed on the page.
    pub doi: String,
    /// When the page was fetched.
    pub accessed_at: DateTime<Utc>,
    /// The article URL.
    pub url: String,
}

/// A parsed HTML page with field-level queries.
pub struct PageDocument {
    html: Html,
}

impl PageDocument {
    /// Parses `html` leniently; malformed markup still yields a document.
    #[must_use]
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// Returns the trimmed text of the first match, if it is non-empty.
    #[must_use]
    pub fn first_text(&self, selector: &Selector) -> Option<String> {
        self.html
            .select(selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
    }

    /// Returns the trimmed text of every match in document order.
    ///
    /// Blank matches stay in place; [`missing_fields`] judges whether a list
    /// carries any real content.
    #[must_use]
    pub fn all_text(&self, selector: &Selector) -> Vec<String> {
        self.html
            .select(selector)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .collect()
    }

    /// Returns the text a reader would see, skipping scripts and styles.
    #[must_use]
    pub fn visible_text(&self) -> String {
        let mut out = String::new();
        for node in self.html.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|el| el.name().to_string()))
                .is_some_and(|name| HIDDEN_ELEMENTS.contains(&name.as_str()));
            if !hidden {
                out.push_str(text);
                out.push(' ');
            }
        }
        out
    }
}

/// Builds a record from `html`; absent elements leave their fields empty.
#[must_use]
pub fn extract_record(html: &str, url: &str) -> PaperRecord {
    let page = PageDocument::parse(html);
    PaperRecord {
        title: page.first_text(&TITLE).unwrap_or_default(),
        authors: page.all_text(&AUTHOR),
        abstract_text: page.first_text(&ABSTRACT).unwrap_or_default(),
        keywords: page.all_text(&KEYWORD),
        full_text: page.first_text(&BODY).unwrap_or_default(),
        doi: page.first_text(&DOI).unwrap_or_default(),
        accessed_at: Utc::now(),
        url: url.to_string(),
    }
}

/// Names the required fields that are blank in `record`.
#[must_use]
pub fn missing_fields(record: &PaperRecord) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if record.title.trim().is_empty() {
        missing.push("title");
    }
    if record.authors.iter().all(|author| author.trim().is_empty()) {
        missing.push("authors");
    }
    if record.abstract_text.trim().is_empty() {
        missing.push("abstract");
    }
    missing
}

/// Returns true when title, authors and abstract are all present.
#[must_use]
pub fn validate_record(record: &PaperRecord) -> bool {
    missing_fields(record).is_empty()
}

/// Extracts and validates a record.
///
/// # Errors
///
/// Returns [`AccessError::ExtractionValidation`] naming the blank required fields.
#[instrument(skip(html), fields(bytes = html.len()))]
pub fn extract_paper(html: &str, url: &str) -> Result<PaperRecord, AccessError> {
    let record = extract_record(html, url);
    let missing = missing_fields(&record);
    if !missing.is_empty() {
        return Err(AccessError::extraction_validation(url, missing));
    }
    debug!(
        authors = record.authors.len(),
        keywords = record.keywords.len(),
        "article extracted"
    );
    Ok(record)
}
