//! Result-page parsing: row discovery, identifier strategies, field extraction.
//!
//! Identifier strategies are tried in order for every row. The first one
//! that yields an identifier decides the [`ExtractionOutcome`] tag; a row
//! for which no strategy yields one is [`ExtractionOutcome::Skipped`].

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use tribunal_shared::{Result, TribunalError, parse_published_date};

/// Case-reference grammar shared by all issuing bodies.
pub static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(ADJ-\d+|DWT\d+|UDD\d+|EAT-\d+|IR-SC-\d+)").expect("valid regex")
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| selector("li.each-item"));
static DIV_SEL: LazyLock<Selector> = LazyLock::new(|| selector("div"));
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("h2.title"));
static REF_SEL: LazyLock<Selector> = LazyLock::new(|| selector("span.refNO"));
static DESC_SEL: LazyLock<Selector> = LazyLock::new(|| selector("p.description"));
static DATE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("span.date"));
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| selector("span.body"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector("a.btn.btn-primary[href], h2.title a[href]"));
static NEXT_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a.next[href], a[rel="next"][href]"#));

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Fields parsed from one result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub identifier: String,
    pub description: String,
    pub ref_no: String,
    pub body: String,
    pub published_date: Option<String>,
    pub link_to_doc: Option<String>,
}

/// How a row was (or was not) turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Identifier found in the row's title/reference markup.
    Structured(ParsedRow),
    /// Identifier recovered by matching the case-reference grammar.
    PatternMatched(ParsedRow),
    /// No identifier anywhere in the row.
    Skipped,
}

impl ExtractionOutcome {
    pub fn row(&self) -> Option<&ParsedRow> {
        match self {
            Self::Structured(row) | Self::PatternMatched(row) => Some(row),
            Self::Skipped => None,
        }
    }
}

/// Which strategy produced an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Structured,
    Pattern,
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Recovers a case identifier from a result row.
pub trait IdentifierStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn identify(&self, row: &ElementRef) -> Option<String>;

    /// Human-readable strategy name for tracing.
    fn name(&self) -> &str;
}

/// Reads the identifier from `h2.title`, then `span.refNO`.
pub struct SelectorStrategy;

impl IdentifierStrategy for SelectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Structured
    }

    fn identify(&self, row: &ElementRef) -> Option<String> {
        [&*TITLE_SEL, &*REF_SEL]
            .into_iter()
            .find_map(|sel| row.select(sel).map(|el| element_text(&el)).find(|t| !t.is_empty()))
    }

    fn name(&self) -> &str {
        "selector"
    }
}

/// Matches the case-reference grammar anywhere in the row markup.
pub struct PatternStrategy;

impl IdentifierStrategy for PatternStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pattern
    }

    fn identify(&self, row: &ElementRef) -> Option<String> {
        IDENTIFIER_RE
            .find(&row.html())
            .map(|m| m.as_str().to_string())
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

// ---------------------------------------------------------------------------
// Page parsing
// ---------------------------------------------------------------------------

/// Everything discovery needs from one result page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub rows: Vec<ParsedRow>,
    /// Rows with no identifier, or whose fields could not be parsed.
    pub skipped: usize,
    /// Resolved "next page" link, if the page has one.
    pub next_page: Option<Url>,
}

/// Turns result-page HTML into rows.
pub struct RowExtractor {
    strategies: Vec<Box<dyn IdentifierStrategy>>,
    base_url: String,
    body_name: String,
}

impl RowExtractor {
    /// Extractor with the built-in strategies (structured first, pattern last).
    pub fn new(base_url: &str, body_name: &str) -> Self {
        Self {
            strategies: vec![Box::new(SelectorStrategy), Box::new(PatternStrategy)],
            base_url: base_url.trim_end_matches('/').to_string(),
            body_name: body_name.to_string(),
        }
    }

    /// Parse a whole result page fetched from `page_url`.
    pub fn parse_page(&self, html: &str, page_url: &Url) -> ParsedPage {
        let doc = Html::parse_document(html);
        let mut page = ParsedPage {
            next_page: next_page_link(&doc, page_url),
            ..ParsedPage::default()
        };

        for row in result_rows(&doc) {
            match self.extract_row(&row, page_url) {
                Ok(outcome) => match outcome {
                    ExtractionOutcome::Structured(parsed)
                    | ExtractionOutcome::PatternMatched(parsed) => page.rows.push(parsed),
                    ExtractionOutcome::Skipped => page.skipped += 1,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparseable row");
                    page.skipped += 1;
                }
            }
        }

        page
    }

    /// Try each strategy in order, then read the remaining fields.
    pub fn extract_row(&self, row: &ElementRef, page_url: &Url) -> Result<ExtractionOutcome> {
        let found = self.strategies.iter().find_map(|strategy| {
            strategy
                .identify(row)
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .map(|id| (strategy.kind(), id))
        });

        let Some((kind, identifier)) = found else {
            return Ok(ExtractionOutcome::Skipped);
        };

        let parsed = self.read_fields(row, identifier, page_url)?;
        Ok(match kind {
            StrategyKind::Structured => ExtractionOutcome::Structured(parsed),
            StrategyKind::Pattern => ExtractionOutcome::PatternMatched(parsed),
        })
    }

    fn read_fields(&self, row: &ElementRef, identifier: String, page_url: &Url) -> Result<ParsedRow> {
        let description = first_text(row, &DESC_SEL).unwrap_or_default();
        let ref_no = first_text(row, &REF_SEL).unwrap_or_else(|| identifier.clone());
        let published_date = first_text(row, &DATE_SEL);
        let body = first_text(row, &BODY_SEL).unwrap_or_else(|| self.body_name.clone());

        let explicit = row
            .select(&LINK_SEL)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty());

        let link_to_doc = match explicit {
            Some(href) => Some(
                page_url
                    .join(href)
                    .map_err(|e| {
                        TribunalError::parse(format!("{identifier}: bad document link '{href}': {e}"))
                    })?
                    .to_string(),
            ),
            None => published_date
                .as_deref()
                .and_then(parse_published_date)
                .map(|date| derived_link(&self.base_url, date, &identifier)),
        };

        Ok(ParsedRow {
            identifier,
            description,
            ref_no,
            body,
            published_date,
            link_to_doc,
        })
    }
}

/// Primary rows, else the innermost `div`s containing an identifier.
fn result_rows(doc: &Html) -> Vec<ElementRef<'_>> {
    let rows: Vec<_> = doc.select(&ROW_SEL).collect();
    if !rows.is_empty() {
        return rows;
    }

    let matching: Vec<_> = doc
        .select(&DIV_SEL)
        .filter(|div| IDENTIFIER_RE.is_match(&div.text().collect::<String>()))
        .collect();

    let matching_ids: HashSet<_> = matching.iter().map(|div| div.id()).collect();

    matching
        .iter()
        .filter(|div| {
            !div.select(&DIV_SEL)
                .any(|inner| inner.id() != div.id() && matching_ids.contains(&inner.id()))
        })
        .copied()
        .collect()
}

fn next_page_link(doc: &Html, page_url: &Url) -> Option<Url> {
    doc.select(&NEXT_SEL)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| page_url.join(href.trim()).ok())
}

/// Canonical document URL: `{base}/en/cases/{yyyy}/{month}/{identifier}.html`.
pub fn derived_link(base_url: &str, published: NaiveDate, identifier: &str) -> String {
    format!(
        "{}/en/cases/{}/{}/{}.html",
        base_url.trim_end_matches('/'),
        published.format("%Y"),
        published.format("%B").to_string().to_lowercase(),
        identifier.to_lowercase()
    )
}

/// Search URL for one window; day and month carry no leading zeros.
pub fn search_url(base_url: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}/en/search/?decisions=1&from={}&to={}&pageNumber=1",
        base_url.trim_end_matches('/'),
        start.format("%-d/%-m/%Y"),
        end.format("%-d/%-m/%Y"),
    )
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn first_text(row: &ElementRef, sel: &Selector) -> Option<String> {
    row.select(sel)
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.workplacerelations.ie";

    fn page_url() -> Url {
        Url::parse("https://www.workplacerelations.ie/en/search/?decisions=1&pageNumber=1").unwrap()
    }

    fn extractor() -> RowExtractor {
        RowExtractor::new(BASE, "Workplace Relations Commission")
    }

    #[test]
    fn structured_rows_with_explicit_links() {
        let html = r#"<html><body><ul>
            <li class="each-item">
              <h2 class="title"><a href="/en/cases/2024/january/adj-00001.html">ADJ-00001</a></h2>
              <span class="refNO">ADJ-00001</span>
              <span class="date">05/01/2024</span>
              <span class="body">Labour Court</span>
              <p class="description"> Payment of Wages Act 1991 </p>
            </li>
            <li class="each-item">
              <h2 class="title">DWT2401</h2>
              <a class="btn btn-primary" href="https://cdn.example.com/dwt2401.pdf">View</a>
            </li>
        </ul></body></html>"#;

        let page = extractor().parse_page(html, &page_url());
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.skipped, 0);
        assert!(page.next_page.is_none());

        let first = &page.rows[0];
        assert_eq!(first.identifier, "ADJ-00001");
        assert_eq!(first.description, "Payment of Wages Act 1991");
        assert_eq!(first.body, "Labour Court");
        assert_eq!(first.published_date.as_deref(), Some("05/01/2024"));
        assert_eq!(
            first.link_to_doc.as_deref(),
            Some("https://www.workplacerelations.ie/en/cases/2024/january/adj-00001.html")
        );

        let second = &page.rows[1];
        assert_eq!(second.ref_no, "DWT2401");
        assert_eq!(second.body, "Workplace Relations Commission");
        assert_eq!(
            second.link_to_doc.as_deref(),
            Some("https://cdn.example.com/dwt2401.pdf")
        );
    }

    #[test]
    fn link_derived_from_published_date_when_absent() {
        let html = r#"<ul><li class="each-item">
            <h2 class="title">ADJ-00054658</h2><span class="date">3/11/2023</span>
        </li></ul>"#;
        let page = extractor().parse_page(html, &page_url());
        assert_eq!(
            page.rows[0].link_to_doc.as_deref(),
            Some("https://www.workplacerelations.ie/en/cases/2023/november/adj-00054658.html")
        );
    }

    #[test]
    fn no_link_and_no_date_yields_none() {
        let html = r#"<ul><li class="each-item"><h2 class="title">UDD2412</h2></li></ul>"#;
        let page = extractor().parse_page(html, &page_url());
        assert_eq!(page.rows[0].link_to_doc, None);
        assert_eq!(page.rows[0].published_date, None);
    }

    #[test]
    fn pattern_strategy_recovers_identifier() {
        let html = r#"<ul><li class="each-item">
            <div class="meta">Reference: EAT-123 heard in Dublin</div>
        </li></ul>"#;
        let doc = Html::parse_document(html);
        let row = doc.select(&ROW_SEL).next().unwrap();
        let outcome = extractor().extract_row(&row, &page_url()).unwrap();
        match outcome {
            ExtractionOutcome::PatternMatched(parsed) => {
                assert_eq!(parsed.identifier, "EAT-123");
                assert_eq!(parsed.ref_no, "EAT-123");
            }
            other => panic!("expected pattern match, got {other:?}"),
        }
    }

    #[test]
    fn rows_without_identifier_are_skipped() {
        let html = r#"<ul>
            <li class="each-item"><p class="description">No reference here</p></li>
            <li class="each-item"><h2 class="title">ADJ-7</h2></li>
        </ul>"#;
        let page = extractor().parse_page(html, &page_url());
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.skipped, 1);
    }

    #[test]
    fn fallback_rows_are_innermost_matching_divs() {
        let html = r#"<div id="results">
            <div class="r">ADJ-00011 <span class="date">1/2/2024</span></div>
            <div class="r">IR-SC-0042</div>
            <div class="r">Nothing</div>
        </div>"#;
        let page = extractor().parse_page(html, &page_url());
        let ids: Vec<_> = page.rows.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["ADJ-00011", "IR-SC-0042"]);
        assert_eq!(
            page.rows[0].link_to_doc.as_deref(),
            Some("https://www.workplacerelations.ie/en/cases/2024/february/adj-00011.html")
        );
    }

    #[test]
    fn fallback_skips_every_enclosing_matching_div() {
        let html = r#"<div id="page"><div class="wrap"><div class="list">
            <div class="r"><div class="cell">ADJ-00021</div></div>
            <div class="r"><div class="cell">ADJ-00022</div></div>
            <div class="r"><div class="cell">ADJ-00023</div></div>
        </div></div></div>"#;
        let page = extractor().parse_page(html, &page_url());
        let ids: Vec<_> = page.rows.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["ADJ-00021", "ADJ-00022", "ADJ-00023"]);
    }

    #[test]
    fn next_link_resolved_against_page() {
        let html = r#"<ul><li class="each-item"><h2 class="title">ADJ-1</h2></li></ul>
            <a class="next" href="?decisions=1&pageNumber=2">Next</a>"#;
        let page = extractor().parse_page(html, &page_url());
        assert_eq!(
            page.next_page.unwrap().as_str(),
            "https://www.workplacerelations.ie/en/search/?decisions=1&pageNumber=2"
        );
    }

    #[test]
    fn search_url_has_no_leading_zeros() {
        let url = search_url(
            "https://www.workplacerelations.ie/",
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 31).unwrap(),
        );
        assert_eq!(
            url,
            "https://www.workplacerelations.ie/en/search/?decisions=1&from=5/1/2024&to=31/10/2024&pageNumber=1"
        );
    }
}
