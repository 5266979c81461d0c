//! Decides whether a fetched search page shows bookable availability.
//!
//! Both probes reduce a page to [`Evidence`]; [`ClassifierRules::classify`]
//! turns evidence into a [`Verdict`]. The phrase and keyword lists are data so
//! they can be tuned from the configuration file when the site changes.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

static DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\d+").expect("dollar pattern is valid"));

static BUTTONS_AND_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("button, a").expect("selector is valid"));
static ANY_ELEMENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("*").expect("selector is valid"));
static DIVS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").expect("selector is valid"));
static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2").expect("selector is valid"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("selector is valid"));

/// Heading text or container class marking a search results listing.
const RESULTS_MARKER: &str = "Results";
const RESULTS_CLASS: &str = "results";

/// Page text of a results listing, unless the search form is still showing.
const SEARCH_RESULTS_TEXT: &str = "search results";
const SEARCH_FORM_TEXT: &str = "check availability";

/// XPath twin of the scraper-based results heading check.
pub const RESULTS_HEADING_XPATH: &str =
    "//h1[contains(., 'Results')] | //h2[contains(., 'Results')] | //div[contains(@class, 'results')]";

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";

/// Structural hints found in a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSignals {
    /// A book/reserve/select button or link
    pub booking_control: bool,
    /// Text such as `$249`
    pub dollar_amount: bool,
    /// An element styled as a price
    pub price_element: bool,
    /// A rate/room/accommodation/lodging listing block
    pub rate_or_room: bool,
    /// A "Results" heading or results container
    pub results_heading: bool,
}

impl PageSignals {
    /// Whether anything on the page suggests a bookable offer
    pub fn any_positive(&self) -> bool {
        self.booking_control || self.dollar_amount || self.price_element || self.rate_or_room
    }
}

/// Normalized view of one fetched search page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    /// Visible text, lower-cased with collapsed whitespace
    pub page_text: String,
    /// Document title
    pub title: String,
    /// Final URL after redirects and form submission
    pub current_url: Option<String>,
    /// Structural hints
    pub signals: PageSignals,
    /// Whether the page is a results page; `None` when the final URL is unknown
    pub results_page: Option<bool>,
}

impl Evidence {
    /// Evidence from a raw HTML document, as fetched over plain HTTP.
    ///
    /// The results page check runs whenever the final URL is known, exactly
    /// as the browser probe does it.
    pub fn from_html(html: &str, current_url: Option<String>, rules: &ClassifierRules) -> Self {
        let document = Html::parse_document(html);
        let page_text = document_text(&document);

        let title = document
            .select(&TITLE)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let signals = PageSignals {
            booking_control: document.select(&BUTTONS_AND_LINKS).any(|el| {
                let text = element_text(&el);
                let class = class_of(&el);
                contains_any(&text, &rules.booking_keywords)
                    || contains_any(&class, &rules.booking_keywords)
            }),
            dollar_amount: has_dollar_amount(&page_text),
            price_element: document
                .select(&ANY_ELEMENT)
                .any(|el| contains_any(&class_of(&el), &rules.price_class_keywords)),
            rate_or_room: document
                .select(&DIVS)
                .any(|el| contains_any(&class_of(&el), &rules.listing_class_keywords)),
            results_heading: has_results_heading(&document),
        };

        let results_page = current_url.as_deref().map(|url| {
            rules.is_results_page(url, &title, signals.results_heading, &page_text)
        });

        Self {
            page_text,
            title,
            current_url,
            signals,
            results_page,
        }
    }
}

/// Classification outcome with the reason it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Positive signal on a (possible) results page
    Available,
    /// Error or blocking phrases matched
    Blocked(Vec<String>),
    /// A no-availability phrase matched
    NoAvailability(String),
    /// The fetched page is not a search results page
    NotResultsPage,
    /// Nothing proved availability
    NoPositiveSignal,
}

impl Verdict {
    /// Only [`Verdict::Available`] counts as available
    pub fn is_available(&self) -> bool {
        matches!(self, Verdict::Available)
    }
}

/// Phrase and keyword lists driving the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    /// Any match means blocked or broken, never available
    pub error_phrases: Vec<String>,
    /// Any match means the site reported no availability
    pub no_availability_phrases: Vec<String>,
    /// Button/link text or class marking a booking control
    pub booking_keywords: Vec<String>,
    /// Class fragments marking a price element
    pub price_class_keywords: Vec<String>,
    /// Class fragments marking a room/rate listing block
    pub listing_class_keywords: Vec<String>,
    /// URL fragments of results pages
    pub results_url_keywords: Vec<String>,
    /// Title fragments of results pages
    pub results_title_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            error_phrases: strings(&[
                "action not allowed",
                "access denied",
                "forbidden",
                "error",
                "unavailable",
            ]),
            no_availability_phrases: strings(&[
                "no availability",
                "not available",
                "no rooms available",
                "sold out",
                "no lodging available",
                "no results found",
                "couldn't find any results",
                "we couldn't find any results",
            ]),
            booking_keywords: strings(&["book", "reserve", "select"]),
            price_class_keywords: strings(&["price"]),
            listing_class_keywords: strings(&["rate", "room", "accommodation", "lodging"]),
            results_url_keywords: strings(&[
                "accommodation-search/results",
                "availability",
                "results",
                "search",
            ]),
            results_title_keywords: strings(&["results", "availability"]),
        }
    }
}

impl ClassifierRules {
    /// Applies the decision table to a page's evidence.
    pub fn classify(&self, evidence: &Evidence) -> Verdict {
        let blocked = matched_phrases(&evidence.page_text, &self.error_phrases);
        if !blocked.is_empty() {
            error!("Detected blocking signals in page: {}", blocked.join(", "));
            return Verdict::Blocked(blocked);
        }

        if let Some(phrase) = matched_phrases(&evidence.page_text, &self.no_availability_phrases)
            .into_iter()
            .next()
        {
            debug!("Found no-availability phrase: {}", phrase);
            return Verdict::NoAvailability(phrase);
        }

        if evidence.results_page == Some(false) {
            return Verdict::NotResultsPage;
        }

        if evidence.signals.any_positive() {
            debug!("Positive availability signals: {:?}", evidence.signals);
            Verdict::Available
        } else {
            Verdict::NoPositiveSignal
        }
    }

    /// Whether a fetched page is a search results page.
    ///
    /// `page_text` is the normalized text from [`page_text`].
    pub fn is_results_page(
        &self,
        current_url: &str,
        title: &str,
        results_heading: bool,
        page_text: &str,
    ) -> bool {
        contains_any(&current_url.to_lowercase(), &self.results_url_keywords)
            || results_heading
            || contains_any(&title.to_lowercase(), &self.results_title_keywords)
            || (page_text.contains(SEARCH_RESULTS_TEXT) && !search_form_visible(page_text))
    }

    /// XPath matching booking buttons and links, `None` without keywords
    pub fn booking_control_xpath(&self) -> Option<String> {
        let condition = xpath_any_contains(&[".", "@class"], &self.booking_keywords)?;
        Some(format!("//button[{0}] | //a[{0}]", condition))
    }

    /// XPath matching price-styled elements, `None` without keywords
    pub fn price_element_xpath(&self) -> Option<String> {
        let condition = xpath_any_contains(&["@class"], &self.price_class_keywords)?;
        Some(format!("//*[{}]", condition))
    }

    /// XPath matching room/rate listing blocks, `None` without keywords
    pub fn listing_element_xpath(&self) -> Option<String> {
        let condition = xpath_any_contains(&["@class"], &self.listing_class_keywords)?;
        Some(format!("//div[{}]", condition))
    }
}

/// Visible text of a document, lower-cased with collapsed whitespace.
pub fn document_text(document: &Html) -> String {
    document
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parses `html` and returns its normalized text.
pub fn page_text(html: &str) -> String {
    document_text(&Html::parse_document(html))
}

/// `$` immediately followed by digits
pub fn has_dollar_amount(text: &str) -> bool {
    DOLLAR_AMOUNT.is_match(text)
}

fn search_form_visible(page_text: &str) -> bool {
    page_text.contains("search") && page_text.contains(SEARCH_FORM_TEXT)
}

fn has_results_heading(document: &Html) -> bool {
    document
        .select(&HEADINGS)
        .any(|el| el.text().collect::<String>().contains(RESULTS_MARKER))
        || document.select(&DIVS).any(|el| {
            el.value()
                .attr("class")
                .is_some_and(|class| class.contains(RESULTS_CLASS))
        })
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().to_lowercase()
}

fn class_of(element: &ElementRef) -> String {
    element
        .value()
        .attr("class")
        .unwrap_or_default()
        .to_lowercase()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|needle| !needle.is_empty() && haystack.contains(&needle.to_lowercase()))
}

fn matched_phrases(text: &str, phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|phrase| phrase.to_lowercase())
        .filter(|phrase| !phrase.is_empty() && text.contains(phrase.as_str()))
        .collect()
}

/// `contains(translate(expr, ...), 'keyword') or ...` for every expr/keyword.
fn xpath_any_contains(exprs: &[&str], keywords: &[String]) -> Option<String> {
    let conditions: Vec<String> = keywords
        .iter()
        .filter(|keyword| !keyword.is_empty() && !keyword.contains('\''))
        .flat_map(|keyword| {
            exprs.iter().map(move |expr| {
                format!(
                    "contains(translate({}, '{}', '{}'), '{}')",
                    expr,
                    UPPERCASE,
                    LOWERCASE,
                    keyword.to_lowercase()
                )
            })
        })
        .collect();

    if conditions.is_empty() {
        None
    } else {
        Some(conditions.join(" or "))
    }
}
