//! Record extraction as an ordered chain of pure stages.
//!
//! Each stage maps a parsed document to a partial [`JobFields`]; the chain
//! merges them left to right so an earlier stage's value always wins.

use std::sync::LazyLock;

use chrono::Utc;
use engine_logging::engine_debug;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use harvester_core::{ExtractionFailure, JobFields, JobRecord, Provenance};

use crate::links::LinkRules;
use crate::page::{element_text, html_to_text};

/// Elements longer than this never count as a salary or job-type marker.
const SHORT_TEXT_CEILING: usize = 120;

/// Minimum visible text for a heuristic description container.
const MIN_DESCRIPTION_CHARS: usize = 200;

static SALARY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[€$£]|\b(eur|usd|gbp)\b|\bgross\b|\bbruto\b|\bsalary\b|\bsalario\b")
        .expect("salary pattern")
});

static JOB_TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)\b(
            full[-\ ]time | part[-\ ]time
            | jornada\ (completa|parcial|intensiva)
            | contrato\ (indefinido|temporal|de\ duración\ determinada)
            | permanent | temporary | fixed[-\ ]term
            | freelance | internship | prácticas | autónomo
        )\b",
    )
    .expect("job type pattern")
});

/// One link in the fallback chain.
pub trait ExtractionStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, document: &Html) -> JobFields;
}

/// schema.org `JobPosting` payloads embedded as JSON-LD.
#[derive(Debug, Default)]
pub struct StructuredDataStage;

impl ExtractionStage for StructuredDataStage {
    fn name(&self) -> &'static str {
        "structured-data"
    }

    fn extract(&self, document: &Html) -> JobFields {
        let Ok(scripts) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
            return JobFields::default();
        };
        let mut postings = Vec::new();
        for script in document.select(&scripts) {
            let raw: String = script.text().collect();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => collect_postings(value, &mut postings),
                Err(err) => engine_debug!("Skipping malformed JSON-LD block: {}", err),
            }
        }
        JobFields::merge_in_order(postings.iter().map(posting_fields))
    }
}

fn collect_postings(value: Value, out: &mut Vec<Map<String, Value>>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|item| collect_postings(item, out)),
        Value::Object(mut object) => {
            if let Some(graph) = object.remove("@graph") {
                collect_postings(graph, out);
            }
            if is_job_posting(&object) {
                out.push(object);
            }
        }
        _ => {}
    }
}

fn is_job_posting(object: &Map<String, Value>) -> bool {
    match object.get("@type") {
        Some(Value::String(kind)) => kind.eq_ignore_ascii_case("JobPosting"),
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .any(|kind| kind.eq_ignore_ascii_case("JobPosting")),
        _ => false,
    }
}

fn posting_fields(posting: &Map<String, Value>) -> JobFields {
    JobFields {
        title: string_at(posting, "title").or_else(|| string_at(posting, "name")),
        company: posting.get("hiringOrganization").and_then(named),
        location: posting.get("jobLocation").and_then(location_of),
        salary: posting.get("baseSalary").and_then(salary_of),
        job_type: posting.get("employmentType").and_then(joined),
        date_posted: string_at(posting, "datePosted"),
        description_html: string_at(posting, "description"),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn string_at(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(scalar)
}

/// A string, or an object resolved to its `name`.
fn named(value: &Value) -> Option<String> {
    match value {
        Value::Object(object) => string_at(object, "name"),
        Value::Array(items) => items.iter().find_map(named),
        other => scalar(other),
    }
}

fn joined(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        other => scalar(other),
    }
}

/// First non-empty of locality, region and country.
fn location_of(value: &Value) -> Option<String> {
    match value {
        Value::Array(places) => places.iter().find_map(location_of),
        Value::Object(place) => match place.get("address") {
            Some(Value::Object(address)) => ["addressLocality", "addressRegion", "addressCountry"]
                .iter()
                .find_map(|key| address.get(*key).and_then(named)),
            Some(other) => scalar(other),
            None => string_at(place, "name"),
        },
        other => scalar(other),
    }
}

fn salary_of(value: &Value) -> Option<String> {
    let Value::Object(amount) = value else {
        return scalar(value);
    };
    let currency = string_at(amount, "currency");
    let (figure, unit) = match amount.get("value") {
        Some(Value::Object(quantity)) => {
            let figure = match (string_at(quantity, "minValue"), string_at(quantity, "maxValue")) {
                (Some(min), Some(max)) if min != max => Some(format!("{min}-{max}")),
                (Some(single), _) | (None, Some(single)) => Some(single),
                (None, None) => string_at(quantity, "value"),
            };
            (figure, string_at(quantity, "unitText"))
        }
        Some(other) => (scalar(other), string_at(amount, "unitText")),
        None => (None, None),
    };
    let figure = figure?;
    let parts: Vec<String> = [Some(figure), currency, unit.map(|u| u.to_lowercase())]
        .into_iter()
        .flatten()
        .collect();
    Some(parts.join(" "))
}

#[derive(Debug, Clone, Copy)]
enum Pick {
    Text,
    Html,
    /// Attribute value, falling back to the element text.
    Attr(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Company,
    Location,
    Salary,
    JobType,
    DatePosted,
    Description,
}

impl Field {
    fn slot(self, fields: &mut JobFields) -> &mut Option<String> {
        match self {
            Field::Title => &mut fields.title,
            Field::Company => &mut fields.company,
            Field::Location => &mut fields.location,
            Field::Salary => &mut fields.salary,
            Field::JobType => &mut fields.job_type,
            Field::DatePosted => &mut fields.date_posted,
            Field::Description => &mut fields.description_html,
        }
    }
}

const SEMANTIC_RULES: &[(Field, &[&str], Pick)] = &[
    (
        Field::Title,
        &[
            r#"[itemprop="title"]"#,
            "h1.job-title",
            r#"[class*="job-title"]"#,
            r#"[class*="offer-title"]"#,
            r#"[data-testid*="title"]"#,
            "h1",
        ],
        Pick::Text,
    ),
    (
        Field::Title,
        &[r#"meta[property="og:title"]"#],
        Pick::Attr("content"),
    ),
    (
        Field::Company,
        &[
            r#"[itemprop="hiringOrganization"] [itemprop="name"]"#,
            r#"[itemprop="hiringOrganization"]"#,
            ".company-name",
            r#"[class*="company"]"#,
            r#"[data-testid*="company"]"#,
        ],
        Pick::Text,
    ),
    (
        Field::Location,
        &[
            r#"[itemprop="addressLocality"]"#,
            r#"[itemprop="jobLocation"]"#,
            ".job-location",
            r#"[class*="location"]"#,
            r#"[data-testid*="location"]"#,
        ],
        Pick::Text,
    ),
    (
        Field::Salary,
        &[r#"[itemprop="baseSalary"]"#, r#"[class*="salary"]"#],
        Pick::Text,
    ),
    (
        Field::JobType,
        &[
            r#"[itemprop="employmentType"]"#,
            r#"[class*="job-type"]"#,
            r#"[class*="contract"]"#,
        ],
        Pick::Text,
    ),
    (
        Field::DatePosted,
        &["time[datetime]"],
        Pick::Attr("datetime"),
    ),
    (
        Field::DatePosted,
        &[r#"[itemprop="datePosted"]"#],
        Pick::Attr("content"),
    ),
    (
        Field::DatePosted,
        &[r#"[class*="date"]"#, r#"[class*="published"]"#],
        Pick::Text,
    ),
    (
        Field::Description,
        &[
            r#"[itemprop="description"]"#,
            "#job-description",
            ".job-description",
            r#"[class*="description"]"#,
            "article",
        ],
        Pick::Html,
    ),
];

/// First matching element from ordered, field-scoped selector lists.
#[derive(Debug)]
pub struct SemanticMarkupStage {
    rules: Vec<(Field, Selector, Pick)>,
}

impl SemanticMarkupStage {
    pub fn new() -> Self {
        let rules = SEMANTIC_RULES
            .iter()
            .flat_map(|(field, selectors, pick)| {
                selectors
                    .iter()
                    .filter_map(|raw| Selector::parse(raw).ok())
                    .map(move |selector| (*field, selector, *pick))
            })
            .collect();
        Self { rules }
    }

    /// Semantic fields found under `scope`.
    pub fn extract_within(&self, scope: ElementRef<'_>) -> JobFields {
        let mut fields = JobFields::default();
        for (field, selector, pick) in &self.rules {
            let slot = field.slot(&mut fields);
            if slot.is_some() {
                continue;
            }
            *slot = scope.select(selector).find_map(|element| picked(element, *pick));
        }
        fields
    }
}

impl Default for SemanticMarkupStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStage for SemanticMarkupStage {
    fn name(&self) -> &'static str {
        "semantic-markup"
    }

    fn extract(&self, document: &Html) -> JobFields {
        self.extract_within(document.root_element())
    }
}

fn picked(element: ElementRef<'_>, pick: Pick) -> Option<String> {
    let text = || Some(element_text(element)).filter(|t| !t.is_empty());
    match pick {
        Pick::Text => text(),
        Pick::Html => text().map(|_| element.inner_html()),
        Pick::Attr(name) => element
            .value()
            .attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(text),
    }
}

/// Last-resort guesses from page text shape. Never guesses a title.
#[derive(Debug, Default)]
pub struct HeuristicStage;

impl ExtractionStage for HeuristicStage {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn extract(&self, document: &Html) -> JobFields {
        JobFields {
            salary: shortest_matching(document, &SALARY_PATTERN),
            job_type: shortest_matching(document, &JOB_TYPE_PATTERN),
            description_html: tightest_description(document),
            ..JobFields::default()
        }
    }
}

/// Shortest body element whose short text matches `pattern`.
fn shortest_matching(document: &Html, pattern: &Regex) -> Option<String> {
    let all = Selector::parse("body *").ok()?;
    document
        .select(&all)
        .filter(|element| !is_hidden(element))
        .filter_map(|element| short_text(element, SHORT_TEXT_CEILING))
        .filter(|text| pattern.is_match(text))
        .min_by_key(|text| text.len())
}

/// Smallest block container with enough text to be a job description.
/// On equal text the innermost (later in document order) wins.
fn tightest_description(document: &Html) -> Option<String> {
    let containers = Selector::parse("main, article, section, div").ok()?;
    document
        .select(&containers)
        .filter_map(|element| {
            let length = element_text(element).chars().count();
            (length >= MIN_DESCRIPTION_CHARS).then_some((length, element))
        })
        .fold(None, |best: Option<(usize, ElementRef<'_>)>, candidate| match best {
            Some(current) if current.0 < candidate.0 => Some(current),
            _ => Some(candidate),
        })
        .map(|(_, element)| element.inner_html())
}

fn is_hidden(element: &ElementRef<'_>) -> bool {
    matches!(
        element.value().name(),
        "script" | "style" | "noscript" | "template" | "svg"
    )
}

/// Collapsed text of `element` if it stays within `ceiling` bytes.
fn short_text(element: ElementRef<'_>, ceiling: usize) -> Option<String> {
    let raw_len: usize = element.text().map(|chunk| chunk.trim().len()).sum();
    if raw_len == 0 || raw_len > ceiling * 2 {
        return None;
    }
    let text = element_text(element);
    (!text.is_empty() && text.len() <= ceiling).then_some(text)
}

/// The full fallback chain plus record assembly.
pub struct JobExtractor {
    stages: Vec<Box<dyn ExtractionStage>>,
    source: String,
}

impl JobExtractor {
    /// Structured data, then semantic markup, then heuristics.
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_stages(
            vec![
                Box::new(StructuredDataStage),
                Box::new(SemanticMarkupStage::new()),
                Box::new(HeuristicStage),
            ],
            source,
        )
    }

    pub fn with_stages(stages: Vec<Box<dyn ExtractionStage>>, source: impl Into<String>) -> Self {
        Self {
            stages,
            source: source.into(),
        }
    }

    pub fn fields(&self, document: &Html) -> JobFields {
        let mut merged = JobFields::default();
        for stage in &self.stages {
            if merged.is_complete() {
                break;
            }
            let found = stage.extract(document);
            engine_debug!("Stage {} filled {:?}", stage.name(), filled_names(&merged, &found));
            merged.fill_from(found);
        }
        merged
    }

    pub fn extract(&self, document: &Html, url: &str) -> Result<JobRecord, ExtractionFailure> {
        self.assemble(self.fields(document), url)
    }

    /// Finishes a record from already-merged fields.
    pub fn assemble(&self, fields: JobFields, url: &str) -> Result<JobRecord, ExtractionFailure> {
        let description_text = fields.description_html.as_deref().map(html_to_text);
        let scraped_at = Utc::now().to_rfc3339();
        JobRecord::assemble(
            fields,
            description_text.as_deref(),
            Provenance {
                url,
                source: &self.source,
                scraped_at: &scraped_at,
            },
        )
    }
}

fn filled_names(before: &JobFields, found: &JobFields) -> Vec<&'static str> {
    let missing = before.missing();
    let still_missing = found.missing();
    missing
        .into_iter()
        .filter(|name| !still_missing.contains(name))
        .collect()
}

/// A job card on a listing page, for runs that skip detail pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardFields {
    pub url: String,
    pub fields: JobFields,
}

const CARD_ANCESTOR_DEPTH: usize = 6;

/// Fields from the cards wrapping each detail anchor on a listing page.
pub fn extract_cards(
    document: &Html,
    base: &Url,
    rules: &LinkRules,
    semantic: &SemanticMarkupStage,
) -> Vec<CardFields> {
    rules
        .detail_anchors(document, base)
        .into_iter()
        .map(|(anchor, url)| {
            let mut fields = JobFields {
                title: Some(element_text(anchor))
                    .filter(|t| !t.is_empty())
                    .or_else(|| anchor.value().attr("title").map(str::to_string)),
                ..JobFields::default()
            };
            if let Some(card) = enclosing_card(anchor) {
                let mut within = semantic.extract_within(card);
                // The card's own heading is the anchor text; its description
                // would be the whole card.
                within.title = None;
                within.description_html = None;
                fields.fill_from(within);
            }
            CardFields {
                url: url.into(),
                fields,
            }
        })
        .collect()
}

fn enclosing_card(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    anchor
        .ancestors()
        .take(CARD_ANCESTOR_DEPTH)
        .filter_map(ElementRef::wrap)
        .find(|element| {
            let value = element.value();
            matches!(value.name(), "article" | "li")
                || value.classes().any(|class| {
                    let class = class.to_ascii_lowercase();
                    class.contains("card") || class.contains("offer") || class.contains("job-item")
                })
        })
}
