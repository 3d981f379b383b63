use serde::Serialize;

use crate::text::{
    clean_field, collapse_whitespace, truncate_on_char_boundary, MAX_DESCRIPTION_TEXT,
};

/// Fields produced by one extraction stage. Empty means "not found here".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobFields {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub job_type: Option<String>,
    pub date_posted: Option<String>,
    pub description_html: Option<String>,
}

impl JobFields {
    /// Fills every field still empty here from `later`; filled fields win.
    pub fn fill_from(&mut self, later: JobFields) {
        fill(&mut self.title, later.title);
        fill(&mut self.company, later.company);
        fill(&mut self.location, later.location);
        fill(&mut self.salary, later.salary);
        fill(&mut self.job_type, later.job_type);
        fill(&mut self.date_posted, later.date_posted);
        fill(&mut self.description_html, later.description_html);
    }

    /// Merges stage outputs left to right, keeping the first non-empty value.
    pub fn merge_in_order(stages: impl IntoIterator<Item = JobFields>) -> JobFields {
        stages.into_iter().fold(JobFields::default(), |mut acc, next| {
            acc.fill_from(next);
            acc
        })
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Names of the fields still empty.
    pub fn missing(&self) -> Vec<&'static str> {
        let fields = [
            ("title", &self.title),
            ("company", &self.company),
            ("location", &self.location),
            ("salary", &self.salary),
            ("job_type", &self.job_type),
            ("date_posted", &self.date_posted),
            ("description_html", &self.description_html),
        ];
        fields
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect()
    }
}

fn fill(slot: &mut Option<String>, candidate: Option<String>) {
    if slot.as_deref().is_some_and(|v| !v.trim().is_empty()) {
        return;
    }
    *slot = candidate.filter(|v| !v.trim().is_empty());
}

/// One harvested job posting. Every key is always serialized; missing
/// values become `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub job_type: Option<String>,
    pub date_posted: Option<String>,
    pub description_html: Option<String>,
    pub description_text: Option<String>,
    pub url: String,
    pub source: String,
    pub scraped_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no title extracted from {url}")]
pub struct ExtractionFailure {
    pub url: String,
}

/// Where and when a record was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance<'a> {
    pub url: &'a str,
    pub source: &'a str,
    pub scraped_at: &'a str,
}

impl JobRecord {
    /// Builds a record from merged fields.
    ///
    /// `description_text` is the markup-free rendering of the description;
    /// it is whitespace-collapsed and bounded to [`MAX_DESCRIPTION_TEXT`].
    pub fn assemble(
        fields: JobFields,
        description_text: Option<&str>,
        provenance: Provenance<'_>,
    ) -> Result<JobRecord, ExtractionFailure> {
        let Some(title) = fields.title.as_deref().and_then(clean_field) else {
            return Err(ExtractionFailure {
                url: provenance.url.to_string(),
            });
        };
        let description_text = description_text
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .map(|t| truncate_on_char_boundary(&t, MAX_DESCRIPTION_TEXT).to_string());

        Ok(JobRecord {
            title,
            company: fields.company.as_deref().and_then(clean_field),
            location: fields.location.as_deref().and_then(clean_field),
            salary: fields.salary.as_deref().and_then(clean_field),
            job_type: fields.job_type.as_deref().and_then(clean_field),
            date_posted: fields.date_posted.as_deref().and_then(clean_field),
            description_html: fields
                .description_html
                .map(|html| html.trim().to_string())
                .filter(|html| !html.is_empty()),
            description_text,
            url: provenance.url.to_string(),
            source: provenance.source.to_string(),
            scraped_at: provenance.scraped_at.to_string(),
        })
    }
}
