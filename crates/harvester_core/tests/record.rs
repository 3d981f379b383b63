use harvester_core::{JobFields, JobRecord, Provenance, RunCounters, MAX_DESCRIPTION_TEXT};
use pretty_assertions::assert_eq;

const PROVENANCE: Provenance<'static> = Provenance {
    url: "https://jobs.example.com/offer/1",
    source: "jobs.example.com",
    scraped_at: "2024-05-01T10:00:00+00:00",
};

fn some(value: &str) -> Option<String> {
    Some(value.to_string())
}

#[test]
fn earlier_stages_win_over_later_ones() {
    let structured = JobFields {
        title: some("Structured Title"),
        ..JobFields::default()
    };
    let markup = JobFields {
        title: some("Markup Title"),
        company: some("Acme"),
        ..JobFields::default()
    };
    let heuristic = JobFields {
        company: some("Heuristic Co"),
        salary: some("30.000 € bruto/año"),
        ..JobFields::default()
    };

    let merged = JobFields::merge_in_order([structured, markup, heuristic]);
    assert_eq!(merged.title.as_deref(), Some("Structured Title"));
    assert_eq!(merged.company.as_deref(), Some("Acme"));
    assert_eq!(merged.salary.as_deref(), Some("30.000 € bruto/año"));
    assert!(merged.missing().contains(&"location"));
}

#[test]
fn blank_values_do_not_block_later_stages() {
    let mut fields = JobFields {
        title: some("   "),
        ..JobFields::default()
    };
    fields.fill_from(JobFields {
        title: some("Real"),
        ..JobFields::default()
    });
    assert_eq!(fields.title.as_deref(), Some("Real"));
}

#[test]
fn record_without_title_is_an_extraction_failure() {
    let err = JobRecord::assemble(JobFields::default(), None, PROVENANCE).unwrap_err();
    assert_eq!(err.url, PROVENANCE.url);
}

#[test]
fn record_serializes_every_key() {
    let fields = JobFields {
        title: some("  Rust   Engineer "),
        ..JobFields::default()
    };
    let record = JobRecord::assemble(fields, Some("  hello \n world "), PROVENANCE).unwrap();
    assert_eq!(record.title, "Rust Engineer");
    assert_eq!(record.description_text.as_deref(), Some("hello world"));

    let value = serde_json::to_value(&record).unwrap();
    let object = value.as_object().unwrap();
    for key in [
        "title",
        "company",
        "location",
        "salary",
        "job_type",
        "date_posted",
        "description_html",
        "description_text",
        "url",
        "source",
        "scraped_at",
    ] {
        assert!(object.contains_key(key), "missing key {key}");
    }
    assert!(object["company"].is_null());
}

#[test]
fn description_text_is_bounded() {
    let fields = JobFields {
        title: some("T"),
        ..JobFields::default()
    };
    let long = "palabra ".repeat(MAX_DESCRIPTION_TEXT);
    let record = JobRecord::assemble(fields, Some(&long), PROVENANCE).unwrap();
    assert!(record.description_text.unwrap().len() <= MAX_DESCRIPTION_TEXT);
}

#[test]
fn save_slots_never_exceed_target() {
    let counters = RunCounters::new();
    let granted = (0..10).filter(|_| counters.try_reserve_save(3)).count();
    assert_eq!(granted, 3);
    counters.release_save();
    assert_eq!(counters.saved(), 2);
    assert!(counters.try_reserve_save(3));
    assert!(counters.target_reached(3));
}
