//! Prompt templates and batch construction.
//!
//! Every prompt is a system message rendered from a template plus a user
//! message carrying the evidence as JSON. Evidence is enumerated
//! `{"0": ..., "1": ...}` so the model can cite items by position, and the
//! matching [`EvidenceRecord`] keeps the same order for joining.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::bulk::{Batch, EvidenceRecord, Prompt, ResponseKind};

// =============================================================================
// Templates
// =============================================================================

/// A system prompt with `{topic}`, `{country}` and `{focus}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    /// Decode policy for responses to this template.
    pub kind: ResponseKind,
    pub system: &'static str,
}

impl PromptTemplate {
    pub fn render(&self, country: &str, topic: &str, focus: &str) -> String {
        fill(self.system, country, topic, focus)
    }
}

fn fill(text: &str, country: &str, topic: &str, focus: &str) -> String {
    text.replace("{topic}", topic)
        .replace("{focus}", focus)
        .replace("{country}", country)
        .trim()
        .to_string()
}

pub const SENTENCE_EXTRACTION: PromptTemplate = PromptTemplate {
    slug: "sentence_extraction",
    kind: ResponseKind::Extraction,
    system: r#"I will provide you with a dictionary of sentences where the keys are the indices of the sentences and the values are the sentences themselves.
Return a list of the indices of the sentences that explicitly treat this exact topic: {topic}, and this country: {country}, and no other topic or country. Keep actions taken and laws passed to deal with issues; leave out statistics and single events.
Do not deviate from the format or the country and do not return unsure information. Example of the format: [1, 2]. If no sentence is surely relevant, return an empty list."#,
};

pub const LAW_SUMMARY: PromptTemplate = PromptTemplate {
    slug: "law_summary",
    kind: ResponseKind::Summary,
    system: r#"I will provide you with text from different documents as a list of dictionaries with the keys "Publishing Date" and "Text".
Write a summary on this topic: {topic}, for this country: {country}. Use only text that explicitly treats this exact topic and nothing else.
Focus only on laws, articles and legislation. Report the laws themselves without going into detail; the goal is an overview of the laws in place.
Prioritise the most recent text, and add the publishing date right after each piece of information.
Add nothing beyond the provided text and no headers or footers. If nothing is surely relevant, return an empty string. Answer in English whatever the input language."#,
};

pub const GENERAL_SUMMARY: PromptTemplate = PromptTemplate {
    slug: "general_summary",
    kind: ResponseKind::Summary,
    system: r#"I will provide you with text from different documents as a list of dictionaries with the keys "Publishing Date" and "Text".
Write a summary on this topic: {topic}, for this country: {country}. Use only text that explicitly treats this exact topic and nothing else.
Focus only on general actions taken to address the issue. Disregard single events and statistics, and keep it concise.
Prioritise the most recent text, and add the publishing date right after each piece of information.
Add nothing beyond the provided text and no headers or footers. If nothing is surely relevant, return an empty string. Answer in English whatever the input language."#,
};

const STATEMENT_PREAMBLE: &str = r#"Help me write humanitarian reports with excellent analysis. The analysis covers the Protection sector in {country}.
I will provide you with pieces of text from different documents as a dictionary where the key is the entry number and the value is the text."#;

const STATEMENT_FORMAT: &str = r#"Return a dictionary with the keys "Text" and "ID": "Text" holds the summary and "ID" the list of entry numbers explicitly used to write it.
If no text is relevant, return an empty dict ('{}'). Return only the requested format with no additional text, in English and without special characters."#;

// Statement templates hold only the focus line; `statement_prompt` wraps it in
// the shared preamble and answer format.

pub const STATEMENT_COUNTRY_WIDE: PromptTemplate = PromptTemplate {
    slug: "statement_country_wide",
    kind: ResponseKind::Statement,
    system: "Write a general summary of all the crucial information analysts need. Leave out circumstantial information such as specific events and focus on the most important points at country level.",
};

pub const STATEMENT_GEOLOCATION: PromptTemplate = PromptTemplate {
    slug: "statement_geolocation",
    kind: ResponseKind::Statement,
    system: "Write a summary of all the crucial information analysts need for one specific province only: {focus}. Leave out circumstantial information such as specific events and focus on the most important points.",
};

pub const STATEMENT_INDICATOR: PromptTemplate = PromptTemplate {
    slug: "statement_indicator",
    kind: ResponseKind::Statement,
    system: "Write a summary of all the crucial information analysts need on this topic: {focus}. Leave out circumstantial information such as specific events and focus on the most important points at country level.",
};

pub const STATEMENT_POPULATION_GROUP: PromptTemplate = PromptTemplate {
    slug: "statement_population_group",
    kind: ResponseKind::Statement,
    system: "Write a summary of all the crucial information analysts need on this population group: {focus}. Leave out circumstantial information such as specific events and focus on the most important points at country level.",
};

// =============================================================================
// Statement focus
// =============================================================================

/// What a protection statement is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementFocus {
    CountryWide,
    Geolocation(String),
    Indicator(String),
    PopulationGroup(String),
}

impl StatementFocus {
    /// Map a breakdown column and value. `"Country Wide"` wins over any column.
    pub fn from_breakdown(column: &str, value: &str) -> Option<Self> {
        if value == "Country Wide" {
            return Some(StatementFocus::CountryWide);
        }
        match column {
            "Geolocation" => Some(StatementFocus::Geolocation(value.to_string())),
            "Indicator" => Some(StatementFocus::Indicator(value.to_string())),
            "Targeting Specific Population Groups" => {
                Some(StatementFocus::PopulationGroup(value.to_string()))
            }
            _ => None,
        }
    }

    pub fn template(&self) -> PromptTemplate {
        match self {
            StatementFocus::CountryWide => STATEMENT_COUNTRY_WIDE,
            StatementFocus::Geolocation(_) => STATEMENT_GEOLOCATION,
            StatementFocus::Indicator(_) => STATEMENT_INDICATOR,
            StatementFocus::PopulationGroup(_) => STATEMENT_POPULATION_GROUP,
        }
    }

    fn subject(&self) -> &str {
        match self {
            StatementFocus::CountryWide => "",
            StatementFocus::Geolocation(s)
            | StatementFocus::Indicator(s)
            | StatementFocus::PopulationGroup(s) => s,
        }
    }
}

// =============================================================================
// User messages
// =============================================================================

/// `{"0": items[0], "1": items[1], ...}` in item order.
pub fn enumerated_entries<S: AsRef<str>>(items: &[S]) -> String {
    let map: Map<String, Value> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (i.to_string(), Value::String(item.as_ref().to_string())))
        .collect();
    Value::Object(map).to_string()
}

/// A dated excerpt for the summary templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatedText {
    #[serde(rename = "Publishing Date")]
    pub date: String,
    #[serde(rename = "Text")]
    pub text: String,
}

impl DatedText {
    pub fn new(date: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            text: text.into(),
        }
    }
}

/// `[{"Publishing Date": ..., "Text": ...}, ...]`.
pub fn dated_entries(items: &[DatedText]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

// =============================================================================
// Prompt builders
// =============================================================================

/// Which sentences of one document treat `topic` in `country`.
pub fn extraction_prompt<S: AsRef<str>>(topic: &str, country: &str, sentences: &[S]) -> Prompt {
    Prompt::system_user(
        SENTENCE_EXTRACTION.render(country, topic, ""),
        enumerated_entries(sentences),
    )
}

/// A cited protection statement for `focus` in `country`.
pub fn statement_prompt<S: AsRef<str>>(
    focus: &StatementFocus,
    country: &str,
    entries: &[S],
) -> Prompt {
    let text = format!(
        "{}\n{}\n{}",
        STATEMENT_PREAMBLE,
        focus.template().system,
        STATEMENT_FORMAT
    );
    Prompt::system_user(
        fill(&text, country, "", focus.subject()),
        enumerated_entries(entries),
    )
}

/// A free-text summary over dated excerpts, using `template` (law or general).
pub fn summary_prompt(
    template: &PromptTemplate,
    topic: &str,
    country: &str,
    entries: &[DatedText],
) -> Prompt {
    Prompt::system_user(template.render(country, topic, ""), dated_entries(entries))
}

/// Build a batch and its evidence records in one pass, so positions line up.
pub fn build_batch<T, F>(records: Vec<EvidenceRecord<T>>, mut render: F) -> (Batch, Vec<EvidenceRecord<T>>)
where
    F: FnMut(&EvidenceRecord<T>) -> Prompt,
{
    let batch = records.iter().map(&mut render).collect();
    (batch, records)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Role;

    #[test]
    fn entries_are_enumerated_in_order() {
        let user = enumerated_entries(&["text A", "text B"]);
        assert_eq!(user, r#"{"0":"text A","1":"text B"}"#);
        assert_eq!(enumerated_entries::<&str>(&[]), "{}");
    }

    #[test]
    fn dated_entries_use_column_names() {
        let user = dated_entries(&[DatedText::new("2024-03-01", "Law passed.")]);
        assert_eq!(user, r#"[{"Publishing Date":"2024-03-01","Text":"Law passed."}]"#);
    }

    #[test]
    fn extraction_prompt_renders_topic_and_country() {
        let prompt = extraction_prompt("child labour", "Chad", &["s0", "s1"]);
        let messages = prompt.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("this exact topic: child labour"));
        assert!(messages[0].content.contains("this country: Chad"));
        assert!(!messages[0].content.contains("{topic}"));
        assert_eq!(messages[1].content, r#"{"0":"s0","1":"s1"}"#);
    }

    #[test]
    fn statement_focus_selects_template() {
        let focus = StatementFocus::from_breakdown("Geolocation", "Ouaddaï").unwrap();
        assert_eq!(focus.template().slug, "statement_geolocation");
        let prompt = statement_prompt(&focus, "Chad", &["e0"]);
        let system = &prompt.messages()[0].content;
        assert!(system.contains("Protection sector in Chad"));
        assert!(system.contains("province only: Ouaddaï"));
        assert!(system.contains("('{}')"));
        assert!(!system.contains("{focus}"));
        assert!(!system.contains("{country}"));

        assert_eq!(
            StatementFocus::from_breakdown("Indicator", "Country Wide"),
            Some(StatementFocus::CountryWide)
        );
        assert_eq!(StatementFocus::from_breakdown("Unknown", "x"), None);
    }

    #[test]
    fn summary_templates_are_free_text() {
        assert_eq!(LAW_SUMMARY.kind, ResponseKind::Summary);
        let prompt = summary_prompt(&GENERAL_SUMMARY, "detention", "Mali", &[]);
        assert!(prompt.messages()[0].content.contains("this topic: detention"));
        assert_eq!(prompt.messages()[1].content, "[]");
    }

    #[test]
    fn build_batch_keeps_positions() {
        let records = vec![
            EvidenceRecord::new(vec!["a0", "a1"]),
            EvidenceRecord::new(vec!["b0"]),
        ];
        let (batch, records) =
            build_batch(records, |r| extraction_prompt("topic", "Chad", &r.items));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].messages()[1].content, r#"{"0":"b0"}"#);
        assert_eq!(records[0].items, vec!["a0", "a1"]);
    }
}
