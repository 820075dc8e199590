//! Joining decoded answers back to the evidence each prompt offered.
//!
//! A prompt enumerates its evidence as `{"0": ..., "1": ...}`; the model cites
//! those positions. Joining resolves each citation against the record that
//! built the prompt, by batch position. Citations that do not resolve are
//! collected on the record and otherwise dropped.

use tracing::debug;

use super::types::{DecodedValue, EvidenceRef};

/// The ordered evidence items offered to the model in one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceRecord<T> {
    pub items: Vec<T>,
}

impl<T> EvidenceRecord<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn resolve(&self, reference: &EvidenceRef) -> Result<&T, UnresolvedRef> {
        match reference {
            EvidenceRef::Index(index) => usize::try_from(*index)
                .ok()
                .and_then(|i| self.items.get(i))
                .ok_or(UnresolvedRef::OutOfRange {
                    index: *index,
                    len: self.items.len(),
                }),
            EvidenceRef::Malformed(value) => Err(UnresolvedRef::NotAnIndex(value.clone())),
        }
    }

    /// Resolve every reference, keeping duplicates and citation order.
    fn resolve_all<'a>(&'a self, refs: &[EvidenceRef]) -> (Vec<&'a T>, Vec<UnresolvedRef>) {
        let mut evidence = Vec::with_capacity(refs.len());
        let mut dropped = Vec::new();
        for reference in refs {
            match self.resolve(reference) {
                Ok(item) => evidence.push(item),
                Err(err) => dropped.push(err),
            }
        }
        (evidence, dropped)
    }
}

impl<T> From<Vec<T>> for EvidenceRecord<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

/// A citation that did not point at an offered item.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnresolvedRef {
    #[error("index {index} is outside the {len} offered items")]
    OutOfRange { index: i64, len: usize },
    #[error("reference {0} is not an integer index")]
    NotAnIndex(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("{contexts} context records but {decoded} decoded results")]
    LengthMismatch { contexts: usize, decoded: usize },
}

// =============================================================================
// Joined records
// =============================================================================

/// A summary paired with the context row it was generated for.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord<'a, C> {
    pub slot: usize,
    pub context: &'a C,
    pub text: &'a str,
}

/// The evidence items a model selected from one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRecord<'a, T> {
    pub slot: usize,
    pub evidence: Vec<&'a T>,
    pub dropped: Vec<UnresolvedRef>,
}

/// A generated statement and the evidence it cites.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRecord<'a, T> {
    pub slot: usize,
    pub text: &'a str,
    pub evidence: Vec<&'a T>,
    pub dropped: Vec<UnresolvedRef>,
}

fn check_lengths(contexts: usize, decoded: usize) -> Result<(), JoinError> {
    if contexts == decoded {
        Ok(())
    } else {
        Err(JoinError::LengthMismatch { contexts, decoded })
    }
}

/// Pair each non-empty summary with its context row.
pub fn join_summaries<'a, C>(
    contexts: &'a [C],
    decoded: &'a [DecodedValue],
) -> Result<Vec<SummaryRecord<'a, C>>, JoinError> {
    check_lengths(contexts.len(), decoded.len())?;
    let mut joined = Vec::new();
    for (slot, (context, value)) in contexts.iter().zip(decoded).enumerate() {
        let text = match value {
            DecodedValue::Summary(text) if !text.trim().is_empty() => text.as_str(),
            DecodedValue::Summary(_) | DecodedValue::Empty(_) => continue,
            other => {
                debug!(slot, kind = other.kind().as_str(), "non-summary value in summary join");
                continue;
            }
        };
        joined.push(SummaryRecord {
            slot,
            context,
            text,
        });
    }
    Ok(joined)
}

/// One record per slot with the evidence it selected, possibly none.
pub fn join_extractions<'a, T>(
    records: &'a [EvidenceRecord<T>],
    decoded: &'a [DecodedValue],
) -> Result<Vec<ExtractionRecord<'a, T>>, JoinError> {
    check_lengths(records.len(), decoded.len())?;
    Ok(records
        .iter()
        .zip(decoded)
        .enumerate()
        .map(|(slot, (record, value))| {
            let refs: &[EvidenceRef] = match value {
                DecodedValue::Extraction(refs) => refs,
                DecodedValue::Empty(_) => &[],
                other => {
                    debug!(slot, kind = other.kind().as_str(), "non-extraction value in extraction join");
                    &[]
                }
            };
            let (evidence, dropped) = record.resolve_all(refs);
            log_dropped(slot, &dropped);
            ExtractionRecord {
                slot,
                evidence,
                dropped,
            }
        })
        .collect())
}

/// One record per slot that produced a statement.
///
/// A statement whose citations all fail to resolve is kept, with no evidence.
pub fn join_statements<'a, T>(
    records: &'a [EvidenceRecord<T>],
    decoded: &'a [DecodedValue],
) -> Result<Vec<StatementRecord<'a, T>>, JoinError> {
    check_lengths(records.len(), decoded.len())?;
    let mut joined = Vec::new();
    for (slot, (record, value)) in records.iter().zip(decoded).enumerate() {
        let (text, ids) = match value {
            DecodedValue::Statement { text, ids } => (text.as_str(), ids),
            DecodedValue::Empty(_) => continue,
            other => {
                debug!(slot, kind = other.kind().as_str(), "non-statement value in statement join");
                continue;
            }
        };
        let (evidence, dropped) = record.resolve_all(ids);
        log_dropped(slot, &dropped);
        joined.push(StatementRecord {
            slot,
            text,
            evidence,
            dropped,
        });
    }
    Ok(joined)
}

fn log_dropped(slot: usize, dropped: &[UnresolvedRef]) {
    for err in dropped {
        debug!(slot, error = %err, "dropping unresolved evidence reference");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::types::ResponseKind;

    fn sentences() -> Vec<EvidenceRecord<&'static str>> {
        vec![
            EvidenceRecord::new(vec!["s0", "s1", "s2"]),
            EvidenceRecord::new(vec!["t0"]),
        ]
    }

    #[test]
    fn out_of_range_ids_are_dropped_not_fatal() {
        let records = sentences();
        let decoded = vec![
            DecodedValue::Extraction(vec![
                EvidenceRef::Index(0),
                EvidenceRef::Index(1),
                EvidenceRef::Index(99),
            ]),
            DecodedValue::Empty(ResponseKind::Extraction),
        ];
        let joined = join_extractions(&records, &decoded).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].slot, 0);
        assert_eq!(joined[0].evidence, vec![&"s0", &"s1"]);
        assert_eq!(
            joined[0].dropped,
            vec![UnresolvedRef::OutOfRange { index: 99, len: 3 }]
        );
        assert_eq!(joined[1].slot, 1);
        assert!(joined[1].evidence.is_empty());
    }

    #[test]
    fn citation_past_a_two_item_record_is_dropped() {
        let records = vec![EvidenceRecord::new(vec!["text A", "text B"])];
        let decoded = vec![DecodedValue::Extraction(vec![
            EvidenceRef::Index(0),
            EvidenceRef::Index(1),
            EvidenceRef::Index(99),
        ])];
        let joined = join_extractions(&records, &decoded).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].evidence, vec![&"text A", &"text B"]);
        assert_eq!(
            joined[0].dropped,
            vec![UnresolvedRef::OutOfRange { index: 99, len: 2 }]
        );
    }

    #[test]
    fn negative_and_malformed_refs_do_not_resolve() {
        let record = EvidenceRecord::new(vec!["a", "b"]);
        assert!(matches!(
            record.resolve(&EvidenceRef::Index(-1)),
            Err(UnresolvedRef::OutOfRange { index: -1, len: 2 })
        ));
        assert!(matches!(
            record.resolve(&EvidenceRef::Malformed(serde_json::json!("x"))),
            Err(UnresolvedRef::NotAnIndex(_))
        ));
    }

    #[test]
    fn extraction_keeps_slots_whose_refs_all_fail() {
        let records = sentences();
        let decoded = vec![
            DecodedValue::Extraction(vec![EvidenceRef::Index(7)]),
            DecodedValue::Extraction(vec![EvidenceRef::Index(0), EvidenceRef::Index(0)]),
        ];
        let joined = join_extractions(&records, &decoded).unwrap();
        assert_eq!(joined.len(), 2);
        assert!(joined[0].evidence.is_empty());
        assert_eq!(joined[0].dropped.len(), 1);
        assert_eq!(joined[1].evidence, vec![&"t0", &"t0"]);
    }

    #[test]
    fn statements_keep_text_when_citations_fail() {
        let records = sentences();
        let decoded = vec![
            DecodedValue::Statement {
                text: "Flooding in the north.".to_string(),
                ids: vec![EvidenceRef::Index(2), EvidenceRef::Index(5)],
            },
            DecodedValue::Statement {
                text: "Unsupported.".to_string(),
                ids: vec![EvidenceRef::Index(3)],
            },
        ];
        let joined = join_statements(&records, &decoded).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].evidence, vec![&"s2"]);
        assert_eq!(joined[0].dropped.len(), 1);
        assert_eq!(joined[1].text, "Unsupported.");
        assert!(joined[1].evidence.is_empty());
    }

    #[test]
    fn empty_statements_are_skipped() {
        let records = sentences();
        let decoded = vec![
            DecodedValue::Empty(ResponseKind::Statement),
            DecodedValue::Statement {
                text: "x".to_string(),
                ids: vec![],
            },
        ];
        let joined = join_statements(&records, &decoded).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].slot, 1);
    }

    #[test]
    fn summaries_skip_empty_slots() {
        let contexts = vec!["Law A", "Law B", "Law C"];
        let decoded = vec![
            DecodedValue::Summary("Bans X.".to_string()),
            DecodedValue::Empty(ResponseKind::Summary),
            DecodedValue::Summary("Repeals Y.".to_string()),
        ];
        let joined = join_summaries(&contexts, &decoded).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].text, "Bans X.");
        assert_eq!(joined[1].slot, 2);
        assert_eq!(*joined[1].context, "Law C");
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let records = sentences();
        let decoded = vec![DecodedValue::Empty(ResponseKind::Extraction)];
        assert_eq!(
            join_extractions(&records, &decoded).unwrap_err(),
            JoinError::LengthMismatch {
                contexts: 2,
                decoded: 1
            }
        );
    }
}
