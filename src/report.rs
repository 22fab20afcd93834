// src/report.rs
use std::collections::BTreeMap;

use serde::Serialize;

use crate::ingest::types::Event;

/// Aggregate counts over classified records, for the audit export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecisionSummary {
    pub total: usize,
    pub kept: usize,
    pub rejected: usize,
    /// Reason label → number of records with that reason.
    pub by_reason: BTreeMap<String, usize>,
    /// Records that never went through the classifier.
    pub unclassified: usize,
}

pub fn summarize(events: &[Event]) -> DecisionSummary {
    let mut s = DecisionSummary {
        total: events.len(),
        ..DecisionSummary::default()
    };
    for ev in events {
        match &ev.decision {
            None => s.unclassified += 1,
            Some(d) => {
                if d.kept {
                    s.kept += 1;
                } else {
                    s.rejected += 1;
                }
                *s.by_reason.entry(d.reason.as_str().to_string()).or_default() += 1;
            }
        }
    }
    s
}
