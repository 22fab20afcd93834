// src/merge.rs
//! Coalesce per-source records by id, tracking which sources reported each one.

use std::collections::BTreeMap;

use crate::ingest::types::Event;
use crate::ingest::SourceResult;

/// Merge every source's events into one record per id.
///
/// The first occurrence of an id is kept as-is. Later occurrences append their
/// provenance and fill fields still empty on the kept record; a field is never
/// overwritten once set. Output is ordered by id.
pub fn merge(results: &[SourceResult]) -> Vec<Event> {
    let mut by_id: BTreeMap<String, Event> = BTreeMap::new();
    let mut seen = 0usize;

    for ev in results.iter().flat_map(|r| r.events.iter()) {
        seen += 1;
        match by_id.get_mut(&ev.id) {
            None => {
                by_id.insert(ev.id.clone(), ev.clone());
            }
            Some(kept) => fold_into(kept, ev),
        }
    }

    let merged: Vec<Event> = by_id
        .into_values()
        .map(|mut ev| {
            dedup_in_order(&mut ev.sources);
            ev
        })
        .collect();

    tracing::debug!(target: "merge", input = seen, output = merged.len(), "merged");
    merged
}

fn fold_into(kept: &mut Event, other: &Event) {
    kept.sources.extend(other.sources.iter().cloned());

    backfill(&mut kept.district, &other.district);
    backfill(&mut kept.venue, &other.venue);
    backfill(&mut kept.address, &other.address);
    backfill(&mut kept.description, &other.description);
    if kept.latitude == 0.0 {
        kept.latitude = other.latitude;
    }
    if kept.longitude == 0.0 {
        kept.longitude = other.longitude;
    }
}

fn backfill(slot: &mut String, candidate: &str) {
    if slot.trim().is_empty() && !candidate.trim().is_empty() {
        *slot = candidate.to_string();
    }
}

fn dedup_in_order(tags: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    tags.retain(|t| seen.insert(t.clone()));
}
