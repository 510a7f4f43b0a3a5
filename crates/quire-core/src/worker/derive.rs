//! Pure derivation of index rows from a flat event batch.
//!
//! Nothing here touches the store. [`IndexPlanner`] turns a batch into the
//! [`MetadataRecord`]s and [`OrdinalRecord`]s the worker then writes.

use std::collections::{HashMap, HashSet};

use crate::db::{MetadataRecord, OrdinalError, OrdinalRecord};
use crate::event::{Address, NodeType};

use super::protocol::IndexableEvent;

/// Address → id of the newest event at that address within the batch.
pub type AddressMap<'a> = HashMap<Address, &'a str>;

/// Map every `d`-tagged event's `kind:pubkey:d` address to its id.
///
/// When several versions share an address the newest `created_at` wins;
/// ties keep the later event.
pub fn build_address_map<'a>(
    events: impl IntoIterator<Item = &'a IndexableEvent>,
) -> AddressMap<'a> {
    let mut newest: HashMap<Address, &IndexableEvent> = HashMap::new();
    for event in events {
        let Some(d) = event.tag_value("d") else {
            continue;
        };
        let address = Address::new(event.kind, event.pubkey.clone(), d);
        let replace = newest
            .get(&address)
            .is_none_or(|current| current.created_at <= event.created_at);
        if replace {
            newest.insert(address, event);
        }
    }
    newest
        .into_iter()
        .map(|(address, event)| (address, event.id.as_str()))
        .collect()
}

/// Display title: `title` tag, then `T` tag, then the humanized `d` tag,
/// then empty.
pub fn derive_title(event: &IndexableEvent) -> String {
    let explicit = ["title", "T"]
        .into_iter()
        .filter_map(|name| event.tag_value(name))
        .find(|value| !value.trim().is_empty());
    if let Some(title) = explicit {
        return title.to_string();
    }
    event.tag_value("d").map(humanize_d_tag).unwrap_or_default()
}

/// `"my-great-tune"` → `"My Great Tune"`.
pub fn humanize_d_tag(d: &str) -> String {
    d.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordinal rows for one index event: its `a`/`e` references in tag order,
/// numbered from 0. References that do not resolve are skipped and do not
/// consume an ordinal.
///
/// # Errors
///
/// Returns [`OrdinalError::OutOfRange`] if the event has more than
/// 10,000,000 resolvable references.
pub fn extract_ordinals(
    event: &IndexableEvent,
    addresses: &AddressMap<'_>,
) -> Result<Vec<OrdinalRecord>, OrdinalError> {
    if NodeType::from_kind(event.kind) != NodeType::Index {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    let mut position: u64 = 0;
    for tag in &event.tags {
        let child = match (tag.name(), tag.value()) {
            (Some("e"), Some(id)) if !id.trim().is_empty() => Some(id),
            (Some("a"), Some(raw)) => resolve_address(raw, addresses),
            _ => continue,
        };
        let Some(child) = child else {
            tracing::debug!(
                parent = %event.id,
                tag = ?tag.0,
                "unresolved child reference skipped"
            );
            continue;
        };
        records.push(OrdinalRecord::new(event.id.clone(), position, child)?);
        position += 1;
    }
    Ok(records)
}

fn resolve_address<'a>(raw: &str, addresses: &AddressMap<'a>) -> Option<&'a str> {
    let address = raw.parse::<Address>().ok()?;
    addresses.get(&address).copied()
}

/// Rows derived from one batch, ready to write.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexPlan {
    pub metadata: Vec<MetadataRecord>,
    pub ordinals: Vec<OrdinalRecord>,
}

/// Incremental planner so the worker can report progress per event.
pub struct IndexPlanner<'a> {
    addresses: AddressMap<'a>,
    seen: HashSet<&'a str>,
    plan: IndexPlan,
}

impl<'a> IndexPlanner<'a> {
    pub fn new(batch: &'a [IndexableEvent]) -> Self {
        Self::with_references(batch, &[])
    }

    /// Like [`IndexPlanner::new`], with `references` also visible to address
    /// resolution. Only events passed to [`IndexPlanner::add`] produce rows.
    pub fn with_references(batch: &'a [IndexableEvent], references: &'a [IndexableEvent]) -> Self {
        Self {
            addresses: build_address_map(references.iter().chain(batch)),
            seen: HashSet::new(),
            plan: IndexPlan::default(),
        }
    }

    /// Derive rows for one event. An id already added is ignored.
    ///
    /// # Errors
    ///
    /// Propagates [`OrdinalError`] from [`extract_ordinals`].
    pub fn add(&mut self, event: &'a IndexableEvent) -> Result<(), OrdinalError> {
        if !self.seen.insert(event.id.as_str()) {
            tracing::debug!(event_id = %event.id, "duplicate event in batch");
            return Ok(());
        }
        self.plan.metadata.push(MetadataRecord {
            id: event.id.clone(),
            title: derive_title(event),
        });
        self.plan
            .ordinals
            .extend(extract_ordinals(event, &self.addresses)?);
        Ok(())
    }

    pub fn finish(self) -> IndexPlan {
        self.plan
    }
}

/// Plan a whole batch at once.
///
/// # Errors
///
/// Propagates [`OrdinalError`] from [`extract_ordinals`].
pub fn plan_batch(batch: &[IndexableEvent]) -> Result<IndexPlan, OrdinalError> {
    let mut planner = IndexPlanner::new(batch);
    for event in batch {
        planner.add(event)?;
    }
    Ok(planner.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Tag;
    use crate::event::kind::{PUBLICATION_CONTENT, PUBLICATION_INDEX};

    fn ev(id: &str, kind: u32, created_at: u64, tags: &[&[&str]]) -> IndexableEvent {
        IndexableEvent {
            id: id.into(),
            kind,
            pubkey: "pub".into(),
            tags: tags.iter().map(|t| Tag::new(t.iter().copied())).collect(),
            created_at,
        }
    }

    #[test]
    fn humanizes_d_tags() {
        assert_eq!(humanize_d_tag("my-great-tune"), "My Great Tune");
        assert_eq!(humanize_d_tag("intro"), "Intro");
        assert_eq!(humanize_d_tag("--a--b-"), "A B");
        assert_eq!(humanize_d_tag(""), "");
    }

    #[test]
    fn title_priority() {
        let all = ev("1", PUBLICATION_CONTENT, 1, &[&["d", "x-y"], &["T", "Short"], &["title", "Long"]]);
        assert_eq!(derive_title(&all), "Long");

        let short = ev("2", PUBLICATION_CONTENT, 1, &[&["d", "x-y"], &["T", "Short"]]);
        assert_eq!(derive_title(&short), "Short");

        let d_only = ev("3", PUBLICATION_CONTENT, 1, &[&["d", "my-great-tune"]]);
        assert_eq!(derive_title(&d_only), "My Great Tune");

        let nothing = ev("4", PUBLICATION_CONTENT, 1, &[]);
        assert_eq!(derive_title(&nothing), "");
    }

    #[test]
    fn address_map_prefers_newest_version() {
        let batch = vec![
            ev("new", PUBLICATION_CONTENT, 200, &[&["d", "intro"]]),
            ev("old", PUBLICATION_CONTENT, 100, &[&["d", "intro"]]),
            ev("anon", PUBLICATION_CONTENT, 100, &[]),
        ];
        let map = build_address_map(&batch);
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get(&Address::new(PUBLICATION_CONTENT, "pub", "intro")).copied(),
            Some("new")
        );
    }

    #[test]
    fn references_resolve_addresses_without_rows() {
        let batch = vec![ev(
            "outer",
            PUBLICATION_INDEX,
            1,
            &[&["d", "outer"], &["a", "30040:pub:inner"], &["e", "intro"]],
        )];
        let references = vec![ev("inner", PUBLICATION_INDEX, 1, &[&["d", "inner"], &["e", "gate"]])];

        let mut planner = IndexPlanner::with_references(&batch, &references);
        planner.add(&batch[0]).expect("in range");
        let plan = planner.finish();

        let metadata: Vec<&str> = plan.metadata.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(metadata, vec!["outer"]);
        let ordinals: Vec<(&str, &str)> = plan
            .ordinals
            .iter()
            .map(|r| (r.parent_id.as_str(), r.id.as_str()))
            .collect();
        assert_eq!(ordinals, vec![("outer", "inner"), ("outer", "intro")]);
    }

    #[test]
    fn ordinals_follow_tag_order_and_skip_unresolved() {
        let batch = vec![
            ev(
                "root",
                PUBLICATION_INDEX,
                1,
                &[
                    &["d", "book"],
                    &["a", "30040:pub:child-index"],
                    &["a", "30041:pub:missing"],
                    &["title", "Book"],
                    &["e", "abc123"],
                    &["a", "not-an-address"],
                ],
            ),
            ev("child", PUBLICATION_INDEX, 1, &[&["d", "child-index"]]),
        ];
        let map = build_address_map(&batch);
        let ordinals = extract_ordinals(&batch[0], &map).expect("in range");

        let rows: Vec<(&str, &str)> = ordinals
            .iter()
            .map(|r| (r.ordinal.as_str(), r.id.as_str()))
            .collect();
        assert_eq!(rows, vec![("0000000", "child"), ("0000001", "abc123")]);
        assert!(ordinals.iter().all(|r| r.parent_id == "root"));
    }

    #[test]
    fn content_events_have_no_ordinals() {
        let leaf = ev("leaf", PUBLICATION_CONTENT, 1, &[&["e", "other"]]);
        let map = AddressMap::new();
        assert!(extract_ordinals(&leaf, &map).expect("ok").is_empty());
    }

    #[test]
    fn plan_dedupes_by_event_id() {
        let root = ev("root", PUBLICATION_INDEX, 1, &[&["e", "leaf"]]);
        let leaf = ev("leaf", PUBLICATION_CONTENT, 1, &[&["d", "leaf"]]);
        let batch = vec![root.clone(), leaf, root];

        let plan = plan_batch(&batch).expect("plan");
        assert_eq!(plan.metadata.len(), 2);
        assert_eq!(plan.ordinals.len(), 1);
    }
}
