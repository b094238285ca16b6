//! Last-write-wins reconciliation of a local and a remote collection.
//!
//! # Rule
//!
//! 1. Seed a map keyed by record id with every local record.
//! 2. For each remote record: insert it when no entry shares its id;
//!    otherwise replace the entry only when
//!    `remote.updated_at >= entry.updated_at`.
//! 3. Records that exist only locally (never pushed) are kept as-is.
//! 4. Emit the map in canonical order (`created_at` desc, id asc).
//!
//! Remote wins ties so that pulling the same remote state twice with no
//! local edits writes nothing the second time.
//!
//! Deletions are not represented: a record missing remotely looks the
//! same whether it was deleted there or simply never pushed, so both
//! are preserved locally.

use std::collections::HashMap;

use crate::models::{sort_records, Record};

/// Output of [`merge_plan`]: the converged collection plus the subset
/// that differs from the local copy and must be written back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    pub merged: Vec<Record>,
    pub changed: Vec<Record>,
}

/// Reconcile `local` and `remote` into one converged collection.
pub fn merge(local: &[Record], remote: &[Record]) -> Vec<Record> {
    merge_plan(local, remote).merged
}

/// Reconcile and also report which records changed relative to `local`.
pub fn merge_plan(local: &[Record], remote: &[Record]) -> MergePlan {
    let local_by_id: HashMap<&str, &Record> = local.iter().map(|r| (r.id(), r)).collect();

    let mut by_id: HashMap<&str, &Record> = local_by_id.clone();
    for incoming in remote {
        let keep_existing = by_id
            .get(incoming.id())
            .is_some_and(|existing| incoming.updated_at() < existing.updated_at());
        if !keep_existing {
            by_id.insert(incoming.id(), incoming);
        }
    }

    let mut merged: Vec<Record> = by_id.values().map(|r| (*r).clone()).collect();
    sort_records(&mut merged);

    let changed: Vec<Record> = merged
        .iter()
        .filter(|r| local_by_id.get(r.id()).map_or(true, |l| **l != **r))
        .cloned()
        .collect();

    MergePlan { merged, changed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KnowledgeItem, Todo};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn todo(id: &str, title: &str, created: i64, updated: i64) -> Record {
        let mut t = Todo::new("u1", title, ts(created));
        t.id = id.to_string();
        t.updated_at = ts(updated);
        Record::Todo(t)
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn test_remote_newer_wins() {
        let local = vec![todo("t1", "local", 1, 10)];
        let remote = vec![todo("t1", "remote", 1, 20)];
        let merged = merge(&local, &remote);
        assert_eq!(merged, remote);
    }

    #[test]
    fn test_local_newer_wins() {
        let local = vec![todo("t1", "local", 1, 30)];
        let remote = vec![todo("t1", "remote", 1, 20)];
        let merged = merge(&local, &remote);
        assert_eq!(merged, local);
    }

    #[test]
    fn test_tie_goes_to_remote() {
        let local = vec![todo("t1", "local", 1, 20)];
        let remote = vec![todo("t1", "remote", 1, 20)];
        let merged = merge(&local, &remote);
        assert_eq!(merged[0].title(), "remote");
    }

    #[test]
    fn test_local_only_record_survives_empty_remote() {
        let local = vec![todo("t2", "unpushed", 5, 5)];
        let merged = merge(&local, &[]);
        assert_eq!(merged, local);
    }

    #[test]
    fn test_remote_only_record_inserted() {
        let local = vec![todo("a", "a", 1, 1)];
        let remote = vec![todo("b", "b", 2, 2)];
        let merged = merge(&local, &remote);
        assert_eq!(ids(&merged), vec!["b", "a"]);
    }

    #[test]
    fn test_output_in_canonical_order() {
        let local = vec![todo("c", "c", 3, 3), todo("a", "a", 3, 3)];
        let remote = vec![todo("b", "b", 7, 7), todo("d", "d", 1, 1)];
        let merged = merge(&local, &remote);
        assert_eq!(ids(&merged), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let cases: Vec<(Vec<Record>, Vec<Record>)> = vec![
            (vec![], vec![]),
            (vec![todo("t1", "l", 1, 10)], vec![todo("t1", "r", 1, 20)]),
            (vec![todo("t1", "l", 1, 30)], vec![todo("t1", "r", 1, 20)]),
            (vec![todo("t1", "l", 1, 20)], vec![todo("t1", "r", 1, 20)]),
            (
                vec![todo("a", "l", 1, 5), todo("b", "l", 2, 9)],
                vec![todo("b", "r", 2, 8), todo("c", "r", 3, 3)],
            ),
            (vec![], vec![todo("x", "r", 1, 1), todo("y", "r", 1, 1)]),
        ];
        for (local, remote) in cases {
            let once = merge(&local, &remote);
            let twice = merge(&local, &once);
            assert_eq!(once, twice);
            // Re-pulling the same remote state after write-back changes nothing.
            assert!(merge_plan(&once, &remote).changed.is_empty());
        }
    }

    #[test]
    fn test_replicas_converge_on_same_remote() {
        // Replica A and B both pushed and now pull the same remote state.
        let remote = vec![
            todo("shared", "from-b", 1, 50),
            todo("a-only", "a", 2, 2),
            todo("b-only", "b", 3, 3),
        ];
        let replica_a = vec![todo("shared", "from-a", 1, 40), todo("a-only", "a", 2, 2)];
        let replica_b = vec![todo("shared", "from-b", 1, 50), todo("b-only", "b", 3, 3)];

        let a = merge(&replica_a, &remote);
        let b = merge(&replica_b, &remote);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_plan_reports_only_changed_records() {
        let local = vec![todo("same", "s", 1, 1), todo("stale", "old", 2, 2)];
        let remote = vec![
            todo("same", "s", 1, 1),
            todo("stale", "new", 2, 9),
            todo("fresh", "f", 3, 3),
        ];
        let plan = merge_plan(&local, &remote);
        assert_eq!(plan.merged.len(), 3);
        assert_eq!(ids(&plan.changed), vec!["fresh", "stale"]);
    }

    #[test]
    fn test_duplicate_remote_ids_resolve_to_latest() {
        let remote = vec![todo("d", "v2", 1, 20), todo("d", "v1", 1, 10)];
        let merged = merge(&[], &remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title(), "v2");
    }

    #[test]
    fn test_knowledge_items_merge_by_same_rule() {
        let mut local = KnowledgeItem::new("u1", "local page", ts(1));
        local.updated_at = ts(10);
        let mut remote = local.clone();
        remote.title = "remote page".to_string();
        remote.updated_at = ts(11);
        let merged = merge(&[local.into()], &[remote.clone().into()]);
        assert_eq!(merged, vec![Record::Knowledge(remote)]);
    }
}
