//! Merge engine: new records replace old ones by id.
//!
//! `merge(old, new)` keeps every old ticket whose id does not appear in
//! `new`, in its original order, then appends `new`. Content is never
//! compared. Duplicate ids inside one input collapse to the last occurrence,
//! so the output never holds two tickets with the same id and merging the
//! same batch twice changes nothing.

use std::collections::HashSet;

use crate::models::{MergeStats, Ticket};

/// Merge `new` into `old`. New always wins.
pub fn merge(old: Vec<Ticket>, new: Vec<Ticket>) -> (Vec<Ticket>, MergeStats) {
    let old_len = old.len();
    let new_len = new.len();
    let old = dedupe_last_wins(old);
    let new = dedupe_last_wins(new);
    let collapsed = (old_len - old.len()) + (new_len - new.len());

    let new_ids: HashSet<u64> = new.iter().map(|t| t.id).collect();
    let old_ids: HashSet<u64> = old.iter().map(|t| t.id).collect();

    let mut merged: Vec<Ticket> = old
        .into_iter()
        .filter(|t| !new_ids.contains(&t.id))
        .collect();
    let retained = merged.len();
    let replaced = new_ids.intersection(&old_ids).count();
    let added = new.len() - replaced;

    merged.extend(new);

    let stats = MergeStats {
        retained,
        replaced,
        added,
        collapsed,
        total: merged.len(),
    };
    (merged, stats)
}

/// Keep only the last ticket for each id, at that ticket's position.
fn dedupe_last_wins(tickets: Vec<Ticket>) -> Vec<Ticket> {
    let mut seen = HashSet::with_capacity(tickets.len());
    let mut kept: Vec<Ticket> = tickets
        .into_iter()
        .rev()
        .filter(|t| seen.insert(t.id))
        .collect();
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: u64, name: &str) -> Ticket {
        Ticket {
            name: name.into(),
            ..Ticket::with_id(id)
        }
    }

    fn ids(tickets: &[Ticket]) -> Vec<u64> {
        tickets.iter().map(|t| t.id).collect()
    }

    fn sample_old() -> Vec<Ticket> {
        vec![t(1, "a"), t(2, "b"), t(3, "c")]
    }

    fn sample_new() -> Vec<Ticket> {
        vec![t(3, "c2"), t(4, "d")]
    }

    #[test]
    fn test_empty_sides_are_identity() {
        let a = sample_old();
        assert_eq!(merge(a.clone(), vec![]).0, a);
        assert_eq!(merge(vec![], a.clone()).0, a);
    }

    #[test]
    fn test_new_wins_by_id() {
        let (merged, stats) = merge(sample_old(), sample_new());
        assert_eq!(ids(&merged), vec![1, 2, 3, 4]);
        assert_eq!(merged[2].name, "c2");
        assert_eq!(
            stats,
            MergeStats {
                retained: 2,
                replaced: 1,
                added: 1,
                collapsed: 0,
                total: 4
            }
        );
    }

    #[test]
    fn test_new_wins_even_with_identical_content() {
        let old = vec![t(1, "same"), t(2, "x")];
        let (merged, _) = merge(old, vec![t(1, "same")]);
        assert_eq!(ids(&merged), vec![2, 1]);
    }

    #[test]
    fn test_idempotent() {
        let (once, _) = merge(sample_old(), sample_new());
        let (twice, _) = merge(once.clone(), sample_new());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_idempotent_with_duplicates_in_batch() {
        let batch = vec![t(5, "first"), t(1, "x"), t(5, "second")];
        let (once, stats) = merge(sample_old(), batch.clone());
        let (twice, _) = merge(once.clone(), batch);
        assert_eq!(once, twice);
        assert_eq!(stats.collapsed, 1);
        assert_eq!(once.iter().find(|t| t.id == 5).unwrap().name, "second");
    }

    #[test]
    fn test_ids_unique_after_merge() {
        let old = vec![t(1, "a"), t(1, "b"), t(2, "c")];
        let new = vec![t(2, "d"), t(3, "e"), t(3, "f")];
        let (merged, _) = merge(old, new);

        let unique: HashSet<u64> = merged.iter().map(|t| t.id).collect();
        assert_eq!(unique.len(), merged.len());
        assert_eq!(ids(&merged), vec![1, 2, 3]);
        assert_eq!(merged[0].name, "b");
        assert_eq!(merged[2].name, "f");
    }
}
