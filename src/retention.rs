//! Generation-based AMI retention.
//!
//! Pure decision logic: given the fetched image records and a retention
//! count, decide which generations to keep and which to delete. The actual
//! deregister/delete calls are the caller's job, once per `remove` entry.

use std::collections::BTreeSet;

use thiserror::Error;

/// A machine image flattened at the fetch boundary. The `Name` tag and the
/// backing snapshot id are resolved once when the record is built, so the
/// evaluation never rescans SDK tag lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    /// ISO-8601 creation date as reported by the API; lexically sortable.
    pub creation_date: String,
    pub name_tag: String,
    pub snapshot_id: String,
}

/// Outcome of a retention evaluation. Both lists are in descending creation
/// order; `keep` followed by `remove` is the full sorted input.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionDecision {
    pub keep: Vec<ImageRecord>,
    pub remove: Vec<ImageRecord>,
}

/// The fetched records carry more than one distinct `Name` tag, meaning the
/// filter matched more than one image lineage. Pruning across lineages would
/// delete unrelated images, so nothing is partitioned; the operator must
/// narrow the filter. Never retried: this is a data problem, not a fault.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("images match more than one \"Name\" tag ({}); narrow the filter until it matches a single one", .names.iter().cloned().collect::<Vec<_>>().join(", "))]
pub struct NamingConflict {
    pub names: BTreeSet<String>,
}

/// Decide which image generations to keep and which to remove.
///
/// Records are stably sorted by creation date, newest first; the first
/// `generations` records are kept and the rest removed. Refused with
/// [`NamingConflict`] unless every record shares one `Name` tag (an empty
/// input is trivially uniform). `generations = 0` removes everything.
pub fn evaluate(
    records: Vec<ImageRecord>,
    generations: usize,
) -> Result<RetentionDecision, NamingConflict> {
    let sorted = sort_by_creation_descending(records);
    validate_uniform_naming(&sorted)?;
    Ok(partition(sorted, generations))
}

fn sort_by_creation_descending(mut records: Vec<ImageRecord>) -> Vec<ImageRecord> {
    // stable: equal creation dates keep their fetch order
    records.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
    records
}

fn validate_uniform_naming(records: &[ImageRecord]) -> Result<(), NamingConflict> {
    let names: BTreeSet<String> = records.iter().map(|r| r.name_tag.clone()).collect();
    if names.len() > 1 {
        return Err(NamingConflict { names });
    }
    Ok(())
}

fn partition(mut records: Vec<ImageRecord>, generations: usize) -> RetentionDecision {
    let remove = records.split_off(generations.min(records.len()));
    RetentionDecision {
        keep: records,
        remove,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, creation_date: &str, name_tag: &str) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            creation_date: creation_date.to_string(),
            name_tag: name_tag.to_string(),
            snapshot_id: format!("snap-{id}"),
        }
    }

    fn web_app_records(n: usize) -> Vec<ImageRecord> {
        (0..n)
            .map(|i| {
                record(
                    &format!("ami-{i}"),
                    &format!("2024-01-{:02}T00:00:00.000Z", i + 1),
                    "web-app",
                )
            })
            .collect()
    }

    #[test]
    fn keeps_newest_removes_oldest() {
        let decision = evaluate(web_app_records(10), 7).unwrap();
        assert_eq!(decision.keep.len(), 7);
        assert_eq!(decision.remove.len(), 3);

        // newest first
        assert_eq!(decision.keep[0].id, "ami-9");
        assert_eq!(decision.keep[6].id, "ami-3");
        // the three oldest are removed, still in descending order
        let removed: Vec<_> = decision.remove.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(removed, ["ami-2", "ami-1", "ami-0"]);
    }

    #[test]
    fn keep_and_remove_reproduce_the_sorted_input() {
        for generations in 0..12 {
            let decision = evaluate(web_app_records(10), generations).unwrap();
            assert_eq!(decision.keep.len() + decision.remove.len(), 10);

            let mut combined = decision.keep.clone();
            combined.extend(decision.remove.clone());
            let mut expected = web_app_records(10);
            expected.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
            assert_eq!(combined, expected);
        }
    }

    #[test]
    fn keeping_more_than_available_removes_nothing() {
        let decision = evaluate(web_app_records(3), 7).unwrap();
        assert_eq!(decision.keep.len(), 3);
        assert!(decision.remove.is_empty());
    }

    #[test]
    fn zero_generations_removes_everything() {
        let decision = evaluate(web_app_records(4), 0).unwrap();
        assert!(decision.keep.is_empty());
        assert_eq!(decision.remove.len(), 4);
        assert_eq!(decision.remove[0].id, "ami-3");
    }

    #[test]
    fn empty_input_is_valid_and_empty() {
        let decision = evaluate(Vec::new(), 7).unwrap();
        assert!(decision.keep.is_empty());
        assert!(decision.remove.is_empty());
    }

    #[test]
    fn mixed_name_tags_are_refused() {
        let records = vec![
            record("ami-1", "2024-01-01", "app"),
            record("ami-2", "2024-01-01", "other"),
        ];
        let err = evaluate(records, 7).unwrap_err();
        let names: Vec<_> = err.names.iter().cloned().collect();
        assert_eq!(names, ["app", "other"]);
    }

    #[test]
    fn conflict_reports_every_distinct_name() {
        let records = vec![
            record("ami-1", "2024-01-03", "a"),
            record("ami-2", "2024-01-02", "b"),
            record("ami-3", "2024-01-01", "a"),
            record("ami-4", "2024-01-04", "c"),
        ];
        let err = evaluate(records, 1).unwrap_err();
        assert_eq!(err.names.len(), 3);
        let message = err.to_string();
        for name in ["a", "b", "c"] {
            assert!(message.contains(name), "{message}");
        }
    }

    #[test]
    fn equal_creation_dates_keep_fetch_order() {
        let records = vec![
            record("ami-old", "2024-01-01T00:00:00.000Z", "app"),
            record("ami-a", "2024-06-01T00:00:00.000Z", "app"),
            record("ami-b", "2024-06-01T00:00:00.000Z", "app"),
            record("ami-c", "2024-06-01T00:00:00.000Z", "app"),
        ];
        let decision = evaluate(records, 0).unwrap();
        let order: Vec<_> = decision.remove.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, ["ami-a", "ami-b", "ami-c", "ami-old"]);
    }

    #[test]
    fn single_record_single_generation() {
        let decision = evaluate(vec![record("ami-1", "2024-01-01", "app")], 1).unwrap();
        assert_eq!(decision.keep.len(), 1);
        assert!(decision.remove.is_empty());
    }
}
