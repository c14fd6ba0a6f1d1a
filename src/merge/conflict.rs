//! File-overlap detection between branches completed in the same wave.
//!
//! Overlaps are advisory: they warn that two tickets touched the same path,
//! but the merge queue's own three-way merge decides whether a real conflict
//! exists.

use crate::dag::{TicketId, WorkResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Two tickets in one wave modified the same path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOverlap {
    pub ticket_a: TicketId,
    pub ticket_b: TicketId,
    pub path: String,
}

/// Detect pairwise changed-file overlaps among a wave's successful results.
///
/// One record per (pair, path). Pairs are ordered ascending (`ticket_a <
/// ticket_b`) and records follow the input order, so output is deterministic
/// for the sorted slices the coordinator passes in. O(n² · files) per wave;
/// wave sizes are bounded by the parallelism cap.
pub fn detect_file_overlaps(results: &[WorkResult]) -> Vec<FileOverlap> {
    let mut overlaps = Vec::new();

    for (i, a) in results.iter().enumerate() {
        let files_a: HashSet<&str> = a.files_changed.iter().map(String::as_str).collect();
        for b in &results[i + 1..] {
            let mut shared: Vec<&str> = b
                .files_changed
                .iter()
                .map(String::as_str)
                .filter(|p| files_a.contains(p))
                .collect();
            shared.sort_unstable();
            let (ticket_a, ticket_b) = if a.ticket <= b.ticket {
                (a.ticket, b.ticket)
            } else {
                (b.ticket, a.ticket)
            };
            overlaps.extend(shared.into_iter().map(|path| FileOverlap {
                ticket_a,
                ticket_b,
                path: path.to_string(),
            }));
        }
    }

    overlaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(ticket: u64, files: &[&str]) -> WorkResult {
        WorkResult::success(
            TicketId(ticket),
            format!("convoy/ticket-{ticket}"),
            files.iter().map(|s| s.to_string()).collect(),
            Duration::ZERO,
        )
    }

    #[test]
    fn shared_file_yields_one_record() {
        let results = vec![
            result(10, &["src/a.py", "src/b.py"]),
            result(11, &["src/a.py", "src/c.py"]),
        ];
        let overlaps = detect_file_overlaps(&results);
        assert_eq!(
            overlaps,
            vec![FileOverlap {
                ticket_a: TicketId(10),
                ticket_b: TicketId(11),
                path: "src/a.py".to_string(),
            }]
        );
    }

    #[test]
    fn disjoint_files_yield_nothing() {
        let results = vec![result(1, &["a.rs"]), result(2, &["b.rs"])];
        assert!(detect_file_overlaps(&results).is_empty());
    }

    #[test]
    fn multiple_shared_paths_yield_one_record_each() {
        let results = vec![result(1, &["x", "y", "z"]), result(2, &["y", "x"])];
        let overlaps = detect_file_overlaps(&results);
        let paths: Vec<&str> = overlaps.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["x", "y"]);
    }

    #[test]
    fn three_way_overlap_reports_each_pair() {
        let results = vec![
            result(1, &["shared"]),
            result(2, &["shared"]),
            result(3, &["shared"]),
        ];
        let overlaps = detect_file_overlaps(&results);
        assert_eq!(overlaps.len(), 3);
        assert!(overlaps.iter().all(|o| o.ticket_a < o.ticket_b));
    }

    #[test]
    fn single_result_has_no_pairs() {
        let results = vec![result(1, &["a"])];
        assert!(detect_file_overlaps(&results).is_empty());
    }
}
