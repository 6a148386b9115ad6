use serde::Serialize;
use serendipity_discovery::RunReport;
use serendipity_protocol::{AccountId, ClusterId};
use std::fmt::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct AccountFailure {
    pub account: AccountId,
    pub error: String,
}

#[derive(Serialize)]
pub struct RunOutput<'a> {
    pub reports: &'a [RunReport],
    pub failures: &'a [AccountFailure],
    pub out: &'a Path,
}

#[derive(Debug, Serialize)]
pub struct PeerRow {
    pub account: AccountId,
    pub similarity: f32,
    pub items: usize,
}

#[derive(Debug, Serialize)]
pub struct ClusterRow {
    pub cluster_id: ClusterId,
    pub category: String,
    pub current_items: usize,
    pub peer_items: usize,
}

pub fn run_summary(reports: &[RunReport], failures: &[AccountFailure], out: &Path) -> String {
    let mut text = String::new();
    for report in reports {
        if report.skipped {
            let _ = writeln!(text, "{}: skipped (no items)", report.account);
            continue;
        }
        let _ = writeln!(
            text,
            "{}: {} paths from {} peers, {} clusters, {} oracle calls ({} rejected)",
            report.account,
            report.paths_emitted,
            report.peers_considered,
            report.clusters(),
            report.oracle_calls(),
            report.rejected()
        );
    }
    for failure in failures {
        let _ = writeln!(text, "{}: failed: {}", failure.account, failure.error);
    }
    let total: usize = reports.iter().map(|r| r.paths_emitted).sum();
    let _ = writeln!(text, "Wrote {total} paths to {}", out.display());
    text
}

pub fn peer_table(account: &AccountId, rows: &[PeerRow]) -> String {
    let mut text = format!("Peers of {account}:\n");
    if rows.is_empty() {
        text.push_str("  (none)\n");
    }
    for (rank, row) in rows.iter().enumerate() {
        let _ = writeln!(
            text,
            "{:>3}. {:<24} {:.4}  ({} items)",
            rank + 1,
            row.account.as_str(),
            row.similarity,
            row.items
        );
    }
    text
}

pub fn cluster_table(account: &AccountId, peer: &AccountId, rows: &[ClusterRow]) -> String {
    let mut text = format!("Clusters of {account} x {peer}:\n");
    let _ = writeln!(text, "{:>6}  {:<16} {:>7} {:>7}", "id", "category", "current", "peer");
    for row in rows {
        let _ = writeln!(
            text,
            "{:>6}  {:<16} {:>7} {:>7}",
            row.cluster_id, row.category, row.current_items, row.peer_items
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_skips_and_failures() {
        let reports = vec![RunReport::skipped(AccountId::from("dave"))];
        let failures = vec![AccountFailure {
            account: AccountId::from("bob"),
            error: "Path sink error: disk full".to_string(),
        }];
        let text = run_summary(&reports, &failures, Path::new("paths.jsonl"));
        assert!(text.contains("dave: skipped"));
        assert!(text.contains("bob: failed: Path sink error: disk full"));
        assert!(text.ends_with("Wrote 0 paths to paths.jsonl\n"));
    }

    #[test]
    fn peer_table_ranks_from_one() {
        let rows = vec![PeerRow {
            account: AccountId::from("bob"),
            similarity: 0.91234,
            items: 6,
        }];
        let text = peer_table(&AccountId::from("alice"), &rows);
        assert!(text.contains("  1. bob"));
        assert!(text.contains("0.9123"));
    }
}
