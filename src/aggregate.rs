use std::cmp::Ordering;
use std::collections::BTreeMap;

use camino::Utf8Path;
use tracing::{debug, warn};

use crate::descriptor::parse_descriptor_file;
use crate::discovery::discover;
use crate::domain::{CellMetadata, MultiplexPolicy, RunView};
use crate::error::RevioError;

/// Discovers, parses and groups every run under `root`, newest first.
///
/// Descriptors that fail to parse are skipped with a warning.
pub fn collect_runs(root: &Utf8Path, policy: MultiplexPolicy) -> Result<Vec<RunView>, RevioError> {
    let discovery = discover(root)?;

    let mut cells = Vec::with_capacity(discovery.descriptors.len());
    for path in &discovery.descriptors {
        match parse_descriptor_file(path, policy) {
            Ok(cell) => cells.push(cell),
            Err(err) => warn!(descriptor = %path, error = %err, "skipping descriptor"),
        }
    }

    let runs = aggregate(cells, discovery.pending);
    if runs.is_empty() {
        return Err(RevioError::NoRunsFound(root.to_owned()));
    }
    debug!(root = %root, runs = runs.len(), "aggregated runs");
    Ok(runs)
}

/// Groups cells by run name, merges in pending runs not already complete, and sorts the result.
pub fn aggregate(
    cells: impl IntoIterator<Item = CellMetadata>,
    pending: BTreeMap<String, RunView>,
) -> Vec<RunView> {
    let mut runs = BTreeMap::<String, RunView>::new();
    for cell in cells {
        match runs.get_mut(&cell.run_name) {
            Some(run) => run.push_cell(cell),
            None => {
                runs.insert(cell.run_name.clone(), RunView::from_cell(cell));
            }
        }
    }

    for (name, run) in pending {
        runs.entry(name).or_insert(run);
    }

    let mut runs = runs.into_values().collect::<Vec<_>>();
    sort_runs(&mut runs);
    runs
}

/// Newest started date first, then name descending.
///
/// Runs with a started date sort ahead of runs without one, rather than falling
/// back to the name for a dated/undated pair, which would not be a total order
/// across mixed lists. Dates are compared
/// on their digits only, so `2025-09-22T11:00:00Z` and `20250922` line up.
pub fn sort_runs(runs: &mut [RunView]) {
    runs.sort_by(compare_runs);
}

fn compare_runs(a: &RunView, b: &RunView) -> Ordering {
    let by_name = || b.name().cmp(a.name());
    match (a.started_date(), b.started_date()) {
        (Some(left), Some(right)) => date_key(right)
            .cmp(&date_key(left))
            .then_with(by_name),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => by_name(),
    }
}

fn date_key(date: &str) -> String {
    date.chars().filter(char::is_ascii_digit).collect()
}

/// Looks a run up by its exact name.
pub fn find_run<'a>(runs: &'a [RunView], name: &str) -> Result<&'a RunView, RevioError> {
    let run = runs
        .iter()
        .find(|run| run.name() == name)
        .ok_or_else(|| RevioError::RunNotFound(name.to_string()))?;
    ensure_processable(run)
}

/// Picks the run at a zero-based position of the ordered list.
pub fn select_index(runs: &[RunView], index: usize) -> Result<&RunView, RevioError> {
    let run = runs
        .get(index)
        .ok_or(RevioError::InvalidSelection(index))?;
    ensure_processable(run)
}

fn ensure_processable(run: &RunView) -> Result<&RunView, RevioError> {
    if run.is_pending() {
        return Err(RevioError::RunPending(run.name().to_string()));
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;
    use crate::domain::{RunStatus, SampleIdentity};

    fn cell(run: &str, path: &str, samples: &[&str], started: Option<&str>) -> CellMetadata {
        CellMetadata {
            run_name: run.to_string(),
            file_path: Utf8PathBuf::from(path),
            created_date: started.map(|date| format!("{date}-created")),
            started_date: started.map(str::to_string),
            well_sample_name: "WS".to_string(),
            samples: samples
                .iter()
                .map(|name| SampleIdentity::new(*name, None))
                .collect(),
            is_multiplex: false,
        }
    }

    fn names(runs: &[RunView]) -> Vec<&str> {
        runs.iter().map(RunView::name).collect()
    }

    #[test]
    fn groups_cells_by_run_name() {
        let runs = aggregate(
            vec![
                cell("R1", "/a", &["S1"], Some("2025-01-01")),
                cell("R2", "/b", &["S9"], Some("2025-02-01")),
                cell("R1", "/c", &["S1", "S2"], Some("2025-01-05")),
            ],
            BTreeMap::new(),
        );
        assert_eq!(names(&runs), vec!["R2", "R1"]);
        let r1 = &runs[1];
        assert_eq!(r1.cells().len(), 2);
        assert_eq!(r1.started_date(), Some("2025-01-01"));
        assert_eq!(r1.created_date(), Some("2025-01-01-created"));
        assert_eq!(r1.sample_count(), 2);
        assert_eq!(r1.status(), RunStatus::Complete);
    }

    #[test]
    fn completed_run_wins_over_pending() {
        let mut pending = BTreeMap::new();
        pending.insert("R1".to_string(), RunView::pending("R1", Some("20250101".to_string())));
        pending.insert("R0".to_string(), RunView::pending("R0", None));

        let runs = aggregate(vec![cell("R1", "/a", &["S1"], None)], pending);
        assert_eq!(runs.len(), 2);
        let r1 = runs.iter().find(|run| run.name() == "R1").unwrap();
        assert_eq!(r1.status(), RunStatus::Complete);
        assert_eq!(r1.cells().len(), 1);
    }

    #[test]
    fn ties_on_date_fall_back_to_name_descending() {
        let runs = aggregate(
            vec![
                cell("A", "/a", &["S"], Some("2025-01-01")),
                cell("C", "/c", &["S"], Some("2025-01-01")),
                cell("B", "/b", &["S"], Some("2025-01-01")),
            ],
            BTreeMap::new(),
        );
        assert_eq!(names(&runs), vec!["C", "B", "A"]);
    }

    #[test]
    fn undated_runs_sort_by_name_after_dated_ones() {
        let mut pending = BTreeMap::new();
        pending.insert("Z_pending".to_string(), RunView::pending("Z_pending", None));
        pending.insert(
            "r1_20250922_000000".to_string(),
            RunView::pending("r1_20250922_000000", Some("20250922".to_string())),
        );
        let runs = aggregate(
            vec![
                cell("old", "/o", &["S"], Some("2024-05-01T00:00:00Z")),
                cell("new", "/n", &["S"], Some("2025-10-01T00:00:00Z")),
                cell("nodate", "/x", &["S"], None),
            ],
            pending,
        );
        assert_eq!(
            names(&runs),
            vec!["new", "r1_20250922_000000", "old", "nodate", "Z_pending"]
        );
    }

    #[test]
    fn find_run_reports_missing_and_pending() {
        let mut pending = BTreeMap::new();
        pending.insert("P".to_string(), RunView::pending("P", None));
        let runs = aggregate(vec![cell("R1", "/a", &["S1"], None)], pending);

        assert_eq!(find_run(&runs, "R1").unwrap().name(), "R1");
        assert_matches!(find_run(&runs, "nope"), Err(RevioError::RunNotFound(_)));
        assert_matches!(find_run(&runs, "P"), Err(RevioError::RunPending(_)));
    }

    #[test]
    fn select_index_checks_bounds_and_status() {
        let mut pending = BTreeMap::new();
        pending.insert("P".to_string(), RunView::pending("P", Some("20990101".to_string())));
        let runs = aggregate(vec![cell("R1", "/a", &["S1"], None)], pending);

        assert_matches!(select_index(&runs, 0), Err(RevioError::RunPending(_)));
        assert_eq!(select_index(&runs, 1).unwrap().name(), "R1");
        assert_matches!(select_index(&runs, 2), Err(RevioError::InvalidSelection(2)));
    }
}
