//! Human-readable output for stderr: the failure report and the plan.

use apphost_engine::{DependencyGraph, EdgeStrength, RunReport, RunState, StartOutcome};
use std::fmt::Write;

/// Every failed resource with its cause, one per line, after a summary line.
/// Resources that did come up are only counted.
pub fn failure_report(report: &RunReport) -> String {
    let failed: Vec<_> = report.failed().collect();
    let mut out = format!("{} of {} resources failed:\n", failed.len(), report.len());
    for entry in &failed {
        match &entry.cause {
            Some(cause) => {
                let _ = writeln!(out, "  {}: {}", entry.name, cause);
            }
            None => {
                let _ = writeln!(out, "  {}: failed", entry.name);
            }
        }
    }
    let ready = report
        .entries()
        .iter()
        .filter(|e| e.state == RunState::Ready || e.state == RunState::Stopped)
        .count();
    if ready > 0 {
        let _ = writeln!(out, "{ready} other resources came up.");
    }
    out
}

/// One line per resource summarizing its state and how it came up.
pub fn status_lines(report: &RunReport) -> String {
    let width = report.entries().iter().map(|e| e.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for entry in report.entries() {
        let how = match entry.outcome {
            Some(StartOutcome::Attached) => " (attached)",
            _ => "",
        };
        let _ = writeln!(out, "  {:width$}  {}{}", entry.name, entry.state, how);
    }
    out
}

/// Start order with each resource's dependencies.
pub fn plan(graph: &DependencyGraph) -> String {
    let order = graph.topological_order();
    let width = order.iter().map(|name| name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (i, name) in order.iter().enumerate() {
        let deps = graph.dependencies(name);
        let of = |strength: EdgeStrength| {
            deps.iter()
                .filter(|(_, s)| *s == strength)
                .map(|(dep, _)| *dep)
                .collect::<Vec<_>>()
        };
        let mut line = format!("{:>3}. {:width$}", i + 1, name);
        for strength in [EdgeStrength::WaitFor, EdgeStrength::ReferenceOnly] {
            let names = of(strength);
            if !names.is_empty() {
                let _ = write!(line, "  {}: {}", strength, names.join(", "));
            }
        }
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use apphost_engine::{Registry, Resource, ResourceError, ReportEntry};

    fn entry(name: &str, state: RunState, cause: Option<ResourceError>) -> ReportEntry {
        ReportEntry {
            name: name.into(),
            state,
            outcome: None,
            cause,
            starting_at: None,
            ready_at: None,
        }
    }

    #[test]
    fn failure_report_lists_causes() {
        let report = RunReport::new(vec![
            entry(
                "p",
                RunState::Failed,
                Some(ResourceError::ReadinessTimeout { timeout_secs: 2.0 }),
            ),
            entry("r", RunState::Ready, None),
            entry(
                "q",
                RunState::Failed,
                Some(ResourceError::DependencyFailed {
                    dependency: "p".into(),
                }),
            ),
        ]);
        let text = failure_report(&report);
        assert!(text.starts_with("2 of 3 resources failed:\n"));
        assert!(text.contains("  p: Not ready after 2s\n"));
        assert!(text.contains("  q: Dependency 'p' failed\n"));
        assert!(!text.contains("  r:"));
    }

    #[test]
    fn plan_shows_edges_in_order() {
        let mut registry = Registry::new();
        registry.register(Resource::new("db", "settle")).unwrap();
        registry
            .register(Resource::new("app", "settle").wait_for("db").with_reference("cache"))
            .unwrap();
        registry.register(Resource::new("cache", "settle")).unwrap();
        let graph = DependencyGraph::build(&registry).unwrap();

        let text = plan(&graph);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "  1. db");
        assert_eq!(lines[1], "  2. cache");
        assert_eq!(lines[2], "  3. app    wait-for: db  reference: cache");
    }
}
