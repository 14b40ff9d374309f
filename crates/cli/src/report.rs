//! Final report rendering.

use pipeline::RunReport;

/// Renders the human-readable summary printed when a run ends.
pub fn render(report: &RunReport) -> String {
    let mut lines = vec![
        format!("Run {} finished: {}", report.run_id, report.termination),
        format!("  Estimated pending: {}", report.estimated_total),
        format!("  Succeeded:         {}", report.succeeded),
        format!("  Failed:            {}", report.failed),
    ];
    if report.skipped > 0 {
        lines.push(format!("  Not started:       {}", report.skipped));
    }
    lines.push(format!("  Pages processed:   {}", report.pages_processed));
    if report.is_nothing_to_do() {
        lines.push("Nothing to do.".to_string());
    }
    lines.join("\n")
}

pub fn render_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}
