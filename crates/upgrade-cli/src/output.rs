use serde::Serialize;
use upgrade_core::report::{Outcome, UpgradeReport};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    for line in render_table(headers, &rows) {
        println!("{line}");
    }
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let format_row = |cells: Vec<String>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(headers.iter().map(|h| h.to_string()).collect()));
    lines.push(format_row(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        lines.push(format_row(row.clone()));
    }
    lines
}

/// Human-readable run summary on stdout.
pub fn print_report(report: &UpgradeReport) {
    let outcome = match report.outcome {
        Some(Outcome::Upgraded) => "upgraded",
        Some(Outcome::Staged) => "staged (service untouched)",
        None => "incomplete",
    };
    println!("Deployment:  {}", report.deployment.display());
    println!(
        "Version:     {} -> {}",
        report.from_version.as_deref().unwrap_or("unknown"),
        report.to_version.as_deref().unwrap_or("unknown")
    );
    println!("Outcome:     {outcome}");
    println!(
        "Migrations:  {}",
        yes_no(report.plan.migrations_needed, report.migrations_applied)
    );
    println!(
        "Puppet:      {}",
        yes_no(report.plan.puppet_changes_pending, report.puppet_applied)
    );
    println!();

    let rows = report
        .steps
        .iter()
        .map(|s| {
            vec![
                s.step.to_string(),
                s.exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "background".to_string()),
                format!("{}ms", s.duration_ms),
                s.command.clone(),
            ]
        })
        .collect();
    print_table(&["STEP", "EXIT", "TIME", "COMMAND"], rows);

    if let Some(diff) = &report.unapplied_puppet_diff {
        println!();
        println!("Unapplied configuration changes:");
        print!("{diff}");
        if !diff.ends_with('\n') {
            println!();
        }
    }
}

fn yes_no(needed: bool, applied: bool) -> &'static str {
    match (needed, applied) {
        (false, _) => "none pending",
        (true, true) => "applied",
        (true, false) => "pending, not applied",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_columns_are_aligned() {
        let rows = vec![
            vec!["stop_server".to_string(), "0".to_string()],
            vec!["apply_migrations".to_string(), "1".to_string()],
        ];
        let lines = render_table(&["STEP", "EXIT"], &rows);
        assert_eq!(lines[0], "STEP              EXIT");
        assert_eq!(lines[1], "----------------  ----");
        assert_eq!(lines[2], "stop_server       0");
        assert_eq!(lines[3], "apply_migrations  1");
    }

    #[test]
    fn summary_wording() {
        assert_eq!(yes_no(false, false), "none pending");
        assert_eq!(yes_no(true, true), "applied");
        assert_eq!(yes_no(true, false), "pending, not applied");
    }
}
