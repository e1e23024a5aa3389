use audit_runtime::summary::RunSummary;

/// Prints the end-of-run summary block to stdout.
pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "=".repeat(60));
    println!("AUDIT SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Total jobs:    {}", summary.total);
    println!("Success:       {}", summary.success);
    println!("Partial:       {}", summary.partial);
    println!("Failed:        {}", summary.failed);
    if summary.sink_errors > 0 {
        println!("Write errors:  {}", summary.sink_errors);
    }
    if summary.cancelled {
        println!("Cancelled:     yes");
    }
    println!("{}", "=".repeat(60));

    if summary.details.is_empty() {
        return;
    }

    println!();
    println!("Details:");
    for detail in &summary.details {
        let icon = match detail.status.as_str() {
            "success" | "dry_run" => "+",
            "partial" => "o",
            _ => "x",
        };
        let rows = detail
            .row_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  {icon} {}: {} rows - {} ({})",
            detail.table_name, rows, detail.status, detail.hdfs_path
        );
    }
}
