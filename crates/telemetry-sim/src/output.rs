//! Run report rendering

use colored::Colorize;
use telemetry_lib::ingest::IngestReport;
use telemetry_lib::RunReport;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Item")]
    item: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct IngestRow {
    #[tabled(rename = "Stream")]
    stream: String,
    #[tabled(rename = "Points")]
    total: u64,
    #[tabled(rename = "Written")]
    success: u64,
    #[tabled(rename = "Failed")]
    failed: u64,
    #[tabled(rename = "Abandoned")]
    abandoned: u64,
    #[tabled(rename = "Retries")]
    retries: u64,
    #[tabled(rename = "Success Rate")]
    success_rate: String,
    #[tabled(rename = "Points/s")]
    points_per_sec: String,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
    #[tabled(rename = "Stop")]
    stop: String,
}

impl From<&IngestReport> for IngestRow {
    fn from(report: &IngestReport) -> Self {
        Self {
            stream: report.stream.clone(),
            total: report.total_points,
            success: report.success_points,
            failed: report.failed_points,
            abandoned: report.abandoned_points,
            retries: report.retries,
            success_rate: color_rate(report.success_rate),
            points_per_sec: format!("{:.0}", report.points_per_sec),
            elapsed: format!("{:.1}s", report.elapsed.as_secs_f64()),
            stop: report.stop_reason.as_str().to_string(),
        }
    }
}

/// Print the final run summary
pub fn print_report(report: &RunReport) {
    let mut rows = vec![
        SummaryRow {
            item: "Run",
            value: report.run_id.clone(),
        },
        SummaryRow {
            item: "Entities",
            value: report.entities.to_string(),
        },
        SummaryRow {
            item: "Series",
            value: report.series.to_string(),
        },
        SummaryRow {
            item: "Sample points",
            value: report.samples.to_string(),
        },
        SummaryRow {
            item: "Log records",
            value: report.logs.to_string(),
        },
    ];

    if let Some(csv) = &report.csv {
        rows.push(SummaryRow {
            item: "CSV files",
            value: format!(
                "{} ({} metric, {} log)",
                csv.file_count(),
                csv.metric_files.len(),
                csv.log_files.len()
            ),
        });
    }
    rows.push(SummaryRow {
        item: "Elapsed",
        value: format!("{:.1}s", report.elapsed.as_secs_f64()),
    });

    println!("{}", Table::new(rows).with(Style::rounded()));

    let ingest: Vec<IngestRow> = [&report.metrics_ingest, &report.logs_ingest]
        .into_iter()
        .flatten()
        .map(IngestRow::from)
        .collect();
    if !ingest.is_empty() {
        println!("{}", Table::new(ingest).with(Style::rounded()));
    }

    for (category, reason) in &report.catalog_failures {
        print_warning(&format!("Catalog lookup failed for {category}: {reason}"));
    }
    for (entity, reason) in &report.entity_failures {
        print_warning(&format!("Entity {entity}: {reason}"));
    }

    if report.failed_points() > 0 {
        print_warning(&format!(
            "{} points permanently failed",
            report.failed_points()
        ));
    } else {
        print_success("Run completed");
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Color a success percentage
fn color_rate(rate: f64) -> String {
    let formatted = format!("{:.1}%", rate);
    if rate >= 99.9 {
        formatted.green().to_string()
    } else if rate >= 90.0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}
