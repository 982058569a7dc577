//! Fit and simulation summaries

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::pipeline::{DisplayBand, FitReport, RiskLevel, SimulationResult, StopReason};

fn section(icon: &str, title: &str) {
    println!();
    println!("    {} {}", style(icon).cyan(), style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

fn metric_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);
    table
}

/// Show the outcome of a fit: projection, segments, classifier training and
/// held-out evaluation.
pub fn display_fit_report(report: &FitReport) {
    section("📋", "FIT SUMMARY");

    let mut table = metric_table();
    table.add_row(vec![Cell::new("🆔 Fit ID"), Cell::new(&report.fit_id)]);
    table.add_row(vec![Cell::new("📁 Records"), Cell::new(report.records)]);
    table.add_row(vec![Cell::new("🧮 Features"), Cell::new(report.features.len())]);
    table.add_row(vec![
        Cell::new("📐 Components"),
        Cell::new(format!(
            "{} ({:.1}% variance)",
            report.projected_dims,
            report.retained_variance * 100.0
        )),
    ]);
    table.add_row(vec![
        Cell::new("🎯 Proxy positives"),
        Cell::new(format!("{:.1}%", report.positive_rate * 100.0)),
    ]);

    let training = &report.training;
    let (stop, stop_color) = match training.stop_reason {
        StopReason::Converged => ("converged", Color::Green),
        StopReason::MaxIterationsReached => ("max epochs reached", Color::Yellow),
    };
    table.add_row(vec![
        Cell::new("🧠 Training"),
        Cell::new(format!("{} epoch(s), {}", training.epochs, stop)).fg(stop_color),
    ]);
    table.add_row(vec![
        Cell::new("📉 Validation loss"),
        Cell::new(format!(
            "{:.4} (best {:.4})",
            training.final_validation_loss, training.best_validation_loss
        )),
    ]);

    let evaluation = &report.evaluation;
    let auc = evaluation
        .auc_roc
        .map(|auc| format!("{:.4}", auc))
        .unwrap_or_else(|| "n/a (one class)".to_string());
    table.add_row(vec![
        Cell::new("📈 AUC-ROC"),
        Cell::new(auc).add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("✅ Accuracy"),
        Cell::new(format!("{:.2}%", evaluation.accuracy * 100.0)),
    ]);
    table.add_row(vec![
        Cell::new("⚠️  False negative rate"),
        Cell::new(format!("{:.2}%", evaluation.false_negative_rate * 100.0)).fg(
            if evaluation.false_negative_rate > 0.2 {
                Color::Red
            } else {
                Color::White
            },
        ),
    ]);
    print_indented(&table);

    let confusion = &evaluation.confusion;
    println!();
    println!(
        "      {} TN={} FP={} FN={} TP={} {}",
        style("Confusion matrix:").dim(),
        confusion.true_negative,
        confusion.false_positive,
        confusion.false_negative,
        confusion.true_positive,
        style(format!("(n={})", evaluation.support)).dim()
    );

    section("🧩", "SEGMENTS");
    let mut segments = Table::new();
    segments.load_preset(UTF8_FULL_CONDENSED);
    segments.set_header(vec![
        Cell::new("Id").add_attribute(Attribute::Bold),
        Cell::new("Segment").add_attribute(Attribute::Bold),
        Cell::new("Records").add_attribute(Attribute::Bold),
    ]);
    for (id, (name, size)) in report
        .segment_names
        .iter()
        .zip(&report.segment_sizes)
        .enumerate()
    {
        segments.add_row(vec![Cell::new(id), Cell::new(name), Cell::new(size)]);
    }
    print_indented(&segments);

    if !report.warnings.is_empty() {
        println!();
        for warning in &report.warnings {
            println!("    {} {}", style("⚠").yellow().bold(), style(warning).yellow());
        }
    }
}

fn risk_color(level: RiskLevel) -> Color {
    match level {
        RiskLevel::Low => Color::Green,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::High => Color::Red,
    }
}

fn band_color(band: DisplayBand) -> Color {
    match band {
        DisplayBand::VeryLow | DisplayBand::Low => Color::Green,
        DisplayBand::Medium => Color::Yellow,
        DisplayBand::High => Color::Red,
    }
}

/// Show one simulated business.
pub fn display_simulation(result: &SimulationResult) {
    section("🔮", "WHAT-IF SIMULATION");

    let mut table = metric_table();
    table.add_row(vec![
        Cell::new("Probability of default"),
        Cell::new(format!("{:.4}", result.probability_of_default))
            .fg(risk_color(result.risk_level))
            .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("Risk level"),
        Cell::new(result.risk_level).fg(risk_color(result.risk_level)),
    ]);
    table.add_row(vec![
        Cell::new("PD band"),
        Cell::new(result.display_band).fg(band_color(result.display_band)),
    ]);
    table.add_row(vec![
        Cell::new("Segment"),
        Cell::new(format!("{} (#{})", result.segment_name, result.segment_id)),
    ]);
    table.add_row(vec![
        Cell::new("OD score"),
        Cell::new(format!("{:.2}", result.od_score)),
    ]);
    table.add_row(vec![
        Cell::new("Interest reduction"),
        if result.interest_eligible {
            Cell::new("eligible").fg(Color::Green)
        } else {
            Cell::new("not eligible").fg(Color::White)
        },
    ]);
    table.add_row(vec![
        Cell::new("Monthly profit"),
        Cell::new(format!("{:.0}", result.profit)),
    ]);
    table.add_row(vec![
        Cell::new("Profit margin"),
        Cell::new(format!("{:.1}%", result.profit_margin * 100.0)),
    ]);
    table.add_row(vec![
        Cell::new("Cash ratio"),
        Cell::new(format!("{:.2}", result.cash_ratio)),
    ]);
    print_indented(&table);
}
