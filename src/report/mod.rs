//! Console reporting
//!
//! Formats score tables, failures and search reports as plain strings and
//! draws true-vs-predicted scatter panels as text. Everything returns a
//! `String` so callers decide where it goes.

use crate::error::{Result, SurrogateError};
use crate::results::{default_ranking_metric, MeanScores, ModelScores, PredictionPanel};
use crate::runner::ModelFailure;
use crate::search::SearchReport;
use colored::*;

pub(crate) fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}

pub(crate) fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}

pub(crate) fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}

pub(crate) fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

/// Remove ANSI colour sequences
pub fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
            continue;
        }
        if in_escape {
            if c == 'm' {
                in_escape = false;
            }
            continue;
        }
        out.push(c);
    }
    out
}

const NAME_WIDTH: usize = 24;
const CELL_WIDTH: usize = 12;

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:>w$.4}", v, w = CELL_WIDTH),
        None => format!("{:>w$}", "-", w = CELL_WIDTH),
    }
}

fn header(first: &str, metrics: &[String]) -> String {
    let mut line = format!("  {}", muted(&format!("{:<w$}", first, w = NAME_WIDTH)));
    for metric in metrics {
        line.push_str(&muted(&format!("{:>w$}", metric, w = CELL_WIDTH)).to_string());
    }
    line
}

fn rule(metrics: usize) -> String {
    format!("  {}", dim(&"─".repeat(NAME_WIDTH + CELL_WIDTH * metrics)))
}

/// Mean score of every model, ranked by `r2` when scored, else by the first metric
pub fn format_mean_scores(scores: &MeanScores) -> String {
    if scores.is_empty() {
        return format!("  {}", dim("no scores recorded"));
    }
    let metrics = scores.metrics();
    let ranking = default_ranking_metric(metrics);
    let order: Vec<String> = match ranking {
        Some(metric) => scores.ranked_by(metric).into_iter().map(|(m, _)| m).collect(),
        None => scores.models().to_vec(),
    };

    let mut lines = vec![header("Model", metrics), rule(metrics.len())];
    for (rank, model) in order.iter().enumerate() {
        let name = format!("{:<w$}", model, w = NAME_WIDTH);
        let name = if rank == 0 {
            name.white().bold().to_string()
        } else {
            name
        };
        let cells: String = metrics.iter().map(|m| cell(scores.get(model, m))).collect();
        lines.push(format!("  {}{}", name, cells));
    }
    lines.push(rule(metrics.len()));
    if let (Some(best), Some(metric)) = (order.first(), ranking) {
        lines.push(format!(
            "  {} {} {}",
            ok("best"),
            best.white().bold(),
            muted(&format!("by mean {}", metric))
        ));
    }
    lines.join("\n")
}

/// Per-fold scores of one model with its mean and standard deviation
pub fn format_model_scores(scores: &ModelScores) -> String {
    let metrics = scores.metrics();
    let mut lines = vec![
        format!("  {}", scores.model().white().bold()),
        header("Fold", metrics),
        rule(metrics.len()),
    ];
    let rows = scores.rows();
    let n_folds = rows.len().saturating_sub(2);
    for (i, (label, cells)) in rows.into_iter().enumerate() {
        if i == n_folds {
            lines.push(rule(metrics.len()));
        }
        let label = format!("{:<w$}", label, w = NAME_WIDTH);
        let label = if i >= n_folds {
            muted(&label).to_string()
        } else {
            label
        };
        let cells: String = cells.into_iter().map(cell).collect();
        lines.push(format!("  {}{}", label, cells));
    }
    lines.join("\n")
}

/// Models dropped from a run, one per line
pub fn format_failures(failures: &[ModelFailure]) -> String {
    failures
        .iter()
        .map(|f| {
            let fold = f.fold.map(|k| format!(" fold {}", k)).unwrap_or_default();
            format!(
                "  {} {}{} {}",
                "✗".red(),
                f.model.white(),
                muted(&fold),
                dim(&f.reason)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Best configuration and trial count of a search
pub fn format_search_report(report: &SearchReport) -> String {
    format!(
        "  {} {} {}\n  {:<10}{}\n  {:<10}{:.4} {}",
        accent("›"),
        report.model.white().bold(),
        muted(&format!("{} search, {} trials", report.strategy, report.trials.len())),
        muted("params"),
        report.best_params,
        muted(&report.metric),
        report.best_score,
        dim("(cv mean)")
    )
}

/// Draw one output column of a panel as a text scatter plot.
///
/// True values run along x, predictions along y; `.` marks the diagonal
/// where a perfect emulator would sit, `*` a test point and `#` several
/// points in one cell.
pub fn render_scatter(panel: &PredictionPanel, output: usize, width: usize, height: usize) -> Result<String> {
    if output >= panel.y_true.ncols() || output >= panel.y_pred.ncols() {
        return Err(SurrogateError::DataValidation(format!(
            "output {} out of range for {} output column(s)",
            output,
            panel.y_true.ncols()
        )));
    }
    let width = width.max(10);
    let height = height.max(5);

    let truth = panel.y_true.column(output);
    let pred = panel.y_pred.column(output);
    let (mut lo, mut hi) = truth
        .iter()
        .chain(pred.iter())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        lo = 0.0;
        hi = 1.0;
    }
    if hi - lo < 1e-12 {
        hi = lo + 1.0;
    }

    let to_col = |v: f64| (((v - lo) / (hi - lo)) * (width - 1) as f64).round() as usize;
    let to_row = |v: f64| height - 1 - (((v - lo) / (hi - lo)) * (height - 1) as f64).round() as usize;

    let mut grid = vec![vec![' '; width]; height];
    for c in 0..width {
        let v = lo + (hi - lo) * c as f64 / (width - 1) as f64;
        grid[to_row(v)][c] = '.';
    }
    for (&t, &p) in truth.iter().zip(pred.iter()) {
        let (r, c) = (to_row(p).min(height - 1), to_col(t).min(width - 1));
        grid[r][c] = match grid[r][c] {
            '*' | '#' => '#',
            _ => '*',
        };
    }

    let mut lines = vec![format!(
        "  {} {}",
        panel.model.white().bold(),
        muted(&format!("fold {}, output {}", panel.fold, output))
    )];
    let label_w = 10;
    for (r, row) in grid.iter().enumerate() {
        let label = if r == 0 {
            format!("{:>w$.3}", hi, w = label_w)
        } else if r == height - 1 {
            format!("{:>w$.3}", lo, w = label_w)
        } else {
            " ".repeat(label_w)
        };
        let body: String = row.iter().collect();
        lines.push(format!("  {} {}{}", muted(&label), dim("│"), body));
    }
    lines.push(format!("  {} {}{}", " ".repeat(label_w), dim("└"), dim(&"─".repeat(width))));
    lines.push(format!(
        "  {} {:<w$.3}{:>r$.3}",
        " ".repeat(label_w + 1),
        lo,
        hi,
        w = width / 2,
        r = width - width / 2
    ));
    lines.push(format!(
        "  {}",
        muted(&format!("x: true, y: predicted, {} points", truth.len()))
    ));
    if let Some(std) = &panel.y_std {
        if output < std.ncols() && std.nrows() > 0 {
            let mean_std = std.column(output).mean().unwrap_or(0.0);
            lines.push(format!("  {}", muted(&format!("mean predictive std {:.4}", mean_std))));
        }
    }
    Ok(lines.join("\n"))
}
