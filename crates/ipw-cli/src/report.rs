//! Plain-text rendering of a pipeline report.

use ipw_inference::PipelineReport;
use std::fmt::Write;

/// Render `report` as the human-readable summary printed by `ipwstat run`.
pub fn render_text(report: &PipelineReport) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    write_report(&mut out, report)?;
    Ok(out)
}

fn write_report(out: &mut String, report: &PipelineReport) -> std::fmt::Result {
    let n_control = report.n_subjects - report.n_treated;
    writeln!(
        out,
        "Subjects: {} ({} treated, {} untreated)",
        report.n_subjects, report.n_treated, n_control
    )?;
    writeln!(out)?;

    writeln!(out, "== Crude (unweighted) estimate ==")?;
    write!(out, "{}", report.crude)?;
    writeln!(out)?;

    writeln!(out, "== {}", report.propensity_model)?;
    writeln!(out, "== Propensity scores by treatment group ==")?;
    write!(out, "{}", report.propensity_summary)?;
    writeln!(out)?;

    writeln!(out, "== Inverse-probability weights ({:?}) ==", report.weights.stabilization())?;
    write!(out, "{}", report.weight_summary)?;
    writeln!(out)?;

    writeln!(out, "== Covariate balance (standardized mean differences) ==")?;
    writeln!(
        out,
        "{:<16} {:>12} {:>12} {:>10} {:>10}",
        "covariate", "mean.treated", "mean.control", "smd.raw", "smd.ipw"
    )?;
    for b in &report.balance {
        writeln!(
            out,
            "{:<16} {:>12.4} {:>12.4} {:>10.4} {:>10.4}",
            b.covariate.column(),
            b.mean_treated,
            b.mean_control,
            b.smd_raw,
            b.smd_weighted
        )?;
    }
    writeln!(out)?;

    writeln!(out, "== IPW estimate ==")?;
    write!(out, "{}", report.ipw)
}
