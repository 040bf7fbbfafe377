//! CSV input and output for subject tables.
//!
//! Columns are addressed by header name. The id, treatment and outcome
//! columns come from the [`ColumnMap`]; covariate columns use
//! [`Covariate::column`]. Covariate columns absent from the header are simply
//! unobserved for every subject.

use anyhow::{Context, Result};
use ipw_core::{ColumnMap, Covariate, Dataset, Error, Stage, SubjectRecord};
use std::path::Path;

/// Cell values treated as missing.
const MISSING_TOKENS: [&str; 4] = ["", "NA", "NaN", "."];

fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(&cell.trim())
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
        Error::data(Stage::Loader, format!("required column `{}` not found in header", name)).into()
    })
}

fn parse_number(cell: &str, column: &str, row: usize) -> Result<f64> {
    let v: f64 = cell.trim().parse().map_err(|_| {
        Error::data(
            Stage::Loader,
            format!("row {}: column `{}` is not numeric: {:?}", row, column, cell),
        )
    })?;
    if !v.is_finite() {
        let msg = format!("row {}: column `{}` is not finite", row, column);
        return Err(Error::data(Stage::Loader, msg).into());
    }
    Ok(v)
}

fn parse_id(cell: &str, column: &str, row: usize) -> Result<u64> {
    if let Ok(id) = cell.trim().parse::<u64>() {
        return Ok(id);
    }
    let v = parse_number(cell, column, row)?;
    if v < 0.0 || v.fract() != 0.0 || v > u64::MAX as f64 {
        return Err(Error::data(
            Stage::Loader,
            format!(
                "row {}: id column `{}` must be a non-negative integer, got {}",
                row, column, cell
            ),
        )
        .into());
    }
    Ok(v as u64)
}

fn parse_treatment(cell: &str, column: &str, row: usize) -> Result<bool> {
    if is_missing(cell) {
        return Err(Error::data(
            Stage::Loader,
            format!("row {}: treatment column `{}` is missing", row, column),
        )
        .into());
    }
    let v = parse_number(cell, column, row)?;
    if v == 0.0 {
        Ok(false)
    } else if v == 1.0 {
        Ok(true)
    } else {
        Err(Error::data(
            Stage::Loader,
            format!("row {}: treatment column `{}` must be 0 or 1, got {}", row, column, v),
        )
        .into())
    }
}

/// Read a subject table from any CSV source.
///
/// Rows with a missing outcome are left out of the analytic sample.
pub fn read_dataset<R: std::io::Read>(reader: R, columns: &ColumnMap) -> Result<Dataset> {
    let mut rdr =
        csv::ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers().context("failed to read CSV header")?.clone();

    let id_col = column_index(&headers, &columns.id)?;
    let treat_col = column_index(&headers, &columns.treatment)?;
    let outcome_col = column_index(&headers, &columns.outcome)?;
    let covariate_cols: Vec<(Covariate, usize)> = Covariate::ALL
        .iter()
        .filter_map(|&c| headers.iter().position(|h| h == c.column()).map(|j| (c, j)))
        .collect();

    let mut records = Vec::new();
    let mut n_missing_outcome = 0usize;
    for (i, row) in rdr.records().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let row = row.with_context(|| format!("failed to read CSV row at line {}", line))?;
        let cell = |j: usize| row.get(j).unwrap_or("");

        let outcome_cell = cell(outcome_col);
        if is_missing(outcome_cell) {
            n_missing_outcome += 1;
            continue;
        }
        let id = parse_id(cell(id_col), &columns.id, line)?;
        let treated = parse_treatment(cell(treat_col), &columns.treatment, line)?;
        let outcome = parse_number(outcome_cell, &columns.outcome, line)?;

        let mut record = SubjectRecord::new(id, treated, outcome);
        for &(c, j) in &covariate_cols {
            let v = cell(j);
            if !is_missing(v) {
                record = record.with_covariate(c, parse_number(v, c.column(), line)?);
            }
        }
        records.push(record);
    }

    if n_missing_outcome > 0 {
        tracing::warn!(
            excluded = n_missing_outcome,
            column = %columns.outcome,
            "rows with missing outcome excluded from the analytic sample"
        );
    }
    tracing::info!(rows = records.len(), covariates = covariate_cols.len(), "subject table loaded");
    Ok(Dataset::new(records)?)
}

/// Read a subject table from a CSV file.
pub fn load_dataset(path: &Path, columns: &ColumnMap) -> Result<Dataset> {
    let file =
        std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_dataset(file, columns).with_context(|| format!("failed to load {}", path.display()))
}

/// Write `data` as CSV with the default NHEFS column names.
pub fn write_dataset(path: &Path, data: &Dataset) -> Result<()> {
    let columns = ColumnMap::default();
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut header =
        vec![columns.id.as_str(), columns.treatment.as_str(), columns.outcome.as_str()];
    header.extend(Covariate::ALL.iter().map(|c| c.column()));
    wtr.write_record(&header)?;

    for r in data.records() {
        let mut row =
            vec![r.id().to_string(), u8::from(r.treated()).to_string(), r.outcome().to_string()];
        row.extend(
            Covariate::ALL
                .iter()
                .map(|&c| r.covariate(c).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}
