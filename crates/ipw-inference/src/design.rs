//! Design matrices built from a [`Dataset`] and a list of [`Term`]s.
//!
//! A [`DesignSpec`] is learned once from the fitting data (categorical levels
//! are frozen at that point) and can then build matrices for any dataset with
//! the same schema, which is what prediction on new subjects needs.

use ipw_core::{Covariate, Dataset, Error, Result, Stage, Term};
use nalgebra::DMatrix;

/// Relative singular-value cutoff below which a design is treated as rank deficient.
const RANK_TOL: f64 = 1e-10;

/// Frozen recipe for turning records into regressor rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignSpec {
    terms: Vec<Term>,
    /// Sorted levels per term, reference first (empty for non-categorical terms).
    levels: Vec<Vec<f64>>,
    names: Vec<String>,
}

impl DesignSpec {
    /// Learn column layout (and categorical levels) from `data`.
    ///
    /// Every covariate a term refers to must be observed for every subject.
    pub fn learn(data: &Dataset, terms: &[Term], stage: Stage) -> Result<Self> {
        let mut levels = Vec::with_capacity(terms.len());
        let mut names = vec!["intercept".to_string()];
        for &term in terms {
            let c = term.covariate();
            let column = observed_column(data, c, stage)?;
            match term {
                Term::Linear(_) => {
                    names.push(c.column().to_string());
                    levels.push(Vec::new());
                }
                Term::Quadratic(_) => {
                    names.push(format!("{}^2", c.column()));
                    levels.push(Vec::new());
                }
                Term::Categorical(_) => {
                    let mut lv = column;
                    lv.sort_by(|a, b| a.total_cmp(b));
                    lv.dedup();
                    if lv.len() < 2 {
                        tracing::warn!(
                            covariate = %c,
                            "categorical term has a single level; no columns added"
                        );
                    }
                    // Lowest level is the reference category.
                    for v in lv.iter().skip(1) {
                        names.push(format!("{}={}", c.column(), v));
                    }
                    levels.push(lv);
                }
            }
        }
        Ok(Self { terms: terms.to_vec(), levels, names })
    }

    /// Column names, intercept first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns including the intercept.
    pub fn ncols(&self) -> usize {
        self.names.len()
    }

    /// Build the `n × ncols` design matrix for `data`.
    pub fn build(&self, data: &Dataset, stage: Stage) -> Result<DMatrix<f64>> {
        let n = data.len();
        let d = self.ncols();
        let mut x = DMatrix::zeros(n, d);
        for (i, rec) in data.records().iter().enumerate() {
            x[(i, 0)] = 1.0;
            let mut j = 1;
            for (term, lv) in self.terms.iter().zip(&self.levels) {
                let c = term.covariate();
                let v = rec.covariate(c).ok_or_else(|| missing(rec.id(), c, stage))?;
                match term {
                    Term::Linear(_) => {
                        x[(i, j)] = v;
                        j += 1;
                    }
                    Term::Quadratic(_) => {
                        x[(i, j)] = v * v;
                        j += 1;
                    }
                    Term::Categorical(_) => {
                        match lv.iter().position(|&l| l == v) {
                            Some(0) => {}
                            Some(k) => x[(i, j + k - 1)] = 1.0,
                            None => {
                                return Err(Error::data(
                                    stage,
                                    format!(
                                        "subject {} has level {} of `{}` unseen when the model was fit",
                                        rec.id(),
                                        v,
                                        c
                                    ),
                                ));
                            }
                        }
                        j += lv.len().saturating_sub(1);
                    }
                }
            }
            debug_assert_eq!(j, d);
        }
        Ok(x)
    }
}

fn missing(id: u64, c: Covariate, stage: Stage) -> Error {
    Error::data(stage, format!("subject {} is missing covariate `{}`", id, c))
}

fn observed_column(data: &Dataset, c: Covariate, stage: Stage) -> Result<Vec<f64>> {
    data.records()
        .iter()
        .map(|r| r.covariate(c).ok_or_else(|| missing(r.id(), c, stage)))
        .collect()
}

/// Fail with [`Error::SingularDesign`] unless `x` (rows scaled by `sqrt(w)`)
/// has full column rank.
///
/// Columns are normalised to unit length before the SVD.
pub fn ensure_full_rank(
    x: &DMatrix<f64>,
    weights: Option<&[f64]>,
    names: &[String],
    stage: Stage,
) -> Result<()> {
    let (n, d) = x.shape();
    if n < d {
        return Err(Error::singular(
            stage,
            format!("{} observations cannot identify {} coefficients", n, d),
        ));
    }
    let mut scaled = x.clone();
    if let Some(w) = weights {
        for (i, mut row) in scaled.row_iter_mut().enumerate() {
            row *= w[i].sqrt();
        }
    }
    for (j, mut col) in scaled.column_iter_mut().enumerate() {
        let norm = col.norm();
        if norm == 0.0 {
            let detail = format!("column `{}` is identically zero", names[j]);
            return Err(Error::singular(stage, detail));
        }
        col /= norm;
    }
    let sv = scaled.svd(false, false).singular_values;
    let max = sv.max();
    let min = sv.min();
    if !(min > RANK_TOL * max) {
        return Err(Error::singular(
            stage,
            format!(
                "design matrix is rank deficient (singular value ratio {:.3e}; columns: {})",
                min / max,
                names.join(", ")
            ),
        ));
    }
    Ok(())
}

/// `Σ wᵢ xᵢ xᵢᵀ`.
pub(crate) fn weighted_gram(x: &DMatrix<f64>, w: &[f64]) -> DMatrix<f64> {
    let xw = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] * w[i]);
    x.transpose() * xw
}
