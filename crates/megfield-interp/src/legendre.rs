// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Legendre coefficient tables for the multipole series.
//!
//! The sphere-model lead-field dot products reduce to truncated series of
//! (associated) Legendre terms evaluated at the cosine of the angle between
//! two integration points. Evaluating the recurrences for every point pair
//! is expensive, so the polynomial values are tabulated once on a dense
//! cos-angle grid over [-1, 1] and looked up during kernel evaluation.
//!
//! Two table variants exist:
//! - EEG: plain `P_n` values; the potential kernel only needs the
//!   polynomials themselves.
//! - MEG: `[P_n, P_n', P_n', P_n'']` per order, pre-expanded to four
//!   columns so the four field sums multiply straight through.
//!
//! Order 0 never contributes to either kernel, so column `n` of a table
//! holds order `n + 1`. A table built with a larger coefficient count is
//! always a strict prefix-extension of a smaller one.

use ndarray::{Array1, Array2, Array3};

use megfield_structures::Modality;

/// Default number of cos-angle intervals in a table.
pub const DEFAULT_N_INTERP: usize = 20_000;

/// How table values are produced at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Nearest grid bin (fast)
    Nearest,
    /// Linear interpolation between adjacent bins (accurate)
    Linear,
    /// Direct recurrence evaluation, bypassing the table entirely
    Exact,
}

/// Legendre polynomial values `P_0..P_{n_coeff-1}` at each of `xs`,
/// shape `(len(xs), n_coeff)`. Bonnet recurrence.
pub fn legendre_vander(xs: &[f64], n_coeff: usize) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((xs.len(), n_coeff));
    for (r, &x) in xs.iter().enumerate() {
        out[[r, 0]] = 1.0;
        if n_coeff > 1 {
            out[[r, 1]] = x;
        }
        for n in 2..n_coeff {
            let nf = n as f64;
            out[[r, n]] =
                ((2.0 * nf - 1.0) * x * out[[r, n - 1]] - (nf - 1.0) * out[[r, n - 2]]) / nf;
        }
    }
    out
}

/// `P_n`, `P_n'`, `P_n''` for orders `0..n_coeff` at each of `xs`,
/// shape `(len(xs), n_coeff, 3)`.
///
/// Derivative recurrences:
///   P_n'  = n P_{n-1}  + x P_{n-1}'
///   P_n'' = (n+1) P_{n-1}' + x P_{n-1}''
pub fn legendre_der(xs: &[f64], n_coeff: usize) -> Array3<f64> {
    let mut out = Array3::<f64>::zeros((xs.len(), n_coeff, 3));
    for (r, &x) in xs.iter().enumerate() {
        out[[r, 0, 0]] = 1.0;
        if n_coeff > 1 {
            out[[r, 1, 0]] = x;
            out[[r, 1, 1]] = 1.0;
        }
        for n in 2..n_coeff {
            let nf = n as f64;
            let (p1, p2) = (out[[r, n - 1, 0]], out[[r, n - 2, 0]]);
            let (d1, dd1) = (out[[r, n - 1, 1]], out[[r, n - 1, 2]]);
            out[[r, n, 0]] = ((2.0 * nf - 1.0) * x * p1 - (nf - 1.0) * p2) / nf;
            out[[r, n, 1]] = nf * p1 + x * d1;
            out[[r, n, 2]] = (nf + 1.0) * d1 + x * dd1;
        }
    }
    out
}

/// EEG table: `P_n` for orders `1..n_coeff` on the grid, with the series
/// normalization `(2n+1)^2 / n` per order.
#[derive(Debug, Clone)]
pub struct EegTable {
    /// Shape `(n_interp + 1, n_coeff - 1)`
    pub lut: Array2<f32>,
    /// Shape `(n_coeff - 1,)`
    pub n_fact: Array1<f64>,
    pub n_coeff: usize,
}

/// MEG table: `[P, P', P', P'']` for orders `1..n_coeff` on the grid, with
/// the four matched normalization columns
/// `[n(n+1)/(2n+1), n/(2n+1), n/((2n+1)(n+1)), n/((2n+1)(n+1))]`.
#[derive(Debug, Clone)]
pub struct MegTable {
    /// Shape `(n_interp + 1, n_coeff - 1, 4)`
    pub lut: Array3<f32>,
    /// Shape `(n_coeff - 1, 4)`
    pub n_fact: Array2<f64>,
    pub n_coeff: usize,
}

/// A coefficient table for one modality.
#[derive(Debug, Clone)]
pub enum LegendreTable {
    Eeg(EegTable),
    Meg(MegTable),
}

impl LegendreTable {
    pub fn modality(&self) -> Modality {
        match self {
            LegendreTable::Eeg(_) => Modality::Eeg,
            LegendreTable::Meg(_) => Modality::Meg,
        }
    }

    pub fn n_coeff(&self) -> usize {
        match self {
            LegendreTable::Eeg(t) => t.n_coeff,
            LegendreTable::Meg(t) => t.n_coeff,
        }
    }

    pub fn n_interp(&self) -> usize {
        match self {
            LegendreTable::Eeg(t) => t.lut.nrows() - 1,
            LegendreTable::Meg(t) => t.lut.shape()[0] - 1,
        }
    }
}

fn grid(n_interp: usize) -> Vec<f64> {
    (0..=n_interp)
        .map(|i| -1.0 + 2.0 * i as f64 / n_interp as f64)
        .collect()
}

/// Build the EEG table on `n_interp + 1` grid points.
pub fn build_eeg_table(n_coeff: usize, n_interp: usize) -> EegTable {
    let xs = grid(n_interp);
    let vander = legendre_vander(&xs, n_coeff);
    let mut lut = Array2::<f32>::zeros((xs.len(), n_coeff - 1));
    for r in 0..xs.len() {
        for n in 1..n_coeff {
            lut[[r, n - 1]] = vander[[r, n]] as f32;
        }
    }
    EegTable {
        lut,
        n_fact: eeg_n_fact(n_coeff),
        n_coeff,
    }
}

/// EEG series normalization `(2n+1)^2 / n` for orders `1..n_coeff`.
pub fn eeg_n_fact(n_coeff: usize) -> Array1<f64> {
    let mut n_fact = Array1::<f64>::zeros(n_coeff - 1);
    for (i, f) in n_fact.iter_mut().enumerate() {
        let n = (i + 1) as f64;
        *f = (2.0 * n + 1.0) * (2.0 * n + 1.0) / n;
    }
    n_fact
}

/// MEG normalization columns matched to the `[P, P', P', P'']` layout.
pub fn meg_n_fact(n_coeff: usize) -> Array2<f64> {
    let mut n_fact = Array2::<f64>::zeros((n_coeff - 1, 4));
    for i in 0..n_coeff - 1 {
        let n = (i + 1) as f64;
        let mult = n / (2.0 * n + 1.0);
        n_fact[[i, 0]] = mult * (n + 1.0);
        n_fact[[i, 1]] = mult;
        n_fact[[i, 2]] = mult / (n + 1.0);
        n_fact[[i, 3]] = mult / (n + 1.0);
    }
    n_fact
}

/// Build the MEG derivative table on `n_interp + 1` grid points.
pub fn build_meg_table(n_coeff: usize, n_interp: usize) -> MegTable {
    let xs = grid(n_interp);
    let der = legendre_der(&xs, n_coeff);
    // expand [P, P', P''] -> [P, P', P', P''] and drop order 0
    let mut lut = Array3::<f32>::zeros((xs.len(), n_coeff - 1, 4));
    for r in 0..xs.len() {
        for n in 1..n_coeff {
            lut[[r, n - 1, 0]] = der[[r, n, 0]] as f32;
            lut[[r, n - 1, 1]] = der[[r, n, 1]] as f32;
            lut[[r, n - 1, 2]] = der[[r, n, 1]] as f32;
            lut[[r, n - 1, 3]] = der[[r, n, 2]] as f32;
        }
    }
    MegTable {
        lut,
        n_fact: meg_n_fact(n_coeff),
        n_coeff,
    }
}

/// Build a table for the given modality.
pub fn build_table(modality: Modality, n_coeff: usize, n_interp: usize) -> LegendreTable {
    match modality {
        Modality::Eeg => LegendreTable::Eeg(build_eeg_table(n_coeff, n_interp)),
        Modality::Meg => LegendreTable::Meg(build_meg_table(n_coeff, n_interp)),
    }
}

/// Map `x` in [-1, 1] onto the table row index space `[0, n_rows - 1]`.
#[inline]
fn grid_coord(x: f64, n_rows: usize) -> f64 {
    let half = (n_rows - 1) as f64 / 2.0;
    x * half + half
}

impl EegTable {
    /// Fill `out` (length `n_coeff - 1`) with the coefficient row at `x`.
    pub fn coeffs_at(&self, x: f64, mode: EvalMode, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.n_coeff - 1);
        let rows = self.lut.nrows();
        match mode {
            EvalMode::Nearest => {
                let idx = grid_coord(x, rows).round() as usize;
                let idx = idx.min(rows - 1);
                for (o, v) in out.iter_mut().zip(self.lut.row(idx)) {
                    *o = *v as f64;
                }
            }
            EvalMode::Linear => {
                let mm = grid_coord(x, rows).min((rows - 1) as f64 - 1e-10).max(0.0);
                let idx = mm.floor() as usize;
                let w2 = mm - idx as f64;
                let (r0, r1) = (self.lut.row(idx), self.lut.row(idx + 1));
                for (i, o) in out.iter_mut().enumerate() {
                    *o = (1.0 - w2) * r0[i] as f64 + w2 * r1[i] as f64;
                }
            }
            EvalMode::Exact => {
                // P_1..P_{n_coeff-1} straight from the recurrence
                let (mut p_prev, mut p) = (1.0, x);
                out[0] = x;
                for n in 2..self.n_coeff {
                    let nf = n as f64;
                    let next = ((2.0 * nf - 1.0) * x * p - (nf - 1.0) * p_prev) / nf;
                    p_prev = p;
                    p = next;
                    out[n - 1] = p;
                }
            }
        }
    }
}

impl MegTable {
    /// Fill `out` (length `n_coeff - 1`) with `[P, P', P', P'']` rows at `x`.
    pub fn coeffs_at(&self, x: f64, mode: EvalMode, out: &mut [[f64; 4]]) {
        debug_assert_eq!(out.len(), self.n_coeff - 1);
        let rows = self.lut.shape()[0];
        match mode {
            EvalMode::Nearest => {
                let idx = (grid_coord(x, rows).round() as usize).min(rows - 1);
                for (n, o) in out.iter_mut().enumerate() {
                    for k in 0..4 {
                        o[k] = self.lut[[idx, n, k]] as f64;
                    }
                }
            }
            EvalMode::Linear => {
                let mm = grid_coord(x, rows).min((rows - 1) as f64 - 1e-10).max(0.0);
                let idx = mm.floor() as usize;
                let w2 = mm - idx as f64;
                for (n, o) in out.iter_mut().enumerate() {
                    for k in 0..4 {
                        o[k] = (1.0 - w2) * self.lut[[idx, n, k]] as f64
                            + w2 * self.lut[[idx + 1, n, k]] as f64;
                    }
                }
            }
            EvalMode::Exact => {
                let (mut p_prev, mut p) = (1.0, x);
                let (mut d, mut dd) = (1.0, 0.0);
                out[0] = [x, 1.0, 1.0, 0.0];
                for n in 2..self.n_coeff {
                    let nf = n as f64;
                    let p_next = ((2.0 * nf - 1.0) * x * p - (nf - 1.0) * p_prev) / nf;
                    let d_next = nf * p + x * d;
                    let dd_next = (nf + 1.0) * d + x * dd;
                    p_prev = p;
                    p = p_next;
                    d = d_next;
                    dd = dd_next;
                    out[n - 1] = [p, d, d, dd];
                }
            }
        }
    }
}
