// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Field-map construction: sensor data onto an arbitrary surface.
//!
//! The mapping operator is a minimum-norm combination of the dot
//! matrices: whiten the self-dots, invert them with a truncated
//! eigendecomposition, and multiply the surface-dots through. The result
//! is a dense `(n_vertices, n_channels)` operator applied to any new data
//! by plain matrix multiplication.

use std::str::FromStr;

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::{debug, info};

use megfield_structures::{
    create_eeg_electrodes, create_meg_coils, CoilDescriptor, FieldError, FieldResult, Modality,
    SensorInfo, SurfaceDescriptor, Transform,
};

use crate::cache::TableCache;
use crate::dots::{self_dots, surface_dots};
use crate::legendre::EvalMode;

/// Preset trade-off between speed and accuracy of the series evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// 50 coefficients, nearest-bin table lookup
    Fast,
    /// 100 coefficients, linear table interpolation
    Accurate,
    /// 100 coefficients, direct recurrence evaluation (no table error)
    Exact,
}

impl MappingMode {
    /// Coefficient count and evaluator for this preset.
    pub fn dot_params(self) -> (usize, EvalMode) {
        match self {
            MappingMode::Fast => (50, EvalMode::Nearest),
            MappingMode::Accurate => (100, EvalMode::Linear),
            MappingMode::Exact => (100, EvalMode::Exact),
        }
    }
}

impl FromStr for MappingMode {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(MappingMode::Fast),
            "accurate" => Ok(MappingMode::Accurate),
            "exact" => Ok(MappingMode::Exact),
            other => Err(FieldError::UnknownMode(other.to_string())),
        }
    }
}

/// Ad-hoc per-channel noise scales used for whitening, by sensor family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseScales {
    /// Magnetometers, in T
    pub mag: f64,
    /// Gradiometers, in T/m
    pub grad: f64,
    /// EEG electrodes, in V
    pub eeg: f64,
}

impl Default for NoiseScales {
    fn default() -> Self {
        Self {
            mag: 20e-15,
            grad: 5e-13,
            eeg: 1e-6,
        }
    }
}

/// Tunable parameters of the mapping construction.
///
/// The defaults reproduce the reference behavior; `miss` and `origin` are
/// deliberately exposed because no single value is "correct" for every
/// sensor layout.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingConfig {
    pub mode: MappingMode,
    /// Expansion origin in head coordinates (m)
    pub origin: [f64; 3],
    /// Integration radius of the expansion sphere (m)
    pub int_rad: f64,
    /// Allowed shortfall of retained eigenvalue mass in the truncated
    /// inverse; smaller keeps more components
    pub miss: f64,
    pub noise: NoiseScales,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            mode: MappingMode::Fast,
            origin: [0.0, 0.0, 0.04],
            int_rad: 0.006,
            miss: 1e-4,
            noise: NoiseScales::default(),
        }
    }
}

/// Dense linear operator from channel space onto a target geometry.
///
/// Stateless after construction: `apply` is a matrix multiply, so single
/// vectors, multi-sample blocks, and per-epoch stacks all go through the
/// same operator.
#[derive(Debug, Clone)]
pub struct FieldMap {
    pub kind: Modality,
    /// Channels the operator was built from, in order
    pub ch_names: Vec<String>,
    /// Target identity: surface id or virtual channel names
    pub target: MapTarget,
    pub origin: [f64; 3],
    /// Shape `(n_targets, n_channels)`
    pub data: Array2<f64>,
}

/// What a [`FieldMap`] projects onto.
#[derive(Debug, Clone)]
pub enum MapTarget {
    Surface(String),
    VirtualChannels(Vec<String>),
}

impl FieldMap {
    pub fn n_channels(&self) -> usize {
        self.data.ncols()
    }

    pub fn n_targets(&self) -> usize {
        self.data.nrows()
    }

    /// Project one per-channel sample vector.
    pub fn apply_vec(&self, data: ArrayView1<f64>) -> Array1<f64> {
        self.data.dot(&data)
    }

    /// Project a `(n_channels, n_samples)` block.
    pub fn apply(&self, data: ArrayView2<f64>) -> Array2<f64> {
        self.data.dot(&data)
    }

    /// Project a stack of per-epoch blocks. Linearity makes this
    /// interchangeable with projecting the average.
    pub fn apply_epochs(&self, epochs: &[Array2<f64>]) -> Vec<Array2<f64>> {
        epochs.iter().map(|e| self.apply(e.view())).collect()
    }
}

/// Per-channel whitening weights (inverse noise standard deviation).
pub(crate) fn whitener_for(coils: &[CoilDescriptor], noise: &NoiseScales) -> Array1<f64> {
    Array1::from_iter(coils.iter().map(|c| {
        let sigma = match c.modality() {
            Modality::Eeg => noise.eeg,
            Modality::Meg => {
                if c.coil_type.is_gradiometer() {
                    noise.grad
                } else {
                    noise.mag
                }
            }
        };
        1.0 / sigma
    }))
}

/// Minimum-norm combination of the dot matrices.
///
/// `self_dots` is whitened, inverted through a truncated symmetric
/// eigendecomposition (components kept until the retained eigenvalue mass
/// reaches `1 - miss`), un-whitened, and multiplied into `target_dots`.
pub(crate) fn compute_mapping_matrix(
    self_mat: &Array2<f64>,
    target_dots: &Array2<f64>,
    w: &Array1<f64>,
    miss: f64,
    average_ref: bool,
) -> Array2<f64> {
    info!("Preparing the mapping matrix...");
    let k = self_mat.nrows();
    let mut whitened = DMatrix::<f64>::zeros(k, k);
    for i in 0..k {
        for j in 0..k {
            whitened[(i, j)] = self_mat[[i, j]] * w[i] * w[j];
        }
    }

    let eig = SymmetricEigen::new(whitened);
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    // keep leading components until the retained spectrum mass is enough
    let total: f64 = order
        .iter()
        .map(|&i| eig.eigenvalues[i].max(0.0))
        .sum();
    let mut kept = Vec::new();
    let mut acc = 0.0;
    for &i in &order {
        let lam = eig.eigenvalues[i];
        if lam <= 0.0 {
            break;
        }
        kept.push(i);
        acc += lam;
        if acc >= (1.0 - miss) * total {
            break;
        }
    }
    debug!(
        n_kept = kept.len(),
        n_total = k,
        miss,
        "truncating the eigenvalue spectrum"
    );

    // inv = V diag(1/lambda) V^T over the kept components
    let mut inv = DMatrix::<f64>::zeros(k, k);
    for &ei in &kept {
        let lam = eig.eigenvalues[ei];
        let v = eig.eigenvectors.column(ei);
        for i in 0..k {
            for j in 0..k {
                inv[(i, j)] += v[i] * v[j] / lam;
            }
        }
    }

    // un-whiten and fold into the target dots
    let mut inv_unw = Array2::<f64>::zeros((k, k));
    for i in 0..k {
        for j in 0..k {
            inv_unw[[i, j]] = w[i] * inv[(i, j)] * w[j];
        }
    }
    let mut mapping = target_dots.dot(&inv_unw);

    if average_ref {
        info!("The map will have average electrode reference");
        for mut row in mapping.rows_mut() {
            let mean = row.sum() / row.len() as f64;
            row.mapv_inplace(|v| v - mean);
        }
    }
    mapping
}

/// Build the operator mapping good channels of `modality` onto `surf`.
///
/// The surface must carry vertex normals and a coordinate frame; if it is
/// not in head coordinates a transform to head must be supplied. At least
/// one good channel of the requested modality must remain after
/// bad-channel exclusion.
pub fn make_surface_mapping(
    info: &SensorInfo,
    surf: &SurfaceDescriptor,
    modality: Modality,
    trans: Option<&Transform>,
    config: &MappingConfig,
    cache: &mut TableCache,
) -> FieldResult<FieldMap> {
    let head_surf = surf.validated(trans)?;

    let picks = info.picks(modality);
    if picks.is_empty() {
        return Err(FieldError::NoChannels(modality));
    }
    let coils = match modality {
        Modality::Meg => {
            info!("Prepare MEG mapping...");
            create_meg_coils(info, &picks)?
        }
        Modality::Eeg => {
            info!("Prepare EEG mapping...");
            create_eeg_electrodes(info, &picks)?
        }
    };

    let (n_coeff, eval_mode) = config.mode.dot_params();
    let table = cache.get(modality, n_coeff, false)?;

    info!(n_coils = coils.len(), "Computing dot products for coils...");
    let self_mat = self_dots(
        config.int_rad,
        &coils,
        config.origin,
        modality,
        &table,
        eval_mode,
    )?;
    info!(
        n_vertices = head_surf.rr.nrows(),
        "Computing dot products for surface locations..."
    );
    let surf_mat = surface_dots(
        config.int_rad,
        &coils,
        &head_surf,
        config.origin,
        modality,
        &table,
        eval_mode,
    )?;

    let w = whitener_for(&coils, &config.noise);
    let data = compute_mapping_matrix(
        &self_mat,
        &surf_mat,
        &w,
        config.miss,
        modality == Modality::Eeg,
    );
    info!("Field mapping data ready");

    Ok(FieldMap {
        kind: modality,
        ch_names: info.names(&picks),
        target: MapTarget::Surface(head_surf.id),
        origin: config.origin,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mode_parse() {
        assert_eq!("fast".parse::<MappingMode>().unwrap(), MappingMode::Fast);
        assert_eq!(
            "accurate".parse::<MappingMode>().unwrap(),
            MappingMode::Accurate
        );
        let err = "foo".parse::<MappingMode>().unwrap_err();
        assert!(matches!(err, FieldError::UnknownMode(s) if s == "foo"));
    }

    #[test]
    fn test_mapping_matrix_inverts_identity() {
        // with identity self-dots and target = self, the operator is
        // (close to) the identity, no truncation possible
        let eye = Array2::<f64>::eye(4);
        let w = Array1::ones(4);
        let m = compute_mapping_matrix(&eye, &eye, &w, 1e-12, false);
        for i in 0..4 {
            for j in 0..4 {
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((m[[i, j]] - want).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_mapping_matrix_respects_whitener() {
        // scaling one channel's noise must not change the recovered
        // operator for a well-conditioned system
        let s = array![[2.0, 0.3], [0.3, 1.0]];
        let t = array![[1.0, 0.0], [0.0, 1.0]];
        let m1 = compute_mapping_matrix(&s, &t, &Array1::ones(2), 1e-12, false);
        let m2 = compute_mapping_matrix(&s, &t, &array![10.0, 0.1], 1e-12, false);
        for (a, b) in m1.iter().zip(m2.iter()) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_average_reference_rows_sum_to_zero() {
        let s = array![[1.5, 0.2, 0.1], [0.2, 1.1, 0.3], [0.1, 0.3, 0.9]];
        let t = array![[0.4, 0.5, 0.6], [1.0, -0.2, 0.1]];
        let m = compute_mapping_matrix(&s, &t, &Array1::ones(3), 1e-10, true);
        for row in m.rows() {
            assert!(row.sum().abs() < 1e-12);
        }
    }
}
