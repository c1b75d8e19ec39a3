// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Lead-field dot products in the sphere model.
//!
//! For two sensors approximated by weighted integration points, the mutual
//! lead-field "dot" is a double sum over point pairs of a Green's-function
//! series evaluated at the angle between the points as seen from the
//! expansion origin. The series coefficients come from the cached
//! Legendre tables; the relative radius `beta = r^2 / (l1 l2)` weights the
//! terms.
//!
//! The matrices built here are the raw material of every mapping operator:
//! self-dots within the recording array, cross-dots against a virtual
//! array, surface-dots against a target mesh (each vertex treated as an
//! idealized point sensor oriented along the vertex normal).

use ndarray::Array2;
use rayon::prelude::*;
use tracing::warn;

use megfield_structures::{CoilDescriptor, FieldError, FieldResult, HeadSurface, Modality};

use crate::legendre::{EvalMode, LegendreTable};

// EEG: potential kernel scale, 1 / 4 pi
const EEG_CONST: f64 = 1.0 / (4.0 * std::f64::consts::PI);
// MEG: mu_0^2 / 4 pi in the unit system of the coil definitions
const MEG_CONST: f64 = 4.0e-14 * std::f64::consts::PI;

// EEG electrodes sit on the scalp; the potential series converges best
// with a tighter expansion sphere than the MEG coils need.
const EEG_RADIUS_SCALE: f64 = 0.7;

/// A coil re-expressed relative to the expansion origin: unit position
/// vectors, their lengths, sensing directions, and weights.
struct PreparedCoil {
    /// Unit vectors, `(n_int, 3)` flattened
    rr: Vec<[f64; 3]>,
    /// Distances from origin, `(n_int,)`
    len: Vec<f64>,
    cosmag: Vec<[f64; 3]>,
    w: Vec<f64>,
}

fn prepare_coils(coils: &[CoilDescriptor], origin: [f64; 3], int_rad: f64) -> Vec<PreparedCoil> {
    let mut too_close = 0usize;
    let prepared = coils
        .iter()
        .map(|coil| {
            let n = coil.n_int();
            let mut rr = Vec::with_capacity(n);
            let mut len = Vec::with_capacity(n);
            let mut cosmag = Vec::with_capacity(n);
            let mut w = Vec::with_capacity(n);
            for k in 0..n {
                let d = [
                    coil.rmag[[k, 0]] - origin[0],
                    coil.rmag[[k, 1]] - origin[1],
                    coil.rmag[[k, 2]] - origin[2],
                ];
                let l = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
                if l <= int_rad {
                    too_close += 1;
                }
                rr.push([d[0] / l, d[1] / l, d[2] / l]);
                len.push(l);
                cosmag.push([coil.cosmag[[k, 0]], coil.cosmag[[k, 1]], coil.cosmag[[k, 2]]]);
                w.push(coil.w[k]);
            }
            PreparedCoil { rr, len, cosmag, w }
        })
        .collect();
    if too_close > 0 {
        warn!(
            n_points = too_close,
            int_rad, "integration points inside the expansion radius; series may not converge"
        );
    }
    prepared
}

#[inline]
fn dot3(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// EEG pair sum: `sum_n (2n+1)^2/n beta^n P_n(ctheta)`.
fn comp_sum_eeg(beta: f64, ctheta: f64, table: &LegendreTable, mode: EvalMode, scratch: &mut [f64]) -> f64 {
    let LegendreTable::Eeg(t) = table else {
        unreachable!("EEG kernel called with MEG table");
    };
    t.coeffs_at(ctheta, mode, scratch);
    let mut bn = 1.0;
    let mut s = 0.0;
    for (c, f) in scratch.iter().zip(t.n_fact.iter()) {
        bn *= beta;
        s += c * bn * f;
    }
    s
}

/// MEG pair sums, weights `beta^(n+1)`:
/// `[ n(n+1)/(2n+1) P_n, n/(2n+1) P_n', n/((2n+1)(n+1)) P_n',
///    n/((2n+1)(n+1)) P_n'' ]`.
fn comp_sums_meg(
    beta: f64,
    ctheta: f64,
    table: &LegendreTable,
    mode: EvalMode,
    scratch: &mut [[f64; 4]],
) -> [f64; 4] {
    let LegendreTable::Meg(t) = table else {
        unreachable!("MEG kernel called with EEG table");
    };
    t.coeffs_at(ctheta, mode, scratch);
    let mut bn = beta;
    let mut sums = [0.0; 4];
    for (n, c) in scratch.iter().enumerate() {
        bn *= beta;
        for k in 0..4 {
            sums[k] += c[k] * t.n_fact[[n, k]] * bn;
        }
    }
    sums
}

/// Integration over one pair of prepared coils.
fn sphere_dot(
    int_rad: f64,
    c1: &PreparedCoil,
    c2: &PreparedCoil,
    modality: Modality,
    table: &LegendreTable,
    mode: EvalMode,
    eeg_scratch: &mut [f64],
    meg_scratch: &mut [[f64; 4]],
) -> f64 {
    let r2 = int_rad * int_rad;
    let mut result = 0.0;
    for i in 0..c1.len.len() {
        let u1 = c1.rr[i];
        let l1 = c1.len[i];
        let m1 = c1.cosmag[i];
        for j in 0..c2.len.len() {
            let u2 = c2.rr[j];
            let lr = l1 * c2.len[j];
            let beta = r2 / lr;
            let ctheta = dot3(u1, u2).clamp(-1.0, 1.0);
            let ww = c1.w[i] * c2.w[j];
            match modality {
                Modality::Eeg => {
                    let s = comp_sum_eeg(beta, ctheta, table, mode, eeg_scratch);
                    result += ww * s * EEG_CONST / lr;
                }
                Modality::Meg => {
                    let m2 = c2.cosmag[j];
                    let sums = comp_sums_meg(beta, ctheta, table, mode, meg_scratch);
                    let n1c1 = dot3(m1, u1);
                    let n1c2 = dot3(m1, u2);
                    let n2c1 = dot3(m2, u1);
                    let n2c2 = dot3(m2, u2);
                    let n1n2 = dot3(m1, m2);
                    let part1 = ctheta * n1c1 * n2c2;
                    let part2 = n1c1 * n2c1;
                    let part3 = n1c2 * n2c2;
                    let res = n1c1 * n2c2 * sums[0]
                        + (2.0 * part1 - part2 - part3) * sums[1]
                        + (n1n2 + part1 - part2 - part3) * sums[2]
                        + (n1c2 - ctheta * n1c1) * (n2c1 - ctheta * n2c2) * sums[3];
                    result += ww * res * MEG_CONST / lr;
                }
            }
        }
    }
    result
}

fn scratch_len(table: &LegendreTable) -> usize {
    table.n_coeff() - 1
}

fn effective_radius(int_rad: f64, modality: Modality) -> f64 {
    match modality {
        Modality::Eeg => int_rad * EEG_RADIUS_SCALE,
        Modality::Meg => int_rad,
    }
}

/// Symmetric dot matrix within one coil set, `(n, n)`.
pub fn self_dots(
    int_rad: f64,
    coils: &[CoilDescriptor],
    origin: [f64; 3],
    modality: Modality,
    table: &LegendreTable,
    mode: EvalMode,
) -> FieldResult<Array2<f64>> {
    let int_rad = effective_radius(int_rad, modality);
    let prepared = prepare_coils(coils, origin, int_rad);
    let n = prepared.len();
    let nc = scratch_len(table);
    // lower triangle row by row, parallel over rows
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut eeg_scratch = vec![0.0; nc];
            let mut meg_scratch = vec![[0.0; 4]; nc];
            (0..=i)
                .map(|j| {
                    sphere_dot(
                        int_rad,
                        &prepared[i],
                        &prepared[j],
                        modality,
                        table,
                        mode,
                        &mut eeg_scratch,
                        &mut meg_scratch,
                    )
                })
                .collect()
        })
        .collect();
    let mut out = Array2::<f64>::zeros((n, n));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            out[[i, j]] = v;
            out[[j, i]] = v;
        }
    }
    Ok(out)
}

/// Rectangular dot matrix between two coil sets, `(n_a, n_b)`.
/// `cross_dots(a, b)` equals `cross_dots(b, a)` transposed.
pub fn cross_dots(
    int_rad: f64,
    coils_a: &[CoilDescriptor],
    coils_b: &[CoilDescriptor],
    origin: [f64; 3],
    modality: Modality,
    table: &LegendreTable,
    mode: EvalMode,
) -> FieldResult<Array2<f64>> {
    let int_rad = effective_radius(int_rad, modality);
    let pa = prepare_coils(coils_a, origin, int_rad);
    let pb = prepare_coils(coils_b, origin, int_rad);
    let nc = scratch_len(table);
    let rows: Vec<Vec<f64>> = (0..pa.len())
        .into_par_iter()
        .map(|i| {
            let mut eeg_scratch = vec![0.0; nc];
            let mut meg_scratch = vec![[0.0; 4]; nc];
            pb.iter()
                .map(|b| {
                    sphere_dot(
                        int_rad,
                        &pa[i],
                        b,
                        modality,
                        table,
                        mode,
                        &mut eeg_scratch,
                        &mut meg_scratch,
                    )
                })
                .collect()
        })
        .collect();
    let mut out = Array2::<f64>::zeros((pa.len(), pb.len()));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    Ok(out)
}

/// Dot matrix between surface vertices and a coil set, `(n_vertices, n)`.
///
/// Each vertex acts as an idealized unit-weight point sensor oriented
/// along its normal. A vertex inside the expansion sphere puts the series
/// outside its convergence domain and is rejected.
pub fn surface_dots(
    int_rad: f64,
    coils: &[CoilDescriptor],
    surf: &HeadSurface,
    origin: [f64; 3],
    modality: Modality,
    table: &LegendreTable,
    mode: EvalMode,
) -> FieldResult<Array2<f64>> {
    let int_rad = effective_radius(int_rad, modality);
    let prepared = prepare_coils(coils, origin, int_rad);
    let nc = scratch_len(table);
    let n_vert = surf.rr.nrows();
    let mut verts = Vec::with_capacity(n_vert);
    for v in 0..n_vert {
        let d = [
            surf.rr[[v, 0]] - origin[0],
            surf.rr[[v, 1]] - origin[1],
            surf.rr[[v, 2]] - origin[2],
        ];
        let l = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        if l <= int_rad {
            return Err(FieldError::ExpansionDomain {
                point_radius: l,
                int_rad,
            });
        }
        verts.push(PreparedCoil {
            rr: vec![[d[0] / l, d[1] / l, d[2] / l]],
            len: vec![l],
            cosmag: vec![[surf.nn[[v, 0]], surf.nn[[v, 1]], surf.nn[[v, 2]]]],
            w: vec![1.0],
        });
    }
    let rows: Vec<Vec<f64>> = (0..n_vert)
        .into_par_iter()
        .map(|v| {
            let mut eeg_scratch = vec![0.0; nc];
            let mut meg_scratch = vec![[0.0; 4]; nc];
            prepared
                .iter()
                .map(|c| {
                    sphere_dot(
                        int_rad,
                        &verts[v],
                        c,
                        modality,
                        table,
                        mode,
                        &mut eeg_scratch,
                        &mut meg_scratch,
                    )
                })
                .collect()
        })
        .collect();
    let mut out = Array2::<f64>::zeros((n_vert, prepared.len()));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legendre::build_table;
    use megfield_structures::{
        ChannelInfo, ChannelKind, ChannelLoc, CoilType, CoordFrame, SensorInfo, Transform,
    };

    fn meg_info(n: usize) -> SensorInfo {
        // ring of magnetometers above the origin
        let channels = (0..n)
            .map(|i| {
                let phi = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                ChannelInfo {
                    name: format!("MEG {i:03}"),
                    kind: ChannelKind::Meg,
                    coil_type: CoilType::Magnetometer,
                    loc: Some(ChannelLoc::axis_aligned([
                        0.09 * phi.cos(),
                        0.09 * phi.sin(),
                        0.11,
                    ])),
                }
            })
            .collect();
        SensorInfo {
            channels,
            dev_head_t: Some(Transform::identity(CoordFrame::Device, CoordFrame::Head)),
            bads: vec![],
        }
    }

    fn meg_coils(n: usize) -> Vec<CoilDescriptor> {
        let info = meg_info(n);
        let picks: Vec<usize> = (0..n).collect();
        megfield_structures::create_meg_coils(&info, &picks).unwrap()
    }

    const ORIGIN: [f64; 3] = [0.0, 0.0, 0.04];

    #[test]
    fn test_self_dots_symmetric_positive_diagonal() {
        let coils = meg_coils(6);
        let table = build_table(Modality::Meg, 30, 2000);
        let d = self_dots(0.006, &coils, ORIGIN, Modality::Meg, &table, EvalMode::Linear).unwrap();
        assert_eq!(d.shape(), &[6, 6]);
        for i in 0..6 {
            assert!(d[[i, i]] > 0.0, "diagonal {} = {}", i, d[[i, i]]);
            for j in 0..6 {
                assert!((d[[i, j]] - d[[j, i]]).abs() < 1e-12 * d[[i, i]].abs());
            }
        }
    }

    #[test]
    fn test_cross_dots_transpose_symmetry() {
        let coils = meg_coils(7);
        let (a, b) = coils.split_at(3);
        let table = build_table(Modality::Meg, 30, 2000);
        let ab = cross_dots(0.006, a, b, ORIGIN, Modality::Meg, &table, EvalMode::Linear).unwrap();
        let ba = cross_dots(0.006, b, a, ORIGIN, Modality::Meg, &table, EvalMode::Linear).unwrap();
        assert_eq!(ab.shape(), &[3, 4]);
        for i in 0..3 {
            for j in 0..4 {
                let (x, y) = (ab[[i, j]], ba[[j, i]]);
                assert!((x - y).abs() <= 1e-10 * x.abs().max(y.abs()).max(1e-30));
            }
        }
    }

    #[test]
    fn test_cross_dots_of_set_with_itself_equals_self_dots() {
        let coils = meg_coils(5);
        let table = build_table(Modality::Meg, 25, 2000);
        let s = self_dots(0.006, &coils, ORIGIN, Modality::Meg, &table, EvalMode::Nearest).unwrap();
        let c = cross_dots(
            0.006,
            &coils,
            &coils,
            ORIGIN,
            Modality::Meg,
            &table,
            EvalMode::Nearest,
        )
        .unwrap();
        for i in 0..5 {
            for j in 0..5 {
                assert!((s[[i, j]] - c[[i, j]]).abs() <= 1e-12 * s[[i, i]].abs());
            }
        }
    }

    #[test]
    fn test_eval_modes_agree_to_tolerance() {
        let coils = meg_coils(4);
        let table = build_table(Modality::Meg, 40, 20_000);
        let fast =
            self_dots(0.006, &coils, ORIGIN, Modality::Meg, &table, EvalMode::Nearest).unwrap();
        let exact =
            self_dots(0.006, &coils, ORIGIN, Modality::Meg, &table, EvalMode::Exact).unwrap();
        let scale = exact
            .iter()
            .fold(0.0f64, |m, v| m.max(v.abs()));
        for (f, e) in fast.iter().zip(exact.iter()) {
            assert!((f - e).abs() < 1e-2 * scale, "{f} vs {e}");
        }
    }

    #[test]
    fn test_surface_vertex_inside_expansion_sphere_is_rejected() {
        let coils = meg_coils(3);
        let table = build_table(Modality::Meg, 20, 1000);
        // one vertex sits 1 mm from the origin, inside the 6 mm sphere
        let surf = megfield_structures::HeadSurface {
            id: "head".to_string(),
            rr: ndarray::array![[0.0, 0.0, 0.1], [ORIGIN[0], ORIGIN[1], ORIGIN[2] + 0.001]],
            nn: ndarray::array![[0.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
        };
        let err = surface_dots(
            0.006,
            &coils,
            &surf,
            ORIGIN,
            Modality::Meg,
            &table,
            EvalMode::Nearest,
        )
        .unwrap_err();
        assert!(matches!(err, FieldError::ExpansionDomain { .. }));
    }

    #[test]
    fn test_eeg_pair_sum_matches_direct_series() {
        // two point electrodes; the kernel must equal the series evaluated
        // term by term from an independent Vandermonde expansion
        let p1 = [0.03, 0.0, 0.11];
        let p2 = [0.0, 0.05, 0.09];
        let channels = [p1, p2]
            .iter()
            .enumerate()
            .map(|(i, &pos)| ChannelInfo {
                name: format!("EEG {i:03}"),
                kind: ChannelKind::Eeg,
                coil_type: CoilType::EegElectrode,
                loc: Some(ChannelLoc::axis_aligned(pos)),
            })
            .collect();
        let info = SensorInfo {
            channels,
            dev_head_t: None,
            bads: vec![],
        };
        let els = megfield_structures::create_eeg_electrodes(&info, &[0, 1]).unwrap();
        let n_coeff = 60;
        let table = build_table(Modality::Eeg, n_coeff, 2000);
        let d = self_dots(0.006, &els, ORIGIN, Modality::Eeg, &table, EvalMode::Exact).unwrap();

        let int_rad = 0.006 * EEG_RADIUS_SCALE;
        let d1 = [p1[0] - ORIGIN[0], p1[1] - ORIGIN[1], p1[2] - ORIGIN[2]];
        let d2 = [p2[0] - ORIGIN[0], p2[1] - ORIGIN[1], p2[2] - ORIGIN[2]];
        let l1 = dot3(d1, d1).sqrt();
        let l2 = dot3(d2, d2).sqrt();
        let ctheta = (dot3(d1, d2) / (l1 * l2)).clamp(-1.0, 1.0);
        let beta = int_rad * int_rad / (l1 * l2);
        let vander = crate::legendre::legendre_vander(&[ctheta], n_coeff);
        let mut want = 0.0;
        let mut bn = 1.0;
        for n in 1..n_coeff {
            let nf = n as f64;
            bn *= beta;
            want += (2.0 * nf + 1.0) * (2.0 * nf + 1.0) / nf * bn * vander[[0, n]];
        }
        want *= EEG_CONST / (l1 * l2);
        assert!(
            (d[[0, 1]] - want).abs() <= 1e-12 * want.abs().max(1e-30),
            "{} vs {}",
            d[[0, 1]],
            want
        );
    }

    #[test]
    fn test_eeg_dots_finite_and_symmetric() {
        let channels = (0..5)
            .map(|i| {
                let phi = 0.4 * i as f64;
                ChannelInfo {
                    name: format!("EEG {i:03}"),
                    kind: ChannelKind::Eeg,
                    coil_type: CoilType::EegElectrode,
                    loc: Some(ChannelLoc::axis_aligned([
                        0.08 * phi.cos(),
                        0.08 * phi.sin(),
                        0.05,
                    ])),
                }
            })
            .collect();
        let info = SensorInfo {
            channels,
            dev_head_t: None,
            bads: vec![],
        };
        let els = megfield_structures::create_eeg_electrodes(&info, &[0, 1, 2, 3, 4]).unwrap();
        let table = build_table(Modality::Eeg, 30, 2000);
        let d = self_dots(0.006, &els, ORIGIN, Modality::Eeg, &table, EvalMode::Linear).unwrap();
        for i in 0..5 {
            for j in 0..5 {
                assert!(d[[i, j]].is_finite());
                assert!((d[[i, j]] - d[[j, i]]).abs() < 1e-12 * d[[i, i]].abs());
            }
        }
    }
}
