// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Coil descriptors: integration-point approximations of sensor geometry.
//!
//! Each physical sensor is represented by a small set of weighted
//! integration points with a sensing direction at each point. The dot
//! kernels only ever see this representation, so the same code path serves
//! magnetometers, gradiometers, and EEG electrodes.
//!
//! The built-in definitions below are the "normal accuracy" layouts:
//! enough points to capture the first-order geometry of each coil without
//! the cost of the dense accurate grids.

use ndarray::{Array1, Array2};

use crate::channel::{ChannelLoc, CoilType, Modality, SensorInfo};
use crate::error::{FieldError, FieldResult};
use crate::transform::{CoordFrame, Transform};

/// Integration-point representation of one sensor, in head coordinates.
#[derive(Debug, Clone)]
pub struct CoilDescriptor {
    /// Channel name this coil belongs to
    pub name: String,
    pub coil_type: CoilType,
    /// Integration point positions, shape `(n_int, 3)`
    pub rmag: Array2<f64>,
    /// Sensing direction at each integration point, shape `(n_int, 3)`
    pub cosmag: Array2<f64>,
    /// Integration weights, shape `(n_int,)`
    pub w: Array1<f64>,
}

impl CoilDescriptor {
    pub fn n_int(&self) -> usize {
        self.w.len()
    }

    pub fn modality(&self) -> Modality {
        self.coil_type.modality()
    }
}

/// Local-frame integration points for a coil type: `(offset, weight)`
/// pairs, with the sensing direction along the local z axis.
///
/// Magnetometer: four points on the pickup loop, equal weights.
/// Planar gradiometer: two points along local x, weights +-1/baseline.
/// Axial gradiometer: bottom loop minus top loop at the baseline height.
fn coil_def(coil_type: CoilType) -> FieldResult<Vec<([f64; 3], f64)>> {
    // baselines in meters
    const PLANAR_BASE: f64 = 16.8e-3;
    const AXIAL_BASE: f64 = 50.0e-3;
    const MAG_HALF: f64 = 6.45e-3;
    Ok(match coil_type {
        CoilType::Magnetometer => vec![
            ([MAG_HALF, MAG_HALF, 0.0], 0.25),
            ([MAG_HALF, -MAG_HALF, 0.0], 0.25),
            ([-MAG_HALF, MAG_HALF, 0.0], 0.25),
            ([-MAG_HALF, -MAG_HALF, 0.0], 0.25),
        ],
        CoilType::PointMagnetometer => vec![([0.0, 0.0, 0.0], 1.0)],
        CoilType::PlanarGradiometer => vec![
            ([PLANAR_BASE / 2.0, 0.0, 0.0], 1.0 / PLANAR_BASE),
            ([-PLANAR_BASE / 2.0, 0.0, 0.0], -1.0 / PLANAR_BASE),
        ],
        CoilType::AxialGradiometer => vec![
            ([0.0, 0.0, 0.0], 1.0),
            ([0.0, 0.0, AXIAL_BASE], -1.0),
        ],
        CoilType::EegElectrode => {
            return Err(FieldError::InvalidTargetType(CoilType::EegElectrode))
        }
    })
}

/// Build one MEG coil at a given placement, mapping the local-frame
/// definition through the sensor triad and then to head coordinates.
fn build_meg_coil(
    name: &str,
    coil_type: CoilType,
    loc: &ChannelLoc,
    dev_head_t: &Transform,
) -> FieldResult<CoilDescriptor> {
    let def = coil_def(coil_type)?;
    let n = def.len();
    let mut rmag = Array2::<f64>::zeros((n, 3));
    let mut cosmag = Array2::<f64>::zeros((n, 3));
    let mut w = Array1::<f64>::zeros(n);
    for (k, (offset, weight)) in def.iter().enumerate() {
        let p = dev_head_t.apply_point(loc.local_to_parent(*offset));
        let d = dev_head_t.apply_vector(loc.local_dir_to_parent([0.0, 0.0, 1.0]));
        for i in 0..3 {
            rmag[[k, i]] = p[i];
            cosmag[[k, i]] = d[i];
        }
        w[k] = *weight;
    }
    Ok(CoilDescriptor {
        name: name.to_string(),
        coil_type,
        rmag,
        cosmag,
        w,
    })
}

/// Create MEG coil descriptors (head coordinates) for a set of picks.
///
/// Every picked channel must carry geometry; the device-to-head transform
/// must be present since MEG sensor placements are in device coordinates.
pub fn create_meg_coils(info: &SensorInfo, picks: &[usize]) -> FieldResult<Vec<CoilDescriptor>> {
    let dev_head_t = info
        .dev_head_t
        .as_ref()
        .ok_or(FieldError::MissingTransform {
            surface_frame: CoordFrame::Device,
            needed: CoordFrame::Head,
        })?
        .oriented(CoordFrame::Device, CoordFrame::Head)?;
    picks
        .iter()
        .map(|&i| {
            let ch = &info.channels[i];
            let loc = ch
                .loc
                .as_ref()
                .ok_or_else(|| FieldError::MissingChannelGeometry(ch.name.clone()))?;
            build_meg_coil(&ch.name, ch.coil_type, loc, &dev_head_t)
        })
        .collect()
}

/// Create MEG coils of a single requested type at the picked channels'
/// placements. Used to synthesize virtual sensor arrays.
pub fn create_virtual_meg_coils(
    info: &SensorInfo,
    picks: &[usize],
    coil_type: CoilType,
) -> FieldResult<Vec<CoilDescriptor>> {
    if coil_type.modality() != Modality::Meg {
        return Err(FieldError::InvalidTargetType(coil_type));
    }
    let dev_head_t = info
        .dev_head_t
        .as_ref()
        .ok_or(FieldError::MissingTransform {
            surface_frame: CoordFrame::Device,
            needed: CoordFrame::Head,
        })?
        .oriented(CoordFrame::Device, CoordFrame::Head)?;
    picks
        .iter()
        .map(|&i| {
            let ch = &info.channels[i];
            let loc = ch
                .loc
                .as_ref()
                .ok_or_else(|| FieldError::MissingChannelGeometry(ch.name.clone()))?;
            let mut coil = build_meg_coil(&ch.name, coil_type, loc, &dev_head_t)?;
            coil.name = format!("{}_v", ch.name);
            Ok(coil)
        })
        .collect()
}

/// Create EEG electrode descriptors for a set of picks.
///
/// Electrode positions are already in head coordinates; the sensing
/// direction is the unit radial vector of the electrode position, matching
/// the potential formulation of the sphere model.
pub fn create_eeg_electrodes(
    info: &SensorInfo,
    picks: &[usize],
) -> FieldResult<Vec<CoilDescriptor>> {
    picks
        .iter()
        .map(|&i| {
            let ch = &info.channels[i];
            let loc = ch
                .loc
                .as_ref()
                .ok_or_else(|| FieldError::MissingChannelGeometry(ch.name.clone()))?;
            let p = loc.pos;
            let norm = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            if norm == 0.0 {
                return Err(FieldError::MissingChannelGeometry(ch.name.clone()));
            }
            let mut rmag = Array2::<f64>::zeros((1, 3));
            let mut cosmag = Array2::<f64>::zeros((1, 3));
            for k in 0..3 {
                rmag[[0, k]] = p[k];
                cosmag[[0, k]] = p[k] / norm;
            }
            Ok(CoilDescriptor {
                name: ch.name.clone(),
                coil_type: CoilType::EegElectrode,
                rmag,
                cosmag,
                w: Array1::ones(1),
            })
        })
        .collect()
}
