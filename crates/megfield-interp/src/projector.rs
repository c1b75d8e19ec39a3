// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Projection of recorded data onto a virtual sensor array of a different
//! coil type (e.g. magnetometer-equivalent signals from planar
//! gradiometer recordings).
//!
//! Same minimum-norm machinery as the surface mapping, with the target
//! being a synthetic coil set placed at the source channel positions
//! instead of a surface mesh.

use tracing::info;

use megfield_structures::{
    create_meg_coils, create_virtual_meg_coils, CoilType, FieldError, FieldResult, Modality,
    SensorInfo,
};

use crate::cache::TableCache;
use crate::dots::{cross_dots, self_dots};
use crate::mapping::{compute_mapping_matrix, FieldMap, MapTarget, MappingConfig};

/// Build the operator projecting the good MEG channels of `info` onto a
/// virtual array of `to_type` coils at the same sensor sites.
///
/// `to_type` must be an MEG coil type; requesting anything else (e.g. an
/// EEG electrode target) is an invalid-type error, reported separately
/// from the no-source-channels case so callers can tell a bad request
/// from unusable data.
pub fn map_channel_type(
    info: &SensorInfo,
    to_type: CoilType,
    config: &MappingConfig,
    cache: &mut TableCache,
) -> FieldResult<FieldMap> {
    if to_type.modality() != Modality::Meg {
        return Err(FieldError::InvalidTargetType(to_type));
    }
    let picks = info.picks(Modality::Meg);
    if picks.is_empty() {
        return Err(FieldError::NoChannels(Modality::Meg));
    }
    info!(
        n_channels = picks.len(),
        to_type = ?to_type,
        "Mapping channels onto virtual sensor type..."
    );

    let from_coils = create_meg_coils(info, &picks)?;
    let to_coils = create_virtual_meg_coils(info, &picks, to_type)?;

    let (n_coeff, eval_mode) = config.mode.dot_params();
    let table = cache.get(Modality::Meg, n_coeff, false)?;

    let self_mat = self_dots(
        config.int_rad,
        &from_coils,
        config.origin,
        Modality::Meg,
        &table,
        eval_mode,
    )?;
    // target x source layout, same orientation as the surface dots
    let cross_mat = cross_dots(
        config.int_rad,
        &to_coils,
        &from_coils,
        config.origin,
        Modality::Meg,
        &table,
        eval_mode,
    )?;

    let w = crate::mapping::whitener_for(&from_coils, &config.noise);
    let data = compute_mapping_matrix(&self_mat, &cross_mat, &w, config.miss, false);

    Ok(FieldMap {
        kind: Modality::Meg,
        ch_names: info.names(&picks),
        target: MapTarget::VirtualChannels(to_coils.iter().map(|c| c.name.clone()).collect()),
        origin: config.origin,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use megfield_structures::{
        ChannelInfo, ChannelKind, ChannelLoc, CoordFrame, Transform,
    };
    use ndarray::{Array1, Array2};

    fn grad_info(n: usize) -> SensorInfo {
        let channels = (0..n)
            .map(|i| {
                let phi = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                ChannelInfo {
                    name: format!("MEG {i:03}"),
                    kind: ChannelKind::Meg,
                    coil_type: CoilType::PlanarGradiometer,
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

    fn small_config() -> MappingConfig {
        MappingConfig {
            mode: crate::mapping::MappingMode::Fast,
            ..MappingConfig::default()
        }
    }

    #[test]
    fn test_invalid_target_type() {
        let info = grad_info(4);
        let mut cache = TableCache::in_memory().with_n_interp(2000).unwrap();
        let err = map_channel_type(&info, CoilType::EegElectrode, &small_config(), &mut cache)
            .unwrap_err();
        assert!(matches!(err, FieldError::InvalidTargetType(_)));
    }

    #[test]
    fn test_no_source_channels() {
        let mut info = grad_info(4);
        for ch in &mut info.channels {
            ch.kind = ChannelKind::Eeg;
        }
        let mut cache = TableCache::in_memory().with_n_interp(2000).unwrap();
        let err = map_channel_type(&info, CoilType::Magnetometer, &small_config(), &mut cache)
            .unwrap_err();
        assert!(matches!(err, FieldError::NoChannels(Modality::Meg)));
    }

    #[test]
    fn test_virtual_names_and_shape() {
        let info = grad_info(5);
        let mut cache = TableCache::in_memory().with_n_interp(2000).unwrap();
        let fm =
            map_channel_type(&info, CoilType::Magnetometer, &small_config(), &mut cache).unwrap();
        assert_eq!(fm.data.shape(), &[5, 5]);
        match &fm.target {
            MapTarget::VirtualChannels(names) => {
                assert!(names.iter().all(|n| n.ends_with("_v")));
            }
            _ => panic!("expected virtual channel target"),
        }
    }

    #[test]
    fn test_projection_is_linear_over_epochs() {
        let info = grad_info(5);
        let mut cache = TableCache::in_memory().with_n_interp(2000).unwrap();
        let fm =
            map_channel_type(&info, CoilType::Magnetometer, &small_config(), &mut cache).unwrap();

        // three "epochs" of deterministic pseudo-data
        let epochs: Vec<Array2<f64>> = (0..3)
            .map(|e| {
                Array2::from_shape_fn((5, 7), |(i, j)| {
                    ((e * 31 + i * 7 + j) as f64 * 0.37).sin() * 1e-12
                })
            })
            .collect();
        let mean = {
            let mut m = Array2::<f64>::zeros((5, 7));
            for ep in &epochs {
                m += ep;
            }
            m / 3.0
        };

        let projected = fm.apply_epochs(&epochs);
        let mut mean_of_proj = Array2::<f64>::zeros(projected[0].raw_dim());
        for p in &projected {
            mean_of_proj += p;
        }
        mean_of_proj /= 3.0;
        let proj_of_mean = fm.apply(mean.view());
        for (a, b) in mean_of_proj.iter().zip(proj_of_mean.iter()) {
            assert!((a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1e-30));
        }

        // single-vector application agrees with the block path
        let v = Array1::from_iter((0..5).map(|i| (i as f64 + 1.0) * 1e-12));
        let via_vec = fm.apply_vec(v.view());
        let block = fm.apply(v.clone().insert_axis(ndarray::Axis(1)).view());
        for i in 0..5 {
            assert!((via_vec[i] - block[[i, 0]]).abs() < 1e-18);
        }
    }
}
