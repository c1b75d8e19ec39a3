// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Channel descriptors and measurement-info containers.
//!
//! `SensorInfo` is the ordered channel list an acquisition reader produces:
//! per-channel name, kind, coil type and geometry, the device-to-head
//! transform, and the bad-channel exclusion list. The mapping engine only
//! ever sees channels through [`SensorInfo::picks`], which filters by
//! modality and drops bads.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::transform::Transform;

/// Measurement modality: the physical quantity a channel records.
///
/// EEG and MEG use different analytic kernels in the multipole expansion
/// (electric potential vs. magnetic field), so the modality selects the
/// kernel strategy everywhere downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    Eeg,
    Meg,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Eeg => "eeg",
            Modality::Meg => "meg",
        }
    }
}

impl FromStr for Modality {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eeg" => Ok(Modality::Eeg),
            "meg" => Ok(Modality::Meg),
            other => Err(FieldError::UnknownModality(other.to_string())),
        }
    }
}

/// What a channel measures. Non-M/EEG channels (stim, EOG, ...) are carried
/// through readers but never picked by the mapping engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Meg,
    Eeg,
    Stim,
    Eog,
    Ecg,
    Misc,
}

impl ChannelKind {
    pub fn modality(&self) -> Option<Modality> {
        match self {
            ChannelKind::Meg => Some(Modality::Meg),
            ChannelKind::Eeg => Some(Modality::Eeg),
            _ => None,
        }
    }
}

/// Physical sensor construction, which fixes the integration-point layout
/// used to approximate the coil's spatial sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoilType {
    /// Square pickup loop magnetometer
    Magnetometer,
    /// Idealized single-point magnetometer (virtual channels)
    PointMagnetometer,
    /// Planar figure-of-eight gradiometer
    PlanarGradiometer,
    /// Axial first-order gradiometer (two stacked loops)
    AxialGradiometer,
    /// EEG scalp electrode
    EegElectrode,
}

impl CoilType {
    pub fn modality(&self) -> Modality {
        match self {
            CoilType::EegElectrode => Modality::Eeg,
            _ => Modality::Meg,
        }
    }

    /// True for gradiometers, whose units are T/m rather than T.
    pub fn is_gradiometer(&self) -> bool {
        matches!(
            self,
            CoilType::PlanarGradiometer | CoilType::AxialGradiometer
        )
    }
}

/// Sensor placement: position of the coil center / electrode and the local
/// orthonormal coordinate triad of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLoc {
    /// Coil center or electrode position
    pub pos: [f64; 3],
    /// Local x axis
    pub ex: [f64; 3],
    /// Local y axis
    pub ey: [f64; 3],
    /// Local z axis (coil normal)
    pub ez: [f64; 3],
}

impl ChannelLoc {
    /// Placement with the local triad aligned to the global axes.
    pub fn axis_aligned(pos: [f64; 3]) -> Self {
        Self {
            pos,
            ex: [1.0, 0.0, 0.0],
            ey: [0.0, 1.0, 0.0],
            ez: [0.0, 0.0, 1.0],
        }
    }

    /// Map a point from the sensor-local frame to the parent frame.
    pub fn local_to_parent(&self, p: [f64; 3]) -> [f64; 3] {
        [
            self.pos[0] + self.ex[0] * p[0] + self.ey[0] * p[1] + self.ez[0] * p[2],
            self.pos[1] + self.ex[1] * p[0] + self.ey[1] * p[1] + self.ez[1] * p[2],
            self.pos[2] + self.ex[2] * p[0] + self.ey[2] * p[1] + self.ez[2] * p[2],
        ]
    }

    /// Map a direction from the sensor-local frame to the parent frame.
    pub fn local_dir_to_parent(&self, v: [f64; 3]) -> [f64; 3] {
        [
            self.ex[0] * v[0] + self.ey[0] * v[1] + self.ez[0] * v[2],
            self.ex[1] * v[0] + self.ey[1] * v[1] + self.ez[1] * v[2],
            self.ex[2] * v[0] + self.ey[2] * v[1] + self.ez[2] * v[2],
        ]
    }
}

/// One channel of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: ChannelKind,
    pub coil_type: CoilType,
    /// Placement; MEG channels in device coordinates, EEG in head
    /// coordinates. `None` for channels without geometry (stim etc.).
    pub loc: Option<ChannelLoc>,
}

/// Ordered channel list plus recording-level geometry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub channels: Vec<ChannelInfo>,
    /// Device-to-head transform from the acquisition (HPI fit)
    pub dev_head_t: Option<Transform>,
    /// Names of channels to exclude from any mapping
    pub bads: Vec<String>,
}

impl SensorInfo {
    /// Indices of good channels of the requested modality, in recording
    /// order. Bad channels are dropped here and nowhere else.
    pub fn picks(&self, modality: Modality) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| {
                ch.kind.modality() == Some(modality) && !self.bads.iter().any(|b| b == &ch.name)
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Channel names for a set of picks.
    pub fn names(&self, picks: &[usize]) -> Vec<String> {
        picks
            .iter()
            .map(|&i| self.channels[i].name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meg_ch(name: &str) -> ChannelInfo {
        ChannelInfo {
            name: name.to_string(),
            kind: ChannelKind::Meg,
            coil_type: CoilType::Magnetometer,
            loc: Some(ChannelLoc::axis_aligned([0.0, 0.0, 0.1])),
        }
    }

    #[test]
    fn test_modality_parse() {
        assert_eq!("meg".parse::<Modality>().unwrap(), Modality::Meg);
        assert_eq!("eeg".parse::<Modality>().unwrap(), Modality::Eeg);
        let err = "foo".parse::<Modality>().unwrap_err();
        assert!(matches!(err, FieldError::UnknownModality(s) if s == "foo"));
    }

    #[test]
    fn test_picks_exclude_bads_and_other_kinds() {
        let mut eeg = meg_ch("EEG 001");
        eeg.kind = ChannelKind::Eeg;
        eeg.coil_type = CoilType::EegElectrode;
        let info = SensorInfo {
            channels: vec![meg_ch("MEG 001"), meg_ch("MEG 002"), eeg],
            dev_head_t: None,
            bads: vec!["MEG 002".to_string()],
        };
        assert_eq!(info.picks(Modality::Meg), vec![0]);
        assert_eq!(info.picks(Modality::Eeg), vec![2]);
        assert_eq!(info.names(&info.picks(Modality::Meg)), vec!["MEG 001"]);
    }

    #[test]
    fn test_sensor_info_json_roundtrip() {
        let info = SensorInfo {
            channels: vec![meg_ch("MEG 001")],
            dev_head_t: None,
            bads: vec!["MEG 001".to_string()],
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: SensorInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn test_local_triad_mapping() {
        let loc = ChannelLoc {
            pos: [0.0, 0.0, 0.1],
            ex: [0.0, 1.0, 0.0],
            ey: [-1.0, 0.0, 0.0],
            ez: [0.0, 0.0, 1.0],
        };
        let p = loc.local_to_parent([0.01, 0.0, 0.0]);
        assert!((p[0] - 0.0).abs() < 1e-12);
        assert!((p[1] - 0.01).abs() < 1e-12);
        assert!((p[2] - 0.1).abs() < 1e-12);
        let v = loc.local_dir_to_parent([0.0, 0.0, 1.0]);
        assert_eq!(v, [0.0, 0.0, 1.0]);
    }
}
