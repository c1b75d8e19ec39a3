// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Coordinate frames and rigid transforms between them.
//!
//! Sensor positions come out of the acquisition hardware in device
//! coordinates, anatomy lives in head or MRI coordinates. Everything the
//! mapping engine does happens in head coordinates, so surfaces and coils
//! are brought there first via a rigid (rotation + translation) transform.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{FieldError, FieldResult};

/// Coordinate frame a point set is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordFrame {
    /// MEG device (dewar) coordinates
    Device,
    /// Head coordinates (fiducial-based)
    Head,
    /// MRI (surface RAS) coordinates
    Mri,
    /// Frame could not be determined
    Unknown,
}

/// Rigid 4x4 transform between two coordinate frames.
///
/// Stored as a 3x3 rotation and a translation vector; the last row of the
/// homogeneous matrix is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub from: CoordFrame,
    pub to: CoordFrame,
    /// Row-major rotation matrix
    pub rot: [[f64; 3]; 3],
    /// Translation, applied after rotation
    pub trans: [f64; 3],
}

impl Transform {
    /// Identity transform between two frames (used when frames coincide).
    pub fn identity(from: CoordFrame, to: CoordFrame) -> Self {
        Self {
            from,
            to,
            rot: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            trans: [0.0; 3],
        }
    }

    /// Inverse transform. Rigid, so the inverse rotation is the transpose
    /// and the inverse translation is `-R^T t`.
    pub fn invert(&self) -> Self {
        let r = &self.rot;
        let rot_t = [
            [r[0][0], r[1][0], r[2][0]],
            [r[0][1], r[1][1], r[2][1]],
            [r[0][2], r[1][2], r[2][2]],
        ];
        let t = &self.trans;
        let mut trans = [0.0; 3];
        for (i, row) in rot_t.iter().enumerate() {
            trans[i] = -(row[0] * t[0] + row[1] * t[1] + row[2] * t[2]);
        }
        Self {
            from: self.to,
            to: self.from,
            rot: rot_t,
            trans,
        }
    }

    /// Apply to a single point (rotation + translation).
    pub fn apply_point(&self, p: [f64; 3]) -> [f64; 3] {
        let r = &self.rot;
        [
            r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + self.trans[0],
            r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + self.trans[1],
            r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + self.trans[2],
        ]
    }

    /// Apply to a direction vector (rotation only, no translation).
    pub fn apply_vector(&self, v: [f64; 3]) -> [f64; 3] {
        let r = &self.rot;
        [
            r[0][0] * v[0] + r[0][1] * v[1] + r[0][2] * v[2],
            r[1][0] * v[0] + r[1][1] * v[1] + r[1][2] * v[2],
            r[2][0] * v[0] + r[2][1] * v[1] + r[2][2] * v[2],
        ]
    }

    /// Apply to an `(n, 3)` point set in place.
    pub fn apply_points(&self, rr: &mut Array2<f64>) {
        for mut row in rr.rows_mut() {
            let p = self.apply_point([row[0], row[1], row[2]]);
            row[0] = p[0];
            row[1] = p[1];
            row[2] = p[2];
        }
    }

    /// Apply to an `(n, 3)` set of direction vectors in place.
    pub fn apply_vectors(&self, nn: &mut Array2<f64>) {
        for mut row in nn.rows_mut() {
            let v = self.apply_vector([row[0], row[1], row[2]]);
            row[0] = v[0];
            row[1] = v[1];
            row[2] = v[2];
        }
    }

    /// Return a transform mapping `from -> to`, inverting `self` if it is
    /// supplied in the opposite direction.
    pub fn oriented(&self, from: CoordFrame, to: CoordFrame) -> FieldResult<Transform> {
        if self.from == from && self.to == to {
            Ok(self.clone())
        } else if self.from == to && self.to == from {
            Ok(self.invert())
        } else {
            Err(FieldError::TransformMismatch {
                from: self.from,
                to: self.to,
                surface_frame: from,
                needed: to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rot_z_90() -> Transform {
        Transform {
            from: CoordFrame::Mri,
            to: CoordFrame::Head,
            rot: [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            trans: [0.0, 0.0, 0.01],
        }
    }

    #[test]
    fn test_invert_roundtrip() {
        let t = rot_z_90();
        let p = [0.02, -0.03, 0.07];
        let q = t.invert().apply_point(t.apply_point(p));
        for i in 0..3 {
            assert!((q[i] - p[i]).abs() < 1e-12);
        }
        assert_eq!(t.invert().from, CoordFrame::Head);
        assert_eq!(t.invert().to, CoordFrame::Mri);
    }

    #[test]
    fn test_vectors_ignore_translation() {
        let t = rot_z_90();
        let v = t.apply_vector([1.0, 0.0, 0.0]);
        assert!((v[0] - 0.0).abs() < 1e-12);
        assert!((v[1] - 1.0).abs() < 1e-12);
        assert!((v[2] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_oriented_flips_direction() {
        let t = rot_z_90();
        let fwd = t.oriented(CoordFrame::Mri, CoordFrame::Head).unwrap();
        assert_eq!(fwd.from, CoordFrame::Mri);
        let back = t.oriented(CoordFrame::Head, CoordFrame::Mri).unwrap();
        assert_eq!(back.to, CoordFrame::Mri);
        assert!(t.oriented(CoordFrame::Device, CoordFrame::Head).is_err());
    }
}
