// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Surface descriptors: the target geometry a field map projects onto.

use ndarray::Array2;

use crate::error::{FieldError, FieldResult};
use crate::transform::{CoordFrame, Transform};

/// A triangulated surface (head, helmet) with per-vertex normals.
///
/// `nn` and `coord_frame` are optional at construction because file
/// readers may not supply them, but both are mandatory for mapping:
/// [`SurfaceDescriptor::validated`] turns their absence into the
/// malformed-surface errors the mapping entry points promise.
#[derive(Debug, Clone)]
pub struct SurfaceDescriptor {
    /// Identifier, e.g. "head" or "helmet"
    pub id: String,
    /// Vertex positions, shape `(n_vertices, 3)`
    pub rr: Array2<f64>,
    /// Vertex normals, shape `(n_vertices, 3)`
    pub nn: Option<Array2<f64>>,
    pub coord_frame: Option<CoordFrame>,
    /// Triangulation, display only; the mapping math never touches it
    pub tris: Option<Array2<usize>>,
}

/// A surface with all mapping prerequisites present, in head coordinates.
#[derive(Debug, Clone)]
pub struct HeadSurface {
    pub id: String,
    pub rr: Array2<f64>,
    pub nn: Array2<f64>,
}

impl SurfaceDescriptor {
    pub fn n_vertices(&self) -> usize {
        self.rr.nrows()
    }

    /// Check required fields and bring the surface to head coordinates.
    ///
    /// A missing `nn` or `coord_frame` is a malformed-surface error. A
    /// surface in a non-head frame needs `trans`; its absence is a
    /// configuration error, kept distinct so callers can tell "fix your
    /// surface" from "supply a transform".
    pub fn validated(&self, trans: Option<&Transform>) -> FieldResult<HeadSurface> {
        let nn = self
            .nn
            .as_ref()
            .ok_or(FieldError::MissingSurfaceField("nn"))?;
        let frame = self
            .coord_frame
            .ok_or(FieldError::MissingSurfaceField("coord_frame"))?;
        let mut rr = self.rr.clone();
        let mut nn = nn.clone();
        if frame != CoordFrame::Head {
            let t = trans
                .ok_or(FieldError::MissingTransform {
                    surface_frame: frame,
                    needed: CoordFrame::Head,
                })?
                .oriented(frame, CoordFrame::Head)?;
            t.apply_points(&mut rr);
            t.apply_vectors(&mut nn);
        }
        Ok(HeadSurface {
            id: self.id.clone(),
            rr,
            nn,
        })
    }
}
