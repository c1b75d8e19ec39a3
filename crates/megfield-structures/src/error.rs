// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Error types shared by all megfield crates.

use crate::channel::{CoilType, Modality};
use crate::transform::CoordFrame;

/// Result type for megfield operations
pub type FieldResult<T> = Result<T, FieldError>;

/// Errors that can occur while building tables, dot products, or mappings.
///
/// The variants fall into three families:
/// - configuration errors (bad arguments, missing transform, no usable
///   channels),
/// - malformed-input errors (a surface or channel descriptor is missing a
///   required field),
/// - numerical-domain errors (requested parameters outside the valid
///   domain of the series evaluation).
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    // --- configuration ---
    #[error("unknown channel type \"{0}\", must be \"meg\" or \"eeg\"")]
    UnknownModality(String),

    #[error("unknown mapping mode \"{0}\", must be \"fast\", \"accurate\" or \"exact\"")]
    UnknownMode(String),

    #[error("surface is in {surface_frame:?} coordinates but no transform to {needed:?} was supplied")]
    MissingTransform {
        surface_frame: CoordFrame,
        needed: CoordFrame,
    },

    #[error("transform maps {from:?} -> {to:?}, cannot bring surface from {surface_frame:?} to {needed:?}")]
    TransformMismatch {
        from: CoordFrame,
        to: CoordFrame,
        surface_frame: CoordFrame,
        needed: CoordFrame,
    },

    #[error("cannot map, no good {0:?} channels found")]
    NoChannels(Modality),

    #[error("invalid target coil type {0:?}: only MEG coil types can be synthesized")]
    InvalidTargetType(CoilType),

    // --- malformed input ---
    #[error("surface is missing required field \"{0}\"")]
    MissingSurfaceField(&'static str),

    #[error("channel \"{0}\" has no usable position/orientation")]
    MissingChannelGeometry(String),

    // --- numerical domain ---
    #[error("coefficient count must be at least 2, got {0}")]
    BadCoefficientCount(usize),

    #[error("interpolation grid size must be even and positive, got {0}")]
    BadInterpolationGrid(usize),

    #[error("integration point at radius {point_radius:.4} m is inside the expansion radius {int_rad:.4} m")]
    ExpansionDomain { point_radius: f64, int_rad: f64 },

    // --- table cache ---
    #[error("failed to read/write cached table: {0}")]
    TableIo(#[from] std::io::Error),

    #[error("cached table file is not usable: {0}")]
    TableFormat(String),
}
