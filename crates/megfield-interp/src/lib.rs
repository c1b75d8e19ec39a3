// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

/*!
Multipole field interpolation for MEG/EEG.

Pipeline: sensor and surface descriptors come in from
`megfield-structures`; [`cache::TableCache`] supplies Legendre coefficient
tables; [`dots`] turns coil geometry into pairwise lead-field dot
matrices; [`mapping::make_surface_mapping`] and
[`projector::map_channel_type`] combine them into dense linear operators
that project recorded data onto a surface or a virtual sensor array.

The heavy step is the dense dot-matrix construction, parallelized with
rayon across coil/vertex indices; everything downstream is small linear
algebra.
*/

pub mod cache;
pub mod dots;
pub mod legendre;
pub mod mapping;
pub mod projector;

pub use cache::TableCache;
pub use dots::{cross_dots, self_dots, surface_dots};
pub use legendre::{EvalMode, LegendreTable, DEFAULT_N_INTERP};
pub use mapping::{
    make_surface_mapping, FieldMap, MapTarget, MappingConfig, MappingMode, NoiseScales,
};
pub use projector::map_channel_type;
