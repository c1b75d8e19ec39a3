// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

/*!
# megfield - MEG/EEG field interpolation

Projects measured sensor data onto arbitrary surfaces (head, helmet) or
onto virtual sensors of a different coil type, using a truncated multipole
expansion in the sphere model with precomputed Legendre coefficient
tables.

This umbrella crate re-exports the workspace members:
- [`structures`]: channels, coils, surfaces, transforms, errors
- [`interp`]: Legendre tables, dot kernels, mapping, projection
- [`config`]: TOML configuration with environment overrides

## Example

```rust,no_run
use megfield::interp::{make_surface_mapping, MappingConfig, TableCache};
use megfield::structures::Modality;
# fn demo(info: &megfield::structures::SensorInfo,
#         surf: &megfield::structures::SurfaceDescriptor) {
let mut cache = TableCache::in_memory();
let fmap = make_surface_mapping(
    info, surf, Modality::Meg, None, &MappingConfig::default(), &mut cache,
).unwrap();
// fmap.data is (n_vertices, n_channels); apply it to any data block
# }
```
*/

pub use megfield_config as config;
pub use megfield_interp as interp;
pub use megfield_structures as structures;

// flat re-exports of the everyday types
pub use megfield_interp::{
    make_surface_mapping, map_channel_type, FieldMap, MapTarget, MappingConfig, MappingMode,
    TableCache,
};
pub use megfield_structures::{
    CoilType, CoordFrame, FieldError, FieldResult, Modality, SensorInfo, SurfaceDescriptor,
    Transform,
};
