// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

/*!
Core data types for the megfield toolkit.

This crate defines what the interpolation engine consumes: channel and
sensor descriptors, coil integration-point geometry, surface descriptors,
coordinate transforms, and the shared error type. Acquisition-format
readers populate these structures; `megfield-interp` does the math.
*/

pub mod channel;
pub mod coil;
pub mod error;
pub mod surface;
pub mod transform;

pub use channel::{ChannelInfo, ChannelKind, ChannelLoc, CoilType, Modality, SensorInfo};
pub use coil::{create_eeg_electrodes, create_meg_coils, create_virtual_meg_coils, CoilDescriptor};
pub use error::{FieldError, FieldResult};
pub use surface::{HeadSurface, SurfaceDescriptor};
pub use transform::{CoordFrame, Transform};
