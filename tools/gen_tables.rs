// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Pre-generate Legendre coefficient tables into an on-disk cache.
//!
//! Usage: `gen_tables <cache-dir> [n_interp]`
//!
//! Builds the tables both mapping presets need (EEG and MEG at 50 and
//! 100 coefficients) so later runs start without the generation cost.

use std::env;
use std::process::ExitCode;

use megfield::structures::Modality;
use megfield::TableCache;
use tracing::info;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let Some(dir) = args.next() else {
        eprintln!("usage: gen_tables <cache-dir> [n_interp]");
        return ExitCode::FAILURE;
    };
    let n_interp: usize = match args.next() {
        Some(v) => match v.parse() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("n_interp must be an even positive integer, got {v}");
                return ExitCode::FAILURE;
            }
        },
        None => megfield::interp::DEFAULT_N_INTERP,
    };

    let mut cache = match TableCache::with_dir(&dir).with_n_interp(n_interp) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    for modality in [Modality::Eeg, Modality::Meg] {
        for n_coeff in [50usize, 100] {
            if let Err(e) = cache.get(modality, n_coeff, true) {
                eprintln!("failed to build table ({}, {n_coeff}): {e}", modality.as_str());
                return ExitCode::FAILURE;
            }
            info!(
                modality = modality.as_str(),
                n_coeff, "table written to {dir}"
            );
        }
    }
    ExitCode::SUCCESS
}
