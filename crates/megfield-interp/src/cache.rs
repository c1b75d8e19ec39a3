// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Build-once cache for Legendre coefficient tables.
//!
//! Tables are memoized in memory keyed by `(modality, n_coeff)` and can
//! optionally be persisted to a cache directory so later processes skip
//! the generation cost. The cache is append-only: entries are never
//! invalidated except by an explicit forced recompute, which refreshes
//! both layers.
//!
//! On-disk layout (little endian):
//! `"MFLT"` magic, format version `u8`, modality tag `u8`, `n_coeff: u32`,
//! `n_interp: u32`, then the `f32` table payload. The normalization
//! factors are pure functions of `(modality, n_coeff)` and are recomputed
//! on load.

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, Array3};
use tracing::{debug, info};

use megfield_structures::{FieldError, FieldResult, Modality};

use crate::legendre::{
    build_table, eeg_n_fact, meg_n_fact, EegTable, LegendreTable, MegTable, DEFAULT_N_INTERP,
};

const MAGIC: &[u8; 4] = b"MFLT";
const FORMAT_VERSION: u8 = 1;

/// Process-wide table store with optional on-disk persistence.
pub struct TableCache {
    dir: Option<PathBuf>,
    n_interp: usize,
    mem: HashMap<(Modality, usize), Arc<LegendreTable>>,
}

impl TableCache {
    /// Memory-only cache with the default grid resolution.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            n_interp: DEFAULT_N_INTERP,
            mem: HashMap::new(),
        }
    }

    /// Cache persisted under `dir` (created on first write).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            n_interp: DEFAULT_N_INTERP,
            mem: HashMap::new(),
        }
    }

    /// Override the cos-angle grid resolution. Must be even.
    pub fn with_n_interp(mut self, n_interp: usize) -> FieldResult<Self> {
        if n_interp == 0 || n_interp % 2 != 0 {
            return Err(FieldError::BadInterpolationGrid(n_interp));
        }
        self.n_interp = n_interp;
        Ok(self)
    }

    pub fn n_interp(&self) -> usize {
        self.n_interp
    }

    /// Get (building if necessary) the table for `(modality, n_coeff)`.
    ///
    /// `force` bypasses both the memory and disk layers, recomputes, and
    /// refreshes them.
    pub fn get(
        &mut self,
        modality: Modality,
        n_coeff: usize,
        force: bool,
    ) -> FieldResult<Arc<LegendreTable>> {
        if n_coeff < 2 {
            return Err(FieldError::BadCoefficientCount(n_coeff));
        }
        let key = (modality, n_coeff);
        if !force {
            if let Some(t) = self.mem.get(&key) {
                return Ok(Arc::clone(t));
            }
            if let Some(t) = self.try_load(modality, n_coeff)? {
                let t = Arc::new(t);
                self.mem.insert(key, Arc::clone(&t));
                return Ok(t);
            }
        }
        info!(
            modality = modality.as_str(),
            n_coeff, "Generating Legendre table..."
        );
        let table = build_table(modality, n_coeff, self.n_interp);
        if let Some(dir) = self.dir.clone() {
            self.store(&dir, &table)?;
        }
        let t = Arc::new(table);
        self.mem.insert(key, Arc::clone(&t));
        Ok(t)
    }

    fn file_name(&self, modality: Modality, n_coeff: usize) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| {
            d.join(format!(
                "legtab_{}_{}_{}.bin",
                modality.as_str(),
                n_coeff,
                self.n_interp
            ))
        })
    }

    fn try_load(&self, modality: Modality, n_coeff: usize) -> FieldResult<Option<LegendreTable>> {
        let Some(path) = self.file_name(modality, n_coeff) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        debug!(path = %path.display(), "Reading Legendre table...");
        match read_table(&path) {
            Ok(t) => {
                if t.modality() != modality
                    || t.n_coeff() != n_coeff
                    || t.n_interp() != self.n_interp
                {
                    Err(FieldError::TableFormat(format!(
                        "{} does not match requested ({}, {}, {})",
                        path.display(),
                        modality.as_str(),
                        n_coeff,
                        self.n_interp
                    )))
                } else {
                    Ok(Some(t))
                }
            }
            Err(e) => Err(e),
        }
    }

    fn store(&self, dir: &Path, table: &LegendreTable) -> FieldResult<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "legtab_{}_{}_{}.bin",
            table.modality().as_str(),
            table.n_coeff(),
            self.n_interp
        ));
        debug!(path = %path.display(), "Writing Legendre table...");
        write_table(&path, table)
    }
}

fn write_table(path: &Path, table: &LegendreTable) -> FieldResult<()> {
    let mut w = BufWriter::new(fs::File::create(path)?);
    w.write_all(MAGIC)?;
    w.write_all(&[FORMAT_VERSION])?;
    let (tag, n_coeff, n_interp) = match table {
        LegendreTable::Eeg(t) => (0u8, t.n_coeff, t.lut.nrows() - 1),
        LegendreTable::Meg(t) => (1u8, t.n_coeff, t.lut.shape()[0] - 1),
    };
    w.write_all(&[tag])?;
    w.write_all(&(n_coeff as u32).to_le_bytes())?;
    w.write_all(&(n_interp as u32).to_le_bytes())?;
    match table {
        LegendreTable::Eeg(t) => {
            for v in t.lut.iter() {
                w.write_all(&v.to_le_bytes())?;
            }
        }
        LegendreTable::Meg(t) => {
            for v in t.lut.iter() {
                w.write_all(&v.to_le_bytes())?;
            }
        }
    }
    w.flush()?;
    Ok(())
}

fn read_table(path: &Path) -> FieldResult<LegendreTable> {
    let mut r = BufReader::new(fs::File::open(path)?);
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(FieldError::TableFormat(format!(
            "{}: bad magic",
            path.display()
        )));
    }
    let mut head = [0u8; 2];
    r.read_exact(&mut head)?;
    if head[0] != FORMAT_VERSION {
        return Err(FieldError::TableFormat(format!(
            "{}: unsupported format version {}",
            path.display(),
            head[0]
        )));
    }
    let modality = match head[1] {
        0 => Modality::Eeg,
        1 => Modality::Meg,
        other => {
            return Err(FieldError::TableFormat(format!(
                "{}: unknown modality tag {}",
                path.display(),
                other
            )))
        }
    };
    let mut buf4 = [0u8; 4];
    r.read_exact(&mut buf4)?;
    let n_coeff = u32::from_le_bytes(buf4) as usize;
    r.read_exact(&mut buf4)?;
    let n_interp = u32::from_le_bytes(buf4) as usize;
    if n_coeff < 2 || n_interp == 0 {
        return Err(FieldError::TableFormat(format!(
            "{}: implausible header (n_coeff={}, n_interp={})",
            path.display(),
            n_coeff,
            n_interp
        )));
    }
    let n_values = match modality {
        Modality::Eeg => (n_interp + 1) * (n_coeff - 1),
        Modality::Meg => (n_interp + 1) * (n_coeff - 1) * 4,
    };
    let mut values = Vec::with_capacity(n_values);
    for _ in 0..n_values {
        r.read_exact(&mut buf4)?;
        values.push(f32::from_le_bytes(buf4));
    }
    // trailing bytes mean a corrupt or mismatched file
    let mut trailing = [0u8; 1];
    if r.read(&mut trailing)? != 0 {
        return Err(FieldError::TableFormat(format!(
            "{}: trailing data",
            path.display()
        )));
    }
    Ok(match modality {
        Modality::Eeg => {
            let lut = Array2::from_shape_vec((n_interp + 1, n_coeff - 1), values)
                .map_err(|e| FieldError::TableFormat(e.to_string()))?;
            // norm factors are derived data, rebuild instead of trusting disk
            LegendreTable::Eeg(EegTable {
                lut,
                n_fact: eeg_n_fact(n_coeff),
                n_coeff,
            })
        }
        Modality::Meg => {
            let lut = Array3::from_shape_vec((n_interp + 1, n_coeff - 1, 4), values)
                .map_err(|e| FieldError::TableFormat(e.to_string()))?;
            LegendreTable::Meg(MegTable {
                lut,
                n_fact: meg_n_fact(n_coeff),
                n_coeff,
            })
        }
    })
}
