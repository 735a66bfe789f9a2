//! Structural B-factor data turned into per-position receptor weights.
//!
//! The structural file has one row per residue:
//!
//! | Protein Key | Residue Index | Filtered B-Factor |
//! |-------------|---------------|-------------------|
//! | `Species_Locus_Receptor` | 0-based position | flexibility value |
//!
//! Rows are grouped by key. Every group is reachable under its raw key and
//! under the canonical `species|locus|receptor` form used by the datasets.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use candle_core::{Device, Tensor};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::WeightRange;
use crate::error::BFactorLoadError;
use crate::Result;

/// Identity of a receptor: `(species, locus, receptor-name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProteinKey {
    pub species: String,
    pub locus: String,
    pub receptor: String,
}

impl ProteinKey {
    pub fn new(
        species: impl Into<String>,
        locus: impl Into<String>,
        receptor: impl Into<String>,
    ) -> Self {
        Self {
            species: species.into(),
            locus: locus.into(),
            receptor: receptor.into(),
        }
    }

    /// Parse the `species_locus_receptor` form of the structural file.
    ///
    /// Only the first three `_`-separated parts are used, so species names
    /// containing underscores do not survive the round trip.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let mut parts = raw.split('_');
        let species = parts.next()?;
        let locus = parts.next()?;
        let receptor = parts.next()?;
        Some(Self::new(species, locus, receptor))
    }

    /// `species|locus|receptor`
    pub fn canonical(&self) -> String {
        format!("{}|{}|{}", self.species, self.locus, self.receptor)
    }
}

impl fmt::Display for ProteinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.species, self.locus, self.receptor)
    }
}

/// Convert a canonical key to the raw naming of the structural file.
fn raw_lookup_key(key: &str) -> String {
    key.replace(['|', ' '], "_")
}

/// Ordered `(residue index, B-factor)` pairs of one protein.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BFactorProfile {
    pub entries: Vec<(usize, f64)>,
}

impl BFactorProfile {
    pub fn new(entries: Vec<(usize, f64)>) -> Self {
        Self { entries }
    }

    /// Scale the strictly positive entries into `range`.
    ///
    /// Zero and negative values are left out entirely, so their positions
    /// keep whatever default the caller starts from.
    pub fn scaled(&self, range: &WeightRange) -> Vec<(usize, f32)> {
        let max_positive = self
            .entries
            .iter()
            .map(|&(_, v)| v)
            .filter(|&v| v > 0.0)
            .fold(f64::NEG_INFINITY, f64::max);

        if !max_positive.is_finite() {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter(|&&(_, v)| v > 0.0)
            .map(|&(idx, v)| (idx, range.scale(v, max_positive)))
            .collect()
    }
}

/// Fixed-length per-position weights, each within the table's [`WeightRange`].
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector(Vec<f32>);

impl WeightVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

#[derive(Debug, Deserialize)]
struct BFactorRow {
    #[serde(rename = "Protein Key")]
    protein_key: String,
    #[serde(rename = "Residue Index")]
    residue_index: i64,
    #[serde(rename = "Filtered B-Factor")]
    bfactor: Option<f64>,
}

/// Read-only lookup from protein key to pre-scaled residue weights.
///
/// Built once and shared between workers; lookups never mutate it.
#[derive(Debug, Clone)]
pub struct BFactorWeightTable {
    range: WeightRange,
    profiles: HashMap<String, Arc<Vec<(usize, f32)>>>,
    proteins: usize,
}

impl BFactorWeightTable {
    /// A table with no profiles. Every lookup yields the default vector.
    pub fn empty(range: WeightRange) -> Self {
        Self {
            range,
            profiles: HashMap::new(),
            proteins: 0,
        }
    }

    /// Build from raw-keyed profiles.
    ///
    /// Keys with fewer than three `_`-separated parts are skipped.
    pub fn from_profiles<I>(profiles: I, range: WeightRange) -> Self
    where
        I: IntoIterator<Item = (String, BFactorProfile)>,
    {
        let mut table = Self::empty(range);
        for (raw_key, profile) in profiles {
            let Some(key) = ProteinKey::from_raw(&raw_key) else {
                debug!("Skipping B-factor group with malformed key {:?}", raw_key);
                continue;
            };
            let scaled = Arc::new(profile.scaled(&range));
            table.profiles.insert(key.canonical(), Arc::clone(&scaled));
            if table.profiles.insert(raw_key, scaled).is_none() {
                table.proteins += 1;
            }
        }
        table
    }

    /// Parse a structural data CSV.
    pub fn load(path: impl AsRef<Path>, range: WeightRange) -> std::result::Result<Self, BFactorLoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BFactorLoadError::NotFound(path.to_path_buf()));
        }

        let parse_err = |source| BFactorLoadError::Parse {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(parse_err)?;

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, BFactorProfile> = HashMap::new();

        for result in reader.deserialize::<BFactorRow>() {
            let row = result.map_err(parse_err)?;
            let Ok(index) = usize::try_from(row.residue_index) else {
                debug!("Ignoring negative residue index for {}", row.protein_key);
                continue;
            };
            let value = row.bfactor.unwrap_or(f64::NAN);
            groups
                .entry(row.protein_key.clone())
                .or_insert_with(|| {
                    order.push(row.protein_key.clone());
                    BFactorProfile::default()
                })
                .entries
                .push((index, value));
        }

        let table = Self::from_profiles(
            order.into_iter().filter_map(|k| groups.remove(&k).map(|p| (k, p))),
            range,
        );
        info!("Loaded B-factor profiles for {} proteins from {:?}", table.len(), path);
        Ok(table)
    }

    /// Load `path` when given, falling back to an empty table with a warning.
    pub fn load_or_empty(path: Option<&Path>, range: WeightRange) -> Self {
        let Some(path) = path else {
            warn!("B-factor CSV file not found. Using default weights.");
            return Self::empty(range);
        };
        match Self::load(path, range) {
            Ok(table) => table,
            Err(e) => {
                warn!("Failed to load B-factor data: {}. Using default weights.", e);
                Self::empty(range)
            }
        }
    }

    pub fn range(&self) -> WeightRange {
        self.range
    }

    /// Number of distinct raw protein keys.
    ///
    /// Raw keys that collapse to the same canonical key still count apart.
    pub fn len(&self) -> usize {
        self.proteins
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    fn resolve(&self, key: &str) -> Option<&Arc<Vec<(usize, f32)>>> {
        self.profiles
            .get(key)
            .or_else(|| self.profiles.get(&raw_lookup_key(key)))
    }

    /// Per-position weights for `key` over a sequence of `length` positions.
    ///
    /// Unknown keys yield `length` copies of `min_weight`. Residue indices at
    /// or beyond `length` are dropped; a repeated index keeps its last value.
    pub fn weights(&self, key: &str, length: usize) -> WeightVector {
        let mut weights = vec![self.range.min_weight; length];
        if let Some(scaled) = self.resolve(key) {
            for &(idx, w) in scaled.iter() {
                if idx < length {
                    weights[idx] = w;
                }
            }
        }
        WeightVector(weights)
    }

    /// Stack the weight vectors of a batch into a `(batch, length)` tensor.
    pub fn weight_matrix(&self, keys: &[String], length: usize, device: &Device) -> Result<Tensor> {
        let rows: Vec<Vec<f32>> = keys
            .par_iter()
            .map(|key| self.weights(key, length).into_inner())
            .collect();
        Ok(Tensor::from_vec(rows.concat(), (keys.len(), length), device)?)
    }
}
