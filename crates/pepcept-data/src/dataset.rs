//! Peptide-receptor samples read from a tabular dataset.
//!
//! Expected columns: `Sequence`, `receptor_sequence`, `plant_species`,
//! `locus_id`, `receptor`; optional `Header_Name`, `y` and the six
//! comma-separated chemical columns (`Sequence_Bulkiness`, `Sequence_Charge`,
//! `Sequence_Hydrophobicity`, `Receptor_Bulkiness`, `Receptor_Charge`,
//! `Receptor_Hydrophobicity`).

use std::io::Read;
use std::path::Path;

use pepcept_model::{ChemicalProfile, ProteinKey};
use serde::Deserialize;
use tracing::info;

use crate::{DataError, Result};

/// One labelled or unlabelled peptide-receptor pair.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionSample {
    pub header_name: String,
    pub peptide: String,
    pub receptor_sequence: String,
    pub plant_species: String,
    pub locus_id: String,
    pub receptor: String,
    pub chemistry: ChemicalProfile,
    pub label: Option<u32>,
}

impl InteractionSample {
    pub fn protein_key(&self) -> ProteinKey {
        ProteinKey::new(&self.plant_species, &self.locus_id, &self.receptor)
    }

    /// `species|locus|receptor`, the key used for structural weights.
    pub fn receptor_id(&self) -> String {
        self.protein_key().canonical()
    }
}

#[derive(Debug, Deserialize)]
struct SampleRow {
    #[serde(rename = "Header_Name", default)]
    header_name: Option<String>,
    #[serde(rename = "Sequence")]
    peptide: String,
    #[serde(rename = "receptor_sequence")]
    receptor_sequence: String,
    plant_species: String,
    locus_id: String,
    receptor: String,
    #[serde(default)]
    y: Option<u32>,

    #[serde(rename = "Sequence_Bulkiness", default)]
    peptide_bulkiness: Option<String>,
    #[serde(rename = "Sequence_Charge", default)]
    peptide_charge: Option<String>,
    #[serde(rename = "Sequence_Hydrophobicity", default)]
    peptide_hydrophobicity: Option<String>,
    #[serde(rename = "Receptor_Bulkiness", default)]
    receptor_bulkiness: Option<String>,
    #[serde(rename = "Receptor_Charge", default)]
    receptor_charge: Option<String>,
    #[serde(rename = "Receptor_Hydrophobicity", default)]
    receptor_hydrophobicity: Option<String>,
}

/// Parse a comma-separated list of per-residue values. Blank means none.
pub fn parse_values(raw: &str) -> std::result::Result<Vec<f32>, std::num::ParseFloatError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',').map(|v| v.trim().parse::<f32>()).collect()
}

impl SampleRow {
    fn into_sample(self, row: usize) -> Result<InteractionSample> {
        let channel = |column: &str, value: Option<&String>| -> Result<Vec<f32>> {
            match value {
                Some(raw) => parse_values(raw).map_err(|e| DataError::InvalidSample {
                    row,
                    message: format!("{column}: {e}"),
                }),
                None => Ok(Vec::new()),
            }
        };

        let chemistry = ChemicalProfile {
            peptide: [
                channel("Sequence_Bulkiness", self.peptide_bulkiness.as_ref())?,
                channel("Sequence_Charge", self.peptide_charge.as_ref())?,
                channel("Sequence_Hydrophobicity", self.peptide_hydrophobicity.as_ref())?,
            ],
            receptor: [
                channel("Receptor_Bulkiness", self.receptor_bulkiness.as_ref())?,
                channel("Receptor_Charge", self.receptor_charge.as_ref())?,
                channel("Receptor_Hydrophobicity", self.receptor_hydrophobicity.as_ref())?,
            ],
        };

        Ok(InteractionSample {
            header_name: self
                .header_name
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| row.to_string()),
            peptide: self.peptide,
            receptor_sequence: self.receptor_sequence,
            plant_species: self.plant_species,
            locus_id: self.locus_id,
            receptor: self.receptor,
            chemistry,
            label: self.y,
        })
    }
}

/// Read every sample from a CSV reader.
pub fn read_samples<R: Read>(reader: R) -> Result<Vec<InteractionSample>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    reader
        .deserialize::<SampleRow>()
        .enumerate()
        .map(|(row, result)| result?.into_sample(row))
        .collect()
}

/// Load a dataset CSV.
pub fn load_samples(path: impl AsRef<Path>) -> Result<Vec<InteractionSample>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let samples = read_samples(file)?;
    info!("Loaded {} samples from {:?}", samples.len(), path);
    Ok(samples)
}

/// Groups items from any iterator into batches of at most `batch_size`.
pub struct BatchIterator<T, I>
where
    I: Iterator<Item = T>,
{
    source: I,
    batch_size: usize,
}

impl<T, I> BatchIterator<T, I>
where
    I: Iterator<Item = T>,
{
    pub fn new(source: I, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
        }
    }
}

impl<T, I> Iterator for BatchIterator<T, I>
where
    I: Iterator<Item = T>,
{
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<T> = self.source.by_ref().take(self.batch_size).collect();
        (!batch.is_empty()).then_some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FULL: &str = "\
Header_Name,Sequence,receptor_sequence,plant_species,locus_id,receptor,y,Sequence_Bulkiness,Receptor_Charge
flg22,QRLSTGSRIN,MKLLS,Arabidopsis thaliana,AT5G46330,FLS2,1,\"1.0,2.0,3.0\",\"0.5, -1\"
,ABC,DEF,Sp,L1,R1,0,,
";

    #[test]
    fn test_read_full_rows() {
        let samples = read_samples(FULL.as_bytes()).unwrap();
        assert_eq!(samples.len(), 2);

        let first = &samples[0];
        assert_eq!(first.header_name, "flg22");
        assert_eq!(first.label, Some(1));
        assert_eq!(first.receptor_id(), "Arabidopsis thaliana|AT5G46330|FLS2");
        assert_eq!(first.chemistry.peptide[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(first.chemistry.receptor[1], vec![0.5, -1.0]);
        // column absent from the file
        assert!(first.chemistry.peptide[1].is_empty());

        // blank header falls back to the row index
        assert_eq!(samples[1].header_name, "1");
        assert!(samples[1].chemistry.peptide[0].is_empty());
    }

    #[test]
    fn test_unlabelled_dataset() {
        let csv = "Sequence,receptor_sequence,plant_species,locus_id,receptor\nAA,CC,Sp,L,R\n";
        let samples = read_samples(csv.as_bytes()).unwrap();
        assert_eq!(samples[0].label, None);
        assert_eq!(samples[0].header_name, "0");
        assert_eq!(samples[0].chemistry, ChemicalProfile::default());
    }

    #[test]
    fn test_bad_chemical_value_names_row() {
        let csv = "Sequence,receptor_sequence,plant_species,locus_id,receptor,Receptor_Charge\n\
                   AA,CC,Sp,L,R,1.0\nAA,CC,Sp,L,R,\"1.0,x\"\n";
        match read_samples(csv.as_bytes()) {
            Err(DataError::InvalidSample { row, message }) => {
                assert_eq!(row, 1);
                assert!(message.starts_with("Receptor_Charge"));
            }
            other => panic!("expected invalid sample, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_required_column() {
        let csv = "Sequence,plant_species\nAA,Sp\n";
        assert!(matches!(read_samples(csv.as_bytes()), Err(DataError::Csv(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        std::fs::write(&path, FULL).unwrap();
        assert_eq!(load_samples(&path).unwrap().len(), 2);
        assert!(matches!(load_samples(dir.path().join("missing.csv")), Err(DataError::Io(_))));
    }

    #[test]
    fn test_batch_iterator() {
        let batches: Vec<Vec<i32>> = BatchIterator::new(1..=7, 3).collect();
        assert_eq!(batches, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }
}
