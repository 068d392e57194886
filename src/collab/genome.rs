//! Reference genome held in memory.

use std::path::Path;

use bio::io::fasta;
use indexmap::IndexMap;
use thousands::Separable;

use super::GenomeSource;
use crate::common::io::open_read_maybe_gz;

/// Chromosome sequences loaded from a (optionally gzipped) FASTA file.
#[derive(Debug, Default, Clone)]
pub struct ReferenceGenome {
    chroms: IndexMap<String, Vec<u8>>,
}

impl ReferenceGenome {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        tracing::info!("loading reference from {:?}", path.as_ref());
        let reader = fasta::Reader::new(open_read_maybe_gz(path.as_ref())?);
        let mut chroms = IndexMap::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| anyhow::anyhow!("problem reading FASTA {:?}: {}", path.as_ref(), e))?;
            chroms.insert(record.id().to_owned(), record.seq().to_ascii_uppercase());
        }
        let genome = Self { chroms };
        tracing::info!(
            "... loaded {} chromosomes with {} bases",
            genome.chroms.len(),
            genome.total_len().separate_with_commas()
        );
        Ok(genome)
    }

    pub fn from_chroms<I: IntoIterator<Item = (String, Vec<u8>)>>(chroms: I) -> Self {
        Self {
            chroms: chroms
                .into_iter()
                .map(|(name, seq)| (name, seq.to_ascii_uppercase()))
                .collect(),
        }
    }

    pub fn total_len(&self) -> usize {
        self.chroms.values().map(|seq| seq.len()).sum()
    }
}

impl GenomeSource for ReferenceGenome {
    fn chrom_names(&self) -> Vec<&str> {
        self.chroms.keys().map(|name| name.as_str()).collect()
    }

    fn chrom_seq(&self, chrom: &str) -> Option<&[u8]> {
        self.chroms.get(chrom).map(|seq| seq.as_slice())
    }
}
