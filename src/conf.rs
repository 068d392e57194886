//! Configuration of the assembly and calling pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::err::ConfigError;

/// Mapping quality below which a breakend side is not trusted.
pub const MIN_CONFIDENT_MAPQ: u8 = 30;

/// Values consumed by the pipeline stages, loadable from TOML.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct CallerConf {
    /// Number of worker threads.
    pub threads: usize,
    /// Radius of the read window around each junction.
    pub junction_buffer: i64,
    /// Maximal number of junctions in one junction group.
    pub max_junctions_per_group: usize,
    /// Minimal number of reads to build a primary assembly.
    pub min_junction_reads: usize,
    /// Minimal size of an event to call.
    pub min_event_size: usize,
    /// Minimal length of the mapped block anchoring a single-sided call.
    pub min_anchor_length: usize,
    /// Minimal number of supporting fragments over all samples for a call.
    pub min_support_fragments: usize,
    /// Duplications shorter than this are reported as insertions.
    pub min_dup_length: usize,
    /// Duplications longer than this are reported as plain breakends.
    pub max_dup_length: usize,
    /// Maximal distance of assemblies considered for consolidation.
    pub max_assembly_dedupe_distance: i64,
    /// Minimal sequence overlap for consolidating primary assemblies.
    pub min_consolidation_overlap: usize,
    /// Cap of the minimal overlap window in phased merging.
    pub phased_merge_max_overlap: usize,
    /// Proximity window for positional reconciliation of calls.
    pub breakend_merge_distance: i64,
    /// Fragments longer than this count as discordant.
    pub max_fragment_length: i64,
    /// Number of `N` bases between components of a gapped assembly.
    pub gap_spacer_length: usize,
    /// k-mer size of the bundled aligner.
    pub aligner_kmer_size: usize,
    /// Maximal mismatch rate accepted by the bundled support checker.
    pub support_max_mismatch_rate: f64,
}

impl Default for CallerConf {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            junction_buffer: 500,
            max_junctions_per_group: 64,
            min_junction_reads: 2,
            min_event_size: 30,
            min_anchor_length: 30,
            min_support_fragments: 2,
            min_dup_length: 10,
            max_dup_length: 100_000,
            max_assembly_dedupe_distance: 1000,
            min_consolidation_overlap: 100,
            phased_merge_max_overlap: 30,
            breakend_merge_distance: 10,
            max_fragment_length: 1000,
            gap_spacer_length: 10,
            aligner_kmer_size: 15,
            support_max_mismatch_rate: 0.05,
        }
    }
}

impl CallerConf {
    /// Load configuration from TOML file at `path`, missing keys take defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let toml_str = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("could not read configuration {:?}: {}", path.as_ref(), e)
        })?;
        let conf: CallerConf = toml::from_str(&toml_str)
            .map_err(|e| anyhow::anyhow!("could not parse configuration: {}", e))?;
        conf.validate()?;
        Ok(conf)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: &[(&'static str, i64)] = &[
            ("threads", self.threads as i64),
            ("junction_buffer", self.junction_buffer),
            ("max_junctions_per_group", self.max_junctions_per_group as i64),
            ("min_event_size", self.min_event_size as i64),
            ("max_dup_length", self.max_dup_length as i64),
            ("min_consolidation_overlap", self.min_consolidation_overlap as i64),
            ("phased_merge_max_overlap", self.phased_merge_max_overlap as i64),
            ("max_fragment_length", self.max_fragment_length),
            ("aligner_kmer_size", self.aligner_kmer_size as i64),
        ];
        for &(name, value) in positive {
            if value <= 0 {
                return Err(ConfigError::NotPositive { name });
            }
        }
        if !(0.0..=1.0).contains(&self.support_max_mismatch_rate) {
            return Err(ConfigError::NotFraction {
                name: "support_max_mismatch_rate",
                value: self.support_max_mismatch_rate,
            });
        }
        Ok(())
    }
}
