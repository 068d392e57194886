//! Reading of read tables into an in-memory, interval-indexed read source.

use std::{collections::HashMap, ops::Range, path::Path, sync::Arc};

use bio::data_structures::interval_tree::IntervalTree;
use serde::{Deserialize, Serialize};
use thousands::Separable;

use super::{Mate, Read};
use crate::{collab::ReadSource, common::io::open_read_maybe_gz};

/// One row of the tab-separated read table.
///
/// Positions are 0-based, strands are `+`/`-`, qualities are phred+33 and a
/// mate chromosome of `*` marks an unmapped mate.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct ReadRecord {
    pub sample: String,
    pub name: String,
    pub mate_no: u8,
    pub chrom: String,
    pub pos: i64,
    pub leading_clip: usize,
    pub mapq: u8,
    pub strand: String,
    pub mapped: bool,
    pub mate_chrom: String,
    pub mate_pos: i64,
    pub mate_strand: String,
    pub template_len: i64,
    pub bases: String,
    pub quals: String,
}

impl TryFrom<ReadRecord> for Read {
    type Error = anyhow::Error;

    fn try_from(record: ReadRecord) -> Result<Self, Self::Error> {
        if record.bases.len() != record.quals.len() {
            anyhow::bail!(
                "read {}/{} has {} bases but {} qualities",
                &record.sample,
                &record.name,
                record.bases.len(),
                record.quals.len()
            );
        }
        let quals = record
            .quals
            .bytes()
            .map(|q| {
                q.checked_sub(33)
                    .ok_or_else(|| anyhow::anyhow!("invalid quality character {:?}", q as char))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mate = if record.mate_chrom == "*" {
            None
        } else {
            Some(Mate {
                chrom: record.mate_chrom,
                pos: record.mate_pos,
                is_reverse: record.mate_strand == "-",
            })
        };
        Ok(Read {
            sample: record.sample,
            name: record.name,
            first_in_pair: record.mate_no != 2,
            chrom: record.chrom,
            pos: record.pos,
            leading_clip: record.leading_clip,
            mapq: record.mapq,
            is_reverse: record.strand == "-",
            is_mapped: record.mapped,
            mate,
            template_len: record.template_len,
            bases: record.bases.to_ascii_uppercase().into_bytes(),
            quals,
        })
    }
}

/// Reads held in memory, indexed per chromosome.
#[derive(Default)]
pub struct InMemoryReadSource {
    reads: Vec<Arc<Read>>,
    trees: HashMap<String, IntervalTree<i64, usize>>,
}

impl InMemoryReadSource {
    pub fn new(reads: Vec<Read>) -> Self {
        let mut result = Self::default();
        for read in reads {
            if read.is_empty() {
                continue;
            }
            let range = read.layout_start()..read.layout_end();
            result
                .trees
                .entry(read.chrom.clone())
                .or_insert_with(IntervalTree::new)
                .insert(range, result.reads.len());
            result.reads.push(Arc::new(read));
        }
        result
    }

    /// Load a tab-separated read table with header line.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        tracing::info!("loading reads from {:?}", path.as_ref());
        let before_loading = std::time::Instant::now();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .from_reader(open_read_maybe_gz(path.as_ref())?);
        let reads = reader
            .deserialize::<ReadRecord>()
            .map(|record| {
                record
                    .map_err(|e| anyhow::anyhow!("problem parsing read record: {}", e))
                    .and_then(Read::try_from)
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(
            "... loaded {} reads in {:?}",
            reads.len().separate_with_commas(),
            before_loading.elapsed()
        );
        Ok(Self::new(reads))
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

impl ReadSource for InMemoryReadSource {
    fn fetch(&self, chrom: &str, range: Range<i64>) -> Result<Vec<Arc<Read>>, anyhow::Error> {
        if range.start >= range.end {
            return Ok(Vec::new());
        }
        let mut result = self
            .trees
            .get(chrom)
            .map(|tree| {
                tree.find(range)
                    .map(|entry| self.reads[*entry.data()].clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        result.sort_by(|a, b| {
            (a.pos, &a.name, a.first_in_pair).cmp(&(b.pos, &b.name, b.first_in_pair))
        });
        Ok(result)
    }
}
