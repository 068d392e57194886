//! Greedy read-folding assembler around junctions.

use std::sync::Arc;

use super::{PrimaryAssembler, SupportChecker};
use crate::{
    assembly::{sequence::Sequence, Anchor, Placement, PrimaryAssembly, SupportedAssembly},
    collab::OverlapSupportChecker,
    conf::CallerConf,
    junctions::{Junction, JunctionGroup},
    reads::Read,
};

/// Minimal overlap of a read with the growing contig.
pub const MIN_READ_OVERLAP: usize = 20;

/// Folds the reads around each junction into one consensus contig.
///
/// Reads are taken in order of their clip-adjusted start; each read is
/// placed at its best overlap with the contig built so far and merged in.
/// Reads without overlap are skipped.
#[derive(Debug, Clone)]
pub struct PileupAssembler {
    junction_buffer: i64,
    min_junction_reads: usize,
    checker: OverlapSupportChecker,
}

impl PileupAssembler {
    pub fn new(conf: &CallerConf) -> Self {
        Self {
            junction_buffer: conf.junction_buffer,
            min_junction_reads: conf.min_junction_reads,
            checker: OverlapSupportChecker::new(conf.support_max_mismatch_rate),
        }
    }

    /// Assemble the reads around `junction`, `None` if too few reads fold.
    pub fn assemble_junction(
        &self,
        junction: &Junction,
        reads: &[Arc<Read>],
    ) -> Result<Option<PrimaryAssembly>, anyhow::Error> {
        let window_start = junction.pos - 1 - self.junction_buffer;
        let window_end = junction.pos + self.junction_buffer;
        let mut window = reads
            .iter()
            .filter(|read| {
                !read.is_empty()
                    && read.chrom == junction.chrom
                    && read.layout_start() < window_end
                    && read.layout_end() > window_start
            })
            .cloned()
            .collect::<Vec<_>>();
        if window.len() < self.min_junction_reads {
            return Ok(None);
        }
        window.sort_by(|a, b| {
            (a.layout_start(), &a.name, a.first_in_pair).cmp(&(
                b.layout_start(),
                &b.name,
                b.first_in_pair,
            ))
        });

        let seed = window[0].clone();
        let mut contig = single_read_assembly(&seed)?;
        let mut seed_offset = 0usize;
        for read in &window[1..] {
            let candidate = single_read_assembly(read)?;
            let min_overlap = MIN_READ_OVERLAP.min(read.len());
            let Some(offset) = self.checker.support_offset(&contig, &candidate, min_overlap)
            else {
                tracing::trace!("read {} does not fold into contig", read.fragment_name());
                continue;
            };
            contig = contig.merge(&candidate, offset)?;
            if offset < 0 {
                seed_offset += (-offset) as usize;
            }
        }
        if contig.support_len() < self.min_junction_reads {
            return Ok(None);
        }

        let anchor_offset = seed_offset as i64 + seed.leading_clip as i64 + (junction.pos - 1)
            - seed.pos;
        let anchor_offset = anchor_offset.clamp(0, contig.len() as i64 - 1) as usize;
        Ok(Some(PrimaryAssembly {
            assembly: contig,
            anchor: Anchor {
                chrom: junction.chrom.clone(),
                pos: junction.pos,
                offset: anchor_offset,
            },
        }))
    }
}

fn single_read_assembly(read: &Arc<Read>) -> Result<SupportedAssembly, anyhow::Error> {
    let seq = Sequence::new(read.bases.clone(), read.quals.clone())?;
    Ok(SupportedAssembly::new(
        seq,
        std::iter::once(Placement::new(read.clone(), 0)),
    )?)
}

impl PrimaryAssembler for PileupAssembler {
    fn assemble(
        &self,
        group: &JunctionGroup,
        reads: &[Arc<Read>],
    ) -> Result<Vec<PrimaryAssembly>, anyhow::Error> {
        let mut result = Vec::new();
        for junction in &group.junctions {
            if let Some(primary) = self.assemble_junction(junction, reads)? {
                result.push(primary);
            }
        }
        tracing::debug!(
            "group {} ({}:{}-{}): {} primary assemblies from {} junctions",
            group.id,
            &group.chrom,
            group.fetch_start + 1,
            group.fetch_end,
            result.len(),
            group.junctions.len()
        );
        Ok(result)
    }
}
