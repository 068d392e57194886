//! Exact k-mer diagonal aligner for small references.

use std::collections::HashMap;

use itertools::Itertools;

use super::{Aligner, GenomeSource};
use crate::{
    assembly::{AlignedAssembly, AlignmentBlock, GappedAssembly},
    common::reverse_complement,
};

/// Mapping quality of an uncontested block.
pub const MAX_MAPQ: u8 = 60;
/// k-mers occurring more often in the reference are not indexed.
const MAX_KMER_OCCURRENCES: usize = 64;

/// Ungapped diagonal run of k-mer hits.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Run {
    chrom: usize,
    /// Query interval on the forward strand of the assembly.
    query_start: usize,
    query_end: usize,
    ref_start: i64,
    inverted: bool,
}

impl Run {
    fn len(&self) -> usize {
        self.query_end - self.query_start
    }

    /// Restrict to the query interval `start..end`.
    fn clip(&self, start: usize, end: usize) -> Run {
        let ref_start = if self.inverted {
            self.ref_start + (self.query_end - end) as i64
        } else {
            self.ref_start + (start - self.query_start) as i64
        };
        Run {
            query_start: start,
            query_end: end,
            ref_start,
            ..*self
        }
    }

    fn overlap(&self, other: &Run) -> usize {
        self.query_end
            .min(other.query_end)
            .saturating_sub(self.query_start.max(other.query_start))
    }
}

/// Places assemblies by chaining exact k-mer hits along diagonals on both
/// strands.
///
/// The longest runs are chosen greedily and clipped where they overlap
/// already chosen ones; uncovered stretches become unmapped blocks.  The
/// mapping quality reflects the margin of a run over the longest competing
/// run covering the same part of the assembly.
pub struct KmerAligner {
    chroms: Vec<String>,
    k: usize,
    index: HashMap<u64, Vec<(usize, i64)>>,
}

impl KmerAligner {
    pub fn new<G: GenomeSource + ?Sized>(genome: &G, k: usize) -> Result<Self, anyhow::Error> {
        if k == 0 || k > 31 {
            anyhow::bail!("k-mer size must be within 1..=31, was {}", k);
        }
        let before_indexing = std::time::Instant::now();
        let chroms = genome
            .chrom_names()
            .into_iter()
            .map(|name| name.to_owned())
            .collect::<Vec<_>>();
        let mut index: HashMap<u64, Vec<(usize, i64)>> = HashMap::new();
        for (chrom_no, chrom) in chroms.iter().enumerate() {
            let seq = genome.chrom_seq(chrom).unwrap_or_default();
            for (pos, code) in kmer_codes(seq, k) {
                index.entry(code).or_default().push((chrom_no, pos as i64));
            }
        }
        index.retain(|_, hits| hits.len() <= MAX_KMER_OCCURRENCES);
        tracing::debug!(
            "indexed {} distinct {}-mers in {:?}",
            index.len(),
            k,
            before_indexing.elapsed()
        );
        Ok(Self { chroms, k, index })
    }

    /// Alignment blocks covering all of `bases`.
    pub fn align_bases(&self, bases: &[u8]) -> Vec<AlignmentBlock> {
        let mut runs = self.find_runs(bases, false);
        runs.append(&mut self.find_runs(&reverse_complement(bases), true));
        runs.sort_by(|a, b| {
            b.len().cmp(&a.len()).then_with(|| {
                (a.chrom, a.ref_start, a.inverted).cmp(&(b.chrom, b.ref_start, b.inverted))
            })
        });

        let mut chosen: Vec<(Run, u8)> = Vec::new();
        for (i, run) in runs.iter().enumerate() {
            let Some((start, end)) = largest_uncovered(run, chosen.iter().map(|(r, _)| r)) else {
                continue;
            };
            if end - start < self.k {
                continue;
            }
            let clipped = run.clip(start, end);
            let competitor = runs
                .iter()
                .enumerate()
                .filter(|(j, other)| *j != i && 2 * other.overlap(&clipped) >= clipped.len())
                .map(|(_, other)| other.overlap(&clipped))
                .max()
                .unwrap_or(0);
            let margin = clipped.len().saturating_sub(competitor);
            let mapq = (MAX_MAPQ as usize * margin / clipped.len()) as u8;
            chosen.push((clipped, mapq));
        }
        chosen.sort_by_key(|(run, _)| run.query_start);

        let mut blocks = Vec::new();
        let mut pos = 0;
        for (run, mapq) in chosen {
            if run.query_start > pos {
                blocks.push(AlignmentBlock::unmapped(pos, run.query_start - pos));
            }
            blocks.push(AlignmentBlock::mapped(
                &self.chroms[run.chrom],
                run.query_start,
                run.ref_start,
                run.len(),
                run.inverted,
                mapq,
            ));
            pos = run.query_end;
        }
        if pos < bases.len() {
            blocks.push(AlignmentBlock::unmapped(pos, bases.len() - pos));
        }
        blocks
    }

    /// Runs of hits of `query`; with `inverted`, `query` is the reverse
    /// complement and the runs are reported in forward coordinates.
    fn find_runs(&self, query: &[u8], inverted: bool) -> Vec<Run> {
        let mut diagonals: HashMap<(usize, i64), Vec<usize>> = HashMap::new();
        for (q, code) in kmer_codes(query, self.k) {
            if let Some(hits) = self.index.get(&code) {
                for (chrom, pos) in hits {
                    diagonals.entry((*chrom, pos - q as i64)).or_default().push(q);
                }
            }
        }

        let mut result = Vec::new();
        let mut push_run = |chrom: usize, diagonal: i64, start: usize, end: usize| {
            let ref_start = start as i64 + diagonal;
            result.push(if inverted {
                Run {
                    chrom,
                    query_start: query.len() - end,
                    query_end: query.len() - start,
                    ref_start,
                    inverted,
                }
            } else {
                Run {
                    chrom,
                    query_start: start,
                    query_end: end,
                    ref_start,
                    inverted,
                }
            });
        };
        for ((chrom, diagonal), qs) in diagonals.into_iter().sorted_by_key(|(key, _)| *key) {
            let (mut start, mut last) = (qs[0], qs[0]);
            for &q in &qs[1..] {
                // a single mismatch leaves a gap of k + 1 between hits
                if q - last > self.k + 1 {
                    push_run(chrom, diagonal, start, last + self.k);
                    start = q;
                }
                last = q;
            }
            push_run(chrom, diagonal, start, last + self.k);
        }
        result
    }
}

/// Largest part of `run` not covered by any of `chosen`.
fn largest_uncovered<'a, I>(run: &Run, chosen: I) -> Option<(usize, usize)>
where
    I: Iterator<Item = &'a Run>,
{
    let mut covered = chosen
        .filter(|other| other.overlap(run) > 0)
        .map(|other| (other.query_start, other.query_end))
        .collect::<Vec<_>>();
    covered.sort_unstable();
    let mut best: Option<(usize, usize)> = None;
    let mut pos = run.query_start;
    for (start, end) in covered.into_iter().chain(std::iter::once((run.query_end, run.query_end))) {
        let gap_end = start.min(run.query_end);
        if gap_end > pos && best.map_or(true, |(s, e)| gap_end - pos > e - s) {
            best = Some((pos, gap_end));
        }
        pos = pos.max(end);
    }
    best
}

/// 2-bit codes of all k-mers without ambiguous bases.
fn kmer_codes(seq: &[u8], k: usize) -> impl Iterator<Item = (usize, u64)> + '_ {
    let mask = (1u64 << (2 * k)) - 1;
    let mut code = 0u64;
    let mut valid = 0usize;
    seq.iter().enumerate().filter_map(move |(i, base)| {
        let bits = match base {
            b'A' | b'a' => 0,
            b'C' | b'c' => 1,
            b'G' | b'g' => 2,
            b'T' | b't' => 3,
            _ => {
                valid = 0;
                return None;
            }
        };
        code = ((code << 2) | bits) & mask;
        valid += 1;
        (valid >= k).then_some((i + 1 - k, code))
    })
}

impl Aligner for KmerAligner {
    fn align(&self, gapped: GappedAssembly) -> Result<AlignedAssembly, anyhow::Error> {
        let blocks = self.align_bases(gapped.assembly.seq().bases());
        Ok(AlignedAssembly { gapped, blocks })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    use super::KmerAligner;
    use crate::{
        assembly::{test::random_sequence, AlignmentBlock},
        collab::ReferenceGenome,
        common::{complement, reverse_complement},
    };

    /// A base other than `base`.
    pub(crate) fn other_base(base: u8) -> u8 {
        match base {
            b'A' => b'C',
            b'C' => b'G',
            b'G' => b'T',
            _ => b'A',
        }
    }

    pub(crate) fn genome(chr1: Vec<u8>, chr2: Vec<u8>) -> ReferenceGenome {
        ReferenceGenome::from_chroms(vec![
            (String::from("chr1"), chr1),
            (String::from("chr2"), chr2),
        ])
    }

    #[test]
    fn contiguous_match() -> Result<(), anyhow::Error> {
        let chr1 = random_sequence(2000, 31);
        let aligner = KmerAligner::new(&genome(chr1.clone(), random_sequence(1000, 32)), 15)?;

        let blocks = aligner.align_bases(&chr1[100..400]);

        assert_eq!(blocks, vec![AlignmentBlock::mapped("chr1", 0, 100, 300, false, 60)]);
        Ok(())
    }

    #[test]
    fn deletion_and_insertion() -> Result<(), anyhow::Error> {
        let mut chr1 = random_sequence(2000, 33);
        chr1[300] = other_base(chr1[500]);
        chr1[499] = other_base(chr1[299]);
        let aligner = KmerAligner::new(&genome(chr1.clone(), random_sequence(1000, 34)), 15)?;

        let mut query = chr1[100..300].to_vec();
        query.extend_from_slice(&chr1[500..700]);
        assert_eq!(
            aligner.align_bases(&query),
            vec![
                AlignmentBlock::mapped("chr1", 0, 100, 200, false, 60),
                AlignmentBlock::mapped("chr1", 200, 500, 200, false, 60),
            ]
        );

        let mut query = chr1[100..300].to_vec();
        query.extend_from_slice(&random_sequence(50, 35)[..]);
        query.extend_from_slice(&chr1[300..500]);
        let blocks = aligner.align_bases(&query);
        assert_eq!(blocks.len(), 3);
        assert!(!blocks[1].is_mapped());
        assert_eq!(blocks[2].ref_end(), 500);
        assert_eq!(blocks.iter().map(|b| b.length).sum::<usize>(), 450);
        Ok(())
    }

    #[test]
    fn inverted_block() -> Result<(), anyhow::Error> {
        let mut chr1 = random_sequence(2000, 36);
        let mut chr2 = random_sequence(1000, 37);
        chr1[300] = other_base(complement(chr2[299]));
        chr2[300] = other_base(complement(chr1[299]));
        let aligner = KmerAligner::new(&genome(chr1.clone(), chr2.clone()), 15)?;

        let mut query = chr1[100..300].to_vec();
        query.extend_from_slice(&reverse_complement(&chr2[100..300]));

        assert_eq!(
            aligner.align_bases(&query),
            vec![
                AlignmentBlock::mapped("chr1", 0, 100, 200, false, 60),
                AlignmentBlock::mapped("chr2", 200, 100, 200, true, 60),
            ]
        );
        Ok(())
    }

    #[test]
    fn unmapped_spacer() -> Result<(), anyhow::Error> {
        let chr1 = random_sequence(2000, 38);
        let aligner = KmerAligner::new(&genome(chr1.clone(), random_sequence(1000, 39)), 15)?;

        let mut query = chr1[100..200].to_vec();
        query.extend_from_slice(b"NNNNNNNNNN");
        query.extend_from_slice(&chr1[1000..1100]);

        let blocks = aligner.align_bases(&query);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1], AlignmentBlock::unmapped(100, 10));
        Ok(())
    }
}
