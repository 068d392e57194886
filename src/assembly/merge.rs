//! Consensus merging of two decomposed sequences.

use super::{
    decompose::{Decomposition, Node, RepeatNode},
    sequence::Sequence,
};
use crate::err::MergeError;

/// Position within a node stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    node: usize,
    offset: usize,
}

impl Cursor {
    const START: Cursor = Cursor { node: 0, offset: 0 };

    fn at_end(&self, nodes: &[Node]) -> bool {
        self.node >= nodes.len()
    }

    fn remaining_in_node(&self, nodes: &[Node]) -> usize {
        nodes[self.node].len() - self.offset
    }

    /// Cursor moved `count` bases downstream, crossing node boundaries.
    fn advance(self, nodes: &[Node], mut count: usize) -> Cursor {
        let mut result = self;
        while count > 0 && !result.at_end(nodes) {
            let step = count.min(result.remaining_in_node(nodes));
            result.offset += step;
            count -= step;
            if result.offset == nodes[result.node].len() {
                result = Cursor {
                    node: result.node + 1,
                    offset: 0,
                };
            }
        }
        result
    }

    /// Copy up to `count` bases into `out`, returning the moved cursor.
    fn copy_into(self, nodes: &[Node], count: usize, out: &mut Sequence) -> Cursor {
        let mut result = self;
        let mut left = count;
        while left > 0 && !result.at_end(nodes) {
            let step = left.min(result.remaining_in_node(nodes));
            let seq = nodes[result.node].seq();
            out.extend_from(&seq.slice(result.offset, result.offset + step));
            left -= step;
            result = result.advance(nodes, step);
        }
        result
    }
}

/// Merge `right` into `left`, with `right` starting at `offset` in `left`.
///
/// A negative offset places `left` at `-offset` within `right` instead.
/// The prefix before the overlap and the tail after it are copied
/// verbatim; in the overlap the base of higher quality wins (ties go to
/// the left side), and where both sides are within a tandem repeat the
/// repeat of higher quality is taken as a whole with per-base maximum
/// qualities.
///
/// A repeat that is the last node of its sequence may be cut short by the
/// sequence end, so its copy count is unknown.  Such an open repeat loses
/// against a repeat with a downstream flank regardless of quality; if both
/// are open, the longer remainder wins.
pub fn merge(
    left: &Decomposition,
    right: &Decomposition,
    offset: i64,
) -> Result<Sequence, MergeError> {
    if offset < 0 {
        return merge(right, left, -offset);
    }
    if left.is_empty() || right.is_empty() {
        return Err(MergeError::EmptySequence);
    }
    let offset = offset as usize;
    if offset > left.len() {
        return Err(MergeError::NoOverlap {
            offset,
            len: left.len(),
        });
    }

    let (lnodes, rnodes) = (left.nodes(), right.nodes());
    let mut out = Sequence::default();
    let mut lcur = Cursor::START.copy_into(lnodes, offset, &mut out);
    let mut rcur = Cursor::START;

    while !lcur.at_end(lnodes) && !rcur.at_end(rnodes) {
        let (lnode, rnode) = (&lnodes[lcur.node], &rnodes[rcur.node]);
        let lrem = lcur.remaining_in_node(lnodes);
        let rrem = rcur.remaining_in_node(rnodes);
        match (lnode.as_repeat(), rnode.as_repeat()) {
            (Some(lrep), Some(rrep)) => {
                let lopen = lcur.node + 1 == lnodes.len();
                let ropen = rcur.node + 1 == rnodes.len();
                let left_wins = match (lopen, ropen) {
                    (false, true) => true,
                    (true, false) => false,
                    (true, true) => lrem >= rrem,
                    (false, false) => lrep.quality() >= rrep.quality(),
                };
                if left_wins {
                    merge_repeats(lrep, lcur.offset, rrep, rcur.offset, rrem, &mut out);
                } else {
                    merge_repeats(rrep, rcur.offset, lrep, lcur.offset, lrem, &mut out);
                }
                lcur = lcur.advance(lnodes, lrem);
                rcur = rcur.advance(rnodes, rrem);
            }
            _ => {
                let span = lrem.min(rrem);
                let (lseq, rseq) = (lnode.seq(), rnode.seq());
                for i in 0..span {
                    let (lpos, rpos) = (lcur.offset + i, rcur.offset + i);
                    if lseq.quals()[lpos] >= rseq.quals()[rpos] {
                        out.push(lseq.bases()[lpos], lseq.quals()[lpos]);
                    } else {
                        out.push(rseq.bases()[rpos], rseq.quals()[rpos]);
                    }
                }
                lcur = lcur.advance(lnodes, span);
                rcur = rcur.advance(rnodes, span);
            }
        }
    }

    lcur.copy_into(lnodes, usize::MAX, &mut out);
    rcur.copy_into(rnodes, usize::MAX, &mut out);
    Ok(out)
}

/// Emit the rest of `winner` from `woffset`; with equal unit lengths, the
/// qualities of aligned positions of `other` raise the output qualities.
fn merge_repeats(
    winner: &RepeatNode,
    woffset: usize,
    other: &RepeatNode,
    ooffset: usize,
    orem: usize,
    out: &mut Sequence,
) {
    let same_unit = winner.unit_len() == other.unit_len();
    let oquals = other.seq().quals();
    let mut i = 0;
    for node in winner.shift(woffset, None) {
        let seq = node.seq();
        for (base, qual) in seq.bases().iter().zip(seq.quals()) {
            let qual = if same_unit && i < orem {
                (*qual).max(oquals[ooffset + i])
            } else {
                *qual
            };
            out.push(*base, qual);
            i += 1;
        }
    }
}

/// Decompose both sequences and merge them.
pub fn merge_sequences(
    left: &Sequence,
    right: &Sequence,
    offset: i64,
) -> Result<Sequence, MergeError> {
    merge(
        &Decomposition::new(left),
        &Decomposition::new(right),
        offset,
    )
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::merge_sequences;
    use crate::{
        assembly::{sequence::Sequence, test::random_sequence},
        err::MergeError,
    };

    #[test]
    fn overlap_reproduces_source() -> Result<(), anyhow::Error> {
        for seed in 0..20 {
            let bases = random_sequence(100, seed);
            let left = Sequence::with_uniform_quality(&bases[..60], 20);
            let right = Sequence::with_uniform_quality(&bases[40..], 30);

            let merged = merge_sequences(&left, &right, 40)?;

            assert_eq!(merged.bases(), &bases[..]);
            assert_eq!(&merged.quals()[..40], &[20u8; 40][..]);
            assert_eq!(&merged.quals()[40..], &[30u8; 60][..]);
        }
        Ok(())
    }

    #[test]
    fn negative_offset_swaps_inputs() -> Result<(), anyhow::Error> {
        let bases = random_sequence(50, 7);
        let left = Sequence::with_uniform_quality(&bases[20..], 20);
        let right = Sequence::with_uniform_quality(&bases[..30], 20);

        let merged = merge_sequences(&left, &right, -20)?;

        assert_eq!(merged.bases(), &bases[..]);
        Ok(())
    }

    #[test]
    fn contained_right_keeps_left_tail() -> Result<(), anyhow::Error> {
        let bases = random_sequence(40, 3);
        let left = Sequence::with_uniform_quality(&bases, 20);
        let right = Sequence::with_uniform_quality(&bases[10..20], 10);

        let merged = merge_sequences(&left, &right, 10)?;

        assert_eq!(merged, left);
        Ok(())
    }

    #[test]
    fn abutting_sequences_concatenate() -> Result<(), anyhow::Error> {
        let bases = random_sequence(30, 5);
        let left = Sequence::with_uniform_quality(&bases[..12], 20);
        let right = Sequence::with_uniform_quality(&bases[12..], 20);

        let merged = merge_sequences(&left, &right, 12)?;

        assert_eq!(merged.bases(), &bases[..]);
        Ok(())
    }

    #[rstest::rstest]
    #[case(10, 30, b'T')]
    #[case(30, 10, b'G')]
    #[case(20, 20, b'G')]
    fn higher_quality_base_wins(
        #[case] left_qual: u8,
        #[case] right_qual: u8,
        #[case] expected: u8,
    ) -> Result<(), anyhow::Error> {
        let left_bases = b"ACGTTGCAGCTA".to_vec();
        let mut right_bases = b"TGCAGCTACCAG".to_vec();
        // position 5 of the output: left has `G`, right has `T`
        right_bases[1] = b'T';
        let mut left_quals = vec![25; left_bases.len()];
        left_quals[5] = left_qual;
        let mut right_quals = vec![25; right_bases.len()];
        right_quals[1] = right_qual;
        let left = Sequence::new(left_bases, left_quals)?;
        let right = Sequence::new(right_bases, right_quals)?;

        let merged = merge_sequences(&left, &right, 4)?;

        assert_eq!(merged.len(), 16);
        assert_eq!(merged.bases()[5], expected);
        assert_eq!(merged.quals()[5], left_qual.max(right_qual));
        Ok(())
    }

    #[rstest::rstest]
    #[case(20, 40, "GTTGCACACACACATTGG")]
    #[case(40, 20, "GTTGCACACACACACATTGG")]
    fn repeat_of_higher_quality_wins(
        #[case] left_qual: u8,
        #[case] right_qual: u8,
        #[case] expected: &str,
    ) -> Result<(), anyhow::Error> {
        let left = Sequence::with_uniform_quality(b"GTTGCACACACACACATTGG", left_qual);
        let right = Sequence::with_uniform_quality(b"GTTGCACACACACATTGG", right_qual);

        let merged = merge_sequences(&left, &right, 0)?;

        assert_eq!(merged.bases_str(), expected);
        assert!(merged.len() <= left.len() + right.len());
        // flanks are merged base by base, repeat qualities take the maximum
        assert!(merged.quals()[4..expected.len() - 4]
            .iter()
            .all(|q| *q == left_qual.max(right_qual)));
        Ok(())
    }

    #[test]
    fn flanked_repeat_wins_over_truncated_one() -> Result<(), anyhow::Error> {
        // the left repeat runs into the sequence end
        let left = Sequence::with_uniform_quality(b"GTTGCACACACACACA", 40);
        let right = Sequence::with_uniform_quality(b"GTTGCACACACACACACATTGG", 20);

        let merged = merge_sequences(&left, &right, 0)?;

        assert_eq!(merged.bases_str(), "GTTGCACACACACACACATTGG");
        assert_eq!(&merged.quals()[..16], &[40u8; 16][..]);
        assert_eq!(&merged.quals()[16..], &[20u8; 6][..]);
        Ok(())
    }

    #[test]
    fn output_never_exceeds_inputs() -> Result<(), anyhow::Error> {
        let mut rng = fastrand::Rng::with_seed(42);
        for _ in 0..200 {
            let make = |rng: &mut fastrand::Rng, len: usize| {
                let bases = (0..len)
                    .map(|_| b"ACA"[rng.usize(0..3)])
                    .collect::<Vec<_>>();
                let quals = (0..len).map(|_| rng.u8(1..41)).collect::<Vec<_>>();
                Sequence::new(bases, quals)
            };
            let left_len = rng.usize(1..80);
            let left = make(&mut rng, left_len)?;
            let right_len = rng.usize(1..80);
            let right = make(&mut rng, right_len)?;
            let offset = rng.i64(0..=left.len() as i64);

            let merged = merge_sequences(&left, &right, offset)?;

            assert!(merged.len() <= left.len() + right.len());
            assert_eq!(
                &merged.bases()[..offset as usize],
                &left.bases()[..offset as usize]
            );
        }
        Ok(())
    }

    #[test]
    fn errors() {
        let seq = Sequence::with_uniform_quality(b"ACGT", 20);
        assert_eq!(
            merge_sequences(&seq, &seq, 5),
            Err(MergeError::NoOverlap { offset: 5, len: 4 })
        );
        assert_eq!(
            merge_sequences(&seq, &Sequence::default(), 0),
            Err(MergeError::EmptySequence)
        );
    }
}
