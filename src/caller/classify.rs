//! Classification of transitions between alignment blocks into candidate
//! variants.

use super::{
    breakend::Breakend,
    support::{Anchoring, BreakRegion},
    SvType,
};
use crate::{
    assembly::{sequence::Sequence, AlignmentBlock},
    conf::{CallerConf, MIN_CONFIDENT_MAPQ},
    err::CallError,
};

/// A mapped block and the side on which the assembly leaves or enters it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEnd {
    pub block: AlignmentBlock,
    /// `true` if the assembly leaves the block, `false` if it enters.
    pub exit: bool,
}

impl BlockEnd {
    pub fn exit(block: &AlignmentBlock) -> Self {
        Self {
            block: block.clone(),
            exit: true,
        }
    }

    pub fn entry(block: &AlignmentBlock) -> Self {
        Self {
            block: block.clone(),
            exit: false,
        }
    }

    pub fn breakend(&self, seq: &Sequence) -> Breakend {
        if self.exit {
            Breakend::exit(&self.block, seq)
        } else {
            Breakend::entry(&self.block, seq)
        }
    }
}

/// A classified breakpoint within one aligned assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub sv_type: SvType,
    pub sv_length: usize,
    /// The anchoring side; the only side of single-sided candidates.
    pub left: BlockEnd,
    pub right: Option<BlockEnd>,
    /// Bases between the anchors in assembly orientation.
    pub inserted: Vec<u8>,
    /// Start of the breakpoint region within the assembly.
    pub break_start: usize,
    /// End of the breakpoint region within the assembly.
    pub break_end: usize,
}

impl Candidate {
    /// Region of the assembly whose reads support this candidate.
    pub fn region(&self) -> BreakRegion {
        let anchoring = match (&self.right, self.left.exit) {
            (Some(_), _) => Anchoring::TwoSided,
            (None, true) => Anchoring::Exit,
            (None, false) => Anchoring::Entry,
        };
        BreakRegion {
            start: self.break_start,
            end: self.break_end,
            anchoring,
        }
    }
}

/// Check that `blocks` are ordered, non-overlapping and within `len`, and
/// that mapped blocks are not empty.
fn validate(blocks: &[AlignmentBlock], len: usize) -> Result<(), CallError> {
    let mut prev_end = 0;
    for block in blocks {
        if block.is_mapped() && block.length == 0 {
            return Err(CallError::EmptyMappedBlock {
                seq_start: block.seq_start,
            });
        }
        if block.seq_start < prev_end {
            return Err(CallError::BlocksUnordered {
                seq_start: block.seq_start,
                prev_end,
            });
        }
        if block.seq_end() > len {
            return Err(CallError::BlockOutOfBounds {
                seq_end: block.seq_end(),
                len,
            });
        }
        prev_end = block.seq_end();
    }
    Ok(())
}

/// Join runs of adjacent unmapped blocks into one.
fn merge_unmapped(blocks: &[AlignmentBlock]) -> Vec<AlignmentBlock> {
    let mut result: Vec<AlignmentBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match result.last_mut() {
            Some(last) if !last.is_mapped() && !block.is_mapped() => {
                last.length = block.seq_end() - last.seq_start;
            }
            _ => result.push(block.clone()),
        }
    }
    result
}

fn has_gap(bases: &[u8]) -> bool {
    bases.iter().any(|b| b.eq_ignore_ascii_case(&b'N'))
}

/// Find the candidates in an assembly's alignment.
pub fn candidates(
    blocks: &[AlignmentBlock],
    seq: &Sequence,
    conf: &CallerConf,
) -> Result<Vec<Candidate>, CallError> {
    validate(blocks, seq.len())?;
    let blocks = merge_unmapped(blocks);
    let bases = seq.bases();
    let mut result = Vec::new();

    let mapped = blocks
        .iter()
        .enumerate()
        .filter(|(_, block)| block.is_mapped())
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    let (Some(&first), Some(&last)) = (mapped.first(), mapped.last()) else {
        return Ok(result);
    };

    if let Some(head) = blocks[..first].iter().find(|block| !block.is_mapped()) {
        let anchor = &blocks[first];
        let inserted = &bases[head.seq_start..anchor.seq_start];
        if let Some(candidate) = single(BlockEnd::entry(anchor), inserted, conf) {
            result.push(candidate);
        }
    }

    for pair in mapped.windows(2) {
        let (a, b) = (&blocks[pair[0]], &blocks[pair[1]]);
        let inserted = &bases[a.seq_end()..b.seq_start];
        let inserted = if has_gap(inserted) { &[][..] } else { inserted };
        if let Some(candidate) = transition(a, b, inserted, conf) {
            if let Some(candidate) = reduce_low_mapq(candidate, seq) {
                result.push(candidate);
            }
        }
    }

    if let Some(tail) = blocks[last + 1..].iter().find(|block| !block.is_mapped()) {
        let anchor = &blocks[last];
        let inserted = &bases[anchor.seq_end()..tail.seq_end()];
        if let Some(candidate) = single(BlockEnd::exit(anchor), inserted, conf) {
            result.push(candidate);
        }
    }

    Ok(result)
}

/// Single-sided candidate at `anchor` with unmapped `inserted` bases.
fn single(anchor: BlockEnd, inserted: &[u8], conf: &CallerConf) -> Option<Candidate> {
    if inserted.len() < conf.min_event_size
        || anchor.block.length < conf.min_anchor_length
        || anchor.block.mapq < MIN_CONFIDENT_MAPQ
        || has_gap(inserted)
    {
        return None;
    }
    let at = if anchor.exit {
        anchor.block.seq_end()
    } else {
        anchor.block.seq_start
    };
    Some(Candidate {
        sv_type: SvType::SingleBreakend,
        sv_length: inserted.len(),
        left: anchor,
        right: None,
        inserted: inserted.to_vec(),
        break_start: at,
        break_end: at,
    })
}

/// Classify the transition from mapped block `a` to mapped block `b`.
pub fn transition(
    a: &AlignmentBlock,
    b: &AlignmentBlock,
    inserted: &[u8],
    conf: &CallerConf,
) -> Option<Candidate> {
    let ins_len = inserted.len();
    let (sv_type, sv_length) = if a.chrom != b.chrom {
        (SvType::Bnd, 0)
    } else if a.inverted != b.inverted {
        let from = if a.inverted { a.ref_start + 1 } else { a.ref_end() };
        let to = if b.inverted { b.ref_end() } else { b.ref_start + 1 };
        (SvType::Inv, (to - from).unsigned_abs() as usize)
    } else {
        let gap = if a.inverted {
            a.ref_start - b.ref_end()
        } else {
            b.ref_start - a.ref_end()
        };
        let distance = gap.unsigned_abs() as usize;
        if ins_len >= distance {
            (SvType::Ins, ins_len)
        } else if gap > 0 {
            (SvType::Del, distance)
        } else if distance < conf.min_dup_length {
            (SvType::Ins, distance + ins_len)
        } else if distance > conf.max_dup_length {
            (SvType::Bnd, 0)
        } else {
            (SvType::Dup, distance)
        }
    };

    if matches!(sv_type, SvType::Del | SvType::Ins | SvType::Dup)
        && sv_length < conf.min_event_size
    {
        return None;
    }

    Some(Candidate {
        sv_type,
        sv_length,
        left: BlockEnd::exit(a),
        right: Some(BlockEnd::entry(b)),
        inserted: inserted.to_vec(),
        break_start: a.seq_end(),
        break_end: b.seq_start,
    })
}

/// Turn a two-sided candidate with one poorly mapped side into a single
/// breakend at the other side.
///
/// The bases of the dropped block join the inserted sequence, up to the
/// nearest gap.  Candidates without a confidently mapped side are dropped.
pub fn reduce_low_mapq(candidate: Candidate, seq: &Sequence) -> Option<Candidate> {
    let Some(right) = &candidate.right else {
        return (candidate.left.block.mapq >= MIN_CONFIDENT_MAPQ).then_some(candidate);
    };
    let left_ok = candidate.left.block.mapq >= MIN_CONFIDENT_MAPQ;
    let right_ok = right.block.mapq >= MIN_CONFIDENT_MAPQ;
    let bases = seq.bases();
    match (left_ok, right_ok) {
        (true, true) => Some(candidate),
        (false, false) => None,
        (false, true) => {
            let anchor = right.block.clone();
            let inserted = &bases[candidate.left.block.seq_start..anchor.seq_start];
            let inserted = match inserted.iter().rposition(|b| b.eq_ignore_ascii_case(&b'N')) {
                Some(i) => &inserted[i + 1..],
                None => inserted,
            };
            Some(Candidate {
                sv_type: SvType::SingleBreakend,
                sv_length: inserted.len(),
                left: BlockEnd::entry(&anchor),
                right: None,
                inserted: inserted.to_vec(),
                break_start: anchor.seq_start,
                break_end: anchor.seq_start,
            })
        }
        (true, false) => {
            let anchor = candidate.left.block.clone();
            let inserted = &bases[anchor.seq_end()..right.block.seq_end()];
            let inserted = match inserted.iter().position(|b| b.eq_ignore_ascii_case(&b'N')) {
                Some(i) => &inserted[..i],
                None => inserted,
            };
            Some(Candidate {
                sv_type: SvType::SingleBreakend,
                sv_length: inserted.len(),
                left: BlockEnd::exit(&anchor),
                right: None,
                inserted: inserted.to_vec(),
                break_start: anchor.seq_end(),
                break_end: anchor.seq_end(),
            })
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{candidates, reduce_low_mapq, transition};
    use crate::{
        assembly::{sequence::Sequence, AlignmentBlock},
        caller::SvType,
        conf::CallerConf,
        err::CallError,
    };

    fn block(chrom: &str, seq_start: usize, ref_start: i64, length: usize) -> AlignmentBlock {
        AlignmentBlock::mapped(chrom, seq_start, ref_start, length, false, 60)
    }

    fn classify(a: &AlignmentBlock, b: &AlignmentBlock, ins_len: usize) -> Option<(SvType, usize)> {
        transition(a, b, &vec![b'A'; ins_len], &CallerConf::default())
            .map(|candidate| (candidate.sv_type, candidate.sv_length))
    }

    #[rstest::rstest]
    #[case(1150, 0, Some((SvType::Del, 50)))]
    #[case(1110, 0, None)]
    #[case(1100, 40, Some((SvType::Ins, 40)))]
    #[case(1100, 10, None)]
    #[case(1120, 60, Some((SvType::Ins, 60)))]
    #[case(1040, 0, Some((SvType::Dup, 60)))]
    #[case(1095, 30, Some((SvType::Ins, 30)))]
    #[case(1095, 0, None)]
    #[case(200_000, 0, Some((SvType::Del, 198_900)))]
    fn same_strand_transitions(
        #[case] next_start: i64,
        #[case] ins_len: usize,
        #[case] expected: Option<(SvType, usize)>,
    ) {
        let a = block("chr1", 0, 1000, 100);
        let b = block("chr1", 100 + ins_len, next_start, 100);
        assert_eq!(classify(&a, &b, ins_len), expected);
    }

    #[test]
    fn long_duplication_is_breakend() {
        let a = block("chr1", 0, 300_000, 100);
        let b = block("chr1", 100, 1000, 100);
        assert_eq!(classify(&a, &b, 0), Some((SvType::Bnd, 0)));
    }

    #[test]
    fn inverted_deletion() {
        let a = AlignmentBlock::mapped("chr1", 0, 2000, 100, true, 60);
        let b = AlignmentBlock::mapped("chr1", 100, 1800, 100, true, 60);
        assert_eq!(classify(&a, &b, 0), Some((SvType::Del, 100)));
    }

    #[test]
    fn strand_and_chromosome_changes() {
        let a = block("chr1", 0, 1000, 100);
        let inverted = AlignmentBlock::mapped("chr1", 100, 5000, 100, true, 60);
        assert_eq!(classify(&a, &inverted, 0), Some((SvType::Inv, 4000)));
        assert_eq!(
            classify(&a, &block("chr2", 100, 1000, 100), 0),
            Some((SvType::Bnd, 0))
        );
    }

    #[test]
    fn gap_spacer_is_not_inserted() {
        let mut bases = vec![b'A'; 100];
        bases.extend(vec![b'N'; 10]);
        bases.extend(vec![b'C'; 100]);
        let seq = Sequence::with_uniform_quality(&bases, 30);
        let blocks = vec![
            block("chr1", 0, 1000, 100),
            AlignmentBlock::unmapped(100, 10),
            block("chr1", 110, 1000, 100),
        ];

        let found = candidates(&blocks, &seq, &CallerConf::default()).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].sv_type, SvType::Dup);
        assert!(found[0].inserted.is_empty());
        assert_eq!((found[0].break_start, found[0].break_end), (100, 110));
    }

    #[test]
    fn unmapped_ends_are_single_breakends() {
        let seq = Sequence::with_uniform_quality(&vec![b'G'; 200], 30);
        let blocks = vec![
            AlignmentBlock::unmapped(0, 40),
            AlignmentBlock::unmapped(40, 10),
            block("chr1", 50, 1000, 100),
            AlignmentBlock::unmapped(150, 50),
        ];

        let found = candidates(&blocks, &seq, &CallerConf::default()).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].sv_type, SvType::SingleBreakend);
        assert!(!found[0].left.exit);
        assert_eq!((found[0].sv_length, found[0].break_start), (50, 50));
        assert!(found[1].left.exit);
        assert_eq!((found[1].sv_length, found[1].break_start), (50, 150));

        let short_tail = vec![block("chr1", 0, 1000, 180), AlignmentBlock::unmapped(180, 20)];
        assert!(candidates(&short_tail, &seq, &CallerConf::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn poorly_mapped_side_is_dropped() {
        let seq = Sequence::with_uniform_quality(&vec![b'T'; 200], 30);
        let a = block("chr1", 0, 1000, 100);
        let b = AlignmentBlock::mapped("chr2", 100, 5000, 100, false, 10);
        let candidate = transition(&a, &b, &[], &CallerConf::default()).unwrap();

        let reduced = reduce_low_mapq(candidate.clone(), &seq).unwrap();
        assert_eq!(reduced.sv_type, SvType::SingleBreakend);
        assert_eq!(reduced.right, None);
        assert!(reduced.left.exit);
        assert_eq!(reduced.inserted.len(), 100);

        let both_low = transition(
            &AlignmentBlock::mapped("chr1", 0, 1000, 100, false, 5),
            &b,
            &[],
            &CallerConf::default(),
        )
        .unwrap();
        assert_eq!(reduce_low_mapq(both_low, &seq), None);

        let low_left = transition(
            &AlignmentBlock::mapped("chr1", 0, 1000, 100, false, 5),
            &block("chr2", 100, 5000, 100),
            &[],
            &CallerConf::default(),
        )
        .unwrap();
        let reduced = reduce_low_mapq(low_left, &seq).unwrap();
        assert!(!reduced.left.exit);
        assert_eq!(reduced.left.block.chrom, "chr2");
        assert_eq!((reduced.break_start, reduced.sv_length), (100, 100));
    }

    #[test]
    fn invalid_blocks() {
        let seq = Sequence::with_uniform_quality(&vec![b'T'; 100], 30);
        assert_eq!(
            candidates(&[block("chr1", 0, 1000, 120)], &seq, &CallerConf::default()),
            Err(CallError::BlockOutOfBounds {
                seq_end: 120,
                len: 100
            })
        );
        assert_eq!(
            candidates(
                &[block("chr1", 0, 1000, 50), block("chr1", 40, 2000, 50)],
                &seq,
                &CallerConf::default()
            ),
            Err(CallError::BlocksUnordered {
                seq_start: 40,
                prev_end: 50
            })
        );
        assert_eq!(
            candidates(
                &[block("chr1", 0, 1000, 50), block("chr2", 50, 2000, 0)],
                &seq,
                &CallerConf::default()
            ),
            Err(CallError::EmptyMappedBlock { seq_start: 50 })
        );
        assert_eq!(
            candidates(&[block("chr1", 0, 1000, 0)], &seq, &CallerConf::default()),
            Err(CallError::EmptyMappedBlock { seq_start: 0 })
        );
    }
}
