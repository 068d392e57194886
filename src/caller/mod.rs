//! Structural variant calls from aligned assemblies.

pub mod breakend;
pub mod classify;
pub mod support;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use self::breakend::Breakend;

use self::{
    breakend::{descriptor, oriented_insert},
    classify::Candidate,
    support::{compute_support, SampleSupport},
};
use crate::{
    assembly::AlignedAssembly,
    common::cmp_locus,
    conf::CallerConf,
    err::CallError,
};

/// Type of a structural variant call.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Clone,
    Copy,
    strum::Display,
    strum::EnumString,
)]
pub enum SvType {
    #[strum(serialize = "DEL")]
    #[serde(rename = "DEL")]
    Del,
    #[strum(serialize = "INS")]
    #[serde(rename = "INS")]
    Ins,
    #[strum(serialize = "DUP")]
    #[serde(rename = "DUP")]
    Dup,
    #[strum(serialize = "INV")]
    #[serde(rename = "INV")]
    Inv,
    #[strum(serialize = "BND")]
    #[serde(rename = "BND")]
    Bnd,
    /// Breakend with only one side anchored on the reference.
    #[strum(serialize = "SGL")]
    #[serde(rename = "SGL")]
    SingleBreakend,
}

/// Where a call was seen on an assembly.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct AssemblyEvidence {
    /// Name of the assembly, unique within a run.
    pub assembly: String,
    /// Bases of the assembly.
    pub contig: String,
    /// Offset of the left side of the breakpoint within the assembly.
    pub left_offset: usize,
    /// Offset of the right side of the breakpoint within the assembly.
    pub right_offset: usize,
    /// Whether the sides were swapped relative to the assembly orientation.
    pub reversed: bool,
    pub fragments: BTreeSet<String>,
}

impl AssemblyEvidence {
    pub fn reverse(&self) -> Self {
        Self {
            left_offset: self.right_offset,
            right_offset: self.left_offset,
            reversed: !self.reversed,
            ..self.clone()
        }
    }
}

/// One structural variant call with its support.
///
/// Single-sided calls keep their only side in `left`.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct VariantCall {
    pub sv_type: SvType,
    pub sv_length: usize,
    pub left: Breakend,
    pub right: Option<Breakend>,
    pub left_descriptor: String,
    pub right_descriptor: Option<String>,
    pub phase_sets: BTreeSet<usize>,
    pub evidence: Vec<AssemblyEvidence>,
    /// Support by sample name.
    pub support: BTreeMap<String, SampleSupport>,
    /// Shortest of the longest read overhangs into either side.
    pub overhang: usize,
}

impl VariantCall {
    pub fn is_single_sided(&self) -> bool {
        self.right.is_none()
    }

    /// Distinct supporting fragments over all samples.
    pub fn fragments(&self) -> BTreeSet<String> {
        self.support
            .values()
            .flat_map(|support| support.fragments())
            .collect()
    }

    pub fn quality(&self) -> f64 {
        self.support.values().map(|support| support.quality).sum()
    }

    /// Swap the sides so that `left` is not after `right`.
    pub fn canonicalize(mut self) -> Self {
        let swap = match &self.right {
            Some(right) => cmp_locus(self.left.locus(), right.locus()).is_gt(),
            None => false,
        };
        if swap {
            if let (Some(right), Some(right_descriptor)) =
                (self.right.take(), self.right_descriptor.take())
            {
                self.right = Some(std::mem::replace(&mut self.left, right));
                self.right_descriptor =
                    Some(std::mem::replace(&mut self.left_descriptor, right_descriptor));
                self.evidence = self.evidence.iter().map(|e| e.reverse()).collect();
            }
        }
        self
    }

    /// Key of calls describing the same event, ignoring mapping qualities.
    pub fn key(&self) -> CallKey {
        let side = |end: &Breakend| (end.chrom.clone(), end.pos, end.retained_left);
        CallKey {
            sv_type: self.sv_type,
            left: side(&self.left),
            right: self.right.as_ref().map(side),
            left_descriptor: self.left_descriptor.clone(),
            right_descriptor: self.right_descriptor.clone(),
        }
    }
}

/// Identity of a call for exact-match deduplication.
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct CallKey {
    pub sv_type: SvType,
    pub left: (String, i64, bool),
    pub right: Option<(String, i64, bool)>,
    pub left_descriptor: String,
    pub right_descriptor: Option<String>,
}

/// Name of the assembly of phase set `phase_set`.
pub fn assembly_name(phase_set: usize) -> String {
    format!("asm{}", phase_set)
}

/// Call variants from one aligned assembly.
///
/// Calls with fewer than `min_support_fragments` supporting fragments are
/// dropped.  The result is in assembly order.
pub fn call_variants(
    aligned: &AlignedAssembly,
    conf: &CallerConf,
) -> Result<Vec<VariantCall>, CallError> {
    let assembly = aligned.assembly();
    let candidates = classify::candidates(&aligned.blocks, assembly.seq(), conf)?;
    tracing::trace!(
        "{} candidates on {}",
        candidates.len(),
        assembly_name(aligned.gapped.phase_set)
    );

    Ok(candidates
        .into_iter()
        .filter_map(|candidate| build_call(candidate, aligned, conf))
        .map(VariantCall::canonicalize)
        .collect())
}

/// Build the call of `candidate` on `aligned`.
///
/// The mapping quality rule is applied again to the candidate as given, so
/// a side below [`crate::conf::MIN_CONFIDENT_MAPQ`] turns the call into a
/// single breakend on the other side.  Support is computed on the final
/// candidate; `None` if it is too weak.
pub fn build_call(
    candidate: Candidate,
    aligned: &AlignedAssembly,
    conf: &CallerConf,
) -> Option<VariantCall> {
    let assembly = aligned.assembly();
    let seq = assembly.seq();
    let candidate = classify::reduce_low_mapq(candidate, seq)?;

    let support = compute_support(assembly, candidate.region(), conf.max_fragment_length);
    let fragments = support.fragments();
    if fragments.len() < conf.min_support_fragments {
        return None;
    }
    let evidence = AssemblyEvidence {
        assembly: assembly_name(aligned.gapped.phase_set),
        contig: String::from_utf8_lossy(seq.bases()).into_owned(),
        left_offset: candidate.break_start,
        right_offset: candidate.break_end,
        reversed: false,
        fragments,
    };

    let left = candidate.left.breakend(seq);
    let right = candidate.right.as_ref().map(|right| right.breakend(seq));
    let left_insert = oriented_insert(&candidate.inserted, candidate.left.block.inverted);
    let left_descriptor = descriptor(&left, right.as_ref(), &left_insert);
    let right_descriptor = candidate.right.as_ref().zip(right.as_ref()).map(|(end, right)| {
        let insert = oriented_insert(&candidate.inserted, end.block.inverted);
        descriptor(right, Some(&left), &insert)
    });
    Some(VariantCall {
        sv_type: candidate.sv_type,
        sv_length: candidate.sv_length,
        left,
        right,
        left_descriptor,
        right_descriptor,
        phase_sets: BTreeSet::from([aligned.gapped.phase_set]),
        evidence: vec![evidence],
        support: support.samples,
        overhang: support.overhang,
    })
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::{build_call, call_variants, classify::transition, SvType};
    use crate::{
        assembly::{
            sequence::Sequence,
            test::{extended, random_sequence, tiled_assembly},
            AlignedAssembly, AlignmentBlock, GappedAssembly, Placement, SupportedAssembly,
        },
        common::{complement, reverse_complement},
        conf::CallerConf,
        reads::{test::read, Read},
    };

    /// Aligned assembly of one component over `assembly`.
    pub(crate) fn aligned(
        phase_set: usize,
        assembly: SupportedAssembly,
        blocks: Vec<AlignmentBlock>,
    ) -> AlignedAssembly {
        let gapped = GappedAssembly::new(phase_set, vec![extended(assembly, "chr1", 1000)], 10)
            .expect("single component");
        AlignedAssembly { gapped, blocks }
    }

    fn deletion_assembly(seed: u64) -> AlignedAssembly {
        aligned(
            0,
            tiled_assembly(&random_sequence(300, seed), "r", 50, 10),
            vec![
                AlignmentBlock::mapped("chr1", 0, 1000, 100, false, 60),
                AlignmentBlock::mapped("chr1", 100, 1100, 100, false, 60),
                AlignmentBlock::mapped("chr1", 200, 1250, 100, false, 60),
            ],
        )
    }

    #[test]
    fn deletion() {
        let calls = call_variants(&deletion_assembly(71), &CallerConf::default()).unwrap();

        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!((call.sv_type, call.sv_length), (SvType::Del, 50));
        assert_eq!((call.left.pos, call.left.retained_left), (1200, true));
        let right = call.right.as_ref().unwrap();
        assert_eq!((right.pos, right.retained_left), (1251, false));
        assert_eq!(
            call.left_descriptor,
            format!("{}[chr1:1251[", call.left.anchor_base)
        );
        assert_eq!(
            call.right_descriptor.as_deref(),
            Some(format!("]chr1:1200]{}", right.anchor_base).as_str())
        );
        // reads starting at 160, 170, 180 and 190 cross the breakpoint
        assert_eq!(call.fragments().len(), 4);
        assert_eq!(call.overhang, 40);
        assert_eq!(call.evidence[0].assembly, "asm0");
        assert_eq!(call.evidence[0].left_offset, 200);
    }

    #[test]
    fn calling_is_deterministic() {
        let aligned = deletion_assembly(72);
        let conf = CallerConf::default();
        assert_eq!(
            call_variants(&aligned, &conf).unwrap(),
            call_variants(&aligned, &conf).unwrap()
        );
    }

    #[test]
    fn translocation_is_ordered_by_locus() {
        let calls = call_variants(
            &aligned(
                3,
                tiled_assembly(&random_sequence(300, 73), "r", 50, 10),
                vec![
                    AlignmentBlock::mapped("chr5", 0, 1000, 150, false, 60),
                    AlignmentBlock::mapped("chr2", 150, 5000, 150, false, 60),
                ],
            ),
            &CallerConf::default(),
        )
        .unwrap();

        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.sv_type, SvType::Bnd);
        assert_eq!((call.left.chrom.as_str(), call.left.pos), ("chr2", 5001));
        let right = call.right.as_ref().unwrap();
        assert_eq!((right.chrom.as_str(), right.pos), ("chr5", 1150));
        assert!(call.left_descriptor.contains("]chr5:1150]"));
        assert!(call.evidence[0].reversed);
        assert_eq!(call.evidence[0].left_offset, 150);
    }

    #[rstest::rstest]
    #[case(false, "[chr2:5001[", 5001, false)]
    #[case(true, "]chr2:5150]", 5150, true)]
    fn translocation_with_inserted_bases(
        #[case] inverted: bool,
        #[case] partner_locus: &str,
        #[case] partner_pos: i64,
        #[case] partner_retained_left: bool,
    ) {
        let bases = random_sequence(310, 78);
        let inserted = &bases[150..160];
        let calls = call_variants(
            &aligned(
                4,
                tiled_assembly(&bases, "r", 50, 10),
                vec![
                    AlignmentBlock::mapped("chr5", 0, 1000, 150, false, 60),
                    AlignmentBlock::unmapped(150, 10),
                    AlignmentBlock::mapped("chr2", 160, 5000, 150, inverted, 60),
                ],
            ),
            &CallerConf::default(),
        )
        .unwrap();

        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.sv_type, SvType::Bnd);
        // chr2 sorts first, so the sides are swapped
        assert_eq!(
            (call.left.chrom.as_str(), call.left.pos, call.left.retained_left),
            ("chr2", partner_pos, partner_retained_left)
        );
        let right = call.right.as_ref().unwrap();
        assert_eq!(
            (right.chrom.as_str(), right.pos, right.retained_left),
            ("chr5", 1150, true)
        );
        assert!(call.evidence[0].reversed);

        let chr5_descriptor = format!(
            "{}{}{}",
            bases[149] as char,
            String::from_utf8_lossy(inserted),
            partner_locus
        );
        let chr2_descriptor = if inverted {
            format!(
                "{}{}]chr5:1150]",
                complement(bases[160]) as char,
                String::from_utf8_lossy(&reverse_complement(inserted))
            )
        } else {
            format!(
                "]chr5:1150]{}{}",
                String::from_utf8_lossy(inserted),
                bases[160] as char
            )
        };
        assert_eq!(call.left_descriptor, chr2_descriptor);
        assert_eq!(call.right_descriptor.as_deref(), Some(chr5_descriptor.as_str()));
    }

    #[test]
    fn build_call_reduces_poorly_mapped_side() {
        let bases = random_sequence(300, 79);
        let aligned = aligned(
            5,
            tiled_assembly(&bases, "r", 50, 10),
            vec![
                AlignmentBlock::mapped("chr1", 0, 1000, 150, false, 60),
                AlignmentBlock::mapped("chr2", 150, 5000, 150, false, 10),
            ],
        );
        let conf = CallerConf::default();
        let candidate = transition(&aligned.blocks[0], &aligned.blocks[1], &[], &conf).unwrap();
        assert_eq!(candidate.sv_type, SvType::Bnd);

        let call = build_call(candidate, &aligned, &conf).unwrap();

        assert!(call.is_single_sided());
        assert_eq!(call.sv_type, SvType::SingleBreakend);
        assert_eq!((call.left.chrom.as_str(), call.left.pos), ("chr1", 1150));
        assert_eq!(call.sv_length, 150);
        assert_eq!(
            call.left_descriptor,
            format!(
                "{}{}.",
                bases[149] as char,
                String::from_utf8_lossy(&bases[150..])
            )
        );
        assert_eq!(call.right_descriptor, None);
        assert_eq!(call.evidence[0].left_offset, 150);

        let both_low = transition(
            &AlignmentBlock::mapped("chr1", 0, 1000, 150, false, 5),
            &aligned.blocks[1],
            &[],
            &conf,
        )
        .unwrap();
        assert_eq!(build_call(both_low, &aligned, &conf), None);
    }

    #[test]
    fn unmapped_tail() {
        let calls = call_variants(
            &aligned(
                0,
                tiled_assembly(&random_sequence(160, 74), "r", 50, 10),
                vec![
                    AlignmentBlock::mapped("chr1", 0, 1000, 100, false, 60),
                    AlignmentBlock::unmapped(100, 60),
                ],
            ),
            &CallerConf::default(),
        )
        .unwrap();

        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert!(call.is_single_sided());
        assert_eq!(call.sv_type, SvType::SingleBreakend);
        assert_eq!((call.left.pos, call.sv_length), (1100, 60));
        assert!(call.left_descriptor.ends_with('.'));
        assert_eq!(call.overhang, 40);
    }

    #[test]
    fn weakly_supported_calls_are_dropped() {
        let aligned = deletion_assembly(75);
        let conf = CallerConf {
            min_support_fragments: 5,
            ..CallerConf::default()
        };
        assert!(call_variants(&aligned, &conf).unwrap().is_empty());
    }

    #[test]
    fn discordant_pairs_support_two_sided_calls() {
        let bases = random_sequence(300, 76);
        let mut placements = Vec::new();
        for (i, offset) in [160usize, 170].iter().enumerate() {
            let r = read(&format!("s{}", i), "chr1", *offset as i64, &bases[*offset..*offset + 50]);
            placements.push(Placement::new(Arc::new(r), *offset));
        }
        let first = read("d", "chr1", 20, &bases[20..70]);
        let second = Read {
            first_in_pair: false,
            template_len: 5000,
            ..read("d", "chr1", 230, &bases[230..280])
        };
        placements.push(Placement::new(Arc::new(first), 20));
        placements.push(Placement::new(Arc::new(second), 230));
        let assembly =
            SupportedAssembly::new(Sequence::with_uniform_quality(&bases, 30), placements)
                .unwrap();
        let blocks = vec![
            AlignmentBlock::mapped("chr1", 0, 1000, 200, false, 60),
            AlignmentBlock::mapped("chr1", 200, 1250, 100, false, 60),
        ];

        let calls = call_variants(&aligned(0, assembly, blocks), &CallerConf::default()).unwrap();

        assert_eq!(calls.len(), 1);
        let support = &calls[0].support["sample"];
        assert_eq!(support.split_reads.len(), 2);
        assert_eq!(support.discordant_reads.len(), 2);
        assert!(float_cmp::approx_eq!(f64, support.quality, 90.0, ulps = 2));
    }
}
