//! Assemblies: consensus sequences together with their supporting reads.
//!
//! All assembly values are immutable once built; merging and reverse
//! complementing produce new values, so the cached decomposition of an
//! assembly never outlives its content.

pub mod consolidate;
pub mod decompose;
pub mod merge;
pub mod phasing;
pub mod sequence;

use std::{
    collections::BTreeSet,
    fmt::Display,
    sync::{Arc, OnceLock},
};

use indexmap::IndexMap;
use serde::Serialize;

use self::{decompose::Decomposition, sequence::Sequence};
use crate::{
    err::AssemblyError,
    reads::{Read, ReadKey},
};

/// Chromosome name marking an unmapped alignment block.
pub const UNMAPPED_CHROM: &str = "*";

/// A non-fatal problem recorded while processing one item.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Erratum {
    pub message: String,
    pub cause: String,
    pub context: String,
}

impl Erratum {
    pub fn new<C: Display>(message: &str, cause: C, context: String) -> Self {
        Self {
            message: message.to_owned(),
            cause: cause.to_string(),
            context,
        }
    }
}

impl Display for Erratum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.message, self.cause, self.context)
    }
}

/// Placement of a supporting read within an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub read: Arc<Read>,
    /// Offset of the first read base within the assembly.
    pub offset: usize,
    /// Whether the read is placed reverse complemented.
    pub reversed: bool,
}

impl Placement {
    pub fn new(read: Arc<Read>, offset: usize) -> Self {
        Self {
            read,
            offset,
            reversed: false,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.read.len()
    }
}

/// A consensus sequence with reads placed on it.
#[derive(Debug, Clone)]
pub struct SupportedAssembly {
    seq: Sequence,
    support: IndexMap<ReadKey, Placement>,
    errata: Vec<Erratum>,
    decomposition: OnceLock<Decomposition>,
}

impl PartialEq for SupportedAssembly {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.support == other.support && self.errata == other.errata
    }
}

impl SupportedAssembly {
    /// Construct, failing if any placement exceeds the sequence.
    pub fn new<I>(seq: Sequence, placements: I) -> Result<Self, AssemblyError>
    where
        I: IntoIterator<Item = Placement>,
    {
        let mut support = IndexMap::new();
        for placement in placements {
            if placement.end() > seq.len() {
                return Err(AssemblyError::SupportOutOfBounds {
                    read: placement.read.fragment_name(),
                    offset: placement.offset,
                    read_len: placement.read.len(),
                    len: seq.len(),
                });
            }
            support.entry(placement.read.key()).or_insert(placement);
        }
        Ok(Self {
            seq,
            support,
            errata: Vec::new(),
            decomposition: OnceLock::new(),
        })
    }

    pub fn seq(&self) -> &Sequence {
        &self.seq
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn support(&self) -> impl Iterator<Item = &Placement> {
        self.support.values()
    }

    pub fn placement(&self, key: &ReadKey) -> Option<&Placement> {
        self.support.get(key)
    }

    pub fn support_len(&self) -> usize {
        self.support.len()
    }

    /// Names of all supporting fragments.
    pub fn fragment_names(&self) -> BTreeSet<String> {
        self.support.keys().map(|key| key.fragment_name()).collect()
    }

    pub fn errata(&self) -> &[Erratum] {
        &self.errata
    }

    pub fn push_erratum(&mut self, erratum: Erratum) {
        self.errata.push(erratum);
    }

    pub fn extend_errata<I: IntoIterator<Item = Erratum>>(&mut self, errata: I) {
        self.errata.extend(errata);
    }

    pub fn average_quality(&self) -> f64 {
        self.seq.mean_quality()
    }

    /// Decomposition with repeat support depths from the placed reads.
    pub fn decomposition(&self) -> &Decomposition {
        self.decomposition.get_or_init(|| {
            let spans = self
                .support
                .values()
                .map(|placement| (placement.offset, placement.end()))
                .collect::<Vec<_>>();
            Decomposition::with_support(&self.seq, &spans)
        })
    }

    /// Merge `other` at `offset` into a new assembly.
    ///
    /// Placements are shifted with their sequence; reads no longer fitting
    /// the consensus are clamped to its end or dropped if longer than it.
    pub fn merge(&self, other: &SupportedAssembly, offset: i64) -> Result<Self, AssemblyError> {
        let seq = merge::merge(self.decomposition(), other.decomposition(), offset)?;
        let (self_shift, other_shift) = if offset >= 0 {
            (0, offset as usize)
        } else {
            ((-offset) as usize, 0)
        };
        let placements = self
            .support
            .values()
            .map(|placement| (placement, self_shift))
            .chain(other.support.values().map(|placement| (placement, other_shift)))
            .filter_map(|(placement, shift)| {
                let read_len = placement.read.len();
                (read_len <= seq.len()).then(|| Placement {
                    read: placement.read.clone(),
                    offset: (placement.offset + shift).min(seq.len() - read_len),
                    reversed: placement.reversed,
                })
            })
            .collect::<Vec<_>>();
        let mut result = Self::new(seq, placements)?;
        result.extend_errata(self.errata.iter().cloned());
        result.extend_errata(other.errata.iter().cloned());
        Ok(result)
    }

    /// Reverse complement sequence and placements.
    pub fn reverse_complement(&self) -> Self {
        let len = self.len();
        Self {
            seq: self.seq.reverse_complement(),
            support: self
                .support
                .iter()
                .map(|(key, placement)| {
                    (
                        key.clone(),
                        Placement {
                            read: placement.read.clone(),
                            offset: len - placement.end(),
                            reversed: !placement.reversed,
                        },
                    )
                })
                .collect(),
            errata: self.errata.clone(),
            decomposition: OnceLock::new(),
        }
    }

    /// Describe the genomic span of the supporting reads, for logging.
    pub fn read_span(&self) -> String {
        read_span(self.support.values())
    }
}

/// Describe the per-chromosome genomic span of the placed reads.
pub fn read_span<'a, I>(placements: I) -> String
where
    I: IntoIterator<Item = &'a Placement>,
{
    let mut spans: IndexMap<&str, (i64, i64)> = IndexMap::new();
    for placement in placements {
        let read = &placement.read;
        let span = spans
            .entry(read.chrom.as_str())
            .or_insert((read.layout_start(), read.layout_end()));
        span.0 = span.0.min(read.layout_start());
        span.1 = span.1.max(read.layout_end());
    }
    if spans.is_empty() {
        return String::from("<no reads>");
    }
    spans
        .iter()
        .map(|(chrom, (start, end))| format!("{}:{}-{}", chrom, start + 1, end))
        .collect::<Vec<_>>()
        .join(",")
}

/// Locus a primary assembly was built for.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub chrom: String,
    /// 1-based genomic position.
    pub pos: i64,
    /// Offset of the anchor base within the assembly sequence.
    pub offset: usize,
}

/// Assembly built from the reads around one junction.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryAssembly {
    pub assembly: SupportedAssembly,
    pub anchor: Anchor,
}

/// Primary assembly grown with additional evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedAssembly {
    pub assembly: SupportedAssembly,
    pub anchor: Anchor,
}

impl From<PrimaryAssembly> for ExtendedAssembly {
    fn from(primary: PrimaryAssembly) -> Self {
        Self {
            assembly: primary.assembly,
            anchor: primary.anchor,
        }
    }
}

/// Merge `other` into `assembly` at `offset`, keeping the anchor of `assembly`.
fn merge_anchored(
    assembly: &SupportedAssembly,
    anchor: &Anchor,
    other: &SupportedAssembly,
    offset: i64,
) -> Result<(SupportedAssembly, Anchor), AssemblyError> {
    let merged = assembly.merge(other, offset)?;
    let shift = if offset < 0 { (-offset) as usize } else { 0 };
    let anchor = Anchor {
        offset: (anchor.offset + shift).min(merged.len().saturating_sub(1)),
        ..anchor.clone()
    };
    Ok((merged, anchor))
}

impl PrimaryAssembly {
    /// Merge `other` at `offset`, keeping this assembly's anchor.
    pub fn merge(&self, other: &PrimaryAssembly, offset: i64) -> Result<Self, AssemblyError> {
        let (assembly, anchor) =
            merge_anchored(&self.assembly, &self.anchor, &other.assembly, offset)?;
        Ok(Self { assembly, anchor })
    }
}

impl ExtendedAssembly {
    /// Merge `other` at `offset`, keeping this assembly's anchor.
    pub fn merge(&self, other: &ExtendedAssembly, offset: i64) -> Result<Self, AssemblyError> {
        let (assembly, anchor) =
            merge_anchored(&self.assembly, &self.anchor, &other.assembly, offset)?;
        Ok(Self { assembly, anchor })
    }

    pub fn reverse_complement(&self) -> Self {
        let len = self.assembly.len();
        Self {
            assembly: self.assembly.reverse_complement(),
            anchor: Anchor {
                offset: len.saturating_sub(self.anchor.offset + 1),
                ..self.anchor.clone()
            },
        }
    }
}

/// Assemblies of one phase set joined by spacer `N`s into one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct GappedAssembly {
    /// Running number of the phase set the components belong to.
    pub phase_set: usize,
    pub components: Vec<ExtendedAssembly>,
    /// Start of each component within the joined sequence.
    pub component_starts: Vec<usize>,
    /// The joined sequence with all placements.
    pub assembly: SupportedAssembly,
}

impl GappedAssembly {
    /// Join `components` sorted by anchor locus.
    pub fn new(
        phase_set: usize,
        mut components: Vec<ExtendedAssembly>,
        spacer_length: usize,
    ) -> Result<Self, AssemblyError> {
        components.sort_by(|a, b| {
            crate::common::cmp_locus(
                (&a.anchor.chrom, a.anchor.pos),
                (&b.anchor.chrom, b.anchor.pos),
            )
        });
        let spacer = Sequence::with_uniform_quality(&vec![b'N'; spacer_length], 0);
        let mut seq = Sequence::default();
        let mut component_starts = Vec::with_capacity(components.len());
        let mut placements = Vec::new();
        let mut errata = Vec::new();
        for (i, component) in components.iter().enumerate() {
            if i > 0 {
                seq.extend_from(&spacer);
            }
            let start = seq.len();
            component_starts.push(start);
            seq.extend_from(component.assembly.seq());
            placements.extend(component.assembly.support().map(|placement| Placement {
                offset: placement.offset + start,
                ..placement.clone()
            }));
            errata.extend(component.assembly.errata().iter().cloned());
        }
        let mut assembly = SupportedAssembly::new(seq, placements)?;
        assembly.extend_errata(errata);
        Ok(Self {
            phase_set,
            components,
            component_starts,
            assembly,
        })
    }
}

/// Contiguous placement of a part of an assembly on the reference.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AlignmentBlock {
    /// Reference chromosome, [`UNMAPPED_CHROM`] if unmapped.
    pub chrom: String,
    /// Start within the assembly sequence.
    pub seq_start: usize,
    /// 0-based start on the reference.
    pub ref_start: i64,
    pub length: usize,
    /// Whether the block maps to the reverse strand.
    pub inverted: bool,
    pub mapq: u8,
}

impl AlignmentBlock {
    pub fn mapped(
        chrom: &str,
        seq_start: usize,
        ref_start: i64,
        length: usize,
        inverted: bool,
        mapq: u8,
    ) -> Self {
        Self {
            chrom: chrom.to_owned(),
            seq_start,
            ref_start,
            length,
            inverted,
            mapq,
        }
    }

    pub fn unmapped(seq_start: usize, length: usize) -> Self {
        Self {
            chrom: UNMAPPED_CHROM.to_owned(),
            seq_start,
            ref_start: 0,
            length,
            inverted: false,
            mapq: 0,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.chrom != UNMAPPED_CHROM
    }

    pub fn seq_end(&self) -> usize {
        self.seq_start + self.length
    }

    pub fn ref_end(&self) -> i64 {
        self.ref_start + self.length as i64
    }
}

/// Gapped assembly placed on the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedAssembly {
    pub gapped: GappedAssembly,
    /// Blocks in sequence order, covering the whole sequence.
    pub blocks: Vec<AlignmentBlock>,
}

impl AlignedAssembly {
    pub fn assembly(&self) -> &SupportedAssembly {
        &self.gapped.assembly
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::{
        sequence::Sequence, Anchor, ExtendedAssembly, GappedAssembly, Placement,
        SupportedAssembly,
    };
    use crate::{err::AssemblyError, reads::test::read};

    /// Random bases without tandem structure of four or more copies.
    pub(crate) fn random_sequence(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut result: Vec<u8> = Vec::with_capacity(len);
        let mut attempts = 0;
        while result.len() < len {
            result.push(b"ACGT"[rng.usize(0..4)]);
            let n = result.len();
            let periodic = (1..=6).any(|unit| {
                n >= 4 * unit && (n - 3 * unit..n).all(|k| result[k] == result[k - unit])
            });
            if periodic {
                result.pop();
                attempts += 1;
                if attempts > 16 {
                    result.truncate(result.len().saturating_sub(8));
                    attempts = 0;
                }
            } else {
                attempts = 0;
            }
        }
        result
    }

    /// Assembly over `bases` supported by reads tiling it with the given
    /// length and step, named `{prefix}{i}`.
    pub(crate) fn tiled_assembly(
        bases: &[u8],
        prefix: &str,
        read_len: usize,
        step: usize,
    ) -> SupportedAssembly {
        let mut placements = Vec::new();
        let mut offset = 0;
        while offset + read_len <= bases.len() {
            let name = format!("{}{}", prefix, offset / step);
            let read = read(&name, "chr1", offset as i64, &bases[offset..offset + read_len]);
            placements.push(Placement::new(Arc::new(read), offset));
            offset += step;
        }
        SupportedAssembly::new(Sequence::with_uniform_quality(bases, 30), placements)
            .expect("placements are within the sequence")
    }

    pub(crate) fn extended(assembly: SupportedAssembly, chrom: &str, pos: i64) -> ExtendedAssembly {
        ExtendedAssembly {
            assembly,
            anchor: Anchor {
                chrom: chrom.to_owned(),
                pos,
                offset: 0,
            },
        }
    }

    #[test]
    fn random_sequence_has_no_repeats() {
        for seed in 0..10 {
            let bases = random_sequence(500, seed);
            assert_eq!(bases.len(), 500);
            let d = super::decompose::Decomposition::new(&Sequence::with_uniform_quality(&bases, 1));
            assert_eq!(d.nodes().len(), 1);
        }
    }

    #[test]
    fn new_checks_bounds() {
        let r = Arc::new(read("r1", "chr1", 0, b"ACGTACGT"));
        let result = SupportedAssembly::new(
            Sequence::with_uniform_quality(b"ACGTACGTAC", 30),
            vec![Placement::new(r, 3)],
        );
        assert_eq!(
            result,
            Err(AssemblyError::SupportOutOfBounds {
                read: String::from("sample/r1"),
                offset: 3,
                read_len: 8,
                len: 10,
            })
        );
    }

    #[test]
    fn merge_shifts_placements() -> Result<(), anyhow::Error> {
        let bases = random_sequence(300, 1);
        let left = tiled_assembly(&bases[..200], "l", 50, 25);
        let right = tiled_assembly(&bases[100..], "r", 50, 25);

        let merged = right.merge(&left, -100)?;

        assert_eq!(merged.seq().bases(), &bases[..]);
        assert_eq!(merged.support_len(), left.support_len() + right.support_len());
        for placement in merged.support() {
            let (start, end) = (placement.offset, placement.end());
            assert_eq!(&bases[start..end], &placement.read.bases[..]);
        }
        Ok(())
    }

    #[test]
    fn reverse_complement_mirrors_placements() {
        let bases = random_sequence(100, 2);
        let assembly = tiled_assembly(&bases, "r", 40, 30);

        let rc = assembly.reverse_complement();

        assert_eq!(rc.reverse_complement(), assembly);
        let first = rc.support().next().expect("has support");
        assert_eq!((first.offset, first.reversed), (60, true));
    }

    #[test]
    fn gapped_assembly_joins_components() -> Result<(), anyhow::Error> {
        let a = extended(tiled_assembly(&random_sequence(60, 3), "a", 30, 30), "chr2", 500);
        let b = extended(tiled_assembly(&random_sequence(40, 4), "b", 20, 20), "chr1", 900);

        let gapped = GappedAssembly::new(7, vec![a.clone(), b.clone()], 10)?;

        assert_eq!(gapped.component_starts, vec![0, 50]);
        assert_eq!(gapped.components[0], b);
        assert_eq!(gapped.assembly.len(), 110);
        assert_eq!(&gapped.assembly.seq().bases()[40..50], b"NNNNNNNNNN");
        assert_eq!(gapped.assembly.support_len(), 4);
        let shifted = gapped
            .assembly
            .support()
            .filter(|p| p.read.name.starts_with('a'))
            .map(|p| p.offset)
            .collect::<Vec<_>>();
        assert_eq!(shifted, vec![50, 80]);
        Ok(())
    }

    #[test]
    fn read_span_summarises_reads() {
        let assembly = tiled_assembly(&random_sequence(100, 5), "r", 50, 25);
        assert_eq!(assembly.read_span(), "chr1:1-100");
    }
}
