//! Collaborators the core pipeline delegates to, with bundled defaults.
//!
//! The pipeline only talks to the traits below; the bundled
//! implementations are simple enough for small references and tests, and
//! alternative implementations (e.g., a real aligner) can be swapped in.

pub mod align;
pub mod extend;
pub mod genome;
pub mod pileup;
pub mod slide;
pub mod support;

use std::{ops::Range, sync::Arc};

use crate::{
    assembly::{AlignedAssembly, ExtendedAssembly, GappedAssembly, PrimaryAssembly, SupportedAssembly},
    junctions::JunctionGroup,
    reads::Read,
};

pub use self::{
    align::KmerAligner, extend::IdentityExtender, genome::ReferenceGenome,
    pileup::PileupAssembler, slide::ReferenceHomologySlider, support::OverlapSupportChecker,
};

/// Source of reads by genomic region.
pub trait ReadSource: Send + Sync {
    /// All reads overlapping the 0-based half-open `range` on `chrom`.
    fn fetch(&self, chrom: &str, range: Range<i64>) -> Result<Vec<Arc<Read>>, anyhow::Error>;
}

/// Builds primary assemblies for the junctions of one group.
pub trait PrimaryAssembler: Send + Sync {
    /// `reads` are the reads of the group's fetch window.
    fn assemble(
        &self,
        group: &JunctionGroup,
        reads: &[Arc<Read>],
    ) -> Result<Vec<PrimaryAssembly>, anyhow::Error>;
}

/// Grows a primary assembly with additional evidence.
pub trait Extender: Send + Sync {
    fn extend(&self, primary: &PrimaryAssembly) -> Result<Vec<ExtendedAssembly>, anyhow::Error>;
}

/// Places a gapped assembly on the reference.
pub trait Aligner: Send + Sync {
    fn align(&self, gapped: GappedAssembly) -> Result<AlignedAssembly, anyhow::Error>;
}

/// Adjusts breakpoints within runs of homologous reference sequence.
pub trait HomologySlider: Send + Sync {
    fn slide(&self, aligned: AlignedAssembly) -> AlignedAssembly;
}

/// Finds the offset at which two assemblies overlap.
pub trait SupportChecker: Send + Sync {
    /// Best offset of `right` within `left` with at least `min_overlap`
    /// overlapping bases, negative if `right` starts before `left`.
    fn support_offset(
        &self,
        left: &SupportedAssembly,
        right: &SupportedAssembly,
        min_overlap: usize,
    ) -> Option<i64>;
}

/// Access to reference sequence.
pub trait GenomeSource: Send + Sync {
    /// Names of all chromosomes, in file order.
    fn chrom_names(&self) -> Vec<&str>;
    /// Upper case bases of `chrom`.
    fn chrom_seq(&self, chrom: &str) -> Option<&[u8]>;
}
