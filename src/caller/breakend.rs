//! Breakend sides and their VCF-style descriptors.

use serde::{Deserialize, Serialize};

use crate::{
    assembly::{sequence::Sequence, AlignmentBlock},
    common::{complement, reverse_complement},
};

/// One side of a breakpoint on the reference.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Breakend {
    pub chrom: String,
    /// 1-based position of the reference base next to the breakpoint.
    pub pos: i64,
    /// Whether the reference is retained left of `pos`, i.e., the
    /// breakpoint is right after `pos`.
    pub retained_left: bool,
    pub mapq: u8,
    /// Reference base at `pos`.
    pub anchor_base: char,
}

impl Breakend {
    /// Breakend where the assembly leaves `block`.
    pub fn exit(block: &AlignmentBlock, seq: &Sequence) -> Self {
        let base = seq.bases()[block.seq_end() - 1];
        if block.inverted {
            Self {
                chrom: block.chrom.clone(),
                pos: block.ref_start + 1,
                retained_left: false,
                mapq: block.mapq,
                anchor_base: complement(base) as char,
            }
        } else {
            Self {
                chrom: block.chrom.clone(),
                pos: block.ref_end(),
                retained_left: true,
                mapq: block.mapq,
                anchor_base: base as char,
            }
        }
    }

    /// Breakend where the assembly enters `block`.
    pub fn entry(block: &AlignmentBlock, seq: &Sequence) -> Self {
        let base = seq.bases()[block.seq_start];
        if block.inverted {
            Self {
                chrom: block.chrom.clone(),
                pos: block.ref_end(),
                retained_left: true,
                mapq: block.mapq,
                anchor_base: complement(base) as char,
            }
        } else {
            Self {
                chrom: block.chrom.clone(),
                pos: block.ref_start + 1,
                retained_left: false,
                mapq: block.mapq,
                anchor_base: base as char,
            }
        }
    }

    /// Locus as `(chrom, pos)` for ordering.
    pub fn locus(&self) -> (&str, i64) {
        (&self.chrom, self.pos)
    }
}

/// Inserted bases as seen from the reference strand of a block.
pub fn oriented_insert(inserted: &[u8], inverted: bool) -> String {
    if inverted {
        String::from_utf8_lossy(&reverse_complement(inserted)).into_owned()
    } else {
        String::from_utf8_lossy(inserted).into_owned()
    }
}

/// Breakend notation of `own`, joined to `partner` (or unknown sequence)
/// through the reference-strand inserted bases `inserted`.
pub fn descriptor(own: &Breakend, partner: Option<&Breakend>, inserted: &str) -> String {
    let t = own.anchor_base;
    match partner {
        None if own.retained_left => format!("{}{}.", t, inserted),
        None => format!(".{}{}", inserted, t),
        Some(partner) => {
            let bracket = if partner.retained_left { ']' } else { '[' };
            let locus = format!("{b}{}:{}{b}", &partner.chrom, partner.pos, b = bracket);
            if own.retained_left {
                format!("{}{}{}", t, inserted, locus)
            } else {
                format!("{}{}{}", locus, inserted, t)
            }
        }
    }
}
