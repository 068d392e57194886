//! Left-alignment of breakpoints within homologous reference sequence.

use std::sync::Arc;

use super::{GenomeSource, HomologySlider};
use crate::assembly::AlignedAssembly;

/// Moves the boundary between two directly adjacent forward blocks on one
/// chromosome to the left while the reference bases at both sides of the
/// breakpoint are identical.
pub struct ReferenceHomologySlider<G: GenomeSource> {
    genome: Arc<G>,
}

impl<G: GenomeSource> ReferenceHomologySlider<G> {
    pub fn new(genome: Arc<G>) -> Self {
        Self { genome }
    }
}

impl<G: GenomeSource> HomologySlider for ReferenceHomologySlider<G> {
    fn slide(&self, mut aligned: AlignedAssembly) -> AlignedAssembly {
        for i in 1..aligned.blocks.len() {
            let (head, tail) = aligned.blocks.split_at_mut(i);
            let (left, right) = (&mut head[i - 1], &mut tail[0]);
            if !left.is_mapped()
                || left.chrom != right.chrom
                || left.inverted
                || right.inverted
                || left.seq_end() != right.seq_start
                || left.ref_end() == right.ref_start
            {
                continue;
            }
            let Some(seq) = self.genome.chrom_seq(&left.chrom) else {
                continue;
            };
            let mut shift = 0;
            while left.length > 1 && right.ref_start > 0 && left.ref_end() > 0 {
                let (l, r) = ((left.ref_end() - 1) as usize, (right.ref_start - 1) as usize);
                if l >= seq.len() || r >= seq.len() || seq[l] != seq[r] {
                    break;
                }
                left.length -= 1;
                right.seq_start -= 1;
                right.ref_start -= 1;
                right.length += 1;
                shift += 1;
            }
            if shift > 0 {
                tracing::trace!(
                    "slid breakpoint {}:{} by {} bases to the left",
                    &left.chrom,
                    left.ref_end(),
                    shift
                );
            }
        }
        aligned
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::ReferenceHomologySlider;
    use crate::{
        assembly::{
            test::{extended, random_sequence, tiled_assembly},
            AlignedAssembly, AlignmentBlock, GappedAssembly,
        },
        collab::{align::test::{genome, other_base}, HomologySlider},
    };

    #[test]
    fn slides_deletion_left() -> Result<(), anyhow::Error> {
        let mut chr1 = random_sequence(1000, 41);
        // two bases of homology left of both breakpoint sides
        chr1[198] = chr1[498];
        chr1[199] = chr1[499];
        chr1[197] = other_base(chr1[497]);
        let slider = ReferenceHomologySlider::new(Arc::new(genome(chr1, random_sequence(100, 42))));
        let gapped = GappedAssembly::new(
            0,
            vec![extended(tiled_assembly(&random_sequence(200, 43), "r", 50, 50), "chr1", 200)],
            10,
        )?;
        let aligned = AlignedAssembly {
            gapped,
            blocks: vec![
                AlignmentBlock::mapped("chr1", 0, 100, 100, false, 60),
                AlignmentBlock::mapped("chr1", 100, 500, 100, false, 60),
            ],
        };

        let slid = slider.slide(aligned);

        assert_eq!(
            slid.blocks,
            vec![
                AlignmentBlock::mapped("chr1", 0, 100, 98, false, 60),
                AlignmentBlock::mapped("chr1", 98, 498, 102, false, 60),
            ]
        );
        Ok(())
    }
}
