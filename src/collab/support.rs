//! Ungapped overlap search between assemblies.

use super::SupportChecker;
use crate::assembly::SupportedAssembly;

/// Bases of this value neither match nor mismatch.
const WILDCARD: u8 = b'N';

/// Scores every ungapped offset with enough overlap and returns the best.
///
/// An offset qualifies if its mismatch rate among informative positions
/// stays at or below `max_mismatch_rate`.  Offsets are scored by matches
/// minus mismatches; ties go to the offset closest to zero.
#[derive(Debug, Clone, Copy, derive_new::new)]
pub struct OverlapSupportChecker {
    max_mismatch_rate: f64,
}

impl OverlapSupportChecker {
    /// Best offset of `right` within `left` on plain base slices.
    pub fn best_offset(&self, left: &[u8], right: &[u8], min_overlap: usize) -> Option<i64> {
        if left.is_empty() || right.is_empty() || min_overlap == 0 {
            return None;
        }
        let min_offset = -(right.len() as i64) + min_overlap as i64;
        let max_offset = left.len() as i64 - min_overlap as i64;
        let mut best: Option<(i64, i64)> = None;
        for offset in min_offset..=max_offset {
            let Some(score) = self.score(left, right, offset, min_overlap) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((best_offset, best_score)) => {
                    score > best_score
                        || (score == best_score && offset.abs() < best_offset.abs())
                }
            };
            if better {
                best = Some((offset, score));
            }
        }
        best.map(|(offset, _)| offset)
    }

    fn score(&self, left: &[u8], right: &[u8], offset: i64, min_overlap: usize) -> Option<i64> {
        let left_start = offset.max(0) as usize;
        let right_start = (-offset).max(0) as usize;
        let overlap = (left.len() - left_start).min(right.len() - right_start);
        if overlap < min_overlap {
            return None;
        }
        let max_mismatches = (overlap as f64 * self.max_mismatch_rate).floor() as usize;
        let mut matches = 0usize;
        let mut mismatches = 0usize;
        for (l, r) in left[left_start..left_start + overlap]
            .iter()
            .zip(&right[right_start..right_start + overlap])
        {
            if *l == WILDCARD || *r == WILDCARD {
                continue;
            }
            if l == r {
                matches += 1;
            } else {
                mismatches += 1;
                if mismatches > max_mismatches {
                    return None;
                }
            }
        }
        if matches < min_overlap.min(overlap) / 2 {
            return None;
        }
        Some(matches as i64 - mismatches as i64)
    }
}

impl SupportChecker for OverlapSupportChecker {
    fn support_offset(
        &self,
        left: &SupportedAssembly,
        right: &SupportedAssembly,
        min_overlap: usize,
    ) -> Option<i64> {
        self.best_offset(left.seq().bases(), right.seq().bases(), min_overlap)
    }
}
