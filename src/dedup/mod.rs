//! Deduplication of variant calls from overlapping assemblies.
//!
//! The passes run in order: exact-match grouping, removal of duplicate
//! assembly evidence within each call, folding of single-sided calls into
//! nearby two-sided calls and merging of near-duplicate two-sided calls.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::{
    caller::{AssemblyEvidence, Breakend, CallKey, VariantCall},
    common::cmp_locus,
    conf::CallerConf,
};

/// Counters of one deduplication run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    /// Calls collapsed into an exact duplicate.
    pub exact: usize,
    /// Assembly evidence records removed as duplicates.
    pub evidence: usize,
    /// Single-sided calls folded into two-sided calls.
    pub singles_folded: usize,
    /// Two-sided calls merged into a near duplicate.
    pub near_duplicates: usize,
}

/// Run all deduplication passes.
pub fn dedup(calls: Vec<VariantCall>, conf: &CallerConf) -> (Vec<VariantCall>, DedupStats) {
    let mut stats = DedupStats::default();

    let (calls, removed) = merge_exact(calls);
    stats.exact = removed;

    let mut calls = calls;
    stats.evidence = calls.par_iter_mut().map(dedup_evidence).sum();

    let (calls, folded) = fold_single_sided(calls, conf.breakend_merge_distance);
    stats.singles_folded = folded;

    let (mut calls, merged) = merge_near_duplicates(calls, conf.breakend_merge_distance);
    stats.near_duplicates = merged;

    // later merges may have joined evidence of the same assembly
    stats.evidence += calls.par_iter_mut().map(dedup_evidence).sum::<usize>();

    tracing::debug!("deduplication: {:?}", &stats);
    (calls, stats)
}

/// Merge `other` into `target`.
///
/// Phase sets and evidence are unioned, per-sample support keeps the union
/// of reads and the maximal quality, mapping qualities and overhang keep
/// their maximum.
pub fn absorb(target: &mut VariantCall, other: &VariantCall) {
    target.phase_sets.extend(other.phase_sets.iter().copied());
    target.evidence.extend(other.evidence.iter().cloned());
    for (sample, support) in &other.support {
        target
            .support
            .entry(sample.clone())
            .or_default()
            .merge_max(support);
    }
    target.left.mapq = target.left.mapq.max(other.left.mapq);
    if let (Some(right), Some(other_right)) = (target.right.as_mut(), other.right.as_ref()) {
        right.mapq = right.mapq.max(other_right.mapq);
    }
    target.overhang = target.overhang.max(other.overhang);
}

/// Collapse calls with equal [`CallKey`], keeping the first of each group.
///
/// Returns the remaining calls in order of first occurrence and the number
/// of calls removed.
pub fn merge_exact(calls: Vec<VariantCall>) -> (Vec<VariantCall>, usize) {
    let before = calls.len();
    let mut groups: IndexMap<CallKey, VariantCall> = IndexMap::new();
    for call in calls {
        match groups.entry(call.key()) {
            indexmap::map::Entry::Occupied(mut entry) => absorb(entry.get_mut(), &call),
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(call);
            }
        }
    }
    let result = groups.into_values().collect::<Vec<_>>();
    let removed = before - result.len();
    (result, removed)
}

/// Remove evidence records of `call` seen on the same assembly sequence at
/// the same left offset, keeping the fragments of the removed ones.
pub fn dedup_evidence(call: &mut VariantCall) -> usize {
    let before = call.evidence.len();
    let mut kept: IndexMap<(String, usize), AssemblyEvidence> = IndexMap::new();
    for evidence in call.evidence.drain(..) {
        let key = (evidence.contig.clone(), evidence.left_offset);
        match kept.entry(key) {
            indexmap::map::Entry::Occupied(mut entry) => {
                if entry.get().fragments != evidence.fragments {
                    entry.get_mut().fragments.extend(evidence.fragments);
                }
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(evidence);
            }
        }
    }
    call.evidence = kept.into_values().collect();
    before - call.evidence.len()
}

fn near(lhs: &Breakend, rhs: &Breakend, distance: i64) -> bool {
    lhs.chrom == rhs.chrom
        && lhs.retained_left == rhs.retained_left
        && (lhs.pos - rhs.pos).abs() <= distance
}

/// Fold each single-sided call into the closest two-sided call with a
/// compatible side within `distance`.
///
/// Ties are broken by the higher quality of the two-sided call, then by
/// its position in `calls`.
pub fn fold_single_sided(calls: Vec<VariantCall>, distance: i64) -> (Vec<VariantCall>, usize) {
    // sides of two-sided calls per chromosome as (pos, call index, is right)
    let mut sides: BTreeMap<&str, Vec<(i64, usize, bool)>> = BTreeMap::new();
    for (i, call) in calls.iter().enumerate() {
        if let Some(right) = &call.right {
            for (side, is_right) in [(&call.left, false), (right, true)] {
                sides
                    .entry(side.chrom.as_str())
                    .or_default()
                    .push((side.pos, i, is_right));
            }
        }
    }
    for positions in sides.values_mut() {
        positions.sort_unstable();
    }

    let mut targets: HashMap<usize, usize> = HashMap::new();
    for (i, call) in calls.iter().enumerate() {
        if call.right.is_some() {
            continue;
        }
        let Some(positions) = sides.get(call.left.chrom.as_str()) else {
            continue;
        };
        let from = positions.partition_point(|(pos, _, _)| *pos < call.left.pos - distance);
        let best = positions[from..]
            .iter()
            .take_while(|(pos, _, _)| *pos <= call.left.pos + distance)
            .filter(|(_, j, is_right)| {
                let other = &calls[*j];
                let side = if *is_right { other.right.as_ref() } else { Some(&other.left) };
                side.map(|side| near(&call.left, side, distance))
                    .unwrap_or(false)
            })
            .min_by(|(lpos, li, _), (rpos, ri, _)| {
                (lpos - call.left.pos)
                    .abs()
                    .cmp(&(rpos - call.left.pos).abs())
                    .then_with(|| calls[*ri].quality().total_cmp(&calls[*li].quality()))
                    .then_with(|| li.cmp(ri))
            });
        if let Some((_, j, _)) = best {
            targets.insert(i, *j);
        }
    }

    let folded = targets.len();
    let mut calls = calls.into_iter().map(Some).collect::<Vec<_>>();
    let mut order = targets.into_iter().collect::<Vec<_>>();
    order.sort_unstable();
    for (single, target) in order {
        if let Some(single) = calls[single].take() {
            if let Some(target) = calls[target].as_mut() {
                absorb_single(target, &single);
            }
        }
    }
    (calls.into_iter().flatten().collect(), folded)
}

/// Like [`absorb`] but keeps the mapping qualities of `target`.
fn absorb_single(target: &mut VariantCall, single: &VariantCall) {
    let left_mapq = target.left.mapq;
    absorb(target, single);
    target.left.mapq = left_mapq;
}

/// Whether two two-sided calls describe the same event up to `distance`.
fn near_duplicates(lhs: &VariantCall, rhs: &VariantCall, distance: i64) -> bool {
    match (&lhs.right, &rhs.right) {
        (Some(lhs_right), Some(rhs_right)) => {
            lhs.sv_type == rhs.sv_type
                && near(&lhs.left, &rhs.left, distance)
                && near(lhs_right, rhs_right, distance)
        }
        _ => false,
    }
}

/// Merge two-sided calls whose sides each lie within `distance`.
///
/// The call with the higher quality, then more evidence, then earlier
/// locus is kept.
pub fn merge_near_duplicates(calls: Vec<VariantCall>, distance: i64) -> (Vec<VariantCall>, usize) {
    let mut arena = calls;
    arena.sort_by(|a, b| {
        cmp_locus(a.left.locus(), b.left.locus()).then_with(|| {
            match (&a.right, &b.right) {
                (Some(a), Some(b)) => cmp_locus(a.locus(), b.locus()),
                (a, b) => a.is_some().cmp(&b.is_some()),
            }
        })
    });
    let mut live = vec![true; arena.len()];
    let mut merged = 0;

    for i in 0..arena.len() {
        let mut j = i + 1;
        while live[i]
            && j < arena.len()
            && arena[j].left.chrom == arena[i].left.chrom
            && arena[j].left.pos - arena[i].left.pos <= distance
        {
            if live[j] && near_duplicates(&arena[i], &arena[j], distance) {
                let keep_right = arena[j]
                    .quality()
                    .total_cmp(&arena[i].quality())
                    .then_with(|| arena[j].evidence.len().cmp(&arena[i].evidence.len()))
                    .is_gt();
                let (keep, drop) = if keep_right { (j, i) } else { (i, j) };
                let dropped = arena[drop].clone();
                absorb(&mut arena[keep], &dropped);
                live[drop] = false;
                merged += 1;
            }
            j += 1;
        }
    }

    let result = arena
        .into_iter()
        .zip(live)
        .filter_map(|(call, live)| live.then_some(call))
        .collect();
    (result, merged)
}
