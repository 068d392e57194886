//! Consolidation of primary assemblies from neighbouring junction groups.

use std::cmp::Ordering;

use super::{Erratum, PrimaryAssembly};
use crate::{collab::SupportChecker, common::cmp_locus, conf::CallerConf};

/// Assemblies with fewer exclusive fragments than this are redundant.
pub const MIN_EXCLUSIVE_FRAGMENTS: usize = 2;

/// Counters of one consolidation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidationStats {
    pub merged_by_overlap: usize,
    pub merged_by_support: usize,
    pub failed: usize,
}

/// Outcome of comparing two assemblies by their fragment support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupportVerdict {
    KeepLeft,
    KeepRight,
    KeepBoth,
}

/// Merge near-duplicate primary assemblies.
///
/// Assemblies are sorted by anchor locus and compared within a window
/// bounded by chromosome and `max_assembly_dedupe_distance`.  The first
/// pass merges sequence overlaps of at least `min_consolidation_overlap`
/// bases, the second drops assemblies whose fragments are (nearly) all
/// supported by a neighbour.  Failed merges are recorded as errata on the
/// retained assembly.
pub fn consolidate(
    assemblies: Vec<PrimaryAssembly>,
    checker: &dyn SupportChecker,
    conf: &CallerConf,
) -> (Vec<PrimaryAssembly>, ConsolidationStats) {
    let mut arena = assemblies;
    arena.sort_by(|a, b| {
        cmp_locus(
            (&a.anchor.chrom, a.anchor.pos),
            (&b.anchor.chrom, b.anchor.pos),
        )
        .then_with(|| b.assembly.len().cmp(&a.assembly.len()))
    });
    let mut live = vec![true; arena.len()];
    let mut stats = ConsolidationStats::default();

    merge_overlapping(&mut arena, &mut live, checker, conf, &mut stats);
    merge_redundant(&mut arena, &mut live, conf, &mut stats);

    let result = arena
        .into_iter()
        .zip(live)
        .filter_map(|(assembly, live)| live.then_some(assembly))
        .collect::<Vec<_>>();
    tracing::debug!("consolidation: {:?}", &stats);
    (result, stats)
}

/// Whether `j` is still within the consolidation window of `i`.
fn in_window(arena: &[PrimaryAssembly], i: usize, j: usize, max_distance: i64) -> bool {
    let (a, b) = (&arena[i].anchor, &arena[j].anchor);
    a.chrom == b.chrom && b.pos <= a.pos + arena[i].assembly.len() as i64 + max_distance
}

fn merge_overlapping(
    arena: &mut [PrimaryAssembly],
    live: &mut [bool],
    checker: &dyn SupportChecker,
    conf: &CallerConf,
    stats: &mut ConsolidationStats,
) {
    for i in 0..arena.len() {
        if !live[i] {
            continue;
        }
        let mut j = i + 1;
        while j < arena.len() && in_window(arena, i, j, conf.max_assembly_dedupe_distance) {
            if !live[j] {
                j += 1;
                continue;
            }
            let offset = checker.support_offset(
                &arena[i].assembly,
                &arena[j].assembly,
                conf.min_consolidation_overlap,
            );
            if let Some(offset) = offset {
                match arena[i].merge(&arena[j], offset) {
                    Ok(merged) => {
                        arena[i] = merged;
                        live[j] = false;
                        stats.merged_by_overlap += 1;
                    }
                    Err(e) => {
                        let erratum = Erratum::new(
                            "could not consolidate overlapping assemblies",
                            e,
                            describe_pair(&arena[i], &arena[j]),
                        );
                        arena[i].assembly.push_erratum(erratum);
                        stats.failed += 1;
                    }
                }
            }
            j += 1;
        }
    }
}

fn merge_redundant(
    arena: &mut [PrimaryAssembly],
    live: &mut [bool],
    conf: &CallerConf,
    stats: &mut ConsolidationStats,
) {
    for i in 0..arena.len() {
        if !live[i] {
            continue;
        }
        let mut j = i + 1;
        while live[i] && j < arena.len() && in_window(arena, i, j, conf.max_assembly_dedupe_distance)
        {
            if live[j] {
                let (keep, drop) = match compare_support(&arena[i], &arena[j]) {
                    SupportVerdict::KeepLeft => (i, j),
                    SupportVerdict::KeepRight => (j, i),
                    SupportVerdict::KeepBoth => {
                        j += 1;
                        continue;
                    }
                };
                let errata = arena[drop].assembly.errata().to_vec();
                arena[keep].assembly.extend_errata(errata);
                live[drop] = false;
                stats.merged_by_support += 1;
            }
            j += 1;
        }
    }
}

/// Only assemblies sharing at least one fragment are compared; unrelated
/// assemblies are both kept however weak their support.
fn compare_support(left: &PrimaryAssembly, right: &PrimaryAssembly) -> SupportVerdict {
    let left_names = left.assembly.fragment_names();
    let right_names = right.assembly.fragment_names();
    if left_names.is_disjoint(&right_names) {
        return SupportVerdict::KeepBoth;
    }
    let left_exclusive = left_names.difference(&right_names).count();
    let right_exclusive = right_names.difference(&left_names).count();
    match (
        left_exclusive < MIN_EXCLUSIVE_FRAGMENTS,
        right_exclusive < MIN_EXCLUSIVE_FRAGMENTS,
    ) {
        (true, true) => {
            if better(left, right) == Ordering::Less {
                SupportVerdict::KeepRight
            } else {
                SupportVerdict::KeepLeft
            }
        }
        (true, false) => SupportVerdict::KeepRight,
        (false, true) => SupportVerdict::KeepLeft,
        (false, false) => SupportVerdict::KeepBoth,
    }
}

/// Order by length, then average quality; `Equal` keeps the left one.
fn better(left: &PrimaryAssembly, right: &PrimaryAssembly) -> Ordering {
    left.assembly
        .len()
        .cmp(&right.assembly.len())
        .then_with(|| {
            left.assembly
                .average_quality()
                .partial_cmp(&right.assembly.average_quality())
                .unwrap_or(Ordering::Equal)
        })
}

fn describe_pair(left: &PrimaryAssembly, right: &PrimaryAssembly) -> String {
    format!(
        "{}:{} ({} bp) and {}:{} ({} bp)",
        &left.anchor.chrom,
        left.anchor.pos,
        left.assembly.len(),
        &right.anchor.chrom,
        right.anchor.pos,
        right.assembly.len()
    )
}
