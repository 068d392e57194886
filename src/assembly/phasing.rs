//! Phasing of assemblies by shared supporting fragments and merging within
//! phase sets.

use std::collections::{BTreeSet, HashSet};

use multimap::MultiMap;

use super::{read_span, Erratum, ExtendedAssembly};
use crate::{collab::SupportChecker, err::AssemblyError};

/// Disjoint sets over `0..n` with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut x = x;
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        match self.rank[a].cmp(&self.rank[b]) {
            std::cmp::Ordering::Less => self.parent[a] = b,
            std::cmp::Ordering::Greater => self.parent[b] = a,
            std::cmp::Ordering::Equal => {
                self.parent[b] = a;
                self.rank[a] += 1;
            }
        }
    }
}

/// Group assemblies connected through shared fragment names.
///
/// `fragments[i]` holds the fragment names supporting assembly `i`.  Groups
/// are returned with sorted members, ordered by their first member.
pub fn primary_phase_sets(fragments: &[BTreeSet<String>]) -> Vec<Vec<usize>> {
    let mut sets = DisjointSet::new(fragments.len());
    let mut first_seen: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for (i, names) in fragments.iter().enumerate() {
        for name in names {
            match first_seen.get(name.as_str()) {
                Some(&j) => sets.union(i, j),
                None => {
                    first_seen.insert(name.as_str(), i);
                }
            }
        }
    }

    let mut groups: indexmap::IndexMap<usize, Vec<usize>> = indexmap::IndexMap::new();
    for i in 0..fragments.len() {
        let root = sets.find(i);
        groups.entry(root).or_default().push(i);
    }
    groups.into_values().collect()
}

/// Split a primary phase set into the maximal groups of assemblies sharing
/// one fragment.
///
/// Groups of a single assembly pass through unchanged.
pub fn secondary_phase_sets(group: &[usize], fragments: &[BTreeSet<String>]) -> Vec<Vec<usize>> {
    if group.len() <= 1 {
        return vec![group.to_vec()];
    }
    let mut covering: MultiMap<&str, usize> = MultiMap::new();
    for &i in group {
        for name in &fragments[i] {
            covering.insert(name.as_str(), i);
        }
    }
    let candidates = covering
        .iter_all()
        .map(|(_, members)| members.iter().copied().collect::<BTreeSet<_>>())
        .filter(|members| members.len() > 1)
        .collect::<BTreeSet<_>>();
    candidates
        .iter()
        .filter(|members| {
            !candidates
                .iter()
                .any(|other| other.len() > members.len() && members.is_subset(other))
        })
        .map(|members| members.iter().copied().collect())
        .collect()
}

/// Number of merges and failures of phased merging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhasedMergeStats {
    pub merges: usize,
    pub aborted: usize,
}

/// Iteratively merge members of one phase set until no pair overlaps.
///
/// Pairs are checked once each, the right member also reverse
/// complemented.  A failing merge aborts the whole phase set: the original
/// members are returned with an erratum on the first one.
pub fn merge_phase_set(
    members: Vec<ExtendedAssembly>,
    checker: &dyn SupportChecker,
    max_overlap: usize,
) -> (Vec<ExtendedAssembly>, PhasedMergeStats) {
    let mut stats = PhasedMergeStats::default();
    match try_merge_phase_set(&members, checker, max_overlap, &mut stats) {
        Ok(merged) => (merged, stats),
        Err(e) => {
            let span = read_span(members.iter().flat_map(|m| m.assembly.support()));
            tracing::warn!("aborting merge of phase set over {}: {}", &span, &e);
            stats.merges = 0;
            stats.aborted += 1;
            let mut members = members;
            if let Some(first) = members.first_mut() {
                first
                    .assembly
                    .push_erratum(Erratum::new("could not merge phase set", e, span));
            }
            (members, stats)
        }
    }
}

fn try_merge_phase_set(
    members: &[ExtendedAssembly],
    checker: &dyn SupportChecker,
    max_overlap: usize,
    stats: &mut PhasedMergeStats,
) -> Result<Vec<ExtendedAssembly>, AssemblyError> {
    let mut arena = members.to_vec();
    let mut live = vec![true; arena.len()];
    let mut checked: HashSet<(usize, usize)> = HashSet::new();

    loop {
        let mut merged = None;
        'scan: for i in 0..arena.len() {
            for j in (i + 1)..arena.len() {
                if !live[i] || !live[j] || !checked.insert((i, j)) {
                    continue;
                }
                let min_overlap = max_overlap
                    .min(arena[i].assembly.len())
                    .min(arena[j].assembly.len());
                let candidate = match checker.support_offset(
                    &arena[i].assembly,
                    &arena[j].assembly,
                    min_overlap,
                ) {
                    Some(offset) => Some((arena[j].clone(), offset)),
                    None => {
                        let reversed = arena[j].reverse_complement();
                        checker
                            .support_offset(&arena[i].assembly, &reversed.assembly, min_overlap)
                            .map(|offset| (reversed, offset))
                    }
                };
                if let Some((right, offset)) = candidate {
                    merged = Some((i, j, arena[i].merge(&right, offset)?));
                    break 'scan;
                }
            }
        }
        match merged {
            Some((i, j, assembly)) => {
                live[i] = false;
                live[j] = false;
                arena.push(assembly);
                live.push(true);
                stats.merges += 1;
            }
            None => break,
        }
    }

    Ok(arena
        .into_iter()
        .zip(live)
        .filter_map(|(assembly, live)| live.then_some(assembly))
        .collect())
}
