//! Split-read and discordant-pair support of calls.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    assembly::{Placement, SupportedAssembly},
    reads::ReadKey,
};

/// Weight of discordant reads relative to split reads in the quality.
const DISCORDANT_WEIGHT: f64 = 0.5;

/// Support of a call by the reads of one sample.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SampleSupport {
    pub split_reads: BTreeSet<ReadKey>,
    pub discordant_reads: BTreeSet<ReadKey>,
    pub quality: f64,
}

impl SampleSupport {
    pub fn split_fragments(&self) -> BTreeSet<String> {
        self.split_reads.iter().map(|key| key.fragment_name()).collect()
    }

    pub fn discordant_fragments(&self) -> BTreeSet<String> {
        self.discordant_reads
            .iter()
            .map(|key| key.fragment_name())
            .collect()
    }

    /// Distinct fragments over split and discordant reads.
    pub fn fragments(&self) -> BTreeSet<String> {
        let mut result = self.split_fragments();
        result.extend(self.discordant_fragments());
        result
    }

    /// Union the reads of `other`, keeping the maximal quality.
    pub fn merge_max(&mut self, other: &SampleSupport) {
        self.split_reads.extend(other.split_reads.iter().cloned());
        self.discordant_reads
            .extend(other.discordant_reads.iter().cloned());
        self.discordant_reads.retain(|key| !self.split_reads.contains(key));
        self.quality = self.quality.max(other.quality);
    }
}

/// How the breakpoint region of a call is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchoring {
    /// Anchored on both sides.
    TwoSided,
    /// Anchored left of the region only.
    Exit,
    /// Anchored right of the region only.
    Entry,
}

/// Part of the assembly between the anchored sequence, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakRegion {
    pub start: usize,
    pub end: usize,
    pub anchoring: Anchoring,
}

impl BreakRegion {
    /// Whether a placement crosses a boundary or overlaps the region.
    fn is_split(&self, placement: &Placement) -> bool {
        placement.offset < self.end && placement.end() > self.start
    }

    /// Bases of the placement beyond the anchors, as used for the overhang.
    fn overhangs(&self, placement: &Placement) -> (usize, usize) {
        (
            self.start.saturating_sub(placement.offset),
            placement.end().saturating_sub(self.end),
        )
    }
}

/// Support of one call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallSupport {
    pub samples: BTreeMap<String, SampleSupport>,
    pub overhang: usize,
}

impl CallSupport {
    /// Distinct supporting fragments over all samples.
    pub fn fragments(&self) -> BTreeSet<String> {
        self.samples
            .values()
            .flat_map(|support| support.fragments())
            .collect()
    }
}

/// Partition the reads placed on `assembly` into split and discordant
/// support of the breakpoint `region`.
pub fn compute_support(
    assembly: &SupportedAssembly,
    region: BreakRegion,
    max_fragment_length: i64,
) -> CallSupport {
    let mut split: BTreeSet<ReadKey> = BTreeSet::new();
    let (mut max_left, mut max_right) = (0usize, 0usize);
    for placement in assembly.support() {
        if region.is_split(placement) {
            split.insert(placement.read.key());
            let (left, right) = region.overhangs(placement);
            max_left = max_left.max(left);
            max_right = max_right.max(right);
        }
    }
    let mates = split
        .iter()
        .map(mate_key)
        .filter(|key| assembly.placement(key).is_some())
        .collect::<Vec<_>>();
    split.extend(mates);

    let mut discordant: BTreeSet<ReadKey> = BTreeSet::new();
    if region.anchoring == Anchoring::TwoSided {
        let split_fragments = split
            .iter()
            .map(|key| key.fragment_name())
            .collect::<BTreeSet<_>>();
        let mut left_side: BTreeMap<String, &Placement> = BTreeMap::new();
        let mut right_side: BTreeMap<String, &Placement> = BTreeMap::new();
        for placement in assembly.support() {
            let name = placement.read.fragment_name();
            if split_fragments.contains(&name) {
                continue;
            }
            if placement.end() <= region.start {
                left_side.insert(name, placement);
            } else if placement.offset >= region.end {
                right_side.insert(name, placement);
            }
        }
        for (name, left) in &left_side {
            let Some(right) = right_side.get(name) else {
                continue;
            };
            if left.read.key() != right.read.key()
                && (left.read.is_discordant(max_fragment_length)
                    || right.read.is_discordant(max_fragment_length))
            {
                discordant.insert(left.read.key());
                discordant.insert(right.read.key());
            }
        }
    }

    let mut samples: BTreeMap<String, SampleSupport> = BTreeMap::new();
    for (key, is_split) in split
        .iter()
        .map(|key| (key, true))
        .chain(discordant.iter().map(|key| (key, false)))
    {
        let Some(placement) = assembly.placement(key) else {
            continue;
        };
        let support = samples.entry(key.sample.clone()).or_default();
        let quality = placement.read.mean_quality();
        if is_split {
            support.split_reads.insert(key.clone());
            support.quality += quality;
        } else {
            support.discordant_reads.insert(key.clone());
            support.quality += DISCORDANT_WEIGHT * quality;
        }
    }

    let overhang = match region.anchoring {
        Anchoring::TwoSided => max_left.min(max_right),
        Anchoring::Exit => split_overhang(assembly, &split, |p| {
            p.end().saturating_sub(region.start)
        }),
        Anchoring::Entry => split_overhang(assembly, &split, |p| {
            region.end.saturating_sub(p.offset)
        }),
    };

    CallSupport { samples, overhang }
}

fn split_overhang<F>(
    assembly: &SupportedAssembly,
    split: &BTreeSet<ReadKey>,
    overhang: F,
) -> usize
where
    F: Fn(&Placement) -> usize,
{
    split
        .iter()
        .filter_map(|key| assembly.placement(key))
        .map(overhang)
        .max()
        .unwrap_or(0)
}

fn mate_key(key: &ReadKey) -> ReadKey {
    ReadKey {
        mate_no: if key.mate_no == 1 { 2 } else { 1 },
        ..key.clone()
    }
}
