//! Candidate breakpoint junctions and their grouping into units of work.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thousands::Separable;

use crate::common::{cmp_locus, io::open_read_maybe_gz, region::GenomicRegion};

/// Side of the junction position on which the breakpoint lies.
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
pub enum Orientation {
    /// Breakpoint after the position, sequence retained on the left.
    #[strum(serialize = "+")]
    #[serde(rename = "+")]
    Forward,
    /// Breakpoint before the position, sequence retained on the right.
    #[strum(serialize = "-")]
    #[serde(rename = "-")]
    Reverse,
}

/// A candidate breakpoint locus.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, derive_new::new)]
pub struct Junction {
    pub chrom: String,
    /// 1-based position.
    pub pos: i64,
    pub orientation: Orientation,
}

/// A spatial batch of junctions on one chromosome.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct JunctionGroup {
    /// Running number of the group.
    pub id: usize,
    pub chrom: String,
    pub junctions: Vec<Junction>,
    /// 0-based start of the read window.
    pub fetch_start: i64,
    /// 0-based, exclusive end of the read window.
    pub fetch_end: i64,
}

/// One line of a junction file: chromosome, 1-based position, `+` or `-`.
#[derive(Deserialize, Debug)]
struct JunctionRecord {
    chrom: String,
    pos: i64,
    orientation: String,
}

/// Load junctions from one tab-separated file.
pub fn load_junctions<P: AsRef<Path>>(path: P) -> Result<Vec<Junction>, anyhow::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(open_read_maybe_gz(path.as_ref())?);
    reader
        .deserialize::<JunctionRecord>()
        .enumerate()
        .map(|(lineno, record)| {
            let record = record.map_err(|e| {
                anyhow::anyhow!(
                    "problem parsing junction record #{} of {:?}: {}",
                    lineno + 1,
                    path.as_ref(),
                    e
                )
            })?;
            if record.pos < 1 {
                anyhow::bail!("junction position must be 1-based, was {}", record.pos);
            }
            let orientation = record.orientation.parse::<Orientation>().map_err(|e| {
                anyhow::anyhow!("invalid orientation {:?}: {}", &record.orientation, e)
            })?;
            Ok(Junction::new(record.chrom, record.pos, orientation))
        })
        .collect()
}

/// Load junctions from all files, merge, de-duplicate and sort them.
pub fn load_all_junctions(paths: &[String]) -> Result<Vec<Junction>, anyhow::Error> {
    let mut result = Vec::new();
    for path in paths {
        tracing::debug!("loading junctions from {}", path);
        result.append(&mut load_junctions(path)?);
    }
    sort_and_dedup(&mut result);
    tracing::info!(
        "loaded {} distinct junctions from {} files",
        result.len().separate_with_commas(),
        paths.len()
    );
    Ok(result)
}

/// Sort by numeric-aware locus, then orientation, and drop duplicates.
pub fn sort_and_dedup(junctions: &mut Vec<Junction>) {
    junctions.sort_by(|a, b| {
        cmp_locus((&a.chrom, a.pos), (&b.chrom, b.pos))
            .then_with(|| a.orientation.cmp(&b.orientation))
    });
    junctions.dedup();
}

/// Keep only junctions within any of `regions`, all if `regions` is empty.
pub fn filter_by_regions(junctions: Vec<Junction>, regions: &[GenomicRegion]) -> Vec<Junction> {
    if regions.is_empty() {
        return junctions;
    }
    junctions
        .into_iter()
        .filter(|junction| {
            regions
                .iter()
                .any(|region| region.contains(&junction.chrom, junction.pos))
        })
        .collect()
}

/// Batch sorted junctions into groups with overlapping read windows.
pub fn group_junctions(
    junctions: &[Junction],
    buffer: i64,
    max_per_group: usize,
) -> Vec<JunctionGroup> {
    let mut result: Vec<JunctionGroup> = Vec::new();
    for junction in junctions {
        let window_start = (junction.pos - 1 - buffer).max(0);
        let window_end = junction.pos + buffer;
        match result.last_mut() {
            Some(group)
                if group.chrom == junction.chrom
                    && window_start < group.fetch_end
                    && group.junctions.len() < max_per_group =>
            {
                group.junctions.push(junction.clone());
                group.fetch_end = group.fetch_end.max(window_end);
            }
            _ => result.push(JunctionGroup {
                id: result.len(),
                chrom: junction.chrom.clone(),
                junctions: vec![junction.clone()],
                fetch_start: window_start,
                fetch_end: window_end,
            }),
        }
    }
    result
}
