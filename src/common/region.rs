//! Genomic regions used for restricting the work.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::err::ArgError;

/// Range with 1-based, inclusive positions.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub struct Range {
    pub start: i64,
    pub end: i64,
}

impl Range {
    pub fn new(start: i64, end: i64) -> Self {
        Range { start, end }
    }
}

/// Genomic region, the whole chromosome if `range` is `None`.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct GenomicRegion {
    pub chrom: String,
    pub range: Option<Range>,
}

impl GenomicRegion {
    pub fn new(chrom: &str, start: i64, end: i64) -> Self {
        GenomicRegion {
            chrom: chrom.to_owned(),
            range: Some(Range::new(start, end)),
        }
    }

    pub fn whole_chrom(chrom: &str) -> Self {
        GenomicRegion {
            chrom: chrom.to_owned(),
            range: None,
        }
    }

    /// Whether the 1-based `pos` on `chrom` falls into the region.
    pub fn contains(&self, chrom: &str, pos: i64) -> bool {
        self.chrom == chrom
            && self
                .range
                .map(|range| range.start <= pos && pos <= range.end)
                .unwrap_or(true)
    }
}

impl std::str::FromStr for GenomicRegion {
    type Err = ArgError;

    /// Parse `chrom` or `chrom:start-end`, thousands separators allowed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^(?P<chrom>[^:\s]+)(:(?P<start>\d+(,\d+)*)-(?P<stop>\d+(,\d+)*))?$")
            .expect("invalid regex in source code");
        let caps = re
            .captures(s.trim())
            .ok_or_else(|| ArgError::RegionInvalidFormat(s.to_owned()))?;
        let chrom = caps
            .name("chrom")
            .ok_or_else(|| ArgError::RegionInvalidFormat(s.to_owned()))?
            .as_str();
        match (caps.name("start"), caps.name("stop")) {
            (Some(start), Some(stop)) => {
                let start: i64 = start.as_str().replace(',', "").parse()?;
                let end: i64 = stop.as_str().replace(',', "").parse()?;
                if start > end || start < 1 {
                    Err(ArgError::RegionInvalidFormat(s.to_owned()))
                } else {
                    Ok(GenomicRegion::new(chrom, start, end))
                }
            }
            _ => Ok(GenomicRegion::whole_chrom(chrom)),
        }
    }
}
