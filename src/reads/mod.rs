//! Sequencing reads as seen by the assembly core.
//!
//! Reads are immutable once loaded and shared between assemblies via `Arc`.

pub mod table;

use serde::{Deserialize, Serialize};

/// Placement of the mate of a paired read.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Mate {
    /// Chromosome of the mate.
    pub chrom: String,
    /// 0-based position of the mate.
    pub pos: i64,
    /// Whether the mate maps to the reverse strand.
    pub is_reverse: bool,
}

/// One sequencing read with its alignment state.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Read {
    /// Name of the originating sample.
    pub sample: String,
    /// Read (fragment) name.
    pub name: String,
    /// Whether this is the first read of the pair.
    pub first_in_pair: bool,
    /// Chromosome the read is placed on.
    pub chrom: String,
    /// 0-based position of the first aligned base.
    pub pos: i64,
    /// Number of soft-clipped bases before the first aligned base.
    pub leading_clip: usize,
    /// Mapping quality.
    pub mapq: u8,
    /// Whether the read maps to the reverse strand.
    pub is_reverse: bool,
    /// Whether the read is mapped at all (unmapped reads carry their mate's position).
    pub is_mapped: bool,
    /// Mate placement, `None` if the mate is unmapped or missing.
    pub mate: Option<Mate>,
    /// Observed template length, 0 if unknown.
    pub template_len: i64,
    /// Read bases.
    pub bases: Vec<u8>,
    /// Phred base qualities.
    pub quals: Vec<u8>,
}

/// Identifies one read of a fragment.
#[derive(Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone)]
pub struct ReadKey {
    pub sample: String,
    pub name: String,
    /// 1 or 2 for the read within the pair.
    pub mate_no: u8,
}

impl ReadKey {
    /// Name of the fragment the read belongs to.
    pub fn fragment_name(&self) -> String {
        format!("{}/{}", self.sample, self.name)
    }
}

impl Read {
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn key(&self) -> ReadKey {
        ReadKey {
            sample: self.sample.clone(),
            name: self.name.clone(),
            mate_no: if self.first_in_pair { 1 } else { 2 },
        }
    }

    /// Name of the fragment, shared by both reads of a pair.
    pub fn fragment_name(&self) -> String {
        format!("{}/{}", self.sample, self.name)
    }

    /// Start of the read including soft-clipped bases.
    pub fn layout_start(&self) -> i64 {
        self.pos - self.leading_clip as i64
    }

    /// End of the read including soft-clipped bases (exclusive).
    pub fn layout_end(&self) -> i64 {
        self.layout_start() + self.len() as i64
    }

    pub fn mean_quality(&self) -> f64 {
        if self.quals.is_empty() {
            0.0
        } else {
            self.quals.iter().map(|q| *q as f64).sum::<f64>() / self.quals.len() as f64
        }
    }

    /// Whether the pair is discordant by fragment length or mapping state.
    pub fn is_discordant(&self, max_fragment_length: i64) -> bool {
        match &self.mate {
            _ if !self.is_mapped => true,
            None => true,
            Some(mate) if mate.chrom != self.chrom => true,
            Some(_) => self.template_len.abs() > max_fragment_length,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Arc;

    use super::{Mate, Read};

    /// Build a mapped, concordant read for tests.
    pub(crate) fn read(name: &str, chrom: &str, pos: i64, bases: &[u8]) -> Read {
        Read {
            sample: String::from("sample"),
            name: name.to_owned(),
            first_in_pair: true,
            chrom: chrom.to_owned(),
            pos,
            leading_clip: 0,
            mapq: 60,
            is_reverse: false,
            is_mapped: true,
            mate: Some(Mate {
                chrom: chrom.to_owned(),
                pos: pos + 200,
                is_reverse: true,
            }),
            template_len: 300,
            bases: bases.to_vec(),
            quals: vec![30; bases.len()],
        }
    }

    pub(crate) fn arc_read(name: &str, chrom: &str, pos: i64, bases: &[u8]) -> Arc<Read> {
        Arc::new(read(name, chrom, pos, bases))
    }

    #[rstest::rstest]
    #[case(300, None, true, false)]
    #[case(5000, None, true, true)]
    #[case(300, Some("chr2"), true, true)]
    #[case(300, None, false, true)]
    fn is_discordant(
        #[case] template_len: i64,
        #[case] mate_chrom: Option<&str>,
        #[case] is_mapped: bool,
        #[case] expected: bool,
    ) {
        let mut r = read("r1", "chr1", 100, b"ACGT");
        r.template_len = template_len;
        r.is_mapped = is_mapped;
        if let Some(mate_chrom) = mate_chrom {
            r.mate = Some(Mate {
                chrom: mate_chrom.to_owned(),
                pos: 10,
                is_reverse: false,
            });
        }
        assert_eq!(r.is_discordant(1000), expected);
    }

    #[test]
    fn keys_and_layout() {
        let mut r = read("frag", "chr1", 100, b"ACGTACGT");
        r.leading_clip = 3;
        assert_eq!(r.layout_start(), 97);
        assert_eq!(r.layout_end(), 105);
        assert_eq!(r.fragment_name(), "sample/frag");
        assert_eq!(r.key().fragment_name(), r.fragment_name());
        assert_eq!(r.key().mate_no, 1);
    }
}
