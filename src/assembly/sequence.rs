//! Bases with per-base qualities.

use serde::{Deserialize, Serialize};

use crate::{common::reverse_complement, err::SequenceError};

/// An ordered pair of bases and phred qualities of equal length.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone, Default)]
pub struct Sequence {
    bases: Vec<u8>,
    quals: Vec<u8>,
}

impl Sequence {
    pub fn new(bases: Vec<u8>, quals: Vec<u8>) -> Result<Self, SequenceError> {
        if bases.len() != quals.len() {
            return Err(SequenceError::LengthMismatch {
                bases: bases.len(),
                quals: quals.len(),
            });
        }
        if let Some(base) = bases.iter().find(|b| !b.is_ascii_alphabetic()) {
            return Err(SequenceError::InvalidBase(*base as char));
        }
        Ok(Self { bases, quals })
    }

    /// Sequence with all qualities set to `qual`.
    pub fn with_uniform_quality(bases: &[u8], qual: u8) -> Self {
        Self {
            bases: bases.to_vec(),
            quals: vec![qual; bases.len()],
        }
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn quals(&self) -> &[u8] {
        &self.quals
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Copy of the bases `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            bases: self.bases[start..end].to_vec(),
            quals: self.quals[start..end].to_vec(),
        }
    }

    /// Append bases and qualities of `other`.
    pub fn extend_from(&mut self, other: &Sequence) {
        self.bases.extend_from_slice(&other.bases);
        self.quals.extend_from_slice(&other.quals);
    }

    pub fn push(&mut self, base: u8, qual: u8) {
        self.bases.push(base);
        self.quals.push(qual);
    }

    pub fn reverse_complement(&self) -> Self {
        Self {
            bases: reverse_complement(&self.bases),
            quals: self.quals.iter().rev().copied().collect(),
        }
    }

    pub fn mean_quality(&self) -> f64 {
        if self.quals.is_empty() {
            0.0
        } else {
            self.quals.iter().map(|q| *q as f64).sum::<f64>() / self.quals.len() as f64
        }
    }

    pub fn bases_str(&self) -> String {
        String::from_utf8_lossy(&self.bases).into_owned()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::Sequence;
    use crate::err::SequenceError;

    #[test]
    fn new_checks_lengths() {
        assert_eq!(
            Sequence::new(b"ACG".to_vec(), vec![1, 2]),
            Err(SequenceError::LengthMismatch { bases: 3, quals: 2 })
        );
        assert_eq!(
            Sequence::new(b"A-G".to_vec(), vec![1, 2, 3]),
            Err(SequenceError::InvalidBase('-'))
        );
    }

    #[test]
    fn reverse_complement_reverses_quals() -> Result<(), anyhow::Error> {
        let seq = Sequence::new(b"AACG".to_vec(), vec![1, 2, 3, 4])?;
        let rc = seq.reverse_complement();
        assert_eq!(rc.bases(), b"CGTT");
        assert_eq!(rc.quals(), &[4, 3, 2, 1]);
        assert_eq!(rc.reverse_complement(), seq);
        Ok(())
    }

    #[test]
    fn slice_and_extend() {
        let seq = Sequence::with_uniform_quality(b"ACGTACGT", 20);
        let mut left = seq.slice(0, 3);
        left.extend_from(&seq.slice(3, 8));
        assert_eq!(left, seq);
        assert!(float_cmp::approx_eq!(f64, seq.mean_quality(), 20.0, ulps = 2));
    }
}
