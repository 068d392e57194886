//! Common functionality.

use std::cmp::Ordering;

use byte_unit::{Byte, UnitType};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub mod io;
pub mod region;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let rss = procfs::process::Process::myself()
        .and_then(|me| me.stat())
        .map(|stat| stat.rss * procfs::page_size());
    match rss {
        Ok(rss) => tracing::debug!(
            "RSS now: {:.2}",
            Byte::from_u64(rss).get_appropriate_unit(UnitType::Binary)
        ),
        Err(e) => tracing::trace!("could not determine RSS: {}", e),
    }
}

/// Sort key of a chromosome name.
///
/// Canonical names come first in karyotype order, all other contigs follow
/// with embedded numbers compared by value ("chrUn_2" before "chrUn_10").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChromKey {
    Canonical(usize),
    Other(Vec<NaturalToken>),
}

/// Token of a natural-order string key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum NaturalToken {
    Number(u64),
    Text(String),
}

impl ChromKey {
    pub fn new(chrom: &str) -> Self {
        let stripped = chrom
            .strip_prefix("chr")
            .or_else(|| chrom.strip_prefix("Chr"))
            .unwrap_or(chrom);
        match stripped.parse::<usize>() {
            Ok(no) if (1..=22).contains(&no) && !stripped.starts_with('0') => {
                ChromKey::Canonical(no - 1)
            }
            Ok(_) => ChromKey::Other(natural_tokens(chrom)),
            Err(_) => match stripped.to_ascii_lowercase().as_str() {
                "x" => ChromKey::Canonical(22),
                "y" => ChromKey::Canonical(23),
                "m" | "mt" => ChromKey::Canonical(24),
                _ => ChromKey::Other(natural_tokens(chrom)),
            },
        }
    }
}

/// Split `s` into runs of digits and non-digits.
fn natural_tokens(s: &str) -> Vec<NaturalToken> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;
    for c in s.chars() {
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != in_digits {
            result.push(to_token(&current, in_digits));
            current.clear();
        }
        in_digits = is_digit;
        current.push(c);
    }
    if !current.is_empty() {
        result.push(to_token(&current, in_digits));
    }
    result
}

fn to_token(s: &str, digits: bool) -> NaturalToken {
    match (digits, s.parse::<u64>()) {
        (true, Ok(value)) => NaturalToken::Number(value),
        _ => NaturalToken::Text(s.to_owned()),
    }
}

/// Numeric-aware comparison of chromosome names.
pub fn cmp_chrom(lhs: &str, rhs: &str) -> Ordering {
    ChromKey::new(lhs)
        .cmp(&ChromKey::new(rhs))
        .then_with(|| lhs.cmp(rhs))
}

/// Numeric-aware comparison of `(chromosome, position)` loci.
pub fn cmp_locus(lhs: (&str, i64), rhs: (&str, i64)) -> Ordering {
    cmp_chrom(lhs.0, rhs.0).then_with(|| lhs.1.cmp(&rhs.1))
}

/// Complement of a single IUPAC base, `N` for anything unknown.
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        _ => b'N',
    }
}

/// Reverse complement of `bases`.
pub fn reverse_complement(bases: &[u8]) -> Vec<u8> {
    bases.iter().rev().map(|b| complement(*b)).collect()
}
