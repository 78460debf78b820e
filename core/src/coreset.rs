//! Coreset grammar: a comma-separated list of integers and `a-b` ranges,
//! e.g. `"0-7"`, `"0,2-4,9"`. Parsing and the canonical range-collapsing
//! formatter are each other's inverse on canonical input.

use std::fmt;

use thiserror::Error;

use crate::config::MAX_CORES;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoresetError {
    #[error("empty coreset string")]
    Empty,
    #[error("malformed coreset item: {0:?}")]
    Malformed(String),
    #[error("inverted range: {0}-{1}")]
    InvertedRange(u32, u32),
    #[error("cpu index {0} out of range (max {1})")]
    OutOfRange(u32, usize),
}

/// A parsed, deduplicated, sorted set of logical CPU indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Coreset(Vec<u32>);

impl Coreset {
    pub fn cpus(&self) -> &[u32] {
        &self.0
    }

    pub fn contains(&self, cpu: u32) -> bool {
        self.0.binary_search(&cpu).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_cpus(mut cpus: Vec<u32>) -> Self {
        cpus.sort_unstable();
        cpus.dedup();
        Coreset(cpus)
    }

    /// Parses a coreset string, rejecting out-of-range or inverted ranges.
    /// `max_cores` bounds valid indices to `0..max_cores`; pass
    /// `usize::MAX` to skip the range check entirely (used for the
    /// category pathway's deliberately out-of-range `"16"` fallback).
    pub fn parse(s: &str, max_cores: usize) -> Result<Self, CoresetError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoresetError::Empty);
        }
        let mut cpus = Vec::new();
        for item in s.split(',') {
            let item = item.trim();
            if item.is_empty() {
                return Err(CoresetError::Malformed(s.to_string()));
            }
            if let Some((lo, hi)) = item.split_once('-') {
                let lo: u32 = lo
                    .trim()
                    .parse()
                    .map_err(|_| CoresetError::Malformed(item.to_string()))?;
                let hi: u32 = hi
                    .trim()
                    .parse()
                    .map_err(|_| CoresetError::Malformed(item.to_string()))?;
                if lo > hi {
                    return Err(CoresetError::InvertedRange(lo, hi));
                }
                for cpu in lo..=hi {
                    check_range(cpu, max_cores)?;
                    cpus.push(cpu);
                }
            } else {
                let cpu: u32 = item
                    .parse()
                    .map_err(|_| CoresetError::Malformed(item.to_string()))?;
                check_range(cpu, max_cores)?;
                cpus.push(cpu);
            }
        }
        Ok(Coreset::from_cpus(cpus))
    }

    /// Parses against the default [`MAX_CORES`] bound.
    pub fn parse_bounded(s: &str) -> Result<Self, CoresetError> {
        Coreset::parse(s, MAX_CORES)
    }

    /// Unconditionally-valid parse used for the category pathway's
    /// hardcoded fallback strings, one of which (`"16"`) is deliberately
    /// out of range.
    pub fn parse_unchecked(s: &str) -> Result<Self, CoresetError> {
        Coreset::parse(s, usize::MAX)
    }

    /// Collapses the sorted cpu list back into the canonical comma/range
    /// string: consecutive runs of three or more become a range, anything
    /// shorter is listed individually.
    pub fn to_canonical_string(&self) -> String {
        cores_to_string(&self.0)
    }
}

fn check_range(cpu: u32, max_cores: usize) -> Result<(), CoresetError> {
    if max_cores != usize::MAX && cpu as usize >= max_cores {
        return Err(CoresetError::OutOfRange(cpu, max_cores));
    }
    Ok(())
}

fn cores_to_string(cpus: &[u32]) -> String {
    if cpus.is_empty() {
        return String::new();
    }
    let mut parts = Vec::new();
    let mut start = cpus[0];
    let mut prev = cpus[0];
    for &cpu in &cpus[1..] {
        if cpu == prev + 1 {
            prev = cpu;
            continue;
        }
        parts.push(range_part(start, prev));
        start = cpu;
        prev = cpu;
    }
    parts.push(range_part(start, prev));
    parts.join(",")
}

fn range_part(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

impl fmt::Display for Coreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_plain_list() {
        let set = Coreset::parse_bounded("0,2,3,4").unwrap();
        assert_eq!(set.cpus(), &[0, 2, 3, 4]);
    }

    #[test]
    fn round_trip_collapses_runs() {
        let set = Coreset::parse_bounded("0,2,3,4").unwrap();
        assert_eq!(set.to_canonical_string(), "0,2-4");
        let reparsed = Coreset::parse_bounded(&set.to_canonical_string()).unwrap();
        assert_eq!(reparsed, set);
    }

    #[test]
    fn rejects_inverted_range() {
        assert_eq!(
            Coreset::parse_bounded("5-2"),
            Err(CoresetError::InvertedRange(5, 2))
        );
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(matches!(
            Coreset::parse_bounded("99"),
            Err(CoresetError::OutOfRange(99, MAX_CORES))
        ));
    }

    #[test]
    fn io_fallback_is_out_of_range_but_parses_unchecked() {
        assert!(Coreset::parse_bounded(crate::config::IO_FALLBACK).is_err());
        let set = Coreset::parse_unchecked(crate::config::IO_FALLBACK).unwrap();
        assert_eq!(set.cpus(), &[16]);
    }

    #[test]
    fn single_span_formats_as_range() {
        let set = Coreset::parse_bounded("0-7").unwrap();
        assert_eq!(set.to_canonical_string(), "0-7");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Coreset::parse_bounded(""), Err(CoresetError::Empty));
    }
}
