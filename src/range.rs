//! # Range Selectors
//!
//! A range selector is the compact textual form used to pick which records,
//! runs and targets a reconstruction acts on: `"1-55"`, `"2,3,5,10,20,40"`,
//! `"<10"` or any comma-separated mix of those.
//!
//! Parsed selectors are stored as sorted, disjoint, non-adjacent inclusive
//! intervals, so two selectors are equal exactly when they select the same set
//! of integers, whatever text they were written as.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::diagnostics::HarnessError;

/// An ordered set of distinct positive integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RangeSelector {
    intervals: Vec<(u32, u32)>,
}

impl RangeSelector {
    /// The selector that selects nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses the compact range syntax.
    ///
    /// Tokens are separated by commas and may be `n`, `a-b` (bounds in either
    /// order) or `<n` (shorthand for `1-n`). Whitespace around tokens and empty
    /// tokens are ignored.
    pub fn parse(input: &str) -> Result<Self, HarnessError> {
        let mut intervals = Vec::new();
        for token in input.split(',').map(str::trim) {
            if token.is_empty() {
                continue;
            }
            intervals.push(parse_token(input, token)?);
        }
        Ok(Self::from_intervals(intervals))
    }

    /// Builds a selector from arbitrary values; duplicates collapse.
    pub fn from_values<I: IntoIterator<Item = u32>>(values: I) -> Self {
        Self::from_intervals(values.into_iter().filter(|v| *v > 0).map(|v| (v, v)))
    }

    fn from_intervals<I: IntoIterator<Item = (u32, u32)>>(intervals: I) -> Self {
        let mut sorted: Vec<(u32, u32)> = intervals.into_iter().collect();
        sorted.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(sorted.len());
        for (lo, hi) in sorted {
            match merged.last_mut() {
                Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
                _ => merged.push((lo, hi)),
            }
        }
        Self { intervals: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of selected integers.
    pub fn len(&self) -> u64 {
        self.intervals
            .iter()
            .map(|(lo, hi)| u64::from(*hi) - u64::from(*lo) + 1)
            .sum()
    }

    pub fn contains(&self, value: u32) -> bool {
        self.intervals
            .binary_search_by(|(lo, hi)| {
                if *hi < value {
                    std::cmp::Ordering::Less
                } else if *lo > value {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// The maximal runs of consecutive integers, ascending.
    pub fn intervals(&self) -> impl Iterator<Item = RangeInclusive<u32>> + '_ {
        self.intervals.iter().map(|(lo, hi)| *lo..=*hi)
    }

    /// Every selected integer, ascending.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.intervals().flatten()
    }

    pub fn to_set(&self) -> BTreeSet<u32> {
        self.iter().collect()
    }
}

fn parse_token(input: &str, token: &str) -> Result<(u32, u32), HarnessError> {
    let invalid = |message: String| HarnessError::Range {
        input: input.to_string(),
        message,
    };

    if let Some(upper) = token.strip_prefix('<') {
        let hi = parse_bound(input, upper.trim())?;
        return Ok((1, hi));
    }

    match token.split_once('-') {
        Some((a, b)) => {
            let (a, b) = (a.trim(), b.trim());
            if a.is_empty() || b.is_empty() {
                return Err(invalid(format!("incomplete range '{}'", token)));
            }
            let a = parse_bound(input, a)?;
            let b = parse_bound(input, b)?;
            Ok((a.min(b), a.max(b)))
        }
        None => {
            let n = parse_bound(input, token)?;
            Ok((n, n))
        }
    }
}

fn parse_bound(input: &str, text: &str) -> Result<u32, HarnessError> {
    let value: u32 = text.parse().map_err(|_| HarnessError::Range {
        input: input.to_string(),
        message: format!("'{}' is not a positive integer", text),
    })?;
    if value == 0 {
        return Err(HarnessError::Range {
            input: input.to_string(),
            message: "selectors start at 1, found 0".to_string(),
        });
    }
    Ok(value)
}

impl FromStr for RangeSelector {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RangeSelector {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RangeSelector> for String {
    fn from(value: RangeSelector) -> Self {
        value.to_string()
    }
}

/// Canonical compact form: runs of three or more render as `a-b`.
impl fmt::Display for RangeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pieces = Vec::with_capacity(self.intervals.len());
        for (lo, hi) in &self.intervals {
            if hi - lo >= 2 {
                pieces.push(format!("{}-{}", lo, hi));
            } else {
                pieces.extend((*lo..=*hi).map(|v| v.to_string()));
            }
        }
        f.write_str(&pieces.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_range() {
        let sel = RangeSelector::parse("1-55").unwrap();
        assert_eq!(sel.len(), 55);
        assert_eq!(sel.to_set(), (1..=55).collect::<BTreeSet<u32>>());
        assert_eq!(sel.to_string(), "1-55");
    }

    #[test]
    fn discrete_set() {
        let sel = RangeSelector::parse("2,3,5,10,20,40").unwrap();
        assert_eq!(
            sel.iter().collect::<Vec<_>>(),
            vec![2, 3, 5, 10, 20, 40]
        );
        assert!(sel.contains(10));
        assert!(!sel.contains(4));
        assert_eq!(sel.to_string(), "2,3,5,10,20,40");
    }

    #[test]
    fn membership_is_order_and_duplicate_independent() {
        let a = RangeSelector::parse("40,20,10,5,3,2,3,40").unwrap();
        let b = RangeSelector::parse("2,3,5,10,20,40").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn overlapping_and_adjacent_pieces_merge() {
        let sel = RangeSelector::parse("1-5, 4-8,9 ,12").unwrap();
        assert_eq!(sel.intervals().collect::<Vec<_>>(), vec![1..=9, 12..=12]);
        assert_eq!(sel.to_string(), "1-9,12");
    }

    #[test]
    fn reversed_bounds_and_less_than_shorthand() {
        assert_eq!(
            RangeSelector::parse("10-1").unwrap(),
            RangeSelector::parse("1-10").unwrap()
        );
        assert_eq!(
            RangeSelector::parse("<4").unwrap(),
            RangeSelector::from_values([1, 2, 3, 4])
        );
    }

    #[test]
    fn empty_input_selects_nothing() {
        let sel = RangeSelector::parse(" , ").unwrap();
        assert!(sel.is_empty());
        assert_eq!(sel, RangeSelector::empty());
        assert_eq!(sel.to_string(), "");
    }

    #[test]
    fn rejects_zero_and_garbage() {
        for bad in ["0", "1-0", "a", "3-", "-3", "1-2-3", "<x", "2.5"] {
            let err = RangeSelector::parse(bad).unwrap_err();
            assert!(
                matches!(err, HarnessError::Range { .. }),
                "expected range error for {bad:?}"
            );
        }
    }

    #[test]
    fn deserializes_from_yaml_string() {
        #[derive(Deserialize)]
        struct Holder {
            targets: RangeSelector,
        }
        let holder: Holder = serde_yaml::from_str("targets: \"2,3,5\"").unwrap();
        assert_eq!(holder.targets, RangeSelector::from_values([5, 3, 2]));
    }
}
