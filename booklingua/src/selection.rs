//! Chapter selection syntax
//!
//! A selection is a comma-separated list of single indices and inclusive
//! ranges, e.g. `"1,3-5,8-10"`. An empty selection selects every unit.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Errors from parsing a chapter selection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("invalid chapter token '{0}'")]
    InvalidToken(String),
    #[error("reversed chapter range '{start}-{end}'")]
    ReversedRange { start: usize, end: usize },
}

/// A set of unit indices, or every unit
///
/// Indices are held as sorted, disjoint, non-adjacent ranges, so a selection
/// like `0-4000000000` costs one entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChapterSelection {
    /// `None` selects every unit
    ranges: Option<Vec<RangeInclusive<usize>>>,
}

impl ChapterSelection {
    /// Selection matching every unit
    pub fn all() -> Self {
        Self { ranges: None }
    }

    /// Parse a selection string
    ///
    /// Whitespace around tokens is ignored and empty tokens are skipped, so
    /// `" 1 , ,3-4 "` is the same as `"1,3-4"`. A string with no tokens at
    /// all selects every unit.
    ///
    /// # Arguments
    /// * `input` - The selection text
    ///
    /// # Returns
    /// * `Ok(ChapterSelection)` - The parsed selection
    /// * `Err(SelectionError)` - On a non-numeric token or a reversed range
    ///
    /// # Example
    /// ```ignore
    /// let sel = ChapterSelection::parse("1,3-5")?;
    /// assert!(sel.contains(4));
    /// assert!(!sel.contains(2));
    /// ```
    pub fn parse(input: &str) -> Result<Self, SelectionError> {
        let mut ranges = Vec::new();

        for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_index(start.trim(), token)?;
                    let end = parse_index(end.trim(), token)?;
                    if start > end {
                        return Err(SelectionError::ReversedRange { start, end });
                    }
                    ranges.push(start..=end);
                }
                None => {
                    let index = parse_index(token, token)?;
                    ranges.push(index..=index);
                }
            }
        }

        if ranges.is_empty() {
            Ok(Self::all())
        } else {
            Ok(Self {
                ranges: Some(merge(ranges)),
            })
        }
    }

    pub fn is_all(&self) -> bool {
        self.ranges.is_none()
    }

    pub fn contains(&self, index: usize) -> bool {
        match &self.ranges {
            Some(ranges) => {
                // Ranges are sorted and disjoint
                let at = ranges.partition_point(|r| *r.end() < index);
                ranges.get(at).is_some_and(|r| r.contains(&index))
            }
            None => true,
        }
    }

    /// The selected ranges in ascending order, or `None` for all
    pub fn ranges(&self) -> Option<&[RangeInclusive<usize>]> {
        self.ranges.as_deref()
    }

    /// Highest selected index, or `None` for all
    pub fn max(&self) -> Option<usize> {
        self.ranges()?.last().map(|r| *r.end())
    }
}

/// Sort ranges and merge the overlapping or adjacent ones
fn merge(mut ranges: Vec<RangeInclusive<usize>>) -> Vec<RangeInclusive<usize>> {
    ranges.sort_by_key(|r| *r.start());
    let mut merged: Vec<RangeInclusive<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if *range.start() <= last.end().saturating_add(1) => {
                if range.end() > last.end() {
                    *last = *last.start()..=*range.end();
                }
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Plain decimal digits only; `usize::from_str` would also take a leading `+`
fn parse_index(raw: &str, token: &str) -> Result<usize, SelectionError> {
    let invalid = || SelectionError::InvalidToken(token.to_string());
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    raw.parse::<usize>().map_err(|_| invalid())
}

impl FromStr for ChapterSelection {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ChapterSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(ranges) = &self.ranges else {
            return f.write_str("all");
        };

        let parts: Vec<String> = ranges
            .iter()
            .map(|r| {
                if r.start() == r.end() {
                    r.start().to_string()
                } else {
                    format!("{}-{}", r.start(), r.end())
                }
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed() {
        let sel = ChapterSelection::parse("1,3-5,8-10").unwrap();
        let got: Vec<usize> = (0..=12).filter(|i| sel.contains(*i)).collect();
        assert_eq!(got, vec![1, 3, 4, 5, 8, 9, 10]);
        assert_eq!(sel.max(), Some(10));
    }

    #[test]
    fn test_empty_selects_all() {
        let sel = ChapterSelection::parse("").unwrap();
        assert!(sel.is_all());
        assert!(sel.contains(0));
        assert!(sel.contains(9999));
    }

    #[test]
    fn test_whitespace_and_empty_tokens() {
        let sel = ChapterSelection::parse(" 2 , , 4 - 5 ,").unwrap();
        assert!(sel.contains(2));
        assert!(sel.contains(4));
        assert!(sel.contains(5));
        assert!(!sel.contains(3));
    }

    #[test]
    fn test_only_commas_selects_all() {
        assert!(ChapterSelection::parse(" , ,").unwrap().is_all());
    }

    #[test]
    fn test_single_point_range() {
        let sel = ChapterSelection::parse("7-7").unwrap();
        assert_eq!(sel.ranges().unwrap(), &[7..=7]);
        assert!(sel.contains(7));
        assert!(!sel.contains(6));
        assert!(!sel.contains(8));
    }

    #[test]
    fn test_reversed_range_is_error() {
        assert_eq!(
            ChapterSelection::parse("5-3"),
            Err(SelectionError::ReversedRange { start: 5, end: 3 })
        );
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(matches!(
            ChapterSelection::parse("1,x"),
            Err(SelectionError::InvalidToken(t)) if t == "x"
        ));
        assert!(ChapterSelection::parse("-3").is_err());
        assert!(ChapterSelection::parse("2-").is_err());
        assert!(ChapterSelection::parse("1-2-3").is_err());
    }

    #[test]
    fn test_plus_sign_is_rejected() {
        assert!(matches!(
            ChapterSelection::parse("+3"),
            Err(SelectionError::InvalidToken(t)) if t == "+3"
        ));
        assert!(ChapterSelection::parse("1-+4").is_err());
        assert!(ChapterSelection::parse("+1-4").is_err());
    }

    #[test]
    fn test_huge_range_is_cheap() {
        let sel = ChapterSelection::parse("0-4000000000,7").unwrap();
        assert_eq!(sel.ranges().unwrap(), &[0..=4_000_000_000]);
        assert!(sel.contains(0));
        assert!(sel.contains(3_999_999_999));
        assert!(!sel.contains(4_000_000_001));

        let top = format!("{}-{}", usize::MAX - 1, usize::MAX);
        let sel = ChapterSelection::parse(&top).unwrap();
        assert!(sel.contains(usize::MAX));
        assert_eq!(sel.max(), Some(usize::MAX));
    }

    #[test]
    fn test_overlapping_ranges_merge() {
        let sel = ChapterSelection::parse("5-9,1-3,4,8-12,20").unwrap();
        assert_eq!(sel.ranges().unwrap(), &[1..=12, 20..=20]);
        assert!(!sel.contains(13));
        assert!(sel.contains(20));
    }

    #[test]
    fn test_display_collapses_ranges() {
        let sel: ChapterSelection = "10,1,3-5,8,9".parse().unwrap();
        assert_eq!(sel.to_string(), "1,3-5,8-10");
        assert_eq!(ChapterSelection::all().to_string(), "all");
    }
}
