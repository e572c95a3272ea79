use crate::error::ParseError;
use crate::names::Identifier;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of comparing two [`VersionString`]s.
///
/// `Lower`/`Greater` are strict directions agreed on by every shared tag;
/// `Inconsistent` means two tags disagree on the direction and the versions
/// cannot be ordered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ComparisonState {
    Lower,
    Equals,
    Greater,
    Inconsistent,
}

/// A tagged version: `tag1 1.2, tag2 2.3.4`. Each tag names an independent
/// line of changes; tags are compared pairwise and must agree on direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionString {
    // Tag name to dotted-integer components, kept sorted for stable rendering.
    tags: BTreeMap<String, Vec<u32>>,
}

impl VersionString {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let malformed = |detail: String| ParseError::MalformedVersion {
            input: input.to_string(),
            detail,
        };

        if input.trim().is_empty() {
            return Err(malformed("empty version".to_string()));
        }

        let mut tags = BTreeMap::new();
        for entry in input.split(',') {
            let entry = entry.trim();
            let (tag, version) = entry
                .split_once(' ')
                .ok_or_else(|| malformed(format!("entry {:?} is not `tag version`", entry)))?;

            let tag = Identifier::new(tag)
                .map_err(|e| malformed(format!("bad tag in entry {:?}: {}", entry, e)))?;

            let components = version
                .trim()
                .split('.')
                .map(|c| {
                    c.parse::<u32>()
                        .map_err(|_| malformed(format!("bad version number {:?}", version)))
                })
                .collect::<Result<Vec<u32>, ParseError>>()?;

            if tags.insert(tag.to_string(), components).is_some() {
                return Err(malformed(format!("duplicate tag {:?}", tag)));
            }
        }
        Ok(Self { tags })
    }

    /// Compare by the tags present on both sides: each shared tag votes by
    /// lexicographic integer comparison, equal votes are neutral, and two
    /// strict votes in opposite directions make the versions incomparable.
    /// Tags present on one side only are ignored; they never produce a
    /// direction or an inconsistency by themselves.
    pub fn compare(&self, other: &VersionString) -> ComparisonState {
        use std::cmp::Ordering;

        let mut state = Ordering::Equal;
        for (tag, mine) in &self.tags {
            let Some(theirs) = other.tags.get(tag) else {
                continue;
            };
            match (state, mine.cmp(theirs)) {
                (_, Ordering::Equal) => (),
                (Ordering::Equal, d) => state = d,
                (s, d) if s == d => (),
                _ => return ComparisonState::Inconsistent,
            }
        }

        match state {
            Ordering::Less => ComparisonState::Lower,
            Ordering::Greater => ComparisonState::Greater,
            Ordering::Equal => ComparisonState::Equals,
        }
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rendered = self
            .tags
            .iter()
            .map(|(tag, components)| format!("{} {}", tag, components.iter().join(".")))
            .join(", ");
        f.write_str(&rendered)
    }
}

#[cfg(test)]
mod test {
    use super::{ComparisonState, VersionString};

    #[test]
    fn test_parse_failures() {
        for case in [
            "",
            "   ",
            "1.2",
            "app",
            "app 1.2b",
            "app 1..2",
            "app 1.2, app 1.3",
            "app 1.2,, other 1.0",
            "9app 1.2",
        ] {
            VersionString::parse(case).unwrap_err();
        }
    }

    #[test]
    fn test_round_trip() {
        for case in ["app 1.2", "app 1.2, base 2.0.1", "z 1, a 2.3"] {
            let parsed = VersionString::parse(case).unwrap();
            let rendered = parsed.to_string();
            assert_eq!(parsed, VersionString::parse(&rendered).unwrap());
        }
        // Rendering is sorted by tag.
        assert_eq!(
            VersionString::parse("z 1, a 2.3").unwrap().to_string(),
            "a 2.3, z 1"
        );
    }

    #[test]
    fn test_compare() {
        use ComparisonState::*;

        for (left, right, expect) in [
            ("app 1.2", "app 1.2", Equals),
            ("app 1.2", "app 1.3", Lower),
            ("app 1.3", "app 1.2", Greater),
            ("app 1.10", "app 1.9", Greater),
            ("app 1.2", "app 1.2.1", Lower),
            ("app 1.2, base 2.0", "app 1.2, base 2.0", Equals),
            ("app 1.3, base 2.1", "app 1.2, base 2.0", Greater),
            // Tags disagree on direction.
            ("app 1.3, base 1.0", "app 1.2, base 2.0", Inconsistent),
            // Tags present on only one side are ignored in the ordering.
            ("app 1.2, extra 1.0", "app 1.2", Equals),
            ("app 1.2", "app 1.2, extra 1.0", Equals),
            ("app 1.3, extra 1.0", "app 1.2", Greater),
            ("extra 1.0", "app 1.2", Equals),
        ] {
            let left = VersionString::parse(left).unwrap();
            let right = VersionString::parse(right).unwrap();
            assert_eq!(left.compare(&right), expect, "{} vs {}", left, right);
        }
    }
}
