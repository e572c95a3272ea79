use crate::error::ParseError;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

// NAME_CHAR deliberately excludes anything a quoting dialect would need to
// escape; CelestaSQL names travel into catalog columns of width 30.
const NAME_RE_SRC: &str = r"[a-zA-Z_][a-zA-Z0-9_]*";

/// Longest name the system catalog can hold (`nvarchar2(30)` columns).
pub const MAX_IDENTIFIER_LENGTH: usize = 30;

lazy_static! {
    static ref NAME_RE: Regex = Regex::new(&["^", NAME_RE_SRC, "$"].concat()).unwrap();
}

/// A legal CelestaSQL name: a letter or underscore followed by letters,
/// digits and underscores, at most [`MAX_IDENTIFIER_LENGTH`] bytes.
/// Grains, tables, columns, indices, sequences and views all share this
/// production.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Result<Self, ParseError> {
        let s = s.into();
        if s.len() > MAX_IDENTIFIER_LENGTH {
            return Err(ParseError::BadIdentifier {
                name: s.clone(),
                detail: format!("longer than {} characters", MAX_IDENTIFIER_LENGTH),
            });
        }
        match NAME_RE.find(&s) {
            Some(m) if m.start() == 0 && m.end() == s.len() => Ok(Self(s)),
            Some(m) => {
                let unmatched = [&s[..m.start()], &s[m.end()..]].concat();
                Err(ParseError::BadIdentifier {
                    name: s.clone(),
                    detail: format!(
                        "doesn't match pattern {} (unmatched portion is: {})",
                        NAME_RE.as_str(),
                        unmatched
                    ),
                })
            }
            None => Err(ParseError::BadIdentifier {
                name: s.clone(),
                detail: format!("doesn't match pattern {}", NAME_RE.as_str()),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for Identifier {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> String {
        id.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod test {
    use super::Identifier;

    #[test]
    fn test_identifier_legality() {
        for (case, expect) in [
            ("valid", true),
            ("_leading_underscore", true),
            ("v123", true),
            ("CamelCase_9", true),
            ("9starts_with_digit", false),
            ("has space", false),
            ("has-dash", false),
            ("", false),
            ("exactly_thirty_characters_long", true),
            ("a_name_that_is_over_thirty_chars", false),
            ("таблица", false),
        ] {
            let out = Identifier::new(case);
            if expect {
                out.unwrap();
            } else {
                out.unwrap_err();
            }
        }
    }
}
