use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};

/// How documents without a value are placed when sorting
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Missing documents sort as the type's zero value ("" for strings)
    #[default]
    Default,
    /// Missing documents sort before all others, in either direction
    First,
    /// Missing documents sort after all others, in either direction
    Last,
    /// Missing documents sort as if they held this literal
    As(String),
}

impl MissingPolicy {
    /// Parses a policy name; `as` requires the replacement literal.
    pub fn parse(name: &str, value: Option<&str>) -> Result<Self> {
        match (name.trim().to_ascii_lowercase().as_str(), value) {
            ("default", _) => Ok(MissingPolicy::Default),
            ("first", _) => Ok(MissingPolicy::First),
            ("last", _) => Ok(MissingPolicy::Last),
            ("as", Some(literal)) => Ok(MissingPolicy::As(literal.to_string())),
            ("as", None) => Err(Error::config("missing policy 'as' needs a value")),
            (other, _) => Err(Error::new(ErrorKind::Parse, format!("unknown missing policy '{}'", other))),
        }
    }
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MissingPolicy::Default => f.write_str("default"),
            MissingPolicy::First => f.write_str("first"),
            MissingPolicy::Last => f.write_str("last"),
            MissingPolicy::As(v) => write!(f, "as({})", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_policies() {
        assert_eq!(MissingPolicy::parse("First", None).unwrap(), MissingPolicy::First);
        assert_eq!(MissingPolicy::parse("as", Some("17")).unwrap(), MissingPolicy::As("17".into()));
        assert_eq!(MissingPolicy::parse("as", None).unwrap_err().kind(), ErrorKind::InvalidConfig);
        assert_eq!(MissingPolicy::parse("middle", None).unwrap_err().kind(), ErrorKind::Parse);
    }
}
