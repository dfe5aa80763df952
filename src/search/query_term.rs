use std::cmp::Ordering;
use std::fmt;
use crate::enumstore::NumericType;

/// How a term is matched against attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermType {
    /// Whole-value match; case handling follows the attribute's match mode
    Word,
    /// Whole-value match with the same folding as `Word`
    Exact,
    Prefix,
    Substring,
    Suffix,
    Regex,
    /// Levenshtein match; the first `prefix_length` characters must match exactly
    Fuzzy { max_edits: u8, prefix_length: u32 },
}

/// A single query term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    pub term: String,
    pub term_type: TermType,
}

impl QueryTerm {
    pub fn new(term: impl Into<String>, term_type: TermType) -> Self {
        QueryTerm { term: term.into(), term_type }
    }

    pub fn word(term: impl Into<String>) -> Self {
        Self::new(term, TermType::Word)
    }

    pub fn exact(term: impl Into<String>) -> Self {
        Self::new(term, TermType::Exact)
    }

    pub fn prefix(term: impl Into<String>) -> Self {
        Self::new(term, TermType::Prefix)
    }

    pub fn substring(term: impl Into<String>) -> Self {
        Self::new(term, TermType::Substring)
    }

    pub fn suffix(term: impl Into<String>) -> Self {
        Self::new(term, TermType::Suffix)
    }

    pub fn regex(term: impl Into<String>) -> Self {
        Self::new(term, TermType::Regex)
    }

    pub fn fuzzy(term: impl Into<String>, max_edits: u8, prefix_length: u32) -> Self {
        Self::new(term, TermType::Fuzzy { max_edits, prefix_length })
    }

    /// Only whole-value terms are meaningful for numeric attributes
    pub fn is_numeric_compatible(&self) -> bool {
        matches!(self.term_type, TermType::Word | TermType::Exact)
    }
}

impl fmt::Display for QueryTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}({})", self.term_type, self.term)
    }
}

enum Limit<T> {
    Open,
    At(T, bool),
    Empty,
}

/// Numeric interval parsed from a term.
///
/// Accepted forms: `[a;b]` with either side optional, `<a`, `>a` and a plain value.
/// Integer attributes turn fractional bounds into the nearest contained integers, so
/// `[1.5;3]` matches 2 and 3 and a plain `2.5` matches nothing. Undefined values never
/// match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange<T> {
    lo: Option<(T, bool)>,
    hi: Option<(T, bool)>,
    empty: bool,
}

impl<T: NumericType> NumericRange<T> {
    pub fn parse(term: &str) -> Option<Self> {
        let term = term.trim();
        let (lower, upper) = if let Some(inner) = term.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let (lo, hi) = inner.split_once(';')?;
            let (lo, hi) = (lo.trim(), hi.trim());
            let lower = if lo.is_empty() { Limit::Open } else { lower_limit::<T>(lo, true)? };
            let upper = if hi.is_empty() { Limit::Open } else { upper_limit::<T>(hi, true)? };
            (lower, upper)
        } else if let Some(rest) = term.strip_prefix('<') {
            (Limit::Open, upper_limit::<T>(rest.trim(), false)?)
        } else if let Some(rest) = term.strip_prefix('>') {
            (lower_limit::<T>(rest.trim(), false)?, Limit::Open)
        } else {
            (lower_limit::<T>(term, true)?, upper_limit::<T>(term, true)?)
        };
        Some(Self::from_limits(lower, upper))
    }

    fn from_limits(lower: Limit<T>, upper: Limit<T>) -> Self {
        let mut range = NumericRange { lo: None, hi: None, empty: false };
        match lower {
            Limit::Open => {}
            Limit::At(v, inclusive) => range.lo = Some((v, inclusive)),
            Limit::Empty => range.empty = true,
        }
        match upper {
            Limit::Open => {}
            Limit::At(v, inclusive) => range.hi = Some((v, inclusive)),
            Limit::Empty => range.empty = true,
        }
        if let (Some((lo, lo_inc)), Some((hi, hi_inc))) = (range.lo, range.hi) {
            match lo.partial_cmp(&hi) {
                Some(Ordering::Greater) | None => range.empty = true,
                Some(Ordering::Equal) if !(lo_inc && hi_inc) => range.empty = true,
                _ => {}
            }
        }
        range
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// `value` lies below the lower bound
    pub fn below(&self, value: T) -> bool {
        match self.lo {
            Some((lo, inclusive)) => match value.partial_cmp(&lo) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => !inclusive,
                _ => false,
            },
            None => false,
        }
    }

    /// `value` lies above the upper bound
    pub fn above(&self, value: T) -> bool {
        match self.hi {
            Some((hi, inclusive)) => match value.partial_cmp(&hi) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => !inclusive,
                _ => false,
            },
            None => false,
        }
    }

    pub fn is_match(&self, value: T) -> bool {
        !self.empty && !value.is_undefined() && !self.below(value) && !self.above(value)
    }
}

/// Integer reading of a bound; words like `true` fall back to the type's own parser
fn parse_integral<T: NumericType>(s: &str) -> Option<Result<i128, f64>> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(Ok(v as i128));
    }
    if let Ok(f) = s.parse::<f64>() {
        return (!f.is_nan()).then_some(Err(f));
    }
    T::parse(s).map(|v| Ok(v.to_i64() as i128))
}

fn lower_limit<T: NumericType>(s: &str, inclusive: bool) -> Option<Limit<T>> {
    if T::IS_FLOAT {
        let f = s.parse::<f64>().ok().filter(|f| !f.is_nan())?;
        return Some(Limit::At(T::from_f64(f), inclusive));
    }
    let lo = match parse_integral::<T>(s)? {
        Ok(v) => if inclusive { v } else { v + 1 },
        Err(f) => if inclusive { f.ceil() as i128 } else { f.floor() as i128 + 1 },
    };
    let (min, max) = T::defined_range_i64();
    if lo > max as i128 {
        return Some(Limit::Empty);
    }
    Some(Limit::At(T::from_i64(lo.max(min as i128) as i64), true))
}

fn upper_limit<T: NumericType>(s: &str, inclusive: bool) -> Option<Limit<T>> {
    if T::IS_FLOAT {
        let f = s.parse::<f64>().ok().filter(|f| !f.is_nan())?;
        return Some(Limit::At(T::from_f64(f), inclusive));
    }
    let hi = match parse_integral::<T>(s)? {
        Ok(v) => if inclusive { v } else { v - 1 },
        Err(f) => if inclusive { f.floor() as i128 } else { f.ceil() as i128 - 1 },
    };
    let (min, max) = T::defined_range_i64();
    if hi < min as i128 {
        return Some(Limit::Empty);
    }
    Some(Limit::At(T::from_i64(hi.min(max as i128) as i64), true))
}
