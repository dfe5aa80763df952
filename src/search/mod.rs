pub mod query_term;
pub mod fuzzy;
pub mod dictionary;
pub mod context;

pub use context::{
    AttributeSearchContext, BitmapIterator, EnumSet, NeverMatch, PostingIterator, ScanIterator, SearchContext,
    TermMatcher,
};
pub use fuzzy::FuzzyAutomaton;
pub use query_term::{NumericRange, QueryTerm, TermType};
