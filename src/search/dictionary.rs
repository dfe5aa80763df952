use regex::RegexBuilder;
use roaring::RoaringBitmap;
use crate::enumstore::{fold_case, FrozenDictionary, NumericType, OrdKey};
use crate::search::fuzzy::FuzzyAutomaton;
use crate::search::query_term::{NumericRange, QueryTerm, TermType};

/// Ordinals of dictionary entries matching a string term, in key order.
///
/// Keys of uncased dictionaries are already folded, so the term is folded the same way.
/// Returns `None` when the term cannot be evaluated (bad regex, too many edits).
pub fn string_ordinals(dict: &FrozenDictionary<String>, term: &QueryTerm, folded: bool) -> Option<Vec<usize>> {
    let text = if folded { fold_case(&term.term) } else { term.term.clone() };
    let keys = dict.keys();
    let scan = |pred: &dyn Fn(&str) -> bool| -> Vec<usize> {
        keys.iter()
            .enumerate()
            .filter(|(_, key)| pred(key.as_str()))
            .map(|(ordinal, _)| ordinal)
            .collect()
    };
    let ordinals = match term.term_type {
        TermType::Word | TermType::Exact => dict.find(&text).into_iter().collect(),
        TermType::Prefix => dict.prefix_range(&text).collect(),
        TermType::Substring => scan(&|key| key.contains(text.as_str())),
        TermType::Suffix => scan(&|key| key.ends_with(text.as_str())),
        TermType::Regex => {
            let regex = match RegexBuilder::new(&term.term).case_insensitive(folded).build() {
                Ok(regex) => regex,
                Err(e) => {
                    log::warn!("rejecting regex term '{}': {}", term.term, e);
                    return None;
                }
            };
            scan(&|key| regex.is_match(key))
        }
        TermType::Fuzzy { max_edits, prefix_length } => {
            let automaton = FuzzyAutomaton::new(&text, max_edits, prefix_length)?;
            match dict.search_automaton(&automaton) {
                Some(ordinals) => ordinals,
                None => scan(&|key| automaton.matches(key)),
            }
        }
    };
    Some(ordinals)
}

/// Ordinals of numeric dictionary entries inside `range`, in key order
pub fn numeric_ordinals<T: NumericType>(dict: &FrozenDictionary<OrdKey<T>>, range: &NumericRange<T>) -> Vec<usize> {
    if range.is_empty() {
        return Vec::new();
    }
    let keys = dict.keys();
    // float keys order -0.0 before 0.0 and NaN last, so bounds are checked per key
    let start = if T::IS_FLOAT { 0 } else { keys.partition_point(|k| range.below(k.0)) };
    let mut ordinals = Vec::new();
    for (ordinal, key) in keys.iter().enumerate().skip(start) {
        if !T::IS_FLOAT && range.above(key.0) {
            break;
        }
        if range.is_match(key.0) {
            ordinals.push(ordinal);
        }
    }
    ordinals
}

/// Posting lists of the given ordinals; entries without postings are skipped
pub fn postings_of<'d, K: Ord + std::hash::Hash + Clone>(
    dict: &'d FrozenDictionary<K>,
    ordinals: &[usize],
) -> Vec<&'d RoaringBitmap> {
    ordinals.iter().filter_map(|ordinal| dict.postings(*ordinal)).collect()
}
