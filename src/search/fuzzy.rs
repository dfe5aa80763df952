use fst::Automaton;
use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder, DFA, SINK_STATE};

/// Largest edit distance accepted for fuzzy terms
pub const MAX_FUZZY_EDITS: u8 = 2;

/// Levenshtein automaton with an exact-match prefix.
///
/// The first `prefix_length` characters of the term must appear verbatim; the rest is
/// matched within `max_edits` insertions, deletions or substitutions.
pub struct FuzzyAutomaton {
    prefix: Vec<u8>,
    dfa: DFA,
    max_edits: u8,
}

impl FuzzyAutomaton {
    /// Returns `None` when `max_edits` is above [`MAX_FUZZY_EDITS`].
    pub fn new(term: &str, max_edits: u8, prefix_length: u32) -> Option<Self> {
        if max_edits > MAX_FUZZY_EDITS {
            return None;
        }
        let split = term
            .char_indices()
            .nth(prefix_length as usize)
            .map(|(pos, _)| pos)
            .unwrap_or(term.len());
        let (prefix, rest) = term.split_at(split);
        let builder = LevenshteinAutomatonBuilder::new(max_edits, false);
        Some(FuzzyAutomaton {
            prefix: prefix.as_bytes().to_vec(),
            dfa: builder.build_dfa(rest),
            max_edits,
        })
    }

    pub fn max_edits(&self) -> u8 {
        self.max_edits
    }

    /// Matches one candidate outside of an fst
    pub fn matches(&self, candidate: &str) -> bool {
        let mut state = self.start();
        for &byte in candidate.as_bytes() {
            state = self.accept(&state, byte);
            if state.is_none() {
                return false;
            }
        }
        self.is_match(&state)
    }
}

impl Automaton for FuzzyAutomaton {
    /// Prefix bytes consumed and DFA state; `None` once the prefix diverged
    type State = Option<(usize, u32)>;

    fn start(&self) -> Self::State {
        Some((0, self.dfa.initial_state()))
    }

    fn is_match(&self, state: &Self::State) -> bool {
        match state {
            Some((consumed, dfa_state)) if *consumed == self.prefix.len() => {
                matches!(self.dfa.distance(*dfa_state), Distance::Exact(d) if d <= self.max_edits)
            }
            _ => false,
        }
    }

    fn can_match(&self, state: &Self::State) -> bool {
        match state {
            Some((consumed, dfa_state)) => *consumed < self.prefix.len() || *dfa_state != SINK_STATE,
            None => false,
        }
    }

    fn accept(&self, state: &Self::State, byte: u8) -> Self::State {
        let (consumed, dfa_state) = (*state)?;
        if consumed < self.prefix.len() {
            return (self.prefix[consumed] == byte).then_some((consumed + 1, dfa_state));
        }
        Some((consumed, self.dfa.transition(dfa_state, byte)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_distance_limits() {
        let fuzzy = FuzzyAutomaton::new("search", 1, 0).unwrap();
        assert!(fuzzy.matches("search"));
        assert!(fuzzy.matches("serch"));
        assert!(fuzzy.matches("searchh"));
        assert!(!fuzzy.matches("sarch!"));
    }

    #[test]
    fn prefix_must_match_exactly() {
        let fuzzy = FuzzyAutomaton::new("search", 2, 2).unwrap();
        assert!(fuzzy.matches("seerch"));
        assert!(!fuzzy.matches("xearch"));
        assert!(fuzzy.matches("sear"));
    }

    #[test]
    fn rejects_large_distances() {
        assert!(FuzzyAutomaton::new("x", 3, 0).is_none());
    }
}
