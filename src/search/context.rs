use std::collections::HashSet;
use roaring::RoaringBitmap;
use crate::core::types::DocId;
use crate::enumstore::{EnumIndex, NumericType};
use crate::readview::ValueSource;
use crate::search::query_term::NumericRange;

/// Evaluates one query term against the documents of one attribute.
///
/// A context is bound to the generation guard it was created under and sees the
/// documents committed at that time.
pub trait SearchContext {
    /// False when the term could not be interpreted for this attribute; nothing matches
    fn valid(&self) -> bool;

    /// Match weight of `doc`, or `None` when it does not match.
    ///
    /// Single-value attributes report 1, arrays the number of matching elements and
    /// weighted sets the weight of the first matching element.
    fn matches(&self, doc: DocId) -> Option<i32>;

    /// Upper estimate of the number of hits
    fn approximate_hits(&self) -> u32;

    /// Materializes the posting lists of matching dictionary entries, when available
    fn fetch_postings(&mut self);

    /// Iterator over candidate documents in increasing order. Without fetched postings
    /// this scans every committed document.
    fn create_iterator(&self) -> Box<dyn PostingIterator + '_>;

    fn doc_id_limit(&self) -> DocId;
}

/// Document iterator with forward skipping
pub trait PostingIterator: Iterator<Item = DocId> {
    /// First document at or after `target`
    fn seek(&mut self, target: DocId) -> Option<DocId>;
}

/// Decides whether one stored value matches
pub trait TermMatcher<X> {
    fn is_match(&self, value: X) -> bool;
}

impl<T: NumericType> TermMatcher<T> for NumericRange<T> {
    fn is_match(&self, value: T) -> bool {
        NumericRange::is_match(self, value)
    }
}

/// Enum indices whose values matched the term in the dictionary
pub struct EnumSet {
    indices: HashSet<EnumIndex>,
}

impl EnumSet {
    pub fn new(indices: impl IntoIterator<Item = EnumIndex>) -> Self {
        EnumSet { indices: indices.into_iter().collect() }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl TermMatcher<EnumIndex> for EnumSet {
    fn is_match(&self, value: EnumIndex) -> bool {
        self.indices.contains(&value)
    }
}

/// Matches nothing; used for terms that do not apply to the attribute
pub struct NeverMatch;

impl<X> TermMatcher<X> for NeverMatch {
    fn is_match(&self, _value: X) -> bool {
        false
    }
}

/// Search context over any value source.
///
/// `hint` carries the posting lists of the matching dictionary entries for fast-search
/// attributes; [`fetch_postings`](SearchContext::fetch_postings) unions them.
pub struct AttributeSearchContext<'g, S, M> {
    source: S,
    matcher: M,
    valid: bool,
    hint: Option<Vec<&'g RoaringBitmap>>,
    postings: Option<RoaringBitmap>,
}

impl<'g, S: ValueSource, M: TermMatcher<S::Value>> AttributeSearchContext<'g, S, M> {
    pub fn new(source: S, matcher: M, hint: Option<Vec<&'g RoaringBitmap>>) -> Self {
        AttributeSearchContext { source, matcher, valid: true, hint, postings: None }
    }

    pub fn invalid(source: S, matcher: M) -> Self {
        AttributeSearchContext { source, matcher, valid: false, hint: None, postings: None }
    }
}

impl<S: ValueSource, M: TermMatcher<S::Value>> SearchContext for AttributeSearchContext<'_, S, M> {
    fn valid(&self) -> bool {
        self.valid
    }

    fn matches(&self, doc: DocId) -> Option<i32> {
        if !self.valid {
            return None;
        }
        let weighted = self.source.is_weighted();
        let mut result: Option<i32> = None;
        self.source.for_each(doc, |value, weight| {
            if !self.matcher.is_match(value) {
                return;
            }
            result = match result {
                None => Some(weight),
                Some(first) if weighted => Some(first),
                Some(count) => Some(count + 1),
            };
        });
        result
    }

    fn approximate_hits(&self) -> u32 {
        if !self.valid {
            return 0;
        }
        let limit = self.source.doc_id_limit();
        match (&self.postings, &self.hint) {
            (Some(postings), _) => postings.len().min(limit as u64) as u32,
            (None, Some(hint)) => hint.iter().map(|b| b.len()).sum::<u64>().min(limit as u64) as u32,
            (None, None) => limit,
        }
    }

    fn fetch_postings(&mut self) {
        if self.postings.is_some() {
            return;
        }
        if let Some(hint) = &self.hint {
            let mut union = RoaringBitmap::new();
            for bitmap in hint {
                union |= *bitmap;
            }
            union.remove_range(self.source.doc_id_limit()..);
            self.postings = Some(union);
        }
    }

    fn create_iterator(&self) -> Box<dyn PostingIterator + '_> {
        if !self.valid {
            return Box::new(std::iter::empty::<DocId>().into_posting_iterator());
        }
        match &self.postings {
            Some(postings) => Box::new(BitmapIterator::new(postings)),
            None => Box::new(ScanIterator {
                ctx: self,
                next: 0,
                limit: self.source.doc_id_limit(),
            }),
        }
    }

    fn doc_id_limit(&self) -> DocId {
        self.source.doc_id_limit()
    }
}

/// Iterates a materialized posting list
pub struct BitmapIterator<'a> {
    iter: roaring::bitmap::Iter<'a>,
}

impl<'a> BitmapIterator<'a> {
    pub fn new(bitmap: &'a RoaringBitmap) -> Self {
        BitmapIterator { iter: bitmap.iter() }
    }
}

impl Iterator for BitmapIterator<'_> {
    type Item = DocId;

    fn next(&mut self) -> Option<DocId> {
        self.iter.next()
    }
}

impl PostingIterator for BitmapIterator<'_> {
    fn seek(&mut self, target: DocId) -> Option<DocId> {
        self.iter.by_ref().find(|doc| *doc >= target)
    }
}

/// Tests every committed document in order
pub struct ScanIterator<'a, C: ?Sized> {
    ctx: &'a C,
    next: DocId,
    limit: DocId,
}

impl<C: SearchContext + ?Sized> Iterator for ScanIterator<'_, C> {
    type Item = DocId;

    fn next(&mut self) -> Option<DocId> {
        while self.next < self.limit {
            let doc = self.next;
            self.next += 1;
            if self.ctx.matches(doc).is_some() {
                return Some(doc);
            }
        }
        None
    }
}

impl<C: SearchContext + ?Sized> PostingIterator for ScanIterator<'_, C> {
    fn seek(&mut self, target: DocId) -> Option<DocId> {
        self.next = self.next.max(target);
        self.next()
    }
}

/// Adapter for plain iterators that are already sorted
pub struct SortedIter<I>(I);

pub trait IntoPostingIterator: Iterator<Item = DocId> + Sized {
    fn into_posting_iterator(self) -> SortedIter<Self> {
        SortedIter(self)
    }
}

impl<I: Iterator<Item = DocId>> IntoPostingIterator for I {}

impl<I: Iterator<Item = DocId>> Iterator for SortedIter<I> {
    type Item = DocId;

    fn next(&mut self) -> Option<DocId> {
        self.0.next()
    }
}

impl<I: Iterator<Item = DocId>> PostingIterator for SortedIter<I> {
    fn seek(&mut self, target: DocId) -> Option<DocId> {
        self.0.by_ref().find(|doc| *doc >= target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GrowStrategy;
    use crate::core::types::WeightedValue;
    use crate::datastore::RcuVector;
    use crate::generation::GenerationHandler;
    use crate::multivalue::MultiValueMapping;
    use crate::readview::{MultiSource, SingleDirectSource};

    #[test]
    fn weights_follow_collection_type() {
        let handler = GenerationHandler::new();
        let array = MultiValueMapping::<i32>::new(GrowStrategy::default(), 16);
        let wset = MultiValueMapping::<WeightedValue<i32>>::new(GrowStrategy::default(), 16);
        array.add_doc();
        wset.add_doc();
        array.replace(0, &[5, 7, 5]).unwrap();
        wset.replace(0, &[WeightedValue::new(5, 40), WeightedValue::new(6, 60)]).unwrap();
        let guard = handler.take_guard();

        let range = NumericRange::<i32>::parse("[5;6]").unwrap();
        let ctx = AttributeSearchContext::new(MultiSource::new(array.make_read_view(&guard, 1)), range, None);
        assert_eq!(ctx.matches(0), Some(2));
        let ctx = AttributeSearchContext::new(MultiSource::new(wset.make_read_view(&guard, 1)), range, None);
        assert_eq!(ctx.matches(0), Some(40));
    }

    #[test]
    fn scan_iterator_visits_matches_in_order() {
        let handler = GenerationHandler::new();
        let values = RcuVector::new(GrowStrategy::default(), i64::undefined());
        values.ensure_size(6);
        for (doc, v) in [(0, 3), (1, 10), (3, 10), (5, 10)] {
            values.set(doc, v);
        }
        let guard = handler.take_guard();
        let source = SingleDirectSource::<i64>::new(values.acquire_slots(&guard), 5);
        let ctx = AttributeSearchContext::new(source, NumericRange::parse("10").unwrap(), None);
        assert_eq!(ctx.create_iterator().collect::<Vec<_>>(), vec![1, 3]);
        let mut it = ctx.create_iterator();
        assert_eq!(it.seek(2), Some(3));
        assert_eq!(it.next(), None);
        assert_eq!(ctx.approximate_hits(), 5);
    }

    #[test]
    fn fetched_postings_are_cut_at_the_limit() {
        let handler = GenerationHandler::new();
        let values = RcuVector::new(GrowStrategy::default(), 0i32);
        values.ensure_size(4);
        let guard = handler.take_guard();
        let a: RoaringBitmap = [0u32, 2].into_iter().collect();
        let b: RoaringBitmap = [3u32, 9].into_iter().collect();
        let source = SingleDirectSource::<i32>::new(values.acquire_slots(&guard), 4);
        let mut ctx = AttributeSearchContext::new(source, NumericRange::parse("0").unwrap(), Some(vec![&a, &b]));
        assert_eq!(ctx.approximate_hits(), 4);
        ctx.fetch_postings();
        assert_eq!(ctx.create_iterator().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(ctx.approximate_hits(), 3);
    }

    #[test]
    fn invalid_context_matches_nothing() {
        let handler = GenerationHandler::new();
        let values = RcuVector::new(GrowStrategy::default(), 1i32);
        values.ensure_size(2);
        let guard = handler.take_guard();
        let source = SingleDirectSource::<i32>::new(values.acquire_slots(&guard), 2);
        let ctx = AttributeSearchContext::invalid(source, NeverMatch);
        assert!(!ctx.valid());
        assert_eq!(ctx.matches(0), None);
        assert_eq!(ctx.create_iterator().count(), 0);
    }
}
