use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::Range;
use std::sync::Arc;
use fst::{Automaton, IntoStreamer, Map, MapBuilder, Streamer};
use roaring::RoaringBitmap;
use crate::core::config::DictionaryType;
use crate::core::error::Result;
use crate::datastore::EntryRef;

/// Handle of one unique value in an enum store
pub type EnumIndex = EntryRef;

/// Writer-side dictionary: value key -> enum index
pub struct WriterDictionary<K> {
    btree: Option<BTreeMap<K, EnumIndex>>,
    hash: Option<HashMap<K, EnumIndex>>,
}

impl<K: Ord + Hash + Clone> WriterDictionary<K> {
    pub fn new(dictionary_type: DictionaryType) -> Self {
        WriterDictionary {
            btree: dictionary_type.has_btree().then(BTreeMap::new),
            hash: dictionary_type.has_hash().then(HashMap::new),
        }
    }

    pub fn find(&self, key: &K) -> Option<EnumIndex> {
        if let Some(hash) = &self.hash {
            return hash.get(key).copied();
        }
        self.btree.as_ref().and_then(|btree| btree.get(key).copied())
    }

    pub fn insert(&mut self, key: K, idx: EnumIndex) {
        if let Some(hash) = &mut self.hash {
            hash.insert(key.clone(), idx);
        }
        if let Some(btree) = &mut self.btree {
            btree.insert(key, idx);
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<EnumIndex> {
        let from_hash = self.hash.as_mut().and_then(|hash| hash.remove(key));
        let from_btree = self.btree.as_mut().and_then(|btree| btree.remove(key));
        from_btree.or(from_hash)
    }

    pub fn len(&self) -> usize {
        match (&self.btree, &self.hash) {
            (Some(btree), _) => btree.len(),
            (None, Some(hash)) => hash.len(),
            (None, None) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in key order
    pub fn sorted_entries(&self) -> Vec<(K, EnumIndex)> {
        if let Some(btree) = &self.btree {
            return btree.iter().map(|(k, v)| (k.clone(), *v)).collect();
        }
        let mut entries: Vec<(K, EnumIndex)> = self
            .hash
            .iter()
            .flat_map(|hash| hash.iter().map(|(k, v)| (k.clone(), *v)))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Rough heap footprint of (btree, hash)
    pub fn memory_usage(&self, key_heap: impl Fn(&K) -> usize) -> (usize, usize) {
        let entry = std::mem::size_of::<K>() + std::mem::size_of::<EnumIndex>();
        let btree = self
            .btree
            .as_ref()
            .map(|b| b.keys().map(&key_heap).sum::<usize>() + b.len() * (entry + 16))
            .unwrap_or(0);
        let hash = self
            .hash
            .as_ref()
            .map(|h| h.keys().map(&key_heap).sum::<usize>() + h.capacity() * (entry + 8))
            .unwrap_or(0);
        (btree, hash)
    }
}

/// Immutable, sorted snapshot of the dictionary published to readers on commit
pub struct FrozenDictionary<K> {
    keys: Vec<K>,
    indices: Vec<EnumIndex>,
    postings: Vec<Option<Arc<RoaringBitmap>>>,
    hash: Option<HashMap<K, u32>>,
    fst: Option<Map<Vec<u8>>>,
}

impl<K: Ord + Hash + Clone> FrozenDictionary<K> {
    pub fn empty() -> Self {
        FrozenDictionary {
            keys: Vec::new(),
            indices: Vec::new(),
            postings: Vec::new(),
            hash: None,
            fst: None,
        }
    }

    /// `entries` must be sorted by key and free of duplicates.
    pub fn build(
        entries: Vec<(K, EnumIndex)>,
        mut postings_of: impl FnMut(EnumIndex) -> Option<Arc<RoaringBitmap>>,
        with_hash: bool,
        key_bytes: impl Fn(&K) -> Option<&[u8]>,
    ) -> Result<Self> {
        let mut keys = Vec::with_capacity(entries.len());
        let mut indices = Vec::with_capacity(entries.len());
        let mut postings = Vec::with_capacity(entries.len());
        for (key, idx) in entries {
            postings.push(postings_of(idx));
            keys.push(key);
            indices.push(idx);
        }
        let hash = with_hash.then(|| {
            keys.iter()
                .enumerate()
                .map(|(ordinal, key)| (key.clone(), ordinal as u32))
                .collect()
        });
        let fst = match keys.first().and_then(&key_bytes) {
            Some(_) => {
                let mut builder = MapBuilder::memory();
                for (ordinal, key) in keys.iter().enumerate() {
                    if let Some(bytes) = key_bytes(key) {
                        builder.insert(bytes, ordinal as u64)?;
                    }
                }
                Some(builder.into_map())
            }
            None => None,
        };
        Ok(FrozenDictionary { keys, indices, postings, hash, fst })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Ordinal of `key`
    pub fn find(&self, key: &K) -> Option<usize> {
        if let Some(hash) = &self.hash {
            return hash.get(key).map(|ordinal| *ordinal as usize);
        }
        self.keys.binary_search(key).ok()
    }

    /// First ordinal whose key is not less than `key`
    pub fn lower_bound(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    /// First ordinal whose key is greater than `key`
    pub fn upper_bound(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    pub fn key(&self, ordinal: usize) -> &K {
        &self.keys[ordinal]
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn index(&self, ordinal: usize) -> EnumIndex {
        self.indices[ordinal]
    }

    pub fn indices(&self) -> &[EnumIndex] {
        &self.indices
    }

    pub fn postings(&self, ordinal: usize) -> Option<&RoaringBitmap> {
        self.postings.get(ordinal).and_then(|p| p.as_deref())
    }

    pub fn has_postings(&self) -> bool {
        self.postings.iter().any(Option::is_some)
    }

    /// Ordinals accepted by an automaton over the fst index, in key order
    pub fn search_automaton<A: Automaton>(&self, automaton: A) -> Option<Vec<usize>> {
        let fst = self.fst.as_ref()?;
        let mut stream = fst.search(automaton).into_stream();
        let mut ordinals = Vec::new();
        while let Some((_, ordinal)) = stream.next() {
            ordinals.push(ordinal as usize);
        }
        Some(ordinals)
    }

    pub fn memory_usage(&self, key_heap: impl Fn(&K) -> usize) -> usize {
        let per_entry = std::mem::size_of::<K>()
            + std::mem::size_of::<EnumIndex>()
            + std::mem::size_of::<Option<Arc<RoaringBitmap>>>();
        self.keys.iter().map(key_heap).sum::<usize>()
            + self.keys.len() * per_entry
            + self.hash.as_ref().map(|h| h.capacity() * (std::mem::size_of::<K>() + 8)).unwrap_or(0)
            + self.fst.as_ref().map(|f| f.as_fst().size()).unwrap_or(0)
    }
}

impl FrozenDictionary<String> {
    /// Ordinals of keys starting with `prefix`
    pub fn prefix_range(&self, prefix: &str) -> Range<usize> {
        let start = self.keys.partition_point(|k| k.as_str() < prefix);
        let end = start + self.keys[start..].iter().take_while(|k| k.starts_with(prefix)).count();
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fst::automaton::Str;

    fn idx(n: u32) -> EnumIndex {
        EntryRef::new(0, n, 1)
    }

    #[test]
    fn writer_dictionary_variants_agree() {
        for dt in [DictionaryType::Btree, DictionaryType::Hash, DictionaryType::BtreeAndHash] {
            let mut dict = WriterDictionary::new(dt);
            dict.insert("b".to_string(), idx(2));
            dict.insert("a".to_string(), idx(1));
            dict.insert("c".to_string(), idx(3));
            assert_eq!(dict.find(&"a".to_string()), Some(idx(1)));
            assert_eq!(dict.remove(&"c".to_string()), Some(idx(3)));
            assert_eq!(dict.len(), 2);
            let keys: Vec<String> = dict.sorted_entries().into_iter().map(|(k, _)| k).collect();
            assert_eq!(keys, vec!["a", "b"]);
        }
    }

    #[test]
    fn frozen_dictionary_lookups() {
        let entries = vec![
            ("apple".to_string(), idx(1)),
            ("apricot".to_string(), idx(2)),
            ("banana".to_string(), idx(3)),
        ];
        let frozen = FrozenDictionary::build(entries, |_| None, false, |k: &String| Some(k.as_bytes())).unwrap();
        assert_eq!(frozen.find(&"banana".to_string()), Some(2));
        assert_eq!(frozen.find(&"cherry".to_string()), None);
        assert_eq!(frozen.prefix_range("ap"), 0..2);
        assert_eq!(frozen.prefix_range("zz"), 3..3);
        assert_eq!(frozen.lower_bound(&"b".to_string()), 2);
        assert_eq!(frozen.upper_bound(&"apricot".to_string()), 2);
        assert_eq!(frozen.search_automaton(Str::new("apple")), Some(vec![0]));
        assert_eq!(frozen.index(1), idx(2));
    }
}
