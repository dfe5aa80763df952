use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::{BasicType, CollectionType};

/// String matching mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Match {
    #[default]
    Uncased,
    Cased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DictionaryType {
    #[default]
    Btree,
    Hash,
    BtreeAndHash,
}

impl DictionaryType {
    pub fn has_btree(&self) -> bool {
        matches!(self, DictionaryType::Btree | DictionaryType::BtreeAndHash)
    }

    pub fn has_hash(&self) -> bool {
        matches!(self, DictionaryType::Hash | DictionaryType::BtreeAndHash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DictionaryConfig {
    #[serde(rename = "type")]
    pub dictionary_type: DictionaryType,
    #[serde(rename = "match")]
    pub match_mode: Match,
}

/// How per-document vectors and value buffers grow
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowStrategy {
    pub initial_docs: u32,
    pub growth_factor: f32,
    pub growth_delta: u32,
    pub buffer_elems: u32,       // elements per array store buffer
}

impl Default for GrowStrategy {
    fn default() -> Self {
        GrowStrategy {
            initial_docs: 1024,
            growth_factor: 0.5,
            growth_delta: 0,
            buffer_elems: 64 * 1024,
        }
    }
}

impl GrowStrategy {
    /// Capacity to grow to when `needed` slots do not fit in `current`
    pub fn next_capacity(&self, current: usize, needed: usize) -> usize {
        let grown = current + (current as f64 * self.growth_factor as f64) as usize + self.growth_delta as usize;
        grown.max(needed).max(self.initial_docs as usize).max(16)
    }
}

/// When compaction kicks in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactionStrategy {
    pub max_dead_bytes_ratio: f64,
    pub max_dead_address_space_ratio: f64,
}

impl Default for CompactionStrategy {
    fn default() -> Self {
        CompactionStrategy {
            max_dead_bytes_ratio: 0.2,
            max_dead_address_space_ratio: 0.2,
        }
    }
}

/// Per-attribute configuration, consumed at construction time only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic_type: BasicType,
    pub collection_type: CollectionType,
    pub fast_search: bool,
    pub enumerated: bool,
    pub is_filter: bool,
    pub paged: bool,                      // accepted and reported, storage stays in memory
    #[serde(rename = "match")]
    pub match_mode: Match,
    pub dictionary: DictionaryConfig,

    // weighted set update behaviour
    pub create_if_nonexistent: bool,
    pub remove_if_zero: bool,

    pub grow_strategy: GrowStrategy,
    pub compaction_strategy: CompactionStrategy,
    pub max_buffers: u32,                 // buffer ids per array store (address space)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            basic_type: BasicType::Int32,
            collection_type: CollectionType::Single,
            fast_search: false,
            enumerated: false,
            is_filter: false,
            paged: false,
            match_mode: Match::Uncased,
            dictionary: DictionaryConfig::default(),
            create_if_nonexistent: false,
            remove_if_zero: false,
            grow_strategy: GrowStrategy::default(),
            compaction_strategy: CompactionStrategy::default(),
            max_buffers: 1024,
        }
    }
}

impl Config {
    pub fn new(basic_type: BasicType, collection_type: CollectionType) -> Self {
        Config {
            basic_type,
            collection_type,
            ..Config::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_fast_search(mut self, fast_search: bool) -> Self {
        self.fast_search = fast_search;
        self
    }

    pub fn with_enumerated(mut self, enumerated: bool) -> Self {
        self.enumerated = enumerated;
        self
    }

    pub fn with_filter(mut self, is_filter: bool) -> Self {
        self.is_filter = is_filter;
        self
    }

    pub fn with_paged(mut self, paged: bool) -> Self {
        self.paged = paged;
        self
    }

    pub fn with_match(mut self, match_mode: Match) -> Self {
        self.match_mode = match_mode;
        self.dictionary.match_mode = match_mode;
        self
    }

    pub fn with_dictionary_type(mut self, dictionary_type: DictionaryType) -> Self {
        self.dictionary.dictionary_type = dictionary_type;
        self
    }

    pub fn with_weighted_set_flags(mut self, create_if_nonexistent: bool, remove_if_zero: bool) -> Self {
        self.create_if_nonexistent = create_if_nonexistent;
        self.remove_if_zero = remove_if_zero;
        self
    }

    pub fn with_grow_strategy(mut self, grow_strategy: GrowStrategy) -> Self {
        self.grow_strategy = grow_strategy;
        self
    }

    pub fn with_compaction_strategy(mut self, compaction_strategy: CompactionStrategy) -> Self {
        self.compaction_strategy = compaction_strategy;
        self
    }

    pub fn with_max_buffers(mut self, max_buffers: u32) -> Self {
        self.max_buffers = max_buffers;
        self
    }

    pub fn is_multi_value(&self) -> bool {
        self.collection_type.is_multi_value()
    }

    /// Strings are always dictionary encoded; numerics when asked to or when fast-search needs postings.
    pub fn is_enumerated(&self) -> bool {
        match self.basic_type {
            BasicType::String => true,
            BasicType::Raw | BasicType::Tensor => false,
            _ => self.enumerated || self.fast_search,
        }
    }

    pub fn is_cased(&self) -> bool {
        self.match_mode == Match::Cased
    }

    /// Type string as shown by the explorer, e.g. `array<string>`
    pub fn type_string(&self) -> String {
        match self.collection_type {
            CollectionType::Single => self.basic_type.as_str().to_string(),
            CollectionType::Array => format!("array<{}>", self.basic_type),
            CollectionType::WeightedSet => format!("weightedset<{}>", self.basic_type),
            CollectionType::Map => format!("map<{}>", self.basic_type),
        }
    }

    /// Rejects every (basic type, collection type, flag) combination the store can not serve.
    pub fn validate(&self) -> Result<()> {
        let bt = self.basic_type;
        let ct = self.collection_type;
        if bt == BasicType::Tensor {
            return Err(Error::config("tensor attributes are not supported by this store"));
        }
        if ct == CollectionType::Map {
            return Err(Error::config(format!(
                "map collection of {} must be modelled as key and value array attributes",
                bt
            )));
        }
        if bt == BasicType::Raw {
            if ct != CollectionType::Single {
                return Err(Error::config(format!("{} of raw is not supported", ct.as_str())));
            }
            if self.fast_search || self.enumerated {
                return Err(Error::config("raw attributes can not be enumerated or fast-search"));
            }
        }
        if bt == BasicType::Bool {
            if ct == CollectionType::WeightedSet {
                return Err(Error::config("weighted set of bool is not supported"));
            }
            if self.fast_search || self.enumerated {
                return Err(Error::config("bool attributes can not be enumerated or fast-search"));
            }
        }
        if (self.create_if_nonexistent || self.remove_if_zero) && ct != CollectionType::WeightedSet {
            return Err(Error::config("create_if_nonexistent/remove_if_zero require a weighted set"));
        }
        if self.max_buffers < 2 || self.max_buffers as usize > crate::datastore::entry_ref::MAX_BUFFERS {
            return Err(Error::config(format!(
                "max_buffers must be in [2, {}], got {}",
                crate::datastore::entry_ref::MAX_BUFFERS,
                self.max_buffers
            )));
        }
        if self.grow_strategy.buffer_elems < 16
            || self.grow_strategy.buffer_elems as usize > crate::datastore::entry_ref::MAX_BUFFER_ELEMS
        {
            return Err(Error::config(format!(
                "buffer_elems out of range: {}",
                self.grow_strategy.buffer_elems
            )));
        }
        Ok(())
    }
}
