use std::sync::Arc;
use serde_json::{Value as Json, json};
use crate::attribute::vector::AttributeVector;
use crate::core::config::Config;
use crate::core::stats::{AddressSpace, MemoryUsage};

/// JSON snapshot of an attribute's internals for debugging and monitoring
pub struct AttributeVectorExplorer {
    attr: Arc<AttributeVector>,
}

fn memory_json(usage: &MemoryUsage) -> Json {
    json!({
        "allocated": usage.allocated_bytes,
        "used": usage.used_bytes,
        "dead": usage.dead_bytes,
        "onHold": usage.allocated_bytes_on_hold,
    })
}

fn address_space_json(space: &AddressSpace) -> Json {
    json!({
        "used": space.used,
        "dead": space.dead,
        "limit": space.limit,
        "usage": space.usage(),
    })
}

fn config_json(config: &Config, object: &mut serde_json::Map<String, Json>) {
    object.insert("type".into(), json!(config.type_string()));
    object.insert("fast_search".into(), json!(config.fast_search));
    object.insert("filter".into(), json!(config.is_filter));
    object.insert("paged".into(), json!(config.paged));
}

impl AttributeVectorExplorer {
    pub fn new(attr: Arc<AttributeVector>) -> Self {
        AttributeVectorExplorer { attr }
    }

    /// Short form carries config flags and allocated bytes; `full` adds status,
    /// generations, address space, enum store, multi-value mapping and change vector.
    pub fn get_state(&self, full: bool) -> Json {
        let attr = &self.attr;
        let status = attr.status();
        let mut object = serde_json::Map::new();
        if !full {
            config_json(attr.config(), &mut object);
            object.insert("allocated_bytes".into(), json!(status.memory.allocated_bytes));
            return Json::Object(object);
        }

        let mut config = serde_json::Map::new();
        config_json(attr.config(), &mut config);
        object.insert("config".into(), Json::Object(config));
        object.insert(
            "status".into(),
            json!({
                "numDocs": status.num_docs,
                "numValues": status.num_values,
                "numUniqueValues": status.num_unique_values,
                "memoryUsage": memory_json(&status.memory),
                "lastCommit": status.last_commit,
                "commits": status.commits,
                "compactions": status.compactions,
            }),
        );
        let handler = attr.generation_handler();
        object.insert(
            "generation".into(),
            json!({
                "oldest_used": handler.oldest_used_generation(),
                "current": handler.current_generation(),
            }),
        );

        let storage = attr.kind().storage();
        object.insert("addressSpaceUsage".into(), address_space_json(&storage.address_space()));
        if let Some(stats) = storage.enum_stats() {
            let dictionary_type = attr.config().dictionary.dictionary_type;
            let mut dictionary = serde_json::Map::new();
            if dictionary_type.has_btree() {
                dictionary.insert("btreeMemoryUsage".into(), json!(stats.btree_memory));
            }
            if dictionary_type.has_hash() {
                dictionary.insert("hashMemoryUsage".into(), json!(stats.hash_memory));
            }
            object.insert(
                "enumStore".into(),
                json!({
                    "numUniques": stats.num_uniques,
                    "valuesMemoryUsage": memory_json(&stats.values_memory),
                    "dictionaryMemoryUsage": stats.dictionary_memory,
                    "dictionary": Json::Object(dictionary),
                }),
            );
        }
        if let Some(stats) = storage.multi_value_stats() {
            object.insert(
                "multiValue".into(),
                json!({
                    "totalValueCnt": stats.total_values,
                    "memoryUsage": memory_json(&stats.memory),
                    "addressSpace": address_space_json(&stats.address_space),
                }),
            );
        }
        let (pending, bytes, rejected) = attr.pending_change_stats();
        object.insert(
            "changeVector".into(),
            json!({ "pending": pending, "used": bytes, "rejected": rejected }),
        );
        object.insert("committedDocIdLimit".into(), json!(attr.committed_doc_id_limit()));
        Json::Object(object)
    }
}
