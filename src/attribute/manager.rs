use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::attribute::vector::AttributeVector;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};

/// Name lookup used by expression nodes to find the attributes they read
pub trait AttributeContext {
    fn get_attribute(&self, name: &str) -> Option<Arc<AttributeVector>>;
}

/// Registry of the attributes of one document collection
#[derive(Default)]
pub struct AttributeManager {
    attributes: RwLock<HashMap<String, Arc<AttributeVector>>>,
}

impl AttributeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a new attribute
    pub fn add(&self, name: &str, config: Config) -> Result<Arc<AttributeVector>> {
        let mut attributes = self.attributes.write();
        if attributes.contains_key(name) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("attribute '{}' already exists", name),
            ));
        }
        let attr = Arc::new(AttributeVector::new(name, config)?);
        attributes.insert(name.to_string(), Arc::clone(&attr));
        log::debug!("registered attribute '{}'", name);
        Ok(attr)
    }

    /// Registers an attribute built elsewhere, e.g. by [`AttributeVector::load_file`]
    pub fn insert(&self, attr: AttributeVector) -> Arc<AttributeVector> {
        let attr = Arc::new(attr);
        if let Some(old) = self.attributes.write().insert(attr.name().to_string(), Arc::clone(&attr)) {
            log::debug!("replaced attribute '{}'", old.name());
        }
        attr
    }

    pub fn remove(&self, name: &str) -> Option<Arc<AttributeVector>> {
        self.attributes.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<AttributeVector>> {
        self.get_attribute(name)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("no attribute '{}'", name)))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attributes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Commits every attribute; stops at the first failure.
    pub fn commit_all(&self) -> Result<()> {
        let attributes: Vec<Arc<AttributeVector>> = self.attributes.read().values().cloned().collect();
        for attr in attributes {
            attr.commit()?;
        }
        Ok(())
    }
}

impl AttributeContext for AttributeManager {
    fn get_attribute(&self, name: &str) -> Option<Arc<AttributeVector>> {
        self.attributes.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BasicType, CollectionType};

    #[test]
    fn register_and_look_up() {
        let manager = AttributeManager::new();
        manager.add("year", Config::new(BasicType::Int16, CollectionType::Single)).unwrap();
        manager.add("tags", Config::new(BasicType::String, CollectionType::Array)).unwrap();
        assert_eq!(manager.names(), vec!["tags", "year"]);
        assert!(manager.get_attribute("year").is_some());
        assert_eq!(manager.get("missing").err().unwrap().kind(), ErrorKind::NotFound);
        let dup = manager.add("year", Config::new(BasicType::Int16, CollectionType::Single));
        assert_eq!(dup.err().unwrap().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn commit_all_publishes_every_attribute() {
        let manager = AttributeManager::new();
        let a = manager.add("a", Config::new(BasicType::Int32, CollectionType::Single)).unwrap();
        let b = manager.add("b", Config::new(BasicType::String, CollectionType::Single)).unwrap();
        a.add_doc().unwrap();
        b.add_doc().unwrap();
        manager.commit_all().unwrap();
        assert_eq!(a.committed_doc_id_limit(), 1);
        assert_eq!(b.committed_doc_id_limit(), 1);
        assert!(manager.remove("a").is_some());
        assert!(manager.get_attribute("a").is_none());
    }
}
