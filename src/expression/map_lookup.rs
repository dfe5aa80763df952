use std::sync::Arc;
use crate::attribute::{ArrayViewType, AttributeContext, AttributeVector};
use crate::core::error::{Error, Result};
use crate::core::types::{BasicType, CollectionType, DocId, EnumHandle};
use crate::expression::attribute_node::{int_result, required_array_view};
use crate::expression::{AttributeEvaluator, GuardedAttribute, ResultHandler, ResultValue, find_attribute};
use crate::readview::{ArrayReadView, Stash};

/// Finds the position of the wanted key in a document's key array
trait KeyHandler {
    fn key_index(&mut self, doc: DocId) -> Option<usize>;
}

enum KeySource<'a, K> {
    /// `None` when the literal names no stored value; such a key never matches
    Literal(Option<K>),
    Attribute(&'a AttributeVector, fn(&AttributeVector, DocId) -> Option<K>),
}

struct KeyLookup<'s, 'a, T, K> {
    keys: &'s mut (dyn ArrayReadView<T> + 'a),
    source: KeySource<'a, K>,
    matches: fn(&T, &K) -> bool,
}

impl<T, K> KeyHandler for KeyLookup<'_, '_, T, K> {
    fn key_index(&mut self, doc: DocId) -> Option<usize> {
        let owned;
        let key = match &self.source {
            KeySource::Literal(key) => key.as_ref()?,
            KeySource::Attribute(attr, read) => {
                owned = read(attr, doc)?;
                &owned
            }
        };
        let matches = self.matches;
        self.keys.get_values(doc).iter().position(|k| matches(k, key))
    }
}

fn key_lookup<'a, 's, T: ArrayViewType<'a>, K: 'a>(
    input: &'a GuardedAttribute<'_>,
    stash: &'s Stash<'a>,
    source: KeySource<'a, K>,
    matches: fn(&T, &K) -> bool,
) -> Result<Box<dyn KeyHandler + 's>> {
    let keys = required_array_view::<T>(input, stash)?;
    Ok(Box::new(KeyLookup { keys, source, matches }))
}

struct ValueLookup<'s, 'a, T> {
    keys: Box<dyn KeyHandler + 's>,
    values: &'s mut (dyn ArrayReadView<T> + 'a),
    convert: fn(&T) -> ResultValue,
    undefined: ResultValue,
}

impl<T> ResultHandler for ValueLookup<'_, '_, T> {
    fn handle(&mut self, doc: DocId) -> ResultValue {
        self.keys
            .key_index(doc)
            .and_then(|idx| self.values.get_values(doc).get(idx).map(self.convert))
            .unwrap_or_else(|| self.undefined.clone())
    }
}

fn value_lookup<'a, 's, T: ArrayViewType<'a>>(
    keys: Box<dyn KeyHandler + 's>,
    input: &'a GuardedAttribute<'_>,
    stash: &'s Stash<'a>,
    convert: fn(&T) -> ResultValue,
    undefined: ResultValue,
) -> Result<Box<dyn ResultHandler + 's>> {
    let values = required_array_view::<T>(input, stash)?;
    Ok(Box::new(ValueLookup { keys, values, convert, undefined }))
}

fn int_eq<T: Copy + Into<i64>>(v: &T, key: &i64) -> bool {
    (*v).into() == *key
}

fn f32_eq(v: &f32, key: &f64) -> bool {
    *v == *key as f32
}

fn f64_eq(v: &f64, key: &f64) -> bool {
    *v == *key
}

fn str_eq(v: &&str, key: &String) -> bool {
    *v == key.as_str()
}

fn enum_eq(v: &EnumHandle, key: &EnumHandle) -> bool {
    v == key
}

fn read_int(attr: &AttributeVector, doc: DocId) -> Option<i64> {
    (attr.value_count(doc) > 0).then(|| attr.get_int(doc))
}

fn read_float(attr: &AttributeVector, doc: DocId) -> Option<f64> {
    (attr.value_count(doc) > 0).then(|| attr.get_float(doc))
}

fn read_string(attr: &AttributeVector, doc: DocId) -> Option<String> {
    Some(attr.get_string(doc)).filter(|s| !s.is_empty())
}

/// Integer key literal checked against the range of the key attribute's type
fn parse_int_key(bt: BasicType, key: &str) -> Option<i64> {
    let key = key.trim();
    match bt {
        BasicType::Bool => match key {
            "true" | "1" => Some(1),
            "false" | "0" => Some(0),
            _ => None,
        },
        BasicType::Int8 => key.parse::<i8>().ok().map(i64::from),
        BasicType::Int16 => key.parse::<i16>().ok().map(i64::from),
        BasicType::Int32 => key.parse::<i32>().ok().map(i64::from),
        BasicType::Int64 => key.parse::<i64>().ok(),
        _ => None,
    }
}

fn int_keys<'a, 's>(
    input: &'a GuardedAttribute<'_>,
    stash: &'s Stash<'a>,
    source: KeySource<'a, i64>,
) -> Result<Box<dyn KeyHandler + 's>> {
    match input.attr.basic_type() {
        BasicType::Bool => key_lookup::<bool, _>(input, stash, source, int_eq),
        BasicType::Int8 => key_lookup::<i8, _>(input, stash, source, int_eq),
        BasicType::Int16 => key_lookup::<i16, _>(input, stash, source, int_eq),
        BasicType::Int32 => key_lookup::<i32, _>(input, stash, source, int_eq),
        BasicType::Int64 => key_lookup::<i64, _>(input, stash, source, int_eq),
        bt => Err(Error::config(format!("{} is not an integer key type", bt))),
    }
}

fn float_keys<'a, 's>(
    input: &'a GuardedAttribute<'_>,
    stash: &'s Stash<'a>,
    source: KeySource<'a, f64>,
) -> Result<Box<dyn KeyHandler + 's>> {
    match input.attr.basic_type() {
        BasicType::Float => key_lookup::<f32, _>(input, stash, source, f32_eq),
        BasicType::Double => key_lookup::<f64, _>(input, stash, source, f64_eq),
        bt => Err(Error::config(format!("{} is not a float key type", bt))),
    }
}

/// Attributes a map lookup node reads, resolved by name
pub struct MapLookupAttributes {
    pub key: Arc<AttributeVector>,
    pub value: Arc<AttributeVector>,
    pub key_source: Option<Arc<AttributeVector>>,
}

/// [`MapLookupAttributes`] with a guard taken on each attribute
pub struct MapLookupGuards<'a> {
    pub key: GuardedAttribute<'a>,
    pub value: GuardedAttribute<'a>,
    pub key_source: Option<GuardedAttribute<'a>>,
}

impl MapLookupAttributes {
    pub fn guard(&self) -> MapLookupGuards<'_> {
        MapLookupGuards {
            key: GuardedAttribute::new(&self.key),
            value: GuardedAttribute::new(&self.value),
            key_source: self.key_source.as_deref().map(GuardedAttribute::new),
        }
    }
}

/// Looks up `map{key}` in a map field stored as a key array attribute and a value
/// array attribute of equal length per document.
///
/// The key is either a literal or, per document, the single value of a key source
/// attribute. The result is the value at the position of the first matching key, or
/// the value attribute's undefined value when no key matches.
#[derive(Debug, Clone)]
pub struct AttributeMapLookupNode {
    key_attribute: String,
    value_attribute: String,
    key: String,
    key_source_attribute: Option<String>,
    use_enum_optimization: bool,
}

impl AttributeMapLookupNode {
    pub fn new(key_attribute: impl Into<String>, value_attribute: impl Into<String>, key: impl Into<String>) -> Self {
        AttributeMapLookupNode {
            key_attribute: key_attribute.into(),
            value_attribute: value_attribute.into(),
            key: key.into(),
            key_source_attribute: None,
            use_enum_optimization: false,
        }
    }

    /// Node over the `<map>.key` and `<map>.value` attributes of a map field
    pub fn for_map(map: &str, key: impl Into<String>) -> Self {
        Self::new(format!("{}.key", map), format!("{}.value", map), key)
    }

    /// Takes the key from this single-value attribute instead of the literal
    pub fn with_key_source(mut self, attribute: impl Into<String>) -> Self {
        self.key_source_attribute = Some(attribute.into());
        self
    }

    pub fn with_enum_optimization(mut self, enabled: bool) -> Self {
        self.use_enum_optimization = enabled;
        self
    }

    pub fn wire(&self, ctx: &dyn AttributeContext) -> Result<MapLookupAttributes> {
        Ok(MapLookupAttributes {
            key: find_attribute(ctx, &self.key_attribute)?,
            value: find_attribute(ctx, &self.value_attribute)?,
            key_source: self
                .key_source_attribute
                .as_deref()
                .map(|name| find_attribute(ctx, name))
                .transpose()?,
        })
    }

    fn make_key_handler<'a, 's>(
        &self,
        keys: &'a GuardedAttribute<'_>,
        source: Option<&'a AttributeVector>,
        stash: &'s Stash<'a>,
    ) -> Result<Box<dyn KeyHandler + 's>> {
        let bt = keys.attr.basic_type();
        if let Some(source) = source {
            if source.is_multi_value() {
                return Err(Error::config(format!(
                    "key source attribute '{}' must be single-value",
                    source.name()
                )));
            }
            let sbt = source.basic_type();
            return match bt {
                _ if bt.is_integer() && sbt.is_integer() => {
                    int_keys(keys, stash, KeySource::Attribute(source, read_int))
                }
                _ if bt.is_floating_point() && sbt.is_floating_point() => {
                    float_keys(keys, stash, KeySource::Attribute(source, read_float))
                }
                BasicType::String if sbt == BasicType::String => {
                    key_lookup::<&str, _>(keys, stash, KeySource::Attribute(source, read_string), str_eq)
                }
                _ => Err(Error::config(format!(
                    "key source '{}' ({}) does not match key attribute '{}' ({})",
                    source.name(),
                    sbt,
                    keys.attr.name(),
                    bt
                ))),
            };
        }

        let malformed = || {
            Error::config(format!(
                "malformed key '{}' for {} key attribute '{}'",
                self.key,
                bt,
                keys.attr.name()
            ))
        };
        match bt {
            BasicType::String if self.use_enum_optimization => {
                let handle = keys.attr.find_enum(self.key.as_str());
                key_lookup::<EnumHandle, _>(keys, stash, KeySource::Literal(handle), enum_eq)
            }
            BasicType::String => {
                key_lookup::<&str, _>(keys, stash, KeySource::Literal(Some(self.key.clone())), str_eq)
            }
            _ if bt.is_integer() => {
                let key = parse_int_key(bt, &self.key).ok_or_else(malformed)?;
                int_keys(keys, stash, KeySource::Literal(Some(key)))
            }
            _ if bt.is_floating_point() => {
                let key: f64 = self.key.trim().parse().map_err(|_| malformed())?;
                float_keys(keys, stash, KeySource::Literal(Some(key)))
            }
            _ => Err(Error::config(format!(
                "{} attribute '{}' can not hold map keys",
                bt,
                keys.attr.name()
            ))),
        }
    }

    pub fn prepare<'a, 's>(
        &self,
        guards: &'a MapLookupGuards<'_>,
        stash: &'s Stash<'a>,
    ) -> Result<AttributeEvaluator<'s>> {
        for input in [&guards.key, &guards.value] {
            if input.attr.collection_type() != CollectionType::Array {
                return Err(Error::config(format!(
                    "map lookup needs array attributes, '{}' is {}",
                    input.attr.name(),
                    input.attr.config().type_string()
                )));
            }
        }
        let source = guards.key_source.as_ref().map(|g| g.attr);
        let keys = self.make_key_handler(&guards.key, source, stash)?;

        let values = &guards.value;
        let undefined_int = ResultValue::Int(values.attr.undefined_int());
        let handler = match values.attr.basic_type() {
            BasicType::Bool => value_lookup::<bool>(keys, values, stash, |v| ResultValue::Bool(*v), ResultValue::Bool(false))?,
            BasicType::Int8 => value_lookup::<i8>(keys, values, stash, int_result, undefined_int)?,
            BasicType::Int16 => value_lookup::<i16>(keys, values, stash, int_result, undefined_int)?,
            BasicType::Int32 => value_lookup::<i32>(keys, values, stash, int_result, undefined_int)?,
            BasicType::Int64 => value_lookup::<i64>(keys, values, stash, int_result, undefined_int)?,
            BasicType::Float => {
                value_lookup::<f32>(keys, values, stash, |v| ResultValue::Float(*v as f64), ResultValue::Float(f64::NAN))?
            }
            BasicType::Double => {
                value_lookup::<f64>(keys, values, stash, |v| ResultValue::Float(*v), ResultValue::Float(f64::NAN))?
            }
            BasicType::String if self.use_enum_optimization => {
                value_lookup::<EnumHandle>(keys, values, stash, |v| ResultValue::Enum(*v), ResultValue::Null)?
            }
            BasicType::String => value_lookup::<&str>(
                keys,
                values,
                stash,
                |v| ResultValue::String(v.to_string()),
                ResultValue::String(String::new()),
            )?,
            bt => {
                return Err(Error::config(format!(
                    "can not deduce result type for {} value attribute '{}'",
                    bt,
                    values.attr.name()
                )));
            }
        };
        Ok(AttributeEvaluator::new(handler, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeManager;
    use crate::core::config::Config;
    use crate::core::error::ErrorKind;
    use crate::core::types::Value;

    /// doc 0: {"a": 1, "b": 2}, doc 1: {"b": 20}, doc 2: {}
    fn map_manager() -> AttributeManager {
        let manager = AttributeManager::new();
        let keys = manager.add("m.key", Config::new(BasicType::String, CollectionType::Array)).unwrap();
        let values = manager.add("m.value", Config::new(BasicType::Int32, CollectionType::Array)).unwrap();
        let wanted = manager.add("wanted", Config::new(BasicType::String, CollectionType::Single)).unwrap();
        let ids = manager.add("ids.key", Config::new(BasicType::Int8, CollectionType::Array)).unwrap();
        for attr in [&keys, &values, &wanted, &ids] {
            attr.add_docs(3).unwrap();
        }
        keys.set_values(0, &[(Value::from("a"), 1), (Value::from("b"), 1)]).unwrap();
        values.set_values(0, &[(Value::from(1), 1), (Value::from(2), 1)]).unwrap();
        keys.set_values(1, &[(Value::from("b"), 1)]).unwrap();
        values.set_values(1, &[(Value::from(20), 1)]).unwrap();
        wanted.update(0, "b").unwrap();
        wanted.update(1, "a").unwrap();
        ids.set_values(0, &[(Value::from(7), 1), (Value::from(-3), 1)]).unwrap();
        manager.commit_all().unwrap();
        manager
    }

    fn lookup_all(manager: &AttributeManager, node: &AttributeMapLookupNode) -> Vec<ResultValue> {
        let attrs = node.wire(manager).unwrap();
        let guards = attrs.guard();
        let stash = Stash::new();
        let mut eval = node.prepare(&guards, &stash).unwrap();
        (0..3).map(|doc| eval.execute(doc)).collect()
    }

    #[test]
    fn literal_key() {
        let manager = map_manager();
        let results = lookup_all(&manager, &AttributeMapLookupNode::for_map("m", "b"));
        let undefined = ResultValue::Int(i32::MIN as i64);
        assert_eq!(results, vec![ResultValue::Int(2), ResultValue::Int(20), undefined]);
    }

    #[test]
    fn key_from_source_attribute() {
        let manager = map_manager();
        let node = AttributeMapLookupNode::for_map("m", "").with_key_source("wanted");
        let results = lookup_all(&manager, &node);
        assert_eq!(results[0], ResultValue::Int(2));
        assert_eq!(results[1], ResultValue::Int(i32::MIN as i64));
        assert_eq!(results[2], ResultValue::Int(i32::MIN as i64));
    }

    #[test]
    fn enum_optimized_key() {
        let manager = map_manager();
        let node = AttributeMapLookupNode::for_map("m", "a").with_enum_optimization(true);
        assert_eq!(lookup_all(&manager, &node)[0], ResultValue::Int(1));
        let absent = AttributeMapLookupNode::for_map("m", "zzz").with_enum_optimization(true);
        assert!(lookup_all(&manager, &absent).iter().all(|r| *r == ResultValue::Int(i32::MIN as i64)));
    }

    #[test]
    fn integer_keys_are_range_checked() {
        let manager = map_manager();
        let node = AttributeMapLookupNode::new("ids.key", "m.value", "-3");
        assert_eq!(lookup_all(&manager, &node)[0], ResultValue::Int(2));

        for bad in ["300", "seven"] {
            let node = AttributeMapLookupNode::new("ids.key", "m.value", bad);
            let attrs = node.wire(&manager).unwrap();
            let guards = attrs.guard();
            let stash = Stash::new();
            let err = node.prepare(&guards, &stash).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        }
    }

    #[test]
    fn mismatched_key_source_fails_at_prepare() {
        let manager = map_manager();
        let node = AttributeMapLookupNode::new("ids.key", "m.value", "").with_key_source("wanted");
        let attrs = node.wire(&manager).unwrap();
        let guards = attrs.guard();
        let stash = Stash::new();
        assert_eq!(node.prepare(&guards, &stash).err().unwrap().kind(), ErrorKind::InvalidConfig);

        let single_value = AttributeMapLookupNode::new("m.key", "wanted", "a");
        let attrs = single_value.wire(&manager).unwrap();
        let guards = attrs.guard();
        let stash = Stash::new();
        assert_eq!(single_value.prepare(&guards, &stash).err().unwrap().kind(), ErrorKind::InvalidConfig);
    }
}
