use std::sync::Arc;
use crate::attribute::{ArrayViewType, AttributeContext, AttributeVector};
use crate::core::error::{Error, Result};
use crate::core::types::{BasicType, DocId, EnumHandle};
use crate::expression::{AttributeEvaluator, GuardedAttribute, ResultHandler, ResultValue, find_attribute};
use crate::readview::{ArrayReadView, Stash};

/// Whole array per document, converted element by element
struct ArrayHandler<'s, 'a, T> {
    view: &'s mut (dyn ArrayReadView<T> + 'a),
    convert: fn(&T) -> ResultValue,
}

impl<T> ResultHandler for ArrayHandler<'_, '_, T> {
    fn handle(&mut self, doc: DocId) -> ResultValue {
        ResultValue::Array(self.view.get_values(doc).iter().map(self.convert).collect())
    }
}

/// Array view of `T` over the attribute, or a config error naming the attribute
pub(crate) fn required_array_view<'a, 's, T: ArrayViewType<'a>>(
    input: &'a GuardedAttribute<'_>,
    stash: &'s Stash<'a>,
) -> Result<&'s mut (dyn ArrayReadView<T> + 'a)> {
    input.attr.make_array_read_view::<T>(&input.guard, stash).ok_or_else(|| {
        Error::config(format!(
            "'{}' ({}) has no array read view for the attribute node",
            input.attr.name(),
            input.attr.config().type_string()
        ))
    })
}

fn array_handler<'a, 's, T: ArrayViewType<'a>>(
    input: &'a GuardedAttribute<'_>,
    stash: &'s Stash<'a>,
    convert: fn(&T) -> ResultValue,
) -> Result<Box<dyn ResultHandler + 's>> {
    let view = required_array_view::<T>(input, stash)?;
    Ok(Box::new(ArrayHandler { view, convert }))
}

#[derive(Clone, Copy)]
enum SingleKind {
    Bool,
    Int,
    Float,
    String,
    Raw,
    Enum,
}

/// Single-value attributes go through the attribute's accessors
struct SingleHandler<'a> {
    attr: &'a AttributeVector,
    kind: SingleKind,
}

impl ResultHandler for SingleHandler<'_> {
    fn handle(&mut self, doc: DocId) -> ResultValue {
        match self.kind {
            SingleKind::Bool => ResultValue::Bool(self.attr.get_int(doc) != 0),
            SingleKind::Int => ResultValue::Int(self.attr.get_int(doc)),
            SingleKind::Float => ResultValue::Float(self.attr.get_float(doc)),
            SingleKind::String => ResultValue::String(self.attr.get_string(doc)),
            SingleKind::Raw => ResultValue::Raw(self.attr.get_raw(doc)),
            SingleKind::Enum => self.attr.get_enum(doc).map_or(ResultValue::Null, ResultValue::Enum),
        }
    }
}

pub(crate) fn int_result<T: Copy + Into<i64>>(v: &T) -> ResultValue {
    ResultValue::Int((*v).into())
}

/// Reads one attribute per document.
///
/// Multi-value attributes yield an array result, or a single element when the node is
/// used for index lookups. With enum optimization, string attributes yield enum handles
/// instead of strings.
#[derive(Debug, Clone)]
pub struct AttributeNode {
    name: String,
    use_enum_optimization: bool,
    use_current_index: bool,
}

impl AttributeNode {
    pub fn new(name: impl Into<String>) -> Self {
        AttributeNode {
            name: name.into(),
            use_enum_optimization: false,
            use_current_index: false,
        }
    }

    pub fn with_enum_optimization(mut self, enabled: bool) -> Self {
        self.use_enum_optimization = enabled;
        self
    }

    /// Pick one element of a multi-value attribute, see
    /// [`AttributeEvaluator::set_current_index`].
    pub fn with_current_index(mut self, enabled: bool) -> Self {
        self.use_current_index = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wire(&self, ctx: &dyn AttributeContext) -> Result<Arc<AttributeVector>> {
        find_attribute(ctx, &self.name)
    }

    pub fn prepare<'a, 's>(
        &self,
        input: &'a GuardedAttribute<'_>,
        stash: &'s Stash<'a>,
    ) -> Result<AttributeEvaluator<'s>> {
        let attr = input.attr;
        let bt = attr.basic_type();
        let use_enum = self.use_enum_optimization && bt == BasicType::String;
        if !attr.is_multi_value() {
            if self.use_current_index {
                return Err(Error::config(format!(
                    "index lookup on single-value attribute '{}'",
                    attr.name()
                )));
            }
            let kind = match bt {
                BasicType::Bool => SingleKind::Bool,
                BasicType::String if use_enum => SingleKind::Enum,
                BasicType::String => SingleKind::String,
                BasicType::Raw => SingleKind::Raw,
                bt if bt.is_integer() => SingleKind::Int,
                bt if bt.is_floating_point() => SingleKind::Float,
                _ => {
                    return Err(Error::config(format!(
                        "can not deduce result type for attribute vector '{}'",
                        attr.name()
                    )));
                }
            };
            return Ok(AttributeEvaluator::new(Box::new(SingleHandler { attr, kind }), false));
        }

        let handler = match bt {
            BasicType::Bool => array_handler::<bool>(input, stash, |v| ResultValue::Bool(*v))?,
            BasicType::Int8 => array_handler::<i8>(input, stash, int_result)?,
            BasicType::Int16 => array_handler::<i16>(input, stash, int_result)?,
            BasicType::Int32 => array_handler::<i32>(input, stash, int_result)?,
            BasicType::Int64 => array_handler::<i64>(input, stash, int_result)?,
            BasicType::Float => array_handler::<f32>(input, stash, |v| ResultValue::Float(*v as f64))?,
            BasicType::Double => array_handler::<f64>(input, stash, |v| ResultValue::Float(*v))?,
            BasicType::String if use_enum => array_handler::<EnumHandle>(input, stash, |v| ResultValue::Enum(*v))?,
            BasicType::String => array_handler::<&str>(input, stash, |v| ResultValue::String(v.to_string()))?,
            BasicType::Raw | BasicType::Tensor => {
                return Err(Error::config(format!(
                    "multi-value {} attribute '{}' is not supported by the attribute node",
                    bt,
                    attr.name()
                )));
            }
        };
        Ok(AttributeEvaluator::new(handler, self.use_current_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeManager;
    use crate::core::config::Config;
    use crate::core::error::ErrorKind;
    use crate::core::types::CollectionType;

    fn manager() -> AttributeManager {
        let manager = AttributeManager::new();
        let scores = manager.add("scores", Config::new(BasicType::Int16, CollectionType::Array)).unwrap();
        let title = manager.add("title", Config::new(BasicType::String, CollectionType::Single)).unwrap();
        let tags = manager.add("tags", Config::new(BasicType::String, CollectionType::WeightedSet)).unwrap();
        for attr in [&scores, &title, &tags] {
            attr.add_docs(2).unwrap();
        }
        scores.append(0, 5, 1).unwrap();
        scores.append(0, 9, 1).unwrap();
        title.update(0, "hello").unwrap();
        tags.append(1, "x", 10).unwrap();
        manager.commit_all().unwrap();
        manager
    }

    #[test]
    fn array_and_single_results() {
        let manager = manager();
        let node = AttributeNode::new("scores");
        let scores = node.wire(&manager).unwrap();
        let input = GuardedAttribute::new(&scores);
        let stash = Stash::new();
        let mut eval = node.prepare(&input, &stash).unwrap();
        assert_eq!(eval.execute(0), ResultValue::Array(vec![ResultValue::Int(5), ResultValue::Int(9)]));
        assert_eq!(eval.execute(1), ResultValue::Array(vec![]));

        let title = AttributeNode::new("title").wire(&manager).unwrap();
        let input = GuardedAttribute::new(&title);
        let stash = Stash::new();
        let mut eval = AttributeNode::new("title").prepare(&input, &stash).unwrap();
        assert_eq!(eval.execute(0), ResultValue::String("hello".into()));
        assert_eq!(eval.execute(1), ResultValue::String(String::new()));
    }

    #[test]
    fn index_lookup_past_the_end_is_null() {
        let manager = manager();
        let node = AttributeNode::new("scores").with_current_index(true);
        let scores = node.wire(&manager).unwrap();
        let input = GuardedAttribute::new(&scores);
        let stash = Stash::new();
        let mut eval = node.prepare(&input, &stash).unwrap();
        eval.set_current_index(1);
        assert_eq!(eval.execute(0), ResultValue::Int(9));
        eval.set_current_index(2);
        assert_eq!(eval.execute(0), ResultValue::Null);
        assert_eq!(eval.execute(1), ResultValue::Null);
    }

    #[test]
    fn enum_optimization_yields_handles() {
        let manager = manager();
        let node = AttributeNode::new("tags").with_enum_optimization(true);
        let tags = node.wire(&manager).unwrap();
        let input = GuardedAttribute::new(&tags);
        let stash = Stash::new();
        let mut eval = node.prepare(&input, &stash).unwrap();
        let handle = tags.find_enum("x").unwrap();
        assert_eq!(eval.execute(1), ResultValue::Array(vec![ResultValue::Enum(handle)]));
    }

    #[test]
    fn wiring_and_prepare_errors() {
        let manager = manager();
        let err = AttributeNode::new("nope").wire(&manager).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let title = manager.get("title").unwrap();
        let input = GuardedAttribute::new(&title);
        let stash = Stash::new();
        let err = AttributeNode::new("title").with_current_index(true).prepare(&input, &stash).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }
}
