use std::cmp::Ordering;
use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::enumstore::NumericType;
use crate::readview::ValueSource;
use crate::sort::converter::BlobConverter;
use crate::sort::missing::MissingPolicy;

/// Writes byte-comparable sort keys.
///
/// Comparing two written keys with memcmp orders the documents as requested, including
/// the direction and the placement of documents without values.
pub trait SortBlobWriter {
    /// Writes the key of `doc` to the front of `buf` and returns its length, or `None`
    /// when `buf` is too small. Each call is independent of the previous one.
    fn write(&mut self, doc: DocId, buf: &mut [u8]) -> Option<usize>;
}

/// Byte layout for documents without a value
#[derive(Debug, Clone)]
enum MissingLayout<K> {
    /// Written as if the document held this value
    Substitute(K),
    /// One marker byte ahead of every key
    Prefixed { missing: u8, present: u8 },
}

impl<K> MissingLayout<K> {
    fn from_policy(policy: &MissingPolicy, substitute: impl FnOnce(Option<&str>) -> Result<K>) -> Result<Self> {
        Ok(match policy {
            MissingPolicy::Default => MissingLayout::Substitute(substitute(None)?),
            MissingPolicy::As(literal) => MissingLayout::Substitute(substitute(Some(literal))?),
            MissingPolicy::First => MissingLayout::Prefixed { missing: 0x00, present: 0x01 },
            MissingPolicy::Last => MissingLayout::Prefixed { missing: 0x01, present: 0x00 },
        })
    }
}

fn invert(bytes: &mut [u8]) {
    for b in bytes {
        *b = !*b;
    }
}

/// Sort keys for numeric attributes. Multi-value documents sort by their smallest value
/// ascending and their largest descending.
pub struct NumericSortBlobWriter<S: ValueSource> {
    source: S,
    ascending: bool,
    missing: MissingLayout<S::Value>,
}

impl<S> NumericSortBlobWriter<S>
where
    S: ValueSource,
    S::Value: NumericType,
{
    pub fn new(source: S, ascending: bool, policy: &MissingPolicy) -> Result<Self> {
        let missing = MissingLayout::from_policy(policy, |literal| match literal {
            None => Ok(<S::Value as NumericType>::from_i64(0)),
            Some(text) => <S::Value as NumericType>::parse(text)
                .filter(|v| !v.is_undefined())
                .ok_or_else(|| {
                    Error::config(format!(
                        "missing value '{}' is not a valid {}",
                        text,
                        <S::Value as NumericType>::BASIC_TYPE
                    ))
                }),
        })?;
        Ok(NumericSortBlobWriter { source, ascending, missing })
    }
}

impl<S> SortBlobWriter for NumericSortBlobWriter<S>
where
    S: ValueSource,
    S::Value: NumericType,
{
    fn write(&mut self, doc: DocId, buf: &mut [u8]) -> Option<usize> {
        let ascending = self.ascending;
        let mut best: Option<S::Value> = None;
        self.source.for_each(doc, |value, _| {
            if value.is_undefined() {
                return;
            }
            best = Some(match best {
                None => value,
                Some(current) => {
                    let better = if ascending { Ordering::Less } else { Ordering::Greater };
                    if value.partial_cmp(&current) == Some(better) { value } else { current }
                }
            });
        });
        let (prefix, value) = match (&self.missing, best) {
            (MissingLayout::Prefixed { present, .. }, Some(value)) => (Some(*present), value),
            (MissingLayout::Prefixed { missing, .. }, None) => {
                *buf.first_mut()? = *missing;
                return Some(1);
            }
            (MissingLayout::Substitute(_), Some(value)) => (None, value),
            (MissingLayout::Substitute(substitute), None) => (None, *substitute),
        };
        let offset = prefix.is_some() as usize;
        let len = offset + <S::Value as NumericType>::SORT_KEY_LEN;
        if buf.len() < len {
            return None;
        }
        if let Some(marker) = prefix {
            buf[0] = marker;
        }
        value.write_sort_key(&mut buf[offset..len]);
        if !ascending {
            invert(&mut buf[offset..len]);
        }
        Some(len)
    }
}

/// Sort keys for string attributes: the (converted) bytes followed by a zero terminator,
/// so that a string sorts before its extensions.
pub struct StringSortBlobWriter<'c, S: ValueSource> {
    source: S,
    ascending: bool,
    missing: MissingLayout<Vec<u8>>,
    converter: Option<&'c dyn BlobConverter>,
    best: Vec<u8>,
    scratch: Vec<u8>,
}

fn convert_into(converter: Option<&dyn BlobConverter>, input: &str, out: &mut Vec<u8>) {
    out.clear();
    match converter {
        Some(converter) => converter.convert(input, out),
        None => out.extend_from_slice(input.as_bytes()),
    }
}

impl<'c, S> StringSortBlobWriter<'c, S>
where
    S: ValueSource,
    S::Value: AsRef<str>,
{
    pub fn new(
        source: S,
        ascending: bool,
        policy: &MissingPolicy,
        converter: Option<&'c dyn BlobConverter>,
    ) -> Result<Self> {
        let missing = MissingLayout::from_policy(policy, |literal| {
            let mut bytes = Vec::new();
            convert_into(converter, literal.unwrap_or(""), &mut bytes);
            Ok(bytes)
        })?;
        Ok(StringSortBlobWriter {
            source,
            ascending,
            missing,
            converter,
            best: Vec::new(),
            scratch: Vec::new(),
        })
    }
}

impl<S> SortBlobWriter for StringSortBlobWriter<'_, S>
where
    S: ValueSource,
    S::Value: AsRef<str>,
{
    fn write(&mut self, doc: DocId, buf: &mut [u8]) -> Option<usize> {
        let ascending = self.ascending;
        let converter = self.converter;
        let best = &mut self.best;
        let scratch = &mut self.scratch;
        let mut found = false;
        self.source.for_each(doc, |value, _| {
            convert_into(converter, value.as_ref(), scratch);
            let better = if ascending { Ordering::Less } else { Ordering::Greater };
            if !found || scratch.as_slice().cmp(best.as_slice()) == better {
                std::mem::swap(best, scratch);
                found = true;
            }
        });
        let (prefix, key): (Option<u8>, &[u8]) = match (&self.missing, found) {
            (MissingLayout::Prefixed { present, .. }, true) => (Some(*present), self.best.as_slice()),
            (MissingLayout::Prefixed { missing, .. }, false) => {
                *buf.first_mut()? = *missing;
                return Some(1);
            }
            (MissingLayout::Substitute(_), true) => (None, self.best.as_slice()),
            (MissingLayout::Substitute(substitute), false) => (None, substitute.as_slice()),
        };
        let offset = prefix.is_some() as usize;
        let len = offset + key.len() + 1;
        if buf.len() < len {
            return None;
        }
        if let Some(marker) = prefix {
            buf[0] = marker;
        }
        buf[offset..len - 1].copy_from_slice(key);
        buf[len - 1] = 0;
        if !ascending {
            invert(&mut buf[offset..len]);
        }
        Some(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::converter::LowercaseConverter;

    /// In-memory source: one value list per document
    struct ListSource<T: Copy>(Vec<Vec<T>>);

    impl<T: Copy> ValueSource for ListSource<T> {
        type Value = T;

        fn doc_id_limit(&self) -> DocId {
            self.0.len() as DocId
        }

        fn is_multi_value(&self) -> bool {
            true
        }

        fn for_each<F: FnMut(T, i32)>(&self, doc: DocId, mut f: F) {
            for v in self.0.get(doc as usize).into_iter().flatten() {
                f(*v, 1);
            }
        }
    }

    fn key(writer: &mut dyn SortBlobWriter, doc: DocId) -> Vec<u8> {
        let mut buf = [0u8; 64];
        let len = writer.write(doc, &mut buf).unwrap();
        buf[..len].to_vec()
    }

    #[test]
    fn numeric_keys_order_both_directions() {
        let source = ListSource(vec![vec![-3i32], vec![10], vec![4]]);
        let mut asc = NumericSortBlobWriter::new(source, true, &MissingPolicy::Default).unwrap();
        assert!(key(&mut asc, 0) < key(&mut asc, 2));
        assert!(key(&mut asc, 2) < key(&mut asc, 1));

        let source = ListSource(vec![vec![-3i32], vec![10], vec![4]]);
        let mut desc = NumericSortBlobWriter::new(source, false, &MissingPolicy::Default).unwrap();
        assert!(key(&mut desc, 1) < key(&mut desc, 2));
        assert!(key(&mut desc, 2) < key(&mut desc, 0));
    }

    #[test]
    fn multi_value_uses_min_ascending_and_max_descending() {
        let values = vec![vec![5i64, 1, 9], vec![3]];
        let mut asc = NumericSortBlobWriter::new(ListSource(values.clone()), true, &MissingPolicy::Default).unwrap();
        assert!(key(&mut asc, 0) < key(&mut asc, 1));
        let mut desc = NumericSortBlobWriter::new(ListSource(values), false, &MissingPolicy::Default).unwrap();
        assert!(key(&mut desc, 0) < key(&mut desc, 1));
    }

    #[test]
    fn missing_policies_place_empty_documents() {
        let values = vec![vec![7i32], vec![]];
        for ascending in [true, false] {
            let mut first = NumericSortBlobWriter::new(ListSource(values.clone()), ascending, &MissingPolicy::First).unwrap();
            assert!(key(&mut first, 1) < key(&mut first, 0));
            let mut last = NumericSortBlobWriter::new(ListSource(values.clone()), ascending, &MissingPolicy::Last).unwrap();
            assert!(key(&mut last, 0) < key(&mut last, 1));
        }
        let mut as_value =
            NumericSortBlobWriter::new(ListSource(values.clone()), true, &MissingPolicy::As("7".into())).unwrap();
        assert_eq!(key(&mut as_value, 0), key(&mut as_value, 1));
        let mut zero = NumericSortBlobWriter::new(ListSource(values.clone()), true, &MissingPolicy::Default).unwrap();
        assert!(key(&mut zero, 1) < key(&mut zero, 0));
    }

    #[test]
    fn bad_missing_literal_is_a_config_error() {
        let err = NumericSortBlobWriter::new(ListSource(vec![vec![1i8]]), true, &MissingPolicy::As("x".into()));
        assert!(err.is_err());
    }

    #[test]
    fn small_buffer_is_reported() {
        let mut writer = NumericSortBlobWriter::new(ListSource(vec![vec![1i64]]), true, &MissingPolicy::First).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(writer.write(0, &mut buf), None);
        let mut buf = [0u8; 9];
        assert_eq!(writer.write(0, &mut buf), Some(9));
        assert_eq!(buf[0], 0x01);
    }

    #[test]
    fn string_keys_are_terminated_and_convertible() {
        let source = ListSource(vec![vec!["ab"], vec!["abc"], vec!["B"]]);
        let mut asc = StringSortBlobWriter::new(source, true, &MissingPolicy::Default, None).unwrap();
        assert!(key(&mut asc, 0) < key(&mut asc, 1));
        assert!(key(&mut asc, 2) < key(&mut asc, 0));
        assert_eq!(key(&mut asc, 0), b"ab\0");

        let source = ListSource(vec![vec!["ab"], vec!["abc"], vec!["B"]]);
        let lower = LowercaseConverter;
        let mut folded = StringSortBlobWriter::new(source, true, &MissingPolicy::Default, Some(&lower)).unwrap();
        assert!(key(&mut folded, 1) < key(&mut folded, 2));

        let source = ListSource(vec![vec!["ab"], vec!["abc"]]);
        let mut desc = StringSortBlobWriter::new(source, false, &MissingPolicy::Default, None).unwrap();
        assert!(key(&mut desc, 1) < key(&mut desc, 0));
    }

    #[test]
    fn string_multi_value_and_missing() {
        let source = ListSource(vec![vec!["m", "c", "x"], vec![]]);
        let mut asc = StringSortBlobWriter::new(source, true, &MissingPolicy::Last, None).unwrap();
        assert_eq!(key(&mut asc, 0), b"\x00c\0");
        assert_eq!(key(&mut asc, 1), vec![0x01]);

        let source = ListSource(vec![vec!["m", "c", "x"]]);
        let mut desc = StringSortBlobWriter::new(source, false, &MissingPolicy::Default, None).unwrap();
        assert_eq!(key(&mut desc, 0), vec![!b'x', 0xff]);
    }
}
