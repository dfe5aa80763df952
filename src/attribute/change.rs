use serde::Serialize;
use crate::core::types::{ArithmeticOp, DocId, Value};

/// One queued update, applied at the next commit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChangeKind {
    /// Single-value assignment
    Update(Value),
    /// Adds an element; on weighted sets it replaces the weight of an existing one
    Append(Value, i32),
    Remove(Value),
    /// Single-value numeric arithmetic
    Arithmetic(ArithmeticOp, f64),
    /// Weighted-set weight update of one element
    ApplyWeight(Value, ArithmeticOp, f64),
    ClearDoc,
}

impl ChangeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeKind::Update(_) => "update",
            ChangeKind::Append(..) => "append",
            ChangeKind::Remove(_) => "remove",
            ChangeKind::Arithmetic(..) => "arithmetic",
            ChangeKind::ApplyWeight(..) => "apply_weight",
            ChangeKind::ClearDoc => "clear_doc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub doc: DocId,
    pub kind: ChangeKind,
}

/// Pending changes of one attribute, in enqueue order
#[derive(Debug, Default)]
pub struct ChangeVector {
    changes: Vec<Change>,
}

impl ChangeVector {
    pub fn new() -> Self {
        ChangeVector { changes: Vec::new() }
    }

    pub fn push(&mut self, doc: DocId, kind: ChangeKind) {
        self.changes.push(Change { doc, kind });
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    pub fn memory_usage(&self) -> usize {
        self.changes.capacity() * std::mem::size_of::<Change>()
    }

    /// Empties the vector, grouping changes by document. Documents come out in
    /// increasing order and each keeps its changes in enqueue order.
    pub fn take_grouped(&mut self) -> Vec<(DocId, Vec<ChangeKind>)> {
        let mut changes = std::mem::take(&mut self.changes);
        changes.sort_by_key(|c| c.doc);
        let mut grouped: Vec<(DocId, Vec<ChangeKind>)> = Vec::new();
        for change in changes {
            match grouped.last_mut() {
                Some((doc, kinds)) if *doc == change.doc => kinds.push(change.kind),
                _ => grouped.push((change.doc, vec![change.kind])),
            }
        }
        grouped
    }
}

/// Weighted set behaviour for weight updates on absent or zeroed elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeightedSetFlags {
    pub create_if_nonexistent: bool,
    pub remove_if_zero: bool,
}

/// Applies a document's changes to its current single value.
///
/// Returns the new value (`None` means undefined) and how many changes were rejected.
pub(crate) fn apply_single_changes<X>(
    current: Option<X>,
    changes: &[ChangeKind],
    convert: impl Fn(&Value) -> Option<X>,
    arithmetic: impl Fn(&X, ArithmeticOp, f64) -> Option<X>,
) -> (Option<X>, usize) {
    let mut value = current;
    let mut rejected = 0;
    for change in changes {
        match change {
            ChangeKind::Update(v) => match convert(v) {
                Some(x) => value = Some(x),
                None => rejected += 1,
            },
            ChangeKind::Arithmetic(op, operand) => {
                if let Some(next) = value.as_ref().and_then(|x| arithmetic(x, *op, *operand)) {
                    value = Some(next);
                }
            }
            ChangeKind::ClearDoc => value = None,
            _ => rejected += 1,
        }
    }
    (value, rejected)
}

/// Applies a document's changes to its current (value, weight) list.
///
/// `same` decides element identity (folded comparison for uncased strings). Returns
/// the number of rejected changes.
pub(crate) fn apply_multi_changes<X>(
    current: &mut Vec<(X, i32)>,
    changes: &[ChangeKind],
    weighted: bool,
    flags: WeightedSetFlags,
    convert: impl Fn(&Value) -> Option<X>,
    same: impl Fn(&X, &X) -> bool,
) -> usize {
    let mut rejected = 0;
    for change in changes {
        match change {
            ChangeKind::Append(v, weight) => {
                let Some(x) = convert(v) else {
                    rejected += 1;
                    continue;
                };
                if weighted {
                    match current.iter_mut().find(|(e, _)| same(e, &x)) {
                        Some(entry) => entry.1 = *weight,
                        None => current.push((x, *weight)),
                    }
                } else {
                    current.push((x, 1));
                }
            }
            ChangeKind::Remove(v) => match convert(v) {
                Some(x) => current.retain(|(e, _)| !same(e, &x)),
                None => rejected += 1,
            },
            ChangeKind::ApplyWeight(v, op, operand) if weighted => {
                let Some(x) = convert(v) else {
                    rejected += 1;
                    continue;
                };
                let pos = current.iter().position(|(e, _)| same(e, &x));
                let weight = match pos {
                    Some(p) => op.apply_i64(current[p].1 as i64, *operand),
                    None if flags.create_if_nonexistent => op.apply_i64(0, *operand),
                    None => continue,
                };
                let weight = weight.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                match pos {
                    Some(p) if weight == 0 && flags.remove_if_zero => {
                        current.remove(p);
                    }
                    Some(p) => current[p].1 = weight,
                    None if weight == 0 && flags.remove_if_zero => {}
                    None => current.push((x, weight)),
                }
            }
            ChangeKind::ClearDoc => current.clear(),
            _ => rejected += 1,
        }
    }
    rejected
}
