use serde_json::{Map, Value};

use super::error::BlobError;
use super::identity::IDENTITY_ROOT;
use super::ops::Op;
use super::patch::{Operation, Subcommand};
use super::pointer::{lookup, resolve_parent, Descent, Pointer, Slot};

/// Furthest a write may land past the end of a sequence
pub const MAX_SEQUENCE_GAP: usize = 1 << 16;

/// Apply a single operation to the document in place.
///
/// A missing path is a silent no-op for every operation that does not create
/// containers. Each operation either fully applies or leaves the document
/// untouched.
pub fn apply(document: &mut Value, operation: &Operation) -> Result<(), BlobError> {
    guard_reserved_root(document, operation)?;
    tracing::trace!(op = %operation.op(), pointer = %operation.pointer(), "applying operation");

    match operation {
        Operation::Set { pointer, value } => {
            if let Some((parent, slot)) = resolve_parent(document, pointer, Descent::Create)? {
                check_gap(parent, &slot, pointer)?;
                *slot_or_insert(parent, slot, Value::Null) = value.clone();
            }
        }
        Operation::Unset { pointer } => {
            if let Some((parent, slot)) = resolve_parent(document, pointer, Descent::Existing)? {
                match (parent, slot) {
                    (Value::Object(map), Slot::Key(key)) => {
                        map.remove(&key);
                    }
                    (Value::Array(items), Slot::Index(index)) if index < items.len() => {
                        items.remove(index);
                    }
                    _ => {}
                }
            }
        }
        Operation::Extend { pointer, value } => {
            if let Some((parent, slot)) = resolve_parent(document, pointer, Descent::Existing)? {
                match slot_get_mut(parent, slot) {
                    None => {}
                    Some(Value::Object(target)) => deep_merge(target, value),
                    Some(_) => return Err(mismatch(Op::Extend, pointer, "a mapping")),
                }
            }
        }
        Operation::Unshift { pointer, value } | Operation::Push { pointer, value } => {
            if let Some((parent, slot)) = resolve_parent(document, pointer, Descent::Create)? {
                check_gap(parent, &slot, pointer)?;
                match slot_or_insert(parent, slot, Value::Array(vec![])) {
                    Value::Array(items) if operation.op() == Op::Unshift => {
                        items.insert(0, value.clone())
                    }
                    Value::Array(items) => items.push(value.clone()),
                    _ => return Err(mismatch(operation.op(), pointer, "a sequence")),
                }
            }
        }
        Operation::Pop { pointer } | Operation::Shift { pointer } => {
            if let Some((parent, slot)) = resolve_parent(document, pointer, Descent::Existing)? {
                match slot_get_mut(parent, slot) {
                    None => {}
                    Some(Value::Array(items)) if operation.op() == Op::Pop => {
                        items.pop();
                    }
                    Some(Value::Array(items)) => {
                        if !items.is_empty() {
                            items.remove(0);
                        }
                    }
                    Some(_) => return Err(mismatch(operation.op(), pointer, "a sequence")),
                }
            }
        }
        Operation::Filter {
            pointer,
            field,
            value,
            subcommands,
        } => apply_filter(document, pointer, field, value, subcommands)?,
    }
    Ok(())
}

/// Visit the sequence at `pointer` by position. Only positions that existed
///  when the filter started and still exist are visited, so a subcommand that
///  removes an element shifts its successor past the cursor.
fn apply_filter(
    document: &mut Value,
    pointer: &Pointer,
    field: &str,
    value: &Value,
    subcommands: &[Subcommand],
) -> Result<(), BlobError> {
    let len = match lookup(document, pointer)? {
        Some(Value::Array(items)) => items.len(),
        _ => return Ok(()),
    };
    if subcommands.is_empty() {
        return Ok(());
    }

    let mut scratch = document.clone();
    let mut matched = 0usize;
    for index in 0..len {
        let element = pointer.child(index.to_string());
        let is_match = match lookup(&scratch, &element)? {
            Some(Value::Object(entry)) => entry
                .get(field)
                .is_some_and(|candidate| strict_equals(candidate, value)),
            _ => false,
        };
        if !is_match {
            continue;
        }
        matched += 1;
        for subcommand in subcommands {
            apply(&mut scratch, &subcommand.at(&element))?;
        }
    }

    tracing::trace!(%pointer, field, matched, "filter applied");
    *document = scratch;
    Ok(())
}

fn guard_reserved_root(document: &Value, operation: &Operation) -> Result<(), BlobError> {
    let pointer = operation.pointer();
    if pointer.segments() != [IDENTITY_ROOT] {
        return Ok(());
    }
    match operation {
        Operation::Set { .. } if document.get(IDENTITY_ROOT).is_some() => Err(
            BlobError::ForbiddenTarget(format!("{} already exists, use extend", pointer)),
        ),
        Operation::Unset { .. } => Err(BlobError::ForbiddenTarget(format!(
            "{} cannot be removed",
            pointer
        ))),
        _ => Ok(()),
    }
}

/// Scalar identity: numbers compare by value, so `1` and `1.0` match
fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r,
        },
        _ => left == right,
    }
}

fn check_gap(parent: &Value, slot: &Slot, pointer: &Pointer) -> Result<(), BlobError> {
    match (parent, slot) {
        (Value::Array(items), Slot::Index(index))
            if index.saturating_sub(items.len()) > MAX_SEQUENCE_GAP =>
        {
            Err(BlobError::invalid_pointer(
                pointer,
                "sequence index too far past the end",
            ))
        }
        _ => Ok(()),
    }
}

fn slot_get_mut(parent: &mut Value, slot: Slot) -> Option<&mut Value> {
    match (parent, slot) {
        (Value::Object(map), Slot::Key(key)) => map.get_mut(&key),
        (Value::Array(items), Slot::Index(index)) => items.get_mut(index),
        _ => None,
    }
}

/// The value at `slot`, inserting `default` if absent. Sequence slots past the
///  end are reached by padding with `null`.
fn slot_or_insert(parent: &mut Value, slot: Slot, default: Value) -> &mut Value {
    match (parent, slot) {
        (Value::Object(map), Slot::Key(key)) => map.entry(key).or_insert(default),
        (Value::Array(items), Slot::Index(index)) => {
            if index >= items.len() {
                items.resize(index, Value::Null);
                items.push(default);
            }
            &mut items[index]
        }
        (parent, _) => parent,
    }
}

/// Mappings merge key by key; any other value replaces what was there.
fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming)
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn mismatch(op: Op, pointer: &Pointer, expected: &'static str) -> BlobError {
    BlobError::TypeMismatch {
        op,
        pointer: pointer.to_string(),
        expected,
    }
}
