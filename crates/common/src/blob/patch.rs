//! Typed operations and their wire envelope
//!
//! On the wire an operation is a JSON array `[code, pointer, ...params]`.
//! The arity of `params` is fixed per operation, except for `filter` which
//! carries a match field, a match value, and then its subcommands in one of
//! three shapes (see [`normalize`]).

use serde_json::{Map, Value};

use super::error::BlobError;
use super::ops::Op;
use super::pointer::Pointer;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Set {
        pointer: Pointer,
        value: Value,
    },
    Unset {
        pointer: Pointer,
    },
    Extend {
        pointer: Pointer,
        value: Map<String, Value>,
    },
    Unshift {
        pointer: Pointer,
        value: Value,
    },
    Push {
        pointer: Pointer,
        value: Value,
    },
    Pop {
        pointer: Pointer,
    },
    Shift {
        pointer: Pointer,
    },
    /// Apply `subcommands` to every mapping in the sequence at `pointer`
    ///  whose `field` equals `value`
    Filter {
        pointer: Pointer,
        field: String,
        value: Value,
        subcommands: Vec<Subcommand>,
    },
}

impl Operation {
    pub fn op(&self) -> Op {
        match self {
            Operation::Set { .. } => Op::Set,
            Operation::Unset { .. } => Op::Unset,
            Operation::Extend { .. } => Op::Extend,
            Operation::Unshift { .. } => Op::Unshift,
            Operation::Push { .. } => Op::Push,
            Operation::Pop { .. } => Op::Pop,
            Operation::Shift { .. } => Op::Shift,
            Operation::Filter { .. } => Op::Filter,
        }
    }

    pub fn pointer(&self) -> &Pointer {
        match self {
            Operation::Set { pointer, .. }
            | Operation::Unset { pointer }
            | Operation::Extend { pointer, .. }
            | Operation::Unshift { pointer, .. }
            | Operation::Push { pointer, .. }
            | Operation::Pop { pointer }
            | Operation::Shift { pointer }
            | Operation::Filter { pointer, .. } => pointer,
        }
    }

    fn pointer_mut(&mut self) -> &mut Pointer {
        match self {
            Operation::Set { pointer, .. }
            | Operation::Unset { pointer }
            | Operation::Extend { pointer, .. }
            | Operation::Unshift { pointer, .. }
            | Operation::Push { pointer, .. }
            | Operation::Pop { pointer }
            | Operation::Shift { pointer }
            | Operation::Filter { pointer, .. } => pointer,
        }
    }

    /// Wire parameters following the pointer. Filter subcommands are
    ///  emitted in their most compact shape.
    pub fn params(&self) -> Vec<Value> {
        match self {
            Operation::Unset { .. } | Operation::Pop { .. } | Operation::Shift { .. } => vec![],
            Operation::Set { value, .. }
            | Operation::Unshift { value, .. }
            | Operation::Push { value, .. } => vec![value.clone()],
            Operation::Extend { value, .. } => vec![Value::Object(value.clone())],
            Operation::Filter {
                field,
                value,
                subcommands,
                ..
            } => {
                let mut params = vec![Value::String(field.clone()), value.clone()];
                params.extend(compress(subcommands));
                params
            }
        }
    }

    /// `[code, pointer, ...params]`
    pub fn to_envelope(&self) -> Value {
        let mut envelope = vec![
            Value::from(self.op().code()),
            Value::String(self.pointer().to_string()),
        ];
        envelope.extend(self.params());
        Value::Array(envelope)
    }

    pub fn from_envelope(envelope: &Value) -> Result<Self, BlobError> {
        let (op, pointer, params) = split_envelope(envelope)?;
        Self::from_parts(op, Pointer::parse(pointer)?, params)
    }

    pub fn from_parts(op: Op, pointer: Pointer, params: &[Value]) -> Result<Self, BlobError> {
        let operation = match op {
            Op::Noop => {
                return Err(BlobError::UnsupportedOperation(
                    "noop is reserved and never dispatched".to_string(),
                ))
            }
            Op::Set => Operation::Set {
                pointer,
                value: single(op, params)?,
            },
            Op::Unset => {
                none(op, params)?;
                Operation::Unset { pointer }
            }
            Op::Extend => match single(op, params)? {
                Value::Object(value) => Operation::Extend { pointer, value },
                other => {
                    return Err(BlobError::MalformedPatch(format!(
                        "extend expects a mapping, got {}",
                        other
                    )))
                }
            },
            Op::Unshift => Operation::Unshift {
                pointer,
                value: single(op, params)?,
            },
            Op::Push => Operation::Push {
                pointer,
                value: single(op, params)?,
            },
            Op::Pop => {
                none(op, params)?;
                Operation::Pop { pointer }
            }
            Op::Shift => {
                none(op, params)?;
                Operation::Shift { pointer }
            }
            Op::Filter => {
                let [field, value, tail @ ..] = params else {
                    return Err(BlobError::MalformedPatch(
                        "filter expects a field and a value".to_string(),
                    ));
                };
                let Value::String(field) = field else {
                    return Err(BlobError::MalformedPatch(format!(
                        "filter field must be a string, got {}",
                        field
                    )));
                };
                Operation::Filter {
                    pointer,
                    field: field.clone(),
                    value: value.clone(),
                    subcommands: normalize(tail)?,
                }
            }
        };
        Ok(operation)
    }

    /// The same operation with `prefix` prepended to its pointer
    pub fn rebase(&self, prefix: &Pointer) -> Self {
        let mut operation = self.clone();
        *operation.pointer_mut() = prefix.join(self.pointer());
        operation
    }
}

/// An operation nested in a filter, its pointer relative to the matched element
#[derive(Debug, Clone, PartialEq)]
pub struct Subcommand(Operation);

impl Subcommand {
    pub fn new(operation: Operation) -> Self {
        Self(operation)
    }

    pub fn operation(&self) -> &Operation {
        &self.0
    }

    pub fn from_envelope(envelope: &Value) -> Result<Self, BlobError> {
        let (op, pointer, params) = split_envelope(envelope)?;
        Ok(Self(Operation::from_parts(
            op,
            Pointer::parse_relative(pointer)?,
            params,
        )?))
    }

    pub fn to_envelope(&self) -> Value {
        self.0.to_envelope()
    }

    /// Resolve against the pointer of a matched element
    pub fn at(&self, element: &Pointer) -> Operation {
        self.0.rebase(element)
    }
}

/// Canonicalize the subcommand tail of a filter envelope.
///
/// Three shapes are accepted:
/// - inline: `[op, pointer, ...params]`
/// - a single wrapped subcommand: `[[op, pointer, ...params]]`
/// - several: `[[[op, pointer, ...], [op, pointer, ...]]]`
pub fn normalize(tail: &[Value]) -> Result<Vec<Subcommand>, BlobError> {
    match tail {
        [] => Ok(vec![]),
        [Value::Number(_) | Value::String(_), ..] => {
            Ok(vec![Subcommand::from_envelope(&Value::Array(tail.to_vec()))?])
        }
        [single @ Value::Array(inner)] if matches!(inner.first(), Some(Value::Number(_) | Value::String(_))) => {
            Ok(vec![Subcommand::from_envelope(single)?])
        }
        [Value::Array(many)] => many.iter().map(Subcommand::from_envelope).collect(),
        _ => Err(BlobError::MalformedPatch(
            "unrecognized subcommand shape".to_string(),
        )),
    }
}

/// The smallest tail that [`normalize`] maps back to `subcommands`: inline
///  for exactly one subcommand, the wrapped list otherwise.
pub fn compress(subcommands: &[Subcommand]) -> Vec<Value> {
    match subcommands {
        [only] => match only.to_envelope() {
            Value::Array(items) => items,
            other => vec![other],
        },
        many => vec![Value::Array(
            many.iter().map(Subcommand::to_envelope).collect(),
        )],
    }
}

fn split_envelope(envelope: &Value) -> Result<(Op, &str, &[Value]), BlobError> {
    let Value::Array(items) = envelope else {
        return Err(BlobError::MalformedPatch(format!(
            "envelope must be an array, got {}",
            envelope
        )));
    };
    let [op, pointer, params @ ..] = items.as_slice() else {
        return Err(BlobError::MalformedPatch(
            "envelope needs an op and a pointer".to_string(),
        ));
    };
    let Value::String(pointer) = pointer else {
        return Err(BlobError::MalformedPatch(format!(
            "pointer must be a string, got {}",
            pointer
        )));
    };
    Ok((Op::from_value(op)?, pointer.as_str(), params))
}

fn single(op: Op, params: &[Value]) -> Result<Value, BlobError> {
    match params {
        [value] => Ok(value.clone()),
        _ => Err(BlobError::MalformedPatch(format!(
            "{} expects 1 parameter, got {}",
            op,
            params.len()
        ))),
    }
}

fn none(op: Op, params: &[Value]) -> Result<(), BlobError> {
    if params.is_empty() {
        Ok(())
    } else {
        Err(BlobError::MalformedPatch(format!(
            "{} expects no parameters, got {}",
            op,
            params.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sub(envelope: Value) -> Subcommand {
        Subcommand::from_envelope(&envelope).unwrap()
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = json!([16, "/a~1b/0", {"x": 1}]);
        let operation = Operation::from_envelope(&envelope).unwrap();
        assert_eq!(operation.op(), Op::Set);
        assert_eq!(operation.pointer().segments(), ["a/b", "0"]);
        assert_eq!(operation.to_envelope(), envelope);
    }

    #[test]
    fn test_envelope_accepts_names() {
        let operation = Operation::from_envelope(&json!(["unset", "/a"])).unwrap();
        assert_eq!(operation.to_envelope(), json!([17, "/a"]));
    }

    #[test]
    fn test_envelope_errors() {
        assert!(matches!(
            Operation::from_envelope(&json!([0, "/a"])),
            Err(BlobError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            Operation::from_envelope(&json!([99, "/a"])),
            Err(BlobError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            Operation::from_envelope(&json!([16, "a", 1])),
            Err(BlobError::InvalidPointer { .. })
        ));
        assert!(matches!(
            Operation::from_envelope(&json!([16, "/a"])),
            Err(BlobError::MalformedPatch(_))
        ));
        assert!(matches!(
            Operation::from_envelope(&json!([18, "/a", [1]])),
            Err(BlobError::MalformedPatch(_))
        ));
        assert!(matches!(
            Operation::from_envelope(&json!({"op": 16})),
            Err(BlobError::MalformedPatch(_))
        ));
    }

    #[test]
    fn test_normalize_shapes_agree() {
        let inline = normalize(&[json!("set"), json!("/id"), json!(99)]).unwrap();
        let wrapped = normalize(&[json!([16, "/id", 99])]).unwrap();
        let many = normalize(&[json!([["set", "/id", 99]])]).unwrap();

        assert_eq!(inline, wrapped);
        assert_eq!(wrapped, many);
        assert_eq!(inline.len(), 1);
        assert!(normalize(&[]).unwrap().is_empty());
        assert!(normalize(&[json!([])]).unwrap().is_empty());
    }

    #[test]
    fn test_normalize_rejects_unknown_shapes() {
        assert!(normalize(&[json!(true)]).is_err());
        assert!(normalize(&[json!([16, "/a", 1]), json!([17, "/b"])]).is_err());
        assert!(normalize(&[json!([["set", "relative", 1]])]).is_err());
    }

    #[test]
    fn test_compress_is_minimal() {
        let one = vec![sub(json!(["set", "/id", 99]))];
        assert_eq!(compress(&one), vec![json!(16), json!("/id"), json!(99)]);

        let two = vec![sub(json!(["set", "/id", 99])), sub(json!(["unset", "/tag"]))];
        assert_eq!(compress(&two), vec![json!([[16, "/id", 99], [17, "/tag"]])]);

        assert_eq!(compress(&[]), vec![json!([])]);
    }

    #[test]
    fn test_normalize_compress_round_trip() {
        let shapes = [
            vec![json!("set"), json!("/id"), json!(99)],
            vec![json!(["unshift", "/tags", "x"])],
            vec![json!([["set", "/a", 1], [17, "/b"], ["filter", "/c", "k", "v", "unset", ""]])],
            vec![json!([])],
        ];
        for shape in shapes {
            let normalized = normalize(&shape).unwrap();
            assert_eq!(normalize(&compress(&normalized)).unwrap(), normalized);
        }
    }

    #[test]
    fn test_filter_envelope() {
        let envelope = json!([36, "/items", "tag", "a", [[16, "/id", 99], [17, "/tag"]]]);
        let operation = Operation::from_envelope(&envelope).unwrap();
        let Operation::Filter {
            field, subcommands, ..
        } = &operation
        else {
            panic!("expected filter");
        };
        assert_eq!(field, "tag");
        assert_eq!(subcommands.len(), 2);
        assert_eq!(operation.to_envelope(), envelope);
    }

    #[test]
    fn test_subcommand_rebase() {
        let subcommand = sub(json!(["set", "/id", 1]));
        let element = Pointer::parse("/items/3").unwrap();
        assert_eq!(subcommand.at(&element).pointer().to_string(), "/items/3/id");

        let whole = sub(json!(["unset", ""]));
        assert_eq!(whole.at(&element).pointer(), &element);
    }
}
