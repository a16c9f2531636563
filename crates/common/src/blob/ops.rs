//! Operation catalog
//!
//! The discriminants are the wire codes, so rustc itself rejects two
//! operations sharing a code. Do NOT change the code of an existing
//! operation: patches already stored remotely reference them. New operations
//! take a fresh code and are appended to [`Op::ALL`].

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::error::BlobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Op {
    /// Reserved sentinel, never dispatched
    Noop = 0,

    // Simple ops
    Set = 16,
    Unset = 17,
    Extend = 18,

    // Sequence and meta ops
    Push = 32,
    Pop = 33,
    Shift = 34,
    Unshift = 35,
    Filter = 36,
}

impl Op {
    pub const ALL: [Op; 9] = [
        Op::Noop,
        Op::Set,
        Op::Unset,
        Op::Extend,
        Op::Push,
        Op::Pop,
        Op::Shift,
        Op::Unshift,
        Op::Filter,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Op::Noop => "noop",
            Op::Set => "set",
            Op::Unset => "unset",
            Op::Extend => "extend",
            Op::Push => "push",
            Op::Pop => "pop",
            Op::Shift => "shift",
            Op::Unshift => "unshift",
            Op::Filter => "filter",
        }
    }

    pub fn from_code(code: u8) -> Option<Op> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    pub fn from_name(name: &str) -> Option<Op> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Decode the op slot of an envelope, which may hold either the numeric
    ///  code or the name.
    pub fn from_value(value: &Value) -> Result<Op, BlobError> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|code| u8::try_from(code).ok())
                .and_then(Op::from_code)
                .ok_or_else(|| BlobError::UnsupportedOperation(format!("op code {}", n))),
            Value::String(name) => Op::from_name(name)
                .ok_or_else(|| BlobError::UnsupportedOperation(format!("op '{}'", name))),
            other => Err(BlobError::MalformedPatch(format!(
                "op must be a code or a name, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Op {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Op::from_name(s).ok_or_else(|| BlobError::UnsupportedOperation(format!("op '{}'", s)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_codes_are_fixed() {
        let expected = [
            ("noop", 0),
            ("set", 16),
            ("unset", 17),
            ("extend", 18),
            ("push", 32),
            ("pop", 33),
            ("shift", 34),
            ("unshift", 35),
            ("filter", 36),
        ];
        for (name, code) in expected {
            let op = Op::from_name(name).unwrap();
            assert_eq!(op.code(), code);
            assert_eq!(Op::from_code(code), Some(op));
        }
    }

    #[test]
    fn test_catalog_is_bijective() {
        for op in Op::ALL {
            assert_eq!(Op::from_code(op.code()), Some(op));
            assert_eq!(Op::from_name(op.name()), Some(op));
        }
        assert_eq!(Op::from_code(1), None);
        assert_eq!(Op::from_name("splice"), None);
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Op::from_value(&json!(16)).unwrap(), Op::Set);
        assert_eq!(Op::from_value(&json!("filter")).unwrap(), Op::Filter);
        assert!(matches!(
            Op::from_value(&json!(300)),
            Err(BlobError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            Op::from_value(&json!("bogus")),
            Err(BlobError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            Op::from_value(&json!(null)),
            Err(BlobError::MalformedPatch(_))
        ));
    }
}
