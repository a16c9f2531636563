//! Root-anchored, escape-aware paths into the blob document
//!
//! Pointers follow the JSON Pointer layout: `/`-separated segments where a
//! literal `~` is written `~0` and a literal `/` is written `~1`. Pointers are
//! kept unescaped in memory and only escaped again when displayed.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use super::error::BlobError;

/// Segment addressing the position one past the end of a sequence
pub const APPEND_SEGMENT: &str = "-";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Pointer {
    segments: Vec<String>,
}

impl Pointer {
    /// Parse an absolute pointer. The pointer must address something below
    ///  the root: `""` is rejected along with anything not starting with `/`.
    pub fn parse(pointer: &str) -> Result<Self, BlobError> {
        if pointer.is_empty() {
            return Err(BlobError::invalid_pointer(
                pointer,
                "the document root itself cannot be targeted",
            ));
        }
        Self::parse_relative(pointer)
    }

    /// Parse a pointer that may be empty, as used for filter subcommands
    ///  which address the matched element itself with `""`.
    pub fn parse_relative(pointer: &str) -> Result<Self, BlobError> {
        if pointer.is_empty() {
            return Ok(Self::default());
        }
        let mut parts = pointer.split('/');
        if parts.next() != Some("") {
            return Err(BlobError::invalid_pointer(
                pointer,
                "pointer must start at the document root",
            ));
        }
        let segments = parts
            .map(|part| unescape(part).map_err(|reason| BlobError::invalid_pointer(pointer, reason)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn join(&self, suffix: &Pointer) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(suffix.segments.iter().cloned());
        Self { segments }
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", escape(segment))?;
        }
        Ok(())
    }
}

impl FromStr for Pointer {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Escape a single segment. `~` must be handled before `/` so the `~` in a
///  freshly produced `~1` is never escaped again.
pub fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Unescape a single segment in one left-to-right pass, so `~01` becomes
///  `~1` and never `/`.
pub fn unescape(segment: &str) -> Result<String, &'static str> {
    if !segment.contains('~') {
        return Ok(segment.to_string());
    }
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return Err("invalid tilde escape"),
        }
    }
    Ok(out)
}

/// Where, inside its immediate parent, an operation lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    Key(String),
    Index(usize),
}

/// How traversal treats mapping keys that are not there yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Descent {
    /// Insert an empty mapping and keep going
    Create,
    /// Stop with "no match"
    Existing,
}

/// Interpret a segment against a sequence of length `len`
pub(crate) fn array_index(segment: &str, len: usize) -> Result<usize, &'static str> {
    if segment == APPEND_SEGMENT {
        return Ok(len);
    }
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err("sequence segments must be a non-negative integer or '-'");
    }
    segment
        .parse::<usize>()
        .map_err(|_| "sequence index out of range")
}

/// Walk every segment but the last, returning the terminal's parent
///  container and the slot within it.
///
/// `Ok(None)` is a soft "no match": traversal hit a scalar, ran off the end of
///  a sequence, or found a missing key while not allowed to create it.
pub(crate) fn resolve_parent<'a>(
    document: &'a mut Value,
    pointer: &Pointer,
    descent: Descent,
) -> Result<Option<(&'a mut Value, Slot)>, BlobError> {
    let Some((last, parents)) = pointer.segments().split_last() else {
        return Err(BlobError::invalid_pointer(
            pointer,
            "the document root itself cannot be targeted",
        ));
    };

    let mut node = document;
    for segment in parents {
        let next = match node {
            Value::Array(items) => {
                let index = array_index(segment, items.len())
                    .map_err(|reason| BlobError::invalid_pointer(pointer, reason))?;
                items.get_mut(index)
            }
            Value::Object(map) => {
                if !map.contains_key(segment) {
                    if descent == Descent::Existing {
                        return Ok(None);
                    }
                    map.insert(segment.clone(), Value::Object(Map::new()));
                }
                map.get_mut(segment)
            }
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return Ok(None),
        }
    }

    let slot = match node {
        Value::Array(items) => Slot::Index(
            array_index(last, items.len())
                .map_err(|reason| BlobError::invalid_pointer(pointer, reason))?,
        ),
        Value::Object(_) => Slot::Key(last.clone()),
        _ => return Ok(None),
    };
    Ok(Some((node, slot)))
}

/// Read-only resolution. The empty pointer yields the document itself.
pub fn lookup<'a>(document: &'a Value, pointer: &Pointer) -> Result<Option<&'a Value>, BlobError> {
    let mut node = document;
    for segment in pointer.segments() {
        let next = match node {
            Value::Array(items) => {
                let index = array_index(segment, items.len())
                    .map_err(|reason| BlobError::invalid_pointer(pointer, reason))?;
                items.get(index)
            }
            Value::Object(map) => map.get(segment),
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return Ok(None),
        }
    }
    Ok(Some(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_requires_root() {
        assert!(matches!(
            Pointer::parse("a/b"),
            Err(BlobError::InvalidPointer { .. })
        ));
        assert!(Pointer::parse("").is_err());
        assert_eq!(Pointer::parse("/a/b").unwrap().segments(), ["a", "b"]);
        assert_eq!(Pointer::parse("/").unwrap().segments(), [""]);
        assert!(Pointer::parse_relative("").unwrap().is_empty());
    }

    #[test]
    fn test_unescape_is_single_pass() {
        assert_eq!(unescape("~01").unwrap(), "~1");
        assert_eq!(unescape("a~1b").unwrap(), "a/b");
        assert_eq!(unescape("~0~1").unwrap(), "~/");
        assert!(unescape("~2").is_err());
        assert!(unescape("trailing~").is_err());
    }

    #[test]
    fn test_escape_round_trip() {
        for s in ["", "plain", "~", "/", "~1", "~0", "a/b~c", "//~~", "~/~/"] {
            assert_eq!(unescape(&escape(s)).unwrap(), s);
        }
        for escaped in ["plain", "~0", "~1", "~01", "a~1b~0c"] {
            assert_eq!(escape(&unescape(escaped).unwrap()), escaped);
        }
    }

    #[test]
    fn test_display_round_trip() {
        let pointer = Pointer::from_segments(["a/b", "c~d", "0"]);
        assert_eq!(pointer.to_string(), "/a~1b/c~0d/0");
        assert_eq!(Pointer::parse(&pointer.to_string()).unwrap(), pointer);
    }

    #[test]
    fn test_array_index() {
        assert_eq!(array_index("-", 3), Ok(3));
        assert_eq!(array_index("2", 3), Ok(2));
        assert!(array_index("-1", 3).is_err());
        assert!(array_index("1.5", 3).is_err());
        assert!(array_index("x", 3).is_err());
        assert!(array_index("", 3).is_err());
    }

    #[test]
    fn test_resolve_creates_intermediate_mappings() {
        let mut doc = json!({});
        let pointer = Pointer::parse("/a/b/c").unwrap();
        let (parent, slot) = resolve_parent(&mut doc, &pointer, Descent::Create)
            .unwrap()
            .unwrap();
        assert!(parent.is_object());
        assert_eq!(slot, Slot::Key("c".to_string()));
        assert_eq!(doc, json!({"a": {"b": {}}}));
    }

    #[test]
    fn test_resolve_missing_is_soft() {
        let mut doc = json!({"a": 1, "list": [1]});
        for p in ["/missing/x", "/a/x", "/list/5/x"] {
            let pointer = Pointer::parse(p).unwrap();
            assert!(resolve_parent(&mut doc, &pointer, Descent::Existing)
                .unwrap()
                .is_none());
        }
        assert_eq!(doc, json!({"a": 1, "list": [1]}));
    }

    #[test]
    fn test_resolve_rejects_bad_sequence_segment() {
        let mut doc = json!({"list": [{"a": 1}]});
        let pointer = Pointer::parse("/list/first/a").unwrap();
        assert!(matches!(
            resolve_parent(&mut doc, &pointer, Descent::Create),
            Err(BlobError::InvalidPointer { .. })
        ));
    }

    #[test]
    fn test_lookup() {
        let doc = json!({"a": {"list": ["x", {"k": true}]}});
        let found = lookup(&doc, &Pointer::parse("/a/list/1/k").unwrap()).unwrap();
        assert_eq!(found, Some(&json!(true)));
        assert_eq!(
            lookup(&doc, &Pointer::parse("/a/list/-").unwrap()).unwrap(),
            None
        );
        assert_eq!(lookup(&doc, &Pointer::default()).unwrap(), Some(&doc));
    }
}
