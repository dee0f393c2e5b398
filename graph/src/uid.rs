//! Content-addressed node identity.
//!
//! A uid is a 64-bit fingerprint of everything that affects a node's
//! output: its type name plus the resolved values of the attributes in
//! the uid group. Two nodes with the same fingerprint are
//! interchangeable and share a cache folder.

use std::hash::Hasher as _;

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::Value;

/// The uid group that keys a node's cache folder.
pub const UID_GROUP_DEFAULT: usize = 0;

/// A computed node fingerprint, rendered as 16 lowercase hex chars.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental uid computation over a canonical byte encoding.
///
/// Every write is prefixed with a type tag and (for variable-length
/// data) a length, so distinct value sequences never collide by
/// concatenation.
#[derive(Default)]
pub struct UidDigest {
    hasher: FxHasher,
}

impl UidDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_str(&mut self, s: &str) {
        self.hasher.write_u8(b's');
        self.hasher.write_usize(s.len());
        self.hasher.write(s.as_bytes());
    }

    /// Feed one resolved attribute value.
    /// Floats hash by bit pattern; list elements hash in document order.
    pub fn write_value(&mut self, v: &Value) {
        match v {
            Value::Bool(b) => {
                self.hasher.write_u8(b'b');
                self.hasher.write_u8(*b as u8);
            }
            Value::Int(i) => {
                self.hasher.write_u8(b'i');
                self.hasher.write_i64(*i);
            }
            Value::Float(f) => {
                self.hasher.write_u8(b'f');
                self.hasher.write_u64(f.to_bits());
            }
            Value::Str(s) => self.write_str(s),
            Value::List(items) => {
                self.hasher.write_u8(b'l');
                self.hasher.write_usize(items.len());
                for item in items {
                    self.write_value(item);
                }
            }
        }
    }

    pub fn finish(self) -> Uid {
        Uid(format!("{:016x}", self.hasher.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(f: impl FnOnce(&mut UidDigest)) -> Uid {
        let mut d = UidDigest::new();
        f(&mut d);
        d.finish()
    }

    #[test]
    fn test_deterministic() {
        let a = digest_of(|d| {
            d.write_str("Blur");
            d.write_value(&Value::Int(3));
        });
        let b = digest_of(|d| {
            d.write_str("Blur");
            d.write_value(&Value::Int(3));
        });
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn test_value_changes_uid() {
        let a = digest_of(|d| d.write_value(&Value::Int(3)));
        let b = digest_of(|d| d.write_value(&Value::Int(4)));
        assert_ne!(a, b);
    }

    #[test]
    fn test_type_tags_disambiguate() {
        // "ab" + "c" must not collide with "a" + "bc"
        let a = digest_of(|d| {
            d.write_str("ab");
            d.write_str("c");
        });
        let b = digest_of(|d| {
            d.write_str("a");
            d.write_str("bc");
        });
        assert_ne!(a, b);

        let c = digest_of(|d| d.write_value(&Value::Int(1)));
        let e = digest_of(|d| d.write_value(&Value::Bool(true)));
        assert_ne!(c, e);
    }

    #[test]
    fn test_list_order_matters() {
        let a = digest_of(|d| {
            d.write_value(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        });
        let b = digest_of(|d| {
            d.write_value(&Value::List(vec![Value::Int(2), Value::Int(1)]))
        });
        assert_ne!(a, b);
    }
}
