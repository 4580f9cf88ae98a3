//! Prefix-bounded regions of the key space.
//!
//! A [`Subspace`] owns a packed tuple prefix. Every key packed through it
//! starts with that prefix, so two subspaces with different prefixes never
//! share a key and a range scan bounded by one never crosses into another.

use crate::error::KvError;
use crate::tuple::{self, STRING_CODE};

/// A half-open key range `[begin, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub begin: Vec<u8>,
    /// Exclusive upper bound.
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Create a new range.
    #[must_use]
    pub fn new(begin: Vec<u8>, end: Vec<u8>) -> Self {
        Self { begin, end }
    }

    /// Range covering exactly one key.
    #[must_use]
    pub fn single(key: &[u8]) -> Self {
        let mut end = key.to_vec();
        end.push(0x00);
        Self {
            begin: key.to_vec(),
            end,
        }
    }

    /// Whether the range contains no key at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    /// Whether `key` falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.begin.as_slice() && key < self.end.as_slice()
    }

    /// Whether two ranges share at least one key.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.begin < other.end && other.begin < self.end
    }
}

/// A namespace in the ordered key space.
///
/// # Examples
///
/// ```
/// use meterstack_kv::Subspace;
///
/// let containers = Subspace::new(&["container:"]).subspace(&["acct"]);
/// let key = containers.pack(&["photos", "bytes"]);
/// assert!(containers.range().contains(&key));
/// assert_eq!(containers.unpack(&key).unwrap(), vec!["photos", "bytes"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subspace {
    raw: Vec<u8>,
}

impl Subspace {
    /// Create a subspace from a tuple prefix.
    #[must_use]
    pub fn new(prefix: &[&str]) -> Self {
        Self {
            raw: tuple::pack(prefix),
        }
    }

    /// Nested subspace extending this prefix.
    #[must_use]
    pub fn subspace(&self, elements: &[&str]) -> Self {
        let mut raw = self.raw.clone();
        raw.extend_from_slice(&tuple::pack(elements));
        Self { raw }
    }

    /// The packed prefix.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Pack `elements` under this prefix.
    #[must_use]
    pub fn pack(&self, elements: &[&str]) -> Vec<u8> {
        let mut key = self.raw.clone();
        for element in elements {
            tuple::encode_element(element, &mut key);
        }
        key
    }

    /// Decode the elements of `key` that follow this prefix.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::InvalidKey`] if `key` is outside the subspace or
    /// malformed.
    pub fn unpack(&self, key: &[u8]) -> Result<Vec<String>, KvError> {
        let rest = key
            .strip_prefix(self.raw.as_slice())
            .ok_or_else(|| KvError::InvalidKey("key outside subspace".to_owned()))?;
        tuple::unpack(rest)
    }

    /// Every key strictly inside the subspace (the bare prefix excluded).
    #[must_use]
    pub fn range(&self) -> KeyRange {
        let mut begin = self.raw.clone();
        begin.push(0x00);
        let mut end = self.raw.clone();
        end.push(0xFF);
        KeyRange { begin, end }
    }

    /// Range holding every key of the entity `elements` (its own key and all
    /// of its fields).
    #[must_use]
    pub fn entity_range(&self, elements: &[&str]) -> KeyRange {
        let begin = self.pack(elements);
        let mut end = begin.clone();
        end.push(0xFF);
        KeyRange { begin, end }
    }

    /// First key of the first entity whose name starts with `prefix`.
    #[must_use]
    pub fn name_prefix_start(&self, prefix: &str) -> Vec<u8> {
        let mut key = self.raw.clone();
        key.push(STRING_CODE);
        tuple::append_escaped(prefix, &mut key);
        key
    }

    /// First key sorting after every field of the entity `name`.
    ///
    /// Names that merely extend `name` (`name-1`, `name/x`) still sort at or
    /// after the returned key.
    #[must_use]
    pub fn after_entity(&self, name: &str) -> Vec<u8> {
        let mut key = self.pack(&[name]);
        key.push(0xFF);
        key
    }

    /// First key sorting after every entity whose name starts with `prefix`.
    #[must_use]
    pub fn after_name_prefix(&self, prefix: &str) -> Vec<u8> {
        let start = self.name_prefix_start(prefix);
        // The string code byte is never 0xFF, so strinc always succeeds here.
        tuple::strinc(&start).unwrap_or_else(|| self.range().end)
    }
}
