//! Marker, prefix and delimiter aware listing over entity subspaces.
//!
//! Entities are stored one key per field (`(name, field)`), so a page of
//! entities spans several key/value pairs. [`EntityCursor`] reads a subspace
//! in over-fetching batches and regroups the pairs by entity name; the
//! listing algorithm on top of it applies the S3 listing rules:
//!
//! - `marker` is an exclusive lower bound, `end_marker` an exclusive upper
//!   bound.
//! - The first name outside `prefix` ends the scan.
//! - With a delimiter, every name holding the delimiter after the prefix is
//!   folded into one common-prefix entry and the scan jumps past the group.

use std::collections::VecDeque;

use meterstack_kv::{KeyRange, KeyValue, Subspace, Transaction};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::AccountError;
use crate::keyspace::{decode_counter, field};
use crate::timestamp::Timestamp;
use crate::validation::is_valid_bucket_name;

/// Default page size.
pub const DEFAULT_LIMIT: usize = 1000;

/// Listing parameters.
///
/// # Examples
///
/// ```
/// use meterstack_account::ListParams;
///
/// let params = ListParams::builder().limit(10).prefix("photos/").delimiter("/").build();
/// assert_eq!(params.marker, None);
/// assert!(!params.s3_buckets_only);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct ListParams {
    /// Maximum number of entries per page.
    #[builder(default = DEFAULT_LIMIT)]
    pub limit: usize,
    /// Only names starting with this prefix.
    #[builder(default, setter(into))]
    pub prefix: String,
    /// Exclusive lower bound.
    #[builder(default, setter(strip_option, into))]
    pub marker: Option<String>,
    /// Exclusive upper bound.
    #[builder(default, setter(strip_option, into))]
    pub end_marker: Option<String>,
    /// Group names sharing a prefix up to this delimiter.
    #[builder(default, setter(strip_option, into))]
    pub delimiter: Option<String>,
    /// Only names that are valid bucket names.
    #[builder(default)]
    pub s3_buckets_only: bool,
}

impl Default for ListParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A listed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEntry {
    /// Container name.
    pub name: String,
    /// Object counter.
    pub objects: i64,
    /// Byte counter.
    pub bytes: i64,
    /// Last modification time.
    pub mtime: Timestamp,
    /// Bucket back-reference.
    pub bucket: Option<String>,
}

/// A listed bucket with its live counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntry {
    /// Bucket name.
    pub name: String,
    /// Object counter.
    pub objects: i64,
    /// Byte counter.
    pub bytes: i64,
    /// Last modification time.
    pub mtime: Timestamp,
}

/// One row of a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingEntry<T> {
    /// A stored entity.
    Object(T),
    /// A group of names sharing a prefix up to the delimiter.
    CommonPrefix(String),
}

/// Entities with a listing name.
pub trait Named {
    /// The name entities are sorted by.
    fn name(&self) -> &str;
}

impl Named for ContainerEntry {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for BucketEntry {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Named> ListingEntry<T> {
    /// Entity name or common prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Object(item) => item.name(),
            Self::CommonPrefix(prefix) => prefix,
        }
    }

    /// Whether this entry is a common-prefix group.
    #[must_use]
    pub fn is_prefix(&self) -> bool {
        matches!(self, Self::CommonPrefix(_))
    }
}

/// One listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing<T> {
    /// Entries in ascending name order.
    pub entries: Vec<ListingEntry<T>>,
    /// Marker for the next page; `None` once the listing is exhausted.
    pub next_marker: Option<String>,
}

impl<T: Named> Listing<T> {
    /// Names of all entries.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(ListingEntry::name).collect()
    }
}

/// The fields of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Entity name.
    pub name: String,
    /// `(field, value)` pairs in key order; the field is empty for a bare
    /// index key.
    pub fields: Vec<(String, Vec<u8>)>,
}

impl Entity {
    /// Value of one field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(f, _)| f == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Counter value of one field, zero when absent.
    #[must_use]
    pub fn counter(&self, name: &str) -> i64 {
        self.field(name).map(decode_counter).unwrap_or_default()
    }

    /// UTF-8 value of one field.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        self.field(name)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}

/// Batched, snapshot-reading iterator over the entities of a subspace.
///
/// Each refill reads `batch × fields_per_entity` pairs. A refill that fills
/// its limit drops its trailing group, which may be cut short, and resumes
/// from it next time; a refill holding a single group retries with a larger
/// limit.
#[derive(Debug)]
pub struct EntityCursor<'a> {
    tr: &'a Transaction,
    space: &'a Subspace,
    cursor: Vec<u8>,
    end: Vec<u8>,
    batch: usize,
    fields_per_entity: usize,
    buffer: VecDeque<Entity>,
    done: bool,
}

impl<'a> EntityCursor<'a> {
    /// Iterate the entities of `space` whose keys fall in `[begin, end)`.
    #[must_use]
    pub fn new(
        tr: &'a Transaction,
        space: &'a Subspace,
        begin: Vec<u8>,
        end: Vec<u8>,
        fields_per_entity: usize,
    ) -> Self {
        Self {
            tr,
            space,
            cursor: begin,
            end,
            batch: DEFAULT_LIMIT,
            fields_per_entity: fields_per_entity.max(1),
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Entities fetched by the next refill.
    pub fn set_batch(&mut self, entities: usize) {
        self.batch = entities.max(1);
    }

    /// Drop buffered entities and continue from `key`.
    pub fn seek(&mut self, key: Vec<u8>) {
        self.buffer.clear();
        self.cursor = key;
        self.done = false;
    }

    /// Name of the next entity, without consuming it.
    pub fn peek_name(&mut self) -> Result<Option<String>, AccountError> {
        match self.next().transpose()? {
            Some(entity) => {
                let name = entity.name.clone();
                self.buffer.push_front(entity);
                Ok(Some(name))
            }
            None => Ok(None),
        }
    }

    fn refill(&mut self) -> Result<(), AccountError> {
        let mut fetch = self.batch.saturating_add(1) * self.fields_per_entity;
        loop {
            let range = KeyRange::new(self.cursor.clone(), self.end.clone());
            let rows = self.tr.get_range_snapshot(&range, fetch);
            if rows.is_empty() {
                self.done = true;
                return Ok(());
            }
            let full = rows.len() == fetch;
            let mut groups = self.group(rows)?;
            if full {
                if groups.len() == 1 {
                    fetch = fetch.saturating_mul(2);
                    continue;
                }
                groups.pop();
            } else {
                self.done = true;
            }
            if let Some(last) = groups.last() {
                self.cursor = self.space.after_entity(&last.name);
            }
            self.buffer.extend(groups);
            return Ok(());
        }
    }

    fn group(&self, rows: Vec<KeyValue>) -> Result<Vec<Entity>, AccountError> {
        let mut groups: Vec<Entity> = Vec::new();
        for (key, value) in rows {
            let mut elements = self.space.unpack(&key)?.into_iter();
            let Some(name) = elements.next() else {
                continue;
            };
            let field = elements.next().unwrap_or_default();
            match groups.last_mut() {
                Some(entity) if entity.name == name => entity.fields.push((field, value)),
                _ => groups.push(Entity {
                    name,
                    fields: vec![(field, value)],
                }),
            }
        }
        Ok(groups)
    }
}

impl Iterator for EntityCursor<'_> {
    type Item = Result<Entity, AccountError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// List one page of the entities of `space`.
///
/// `accept` turns a stored entity into a listing item; returning `None`
/// skips it.
pub fn list_entities<T, F>(
    tr: &Transaction,
    space: &Subspace,
    params: &ListParams,
    fields_per_entity: usize,
    mut accept: F,
) -> Result<Listing<T>, AccountError>
where
    T: Named,
    F: FnMut(&Entity) -> Result<Option<T>, AccountError>,
{
    let limit = params.limit;
    let prefix = params.prefix.as_str();
    let marker = params.marker.as_deref().filter(|m| !m.is_empty());
    let end_marker = params.end_marker.as_deref().filter(|m| !m.is_empty());
    let delimiter = params.delimiter.as_deref().filter(|d| !d.is_empty());

    let mut entries = Vec::new();
    if limit == 0 {
        return Ok(Listing {
            entries,
            next_marker: None,
        });
    }

    let whole = space.range();
    let mut begin = whole.begin;
    if !prefix.is_empty() {
        begin = begin.max(space.name_prefix_start(prefix));
    }
    if let Some(marker) = marker {
        begin = begin.max(space.after_entity(marker));
    }
    let mut end = whole.end;
    if let Some(end_marker) = end_marker {
        end = end.min(space.pack(&[end_marker]));
    }

    let mut cursor = EntityCursor::new(tr, space, begin, end, fields_per_entity);
    let mut beyond_prefix = false;
    while entries.len() < limit {
        cursor.set_batch(limit - entries.len());
        let Some(entity) = cursor.next().transpose()? else {
            break;
        };
        let name = entity.name.as_str();
        if !name.starts_with(prefix) {
            beyond_prefix = true;
            break;
        }

        if let Some(delimiter) = delimiter {
            if let Some(pos) = name[prefix.len()..].find(delimiter) {
                let cut = prefix.len() + pos;
                if cut > 0 {
                    let group = &name[..cut + delimiter.len()];
                    cursor.seek(space.after_name_prefix(group));
                    if marker != Some(group) {
                        entries.push(ListingEntry::CommonPrefix(group.to_owned()));
                    }
                    continue;
                }
            }
        }

        if params.s3_buckets_only && !is_valid_bucket_name(name) {
            continue;
        }
        if let Some(item) = accept(&entity)? {
            entries.push(ListingEntry::Object(item));
        }
    }

    let next_marker = if entries.len() >= limit && !beyond_prefix {
        match cursor.peek_name()? {
            Some(next) if next.starts_with(prefix) => entries.last().map(|e| e.name().to_owned()),
            _ => None,
        }
    } else {
        None
    };

    Ok(Listing {
        entries,
        next_marker,
    })
}

/// Build a [`ContainerEntry`] from a container row.
#[must_use]
pub fn container_entry(entity: &Entity) -> ContainerEntry {
    ContainerEntry {
        name: entity.name.clone(),
        objects: entity.counter(field::OBJECTS),
        bytes: entity.counter(field::BYTES),
        mtime: entity
            .field(field::MTIME)
            .map(Timestamp::decode)
            .unwrap_or_default(),
        bucket: entity.text(field::BUCKET).filter(|b| !b.is_empty()),
    }
}
