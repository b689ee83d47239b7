//! The flat list of metadata records produced by decoding and consumed by encoding.
use crate::tags::Group;
use crate::value::Value;

/// Identifies a record: the tag within its group plus an occurrence index.
///
/// The index tells apart records with the same tag and group, which happens when a file
/// contains duplicate entries, and is otherwise the order in which entries were read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub tag: u16,
    pub group: Group,
    pub idx: i32,
}

impl Key {
    pub fn new(tag: u16, group: Group) -> Self {
        Key { tag, group, idx: 0 }
    }

    pub fn with_idx(self, idx: i32) -> Self {
        Key { idx, ..self }
    }

    /// Whether both keys name the same tag in the same group, ignoring the index.
    pub fn same_tag(&self, other: &Key) -> bool {
        self.tag == other.tag && self.group == other.group
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Datum {
    pub key: Key,
    pub value: Value,
}

impl Datum {
    pub fn new(key: Key, value: Value) -> Self {
        Datum { key, value }
    }
}

/// An ordered collection of records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    data: Vec<Datum>,
}

impl Metadata {
    pub fn new() -> Self {
        Metadata::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.data.iter()
    }

    pub fn get(&self, pos: usize) -> Option<&Datum> {
        self.data.get(pos)
    }

    /// Append a record, keeping any existing record with the same key.
    pub fn add(&mut self, key: Key, value: Value) {
        self.data.push(Datum::new(key, value));
    }

    /// Replace the value of the first record with this tag and group, or append one.
    pub fn set(&mut self, key: Key, value: Value) {
        match self.find_key(key.tag, key.group) {
            Some(pos) => self.data[pos].value = value,
            None => self.add(key, value),
        }
    }

    /// Position of the first record with this tag and group.
    pub fn find_key(&self, tag: u16, group: Group) -> Option<usize> {
        self.data
            .iter()
            .position(|d| d.key.tag == tag && d.key.group == group)
    }

    pub fn position<P: FnMut(&Datum) -> bool>(&self, predicate: P) -> Option<usize> {
        self.data.iter().position(predicate)
    }

    pub fn value(&self, tag: u16, group: Group) -> Option<&Value> {
        self.find_key(tag, group).map(|pos| &self.data[pos].value)
    }

    /// Remove the record at `pos`, shifting later records down.
    pub fn erase(&mut self, pos: usize) -> Datum {
        self.data.remove(pos)
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = &'a Datum;
    type IntoIter = std::slice::Iter<'a, Datum>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}
