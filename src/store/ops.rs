//! Buffered key-value operations and the views they are resolved against.
//!
//! Content bookkeeping never writes to the engine directly. It reads through a
//! [`KvRead`] view and returns an [`OperationSet`] that the caller merges into
//! the enclosing atomic batch and applies through [`KvWrite`].

use std::collections::BTreeMap;

use redb::{ReadOnlyTable, ReadableTable, Table, TableDefinition};

use crate::error::StoreError;

/// Engine table holding one archive namespace.
pub(crate) type TileTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

/// A buffered mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An ordered list of mutations applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSet {
    ops: Vec<Op>,
}

impl OperationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(Op::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Buffer a deletion.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(Op::Delete { key: key.into() });
        self
    }

    /// Append another set, preserving order.
    pub fn extend(&mut self, other: OperationSet) -> &mut Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter()
    }

    /// Apply every operation in order.
    pub fn apply<W: KvWrite + ?Sized>(&self, target: &mut W) -> Result<(), StoreError> {
        for op in &self.ops {
            match op {
                Op::Put { key, value } => target.put(key, value)?,
                Op::Delete { key } => target.delete(key)?,
            }
        }
        Ok(())
    }
}

/// Point reads over one namespace.
pub trait KvRead {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Point writes over one namespace.
pub trait KvWrite: KvRead {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;
}

impl KvRead for Table<'_, &'static [u8], &'static [u8]> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(ReadableTable::get(self, key)?.map(|v| v.value().to_vec()))
    }
}

impl KvWrite for Table<'_, &'static [u8], &'static [u8]> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.insert(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.remove(key)?;
        Ok(())
    }
}

impl KvRead for ReadOnlyTable<&'static [u8], &'static [u8]> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(ReadableTable::get(self, key)?.map(|v| v.value().to_vec()))
    }
}

impl KvRead for BTreeMap<Vec<u8>, Vec<u8>> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(BTreeMap::get(self, key).cloned())
    }
}

impl KvWrite for BTreeMap<Vec<u8>, Vec<u8>> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.remove(key);
        Ok(())
    }
}
