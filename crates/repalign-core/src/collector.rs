//! Append-only record accumulation shared by every capture buffer.

use serde::Serialize;

use crate::error::{Error, Result};

/// Accumulates records during a capture, then freezes them for analysis
pub trait Collector<T> {
    /// Append records; fails once the collector is finalized
    fn extend<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>;

    /// Freeze the collected records
    fn finalize(&mut self);

    fn is_finalized(&self) -> bool;

    /// Plain records for the persistence layer, fields in declaration order
    fn export(&self) -> Result<Vec<serde_json::Value>>;
}

/// The generic collector used for joints, angles and per-repetition results
#[derive(Debug, Clone)]
pub struct Collection<T> {
    items: Vec<T>,
    finalized: bool,
}

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            finalized: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Collector<T> for Collection<T> {
    fn extend<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        if self.finalized {
            return Err(Error::CollectorFinalized);
        }
        self.items.extend(items);
        Ok(())
    }

    fn finalize(&mut self) {
        self.finalized = true;
    }

    fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn export(&self) -> Result<Vec<serde_json::Value>> {
        self.items
            .iter()
            .map(|item| serde_json::to_value(item).map_err(Error::from))
            .collect()
    }
}
