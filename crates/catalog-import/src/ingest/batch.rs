use crate::db::product_repo::{self, ProductRecord};
use crate::db::{Database, DatabaseError};

/// Accumulates valid records and applies them in fixed-size batches.
pub struct BatchUpserter<'a> {
    db: &'a Database,
    batch_size: usize,
    pending: Vec<ProductRecord>,
    applied: u64,
}

impl<'a> BatchUpserter<'a> {
    pub fn new(db: &'a Database, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            db,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            applied: 0,
        }
    }

    /// Queues a record. When the batch fills up it is applied and the
    /// number of applied rows is returned.
    pub fn push(&mut self, record: ProductRecord) -> Result<Option<usize>, DatabaseError> {
        self.pending.push(record);
        if self.pending.len() < self.batch_size {
            return Ok(None);
        }
        self.flush().map(Some)
    }

    /// Applies whatever is queued. A failed batch is discarded.
    pub fn flush(&mut self) -> Result<usize, DatabaseError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let applied = product_repo::upsert_batch(self.db, &batch)?;
        self.applied += applied as u64;
        Ok(applied)
    }

    /// Rows committed so far.
    pub fn applied(&self) -> u64 {
        self.applied
    }
}
