use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow::row::{RowConverter, SortField};

use crate::error::Error;
use crate::MedallionResult;

/// An in-memory tabular dataset: one Arrow schema and a sequence of record
/// batches sharing it. Cloning is cheap, the batches are shared.
#[derive(Clone, Debug)]
pub struct Table {
    schema: SchemaRef,
    batches: Arc<Vec<RecordBatch>>,
}

impl Table {
    /// Build a table, re-stamping every batch with `schema`.
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> MedallionResult<Self> {
        let batches = batches
            .into_iter()
            .map(|b| RecordBatch::try_new(schema.clone(), b.columns().to_vec()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { schema, batches: Arc::new(batches) })
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self { schema, batches: Arc::new(Vec::new()) }
    }

    pub fn from_batch(batch: RecordBatch) -> Self {
        Self { schema: batch.schema(), batches: Arc::new(vec![batch]) }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.fields().iter().map(|f| f.name().clone()).collect()
    }

    /// Concatenate every batch into one.
    pub fn to_batch(&self) -> MedallionResult<RecordBatch> {
        Ok(concat_batches(&self.schema, self.batches.iter())?)
    }

    /// The full column named `name`, concatenated across batches.
    pub fn column(&self, name: &str) -> MedallionResult<ArrayRef> {
        let idx = self
            .schema
            .index_of(name)
            .map_err(|_| Error::Transformation(format!("missing expected column '{name}'")))?;
        Ok(self.to_batch()?.column(idx).clone())
    }

    /// Row-order-insensitive comparison for set-like tables.
    pub fn set_eq(&self, other: &Table) -> bool {
        let Some((left, right)) = self.aligned(other) else {
            return false;
        };
        if left.num_rows() != right.num_rows() {
            return false;
        }
        if left.num_columns() == 0 {
            return true;
        }
        let fields = left
            .schema()
            .fields()
            .iter()
            .map(|f| SortField::new(f.data_type().clone()))
            .collect();
        let Ok(converter) = RowConverter::new(fields) else {
            return false;
        };
        let encode = |batch: &RecordBatch| -> Option<Vec<Vec<u8>>> {
            let rows = converter.convert_columns(batch.columns()).ok()?;
            let mut encoded: Vec<Vec<u8>> = rows.iter().map(|r| r.as_ref().to_vec()).collect();
            encoded.sort();
            Some(encoded)
        };
        match (encode(&left), encode(&right)) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        }
    }

    /// Both tables as single batches with `other` projected onto this
    /// table's column order. `None` when the column sets differ.
    fn aligned(&self, other: &Table) -> Option<(RecordBatch, RecordBatch)> {
        if self.num_columns() != other.num_columns() {
            return None;
        }
        let mut indices = Vec::with_capacity(self.num_columns());
        for field in self.schema.fields() {
            let idx = other.schema.index_of(field.name()).ok()?;
            if other.schema.field(idx).data_type() != field.data_type() {
                return None;
            }
            indices.push(idx);
        }
        let left = self.to_batch().ok()?;
        let right = other.to_batch().ok()?.project(&indices).ok()?;
        Some((left, right))
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        let Some((left, right)) = self.aligned(other) else {
            return false;
        };
        left.num_rows() == right.num_rows()
            && left
                .columns()
                .iter()
                .zip(right.columns())
                .all(|(a, b)| a.to_data() == b.to_data())
    }
}
