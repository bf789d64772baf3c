use async_trait::async_trait;
use medallion_utils::error::Error;
use medallion_utils::{MedallionResult, Table};
use std::collections::HashMap;

use crate::asset::key::AssetKey;

/// Freshly loaded upstream tables, keyed by the upstream asset.
#[derive(Debug, Clone, Default)]
pub struct AssetInputs(HashMap<AssetKey, Table>);

impl AssetInputs {
    pub fn new(inputs: HashMap<AssetKey, Table>) -> Self {
        Self(inputs)
    }

    pub fn get(&self, key: &AssetKey) -> MedallionResult<&Table> {
        self.0
            .get(key)
            .ok_or_else(|| Error::Transformation(format!("missing input '{key}'")))
    }

    /// Look an input up by its local name. Fails if the name is ambiguous.
    pub fn by_name(&self, name: &str) -> MedallionResult<&Table> {
        let mut matches = self.0.iter().filter(|(k, _)| k.name == name);
        match (matches.next(), matches.next()) {
            (Some((_, table)), None) => Ok(table),
            (Some(_), Some(_)) => Err(Error::Transformation(format!("ambiguous input name '{name}'"))),
            _ => Err(Error::Transformation(format!("missing input '{name}'"))),
        }
    }

    /// The only input of a single-upstream asset.
    pub fn single(&self) -> MedallionResult<&Table> {
        if self.0.len() != 1 {
            return Err(Error::Transformation(format!(
                "expected exactly one input, got {}",
                self.0.len()
            )));
        }
        self.0
            .values()
            .next()
            .ok_or_else(|| Error::Transformation("no inputs".to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> HashMap<AssetKey, Table> {
        self.0
    }
}

/// Business logic of one asset: upstream tables in, one table out.
#[async_trait]
pub trait AssetTransform: Send + Sync {
    async fn transform(&self, inputs: AssetInputs) -> MedallionResult<Table>;
}

/// Copies its single input unchanged. Bronze assets are raw copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl AssetTransform for Passthrough {
    async fn transform(&self, inputs: AssetInputs) -> MedallionResult<Table> {
        Ok(inputs.single()?.clone())
    }
}

/// Adapts a synchronous closure into an [`AssetTransform`].
pub struct FnTransform<F>(F);

impl<F> FnTransform<F>
where
    F: Fn(&AssetInputs) -> MedallionResult<Table> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> AssetTransform for FnTransform<F>
where
    F: Fn(&AssetInputs) -> MedallionResult<Table> + Send + Sync,
{
    async fn transform(&self, inputs: AssetInputs) -> MedallionResult<Table> {
        (self.0)(&inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::key::Layer;
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn input_table() -> Table {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int32, false)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![1, 2, 3]))]).unwrap();
        Table::from_batch(batch)
    }

    fn inputs() -> AssetInputs {
        let mut inputs = HashMap::new();
        inputs.insert(AssetKey::layered(Layer::Source, "ecom", "orders"), input_table());
        AssetInputs::new(inputs)
    }

    #[tokio::test]
    async fn passthrough_copies_single_input() {
        let result = Passthrough.transform(inputs()).await.unwrap();
        assert_eq!(result, input_table());
    }

    #[tokio::test]
    async fn passthrough_rejects_multiple_inputs() {
        let mut map = inputs().into_inner();
        map.insert(AssetKey::layered(Layer::Source, "ecom", "items"), input_table());
        let err = Passthrough.transform(AssetInputs::new(map)).await.unwrap_err();
        assert_eq!(err.kind(), medallion_utils::ErrorKind::TransformationError);
    }

    #[tokio::test]
    async fn closure_transform_reads_inputs_by_name() {
        let t = FnTransform::new(|inputs: &AssetInputs| Ok(inputs.by_name("orders")?.clone()));
        let result = t.transform(inputs()).await.unwrap();
        assert_eq!(result.num_rows(), 3);

        let missing = FnTransform::new(|inputs: &AssetInputs| Ok(inputs.by_name("payments")?.clone()));
        assert!(missing.transform(inputs()).await.is_err());
    }
}
