use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use arrow::datatypes::DataType;
use medallion_utils::error::Error;
use medallion_utils::{MedallionResult, Table};
use serde::Serialize;

use crate::adapters::traits::{ObjectMaterializer, SourceExtractor, WarehouseLoader};
use crate::asset::key::{AssetKey, Layer};
use crate::transforms::traits::AssetTransform;

/// Which kind of adapter an asset is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AdapterKind {
    Source,
    Object,
    Warehouse,
}

impl AdapterKind {
    /// The only adapter kind an asset of `layer` may bind.
    pub fn for_layer(layer: Layer) -> Self {
        match layer {
            Layer::Source => AdapterKind::Source,
            Layer::Bronze | Layer::Silver | Layer::Gold => AdapterKind::Object,
            Layer::Warehouse => AdapterKind::Warehouse,
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterKind::Source => f.write_str("source"),
            AdapterKind::Object => f.write_str("object"),
            AdapterKind::Warehouse => f.write_str("warehouse"),
        }
    }
}

/// A declared warehouse column. `data_type: None` accepts any type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseColumn {
    pub name: String,
    pub data_type: Option<DataType>,
}

impl WarehouseColumn {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: None }
    }

    pub fn typed(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type: Some(data_type) }
    }
}

/// Target table of a warehouse asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseTarget {
    pub schema: String,
    pub table: String,
    pub columns: Vec<WarehouseColumn>,
}

impl WarehouseTarget {
    pub fn new<I, S>(schema: impl Into<String>, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: schema.into(),
            table: table.into(),
            columns: columns.into_iter().map(WarehouseColumn::named).collect(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<WarehouseColumn>) -> Self {
        self.columns = columns;
        self
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Validate `data` against the declared columns and project it into
    /// declaration order. The column sets must match exactly.
    pub fn conform(&self, data: &Table) -> MedallionResult<Table> {
        let target = self.qualified_name();
        let data_schema = data.schema();

        let declared: BTreeSet<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let actual: BTreeSet<&str> = data_schema.fields().iter().map(|f| f.name().as_str()).collect();
        if declared != actual {
            let missing: Vec<&str> = declared.difference(&actual).copied().collect();
            let unexpected: Vec<&str> = actual.difference(&declared).copied().collect();
            return Err(Error::load(
                target,
                format!("schema mismatch: missing {missing:?}, unexpected {unexpected:?}"),
            ));
        }

        let mut indices = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let idx = data_schema
                .index_of(&column.name)
                .map_err(|e| Error::load(&target, e))?;
            if let Some(expected) = &column.data_type {
                let found = data_schema.field(idx).data_type();
                if found != expected {
                    return Err(Error::load(
                        &target,
                        format!("column '{}' has type {found}, expected {expected}", column.name),
                    ));
                }
            }
            indices.push(idx);
        }

        let projected = Arc::new(data_schema.project(&indices).map_err(|e| Error::load(&target, e))?);
        let batches = data
            .batches()
            .iter()
            .map(|b| b.project(&indices))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::load(&target, e))?;
        Table::new(projected, batches).map_err(|e| Error::load(target, e))
    }
}

/// Typed binding from an asset to the adapter instance that serves it.
#[derive(Clone)]
pub enum AdapterRef {
    Source {
        extractor: Arc<dyn SourceExtractor>,
        query: String,
    },
    Object(Arc<dyn ObjectMaterializer>),
    Warehouse {
        loader: Arc<dyn WarehouseLoader>,
        target: WarehouseTarget,
    },
}

impl AdapterRef {
    pub fn source(extractor: Arc<dyn SourceExtractor>, query: impl Into<String>) -> Self {
        AdapterRef::Source { extractor, query: query.into() }
    }

    pub fn object(materializer: Arc<dyn ObjectMaterializer>) -> Self {
        AdapterRef::Object(materializer)
    }

    pub fn warehouse(loader: Arc<dyn WarehouseLoader>, target: WarehouseTarget) -> Self {
        AdapterRef::Warehouse { loader, target }
    }

    pub fn kind(&self) -> AdapterKind {
        match self {
            AdapterRef::Source { .. } => AdapterKind::Source,
            AdapterRef::Object(_) => AdapterKind::Object,
            AdapterRef::Warehouse { .. } => AdapterKind::Warehouse,
        }
    }
}

impl fmt::Debug for AdapterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterRef::Source { extractor, query } => f
                .debug_struct("Source")
                .field("extractor", &extractor.name())
                .field("query", query)
                .finish(),
            AdapterRef::Object(m) => f.debug_tuple("Object").field(&m.name()).finish(),
            AdapterRef::Warehouse { loader, target } => f
                .debug_struct("Warehouse")
                .field("loader", &loader.name())
                .field("target", &target.qualified_name())
                .finish(),
        }
    }
}

/// An immutable asset declaration. Built with [`crate::builder::AssetBuilder`].
#[derive(Clone)]
pub struct AssetDefinition {
    pub(crate) key: AssetKey,
    pub(crate) layer: Layer,
    pub(crate) upstream: BTreeSet<AssetKey>,
    pub(crate) transform: Arc<dyn AssetTransform>,
    pub(crate) adapter: AdapterRef,
    pub(crate) description: Option<String>,
}

impl AssetDefinition {
    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn upstream(&self) -> &BTreeSet<AssetKey> {
        &self.upstream
    }

    pub fn transform(&self) -> &Arc<dyn AssetTransform> {
        &self.transform
    }

    pub fn adapter(&self) -> &AdapterRef {
        &self.adapter
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Source assets are external: read through their extractor, never stored.
    pub fn is_external(&self) -> bool {
        self.adapter.kind() == AdapterKind::Source
    }
}

impl fmt::Debug for AssetDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetDefinition")
            .field("key", &self.key.to_string())
            .field("layer", &self.layer)
            .field("upstream", &self.upstream.iter().map(ToString::to_string).collect::<Vec<_>>())
            .field("adapter", &self.adapter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;

    fn summary() -> Table {
        let schema = Arc::new(Schema::new(vec![
            Field::new("total", DataType::Float64, true),
            Field::new("customer_id", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![10.0, 20.5])),
                Arc::new(StringArray::from(vec!["a", "b"])),
            ],
        )
        .unwrap();
        Table::from_batch(batch)
    }

    #[test]
    fn conform_projects_into_declared_order() {
        let target = WarehouseTarget::new("ecom", "summary", ["customer_id", "total"]);
        let conformed = target.conform(&summary()).unwrap();
        assert_eq!(conformed.column_names(), vec!["customer_id", "total"]);
        assert_eq!(conformed.num_rows(), 2);
        assert_eq!(conformed, summary());
    }

    #[test]
    fn conform_rejects_column_set_mismatch() {
        let target = WarehouseTarget::new("ecom", "summary", ["customer_id", "total", "churn"]);
        let err = target.conform(&summary()).unwrap_err();
        assert_eq!(err.kind(), medallion_utils::ErrorKind::LoadError);
        assert!(err.to_string().contains("churn"));
    }

    #[test]
    fn conform_rejects_type_mismatch() {
        let target = WarehouseTarget::new("ecom", "summary", Vec::<String>::new()).with_columns(vec![
            WarehouseColumn::named("customer_id"),
            WarehouseColumn::typed("total", DataType::Int64),
        ]);
        let err = target.conform(&summary()).unwrap_err();
        assert_eq!(err.kind(), medallion_utils::ErrorKind::LoadError);
    }

    #[test]
    fn layers_bind_one_adapter_kind() {
        assert_eq!(AdapterKind::for_layer(Layer::Source), AdapterKind::Source);
        assert_eq!(AdapterKind::for_layer(Layer::Silver), AdapterKind::Object);
        assert_eq!(AdapterKind::for_layer(Layer::Warehouse), AdapterKind::Warehouse);
    }
}
