use std::collections::BTreeSet;
use std::sync::Arc;

use crate::asset::definition::{AdapterKind, AdapterRef, AssetDefinition};
use crate::asset::key::{AssetKey, InvalidKey, Layer};
use crate::dag::resolver::DagError;
use crate::transforms::traits::{AssetTransform, Passthrough};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("asset {0} has no layer")]
    NoLayer(AssetKey),
    #[error("asset {0} has no transform")]
    NoTransform(AssetKey),
    #[error("asset {0} has no adapter")]
    NoAdapter(AssetKey),
    #[error("asset {key} in layer {layer} cannot bind a {adapter} adapter")]
    AdapterMismatch {
        key: AssetKey,
        layer: Layer,
        adapter: AdapterKind,
    },
    #[error("source asset {0} cannot declare upstream assets")]
    SourceWithUpstream(AssetKey),
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),
    #[error("registration failed: {0}")]
    DagError(#[from] DagError),
}

/// Assembles one immutable [`AssetDefinition`].
///
/// ```no_run
/// # use std::sync::Arc;
/// # use medallion_core::adapters::object::MemoryObjectStore;
/// # use medallion_core::asset::definition::AdapterRef;
/// # use medallion_core::asset::key::{AssetKey, Layer};
/// # use medallion_core::builder::AssetBuilder;
/// # use medallion_core::transforms::traits::Passthrough;
/// let objects = Arc::new(MemoryObjectStore::new("datalake"));
/// let bronze = AssetBuilder::new(AssetKey::layered(Layer::Bronze, "ecom", "orders"))
///     .layer(Layer::Bronze)
///     .upstream(AssetKey::layered(Layer::Source, "ecom", "orders"))
///     .transform(Passthrough)
///     .adapter(AdapterRef::object(objects))
///     .build()
///     .unwrap();
/// ```
pub struct AssetBuilder {
    key: AssetKey,
    layer: Option<Layer>,
    upstream: BTreeSet<AssetKey>,
    transform: Option<Arc<dyn AssetTransform>>,
    adapter: Option<AdapterRef>,
    description: Option<String>,
}

impl AssetBuilder {
    pub fn new(key: AssetKey) -> Self {
        Self {
            key,
            layer: None,
            upstream: BTreeSet::new(),
            transform: None,
            adapter: None,
            description: None,
        }
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn upstream(mut self, key: AssetKey) -> Self {
        self.upstream.insert(key);
        self
    }

    pub fn upstreams(mut self, keys: impl IntoIterator<Item = AssetKey>) -> Self {
        self.upstream.extend(keys);
        self
    }

    pub fn transform(mut self, transform: impl AssetTransform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn adapter(mut self, adapter: AdapterRef) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn build(self) -> Result<AssetDefinition, BuildError> {
        self.key.validate()?;
        for upstream in &self.upstream {
            upstream.validate()?;
        }
        let layer = self.layer.ok_or_else(|| BuildError::NoLayer(self.key.clone()))?;
        let adapter = self.adapter.ok_or_else(|| BuildError::NoAdapter(self.key.clone()))?;

        if adapter.kind() != AdapterKind::for_layer(layer) {
            return Err(BuildError::AdapterMismatch {
                key: self.key,
                layer,
                adapter: adapter.kind(),
            });
        }

        // Source assets are external and never run a transform of their own.
        let transform: Arc<dyn AssetTransform> = match (layer, self.transform) {
            (Layer::Source, _) if !self.upstream.is_empty() => {
                return Err(BuildError::SourceWithUpstream(self.key));
            }
            (Layer::Source, t) => t.unwrap_or_else(|| Arc::new(Passthrough)),
            (_, Some(t)) => t,
            (_, None) => return Err(BuildError::NoTransform(self.key)),
        };

        Ok(AssetDefinition {
            key: self.key,
            layer,
            upstream: self.upstream,
            transform,
            adapter,
            description: self.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::object::MemoryObjectStore;
    use crate::adapters::traits::SourceExtractor;
    use async_trait::async_trait;
    use medallion_utils::{MedallionResult, Table};

    struct NoopSource;

    #[async_trait]
    impl SourceExtractor for NoopSource {
        fn name(&self) -> &str { "noop" }
        async fn extract(&self, _query: &str) -> MedallionResult<Table> {
            Err(medallion_utils::error::Error::extraction("unreachable"))
        }
    }

    fn source_key() -> AssetKey {
        AssetKey::layered(Layer::Source, "ecom", "orders")
    }

    #[test]
    fn builder_creates_bronze_definition() {
        let objects = Arc::new(MemoryObjectStore::new("lake"));
        let def = AssetBuilder::new(AssetKey::layered(Layer::Bronze, "ecom", "orders"))
            .layer(Layer::Bronze)
            .upstream(source_key())
            .transform(Passthrough)
            .adapter(AdapterRef::object(objects))
            .description("raw copy of orders")
            .build()
            .unwrap();

        assert_eq!(def.layer(), Layer::Bronze);
        assert!(def.upstream().contains(&source_key()));
        assert_eq!(def.adapter().kind(), AdapterKind::Object);
        assert_eq!(def.description(), Some("raw copy of orders"));
        assert!(!def.is_external());
    }

    #[test]
    fn source_assets_need_no_transform() {
        let def = AssetBuilder::new(source_key())
            .layer(Layer::Source)
            .adapter(AdapterRef::source(Arc::new(NoopSource), "SELECT * FROM orders"))
            .build()
            .unwrap();
        assert!(def.is_external());
    }

    #[test]
    fn builder_requires_transform_outside_source_layer() {
        let objects = Arc::new(MemoryObjectStore::new("lake"));
        let result = AssetBuilder::new(AssetKey::layered(Layer::Silver, "ecom", "orders"))
            .layer(Layer::Silver)
            .adapter(AdapterRef::object(objects))
            .build();
        assert!(matches!(result, Err(BuildError::NoTransform(_))));
    }

    #[test]
    fn builder_rejects_adapter_for_wrong_layer() {
        let result = AssetBuilder::new(AssetKey::layered(Layer::Gold, "ecom", "summary"))
            .layer(Layer::Gold)
            .transform(Passthrough)
            .adapter(AdapterRef::source(Arc::new(NoopSource), "SELECT 1"))
            .build();
        assert!(matches!(result, Err(BuildError::AdapterMismatch { .. })));
    }

    #[test]
    fn source_assets_cannot_have_upstream() {
        let result = AssetBuilder::new(source_key())
            .layer(Layer::Source)
            .upstream(AssetKey::layered(Layer::Source, "ecom", "other"))
            .adapter(AdapterRef::source(Arc::new(NoopSource), "SELECT 1"))
            .build();
        assert!(matches!(result, Err(BuildError::SourceWithUpstream(_))));
    }

    #[test]
    fn builder_rejects_keys_that_escape_their_namespace() {
        let objects = Arc::new(MemoryObjectStore::new("lake"));
        let result = AssetBuilder::new(AssetKey::new(["bronze"], "ecom/orders"))
            .layer(Layer::Bronze)
            .upstream(source_key())
            .transform(Passthrough)
            .adapter(AdapterRef::object(objects.clone()))
            .build();
        assert!(matches!(result, Err(BuildError::InvalidKey(_))));

        let result = AssetBuilder::new(AssetKey::new(["bronze", ".."], "orders"))
            .layer(Layer::Bronze)
            .upstream(source_key())
            .transform(Passthrough)
            .adapter(AdapterRef::object(objects))
            .build();
        assert!(matches!(result, Err(BuildError::InvalidKey(_))));
    }
}
