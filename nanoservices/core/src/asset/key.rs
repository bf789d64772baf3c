use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Medallion stage of an asset. The derived ordering is the dependency
/// ordering: an asset may only read from its own layer or earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Source,
    Bronze,
    Silver,
    Gold,
    Warehouse,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Source => "source",
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
            Layer::Warehouse => "warehouse",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid segment '{segment}' in asset key {key}")]
pub struct InvalidKey {
    pub key: String,
    pub segment: String,
}

/// Non-empty, not `.` or `..`, and free of path separators.
fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains(['/', '\\', '\0'])
}

/// Namespace path plus local name, e.g. `bronze/ecom/olist_orders_dataset_asset`.
/// Serialized as its display string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetKey {
    pub path: Vec<String>,
    pub name: String,
}

impl AssetKey {
    pub fn new<I, S>(path: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            name: name.into(),
        }
    }

    /// Key under the conventional `<layer>/<domain>` prefix.
    pub fn layered(layer: Layer, domain: &str, name: impl Into<String>) -> Self {
        Self::new([layer.as_str(), domain], name)
    }

    /// Parse `a/b/name`. The last segment is the name.
    pub fn parse(s: &str) -> Option<Self> {
        let mut segments: Vec<&str> = s.split('/').collect();
        let name = segments.pop()?;
        let key = Self::new(segments, name);
        key.validate().ok()?;
        Some(key)
    }

    /// Every segment must be usable as one storage path component, so that
    /// distinct keys never share an artifact.
    pub fn validate(&self) -> Result<(), InvalidKey> {
        match self.segments().find(|s| !valid_segment(s)) {
            Some(segment) => Err(InvalidKey { key: self.to_string(), segment: segment.to_string() }),
            None => Ok(()),
        }
    }

    /// Path segments followed by the name.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.name.as_str()))
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.path {
            write!(f, "{segment}/")?;
        }
        f.write_str(&self.name)
    }
}

impl Serialize for AssetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AssetKey::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid asset key '{raw}'")))
    }
}
