use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use async_trait::async_trait;
use medallion_utils::error::Error;
use medallion_utils::{ErrorKind, MedallionResult, Table};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::adapters::traits::{Metadata, ObjectMaterializer};
use crate::asset::key::AssetKey;
use crate::asset::materialization::Materialization;

/// Serialize `table` as an Arrow IPC file. Metadata lands in the footer.
pub fn encode(table: &Table, metadata: &Metadata) -> MedallionResult<Vec<u8>> {
    let schema = table.schema();
    let mut writer = FileWriter::try_new(Vec::new(), &schema)?;
    for (key, value) in metadata {
        writer.write_metadata(key.as_str(), value.to_string());
    }
    for batch in table.batches() {
        writer.write(batch)?;
    }
    writer.finish()?;
    Ok(writer.into_inner()?)
}

pub fn decode(bytes: &[u8]) -> MedallionResult<Table> {
    let reader = FileReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Table::new(schema, batches)
}

/// Artifacts as Arrow IPC files under `<root>/<bucket>/<key path>/<name>.arrow`.
pub struct FileObjectStore {
    root: PathBuf,
    bucket: String,
}

impl FileObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self { root: root.into(), bucket: bucket.into() }
    }

    pub fn path_for(&self, key: &AssetKey) -> PathBuf {
        let mut path = self.root.join(&self.bucket);
        for segment in &key.path {
            path.push(segment);
        }
        path.push(format!("{}.arrow", key.name));
        path
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "artifact path has no parent"))?;
        tokio::fs::create_dir_all(parent).await?;

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
        let tmp = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if written.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        written
    }
}

#[async_trait]
impl ObjectMaterializer for FileObjectStore {
    fn name(&self) -> &str {
        &self.bucket
    }

    fn location(&self, key: &AssetKey) -> String {
        self.path_for(key).display().to_string()
    }

    async fn store(&self, key: &AssetKey, table: &Table, metadata: &Metadata) -> MedallionResult<Materialization> {
        let path = self.path_for(key);
        let location = path.display().to_string();
        key.validate().map_err(|e| Error::materialization(&location, e))?;
        let bytes = encode(table, metadata).map_err(|e| e.within(ErrorKind::MaterializationError, &location))?;
        self.write_atomic(&path, &bytes)
            .await
            .map_err(|e| Error::materialization(&location, e))?;
        debug!(asset = %key, location = %location, bytes = bytes.len(), "artifact written");
        Ok(Materialization::new(key.clone(), location, table))
    }

    async fn load(&self, key: &AssetKey) -> MedallionResult<Table> {
        let path = self.path_for(key);
        let location = path.display().to_string();
        key.validate().map_err(|e| Error::materialization(&location, e))?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MaterializationNotFound(key.to_string()));
            }
            Err(e) => return Err(Error::materialization(location, e)),
        };
        decode(&bytes).map_err(|e| e.within(ErrorKind::MaterializationError, &location))
    }
}

/// Process-local object store. A quota makes oversized writes fail, which
/// tests use to exercise materialization errors.
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<HashMap<AssetKey, Arc<Vec<u8>>>>,
    quota: Option<usize>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), objects: RwLock::new(HashMap::new()), quota: None }
    }

    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn contains(&self, key: &AssetKey) -> bool {
        self.objects.read().map(|o| o.contains_key(key)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectMaterializer for MemoryObjectStore {
    fn name(&self) -> &str {
        &self.bucket
    }

    fn location(&self, key: &AssetKey) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }

    async fn store(&self, key: &AssetKey, table: &Table, metadata: &Metadata) -> MedallionResult<Materialization> {
        let location = self.location(key);
        let bytes = encode(table, metadata).map_err(|e| e.within(ErrorKind::MaterializationError, &location))?;
        if let Some(quota) = self.quota {
            if bytes.len() > quota {
                return Err(Error::materialization(
                    location,
                    format!("artifact of {} bytes exceeds quota of {quota}", bytes.len()),
                ));
            }
        }
        self.objects
            .write()
            .map_err(|e| Error::materialization(&location, e))?
            .insert(key.clone(), Arc::new(bytes));
        Ok(Materialization::new(key.clone(), location, table))
    }

    async fn load(&self, key: &AssetKey) -> MedallionResult<Table> {
        let location = self.location(key);
        let bytes = self
            .objects
            .read()
            .map_err(|e| Error::materialization(&location, e))?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::MaterializationNotFound(key.to_string()))?;
        decode(&bytes).map_err(|e| e.within(ErrorKind::MaterializationError, &location))
    }
}
