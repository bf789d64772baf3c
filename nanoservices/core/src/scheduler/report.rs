use medallion_utils::ErrorKind;
use serde::Serialize;

use crate::asset::key::{AssetKey, Layer};
use crate::scheduler::state::{AssetState, RunStatus};

/// Why an asset failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Terminal outcome of one asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetOutcome {
    pub key: AssetKey,
    pub layer: Layer,
    pub state: AssetState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AssetError>,
    pub duration_ms: u64,
}

/// Every asset of a run, in topological order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub assets: Vec<AssetOutcome>,
}

impl RunReport {
    pub fn outcome(&self, key: &AssetKey) -> Option<&AssetOutcome> {
        self.assets.iter().find(|a| &a.key == key)
    }

    pub fn state_of(&self, key: &AssetKey) -> Option<AssetState> {
        self.outcome(key).map(|a| a.state)
    }

    pub fn count(&self, state: AssetState) -> usize {
        self.assets.iter().filter(|a| a.state == state).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssetOutcome> {
        self.assets.iter().filter(|a| a.state == AssetState::Failed)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_outcomes() {
        let key = AssetKey::layered(Layer::Bronze, "ecom", "orders");
        let report = RunReport {
            run_id: "run-1".to_string(),
            status: RunStatus::Failed,
            duration_ms: 12,
            assets: vec![AssetOutcome {
                key: key.clone(),
                layer: Layer::Bronze,
                state: AssetState::Failed,
                row_count: None,
                location: None,
                error: Some(AssetError {
                    kind: ErrorKind::ExtractionError,
                    message: "no such table".to_string(),
                }),
                duration_ms: 3,
            }],
        };

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["assets"][0]["key"], "bronze/ecom/orders");
        assert_eq!(value["assets"][0]["state"], "failed");
        assert_eq!(value["assets"][0]["error"]["kind"], "ExtractionError");
        assert!(value["assets"][0].get("row_count").is_none());

        assert_eq!(report.state_of(&key), Some(AssetState::Failed));
        assert_eq!(report.count(AssetState::Failed), 1);
    }
}
