use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::data::filter::Conditions;
use crate::data::store::ChannelStore;

// ---------------------------------------------------------------------------
// Persisted pack configuration
// ---------------------------------------------------------------------------

/// Channel names and the condition recipe, saved next to a data file.
///
/// ```json
/// {
///   "names": { "0": "time", "1": "pressure" },
///   "conditions": { "cond": ["%('pressure') > 2"], "samplerate": 10.0 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    pub names: BTreeMap<usize, String>,
    pub conditions: Conditions,
}

impl PackConfig {
    /// Snapshot the name table of `store` together with `conditions`.
    pub fn from_store(store: &ChannelStore, conditions: &Conditions) -> Self {
        Self {
            names: store.names().clone(),
            conditions: conditions.clone(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, text)
            .with_context(|| format!("writing config {}", path.display()))?;
        info!("saved config to {}", path.display());
        Ok(())
    }

    /// Install the names (when any are stored) and the mask the
    /// conditions produce.
    pub fn apply(&self, store: &mut ChannelStore) -> crate::Result<()> {
        if !self.names.is_empty() {
            store.set_names(self.names.clone());
        }
        store.apply_conditions(&self.conditions)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::Category;
    use crate::mask::duration::DurationRule;

    #[test]
    fn round_trips_through_a_file() {
        let mut conditions = Conditions::new();
        conditions.add(Category::Cond, "%('p') > 2").unwrap();
        conditions.duration = Some(DurationRule::min(0.5).unwrap());
        conditions.samplerate = 10.0;
        let config = PackConfig {
            names: BTreeMap::from([(0, "t".to_string()), (1, "p".to_string())]),
            conditions,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.json");
        config.save(&path).unwrap();
        assert_eq!(PackConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_sections_default() {
        let config: PackConfig = serde_json::from_str(r#"{"names": {"2": "speed"}}"#).unwrap();
        assert_eq!(config.names[&2], "speed");
        assert!(config.conditions.is_empty());
        assert_eq!(config.conditions.samplerate, 1.0);
    }
}
