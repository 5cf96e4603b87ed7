//! Persisted object configuration
//!
//! On disk the configuration is one JSON object mapping object id to that
//! object's `cfg`. Ephemeral objects never make it into the file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, Error};
use crate::model;
use crate::runtime::Runtime;
use crate::store::{ObjectId, ObjectStore};

/// Object configurations keyed by object id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree(BTreeMap<String, Value>);

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a tree from `path`; a missing file is an empty tree
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let value: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let Value::Object(map) = value else {
            return Err(ConfigError::NotAnObject);
        };

        tracing::info!(path = %path.display(), objects = map.len(), "Config loaded");
        Ok(Self(map.into_iter().collect()))
    }

    /// Write the tree to `path` as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(&self.0).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), objects = self.0.len(), "Config saved");
        Ok(())
    }

    /// Configurations of every non-ephemeral object in the store
    pub fn from_store(store: &ObjectStore) -> Self {
        Self(
            store
                .iter()
                .filter(|obj| !obj.ephemeral)
                .map(|obj| (obj.id().to_string(), obj.cfg.clone()))
                .collect(),
        )
    }

    /// Add the entries every installation needs
    pub fn ensure_defaults(&mut self) {
        self.0
            .entry(model::ROOT_ID.to_string())
            .or_insert_with(model::default_root_cfg);
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, cfg: Value) -> Option<Value> {
        self.0.insert(id.into(), cfg)
    }

    pub fn remove(&mut self, id: &str) -> Option<Value> {
        self.0.remove(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl Runtime {
    /// Create every object of `tree` under its stored id
    ///
    /// Ids that already exist are skipped. Returns how many objects were
    /// created.
    pub fn init_from_config(&mut self, tree: &ConfigTree) -> usize {
        let mut created = 0;
        for (id, cfg) in tree.iter() {
            match self.create(cfg.clone(), Some(ObjectId::from(id.as_str()))) {
                Ok(_) => created += 1,
                Err(Error::DuplicateId(id)) => {
                    tracing::warn!(obj = %id, "Skipping config entry for existing object");
                }
                Err(err) => {
                    tracing::warn!(obj = %id, error = %err, "Skipping config entry");
                }
            }
        }
        created
    }

    /// Current persisted configuration
    pub fn config_tree(&self) -> ConfigTree {
        ConfigTree::from_store(self.objects())
    }
}
