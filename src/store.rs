//! Territory store - the only persistence boundary of the editor.
//!
//! The full territory list is written through to a [`KeyValueStore`] after each
//! mutation. A failed write rolls the in-memory change back.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::geometry::{Bounds, GeoPoint, Polygon};
use crate::plan::AiPlan;
use crate::session::{EditError, ValiditySignal, MIN_VERTICES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerritoryId(u64);

impl TerritoryId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TerritoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Territory {
    pub id: TerritoryId,
    #[serde(rename = "points")]
    pub polygon: Polygon,
    pub name: String,
    #[serde(default)]
    pub crop: Option<String>,
    #[serde(default)]
    pub planting_date: Option<NaiveDate>,
    #[serde(default)]
    pub soil_type: Option<String>,
    #[serde(default)]
    pub area_hectares: f64,
    #[serde(default)]
    pub ai_plan: Option<AiPlan>,
}

impl Territory {
    pub fn centroid(&self) -> Option<GeoPoint> {
        self.polygon.centroid()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.polygon.bounds()
    }

    fn refresh_area(&mut self) {
        self.area_hectares = self.polygon.area_hectares();
    }
}

/// A finalized ring plus the metadata entered for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTerritory {
    #[serde(rename = "points")]
    pub polygon: Polygon,
    pub name: String,
    #[serde(default)]
    pub crop: Option<String>,
    #[serde(default)]
    pub planting_date: Option<NaiveDate>,
    #[serde(default)]
    pub soil_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("territory {0} not found")]
    NotFound(TerritoryId),
    #[error("territory boundary rejected: {0}")]
    InvalidPolygon(EditError),
    #[error("stored territories share id {0}")]
    DuplicateId(TerritoryId),
    #[error("territory storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("territory payload is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// External string-keyed storage.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> io::Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> io::Result<()>;
}

/// One JSON document per key inside a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        let entries = self.entries.lock().expect("memory store lock poisoned");
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().expect("memory store lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct TerritoryStore {
    backend: Box<dyn KeyValueStore>,
    key: String,
    territories: Vec<Territory>,
    next_id: u64,
}

impl TerritoryStore {
    /// Load whatever list is stored under `key`; a missing key is an empty list.
    pub fn open(
        backend: impl KeyValueStore + 'static,
        key: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let key = key.into();
        let territories: Vec<Territory> = match backend.load(&key)? {
            Some(text) => serde_json::from_str(&text)?,
            None => Vec::new(),
        };
        let mut seen = HashSet::new();
        if let Some(duplicate) = territories.iter().find(|t| !seen.insert(t.id)) {
            return Err(StoreError::DuplicateId(duplicate.id));
        }
        let next_id = territories
            .iter()
            .map(|t| t.id.raw() + 1)
            .max()
            .unwrap_or(1);
        debug!(count = territories.len(), key = %key, "territories loaded");
        Ok(Self {
            backend: Box::new(backend),
            key,
            territories,
            next_id,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryStore::new()),
            key: "territories".to_string(),
            territories: Vec::new(),
            next_id: 1,
        }
    }

    pub fn list(&self) -> &[Territory] {
        &self.territories
    }

    pub fn get(&self, id: TerritoryId) -> Option<&Territory> {
        self.territories.iter().find(|t| t.id == id)
    }

    /// Save a new territory. The ring must be finalizable: at least three
    /// vertices and no self-crossing.
    pub fn create(&mut self, new: NewTerritory) -> Result<Territory, StoreError> {
        let signal = ValiditySignal::evaluate(new.polygon.points());
        if signal.vertex_count < MIN_VERTICES {
            return Err(StoreError::InvalidPolygon(EditError::InsufficientVertices {
                count: signal.vertex_count,
            }));
        }
        if signal.self_intersecting {
            return Err(StoreError::InvalidPolygon(EditError::SelfIntersecting));
        }

        let id = TerritoryId(self.next_id);
        let mut territory = Territory {
            id,
            polygon: new.polygon,
            name: new.name,
            crop: new.crop,
            planting_date: new.planting_date,
            soil_type: new.soil_type,
            area_hectares: 0.0,
            ai_plan: None,
        };
        territory.refresh_area();

        self.territories.push(territory.clone());
        if let Err(err) = self.flush() {
            self.territories.pop();
            return Err(err);
        }
        self.next_id += 1;
        info!(
            id = %id,
            name = %territory.name,
            area_hectares = territory.area_hectares,
            "territory created"
        );
        Ok(territory)
    }

    pub fn delete(&mut self, id: TerritoryId) -> Result<Territory, StoreError> {
        let index = self.index_of(id)?;
        let removed = self.territories.remove(index);
        if let Err(err) = self.flush() {
            self.territories.insert(index, removed);
            return Err(err);
        }
        info!(id = %id, "territory deleted");
        Ok(removed)
    }

    /// Apply `mutator` to a territory. The area is recomputed afterwards, so
    /// polygon edits never leave a stale value behind.
    pub fn update<F>(&mut self, id: TerritoryId, mutator: F) -> Result<Territory, StoreError>
    where
        F: FnOnce(&mut Territory),
    {
        let index = self.index_of(id)?;
        let mut updated = self.territories[index].clone();
        mutator(&mut updated);
        updated.id = id;
        updated.refresh_area();

        let previous = std::mem::replace(&mut self.territories[index], updated.clone());
        if let Err(err) = self.flush() {
            self.territories[index] = previous;
            return Err(err);
        }
        debug!(id = %id, area_hectares = updated.area_hectares, "territory updated");
        Ok(updated)
    }

    pub fn attach_plan(&mut self, id: TerritoryId, plan: AiPlan) -> Result<Territory, StoreError> {
        self.update(id, |territory| territory.ai_plan = Some(plan))
    }

    fn index_of(&self, id: TerritoryId) -> Result<usize, StoreError> {
        self.territories
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn flush(&self) -> Result<(), StoreError> {
        let payload = serde_json::to_string_pretty(&self.territories)?;
        self.backend.save(&self.key, &payload)?;
        Ok(())
    }
}
