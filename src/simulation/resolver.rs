//! resolver.rs
//! Collaborators that supply graph models and forecast sheets, and the
//! library of fetched models a run instantiates from.

use crate::config::graph::{GraphModelDef, VersionedDependency};
use crate::error::{ErrorCode, Result, SimError};
use crate::param::Param;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why a collaborator could not hand out a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found")]
    Missing,
    #[error("trashed")]
    Trashed,
    #[error("{0}")]
    Other(String),
}

/// Source of graph model definitions.
pub trait ModelResolver: Send + Sync {
    fn fetch_model(&self, id: &str, version: &str) -> std::result::Result<GraphModelDef, FetchError>;
}

/// Monthly values of the variables of one forecast sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetProjection {
    variables: BTreeMap<String, BTreeMap<String, Param>>,
}

impl SheetProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, variable: impl Into<String>, date: impl Into<String>, value: Param) {
        self.variables.entry(variable.into()).or_default().insert(date.into(), value);
    }

    pub fn variable_value(&self, variable: &str, date: &str) -> Option<&Param> {
        self.variables.get(variable).and_then(|by_date| by_date.get(date))
    }
}

/// Source of forecast sheet projections.
pub trait ForecastResolver: Send + Sync {
    fn fetch_sheet(&self, id: &str, version: &str) -> std::result::Result<SheetProjection, FetchError>;
}

// --- In-memory collaborators ---

/// Models held in memory by (id, version), with optional trash markers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryModels {
    models: BTreeMap<(String, String), GraphModelDef>,
    trashed: BTreeSet<String>,
}

impl InMemoryModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `def` under its own object id at `version`.
    pub fn insert(&mut self, version: impl Into<String>, def: GraphModelDef) {
        self.models.insert((def.object_id.clone(), version.into()), def);
    }

    pub fn with(mut self, version: impl Into<String>, def: GraphModelDef) -> Self {
        self.insert(version, def);
        self
    }

    pub fn trash(&mut self, id: impl Into<String>) {
        self.trashed.insert(id.into());
    }
}

impl ModelResolver for InMemoryModels {
    fn fetch_model(&self, id: &str, version: &str) -> std::result::Result<GraphModelDef, FetchError> {
        if self.trashed.contains(id) {
            return Err(FetchError::Trashed);
        }
        self.models.get(&(id.to_string(), version.to_string())).cloned().ok_or(FetchError::Missing)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySheets {
    sheets: BTreeMap<(String, String), SheetProjection>,
    trashed: BTreeSet<String>,
}

impl InMemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, version: impl Into<String>, sheet: SheetProjection) {
        self.sheets.insert((id.into(), version.into()), sheet);
    }

    pub fn trash(&mut self, id: impl Into<String>) {
        self.trashed.insert(id.into());
    }
}

impl ForecastResolver for InMemorySheets {
    fn fetch_sheet(&self, id: &str, version: &str) -> std::result::Result<SheetProjection, FetchError> {
        if self.trashed.contains(id) {
            return Err(FetchError::Trashed);
        }
        self.sheets.get(&(id.to_string(), version.to_string())).cloned().ok_or(FetchError::Missing)
    }
}

/// Resolver for runs without forecast bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoForecasts;

impl ForecastResolver for NoForecasts {
    fn fetch_sheet(&self, _id: &str, _version: &str) -> std::result::Result<SheetProjection, FetchError> {
        Err(FetchError::Missing)
    }
}

// --- Model library ---

/// Every model a run may instantiate, by id and version.
#[derive(Debug, Clone, Default)]
pub struct GraphModelLibrary {
    models: BTreeMap<String, BTreeMap<String, Arc<GraphModelDef>>>,
}

impl GraphModelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, version: impl Into<String>, def: GraphModelDef) {
        self.models.entry(def.object_id.clone()).or_default().insert(version.into(), Arc::new(def));
    }

    pub fn get(&self, id: &str, version: &str) -> Option<Arc<GraphModelDef>> {
        self.models.get(id).and_then(|versions| versions.get(version)).cloned()
    }

    pub fn contains(&self, id: &str, version: &str) -> bool {
        self.models.get(id).is_some_and(|versions| versions.contains_key(version))
    }

    pub fn len(&self) -> usize {
        self.models.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn model_fetch_error(dep: &VersionedDependency, err: FetchError) -> SimError {
    let name = if dep.name.is_empty() { &dep.id } else { &dep.name };
    match err {
        FetchError::Missing => SimError::Resource {
            code: ErrorCode::GraphModelMissing,
            message: format!("failed to fetch graph model '{}'", name),
        },
        FetchError::Trashed => SimError::Resource {
            code: ErrorCode::GraphModelTrashed,
            message: format!("failed to fetch graph model '{}' because it is trashed", name),
        },
        FetchError::Other(detail) => SimError::Resource {
            code: ErrorCode::Exception,
            message: format!("failed to fetch graph model '{}': {}", name, detail),
        },
    }
}

fn sheet_fetch_error(dep: &VersionedDependency, err: FetchError) -> SimError {
    let name = if dep.name.is_empty() { &dep.id } else { &dep.name };
    match err {
        FetchError::Missing => SimError::Resource {
            code: ErrorCode::ForecastSheetMissing,
            message: format!("failed to fetch forecast sheet '{}'", name),
        },
        FetchError::Trashed => SimError::Resource {
            code: ErrorCode::ForecastSheetTrashed,
            message: format!("failed to fetch forecast sheet '{}' because it is trashed", name),
        },
        FetchError::Other(detail) => SimError::Resource {
            code: ErrorCode::Exception,
            message: format!("failed to fetch forecast sheet '{}': {}", name, detail),
        },
    }
}

/// Fetches `root` and every model it transitively nests.
///
/// Each (id, version) is fetched once, so self-referencing releases do not
/// loop here; instantiation depth is bounded separately.
pub fn fetch_model_tree(resolver: &dyn ModelResolver, root: VersionedDependency) -> Result<GraphModelLibrary> {
    let mut library = GraphModelLibrary::new();
    let mut pending = vec![root];
    while let Some(dep) = pending.pop() {
        if library.contains(&dep.id, &dep.version) {
            continue;
        }
        let def = resolver.fetch_model(&dep.id, &dep.version).map_err(|e| model_fetch_error(&dep, e))?;
        debug!(model = %dep.id, version = %dep.version, "fetched graph model");
        // Nested dependencies in reverse so they are fetched in declaration order
        pending.extend(def.sub_model_ids().into_iter().rev());
        library.insert(dep.version.clone(), GraphModelDef { object_id: dep.id.clone(), ..def });
    }
    Ok(library)
}

/// Forecast sheets by (id, version).
pub type SheetLibrary = BTreeMap<(String, String), SheetProjection>;

pub fn fetch_sheets(resolver: &dyn ForecastResolver, deps: &[VersionedDependency]) -> Result<SheetLibrary> {
    let mut sheets = SheetLibrary::new();
    for dep in deps {
        let key = (dep.id.clone(), dep.version.clone());
        if sheets.contains_key(&key) {
            continue;
        }
        let sheet = resolver.fetch_sheet(&dep.id, &dep.version).map_err(|e| sheet_fetch_error(dep, e))?;
        sheets.insert(key, sheet);
    }
    Ok(sheets)
}
