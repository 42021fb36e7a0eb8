// SPDX-License-Identifier: MIT OR Apache-2.0

//! Artifact store contract used to load external inputs and persist
//! external outputs of a run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::core::error::{OpFlowError, OpFlowResult};
use crate::core::operator::ArtifactRef;

/// Resolved, normalized store location
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactHandle {
    location: String,
}

impl ArtifactHandle {
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

/// What a location holds
#[derive(Debug, Clone)]
pub enum StoreEntry {
    Artifact(ArtifactRef),
    /// A container; never loadable as an input
    Folder,
}

impl StoreEntry {
    pub fn kind(&self) -> &str {
        match self {
            Self::Artifact(artifact) => artifact.kind(),
            Self::Folder => "folder",
        }
    }
}

pub trait ArtifactStore: Send + Sync {
    /// Turn a configured location string into a handle.
    fn resolve(&self, location: &str) -> OpFlowResult<ArtifactHandle>;

    /// `Ok(None)` when nothing is stored at `handle`.
    fn fetch(&self, handle: &ArtifactHandle) -> OpFlowResult<Option<StoreEntry>>;

    fn store(&self, artifact: ArtifactRef, handle: &ArtifactHandle) -> OpFlowResult<()>;
}

/// Normalize a `/`-separated location: collapse empty and `.` segments and
/// apply `..`. Fails on an empty location or one escaping the root.
pub fn normalize_location(location: &str) -> OpFlowResult<String> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return Err(OpFlowError::invalid_parameter(
            "Empty artifact location",
            "location",
        ));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(OpFlowError::invalid_parameter(
                        format!("Location '{trimmed}' escapes the store root"),
                        "location",
                    ));
                }
            }
            other => segments.push(other),
        }
    }
    let prefix = if trimmed.starts_with("//") { "//" } else { "/" };
    Ok(format!("{prefix}{}", segments.join("/")))
}

/// Mutex-protected map of location to entry; useful for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    entries: Mutex<HashMap<ArtifactHandle, StoreEntry>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `artifact` at `location`, resolving it first.
    pub fn insert(&self, location: &str, artifact: ArtifactRef) -> OpFlowResult<()> {
        let handle = self.resolve(location)?;
        self.store(artifact, &handle)
    }

    pub fn create_folder(&self, location: &str) -> OpFlowResult<()> {
        let handle = self.resolve(location)?;
        self.lock().insert(handle, StoreEntry::Folder);
        Ok(())
    }

    pub fn get(&self, location: &str) -> Option<ArtifactRef> {
        let handle = self.resolve(location).ok()?;
        match self.lock().get(&handle) {
            Some(StoreEntry::Artifact(artifact)) => Some(artifact.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ArtifactHandle, StoreEntry>> {
        self.entries.lock().expect("InMemoryArtifactStore mutex poisoned")
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn resolve(&self, location: &str) -> OpFlowResult<ArtifactHandle> {
        Ok(ArtifactHandle {
            location: normalize_location(location)?,
        })
    }

    fn fetch(&self, handle: &ArtifactHandle) -> OpFlowResult<Option<StoreEntry>> {
        Ok(self.lock().get(handle).cloned())
    }

    fn store(&self, artifact: ArtifactRef, handle: &ArtifactHandle) -> OpFlowResult<()> {
        let mut entries = self.lock();
        if let Some(StoreEntry::Folder) = entries.get(handle) {
            return Err(OpFlowError::store(
                "Cannot overwrite a folder with an artifact",
                handle.location(),
            ));
        }
        entries.insert(handle.clone(), StoreEntry::Artifact(artifact));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operator::Artifact;
    use std::any::Any;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Table;

    impl Artifact for Table {
        fn kind(&self) -> &str {
            "Table"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("/data//in/./a").unwrap(), "/data/in/a");
        assert_eq!(normalize_location("//Local/x/../y").unwrap(), "//Local/y");
        assert_eq!(normalize_location("rel/a").unwrap(), "/rel/a");
        assert!(normalize_location("  ").is_err());
        assert!(normalize_location("/a/../..").is_err());
    }

    #[test]
    fn test_store_and_fetch() {
        let store = InMemoryArtifactStore::new();
        store.insert("/data/in", Arc::new(Table)).unwrap();
        let handle = store.resolve("/data/./in").unwrap();
        match store.fetch(&handle).unwrap() {
            Some(StoreEntry::Artifact(artifact)) => assert_eq!(artifact.kind(), "Table"),
            other => panic!("unexpected entry {other:?}"),
        }
        let missing = store.resolve("/data/missing").unwrap();
        assert!(store.fetch(&missing).unwrap().is_none());
    }

    #[test]
    fn test_folder_is_not_overwritten() {
        let store = InMemoryArtifactStore::new();
        store.create_folder("/data").unwrap();
        let err = store.insert("/data", Arc::new(Table)).unwrap_err();
        assert!(matches!(err, OpFlowError::Store { .. }));
        assert!(store.get("/data").is_none());
        assert_eq!(store.len(), 1);
    }
}
