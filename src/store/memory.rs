use std::collections::HashMap;
use std::sync::RwLock;

use super::{Collection, Store};
use crate::error::Result;

struct Entry {
    id: String,
    project_id: Option<String>,
    body: String,
}

/// Process-lifetime store. Backs tests and `--storage memory` servers.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Entry>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn get_record(&self, collection: Collection, id: &str) -> Result<Option<String>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(&collection)
            .and_then(|entries| entries.iter().find(|e| e.id == id))
            .map(|e| e.body.clone()))
    }

    fn list_records(&self, collection: Collection, project_id: Option<&str>) -> Result<Vec<String>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = collections.get(&collection) else {
            return Ok(Vec::new());
        };

        Ok(entries
            .iter()
            .filter(|e| project_id.is_none() || e.project_id.as_deref() == project_id)
            .map(|e| e.body.clone())
            .collect())
    }

    fn put_record(
        &self,
        collection: Collection,
        id: &str,
        project_id: Option<&str>,
        body: &str,
    ) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let entries = collections.entry(collection).or_default();

        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.project_id = project_id.map(str::to_string);
                entry.body = body.to_string();
            }
            None => entries.push(Entry {
                id: id.to_string(),
                project_id: project_id.map(str::to_string),
                body: body.to_string(),
            }),
        }
        Ok(())
    }

    fn remove_record(&self, collection: Collection, id: &str) -> Result<bool> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = collections.get_mut(&collection) else {
            return Ok(false);
        };

        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() < before)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
