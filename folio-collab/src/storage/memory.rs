use std::collections::HashMap;
use std::sync::RwLock;

use folio_core::Document;
use uuid::Uuid;

use super::{DocumentRepository, StoreError};

/// Document rows held in a map.
#[derive(Debug, Default)]
pub struct MemoryDocumentRepository {
    rows: RwLock<HashMap<Uuid, Document>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::DatabaseError("document map lock poisoned".to_string())
}

impl DocumentRepository for MemoryDocumentRepository {
    fn load(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.rows.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    fn save(&self, document: &Document) -> Result<(), StoreError> {
        self.rows
            .write()
            .map_err(|_| poisoned())?
            .insert(document.id, document.clone());
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .write()
            .map_err(|_| poisoned())?
            .remove(&id)
            .is_some())
    }

    fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .rows
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect())
    }
}
