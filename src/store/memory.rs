use async_trait::async_trait;

use super::{Collection, Document, DocumentStore, StoreError};

/// In-process store seeded up front; used for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Vec<(Collection, Document)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(mut self, collection: Collection, document: Document) -> Self {
        self.insert(collection, document);
        self
    }

    pub fn insert(&mut self, collection: Collection, document: Document) {
        self.documents.push((collection, document));
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query_owned(
        &self,
        collection: Collection,
        owner: &str,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|(c, doc)| *c == collection && doc.owner() == Some(owner))
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_by_collection_and_owner() {
        let store = MemoryStore::new()
            .with_document(
                Collection::Items,
                Document::new("a").with_field("createdBy", "u1"),
            )
            .with_document(
                Collection::Lists,
                Document::new("b").with_field("createdBy", "u1"),
            )
            .with_document(
                Collection::Items,
                Document::new("c").with_field("createdBy", "u2"),
            );

        let docs = store.query_owned(Collection::Items, "u1").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a");

        let none = store.query_owned(Collection::Folders, "u1").await.unwrap();
        assert!(none.is_empty());
    }
}
