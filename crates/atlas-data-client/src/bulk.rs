use crate::adapter::{DataApiResult, DataApiTransport};
use crate::client::CollectionClient;
use crate::types::{Document, DocumentId, MaterializeStrategy};
use futures::future::join_all;
use tracing::debug;

impl<T> CollectionClient<T>
where
    T: DataApiTransport,
{
    /// Bulk-inserts `documents`, then fetches each one back by identity.
    ///
    /// Costs one insert plus one lookup per document. Results follow the order of the
    /// identities the store returned; `None` marks a document gone by the time it was fetched.
    pub async fn insert_many_returning(
        &self,
        documents: Vec<Document>,
        strategy: MaterializeStrategy,
    ) -> DataApiResult<Vec<Option<Document>>> {
        let ids = self.insert_many(documents).await?;
        self.materialize(&ids, strategy).await
    }

    /// Fetches the documents behind `ids`, keeping `ids` order.
    pub async fn materialize(
        &self,
        ids: &[DocumentId],
        strategy: MaterializeStrategy,
    ) -> DataApiResult<Vec<Option<Document>>> {
        debug!(count = ids.len(), ?strategy, "materializing inserted documents");

        let documents = match strategy {
            MaterializeStrategy::Concurrent if ids.len() > 1 => {
                let lookups = ids.iter().map(|id| self.find_by_id(id));
                join_all(lookups)
                    .await
                    .into_iter()
                    .collect::<DataApiResult<Vec<_>>>()?
            }
            _ => {
                let mut documents = Vec::with_capacity(ids.len());
                for id in ids {
                    documents.push(self.find_by_id(id).await?);
                }
                documents
            }
        };

        let missing = documents.iter().filter(|document| document.is_none()).count();
        if missing > 0 {
            debug!(missing, "inserted documents vanished before materialization");
        }
        Ok(documents)
    }
}
