//! Multi-step operations composed from the single-document primitives.
//!
//! Every composite call walks `Locate -> Mutate -> Resolve`, one round trip per step, against a
//! store that offers no transaction spanning them. Nothing is locked between steps:
//!
//! - the document matched by `Locate` is not re-verified before `Mutate`, so a concurrent delete
//!   makes `Mutate` touch nothing and the call reports `found: true` with `updated`/`deleted`
//!   set to `false`;
//! - a post-update re-fetch may observe writes from other clients, or nothing at all.
//!
//! Any step failing aborts the call with that error. Only a `Locate` miss is a normal outcome.

use crate::adapter::{DataApiResult, DataApiTransport};
use crate::client::CollectionClient;
use crate::identity::to_store_filter;
use crate::types::{
    Document, FindOneAndDeleteResult, FindOneAndUpdateResult, Query, ReturnDocument,
};
use tracing::debug;

enum UpdateStep {
    Locate,
    Mutate { snapshot: Document },
    Resolve { snapshot: Document, updated: bool },
}

enum DeleteStep {
    Locate,
    Mutate { snapshot: Document },
    Resolve { snapshot: Document, deleted: bool },
}

impl<T> CollectionClient<T>
where
    T: DataApiTransport,
{
    /// Locates the first match of `query.filter`, applies `query.update` to it with
    /// `update_one`, and returns the document chosen by `return_document`.
    ///
    /// A miss returns `found: false` without sending the update, even when `upsert` is set.
    pub async fn find_one_and_update(
        &self,
        query: &Query,
        return_document: ReturnDocument,
        upsert: bool,
    ) -> DataApiResult<FindOneAndUpdateResult> {
        let lookup = query.filter_only();
        let mut step = UpdateStep::Locate;

        loop {
            step = match step {
                UpdateStep::Locate => match self.find_one(&lookup).await? {
                    Some(snapshot) => UpdateStep::Mutate { snapshot },
                    None => {
                        debug!(
                            collection = %self.target().collection,
                            "find_one_and_update: no match"
                        );
                        return Ok(FindOneAndUpdateResult::not_found());
                    }
                },
                UpdateStep::Mutate { snapshot } => {
                    let updated = self.update_one(query, upsert).await?;
                    debug!(updated, "find_one_and_update: mutate finished");
                    UpdateStep::Resolve { snapshot, updated }
                }
                UpdateStep::Resolve { snapshot, updated } => {
                    let document = match return_document {
                        ReturnDocument::Before => Some(snapshot),
                        ReturnDocument::After => self.find_one(&lookup).await?,
                    };
                    return Ok(FindOneAndUpdateResult {
                        found: true,
                        updated,
                        document,
                    });
                }
            };
        }
    }

    /// Locates the first match of `query.filter`, deletes it with `delete_one`, and returns the
    /// located snapshot.
    pub async fn find_one_and_delete(&self, query: &Query) -> DataApiResult<FindOneAndDeleteResult> {
        let lookup = query.filter_only();
        let mut step = DeleteStep::Locate;

        loop {
            step = match step {
                DeleteStep::Locate => match self.find_one(&lookup).await? {
                    Some(snapshot) => DeleteStep::Mutate { snapshot },
                    None => {
                        debug!(
                            collection = %self.target().collection,
                            "find_one_and_delete: no match"
                        );
                        return Ok(FindOneAndDeleteResult::not_found());
                    }
                },
                DeleteStep::Mutate { snapshot } => {
                    let deleted = self.delete_one(&lookup).await?;
                    debug!(deleted, "find_one_and_delete: mutate finished");
                    DeleteStep::Resolve { snapshot, deleted }
                }
                DeleteStep::Resolve { snapshot, deleted } => {
                    return Ok(FindOneAndDeleteResult {
                        found: true,
                        deleted,
                        document: Some(snapshot),
                    });
                }
            };
        }
    }

    pub async fn find_by_id_and_update(
        &self,
        id: &str,
        update: Document,
        return_document: ReturnDocument,
        upsert: bool,
    ) -> DataApiResult<FindOneAndUpdateResult> {
        let query = Query::filter(to_store_filter(id)).with_update(update);
        self.find_one_and_update(&query, return_document, upsert).await
    }

    pub async fn find_by_id_and_delete(&self, id: &str) -> DataApiResult<FindOneAndDeleteResult> {
        self.find_one_and_delete(&Query::filter(to_store_filter(id))).await
    }
}
