use crate::adapter::{
    DataApiAction, DataApiError, DataApiResult, DataApiTransport, ReqwestDataApiTransport,
};
use crate::config::DataApiConfig;
use crate::identity::{identity_string, to_public, to_store_filter};
use crate::types::{Document, DocumentId, Query, StoreTarget};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;

/// Data API client scoped to one (data source, database, collection).
///
/// Holds no state beyond its target and a cloneable transport handle.
#[derive(Clone, Debug)]
pub struct CollectionClient<T> {
    transport: T,
    target: StoreTarget,
}

impl<T> CollectionClient<T> {
    pub fn new(transport: T, target: StoreTarget) -> Self {
        Self { transport, target }
    }

    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl CollectionClient<ReqwestDataApiTransport> {
    pub fn from_config(
        config: &DataApiConfig,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> DataApiResult<Self> {
        config.validate()?;
        let transport = ReqwestDataApiTransport::new(config)?;
        Ok(Self::new(
            transport,
            StoreTarget::new(config.data_source.clone(), database, collection),
        ))
    }

    pub fn from_env(
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> DataApiResult<Self> {
        Self::from_config(&DataApiConfig::from_env()?, database, collection)
    }
}

/// Shared config and transport handing out per-collection clients.
#[derive(Clone, Debug)]
pub struct DataApiClient<T> {
    config: DataApiConfig,
    transport: T,
}

impl DataApiClient<ReqwestDataApiTransport> {
    pub fn connect(config: DataApiConfig) -> DataApiResult<Self> {
        config.validate()?;
        let transport = ReqwestDataApiTransport::new(&config)?;
        Ok(Self { config, transport })
    }

    pub fn connect_from_env() -> DataApiResult<Self> {
        Self::connect(DataApiConfig::from_env()?)
    }
}

impl<T: Clone> DataApiClient<T> {
    pub fn with_transport(config: DataApiConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &DataApiConfig {
        &self.config
    }

    pub fn collection(
        &self,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> CollectionClient<T> {
        CollectionClient::new(
            self.transport.clone(),
            StoreTarget::new(self.config.data_source.clone(), database, collection),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionRequest<'a> {
    data_source: &'a str,
    database: &'a str,
    collection: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Cow<'a, Document>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<Cow<'a, Document>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    projection: Option<&'a Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update: Option<Cow<'a, Document>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upsert: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<&'a Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    documents: Option<&'a [Document]>,
}

impl<'a> ActionRequest<'a> {
    fn new(target: &'a StoreTarget) -> Self {
        Self {
            data_source: &target.data_source,
            database: &target.database,
            collection: &target.collection,
            filter: None,
            sort: None,
            projection: None,
            limit: None,
            skip: None,
            update: None,
            upsert: None,
            document: None,
            documents: None,
        }
    }

    fn filtered(target: &'a StoreTarget, query: &'a Query) -> Self {
        Self {
            filter: Some(or_empty(query.filter.as_ref())),
            ..Self::new(target)
        }
    }
}

/// Recognized response fields; everything else the store sends is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionResponse {
    #[serde(default)]
    document: Option<Document>,
    #[serde(default)]
    documents: Option<Vec<Document>>,
    #[serde(default)]
    inserted_id: Option<Value>,
    #[serde(default)]
    inserted_ids: Option<Vec<Value>>,
    #[serde(default)]
    matched_count: Option<u64>,
    #[serde(default)]
    modified_count: Option<u64>,
    #[serde(default)]
    deleted_count: Option<u64>,
    #[serde(default)]
    upserted_id: Option<Value>,
}

fn or_empty(value: Option<&Document>) -> Cow<'_, Document> {
    value.map_or_else(|| Cow::Owned(Document::new()), Cow::Borrowed)
}

impl<T> CollectionClient<T>
where
    T: DataApiTransport,
{
    /// First document matching `query.filter`, or `None`.
    ///
    /// The `findOne` action takes no sort, so `query.sort` is not forwarded.
    pub async fn find_one(&self, query: &Query) -> DataApiResult<Option<Document>> {
        let request = ActionRequest {
            projection: query.projection.as_ref(),
            ..ActionRequest::filtered(&self.target, query)
        };
        let response = self.execute(DataApiAction::FindOne, &request).await?;
        Ok(response.document.map(to_public))
    }

    /// Matching documents in the order the store returns them.
    pub async fn find_many(&self, query: &Query) -> DataApiResult<Vec<Document>> {
        let request = ActionRequest {
            sort: Some(or_empty(query.sort.as_ref())),
            projection: query.projection.as_ref(),
            limit: query.limit,
            skip: query.skip,
            ..ActionRequest::filtered(&self.target, query)
        };
        let response = self.execute(DataApiAction::Find, &request).await?;
        Ok(response
            .documents
            .unwrap_or_default()
            .into_iter()
            .map(to_public)
            .collect())
    }

    pub async fn find_by_id(&self, id: &str) -> DataApiResult<Option<Document>> {
        self.find_one(&Query::filter(to_store_filter(id))).await
    }

    /// `true` when the store reports at least one modified document.
    pub async fn update_one(&self, query: &Query, upsert: bool) -> DataApiResult<bool> {
        self.update(DataApiAction::UpdateOne, query, upsert).await
    }

    pub async fn update_many(&self, query: &Query, upsert: bool) -> DataApiResult<bool> {
        self.update(DataApiAction::UpdateMany, query, upsert).await
    }

    /// `true` when the store reports at least one deleted document.
    pub async fn delete_one(&self, query: &Query) -> DataApiResult<bool> {
        self.delete(DataApiAction::DeleteOne, query).await
    }

    pub async fn delete_many(&self, query: &Query) -> DataApiResult<bool> {
        self.delete(DataApiAction::DeleteMany, query).await
    }

    /// Inserts `document` and returns the identity the store assigned.
    pub async fn insert_one(&self, document: Document) -> DataApiResult<DocumentId> {
        let request = ActionRequest {
            document: Some(&document),
            ..ActionRequest::new(&self.target)
        };
        let response = self.execute(DataApiAction::InsertOne, &request).await?;
        let inserted_id = response.inserted_id.ok_or_else(|| {
            DataApiError::UnexpectedResponse("insertOne response missing insertedId".to_string())
        })?;
        identity_string(&inserted_id).ok_or_else(|| {
            DataApiError::UnexpectedResponse(format!(
                "insertOne response has an unreadable insertedId: {inserted_id}"
            ))
        })
    }

    /// Inserts `document`, then re-fetches it by the assigned identity.
    ///
    /// The two round trips are not atomic: a delete landing in between yields `None`.
    pub async fn insert_one_returning(&self, document: Document) -> DataApiResult<Option<Document>> {
        let id = self.insert_one(document).await?;
        self.find_by_id(&id).await
    }

    /// Inserts all `documents` in one request and returns their identities in input order.
    pub async fn insert_many(&self, documents: Vec<Document>) -> DataApiResult<Vec<DocumentId>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let request = ActionRequest {
            documents: Some(&documents),
            ..ActionRequest::new(&self.target)
        };
        let response = self.execute(DataApiAction::InsertMany, &request).await?;
        let inserted_ids = response.inserted_ids.ok_or_else(|| {
            DataApiError::UnexpectedResponse("insertMany response missing insertedIds".to_string())
        })?;
        if inserted_ids.len() != documents.len() {
            return Err(DataApiError::UnexpectedResponse(format!(
                "insertMany returned {} ids for {} documents",
                inserted_ids.len(),
                documents.len()
            )));
        }

        inserted_ids
            .iter()
            .map(|value| {
                identity_string(value).ok_or_else(|| {
                    DataApiError::UnexpectedResponse(format!(
                        "insertMany response has an unreadable id: {value}"
                    ))
                })
            })
            .collect()
    }

    async fn update(
        &self,
        action: DataApiAction,
        query: &Query,
        upsert: bool,
    ) -> DataApiResult<bool> {
        let request = ActionRequest {
            update: Some(or_empty(query.update.as_ref())),
            upsert: Some(upsert),
            ..ActionRequest::filtered(&self.target, query)
        };
        let response = self.execute(action, &request).await?;
        debug!(
            %action,
            matched = response.matched_count.unwrap_or(0),
            modified = response.modified_count.unwrap_or(0),
            upserted = response.upserted_id.is_some(),
            "update applied"
        );
        Ok(response.modified_count.unwrap_or(0) > 0)
    }

    async fn delete(&self, action: DataApiAction, query: &Query) -> DataApiResult<bool> {
        let request = ActionRequest::filtered(&self.target, query);
        let response = self.execute(action, &request).await?;
        let deleted = response
            .deleted_count
            .or(response.modified_count)
            .unwrap_or(0);
        debug!(%action, deleted, "delete applied");
        Ok(deleted > 0)
    }

    async fn execute(
        &self,
        action: DataApiAction,
        request: &ActionRequest<'_>,
    ) -> DataApiResult<ActionResponse> {
        let body = serde_json::to_value(request).map_err(|err| {
            DataApiError::Serialization(format!("{action} request encode failed: {err}"))
        })?;

        debug!(
            %action,
            database = %self.target.database,
            collection = %self.target.collection,
            "data api request"
        );
        let payload = self.transport.send(action, body).await?;

        serde_json::from_value(payload).map_err(|err| {
            DataApiError::UnexpectedResponse(format!("{action} response decode failed: {err}"))
        })
    }
}
