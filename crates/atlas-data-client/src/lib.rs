#![doc = r#"
Collection client for the MongoDB Atlas Data API.

Operation mapping:

| Client method | Data API action | Round trips |
| --- | --- | --- |
| `CollectionClient::find_one` | `POST .../action/findOne` | 1 |
| `CollectionClient::find_many` | `POST .../action/find` | 1 |
| `CollectionClient::find_by_id` | `findOne` with `{"_id": {"$oid": id}}` | 1 |
| `CollectionClient::update_one` / `update_many` | `updateOne` / `updateMany` | 1 |
| `CollectionClient::delete_one` / `delete_many` | `deleteOne` / `deleteMany` | 1 |
| `CollectionClient::insert_one` | `insertOne` | 1 |
| `CollectionClient::insert_one_returning` | `insertOne` + `findOne` | 2 |
| `CollectionClient::insert_many` | `insertMany` | 1 |
| `CollectionClient::insert_many_returning` | `insertMany` + one `findOne` per id | 1 + N |
| `CollectionClient::find_one_and_update` | `findOne` + `updateOne` (+ `findOne` for `ReturnDocument::After`) | 2-3 |
| `CollectionClient::find_one_and_delete` | `findOne` + `deleteOne` | 2 |
| `CollectionClient::find_by_id_and_update` / `find_by_id_and_delete` | as above, filtered by `$oid` | 2-3 |

Implementation notes:
- Documents leave the client with `id`, never `_id`; see [`identity`].
- Missing `filter`, `sort` and `update` are sent as `{}`.
- Zero matched/modified/deleted is `false` or `None`, never an error.
- Multi-step operations are not atomic. No locks, transactions or version checks are used between
  steps; see [`composite`] for what a concurrent writer can do to a call in flight.
- Nothing is retried. [`DataApiError::is_retryable`] tells callers which failures are worth it.
"#]

pub mod adapter;
pub mod bulk;
pub mod client;
pub mod composite;
pub mod config;
pub mod identity;
pub mod testing;
pub mod types;

pub use adapter::{
    API_KEY_HEADER, DATA_API_ACTION_PATH, DataApiAction, DataApiError, DataApiResult,
    DataApiTransport, ReqwestDataApiTransport, action_endpoint,
};
pub use client::{CollectionClient, DataApiClient};
pub use config::DataApiConfig;
pub use identity::{PUBLIC_ID_FIELD, STORE_ID_FIELD, to_public, to_store_filter};
pub use testing::{MockDataApi, RecordedCall};
pub use types::{
    Document, DocumentId, FindOneAndDeleteResult, FindOneAndUpdateResult, MaterializeStrategy,
    Query, ReturnDocument, StoreTarget, into_document,
};
