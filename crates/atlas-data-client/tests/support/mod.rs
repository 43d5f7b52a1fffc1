#![allow(dead_code)]

use atlas_data_client::{CollectionClient, Document, MockDataApi, StoreTarget};
use serde_json::Value;

pub const DATA_SOURCE: &str = "Cluster0";
pub const DATABASE: &str = "shop";
pub const COLLECTION: &str = "orders";

pub fn doc(value: Value) -> Document {
    value
        .as_object()
        .cloned()
        .expect("test document must be a JSON object")
}

pub fn client(mock: &MockDataApi) -> CollectionClient<MockDataApi> {
    CollectionClient::new(
        mock.clone(),
        StoreTarget::new(DATA_SOURCE, DATABASE, COLLECTION),
    )
}

pub fn seeded(documents: Vec<Value>) -> (MockDataApi, Vec<String>) {
    let mock = MockDataApi::new();
    let ids = mock.seed(
        DATABASE,
        COLLECTION,
        documents.into_iter().map(doc).collect(),
    );
    (mock, ids)
}
