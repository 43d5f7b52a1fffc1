//! In-memory Data API for tests.
//!
//! Understands top-level field filters (plain equality, `$oid`, `$eq`, `$ne`, `$in`, `$nin`,
//! `$exists`, `$gt`, `$gte`, `$lt`, `$lte`), `$set`/`$unset`/`$inc` updates, sort, projection,
//! limit and skip. Ids are generated as 24-character hex strings and stored as plain strings, the
//! way the Data API renders them in `application/json` responses.

use crate::adapter::{DataApiAction, DataApiError, DataApiResult, DataApiTransport};
use crate::identity::{OBJECT_ID_KEY, STORE_ID_FIELD, identity_string};
use crate::types::{Document, DocumentId, json_kind};
use async_trait::async_trait;
use serde_json::{Map, Number, Value, json};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub action: DataApiAction,
    pub body: Value,
}

#[derive(Clone, Debug, Default)]
pub struct MockDataApi {
    inner: Arc<Mutex<MockDataApiState>>,
}

#[derive(Clone, Debug, Default)]
struct MockDataApiState {
    next_object_id: u64,
    collections: BTreeMap<(String, String), Vec<Document>>,
    calls: Vec<RecordedCall>,
    failures: Vec<(DataApiAction, String)>,
    races: Vec<PendingDelete>,
}

#[derive(Clone, Debug)]
struct PendingDelete {
    action: DataApiAction,
    database: String,
    collection: String,
    id: DocumentId,
}

impl MockDataApiState {
    fn allocate_object_id(&mut self) -> DocumentId {
        self.next_object_id += 1;
        format!("65f0{:020x}", self.next_object_id)
    }

    fn collection(&self, database: &str, collection: &str) -> &[Document] {
        self.collections
            .get(&(database.to_string(), collection.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn collection_mut(&mut self, database: &str, collection: &str) -> &mut Vec<Document> {
        self.collections
            .entry((database.to_string(), collection.to_string()))
            .or_default()
    }

    fn insert(
        &mut self,
        database: &str,
        collection: &str,
        mut document: Document,
    ) -> DataApiResult<DocumentId> {
        let id = match document.get(STORE_ID_FIELD) {
            Some(existing) => identity_string(existing).ok_or_else(|| {
                DataApiError::InvalidInput(format!("unsupported _id value: {existing}"))
            })?,
            None => self.allocate_object_id(),
        };
        if self
            .collection(database, collection)
            .iter()
            .any(|stored| stored.get(STORE_ID_FIELD) == Some(&Value::String(id.clone())))
        {
            return Err(DataApiError::InvalidInput(format!("duplicate key: {id}")));
        }
        document.insert(STORE_ID_FIELD.to_string(), Value::String(id.clone()));
        self.collection_mut(database, collection).push(document);
        Ok(id)
    }

    fn remove_by_id(&mut self, database: &str, collection: &str, id: &str) {
        self.collection_mut(database, collection)
            .retain(|document| document.get(STORE_ID_FIELD).and_then(Value::as_str) != Some(id));
    }
}

impl MockDataApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockDataApiState> {
        self.inner.lock().expect("mock data api mutex poisoned")
    }

    /// Stores `documents` directly, bypassing call recording. Returns their ids.
    pub fn seed(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Vec<DocumentId> {
        let mut state = self.state();
        documents
            .into_iter()
            .map(|document| {
                state
                    .insert(database, collection, document)
                    .expect("seed documents must be insertable")
            })
            .collect()
    }

    /// Documents as stored, with the store-native `_id` field.
    pub fn stored_documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.state().collection(database, collection).to_vec()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn actions(&self) -> Vec<DataApiAction> {
        self.state().calls.iter().map(|call| call.action).collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Makes the next `action` call fail with a transport error carrying `message`.
    pub fn fail_next(&self, action: DataApiAction, message: impl Into<String>) {
        self.state().failures.push((action, message.into()));
    }

    /// Deletes document `id` immediately before the next `action` call is applied, simulating
    /// another client racing this one.
    pub fn delete_before(&self, action: DataApiAction, database: &str, collection: &str, id: &str) {
        self.state().races.push(PendingDelete {
            action,
            database: database.to_string(),
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }
}

#[async_trait]
impl DataApiTransport for MockDataApi {
    async fn send(&self, action: DataApiAction, body: Value) -> DataApiResult<Value> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| DataApiError::Transport("mock data api mutex poisoned".to_string()))?;

        state.calls.push(RecordedCall {
            action,
            body: body.clone(),
        });

        if let Some(position) = state.failures.iter().position(|(a, _)| *a == action) {
            let (_, message) = state.failures.remove(position);
            return Err(DataApiError::Transport(message));
        }

        let request = MockRequest::parse(&body)?;

        if let Some(position) = state.races.iter().position(|race| race.action == action) {
            let race = state.races.remove(position);
            state.remove_by_id(&race.database, &race.collection, &race.id);
        }

        match action {
            DataApiAction::FindOne => find_one(&state, &request),
            DataApiAction::Find => find(&state, &request),
            DataApiAction::UpdateOne => update(&mut state, &request, false),
            DataApiAction::UpdateMany => update(&mut state, &request, true),
            DataApiAction::DeleteOne => delete(&mut state, &request, false),
            DataApiAction::DeleteMany => delete(&mut state, &request, true),
            DataApiAction::InsertOne => insert_one(&mut state, &request),
            DataApiAction::InsertMany => insert_many(&mut state, &request),
        }
    }
}

struct MockRequest<'a> {
    database: &'a str,
    collection: &'a str,
    body: &'a Map<String, Value>,
}

impl<'a> MockRequest<'a> {
    fn parse(body: &'a Value) -> DataApiResult<Self> {
        let body = body.as_object().ok_or_else(|| {
            DataApiError::InvalidInput("request body must be a JSON object".to_string())
        })?;
        let field = |key: &str| {
            body.get(key).and_then(Value::as_str).ok_or_else(|| {
                DataApiError::InvalidInput(format!("request body missing string field '{key}'"))
            })
        };
        field("dataSource")?;
        Ok(Self {
            database: field("database")?,
            collection: field("collection")?,
            body,
        })
    }

    fn object(&self, key: &str) -> DataApiResult<Option<&'a Document>> {
        match self.body.get(key) {
            None => Ok(None),
            Some(Value::Object(object)) => Ok(Some(object)),
            Some(other) => Err(DataApiError::InvalidInput(format!(
                "'{key}' must be an object, got {}",
                json_kind(other)
            ))),
        }
    }

    fn filter(&self) -> DataApiResult<Document> {
        Ok(self.object("filter")?.cloned().unwrap_or_default())
    }

    fn count(&self, key: &str) -> Option<usize> {
        self.body
            .get(key)
            .and_then(Value::as_u64)
            .map(|value| value as usize)
    }

    fn stored<'s>(&self, state: &'s MockDataApiState) -> &'s [Document] {
        state.collection(self.database, self.collection)
    }
}

fn find_one(state: &MockDataApiState, request: &MockRequest<'_>) -> DataApiResult<Value> {
    let filter = request.filter()?;
    let projection = request.object("projection")?;
    for document in request.stored(state) {
        if matches_filter(document, &filter)? {
            return Ok(json!({ "document": project(document, projection) }));
        }
    }
    Ok(json!({ "document": null }))
}

fn find(state: &MockDataApiState, request: &MockRequest<'_>) -> DataApiResult<Value> {
    let filter = request.filter()?;
    let mut matched = Vec::new();
    for document in request.stored(state) {
        if matches_filter(document, &filter)? {
            matched.push(document.clone());
        }
    }

    if let Some(sort) = request.object("sort")? {
        matched.sort_by(|left, right| compare_for_sort(left, right, sort));
    }

    let projection = request.object("projection")?;
    let skip = request.count("skip").unwrap_or(0);
    let limit = request.count("limit").filter(|limit| *limit > 0).unwrap_or(usize::MAX);
    let documents: Vec<Value> = matched
        .iter()
        .skip(skip)
        .take(limit)
        .map(|document| project(document, projection))
        .collect();
    Ok(json!({ "documents": documents }))
}

fn update(
    state: &mut MockDataApiState,
    request: &MockRequest<'_>,
    many: bool,
) -> DataApiResult<Value> {
    let filter = request.filter()?;
    let update = request.object("update")?.cloned().unwrap_or_default();
    let upsert = request.body.get("upsert").and_then(Value::as_bool).unwrap_or(false);

    let mut matched = 0_u64;
    let mut modified = 0_u64;
    for document in state.collection_mut(request.database, request.collection) {
        if !matches_filter(document, &filter)? {
            continue;
        }
        matched += 1;
        let next = apply_update(document, &update)?;
        if next != *document {
            modified += 1;
            *document = next;
        }
        if !many {
            break;
        }
    }

    let mut response = json!({ "matchedCount": matched, "modifiedCount": modified });
    if matched == 0 && upsert {
        let seeded = upsert_seed(&filter);
        let document = apply_update(&seeded, &update)?;
        let id = state.insert(request.database, request.collection, document)?;
        response["upsertedId"] = Value::String(id);
    }
    Ok(response)
}

fn delete(
    state: &mut MockDataApiState,
    request: &MockRequest<'_>,
    many: bool,
) -> DataApiResult<Value> {
    let filter = request.filter()?;
    let documents = state.collection_mut(request.database, request.collection);

    let mut doomed = Vec::new();
    for (index, document) in documents.iter().enumerate() {
        if matches_filter(document, &filter)? {
            doomed.push(index);
            if !many {
                break;
            }
        }
    }
    for index in doomed.iter().rev() {
        documents.remove(*index);
    }
    Ok(json!({ "deletedCount": doomed.len() }))
}

fn insert_one(state: &mut MockDataApiState, request: &MockRequest<'_>) -> DataApiResult<Value> {
    let document = request.object("document")?.cloned().ok_or_else(|| {
        DataApiError::InvalidInput("insertOne requires a 'document' object".to_string())
    })?;
    let id = state.insert(request.database, request.collection, document)?;
    Ok(json!({ "insertedId": id }))
}

fn insert_many(state: &mut MockDataApiState, request: &MockRequest<'_>) -> DataApiResult<Value> {
    let documents = request
        .body
        .get("documents")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            DataApiError::InvalidInput("insertMany requires a 'documents' array".to_string())
        })?;

    let mut inserted_ids = Vec::with_capacity(documents.len());
    for document in documents {
        let Value::Object(document) = document else {
            return Err(DataApiError::InvalidInput(
                "insertMany documents must be objects".to_string(),
            ));
        };
        inserted_ids.push(state.insert(request.database, request.collection, document.clone())?);
    }
    Ok(json!({ "insertedIds": inserted_ids }))
}

fn matches_filter(document: &Document, filter: &Document) -> DataApiResult<bool> {
    for (field, condition) in filter {
        if !matches_condition(document.get(field), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| !object.is_empty() && object.keys().all(|key| key.starts_with('$')))
}

fn matches_condition(actual: Option<&Value>, condition: &Value) -> DataApiResult<bool> {
    if !is_operator_object(condition) {
        return Ok(actual == Some(condition));
    }
    let Some(operators) = condition.as_object() else {
        return Ok(false);
    };

    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            OBJECT_ID_KEY | "$eq" => actual == Some(operand),
            "$ne" => actual != Some(operand),
            "$in" => operand_array(operator, operand)?
                .iter()
                .any(|candidate| actual == Some(candidate)),
            "$nin" => !operand_array(operator, operand)?
                .iter()
                .any(|candidate| actual == Some(candidate)),
            "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
            "$gt" | "$gte" | "$lt" | "$lte" => {
                match actual.and_then(|actual| compare_values(actual, operand)) {
                    Some(ordering) => match operator.as_str() {
                        "$gt" => ordering == Ordering::Greater,
                        "$gte" => ordering != Ordering::Less,
                        "$lt" => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
            other => {
                return Err(DataApiError::InvalidInput(format!(
                    "unsupported filter operator {other}"
                )));
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn operand_array<'a>(operator: &str, operand: &'a Value) -> DataApiResult<&'a Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| DataApiError::InvalidInput(format!("{operator} expects an array")))
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

fn compare_for_sort(left: &Document, right: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let ordering = match (left.get(field), right.get(field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(left), Some(right)) => compare_values(left, right).unwrap_or(Ordering::Equal),
        };
        let ordering = if direction.as_f64().is_some_and(|direction| direction < 0.0) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn apply_update(document: &Document, update: &Document) -> DataApiResult<Document> {
    let mut next = document.clone();
    for (operator, fields) in update {
        let Value::Object(fields) = fields else {
            return Err(DataApiError::InvalidInput(format!(
                "update operator {operator} expects an object"
            )));
        };
        if fields.contains_key(STORE_ID_FIELD) {
            return Err(DataApiError::InvalidInput(
                "the _id field is immutable".to_string(),
            ));
        }
        match operator.as_str() {
            "$set" => {
                for (field, value) in fields {
                    next.insert(field.clone(), value.clone());
                }
            }
            "$unset" => {
                for field in fields.keys() {
                    next.remove(field);
                }
            }
            "$inc" => {
                for (field, delta) in fields {
                    let current = next.get(field).cloned().unwrap_or_else(|| json!(0));
                    next.insert(field.clone(), add_numbers(field, &current, delta)?);
                }
            }
            other => {
                return Err(DataApiError::InvalidInput(format!(
                    "unsupported update operator {other}"
                )));
            }
        }
    }
    Ok(next)
}

fn add_numbers(field: &str, current: &Value, delta: &Value) -> DataApiResult<Value> {
    let (Value::Number(current), Value::Number(delta)) = (current, delta) else {
        return Err(DataApiError::InvalidInput(format!(
            "$inc on '{field}' requires numeric values"
        )));
    };
    if let (Some(current), Some(delta)) = (current.as_i64(), delta.as_i64()) {
        if let Some(sum) = current.checked_add(delta) {
            return Ok(Value::Number(sum.into()));
        }
    }
    let sum = current.as_f64().unwrap_or_default() + delta.as_f64().unwrap_or_default();
    Number::from_f64(sum).map(Value::Number).ok_or_else(|| {
        DataApiError::InvalidInput(format!("$inc on '{field}' produced a non-finite number"))
    })
}

/// Fields an upsert copies from its filter: plain equalities, `$eq` and `$oid` references.
fn upsert_seed(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (field, condition) in filter {
        if !is_operator_object(condition) {
            seed.insert(field.clone(), condition.clone());
            continue;
        }
        let value = condition
            .get(OBJECT_ID_KEY)
            .or_else(|| condition.get("$eq"))
            .cloned();
        if let Some(value) = value {
            seed.insert(field.clone(), value);
        }
    }
    seed
}

fn project(document: &Document, projection: Option<&Document>) -> Value {
    let Some(projection) = projection.filter(|projection| !projection.is_empty()) else {
        return Value::Object(document.clone());
    };

    let included = |value: &Value| value.as_i64() != Some(0) && value.as_bool() != Some(false);
    let inclusive = projection
        .iter()
        .any(|(field, value)| field != STORE_ID_FIELD && included(value));

    let mut projected = Document::new();
    for (field, value) in document {
        let keep = match projection.get(field) {
            Some(flag) => included(flag),
            None => !inclusive || field == STORE_ID_FIELD,
        };
        if keep {
            projected.insert(field.clone(), value.clone());
        }
    }
    Value::Object(projected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().expect("test document must be an object")
    }

    #[test]
    fn filter_supports_object_id_reference_and_comparisons() {
        let document = doc(json!({"_id": "65f0aa", "qty": 5, "tag": "a"}));

        assert!(matches_filter(&document, &doc(json!({"_id": {"$oid": "65f0aa"}}))).unwrap());
        assert!(matches_filter(&document, &doc(json!({"qty": {"$gte": 5, "$lt": 6}}))).unwrap());
        assert!(matches_filter(&document, &doc(json!({"tag": {"$in": ["a", "b"]}}))).unwrap());
        assert!(!matches_filter(&document, &doc(json!({"missing": {"$exists": true}}))).unwrap());
        assert!(!matches_filter(&document, &doc(json!({"qty": 6}))).unwrap());
        assert!(matches_filter(&document, &doc(json!({}))).unwrap());
    }

    #[test]
    fn filter_rejects_unknown_operators() {
        let error = matches_filter(&doc(json!({"a": 1})), &doc(json!({"a": {"$regex": "x"}})))
            .expect_err("unsupported operator");
        assert!(error.to_string().contains("$regex"));
    }

    #[test]
    fn apply_update_handles_set_unset_and_inc() {
        let document = doc(json!({"_id": "1", "a": 1, "b": "x", "n": 2}));
        let updated = apply_update(
            &document,
            &doc(json!({"$set": {"a": 10}, "$unset": {"b": ""}, "$inc": {"n": 3, "m": 1.5}})),
        )
        .unwrap();
        assert_eq!(updated, doc(json!({"_id": "1", "a": 10, "n": 5, "m": 1.5})));
    }

    #[test]
    fn apply_update_refuses_to_touch_id() {
        let error = apply_update(&doc(json!({"_id": "1"})), &doc(json!({"$set": {"_id": "2"}})))
            .expect_err("_id is immutable");
        assert!(matches!(error, DataApiError::InvalidInput(_)));
    }

    #[test]
    fn projection_includes_id_unless_excluded() {
        let document = doc(json!({"_id": "1", "a": 1, "b": 2}));
        assert_eq!(
            project(&document, Some(&doc(json!({"a": 1})))),
            json!({"_id": "1", "a": 1})
        );
        assert_eq!(
            project(&document, Some(&doc(json!({"a": 1, "_id": 0})))),
            json!({"a": 1})
        );
        assert_eq!(
            project(&document, Some(&doc(json!({"b": 0})))),
            json!({"_id": "1", "a": 1})
        );
    }

    #[test]
    fn upsert_seed_copies_equality_fields_only() {
        let seed = upsert_seed(&doc(json!({
            "sku": "x-1",
            "qty": {"$gt": 1},
            "_id": {"$oid": "65f0bb"}
        })));
        assert_eq!(seed, doc(json!({"sku": "x-1", "_id": "65f0bb"})));
    }

    #[test]
    fn generated_ids_look_like_object_ids() {
        let mock = MockDataApi::new();
        let ids = mock.seed("db", "c", vec![doc(json!({})), doc(json!({}))]);
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| id.len() == 24));
        assert_ne!(ids[0], ids[1]);
    }
}
