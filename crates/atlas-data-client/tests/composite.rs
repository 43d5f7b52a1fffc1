mod support;

use atlas_data_client::{DataApiAction, DataApiError, Query, ReturnDocument};
use serde_json::json;
use support::{COLLECTION, DATABASE, client, doc, seeded};

fn bump_qty() -> Query {
    Query::filter(doc(json!({"sku": "a"}))).with_update(doc(json!({"$inc": {"qty": 1}})))
}

#[tokio::test(flavor = "current_thread")]
async fn find_one_and_update_returns_pre_update_snapshot_by_default() {
    let (mock, ids) = seeded(vec![json!({"sku": "a", "qty": 1})]);
    let client = client(&mock);

    let result = client
        .find_one_and_update(&bump_qty(), ReturnDocument::default(), false)
        .await
        .expect("composite update should succeed");

    assert!(result.found);
    assert!(result.updated);
    assert_eq!(
        result.document,
        Some(doc(json!({"id": ids[0], "sku": "a", "qty": 1})))
    );
    assert_eq!(
        mock.actions(),
        vec![DataApiAction::FindOne, DataApiAction::UpdateOne]
    );
    assert_eq!(mock.stored_documents(DATABASE, COLLECTION)[0]["qty"], json!(2));
}

#[tokio::test(flavor = "current_thread")]
async fn find_one_and_update_can_return_post_update_document() {
    let (mock, ids) = seeded(vec![json!({"sku": "a", "qty": 1})]);
    let client = client(&mock);

    let result = client
        .find_one_and_update(&bump_qty(), ReturnDocument::After, false)
        .await
        .unwrap();

    assert!(result.found);
    assert!(result.updated);
    assert_eq!(
        result.document,
        Some(doc(json!({"id": ids[0], "sku": "a", "qty": 2})))
    );
    assert_eq!(
        mock.actions(),
        vec![
            DataApiAction::FindOne,
            DataApiAction::UpdateOne,
            DataApiAction::FindOne
        ]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn find_one_and_update_locates_with_filter_only() {
    let (mock, _) = seeded(vec![json!({"sku": "a", "qty": 1})]);
    let client = client(&mock);

    client
        .find_one_and_update(&bump_qty(), ReturnDocument::After, true)
        .await
        .unwrap();

    let calls = mock.calls();
    assert_eq!(calls[0].body["filter"], json!({"sku": "a"}));
    assert!(calls[0].body.get("update").is_none());
    assert_eq!(calls[1].body["update"], json!({"$inc": {"qty": 1}}));
    assert_eq!(calls[1].body["upsert"], json!(true));
    assert_eq!(calls[2].body["filter"], json!({"sku": "a"}));
}

#[tokio::test(flavor = "current_thread")]
async fn find_one_and_update_miss_never_mutates() {
    let (mock, _) = seeded(vec![json!({"sku": "b", "qty": 1})]);
    let client = client(&mock);

    let result = client
        .find_one_and_update(&bump_qty(), ReturnDocument::After, true)
        .await
        .expect("a miss is not an error");

    assert!(!result.found);
    assert!(!result.updated);
    assert!(result.document.is_none());
    assert_eq!(mock.actions(), vec![DataApiAction::FindOne]);
    assert_eq!(mock.stored_documents(DATABASE, COLLECTION).len(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn find_one_and_update_reports_no_op_update() {
    let (mock, _) = seeded(vec![json!({"sku": "a", "qty": 1})]);
    let client = client(&mock);

    let query = Query::filter(doc(json!({"sku": "a"}))).with_update(doc(json!({"$set": {"qty": 1}})));
    let result = client
        .find_one_and_update(&query, ReturnDocument::Before, false)
        .await
        .unwrap();

    assert!(result.found);
    assert!(!result.updated);
    assert!(result.document.is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_delete_between_locate_and_mutate_is_reported() {
    let (mock, ids) = seeded(vec![json!({"sku": "a", "qty": 1})]);
    mock.delete_before(DataApiAction::UpdateOne, DATABASE, COLLECTION, &ids[0]);
    let client = client(&mock);

    let result = client
        .find_one_and_update(&bump_qty(), ReturnDocument::Before, false)
        .await
        .expect("the race is not an error");

    assert!(result.found);
    assert!(!result.updated);
    assert_eq!(
        result.document,
        Some(doc(json!({"id": ids[0], "sku": "a", "qty": 1})))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_delete_leaves_post_update_refetch_empty() {
    let (mock, ids) = seeded(vec![json!({"sku": "a", "qty": 1})]);
    mock.delete_before(DataApiAction::UpdateOne, DATABASE, COLLECTION, &ids[0]);
    let client = client(&mock);

    let result = client
        .find_one_and_update(&bump_qty(), ReturnDocument::After, false)
        .await
        .unwrap();

    assert!(result.found);
    assert!(!result.updated);
    assert!(result.document.is_none());
    assert_eq!(mock.actions().len(), 3);
}

#[tokio::test(flavor = "current_thread")]
async fn failing_mutate_step_aborts_with_its_error() {
    let (mock, _) = seeded(vec![json!({"sku": "a", "qty": 1})]);
    mock.fail_next(DataApiAction::UpdateOne, "socket closed");
    let client = client(&mock);

    let error = client
        .find_one_and_update(&bump_qty(), ReturnDocument::After, false)
        .await
        .expect_err("mutate failure must surface");

    assert!(matches!(error, DataApiError::Transport(message) if message == "socket closed"));
    assert_eq!(
        mock.actions(),
        vec![DataApiAction::FindOne, DataApiAction::UpdateOne]
    );
    assert_eq!(mock.stored_documents(DATABASE, COLLECTION)[0]["qty"], json!(1));
}

#[tokio::test(flavor = "current_thread")]
async fn find_one_and_delete_returns_deleted_snapshot() {
    let (mock, ids) = seeded(vec![
        json!({"status": "open", "n": 1}),
        json!({"status": "open", "n": 2}),
    ]);
    let client = client(&mock);

    let result = client
        .find_one_and_delete(&Query::filter(doc(json!({"status": "open"}))))
        .await
        .unwrap();

    assert!(result.found);
    assert!(result.deleted);
    assert_eq!(
        result.document,
        Some(doc(json!({"id": ids[0], "status": "open", "n": 1})))
    );
    assert_eq!(
        mock.actions(),
        vec![DataApiAction::FindOne, DataApiAction::DeleteOne]
    );
    let remaining = mock.stored_documents(DATABASE, COLLECTION);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["n"], json!(2));
}

#[tokio::test(flavor = "current_thread")]
async fn find_one_and_delete_miss_sends_no_delete() {
    let (mock, _) = seeded(vec![json!({"status": "closed"})]);
    let client = client(&mock);

    let result = client
        .find_one_and_delete(&Query::filter(doc(json!({"status": "open"}))))
        .await
        .unwrap();

    assert!(!result.found);
    assert!(!result.deleted);
    assert!(result.document.is_none());
    assert_eq!(mock.actions(), vec![DataApiAction::FindOne]);
}

#[tokio::test(flavor = "current_thread")]
async fn find_one_and_delete_reports_lost_race() {
    let (mock, ids) = seeded(vec![json!({"status": "open"})]);
    mock.delete_before(DataApiAction::DeleteOne, DATABASE, COLLECTION, &ids[0]);
    let client = client(&mock);

    let result = client
        .find_one_and_delete(&Query::filter(doc(json!({"status": "open"}))))
        .await
        .unwrap();

    assert!(result.found);
    assert!(!result.deleted);
    assert_eq!(
        result.document,
        Some(doc(json!({"id": ids[0], "status": "open"})))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn by_id_variants_filter_on_object_id() {
    let (mock, ids) = seeded(vec![
        json!({"sku": "a", "qty": 1}),
        json!({"sku": "b", "qty": 1}),
    ]);
    let client = client(&mock);

    let updated = client
        .find_by_id_and_update(
            &ids[1],
            doc(json!({"$set": {"qty": 9}})),
            ReturnDocument::After,
            false,
        )
        .await
        .unwrap();
    assert_eq!(
        updated.document,
        Some(doc(json!({"id": ids[1], "sku": "b", "qty": 9})))
    );
    assert!(
        mock.calls()
            .iter()
            .all(|call| call.body["filter"] == json!({"_id": {"$oid": ids[1]}}))
    );

    let deleted = client.find_by_id_and_delete(&ids[0]).await.unwrap();
    assert!(deleted.deleted);
    assert_eq!(deleted.document.unwrap()["sku"], json!("a"));

    let missing = client.find_by_id_and_delete(&ids[0]).await.unwrap();
    assert!(!missing.found);
}
