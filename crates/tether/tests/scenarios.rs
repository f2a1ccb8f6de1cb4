//! End-to-end scenarios: a store wired to a JSON:API upstream and a
//! SQLite backup through a coordinator.

use std::sync::Arc;

use serde_json::json;
use tether::{
    Coordinator, Error, JsonApiConfig, JsonApiSource, KeyMap, LocalStoreConfig, MockClient,
    Operation, QueryExpression, Queryable, RecordIdentity, RequestStrategy,
    RequestStrategyConfig, SqliteSource, Store, SyncStrategy, SyncStrategyConfig, Transform,
    Updatable,
};
use tether_testkit::{planet, solar_system_schema};

struct Rig {
    coordinator: Coordinator,
    store: Arc<Store>,
    backup: Arc<SqliteSource>,
    client: Arc<MockClient>,
}

/// Store, JSON:API upstream (mock transport), and SQLite backup, wired
/// with a blocking sync-results update strategy and a non-blocking backup
/// sync.
fn rig() -> Rig {
    let schema = solar_system_schema();
    let key_map = Arc::new(KeyMap::new());

    let store = Arc::new(Store::with_key_map("store", schema.clone(), key_map.clone()));
    let client = Arc::new(MockClient::new());
    let remote = Arc::new(JsonApiSource::new(
        "remote",
        schema,
        key_map,
        JsonApiConfig::default(),
        client.clone(),
    ));
    let backup = Arc::new(
        SqliteSource::open_memory("backup", LocalStoreConfig::default()).unwrap(),
    );

    let coordinator = Coordinator::new();
    coordinator.add_source("store", store.clone());
    coordinator.add_source("remote", remote);
    coordinator.add_source("backup", backup.clone());

    coordinator.add_strategy(Arc::new(RequestStrategy::new(
        RequestStrategyConfig::update("store", "remote")
            .blocking()
            .sync_results(),
    )));
    coordinator.add_strategy(Arc::new(RequestStrategy::new(
        RequestStrategyConfig::query("store", "remote")
            .blocking()
            .sync_results(),
    )));
    coordinator.add_strategy(Arc::new(SyncStrategy::new(SyncStrategyConfig::new(
        "store", "backup",
    ))));
    coordinator.activate().unwrap();

    Rig {
        coordinator,
        store,
        backup,
        client,
    }
}

async fn backup_contains(backup: &SqliteSource, identity: &RecordIdentity) -> bool {
    // Non-blocking sync lands on spawned tasks; give them a few turns.
    for _ in 0..64 {
        if backup.contains(identity).await.unwrap() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    false
}

#[tokio::test]
async fn add_record_with_upstream_success() {
    let r = rig();
    r.client.respond_with(
        201,
        Some(json!({
            "data": {
                "type": "planets",
                "id": "12345",
                "attributes": { "name": "Pluto", "classification": "gas giant" },
            }
        })),
    );

    r.store
        .update(Transform::from_operation(Operation::AddRecord {
            record: planet("pluto", "Pluto"),
        }))
        .await
        .unwrap();

    // The store holds the server-enriched record.
    let pluto = r
        .store
        .record(&RecordIdentity::new("planet", "pluto"))
        .expect("record in store");
    assert_eq!(pluto.attribute("name"), Some(&json!("Pluto")));
    assert_eq!(pluto.attribute("classification"), Some(&json!("gas giant")));
    assert_eq!(pluto.keys.get("remoteId"), Some(&"12345".to_string()));

    // The upstream saw exactly one create.
    let requests = r.client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "/planets");

    // The backup eventually holds the record.
    let identity = RecordIdentity::new("planet", "pluto");
    assert!(backup_contains(&r.backup, &identity).await);
    let stored = r.backup.record(&identity).await.unwrap().unwrap();
    assert_eq!(stored.attribute("name"), Some(&json!("Pluto")));
}

#[tokio::test]
async fn add_record_with_upstream_failure() {
    let r = rig();
    r.client.respond_with(
        422,
        Some(json!({
            "errors": [{ "detail": "Pluto isn't really a planet!" }]
        })),
    );

    let err = r
        .store
        .update(Transform::from_operation(Operation::AddRecord {
            record: planet("pluto", "Pluto"),
        }))
        .await
        .unwrap_err();

    match err {
        Error::Server { status, payload } => {
            assert_eq!(status, 422);
            assert_eq!(
                payload["errors"][0]["detail"],
                json!("Pluto isn't really a planet!")
            );
        }
        other => panic!("expected server error, got {other:?}"),
    }

    // The veto kept the record out of the store and the backup.
    let identity = RecordIdentity::new("planet", "pluto");
    assert!(!r.store.contains_record(&identity));
    assert!(!backup_contains(&r.backup, &identity).await);
}

#[tokio::test]
async fn query_pulls_records_through_the_upstream() {
    let r = rig();
    r.client.respond_with(
        200,
        Some(json!({
            "data": [
                { "type": "planets", "id": "1", "attributes": { "name": "Jupiter" } },
                { "type": "planets", "id": "2", "attributes": { "name": "Saturn" } },
            ]
        })),
    );

    let result = r
        .store
        .query(QueryExpression::Records {
            kind: "planet".to_string(),
        })
        .await
        .unwrap();

    // The fetch landed in the store before the local query evaluated.
    let records = result.records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(r.client.requests()[0].url, "/planets");

    // Fetched records are addressable by their remote ids on later
    // updates.
    let jupiter = records.iter().find(|p| p.keys["remoteId"] == "1").unwrap();
    assert_eq!(
        r.store.key_map().id_for_key("planet", "remoteId", "1"),
        Some(jupiter.id.clone())
    );
}

#[tokio::test]
async fn deactivation_stops_propagation() {
    let r = rig();
    r.coordinator.deactivate();

    // With strategies torn down the store applies locally and nothing
    // reaches the upstream or the backup.
    r.store
        .update(Transform::from_operation(Operation::AddRecord {
            record: planet("pluto", "Pluto"),
        }))
        .await
        .unwrap();

    let identity = RecordIdentity::new("planet", "pluto");
    assert!(r.store.contains_record(&identity));
    assert!(r.client.requests().is_empty());
    assert!(!backup_contains(&r.backup, &identity).await);
}
