#![allow(clippy::unwrap_used)]
// End-to-end controller tests. The HTTP flow runs against wiremock (one
// server plays both the cloud and the device); lifecycle bookkeeping runs
// against the recording fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use mystrom_core::namespace::{APP_ID, CONNECTION};
use mystrom_core::{
    DetailFetchPolicy, DispatchOutcome, MemoryStore, StateStore, StateValue, SyncConfig,
    SyncController, SyncState,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{FakeCloud, FakeLocal, config, record};

// ── Helpers ─────────────────────────────────────────────────────────

fn quiet_config() -> SyncConfig {
    let mut config = config();
    config.settle_delay = Duration::from_secs(3600);
    config
}

fn http_config(server: &MockServer) -> SyncConfig {
    let mut config = quiet_config();
    config.cloud_url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    config.timeout = Duration::from_secs(5);
    config
}

fn with_fakes(
    config: SyncConfig,
    cloud: &Arc<FakeCloud>,
) -> (SyncController, Arc<MemoryStore>, Arc<FakeLocal>) {
    let store = Arc::new(MemoryStore::new());
    let local = Arc::new(FakeLocal::default());
    let controller = SyncController::new(config, store.clone(), cloud.clone(), local.clone());
    (controller, store, local)
}

// ── Wiremock flow ───────────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_login_starts_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"devices": []})))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let controller = SyncController::from_config(http_config(&server), store.clone()).unwrap();

    let err = controller.start().await.unwrap_err();
    assert!(err.is_auth(), "expected auth error, got {err:?}");
    assert_eq!(controller.state(), SyncState::Unauthenticated);
    assert_eq!(store.value(CONNECTION), Some(StateValue::Bool(false)));
    assert_eq!(controller.scheduler().active_timers(), 0);
}

#[tokio::test]
async fn test_start_materializes_cloud_and_local_nodes() {
    let server = MockServer::start().await;
    let device_address = server.address().to_string();

    Mock::given(method("POST"))
        .and(path("/api/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authToken": "tok-9"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(query_param("deviceToken", "persisted-app-id"))
        .and(header("Auth-Token", "tok-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "devices": [{"id": "AA01", "name": "Kitchen", "type": "WSE", "power": 3.5}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/device/getSettings"))
        .and(query_param("id", "AA01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "AA01",
            "isLocal": true,
            "settings": "{\"cloudSingleUrl\":\"\",\"ledEnable\":true}",
            "value": "{\"relayState\":1}"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/device/wifiInfo"))
        .and(query_param("id", "AA01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "AA01",
            "info": {"ssid": "home", "ipv4": device_address}
        })))
        .mount(&server)
        .await;

    // Device side: report and temp answer JSON, settings serves the web UI.
    Mock::given(method("GET"))
        .and(path("/report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"power": 4.2, "relay": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/temp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"measured": 21.5})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>settings</html>"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store
        .set_state(APP_ID, StateValue::from("persisted-app-id"), true)
        .await
        .unwrap();
    let controller = SyncController::from_config(http_config(&server), store.clone()).unwrap();

    controller.start().await.unwrap();

    assert_eq!(controller.state(), SyncState::Enumerated);
    assert_eq!(store.value(CONNECTION), Some(StateValue::Bool(true)));
    assert_eq!(store.value("AA01.cloudStatus.power"), Some(StateValue::Number(3.5)));
    assert_eq!(store.value("AA01.localUpdateInterval"), Some(StateValue::Number(30.0)));
    assert_eq!(store.value("AA01.ipAddress"), Some(StateValue::Text(device_address)));
    assert_eq!(store.value("AA01.cloudWifi.ssid"), Some(StateValue::from("home")));
    assert_eq!(store.value("AA01.cloudSettings.relayState"), Some(StateValue::Number(1.0)));
    assert!(store.object("AA01.cloudSettings.cloudSingleUrl").unwrap().writable);
    assert!(!store.object("AA01.cloudSettings.isLocal").unwrap().writable);
    assert!(store.object("AA01.localCommands.switch").unwrap().writable);
    assert_eq!(controller.scheduler().interval_of("AA01"), Some(30));

    controller.scheduler().poll_all().await;
    assert_eq!(store.value("AA01.localData.report.power"), Some(StateValue::Number(4.2)));
    assert_eq!(store.value("AA01.localData.temp.measured"), Some(StateValue::Number(21.5)));
    assert!(store.paths_under("AA01.localData.api/v1/settings").is_empty());

    controller.shutdown().await;
    assert_eq!(store.value(CONNECTION), Some(StateValue::Bool(false)));
    assert_eq!(controller.scheduler().active_timers(), 0);
}

#[tokio::test]
async fn test_detail_failure_does_not_stop_enumeration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authToken": "tok"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{"id": "A", "type": "wrb"}, {"id": "B", "type": "wrb"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/device/getSettings"))
        .and(query_param("id", "A"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/device/getSettings"))
        .and(query_param("id", "B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isLocal": false})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/device/wifiInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"info": {"ssid": "x"}})))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let controller = SyncController::from_config(http_config(&server), store.clone()).unwrap();
    controller.start().await.unwrap();

    assert_eq!(controller.registry().len(), 2);
    assert_eq!(store.value("B.cloudSettings.isLocal"), Some(StateValue::Bool(false)));
    assert!(store.paths_under("A.cloudSettings").is_empty());
    assert_eq!(store.value("A.cloudWifi.ssid"), Some(StateValue::from("x")));

    controller.shutdown().await;
}

// ── Lifecycle with fakes ────────────────────────────────────────────

#[tokio::test]
async fn test_reenumeration_drops_stale_devices() {
    let cloud = Arc::new(FakeCloud::with_devices(vec![record("A", "wse"), record("B", "wbp")]));
    let (controller, _store, _local) = with_fakes(quiet_config(), &cloud);

    controller.start().await.unwrap();
    assert_eq!(controller.registry().len(), 2);
    assert_eq!(controller.scheduler().active_timers(), 2);

    cloud.set_devices(vec![record("B", "wbp"), record("C", "wms")]);
    controller.enumerate().await.unwrap();

    let ids: Vec<String> = controller
        .registry()
        .current()
        .iter()
        .map(|d| d.id.clone())
        .collect();
    assert_eq!(ids, vec!["B", "C"]);
    assert_eq!(controller.scheduler().interval_of("A"), None);
    assert_eq!(controller.scheduler().interval_of("C"), Some(30));

    controller.shutdown().await;
}

#[tokio::test]
async fn test_first_discovery_fetches_details_once() {
    let cloud = Arc::new(FakeCloud::with_devices(vec![record("A", "wse")]));
    let (controller, _store, _local) = with_fakes(quiet_config(), &cloud);

    controller.start().await.unwrap();
    controller.enumerate().await.unwrap();
    assert_eq!(cloud.settings_calls.lock().unwrap().len(), 1);
    assert_eq!(cloud.wifi_calls.lock().unwrap().len(), 1);

    controller.refresh_details("A").await.unwrap();
    assert_eq!(cloud.settings_calls.lock().unwrap().len(), 2);
    assert!(controller.refresh_details("missing").await.is_err());

    controller.shutdown().await;
}

#[tokio::test]
async fn test_every_enumeration_policy_refetches() {
    let cloud = Arc::new(FakeCloud::with_devices(vec![record("A", "wse")]));
    let mut config = quiet_config();
    config.detail_policy = DetailFetchPolicy::EveryEnumeration;
    let (controller, _store, _local) = with_fakes(config, &cloud);

    controller.start().await.unwrap();
    controller.enumerate().await.unwrap();
    assert_eq!(cloud.settings_calls.lock().unwrap().len(), 2);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_app_id_is_generated_once() {
    let cloud = Arc::new(FakeCloud::with_devices(vec![]));
    let (controller, store, _local) = with_fakes(quiet_config(), &cloud);

    controller.start().await.unwrap();
    let first = store.value(APP_ID).unwrap();
    controller.enumerate().await.unwrap();

    assert_eq!(store.value(APP_ID), Some(first.clone()));
    assert_eq!(first.as_str().unwrap().len(), 64);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_interval_write_rearms_timer() {
    let cloud = Arc::new(FakeCloud::with_devices(vec![record("A", "wse")]));
    let (controller, store, _local) = with_fakes(quiet_config(), &cloud);
    controller.start().await.unwrap();

    let outcome = controller
        .handle_state_change("A.localUpdateInterval", &StateValue::Number(0.0), false)
        .await;
    assert_eq!(outcome, DispatchOutcome::Applied);
    assert_eq!(controller.scheduler().interval_of("A"), None);

    controller
        .handle_state_change("A.localUpdateInterval", &StateValue::from("15"), false)
        .await;
    assert_eq!(controller.scheduler().interval_of("A"), Some(15));
    assert_eq!(controller.scheduler().active_timers(), 1);
    assert!(store.get_state("A.localUpdateInterval").await.unwrap().unwrap().ack);

    // The stored interval survives re-enumeration.
    controller.enumerate().await.unwrap();
    assert_eq!(controller.scheduler().interval_of("A"), Some(15));

    controller.shutdown().await;
}

#[tokio::test]
async fn test_command_write_goes_to_device() {
    let cloud = Arc::new(FakeCloud::with_devices(vec![record("A", "wse")]));
    let (controller, store, local) = with_fakes(quiet_config(), &cloud);
    controller.start().await.unwrap();
    store
        .set_state("A.ipAddress", StateValue::from("10.0.0.5"), false)
        .await
        .unwrap();

    let outcome = controller
        .handle_state_change("A.localCommands.switch", &StateValue::Bool(true), false)
        .await;
    assert_eq!(outcome, DispatchOutcome::Sent);
    assert_eq!(
        local.commands.lock().unwrap().clone(),
        vec![("10.0.0.5".to_owned(), "relay?state=1".to_owned())]
    );

    controller.shutdown().await;
}

#[tokio::test]
async fn test_user_set_ip_survives_detail_refresh() {
    let cloud = Arc::new(FakeCloud::with_devices(vec![record("A", "wse")]));
    cloud.set_wifi_ip("10.0.0.5");
    let (controller, store, _local) = with_fakes(quiet_config(), &cloud);
    controller.start().await.unwrap();
    assert_eq!(store.value("A.ipAddress"), Some(StateValue::from("10.0.0.5")));

    let user_ip = StateValue::from("192.168.5.5");
    store.set_state("A.ipAddress", user_ip.clone(), false).await.unwrap();
    let outcome = controller.handle_state_change("A.ipAddress", &user_ip, false).await;
    assert_eq!(outcome, DispatchOutcome::Applied);
    assert!(store.get_state("A.ipAddress").await.unwrap().unwrap().ack);

    controller.refresh_details("A").await.unwrap();
    assert_eq!(store.value("A.ipAddress"), Some(user_ip));

    // Clearing the address hands it back to the cloud.
    let cleared = StateValue::from("");
    controller.handle_state_change("A.ipAddress", &cleared, false).await;
    cloud.set_wifi_ip("10.0.0.6");
    controller.refresh_details("A").await.unwrap();
    assert_eq!(store.value("A.ipAddress"), Some(StateValue::from("10.0.0.6")));

    controller.shutdown().await;
}

#[tokio::test]
async fn test_cloud_ip_follows_wifi_info() {
    let cloud = Arc::new(FakeCloud::with_devices(vec![record("A", "wse")]));
    cloud.set_wifi_ip("10.0.0.5");
    let (controller, store, _local) = with_fakes(quiet_config(), &cloud);
    controller.start().await.unwrap();

    cloud.set_wifi_ip("10.0.0.7");
    controller.refresh_details("A").await.unwrap();
    assert_eq!(store.value("A.ipAddress"), Some(StateValue::from("10.0.0.7")));
    assert_eq!(store.value("A.cloudWifi.ipv4"), Some(StateValue::from("10.0.0.7")));

    controller.shutdown().await;
}

#[tokio::test]
async fn test_ip_write_for_unknown_device_is_skipped() {
    let cloud = Arc::new(FakeCloud::with_devices(vec![record("A", "wse")]));
    let (controller, _store, _local) = with_fakes(quiet_config(), &cloud);
    controller.start().await.unwrap();

    let outcome = controller
        .handle_state_change("ZZ.ipAddress", &StateValue::from("10.0.0.9"), false)
        .await;
    assert!(matches!(outcome, DispatchOutcome::Skipped { .. }), "got {outcome:?}");

    controller.shutdown().await;
}

#[tokio::test]
async fn test_rejected_login_with_fakes() {
    let cloud = Arc::new(FakeCloud {
        reject_login: true,
        ..FakeCloud::default()
    });
    let (controller, store, _local) = with_fakes(quiet_config(), &cloud);

    assert!(controller.start().await.is_err());
    assert_eq!(controller.state(), SyncState::Unauthenticated);
    assert!(!controller.session().is_connected());
    assert_eq!(store.value(APP_ID), None);
}
