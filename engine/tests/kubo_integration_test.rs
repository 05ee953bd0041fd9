//! Integration tests for the Kubo adapters
//!
//! A wiremock server plays the Kubo RPC API so the content store and the
//! DHT routing backend can be checked against realistic replies.

use futures::StreamExt;
use sdk::{ContentId, PeerRecord, RegistryError};
use spacecore_registry::content_store::{ContentStore, KuboContentStore};
use spacecore_registry::peers::{KuboRouting, PeerDirectory, Routing};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CID: &str = "bafkreihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku";

fn kubo_error(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(500).set_body_json(serde_json::json!({
        "Message": message,
        "Code": 0,
        "Type": "error"
    }))
}

fn store(server: &MockServer) -> KuboContentStore {
    KuboContentStore::new(server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_add_pin_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v0/add"))
        .and(query_param("cid-version", "1"))
        .and(query_param("pin", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Name": "plugin",
            "Hash": CID,
            "Size": "19"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v0/pin/add"))
        .and(query_param("arg", CID))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Pins": [CID]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v0/cat"))
        .and(query_param("arg", CID))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"plugin binary bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server);
    let id = store.add(b"plugin binary bytes".to_vec()).await.unwrap();
    assert_eq!(id.as_str(), CID);

    store.pin(&id).await.unwrap();
    assert_eq!(store.fetch(&id).await.unwrap(), b"plugin binary bytes");
}

#[tokio::test]
async fn test_fetch_error_mapping() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v0/cat"))
        .and(query_param("arg", "missing"))
        .respond_with(kubo_error("merkledag: not found"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v0/cat"))
        .and(query_param("arg", "folder"))
        .respond_with(kubo_error("this dag node is a directory"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v0/cat"))
        .and(query_param("arg", "broken"))
        .respond_with(kubo_error("disk on fire"))
        .mount(&server)
        .await;

    let store = store(&server);

    let err = store.fetch(&ContentId::new("missing")).await.unwrap_err();
    assert!(err.is_not_found());

    let err = store.fetch(&ContentId::new("folder")).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotAFile(_)));

    let err = store.fetch(&ContentId::new("broken")).await.unwrap_err();
    assert!(matches!(err, RegistryError::Store(_)));
}

#[tokio::test]
async fn test_slow_fetch_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/cat"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let store = KuboContentStore::new(server.uri(), Duration::from_millis(200)).unwrap();
    let err = store.fetch(&ContentId::new(CID)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_pin_failure_and_idempotent_unpin() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v0/pin/add"))
        .respond_with(kubo_error("pin: block was not found locally (offline)"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v0/pin/rm"))
        .respond_with(kubo_error("not pinned or pinned indirectly"))
        .mount(&server)
        .await;

    let store = store(&server);
    let id = ContentId::new(CID);

    let err = store.pin(&id).await.unwrap_err();
    match err {
        RegistryError::Pin { content_id, reason } => {
            assert_eq!(content_id, CID);
            assert!(reason.contains("not found locally"));
        }
        other => panic!("expected pin error, got {other}"),
    }

    store.unpin(&id).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_daemon_is_store_error() {
    // Nothing listens on port 9 (discard) in the test environment
    let store = KuboContentStore::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
    let err = store.add(b"x".to_vec()).await.unwrap_err();
    assert!(matches!(err, RegistryError::Store(_)));
}

async fn mount_routing_basics(server: &MockServer, bootstrap: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/v0/id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ID": "12D3KooWLocal",
            "Addresses": ["/ip4/127.0.0.1/tcp/4001"]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v0/bootstrap/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v0/swarm/peers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Peers": [{"Addr": "/ip4/10.0.0.9/tcp/4001", "Peer": "12D3KooWRemote"}]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v0/block/put"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Key": "bafkreitopic",
            "Size": 18
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_directory_over_kubo_routing() {
    let server = MockServer::start().await;
    mount_routing_basics(
        &server,
        serde_json::json!({ "Peers": ["/dnsaddr/bootstrap.libp2p.io/p2p/QmNnoo"] }),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/api/v0/routing/provide"))
        .and(query_param("arg", "bafkreitopic"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&server)
        .await;

    let ndjson = concat!(
        r#"{"Extra":"","ID":"","Responses":null,"Type":0}"#,
        "\n",
        r#"{"Extra":"","ID":"","Responses":[{"Addrs":["/ip4/10.0.0.2/tcp/4001"],"ID":"12D3KooWPeerA"}],"Type":4}"#,
        "\n",
        r#"{"Extra":"","ID":"","Responses":[{"Addrs":[],"ID":""}],"Type":4}"#,
        "\n",
        r#"{"Extra":"","ID":"","Responses":[{"Addrs":null,"ID":"12D3KooWPeerB"}],"Type":4}"#,
    );
    Mock::given(method("POST"))
        .and(path("/api/v0/routing/findprovs"))
        .and(query_param("arg", "bafkreitopic"))
        .and(query_param("num-providers", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
        .mount(&server)
        .await;

    let routing = KuboRouting::new(server.uri(), Duration::from_secs(5)).unwrap();
    let directory = PeerDirectory::new(Arc::new(routing), "spacecore-registry", 20);

    assert_eq!(directory.setup_host().await.unwrap(), "12D3KooWLocal");
    directory.advertise().await.unwrap();

    let peers: Vec<PeerRecord> = directory.discover_peers().await.unwrap().collect().await;
    let ids: Vec<&str> = peers.iter().map(|p| p.peer_id.as_str()).collect();
    assert_eq!(ids, vec!["12D3KooWPeerA", "12D3KooWPeerB"]);
    assert_eq!(peers[0].addresses, vec!["/ip4/10.0.0.2/tcp/4001"]);
}

#[tokio::test]
async fn test_empty_bootstrap_list_fails_setup() {
    let server = MockServer::start().await;
    mount_routing_basics(&server, serde_json::json!({ "Peers": null })).await;

    let routing = Arc::new(KuboRouting::new(server.uri(), Duration::from_secs(5)).unwrap());
    assert!(matches!(
        routing.bootstrap().await.unwrap_err(),
        RegistryError::Bootstrap(_)
    ));

    let directory = PeerDirectory::new(routing, "spacecore-registry", 20);
    assert!(directory.setup_host().await.is_err());
    assert_eq!(directory.state().await.label(), "failed");
    assert!(directory.peer_id().await.is_none());
}

#[tokio::test]
async fn test_stalled_daemon_fails_setup_within_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/id"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let routing = KuboRouting::new(server.uri(), Duration::from_millis(200)).unwrap();
    let directory = PeerDirectory::new(Arc::new(routing), "spacecore-registry", 20);

    let result = tokio::time::timeout(Duration::from_secs(5), directory.setup_host())
        .await
        .expect("setup should fail on its own request deadline");
    assert!(matches!(result.unwrap_err(), RegistryError::HostInit(_)));
    assert_eq!(directory.state().await.label(), "failed");
}

#[tokio::test]
async fn test_provider_limit_is_enforced() {
    let server = MockServer::start().await;
    mount_routing_basics(
        &server,
        serde_json::json!({ "Peers": ["/ip4/1.1.1.1/tcp/4001/p2p/QmBoot"] }),
    )
    .await;

    let mut ndjson = String::new();
    for i in 0..5 {
        ndjson.push_str(&format!(
            r#"{{"Responses":[{{"Addrs":[],"ID":"12D3KooWPeer{}"}}],"Type":4}}"#,
            i
        ));
        ndjson.push('\n');
    }
    Mock::given(method("POST"))
        .and(path("/api/v0/routing/findprovs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
        .mount(&server)
        .await;

    let routing = KuboRouting::new(server.uri(), Duration::from_secs(5)).unwrap();
    let peers: Vec<PeerRecord> = routing
        .find_providers("spacecore-registry", 2)
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(peers.len(), 2);
}
