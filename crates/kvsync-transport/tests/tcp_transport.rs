//! Peer server and client tests over loopback TCP.

use kvsync_core::effects::{KvStore, ReplicationChannel, SubscribeOptions};
use kvsync_core::{NodeId, Replica, SyncError};
use kvsync_store::MemoryKvStore;
use kvsync_transport::{MemoryBus, PeerClient, PeerServer, RemoteKvStore, ServerHandlers, TcpChannel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Site {
    address: String,
    bus: MemoryBus,
    store: Arc<MemoryKvStore>,
    replica: Replica,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<kvsync_core::SyncResult<()>>,
}

async fn start_site() -> Site {
    let bus = MemoryBus::new();
    let store = Arc::new(MemoryKvStore::new());
    let replica = Replica::new("config", NodeId::new("site-b"), store.clone());
    let handlers = ServerHandlers {
        inbound: Arc::new(bus.clone()),
        replica: replica.clone(),
        writes: None,
    };
    let server = PeerServer::bind("127.0.0.1:0", handlers).await.unwrap();
    let address = server.local_addr().unwrap().to_string();
    let (shutdown, rx) = watch::channel(false);
    let server = tokio::spawn(server.serve(rx));
    Site {
        address,
        bus,
        store,
        replica,
        shutdown,
        server,
    }
}

#[tokio::test]
async fn publish_reaches_peer_subscribers() {
    let site = start_site().await;
    let mut sub = site
        .bus
        .subscribe("rep.kv.ops", SubscribeOptions::fire_and_forget("site-b"))
        .await
        .unwrap();

    let channel = TcpChannel::new(MemoryBus::new(), [site.address.clone()]);
    channel.publish("rep.kv.ops", b"op".to_vec()).await.unwrap();

    let delivery = sub.next().await.unwrap();
    assert_eq!(delivery.payload(), b"op");
}

#[tokio::test]
async fn publish_fails_when_a_peer_is_down() {
    let site = start_site().await;
    let dead = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let mut sub = site
        .bus
        .subscribe("ops", SubscribeOptions::fire_and_forget("site-b"))
        .await
        .unwrap();

    let channel = TcpChannel::new(MemoryBus::new(), [site.address.clone(), dead]);
    let err = channel.publish("ops", b"op".to_vec()).await.unwrap_err();

    assert!(matches!(err, SyncError::PeerUnreachable { .. }));
    assert_eq!(sub.next().await.unwrap().payload(), b"op");
}

#[tokio::test]
async fn remote_store_reads_and_writes_peer_store() {
    let site = start_site().await;
    let remote = RemoteKvStore::new(&site.address);

    remote.put("k1", b"x").await.unwrap();
    remote.put("k2", b"y").await.unwrap();
    remote.delete("k2").await.unwrap();

    assert_eq!(site.store.value_of("k1").as_deref(), Some("x"));
    assert!(remote.get("k2").await.unwrap().unwrap().tombstone);
    assert_eq!(remote.get("missing").await.unwrap(), None);
    assert_eq!(
        remote.keys().await.unwrap(),
        vec!["k1".to_string(), "k2".to_string()]
    );
    remote.close().await.unwrap();

    // Reconnects after close.
    assert!(remote.get("k1").await.unwrap().is_some());
}

#[tokio::test]
async fn peer_writes_wait_for_the_key_lock_and_record_a_version() {
    let site = start_site().await;
    let remote = RemoteKvStore::new(&site.address);

    let guard = site.replica.locks.lock("config", "k").await;
    let write = tokio::spawn({
        let remote = RemoteKvStore::new(&site.address);
        async move { remote.put("k", b"x").await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!write.is_finished());
    assert_eq!(site.store.value_of("k"), None);

    drop(guard);
    write.await.unwrap().unwrap();
    assert_eq!(site.store.value_of("k").as_deref(), Some("x"));

    let recorded = site.replica.metadata.get("config", "k").unwrap();
    assert_eq!(recorded.origin.as_str(), "site-b#remote");
    assert_eq!(recorded.timestamp, site.store.snapshot()["k"].write_ts);
    assert!(!recorded.tombstone);

    remote.delete("k").await.unwrap();
    let recorded = site.replica.metadata.get("config", "k").unwrap();
    assert!(recorded.tombstone);
    assert!(site.replica.clock.now() > recorded.timestamp);
}

#[tokio::test]
async fn operator_writes_need_a_gateway() {
    let site = start_site().await;
    let client = PeerClient::new(&site.address);

    client.ping().await.unwrap();
    let err = client.put("k", "v").await.unwrap_err();
    assert!(matches!(err, SyncError::Config { .. }));

    // The connection survives an error response.
    client.ping().await.unwrap();
}

#[tokio::test]
async fn server_stops_on_shutdown() {
    let site = start_site().await;
    let client = PeerClient::new(&site.address);
    client.ping().await.unwrap();

    site.shutdown.send(true).unwrap();
    site.server.await.unwrap().unwrap();

    assert!(client.ping().await.is_err());
}
