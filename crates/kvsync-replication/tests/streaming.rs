//! Operation streaming between sites sharing one bus.

use kvsync_core::effects::{ReplicationChannel, SubscribeOptions};
use kvsync_core::wire::encode_operation;
use kvsync_core::SyncError;
use kvsync_replication::{ConsumerStats, LocalWriteGateway, ReplicationConsumer};
use kvsync_store::MemoryKvStore;
use kvsync_testkit::strategies::arb_operation_stream;
use kvsync_testkit::{assert_converged, put_op, test_replica, FlakyKvStore, TEST_SUBJECT};
use kvsync_transport::MemoryBus;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn spawn_consumer(
    consumer: ReplicationConsumer,
    subscription: kvsync_core::effects::Subscription,
) -> (watch::Sender<bool>, JoinHandle<ConsumerStats>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { consumer.run(subscription, rx).await });
    (tx, handle)
}

#[tokio::test]
async fn remote_write_reaches_peer_and_echo_is_ignored() {
    let bus = MemoryBus::new();
    let store_a = Arc::new(MemoryKvStore::new());
    let store_b = Arc::new(MemoryKvStore::new());

    let replica_a = test_replica("site-a", store_a.clone(), 100);
    let gateway = LocalWriteGateway::new(replica_a.clone(), Arc::new(bus.clone()), TEST_SUBJECT);

    let consumer_a = ReplicationConsumer::new(
        replica_a,
        TEST_SUBJECT,
        SubscribeOptions::fire_and_forget("rep-kv-site-a"),
    );
    let consumer_b = ReplicationConsumer::new(
        test_replica("site-b", store_b.clone(), 1),
        TEST_SUBJECT,
        SubscribeOptions::fire_and_forget("rep-kv-site-b"),
    );
    let sub_a = consumer_a.subscribe(&bus).await.unwrap();
    let sub_b = consumer_b.subscribe(&bus).await.unwrap();
    let (stop_a, task_a) = spawn_consumer(consumer_a, sub_a);
    let (stop_b, task_b) = spawn_consumer(consumer_b.clone(), sub_b);

    gateway.put("k1", "x").await.unwrap();
    gateway.delete("k1").await.unwrap();
    gateway.put("k2", "y").await.unwrap();

    eventually(|| store_b.value_of("k2").is_some()).await;
    assert_converged(&[store_a.as_ref(), store_b.as_ref()]).await;
    // Remote apply folded the origin's timestamps into the peer clock.
    assert!(consumer_b.replica().clock.now() > 103);

    stop_a.send(true).unwrap();
    stop_b.send(true).unwrap();
    let stats_a = task_a.await.unwrap();
    let stats_b = task_b.await.unwrap();
    assert_eq!(stats_a.applied, 0);
    assert_eq!(stats_b.applied, 3);
}

#[tokio::test]
async fn failed_apply_is_redelivered_on_durable_subscription() {
    let bus = MemoryBus::new().with_retry_delay(Duration::from_millis(5));
    let store_b = Arc::new(FlakyKvStore::new(MemoryKvStore::new()));
    store_b.fail_writes(true);

    let consumer = ReplicationConsumer::new(
        test_replica("site-b", store_b.clone(), 1),
        TEST_SUBJECT,
        SubscribeOptions::durable("rep-kv-site-b"),
    );
    let sub = consumer.subscribe(&bus).await.unwrap();
    let (stop, task) = spawn_consumer(consumer, sub);

    let op = put_op("k", "v", 10, "site-a");
    bus.publish(TEST_SUBJECT, encode_operation(&op).unwrap())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store_b.inner().value_of("k"), None);
    assert_eq!(bus.pending(TEST_SUBJECT, "rep-kv-site-b"), 1);

    store_b.fail_writes(false);
    eventually(|| store_b.inner().value_of("k").is_some()).await;
    eventually(|| bus.pending(TEST_SUBJECT, "rep-kv-site-b") == 0).await;

    stop.send(true).unwrap();
    let stats = task.await.unwrap();
    assert_eq!(stats.applied, 1);
    assert!(stats.failed >= 1);
}

#[tokio::test]
async fn non_retryable_apply_error_is_still_redelivered() {
    let bus = MemoryBus::new().with_retry_delay(Duration::from_millis(5));
    let store_b = Arc::new(FlakyKvStore::new(MemoryKvStore::new()));
    store_b.fail_writes_with(SyncError::shutdown("store closing"));

    let consumer = ReplicationConsumer::new(
        test_replica("site-b", store_b.clone(), 1),
        TEST_SUBJECT,
        SubscribeOptions::durable("rep-kv-site-b"),
    );
    let mut sub = consumer.subscribe(&bus).await.unwrap();

    let op = put_op("k", "v", 10, "site-a");
    bus.publish(TEST_SUBJECT, encode_operation(&op).unwrap())
        .await
        .unwrap();

    let mut stats = ConsumerStats::default();
    consumer.process(sub.next().await.unwrap(), &mut stats).await;
    assert_eq!(stats.rejected, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(bus.pending(TEST_SUBJECT, "rep-kv-site-b"), 1);

    store_b.fail_writes(false);
    let redelivered = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert!(redelivered.attempt() > 1);
    consumer.process(redelivered, &mut stats).await;

    assert_eq!(stats.applied, 1);
    assert_eq!(store_b.inner().value_of("k").as_deref(), Some("v"));
    assert_eq!(bus.pending(TEST_SUBJECT, "rep-kv-site-b"), 0);
}

#[tokio::test]
async fn malformed_payload_is_rejected_once() {
    let bus = MemoryBus::new().with_retry_delay(Duration::from_millis(5));
    let store = Arc::new(MemoryKvStore::new());
    let consumer = ReplicationConsumer::new(
        test_replica("site-b", store.clone(), 1),
        TEST_SUBJECT,
        SubscribeOptions::durable("rep-kv-site-b"),
    );
    let sub = consumer.subscribe(&bus).await.unwrap();
    let (stop, task) = spawn_consumer(consumer, sub);

    bus.publish(TEST_SUBJECT, br#"{"op":"put","bucket":"config"}"#.to_vec())
        .await
        .unwrap();
    let good = put_op("k", "v", 10, "site-a");
    bus.publish(TEST_SUBJECT, encode_operation(&good).unwrap())
        .await
        .unwrap();

    eventually(|| store.value_of("k").is_some()).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    stop.send(true).unwrap();
    let stats = task.await.unwrap();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.applied, 1);
    assert_eq!(bus.pending(TEST_SUBJECT, "rep-kv-site-b"), 0);
}

#[tokio::test]
async fn consumer_stops_when_subscription_closes() {
    let bus = MemoryBus::new();
    let consumer = ReplicationConsumer::new(
        test_replica("site-b", Arc::new(MemoryKvStore::new()), 1),
        TEST_SUBJECT,
        SubscribeOptions::fire_and_forget("rep-kv-site-b"),
    );
    let sub = consumer.subscribe(&bus).await.unwrap();
    let (_stop, task) = spawn_consumer(consumer, sub);

    bus.close().await.unwrap();
    assert_eq!(task.await.unwrap(), ConsumerStats::default());
}

// ============================================================================
// Order independence
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_order_and_duplication_converges(ops in arb_operation_stream(24), seed in any::<u64>()) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let in_order = Arc::new(MemoryKvStore::new());
            let shuffled = Arc::new(MemoryKvStore::new());
            let a = ReplicationConsumer::new(
                test_replica("site-b", in_order.clone(), 0),
                TEST_SUBJECT,
                SubscribeOptions::fire_and_forget("observer"),
            );
            let b = ReplicationConsumer::new(
                test_replica("site-b", shuffled.clone(), 0),
                TEST_SUBJECT,
                SubscribeOptions::fire_and_forget("observer"),
            );

            for op in &ops {
                a.handle_operation(op).await.unwrap();
            }

            // Reverse, rotate by the seed and deliver everything twice.
            let mut reordered: Vec<_> = ops.iter().rev().chain(ops.iter()).collect();
            if !reordered.is_empty() {
                let len = reordered.len();
                reordered.rotate_left((seed as usize) % len);
            }
            for op in reordered {
                b.handle_operation(op).await.unwrap();
            }

            assert_converged(&[in_order.as_ref(), shuffled.as_ref()]).await;
        });
    }
}
