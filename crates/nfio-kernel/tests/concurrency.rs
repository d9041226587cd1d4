//! Concurrent callers, cancellation and lock hygiene.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nfio_kernel::{MemoryOrchestrator, NfEngine, NfioConfig, Op, VfsOps};
use nfio_types::{ChannelRequest, InstanceKey, InstanceState};

fn setup() -> (NfEngine, Arc<MemoryOrchestrator>) {
    let orch = Arc::new(MemoryOrchestrator::new());
    let catalog = NfioConfig::builtin().unwrap().catalog().unwrap();
    (NfEngine::with_backend(catalog, orch.clone()), orch)
}

fn request(s: &str) -> ChannelRequest {
    ChannelRequest::parse(s).unwrap()
}

async fn mkdir(engine: &NfEngine, path: &str) {
    engine.mkdir(Path::new(path), 0o755).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_connect_yields_one_channel() {
    let (engine, orch) = setup();
    mkdir(&engine, "nf-types/firewall/fw1").await;
    mkdir(&engine, "nf-types/proxy/p1").await;

    let req_a = request("firewall:fw1+proxy:p1");
    let req_b = request("proxy:p1+firewall:fw1");
    let (a, b) = futures::join!(
        engine.channels().connect(&req_a),
        engine.channels().connect(&req_b),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);
    assert_eq!(orch.channel_count(), 1);
    // Serialized on the pair; the second call finds the channel present.
    assert_eq!(orch.calls(Op::Connect), 2);
}

#[tokio::test]
async fn test_concurrent_mkdir_through_filesystem() {
    let (engine, orch) = setup();
    mkdir(&engine, "nf-types/firewall/fw1").await;
    mkdir(&engine, "nf-types/proxy/p1").await;

    let path = Path::new("chns/firewall:fw1+proxy:p1");
    let (a, b, c) = futures::join!(
        engine.mkdir(path, 0o755),
        engine.mkdir(path, 0o755),
        engine.mkdir(path, 0o755),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(orch.channel_count(), 1);
}

#[tokio::test]
async fn test_concurrent_create_same_instance() {
    let (engine, orch) = setup();
    orch.set_latency(Some(Duration::from_millis(20)));

    let path = Path::new("nf-types/ids/s1");
    let (a, b) = futures::join!(engine.mkdir(path, 0o755), engine.mkdir(path, 0o755));
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(orch.instance_count(), 1);
    assert_eq!(orch.calls(Op::Instantiate), 1);
}

#[tokio::test(start_paused = true)]
async fn test_different_addresses_run_in_parallel() {
    let (engine, orch) = setup();
    orch.set_latency(Some(Duration::from_millis(100)));

    let started = tokio::time::Instant::now();
    let (a, b) = futures::join!(
        engine.mkdir(Path::new("nf-types/ids/s1"), 0o755),
        engine.mkdir(Path::new("nf-types/ids/s2"), 0o755),
    );
    assert!(a.is_ok() && b.is_ok());
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[tokio::test]
async fn test_destroy_waits_for_in_flight_write() {
    let (engine, orch) = setup();
    mkdir(&engine, "nf-types/firewall/fw1").await;
    orch.set_latency(Some(Duration::from_millis(50)));

    let (write, destroy) = futures::join!(
        engine.write(Path::new("nf-types/firewall/fw1/config"), 0, b"zone=dmz\n"),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            engine.rmdir(Path::new("nf-types/firewall/fw1")).await
        },
    );

    // The write landed before the instance went away.
    assert!(write.is_ok());
    assert!(destroy.is_ok());
    assert_eq!(orch.instance_count(), 0);
}

#[tokio::test]
async fn test_cancelled_create_releases_lock() {
    let (engine, orch) = setup();
    orch.set_latency(Some(Duration::from_millis(200)));

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        engine.mkdir(Path::new("nf-types/firewall/fw1"), 0o755),
    )
    .await;
    assert!(cancelled.is_err());
    assert!(engine.locks().is_empty());

    let key = InstanceKey::new("firewall", "fw1");
    assert_eq!(engine.registry().state(&key), InstanceState::Pending);
    assert!(!engine.registry().get(&key).unwrap().in_flight);

    // The backend never saw it; the next listing settles the record.
    orch.set_latency(None);
    let listing = engine
        .list_directory(Path::new("nf-types/firewall"))
        .await
        .unwrap();
    assert!(listing.entries.is_empty());
    assert_eq!(engine.registry().state(&key), InstanceState::Absent);

    mkdir(&engine, "nf-types/firewall/fw1").await;
    assert_eq!(orch.instance_count(), 1);
}

#[tokio::test]
async fn test_lock_table_drains() {
    let (engine, _orch) = setup();
    mkdir(&engine, "nf-types/firewall/fw1").await;
    mkdir(&engine, "nf-types/proxy/p1").await;
    mkdir(&engine, "chns/firewall:fw1+proxy:p1").await;
    engine
        .write_all(Path::new("nf-types/firewall/fw1/config"), b"a=1\n")
        .await
        .unwrap();
    engine.rmdir(Path::new("nf-types/firewall/fw1")).await.unwrap();

    assert!(engine.locks().is_empty());
}
