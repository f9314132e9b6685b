use bytes::Bytes;
use ferrum_cluster::cluster::PeerClient;
use ferrum_cluster::commands::{Command, CommandRegistry};
use ferrum_cluster::protocol::{cmd_line, RespValue};
use ferrum_cluster::server::listen_and_serve;
use ferrum_cluster::{ClusterConfig, ClusterDatabase, Db, StandaloneDatabase};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(3);

struct Node {
    addr: String,
    cluster: Arc<ClusterDatabase>,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
}

impl Node {
    async fn client(&self) -> PeerClient {
        PeerClient::connect(&self.addr, TIMEOUT).await.unwrap()
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(TIMEOUT, self.server).await.unwrap().unwrap();
    }
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn start(listener: TcpListener, addr: &str, peers: Vec<String>, db: StandaloneDatabase) -> Node {
    let cluster = Arc::new(ClusterDatabase::new(ClusterConfig::new(addr, peers), db));
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(listen_and_serve(listener, cluster.clone(), shutdown.clone()));
    Node {
        addr: addr.to_string(),
        cluster,
        shutdown,
        server,
    }
}

/// Two members that know each other
async fn two_nodes() -> (Node, Node) {
    let (listener_a, addr_a) = bind().await;
    let (listener_b, addr_b) = bind().await;
    let a = start(listener_a, &addr_a, vec![addr_b.clone()], StandaloneDatabase::new(16));
    let b = start(listener_b, &addr_b, vec![addr_a.clone()], StandaloneDatabase::new(16));
    (a, b)
}

fn key_owned_by(node: &Node, owner: &str, prefix: &str) -> String {
    (0..)
        .map(|i| format!("{}{}", prefix, i))
        .find(|key| node.cluster.pick_node(key.as_bytes()) == owner)
        .unwrap()
}

#[tokio::test]
async fn relay_to_owner() {
    let (a, b) = two_nodes().await;
    let key = key_owned_by(&a, &b.addr, "foo");

    let mut client = a.client().await;
    client.send(&cmd_line(["SELECT", "2"])).await.unwrap();
    assert_eq!(
        client.send(&cmd_line(["SET", key.as_str(), "bar"])).await.unwrap(),
        RespValue::ok()
    );

    // The value lives on B, in the database the client selected
    assert_eq!(b.cluster.local().db(2).unwrap().len(), 1);
    assert_eq!(a.cluster.local().db(2).unwrap().len(), 0);

    let mut other = b.client().await;
    other.send(&cmd_line(["SELECT", "2"])).await.unwrap();
    assert_eq!(
        other.send(&cmd_line(["GET", key.as_str()])).await.unwrap(),
        RespValue::bulk_string(Bytes::from("bar"))
    );

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn multi_key_and_broadcast() {
    let (a, b) = two_nodes().await;
    let on_a = key_owned_by(&a, &a.addr, "k");
    let on_b = key_owned_by(&a, &b.addr, "k");

    let mut client = a.client().await;
    client.send(&cmd_line(["SET", on_a.as_str(), "1"])).await.unwrap();
    client.send(&cmd_line(["SET", on_b.as_str(), "2"])).await.unwrap();

    assert_eq!(
        client.send(&cmd_line(["EXISTS", on_a.as_str(), on_b.as_str(), "missing"])).await.unwrap(),
        RespValue::integer(2)
    );
    assert_eq!(client.send(&cmd_line(["DBSIZE"])).await.unwrap(), RespValue::integer(2));

    let keys = client.send(&cmd_line(["KEYS", "k*"])).await.unwrap();
    assert_eq!(keys.as_array().map(Vec::len), Some(2));

    assert_eq!(client.send(&cmd_line(["FLUSHDB"])).await.unwrap(), RespValue::ok());
    assert_eq!(client.send(&cmd_line(["DBSIZE"])).await.unwrap(), RespValue::integer(0));
    assert_eq!(b.cluster.local().db(0).unwrap().len(), 0);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn hash_tags_allow_rename() {
    let (a, b) = two_nodes().await;

    let mut client = a.client().await;
    client.send(&cmd_line(["SET", "{user42}.name", "ada"])).await.unwrap();
    assert_eq!(
        client.send(&cmd_line(["RENAME", "{user42}.name", "{user42}.alias"])).await.unwrap(),
        RespValue::ok()
    );
    assert_eq!(
        client.send(&cmd_line(["GET", "{user42}.alias"])).await.unwrap(),
        RespValue::bulk_string(Bytes::from("ada"))
    );

    a.stop().await;
    b.stop().await;
}

struct Explode;

impl Command for Explode {
    fn execute(&self, _db: &Db, args: &[Bytes]) -> RespValue {
        let _ = &args[7];
        RespValue::ok()
    }

    fn name(&self) -> &'static str {
        "set"
    }

    fn arity(&self) -> i32 {
        2
    }
}

#[tokio::test]
async fn panic_in_handler_is_contained() {
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(Explode));
    let db = StandaloneDatabase::with_registry(16, Arc::new(registry));

    let (listener, addr) = bind().await;
    let node = start(listener, &addr, vec![], db);

    let mut client = node.client().await;
    assert_eq!(
        client.send(&cmd_line(["SET", "foo", "bar"])).await.unwrap(),
        RespValue::error("ERR unknown")
    );
    assert_eq!(
        client.send(&cmd_line(["PING"])).await.unwrap(),
        RespValue::simple_string("PONG")
    );

    node.stop().await;
}

#[tokio::test]
async fn shutdown_stops_accepting_and_drains() {
    let (listener, addr) = bind().await;
    let node = start(listener, &addr, vec![], StandaloneDatabase::new(16));

    let mut first = node.client().await;
    let mut second = node.client().await;
    assert_eq!(first.send(&cmd_line(["SET", "a", "1"])).await.unwrap(), RespValue::ok());
    assert_eq!(second.send(&cmd_line(["SET", "b", "2"])).await.unwrap(), RespValue::ok());

    node.shutdown.cancel();
    tokio::time::timeout(TIMEOUT, node.server).await.unwrap().unwrap();

    // Both idle connections were closed by the server
    assert!(first.send(&cmd_line(["PING"])).await.is_err());
    assert!(second.send(&cmd_line(["PING"])).await.is_err());

    // And the listener is gone
    assert!(PeerClient::connect(&addr, TIMEOUT).await.is_err());
}

/// Takes a while, and counts how many executions have started
struct Slow {
    started: Arc<AtomicUsize>,
}

impl Command for Slow {
    fn execute(&self, _db: &Db, _args: &[Bytes]) -> RespValue {
        self.started.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(500));
        RespValue::bulk_string(Bytes::from("done"))
    }

    fn name(&self) -> &'static str {
        "slow"
    }

    fn arity(&self) -> i32 {
        0
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_waits_for_in_flight_commands() {
    let started = Arc::new(AtomicUsize::new(0));
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(Slow {
        started: started.clone(),
    }));
    let db = Arc::new(StandaloneDatabase::with_registry(16, Arc::new(registry)));

    let (listener, addr) = bind().await;
    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(listen_and_serve(listener, db, shutdown.clone()));

    let mut requests = Vec::new();
    for _ in 0..2 {
        let mut client = PeerClient::connect(&addr, TIMEOUT).await.unwrap();
        requests.push(tokio::spawn(async move { client.send(&cmd_line(["SLOW"])).await }));
    }

    // Both commands are executing when the shutdown starts
    while started.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    shutdown.cancel();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!server.is_finished());
    assert!(PeerClient::connect(&addr, TIMEOUT).await.is_err());

    for request in requests {
        let reply = request.await.unwrap().unwrap();
        assert_eq!(reply, RespValue::bulk_string(Bytes::from("done")));
    }

    tokio::time::timeout(TIMEOUT, &mut server).await.unwrap().unwrap();
}
