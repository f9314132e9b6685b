//! Cluster coordination
//!
//! Every node owns a slice of the keyspace chosen by a consistent hash ring
//! over the configured members. The coordinator accepts any command, finds
//! the owner of its key and either runs it on the local node or relays it to
//! the owner over a pooled peer connection.

mod client;
mod pool;
mod ring;
mod router;

pub use client::PeerClient;
pub use pool::{Manager, PeerManager, Pool, PoolConfig, PoolError, Pooled};
pub use ring::{HashRing, DEFAULT_REPLICAS};
pub use router::{make_router, Merge, Route, FORWARDED};

use crate::connection::Connection;
use crate::database::{panic_message, Database, StandaloneDatabase};
use crate::protocol::{CmdLine, RespValue};
use bytes::Bytes;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cluster membership and peer connection settings
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Address other members use to reach this node
    pub self_addr: String,
    /// Addresses of the other members
    pub peers: Vec<String>,
    /// Virtual positions per member on the ring
    pub replicas: usize,
    pub pool: PoolConfig,
    /// Bound on connecting to a peer and on each peer round trip
    pub peer_timeout: Duration,
}

impl ClusterConfig {
    pub fn new(self_addr: impl Into<String>, peers: Vec<String>) -> Self {
        ClusterConfig {
            self_addr: self_addr.into(),
            peers,
            replicas: DEFAULT_REPLICAS,
            pool: PoolConfig::default(),
            peer_timeout: Duration::from_secs(3),
        }
    }
}

/// Cluster coordinator wrapping the local node
pub struct ClusterDatabase {
    self_addr: String,
    /// Members in configuration order: peers, then self
    nodes: Vec<String>,
    ring: HashRing,
    peers: HashMap<String, Pool<PeerManager>>,
    router: HashMap<&'static str, Route>,
    db: StandaloneDatabase,
}

impl ClusterDatabase {
    pub fn new(config: ClusterConfig, db: StandaloneDatabase) -> Self {
        let mut nodes: Vec<String> = Vec::with_capacity(config.peers.len() + 1);
        for peer in &config.peers {
            if *peer != config.self_addr && !nodes.contains(peer) {
                nodes.push(peer.clone());
            }
        }
        nodes.push(config.self_addr.clone());

        let ring = HashRing::new(&nodes, config.replicas);

        let peers = nodes
            .iter()
            .filter(|node| **node != config.self_addr)
            .map(|peer| {
                let manager = PeerManager::new(peer.clone(), config.peer_timeout);
                (peer.clone(), Pool::new(manager, config.pool))
            })
            .collect();

        info!(
            "Cluster node {} initialized with {} members",
            config.self_addr,
            nodes.len()
        );

        ClusterDatabase {
            self_addr: config.self_addr,
            nodes,
            ring,
            peers,
            router: make_router(),
            db,
        }
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// The local node
    pub fn local(&self) -> &StandaloneDatabase {
        &self.db
    }

    /// Member owning `key`
    pub fn pick_node(&self, key: &[u8]) -> &str {
        self.ring.pick_node(key).unwrap_or(self.self_addr.as_str())
    }

    /// Execute a client command anywhere in the cluster
    ///
    /// A panic while routing or executing is logged and answered with a
    /// generic error; the node and the connection keep serving.
    pub async fn exec_cluster(&self, conn: &mut dyn Connection, cmd_line: &[Bytes]) -> RespValue {
        let routed = AssertUnwindSafe(self.route(conn, cmd_line)).catch_unwind().await;

        match routed {
            Ok(reply) => reply,
            Err(payload) => {
                error!("Cluster command panicked: {}", panic_message(payload.as_ref()));
                RespValue::unknown_error()
            }
        }
    }

    async fn route(&self, conn: &mut dyn Connection, cmd_line: &[Bytes]) -> RespValue {
        let Some(name) = cmd_line.first() else {
            return RespValue::error("ERR empty command");
        };
        let cmd_name = String::from_utf8_lossy(name).to_lowercase();

        let route = match self.router.get(cmd_name.as_str()) {
            Some(route) => *route,
            None => return RespValue::error(format!("ERR not supported cmd '{}'", cmd_name)),
        };

        debug!("Routing {} via {:?}", cmd_name, route);

        match route {
            Route::Local => self.db.exec_local(conn, cmd_line),
            Route::FirstKey => {
                if cmd_line.len() < 2 {
                    return RespValue::wrong_arity(&cmd_name);
                }
                let owner = self.pick_node(&cmd_line[1]);
                self.relay(owner, conn, cmd_line).await
            }
            Route::SplitKeys => {
                if cmd_line.len() < 2 {
                    return RespValue::wrong_arity(&cmd_name);
                }
                self.split_keys(conn, cmd_line).await
            }
            Route::SameOwner => {
                if cmd_line.len() != 3 {
                    return RespValue::wrong_arity(&cmd_name);
                }
                let src_owner = self.pick_node(&cmd_line[1]);
                let dest_owner = self.pick_node(&cmd_line[2]);
                if src_owner != dest_owner {
                    return RespValue::error(
                        "ERR source and destination keys live on different nodes, use a {hash tag}",
                    );
                }
                self.relay(src_owner, conn, cmd_line).await
            }
            Route::Broadcast(merge) => {
                let replies = self.broadcast(conn, cmd_line).await;
                merge_replies(merge, &self.nodes, replies)
            }
            Route::Forwarded => {
                if cmd_line.len() < 2 {
                    return RespValue::wrong_arity(FORWARDED);
                }
                // Keyed commands must go through their owner
                let inner = String::from_utf8_lossy(&cmd_line[1]).to_lowercase();
                match self.router.get(inner.as_str()) {
                    Some(Route::Broadcast(_)) => self.db.exec_local(conn, &cmd_line[1..]),
                    _ => RespValue::error(format!("ERR '{}' cannot be forwarded", inner)),
                }
            }
        }
    }

    /// Run a command on `peer`: locally when it is this node, otherwise over
    /// a pooled connection after aligning the remote session's database
    pub async fn relay(&self, peer: &str, conn: &mut dyn Connection, cmd_line: &[Bytes]) -> RespValue {
        if peer == self.self_addr {
            return self.db.exec_local(conn, cmd_line);
        }

        let pool = match self.peers.get(peer) {
            Some(pool) => pool,
            None => return RespValue::error(format!("ERR unknown peer {}", peer)),
        };

        let mut client = match pool.borrow().await {
            Ok(client) => client,
            Err(e) => {
                warn!("Cannot reach peer {}: {}", peer, e);
                return RespValue::error(format!("ERR peer {}: {}", peer, e));
            }
        };

        let select = vec![
            Bytes::from_static(b"SELECT"),
            Bytes::from(conn.db_index().to_string()),
        ];
        match client.send(&select).await {
            Ok(reply) if reply.is_error() => return reply,
            Ok(_) => {}
            Err(e) => {
                warn!("Relay to {} failed: {}", peer, e);
                client.discard();
                return RespValue::error(format!("ERR peer {}: {}", peer, e));
            }
        }

        match client.send(cmd_line).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Relay to {} failed: {}", peer, e);
                client.discard();
                RespValue::error(format!("ERR peer {}: {}", peer, e))
            }
        }
    }

    /// Run the same command on every member, in membership order
    ///
    /// Peers receive it behind the `FORWARDED` prefix so they execute it
    /// on their own keyspace only.
    pub async fn broadcast(
        &self,
        conn: &mut dyn Connection,
        cmd_line: &[Bytes],
    ) -> HashMap<String, RespValue> {
        let mut forwarded = Vec::with_capacity(cmd_line.len() + 1);
        forwarded.push(Bytes::from_static(FORWARDED.as_bytes()));
        forwarded.extend_from_slice(cmd_line);

        let mut replies = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let reply = if *node == self.self_addr {
                self.db.exec_local(conn, cmd_line)
            } else {
                self.relay(node, conn, &forwarded).await
            };
            replies.insert(node.clone(), reply);
        }
        replies
    }

    /// Send each owner one sub-command with its own keys and sum the counts
    async fn split_keys(&self, conn: &mut dyn Connection, cmd_line: &[Bytes]) -> RespValue {
        let mut groups: Vec<(&str, CmdLine)> = Vec::new();
        for key in &cmd_line[1..] {
            let owner = self.pick_node(key);
            match groups.iter_mut().find(|(node, _)| *node == owner) {
                Some((_, line)) => line.push(key.clone()),
                None => groups.push((owner, vec![cmd_line[0].clone(), key.clone()])),
            }
        }

        let mut total = 0;
        for (owner, line) in groups {
            match self.relay(owner, conn, &line).await {
                RespValue::Integer(n) => total += n,
                RespValue::Error(e) => return RespValue::Error(e),
                other => {
                    return RespValue::error(format!("ERR unexpected reply from {}: {}", owner, other))
                }
            }
        }
        RespValue::integer(total)
    }
}

/// Combine the replies of a broadcast, visiting members in `order`
fn merge_replies(merge: Merge, order: &[String], mut replies: HashMap<String, RespValue>) -> RespValue {
    let ordered: Vec<(&String, RespValue)> = order
        .iter()
        .filter_map(|node| replies.remove(node).map(|reply| (node, reply)))
        .collect();

    if let Some((node, RespValue::Error(e))) = ordered.iter().find(|(_, r)| r.is_error()) {
        warn!("Broadcast failed on {}: {}", node, e);
        return RespValue::Error(e.clone());
    }

    match merge {
        Merge::AllOk => {
            if ordered.iter().all(|(_, reply)| reply.is_ok()) {
                RespValue::ok()
            } else {
                RespValue::error("ERR unexpected reply from a member")
            }
        }
        Merge::SumIntegers => {
            RespValue::integer(ordered.iter().filter_map(|(_, reply)| reply.as_integer()).sum())
        }
        Merge::ConcatArrays => RespValue::array(
            ordered
                .into_iter()
                .flat_map(|(_, reply)| match reply {
                    RespValue::Array(items) => items,
                    _ => Vec::new(),
                })
                .collect(),
        ),
    }
}

impl Database for ClusterDatabase {
    fn exec<'a>(
        &'a self,
        conn: &'a mut dyn Connection,
        cmd_line: &'a [Bytes],
    ) -> impl Future<Output = RespValue> + Send + 'a {
        self.exec_cluster(conn, cmd_line)
    }

    fn after_client_close(&self, conn: &dyn Connection) {
        self.db.after_client_close(conn);
    }

    fn close(&self) {
        for pool in self.peers.values() {
            pool.close();
        }
        self.db.close();
    }
}
