//! Cluster routing table
//!
//! Maps a command name to how the coordinator should route it. This table
//! is separate from the command registry: it never executes anything itself.

use std::collections::HashMap;

/// How replies gathered from every member are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// OK when every member said OK, otherwise the first error
    AllOk,
    /// Sum of integer replies
    SumIntegers,
    /// Concatenation of array replies
    ConcatArrays,
}

/// Routing strategy of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run on this node, whatever the arguments
    Local,
    /// Relay to the owner of the first key
    FirstKey,
    /// Split the keys by owner and sum the integer replies
    SplitKeys,
    /// Relay when both keys share an owner, reject otherwise
    SameOwner,
    /// Send to every member and merge the replies
    Broadcast(Merge),
    /// Sent by a member during a broadcast: strip the prefix, run locally
    Forwarded,
}

/// Prefix of a command line one member sends another during a broadcast,
/// so the receiver runs it locally instead of broadcasting it again
///
/// Internal to the cluster. Only broadcast commands are accepted behind it,
/// so a client sending it can never place a key on a node that does not own it.
pub const FORWARDED: &str = "_local";

/// Build the routing table
pub fn make_router() -> HashMap<&'static str, Route> {
    let mut router = HashMap::new();

    router.insert("ping", Route::Local);
    router.insert("select", Route::Local);
    router.insert("randomkey", Route::Local);
    router.insert(FORWARDED, Route::Forwarded);

    for name in ["get", "set", "setnx", "getset", "strlen", "type"] {
        router.insert(name, Route::FirstKey);
    }

    router.insert("del", Route::SplitKeys);
    router.insert("exists", Route::SplitKeys);

    router.insert("rename", Route::SameOwner);
    router.insert("renamenx", Route::SameOwner);

    router.insert("flushdb", Route::Broadcast(Merge::AllOk));
    router.insert("dbsize", Route::Broadcast(Merge::SumIntegers));
    router.insert("keys", Route::Broadcast(Merge::ConcatArrays));

    router
}
