//! Database layer
//!
//! `Database` is what the connection server drives. It is implemented by the
//! single-node `StandaloneDatabase` and by the cluster coordinator, which
//! wraps one.

mod db;
mod standalone;

pub use db::{AofCallback, Db};
pub use standalone::{StandaloneDatabase, DEFAULT_DATABASES};

use crate::connection::Connection;
use crate::protocol::RespValue;
use bytes::Bytes;
use std::any::Any;
use std::future::Future;

/// A command executor shared by every client connection
pub trait Database: Send + Sync + 'static {
    /// Execute one command line on behalf of a client session
    fn exec<'a>(
        &'a self,
        conn: &'a mut dyn Connection,
        cmd_line: &'a [Bytes],
    ) -> impl Future<Output = RespValue> + Send + 'a;

    /// Release per-session resources once a client disconnects
    fn after_client_close(&self, conn: &dyn Connection);

    /// Release node resources on shutdown
    fn close(&self);
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
