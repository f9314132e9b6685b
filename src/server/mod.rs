//! Server module
//!
//! Handles TCP connections and manages the accept loop.
//! Each client gets its own task; shutdown is cooperative through a
//! `CancellationToken` and waits for every connection task to finish.

mod connection;

use crate::database::Database;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

pub use connection::ClientConnection;

/// Bind `addr` and serve until SIGINT or SIGTERM
pub async fn listen_and_serve_with_signal<A, D>(addr: A, db: Arc<D>) -> anyhow::Result<()>
where
    A: ToSocketAddrs,
    D: Database,
{
    let listener = TcpListener::bind(addr).await?;
    info!("RESP server listening on {}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    listen_and_serve(listener, db, shutdown).await;
    Ok(())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

/// Serve connections from `listener` until `shutdown` is cancelled
///
/// Returns once the listener is closed, every connection task has returned
/// and the database has been closed.
pub async fn listen_and_serve<D: Database>(listener: TcpListener, db: Arc<D>, shutdown: CancellationToken) {
    let tracker = TaskTracker::new();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (socket, addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                // Usually out of file descriptors; keep serving existing clients
                error!("Accept error: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        info!("New RESP connection from {}", addr);

        if let Err(e) = socket.set_nodelay(true) {
            warn!("Cannot set TCP_NODELAY for {}: {}", addr, e);
        }

        let db = db.clone();
        let shutdown = shutdown.child_token();
        tracker.spawn(async move {
            let mut connection = ClientConnection::new(socket);

            if let Err(e) = connection.handle(db.as_ref(), &shutdown).await {
                error!("Connection error from {}: {}", addr, e);
            }

            db.after_client_close(connection.session());
            info!("Connection closed: {}", addr);
        });
    }

    drop(listener);
    info!("Listener closed, waiting for {} connections", tracker.len());

    tracker.close();
    tracker.wait().await;

    db.close();
    info!("Server stopped");
}
