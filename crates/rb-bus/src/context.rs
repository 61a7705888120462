//! Bus context
//!
//! Process-wide state shared by every endpoint: whether the bus is running
//! and the registry that maps `svc://` names to bound servers.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use rb_core::ConnectionError;

/// Buffer size of each direction of an in-process connection
const DUPLEX_BUFFER: usize = 64 * 1024;

struct ContextInner {
    running: AtomicBool,
    /// service name → acceptor queue of the bound server
    services: DashMap<String, mpsc::Sender<DuplexStream>>,
}

/// Shared runtime context of the bus.
///
/// Create one with [`BusContext::start`] and hand clones to every endpoint.
#[derive(Clone)]
pub struct BusContext {
    inner: Arc<ContextInner>,
}

impl BusContext {
    /// Start a new context
    pub fn start() -> Self {
        tracing::debug!("Bus context started");
        Self {
            inner: Arc::new(ContextInner {
                running: AtomicBool::new(true),
                services: DashMap::new(),
            }),
        }
    }

    /// Stop the context.
    ///
    /// Later connects and binds fail with `ContextStopped`. Servers bound to
    /// in-process names stop accepting.
    pub fn shutdown(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            let released = self.inner.services.len();
            self.inner.services.clear();
            tracing::info!("Bus context stopped ({} services released)", released);
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Fail with `ContextStopped` unless running
    pub fn ensure_running(&self) -> Result<(), ConnectionError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(ConnectionError::ContextStopped)
        }
    }

    /// Claim a service name. Returns the queue incoming connections arrive on.
    pub fn register(
        &self,
        name: &str,
        backlog: usize,
    ) -> Result<mpsc::Receiver<DuplexStream>, ConnectionError> {
        self.ensure_running()?;
        match self.inner.services.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ConnectionError::AddressInUse(format!("svc://{}", name))),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(backlog.max(1));
                slot.insert(tx);
                tracing::debug!("Registered service {}", name);
                Ok(rx)
            }
        }
    }

    /// Release a service name
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.inner.services.remove(name).is_some();
        if removed {
            tracing::debug!("Unregistered service {}", name);
        }
        removed
    }

    /// Whether a server is bound under the name
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.services.contains_key(name)
    }

    /// Names of every bound service, sorted
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .services
            .iter()
            .map(|r| r.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Open an in-process connection to a named service
    pub async fn dial(&self, name: &str) -> Result<DuplexStream, ConnectionError> {
        self.ensure_running()?;
        let acceptor = self
            .inner
            .services
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| ConnectionError::ServiceNotFound(name.to_string()))?;

        let (client, server) = tokio::io::duplex(DUPLEX_BUFFER);
        acceptor
            .send(server)
            .await
            .map_err(|_| ConnectionError::ServiceNotFound(name.to_string()))?;
        Ok(client)
    }
}
