use crate::conn::dial;
use crate::pool::ConnPool;
use gatekeeper_core::GatewayError;
use gatekeeper_discovery::{DiscoveryError, ServiceRegistry};
use monoio::io::AsyncWriteRentExt;
use monoio::net::TcpStream;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// A connection bound to a resolved backend instance.
pub struct Backend {
    pub addr: String,
    pub stream: TcpStream,
}

/// Per-worker outbound client: service discovery plus the worker's
/// connection pool. Cheap to clone; every request handler on the worker
/// shares the same pool.
#[derive(Clone)]
pub struct ServiceClient {
    registry: Arc<dyn ServiceRegistry>,
    pool: Rc<RefCell<ConnPool>>,
}

impl ServiceClient {
    pub fn new(registry: Arc<dyn ServiceRegistry>, pool: Rc<RefCell<ConnPool>>) -> Self {
        Self { registry, pool }
    }

    /// Resolve a service name to an instance address.
    pub fn resolve(&self, service: &str) -> Result<String, GatewayError> {
        self.registry.resolve(service).map_err(|e| match e {
            DiscoveryError::NoInstance(s) => GatewayError::NoInstance(s),
        })
    }

    /// Resolve the service and acquire a connection to one of its
    /// instances, reusing a pooled connection when one is parked.
    pub async fn acquire(&self, service: &str) -> Result<Backend, GatewayError> {
        let addr = self.resolve(service)?;
        let pooled = self.pool.borrow_mut().take(&addr);
        let stream = match pooled {
            Some(s) => s,
            None => dial(&addr).await.ok_or_else(|| {
                GatewayError::BackendTransport(format!("connect to {addr} failed"))
            })?,
        };
        Ok(Backend { addr, stream })
    }

    /// Park a reusable connection back into the pool.
    pub fn release(&self, backend: Backend) {
        self.pool.borrow_mut().put(backend.addr, backend.stream);
    }

    /// Write `data` to the backend, retrying once on a fresh connection:
    /// a pooled connection may have gone stale while parked.
    pub async fn send(&self, backend: &mut Backend, data: Vec<u8>) -> Result<(), GatewayError> {
        let (res, _) = backend.stream.write_all(data.clone()).await;
        if res.is_ok() {
            return Ok(());
        }

        tracing::debug!(addr = %backend.addr, "Stale connection, retrying with a fresh one");
        let fresh = dial(&backend.addr).await.ok_or_else(|| {
            GatewayError::BackendTransport(format!("reconnect to {} failed", backend.addr))
        })?;
        backend.stream = fresh;
        let (res, _) = backend.stream.write_all(data).await;
        res.map(|_| ())
            .map_err(|e| GatewayError::BackendTransport(e.to_string()))
    }
}
