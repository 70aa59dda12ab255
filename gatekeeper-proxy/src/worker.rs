use gatekeeper_client::{ConnPool, RemoteAccessClient, ServiceClient};
use gatekeeper_core::GatewayConfig;
use gatekeeper_discovery::ServiceRegistry;
use gatekeeper_filter::{AccessDecider, FilterRegistry};
use gatekeeper_observability::GatewayMetrics;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{error, info};

/// State shared across all worker threads. Everything here is read-only
/// on the hot path; the filter registry has its own reader-writer
/// discipline.
pub struct SharedState {
    pub config: Arc<GatewayConfig>,
    pub filters: Arc<FilterRegistry>,
    pub registry: Arc<dyn ServiceRegistry>,
    pub metrics: Arc<GatewayMetrics>,
}

impl SharedState {
    pub fn new(
        config: GatewayConfig,
        filters: Arc<FilterRegistry>,
        registry: Arc<dyn ServiceRegistry>,
        metrics: GatewayMetrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            filters,
            registry,
            metrics: Arc::new(metrics),
        })
    }
}

/// Per-worker handles shared by every connection on the thread.
pub struct WorkerContext {
    pub shared: Arc<SharedState>,
    pub client: ServiceClient,
    pub access: Rc<dyn AccessDecider>,
}

/// Spawn monoio worker threads — one per core.
///
/// Each thread runs an independent monoio runtime with its own TCP
/// listener, event loop, connection pool, and outbound client.
pub fn spawn_workers(
    shared: Arc<SharedState>,
    num_workers: usize,
) -> Vec<std::thread::JoinHandle<()>> {
    let listen_addr = shared.config.server.http_addr.to_string();
    let mut handles = Vec::with_capacity(num_workers);

    for worker_id in 0..num_workers {
        let shared = Arc::clone(&shared);
        let addr = listen_addr.clone();

        let handle = std::thread::Builder::new()
            .name(format!("gatekeeper-worker-{}", worker_id))
            .spawn(move || {
                let mut rt = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
                    .enable_all()
                    .build()
                    .expect("Failed to build monoio runtime");

                rt.block_on(worker_loop(worker_id, shared, addr));
            })
            .expect("Failed to spawn worker thread");

        handles.push(handle);
    }

    info!(workers = num_workers, addr = %listen_addr, "Workers spawned");
    handles
}

/// Main loop for a single worker thread.
///
/// The connection pool and outbound client are created once per thread;
/// all connections on the thread share them via `Rc`.
async fn worker_loop(worker_id: usize, shared: Arc<SharedState>, addr: String) {
    use monoio::net::TcpListener;

    let listener = TcpListener::bind(&addr).unwrap_or_else(|e| {
        panic!("Worker {} failed to bind to {}: {}", worker_id, addr, e);
    });

    info!(worker = worker_id, addr = %addr, "Worker listening");

    let pool = Rc::new(RefCell::new(ConnPool::new(&shared.config.pool)));
    let client = ServiceClient::new(Arc::clone(&shared.registry), Rc::clone(&pool));
    let access: Rc<dyn AccessDecider> = Rc::new(RemoteAccessClient::new(
        client.clone(),
        shared.config.access.service.clone(),
    ));

    let worker = Rc::new(WorkerContext {
        shared,
        client,
        access,
    });

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                // TCP_NODELAY — disable Nagle's for lowest latency
                let _ = stream.set_nodelay(true);

                // Cheap idle-connection housekeeping between accepts
                pool.borrow_mut().reap();

                let worker = Rc::clone(&worker);
                monoio::spawn(async move {
                    if let Err(e) =
                        crate::connection::handle_connection(stream, peer_addr, worker).await
                    {
                        tracing::debug!(error = %e, "Connection closed");
                    }
                });
            }
            Err(e) => {
                error!(worker = worker_id, error = %e, "Accept error");
            }
        }
    }
}
