use gatekeeper_core::config::PoolConfig;
use monoio::net::TcpStream;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

struct Idle<S> {
    stream: S,
    parked_at: Instant,
}

/// Per-worker upstream connection pool.
///
/// Every request goes through this pool, so reuse to backend hosts is
/// performance-critical: the idle caps are high on purpose. Connections
/// idle past the timeout are discarded on `take` and by the periodic
/// `reap`. Generic over the stream type so the cap and expiry accounting
/// is testable without sockets.
pub struct ConnPool<S = TcpStream> {
    pools: HashMap<String, VecDeque<Idle<S>>>,
    max_idle_per_host: usize,
    max_idle_total: usize,
    idle_timeout: Duration,
    total_idle: usize,
}

impl<S> ConnPool<S> {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            pools: HashMap::with_capacity(16),
            max_idle_per_host: config.max_idle_per_host,
            max_idle_total: config.max_idle_total,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            total_idle: 0,
        }
    }

    /// Pop a live idle connection for `addr`, discarding expired ones.
    pub fn take(&mut self, addr: &str) -> Option<S> {
        let queue = self.pools.get_mut(addr)?;
        while let Some(idle) = queue.pop_front() {
            self.total_idle -= 1;
            if idle.parked_at.elapsed() < self.idle_timeout {
                return Some(idle.stream);
            }
            // expired: drop the stream (closes the fd) and keep looking
        }
        None
    }

    /// Park a reusable connection. Dropped instead when either cap is
    /// reached.
    pub fn put(&mut self, addr: String, stream: S) {
        if self.total_idle >= self.max_idle_total {
            return;
        }
        let queue = self
            .pools
            .entry(addr)
            .or_insert_with(|| VecDeque::with_capacity(8));
        if queue.len() >= self.max_idle_per_host {
            return;
        }
        queue.push_back(Idle {
            stream,
            parked_at: Instant::now(),
        });
        self.total_idle += 1;
    }

    /// Drop every idle connection past the timeout. Called periodically
    /// from the worker loop.
    pub fn reap(&mut self) {
        let timeout = self.idle_timeout;
        let mut dropped = 0;
        for queue in self.pools.values_mut() {
            // queues are in park order, expired entries sit at the front
            while queue
                .front()
                .is_some_and(|idle| idle.parked_at.elapsed() >= timeout)
            {
                queue.pop_front();
                dropped += 1;
            }
        }
        self.total_idle -= dropped;
        if dropped > 0 {
            tracing::debug!(dropped, "Reaped expired idle connections");
        }
    }

    pub fn idle_count(&self) -> usize {
        self.total_idle
    }
}
