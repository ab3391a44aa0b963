// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Registry of per-device session pools.
//!
//! Pools are created lazily on first use and keyed by device name. The
//! registry also owns the service identity: replacing it through
//! [`NamedPoolRegistry::reset`] terminates every pool, so new sessions pick
//! up the new certificate.
//!
//! # Admission
//!
//! ```text
//! get_connection(device)
//!   ├─ try_borrow ─── ok ──────────────────────────▶ pooled session
//!   └─ saturated
//!        ├─ Wait   ── borrow (blocks) ──────────────▶ pooled session
//!        ├─ Reject ─────────────────────────────────▶ PoolError::Saturated
//!        └─ Create ── factory, outside the pool ───▶ unmanaged session
//! ```
//!
//! Locks are never held across session I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{AdmissionStrategy, ConnectionDescriptor, IdentityConfig};
use crate::error::{OpcUaResult, PoolError};

use super::pool::ConnectionPool;
use super::transport::{SessionFactory, UaSession};
use super::wrapper::ClientWrapper;

/// Per-device pools sharing one identity and one admission strategy.
pub struct NamedPoolRegistry {
    pools: RwLock<HashMap<String, Arc<ConnectionPool>>>,
    identity: RwLock<Arc<IdentityConfig>>,
    factory: Arc<dyn SessionFactory>,
    strategy: AdmissionStrategy,
    unmanaged_sessions: AtomicU64,
}

impl NamedPoolRegistry {
    /// Creates an empty registry.
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        identity: IdentityConfig,
        strategy: AdmissionStrategy,
    ) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            identity: RwLock::new(Arc::new(identity)),
            factory,
            strategy,
            unmanaged_sessions: AtomicU64::new(0),
        }
    }

    /// Returns the admission strategy.
    #[inline]
    pub fn strategy(&self) -> AdmissionStrategy {
        self.strategy
    }

    /// Returns the current identity.
    pub fn identity(&self) -> Arc<IdentityConfig> {
        self.identity.read().clone()
    }

    /// Returns the pool of a device, if one exists.
    pub fn pool(&self, device: &str) -> Option<Arc<ConnectionPool>> {
        self.pools.read().get(device).cloned()
    }

    /// Returns the number of live pools.
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// Returns how many sessions the `create` strategy opened past a
    /// saturated pool.
    pub fn unmanaged_sessions(&self) -> u64 {
        self.unmanaged_sessions.load(Ordering::Relaxed)
    }

    /// Returns the device pool, creating it from `descriptor` when missing.
    pub fn get_or_create_pool(
        &self,
        device: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Arc<ConnectionPool> {
        if let Some(pool) = self.pools.read().get(device) {
            if !pool.is_terminated() {
                return pool.clone();
            }
        }

        let mut pools = self.pools.write();
        if let Some(pool) = pools.get(device) {
            if !pool.is_terminated() {
                return pool.clone();
            }
            debug!(device = %device, "Discarding terminated connection pool");
        }

        debug!(
            device = %device,
            endpoint = %descriptor.endpoint_url,
            max_pool_size = descriptor.pool_size(),
            "Creating connection pool"
        );
        let pool = Arc::new(ConnectionPool::new(
            device,
            Arc::new(descriptor.clone()),
            self.identity.read().clone(),
            self.factory.clone(),
        ));
        pools.insert(device.to_string(), pool.clone());
        pool
    }

    /// Hands out a session for a device according to the admission strategy.
    pub async fn get_connection(
        &self,
        device: &str,
        descriptor: &ConnectionDescriptor,
    ) -> OpcUaResult<ClientWrapper> {
        let pool = self.get_or_create_pool(device, descriptor);
        if let Some(wrapper) = pool.try_borrow().await? {
            return Ok(wrapper);
        }

        match self.strategy {
            AdmissionStrategy::Wait => {
                debug!(device = %device, "Connection pool saturated, waiting");
                pool.borrow().await
            }
            AdmissionStrategy::Reject => {
                Err(PoolError::saturated(device, &descriptor.endpoint_url).into())
            }
            AdmissionStrategy::Create => {
                warn!(
                    device = %device,
                    endpoint = %descriptor.endpoint_url,
                    "Get ua connection directly, it may cause performance problem"
                );
                let session = self.open_session(descriptor).await?;
                self.unmanaged_sessions.fetch_add(1, Ordering::Relaxed);
                Ok(ClientWrapper::unmanaged(device, session))
            }
        }
    }

    /// Opens a session outside any pool with the current identity.
    ///
    /// The caller owns the session and must close it.
    pub async fn open_session(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> OpcUaResult<Box<dyn UaSession>> {
        let identity = self.identity();
        self.factory.create_session(descriptor, &identity).await
    }

    /// Terminates the device pool when its descriptor differs from `descriptor`.
    ///
    /// Returns `true` if a pool was terminated. The next request rebuilds it.
    pub async fn check_updates_and_do_update(
        &self,
        device: &str,
        descriptor: &ConnectionDescriptor,
    ) -> bool {
        let stale = {
            let pools = self.pools.read();
            pools.get(device).and_then(|pool| match pool.descriptor() {
                Some(current) if *current == *descriptor => None,
                _ => Some(pool.clone()),
            })
        };
        let Some(stale) = stale else {
            return false;
        };

        let removed = {
            let mut pools = self.pools.write();
            match pools.get(device) {
                Some(current) if Arc::ptr_eq(current, &stale) => pools.remove(device),
                _ => None,
            }
        };
        match removed {
            Some(pool) => {
                info!(device = %device, "Connection settings changed, rebuilding pool");
                pool.terminate().await;
                true
            }
            None => false,
        }
    }

    /// Terminates and forgets the pool of one device.
    ///
    /// Returns `true` if the device had a pool.
    pub async fn terminate_named_pool(&self, device: &str) -> bool {
        let removed = self.pools.write().remove(device);
        match removed {
            Some(pool) => {
                pool.terminate().await;
                true
            }
            None => false,
        }
    }

    /// Replaces the identity and terminates every pool.
    pub async fn reset(&self, identity: IdentityConfig) {
        let idle = {
            let mut pools = self.pools.write();
            *self.identity.write() = Arc::new(identity);
            Self::shutdown_all(&mut pools)
        };
        info!(idle_closed = idle.len(), "Identity replaced, all pools terminated");
        for session in idle {
            session.close().await;
        }
    }

    /// Terminates every pool, keeping the identity.
    pub async fn terminate_all(&self) {
        let idle = {
            let mut pools = self.pools.write();
            Self::shutdown_all(&mut pools)
        };
        for session in idle {
            session.close().await;
        }
    }

    fn shutdown_all(pools: &mut HashMap<String, Arc<ConnectionPool>>) -> Vec<Box<dyn UaSession>> {
        pools
            .drain()
            .flat_map(|(_, pool)| pool.shutdown())
            .collect()
    }
}

impl std::fmt::Debug for NamedPoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedPoolRegistry")
            .field("pools", &self.pool_count())
            .field("strategy", &self.strategy)
            .finish()
    }
}
