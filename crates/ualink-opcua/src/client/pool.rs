// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bounded per-device session pool.
//!
//! # Architecture
//!
//! ```text
//!   borrow() / try_borrow()
//!          │
//!          ▼
//!   ┌──────────────┐  permit   ┌──────────────┐  pop   ┌─────────────────┐
//!   │  Semaphore   │ ────────▶ │   checkout   │ ─────▶ │   idle cache    │
//!   │ (max_pool)   │           │              │        └─────────────────┘
//!   └──────────────┘           │              │  miss  ┌─────────────────┐
//!          ▲                   │              │ ─────▶ │ SessionFactory  │
//!          │                   └──────────────┘        └─────────────────┘
//!          │ permit dropped             │
//!          └────────── ClientWrapper::release() ◀───────┘
//! ```
//!
//! The semaphore bounds concurrently borrowed sessions, not sessions in
//! existence. Sessions are opened lazily and cached on return when healthy;
//! the cache can be emptied at any time without affecting correctness.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, info};

use crate::config::{ConnectionDescriptor, IdentityConfig};
use crate::error::{OpcUaError, OpcUaResult, PoolError};

use super::transport::{SessionFactory, UaSession};
use super::wrapper::ClientWrapper;

// =============================================================================
// PoolStats
// =============================================================================

/// Counters of one pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    created: AtomicU64,
    create_failures: AtomicU64,
    borrows: AtomicU64,
    reuses: AtomicU64,
    discarded: AtomicU64,
    closed_on_terminate: AtomicU64,
}

impl PoolStats {
    fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_create_failure(&self) {
        self.create_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_borrow(&self, reused: bool) {
        self.borrows.fetch_add(1, Ordering::Relaxed);
        if reused {
            self.reuses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_closed_on_terminate(&self, count: usize) {
        self.closed_on_terminate
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy.
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            create_failures: self.create_failures.load(Ordering::Relaxed),
            borrows: self.borrows.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            closed_on_terminate: self.closed_on_terminate.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStatsSnapshot {
    /// Sessions opened by the factory.
    pub created: u64,
    /// Factory failures.
    pub create_failures: u64,
    /// Successful borrows.
    pub borrows: u64,
    /// Borrows served from the idle cache.
    pub reuses: u64,
    /// Sessions closed because they were invalid or disconnected.
    pub discarded: u64,
    /// Sessions closed because the pool was terminated.
    pub closed_on_terminate: u64,
}

// =============================================================================
// ConnectionPool
// =============================================================================

#[derive(Clone)]
struct PoolSettings {
    descriptor: Arc<ConnectionDescriptor>,
    identity: Arc<IdentityConfig>,
}

/// Session pool of one device.
pub struct ConnectionPool {
    device: String,
    capacity: usize,
    settings: RwLock<Option<PoolSettings>>,
    factory: Arc<dyn SessionFactory>,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn UaSession>>>,
    terminated: AtomicBool,
    stats: PoolStats,
}

impl ConnectionPool {
    /// Creates a pool admitting `descriptor.max_pool_size` borrowers (at least 1).
    pub fn new(
        device: impl Into<String>,
        descriptor: Arc<ConnectionDescriptor>,
        identity: Arc<IdentityConfig>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        let capacity = descriptor.pool_size();
        Self {
            device: device.into(),
            capacity,
            settings: RwLock::new(Some(PoolSettings {
                descriptor,
                identity,
            })),
            factory,
            semaphore: Arc::new(Semaphore::new(capacity)),
            idle: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
            stats: PoolStats::default(),
        }
    }

    /// Returns the device name.
    #[inline]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the admission limit.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of free admission slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns the number of cached idle sessions.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Returns `true` once the pool has been terminated.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Returns the descriptor the pool was built from, until termination.
    pub fn descriptor(&self) -> Option<Arc<ConnectionDescriptor>> {
        self.settings.read().as_ref().map(|s| s.descriptor.clone())
    }

    /// Returns the pool counters.
    #[inline]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Borrows a session, waiting for a free slot.
    ///
    /// Fails with [`PoolError::Terminated`] if the pool is or becomes
    /// terminated while waiting.
    pub async fn borrow(self: &Arc<Self>) -> OpcUaResult<ClientWrapper> {
        self.ensure_active()?;
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| self.terminated_error())?;
        self.checkout(permit).await
    }

    /// Borrows a session without waiting.
    ///
    /// Returns `Ok(None)` when every slot is taken.
    pub async fn try_borrow(self: &Arc<Self>) -> OpcUaResult<Option<ClientWrapper>> {
        self.ensure_active()?;
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Ok(None),
            Err(TryAcquireError::Closed) => return Err(self.terminated_error()),
        };
        self.checkout(permit).await.map(Some)
    }

    async fn checkout(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> OpcUaResult<ClientWrapper> {
        loop {
            let cached = self.idle.lock().pop();
            match cached {
                Some(session) if session.is_connected() => {
                    self.stats.record_borrow(true);
                    return Ok(ClientWrapper::pooled(self.clone(), permit, session));
                }
                Some(session) => {
                    debug!(device = %self.device, "Dropping disconnected idle session");
                    self.stats.record_discarded();
                    session.close().await;
                }
                None => break,
            }
        }

        let settings = self
            .settings
            .read()
            .clone()
            .ok_or_else(|| self.terminated_error())?;

        let session = match self
            .factory
            .create_session(&settings.descriptor, &settings.identity)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.stats.record_create_failure();
                return Err(e);
            }
        };

        self.stats.record_created();
        self.stats.record_borrow(false);
        debug!(
            device = %self.device,
            endpoint = %settings.descriptor.endpoint_url,
            "Opened pooled session"
        );
        Ok(ClientWrapper::pooled(self.clone(), permit, session))
    }

    /// Takes a returned session back.
    ///
    /// Returns the session when it must be closed instead of cached. The
    /// caller releases the admission slot afterwards.
    pub(crate) fn recycle(
        &self,
        session: Box<dyn UaSession>,
        invalid: bool,
    ) -> Option<Box<dyn UaSession>> {
        let mut idle = self.idle.lock();
        if self.terminated.load(Ordering::Acquire) {
            self.stats.record_closed_on_terminate(1);
            return Some(session);
        }
        if invalid {
            self.stats.record_discarded();
            return Some(session);
        }
        if !session.is_connected() {
            error!(
                device = %self.device,
                endpoint = %session.endpoint(),
                "Session returned healthy but no longer connected, discarding it"
            );
            self.stats.record_discarded();
            return Some(session);
        }
        idle.push(session);
        None
    }

    /// Terminates the pool and closes its idle sessions.
    ///
    /// Idempotent. Borrowed sessions are closed when returned.
    pub async fn terminate(&self) {
        for session in self.shutdown() {
            session.close().await;
        }
    }

    /// Marks the pool terminated and hands back the idle sessions to close.
    pub(crate) fn shutdown(&self) -> Vec<Box<dyn UaSession>> {
        let drained = {
            let mut idle = self.idle.lock();
            if self.terminated.swap(true, Ordering::AcqRel) {
                return Vec::new();
            }
            std::mem::take(&mut *idle)
        };

        *self.settings.write() = None;
        self.semaphore.close();
        self.stats.record_closed_on_terminate(drained.len());

        info!(
            device = %self.device,
            idle_closed = drained.len(),
            "Connection pool terminated"
        );
        drained
    }

    fn ensure_active(&self) -> OpcUaResult<()> {
        if self.is_terminated() {
            Err(self.terminated_error())
        } else {
            Ok(())
        }
    }

    fn terminated_error(&self) -> OpcUaError {
        PoolError::terminated(&self.device).into()
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("device", &self.device)
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("idle", &self.idle_count())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
