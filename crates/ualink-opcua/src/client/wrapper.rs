// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Borrowed session handle.
//!
//! A [`ClientWrapper`] is either a pool lease or an unmanaged session opened
//! by the `create` admission strategy. Either way the holder calls
//! [`ClientWrapper::release`] when done:
//!
//! | Origin | Healthy | Marked invalid |
//! | --- | --- | --- |
//! | pool | cached for reuse | closed |
//! | pool (terminated) | closed | closed |
//! | unmanaged | closed | closed |
//!
//! A pooled lease always gives its admission slot back, even if the wrapper
//! is dropped without `release`; the session is then closed on a detached
//! task.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tracing::warn;

use crate::error::{ConnectionError, OpcUaResult};

use super::pool::ConnectionPool;
use super::transport::UaSession;

enum Lease {
    Pooled {
        pool: Arc<ConnectionPool>,
        _permit: OwnedSemaphorePermit,
    },
    Unmanaged {
        device: String,
    },
}

/// A session on loan to one caller.
pub struct ClientWrapper {
    session: Option<Box<dyn UaSession>>,
    lease: Lease,
    invalid: bool,
}

impl ClientWrapper {
    pub(crate) fn pooled(
        pool: Arc<ConnectionPool>,
        permit: OwnedSemaphorePermit,
        session: Box<dyn UaSession>,
    ) -> Self {
        Self {
            session: Some(session),
            lease: Lease::Pooled {
                pool,
                _permit: permit,
            },
            invalid: false,
        }
    }

    /// Wraps a session that no pool manages.
    pub fn unmanaged(device: impl Into<String>, session: Box<dyn UaSession>) -> Self {
        Self {
            session: Some(session),
            lease: Lease::Unmanaged {
                device: device.into(),
            },
            invalid: false,
        }
    }

    /// Returns the session.
    pub fn session(&self) -> OpcUaResult<&dyn UaSession> {
        self.session
            .as_deref()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    /// Returns the device the session belongs to.
    pub fn device(&self) -> &str {
        match &self.lease {
            Lease::Pooled { pool, .. } => pool.device(),
            Lease::Unmanaged { device } => device,
        }
    }

    /// Returns `true` for pool leases.
    #[inline]
    pub fn is_pooled(&self) -> bool {
        matches!(self.lease, Lease::Pooled { .. })
    }

    /// Returns `true` once [`set_invalid`](Self::set_invalid) was called.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Marks the session unusable so the pool closes it on release.
    ///
    /// Has no effect on unmanaged sessions, which are always closed.
    pub fn set_invalid(&mut self) {
        if self.is_pooled() {
            self.invalid = true;
        }
    }

    /// Returns the session to its pool, or closes it.
    pub async fn release(mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let to_close = match &self.lease {
            Lease::Pooled { pool, .. } => pool.recycle(session, self.invalid),
            Lease::Unmanaged { .. } => Some(session),
        };
        if let Some(session) = to_close {
            session.close().await;
        }
        // Dropping `self` frees the admission slot.
    }
}

impl Drop for ClientWrapper {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let to_close = match &self.lease {
            Lease::Pooled { pool, .. } => pool.recycle(session, self.invalid),
            Lease::Unmanaged { .. } => Some(session),
        };
        if let Some(session) = to_close {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { session.close().await });
                }
                Err(_) => warn!(
                    device = %self.device(),
                    "Session dropped outside a runtime without being closed"
                ),
            }
        }
    }
}

impl fmt::Debug for ClientWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientWrapper")
            .field("device", &self.device())
            .field("pooled", &self.is_pooled())
            .field("invalid", &self.invalid)
            .field("endpoint", &self.session.as_ref().map(|s| s.endpoint().to_string()))
            .finish()
    }
}
