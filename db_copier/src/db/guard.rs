//! Scoped release of job resources
//!
//! A job parks its tunnel and connections in a `ResourceGuard` as soon as
//! each one opens. Whatever the outcome of the job, `release` closes the
//! target connection, then the source connection, then the tunnel. Each close
//! is attempted independently and failures are only logged, so an in-flight
//! job error is never replaced by a cleanup error.

use crate::db::{Store, Tunnel};

/// Holds the resources of one job until release
pub struct ResourceGuard<T: Tunnel, S: Store> {
    tunnel: Option<T>,
    source: Option<S>,
    target: Option<S>,
}

impl<T: Tunnel, S: Store> Default for ResourceGuard<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Tunnel, S: Store> ResourceGuard<T, S> {
    pub fn new() -> Self {
        Self {
            tunnel: None,
            source: None,
            target: None,
        }
    }

    /// Take ownership of an open tunnel
    pub fn hold_tunnel(&mut self, tunnel: T) -> &T {
        self.tunnel.insert(tunnel)
    }

    /// Take ownership of the source connection
    pub fn hold_source(&mut self, source: S) -> &mut S {
        self.source.insert(source)
    }

    /// Take ownership of the target connection
    pub fn hold_target(&mut self, target: S) -> &mut S {
        self.target.insert(target)
    }

    /// Both connections, once both are open
    pub fn connections(&mut self) -> Option<(&mut S, &mut S)> {
        match (self.source.as_mut(), self.target.as_mut()) {
            (Some(source), Some(target)) => Some((source, target)),
            _ => None,
        }
    }

    /// Whether anything is still held
    pub fn is_empty(&self) -> bool {
        self.tunnel.is_none() && self.source.is_none() && self.target.is_none()
    }

    /// Close target, source and tunnel in that order; returns how many closes failed
    pub async fn release(mut self) -> usize {
        let mut failures = 0;

        if let Some(mut target) = self.target.take() {
            if let Err(e) = target.close().await {
                tracing::warn!(error = %e, "Failed to close target connection");
                failures += 1;
            }
        }

        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.close().await {
                tracing::warn!(error = %e, "Failed to close source connection");
                failures += 1;
            }
        }

        if let Some(mut tunnel) = self.tunnel.take() {
            if let Err(e) = tunnel.close().await {
                tracing::warn!(error = %e, "Failed to close SSH tunnel");
                failures += 1;
            }
        }

        failures
    }
}

impl<T: Tunnel, S: Store> Drop for ResourceGuard<T, S> {
    fn drop(&mut self) {
        if !self.is_empty() {
            tracing::warn!("Resource guard dropped before release; handles are closed without a clean shutdown");
        }
    }
}
