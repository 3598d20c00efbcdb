// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Endpoint registry with lease-style liveness.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Registered UDP endpoints keyed by remote address.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<SocketAddr, Instant>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh an endpoint. Returns `true` for a new registration.
    pub fn register(&mut self, addr: SocketAddr) -> bool {
        self.endpoints.insert(addr, Instant::now()).is_none()
    }

    /// Refresh the heartbeat timestamp for a known endpoint.
    pub fn touch(&mut self, addr: &SocketAddr) {
        if let Some(last_seen) = self.endpoints.get_mut(addr) {
            *last_seen = Instant::now();
        }
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> bool {
        self.endpoints.remove(addr).is_some()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.endpoints.contains_key(addr)
    }

    /// Endpoints whose lease is still within the window.
    pub fn live(&self, window: Duration) -> Vec<SocketAddr> {
        self.endpoints
            .iter()
            .filter(|(_, last_seen)| last_seen.elapsed() <= window)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Endpoints silent for longer than `age` (probe candidates).
    pub fn older_than(&self, age: Duration) -> Vec<SocketAddr> {
        self.endpoints
            .iter()
            .filter(|(_, last_seen)| last_seen.elapsed() > age)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Remove expired endpoints and return their addresses.
    pub fn remove_expired(&mut self, window: Duration) -> Vec<SocketAddr> {
        let expired: Vec<SocketAddr> = self
            .endpoints
            .iter()
            .filter(|(_, last_seen)| last_seen.elapsed() > window)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &expired {
            self.endpoints.remove(addr);
        }
        expired
    }

    pub fn count(&self) -> usize {
        self.endpoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn test_register_and_refresh() {
        let mut reg = EndpointRegistry::new();
        assert!(reg.register(addr(1000)));
        assert!(!reg.register(addr(1000)));
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_remove_expired() {
        let mut reg = EndpointRegistry::new();
        reg.register(addr(1000));
        reg.register(addr(1001));

        // Backdate one endpoint past the window.
        *reg.endpoints.get_mut(&addr(1000)).unwrap() =
            Instant::now() - Duration::from_secs(100);

        let expired = reg.remove_expired(Duration::from_secs(30));
        assert_eq!(expired, vec![addr(1000)]);
        assert_eq!(reg.count(), 1);
        assert!(reg.contains(&addr(1001)));
    }

    #[test]
    fn test_live_filters_stale_entries() {
        let mut reg = EndpointRegistry::new();
        reg.register(addr(1000));
        reg.register(addr(1001));
        *reg.endpoints.get_mut(&addr(1000)).unwrap() =
            Instant::now() - Duration::from_secs(100);

        let live = reg.live(Duration::from_secs(30));
        assert_eq!(live, vec![addr(1001)]);
        // live() does not mutate; the stale entry stays until a sweep.
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn test_bounded_by_recent_registrations() {
        // Resource invariant: after a sweep the registry never holds more
        // endpoints than registrations seen within the window.
        let mut reg = EndpointRegistry::new();
        for port in 1000..1010 {
            reg.register(addr(port));
        }
        for port in 1000..1005 {
            *reg.endpoints.get_mut(&addr(port)).unwrap() =
                Instant::now() - Duration::from_secs(100);
        }
        reg.remove_expired(Duration::from_secs(30));
        assert_eq!(reg.count(), 5);
    }

    #[test]
    fn test_touch_unknown_is_noop() {
        let mut reg = EndpointRegistry::new();
        reg.touch(&addr(9999));
        assert_eq!(reg.count(), 0);
    }
}
