// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Gateway configuration assembled from flags/environment.

use std::collections::HashSet;

/// Resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub jwt_secret: String,
    pub tcp_server: String,
    pub udp_server: String,
    pub tcp_trigger_url: String,
    pub udp_trigger_url: String,
    /// CORS origins; `["*"]` means any.
    pub cors_allow_origins: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub max_request_size: usize,
    pub admin_users: HashSet<String>,
}

impl GatewayConfig {
    pub fn from_args(args: &crate::Args) -> Self {
        Self {
            jwt_secret: args.jwt_secret.clone(),
            tcp_server: args.tcp_server.clone(),
            udp_server: args.udp_server.clone(),
            tcp_trigger_url: args.tcp_trigger_url.clone(),
            udp_trigger_url: args.udp_trigger_url.clone(),
            cors_allow_origins: split_csv(&args.cors_allow_origins),
            rate_limit_per_minute: args.rate_limit,
            max_request_size: args.max_request_size_mb * 1024 * 1024,
            admin_users: split_csv(&args.admin_users).into_iter().collect(),
        }
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admin_users.contains(username)
    }

    pub fn allow_any_origin(&self) -> bool {
        self.cors_allow_origins.iter().any(|o| o == "*")
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.is_empty() {
            return Err("JWT secret must not be empty".into());
        }
        if self.tcp_server.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("tcp_server '{}' is not a socket address", self.tcp_server));
        }
        if self.udp_server.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("udp_server '{}' is not a socket address", self.udp_server));
        }
        for url in [&self.tcp_trigger_url, &self.udp_trigger_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("trigger URL '{url}' is not http(s)"));
            }
        }
        if self.rate_limit_per_minute == 0 {
            return Err("rate limit cannot be 0".into());
        }
        Ok(())
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
