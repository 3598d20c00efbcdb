// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Generated gRPC bindings for the `mangafab.v1.MangaFab` service.
//!
//! The service mirrors the REST intent set as unary RPCs. Errors are
//! application-level (`success` + `error` on every response) so transport
//! status stays OK for programmatic clients; authorization travels in the
//! `authorization` metadata entry as a bearer token, same as REST.

pub mod v1 {
    tonic::include_proto!("mangafab.v1");
}
