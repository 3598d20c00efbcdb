// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Domain services for the mangafab platform.
//!
//! Everything the network fabric needs from the domain lives here:
//!
//! - the data model (users, manga, chapters, library, progress, ratings),
//! - the durable store (SQLite backend),
//! - the bearer-token and password contracts,
//! - the error taxonomy shared by the REST and gRPC surfaces.
//!
//! The fabric crates (progress bus, notify bus, chat, gateway) consume this
//! crate through [`Domain`], which bundles a [`Store`] with [`AuthKeys`] and
//! exposes the operation set as plain `Result`-returning methods.

pub mod auth;
pub mod error;
pub mod model;
pub mod service;
pub mod store;

pub use auth::AuthKeys;
pub use error::{DomainError, Result};
pub use service::Domain;
pub use store::Store;
