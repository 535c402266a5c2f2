// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! Async traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod flags;
pub mod identity;
pub mod profile;
pub mod push;
pub mod storage;

pub use adapter::PluginAdapter;
pub use flags::AvailabilityFlags;
pub use identity::IdentityResolver;
pub use profile::ProfileLookup;
pub use push::PushNotifier;
pub use storage::StorageAdapter;
