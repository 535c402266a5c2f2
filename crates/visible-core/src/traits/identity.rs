// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity collaborator: credentials in, (user, role) out.

use crate::error::VisibleError;
use crate::types::Identity;

/// Resolves opaque connection credentials to an authenticated identity.
pub trait IdentityResolver: Send + Sync + 'static {
    /// Returns the identity behind `credential`, or `PermissionDenied`.
    fn resolve(&self, credential: &str) -> Result<Identity, VisibleError>;
}
