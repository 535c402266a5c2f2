// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `visible token` command.

use std::sync::Arc;

use visible_auth::TokenAuthority;
use visible_config::VisibleConfig;
use visible_core::{Role, SystemClock, UserId, VisibleError};

/// Print a bearer token for `user_id` acting as `role`.
pub fn run_token(config: &VisibleConfig, user_id: UserId, role: Role) -> Result<(), VisibleError> {
    println!("{}", mint(config, user_id, role)?);
    Ok(())
}

fn mint(config: &VisibleConfig, user_id: UserId, role: Role) -> Result<String, VisibleError> {
    let authority = TokenAuthority::from_config(&config.auth, Arc::new(SystemClock))?;
    authority.mint(user_id, role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_verifies_with_same_config() {
        let mut config = VisibleConfig::default();
        config.auth.token_secret = Some("cli-secret-long-enough-123".into());
        let token = mint(&config, 5, Role::Seeker).unwrap();

        let authority =
            TokenAuthority::from_config(&config.auth, Arc::new(SystemClock)).unwrap();
        let identity = authority.verify(&token).unwrap();
        assert_eq!(identity.user_id, 5);
        assert_eq!(identity.role, Role::Seeker);
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let config = VisibleConfig::default();
        assert!(matches!(
            mint(&config, 5, Role::Seeker),
            Err(VisibleError::Config(_))
        ));
    }
}
