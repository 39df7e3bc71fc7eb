//! Sign-in flow - turning account-service credentials into a [`Session`].
//!
//! Library API for email/password front ends. The bot resolves sessions from
//! linked Discord ids instead (see `bot::resolve_session`) and never calls these.

use crate::{
    core::rbac::Session,
    errors::{Error, Result},
    services::AccountService,
};
use sea_orm::DatabaseConnection;
use tracing::{debug, info};

/// Length of a one-time verification code.
pub const VERIFICATION_CODE_LEN: usize = 8;

/// Rejects anything but exactly [`VERIFICATION_CODE_LEN`] ASCII letters and digits.
pub fn validate_verification_code(code: &str) -> Result<()> {
    let code = code.trim();
    if code.len() == VERIFICATION_CODE_LEN && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Verification code must be {VERIFICATION_CODE_LEN} letters or digits"
        )))
    }
}

/// Signs in with email and password and loads the principal's permissions.
pub async fn sign_in(
    db: &DatabaseConnection,
    accounts: &dyn AccountService,
    email: &str,
    password: &str,
) -> Result<Session> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(Error::validation("Email and password are required"));
    }
    let principal = accounts.sign_in(email, password).await?;
    info!(principal = %principal.email, "Signed in");
    Session::load(db, principal).await
}

/// Signs in with a one-time code and loads the principal's permissions.
pub async fn verify_code(
    db: &DatabaseConnection,
    accounts: &dyn AccountService,
    email: &str,
    code: &str,
) -> Result<Session> {
    validate_verification_code(code)?;
    let principal = accounts.verify_code(email.trim(), code.trim()).await?;
    info!(principal = %principal.email, "Signed in with verification code");
    Session::load(db, principal).await
}

/// Rebuilds the session for whoever the account service reports as signed in,
/// or a principal-less session when nobody is.
pub async fn restore(db: &DatabaseConnection, accounts: &dyn AccountService) -> Result<Session> {
    match accounts.current_principal().await? {
        Some(principal) => Session::load(db, principal).await,
        None => Ok(Session::system()),
    }
}

/// Lock-screen check: confirms the current principal's password without changing
/// the session.
pub async fn reauthenticate(
    accounts: &dyn AccountService,
    session: &Session,
    password: &str,
) -> Result<()> {
    let principal = session.require_principal()?;
    if accounts.verify_password(&principal.email, password).await? {
        debug!(principal = %principal.email, "Re-authenticated");
        Ok(())
    } else {
        Err(Error::validation("Incorrect password"))
    }
}

/// Ends the authenticated session and drops every cached permission.
pub async fn sign_out(accounts: &dyn AccountService, session: &mut Session) -> Result<()> {
    accounts.sign_out().await?;
    if let Some(principal) = session.principal() {
        info!(principal = %principal.email, "Signed out");
    }
    session.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{core::rbac::Capability, test_utils::*};

    #[test]
    fn test_verification_code_format() {
        assert!(validate_verification_code("AB12cd34").is_ok());
        assert!(validate_verification_code(" AB12cd34 ").is_ok());
        for bad in ["", "AB12cd3", "AB12cd345", "AB12-d34", "ÇB12cd34"] {
            assert!(validate_verification_code(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_sign_in_loads_permissions() -> Result<()> {
        let db = setup_test_db().await?;
        let role = create_test_role(&db, "Muhasebe", &[Capability::ViewFinancials]).await?;
        create_test_profile(&db, "acc-1", Some(role.id)).await?;
        let accounts = FakeAccounts::with_user("acc-1", "acc-1@example.com", "secret1");

        let session = sign_in(&db, &accounts, "acc-1@example.com", "secret1").await?;
        assert_eq!(session.user_id(), Some("acc-1"));
        assert!(session.has_permission(Capability::ViewFinancials));
        assert!(!session.has_permission(Capability::ManageStaff));

        let wrong = sign_in(&db, &accounts, "acc-1@example.com", "nope").await;
        assert!(matches!(wrong, Err(Error::Unauthenticated)));
        assert!(matches!(
            sign_in(&db, &accounts, " ", "x").await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_code_checks_format_first() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_profile(&db, "acc-1", None).await?;
        let accounts = FakeAccounts::with_user("acc-1", "acc-1@example.com", "secret1");

        assert!(matches!(
            verify_code(&db, &accounts, "acc-1@example.com", "123").await,
            Err(Error::Validation { .. })
        ));
        let session = verify_code(&db, &accounts, "acc-1@example.com", FakeAccounts::CODE).await?;
        assert_eq!(session.user_id(), Some("acc-1"));
        // No role means no permissions.
        assert!(Capability::ALL.iter().all(|c| !session.has_permission(*c)));
        Ok(())
    }

    #[tokio::test]
    async fn test_reauthenticate_and_sign_out() -> Result<()> {
        let db = setup_test_db().await?;
        let role = create_test_role(&db, "Usta", &[Capability::DeleteFile]).await?;
        create_test_profile(&db, "acc-1", Some(role.id)).await?;
        let accounts = FakeAccounts::with_user("acc-1", "acc-1@example.com", "secret1");

        let mut session = sign_in(&db, &accounts, "acc-1@example.com", "secret1").await?;
        reauthenticate(&accounts, &session, "secret1").await?;
        assert!(matches!(
            reauthenticate(&accounts, &session, "wrong!").await,
            Err(Error::Validation { .. })
        ));

        assert_eq!(restore(&db, &accounts).await?.user_id(), Some("acc-1"));
        sign_out(&accounts, &mut session).await?;
        assert!(session.principal().is_none());
        assert!(!session.has_permission(Capability::DeleteFile));
        assert!(restore(&db, &accounts).await?.principal().is_none());
        assert!(matches!(
            reauthenticate(&accounts, &session, "secret1").await,
            Err(Error::Unauthenticated)
        ));
        Ok(())
    }
}
