//! Application settings kept in the key-value `system_state` table, such as the
//! company branding shown on dashboards and receipts.

use crate::{
    core::{
        activity::{Activity, ActivityLog},
        rbac::{Capability, Session},
    },
    entities::{ActivityType, SystemState, system_state},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{ConnectionTrait, Set, TransactionTrait, prelude::*, sea_query::OnConflict};
use serde_json::json;
use tracing::{debug, info, instrument};

const COMPANY_NAME_KEY: &str = "branding.company_name";
const LOGO_URL_KEY: &str = "branding.logo_url";

/// Company name used until one is configured.
pub const DEFAULT_COMPANY_NAME: &str = "Atelier";

/// Company branding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branding {
    /// Display name of the company
    pub company_name: String,
    /// Public URL of the logo image
    pub logo_url: Option<String>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            company_name: DEFAULT_COMPANY_NAME.to_string(),
            logo_url: None,
        }
    }
}

/// Retrieves a value from the key-value `system_state` table.
#[instrument(skip(db))]
pub async fn get_setting<C>(db: &C, key: &str) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    let value = SystemState::find()
        .filter(system_state::Column::Key.eq(key))
        .one(db)
        .await?
        .map(|row| row.value);
    debug!("System state for key '{}': {:?}", key, value);
    Ok(value)
}

/// Sets or updates a value in the key-value `system_state` table.
#[instrument(skip(db))]
pub async fn set_setting<C>(db: &C, key: &str, value: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    let row = system_state::ActiveModel {
        key: Set(key.to_string()),
        value: Set(value.to_string()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    SystemState::insert(row)
        .on_conflict(
            OnConflict::column(system_state::Column::Key)
                .update_columns([system_state::Column::Value, system_state::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Current branding, with defaults for anything never configured.
pub async fn load_branding(db: &DatabaseConnection) -> Result<Branding> {
    let (company_name, logo_url) = tokio::try_join!(
        get_setting(db, COMPANY_NAME_KEY),
        get_setting(db, LOGO_URL_KEY)
    )?;
    Ok(Branding {
        company_name: company_name.unwrap_or_else(|| DEFAULT_COMPANY_NAME.to_string()),
        logo_url: logo_url.filter(|url| !url.is_empty()),
    })
}

/// Replaces the branding.
pub async fn update_branding(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    branding: Branding,
) -> Result<Branding> {
    session.require(Capability::ManageSettings)?;
    let company_name = branding.company_name.trim().to_string();
    if company_name.is_empty() {
        return Err(Error::validation("Company name cannot be empty"));
    }
    let logo_url = branding
        .logo_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());
    if let Some(url) = &logo_url
        && !(url.starts_with("https://") || url.starts_with("http://"))
    {
        return Err(Error::validation(format!("'{url}' is not an http(s) URL")));
    }

    let txn = db.begin().await?;
    set_setting(&txn, COMPANY_NAME_KEY, &company_name).await?;
    set_setting(&txn, LOGO_URL_KEY, logo_url.as_deref().unwrap_or_default()).await?;
    txn.commit().await?;

    info!(%company_name, "Branding updated");
    log.record(
        session,
        Activity::new(ActivityType::Update, "Branding updated", company_name.clone())
            .with_metadata(json!({ "logo_url": logo_url })),
    );
    Ok(Branding {
        company_name,
        logo_url,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_set_and_get_setting() -> Result<()> {
        let db = setup_test_db().await?;
        assert_eq!(get_setting(&db, "missing").await?, None);

        set_setting(&db, "k", "one").await?;
        set_setting(&db, "k", "two").await?;
        assert_eq!(get_setting(&db, "k").await?.as_deref(), Some("two"));
        assert_eq!(SystemState::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_branding_defaults_and_update() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        assert_eq!(load_branding(&db).await?, Branding::default());

        let saved = update_branding(
            &db,
            &log,
            &admin,
            Branding {
                company_name: " Ahşap Atölyesi ".to_string(),
                logo_url: Some("https://cdn.example.com/logo.png".to_string()),
            },
        )
        .await?;
        assert_eq!(saved.company_name, "Ahşap Atölyesi");
        assert_eq!(load_branding(&db).await?, saved);

        let cleared = update_branding(
            &db,
            &log,
            &admin,
            Branding {
                company_name: "Ahşap Atölyesi".to_string(),
                logo_url: Some(" ".to_string()),
            },
        )
        .await?;
        assert_eq!(cleared.logo_url, None);
        assert_eq!(load_branding(&db).await?.logo_url, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_branding_validation_and_permission() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let worker = session_with(&db, "worker", &[Capability::ViewFinancials]).await?;

        let bad_url = Branding {
            company_name: "X".to_string(),
            logo_url: Some("ftp://logo".to_string()),
        };
        assert!(matches!(
            update_branding(&db, &log, &admin, bad_url).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            update_branding(&db, &log, &worker, Branding::default()).await,
            Err(Error::PermissionDenied { .. })
        ));
        assert_eq!(load_branding(&db).await?, Branding::default());
        Ok(())
    }
}
