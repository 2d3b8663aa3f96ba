// Principal database model
// Records are created on first federated sign-in and refreshed on later ones

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::{reviews, users};

/// Federated identity provider enumeration.
/// `twitter` and `x` are aliases on ingress; `x` is the stored symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, diesel::expression::AsExpression, diesel::deserialize::FromSqlRow)]
#[diesel(sql_type = diesel::sql_types::Text)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Google,
    X,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Google => "google",
            AuthProvider::X => "x",
        }
    }
}

impl FromStr for AuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(AuthProvider::Google),
            "twitter" | "x" => Ok(AuthProvider::X),
            _ => Err(format!("Unsupported auth provider: {}", s)),
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<DB> diesel::deserialize::FromSql<diesel::sql_types::Text, DB> for AuthProvider
where
    DB: diesel::backend::Backend,
    String: diesel::deserialize::FromSql<diesel::sql_types::Text, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> diesel::deserialize::Result<Self> {
        let value = String::from_sql(bytes)?;
        Self::from_str(&value).map_err(|e| e.into())
    }
}

impl<DB> diesel::serialize::ToSql<diesel::sql_types::Text, DB> for AuthProvider
where
    DB: diesel::backend::Backend,
    str: diesel::serialize::ToSql<diesel::sql_types::Text, DB>,
{
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, DB>,
    ) -> diesel::serialize::Result {
        self.as_str().to_sql(out)
    }
}

/// Per-principal UI preferences stored as JSONB.
/// Missing keys fall back to the documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, diesel::expression::AsExpression, diesel::deserialize::FromSqlRow)]
#[diesel(sql_type = diesel::sql_types::Jsonb)]
pub struct Preferences {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_language() -> String {
    "ja".to_string()
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: default_language(),
            dark_mode: false,
            timezone: default_timezone(),
        }
    }
}

impl diesel::deserialize::FromSql<diesel::sql_types::Jsonb, diesel::pg::Pg> for Preferences {
    fn from_sql(
        bytes: <diesel::pg::Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> diesel::deserialize::Result<Self> {
        let value = <serde_json::Value as diesel::deserialize::FromSql<
            diesel::sql_types::Jsonb,
            diesel::pg::Pg,
        >>::from_sql(bytes)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl diesel::serialize::ToSql<diesel::sql_types::Jsonb, diesel::pg::Pg> for Preferences {
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, diesel::pg::Pg>,
    ) -> diesel::serialize::Result {
        let value = serde_json::to_value(self)?;
        <serde_json::Value as diesel::serialize::ToSql<
            diesel::sql_types::Jsonb,
            diesel::pg::Pg,
        >>::to_sql(&value, &mut out.reborrow())
    }
}

/// Principal database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub auth_provider: AuthProvider,
    pub auth_provider_id: String,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New principal for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub auth_provider: AuthProvider,
    pub auth_provider_id: String,
    pub preferences: Preferences,
}

/// Partial profile update; unset fields are preserved
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserProfileChanges {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Identity attributes presented by the federation provider at sign-in
#[derive(Debug, Clone)]
pub struct SigninProfile {
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub provider: AuthProvider,
    pub provider_id: String,
}

/// What a cascading principal deletion removed
#[derive(Debug, Clone, Copy)]
pub struct DeletionReport {
    pub reviews_deleted: usize,
}

/// Errors for principal operations
#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("User not found")]
    NotFound,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("Connection pool error: {0}")]
    Pool(String),
}

fn map_not_found(err: diesel::result::Error) -> UserError {
    match err {
        diesel::result::Error::NotFound => UserError::NotFound,
        other => UserError::Database(other),
    }
}

fn map_unique_violation(err: diesel::result::Error) -> UserError {
    match &err {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            info,
        ) if info.constraint_name() == Some("idx_users_email") => UserError::DuplicateEmail,
        _ => UserError::Database(err),
    }
}

/// Validate the caller-supplied identity fields before they reach the table
pub fn validate_profile_fields(
    email: &str,
    display_name: &str,
    avatar_url: Option<&str>,
) -> Result<(), UserError> {
    if email.is_empty() || email.len() > 255 || !validator::validate_email(email) {
        return Err(UserError::InvalidArgument {
            field: "email",
            reason: "must be a valid address of at most 255 characters".to_string(),
        });
    }
    if display_name.is_empty() || display_name.chars().count() > 100 {
        return Err(UserError::InvalidArgument {
            field: "display_name",
            reason: "must be between 1 and 100 characters".to_string(),
        });
    }
    if let Some(raw) = avatar_url {
        if !raw.is_empty() && url::Url::parse(raw).is_err() {
            return Err(UserError::InvalidArgument {
                field: "avatar_url",
                reason: "must be a valid URL".to_string(),
            });
        }
    }
    Ok(())
}

impl User {
    pub async fn find_by_id(conn: &mut AsyncPgConnection, user_id: Uuid) -> Result<User, UserError> {
        users::table
            .find(user_id)
            .select(User::as_select())
            .first(conn)
            .await
            .map_err(map_not_found)
    }

    pub async fn find_by_provider(
        conn: &mut AsyncPgConnection,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<User, UserError> {
        users::table
            .filter(users::auth_provider.eq(provider))
            .filter(users::auth_provider_id.eq(provider_id))
            .select(User::as_select())
            .first(conn)
            .await
            .map_err(map_not_found)
    }

    /// Create or refresh a principal from a federated sign-in, atomically.
    /// An existing principal keeps its id, preferences, and created_at; the
    /// identity attributes are refreshed and updated_at advances. Returns the
    /// record and whether it was created.
    pub async fn upsert_on_federated_signin(
        conn: &mut AsyncPgConnection,
        profile: SigninProfile,
    ) -> Result<(User, bool), UserError> {
        validate_profile_fields(
            &profile.email,
            &profile.display_name,
            profile.avatar_url.as_deref(),
        )?;

        conn.transaction::<_, UserError, _>(|tx| {
            Box::pin(async move {
                let existing = users::table
                    .filter(users::auth_provider.eq(profile.provider))
                    .filter(users::auth_provider_id.eq(&profile.provider_id))
                    .select(User::as_select())
                    .first(tx)
                    .await
                    .optional()?;

                match existing {
                    Some(user) => {
                        let updated = diesel::update(users::table.find(user.id))
                            .set((
                                users::email.eq(profile.email.clone()),
                                users::display_name.eq(profile.display_name.clone()),
                                users::avatar_url.eq(profile.avatar_url.clone()),
                                users::updated_at.eq(Utc::now()),
                            ))
                            .returning(User::as_returning())
                            .get_result(tx)
                            .await
                            .map_err(map_unique_violation)?;
                        Ok((updated, false))
                    },
                    None => {
                        let new_user = NewUser {
                            id: Uuid::new_v4(),
                            email: profile.email.clone(),
                            display_name: profile.display_name.clone(),
                            avatar_url: profile.avatar_url.clone(),
                            auth_provider: profile.provider,
                            auth_provider_id: profile.provider_id.clone(),
                            preferences: Preferences::default(),
                        };
                        let created = diesel::insert_into(users::table)
                            .values(&new_user)
                            .returning(User::as_returning())
                            .get_result(tx)
                            .await
                            .map_err(map_unique_violation)?;
                        Ok((created, true))
                    },
                }
            })
        })
        .await
    }

    /// Partial profile update; `None` fields keep their stored values
    pub async fn update_profile(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        changes: UserProfileChanges,
    ) -> Result<User, UserError> {
        if let Some(name) = changes.display_name.as_deref() {
            if name.is_empty() || name.chars().count() > 100 {
                return Err(UserError::InvalidArgument {
                    field: "display_name",
                    reason: "must be between 1 and 100 characters".to_string(),
                });
            }
        }
        if let Some(raw) = changes.avatar_url.as_deref() {
            if !raw.is_empty() && url::Url::parse(raw).is_err() {
                return Err(UserError::InvalidArgument {
                    field: "avatar_url",
                    reason: "must be a valid URL".to_string(),
                });
            }
        }

        diesel::update(users::table.find(user_id))
            .set((&changes, users::updated_at.eq(Utc::now())))
            .returning(User::as_returning())
            .get_result(conn)
            .await
            .map_err(map_not_found)
    }

    /// Replace the preferences record wholesale
    pub async fn update_preferences(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        preferences: Preferences,
    ) -> Result<User, UserError> {
        diesel::update(users::table.find(user_id))
            .set((
                users::preferences.eq(preferences),
                users::updated_at.eq(Utc::now()),
            ))
            .returning(User::as_returning())
            .get_result(conn)
            .await
            .map_err(map_not_found)
    }

    /// Remove the principal and everything referencing it, in one transaction.
    /// Any failure rolls the whole deletion back.
    pub async fn delete_cascading(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> Result<DeletionReport, UserError> {
        conn.transaction::<_, UserError, _>(|tx| {
            Box::pin(async move {
                let reviews_deleted =
                    diesel::delete(reviews::table.filter(reviews::user_id.eq(user_id)))
                        .execute(tx)
                        .await?;

                let users_deleted = diesel::delete(users::table.find(user_id))
                    .execute(tx)
                    .await?;

                if users_deleted == 0 {
                    return Err(UserError::NotFound);
                }

                Ok(DeletionReport { reviews_deleted })
            })
        })
        .await
    }
}
