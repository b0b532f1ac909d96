//! User accounts as seen by the catalog (no credentials).

use super::postgres::PgEntity;
use super::source::Entity;
use crate::query::{EntitySchema, Field, FieldKind, FieldRegistry, FieldValue, SortDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use ts_rs::TS;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub row_version: i64,
}

impl User {
    pub fn new(username: &str, email: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.trim().to_owned(),
            email: email.trim().to_owned(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: None,
            row_version: 1,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

static SCHEMA: LazyLock<EntitySchema<User>> = LazyLock::new(|| {
    let id = Field::new("id", "id", FieldKind::Uuid, |u: &User| u.id.into());
    let username = Field::new("username", "username", FieldKind::Text, |u: &User| {
        u.username.clone().into()
    });
    let email = Field::new("email", "email", FieldKind::Text, |u: &User| {
        u.email.clone().into()
    });
    let first_name = Field::new("firstName", "first_name", FieldKind::Text, |u: &User| {
        u.first_name.clone().into()
    });
    let last_name = Field::new("lastName", "last_name", FieldKind::Text, |u: &User| {
        u.last_name.clone().into()
    });
    let is_active = Field::new("isActive", "is_active", FieldKind::Bool, |u: &User| {
        u.is_active.into()
    });
    let last_login_at = Field::new(
        "lastLoginAt",
        "last_login_at",
        FieldKind::Timestamp,
        |u: &User| u.last_login_at.into(),
    );
    let created_at = Field::new("createdAt", "created_at", FieldKind::Timestamp, |u: &User| {
        u.created_at.into()
    });
    let updated_at = Field::new("updatedAt", "updated_at", FieldKind::Timestamp, |u: &User| {
        u.updated_at.into()
    });

    EntitySchema {
        filters: FieldRegistry::new()
            .with(id)
            .with(username)
            .with(email)
            .with(first_name)
            .with(last_name)
            .with(is_active)
            .with(last_login_at)
            .with(created_at)
            .with(updated_at),
        sorts: FieldRegistry::new()
            .with(username)
            .with(email)
            .with(first_name)
            .with(last_name)
            .with(last_login_at)
            .with(created_at)
            .with(updated_at),
        key: id,
        default_order: vec![(created_at, SortDirection::Desc)],
    }
});

impl Entity for User {
    const NAME: &'static str = "user";

    fn id(&self) -> Uuid {
        self.id
    }

    fn row_version(&self) -> i64 {
        self.row_version
    }

    fn set_row_version(&mut self, version: i64) {
        self.row_version = version;
    }

    fn schema() -> &'static EntitySchema<Self> {
        &SCHEMA
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            ("username", self.username.trim().to_lowercase()),
            ("email", self.email.trim().to_lowercase()),
        ]
    }
}

impl PgEntity for User {
    const TABLE: &'static str = "users";

    fn row(&self) -> Vec<(&'static str, FieldKind, FieldValue)> {
        vec![
            ("id", FieldKind::Uuid, self.id.into()),
            ("username", FieldKind::Text, self.username.clone().into()),
            ("email", FieldKind::Text, self.email.clone().into()),
            ("first_name", FieldKind::Text, self.first_name.clone().into()),
            ("last_name", FieldKind::Text, self.last_name.clone().into()),
            ("is_active", FieldKind::Bool, self.is_active.into()),
            ("last_login_at", FieldKind::Timestamp, self.last_login_at.into()),
            ("created_at", FieldKind::Timestamp, self.created_at.into()),
            ("updated_at", FieldKind::Timestamp, self.updated_at.into()),
            ("row_version", FieldKind::Integer, self.row_version.into()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[ts(type = "number")]
    pub row_version: i64,
}

impl From<&User> for UserDto {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            full_name: u.full_name(),
            is_active: u.is_active,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
            updated_at: u.updated_at,
            row_version: u.row_version,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 64, message = "username must be 3-64 characters"))]
    pub username: String,
    #[validate(email(message = "email is not valid"))]
    pub email: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub first_name: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub last_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CreateUserRequest {
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        let mut user = User::new(&self.username, &self.email, now);
        user.first_name = self.first_name.trim().to_owned();
        user.last_name = self.last_name.trim().to_owned();
        user.is_active = self.is_active;
        user
    }
}

#[derive(Debug, Clone, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 64, message = "username must be 3-64 characters"))]
    pub username: String,
    #[validate(email(message = "email is not valid"))]
    pub email: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub first_name: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub last_name: String,
    pub is_active: bool,
    #[ts(type = "number")]
    pub row_version: i64,
}

impl UpdateUserRequest {
    pub fn apply(self, user: &mut User, now: DateTime<Utc>) {
        user.username = self.username.trim().to_owned();
        user.email = self.email.trim().to_owned();
        user.first_name = self.first_name.trim().to_owned();
        user.last_name = self.last_name.trim().to_owned();
        user.is_active = self.is_active;
        user.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_natural_keys_are_reported() {
        let user = User::new("JDoe", "J.Doe@Example.com", Utc::now());
        assert_eq!(
            user.unique_keys(),
            vec![
                ("username", "jdoe".to_owned()),
                ("email", "j.doe@example.com".to_owned())
            ]
        );
    }

    #[test]
    fn dto_carries_full_name() {
        let mut user = User::new("jdoe", "jdoe@example.com", Utc::now());
        user.first_name = "Jane".into();
        let dto = UserDto::from(&user);
        assert_eq!(dto.full_name, "Jane");
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["fullName"], "Jane");
        assert_eq!(json["rowVersion"], 1);
    }

    #[test]
    fn create_request_rejects_bad_email() {
        let request: CreateUserRequest =
            serde_json::from_str(r#"{"username":"jdoe","email":"nope"}"#).unwrap();
        assert!(request.validate().is_err());
        let request: CreateUserRequest =
            serde_json::from_str(r#"{"username":"jdoe","email":"jdoe@example.com"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert!(request.is_active);
    }

    #[test]
    fn last_login_is_sortable_but_not_active_flag() {
        let schema = User::schema();
        assert!(schema.sorts.contains("lastLoginAt"));
        assert!(schema.filters.contains("isActive"));
        assert!(!schema.sorts.contains("isActive"));
    }
}
