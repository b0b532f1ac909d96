//! Membership links between users and companies.

use super::companies::Company;
use super::postgres::PgEntity;
use super::source::{Entity, EntitySource, IncludeApplier, SourceError};
use super::users::User;
use crate::query::{
    CompiledQuery, Condition, EntitySchema, Field, FieldKind, FieldRegistry, FieldValue, Filter,
    SearchBuilder, SortDirection, Test,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use ts_rs::TS;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserCompany {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub role: String,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub row_version: i64,
    /// Filled by [`UserCompanyIncludes`] on detail lookups only.
    #[sqlx(skip)]
    pub user: Option<UserSummary>,
    #[sqlx(skip)]
    pub company: Option<CompanySummary>,
}

impl UserCompany {
    pub fn new(user_id: Uuid, company_id: Uuid, role: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            company_id,
            role: role.trim().to_owned(),
            is_default: false,
            is_active: true,
            created_at: now,
            updated_at: None,
            row_version: 1,
            user: None,
            company: None,
        }
    }

    /// Natural-key value for a `(user, company)` pair.
    pub fn pair_key(user_id: Uuid, company_id: Uuid) -> String {
        format!("{user_id}:{company_id}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            full_name: u.full_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CompanySummary {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

impl From<&Company> for CompanySummary {
    fn from(c: &Company) -> Self {
        Self {
            id: c.id,
            code: c.code.clone(),
            name: c.name.clone(),
        }
    }
}

static SCHEMA: LazyLock<EntitySchema<UserCompany>> = LazyLock::new(|| {
    let id = Field::new("id", "id", FieldKind::Uuid, |l: &UserCompany| l.id.into());
    let user_id = Field::new("userId", "user_id", FieldKind::Uuid, |l: &UserCompany| {
        l.user_id.into()
    });
    let company_id = Field::new(
        "companyId",
        "company_id",
        FieldKind::Uuid,
        |l: &UserCompany| l.company_id.into(),
    );
    let role = Field::new("role", "role", FieldKind::Text, |l: &UserCompany| {
        l.role.clone().into()
    });
    let is_default = Field::new(
        "isDefault",
        "is_default",
        FieldKind::Bool,
        |l: &UserCompany| l.is_default.into(),
    );
    let is_active = Field::new("isActive", "is_active", FieldKind::Bool, |l: &UserCompany| {
        l.is_active.into()
    });
    let created_at = Field::new(
        "createdAt",
        "created_at",
        FieldKind::Timestamp,
        |l: &UserCompany| l.created_at.into(),
    );
    let updated_at = Field::new(
        "updatedAt",
        "updated_at",
        FieldKind::Timestamp,
        |l: &UserCompany| l.updated_at.into(),
    );

    EntitySchema {
        filters: FieldRegistry::new()
            .with(id)
            .with(user_id)
            .with(company_id)
            .with(role)
            .with(is_default)
            .with(is_active)
            .with(created_at)
            .with(updated_at),
        sorts: FieldRegistry::new()
            .with(role)
            .with(is_default)
            .with(created_at)
            .with(updated_at),
        key: id,
        default_order: vec![(created_at, SortDirection::Desc)],
    }
});

impl Entity for UserCompany {
    const NAME: &'static str = "usercompany";

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
        vec![("pair", Self::pair_key(self.user_id, self.company_id))]
    }
}

impl PgEntity for UserCompany {
    const TABLE: &'static str = "user_companies";

    fn row(&self) -> Vec<(&'static str, FieldKind, FieldValue)> {
        vec![
            ("id", FieldKind::Uuid, self.id.into()),
            ("user_id", FieldKind::Uuid, self.user_id.into()),
            ("company_id", FieldKind::Uuid, self.company_id.into()),
            ("role", FieldKind::Text, self.role.clone().into()),
            ("is_default", FieldKind::Bool, self.is_default.into()),
            ("is_active", FieldKind::Bool, self.is_active.into()),
            ("created_at", FieldKind::Timestamp, self.created_at.into()),
            ("updated_at", FieldKind::Timestamp, self.updated_at.into()),
            ("row_version", FieldKind::Integer, self.row_version.into()),
        ]
    }
}

/// Attaches user and company summaries to fetched links, one batched query
/// per side.
pub struct UserCompanyIncludes {
    pub users: Arc<dyn EntitySource<User>>,
    pub companies: Arc<dyn EntitySource<Company>>,
}

async fn load_by_ids<E: Entity>(
    source: &dyn EntitySource<E>,
    ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, E>, SourceError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let schema = E::schema();
    let values = ids.into_iter().map(FieldValue::Uuid).collect();
    let query = CompiledQuery {
        filter: Filter::all().with(Condition::new(schema.key, Test::In(values))),
        order: SearchBuilder::<E>::for_entity().order(&[]),
        window: None,
    };
    let rows = source.fetch(&query).await?;
    Ok(rows.into_iter().map(|e| (e.id(), e)).collect())
}

fn distinct(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = ids.collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[async_trait]
impl IncludeApplier<UserCompany> for UserCompanyIncludes {
    async fn apply(&self, items: &mut [UserCompany]) -> Result<(), SourceError> {
        let user_ids = distinct(items.iter().map(|l| l.user_id));
        let company_ids = distinct(items.iter().map(|l| l.company_id));
        let (users, companies) = futures::try_join!(
            load_by_ids(self.users.as_ref(), user_ids),
            load_by_ids(self.companies.as_ref(), company_ids),
        )?;

        for link in items.iter_mut() {
            link.user = users.get(&link.user_id).map(UserSummary::from);
            link.company = companies.get(&link.company_id).map(CompanySummary::from);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserCompanyDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub role: String,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[ts(type = "number")]
    pub row_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub user: Option<UserSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub company: Option<CompanySummary>,
}

impl From<&UserCompany> for UserCompanyDto {
    fn from(l: &UserCompany) -> Self {
        Self {
            id: l.id,
            user_id: l.user_id,
            company_id: l.company_id,
            role: l.role.clone(),
            is_default: l.is_default,
            is_active: l.is_active,
            created_at: l.created_at,
            updated_at: l.updated_at,
            row_version: l.row_version,
            user: l.user.clone(),
            company: l.company.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateUserCompanyRequest {
    pub user_id: Uuid,
    pub company_id: Uuid,
    #[validate(length(min = 1, max = 32, message = "role must be 1-32 characters"))]
    pub role: String,
    #[serde(default)]
    pub is_default: bool,
}

impl CreateUserCompanyRequest {
    pub fn into_link(self, now: DateTime<Utc>) -> UserCompany {
        let mut link = UserCompany::new(self.user_id, self.company_id, &self.role, now);
        link.is_default = self.is_default;
        link
    }
}

/// The user/company pair is fixed once a link exists.
#[derive(Debug, Clone, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserCompanyRequest {
    #[validate(length(min = 1, max = 32, message = "role must be 1-32 characters"))]
    pub role: String,
    pub is_default: bool,
    pub is_active: bool,
    #[ts(type = "number")]
    pub row_version: i64,
}

impl UpdateUserCompanyRequest {
    pub fn apply(self, link: &mut UserCompany, now: DateTime<Utc>) {
        link.role = self.role.trim().to_owned();
        link.is_default = self.is_default;
        link.is_active = self.is_active;
        link.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemorySource;

    #[tokio::test]
    async fn includes_attach_summaries() {
        let now = Utc::now();
        let mut user = User::new("jdoe", "jdoe@example.com", now);
        user.first_name = "Jane".into();
        user.last_name = "Doe".into();
        let company = Company::new("ACME", "Acme", now);

        let includes = UserCompanyIncludes {
            users: Arc::new(MemorySource::with_rows([user.clone()])),
            companies: Arc::new(MemorySource::with_rows([company.clone()])),
        };
        let mut links = vec![
            UserCompany::new(user.id, company.id, "admin", now),
            UserCompany::new(user.id, Uuid::new_v4(), "member", now),
        ];
        includes.apply(&mut links).await.unwrap();

        assert_eq!(links[0].user.as_ref().unwrap().full_name, "Jane Doe");
        assert_eq!(links[0].company.as_ref().unwrap().code, "ACME");
        assert!(links[1].user.is_some());
        assert!(links[1].company.is_none());
    }

    #[test]
    fn pair_is_the_natural_key() {
        let (u, c) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let link = UserCompany::new(u, c, "admin", Utc::now());
        assert_eq!(link.unique_keys(), vec![("pair", format!("{u}:{c}"))]);
    }

    #[test]
    fn summaries_are_omitted_from_json_when_absent() {
        let link = UserCompany::new(Uuid::nil(), Uuid::nil(), "member", Utc::now());
        let json = serde_json::to_value(UserCompanyDto::from(&link)).unwrap();
        assert!(json.get("user").is_none());
        assert_eq!(json["role"], "member");
    }
}
