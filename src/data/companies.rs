//! Company rows, their field registry, and the request/response shapes.

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
pub struct Company {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub tax_number: Option<String>,
    pub email: Option<String>,
    pub employee_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub row_version: i64,
}

impl Company {
    /// A new active company with no optional details.
    pub fn new(code: &str, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.trim().to_owned(),
            name: name.trim().to_owned(),
            tax_number: None,
            email: None,
            employee_count: 0,
            is_active: true,
            created_at: now,
            updated_at: None,
            row_version: 1,
        }
    }
}

static SCHEMA: LazyLock<EntitySchema<Company>> = LazyLock::new(|| {
    let id = Field::new("id", "id", FieldKind::Uuid, |c: &Company| c.id.into());
    let code = Field::new("code", "code", FieldKind::Text, |c: &Company| {
        c.code.clone().into()
    });
    let name = Field::new("name", "name", FieldKind::Text, |c: &Company| {
        c.name.clone().into()
    });
    let tax_number = Field::new("taxNumber", "tax_number", FieldKind::Text, |c: &Company| {
        c.tax_number.clone().into()
    });
    let email = Field::new("email", "email", FieldKind::Text, |c: &Company| {
        c.email.clone().into()
    });
    let employee_count = Field::new(
        "employeeCount",
        "employee_count",
        FieldKind::Integer,
        |c: &Company| c.employee_count.into(),
    );
    let is_active = Field::new("isActive", "is_active", FieldKind::Bool, |c: &Company| {
        c.is_active.into()
    });
    let created_at = Field::new(
        "createdAt",
        "created_at",
        FieldKind::Timestamp,
        |c: &Company| c.created_at.into(),
    );
    let updated_at = Field::new(
        "updatedAt",
        "updated_at",
        FieldKind::Timestamp,
        |c: &Company| c.updated_at.into(),
    );

    EntitySchema {
        filters: FieldRegistry::new()
            .with(id)
            .with(code)
            .with(name)
            .with(tax_number)
            .with(email)
            .with(employee_count)
            .with(is_active)
            .with(created_at)
            .with(updated_at),
        sorts: FieldRegistry::new()
            .with(code)
            .with(name)
            .with(email)
            .with(employee_count)
            .with(is_active)
            .with(created_at)
            .with(updated_at),
        key: id,
        default_order: vec![(created_at, SortDirection::Desc)],
    }
});

impl Entity for Company {
    const NAME: &'static str = "company";

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
        vec![("code", self.code.trim().to_lowercase())]
    }
}

impl PgEntity for Company {
    const TABLE: &'static str = "companies";

    fn row(&self) -> Vec<(&'static str, FieldKind, FieldValue)> {
        vec![
            ("id", FieldKind::Uuid, self.id.into()),
            ("code", FieldKind::Text, self.code.clone().into()),
            ("name", FieldKind::Text, self.name.clone().into()),
            ("tax_number", FieldKind::Text, self.tax_number.clone().into()),
            ("email", FieldKind::Text, self.email.clone().into()),
            ("employee_count", FieldKind::Integer, self.employee_count.into()),
            ("is_active", FieldKind::Bool, self.is_active.into()),
            ("created_at", FieldKind::Timestamp, self.created_at.into()),
            ("updated_at", FieldKind::Timestamp, self.updated_at.into()),
            ("row_version", FieldKind::Integer, self.row_version.into()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CompanyDto {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub tax_number: Option<String>,
    pub email: Option<String>,
    #[ts(type = "number")]
    pub employee_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[ts(type = "number")]
    pub row_version: i64,
}

impl From<&Company> for CompanyDto {
    fn from(c: &Company) -> Self {
        Self {
            id: c.id,
            code: c.code.clone(),
            name: c.name.clone(),
            tax_number: c.tax_number.clone(),
            email: c.email.clone(),
            employee_count: c.employee_count,
            is_active: c.is_active,
            created_at: c.created_at,
            updated_at: c.updated_at,
            row_version: c.row_version,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateCompanyRequest {
    #[validate(length(min = 1, max = 32, message = "code must be 1-32 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 32))]
    #[serde(default)]
    pub tax_number: Option<String>,
    #[validate(email)]
    #[serde(default)]
    pub email: Option<String>,
    #[validate(range(min = 0, message = "employeeCount cannot be negative"))]
    #[serde(default)]
    #[ts(type = "number")]
    pub employee_count: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CreateCompanyRequest {
    pub fn into_company(self, now: DateTime<Utc>) -> Company {
        let mut company = Company::new(&self.code, &self.name, now);
        company.tax_number = self.tax_number;
        company.email = self.email;
        company.employee_count = self.employee_count;
        company.is_active = self.is_active;
        company
    }
}

/// Full replacement of a company's mutable columns, guarded by `row_version`.
#[derive(Debug, Clone, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 1, max = 32, message = "code must be 1-32 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 32))]
    #[serde(default)]
    pub tax_number: Option<String>,
    #[validate(email)]
    #[serde(default)]
    pub email: Option<String>,
    #[validate(range(min = 0, message = "employeeCount cannot be negative"))]
    #[ts(type = "number")]
    pub employee_count: i64,
    pub is_active: bool,
    #[ts(type = "number")]
    pub row_version: i64,
}

impl UpdateCompanyRequest {
    pub fn apply(self, company: &mut Company, now: DateTime<Utc>) {
        company.code = self.code.trim().to_owned();
        company.name = self.name.trim().to_owned();
        company.tax_number = self.tax_number;
        company.email = self.email;
        company.employee_count = self.employee_count;
        company.is_active = self.is_active;
        company.updated_at = Some(now);
    }
}
