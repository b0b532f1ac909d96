use super::{EntityService, Resource, ServiceResult};
use crate::data::companies::{Company, CompanyDto, CreateCompanyRequest, UpdateCompanyRequest};
use chrono::{DateTime, Utc};

pub type CompanyService = EntityService<Company>;

impl Resource for Company {
    type Dto = CompanyDto;
    type Create = CreateCompanyRequest;
    type Update = UpdateCompanyRequest;
    const DTO_FIELDS: &'static [&'static str] = &[
        "id", "code", "name", "taxnumber", "email", "employeecount", "isactive",
        "createdat", "updatedat", "rowversion",
    ];

    fn to_dto(&self) -> CompanyDto {
        CompanyDto::from(self)
    }

    fn from_create(request: CreateCompanyRequest, now: DateTime<Utc>) -> Self {
        request.into_company(now)
    }

    fn expected_version(request: &UpdateCompanyRequest) -> i64 {
        request.row_version
    }

    fn apply_update(&mut self, request: UpdateCompanyRequest, now: DateTime<Utc>) {
        request.apply(self, now);
    }
}

impl EntityService<Company> {
    /// Case-insensitive lookup by company code.
    pub async fn get_by_code(&self, code: &str) -> ServiceResult<CompanyDto> {
        self.get_by_natural_key("code", "code", code).await
    }
}
