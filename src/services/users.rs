use super::{EntityService, Resource, ServiceResult};
use crate::data::users::{CreateUserRequest, UpdateUserRequest, User, UserDto};
use chrono::{DateTime, Utc};

pub type UserService = EntityService<User>;

impl Resource for User {
    type Dto = UserDto;
    type Create = CreateUserRequest;
    type Update = UpdateUserRequest;
    const DTO_FIELDS: &'static [&'static str] = &[
        "id", "username", "email", "firstname", "lastname", "fullname", "isactive",
        "lastloginat", "createdat", "updatedat", "rowversion",
    ];

    fn to_dto(&self) -> UserDto {
        UserDto::from(self)
    }

    fn from_create(request: CreateUserRequest, now: DateTime<Utc>) -> Self {
        request.into_user(now)
    }

    fn expected_version(request: &UpdateUserRequest) -> i64 {
        request.row_version
    }

    fn apply_update(&mut self, request: UpdateUserRequest, now: DateTime<Utc>) {
        request.apply(self, now);
    }
}

impl EntityService<User> {
    pub async fn get_by_email(&self, email: &str) -> ServiceResult<UserDto> {
        self.get_by_natural_key("email", "email", email).await
    }

    pub async fn get_by_username(&self, username: &str) -> ServiceResult<UserDto> {
        self.get_by_natural_key("username", "username", username)
            .await
    }
}
