use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::pair_coordinates;
use crate::models::usermodel::{Profile, ProfileUpdate, User, UserRole};

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub full_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(
        length(min = 1, message = "Password is required"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: String,

    #[validate(
        length(min = 1, message = "Confirm Password is required"),
        must_match(other = "password", message = "passwords do not match")
    )]
    #[serde(rename = "passwordConfirm")]
    pub password_confirm: String,

    #[validate(length(min = 5, max = 20, message = "Phone number is invalid"))]
    pub phone: Option<String>,

    #[validate(custom = "validate_signup_role")]
    pub role: Option<UserRole>,
}

fn validate_signup_role(role: &UserRole) -> Result<(), ValidationError> {
    match role {
        UserRole::User | UserRole::Mechanic => Ok(()),
        UserRole::Admin => Err(ValidationError::new("admin_role_not_allowed")),
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoginUserDto {
    #[validate(length(min = 1, message = "Email is required"), email(message = "Email is invalid"))]
    pub email: String,
    #[validate(
        length(min = 1, message = "Password is required"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterUserDto {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub phone: Option<String>,
    pub is_verified: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl FilterUserDto {
    pub fn filter_user(user: &User, profile: &Profile) -> Self {
        FilterUserDto {
            id: user.id.to_string(),
            email: user.email.to_owned(),
            full_name: profile.full_name.to_owned(),
            role: profile.role.to_str().to_string(),
            phone: profile.phone.clone(),
            is_verified: profile.is_verified,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserData {
    pub user: FilterUserDto,
    pub profile: Profile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponseDto {
    pub status: String,
    pub data: UserData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserLoginResponseDto {
    pub status: String,
    pub token: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProfileUpdateDto {
    #[validate(length(min = 1, max = 100, message = "Name cannot be empty"))]
    pub full_name: Option<String>,

    #[validate(length(min = 5, max = 20, message = "Phone number is invalid"))]
    pub phone: Option<String>,

    pub is_available: Option<bool>,

    #[validate(length(max = 30, message = "Too many services"))]
    pub services_offered: Option<Vec<String>>,

    #[validate(length(max = 255, message = "Location is too long"))]
    pub location: Option<String>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ProfileUpdateDto {
    pub fn into_update(self) -> Result<ProfileUpdate, String> {
        let coordinates = pair_coordinates(self.latitude, self.longitude)?;
        Ok(ProfileUpdate {
            full_name: self.full_name.map(|s| s.trim().to_string()),
            phone: self.phone,
            is_available: self.is_available,
            services_offered: self.services_offered,
            location: self.location,
            coordinates,
            verification_photo_url: None,
        })
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct ImageUploadDto {
    #[validate(length(min = 1, message = "Image data is required"))]
    pub image_base64: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct MechanicQueryDto {
    #[validate(length(min = 1, max = 100))]
    pub service: Option<String>,
    pub verified_only: Option<bool>,
    #[validate(range(min = 1, max = 100_000))]
    pub page: Option<usize>,
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyMechanicDto {
    pub target_user_id: Uuid,
    pub verified: bool,
}
