//! Profile update and admin request models

use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{Language, VerificationStatus};

fn validate_farm_size(hectares: f64) -> Result<(), ValidationError> {
    if !hectares.is_finite() || hectares <= 0.0 {
        let mut err = ValidationError::new("farm_size");
        err.message = Some("Farm size must be a positive number of hectares".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct FarmerProfileInput {
    #[validate(length(min = 1, max = 200))]
    pub farm_name: Option<String>,
    #[validate(custom = "validate_farm_size")]
    pub farm_size_hectares: Option<f64>,
    #[validate(length(min = 1, max = 100))]
    pub region: Option<String>,
    #[validate(length(max = 20, message = "At most 20 primary crops"))]
    pub primary_crops: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuyerProfileInput {
    #[validate(length(min = 1, max = 200))]
    pub business_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub business_type: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub region: Option<String>,
}

/// Role-specific profile payload; must match the caller's role
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProfileUpdate {
    Farmer(FarmerProfileInput),
    Buyer(BuyerProfileInput),
}

impl Validate for ProfileUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            ProfileUpdate::Farmer(input) => input.validate(),
            ProfileUpdate::Buyer(input) => input.validate(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "First name must be 1 to 100 characters"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Last name must be 1 to 100 characters"))]
    pub last_name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub language: Option<Language>,
    #[validate]
    pub profile: Option<ProfileUpdate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub status: VerificationStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_payload_is_tagged_by_role() {
        let req: UpdateProfileRequest = serde_json::from_str(
            r#"{"firstName":"Abebe","profile":{"kind":"farmer","farmName":"Debre Zeit Farm","primaryCrops":["TEFF"]}}"#,
        )
        .unwrap();
        assert!(matches!(req.profile, Some(ProfileUpdate::Farmer(_))));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_nested_profile_is_validated() {
        let req = UpdateProfileRequest {
            profile: Some(ProfileUpdate::Farmer(FarmerProfileInput {
                farm_size_hectares: Some(-2.0),
                ..Default::default()
            })),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_invalid_email_rejected() {
        let req = UpdateProfileRequest {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }
}
