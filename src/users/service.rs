//! User profile service layer

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    BuyerProfile, FarmerProfile, Profile, PublicUserResponse, User, UserResponse, UserRole,
    VerificationStatus,
};
use crate::notifications::{insert_notification, NewNotification, NotificationService, NotificationType};

use super::model::{BuyerProfileInput, FarmerProfileInput, ProfileUpdate, UpdateProfileRequest};

async fn load_profile(conn: &mut PgConnection, user: &User) -> Result<Option<Profile>, sqlx::Error> {
    let profile = match user.role {
        UserRole::Farmer => sqlx::query_as::<_, FarmerProfile>(
            "SELECT * FROM farmer_profiles WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_optional(conn)
        .await?
        .map(Profile::Farmer),
        UserRole::Buyer => sqlx::query_as::<_, BuyerProfile>(
            "SELECT * FROM buyer_profiles WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_optional(conn)
        .await?
        .map(Profile::Buyer),
        UserRole::Admin => None,
    };

    Ok(profile)
}

async fn upsert_farmer_profile(
    conn: &mut PgConnection,
    user_id: Uuid,
    input: &FarmerProfileInput,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO farmer_profiles (user_id, farm_name, farm_size_hectares, region, primary_crops)
        VALUES ($1, $2, $3, $4, COALESCE($5, '{}'::text[]))
        ON CONFLICT (user_id) DO UPDATE SET
            farm_name = COALESCE($2, farmer_profiles.farm_name),
            farm_size_hectares = COALESCE($3, farmer_profiles.farm_size_hectares),
            region = COALESCE($4, farmer_profiles.region),
            primary_crops = COALESCE($5, farmer_profiles.primary_crops),
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(&input.farm_name)
    .bind(input.farm_size_hectares)
    .bind(&input.region)
    .bind(&input.primary_crops)
    .execute(conn)
    .await?;

    Ok(())
}

async fn upsert_buyer_profile(
    conn: &mut PgConnection,
    user_id: Uuid,
    input: &BuyerProfileInput,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO buyer_profiles (user_id, business_name, business_type, region)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) DO UPDATE SET
            business_name = COALESCE($2, buyer_profiles.business_name),
            business_type = COALESCE($3, buyer_profiles.business_type),
            region = COALESCE($4, buyer_profiles.region),
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(&input.business_name)
    .bind(&input.business_type)
    .bind(&input.region)
    .execute(conn)
    .await?;

    Ok(())
}

/// Profile payload kind must match the account role
fn check_profile_role(role: UserRole, profile: &ProfileUpdate) -> ApiResult<()> {
    match (role, profile) {
        (UserRole::Farmer, ProfileUpdate::Farmer(_)) | (UserRole::Buyer, ProfileUpdate::Buyer(_)) => {
            Ok(())
        }
        _ => Err(ApiError::ValidationError(format!(
            "Profile data does not match the {} role",
            role.as_str()
        ))),
    }
}

#[derive(Clone)]
pub struct UserService {
    db_pool: PgPool,
    notifications: NotificationService,
}

impl UserService {
    pub fn new(db_pool: PgPool, notifications: NotificationService) -> Self {
        Self {
            db_pool,
            notifications,
        }
    }

    async fn find_user(&self, conn: &mut PgConnection, user_id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// Current user with role profile
    pub async fn get_me(&self, user_id: Uuid) -> ApiResult<UserResponse> {
        let mut conn = self.db_pool.acquire().await?;
        let user = self.find_user(&mut *conn, user_id).await?;
        let profile = load_profile(&mut *conn, &user).await?;

        Ok(UserResponse::from(user).with_profile(profile))
    }

    /// Public view of another user; contact details are omitted
    pub async fn get_public_profile(&self, user_id: Uuid) -> ApiResult<PublicUserResponse> {
        let mut conn = self.db_pool.acquire().await?;
        let user = self.find_user(&mut *conn, user_id).await?;
        if !user.is_active || !user.is_registered() {
            return Err(ApiError::NotFound("User not found".to_string()));
        }
        let profile = load_profile(&mut *conn, &user).await?;

        Ok(PublicUserResponse {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            is_verified: user.is_verified,
            created_at: user.created_at,
            profile,
        })
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> ApiResult<UserResponse> {
        let mut tx = self.db_pool.begin().await?;

        let user = self.find_user(&mut tx, user_id).await?;
        if let Some(profile) = &req.profile {
            check_profile_role(user.role, profile)?;
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                language = COALESCE($5, language),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(req.email.as_deref().map(str::to_lowercase))
        .bind(req.language)
        .fetch_one(&mut *tx)
        .await?;

        match &req.profile {
            Some(ProfileUpdate::Farmer(input)) => {
                upsert_farmer_profile(&mut tx, user_id, input).await?
            }
            Some(ProfileUpdate::Buyer(input)) => {
                upsert_buyer_profile(&mut tx, user_id, input).await?
            }
            None => {}
        }

        let profile = load_profile(&mut tx, &user).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user_id, "Profile updated");

        Ok(UserResponse::from(user).with_profile(profile))
    }

    /// Admin decision on a farmer under review
    pub async fn set_farmer_verification(
        &self,
        admin_id: Uuid,
        farmer_id: Uuid,
        status: VerificationStatus,
    ) -> ApiResult<FarmerProfile> {
        let mut tx = self.db_pool.begin().await?;

        let current = sqlx::query_as::<_, FarmerProfile>(
            "SELECT * FROM farmer_profiles WHERE user_id = $1 FOR UPDATE",
        )
        .bind(farmer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Farmer profile not found".to_string()))?;

        if !current.verification_status.can_transition_to(status) {
            return Err(ApiError::ValidationError(format!(
                "Cannot change verification from {:?} to {:?}",
                current.verification_status, status
            )));
        }

        let profile = sqlx::query_as::<_, FarmerProfile>(
            r#"
            UPDATE farmer_profiles SET verification_status = $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(farmer_id)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;

        let message = match status {
            VerificationStatus::Verified => "Your farm has been verified",
            _ => "Your farm verification was rejected",
        };
        let notification = insert_notification(
            &mut tx,
            NewNotification::new(farmer_id, NotificationType::Account, "Farm verification", message),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(farmer_id = %farmer_id, admin_id = %admin_id, status = ?status, "Farmer verification updated");
        self.notifications.publish(vec![notification]);

        Ok(profile)
    }

    /// Activate or deactivate an account; deactivation ends all sessions
    pub async fn set_active(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        is_active: bool,
    ) -> ApiResult<UserResponse> {
        if admin_id == user_id && !is_active {
            return Err(ApiError::ValidationError(
                "You cannot deactivate your own account".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(is_active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        if !is_active {
            let revoked = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tracing::debug!(user_id = %user_id, revoked, "Sessions revoked");
        }

        tx.commit().await?;

        tracing::info!(user_id = %user_id, admin_id = %admin_id, is_active, "Account status changed");

        Ok(UserResponse::from(user))
    }
}
