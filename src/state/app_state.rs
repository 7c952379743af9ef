//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::AuthService;
use crate::catalog::CatalogService;
use crate::chat::ChatService;
use crate::config::{Config, Environment};
use crate::notifications::NotificationService;
use crate::orders::OrderService;
use crate::payments::{PaymentService, WebhookVerifier};
use crate::reviews::ReviewService;
use crate::users::UserService;
use crate::websocket::WsState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub environment: Environment,
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub catalog_service: Arc<CatalogService>,
    pub order_service: Arc<OrderService>,
    pub payment_service: Arc<PaymentService>,
    pub review_service: Arc<ReviewService>,
    pub chat_service: Arc<ChatService>,
    pub notification_service: Arc<NotificationService>,
    pub ws_state: WsState,
}

impl AppState {
    /// Wire every service onto one pool and one realtime channel
    pub fn new(db_pool: PgPool, config: &Config, ws_state: WsState) -> Self {
        let notifications = NotificationService::new(db_pool.clone(), ws_state.clone());

        let auth_service = AuthService::new(
            db_pool.clone(),
            config.jwt_secret.clone(),
            config.jwt_refresh_secret.clone(),
            config.jwt_access_token_ttl_seconds,
            config.jwt_refresh_token_ttl_days,
            config.otp_expiry_seconds,
            config.bcrypt_cost,
            !config.environment.is_production(),
        );

        let webhook = config
            .payment_webhook_secret
            .as_ref()
            .map(|secret| WebhookVerifier::new(secret.clone(), config.payment_webhook_tolerance_seconds));
        if webhook.is_none() {
            tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, payment callbacks will be refused");
        }

        Self {
            auth_service: Arc::new(auth_service),
            user_service: Arc::new(UserService::new(db_pool.clone(), notifications.clone())),
            catalog_service: Arc::new(CatalogService::new(db_pool.clone())),
            order_service: Arc::new(OrderService::new(
                db_pool.clone(),
                notifications.clone(),
                config.escrow_release_days,
            )),
            payment_service: Arc::new(PaymentService::new(
                db_pool.clone(),
                notifications.clone(),
                config.payment_checkout_base_url.clone(),
                webhook,
            )),
            review_service: Arc::new(ReviewService::new(db_pool.clone(), notifications.clone())),
            chat_service: Arc::new(ChatService::new(
                db_pool.clone(),
                notifications.clone(),
                ws_state.clone(),
            )),
            notification_service: Arc::new(notifications),
            ws_state,
            db_pool,
            environment: config.environment,
        }
    }
}

impl FromRef<AppState> for WsState {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ws_state.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}
