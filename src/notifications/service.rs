//! Notification service

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{PageWindow, Pagination};
use crate::websocket::{RealtimeEvent, WsState};

use super::model::{ListNotificationsQuery, NewNotification, Notification, NotificationListResponse};

/// Insert a notification on an open connection or transaction
pub async fn insert_notification(
    conn: &mut PgConnection,
    notification: NewNotification,
) -> Result<Notification, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (id, user_id, kind, title, message, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(notification.user_id)
    .bind(notification.kind)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(&notification.data)
    .fetch_one(conn)
    .await
}

#[derive(Clone)]
pub struct NotificationService {
    db_pool: PgPool,
    ws_state: WsState,
}

impl NotificationService {
    pub fn new(db_pool: PgPool, ws_state: WsState) -> Self {
        Self { db_pool, ws_state }
    }

    /// Push committed notifications to connected recipients
    pub fn publish(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            let recipient = notification.user_id;
            self.ws_state
                .send_to(recipient, RealtimeEvent::Notification { notification });
        }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        query: &ListNotificationsQuery,
    ) -> ApiResult<(NotificationListResponse, Pagination)> {
        let window = PageWindow::new(query.page, query.limit);
        let unread_only = query.unread_only.unwrap_or(false);

        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(window.limit)
        .bind(window.offset())
        .fetch_all(&self.db_pool)
        .await?;

        let (total, unread_count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE $2 = FALSE OR is_read = FALSE),
                COUNT(*) FILTER (WHERE is_read = FALSE)
            FROM notifications
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&self.db_pool)
        .await?;

        Ok((
            NotificationListResponse {
                notifications,
                unread_count,
            },
            window.with_total(total),
        ))
    }

    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> ApiResult<Notification> {
        sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> ApiResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = NOW() WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Notification not found".to_string()));
        }

        Ok(())
    }
}
