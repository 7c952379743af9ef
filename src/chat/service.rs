//! Chat service layer

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{PageWindow, Pagination};
use crate::notifications::{insert_notification, NewNotification, NotificationService, NotificationType};
use crate::orders::Order;
use crate::websocket::{RealtimeEvent, WsState};

use super::model::{ChatMessage, Conversation, SendMessageRequest};

const PREVIEW_LEN: usize = 80;

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_LEN).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

#[derive(Clone)]
pub struct ChatService {
    db_pool: PgPool,
    notifications: NotificationService,
    ws_state: WsState,
}

impl ChatService {
    pub fn new(db_pool: PgPool, notifications: NotificationService, ws_state: WsState) -> Self {
        Self {
            db_pool,
            notifications,
            ws_state,
        }
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        req: SendMessageRequest,
    ) -> ApiResult<ChatMessage> {
        if req.receiver_id == sender_id {
            return Err(ApiError::ValidationError(
                "You cannot send a message to yourself".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;

        let sender_name: Option<String> = sqlx::query_scalar(
            "SELECT TRIM(first_name || ' ' || last_name) FROM users WHERE id = $1",
        )
        .bind(sender_id)
        .fetch_optional(&mut *tx)
        .await?;
        let receiver_active: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM users WHERE id = $1")
                .bind(req.receiver_id)
                .fetch_optional(&mut *tx)
                .await?;
        if receiver_active != Some(true) {
            return Err(ApiError::NotFound("Recipient not found".to_string()));
        }

        if let Some(order_id) = req.order_id {
            let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

            let parties = [order.buyer_id, order.farmer_id];
            if !parties.contains(&sender_id) || !parties.contains(&req.receiver_id) {
                return Err(ApiError::Forbidden(
                    "Only the buyer and farmer of an order can discuss it".to_string(),
                ));
            }
        }

        // One notification per unread streak, not per message
        let has_unread: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM messages
                WHERE sender_id = $1 AND receiver_id = $2 AND is_read = FALSE
            )
            "#,
        )
        .bind(sender_id)
        .bind(req.receiver_id)
        .fetch_one(&mut *tx)
        .await?;

        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, order_id, content)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sender_id)
        .bind(req.receiver_id)
        .bind(req.order_id)
        .bind(req.content.trim())
        .fetch_one(&mut *tx)
        .await?;

        let notification = if has_unread {
            None
        } else {
            let title = match sender_name.filter(|name| !name.is_empty()) {
                Some(name) => format!("New message from {}", name),
                None => "New message".to_string(),
            };
            let stored = insert_notification(
                &mut tx,
                NewNotification::new(
                    req.receiver_id,
                    NotificationType::NewMessage,
                    title,
                    preview(&message.content),
                )
                .with_data(json!({ "senderId": sender_id, "messageId": message.id })),
            )
            .await?;
            Some(stored)
        };

        tx.commit().await?;

        self.ws_state.send_to(
            message.receiver_id,
            RealtimeEvent::Message {
                message: message.clone(),
            },
        );
        if let Some(notification) = notification {
            self.notifications.publish(vec![notification]);
        }

        Ok(message)
    }

    /// Inbox: latest message per counterpart, newest first
    pub async fn list_conversations(&self, user_id: Uuid) -> ApiResult<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            WITH thread AS (
                SELECT m.*,
                       CASE WHEN m.sender_id = $1 THEN m.receiver_id ELSE m.sender_id END AS other_id
                FROM messages m
                WHERE m.sender_id = $1 OR m.receiver_id = $1
            ),
            latest AS (
                SELECT DISTINCT ON (other_id) *
                FROM thread
                ORDER BY other_id, created_at DESC
            )
            SELECT
                l.other_id AS user_id,
                TRIM(u.first_name || ' ' || u.last_name) AS user_name,
                u.role AS user_role,
                l.id AS last_message_id,
                l.sender_id AS last_sender_id,
                l.content AS last_message,
                l.created_at AS last_message_at,
                (
                    SELECT COUNT(*) FROM messages x
                    WHERE x.sender_id = l.other_id AND x.receiver_id = $1 AND x.is_read = FALSE
                ) AS unread_count
            FROM latest l
            JOIN users u ON u.id = l.other_id
            ORDER BY l.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(conversations)
    }

    /// Thread with `other_id`, newest first; incoming messages become read
    pub async fn get_messages(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        window: PageWindow,
    ) -> ApiResult<(Vec<ChatMessage>, Pagination)> {
        self.mark_read(user_id, other_id).await?;

        let messages = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT * FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(other_id)
        .bind(window.limit)
        .bind(window.offset())
        .fetch_all(&self.db_pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1)
            "#,
        )
        .bind(user_id)
        .bind(other_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok((messages, window.with_total(total)))
    }

    /// Mark everything `other_id` sent to `user_id` as read
    pub async fn mark_read(&self, user_id: Uuid, other_id: Uuid) -> ApiResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET is_read = TRUE, read_at = NOW()
            WHERE sender_id = $1 AND receiver_id = $2 AND is_read = FALSE
            "#,
        )
        .bind(other_id)
        .bind(user_id)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn unread_count(&self, user_id: Uuid) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_messages() {
        assert_eq!(preview("short"), "short");

        let long = "ሰላም".repeat(40);
        let shown = preview(&long);
        assert!(shown.ends_with('…'));
        assert_eq!(shown.chars().count(), PREVIEW_LEN + 1);
    }
}
