use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::crypto::PiiCipher;
use crate::error::{AppError, Result};
use crate::security;

/// Moderation case service: reports, decisions, and ban lookups
///
/// What matters here is the custody contract: every address is stored
/// encrypted next to its deterministic hash, and all lookups run against the
/// hash so nothing on the query path decrypts.
pub struct ModerationService {
    pool: PgPool,
    cipher: Arc<PiiCipher>,
    pepper: String,
}

/// A report as listed in the review queue (no PII)
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: i64,
    pub post_id: i64,
    pub board: String,
    pub category: String,
    pub cleared: bool,
    pub created_at: DateTime<Utc>,
}

/// Active-ban lookup result
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BanStatus {
    pub banned: bool,
    pub reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub permanent: bool,
}

impl ModerationService {
    pub fn new(pool: PgPool, cipher: Arc<PiiCipher>, pepper: String) -> Self {
        Self {
            pool,
            cipher,
            pepper,
        }
    }

    /// File a report against a post
    ///
    /// Both addresses are encrypted before storage; the reporter's
    /// deterministic hash is stored alongside for equality lookups.
    pub async fn create_report(
        &self,
        post_id: i64,
        board: &str,
        category: &str,
        post_snapshot: serde_json::Value,
        mut reporter_address: String,
        mut post_address: String,
    ) -> Result<i64> {
        let reporter_hash = security::identity_hash(&reporter_address, &self.pepper);
        let reporter_encrypted = self.cipher.encrypt(&reporter_address);
        PiiCipher::wipe(&mut reporter_address);
        let post_encrypted = self.cipher.encrypt(&post_address);
        PiiCipher::wipe(&mut post_address);

        let report_id: i64 = sqlx::query_scalar(
            "INSERT INTO moderation_reports \
             (post_id, board, category, post_snapshot, reporter_ip, reporter_ip_hash, post_ip, cleared, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, now()) \
             RETURNING id",
        )
        .bind(post_id)
        .bind(board)
        .bind(category)
        .bind(post_snapshot.to_string())
        .bind(reporter_encrypted?)
        .bind(&reporter_hash)
        .bind(post_encrypted?)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(report_id, post_id, board, category, "Report created");
        Ok(report_id)
    }

    /// Open reports for the review queue, newest first
    pub async fn list_open_reports(
        &self,
        board: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ReportSummary>> {
        let limit = limit.clamp(1, 100);

        let rows = match board {
            Some(board) => {
                sqlx::query_as::<_, ReportSummary>(
                    "SELECT id, post_id, board, category, cleared, created_at \
                     FROM moderation_reports WHERE cleared = FALSE AND board = $1 \
                     ORDER BY created_at DESC LIMIT $2",
                )
                .bind(board)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReportSummary>(
                    "SELECT id, post_id, board, category, cleared, created_at \
                     FROM moderation_reports WHERE cleared = FALSE \
                     ORDER BY created_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }

    /// Record a staff decision on a report and clear it from the queue
    pub async fn record_decision(
        &self,
        report_id: i64,
        staff_id: &str,
        action: &str,
        reason: &str,
    ) -> Result<i64> {
        let cleared = sqlx::query(
            "UPDATE moderation_reports SET cleared = TRUE WHERE id = $1 AND cleared = FALSE",
        )
        .bind(report_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if cleared == 0 {
            return Err(AppError::ReportNotFound);
        }

        let decision_id: i64 = sqlx::query_scalar(
            "INSERT INTO moderation_decisions (report_id, staff_id, action, reason, created_at) \
             VALUES ($1, $2, $3, $4, now()) \
             RETURNING id",
        )
        .bind(report_id)
        .bind(staff_id)
        .bind(action)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(report_id, decision_id, staff_id, action, "Decision recorded");
        Ok(decision_id)
    }

    /// Place a ban keyed on the identity hash
    pub async fn create_ban(
        &self,
        board: Option<&str>,
        mut host_address: String,
        staff_id: &str,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let host_hash = security::identity_hash(&host_address, &self.pepper);
        let host_encrypted = self.cipher.encrypt(&host_address);
        PiiCipher::wipe(&mut host_address);

        let ban_id: i64 = sqlx::query_scalar(
            "INSERT INTO banned_users \
             (board, global, host_ip, host_hash, staff_id, reason, active, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, now()) \
             RETURNING id",
        )
        .bind(board)
        .bind(board.is_none())
        .bind(host_encrypted?)
        .bind(&host_hash)
        .bind(staff_id)
        .bind(reason)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(ban_id, board = board.unwrap_or("*"), staff_id, "Ban created");
        Ok(ban_id)
    }

    /// Check whether an identity hash is banned on a board
    ///
    /// Equality lookup against the stored hash; no decryption on this path.
    pub async fn check_ban(&self, board: &str, ip_hash: &str) -> Result<BanStatus> {
        let row: Option<(String, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT reason, expires_at FROM banned_users \
             WHERE active = TRUE AND host_hash = $1 \
             AND (global = TRUE OR board = $2) \
             AND (expires_at IS NULL OR expires_at > now()) \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(ip_hash)
        .bind(board)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((reason, expires_at)) => BanStatus {
                banned: true,
                reason: Some(reason),
                permanent: expires_at.is_none(),
                expires_at,
            },
            None => BanStatus {
                banned: false,
                reason: None,
                expires_at: None,
                permanent: false,
            },
        })
    }
}
