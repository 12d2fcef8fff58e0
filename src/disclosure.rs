use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::constants::DECRYPT_FAILED;
use crate::crypto::PiiCipher;
use crate::error::{AppError, Result};
use crate::reputation::StopForumSpamClient;

/// Gated disclosure workflow: queue → human approval → external submission
///
/// The submitter address is encrypted the moment a post is flagged and only
/// ever decrypted in-memory: masked for the review listing, or sent to the
/// one authorized reporting endpoint on explicit approval. The plaintext is
/// wiped immediately in both paths and never persisted or logged. Every step
/// leaves an audit row that carries no decrypted value.
pub struct DisclosureService {
    pool: PgPool,
    cipher: Arc<PiiCipher>,
    sfs: Arc<StopForumSpamClient>,
}

/// A pending report as shown to reviewing staff (address masked)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDisclosure {
    pub id: i64,
    pub post_id: i64,
    pub board: String,
    pub ip_masked: String,
    pub post_content: String,
    pub evidence: serde_json::Value,
    pub reporter_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DisclosureRow {
    id: i64,
    post_id: i64,
    board: String,
    ip_ciphertext: String,
    post_content: String,
    evidence: String,
    reporter_id: String,
    status: String,
    created_at: DateTime<Utc>,
}

const ROW_COLUMNS: &str =
    "id, post_id, board, ip_ciphertext, post_content, evidence, reporter_id, status, created_at";

impl DisclosureService {
    pub fn new(pool: PgPool, cipher: Arc<PiiCipher>, sfs: Arc<StopForumSpamClient>) -> Self {
        Self { pool, cipher, sfs }
    }

    /// Queue a flagged post for disclosure review
    ///
    /// The raw address is encrypted immediately and the parameter wiped; the
    /// plaintext outlives nothing but the encryption call.
    pub async fn queue_for_review(
        &self,
        post_id: i64,
        board: &str,
        mut raw_address: String,
        post_content: &str,
        evidence: serde_json::Value,
        reporter_id: &str,
    ) -> Result<i64> {
        let encrypted = self.cipher.encrypt(&raw_address);
        PiiCipher::wipe(&mut raw_address);
        let ciphertext = encrypted?;

        let report_id: i64 = sqlx::query_scalar(
            "INSERT INTO disclosure_reports \
             (post_id, board, ip_ciphertext, post_content, evidence, reporter_id, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending', now(), now()) \
             RETURNING id",
        )
        .bind(post_id)
        .bind(board)
        .bind(&ciphertext)
        .bind(post_content)
        .bind(evidence.to_string())
        .bind(reporter_id)
        .fetch_one(&self.pool)
        .await?;

        self.audit(report_id, reporter_id, "queued", "").await;
        tracing::info!(post_id, report_id, "Post queued for disclosure review");

        Ok(report_id)
    }

    /// List pending reports for staff review, addresses masked
    ///
    /// Decryption happens in-memory only long enough to mask; the plaintext
    /// never leaves this function.
    pub async fn list_pending(&self, page: i64, per_page: i64) -> Result<Vec<PendingDisclosure>> {
        let per_page = per_page.clamp(1, 100);
        let offset = (page.max(1) - 1) * per_page;

        let rows: Vec<DisclosureRow> = sqlx::query_as(&format!(
            "SELECT {ROW_COLUMNS} FROM disclosure_reports WHERE status = 'pending' \
             ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut plaintext = self.cipher.decrypt(&row.ip_ciphertext);
                let ip_masked = mask_address(&plaintext);
                PiiCipher::wipe(&mut plaintext);

                PendingDisclosure {
                    id: row.id,
                    post_id: row.post_id,
                    board: row.board,
                    ip_masked,
                    post_content: row.post_content,
                    evidence: serde_json::from_str(&row.evidence)
                        .unwrap_or(serde_json::Value::Null),
                    reporter_id: row.reporter_id,
                    status: row.status,
                    created_at: row.created_at,
                }
            })
            .collect())
    }

    /// Approve a pending report and submit it to the reporting endpoint
    ///
    /// The conditional status transition claims the row, so of two
    /// concurrent approvals exactly one proceeds. The record stays approved
    /// only when the submission succeeded; a decrypt or submission failure
    /// releases the claim so the report can be retried.
    pub async fn approve_and_submit(&self, report_id: i64, staff_id: &str) -> Result<()> {
        let row: Option<DisclosureRow> = sqlx::query_as(&format!(
            "UPDATE disclosure_reports SET status = 'approved', updated_at = now() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {ROW_COLUMNS}"
        ))
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(AppError::ReportNotPending);
        };

        let mut address = self.cipher.decrypt(&row.ip_ciphertext);
        if address == DECRYPT_FAILED || address.is_empty() {
            self.audit(report_id, staff_id, "decrypt_failed", "").await;
            self.release_claim(report_id).await;
            return Err(AppError::DecryptionFailed);
        }

        let evidence: serde_json::Value =
            serde_json::from_str(&row.evidence).unwrap_or(serde_json::Value::Null);
        let username = username_from_evidence(&evidence);

        // Plaintext exists only for the duration of this call
        let submitted = self.sfs.submit(&address, &username, &row.post_content).await;
        PiiCipher::wipe(&mut address);

        match submitted {
            Ok(()) => {
                self.audit(report_id, staff_id, "approved_and_submitted", "")
                    .await;
                tracing::info!(report_id, staff_id, "Disclosure report approved and submitted");
                Ok(())
            }
            Err(e) => {
                self.audit(report_id, staff_id, "submission_failed", "").await;
                self.release_claim(report_id).await;
                tracing::error!(report_id, "Disclosure submission failed: {}", e);
                Err(AppError::SubmissionFailed)
            }
        }
    }

    /// Reject a pending report; never touches the encrypted payload
    pub async fn reject(&self, report_id: i64, staff_id: &str, reason: &str) -> Result<()> {
        let affected = sqlx::query(
            "UPDATE disclosure_reports SET status = 'rejected', updated_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(report_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::ReportNotPending);
        }

        self.audit(report_id, staff_id, "rejected", reason).await;
        tracing::info!(report_id, staff_id, "Disclosure report rejected");
        Ok(())
    }

    /// Put a claimed report back into the review queue
    async fn release_claim(&self, report_id: i64) {
        let result = sqlx::query(
            "UPDATE disclosure_reports SET status = 'pending', updated_at = now() \
             WHERE id = $1 AND status = 'approved'",
        )
        .bind(report_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(report_id, "Failed to release disclosure claim: {}", e);
        }
    }

    /// Append to the disclosure audit trail; never contains a decrypted value
    async fn audit(&self, report_id: i64, staff_id: &str, action: &str, reason: &str) {
        let result = sqlx::query(
            "INSERT INTO disclosure_audit_log (report_id, staff_id, action, reason, created_at) \
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(report_id)
        .bind(staff_id)
        .bind(action)
        .bind(reason)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(report_id, "Failed to record disclosure audit entry: {}", e);
        }
    }
}

/// Mask an address for review display
///
/// Enough context for staff to act on, never the full address:
/// IPv4 `203.0.113.xxx`, IPv6 `2001:db8::xxxx`.
pub fn mask_address(address: &str) -> String {
    if address.is_empty() || address == DECRYPT_FAILED {
        return "[encrypted]".to_string();
    }

    if address.contains(':') {
        let mut groups: Vec<&str> = address.split(':').collect();
        if let Some(last) = groups.last_mut() {
            *last = "xxxx";
        }
        return groups.join(":");
    }

    let octets: Vec<&str> = address.split('.').collect();
    if octets.len() == 4 {
        let mut masked = octets;
        masked[3] = "xxx";
        return masked.join(".");
    }

    "[masked]".to_string()
}

/// Best-effort submitter name from the evidence snapshot
fn username_from_evidence(evidence: &serde_json::Value) -> String {
    evidence
        .get("author_name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("Anonymous")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_ipv4_hides_last_octet() {
        assert_eq!(mask_address("203.0.113.7"), "203.0.113.xxx");
        assert_eq!(mask_address("10.0.0.255"), "10.0.0.xxx");
    }

    #[test]
    fn test_mask_ipv6_hides_last_group() {
        assert_eq!(
            mask_address("2001:db8:85a3:0:0:8a2e:370:7334"),
            "2001:db8:85a3:0:0:8a2e:370:xxxx"
        );
        assert_eq!(mask_address("2001:db8::1"), "2001:db8::xxxx");
        assert_eq!(mask_address("::1"), "::xxxx");
    }

    #[test]
    fn test_mask_never_reveals_trailing_segment() {
        let masked = mask_address("203.0.113.254");
        assert!(!masked.contains("254"));
        let masked6 = mask_address("2001:db8::beef");
        assert!(!masked6.contains("beef"));
    }

    #[test]
    fn test_mask_sentinel_and_empty() {
        assert_eq!(mask_address(""), "[encrypted]");
        assert_eq!(mask_address(DECRYPT_FAILED), "[encrypted]");
    }

    #[test]
    fn test_mask_unparseable_value() {
        assert_eq!(mask_address("not-an-address"), "[masked]");
        assert_eq!(mask_address("1.2.3"), "[masked]");
    }

    #[test]
    fn test_username_from_evidence() {
        assert_eq!(
            username_from_evidence(&json!({"author_name": "trip#abcd"})),
            "trip#abcd"
        );
        assert_eq!(username_from_evidence(&json!({"author_name": ""})), "Anonymous");
        assert_eq!(username_from_evidence(&json!({})), "Anonymous");
        assert_eq!(username_from_evidence(&serde_json::Value::Null), "Anonymous");
    }
}
