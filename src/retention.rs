use std::collections::BTreeMap;

use sqlx::PgPool;

use crate::config::RetentionConfig;
use crate::error::Result;

/// What expiry does to a protected dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionOp {
    /// Set the PII columns to NULL, keep the row
    Nullify,
    /// Remove the whole row
    Delete,
}

/// One protected dataset and its retention rule, declared as data
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Stable name used in run results and logs
    pub dataset: &'static str,
    pub table: &'static str,
    /// Timestamp column the retention window is measured against
    pub age_column: &'static str,
    /// PII columns to nullify (empty for Delete policies)
    pub columns: &'static [&'static str],
    pub days: u32,
    pub op: RetentionOp,
    /// Extra guard, e.g. only rows whose ban is no longer active
    pub precondition: Option<&'static str>,
}

/// The protected datasets, with retention windows from configuration
pub fn policies(cfg: &RetentionConfig) -> Vec<RetentionPolicy> {
    vec![
        RetentionPolicy {
            dataset: "moderation_reports_ip",
            table: "moderation_reports",
            age_column: "created_at",
            columns: &["reporter_ip", "post_ip"],
            days: cfg.report_ip_days,
            op: RetentionOp::Nullify,
            precondition: None,
        },
        RetentionPolicy {
            dataset: "banned_users_ip",
            table: "banned_users",
            age_column: "expires_at",
            columns: &["host_ip", "forwarded_ip", "staff_ip"],
            days: cfg.ban_ip_days,
            op: RetentionOp::Nullify,
            precondition: Some("active = FALSE"),
        },
        RetentionPolicy {
            dataset: "disclosure_reports",
            table: "disclosure_reports",
            age_column: "created_at",
            columns: &[],
            days: cfg.disclosure_days,
            op: RetentionOp::Delete,
            precondition: Some("status <> 'pending'"),
        },
        RetentionPolicy {
            dataset: "moderation_decisions",
            table: "moderation_decisions",
            age_column: "created_at",
            columns: &[],
            days: cfg.decision_days,
            op: RetentionOp::Delete,
            precondition: None,
        },
        RetentionPolicy {
            dataset: "moderation_audit_ip",
            table: "moderation_audit_log",
            age_column: "created_at",
            columns: &["staff_ip"],
            days: cfg.audit_ip_days,
            op: RetentionOp::Nullify,
            precondition: None,
        },
    ]
}

/// Scheduled PII retention engine
///
/// Each policy runs as a single idempotent statement: re-running right after
/// a successful pass affects zero rows, so overlapping invocations need no
/// lock. Failures are isolated per dataset. Every pass that touches rows
/// appends one ledger entry, the PII-free audit trail proving deletion.
pub struct RetentionEngine {
    pool: PgPool,
    policies: Vec<RetentionPolicy>,
}

impl RetentionEngine {
    pub fn new(pool: PgPool, cfg: &RetentionConfig) -> Self {
        Self {
            pool,
            policies: policies(cfg),
        }
    }

    /// Run every retention policy, returning rows affected per dataset
    pub async fn run_all(&self) -> BTreeMap<&'static str, u64> {
        let mut results = BTreeMap::new();

        for policy in &self.policies {
            let affected = match self.run_policy(policy).await {
                Ok(affected) => affected,
                Err(e) => {
                    tracing::error!(
                        dataset = policy.dataset,
                        "Retention pass failed: {}",
                        e
                    );
                    0
                }
            };

            if affected > 0 {
                tracing::info!(
                    dataset = policy.dataset,
                    rows = affected,
                    days = policy.days,
                    "Purged expired PII"
                );
                self.record_ledger(policy, affected).await;
            }

            results.insert(policy.dataset, affected);
        }

        let total: u64 = results.values().sum();
        tracing::info!(total_rows = total, "PII retention sweep completed");

        results
    }

    async fn run_policy(&self, policy: &RetentionPolicy) -> Result<u64> {
        let sql = build_sql(policy);
        let result = sqlx::query(&sql)
            .bind(policy.days as i32)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Append the audit-trail row; a ledger failure is logged, never fatal
    async fn record_ledger(&self, policy: &RetentionPolicy, affected: u64) {
        let columns = if policy.columns.is_empty() {
            "*".to_string()
        } else {
            policy.columns.join(",")
        };

        let result = sqlx::query(
            "INSERT INTO pii_retention_log (table_name, column_names, rows_affected, retention_days, executed_at) \
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(policy.table)
        .bind(columns)
        .bind(affected as i64)
        .bind(policy.days as i32)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to record retention ledger entry: {}", e);
        }
    }
}

/// Build the single idempotent statement for one policy
///
/// Identifiers come from the static policy table above, never from input.
fn build_sql(policy: &RetentionPolicy) -> String {
    let age_clause = format!(
        "{} < now() - ($1 * interval '1 day')",
        policy.age_column
    );
    let guard = policy
        .precondition
        .map(|p| format!(" AND {p}"))
        .unwrap_or_default();

    match policy.op {
        RetentionOp::Nullify => {
            let assignments = policy
                .columns
                .iter()
                .map(|c| format!("{c} = NULL"))
                .collect::<Vec<_>>()
                .join(", ");
            let not_null = policy
                .columns
                .iter()
                .map(|c| format!("{c} IS NOT NULL"))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!(
                "UPDATE {} SET {assignments} WHERE ({not_null}) AND {age_clause}{guard}",
                policy.table
            )
        }
        RetentionOp::Delete => {
            format!("DELETE FROM {} WHERE {age_clause}{guard}", policy.table)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RetentionConfig {
        RetentionConfig {
            interval_secs: 86400,
            report_ip_days: 90,
            ban_ip_days: 30,
            disclosure_days: 30,
            decision_days: 365,
            audit_ip_days: 365,
        }
    }

    #[test]
    fn test_nullify_sql_shape() {
        let cfg = test_config();
        let all = policies(&cfg);
        let reports = all.iter().find(|p| p.dataset == "moderation_reports_ip").unwrap();
        let sql = build_sql(reports);
        assert_eq!(
            sql,
            "UPDATE moderation_reports SET reporter_ip = NULL, post_ip = NULL WHERE \
             (reporter_ip IS NOT NULL OR post_ip IS NOT NULL) AND created_at < now() - \
             ($1 * interval '1 day')"
        );
    }

    #[test]
    fn test_nullify_sql_guards_against_rerun() {
        // The IS NOT NULL guard is what makes a second pass affect zero rows
        let cfg = test_config();
        for policy in policies(&cfg) {
            if policy.op == RetentionOp::Nullify {
                assert!(build_sql(&policy).contains("IS NOT NULL"), "{}", policy.dataset);
            }
        }
    }

    #[test]
    fn test_delete_sql_with_precondition() {
        let cfg = test_config();
        let all = policies(&cfg);
        let disclosure = all.iter().find(|p| p.dataset == "disclosure_reports").unwrap();
        assert_eq!(
            build_sql(disclosure),
            "DELETE FROM disclosure_reports WHERE created_at < now() - ($1 * interval '1 day') \
             AND status <> 'pending'"
        );
    }

    #[test]
    fn test_ban_policy_only_touches_inactive_bans() {
        let cfg = test_config();
        let all = policies(&cfg);
        let bans = all.iter().find(|p| p.dataset == "banned_users_ip").unwrap();
        let sql = build_sql(bans);
        assert!(sql.contains("active = FALSE"));
        assert!(sql.contains("expires_at"));
    }

    #[test]
    fn test_every_nullify_policy_names_columns() {
        let cfg = test_config();
        for policy in policies(&cfg) {
            match policy.op {
                RetentionOp::Nullify => assert!(!policy.columns.is_empty(), "{}", policy.dataset),
                RetentionOp::Delete => assert!(policy.columns.is_empty(), "{}", policy.dataset),
            }
        }
    }

    #[test]
    fn test_retention_windows_come_from_config() {
        let mut cfg = test_config();
        cfg.report_ip_days = 7;
        let all = policies(&cfg);
        let reports = all.iter().find(|p| p.dataset == "moderation_reports_ip").unwrap();
        assert_eq!(reports.days, 7);
    }
}
