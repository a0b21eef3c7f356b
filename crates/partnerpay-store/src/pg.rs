//! PostgreSQL ledger implementation.
//!
//! Backed by sqlx with runtime-bound queries. A [`LedgerTx`] wraps a
//! `sqlx::Transaction`; reconciliation update-many operations that touch
//! multiple tables open their own internal transaction so each call stays
//! atomic.
//!
//! ULID identifiers (commissions, payouts) are stored as TEXT; UUID
//! identifiers use the native `uuid` column type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use partnerpay_core::{
    BountySubmission, BountyId, Commission, CommissionId, CommissionStatus, CommissionType,
    EnrollmentId, FraudGroup, FraudGroupKind, FraudGroupStatus, Link, LinkId, Pair, PairCursor,
    Partner, PartnerId, PartnerRecord, Payout, PayoutFailureReason, PayoutId, PayoutStatus,
    Program, ProgramEnrollment, ProgramId, RecordKind, SubmissionId, UserId,
    DEFAULT_PAYOUT_DESCRIPTION,
};

use crate::error::{Result, StoreError};
use crate::{Ledger, LedgerTx};

/// PostgreSQL-backed ledger.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Connect to the database and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (migrations are the caller's concern).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row Decoding
// ============================================================================

fn parse_commission_status(s: &str) -> Result<CommissionStatus> {
    match s {
        "pending" => Ok(CommissionStatus::Pending),
        "processed" => Ok(CommissionStatus::Processed),
        "paid" => Ok(CommissionStatus::Paid),
        "duplicate" => Ok(CommissionStatus::Duplicate),
        "fraud" => Ok(CommissionStatus::Fraud),
        other => Err(StoreError::CorruptRecord(format!(
            "unknown commission status: {other}"
        ))),
    }
}

fn parse_commission_type(s: &str) -> Result<CommissionType> {
    match s {
        "click" => Ok(CommissionType::Click),
        "lead" => Ok(CommissionType::Lead),
        "sale" => Ok(CommissionType::Sale),
        "custom" => Ok(CommissionType::Custom),
        other => Err(StoreError::CorruptRecord(format!(
            "unknown commission type: {other}"
        ))),
    }
}

fn parse_payout_status(s: &str) -> Result<PayoutStatus> {
    match s {
        "pending" => Ok(PayoutStatus::Pending),
        "processing" => Ok(PayoutStatus::Processing),
        "processed" => Ok(PayoutStatus::Processed),
        "sent" => Ok(PayoutStatus::Sent),
        "completed" => Ok(PayoutStatus::Completed),
        "failed" => Ok(PayoutStatus::Failed),
        other => Err(StoreError::CorruptRecord(format!(
            "unknown payout status: {other}"
        ))),
    }
}

fn parse_record_kind(s: &str) -> Result<RecordKind> {
    match s {
        "notification_email" => Ok(RecordKind::NotificationEmail),
        "message" => Ok(RecordKind::Message),
        "comment" => Ok(RecordKind::Comment),
        other => Err(StoreError::CorruptRecord(format!(
            "unknown record kind: {other}"
        ))),
    }
}

fn record_kind_str(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::NotificationEmail => "notification_email",
        RecordKind::Message => "message",
        RecordKind::Comment => "comment",
    }
}

fn parse_ulid_id<T: std::str::FromStr>(s: &str, entity: &'static str) -> Result<T> {
    s.parse()
        .map_err(|_| StoreError::CorruptRecord(format!("invalid {entity} id: {s}")))
}

fn commission_from_row(row: &PgRow) -> Result<Commission> {
    let payout_id: Option<String> = row.try_get("payout_id")?;
    Ok(Commission {
        id: parse_ulid_id(row.try_get::<String, _>("id")?.as_str(), "commission")?,
        program_id: ProgramId::from_uuid(row.try_get("program_id")?),
        partner_id: PartnerId::from_uuid(row.try_get("partner_id")?),
        commission_type: parse_commission_type(row.try_get::<String, _>("commission_type")?.as_str())?,
        status: parse_commission_status(row.try_get::<String, _>("status")?.as_str())?,
        quantity: row.try_get("quantity")?,
        amount: row.try_get("amount")?,
        payout_id: payout_id
            .as_deref()
            .map(|s| parse_ulid_id(s, "payout"))
            .transpose()?,
        created_at: row.try_get("created_at")?,
    })
}

fn payout_from_row(row: &PgRow) -> Result<Payout> {
    let failure_reason: Option<String> = row.try_get("failure_reason")?;
    Ok(Payout {
        id: parse_ulid_id(row.try_get::<String, _>("id")?.as_str(), "payout")?,
        program_id: ProgramId::from_uuid(row.try_get("program_id")?),
        partner_id: PartnerId::from_uuid(row.try_get("partner_id")?),
        period_start: row.try_get("period_start")?,
        period_end: row.try_get("period_end")?,
        amount: row.try_get("amount")?,
        quantity: row.try_get("quantity")?,
        status: parse_payout_status(row.try_get::<String, _>("status")?.as_str())?,
        description: row.try_get("description")?,
        external_payout_id: row.try_get("external_payout_id")?,
        failure_reason: failure_reason
            .as_deref()
            .and_then(PayoutFailureReason::from_processor_code),
        trace_id: row.try_get("trace_id")?,
        paid_at: row.try_get("paid_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn partner_from_row(row: &PgRow) -> Result<Partner> {
    let user_id: Option<Uuid> = row.try_get("user_id")?;
    Ok(Partner {
        id: PartnerId::from_uuid(row.try_get("id")?),
        user_id: user_id.map(UserId::from_uuid),
        email: row.try_get("email")?,
        payout_method_fingerprint: row.try_get("payout_method_fingerprint")?,
        payouts_enabled_at: row.try_get("payouts_enabled_at")?,
        default_payout_method: row.try_get("default_payout_method")?,
        external_recipient_id: row.try_get("external_recipient_id")?,
        crypto_wallet_address: row.try_get("crypto_wallet_address")?,
        total_commissions: row.try_get("total_commissions")?,
        created_at: row.try_get("created_at")?,
    })
}

fn enrollment_from_row(row: &PgRow) -> Result<ProgramEnrollment> {
    Ok(ProgramEnrollment {
        id: EnrollmentId::from_uuid(row.try_get("id")?),
        program_id: ProgramId::from_uuid(row.try_get("program_id")?),
        partner_id: PartnerId::from_uuid(row.try_get("partner_id")?),
        group_id: row.try_get("group_id")?,
        tenant_id: row.try_get("tenant_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

#[async_trait]
impl Ledger for PgLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn pending_pairs(&self, cursor: Option<&PairCursor>, limit: usize) -> Result<Vec<Pair>> {
        let rows = sqlx::query(
            "SELECT program_id, partner_id FROM commissions
             WHERE status = 'pending' AND payout_id IS NULL AND amount <> 0
               AND ($1::uuid IS NULL OR (program_id, partner_id) > ($1, $2))
             GROUP BY program_id, partner_id
             ORDER BY program_id, partner_id
             LIMIT $3",
        )
        .bind(cursor.map(|c| *c.program_id.as_uuid()))
        .bind(cursor.map(|c| *c.partner_id.as_uuid()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Pair::new(
                    ProgramId::from_uuid(row.try_get("program_id")?),
                    PartnerId::from_uuid(row.try_get("partner_id")?),
                ))
            })
            .collect()
    }

    async fn complete_payouts(
        &self,
        external_payout_id: &str,
        trace_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> Result<Vec<PayoutId>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "UPDATE payouts
             SET status = 'completed', paid_at = $2, trace_id = COALESCE($3, trace_id)
             WHERE external_payout_id = $1 AND status <> 'completed'
             RETURNING id",
        )
        .bind(external_payout_id)
        .bind(paid_at)
        .bind(trace_id)
        .fetch_all(&mut *tx)
        .await?;

        let raw_ids: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        if !raw_ids.is_empty() {
            sqlx::query(
                "UPDATE commissions SET status = 'paid'
                 WHERE payout_id = ANY($1) AND status = 'processed'",
            )
            .bind(&raw_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        raw_ids
            .iter()
            .map(|s| parse_ulid_id(s, "payout"))
            .collect()
    }

    async fn fail_payouts(
        &self,
        external_payout_id: &str,
        reason: Option<PayoutFailureReason>,
    ) -> Result<Vec<PayoutId>> {
        let rows = sqlx::query(
            "UPDATE payouts
             SET status = 'failed', failure_reason = $2
             WHERE external_payout_id = $1 AND status NOT IN ('failed', 'completed')
             RETURNING id",
        )
        .bind(external_payout_id)
        .bind(reason.map(PayoutFailureReason::as_str))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| parse_ulid_id(row.try_get::<String, _>("id")?.as_str(), "payout"))
            .collect()
    }

    async fn set_payout_submitted(
        &self,
        id: &PayoutId,
        external_payout_id: &str,
        status: PayoutStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payouts SET external_payout_id = $2, status = $3 WHERE id = $1",
        )
        .bind(id.to_string())
        .bind(external_payout_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "payout",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_payout(&self, id: &PayoutId) -> Result<Option<Payout>> {
        let row = sqlx::query("SELECT * FROM payouts WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(payout_from_row).transpose()
    }

    async fn payouts_for_pair(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Payout>> {
        let rows = sqlx::query(
            "SELECT * FROM payouts WHERE program_id = $1 AND partner_id = $2 ORDER BY id",
        )
        .bind(program_id.as_uuid())
        .bind(partner_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(payout_from_row).collect()
    }

    async fn insert_commission(&self, commission: &Commission) -> Result<()> {
        sqlx::query(
            "INSERT INTO commissions
                 (id, program_id, partner_id, commission_type, status, quantity, amount,
                  payout_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(commission.id.to_string())
        .bind(commission.program_id.as_uuid())
        .bind(commission.partner_id.as_uuid())
        .bind(commission.commission_type.as_str())
        .bind(commission.status.as_str())
        .bind(commission.quantity)
        .bind(commission.amount)
        .bind(commission.payout_id.map(|id| id.to_string()))
        .bind(commission.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_commission(&self, id: &CommissionId) -> Result<Option<Commission>> {
        let row = sqlx::query("SELECT * FROM commissions WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(commission_from_row).transpose()
    }

    async fn commissions_for_pair(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Commission>> {
        let rows = sqlx::query(
            "SELECT * FROM commissions
             WHERE program_id = $1 AND partner_id = $2
             ORDER BY created_at",
        )
        .bind(program_id.as_uuid())
        .bind(partner_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(commission_from_row).collect()
    }

    async fn put_partner(&self, partner: &Partner) -> Result<()> {
        sqlx::query(
            "INSERT INTO partners
                 (id, user_id, email, payout_method_fingerprint, payouts_enabled_at,
                  default_payout_method, external_recipient_id, crypto_wallet_address,
                  total_commissions, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO UPDATE SET
                 user_id = EXCLUDED.user_id,
                 email = EXCLUDED.email,
                 payout_method_fingerprint = EXCLUDED.payout_method_fingerprint,
                 payouts_enabled_at = EXCLUDED.payouts_enabled_at,
                 default_payout_method = EXCLUDED.default_payout_method,
                 external_recipient_id = EXCLUDED.external_recipient_id,
                 crypto_wallet_address = EXCLUDED.crypto_wallet_address,
                 total_commissions = EXCLUDED.total_commissions",
        )
        .bind(partner.id.as_uuid())
        .bind(partner.user_id.map(|id| *id.as_uuid()))
        .bind(&partner.email)
        .bind(&partner.payout_method_fingerprint)
        .bind(partner.payouts_enabled_at)
        .bind(&partner.default_payout_method)
        .bind(&partner.external_recipient_id)
        .bind(&partner.crypto_wallet_address)
        .bind(partner.total_commissions)
        .bind(partner.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_partner(&self, id: &PartnerId) -> Result<Option<Partner>> {
        let row = sqlx::query("SELECT * FROM partners WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(partner_from_row).transpose()
    }

    async fn partner_by_email(&self, email: &str) -> Result<Option<Partner>> {
        let row = sqlx::query("SELECT * FROM partners WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(partner_from_row).transpose()
    }

    async fn partner_by_recipient(&self, recipient_id: &str) -> Result<Option<Partner>> {
        let row = sqlx::query("SELECT * FROM partners WHERE external_recipient_id = $1")
            .bind(recipient_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(partner_from_row).transpose()
    }

    async fn update_partner_payout_config(
        &self,
        id: &PartnerId,
        payouts_enabled_at: Option<DateTime<Utc>>,
        default_payout_method: Option<&str>,
        payout_method_fingerprint: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE partners
             SET payouts_enabled_at = $2, default_payout_method = $3,
                 payout_method_fingerprint = $4
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(payouts_enabled_at)
        .bind(default_payout_method)
        .bind(payout_method_fingerprint)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "partner",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn partners_sharing_fingerprint(
        &self,
        fingerprint: &str,
        excluding: &PartnerId,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM partners
             WHERE id <> $1 AND payout_method_fingerprint = $2",
        )
        .bind(excluding.as_uuid())
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.unsigned_abs())
    }

    async fn recompute_partner_totals(&self, id: &PartnerId) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM commissions
             WHERE partner_id = $1 AND status NOT IN ('duplicate', 'fraud')",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        let result = sqlx::query("UPDATE partners SET total_commissions = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(total)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "partner",
                id: id.to_string(),
            });
        }
        Ok(total)
    }

    async fn delete_partner(&self, id: &PartnerId) -> Result<()> {
        let result = sqlx::query("DELETE FROM partners WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "partner",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn put_program(&self, program: &Program) -> Result<()> {
        sqlx::query("INSERT INTO programs (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(program.id.as_uuid())
            .bind(&program.name)
            .bind(program.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_enrollment(&self, enrollment: &ProgramEnrollment) -> Result<()> {
        sqlx::query(
            "INSERT INTO program_enrollments
                 (id, program_id, partner_id, group_id, tenant_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(enrollment.id.as_uuid())
        .bind(enrollment.program_id.as_uuid())
        .bind(enrollment.partner_id.as_uuid())
        .bind(&enrollment.group_id)
        .bind(&enrollment.tenant_id)
        .bind(enrollment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "partner {} already enrolled in program {}",
                    enrollment.partner_id, enrollment.program_id
                ))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn enrollments_for_partner(&self, id: &PartnerId) -> Result<Vec<ProgramEnrollment>> {
        let rows = sqlx::query("SELECT * FROM program_enrollments WHERE partner_id = $1")
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(enrollment_from_row).collect()
    }

    async fn reassign_enrollments(&self, ids: &[EnrollmentId], target: &PartnerId) -> Result<u64> {
        let raw_ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query(
            "UPDATE program_enrollments SET partner_id = $2 WHERE id = ANY($1)",
        )
        .bind(&raw_ids)
        .bind(target.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_link(&self, link: &Link) -> Result<()> {
        sqlx::query("INSERT INTO links (id, program_id, partner_id) VALUES ($1, $2, $3)")
            .bind(link.id.as_uuid())
            .bind(link.program_id.as_uuid())
            .bind(link.partner_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn links_for_partner(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Link>> {
        let rows = sqlx::query("SELECT * FROM links WHERE program_id = $1 AND partner_id = $2")
            .bind(program_id.as_uuid())
            .bind(partner_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Link {
                    id: LinkId::from_uuid(row.try_get("id")?),
                    program_id: ProgramId::from_uuid(row.try_get("program_id")?),
                    partner_id: PartnerId::from_uuid(row.try_get("partner_id")?),
                })
            })
            .collect()
    }

    async fn insert_bounty_submission(&self, submission: &BountySubmission) -> Result<()> {
        sqlx::query(
            "INSERT INTO bounty_submissions (id, bounty_id, program_id, partner_id)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(submission.id.as_uuid())
        .bind(submission.bounty_id.as_uuid())
        .bind(submission.program_id.as_uuid())
        .bind(submission.partner_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bounty_submissions_for_partner(
        &self,
        id: &PartnerId,
    ) -> Result<Vec<BountySubmission>> {
        let rows = sqlx::query("SELECT * FROM bounty_submissions WHERE partner_id = $1")
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(BountySubmission {
                    id: SubmissionId::from_uuid(row.try_get("id")?),
                    bounty_id: BountyId::from_uuid(row.try_get("bounty_id")?),
                    program_id: ProgramId::from_uuid(row.try_get("program_id")?),
                    partner_id: PartnerId::from_uuid(row.try_get("partner_id")?),
                })
            })
            .collect()
    }

    async fn reassign_bounty_submission(
        &self,
        id: &SubmissionId,
        target: &PartnerId,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE bounty_submissions SET partner_id = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(target.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!(
                        "partner {target} already has a submission for this bounty"
                    ))
                } else {
                    e.into()
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "bounty submission",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_partner_record(&self, record: &PartnerRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO partner_records (kind, program_id, partner_id) VALUES ($1, $2, $3)",
        )
        .bind(record_kind_str(record.kind))
        .bind(record.program_id.as_uuid())
        .bind(record.partner_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn partner_records(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<PartnerRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM partner_records WHERE program_id = $1 AND partner_id = $2",
        )
        .bind(program_id.as_uuid())
        .bind(partner_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(PartnerRecord {
                    kind: parse_record_kind(row.try_get::<String, _>("kind")?.as_str())?,
                    program_id: ProgramId::from_uuid(row.try_get("program_id")?),
                    partner_id: PartnerId::from_uuid(row.try_get("partner_id")?),
                })
            })
            .collect()
    }

    async fn put_user(&self, id: &UserId, workspace_count: u32) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, workspace_count) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET workspace_count = EXCLUDED.workspace_count",
        )
        .bind(id.as_uuid())
        .bind(i32::try_from(workspace_count).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_workspace_count(&self, id: &UserId) -> Result<u32> {
        let count: Option<i32> =
            sqlx::query_scalar("SELECT workspace_count FROM users WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(count.map_or(0, i32::unsigned_abs))
    }

    async fn delete_user(&self, id: &UserId) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "user",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn resolve_fraud_groups(
        &self,
        partner_id: &PartnerId,
        kind: FraudGroupKind,
        reason: &str,
    ) -> Result<u64> {
        let kind_str = match kind {
            FraudGroupKind::DuplicatePayoutMethod => "duplicate_payout_method",
        };
        let result = sqlx::query(
            "UPDATE fraud_groups
             SET status = 'resolved', resolution_reason = $3
             WHERE partner_id = $1 AND kind = $2 AND status = 'pending'",
        )
        .bind(partner_id.as_uuid())
        .bind(kind_str)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn screen_duplicate_payout_method(
        &self,
        partner_id: &PartnerId,
        fingerprint: &str,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let shared: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM partners
             WHERE id <> $1 AND payout_method_fingerprint = $2",
        )
        .bind(partner_id.as_uuid())
        .bind(fingerprint)
        .fetch_one(&mut *tx)
        .await?;

        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM fraud_groups
             WHERE partner_id = $1 AND kind = 'duplicate_payout_method' AND status = 'pending'",
        )
        .bind(partner_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        if shared > 0 && pending == 0 {
            sqlx::query(
                "INSERT INTO fraud_groups (partner_id, kind, status, created_at)
                 VALUES ($1, 'duplicate_payout_method', 'pending', $2)",
            )
            .bind(partner_id.as_uuid())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(shared > 0 || pending > 0)
    }

    async fn pending_fraud_groups(&self, partner_id: &PartnerId) -> Result<Vec<FraudGroup>> {
        let rows = sqlx::query(
            "SELECT * FROM fraud_groups WHERE partner_id = $1 AND status = 'pending'",
        )
        .bind(partner_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FraudGroup {
                    partner_id: PartnerId::from_uuid(row.try_get("partner_id")?),
                    kind: FraudGroupKind::DuplicatePayoutMethod,
                    status: FraudGroupStatus::Pending,
                    resolution_reason: row.try_get("resolution_reason")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

/// An open PostgreSQL transaction.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn pending_commissions(
        &mut self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Commission>> {
        let rows = sqlx::query(
            "SELECT * FROM commissions
             WHERE program_id = $1 AND partner_id = $2
               AND status = 'pending' AND payout_id IS NULL
             ORDER BY created_at
             FOR UPDATE",
        )
        .bind(program_id.as_uuid())
        .bind(partner_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(commission_from_row).collect()
    }

    async fn pending_payout(
        &mut self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Option<Payout>> {
        let row = sqlx::query(
            "SELECT * FROM payouts
             WHERE program_id = $1 AND partner_id = $2 AND status = 'pending'
             LIMIT 1
             FOR UPDATE",
        )
        .bind(program_id.as_uuid())
        .bind(partner_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(payout_from_row).transpose()
    }

    async fn insert_payout(&mut self, payout: &Payout) -> Result<()> {
        sqlx::query(
            "INSERT INTO payouts
                 (id, program_id, partner_id, period_start, period_end, amount, quantity,
                  status, description, external_payout_id, failure_reason, trace_id,
                  paid_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(payout.id.to_string())
        .bind(payout.program_id.as_uuid())
        .bind(payout.partner_id.as_uuid())
        .bind(payout.period_start)
        .bind(payout.period_end)
        .bind(payout.amount)
        .bind(payout.quantity)
        .bind(payout.status.as_str())
        .bind(&payout.description)
        .bind(&payout.external_payout_id)
        .bind(payout.failure_reason.map(PayoutFailureReason::as_str))
        .bind(&payout.trace_id)
        .bind(payout.paid_at)
        .bind(payout.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn merge_into_payout(
        &mut self,
        id: &PayoutId,
        amount_delta: i64,
        quantity_delta: i64,
        period_end: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payouts
             SET amount = amount + $2, quantity = quantity + $3, period_end = $4,
                 description = COALESCE(description, $5)
             WHERE id = $1",
        )
        .bind(id.to_string())
        .bind(amount_delta)
        .bind(quantity_delta)
        .bind(period_end)
        .bind(DEFAULT_PAYOUT_DESCRIPTION)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "payout",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn mark_commissions_processed(
        &mut self,
        ids: &[CommissionId],
        payout_id: &PayoutId,
    ) -> Result<u64> {
        let raw_ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let result = sqlx::query(
            "UPDATE commissions
             SET status = 'processed', payout_id = $2
             WHERE id = ANY($1) AND status = 'pending' AND payout_id IS NULL",
        )
        .bind(&raw_ids)
        .bind(payout_id.to_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn reassign_links(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE links SET partner_id = $3 WHERE program_id = $1 AND partner_id = $2",
        )
        .bind(program_id.as_uuid())
        .bind(source.as_uuid())
        .bind(target.as_uuid())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn reassign_commissions(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE commissions SET partner_id = $3 WHERE program_id = $1 AND partner_id = $2",
        )
        .bind(program_id.as_uuid())
        .bind(source.as_uuid())
        .bind(target.as_uuid())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn reassign_payouts(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE payouts SET partner_id = $3 WHERE program_id = $1 AND partner_id = $2",
        )
        .bind(program_id.as_uuid())
        .bind(source.as_uuid())
        .bind(target.as_uuid())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn reassign_partner_records(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE partner_records SET partner_id = $3 WHERE program_id = $1 AND partner_id = $2",
        )
        .bind(program_id.as_uuid())
        .bind(source.as_uuid())
        .bind(target.as_uuid())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
