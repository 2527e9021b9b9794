//! SQLite ledger store.
//!
//! Persistent storage for:
//! - Distribution records (daily accrual ledger, append-only)
//! - Commission records (referral fanout ledger, append-only)
//! - Rank bonus records (monthly terminal states)
//! - Wallet aggregates (the only mutable rows, updated atomically)
//! - Read-only subscription and referral-edge tables owned by the platform
//!
//! # Features
//!
//! - WAL mode enabled for better concurrent performance
//! - Automatic schema migrations
//! - Async operations via sqlx
//! - Idempotency keys enforced as UNIQUE constraints, not check-then-insert

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use lib_types::{Amount, ReferralEdge, SubscriberId, Subscription, SubscriptionStatus, Tier};

use crate::errors::{LedgerError, LedgerResult};
use crate::records::{
    CommissionLevelSummary, CommissionRecordRow, DistributionRecordRow, InsertOutcome,
    NewCommission, NewDistribution, NewRankBonus, RankBonusRow, RankBonusSummary, WalletRow,
};

/// SQLite-backed ledger store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

/// Internal row shape for the platform-owned subscriptions table
#[derive(Debug, Clone, FromRow)]
struct SubscriptionRow {
    subscriber_id: String,
    subscription_id: String,
    tier: String,
    status: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl SubscriptionRow {
    fn into_subscription(self) -> LedgerResult<Subscription> {
        let status: SubscriptionStatus =
            self.status
                .parse()
                .map_err(|_| LedgerError::InvalidField {
                    field: "status",
                    value: self.status.clone(),
                })?;
        Ok(Subscription {
            subscriber_id: SubscriberId::new(self.subscriber_id),
            subscription_id: self.subscription_id.as_str().into(),
            tier: Tier::new(&self.tier),
            status,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

impl LedgerStore {
    /// Open or create the ledger database at the given path.
    ///
    /// Creates the file if missing, enables WAL mode, and runs migrations.
    pub async fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let url = format!("sqlite:{}?mode=rwc", path.display());

        info!("Opening ledger store at: {}", path.display());

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(LedgerError::Storage)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!("Ledger store initialized");

        Ok(Self { pool })
    }

    /// Open an in-memory ledger database (for testing)
    pub async fn open_in_memory() -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(LedgerError::Storage)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    async fn run_migrations(pool: &SqlitePool) -> LedgerResult<()> {
        debug!("Running ledger migrations...");

        const MIGRATION_V1: &str = r#"
-- Daily accrual ledger. The UNIQUE key is the idempotency boundary of the
-- whole subsystem: one record per (subscriber, subscription, date).
CREATE TABLE IF NOT EXISTS distribution_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subscriber_id TEXT NOT NULL,
    subscription_id TEXT NOT NULL,
    tier TEXT NOT NULL,
    token_amount INTEGER NOT NULL,
    distribution_date TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE(subscriber_id, subscription_id, distribution_date)
);

CREATE INDEX IF NOT EXISTS idx_dist_subscriber ON distribution_records(subscriber_id);
CREATE INDEX IF NOT EXISTS idx_dist_date ON distribution_records(distribution_date);

-- Commission fanout ledger, at most one row per (earner, source event, level).
CREATE TABLE IF NOT EXISTS commission_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    earner_id TEXT NOT NULL,
    source_subscriber_id TEXT NOT NULL,
    source_event_id TEXT NOT NULL,
    level INTEGER NOT NULL,
    rate_bps INTEGER NOT NULL,
    commission_amount INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE(earner_id, source_event_id, level)
);

CREATE INDEX IF NOT EXISTS idx_comm_earner ON commission_records(earner_id);
CREATE INDEX IF NOT EXISTS idx_comm_event ON commission_records(source_event_id);

-- Monthly rank bonus terminal states, one row per (subscriber, month).
CREATE TABLE IF NOT EXISTS rank_bonus_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subscriber_id TEXT NOT NULL,
    month TEXT NOT NULL,
    rank TEXT NOT NULL,
    bonus_total INTEGER NOT NULL,
    mrd_amount INTEGER NOT NULL,
    mgc_amount INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE(subscriber_id, month)
);

CREATE INDEX IF NOT EXISTS idx_rank_month ON rank_bonus_records(month);

-- Derived wallet aggregate; mutated only via atomic increments and
-- ledger-sourced reconciliation.
CREATE TABLE IF NOT EXISTS wallets (
    subscriber_id TEXT PRIMARY KEY,
    token_balance INTEGER NOT NULL DEFAULT 0,
    last_reconciled_at INTEGER
);

-- Platform-owned tables, read-only to the engines. Populated externally;
-- the write helpers exist for tests and import tooling.
CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id TEXT PRIMARY KEY,
    subscriber_id TEXT NOT NULL,
    tier TEXT NOT NULL,
    status TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subs_eligibility ON subscriptions(status, end_date);
CREATE INDEX IF NOT EXISTS idx_subs_subscriber ON subscriptions(subscriber_id);

-- Referral closure rows: (ancestor, descendant, shortest-path distance).
CREATE TABLE IF NOT EXISTS referral_edges (
    referrer_id TEXT NOT NULL,
    referred_id TEXT NOT NULL,
    depth INTEGER NOT NULL,
    PRIMARY KEY (referrer_id, referred_id)
);

CREATE INDEX IF NOT EXISTS idx_edges_referred ON referral_edges(referred_id, depth);
"#;

        sqlx::raw_sql(MIGRATION_V1)
            .execute(pool)
            .await
            .map_err(LedgerError::Migration)?;

        debug!("Ledger migrations completed");
        Ok(())
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn now_unix() -> i64 {
        chrono::Utc::now().timestamp()
    }

    // ========================================================================
    // Distribution ledger
    // ========================================================================

    /// Append a daily accrual record.
    ///
    /// Returns [`InsertOutcome::Duplicate`] when a record for the same
    /// (subscriber, subscription, date) key already exists; the decision is
    /// made by the UNIQUE constraint so it holds under concurrent runs.
    pub async fn insert_distribution(
        &self,
        new: &NewDistribution,
    ) -> LedgerResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO distribution_records
                (subscriber_id, subscription_id, tier, token_amount, distribution_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(subscriber_id, subscription_id, distribution_date) DO NOTHING
            "#,
        )
        .bind(new.subscriber_id.as_str())
        .bind(new.subscription_id.as_str())
        .bind(new.tier.as_str())
        .bind(new.token_amount)
        .bind(new.distribution_date)
        .bind(Self::now_unix())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    /// All accrual records for one distribution date
    pub async fn distributions_for_date(
        &self,
        date: NaiveDate,
    ) -> LedgerResult<Vec<DistributionRecordRow>> {
        let rows = sqlx::query_as::<_, DistributionRecordRow>(
            r#"
            SELECT * FROM distribution_records
            WHERE distribution_date = ?
            ORDER BY subscriber_id, subscription_id
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Number of accrual records for one distribution date
    pub async fn count_distributions(&self, date: NaiveDate) -> LedgerResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM distribution_records WHERE distribution_date = ?",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// All-time ledger-derived balance for a subscriber (micro-MRD)
    pub async fn ledger_balance(&self, subscriber: &SubscriberId) -> LedgerResult<Amount> {
        let sum: Amount = sqlx::query_scalar(
            "SELECT COALESCE(SUM(token_amount), 0) FROM distribution_records WHERE subscriber_id = ?",
        )
        .bind(subscriber.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    // ========================================================================
    // Wallet aggregate
    // ========================================================================

    /// Atomically credit a subscriber's wallet.
    ///
    /// Single UPSERT increment; never read-modify-write, so it is correct
    /// under concurrent accrual and reconciliation.
    pub async fn credit_wallet(
        &self,
        subscriber: &SubscriberId,
        amount: Amount,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (subscriber_id, token_balance)
            VALUES (?, ?)
            ON CONFLICT(subscriber_id) DO UPDATE SET
                token_balance = token_balance + excluded.token_balance
            "#,
        )
        .bind(subscriber.as_str())
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a wallet row, if one exists
    pub async fn wallet(&self, subscriber: &SubscriberId) -> LedgerResult<Option<WalletRow>> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT * FROM wallets WHERE subscriber_id = ?",
        )
        .bind(subscriber.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Rebuild the cached wallet balance from the distribution ledger.
    ///
    /// The replacement value is computed by a subselect inside the same
    /// statement, so a concurrent accrual cannot be clobbered with a stale
    /// sum. Returns the balance after the rebuild. Ledger wins, always.
    pub async fn reconcile_wallet_from_ledger(
        &self,
        subscriber: &SubscriberId,
    ) -> LedgerResult<Amount> {
        sqlx::query(
            r#"
            INSERT INTO wallets (subscriber_id, token_balance, last_reconciled_at)
            VALUES (
                ?1,
                (SELECT COALESCE(SUM(token_amount), 0) FROM distribution_records WHERE subscriber_id = ?1),
                ?2
            )
            ON CONFLICT(subscriber_id) DO UPDATE SET
                token_balance = (SELECT COALESCE(SUM(token_amount), 0)
                                 FROM distribution_records WHERE subscriber_id = ?1),
                last_reconciled_at = excluded.last_reconciled_at
            "#,
        )
        .bind(subscriber.as_str())
        .bind(Self::now_unix())
        .execute(&self.pool)
        .await?;

        let balance: Amount = sqlx::query_scalar(
            "SELECT token_balance FROM wallets WHERE subscriber_id = ?",
        )
        .bind(subscriber.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(balance)
    }

    // ========================================================================
    // Commission ledger
    // ========================================================================

    /// Append a commission record for one (earner, source event, level).
    ///
    /// Duplicate keys report [`InsertOutcome::Duplicate`]; re-invoking
    /// propagation for an already-paid level is a no-op.
    pub async fn insert_commission(&self, new: &NewCommission) -> LedgerResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO commission_records
                (earner_id, source_subscriber_id, source_event_id, level, rate_bps,
                 commission_amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(earner_id, source_event_id, level) DO NOTHING
            "#,
        )
        .bind(new.earner_id.as_str())
        .bind(new.source_subscriber_id.as_str())
        .bind(new.source_event_id.as_str())
        .bind(new.level as i64)
        .bind(new.rate_bps as i64)
        .bind(new.commission_amount)
        .bind(Self::now_unix())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    /// All commission records produced by one accrual event
    pub async fn commissions_for_event(
        &self,
        event_id: &str,
    ) -> LedgerResult<Vec<CommissionRecordRow>> {
        let rows = sqlx::query_as::<_, CommissionRecordRow>(
            "SELECT * FROM commission_records WHERE source_event_id = ? ORDER BY level",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Total commission earned by one subscriber, all time (micro-USD)
    pub async fn commission_total(&self, earner: &SubscriberId) -> LedgerResult<Amount> {
        let sum: Amount = sqlx::query_scalar(
            "SELECT COALESCE(SUM(commission_amount), 0) FROM commission_records WHERE earner_id = ?",
        )
        .bind(earner.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    /// Per-level commission aggregates for one distribution date.
    ///
    /// Event ids are prefixed with the accrual date, which is what makes
    /// this a ledger query rather than a join against the distributions.
    pub async fn commission_summary(
        &self,
        date: NaiveDate,
    ) -> LedgerResult<Vec<CommissionLevelSummary>> {
        let rows = sqlx::query_as::<_, CommissionLevelSummary>(
            r#"
            SELECT level, COUNT(*) AS records, COALESCE(SUM(commission_amount), 0) AS total_amount
            FROM commission_records
            WHERE source_event_id LIKE ?
            GROUP BY level
            ORDER BY level
            "#,
        )
        .bind(format!("{}:%", date))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ========================================================================
    // Rank bonus ledger
    // ========================================================================

    /// Append the terminal record for a subscriber-month evaluation
    pub async fn insert_rank_bonus(&self, new: &NewRankBonus) -> LedgerResult<InsertOutcome> {
        let rank = new.rank.map(|r| r.to_string()).unwrap_or_default();
        let result = sqlx::query(
            r#"
            INSERT INTO rank_bonus_records
                (subscriber_id, month, rank, bonus_total, mrd_amount, mgc_amount, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(subscriber_id, month) DO NOTHING
            "#,
        )
        .bind(new.subscriber_id.as_str())
        .bind(&new.month)
        .bind(rank)
        .bind(new.bonus_total)
        .bind(new.mrd_amount)
        .bind(new.mgc_amount)
        .bind(new.status.to_string())
        .bind(Self::now_unix())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    /// The terminal record for a subscriber-month, if the month was evaluated
    pub async fn rank_bonus_for(
        &self,
        subscriber: &SubscriberId,
        month: &str,
    ) -> LedgerResult<Option<RankBonusRow>> {
        let row = sqlx::query_as::<_, RankBonusRow>(
            "SELECT * FROM rank_bonus_records WHERE subscriber_id = ? AND month = ?",
        )
        .bind(subscriber.as_str())
        .bind(month)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Aggregate view of one month's rank-bonus run
    pub async fn rank_bonus_summary(&self, month: &str) -> LedgerResult<RankBonusSummary> {
        #[derive(FromRow)]
        struct Row {
            paid: i64,
            no_rank: i64,
            total_bonus: Amount,
            total_mrd: Amount,
            total_mgc: Amount,
        }

        let row = sqlx::query_as::<_, Row>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'paid' THEN 1 ELSE 0 END), 0) AS paid,
                COALESCE(SUM(CASE WHEN status = 'no_rank' THEN 1 ELSE 0 END), 0) AS no_rank,
                COALESCE(SUM(bonus_total), 0) AS total_bonus,
                COALESCE(SUM(mrd_amount), 0) AS total_mrd,
                COALESCE(SUM(mgc_amount), 0) AS total_mgc
            FROM rank_bonus_records
            WHERE month = ?
            "#,
        )
        .bind(month)
        .fetch_one(&self.pool)
        .await?;

        Ok(RankBonusSummary {
            month: month.to_string(),
            paid: row.paid,
            no_rank: row.no_rank,
            total_bonus: row.total_bonus,
            total_mrd: row.total_mrd,
            total_mgc: row.total_mgc,
        })
    }

    // ========================================================================
    // Platform-owned tables (read side + seed helpers)
    // ========================================================================

    /// Insert or replace a subscription row (tests and import tooling)
    pub async fn upsert_subscription(&self, sub: &Subscription) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (subscription_id, subscriber_id, tier, status, start_date, end_date)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(subscription_id) DO UPDATE SET
                subscriber_id = excluded.subscriber_id,
                tier = excluded.tier,
                status = excluded.status,
                start_date = excluded.start_date,
                end_date = excluded.end_date
            "#,
        )
        .bind(sub.subscription_id.as_str())
        .bind(sub.subscriber_id.as_str())
        .bind(sub.tier.as_str())
        .bind(sub.status.to_string())
        .bind(sub.start_date)
        .bind(sub.end_date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Subscriptions eligible for accrual on the given date
    pub async fn list_active_subscriptions(
        &self,
        as_of: NaiveDate,
    ) -> LedgerResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT subscriber_id, subscription_id, tier, status, start_date, end_date
            FROM subscriptions
            WHERE status = 'active' AND end_date >= ?
            ORDER BY subscriber_id, subscription_id
            "#,
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_subscription()).collect()
    }

    /// Distinct tiers of a subscriber's active subscriptions on a date
    pub async fn active_tiers(
        &self,
        subscriber: &SubscriberId,
        as_of: NaiveDate,
    ) -> LedgerResult<Vec<Tier>> {
        let tiers: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT tier FROM subscriptions
            WHERE subscriber_id = ? AND status = 'active' AND end_date >= ?
            ORDER BY tier
            "#,
        )
        .bind(subscriber.as_str())
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        Ok(tiers.into_iter().map(Tier::new).collect())
    }

    /// Insert a referral closure row (tests and import tooling)
    pub async fn insert_referral_edge(
        &self,
        referrer: &SubscriberId,
        referred: &SubscriberId,
        depth: u32,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO referral_edges (referrer_id, referred_id, depth)
            VALUES (?, ?, ?)
            ON CONFLICT(referrer_id, referred_id) DO UPDATE SET depth = excluded.depth
            "#,
        )
        .bind(referrer.as_str())
        .bind(referred.as_str())
        .bind(depth as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Ancestor chain of a subscriber, ordered by increasing depth
    pub async fn ancestors_of(&self, subscriber: &SubscriberId) -> LedgerResult<Vec<ReferralEdge>> {
        #[derive(FromRow)]
        struct Row {
            referrer_id: String,
            referred_id: String,
            depth: i64,
        }

        let rows = sqlx::query_as::<_, Row>(
            r#"
            SELECT referrer_id, referred_id, depth
            FROM referral_edges
            WHERE referred_id = ?
            ORDER BY depth ASC, referrer_id
            "#,
        )
        .bind(subscriber.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ReferralEdge {
                referrer_id: SubscriberId::new(r.referrer_id),
                referred_id: SubscriberId::new(r.referred_id),
                depth: r.depth as u32,
            })
            .collect())
    }

    /// Downline snapshot of a subscriber: parent-labeled edges with depth
    /// measured from the queried root, ordered by (depth, member).
    pub async fn downline_of(&self, subscriber: &SubscriberId) -> LedgerResult<Vec<ReferralEdge>> {
        #[derive(FromRow)]
        struct Row {
            parent_id: String,
            member_id: String,
            depth: i64,
        }

        let rows = sqlx::query_as::<_, Row>(
            r#"
            SELECT p.referrer_id AS parent_id, c.referred_id AS member_id, c.depth AS depth
            FROM referral_edges c
            JOIN referral_edges p ON p.referred_id = c.referred_id AND p.depth = 1
            WHERE c.referrer_id = ?
            ORDER BY c.depth ASC, c.referred_id
            "#,
        )
        .bind(subscriber.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ReferralEdge {
                referrer_id: SubscriberId::new(r.parent_id),
                referred_id: SubscriberId::new(r.member_id),
                depth: r.depth as u32,
            })
            .collect())
    }

    /// Every subscriber with at least one direct referral
    pub async fn list_referrers(&self) -> LedgerResult<Vec<SubscriberId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT referrer_id FROM referral_edges WHERE depth = 1 ORDER BY referrer_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(SubscriberId::new).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
