//! Task gate repository.
//!
//! Cross-process mutual exclusion for named recurring tasks, backed by the
//! `task_gate` table. Each decision runs under `BEGIN IMMEDIATE`, so every
//! process sharing the database file serializes on `SQLite`'s write lock.
//!
//! Two mechanisms share the table:
//! - the start window: a task counts as running for `stale` after its last
//!   start, whether or not it is still alive;
//! - leases: an owner token with an expiry, renewed while the task runs and
//!   released when it finishes.

use chrono::{DateTime, TimeDelta, Utc};
use libsql::TransactionBehavior;

use roster_core::entities::{TaskGateEntry, TaskLease};

use crate::error::DatabaseError;
use crate::helpers::{format_datetime, get_opt_string, parse_datetime, parse_optional_datetime};
use crate::service::RosterService;

async fn read_entry(
    conn: &libsql::Connection,
    task: &str,
) -> Result<Option<TaskGateEntry>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT task_name, last_started_at, lease_owner, lease_expires_at
             FROM task_gate WHERE task_name = ?1",
            [task],
        )
        .await?;
    let Some(row) = rows.next().await? else {
        return Ok(None);
    };
    Ok(Some(TaskGateEntry {
        task_name: row.get::<String>(0)?,
        last_started_at: parse_datetime(&row.get::<String>(1)?)?,
        lease_owner: get_opt_string(&row, 2)?,
        lease_expires_at: parse_optional_datetime(get_opt_string(&row, 3)?.as_deref())?,
    }))
}

/// Owner of a lease that is still live at `now`.
fn live_lease_owner(entry: &TaskGateEntry, now: DateTime<Utc>) -> Option<&str> {
    match (&entry.lease_owner, entry.lease_expires_at) {
        (Some(owner), Some(expires)) if expires > now => Some(owner.as_str()),
        _ => None,
    }
}

/// Commit on success; roll back (releasing the write lock) before returning an error.
async fn finish<T>(
    tx: libsql::Transaction,
    task: &str,
    result: Result<T, DatabaseError>,
) -> Result<T, DatabaseError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::error!(task, %rollback_error, "task gate rollback failed");
            }
            Err(error)
        }
    }
}

fn lease_expiry(now: DateTime<Utc>, ttl: TimeDelta) -> Result<DateTime<Utc>, DatabaseError> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| DatabaseError::InvalidState(format!("lease ttl {ttl} is out of range")))
}

async fn start_if_idle(
    conn: &libsql::Connection,
    task: &str,
    stale: TimeDelta,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    if let Some(entry) = read_entry(conn, task).await? {
        let window_start = now.checked_sub_signed(stale).unwrap_or(DateTime::<Utc>::MIN_UTC);
        if entry.last_started_at >= window_start || live_lease_owner(&entry, now).is_some() {
            return Ok(false);
        }
    }
    conn.execute(
        "INSERT INTO task_gate (task_name, last_started_at) VALUES (?1, ?2)
         ON CONFLICT(task_name) DO UPDATE SET last_started_at = excluded.last_started_at",
        libsql::params![task, format_datetime(now)],
    )
    .await?;
    Ok(true)
}

async fn take_lease(
    conn: &libsql::Connection,
    task: &str,
    owner: &str,
    ttl: TimeDelta,
    now: DateTime<Utc>,
) -> Result<Option<TaskLease>, DatabaseError> {
    if let Some(entry) = read_entry(conn, task).await? {
        if live_lease_owner(&entry, now).is_some_and(|holder| holder != owner) {
            return Ok(None);
        }
    }
    let expires_at = lease_expiry(now, ttl)?;
    conn.execute(
        "INSERT INTO task_gate (task_name, last_started_at, lease_owner, lease_expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(task_name) DO UPDATE SET
             last_started_at = excluded.last_started_at,
             lease_owner = excluded.lease_owner,
             lease_expires_at = excluded.lease_expires_at",
        libsql::params![task, format_datetime(now), owner, format_datetime(expires_at)],
    )
    .await?;
    Ok(Some(TaskLease {
        task_name: task.to_string(),
        owner: owner.to_string(),
        expires_at,
    }))
}

async fn extend_lease(
    conn: &libsql::Connection,
    lease: &TaskLease,
    ttl: TimeDelta,
    now: DateTime<Utc>,
) -> Result<Option<TaskLease>, DatabaseError> {
    let Some(entry) = read_entry(conn, &lease.task_name).await? else {
        return Ok(None);
    };
    if live_lease_owner(&entry, now) != Some(lease.owner.as_str()) {
        return Ok(None);
    }
    let expires_at = lease_expiry(now, ttl)?;
    conn.execute(
        "UPDATE task_gate SET lease_expires_at = ?1 WHERE task_name = ?2",
        libsql::params![format_datetime(expires_at), lease.task_name.as_str()],
    )
    .await?;
    Ok(Some(TaskLease {
        expires_at,
        ..lease.clone()
    }))
}

impl RosterService {
    /// Try to start `task` now. Returns `false` if it started less than
    /// `stale_after_minutes` ago or a live lease holds it.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the write lock cannot be taken within the
    /// busy timeout or a statement fails. The lock is released either way.
    pub async fn attempt_to_start(
        &self,
        task: &str,
        stale_after_minutes: u32,
    ) -> Result<bool, DatabaseError> {
        self.attempt_to_start_at(task, TimeDelta::minutes(i64::from(stale_after_minutes)), Utc::now())
            .await
    }

    /// [`Self::attempt_to_start`] with the configured stale window.
    ///
    /// # Errors
    ///
    /// Same as [`Self::attempt_to_start`].
    pub async fn attempt_to_start_default(&self, task: &str) -> Result<bool, DatabaseError> {
        self.attempt_to_start(task, self.task_gate_config().stale_after_minutes)
            .await
    }

    /// Start-window check against an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`Self::attempt_to_start`].
    pub async fn attempt_to_start_at(
        &self,
        task: &str,
        stale: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let tx = self
            .db()
            .conn()
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;
        let result = start_if_idle(&tx, task, stale, now).await;
        let started = finish(tx, task, result).await?;
        if started {
            tracing::info!(task, "task started");
        } else {
            tracing::debug!(task, "task already running, skipped");
        }
        Ok(started)
    }

    /// Current gate state of `task`, if it ever started.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn get_task_gate(&self, task: &str) -> Result<Option<TaskGateEntry>, DatabaseError> {
        read_entry(self.db().conn(), task).await
    }

    /// Take a lease on `task` for `ttl`. Returns `None` while another owner
    /// holds a live lease. The current owner may re-acquire to extend.
    ///
    /// # Errors
    ///
    /// Same as [`Self::attempt_to_start`].
    pub async fn acquire_lease(
        &self,
        task: &str,
        owner: &str,
        ttl: TimeDelta,
    ) -> Result<Option<TaskLease>, DatabaseError> {
        self.acquire_lease_at(task, owner, ttl, Utc::now()).await
    }

    /// [`Self::acquire_lease`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`Self::attempt_to_start`].
    pub async fn acquire_lease_at(
        &self,
        task: &str,
        owner: &str,
        ttl: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskLease>, DatabaseError> {
        let tx = self
            .db()
            .conn()
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;
        let result = take_lease(&tx, task, owner, ttl, now).await;
        let lease = finish(tx, task, result).await?;
        match &lease {
            Some(lease) => tracing::info!(task, owner, expires_at = %lease.expires_at, "lease acquired"),
            None => tracing::debug!(task, owner, "lease held by another owner"),
        }
        Ok(lease)
    }

    /// Extend a held lease by `ttl` from now. Returns `None` if the lease
    /// expired or passed to another owner.
    ///
    /// # Errors
    ///
    /// Same as [`Self::attempt_to_start`].
    pub async fn renew_lease(
        &self,
        lease: &TaskLease,
        ttl: TimeDelta,
    ) -> Result<Option<TaskLease>, DatabaseError> {
        self.renew_lease_at(lease, ttl, Utc::now()).await
    }

    /// [`Self::renew_lease`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`Self::attempt_to_start`].
    pub async fn renew_lease_at(
        &self,
        lease: &TaskLease,
        ttl: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskLease>, DatabaseError> {
        let tx = self
            .db()
            .conn()
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;
        let result = extend_lease(&tx, lease, ttl, now).await;
        let renewed = finish(tx, &lease.task_name, result).await?;
        if renewed.is_none() {
            tracing::warn!(task = %lease.task_name, owner = %lease.owner, "lease lost before renewal");
        }
        Ok(renewed)
    }

    /// Release a lease. Returns `false` if `lease.owner` no longer holds it.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the update fails.
    pub async fn release_lease(&self, lease: &TaskLease) -> Result<bool, DatabaseError> {
        let changed = self
            .db()
            .conn()
            .execute(
                "UPDATE task_gate SET lease_owner = NULL, lease_expires_at = NULL
                 WHERE task_name = ?1 AND lease_owner = ?2",
                libsql::params![lease.task_name.as_str(), lease.owner.as_str()],
            )
            .await?;
        let released = changed == 1;
        tracing::debug!(task = %lease.task_name, owner = %lease.owner, released, "lease release");
        Ok(released)
    }
}
