use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Advisory locks belong to the Postgres session, so callers hold one connection
// for both acquire and release.
const LOCK_NAMESPACE: i64 = 0x434F_554E_4349; // "COUNCI"

fn lock_key_for_date(scan_date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ i64::from(scan_date.num_days_from_ce())
}

pub async fn try_acquire_daily_scan_lock(
    conn: &mut sqlx::PgConnection,
    scan_date: NaiveDate,
) -> anyhow::Result<bool> {
    let key = lock_key_for_date(scan_date);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire daily scan lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_daily_scan_lock(
    conn: &mut sqlx::PgConnection,
    scan_date: NaiveDate,
) -> anyhow::Result<()> {
    let key = lock_key_for_date(scan_date);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to release daily scan lock (key={key})"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_differ_per_day() {
        let a = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_ne!(lock_key_for_date(a), lock_key_for_date(b));
        assert_eq!(lock_key_for_date(a), lock_key_for_date(a));
    }
}
