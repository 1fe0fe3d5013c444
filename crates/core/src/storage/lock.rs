use anyhow::Context;

// Advisory locks are scoped to the Postgres session, so acquire and release must run on the same
// connection. Used as a best-effort guard against two recomputes for the same user racing.
const LOCK_NAMESPACE: i64 = 0x4B41_5254_4951; // "KARTIQ"

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn lock_key_for_user(user_id: &str) -> i64 {
    LOCK_NAMESPACE ^ (fnv1a(user_id.as_bytes()) as i64)
}

pub async fn try_acquire_user_lock(
    conn: &mut sqlx::PgConnection,
    user_id: &str,
) -> anyhow::Result<bool> {
    let key = lock_key_for_user(user_id);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (user={user_id}, key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_user_lock(conn: &mut sqlx::PgConnection, user_id: &str) -> anyhow::Result<()> {
    let key = lock_key_for_user(user_id);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to release advisory lock (user={user_id}, key={key})"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_distinct() {
        assert_eq!(lock_key_for_user("alice"), lock_key_for_user("alice"));
        assert_ne!(lock_key_for_user("alice"), lock_key_for_user("bob"));
    }
}
