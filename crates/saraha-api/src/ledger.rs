use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use saraha_db::Database;

/// Records the jti of every logged-out token until that token would have
/// expired anyway. Only revoked tokens are stored; valid ones stay stateless.
#[derive(Clone)]
pub struct RevocationLedger {
    db: Arc<Database>,
}

impl RevocationLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Revoke `jti` until `expires_at` (unix seconds). Revoking twice is not
    /// an error. Tokens past their `exp` second are not recorded; one still
    /// inside it verifies, so it must be.
    pub async fn revoke(&self, jti: &str, user_id: &str, expires_at: i64) -> Result<()> {
        if expires_at < chrono::Utc::now().timestamp() {
            debug!("Skipping revocation of already-expired token");
            return Ok(());
        }

        let db = self.db.clone();
        let (jti, user_id) = (jti.to_string(), user_id.to_string());
        let result =
            tokio::task::spawn_blocking(move || db.insert_revoked_token(&jti, &user_id, expires_at))
                .await?;

        match result {
            Err(e) if saraha_db::is_unique_violation(&e) => Ok(()),
            other => other,
        }
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let db = self.db.clone();
        let jti = jti.to_string();
        let now = chrono::Utc::now().timestamp();
        tokio::task::spawn_blocking(move || db.is_token_revoked(&jti, now)).await?
    }

    /// Drop entries whose token expired more than `grace` ago.
    pub async fn prune(&self, grace: Duration) -> Result<usize> {
        let db = self.db.clone();
        let cutoff = chrono::Utc::now().timestamp() - grace.as_secs() as i64;
        tokio::task::spawn_blocking(move || db.prune_revoked_tokens(cutoff)).await?
    }
}

/// Background task that prunes stale revocation entries on an interval.
pub async fn run_prune_loop(ledger: RevocationLedger, interval: Duration, grace: Duration) {
    // A zero period would panic inside `interval`.
    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));

    loop {
        ticker.tick().await;

        match ledger.prune(grace).await {
            Ok(count) => {
                if count > 0 {
                    info!("Ledger: pruned {} expired revocations", count);
                }
            }
            Err(e) => {
                warn!("Ledger prune error: {:#}", e);
            }
        }
    }
}
