//! Process-wide account cache: pages through all platform accounts at most
//! once per TTL and serves ranked substring searches from memory.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::PlatformError;
use crate::platform::{Account, PlatformClient};

/// Cache refresh interval.
const TTL: Duration = Duration::from_secs(30 * 60);

struct CacheState {
    accounts: Vec<Account>,
    last_refresh: Option<Instant>,
}

/// Lazily refreshed account listing. Writes replace the whole vector under
/// the mutex; reads clone out the matches.
pub struct AccountCache {
    client: Arc<PlatformClient>,
    state: Mutex<CacheState>,
}

impl AccountCache {
    pub fn new(client: Arc<PlatformClient>) -> Self {
        Self {
            client,
            state: Mutex::new(CacheState {
                accounts: Vec::new(),
                last_refresh: None,
            }),
        }
    }

    /// Case-insensitive substring search over business names, refreshing the
    /// cache first when stale or empty. Exact matches rank first, then
    /// prefix matches, then other substrings; ties keep listing order.
    pub async fn search(&self, query: &str) -> Result<Vec<Account>, PlatformError> {
        let mut state = self.state.lock().await;

        let stale = match state.last_refresh {
            None => true,
            Some(at) => at.elapsed() > TTL || state.accounts.is_empty(),
        };
        if stale {
            let mut all = Vec::new();
            let mut cursor: Option<String> = None;
            loop {
                let page = self.client.accounts_page(cursor.as_deref()).await?;
                all.extend(page.nodes);
                if !page.has_next {
                    break;
                }
                cursor = page.end_cursor;
            }
            tracing::info!(count = all.len(), "account cache refreshed");
            state.accounts = all;
            state.last_refresh = Some(Instant::now());
        }

        Ok(rank_matches(&state.accounts, query))
    }
}

/// Ranked filter: exact, then prefix, then other substring matches.
pub fn rank_matches(accounts: &[Account], query: &str) -> Vec<Account> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut exact = Vec::new();
    let mut prefix = Vec::new();
    let mut contains = Vec::new();

    for account in accounts {
        let name = account.business_name.to_lowercase();
        if name == needle {
            exact.push(account.clone());
        } else if name.starts_with(&needle) {
            prefix.push(account.clone());
        } else if name.contains(&needle) {
            contains.push(account.clone());
        }
    }

    exact.extend(prefix);
    exact.extend(contains);
    exact
}
