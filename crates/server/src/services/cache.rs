// Per-actor cache of unfiltered list results.
// Purely an optimization: a miss, an expired entry or a disabled cache all
// fall through to the database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;

use crate::db::models::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListScope {
    Projects,
    Tasks,
}

impl ListScope {
    fn prefix(&self) -> &'static str {
        match self {
            ListScope::Projects => "projects",
            ListScope::Tasks => "tasks",
        }
    }
}

struct Entry {
    stored_at: Instant,
    value: serde_json::Value,
}

#[derive(Clone)]
pub struct ListCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    ttl: Option<Duration>,
}

impl ListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: (!ttl.is_zero()).then_some(ttl),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    fn key(scope: ListScope, user_id: Id) -> String {
        format!("{}:index:user:{user_id}", scope.prefix())
    }

    pub async fn get<T: DeserializeOwned>(&self, scope: ListScope, user_id: Id) -> Option<T> {
        let ttl = self.ttl?;
        let key = Self::key(scope, user_id);

        let entries = self.entries.read().await;
        let entry = entries.get(&key)?;
        if entry.stored_at.elapsed() > ttl {
            return None;
        }

        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%key, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, scope: ListScope, user_id: Id, value: &T) {
        if self.ttl.is_none() {
            return;
        }

        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "list result not cacheable");
                return;
            }
        };

        let mut entries = self.entries.write().await;
        entries.insert(
            Self::key(scope, user_id),
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    pub async fn invalidate(&self, scope: ListScope, user_id: Id) {
        let mut entries = self.entries.write().await;
        entries.remove(&Self::key(scope, user_id));
    }
}

impl Default for ListCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
