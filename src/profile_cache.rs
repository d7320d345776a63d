//! User profile cache.
//!
//! Owned by whoever creates it and passed to the code that needs it, so each
//! test (or request scope) gets its own.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "admin")
    }
}

struct CachedProfile {
    profile: Profile,
    cached_at: DateTime<Utc>,
}

pub struct ProfileCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedProfile>>,
}

impl ProfileCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedProfile>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, user_id: &str) -> Option<Profile> {
        self.get_at(user_id, Utc::now())
    }

    /// Expired entries are evicted on read.
    pub fn get_at(&self, user_id: &str, now: DateTime<Utc>) -> Option<Profile> {
        let mut entries = self.entries();
        let expired = match entries.get(user_id) {
            Some(entry) if now - entry.cached_at < self.ttl => return Some(entry.profile.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!(user_id = %user_id, "Profile cache entry expired");
            entries.remove(user_id);
        }
        None
    }

    pub fn insert(&self, profile: Profile) {
        self.insert_at(profile, Utc::now());
    }

    pub fn insert_at(&self, profile: Profile, now: DateTime<Utc>) {
        self.entries().insert(
            profile.user_id.clone(),
            CachedProfile {
                profile,
                cached_at: now,
            },
        );
    }

    pub fn invalidate(&self, user_id: &str) -> bool {
        self.entries().remove(user_id).is_some()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::new(Duration::minutes(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, roles: &[&str]) -> Profile {
        Profile {
            user_id: id.to_string(),
            full_name: format!("User {id}"),
            email: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn hit_then_expire() {
        let cache = ProfileCache::new(Duration::minutes(5));
        let t0 = Utc::now();
        cache.insert_at(profile("u1", &["laboratory"]), t0);

        assert_eq!(
            cache.get_at("u1", t0 + Duration::minutes(4)).unwrap().roles,
            vec!["laboratory"]
        );
        assert!(cache.get_at("u1", t0 + Duration::minutes(5)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = ProfileCache::default();
        cache.insert(profile("u1", &[]));
        cache.insert(profile("u2", &["admin"]));
        assert!(cache.get("u2").unwrap().is_admin());

        assert!(cache.invalidate("u1"));
        assert!(!cache.invalidate("u1"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.get("u2").is_none());
    }

    #[test]
    fn caches_are_independent() {
        let a = ProfileCache::default();
        let b = ProfileCache::default();
        a.insert(profile("u1", &[]));
        assert!(b.get("u1").is_none());
    }
}
