//! In-memory stand-ins for the Mongo persister and Redis mutex.

use crate::core::{Mutex, Pending, Persister, RecordStore};
use crate::models::{Community, User};
use anyhow::Error;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

pub(crate) fn user(user_id: &str, username: &str, total_points: i32) -> User {
    User {
        user_id: user_id.to_owned(),
        username: username.to_owned(),
        total_points,
        profile_picture_url: None,
        daily_target: None,
    }
}

pub(crate) fn community(community_id: &str, name: &str, code: &str) -> Community {
    Community {
        community_id: community_id.to_owned(),
        community_name: name.to_owned(),
        community_code: code.to_owned(),
        member_count: 0,
        geohash: None,
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    users: RwLock<Vec<User>>,
    delays: RwLock<HashMap<String, u64>>,
    communities: RwLock<Vec<Community>>,
    memberships: RwLock<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn insert_user(&self, user: User) {
        self.users.write().unwrap().push(user);
    }

    /// Lookups of this user take `delay_ms` to complete.
    pub fn add_user_with_delay(&self, user: User, delay_ms: u64) {
        self.delays.write().unwrap().insert(user.user_id.clone(), delay_ms);
        self.insert_user(user);
    }

    pub fn insert_community(&self, community: Community) {
        self.communities.write().unwrap().push(community);
    }

    pub fn insert_membership(&self, community_id: &str, user_id: &str) {
        self.memberships
            .write()
            .unwrap()
            .push((community_id.to_owned(), user_id.to_owned()));
    }

    pub fn member_count(&self, community_id: &str) -> i64 {
        self.communities
            .read()
            .unwrap()
            .iter()
            .find(|c| c.community_id == community_id)
            .map(|c| c.member_count)
            .unwrap_or_default()
    }

    fn has_membership(&self, community_id: &str, user_id: &str) -> bool {
        self.memberships
            .read()
            .unwrap()
            .iter()
            .any(|(c, u)| c == community_id && u == user_id)
    }
}

impl RecordStore<String, User> for MemoryStore {
    fn resolve<'a>(&'a self, id: &'a String) -> Pending<'a, Option<User>> {
        Box::pin(async move {
            let delay = self.delays.read().unwrap().get(id).copied();
            if let Some(ms) = delay {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            Ok(self.users.read().unwrap().iter().find(|u| &u.user_id == id).cloned())
        })
    }

    fn list_ids<'a>(&'a self) -> Pending<'a, Vec<String>> {
        Box::pin(async move { Ok(self.users.read().unwrap().iter().map(|u| u.user_id.clone()).collect()) })
    }
}

impl RecordStore<String, Community> for MemoryStore {
    fn resolve<'a>(&'a self, id: &'a String) -> Pending<'a, Option<Community>> {
        Box::pin(async move { Ok(self.communities.read().unwrap().iter().find(|c| &c.community_id == id).cloned()) })
    }

    fn list_ids<'a>(&'a self) -> Pending<'a, Vec<String>> {
        Box::pin(async move { Ok(self.communities.read().unwrap().iter().map(|c| c.community_id.clone()).collect()) })
    }
}

impl Persister for MemoryStore {
    fn member_ids<'a>(&'a self, community_id: &'a str) -> Pending<'a, Vec<String>> {
        Box::pin(async move {
            Ok(self
                .memberships
                .read()
                .unwrap()
                .iter()
                .filter(|(c, _)| c == community_id)
                .map(|(_, u)| u.clone())
                .collect())
        })
    }

    fn is_member<'a>(&'a self, community_id: &'a str, user_id: &'a str) -> Pending<'a, bool> {
        Box::pin(async move { Ok(self.has_membership(community_id, user_id)) })
    }

    fn add_member<'a>(&'a self, community_id: &'a str, user_id: &'a str) -> Pending<'a, ()> {
        Box::pin(async move {
            self.insert_membership(community_id, user_id);
            Ok(())
        })
    }

    fn remove_member<'a>(&'a self, community_id: &'a str, user_id: &'a str) -> Pending<'a, ()> {
        Box::pin(async move {
            self.memberships
                .write()
                .unwrap()
                .retain(|(c, u)| !(c == community_id && u == user_id));
            Ok(())
        })
    }

    fn adjust_member_count<'a>(&'a self, community_id: &'a str, delta: i64) -> Pending<'a, ()> {
        Box::pin(async move {
            if let Some(c) = self
                .communities
                .write()
                .unwrap()
                .iter_mut()
                .find(|c| c.community_id == community_id)
            {
                c.member_count += delta;
            }
            Ok(())
        })
    }

    fn community_by_code<'a>(&'a self, code: &'a str) -> Pending<'a, Option<Community>> {
        Box::pin(async move { Ok(self.communities.read().unwrap().iter().find(|c| c.community_code == code).cloned()) })
    }

    fn communities_by_geohash<'a>(&'a self, prefixes: Vec<String>) -> Pending<'a, Vec<Community>> {
        Box::pin(async move {
            Ok(self
                .communities
                .read()
                .unwrap()
                .iter()
                .filter(|c| match &c.geohash {
                    Some(hash) => prefixes.iter().any(|p| hash.starts_with(p.as_str())),
                    None => false,
                })
                .cloned()
                .collect())
        })
    }

    fn all_users<'a>(&'a self) -> Pending<'a, Vec<User>> {
        Box::pin(async move { Ok(self.users.read().unwrap().clone()) })
    }

    fn set_daily_target<'a>(&'a self, user_id: &'a str, minutes: i16) -> Pending<'a, bool> {
        Box::pin(async move {
            let mut users = self.users.write().unwrap();
            match users.iter_mut().find(|u| u.user_id == user_id) {
                Some(u) => {
                    u.daily_target = Some(minutes);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}

/// Fails fast instead of waiting when the key is already held.
#[derive(Default)]
pub(crate) struct MemoryMutex {
    held: RwLock<HashSet<String>>,
}

impl MemoryMutex {
    pub fn is_idle(&self) -> bool {
        self.held.read().unwrap().is_empty()
    }
}

impl Mutex for MemoryMutex {
    fn acquire<'a>(&'a self, key: &'a str) -> Pending<'a, String> {
        Box::pin(async move {
            if !self.held.write().unwrap().insert(key.to_owned()) {
                return Err(Error::msg(format!("lock {} is busy", key)));
            }
            Ok(format!("token:{}", key))
        })
    }

    fn release<'a>(&'a self, key: &'a str, token: &'a str) -> Pending<'a, ()> {
        Box::pin(async move {
            if token != format!("token:{}", key) {
                return Err(Error::msg("lock released with a foreign token"));
            }
            self.held.write().unwrap().remove(key);
            Ok(())
        })
    }
}
