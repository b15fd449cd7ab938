use crate::error::CommunityError;
use crate::geohash::GeoError;
use crate::join::{join_records, FetchOptions, JoinReport};
use crate::models::{Community, GeoCoordinate, LeaderboardEntry, Member, User};
use anyhow::Error;
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::ops::RangeInclusive;
use std::pin::Pin;

pub(crate) type Pending<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + 'a>>;

pub(crate) const DEFAULT_DAILY_GOAL: i16 = 1;
pub(crate) const DAILY_GOAL_RANGE: RangeInclusive<i16> = 1..=30;

/// A keyed source of remote records.
pub(crate) trait RecordStore<K, T> {
    /// `Ok(None)` when the record does not exist.
    fn resolve<'a>(&'a self, id: &'a K) -> Pending<'a, Option<T>>;
    fn list_ids<'a>(&'a self) -> Pending<'a, Vec<K>>;
}

pub(crate) trait Mutex {
    /// Blocks until the lock is held and returns the owner token needed to release it.
    fn acquire<'a>(&'a self, key: &'a str) -> Pending<'a, String>;
    fn release<'a>(&'a self, key: &'a str, token: &'a str) -> Pending<'a, ()>;
}

pub(crate) trait Indexer<I>
where
    I: Display + Send + Sync,
{
    fn index(&self, coord: GeoCoordinate) -> Result<I, GeoError>;
    /// The cell itself followed by its adjacent cells.
    fn neighbors(&self, index: &I) -> Result<Vec<I>, GeoError>;
}

pub(crate) trait Persister {
    fn member_ids<'a>(&'a self, community_id: &'a str) -> Pending<'a, Vec<String>>;
    fn is_member<'a>(&'a self, community_id: &'a str, user_id: &'a str) -> Pending<'a, bool>;
    fn add_member<'a>(&'a self, community_id: &'a str, user_id: &'a str) -> Pending<'a, ()>;
    fn remove_member<'a>(&'a self, community_id: &'a str, user_id: &'a str) -> Pending<'a, ()>;
    fn adjust_member_count<'a>(&'a self, community_id: &'a str, delta: i64) -> Pending<'a, ()>;
    fn community_by_code<'a>(&'a self, code: &'a str) -> Pending<'a, Option<Community>>;
    fn communities_by_geohash<'a>(&'a self, prefixes: Vec<String>) -> Pending<'a, Vec<Community>>;
    fn all_users<'a>(&'a self) -> Pending<'a, Vec<User>>;
    /// Returns false when no such user exists.
    fn set_daily_target<'a>(&'a self, user_id: &'a str, minutes: i16) -> Pending<'a, bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SortOrder {
    PointsDesc,
    PointsAsc,
    NameAsc,
    NameDesc,
}

impl SortOrder {
    pub fn apply(self, members: &mut [Member]) {
        match self {
            SortOrder::PointsDesc => members.sort_by(|a, b| b.total_points.cmp(&a.total_points)),
            SortOrder::PointsAsc => members.sort_by(|a, b| a.total_points.cmp(&b.total_points)),
            SortOrder::NameAsc => members.sort_by_cached_key(|m| m.username.to_lowercase()),
            SortOrder::NameDesc => {
                members.sort_by(|a, b| b.username.to_lowercase().cmp(&a.username.to_lowercase()))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct MemberQuery {
    pub search: Option<String>,
    pub sort: Option<SortOrder>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MemberList {
    pub members: Vec<Member>,
    pub failed: Vec<String>,
    /// Number of memberships, including members whose profile could not be loaded.
    pub total: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CommunityQuery {
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CommunityList {
    pub communities: Vec<Community>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct DailyGoal {
    pub minutes: i16,
    pub label: String,
}

impl DailyGoal {
    fn new(minutes: i16) -> Self {
        Self {
            minutes,
            label: format!("{} min", minutes),
        }
    }
}

/// Case-insensitive substring match on username. An empty query matches everyone.
pub(crate) fn filter_members(members: Vec<Member>, search: &str) -> Vec<Member> {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return members;
    }
    members
        .into_iter()
        .filter(|m| m.username.to_lowercase().contains(&needle))
        .collect()
}

/// Case-insensitive substring match on community name. An empty query matches everything.
pub(crate) fn filter_communities(communities: Vec<Community>, search: &str) -> Vec<Community> {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return communities;
    }
    communities
        .into_iter()
        .filter(|c| c.community_name.to_lowercase().contains(&needle))
        .collect()
}

pub(crate) async fn community_members<P>(
    persister: &P,
    community_id: &str,
    query: &MemberQuery,
    options: FetchOptions,
) -> Result<MemberList, Error>
where
    P: Persister + RecordStore<String, User>,
{
    let ids = persister.member_ids(community_id).await?;
    let report: JoinReport<String, User> = join_records(persister, &ids, options).await;
    if !report.is_complete() {
        warn!("{} of {} members of community {} could not be loaded", report.failed.len(), ids.len(), community_id);
    }
    let failed = report.failed_ids().into_iter().cloned().collect();
    let members = report.records.into_iter().map(Member::from).collect();
    let mut members = filter_members(members, query.search.as_deref().unwrap_or_default());
    if let Some(order) = query.sort {
        order.apply(&mut members);
    }
    Ok(MemberList {
        members,
        failed,
        total: ids.len(),
    })
}

pub(crate) async fn user_communities<P>(
    persister: &P,
    user_id: &str,
    query: &CommunityQuery,
    options: FetchOptions,
) -> Result<CommunityList, Error>
where
    P: Persister + RecordStore<String, Community>,
{
    let community_ids = persister.list_ids().await?;
    let checks = join_all(community_ids.iter().map(|id| persister.is_member(id, user_id))).await;
    let joined: Vec<String> = community_ids
        .iter()
        .zip(checks)
        .filter_map(|(id, check)| match check {
            Ok(true) => Some(id.clone()),
            Ok(false) => None,
            Err(e) => {
                warn!("failed to check membership of {} in community {}: {}", user_id, id, e);
                None
            }
        })
        .collect();
    let report: JoinReport<String, Community> = join_records(persister, &joined, options).await;
    let failed = report.failed_ids().into_iter().cloned().collect();
    Ok(CommunityList {
        communities: filter_communities(report.records, query.search.as_deref().unwrap_or_default()),
        failed,
    })
}

pub(crate) async fn leaderboard<P>(persister: &P, user_id: Option<&str>) -> Result<Leaderboard, Error>
where
    P: Persister,
{
    let mut users = persister.all_users().await?;
    users.sort_by(|a, b| b.total_points.cmp(&a.total_points));
    let entries: Vec<LeaderboardEntry> = users
        .into_iter()
        .enumerate()
        .map(|(i, u)| LeaderboardEntry {
            rank: i + 1,
            user_id: u.user_id,
            username: u.username,
            total_points: u.total_points,
        })
        .collect();
    let position = user_id.and_then(|uid| entries.iter().find(|e| e.user_id == uid).map(|e| e.rank));
    Ok(Leaderboard { entries, position })
}

fn membership_key(community_id: &str, user_id: &str) -> String {
    format!("membership:{}:{}", community_id, user_id)
}

pub(crate) async fn join_community<M, P>(mutex: &M, persister: &P, user_id: &str, code: &str) -> Result<Community, Error>
where
    M: Mutex,
    P: Persister,
{
    let mut community = persister
        .community_by_code(code)
        .await?
        .ok_or_else(|| CommunityError::CodeNotFound(code.to_owned()))?;
    let key = membership_key(&community.community_id, user_id);
    let token = mutex.acquire(&key).await?;
    let res = enroll(persister, &community.community_id, user_id).await;
    let released = mutex.release(&key, &token).await;
    if let Err(e) = &released {
        warn!("failed to release lock {}: {}", key, e);
    }
    res?;
    released?;
    community.member_count += 1;
    info!("user {} joined community {}", user_id, community.community_id);
    Ok(community)
}

async fn enroll<P: Persister>(persister: &P, community_id: &str, user_id: &str) -> Result<(), Error> {
    if persister.is_member(community_id, user_id).await? {
        return Err(CommunityError::AlreadyMember(community_id.to_owned()).into());
    }
    persister.add_member(community_id, user_id).await?;
    persister.adjust_member_count(community_id, 1).await
}

pub(crate) async fn leave_community<M, P>(mutex: &M, persister: &P, user_id: &str, community_id: &str) -> Result<(), Error>
where
    M: Mutex,
    P: Persister,
{
    let key = membership_key(community_id, user_id);
    let token = mutex.acquire(&key).await?;
    let res = withdraw(persister, community_id, user_id).await;
    let released = mutex.release(&key, &token).await;
    if let Err(e) = &released {
        warn!("failed to release lock {}: {}", key, e);
    }
    res?;
    released?;
    info!("user {} left community {}", user_id, community_id);
    Ok(())
}

async fn withdraw<P: Persister>(persister: &P, community_id: &str, user_id: &str) -> Result<(), Error> {
    if !persister.is_member(community_id, user_id).await? {
        return Err(CommunityError::NotMember(community_id.to_owned()).into());
    }
    persister.remove_member(community_id, user_id).await?;
    persister.adjust_member_count(community_id, -1).await
}

pub(crate) async fn nearby_communities<I, P>(indexer: &I, persister: &P, coord: GeoCoordinate) -> Result<Vec<Community>, Error>
where
    I: Indexer<String>,
    P: Persister,
{
    let cell = indexer.index(coord)?;
    let cells = indexer.neighbors(&cell)?;
    persister.communities_by_geohash(cells).await
}

pub(crate) async fn daily_goal<P>(persister: &P, user_id: &str) -> Result<DailyGoal, Error>
where
    P: RecordStore<String, User>,
{
    let user = persister
        .resolve(&user_id.to_owned())
        .await?
        .ok_or_else(|| CommunityError::NotFound(format!("user {}", user_id)))?;
    Ok(DailyGoal::new(user.daily_target.unwrap_or(DEFAULT_DAILY_GOAL)))
}

pub(crate) async fn set_daily_goal<P>(persister: &P, user_id: &str, minutes: i16) -> Result<DailyGoal, Error>
where
    P: Persister,
{
    if !DAILY_GOAL_RANGE.contains(&minutes) {
        return Err(CommunityError::InvalidArgument(format!(
            "daily goal must be between {} and {} minutes",
            DAILY_GOAL_RANGE.start(),
            DAILY_GOAL_RANGE.end()
        ))
        .into());
    }
    if !persister.set_daily_target(user_id, minutes).await? {
        return Err(CommunityError::NotFound(format!("user {}", user_id)).into());
    }
    Ok(DailyGoal::new(minutes))
}

pub(crate) fn share_message(community: &Community) -> String {
    format!(
        "Join my community on DeskBreak! Use this code to join: {}\nDownload the app and get started!",
        community.community_code
    )
}
