use crate::core::{Pending, Persister, RecordStore};
use crate::models::*;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};

const USERS: &str = "users";
const COMMUNITIES: &str = "communities";
const MEMBERSHIPS: &str = "memberships";

#[derive(Clone)]
pub(crate) struct MongoPersister {
    db: Database,
}

impl MongoPersister {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn communities(&self) -> Collection<Community> {
        self.db.collection(COMMUNITIES)
    }

    fn memberships(&self) -> Collection<Membership> {
        self.db.collection(MEMBERSHIPS)
    }

    async fn field_values(&self, coll: &str, filter: Option<Document>, field: &str, sort: Document) -> Result<Vec<String>, anyhow::Error> {
        let opts = FindOptions::builder().projection(doc! { field: 1, "_id": 0 }).sort(sort).build();
        let docs: Vec<Document> = self.db.collection::<Document>(coll).find(filter, opts).await?.try_collect().await?;
        let mut values = Vec::with_capacity(docs.len());
        for d in docs {
            values.push(d.get_str(field)?.to_owned());
        }
        Ok(values)
    }
}

impl RecordStore<String, User> for MongoPersister {
    fn resolve<'a>(&'a self, id: &'a String) -> Pending<'a, Option<User>> {
        Box::pin(async move { Ok(self.users().find_one(doc! { "userId": id.as_str() }, None).await?) })
    }

    fn list_ids<'a>(&'a self) -> Pending<'a, Vec<String>> {
        Box::pin(async move { self.field_values(USERS, None, "userId", doc! { "userId": 1 }).await })
    }
}

impl RecordStore<String, Community> for MongoPersister {
    fn resolve<'a>(&'a self, id: &'a String) -> Pending<'a, Option<Community>> {
        Box::pin(async move { Ok(self.communities().find_one(doc! { "communityId": id.as_str() }, None).await?) })
    }

    fn list_ids<'a>(&'a self) -> Pending<'a, Vec<String>> {
        Box::pin(async move { self.field_values(COMMUNITIES, None, "communityId", doc! { "communityId": 1 }).await })
    }
}

impl Persister for MongoPersister {
    fn member_ids<'a>(&'a self, community_id: &'a str) -> Pending<'a, Vec<String>> {
        Box::pin(async move {
            self.field_values(MEMBERSHIPS, Some(doc! { "communityId": community_id }), "userId", doc! { "joinedAt": 1 })
                .await
        })
    }

    fn is_member<'a>(&'a self, community_id: &'a str, user_id: &'a str) -> Pending<'a, bool> {
        Box::pin(async move {
            let n = self
                .memberships()
                .count_documents(doc! { "communityId": community_id, "userId": user_id }, None)
                .await?;
            Ok(n > 0)
        })
    }

    fn add_member<'a>(&'a self, community_id: &'a str, user_id: &'a str) -> Pending<'a, ()> {
        Box::pin(async move {
            let membership = Membership {
                community_id: community_id.to_owned(),
                user_id: user_id.to_owned(),
                joined_at: Utc::now(),
            };
            self.memberships().insert_one(membership, None).await?;
            Ok(())
        })
    }

    fn remove_member<'a>(&'a self, community_id: &'a str, user_id: &'a str) -> Pending<'a, ()> {
        Box::pin(async move {
            self.memberships()
                .delete_one(doc! { "communityId": community_id, "userId": user_id }, None)
                .await?;
            Ok(())
        })
    }

    fn adjust_member_count<'a>(&'a self, community_id: &'a str, delta: i64) -> Pending<'a, ()> {
        Box::pin(async move {
            self.communities()
                .update_one(doc! { "communityId": community_id }, doc! { "$inc": { "memberCount": delta } }, None)
                .await?;
            Ok(())
        })
    }

    fn community_by_code<'a>(&'a self, code: &'a str) -> Pending<'a, Option<Community>> {
        Box::pin(async move { Ok(self.communities().find_one(doc! { "communityCode": code }, None).await?) })
    }

    fn communities_by_geohash<'a>(&'a self, prefixes: Vec<String>) -> Pending<'a, Vec<Community>> {
        Box::pin(async move {
            if prefixes.is_empty() {
                return Ok(Vec::new());
            }
            // geohash symbols carry no regex metacharacters
            let any_prefix: Vec<Document> = prefixes
                .iter()
                .map(|p| doc! { "geohash": { "$regex": format!("^{}", p) } })
                .collect();
            let opts = FindOptions::builder().sort(doc! { "communityId": 1 }).build();
            let found = self.communities().find(doc! { "$or": any_prefix }, opts).await?.try_collect().await?;
            Ok(found)
        })
    }

    fn all_users<'a>(&'a self) -> Pending<'a, Vec<User>> {
        Box::pin(async move { Ok(self.users().find(None, None).await?.try_collect().await?) })
    }

    fn set_daily_target<'a>(&'a self, user_id: &'a str, minutes: i16) -> Pending<'a, bool> {
        Box::pin(async move {
            let res = self
                .users()
                .update_one(doc! { "userId": user_id }, doc! { "$set": { "dailyTarget": minutes as i32 } }, None)
                .await?;
            Ok(res.matched_count > 0)
        })
    }
}
