use crate::core::{self, CommunityList, CommunityQuery, DailyGoal, Indexer, Leaderboard, MemberList, MemberQuery, Mutex, Persister, RecordStore};
use crate::error::{CommunityError, Error};
use crate::geohash::{self, Boundary};
use crate::indexers::MAX_PRECISION;
use crate::join::FetchOptions;
use crate::models::{Community, GeoCoordinate, User};
use actix_header::actix_header;
use actix_web::web::{self, delete, get, post, put, Data, Header, Json, Path, Query};
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

const DEFAULT_ENCODE_PRECISION: usize = 9;

#[actix_header("UID")]
pub struct UID(String);

impl From<String> for UID {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<UID> for String {
    fn from(u: UID) -> Self {
        u.0
    }
}

/// Request-independent settings handed to every handler.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Settings {
    pub fetch: FetchOptions,
    pub boundary: Boundary,
}

pub(crate) fn routes<M, I, P>(cfg: &mut web::ServiceConfig)
where
    M: Mutex + 'static,
    I: Indexer<String> + 'static,
    P: Persister + RecordStore<String, User> + RecordStore<String, Community> + 'static,
{
    cfg.route("/geohash", get().to(encode_geohash))
        .route("/communities", get().to(user_communities::<P>))
        .route("/communities/nearby", get().to(nearby_communities::<I, P>))
        .route("/communities/join", post().to(join_community::<M, P>))
        .service(
            web::resource("/communities/{id}/members")
                .route(get().to(community_members::<P>))
                .route(delete().to(leave_community::<M, P>)),
        )
        .route("/communities/{id}/share", get().to(share_community::<P>))
        .route("/leaderboard", get().to(leaderboard::<P>))
        .service(
            web::resource("/users/me/daily-goal")
                .route(get().to(daily_goal::<P>))
                .route(put().to(set_daily_goal::<P>)),
        );
}

#[derive(Deserialize)]
pub(crate) struct EncodeGeohash {
    latitude: f64,
    longitude: f64,
    precision: Option<usize>,
}

#[derive(Serialize)]
pub(crate) struct GeohashResponse {
    geohash: String,
}

pub(crate) async fn encode_geohash(Query(query): Query<EncodeGeohash>, settings: Data<Settings>) -> Result<Json<GeohashResponse>, Error> {
    let precision = query.precision.unwrap_or(DEFAULT_ENCODE_PRECISION);
    if precision > MAX_PRECISION {
        return Err(CommunityError::InvalidArgument(format!("precision must not exceed {}", MAX_PRECISION)).into());
    }
    let coord = GeoCoordinate {
        latitude: query.latitude,
        longitude: query.longitude,
    };
    let geohash = geohash::encode_with(coord, precision, settings.boundary)?;
    Ok(Json(GeohashResponse { geohash }))
}

pub(crate) async fn community_members<P>(
    community_id: Path<String>,
    Query(query): Query<MemberQuery>,
    persister: Data<P>,
    settings: Data<Settings>,
) -> Result<Json<MemberList>, Error>
where
    P: Persister + RecordStore<String, User>,
{
    let list = core::community_members(persister.get_ref(), &community_id, &query, settings.fetch).await?;
    Ok(Json(list))
}

pub(crate) async fn user_communities<P>(
    Header(UID(uid)): Header<UID>,
    Query(query): Query<CommunityQuery>,
    persister: Data<P>,
    settings: Data<Settings>,
) -> Result<Json<CommunityList>, Error>
where
    P: Persister + RecordStore<String, Community>,
{
    let list = core::user_communities(persister.get_ref(), &uid, &query, settings.fetch).await?;
    Ok(Json(list))
}

pub(crate) async fn nearby_communities<I, P>(Query(coord): Query<GeoCoordinate>, indexer: Data<I>, persister: Data<P>) -> Result<Json<Vec<Community>>, Error>
where
    I: Indexer<String>,
    P: Persister,
{
    let communities = core::nearby_communities(indexer.get_ref(), persister.get_ref(), coord).await?;
    Ok(Json(communities))
}

#[derive(Deserialize)]
pub(crate) struct JoinCommunity {
    code: String,
}

pub(crate) async fn join_community<M, P>(Header(UID(uid)): Header<UID>, Json(req): Json<JoinCommunity>, mutex: Data<M>, persister: Data<P>) -> Result<Json<Community>, Error>
where
    M: Mutex,
    P: Persister,
{
    let community = core::join_community(mutex.get_ref(), persister.get_ref(), &uid, req.code.trim()).await?;
    Ok(Json(community))
}

pub(crate) async fn leave_community<M, P>(Header(UID(uid)): Header<UID>, community_id: Path<String>, mutex: Data<M>, persister: Data<P>) -> Result<HttpResponse, Error>
where
    M: Mutex,
    P: Persister,
{
    core::leave_community(mutex.get_ref(), persister.get_ref(), &uid, &community_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Serialize)]
pub(crate) struct ShareResponse {
    message: String,
}

pub(crate) async fn share_community<P>(community_id: Path<String>, persister: Data<P>) -> Result<Json<ShareResponse>, Error>
where
    P: RecordStore<String, Community>,
{
    let id = community_id.into_inner();
    let community = persister
        .resolve(&id)
        .await?
        .ok_or_else(|| CommunityError::NotFound(format!("community {}", id)))?;
    Ok(Json(ShareResponse {
        message: core::share_message(&community),
    }))
}

pub(crate) async fn leaderboard<P>(Header(UID(uid)): Header<UID>, persister: Data<P>) -> Result<Json<Leaderboard>, Error>
where
    P: Persister,
{
    let board = core::leaderboard(persister.get_ref(), Some(&uid)).await?;
    Ok(Json(board))
}

pub(crate) async fn daily_goal<P>(Header(UID(uid)): Header<UID>, persister: Data<P>) -> Result<Json<DailyGoal>, Error>
where
    P: RecordStore<String, User>,
{
    Ok(Json(core::daily_goal(persister.get_ref(), &uid).await?))
}

#[derive(Deserialize)]
pub(crate) struct UpdateDailyGoal {
    minutes: i16,
}

pub(crate) async fn set_daily_goal<P>(Header(UID(uid)): Header<UID>, Json(req): Json<UpdateDailyGoal>, persister: Data<P>) -> Result<Json<DailyGoal>, Error>
where
    P: Persister,
{
    Ok(Json(core::set_daily_goal(persister.get_ref(), &uid, req.minutes).await?))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::indexers::GeohashIndexer;
    use crate::testing::{community, user, MemoryMutex, MemoryStore};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    #[derive(Deserialize)]
    struct GeohashBody {
        geohash: String,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct MemberBody {
        user_id: String,
    }

    #[derive(Deserialize)]
    struct MembersBody {
        members: Vec<MemberBody>,
        failed: Vec<String>,
        total: usize,
    }

    #[derive(Deserialize)]
    struct LeaderboardBody {
        position: Option<usize>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct CommunityBody {
        community_id: String,
        member_count: i64,
    }

    #[derive(Deserialize)]
    struct GoalBody {
        minutes: i16,
        label: String,
    }

    fn seeded() -> Data<MemoryStore> {
        let store = MemoryStore::default();
        store.insert_user(user("u1", "Asha", 40));
        store.insert_user(user("u2", "Ben", 90));
        store.insert_user(user("u3", "Chen", 10));
        store.insert_community(community("c1", "Standing Desks", "DESK01"));
        store.insert_membership("c1", "u3");
        store.insert_membership("c1", "u1");
        Data::new(store)
    }

    macro_rules! app {
        ($store:expr) => {
            test::init_service(
                App::new()
                    .app_data($store.clone())
                    .app_data(Data::new(MemoryMutex::default()))
                    .app_data(Data::new(GeohashIndexer::new(5).unwrap()))
                    .app_data(Data::new(Settings::default()))
                    .configure(routes::<MemoryMutex, GeohashIndexer, MemoryStore>),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_encode_geohash() {
        let store = seeded();
        let app = app!(store);
        let req = test::TestRequest::get().uri("/geohash?latitude=0&longitude=0&precision=1").to_request();
        let body: GeohashBody = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.geohash, "s");

        let req = test::TestRequest::get().uri("/geohash?latitude=95&longitude=0").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        let req = test::TestRequest::get().uri("/geohash?latitude=1&longitude=1&precision=40").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_members_listing() {
        let store = seeded();
        store.insert_membership("c1", "ghost");
        let app = app!(store);
        let req = test::TestRequest::get().uri("/communities/c1/members?sort=points_desc").to_request();
        let body: MembersBody = test::call_and_read_body_json(&app, req).await;
        let ids: Vec<&str> = body.members.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u3"]);
        assert_eq!(body.failed, vec!["ghost"]);
        assert_eq!(body.total, 3);
    }

    #[actix_web::test]
    async fn test_join_flow() {
        let store = seeded();
        let app = app!(store);
        let req = test::TestRequest::post()
            .uri("/communities/join")
            .insert_header(("UID", "u2"))
            .set_json(join_body("DESK01"))
            .to_request();
        let body: CommunityBody = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.community_id, "c1");
        assert_eq!(body.member_count, 1);

        let req = test::TestRequest::post()
            .uri("/communities/join")
            .insert_header(("UID", "u2"))
            .set_json(join_body("DESK01"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri("/communities/join")
            .insert_header(("UID", "u2"))
            .set_json(join_body("NOPE"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::delete()
            .uri("/communities/c1/members")
            .insert_header(("UID", "u2"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    }

    #[derive(Deserialize)]
    struct CommunitiesBody {
        communities: Vec<CommunityBody>,
    }

    #[actix_web::test]
    async fn test_user_communities_search() {
        let store = seeded();
        store.insert_community(community("c2", "Evening Walk", "WALK02"));
        store.insert_membership("c2", "u1");
        let app = app!(store);

        let req = test::TestRequest::get().uri("/communities").insert_header(("UID", "u1")).to_request();
        let body: CommunitiesBody = test::call_and_read_body_json(&app, req).await;
        let ids: Vec<&str> = body.communities.iter().map(|c| c.community_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);

        let req = test::TestRequest::get().uri("/communities?search=desk").insert_header(("UID", "u1")).to_request();
        let body: CommunitiesBody = test::call_and_read_body_json(&app, req).await;
        let ids: Vec<&str> = body.communities.iter().map(|c| c.community_id.as_str()).collect();
        assert_eq!(ids, vec!["c1"]);
    }

    #[derive(Serialize)]
    struct JoinBody {
        code: String,
    }

    fn join_body(code: &str) -> JoinBody {
        JoinBody { code: code.to_owned() }
    }

    #[actix_web::test]
    async fn test_leaderboard_requires_uid() {
        let store = seeded();
        let app = app!(store);
        let req = test::TestRequest::get().uri("/leaderboard").insert_header(("UID", "u1")).to_request();
        let body: LeaderboardBody = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.position, Some(2));

        let req = test::TestRequest::get().uri("/leaderboard").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_daily_goal_roundtrip() {
        let store = seeded();
        let app = app!(store);
        let req = test::TestRequest::put()
            .uri("/users/me/daily-goal")
            .insert_header(("UID", "u1"))
            .set_json(UpdateBody { minutes: 20 })
            .to_request();
        let body: GoalBody = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.label, "20 min");

        let req = test::TestRequest::get().uri("/users/me/daily-goal").insert_header(("UID", "u1")).to_request();
        let body: GoalBody = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.minutes, 20);

        let req = test::TestRequest::put()
            .uri("/users/me/daily-goal")
            .insert_header(("UID", "u1"))
            .set_json(UpdateBody { minutes: 0 })
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[derive(Serialize)]
    struct UpdateBody {
        minutes: i16,
    }
}
