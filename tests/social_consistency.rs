//! 身份目录、文档存储与计数缓存之间的一致性

use async_trait::async_trait;
use std::sync::Arc;

use blog_server::auth::{JwtService, ManualClock, MemoryRevocationStore, SessionManager};
use blog_server::error::{Result, ServerError};
use blog_server::infra::{CounterCache, MemoryCounterCache, ReadCounter};
use blog_server::model::AuthenticatedUser;
use blog_server::model::UserId;
use blog_server::repository::{
    MemoryIdentityDirectory, MemoryPostStore, MemoryProfileStore, PgProfileStore, PostStore, ProfileStore,
};
use blog_server::service::{AuthService, CreatePostRequest, PostService, RegisterRequest, SocialService};

struct World {
    auth: Arc<AuthService>,
    posts: Arc<PostService>,
    social: Arc<SocialService>,
    profiles: Arc<MemoryProfileStore>,
    post_store: Arc<MemoryPostStore>,
    directory: Arc<MemoryIdentityDirectory>,
}

fn world_with_counter(counters: Arc<dyn CounterCache>) -> World {
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = Arc::new(SessionManager::new(
        Arc::new(JwtService::with_clock("consistency-secret-0123456789", clock)),
        Arc::new(MemoryRevocationStore::new()),
        3600,
    ));
    let directory = Arc::new(MemoryIdentityDirectory::new());
    let profiles = Arc::new(MemoryProfileStore::new());
    let post_store = Arc::new(MemoryPostStore::new());
    let read_counter = Arc::new(ReadCounter::new(counters, 86_400));

    World {
        auth: Arc::new(
            AuthService::new(sessions, directory.clone(), profiles.clone(), 3600).with_password_cost(4),
        ),
        posts: Arc::new(PostService::new(post_store.clone(), directory.clone(), read_counter)),
        social: Arc::new(SocialService::new(profiles.clone(), post_store.clone(), directory.clone())),
        profiles,
        post_store,
        directory,
    }
}

fn world() -> World {
    world_with_counter(Arc::new(MemoryCounterCache::new()))
}

fn register_request(username: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        password: "pw-123456".to_string(),
        email: format!("{}@example.com", username),
    }
}

async fn signed_in(world: &World, username: &str) -> AuthenticatedUser {
    world.auth.register(register_request(username), None).await.unwrap();
    let token = world.auth.login(username, "pw-123456", None, None).await.unwrap().token;
    world.auth.authenticate(&token).await.unwrap()
}

#[tokio::test]
async fn profile_is_keyed_by_numeric_identity() {
    let w = world();
    let alice = signed_in(&w, "alice").await;

    let profile = w.profiles.get_profile(alice.user_id).await.unwrap().unwrap();
    assert_eq!(profile.user_id, alice.user_id);
    assert_eq!(profile.username, "alice");
    assert!(profile.account_created.is_some());
}

#[tokio::test]
async fn concurrent_duplicate_registration_has_one_winner() {
    let w = world();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let auth = Arc::clone(&w.auth);
        handles.push(tokio::spawn(async move { auth.register(register_request("alice"), None).await }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(ServerError::Conflict(message)) => assert_eq!(message, "User already exists"),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(w.directory.len(), 1);
}

#[tokio::test]
async fn concurrent_likes_leave_exactly_one_entry() {
    let w = world();
    let alice = signed_in(&w, "alice").await;
    let bob = signed_in(&w, "bob").await;
    let post = w
        .posts
        .create_post(
            &bob,
            CreatePostRequest {
                title: "hello".into(),
                content: "world".into(),
                media_url: String::new(),
            },
        )
        .await
        .unwrap();
    let post_id = post.post_id.to_string();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let social = Arc::clone(&w.social);
        let user = alice.clone();
        let post_id = post_id.clone();
        handles.push(tokio::spawn(async move { social.add_like(&user, &post_id).await }));
    }
    let mut conflicts = 0;
    for handle in handles {
        if let Err(e) = handle.await.unwrap() {
            assert!(matches!(e, ServerError::Conflict(_)));
            conflicts += 1;
        }
    }
    assert_eq!(conflicts, 31);

    let likes = w.social.get_history_like("alice").await.unwrap().likes;
    assert_eq!(likes.len(), 1);
    assert_eq!(likes[0].post_id, post_id);

    let stored = w.post_store.get_post(post.post_id).await.unwrap().unwrap();
    assert_eq!(stored.like_count, 1);
}

/// A→B 与 B→A 同时订阅：双方都成功，两条关系的两端都落盘
async fn mutual_subscriptions_converge(store: Arc<dyn ProfileStore>, first_id: UserId, rounds: i64) {
    for round in 0..rounds {
        let a = first_id + round * 2;
        let b = a + 1;

        let (ab, ba) = tokio::join!(
            tokio::spawn({
                let store = Arc::clone(&store);
                async move { store.push_subscription(a, b).await }
            }),
            tokio::spawn({
                let store = Arc::clone(&store);
                async move { store.push_subscription(b, a).await }
            }),
        );
        assert!(ab.unwrap().unwrap(), "round {}: {} -> {} not added", round, a, b);
        assert!(ba.unwrap().unwrap(), "round {}: {} -> {} not added", round, b, a);

        let pa = store.get_profile(a).await.unwrap().unwrap();
        let pb = store.get_profile(b).await.unwrap().unwrap();
        assert_eq!(pa.subscribed_to, vec![b]);
        assert_eq!(pa.subscribers, vec![b]);
        assert_eq!(pb.subscribed_to, vec![a]);
        assert_eq!(pb.subscribers, vec![a]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutual_subscriptions_keep_both_edges() {
    mutual_subscriptions_converge(Arc::new(MemoryProfileStore::new()), 1, 200).await;
}

/// 需要真实 PostgreSQL：DATABASE_URL=postgres://... cargo test -- --ignored
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_mutual_subscriptions_on_postgres() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL 未设置，跳过");
        return;
    };
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .unwrap();
    sqlx::raw_sql(include_str!("../migrations/002_documents.sql"))
        .execute(&pool)
        .await
        .unwrap();

    let rounds = 200;
    let first_id = 9_000_000_000 + (uuid::Uuid::new_v4().as_u128() % 1_000_000) as i64 * 1_000;
    let store = Arc::new(PgProfileStore::new(pool.clone(), std::time::Duration::from_secs(10)));
    mutual_subscriptions_converge(store, first_id, rounds).await;

    sqlx::query("DELETE FROM social_profiles WHERE user_id >= $1 AND user_id < $2")
        .bind(first_id)
        .bind(first_id + rounds * 2)
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_user_never_writes_documents() {
    let w = world();
    let alice = signed_in(&w, "alice").await;

    assert!(matches!(
        w.social.get_history_like("ghost").await.unwrap_err(),
        ServerError::NotFound(_)
    ));
    assert!(matches!(
        w.social.subscribe(&alice, "ghost").await.unwrap_err(),
        ServerError::NotFound(_)
    ));
    assert!(w.profiles.get_profile(alice.user_id + 1).await.unwrap().is_none());
}

/// 永远失败的计数缓存
struct DownCounters;

#[async_trait]
impl CounterCache for DownCounters {
    async fn increment(&self, _key: &str) -> Result<i64> {
        Err(ServerError::StoreUnavailable("counter cache down".into()))
    }

    async fn get_ttl(&self, _key: &str) -> Result<i64> {
        Err(ServerError::StoreUnavailable("counter cache down".into()))
    }

    async fn set_expiry(&self, _key: &str, _seconds: i64) -> Result<()> {
        Err(ServerError::StoreUnavailable("counter cache down".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<i64>> {
        Err(ServerError::StoreUnavailable("counter cache down".into()))
    }
}

#[tokio::test]
async fn counter_cache_failure_does_not_fail_reads() {
    let w = world_with_counter(Arc::new(DownCounters));
    let alice = signed_in(&w, "alice").await;
    let post = w
        .posts
        .create_post(
            &alice,
            CreatePostRequest {
                title: "t".into(),
                content: "c".into(),
                media_url: String::new(),
            },
        )
        .await
        .unwrap();

    let fetched = w.posts.get_post(&post.post_id.to_string()).await.unwrap();
    assert_eq!(fetched.post_id, post.post_id);
}

#[tokio::test]
async fn read_counter_window_resets() {
    let clock = Arc::new(ManualClock::new(1_000));
    let counter = ReadCounter::new(Arc::new(MemoryCounterCache::with_clock(clock.clone())), 60);

    assert_eq!(counter.record("p1").await.unwrap(), 1);
    assert_eq!(counter.record("p1").await.unwrap(), 2);
    clock.advance(59);
    assert_eq!(counter.count("p1").await.unwrap(), 2);

    clock.advance(1);
    assert_eq!(counter.count("p1").await.unwrap(), 0);
    assert_eq!(counter.record("p1").await.unwrap(), 1);
}
