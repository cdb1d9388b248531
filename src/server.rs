use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::auth::{
    Clock, JwtService, MemoryRevocationStore, RedisRevocationStore, RevocationStore, SessionManager, SystemClock,
};
use crate::config::{RevocationBackend, ServerConfig};
use crate::error::{Result, ServerError};
use crate::http::{build_router, AppState};
use crate::infra::{CounterCache, Database, MemoryCounterCache, ReadCounter, RedisClient, RedisCounterCache};
use crate::repository::{
    IdentityDirectory, MemoryIdentityDirectory, MemoryPostStore, MemoryProfileStore, PgIdentityDirectory,
    PgPostStore, PgProfileStore, PostStore, ProfileStore,
};
use crate::service::{
    AuthService, MediaService, MediaStore, MemoryMediaStore, OpendalMediaStore, PostService, SocialService,
};

/// 三类存储的具体实现
struct Stores {
    directory: Arc<dyn IdentityDirectory>,
    profiles: Arc<dyn ProfileStore>,
    posts: Arc<dyn PostStore>,
    revocations: Arc<dyn RevocationStore>,
    counters: Arc<dyn CounterCache>,
    media: Arc<dyn MediaStore>,
    database: Option<Database>,
    redis: Option<RedisClient>,
}

impl Stores {
    fn in_memory(clock: Arc<dyn Clock>, media: Arc<dyn MediaStore>) -> Self {
        Self {
            directory: Arc::new(MemoryIdentityDirectory::new()),
            profiles: Arc::new(MemoryProfileStore::new()),
            posts: Arc::new(MemoryPostStore::new()),
            revocations: Arc::new(MemoryRevocationStore::new()),
            counters: Arc::new(MemoryCounterCache::with_clock(clock)),
            media,
            database: None,
            redis: None,
        }
    }
}

/// 博客服务器
pub struct BlogServer {
    config: ServerConfig,
    state: AppState,
    sessions: Arc<SessionManager>,
    static_root: Option<PathBuf>,
}

impl BlogServer {
    /// 按配置连接各存储并装配服务
    ///
    /// `--dev` 时全部使用内存存储；否则 PostgreSQL 必需，Redis 可选
    /// （revocation.backend = auto 且 Redis 不可用时降级为进程内撤销集合）。
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let media: Arc<dyn MediaStore> = Arc::new(OpendalMediaStore::from_config(&config.media).await?);
        let static_root = (config.media.storage_type == "local").then(|| PathBuf::from(&config.media.root));

        let stores = if config.dev_mode {
            warn!("⚠️ 开发模式：全部使用内存存储，重启后数据丢失");
            Stores::in_memory(clock.clone(), media)
        } else {
            Self::connect_stores(&config, clock.clone(), media).await?
        };

        Ok(Self::assemble(config, clock, stores, static_root))
    }

    /// 纯内存装配（测试使用），时间由传入的时钟决定
    pub fn in_memory(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        let media: Arc<dyn MediaStore> = Arc::new(MemoryMediaStore::new(config.media.base_url.clone()));
        let stores = Stores::in_memory(clock.clone(), media);
        Self::assemble(config, clock, stores, None)
    }

    async fn connect_stores(config: &ServerConfig, clock: Arc<dyn Clock>, media: Arc<dyn MediaStore>) -> Result<Stores> {
        let timeout = config.store.call_timeout();

        let database = Database::new(&config.database).await?;
        let pool = database.pool().clone();
        info!("✅ 身份目录与文档存储初始化完成");

        let redis = match (&config.redis, config.revocation.backend) {
            (_, RevocationBackend::Memory) | (None, _) => None,
            (Some(redis_config), backend) => match RedisClient::new(redis_config).await {
                Ok(client) => Some(client),
                Err(e) if backend == RevocationBackend::Auto => {
                    warn!("⚠️ Redis 不可用，撤销集合与阅读计数降级为进程内实现: {}", e);
                    None
                }
                Err(e) => return Err(e),
            },
        };

        let revocations: Arc<dyn RevocationStore> = match &redis {
            Some(client) => {
                info!("✅ 撤销集合: Redis (key={})", config.revocation.set_key);
                Arc::new(RedisRevocationStore::new(client.clone(), config.revocation.set_key.clone()))
            }
            None => {
                warn!("⚠️ 撤销集合: 进程内（重启后丢失，多实例不共享）");
                Arc::new(MemoryRevocationStore::new())
            }
        };
        let counters: Arc<dyn CounterCache> = match &redis {
            Some(client) => Arc::new(RedisCounterCache::new(client.clone())),
            None => Arc::new(MemoryCounterCache::with_clock(clock)),
        };

        Ok(Stores {
            directory: Arc::new(PgIdentityDirectory::new(pool.clone(), timeout)),
            profiles: Arc::new(PgProfileStore::new(pool.clone(), timeout)),
            posts: Arc::new(PgPostStore::new(pool, timeout)),
            revocations,
            counters,
            media,
            database: Some(database),
            redis,
        })
    }

    fn assemble(config: ServerConfig, clock: Arc<dyn Clock>, stores: Stores, static_root: Option<PathBuf>) -> Self {
        let codec = Arc::new(JwtService::with_clock(&config.auth.jwt_secret, clock));
        let sessions = Arc::new(SessionManager::new(
            codec,
            stores.revocations,
            config.auth.token_ttl_secs,
        ));
        let read_counter = Arc::new(ReadCounter::new(stores.counters, config.read_counter.window_secs));

        let state = AppState {
            auth: Arc::new(AuthService::new(
                sessions.clone(),
                stores.directory.clone(),
                stores.profiles.clone(),
                config.auth.token_ttl_secs,
            )),
            posts: Arc::new(PostService::new(
                stores.posts.clone(),
                stores.directory.clone(),
                read_counter,
            )),
            social: Arc::new(SocialService::new(stores.profiles, stores.posts, stores.directory)),
            media: Arc::new(MediaService::new(stores.media)),
            database: stores.database,
            redis: stores.redis,
        };
        info!("✅ 服务组件初始化完成");

        Self {
            config,
            state,
            sessions,
            static_root,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.static_root.clone())
    }

    /// 定期清理撤销集合中已过期的 token；间隔为 0 时不启动
    pub fn start_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval_secs = self.config.revocation.sweep_interval_secs;
        if interval_secs == 0 {
            info!("撤销集合清理已关闭 (sweep_interval_secs = 0)");
            return None;
        }

        let sessions = Arc::clone(&self.sessions);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                match sessions.remove_expired_tokens().await {
                    Ok(0) => {}
                    Ok(removed) => info!("🧹 清理了 {} 个过期的已撤销 token", removed),
                    Err(e) => warn!("⚠️ 撤销集合清理失败: {}", e),
                }
            }
        });
        info!("✅ 撤销集合清理任务已启动（间隔 {}s）", interval_secs);
        Some(handle)
    }

    /// 绑定端口并运行，直到收到 Ctrl+C
    pub async fn run(self) -> Result<()> {
        let addr = self.config.server.bind_address();
        let sweeper = self.start_sweeper();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Configuration(format!("无法绑定 {}: {}", addr, e)))?;
        info!("🚀 HTTP 服务启动在 {}", addr);

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(handle) = sweeper {
            handle.abort();
        }
        result.map_err(|e| ServerError::Internal(format!("HTTP 服务异常退出: {}", e)))?;
        info!("👋 服务器已停止");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🔄 收到退出信号，正在关闭..."),
        Err(e) => error!("❌ 无法监听退出信号: {}", e),
    }
}
