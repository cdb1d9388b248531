use anyhow::{Context, Result};
use blog_server::{
    cli::{Cli, Commands},
    config::{self, ServerConfig},
    infra::metrics,
    logging, BlogServer,
};
use std::fs;
use std::process;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Some(command) = &cli.command {
        return match command {
            Commands::Migrate => run_migrate(&cli).await,
            Commands::GenerateConfig { path } => generate_config(path),
            Commands::ValidateConfig { path } => validate_config(path),
            Commands::ShowConfig => show_config(&cli),
        };
    }

    // 日志级别：命令行 > 配置文件 > RUST_LOG > info
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());
    let log_level = cli.get_log_level().or(early_log.level);
    let log_format = cli.get_log_format().or(early_log.format);
    let log_file = cli.log_file.clone().or(early_log.file);
    let _log_guard = logging::init_logging(
        log_level.as_deref(),
        log_format.as_deref(),
        log_file.as_deref(),
        cli.quiet,
    )?;

    tracing::info!("🚀 Blog Server starting...");

    let config = ServerConfig::load(&cli).context("加载配置失败")?;
    config.validate().context("配置校验失败")?;

    if config.dev_mode {
        tracing::info!("🔧 开发模式已启用");
    }

    if let Err(e) = metrics::init() {
        tracing::warn!("⚠️ Prometheus 指标初始化失败: {}", e);
    }

    tracing::info!("📊 Server Configuration:");
    tracing::info!("  - HTTP: {}", config.server.bind_address());
    tracing::info!("  - Token TTL: {}s", config.auth.token_ttl_secs);
    tracing::info!("  - Revocation Backend: {:?}", config.revocation.backend);
    tracing::info!("  - Redis: {}", config.redis.is_some());
    tracing::info!("  - Read Window: {}s", config.read_counter.window_secs);
    tracing::info!("  - Store Call Timeout: {}ms", config.store.call_timeout_ms);
    tracing::info!("  - Media Storage: {}", config.media.storage_type);
    if let Some(f) = &log_file {
        tracing::info!("  - Log File: {}", f);
    }

    let server = match BlogServer::new(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("❌ 服务器初始化失败: {}", e);
            tracing::error!("💡 请检查数据库 / Redis 连接与媒体存储配置后重试，或使用 --dev 以内存模式启动");
            process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!("❌ 服务器运行失败: {}", e);
        process::exit(1);
    }

    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    fs::write(path, config::DEFAULT_CONFIG_TOML).with_context(|| format!("无法写入配置文件: {}", path))?;
    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = ServerConfig::from_toml_file(path).with_context(|| format!("配置文件验证失败: {}", path))?;
    config.validate().with_context(|| format!("配置文件验证失败: {}", path))?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - HTTP: {}", config.server.bind_address());
    println!("  - Token TTL: {}s", config.auth.token_ttl_secs);
    println!("  - Redis: {}", config.redis.is_some());
    println!("  - Media Storage: {}", config.media.storage_type);
    Ok(())
}

// 编译时扫描 migrations/ 目录，按文件名排序嵌入
include!(concat!(env!("OUT_DIR"), "/migrations.rs"));

/// 执行数据库迁移
async fn run_migrate(cli: &Cli) -> Result<()> {
    let config = ServerConfig::load(cli).context("加载配置失败")?;
    if config.database.url.trim().is_empty() {
        anyhow::bail!("需要 DATABASE_URL，请在 .env、环境变量或配置文件中配置");
    }

    println!("🔌 连接数据库...");
    let pool = sqlx::PgPool::connect(&config.database.url)
        .await
        .context("数据库连接失败，请检查 DATABASE_URL")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS blog_migrations (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(&pool)
    .await
    .context("创建迁移记录表失败")?;

    let applied: Vec<String> = sqlx::query_scalar("SELECT name FROM blog_migrations ORDER BY id")
        .fetch_all(&pool)
        .await
        .context("查询迁移记录失败")?;

    let mut count = 0;
    for (name, sql) in MIGRATIONS {
        if applied.iter().any(|a| a.as_str() == *name) {
            println!("  ⏭ {} (已执行，跳过)", name);
            continue;
        }

        println!("  ▶ 执行 {}...", name);
        let mut tx = pool.begin().await.context("开启迁移事务失败")?;
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("执行迁移失败: {}", name))?;
        sqlx::query("INSERT INTO blog_migrations (name) VALUES ($1)")
            .bind(*name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("记录迁移状态失败: {}", name))?;
        tx.commit().await.with_context(|| format!("提交迁移失败: {}", name))?;

        println!("  ✅ {} 完成", name);
        count += 1;
    }

    if count == 0 {
        println!("✅ 数据库已是最新，无需迁移");
    } else {
        println!("✅ 成功执行 {} 个迁移", count);
    }

    pool.close().await;
    Ok(())
}

/// 显示最终配置（合并后，密钥打码）
fn show_config(cli: &Cli) -> Result<()> {
    let config = ServerConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", serde_json::to_string_pretty(&config.masked())?);
    Ok(())
}
