//! Prometheus 指标：token 生命周期、撤销集合、阅读计数与连接池状态
//!
//! 通过 `init()` 安装全局 Recorder，通过 HTTP GET `/metrics` 暴露抓取端点。
//! 未初始化时各 record_* 调用是空操作。

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::OnceLock;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标名称
const COUNTER_TOKENS_ISSUED: &str = "blog_tokens_issued_total";
const COUNTER_TOKENS_REVOKED: &str = "blog_tokens_revoked_total";
const COUNTER_TOKENS_RENEWED: &str = "blog_tokens_renewed_total";
const COUNTER_TOKENS_REJECTED: &str = "blog_tokens_rejected_total";
const COUNTER_REVOCATION_STORE_ERRORS: &str = "blog_revocation_store_errors_total";
const COUNTER_TOKENS_SWEPT: &str = "blog_revocation_swept_total";
const GAUGE_REVOCATION_SET_SIZE: &str = "blog_revocation_set_size";
const COUNTER_READ_COUNTER_FAILURES: &str = "blog_read_counter_failures_total";
const GAUGE_REDIS_POOL_ACTIVE: &str = "blog_redis_pool_active";
const GAUGE_REDIS_POOL_IDLE: &str = "blog_redis_pool_idle";
const GAUGE_DB_POOL_SIZE: &str = "blog_db_pool_size";
const GAUGE_DB_POOL_IDLE: &str = "blog_db_pool_idle";

/// 初始化 Prometheus 指标（安装全局 Recorder）。
/// 仅需在进程内调用一次；重复调用会返回 Err。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

/// 渲染当前指标为 Prometheus 文本格式，供 GET /metrics 使用。
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub fn record_token_issued() {
    metrics::counter!(COUNTER_TOKENS_ISSUED).increment(1);
}

pub fn record_token_revoked() {
    metrics::counter!(COUNTER_TOKENS_REVOKED).increment(1);
}

pub fn record_token_renewed() {
    metrics::counter!(COUNTER_TOKENS_RENEWED).increment(1);
}

/// 记录一次 token 拒绝。reason 只进指标，不返回给客户端。
pub fn record_token_rejected(reason: &'static str) {
    metrics::counter!(COUNTER_TOKENS_REJECTED, "reason" => reason).increment(1);
}

/// 撤销存储访问失败（fail-closed 触发）
pub fn record_revocation_store_error(op: &'static str) {
    metrics::counter!(COUNTER_REVOCATION_STORE_ERRORS, "op" => op).increment(1);
}

/// 一轮清理结束后记录清理数量与剩余集合大小
pub fn record_sweep(removed: usize, remaining: usize) {
    metrics::counter!(COUNTER_TOKENS_SWEPT).increment(removed as u64);
    metrics::gauge!(GAUGE_REVOCATION_SET_SIZE).set(remaining as f64);
}

pub fn record_read_counter_failure() {
    metrics::counter!(COUNTER_READ_COUNTER_FAILURES).increment(1);
}

/// 更新 Redis 连接池状态（Gauge）。
pub fn record_redis_pool(active: u32, idle: u32) {
    metrics::gauge!(GAUGE_REDIS_POOL_ACTIVE).set(active as f64);
    metrics::gauge!(GAUGE_REDIS_POOL_IDLE).set(idle as f64);
}

/// 更新数据库连接池状态（Gauge）。
pub fn record_db_pool(size: u32, idle: usize) {
    metrics::gauge!(GAUGE_DB_POOL_SIZE).set(size as f64);
    metrics::gauge!(GAUGE_DB_POOL_IDLE).set(idle as f64);
}
