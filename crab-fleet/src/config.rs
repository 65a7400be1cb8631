use std::path::PathBuf;
use std::time::Duration;

/// 打印机队列配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/crab/printing | 工作目录 (redb 数据库) |
/// | PRINTERS_FILE | {WORK_DIR}/printers.json | 打印机配置文件 |
/// | PROBE_INTERVAL_MS | 5000 | 健康检查间隔 |
/// | PROBE_TIMEOUT_MS | 3000 | 单次探测超时 |
/// | PROBE_CONCURRENCY | 8 | 并发探测数 |
/// | SEND_TIMEOUT_MS | 10000 | 单次发送超时 |
/// | SHUTDOWN_GRACE_MS | 10000 | 关闭时等待打印任务的时间 |
/// | REFRESH_INTERVAL_MS | 30000 | 重新读取配置文件间隔 (0 = 关闭) |
/// | JOB_RETENTION_SECS | 604800 | 打印记录保留时间 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | - | 日志目录 |
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// 工作目录
    pub work_dir: String,
    /// 打印机配置文件路径
    pub printers_file: String,
    /// 健康检查间隔 (毫秒)
    pub probe_interval_ms: u64,
    /// 单次探测超时 (毫秒)
    pub probe_timeout_ms: u64,
    /// 每轮并发探测数
    pub probe_concurrency: usize,
    /// 单次发送超时 (毫秒)
    pub send_timeout_ms: u64,
    /// 关闭宽限期 (毫秒)
    pub shutdown_grace_ms: u64,
    /// 配置刷新间隔 (毫秒), 0 表示不刷新
    pub refresh_interval_ms: u64,
    /// 打印记录保留时间 (秒)
    pub job_retention_secs: i64,
    /// 日志级别
    pub log_level: String,
    /// 日志目录
    pub log_dir: Option<String>,
}

const DEFAULT_WORK_DIR: &str = "/var/lib/crab/printing";

impl FleetConfig {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let work_dir = std::env::var("WORK_DIR").unwrap_or(defaults.work_dir);
        let printers_file = std::env::var("PRINTERS_FILE").unwrap_or_else(|_| {
            PathBuf::from(&work_dir)
                .join("printers.json")
                .to_string_lossy()
                .into_owned()
        });

        Self {
            work_dir,
            printers_file,
            probe_interval_ms: env_parse("PROBE_INTERVAL_MS", defaults.probe_interval_ms),
            probe_timeout_ms: env_parse("PROBE_TIMEOUT_MS", defaults.probe_timeout_ms),
            probe_concurrency: env_parse("PROBE_CONCURRENCY", defaults.probe_concurrency),
            send_timeout_ms: env_parse("SEND_TIMEOUT_MS", defaults.send_timeout_ms),
            shutdown_grace_ms: env_parse("SHUTDOWN_GRACE_MS", defaults.shutdown_grace_ms),
            refresh_interval_ms: env_parse("REFRESH_INTERVAL_MS", defaults.refresh_interval_ms),
            job_retention_secs: env_parse("JOB_RETENTION_SECS", defaults.job_retention_secs),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_dir: std::env::var("LOG_DIR").ok(),
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// 配置刷新间隔, `None` 表示不刷新
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_ms > 0).then(|| Duration::from_millis(self.refresh_interval_ms))
    }

    /// redb 数据库路径
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("print_fleet.redb")
    }
}

/// 内置默认值 (不读取环境变量，用于测试和嵌入)
impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            work_dir: DEFAULT_WORK_DIR.into(),
            printers_file: format!("{}/printers.json", DEFAULT_WORK_DIR),
            probe_interval_ms: 5000,
            probe_timeout_ms: 3000,
            probe_concurrency: 8,
            send_timeout_ms: 10000,
            shutdown_grace_ms: 10000,
            refresh_interval_ms: 30000,
            job_retention_secs: 7 * 24 * 3600,
            log_level: "info".into(),
            log_dir: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FleetConfig::default();
        assert_eq!(config.probe_interval(), Duration::from_secs(5));
        assert_eq!(config.probe_timeout(), Duration::from_secs(3));
        assert!(config.database_path().ends_with("print_fleet.redb"));
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(30)));

        let config = FleetConfig {
            refresh_interval_ms: 0,
            ..FleetConfig::default()
        };
        assert!(config.refresh_interval().is_none());
    }
}
