use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::browser::{BundleKind, ScopeSelector, WaitState};
use crate::error::{ConfigError, PreParseError, PreParseResult};

/// 页面数据的预解析模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserMode {
    /// 静态页面：请求后把响应体作为 HTML 文本处理
    StaticHtml,
    /// API 接口：请求后把响应体解析为 JSON
    Api,
    /// JS 渲染页面：交给渲染后端执行导航并提取渲染后的 HTML
    DynamicHtml,
}

impl FromStr for ParserMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" | "static" | "static_html" => Ok(ParserMode::StaticHtml),
            "api" | "json" => Ok(ParserMode::Api),
            "dynamic" | "dynamic_html" => Ok(ParserMode::DynamicHtml),
            _ => Err(()),
        }
    }
}

/// 任务分发模式
///
/// 两种模式只影响任务提交的节奏，不影响结果语义：
/// 并发上限、缓存写入在两种模式下共用同一套逻辑。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// 一次性把所有 URL 交给线程池，按提交顺序收集结果
    BulkDistribute,
    /// 逐个提交任务（仍然并发执行，受工作线程数上限约束）
    SequentialSubmit,
}

impl FromStr for DispatchMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "map" | "bulk" | "bulk_distribute" => Ok(DispatchMode::BulkDistribute),
            "single" | "sequential" | "sequential_submit" => Ok(DispatchMode::SequentialSubmit),
            _ => Err(()),
        }
    }
}

/// 预解析器配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 预解析模式
    pub parser_mode: ParserMode,
    /// 任务分发模式
    pub dispatch_mode: DispatchMode,
    /// 是否使用工作线程池并发执行
    pub use_worker_pool: bool,
    /// 最大工作线程数
    pub max_workers: usize,
    /// 是否缓存解析结果
    pub cache_enabled: bool,
    /// 任一任务失败（返回 None）后是否停止提交后续任务
    pub fail_fast: bool,
    /// 是否添加同站请求头（Origin / Referer / Sec-Fetch-*），用于绕过 CORS 拦截
    pub same_site_headers: bool,
    /// 是否校验 TLS 证书
    pub verify_certificates: bool,
    /// 动态渲染的范围选择器，None 表示提取整个文档
    pub scope: Option<ScopeSelector>,
    /// 等待选择器就绪的超时时间（毫秒）
    pub wait_timeout_ms: u64,
    /// HTTP 请求超时时间（秒）
    pub request_timeout_secs: u64,
    /// 浏览器调试端口（ConnectCdp bundle 使用）
    pub browser_debug_port: u16,
    /// 渲染 bundle 的探测优先级顺序
    pub bundle_priority: Vec<BundleKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parser_mode: ParserMode::StaticHtml,
            dispatch_mode: DispatchMode::SequentialSubmit,
            use_worker_pool: false,
            max_workers: 3,
            cache_enabled: false,
            fail_fast: true,
            same_site_headers: true,
            verify_certificates: true,
            scope: None,
            wait_timeout_ms: 10_000,
            request_timeout_secs: 30,
            browser_debug_port: 9222,
            bundle_priority: vec![BundleKind::LaunchHeadless, BundleKind::ConnectCdp],
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            parser_mode: env_parsed("PARSER_MODE").unwrap_or(default.parser_mode),
            dispatch_mode: env_parsed("DISPATCH_MODE").unwrap_or(default.dispatch_mode),
            use_worker_pool: env_parsed("USE_WORKER_POOL").unwrap_or(default.use_worker_pool),
            max_workers: env_parsed("MAX_WORKERS").unwrap_or(default.max_workers),
            cache_enabled: env_parsed("CACHE_ENABLED").unwrap_or(default.cache_enabled),
            fail_fast: env_parsed("FAIL_FAST").unwrap_or(default.fail_fast),
            same_site_headers: env_parsed("SAME_SITE_HEADERS").unwrap_or(default.same_site_headers),
            verify_certificates: env_parsed("VERIFY_CERTIFICATES")
                .unwrap_or(default.verify_certificates),
            scope: std::env::var("SCOPE_SELECTOR").ok().map(|selector| {
                ScopeSelector::new(
                    selector,
                    env_parsed("SCOPE_WAIT_STATE").unwrap_or(WaitState::Attached),
                )
            }),
            wait_timeout_ms: env_parsed("WAIT_TIMEOUT_MS").unwrap_or(default.wait_timeout_ms),
            request_timeout_secs: env_parsed("REQUEST_TIMEOUT_SECS")
                .unwrap_or(default.request_timeout_secs),
            browser_debug_port: env_parsed("BROWSER_DEBUG_PORT")
                .unwrap_or(default.browser_debug_port),
            bundle_priority: std::env::var("BUNDLE_PRIORITY")
                .ok()
                .map(parse_bundle_priority)
                .filter(|v| !v.is_empty())
                .unwrap_or(default.bundle_priority),
        }
    }

    /// 从 TOML 配置文件加载，缺省字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> PreParseResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PreParseError::Config(ConfigError::FileReadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            PreParseError::Config(ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;
        Ok(config)
    }
}

/// 读取并解析单个环境变量，未设置或解析失败都返回 None
fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// 解析逗号分隔的 bundle 优先级列表，无法识别的项跳过
fn parse_bundle_priority(value: String) -> Vec<BundleKind> {
    value.split(',').filter_map(|item| item.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.parser_mode, ParserMode::StaticHtml);
        assert_eq!(config.dispatch_mode, DispatchMode::SequentialSubmit);
        assert!(!config.use_worker_pool);
        assert_eq!(config.max_workers, 3);
        assert!(!config.cache_enabled);
        assert!(config.fail_fast);
        assert!(config.same_site_headers);
        assert!(config.verify_certificates);
        assert!(config.scope.is_none());
    }

    #[test]
    fn test_parse_parser_mode() {
        assert_eq!("html".parse(), Ok(ParserMode::StaticHtml));
        assert_eq!("api".parse(), Ok(ParserMode::Api));
        assert_eq!("dynamic".parse(), Ok(ParserMode::DynamicHtml));
        assert_eq!("DYNAMIC_HTML".parse(), Ok(ParserMode::DynamicHtml));
        assert!("xml".parse::<ParserMode>().is_err());
    }

    #[test]
    fn test_parse_dispatch_mode() {
        // 兼容原始的 map / single 叫法
        assert_eq!("map".parse(), Ok(DispatchMode::BulkDistribute));
        assert_eq!("single".parse(), Ok(DispatchMode::SequentialSubmit));
        assert_eq!("bulk_distribute".parse(), Ok(DispatchMode::BulkDistribute));
        assert!("random".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn test_config_from_env_scope_and_bundles() {
        // 没有其他测试读这几个环境变量，不会互相干扰
        std::env::set_var("SCOPE_SELECTOR", "#content");
        std::env::set_var("SCOPE_WAIT_STATE", "visible");
        std::env::set_var("BUNDLE_PRIORITY", "cdp,headless");

        let config = Config::from_env();

        std::env::remove_var("SCOPE_SELECTOR");
        std::env::remove_var("SCOPE_WAIT_STATE");
        std::env::remove_var("BUNDLE_PRIORITY");

        let scope = config.scope.expect("scope 应该从环境变量解析出来");
        assert_eq!(scope.selector, "#content");
        assert_eq!(scope.wait_state, WaitState::Visible);
        assert_eq!(
            config.bundle_priority,
            vec![BundleKind::ConnectCdp, BundleKind::LaunchHeadless]
        );
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r##"
            parser_mode = "api"
            use_worker_pool = true
            max_workers = 8
            cache_enabled = true

            [scope]
            selector = "#content"
            wait_state = "visible"
        "##;

        let config: Config = toml::from_str(toml_str).expect("TOML 解析失败");
        assert_eq!(config.parser_mode, ParserMode::Api);
        assert!(config.use_worker_pool);
        assert_eq!(config.max_workers, 8);
        assert!(config.cache_enabled);
        // 未指定的字段保持默认值
        assert!(config.fail_fast);

        let scope = config.scope.expect("scope 应该被解析");
        assert_eq!(scope.selector, "#content");
        assert_eq!(scope.wait_state, WaitState::Visible);
    }
}
