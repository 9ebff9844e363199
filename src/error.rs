use std::fmt;

/// 预解析库错误类型
#[derive(Debug)]
pub enum PreParseError {
    /// 渲染后端相关错误
    Backend(BackendError),
    /// 任务调度器错误
    Scheduler(SchedulerError),
    /// 网络请求错误
    Fetch(FetchError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for PreParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreParseError::Backend(e) => write!(f, "渲染后端错误: {}", e),
            PreParseError::Scheduler(e) => write!(f, "调度器错误: {}", e),
            PreParseError::Fetch(e) => write!(f, "请求错误: {}", e),
            PreParseError::Config(e) => write!(f, "配置错误: {}", e),
            PreParseError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for PreParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PreParseError::Backend(e) => Some(e),
            PreParseError::Scheduler(e) => Some(e),
            PreParseError::Fetch(e) => Some(e),
            PreParseError::Config(e) => Some(e),
            PreParseError::Other(_) => None,
        }
    }
}

/// 渲染后端相关错误
#[derive(Debug)]
pub enum BackendError {
    /// 所有渲染 bundle 都不可用
    Unavailable,
    /// 启动浏览器失败
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 连接浏览器失败
    ConnectFailed {
        port: u16,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 等待选择器超时
    WaitTimeout { selector: String, timeout_ms: u64 },
    /// 驱动线程的请求通道已关闭
    BridgeClosed,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Unavailable => write!(f, "没有可用的渲染 bundle"),
            BackendError::LaunchFailed { source } => {
                write!(f, "启动浏览器失败: {}", source)
            }
            BackendError::ConnectFailed { port, source } => {
                write!(f, "无法连接到浏览器 (端口: {}): {}", port, source)
            }
            BackendError::NavigationFailed { url, source } => {
                write!(f, "导航到 {} 失败: {}", url, source)
            }
            BackendError::WaitTimeout {
                selector,
                timeout_ms,
            } => {
                write!(f, "等待选择器 '{}' 超时 ({}ms)", selector, timeout_ms)
            }
            BackendError::BridgeClosed => write!(f, "渲染驱动通道已关闭"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::LaunchFailed { source }
            | BackendError::ConnectFailed { source, .. }
            | BackendError::NavigationFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 任务调度器错误
#[derive(Debug)]
pub enum SchedulerError {
    /// 调度器已在运行中，不允许重复启动
    AlreadyRunning,
    /// 构建工作线程运行时失败
    RuntimeBuildFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::AlreadyRunning => {
                write!(f, "调度器正在运行中，不能重复启动")
            }
            SchedulerError::RuntimeBuildFailed { source } => {
                write!(f, "构建工作线程运行时失败: {}", source)
            }
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::RuntimeBuildFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 网络请求错误
#[derive(Debug)]
pub enum FetchError {
    /// 构建 HTTP 客户端失败
    ClientBuildFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求发送失败
    RequestFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 非 200 状态码
    BadStatus { url: String, status: u16 },
    /// JSON 解析失败
    JsonParseFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::ClientBuildFailed { source } => {
                write!(f, "构建 HTTP 客户端失败: {}", source)
            }
            FetchError::RequestFailed { url, source } => {
                write!(f, "请求失败 ({}): {}", url, source)
            }
            FetchError::BadStatus { url, status } => {
                write!(f, "非成功状态码 ({}): {}", url, status)
            }
            FetchError::JsonParseFailed { source } => {
                write!(f, "JSON解析失败: {}", source)
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::ClientBuildFailed { source }
            | FetchError::RequestFailed { source, .. }
            | FetchError::JsonParseFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 读取配置文件失败
    FileReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileReadFailed { path, source } => {
                write!(f, "读取配置文件失败 ({}): {}", path, source)
            }
            ConfigError::TomlParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileReadFailed { source, .. }
            | ConfigError::TomlParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<PreParseError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<chromiumoxide::error::CdpError> for PreParseError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        PreParseError::Backend(BackendError::LaunchFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for PreParseError {
    fn from(err: serde_json::Error) -> Self {
        PreParseError::Fetch(FetchError::JsonParseFailed {
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for PreParseError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        PreParseError::Fetch(FetchError::RequestFailed {
            url,
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for PreParseError {
    fn from(err: toml::de::Error) -> Self {
        PreParseError::Config(ConfigError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl PreParseError {
    /// 创建浏览器启动失败错误
    pub fn launch_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        PreParseError::Backend(BackendError::LaunchFailed {
            source: Box::new(source),
        })
    }

    /// 创建浏览器连接失败错误
    pub fn connect_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PreParseError::Backend(BackendError::ConnectFailed {
            port,
            source: Box::new(source),
        })
    }

    /// 创建导航失败错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PreParseError::Backend(BackendError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建非成功状态码错误
    pub fn bad_status(url: impl Into<String>, status: u16) -> Self {
        PreParseError::Fetch(FetchError::BadStatus {
            url: url.into(),
            status,
        })
    }
}

// ========== Result 类型别名 ==========

/// 库统一结果类型
pub type PreParseResult<T> = Result<T, PreParseError>;
