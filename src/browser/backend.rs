//! 同步渲染入口 - 跨调度模型的桥
//!
//! ## 职责
//!
//! - 持有唯一的驱动线程（单线程 tokio 运行时 + chromiumoxide Browser）
//! - 暴露同步的 `render()` 能力，供工作线程直接调用
//! - 不认识 URL 列表 / 调度器 / 回调
//!
//! ## 桥接方式
//!
//! 每次 `render` 调用把请求塞进 mpsc 通道并在自己的 oneshot 应答上阻塞等待；
//! 驱动线程为每个请求单独 spawn 一个任务，所以一个慢渲染不会把别的调用
//! 串行在它后面。渲染失败一律映射为 None，调用方把 None 当"无数据"处理。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::{Browser, Page};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::browser::bundle::{launch_bundle, spawn_event_handler, BundleKind};
use crate::config::Config;
use crate::error::{BackendError, PreParseError, PreParseResult};

/// 选择器的就绪状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    /// 元素出现在文档结构中
    Attached,
    /// 元素不在文档结构中
    Detached,
    /// 元素有非空布局且未被隐藏
    Visible,
    /// 元素不可见（不存在也算不可见）
    Hidden,
}

impl FromStr for WaitState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attached" => Ok(WaitState::Attached),
            "detached" => Ok(WaitState::Detached),
            "visible" => Ok(WaitState::Visible),
            "hidden" => Ok(WaitState::Hidden),
            _ => Err(()),
        }
    }
}

fn default_wait_state() -> WaitState {
    WaitState::Attached
}

/// 渲染范围选择器
///
/// 把一次渲染的结果限制在一个子树内，并定义该子树的就绪条件。
/// 不设置选择器时提取整个文档，也不做基础加载之外的等待。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScopeSelector {
    /// CSS 选择器
    pub selector: String,
    /// 就绪状态，默认为 attached
    #[serde(default = "default_wait_state")]
    pub wait_state: WaitState,
}

impl ScopeSelector {
    pub fn new(selector: impl Into<String>, wait_state: WaitState) -> Self {
        Self {
            selector: selector.into(),
            wait_state,
        }
    }
}

/// 一次渲染请求（通道消息）
struct RenderRequest {
    url: String,
    scope: Option<ScopeSelector>,
    reply: oneshot::Sender<Option<String>>,
}

/// 渲染后端
///
/// 启动时选定一个 bundle，之后在整个生命周期内不再重新探测。
/// `render` 可以被多个工作线程并发调用。
pub struct RenderBackend {
    bundle: BundleKind,
    tx: Option<mpsc::Sender<RenderRequest>>,
    driver: Option<std::thread::JoinHandle<()>>,
}

impl RenderBackend {
    /// 使用选定的 bundle 启动渲染后端
    ///
    /// 驱动线程就绪（浏览器启动/连接成功）后才返回；启动失败返回错误。
    pub fn start(bundle: BundleKind, config: &Config) -> PreParseResult<Self> {
        let (tx, rx) = mpsc::channel::<RenderRequest>(32);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        let driver_config = config.clone();
        let driver = std::thread::Builder::new()
            .name("render-driver".to_string())
            .spawn(move || drive(bundle, driver_config, rx, ready_tx))
            .map_err(|e| PreParseError::launch_failed(e))?;

        match ready_rx.recv_timeout(Duration::from_secs(60)) {
            Ok(Ok(())) => {
                info!("✓ 渲染后端已就绪 (bundle: {:?})", bundle);
                Ok(Self {
                    bundle,
                    tx: Some(tx),
                    driver: Some(driver),
                })
            }
            Ok(Err(msg)) => {
                error!("渲染后端启动失败: {}", msg);
                Err(PreParseError::Backend(BackendError::LaunchFailed {
                    source: anyhow!(msg).into(),
                }))
            }
            Err(_) => {
                error!("渲染后端启动超时");
                Err(PreParseError::Backend(BackendError::BridgeClosed))
            }
        }
    }

    /// 当前选定的 bundle
    pub fn bundle(&self) -> BundleKind {
        self.bundle
    }

    /// 同步驱动一次导航并提取页面内容
    ///
    /// 调用线程会阻塞到本次渲染完成为止，但不会阻塞其他调用者的渲染。
    /// 导航失败、选择器等待超时、后端故障一律返回 None。
    pub fn render(&self, url: &str, scope: Option<&ScopeSelector>) -> Option<String> {
        let tx = self.tx.as_ref()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = RenderRequest {
            url: url.to_string(),
            scope: scope.cloned(),
            reply: reply_tx,
        };

        if tx.blocking_send(request).is_err() {
            error!("渲染驱动通道已关闭，无法渲染: {}", url);
            return None;
        }
        match reply_rx.blocking_recv() {
            Ok(html) => html,
            Err(_) => {
                warn!("渲染应答通道被丢弃: {}", url);
                None
            }
        }
    }
}

impl Drop for RenderBackend {
    fn drop(&mut self) {
        // 关闭请求通道让驱动线程退出，然后等它收尾
        self.tx.take();
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }
    }
}

/// 驱动线程主体：启动浏览器，然后循环消费渲染请求
fn drive(
    bundle: BundleKind,
    config: Config,
    mut rx: mpsc::Receiver<RenderRequest>,
    ready_tx: std::sync::mpsc::Sender<Result<(), String>>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("构建驱动运行时失败: {}", e)));
            return;
        }
    };

    rt.block_on(async move {
        let (browser, handler) = match launch_bundle(bundle, &config).await {
            Ok(pair) => pair,
            Err(e) => {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
        };
        spawn_event_handler(handler);

        let browser = Arc::new(browser);
        let _ = ready_tx.send(Ok(()));

        // 每个请求独立 spawn：慢渲染不会阻塞后续请求
        while let Some(request) = rx.recv().await {
            let browser = browser.clone();
            let wait_timeout_ms = config.wait_timeout_ms;
            tokio::spawn(async move {
                let html =
                    match render_once(&browser, &request.url, request.scope.as_ref(), wait_timeout_ms)
                        .await
                    {
                        Ok(html) => Some(html),
                        Err(e) => {
                            warn!("渲染 {} 失败: {}", request.url, e);
                            None
                        }
                    };
                // 调用方提前放弃等待时发送会失败，忽略即可
                let _ = request.reply.send(html);
            });
        }

        // 请求通道关闭：启动型 bundle 把浏览器一起关掉
        if bundle == BundleKind::LaunchHeadless {
            if let Ok(mut browser) = Arc::try_unwrap(browser) {
                let _ = browser.close().await;
            }
        }
    });
}

/// 执行一次完整的渲染：租用页面会话 → 导航 → 等待 → 提取 → 释放会话
///
/// 页面会话只属于本次调用，提取完成后立即关闭，不会跨调用共享。
async fn render_once(
    browser: &Browser,
    url: &str,
    scope: Option<&ScopeSelector>,
    wait_timeout_ms: u64,
) -> Result<String> {
    debug!("开始渲染: {}", url);
    let page = browser
        .new_page("about:blank")
        .await
        .context("创建页面失败")?;

    let navigated = navigate(&page, url).await;
    let result = match navigated {
        Ok(()) => extract(&page, url, scope, wait_timeout_ms).await,
        Err(e) => Err(e),
    };

    let _ = page.close().await;
    debug!("结束渲染: {}", url);
    result
}

async fn navigate(page: &Page, url: &str) -> Result<()> {
    page.goto(url)
        .await
        .with_context(|| format!("导航到 {} 失败", url))?;
    page.wait_for_navigation()
        .await
        .with_context(|| format!("等待 {} 加载完成失败", url))?;
    Ok(())
}

/// 等待范围选择器就绪并提取内容
async fn extract(
    page: &Page,
    url: &str,
    scope: Option<&ScopeSelector>,
    wait_timeout_ms: u64,
) -> Result<String> {
    let scope = match scope {
        Some(scope) => scope,
        None => return page.content().await.context("提取页面内容失败"),
    };

    wait_for_state(page, scope, wait_timeout_ms).await?;

    // detached 等待成功后元素已不存在，只能回退为整页内容
    if scope.wait_state == WaitState::Detached {
        return page.content().await.context("提取页面内容失败");
    }

    let selector = js_string(&scope.selector);
    let script = format!(
        "(() => {{ const el = document.querySelector({selector}); return el ? el.innerHTML : null; }})()"
    );
    let inner: Option<String> = page
        .evaluate(script)
        .await
        .context("执行提取脚本失败")?
        .into_value()
        .context("解析提取结果失败")?;

    inner.ok_or_else(|| anyhow!("选择器 '{}' 在 {} 上未匹配到元素", scope.selector, url))
}

/// 轮询等待选择器达到指定的就绪状态，超时返回错误
async fn wait_for_state(page: &Page, scope: &ScopeSelector, timeout_ms: u64) -> Result<()> {
    let predicate = wait_predicate(&scope.selector, scope.wait_state);
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    loop {
        let ready: bool = page
            .evaluate(predicate.as_str())
            .await
            .context("执行等待脚本失败")?
            .into_value()
            .unwrap_or(false);
        if ready {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(PreParseError::Backend(BackendError::WaitTimeout {
                selector: scope.selector.clone(),
                timeout_ms,
            })
            .into());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// 生成就绪状态的 JS 判定表达式
fn wait_predicate(selector: &str, state: WaitState) -> String {
    let sel = js_string(selector);
    match state {
        WaitState::Attached => format!("document.querySelector({sel}) !== null"),
        WaitState::Detached => format!("document.querySelector({sel}) === null"),
        WaitState::Visible => format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el) return false; \
             const style = getComputedStyle(el); \
             if (style.display === 'none' || style.visibility === 'hidden') return false; \
             return el.getClientRects().length > 0; }})()"
        ),
        WaitState::Hidden => format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el) return true; \
             const style = getComputedStyle(el); \
             if (style.display === 'none' || style.visibility === 'hidden') return true; \
             return el.getClientRects().length === 0; }})()"
        ),
    }
}

/// 把选择器安全地转成 JS 字符串字面量
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
