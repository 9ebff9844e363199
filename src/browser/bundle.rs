//! 渲染 bundle 实现
//!
//! 一个 bundle 是渲染后端的一种具体获取方式。当前支持两种：
//! 启动无头浏览器，或连接到已在调试端口上运行的浏览器。
//! 进程内只会选定一个 bundle，选定后在 `RenderBackend` 的生命周期内不变。

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Handler;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::Config;

/// 渲染 bundle 种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleKind {
    /// 启动一个新的无头浏览器实例
    LaunchHeadless,
    /// 通过 CDP 连接到已运行的浏览器（调试端口由配置指定）
    ConnectCdp,
}

impl FromStr for BundleKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headless" | "launch" | "launch_headless" => Ok(BundleKind::LaunchHeadless),
            "cdp" | "connect" | "connect_cdp" => Ok(BundleKind::ConnectCdp),
            _ => Err(()),
        }
    }
}

/// 按配置的优先级顺序探测可用的渲染 bundle
///
/// 每个 bundle 会做一次试启动，成功后立即拆除。所有 bundle 都失败时
/// 返回 None。这是正常结果（比如机器上没有安装浏览器），不是故障。
pub fn probe_availability(config: &Config) -> Option<BundleKind> {
    for &kind in &config.bundle_priority {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!("构建探测运行时失败: {}", e);
                return None;
            }
        };

        let available = rt.block_on(async {
            match launch_bundle(kind, config).await {
                Ok((mut browser, handler)) => {
                    spawn_event_handler(handler);
                    // 启动型 bundle 需要关掉试启动的浏览器；
                    // 连接型 bundle 不能关（那是调用方自己的浏览器），直接断开即可
                    if kind == BundleKind::LaunchHeadless {
                        let _ = browser.close().await;
                    }
                    true
                }
                Err(e) => {
                    debug!("bundle {:?} 探测失败: {}", kind, e);
                    false
                }
            }
        });

        if available {
            info!("✓ 渲染 bundle 探测成功: {:?}", kind);
            return Some(kind);
        }
    }

    warn!("⚠️ 所有渲染 bundle 探测失败，动态渲染不可用");
    None
}

/// 按 bundle 种类启动/连接浏览器
pub(crate) async fn launch_bundle(
    kind: BundleKind,
    config: &Config,
) -> Result<(Browser, Handler)> {
    match kind {
        BundleKind::LaunchHeadless => launch_headless(config).await,
        BundleKind::ConnectCdp => connect_cdp(config.browser_debug_port).await,
    }
}

/// 启动无头浏览器
async fn launch_headless(config: &Config) -> Result<(Browser, Handler)> {
    debug!("正在启动无头浏览器...");

    let mut args = vec![
        "--disable-gpu",             // 无头模式下禁用 GPU
        "--no-sandbox",              // 禁用沙盒，防止权限问题导致的崩溃
        "--disable-dev-shm-usage",   // 防止共享内存不足
        "--remote-debugging-port=0", // 让浏览器自动选择端口
    ];
    if !config.verify_certificates {
        args.push("--ignore-certificate-errors");
    }

    let browser_config = BrowserConfig::builder()
        .new_headless_mode()
        .args(args)
        .build()
        .map_err(|e| anyhow!("配置无头浏览器失败: {}", e))?;

    let (browser, handler) = Browser::launch(browser_config)
        .await
        .context("启动无头浏览器失败")?;
    debug!("无头浏览器启动成功");

    Ok((browser, handler))
}

/// 连接到已运行的浏览器
async fn connect_cdp(port: u16) -> Result<(Browser, Handler)> {
    let browser_url = format!("http://localhost:{}", port);
    debug!("正在连接到浏览器: {}", browser_url);

    let (browser, handler) = Browser::connect(&browser_url)
        .await
        .with_context(|| format!("连接浏览器失败 (端口: {})", port))?;
    debug!("浏览器连接成功");

    Ok((browser, handler))
}

/// 在后台处理浏览器事件
pub(crate) fn spawn_event_handler(mut handler: Handler) {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bundle_kind() {
        assert_eq!("headless".parse(), Ok(BundleKind::LaunchHeadless));
        assert_eq!("cdp".parse(), Ok(BundleKind::ConnectCdp));
        assert_eq!("connect".parse(), Ok(BundleKind::ConnectCdp));
        assert!("firefox".parse::<BundleKind>().is_err());
    }

    #[test]
    fn test_probe_with_empty_priority() {
        // 优先级列表为空时不做任何探测，直接返回 None
        let config = Config {
            bundle_priority: vec![],
            ..Config::default()
        };
        assert_eq!(probe_availability(&config), None);
    }
}
