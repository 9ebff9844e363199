//! HTTP 请求协作方
//!
//! 给定 URL 和请求头，返回状态码和响应体。只有 200 视为成功；
//! 其余状态码与网络异常都走错误分支，由调用方统一映射为 None。

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use tracing::debug;

use crate::config::Config;
use crate::error::{FetchError, PreParseError, PreParseResult};
use crate::utils::truncate_text;

/// 按配置构建阻塞式 HTTP 客户端
///
/// 证书校验关闭时接受无效证书（自签名、过期等都不再导致请求失败）。
pub fn build_http_client(config: &Config) -> PreParseResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .danger_accept_invalid_certs(!config.verify_certificates)
        .build()
        .map_err(|e| {
            PreParseError::Fetch(FetchError::ClientBuildFailed {
                source: Box::new(e),
            })
        })
}

/// 发送一次 GET 请求并取回响应体
///
/// # 参数
/// - `client`: HTTP 客户端
/// - `url`: 目标 URL
/// - `headers`: 请求头（由 headers 协作方构建）
///
/// # 返回
/// 状态码为 200 时返回响应体文本，否则返回对应的错误。
pub fn fetch_body(client: &Client, url: &str, headers: HeaderMap) -> PreParseResult<String> {
    let response = client.get(url).headers(headers).send()?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(PreParseError::bad_status(url, status.as_u16()));
    }

    let body = response.text()?;
    debug!("响应体 ({}): {}", url, truncate_text(&body, 200));
    Ok(body)
}
