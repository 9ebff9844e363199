//! 请求头构建协作方 - 纯函数
//!
//! 给定 URL 和同站标志，构建一套浏览器风格的请求头。
//! 同站模式下追加 Origin / Referer / Sec-Fetch-* 头，
//! 伪装成同站请求来绕过 CORS 拦截。

use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, ORIGIN, REFERER, USER_AGENT,
};
use url::Url;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// 构建一次请求的请求头
///
/// # 参数
/// - `url`: 目标 URL（同站模式下用来推导 Origin 与 Referer）
/// - `same_site`: 是否追加同站请求头
///
/// # 返回
/// 返回完整的请求头。URL 不合法时只返回基础请求头。
pub fn build_request_headers(url: &str, same_site: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    if !same_site {
        return headers;
    }

    let Ok(parsed) = Url::parse(url) else {
        return headers;
    };
    let Some(host) = parsed.host_str() else {
        return headers;
    };

    // Origin 是 scheme + host (+ port)；Referer 在此基础上带路径、去掉查询串
    let origin = match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    };
    let referer = format!("{}{}", origin, parsed.path());

    if let Ok(value) = HeaderValue::from_str(&origin) {
        headers.insert(ORIGIN, value);
    }
    if let Ok(value) = HeaderValue::from_str(&referer) {
        headers.insert(REFERER, value);
    }
    // 同站 + CORS：绕过 No 'Access-Control-Allow-Origin' 拦截
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_headers_without_same_site() {
        let headers = build_request_headers("http://example.com/page", false);

        assert!(headers.contains_key(USER_AGENT));
        assert!(headers.contains_key(ACCEPT));
        assert!(!headers.contains_key(ORIGIN));
        assert!(!headers.contains_key("sec-fetch-site"));
    }

    #[test]
    fn test_same_site_headers() {
        let headers = build_request_headers("https://example.com/api/list?page=1", true);

        assert_eq!(headers[ORIGIN], "https://example.com");
        // Referer 带路径但不带查询串
        assert_eq!(headers[REFERER], "https://example.com/api/list");
        assert_eq!(headers["sec-fetch-site"], "same-origin");
        assert_eq!(headers["sec-fetch-mode"], "cors");
        assert_eq!(headers["sec-fetch-dest"], "empty");
    }

    #[test]
    fn test_same_site_headers_with_port() {
        let headers = build_request_headers("http://localhost:8080/data", true);

        assert_eq!(headers[ORIGIN], "http://localhost:8080");
        assert_eq!(headers[REFERER], "http://localhost:8080/data");
    }

    #[test]
    fn test_invalid_url_falls_back_to_base_headers() {
        let headers = build_request_headers("not a url", true);

        assert!(headers.contains_key(USER_AGENT));
        assert!(!headers.contains_key(ORIGIN));
    }
}
