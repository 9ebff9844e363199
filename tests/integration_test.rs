use std::sync::Arc;
use std::time::Duration;

use preparser::{
    Config, DispatchMode, Identity, PageData, ParserMode, PreParser, ScopeSelector, Transform,
    WaitState,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 从 API 响应里取 name 字段的变换策略
struct NameField;

impl Transform for NameField {
    type Output = String;

    fn apply(&self, _url: &str, data: PageData) -> Option<String> {
        data.as_json()?.get("name")?.as_str().map(String::from)
    }
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pooled_bulk_distribute_round_trip() {
    preparser::utils::logging::init();

    let server = MockServer::start().await;
    mount_page(&server, "/1", "<p>page one</p>").await;
    mount_page(&server, "/2", "<p>page two</p>").await;

    let urls = vec![format!("{}/1", server.uri()), format!("{}/2", server.uri())];
    let config = Config {
        use_worker_pool: true,
        dispatch_mode: DispatchMode::BulkDistribute,
        max_workers: 2,
        cache_enabled: true,
        ..Config::default()
    };
    // 阻塞式客户端不能在异步线程上构建和使用
    let task_urls = urls.clone();
    let results = tokio::task::spawn_blocking(move || {
        let parser = PreParser::new(task_urls, config).expect("构建预解析器失败");
        parser.run_all()
    })
    .await
    .expect("任务执行失败")
    .expect("运行失败");

    assert_eq!(results.len(), 2);
    assert_eq!(
        results[&urls[0]],
        Some(PageData::Html("<p>page one</p>".to_string()))
    );
    assert_eq!(
        results[&urls[1]],
        Some(PageData::Html("<p>page two</p>".to_string()))
    );
}

#[tokio::test]
async fn test_api_mode_with_transform() {
    let server = MockServer::start().await;
    mount_page(&server, "/item", r#"{"name": "widget", "count": 3}"#).await;

    let url = format!("{}/item", server.uri());
    let config = Config {
        parser_mode: ParserMode::Api,
        cache_enabled: true,
        ..Config::default()
    };
    let task_url = url.clone();
    let results = tokio::task::spawn_blocking(move || {
        let parser = PreParser::with_transform(vec![task_url], config, NameField)
            .expect("构建预解析器失败");
        parser.run_all()
    })
    .await
    .expect("任务执行失败")
    .expect("运行失败");

    assert_eq!(results[&url], Some("widget".to_string()));
}

#[tokio::test]
async fn test_api_mode_malformed_body_maps_to_none() {
    let server = MockServer::start().await;
    mount_page(&server, "/broken", "这不是 JSON").await;

    let url = format!("{}/broken", server.uri());
    let config = Config {
        parser_mode: ParserMode::Api,
        cache_enabled: true,
        fail_fast: false,
        ..Config::default()
    };
    let task_url = url.clone();
    let results = tokio::task::spawn_blocking(move || {
        let parser = PreParser::new(vec![task_url], config).expect("构建预解析器失败");
        parser.run_all()
    })
    .await
    .expect("任务执行失败")
    .expect("运行失败");

    assert_eq!(results[&url], None);
}

#[tokio::test]
async fn test_sequential_fail_fast_skips_remaining_urls() {
    let server = MockServer::start().await;
    mount_page(&server, "/ok", "<p>ok</p>").await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    // fail-fast 生效后这个路由不应被请求
    Mock::given(method("GET"))
        .and(path("/after"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let urls = vec![
        format!("{}/ok", server.uri()),
        format!("{}/bad", server.uri()),
        format!("{}/after", server.uri()),
    ];
    let config = Config {
        cache_enabled: true,
        ..Config::default()
    };
    let task_urls = urls.clone();
    let results = tokio::task::spawn_blocking(move || {
        let parser = PreParser::new(task_urls, config).expect("构建预解析器失败");
        parser.run_all()
    })
    .await
    .expect("任务执行失败")
    .expect("运行失败");

    // 第 k 个 URL 失败后，k 之后的 URL 不再尝试，缓存最多 k+1 条
    assert_eq!(results.len(), 2);
    assert_eq!(results[&urls[0]], Some(PageData::Html("<p>ok</p>".to_string())));
    assert_eq!(results[&urls[1]], None);
    assert!(!results.contains_key(&urls[2]));
}

#[tokio::test]
async fn test_non_fail_fast_run_caches_every_url() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", "A").await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_page(&server, "/c", "C").await;

    let urls = vec![
        format!("{}/a", server.uri()),
        format!("{}/missing", server.uri()),
        format!("{}/c", server.uri()),
    ];
    let config = Config {
        use_worker_pool: true,
        cache_enabled: true,
        fail_fast: false,
        ..Config::default()
    };
    let task_urls = urls.clone();
    let results = tokio::task::spawn_blocking(move || {
        let parser = PreParser::new(task_urls, config).expect("构建预解析器失败");
        parser.run_all()
    })
    .await
    .expect("任务执行失败")
    .expect("运行失败");

    // 非 fail-fast：N 个 URL 对应 N 个键，失败的条目是 None
    assert_eq!(results.len(), 3);
    assert_eq!(results[&urls[0]], Some(PageData::Html("A".to_string())));
    assert_eq!(results[&urls[1]], None);
    assert_eq!(results[&urls[2]], Some(PageData::Html("C".to_string())));
}

#[tokio::test]
async fn test_cancel_stops_pooled_run_midway() {
    let server = MockServer::start().await;
    for i in 0..6 {
        Mock::given(method("GET"))
            .and(path(format!("/slow/{}", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
    }

    let urls: Vec<String> = (0..6).map(|i| format!("{}/slow/{}", server.uri(), i)).collect();
    let config = Config {
        use_worker_pool: true,
        max_workers: 1,
        cache_enabled: true,
        fail_fast: false,
        ..Config::default()
    };

    let parser = tokio::task::spawn_blocking({
        let urls = urls.clone();
        move || Arc::new(PreParser::new(urls, config).expect("构建预解析器失败"))
    })
    .await
    .expect("任务执行失败");

    let runner = tokio::task::spawn_blocking({
        let parser = parser.clone();
        move || parser.run_all()
    });

    // 等前几个任务进入执行，再取消
    tokio::time::sleep(Duration::from_millis(750)).await;
    parser.cancel();

    let results = runner.await.expect("任务执行失败").expect("运行失败");

    // 取消后剩余 URL 不再提交：结果数严格小于 URL 总数
    assert!(!results.is_empty());
    assert!(results.len() < urls.len());
}

#[tokio::test]
async fn test_fetch_one_is_idempotent() {
    let server = MockServer::start().await;
    mount_page(&server, "/stable", "<p>固定内容</p>").await;

    let url = format!("{}/stable", server.uri());
    let (first, second) = tokio::task::spawn_blocking(move || {
        let parser =
            PreParser::new(vec![url.clone()], Config::default()).expect("构建预解析器失败");
        (parser.fetch_one(&url), parser.fetch_one(&url))
    })
    .await
    .expect("任务执行失败");

    assert!(first.is_some());
    assert_eq!(first, second);
}

// ========== 以下测试需要本机有 Chrome / Chromium ==========
// 默认忽略，手动运行：cargo test -- --ignored

#[test]
#[ignore]
fn test_dynamic_render_with_scope() {
    preparser::utils::logging::init();

    let url = "data:text/html,<div id=\"content\"><b>渲染结果</b></div>".to_string();
    let config = Config {
        parser_mode: ParserMode::DynamicHtml,
        cache_enabled: true,
        scope: Some(ScopeSelector::new("#content", WaitState::Attached)),
        ..Config::default()
    };
    let parser = PreParser::new(vec![url.clone()], config).expect("构建预解析器失败");

    let results = parser.run_all().expect("运行失败");
    match &results[&url] {
        Some(PageData::Html(html)) => assert!(html.contains("渲染结果")),
        other => panic!("渲染结果不符合预期: {:?}", other),
    }
}

#[test]
#[ignore]
fn test_dynamic_render_wait_timeout_maps_to_none() {
    preparser::utils::logging::init();

    let url = "data:text/html,<div id=\"content\">空</div>".to_string();
    let config = Config {
        parser_mode: ParserMode::DynamicHtml,
        cache_enabled: true,
        fail_fast: false,
        wait_timeout_ms: 1_000,
        scope: Some(ScopeSelector::new("#never-appears", WaitState::Visible)),
        ..Config::default()
    };
    let parser = PreParser::new(vec![url.clone()], config).expect("构建预解析器失败");

    let results = parser.run_all().expect("运行失败");
    // 等待超时映射为该 URL 的 None，运行本身正常结束
    assert_eq!(results[&url], None);
}

#[test]
#[ignore]
fn test_dynamic_render_whole_document_without_scope() {
    preparser::utils::logging::init();

    let url = "data:text/html,<p>整页提取</p>".to_string();
    let config = Config {
        parser_mode: ParserMode::DynamicHtml,
        cache_enabled: true,
        ..Config::default()
    };
    let parser = PreParser::new(vec![url.clone()], config).expect("构建预解析器失败");

    let results = parser.run_all().expect("运行失败");
    match &results[&url] {
        Some(PageData::Html(html)) => assert!(html.contains("整页提取")),
        other => panic!("渲染结果不符合预期: {:?}", other),
    }
}
