//! 预解析编排层
//!
//! ## 职责
//!
//! 1. **策略绑定**：按解析模式选择抓取方式（静态页面 / API / JS 渲染）
//! 2. **回调应用**：把调用方的变换策略应用到每条抓取结果上
//! 3. **调度委托**：启用线程池时把工作函数交给 `TaskScheduler`，
//!    否则自己按顺序迭代并执行 fail-fast
//! 4. **资源所有者**：唯一持有 HTTP 客户端与渲染后端的模块
//!
//! 所有单 URL 层面的故障（非 200、网络异常、解析失败、渲染失败、回调否决）
//! 都被限制在工作函数边界内，表示为该 URL 的 None 结果；只有后端不可用
//! 与调用方误用（运行中重复启动调度器）会浮到调用方。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use scraper::Html;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::browser::{probe_availability, RenderBackend};
use crate::config::{Config, ParserMode};
use crate::error::PreParseResult;
use crate::fetch::{build_http_client, fetch_body};
use crate::scheduler::{TaskScheduler, WorkFn};
use crate::utils::build_request_headers;

/// 一次抓取得到的页面数据
#[derive(Clone, Debug, PartialEq)]
pub enum PageData {
    /// 静态或渲染后的 HTML 文本
    Html(String),
    /// API 模式下解析出的 JSON
    Json(Value),
}

impl PageData {
    /// 把 HTML 文本解析成文档，Json 变体返回 None
    pub fn parse_html(&self) -> Option<Html> {
        match self {
            PageData::Html(text) => Some(Html::parse_document(text)),
            PageData::Json(_) => None,
        }
    }

    /// 取出 JSON 值，Html 变体返回 None
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            PageData::Json(value) => Some(value),
            PageData::Html(_) => None,
        }
    }
}

/// 结果变换策略
///
/// 每条抓取结果调用一次。返回 None 表示业务层面的失败：这是调用方
/// 主动表达的"没拿到想要的数据"，会和抓取失败一样参与 fail-fast 判断，
/// 但不会升级为错误。
pub trait Transform: Send + Sync + 'static {
    type Output: Clone + Send + 'static;

    fn apply(&self, url: &str, data: PageData) -> Option<Self::Output>;
}

/// 默认"不做变换"策略：原样返回抓到的数据
pub struct Identity;

impl Transform for Identity {
    type Output = PageData;

    fn apply(&self, _url: &str, data: PageData) -> Option<PageData> {
        Some(data)
    }
}

/// 抓取引擎：持有单 URL 抓取所需的全部资源
///
/// 独立出来是为了让工作函数可以跨线程共享（`Arc<Engine>`）。
struct Engine<C: Transform> {
    config: Config,
    transform: C,
    client: reqwest::blocking::Client,
    backend: Option<RenderBackend>,
}

impl<C: Transform> Engine<C> {
    /// 抓取并变换单个 URL，所有故障映射为 None
    fn fetch_one(&self, url: &str) -> Option<C::Output> {
        info!("开始解析任务: {}", url);
        let result = self.fetch_inner(url);
        info!("结束解析任务: {}", url);
        result
    }

    fn fetch_inner(&self, url: &str) -> Option<C::Output> {
        if url.trim().is_empty() {
            warn!("⚠️ 无效的解析 URL: '{}'", url);
            return None;
        }

        let data = match self.config.parser_mode {
            ParserMode::DynamicHtml => {
                let backend = match self.backend.as_ref() {
                    Some(backend) => backend,
                    None => {
                        error!("渲染后端不可用，无法渲染: {}", url);
                        return None;
                    }
                };
                // 渲染失败（导航失败/等待超时）已在后端内部记录日志
                let html = backend.render(url, self.config.scope.as_ref())?;
                PageData::Html(html)
            }
            ParserMode::StaticHtml | ParserMode::Api => {
                let headers = build_request_headers(url, self.config.same_site_headers);
                let body = match fetch_body(&self.client, url, headers) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("请求 {} 失败: {}", url, e);
                        return None;
                    }
                };
                if self.config.parser_mode == ParserMode::Api {
                    match serde_json::from_str(&body) {
                        Ok(value) => PageData::Json(value),
                        Err(e) => {
                            warn!("解析 {} 的 JSON 响应失败: {}", url, e);
                            return None;
                        }
                    }
                } else {
                    PageData::Html(body)
                }
            }
        };

        let result = self.transform.apply(url, data);
        if result.is_none() {
            // 回调否决：业务失败，向上还是 None，但日志上和传输失败分开
            warn!("⚠️ 回调在 {} 上返回 None（业务失败）", url);
        }
        result
    }
}

/// 预解析器
///
/// 绑定 URL 集合、抓取策略与变换策略。渲染 bundle 在构造时探测一次，
/// 之后在实例生命周期内不再变化。
pub struct PreParser<C: Transform> {
    engine: Arc<Engine<C>>,
    urls: Vec<String>,
    stop: Arc<AtomicBool>,
    cache: Mutex<HashMap<String, Option<C::Output>>>,
    active: Mutex<Option<Arc<TaskScheduler<C::Output>>>>,
}

impl PreParser<Identity> {
    /// 创建不带变换回调的预解析器，结果是原样的 `PageData`
    pub fn new(urls: Vec<String>, config: Config) -> PreParseResult<Self> {
        Self::with_transform(urls, config, Identity)
    }
}

impl<C: Transform> PreParser<C> {
    /// 创建带变换回调的预解析器
    ///
    /// DynamicHtml 模式下会在这里探测并启动渲染后端；探测失败不报错，
    /// 但之后的 `run_all` 会拒绝运行。
    pub fn with_transform(urls: Vec<String>, config: Config, transform: C) -> PreParseResult<Self> {
        let client = build_http_client(&config)?;

        let backend = if config.parser_mode == ParserMode::DynamicHtml {
            match probe_availability(&config) {
                Some(bundle) => match RenderBackend::start(bundle, &config) {
                    Ok(backend) => Some(backend),
                    Err(e) => {
                        error!("❌ 渲染后端启动失败: {}", e);
                        None
                    }
                },
                None => {
                    error!("❌ 没有可用的渲染 bundle，DynamicHtml 模式将拒绝运行");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            engine: Arc::new(Engine {
                config,
                transform,
                client,
                backend,
            }),
            urls,
            stop: Arc::new(AtomicBool::new(false)),
            cache: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
        })
    }

    /// 抓取并变换单个 URL
    ///
    /// 不读写缓存，也不受停止标志影响；重复调用同一 URL 得到等价结果。
    pub fn fetch_one(&self, url: &str) -> Option<C::Output> {
        self.engine.fetch_one(url)
    }

    /// 对整个 URL 集合执行一轮预解析，返回 URL → 结果映射
    ///
    /// - URL 集合为空：直接返回空映射，不算错误
    /// - DynamicHtml 模式且渲染后端不可用：拒绝运行，返回空映射
    /// - 启用线程池：委托给 `TaskScheduler`
    /// - 不启用：顺序迭代，fail-fast 开启时首个 None 之后不再尝试
    pub fn run_all(&self) -> PreParseResult<HashMap<String, Option<C::Output>>> {
        info!("🚀 开始预解析任务 ({} 个 URL)", self.urls.len());
        self.stop.store(false, Ordering::SeqCst);
        lock(&self.cache).clear();

        if self.urls.is_empty() {
            warn!("⚠️ 待解析的 URL 列表为空");
            return Ok(HashMap::new());
        }
        if self.engine.config.parser_mode == ParserMode::DynamicHtml
            && self.engine.backend.is_none()
        {
            error!("❌ 渲染后端不可用，拒绝运行（等同于立即取消）");
            return Ok(HashMap::new());
        }

        if self.engine.config.use_worker_pool {
            self.run_pooled()?;
        } else {
            self.run_sequential();
        }

        let results = lock(&self.cache).clone();
        info!("✓ 预解析任务结束，共 {} 条结果", results.len());
        Ok(results)
    }

    /// 当前缓存快照
    pub fn results(&self) -> HashMap<String, Option<C::Output>> {
        lock(&self.cache).clone()
    }

    /// 取消当前运行：顺序路径在下一次迭代前停下，
    /// 线程池路径转发给调度器的 stop
    pub fn cancel(&self) {
        info!("⏹️ 收到取消请求");
        self.stop.store(true, Ordering::SeqCst);
        if let Some(scheduler) = lock(&self.active).as_ref() {
            scheduler.stop();
        }
    }

    /// 线程池路径：构建调度器并等它跑完
    fn run_pooled(&self) -> PreParseResult<()> {
        let engine = self.engine.clone();
        let work: WorkFn<C::Output> = Arc::new(move |url: &str| engine.fetch_one(url));

        let config = &self.engine.config;
        let scheduler = Arc::new(TaskScheduler::new(
            config.dispatch_mode,
            work,
            self.urls.clone(),
            config.max_workers,
            config.cache_enabled,
            config.fail_fast,
        ));

        *lock(&self.active) = Some(scheduler.clone());
        let run_result = scheduler.start();
        *lock(&self.active) = None;
        run_result?;

        *lock(&self.cache) = scheduler.results();
        Ok(())
    }

    /// 顺序路径：逐个抓取，按配置写缓存并执行 fail-fast
    fn run_sequential(&self) {
        for url in &self.urls {
            if self.stop.load(Ordering::SeqCst) {
                info!("收到取消请求，停止迭代");
                break;
            }

            let result = self.engine.fetch_one(url);
            let failed = result.is_none();
            if self.engine.config.cache_enabled {
                lock(&self.cache).insert(url.clone(), result);
            }
            if failed && self.engine.config.fail_fast {
                warn!("任务失败 ({})，fail-fast 终止本轮解析", url);
                break;
            }
        }
    }
}

/// 锁中毒时取回内部数据继续用
fn lock<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
