//! # preparser
//!
//! 一个小巧的预解析库：从一组 URL（静态页面 / JSON API / JS 渲染页面）
//! 抓取内容，可选地并发执行，并把每条结果交给调用方的变换回调。
//!
//! ## 架构设计
//!
//! 本系统分为四层：
//!
//! ### ① 渲染后端层（Browser）
//! - `browser/` - 持有稀缺资源（驱动线程 + Browser），只暴露同步 render 能力
//! - `RenderBackend` - 把工作线程的同步调用桥接进异步执行模型
//!
//! ### ② 调度层（Scheduler）
//! - `scheduler` - 有界工作线程池、双分发模式、结果缓存、fail-fast
//! - `TaskScheduler` - 不认识抓取，只分发 `(url) -> Option<T>` 工作函数
//!
//! ### ③ 编排层（PreParser）
//! - `preparser` - 按模式绑定抓取策略，应用变换回调
//! - `PreParser` - 顶层入口：`fetch_one` / `run_all` / `cancel`
//!
//! ### ④ 协作方（无状态纯函数）
//! - `fetch` - HTTP 请求（只有 200 算成功）
//! - `extract` - 同级节点范围提取、表格数据提取
//! - `utils/headers` - 请求头构建（同站伪装）
//!
//! ## 故障约定
//!
//! 单 URL 的一切失败都表示为该 URL 的 None 结果，绝不冒出运行之外；
//! 只有"渲染后端不可用"和"调用方误用"会浮到调用方。

pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod preparser;
pub mod scheduler;
pub mod utils;

// 重新导出常用类型
pub use browser::{BundleKind, RenderBackend, ScopeSelector, WaitState};
pub use config::{Config, DispatchMode, ParserMode};
pub use error::{PreParseError, PreParseResult};
pub use preparser::{Identity, PageData, PreParser, Transform};
pub use scheduler::{RunState, TaskScheduler, WorkFn};
