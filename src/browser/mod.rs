//! 渲染后端层（Render Backend Layer）
//!
//! ## 职责
//!
//! 本层负责 JS 渲染页面的获取，是整个系统里唯一跨越两种调度模型的地方：
//! 工作线程以同步方式调用，后端内部以异步方式驱动浏览器。
//!
//! ## 模块划分
//!
//! ### `bundle` - 渲染 bundle 实现
//! - 定义可互换的 bundle 种类（启动无头浏览器 / 连接已有浏览器）
//! - 按固定优先级探测可用的 bundle（`probe_availability`）
//! - 探测失败是正常结果，不是错误
//!
//! ### `backend` - 同步渲染入口
//! - 持有专用驱动线程（单线程 tokio 运行时）
//! - 每次 `render` 调用通过请求/应答通道桥接到驱动线程
//! - 每次渲染租用一个独立的页面会话，渲染完成后释放
//! - 多个工作线程可以并发调用，互不串行
//!
//! ## 层次关系
//!
//! ```text
//! preparser::PreParser (DynamicHtml 模式)
//!     ↓ 同步调用 render(url, scope)
//! backend::RenderBackend (请求通道 + 驱动线程)
//!     ↓ 异步执行
//! bundle (chromiumoxide Browser)
//! ```

pub mod backend;
pub mod bundle;

// 重新导出主要类型
pub use backend::{RenderBackend, ScopeSelector, WaitState};
pub use bundle::{probe_availability, BundleKind};
