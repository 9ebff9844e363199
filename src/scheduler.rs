//! 任务调度器 - 有界工作线程池
//!
//! ## 职责
//!
//! 把一个工作函数 `(url) -> Option<T>` 分发到一个 URL 集合上：
//!
//! 1. **并发控制**：使用 Semaphore 把在途任务限制在工作线程数上限内
//! 2. **双分发模式**：`BulkDistribute` 一次性全部提交；`SequentialSubmit`
//!    逐个提交（仍然并发执行），两种模式只差提交节奏，结果语义相同
//! 3. **结果缓存**：开启缓存时结果按到达顺序写入，按 URL 去重（后写覆盖）
//! 4. **fail-fast**：任一任务返回 None 后不再接受新提交，在途任务自然跑完，
//!    不做硬中断
//! 5. **生命周期**：idle → running → stopping → stopped，运行中重复启动是
//!    调用方错误，直接拒绝
//!
//! 工作函数内的 panic 被逐任务兜住，记为该 URL 的 None 结果，
//! 不会影响兄弟任务，也不会冒出调度器之外。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::DispatchMode;
use crate::error::{PreParseError, PreParseResult, SchedulerError};

/// 运行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// 尚未启动
    Idle,
    /// 正在分发/执行任务
    Running,
    /// 不再接受新任务，等待在途任务跑完
    Stopping,
    /// 本轮运行已结束
    Stopped,
}

/// 工作函数类型：URL → 结果或 None
pub type WorkFn<T> = Arc<dyn Fn(&str) -> Option<T> + Send + Sync>;

/// 任务的并发额度：bulk 模式任务自己抢，sequential 模式提交前先占
enum TaskSlot {
    Shared(Arc<Semaphore>),
    Reserved(OwnedSemaphorePermit),
}

/// 任务调度器
pub struct TaskScheduler<T> {
    mode: DispatchMode,
    work: WorkFn<T>,
    urls: Vec<String>,
    max_workers: usize,
    cache_enabled: bool,
    fail_fast: bool,
    state: Arc<Mutex<RunState>>,
    stop: Arc<AtomicBool>,
    cache: Arc<Mutex<HashMap<String, Option<T>>>>,
}

impl<T: Clone + Send + 'static> TaskScheduler<T> {
    /// 创建调度器
    ///
    /// # 参数
    /// - `mode`: 分发模式
    /// - `work`: 工作函数
    /// - `urls`: 待处理的 URL 集合
    /// - `max_workers`: 最大工作线程数（至少为 1）
    /// - `cache_enabled`: 是否缓存结果
    /// - `fail_fast`: 任一任务失败后是否停止提交
    pub fn new(
        mode: DispatchMode,
        work: WorkFn<T>,
        urls: Vec<String>,
        max_workers: usize,
        cache_enabled: bool,
        fail_fast: bool,
    ) -> Self {
        Self {
            mode,
            work,
            urls,
            max_workers: max_workers.max(1),
            cache_enabled,
            fail_fast,
            state: Arc::new(Mutex::new(RunState::Idle)),
            stop: Arc::new(AtomicBool::new(false)),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 启动一轮分发，阻塞到所有已提交任务完成
    ///
    /// 运行中重复调用返回 `SchedulerError::AlreadyRunning`。
    pub fn start(&self) -> PreParseResult<()> {
        {
            let mut state = lock(&self.state);
            if *state == RunState::Running || *state == RunState::Stopping {
                return Err(PreParseError::Scheduler(SchedulerError::AlreadyRunning));
            }
            *state = RunState::Running;
        }
        self.stop.store(false, Ordering::SeqCst);
        // 每轮运行开始时清空上一轮的缓存
        lock(&self.cache).clear();

        info!(
            "🚀 调度器启动: {} 个任务, 模式 {:?}, 工作线程上限 {}",
            self.urls.len(),
            self.mode,
            self.max_workers
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(self.max_workers)
            .thread_name("preparse-worker")
            .enable_all()
            .build()
            .map_err(|e| {
                *lock(&self.state) = RunState::Stopped;
                PreParseError::Scheduler(SchedulerError::RuntimeBuildFailed {
                    source: Box::new(e),
                })
            })?;

        runtime.block_on(self.dispatch());

        *lock(&self.state) = RunState::Stopped;
        info!("✓ 调度器本轮运行结束");
        Ok(())
    }

    /// 请求停止：不再接受新提交，在途任务允许跑完
    pub fn stop(&self) {
        info!("⏹️ 调度器收到停止请求");
        self.stop.store(true, Ordering::SeqCst);
        let mut state = lock(&self.state);
        if *state == RunState::Running {
            *state = RunState::Stopping;
        }
    }

    /// 当前缓存快照，任何状态下都可以调用
    pub fn results(&self) -> HashMap<String, Option<T>> {
        lock(&self.cache).clone()
    }

    /// 当前运行状态
    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    /// 按分发模式提交任务并按提交顺序收集
    async fn dispatch(&self) {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(self.urls.len());

        match self.mode {
            DispatchMode::BulkDistribute => {
                // 一次性全部交给线程池，额度由任务自己抢
                for url in self.urls.iter() {
                    let slot = TaskSlot::Shared(semaphore.clone());
                    handles.push((url.clone(), self.spawn_task(url.clone(), slot)));
                }
            }
            DispatchMode::SequentialSubmit => {
                for (index, url) in self.urls.iter().enumerate() {
                    if self.stop.load(Ordering::SeqCst) {
                        info!(
                            "调度器停止接受新任务，剩余 {} 个未提交",
                            self.urls.len() - index
                        );
                        break;
                    }
                    // 先占额度再提交：提交节奏被并发上限约束
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    // 等额度期间可能有任务触发了 fail-fast，再查一次
                    if self.stop.load(Ordering::SeqCst) {
                        info!(
                            "调度器停止接受新任务，剩余 {} 个未提交",
                            self.urls.len() - index
                        );
                        break;
                    }
                    handles.push((
                        url.clone(),
                        self.spawn_task(url.clone(), TaskSlot::Reserved(permit)),
                    ));
                }
            }
        }

        // 按提交顺序收集。任务本体已把结果写进缓存，这里只兜收集层的失败
        for (url, handle) in handles {
            if let Err(e) = handle.await {
                error!("任务执行失败 ({}): {}", url, e);
                if self.cache_enabled {
                    lock(&self.cache).insert(url, None);
                }
            }
        }
    }

    /// 提交单个任务：阻塞执行工作函数，结果写缓存，失败时触发 fail-fast
    fn spawn_task(&self, url: String, slot: TaskSlot) -> JoinHandle<()> {
        let work = self.work.clone();
        let cache = self.cache.clone();
        let stop = self.stop.clone();
        let state = self.state.clone();
        let cache_enabled = self.cache_enabled;
        let fail_fast = self.fail_fast;

        tokio::spawn(async move {
            let _permit = match slot {
                TaskSlot::Reserved(permit) => permit,
                TaskSlot::Shared(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let work_url = url.clone();
            let result = match tokio::task::spawn_blocking(move || work(&work_url)).await {
                Ok(result) => result,
                Err(e) => {
                    // 工作函数 panic：兜住，记为 None，不影响兄弟任务
                    error!("工作函数异常 ({}): {}", url, e);
                    None
                }
            };

            let failed = result.is_none();
            if cache_enabled {
                lock(&cache).insert(url.clone(), result);
            }

            if failed && fail_fast && !stop.swap(true, Ordering::SeqCst) {
                warn!("任务失败 ({})，触发 fail-fast，进入 stopping 状态", url);
                let mut state = lock(&state);
                if *state == RunState::Running {
                    *state = RunState::Stopping;
                }
            }
        })
    }
}

/// 锁中毒时取回内部数据继续用，调度器状态本身不会因 panic 而不一致
fn lock<U>(mutex: &Arc<Mutex<U>>) -> std::sync::MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
