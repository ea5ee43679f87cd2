//! # 后台代理
//!
//! 两个常驻的循环，只通过 [`SectorCache`] 的公开接口与缓存交互：
//!
//! - 预读：前台每读一个扇区 S，就把 S+1 登记为唯一的待预读目标，
//!   新的登记会覆盖旧的，所以连续读取时较早的预读请求可能被丢弃；
//! - 定期刷盘：每隔固定时间调用一次 [`SectorCache::flush_all`]。
//!
//! 线程版本需要 `std` 特性；没有线程的内核可以自行调用 [`ReadAhead::run_once`]。

use alloc::boxed::Box;

use spin::Mutex;

use crate::{SectorCache, SectorId};

type Waker = Box<dyn Fn() + Send + Sync>;

/// 预读目标的登记处
pub struct ReadAhead {
    pending: Mutex<Option<SectorId>>,
    /// 有新目标时唤醒预读线程
    waker: Mutex<Option<Waker>>,
}

impl ReadAhead {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            waker: Mutex::new(None),
        }
    }

    /// 登记预读目标，覆盖尚未处理的旧目标
    pub fn request(&self, sector: SectorId) {
        *self.pending.lock() = Some(sector);
        if let Some(wake) = self.waker.lock().as_ref() {
            wake();
        }
    }

    #[inline]
    pub fn take(&self) -> Option<SectorId> {
        self.pending.lock().take()
    }

    pub fn set_waker(&self, waker: Option<Waker>) {
        *self.waker.lock() = waker;
    }

    /// 处理一个待预读目标，没有目标时返回假
    pub fn run_once(&self, cache: &SectorCache) -> bool {
        match self.take() {
            Some(sector) => {
                log::trace!("read-ahead: sector={sector}");
                cache.prefetch(sector);
                true
            }
            None => false,
        }
    }
}

impl Default for ReadAhead {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
pub use self::worker::{AgentHandle, spawn_periodic_flush, spawn_read_ahead};

#[cfg(feature = "std")]
mod worker {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    use crate::SectorCache;

    /// 后台代理的句柄，停止或丢弃时结束线程
    pub struct AgentHandle {
        name: &'static str,
        stop: Arc<AtomicBool>,
        thread: Option<JoinHandle<()>>,
        on_stop: Option<Box<dyn FnOnce() + Send>>,
    }

    impl AgentHandle {
        #[inline]
        pub fn name(&self) -> &'static str {
            self.name
        }

        #[inline]
        pub fn stop(mut self) {
            self.shutdown();
        }

        fn shutdown(&mut self) {
            let Some(thread) = self.thread.take() else {
                return;
            };

            if let Some(on_stop) = self.on_stop.take() {
                on_stop();
            }
            self.stop.store(true, Ordering::Release);
            thread.thread().unpark();
            if thread.join().is_err() {
                log::error!("{} agent panicked", self.name);
            }
            log::info!("{} agent stopped", self.name);
        }
    }

    impl Drop for AgentHandle {
        fn drop(&mut self) {
            self.shutdown();
        }
    }

    fn spawn(
        name: &'static str,
        stop: Arc<AtomicBool>,
        body: impl FnOnce() + Send + 'static,
    ) -> AgentHandle {
        let thread = thread::Builder::new()
            .name(name.into())
            .spawn(body)
            .unwrap_or_else(|err| panic!("failed to spawn {name} agent: {err}"));
        log::info!("{name} agent started");

        AgentHandle {
            name,
            stop,
            thread: Some(thread),
            on_stop: None,
        }
    }

    /// 启动预读线程：有目标就预读，没有就休眠到下一次登记
    pub fn spawn_read_ahead(cache: Arc<SectorCache>) -> AgentHandle {
        let stop = Arc::new(AtomicBool::new(false));

        let mut handle = spawn("read-ahead", stop.clone(), {
            let cache = cache.clone();
            move || {
                while !stop.load(Ordering::Acquire) {
                    if !cache.read_ahead().run_once(&cache) {
                        thread::park();
                    }
                }
            }
        });

        if let Some(thread) = handle.thread.as_ref() {
            let unparker = thread.thread().clone();
            cache
                .read_ahead()
                .set_waker(Some(Box::new(move || unparker.unpark())));
        }
        handle.on_stop = Some(Box::new(move || cache.read_ahead().set_waker(None)));

        handle
    }

    /// 启动定期刷盘线程
    pub fn spawn_periodic_flush(cache: Arc<SectorCache>, interval: Duration) -> AgentHandle {
        let stop = Arc::new(AtomicBool::new(false));

        spawn("periodic-flush", stop.clone(), move || {
            let mut deadline = Instant::now() + interval;
            while !stop.load(Ordering::Acquire) {
                let now = Instant::now();
                if now >= deadline {
                    log::debug!("periodic flush");
                    cache.flush_all();
                    deadline = now + interval;
                } else {
                    thread::park_timeout(deadline - now);
                }
            }
        })
    }
}
