// 上传进度
//
// 进度只由已完成分片数推导，合并成功之前最多显示 99%，
// 100% 表示文件已经在后端合并完成，而不仅仅是字节发送完毕

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 合并完成前的进度上限
pub const MAX_PENDING_PERCENT: u8 = 99;

/// 进度观察者
///
/// 可能在任意分片任务中被同步调用，实现需要线程安全
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, percent: u8);
}

impl<F> ProgressObserver for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        self(percent)
    }
}

/// 计算进度百分比
pub fn percent_for(succeeded: usize, total_parts: usize) -> u8 {
    if total_parts == 0 {
        return 0;
    }
    let percent = (succeeded.min(total_parts) * 100 / total_parts) as u8;
    percent.min(MAX_PENDING_PERCENT)
}

/// 单个会话的进度汇报器
///
/// 只在数值增大时通知观察者，观察到的序列严格递增，100 最多出现一次
pub struct ProgressReporter {
    total_parts: usize,
    succeeded: AtomicUsize,
    /// 上次通知的值（None 表示尚未通知），锁内通知保证顺序
    last_reported: Mutex<Option<u8>>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl ProgressReporter {
    pub fn new(total_parts: usize, observer: Option<Arc<dyn ProgressObserver>>) -> Self {
        Self {
            total_parts,
            succeeded: AtomicUsize::new(0),
            last_reported: Mutex::new(None),
            observer,
        }
    }

    pub fn total_parts(&self) -> usize {
        self.total_parts
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// 当前进度
    pub fn percent(&self) -> u8 {
        let last = *self.last_reported.lock();
        last.unwrap_or(0)
    }

    /// 分片完成，返回完成后的分片数
    pub fn part_succeeded(&self) -> usize {
        let succeeded = self.succeeded.fetch_add(1, Ordering::SeqCst) + 1;
        self.emit(percent_for(succeeded, self.total_parts));
        succeeded
    }

    /// 合并成功，汇报 100%
    pub fn finalized(&self) {
        self.emit(100);
    }

    fn emit(&self, percent: u8) {
        let mut last = self.last_reported.lock();
        if last.map_or(true, |prev| percent > prev) {
            *last = Some(percent);
            if let Some(observer) = &self.observer {
                observer.on_progress(percent);
            }
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("total_parts", &self.total_parts)
            .field("succeeded", &self.succeeded())
            .field("percent", &self.percent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (Arc<Mutex<Vec<u8>>>, Arc<dyn ProgressObserver>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: Arc<dyn ProgressObserver> = Arc::new(move |p: u8| sink.lock().push(p));
        (seen, observer)
    }

    #[test]
    fn test_percent_for() {
        assert_eq!(percent_for(0, 3), 0);
        assert_eq!(percent_for(1, 3), 33);
        assert_eq!(percent_for(2, 3), 66);
        // 全部分片完成仍然是 99
        assert_eq!(percent_for(3, 3), 99);
        assert_eq!(percent_for(1, 1), 99);
        assert_eq!(percent_for(0, 0), 0);
        assert_eq!(percent_for(5, 3), 99);
    }

    #[test]
    fn test_reported_sequence_caps_until_finalized() {
        let (seen, observer) = recording();
        let reporter = ProgressReporter::new(3, Some(observer));

        reporter.part_succeeded();
        reporter.part_succeeded();
        reporter.part_succeeded();
        assert_eq!(*seen.lock(), vec![33, 66, 99]);
        assert_eq!(reporter.percent(), 99);

        reporter.finalized();
        reporter.finalized();
        assert_eq!(*seen.lock(), vec![33, 66, 99, 100]);
    }

    #[test]
    fn test_unchanged_percent_not_repeated() {
        let (seen, observer) = recording();
        let reporter = ProgressReporter::new(300, Some(observer));

        for _ in 0..6 {
            reporter.part_succeeded();
        }
        // 1/300 和 2/300 都是 0%，第一次 0 之后不再重复通知
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert_eq!(reporter.succeeded(), 6);
    }

    #[test]
    fn test_concurrent_updates_monotonic() {
        let (seen, observer) = recording();
        let reporter = Arc::new(ProgressReporter::new(200, Some(observer)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reporter = reporter.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        reporter.part_succeeded();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        reporter.finalized();

        let seen = seen.lock();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1);
        assert_eq!(*seen.last().unwrap(), 100);
        assert_eq!(reporter.succeeded(), 200);
    }

    #[test]
    fn test_without_observer() {
        let reporter = ProgressReporter::new(2, None);
        reporter.part_succeeded();
        assert_eq!(reporter.percent(), 50);
    }
}
