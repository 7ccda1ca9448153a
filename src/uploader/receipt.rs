// 分片回执收集
//
// 并发分片任务各自写入自己的分片序号，互不冲突；
// 合并前统一排序并校验完整性

use crate::backend::Receipt;
use crate::uploader::error::UploadError;
use crate::uploader::part::Part;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// 回执收集器
#[derive(Debug, Default)]
pub struct ReceiptCollector {
    /// part_number -> ETag
    receipts: DashMap<u32, String>,
    /// 重复写入次数（逻辑错误，合并时拒绝）
    duplicates: AtomicUsize,
}

impl ReceiptCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录分片回执
    ///
    /// 同一分片只保留第一次写入的回执，重复写入会使合并校验失败
    pub fn record(&self, part_number: u32, entity_tag: String) {
        use dashmap::mapref::entry::Entry;

        match self.receipts.entry(part_number) {
            Entry::Occupied(_) => {
                warn!("[分片#{}] 重复的回执被忽略", part_number);
                self.duplicates.fetch_add(1, Ordering::SeqCst);
            }
            Entry::Vacant(slot) => {
                slot.insert(entity_tag);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    /// 生成合并用的有序回执列表
    ///
    /// 回执按分片序号严格升序，且与规划的分片一一对应；
    /// 任何数量、重复、缺失或多余的问题都直接报错，不做修补
    pub fn ordered_for(&self, parts: &[Part]) -> Result<Vec<Receipt>, UploadError> {
        if self.is_empty() {
            return Err(UploadError::FinalizationIntegrity("没有任何分片回执".to_string()));
        }

        let duplicates = self.duplicates.load(Ordering::SeqCst);
        if duplicates > 0 {
            return Err(UploadError::FinalizationIntegrity(format!(
                "存在 {} 个重复回执",
                duplicates
            )));
        }

        let mut receipts: Vec<Receipt> = self
            .receipts
            .iter()
            .map(|entry| Receipt::new(*entry.key(), entry.value().clone()))
            .collect();
        receipts.sort_by_key(|r| r.part_number);

        verify_receipts(&receipts, parts)?;
        Ok(receipts)
    }
}

/// 校验回执与分片规划一致
pub fn verify_receipts(receipts: &[Receipt], parts: &[Part]) -> Result<(), UploadError> {
    if receipts.len() != parts.len() {
        return Err(UploadError::FinalizationIntegrity(format!(
            "回执数量 {} 与分片数量 {} 不一致",
            receipts.len(),
            parts.len()
        )));
    }

    for pair in receipts.windows(2) {
        if pair[0].part_number >= pair[1].part_number {
            return Err(UploadError::FinalizationIntegrity(format!(
                "回执未按分片序号严格升序: #{} 之后是 #{}",
                pair[0].part_number, pair[1].part_number
            )));
        }
    }

    for (receipt, part) in receipts.iter().zip(parts) {
        if receipt.part_number != part.part_number {
            return Err(UploadError::FinalizationIntegrity(format!(
                "缺少分片 #{} 的回执（实际为 #{}）",
                part.part_number, receipt.part_number
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::part::plan;

    #[test]
    fn test_out_of_order_arrival_is_sorted() {
        let parts = plan(30, 10).unwrap();
        let collector = ReceiptCollector::new();
        collector.record(3, "e3".into());
        collector.record(1, "e1".into());
        collector.record(2, "e2".into());

        let ordered = collector.ordered_for(&parts).unwrap();
        assert_eq!(
            ordered.iter().map(|r| r.part_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(ordered[0].entity_tag, "e1");
    }

    #[test]
    fn test_missing_receipt_rejected() {
        let parts = plan(30, 10).unwrap();
        let collector = ReceiptCollector::new();
        collector.record(1, "e1".into());
        collector.record(3, "e3".into());

        let err = collector.ordered_for(&parts).unwrap_err();
        assert!(matches!(err, UploadError::FinalizationIntegrity(_)));
    }

    #[test]
    fn test_unplanned_part_rejected() {
        let parts = plan(20, 10).unwrap();
        let collector = ReceiptCollector::new();
        collector.record(1, "e1".into());
        collector.record(5, "e5".into());

        let err = collector.ordered_for(&parts).unwrap_err();
        assert!(err.to_string().contains("#2"));
    }

    #[test]
    fn test_empty_collector_rejected() {
        let parts = plan(0, 10).unwrap();
        let collector = ReceiptCollector::new();
        assert!(collector.is_empty());

        let err = collector.ordered_for(&parts).unwrap_err();
        assert!(err.to_string().contains("没有任何分片回执"));
    }

    #[test]
    fn test_duplicate_receipt_rejected() {
        let parts = plan(10, 10).unwrap();
        let collector = ReceiptCollector::new();
        collector.record(1, "first".into());
        collector.record(1, "second".into());
        assert_eq!(collector.len(), 1);

        let err = collector.ordered_for(&parts).unwrap_err();
        assert!(matches!(err, UploadError::FinalizationIntegrity(_)));
    }

    #[test]
    fn test_verify_rejects_unsorted_list() {
        let parts = plan(20, 10).unwrap();
        let receipts = vec![Receipt::new(2, "b"), Receipt::new(1, "a")];
        assert!(verify_receipts(&receipts, &parts).is_err());

        let receipts = vec![Receipt::new(1, "a"), Receipt::new(1, "a")];
        assert!(verify_receipts(&receipts, &parts).is_err());
    }

    #[test]
    fn test_concurrent_records() {
        let parts = plan(64, 1).unwrap();
        let collector = std::sync::Arc::new(ReceiptCollector::new());

        let handles: Vec<_> = (1..=64u32)
            .map(|n| {
                let collector = collector.clone();
                std::thread::spawn(move || collector.record(n, format!("e{}", n)))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let ordered = collector.ordered_for(&parts).unwrap();
        assert_eq!(ordered.len(), 64);
        assert_eq!(ordered[63].entity_tag, "e64");
    }
}
