// 该文件是 Cheliu （车流） 项目的一部分。
// src/stats.rs - 车流累计统计
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  collections::BTreeMap,
  sync::{Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use tracing::{debug, info};

use crate::model::Detection;

#[derive(Debug, Default)]
struct StatsInner {
  counts: BTreeMap<String, u64>,
  batches: u64,
}

/// 按类别名称累计的检测数量
///
/// 可在多个线程间共享；每次 [`TrafficStats::record`] 在一次加锁内完成，
/// 并发记录不会丢失计数。
#[derive(Debug, Default)]
pub struct TrafficStats {
  inner: Mutex<StatsInner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
  pub traffic_stats: BTreeMap<String, u64>,
  pub batches: u64,
}

impl TrafficStats {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, StatsInner> {
    // 计数在持锁期间不会处于中间状态，中毒后继续使用
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 记录一批检测结果，空批次同样计入批次数
  pub fn record(&self, detections: &[Detection]) {
    let mut inner = self.lock();
    for detection in detections {
      *inner
        .counts
        .entry(detection.class_name().to_string())
        .or_insert(0) += 1;
    }
    inner.batches += 1;
    debug!(
      "累计统计更新: 本批 {} 个, 共 {} 批",
      detections.len(),
      inner.batches
    );
  }

  pub fn count(&self, class_name: &str) -> u64 {
    self.lock().counts.get(class_name).copied().unwrap_or(0)
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    let inner = self.lock();
    StatsSnapshot {
      traffic_stats: inner.counts.clone(),
      batches: inner.batches,
    }
  }

  pub fn reset(&self) {
    let mut inner = self.lock();
    *inner = StatsInner::default();
    info!("累计统计已清零");
  }
}
