// 该文件是 Cheliu （车流） 项目的一部分。
// src/config.rs - 检测参数配置
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

use serde::Serialize;
use thiserror::Error;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值必须位于 [0, 1] 区间内, 实际为 {0}")]
  ThresholdOutOfRange(f32),
}

/// 已校验的置信度阈值，取值范围 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ConfidenceThreshold(f32);

impl ConfidenceThreshold {
  pub fn new(value: f32) -> Result<Self, ConfigError> {
    // NaN 不满足区间判断，同样被拒绝
    if (0.0..=1.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(ConfigError::ThresholdOutOfRange(value))
    }
  }

  pub fn value(self) -> f32 {
    self.0
  }
}

impl Default for ConfidenceThreshold {
  fn default() -> Self {
    Self(DEFAULT_CONFIDENCE_THRESHOLD)
  }
}

impl TryFrom<f32> for ConfidenceThreshold {
  type Error = ConfigError;

  fn try_from(value: f32) -> Result<Self, Self::Error> {
    Self::new(value)
  }
}

/// 单次检测调用的参数
#[derive(Debug, Clone, Default)]
pub struct DetectOptions {
  threshold: ConfidenceThreshold,
  sort_by_confidence: bool,
  annotate: bool,
}

impl DetectOptions {
  pub fn new(confidence: f32) -> Result<Self, ConfigError> {
    Ok(Self {
      threshold: ConfidenceThreshold::new(confidence)?,
      ..Default::default()
    })
  }

  /// 按置信度降序返回检测结果（默认保持模型输出顺序）
  pub fn with_sort_by_confidence(mut self, sort: bool) -> Self {
    self.sort_by_confidence = sort;
    self
  }

  /// 是否生成标注后的图像
  pub fn with_annotation(mut self, annotate: bool) -> Self {
    self.annotate = annotate;
    self
  }

  pub fn threshold(&self) -> ConfidenceThreshold {
    self.threshold
  }

  pub fn sort_by_confidence(&self) -> bool {
    self.sort_by_confidence
  }

  pub fn annotate(&self) -> bool {
    self.annotate
  }
}
