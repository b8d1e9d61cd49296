// 该文件是 Cheliu （车流） 项目的一部分。
// src/model/filter.rs - 检测结果过滤与坐标变换
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

use tracing::debug;

use crate::{
  config::ConfidenceThreshold,
  model::{Detection, LabelScheme, NormalizedOutput},
  preprocess::ScaleContext,
};

/// 检测框坐标所在的坐标系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxSpace {
  /// 0..1 归一化坐标，直接乘以原始宽高
  Normalized,
  /// 模型输入（640x640）坐标，按 ScaleContext 缩放
  ModelInput,
}

impl BoxSpace {
  /// 整批检测框都满足 `x2 <= 1.0 && y2 <= 1.0` 时视为归一化坐标。
  ///
  /// 靠近原点的极小绝对坐标框会被误判为归一化坐标，目前没有更多信息可用于区分。
  pub fn detect(boxes: &[[f32; 4]]) -> Self {
    if !boxes.is_empty() && boxes.iter().all(|b| b[2] <= 1.0 && b[3] <= 1.0) {
      BoxSpace::Normalized
    } else {
      BoxSpace::ModelInput
    }
  }

  fn factors(self, scale: &ScaleContext) -> (f32, f32) {
    match self {
      BoxSpace::Normalized => (
        scale.original_width() as f32,
        scale.original_height() as f32,
      ),
      BoxSpace::ModelInput => (scale.scale_x(), scale.scale_y()),
    }
  }
}

/// 阈值过滤、坐标还原、裁剪与类别解析
///
/// 纯函数：相同的输入总是得到相同的输出。
#[derive(Debug, Clone, Default)]
pub struct DetectionFilter {
  threshold: ConfidenceThreshold,
  sort_by_confidence: bool,
}

impl DetectionFilter {
  pub fn new(threshold: ConfidenceThreshold) -> Self {
    Self {
      threshold,
      sort_by_confidence: false,
    }
  }

  pub fn sort_by_confidence(mut self, sort: bool) -> Self {
    self.sort_by_confidence = sort;
    self
  }

  pub fn apply(&self, output: &NormalizedOutput, scale: &ScaleContext) -> Vec<Detection> {
    let threshold = self.threshold.value();
    let scheme = LabelScheme::select(output.labels());
    let space = BoxSpace::detect(output.boxes());
    let (factor_x, factor_y) = space.factors(scale);
    let max_x = scale.original_width().saturating_sub(1) as i32;
    let max_y = scale.original_height().saturating_sub(1) as i32;
    debug!(
      "检测框坐标系: {:?}, 缩放系数: ({}, {})",
      space, factor_x, factor_y
    );

    let mut detections = Vec::new();
    let mut degenerate = 0usize;

    for (class_id, raw_box, score) in output.iter() {
      if score.is_nan() || score < threshold {
        continue;
      }

      let x1 = project(raw_box[0], factor_x, max_x);
      let y1 = project(raw_box[1], factor_y, max_y);
      let x2 = project(raw_box[2], factor_x, max_x);
      let y2 = project(raw_box[3], factor_y, max_y);

      if x1 >= x2 || y1 >= y2 {
        degenerate += 1;
        continue;
      }

      let label = scheme.resolve(class_id);
      detections.push(Detection::new(
        class_id,
        label.to_label_str(),
        score.min(1.0),
        [x1, y1, x2, y2],
      ));
    }

    if degenerate > 0 {
      debug!("丢弃 {} 个退化检测框", degenerate);
    }

    if self.sort_by_confidence {
      detections.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    }

    detections
  }
}

fn project(value: f32, factor: f32, max: i32) -> i32 {
  // 缩放后截断取整再裁剪，NaN 转换为 0
  ((value * factor) as i32).clamp(0, max)
}
