// 该文件是 Cheliu （车流） 项目的一部分。
// src/model/label.rs - 类别标签解析
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

use std::fmt;

use tracing::debug;

pub const MOTORCYCLE: &str = "motorcycle";
pub const CAR: &str = "car";

const KNOWN_CLASSES: [&str; 2] = [MOTORCYCLE, CAR];

// 某导出格式固定以 3 表示机车，与编号方案无关
const MOTORCYCLE_QUIRK_LABEL: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VehicleLabel {
  Motorcycle,
  Car,
  Unknown(i64),
}

impl VehicleLabel {
  /// 模型支持的类别名称，按从 0 开始的编号排列
  pub fn known_classes() -> &'static [&'static str] {
    &KNOWN_CLASSES
  }

  pub fn to_label_str(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for VehicleLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VehicleLabel::Motorcycle => f.write_str(MOTORCYCLE),
      VehicleLabel::Car => f.write_str(CAR),
      VehicleLabel::Unknown(id) => write!(f, "class_{}", id),
    }
  }
}

/// 类别编号方案
///
/// 同一批检测只使用一种方案，由 [`LabelScheme::select`] 按整批标签确定一次。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScheme {
  /// `{0: motorcycle, 1: car}`
  ZeroBased,
  /// `{1: motorcycle, 2: car}`
  Offset,
}

impl LabelScheme {
  /// 最大标签不超过 1 时使用从 0 开始的编号，否则使用偏移编号；空批次按从 0 开始处理
  pub fn select(labels: &[i64]) -> Self {
    let scheme = match labels.iter().max() {
      Some(&max) if max > 1 => LabelScheme::Offset,
      _ => LabelScheme::ZeroBased,
    };
    debug!("类别编号方案: {:?} (共 {} 个标签)", scheme, labels.len());
    scheme
  }

  pub fn resolve(self, class_id: i64) -> VehicleLabel {
    match (self, class_id) {
      (_, MOTORCYCLE_QUIRK_LABEL) => VehicleLabel::Motorcycle,
      (LabelScheme::ZeroBased, 0) | (LabelScheme::Offset, 1) => VehicleLabel::Motorcycle,
      (LabelScheme::ZeroBased, 1) | (LabelScheme::Offset, 2) => VehicleLabel::Car,
      (_, id) => VehicleLabel::Unknown(id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_based_when_max_is_one() {
    let scheme = LabelScheme::select(&[0, 1, 1, 0]);
    assert_eq!(scheme, LabelScheme::ZeroBased);
    assert_eq!(scheme.resolve(0).to_label_str(), "motorcycle");
    assert_eq!(scheme.resolve(1).to_label_str(), "car");
  }

  #[test]
  fn offset_when_max_exceeds_one() {
    let scheme = LabelScheme::select(&[1, 2]);
    assert_eq!(scheme, LabelScheme::Offset);
    assert_eq!(scheme.resolve(1), VehicleLabel::Motorcycle);
    assert_eq!(scheme.resolve(2), VehicleLabel::Car);
    assert_eq!(scheme.resolve(0).to_label_str(), "class_0");
  }

  #[test]
  fn label_three_is_always_motorcycle() {
    for scheme in [LabelScheme::ZeroBased, LabelScheme::Offset] {
      assert_eq!(scheme.resolve(3), VehicleLabel::Motorcycle);
    }
    assert_eq!(LabelScheme::select(&[3]), LabelScheme::Offset);
  }

  #[test]
  fn unknown_labels_embed_the_raw_id() {
    assert_eq!(LabelScheme::ZeroBased.resolve(7).to_label_str(), "class_7");
    assert_eq!(LabelScheme::Offset.resolve(-1).to_label_str(), "class_-1");
  }

  #[test]
  fn known_classes_match_zero_based_ids() {
    let known = VehicleLabel::known_classes();
    assert_eq!(known, &["motorcycle", "car"]);
    for (id, name) in known.iter().enumerate() {
      assert_eq!(LabelScheme::ZeroBased.resolve(id as i64).to_label_str(), *name);
    }
  }

  #[test]
  fn empty_batch_selects_zero_based() {
    assert_eq!(LabelScheme::select(&[]), LabelScheme::ZeroBased);
  }
}
