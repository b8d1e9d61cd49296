// 该文件是 Cheliu （车流） 项目的一部分。
// src/model.rs - 模型输出与检测结果
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

use crate::frame::{InferenceInputs, RawModelOutput};

/// 外部推理引擎
///
/// 引擎本身是黑盒：接收命名输入，返回数量与形状都不确定的命名输出。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 模型类型名称，用于健康检查
  fn name(&self) -> &str;

  fn infer(&self, inputs: &InferenceInputs) -> Result<RawModelOutput, Self::Error>;
}

/// 单个检测结果，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  class_id: i64,
  class_name: String,
  confidence: f32,
  bbox: [i32; 4], // [x1, y1, x2, y2]
}

impl Detection {
  pub fn new(class_id: i64, class_name: impl Into<String>, confidence: f32, bbox: [i32; 4]) -> Self {
    Self {
      class_id,
      class_name: class_name.into(),
      confidence,
      bbox,
    }
  }

  pub fn class_id(&self) -> i64 {
    self.class_id
  }

  pub fn class_name(&self) -> &str {
    &self.class_name
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn bbox(&self) -> [i32; 4] {
    self.bbox
  }
}

pub mod filter;
pub mod label;
pub mod normalize;

#[cfg(feature = "replay_engine")]
mod replay;
#[cfg(feature = "replay_engine")]
pub use self::replay::{ReplayEngine, ReplayEngineError};

pub use self::filter::DetectionFilter;
pub use self::label::{LabelScheme, VehicleLabel};
pub use self::normalize::{NormalizedOutput, OutputLayout, UnrecognizedOutputFormat, normalize};
