// 该文件是 Cheliu （车流） 项目的一部分。
// src/model/replay.rs - 回放推理引擎
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

//! 回放事先记录的模型输出，不执行真实推理。
//!
//! 记录文件为 JSON：
//!
//! ```json
//! {
//!   "model_type": "rtdetr",
//!   "outputs": [
//!     { "name": "labels", "dtype": "int64", "shape": [1, 2], "data": [1, 2] },
//!     { "name": "boxes", "dtype": "float32", "shape": [1, 2, 4], "data": [0, 0, 10, 10, 5, 5, 20, 20] },
//!     { "name": "scores", "dtype": "float32", "shape": [1, 2], "data": [0.9, 0.4] }
//!   ]
//! }
//! ```

use ndarray::{ArrayD, IxDyn, ShapeError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{IMAGES_INPUT, InferenceInputs, RawModelOutput, Tensor},
  model::InferenceEngine,
};

const DEFAULT_MODEL_TYPE: &str = "replay";

#[derive(Error, Debug)]
pub enum ReplayEngineError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际为 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("路径解码错误: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("张量 {name} 形状与数据长度不符: {source}")]
  ShapeError {
    name: String,
    #[source]
    source: ShapeError,
  },
  #[error("缺少推理输入: {0}")]
  MissingInput(&'static str),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RecordedDtype {
  Float32,
  Int64,
}

#[derive(Debug, Deserialize)]
struct RecordedTensor {
  name: String,
  dtype: RecordedDtype,
  shape: Vec<usize>,
  data: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct Recording {
  #[serde(default)]
  model_type: Option<String>,
  outputs: Vec<RecordedTensor>,
}

/// 每次推理都返回同一份记录的输出
#[derive(Debug, Clone)]
pub struct ReplayEngine {
  model_type: String,
  outputs: RawModelOutput,
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngine {
  type Error = ReplayEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayEngineError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let path = crate::url_file_path(url)?;
    info!("加载模型输出记录: {}", path.display());
    let json = std::fs::read_to_string(&path)?;
    Self::from_json_str(&json)
  }
}

impl ReplayEngine {
  pub fn new(model_type: impl Into<String>, outputs: RawModelOutput) -> Self {
    Self {
      model_type: model_type.into(),
      outputs,
    }
  }

  pub fn from_json_str(json: &str) -> Result<Self, ReplayEngineError> {
    let recording: Recording = serde_json::from_str(json)?;

    let mut outputs = RawModelOutput::new();
    for recorded in recording.outputs {
      let shape = IxDyn(&recorded.shape);
      let tensor = match recorded.dtype {
        RecordedDtype::Float32 => {
          let data = recorded.data.iter().map(|&v| v as f32).collect();
          ArrayD::from_shape_vec(shape, data).map(Tensor::Float)
        }
        RecordedDtype::Int64 => {
          let data = recorded.data.iter().map(|&v| v as i64).collect();
          ArrayD::from_shape_vec(shape, data).map(Tensor::Int)
        }
      }
      .map_err(|source| ReplayEngineError::ShapeError {
        name: recorded.name.clone(),
        source,
      })?;
      debug!("记录输出 {}: 形状 {:?}", recorded.name, tensor.shape());
      outputs.push(recorded.name, tensor);
    }

    let model_type = recording
      .model_type
      .unwrap_or_else(|| DEFAULT_MODEL_TYPE.to_string());
    Ok(Self::new(model_type, outputs))
  }
}

impl InferenceEngine for ReplayEngine {
  type Error = ReplayEngineError;

  fn name(&self) -> &str {
    &self.model_type
  }

  fn infer(&self, inputs: &InferenceInputs) -> Result<RawModelOutput, Self::Error> {
    if inputs.get(IMAGES_INPUT).is_none() {
      return Err(ReplayEngineError::MissingInput(IMAGES_INPUT));
    }
    Ok(self.outputs.clone())
  }
}
