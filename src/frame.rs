// 该文件是 Cheliu （车流） 项目的一部分。
// src/frame.rs - 推理张量定义
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

use ndarray::ArrayD;

/// 推理引擎的图像输入名称
pub const IMAGES_INPUT: &str = "images";
/// 推理引擎的原始尺寸输入名称，内容为 `[[height, width]]`
pub const ORIG_TARGET_SIZES_INPUT: &str = "orig_target_sizes";

/// 推理引擎交换的张量，元素类型为 f32 或 i64
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
  Float(ArrayD<f32>),
  Int(ArrayD<i64>),
}

impl Tensor {
  pub fn shape(&self) -> &[usize] {
    match self {
      Tensor::Float(array) => array.shape(),
      Tensor::Int(array) => array.shape(),
    }
  }

  pub fn ndim(&self) -> usize {
    self.shape().len()
  }

  pub fn to_f32(&self) -> ArrayD<f32> {
    match self {
      Tensor::Float(array) => array.clone(),
      Tensor::Int(array) => array.mapv(|v| v as f32),
    }
  }

  /// 浮点张量四舍五入取整，部分导出格式以浮点数保存类别索引
  pub fn to_i64(&self) -> ArrayD<i64> {
    match self {
      Tensor::Float(array) => array.mapv(|v| v.round() as i64),
      Tensor::Int(array) => array.clone(),
    }
  }
}

impl From<ArrayD<f32>> for Tensor {
  fn from(array: ArrayD<f32>) -> Self {
    Tensor::Float(array)
  }
}

impl From<ArrayD<i64>> for Tensor {
  fn from(array: ArrayD<i64>) -> Self {
    Tensor::Int(array)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
  pub name: String,
  pub tensor: Tensor,
}

/// 有序的命名张量集合
///
/// 推理输出的数量、名称与形状都不保证稳定，使用前必须经过
/// [`crate::model::normalize`] 校验。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedTensors {
  tensors: Vec<NamedTensor>,
}

/// 推理引擎返回的原始输出
pub type RawModelOutput = NamedTensors;
/// 推理引擎的命名输入
pub type InferenceInputs = NamedTensors;

impl NamedTensors {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, tensor: impl Into<Tensor>) -> Self {
    self.push(name, tensor);
    self
  }

  pub fn push(&mut self, name: impl Into<String>, tensor: impl Into<Tensor>) {
    self.tensors.push(NamedTensor {
      name: name.into(),
      tensor: tensor.into(),
    });
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }

  pub fn get(&self, name: &str) -> Option<&Tensor> {
    self
      .tensors
      .iter()
      .find(|named| named.name == name)
      .map(|named| &named.tensor)
  }

  pub fn tensors(&self) -> &[NamedTensor] {
    &self.tensors
  }

  pub fn shapes(&self) -> Vec<Vec<usize>> {
    self
      .tensors
      .iter()
      .map(|named| named.tensor.shape().to_vec())
      .collect()
  }
}

impl<S: Into<String>, T: Into<Tensor>> FromIterator<(S, T)> for NamedTensors {
  fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
    let mut tensors = NamedTensors::new();
    for (name, tensor) in iter {
      tensors.push(name, tensor);
    }
    tensors
  }
}
