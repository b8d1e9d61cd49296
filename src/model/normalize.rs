// 该文件是 Cheliu （车流） 项目的一部分。
// src/model/normalize.rs - 模型输出归一化
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

//! 推理输出的布局识别与归一化
//!
//! 不同导出流程得到的模型，其输出张量的数量和排列并不一致。目前确认的布局有两种：
//!
//! - [`OutputLayout::TwoTensor`]：`[boxes, scores]`，其中 `scores` 可以是逐类分数
//!   `[N, C]`（取最大值所在类别），也可以是单一置信度 `[N]`（类别固定为 0）；
//! - [`OutputLayout::ThreeTensor`]：`[labels, boxes, scores]`，均已按检测逐条给出。
//!
//! 两种布局都允许带有大小为 1 的批次维度。是否带批次维度以检测框张量为准
//! （`[1, N, 4]` 或 `[N, 4]`），其余张量必须与之一致。
//!
//! 任何其他组合都返回 [`UnrecognizedOutputFormat`]。新的导出格式确认后再增加新的布局，
//! 不放宽现有布局的判断条件。

use ndarray::{ArrayD, ArrayView1, Axis, Ix1, Ix2};
use thiserror::Error;
use tracing::{debug, error};

use crate::frame::{RawModelOutput, Tensor};

const BOX_COORDS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("无法识别的模型输出格式: {reason}, 输出形状 {shapes:?}")]
pub struct UnrecognizedOutputFormat {
  reason: String,
  shapes: Vec<Vec<usize>>,
}

impl UnrecognizedOutputFormat {
  fn new(output: &RawModelOutput, reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
      shapes: output.shapes(),
    }
  }

  pub fn reason(&self) -> &str {
    &self.reason
  }

  pub fn shapes(&self) -> &[Vec<usize>] {
    &self.shapes
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
  TwoTensor,
  ThreeTensor,
}

impl OutputLayout {
  pub fn detect(output: &RawModelOutput) -> Result<Self, UnrecognizedOutputFormat> {
    match output.len() {
      2 => Ok(OutputLayout::TwoTensor),
      3 => Ok(OutputLayout::ThreeTensor),
      n => Err(UnrecognizedOutputFormat::new(
        output,
        format!("期望 2 或 3 个输出张量, 实际为 {} 个", n),
      )),
    }
  }

  pub fn parse(self, output: &RawModelOutput) -> Result<NormalizedOutput, UnrecognizedOutputFormat> {
    match (self, output.tensors()) {
      (OutputLayout::TwoTensor, [boxes, scores]) => {
        parse_two_tensor(output, &boxes.tensor, &scores.tensor)
      }
      (OutputLayout::ThreeTensor, [labels, boxes, scores]) => {
        parse_three_tensor(output, &labels.tensor, &boxes.tensor, &scores.tensor)
      }
      (layout, tensors) => Err(UnrecognizedOutputFormat::new(
        output,
        format!("布局 {:?} 与输出数量 {} 不符", layout, tensors.len()),
      )),
    }
  }
}

/// 归一化后的逐检测数组，三个序列等长且按下标对齐
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedOutput {
  boxes: Vec<[f32; 4]>,
  labels: Vec<i64>,
  scores: Vec<f32>,
}

impl NormalizedOutput {
  /// 长度不一致时返回 None
  pub fn new(boxes: Vec<[f32; 4]>, labels: Vec<i64>, scores: Vec<f32>) -> Option<Self> {
    if boxes.len() == labels.len() && boxes.len() == scores.len() {
      Some(Self {
        boxes,
        labels,
        scores,
      })
    } else {
      None
    }
  }

  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  pub fn boxes(&self) -> &[[f32; 4]] {
    &self.boxes
  }

  pub fn labels(&self) -> &[i64] {
    &self.labels
  }

  pub fn scores(&self) -> &[f32] {
    &self.scores
  }

  /// 按下标依次给出 `(label, box, score)`
  pub fn iter(&self) -> impl Iterator<Item = (i64, [f32; 4], f32)> + '_ {
    self
      .labels
      .iter()
      .zip(self.boxes.iter())
      .zip(self.scores.iter())
      .map(|((&label, &bbox), &score)| (label, bbox, score))
  }
}

/// 识别输出布局并归一化为逐检测数组
pub fn normalize(output: &RawModelOutput) -> Result<NormalizedOutput, UnrecognizedOutputFormat> {
  debug!("模型输出数量: {}", output.len());
  for (idx, named) in output.tensors().iter().enumerate() {
    debug!("  输出 {} ({}): 形状 {:?}", idx, named.name, named.tensor.shape());
  }

  let layout = OutputLayout::detect(output).inspect_err(|e| error!("{}", e))?;
  debug!("模型输出布局: {:?}", layout);

  let normalized = layout.parse(output).inspect_err(|e| error!("{}", e))?;
  debug!("归一化得到 {} 条原始检测", normalized.len());
  Ok(normalized)
}

#[derive(Debug, Clone, Copy)]
enum Batch {
  Leading,
  Bare,
}

impl Batch {
  fn of_boxes(boxes: &Tensor) -> Option<Self> {
    match boxes.shape() {
      [1, _, _] => Some(Batch::Leading),
      [_, _] => Some(Batch::Bare),
      _ => None,
    }
  }

  fn strip<T: Clone>(self, array: ArrayD<T>) -> Option<ArrayD<T>> {
    match self {
      Batch::Bare => Some(array),
      Batch::Leading if array.shape().first() == Some(&1) => Some(array.index_axis_move(Axis(0), 0)),
      Batch::Leading => None,
    }
  }
}

fn parse_two_tensor(
  output: &RawModelOutput,
  boxes: &Tensor,
  scores: &Tensor,
) -> Result<NormalizedOutput, UnrecognizedOutputFormat> {
  let batch = batch_of(output, boxes)?;
  let boxes = box_rows(output, batch, boxes)?;
  let scores = batch
    .strip(scores.to_f32())
    .ok_or_else(|| UnrecognizedOutputFormat::new(output, "分数张量缺少批次维度"))?;

  let (labels, scores): (Vec<i64>, Vec<f32>) = match scores.ndim() {
    2 => {
      let scores = scores
        .into_dimensionality::<Ix2>()
        .map_err(|_| UnrecognizedOutputFormat::new(output, "分数张量维度错误"))?;
      if scores.ncols() == 0 {
        return Err(UnrecognizedOutputFormat::new(output, "分数张量类别数为 0"));
      }
      scores.outer_iter().map(|row| arg_max(row)).unzip()
    }
    1 => {
      // 单一置信度，类别使用哨兵值 0
      let scores: Vec<f32> = scores.iter().copied().collect();
      (vec![0; scores.len()], scores)
    }
    n => {
      return Err(UnrecognizedOutputFormat::new(
        output,
        format!("分数张量应为 [N] 或 [N, C], 实际为 {} 维", n),
      ));
    }
  };

  aligned(output, boxes, labels, scores)
}

fn parse_three_tensor(
  output: &RawModelOutput,
  labels: &Tensor,
  boxes: &Tensor,
  scores: &Tensor,
) -> Result<NormalizedOutput, UnrecognizedOutputFormat> {
  let batch = batch_of(output, boxes)?;
  let boxes = box_rows(output, batch, boxes)?;
  let labels = per_detection(output, batch, labels.to_i64(), "类别")?;
  let scores = per_detection(output, batch, scores.to_f32(), "分数")?;

  aligned(output, boxes, labels, scores)
}

fn batch_of(output: &RawModelOutput, boxes: &Tensor) -> Result<Batch, UnrecognizedOutputFormat> {
  Batch::of_boxes(boxes).ok_or_else(|| {
    UnrecognizedOutputFormat::new(output, "检测框张量应为 [1, N, 4] 或 [N, 4]")
  })
}

fn box_rows(
  output: &RawModelOutput,
  batch: Batch,
  boxes: &Tensor,
) -> Result<Vec<[f32; 4]>, UnrecognizedOutputFormat> {
  let boxes = batch
    .strip(boxes.to_f32())
    .and_then(|boxes| boxes.into_dimensionality::<Ix2>().ok())
    .filter(|boxes| boxes.ncols() == BOX_COORDS)
    .ok_or_else(|| UnrecognizedOutputFormat::new(output, "检测框张量应为 [N, 4]"))?;

  Ok(
    boxes
      .outer_iter()
      .map(|row| [row[0], row[1], row[2], row[3]])
      .collect(),
  )
}

fn per_detection<T: Copy>(
  output: &RawModelOutput,
  batch: Batch,
  array: ArrayD<T>,
  what: &str,
) -> Result<Vec<T>, UnrecognizedOutputFormat> {
  batch
    .strip(array)
    .and_then(|array| array.into_dimensionality::<Ix1>().ok())
    .map(|array| array.iter().copied().collect())
    .ok_or_else(|| UnrecognizedOutputFormat::new(output, format!("{}张量应为 [N]", what)))
}

fn aligned(
  output: &RawModelOutput,
  boxes: Vec<[f32; 4]>,
  labels: Vec<i64>,
  scores: Vec<f32>,
) -> Result<NormalizedOutput, UnrecognizedOutputFormat> {
  let (n_boxes, n_labels, n_scores) = (boxes.len(), labels.len(), scores.len());
  NormalizedOutput::new(boxes, labels, scores).ok_or_else(|| {
    UnrecognizedOutputFormat::new(
      output,
      format!(
        "检测数量不一致: 检测框 {}, 类别 {}, 分数 {}",
        n_boxes, n_labels, n_scores
      ),
    )
  })
}

/// 返回最大值所在下标及其值，并列时取第一个
fn arg_max(row: ArrayView1<f32>) -> (i64, f32) {
  let (idx, value) = row
    .iter()
    .enumerate()
    .fold((0, f32::NEG_INFINITY), |(max_idx, max_val), (i, &val)| {
      if val > max_val { (i, val) } else { (max_idx, max_val) }
    });
  (idx as i64, value)
}
