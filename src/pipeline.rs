// 该文件是 Cheliu （车流） 项目的一部分。
// src/pipeline.rs - 检测流水线
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

//! 预处理 → 推理 → 输出整理 → 过滤与坐标还原 → 标注 → 统计。

use std::{sync::Arc, time::Instant};

use image::{DynamicImage, RgbImage, imageops::FilterType};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::{ConfidenceThreshold, ConfigError, DetectOptions},
  input::{CaptureSession, FrameCapture},
  model::{
    Detection, DetectionFilter, InferenceEngine, UnrecognizedOutputFormat,
    label::{CAR, MOTORCYCLE},
    normalize,
  },
  output::Annotator,
  preprocess::{InputError, Preprocessor},
  stats::TrafficStats,
};

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("输入图像错误: {0}")]
  Input(#[from] InputError),
  #[error("无法识别的模型输出: {0}")]
  UnrecognizedOutputFormat(#[from] UnrecognizedOutputFormat),
  #[error("推理错误: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 单张图像的检测结果
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
  detections: Vec<Detection>,
  #[serde(skip)]
  annotated: Option<RgbImage>,
  image_width: u32,
  image_height: u32,
  threshold: ConfidenceThreshold,
}

impl DetectionReport {
  pub fn new(
    detections: Vec<Detection>,
    annotated: Option<RgbImage>,
    image_width: u32,
    image_height: u32,
    threshold: ConfidenceThreshold,
  ) -> Self {
    Self {
      detections,
      annotated,
      image_width,
      image_height,
      threshold,
    }
  }

  pub fn detections(&self) -> &[Detection] {
    &self.detections
  }

  pub fn annotated(&self) -> Option<&RgbImage> {
    self.annotated.as_ref()
  }

  pub fn image_size(&self) -> (u32, u32) {
    (self.image_width, self.image_height)
  }

  pub fn threshold(&self) -> ConfidenceThreshold {
    self.threshold
  }

  pub fn count(&self, class_name: &str) -> usize {
    self
      .detections
      .iter()
      .filter(|d| d.class_name() == class_name)
      .count()
  }
}

/// 一次截图检测的汇总
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
  car_count: usize,
  motorcycle_count: usize,
  total_count: usize,
  avg_confidence: f32,
  threshold: ConfidenceThreshold,
  timestamp: f64, // Unix 时间戳，秒
  #[serde(skip)]
  annotated: Option<RgbImage>,
}

impl CaptureReport {
  fn from_report(report: DetectionReport) -> Self {
    let car_count = report.count(CAR);
    let motorcycle_count = report.count(MOTORCYCLE);
    let detections = report.detections();
    let avg_confidence = if detections.is_empty() {
      0.0
    } else {
      detections.iter().map(Detection::confidence).sum::<f32>() / detections.len() as f32
    };

    Self {
      car_count,
      motorcycle_count,
      total_count: car_count + motorcycle_count,
      avg_confidence,
      threshold: report.threshold,
      timestamp: chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0,
      annotated: report.annotated,
    }
  }

  pub fn car_count(&self) -> usize {
    self.car_count
  }

  pub fn motorcycle_count(&self) -> usize {
    self.motorcycle_count
  }

  pub fn total_count(&self) -> usize {
    self.total_count
  }

  pub fn avg_confidence(&self) -> f32 {
    self.avg_confidence
  }

  pub fn threshold(&self) -> ConfidenceThreshold {
    self.threshold
  }

  pub fn timestamp(&self) -> f64 {
    self.timestamp
  }

  pub fn annotated(&self) -> Option<&RgbImage> {
    self.annotated.as_ref()
  }
}

/// 截图失败与“画面中没有车辆”是两种不同的结果
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
  Failed,
  Inspected(CaptureReport),
}

pub struct DetectionPipeline<E> {
  engine: E,
  preprocessor: Preprocessor,
  annotator: Annotator,
  stats: Arc<TrafficStats>,
}

impl<E: InferenceEngine> DetectionPipeline<E> {
  pub fn new(engine: E) -> Self {
    Self {
      engine,
      preprocessor: Preprocessor::default(),
      annotator: Annotator::default(),
      stats: Arc::new(TrafficStats::new()),
    }
  }

  pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
    self.preprocessor = preprocessor;
    self
  }

  pub fn with_annotator(mut self, annotator: Annotator) -> Self {
    self.annotator = annotator;
    self
  }

  pub fn with_stats(mut self, stats: Arc<TrafficStats>) -> Self {
    self.stats = stats;
    self
  }

  pub fn stats(&self) -> &Arc<TrafficStats> {
    &self.stats
  }

  pub fn engine_name(&self) -> &str {
    self.engine.name()
  }

  /// 阈值在任何推理工作之前校验
  pub fn detect_image_with_confidence(
    &self,
    image: &DynamicImage,
    confidence: f32,
  ) -> Result<DetectionReport, DetectError> {
    let options = DetectOptions::new(confidence)?;
    self.detect_image(image, &options)
  }

  pub fn detect_image(
    &self,
    image: &DynamicImage,
    options: &DetectOptions,
  ) -> Result<DetectionReport, DetectError> {
    let start = Instant::now();
    let frame = self.preprocessor.preprocess(image)?;

    let raw = self
      .engine
      .infer(&frame.inputs())
      .map_err(|e| DetectError::Inference(Box::new(e)))?;
    let infer_elapsed = start.elapsed();

    let output = normalize(&raw)?;
    let detections = DetectionFilter::new(options.threshold())
      .sort_by_confidence(options.sort_by_confidence())
      .apply(&output, &frame.scale());

    let annotated = options
      .annotate()
      .then(|| self.annotator.annotate(&image.to_rgb8(), &detections));

    self.stats.record(&detections);

    info!(
      "检测完成: 原始输出 {} 个, 保留 {} 个 (阈值 {}), 推理耗时 {:.2?}, 总耗时 {:.2?}",
      output.len(),
      detections.len(),
      options.threshold().value(),
      infer_elapsed,
      start.elapsed()
    );

    Ok(DetectionReport::new(
      detections,
      annotated,
      image.width(),
      image.height(),
      options.threshold(),
    ))
  }

  /// 截取画面并检测
  ///
  /// 画面先被直接拉伸到模型输入尺寸，返回的坐标位于拉伸后的画面中。
  pub fn detect_capture<C: FrameCapture>(
    &self,
    session: &mut CaptureSession<C>,
    options: &DetectOptions,
    force_reload: bool,
  ) -> Result<CaptureOutcome, DetectError> {
    let Some(frame) = session.capture(force_reload) else {
      return Ok(CaptureOutcome::Failed);
    };

    debug!("原始截图尺寸: {}x{}", frame.width(), frame.height());
    let (width, height) = self.preprocessor.input_size();
    let frame = frame.resize_exact(width, height, FilterType::Lanczos3);

    let report = self.detect_image(&frame, options)?;
    let report = CaptureReport::from_report(report);
    info!(
      "截图检测: 汽车 {} 辆, 机车 {} 辆, 平均置信度 {:.2}",
      report.car_count, report.motorcycle_count, report.avg_confidence
    );
    Ok(CaptureOutcome::Inspected(report))
  }
}
