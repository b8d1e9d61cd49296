// 该文件是 Cheliu （车流） 项目的一部分。
// tests/pipeline.rs - 检测流水线集成测试
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

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use image::{DynamicImage, GrayImage, Rgb, RgbImage, imageops::FilterType};
use ndarray::{ArrayD, IxDyn};

use cheliu::{
  CaptureOutcome, DetectError, DetectOptions, DetectionPipeline, InferenceEngine, TrafficStats,
  frame::{IMAGES_INPUT, InferenceInputs, ORIG_TARGET_SIZES_INPUT, RawModelOutput, Tensor},
  input::{CaptureSession, FrameCapture},
  model::VehicleLabel,
  output::draw::{CAR_COLOR, MOTORCYCLE_COLOR},
  preprocess::Preprocessor,
};

#[derive(Debug, thiserror::Error)]
#[error("stub engine failure")]
struct StubEngineError;

struct StubEngine {
  outputs: Option<RawModelOutput>,
  calls: Arc<AtomicUsize>,
}

impl StubEngine {
  fn new(outputs: RawModelOutput) -> Self {
    Self {
      outputs: Some(outputs),
      calls: Arc::new(AtomicUsize::new(0)),
    }
  }

  fn failing() -> Self {
    Self {
      outputs: None,
      calls: Arc::new(AtomicUsize::new(0)),
    }
  }
}

impl InferenceEngine for StubEngine {
  type Error = StubEngineError;

  fn name(&self) -> &str {
    "stub"
  }

  fn infer(&self, inputs: &InferenceInputs) -> Result<RawModelOutput, Self::Error> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    assert_eq!(inputs.get(IMAGES_INPUT).unwrap().shape(), &[1, 3, 640, 640]);
    assert!(inputs.get(ORIG_TARGET_SIZES_INPUT).is_some());
    self.outputs.clone().ok_or(StubEngineError)
  }
}

struct StubCapture {
  frame: Option<DynamicImage>,
  loads: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("stub capture failure")]
struct StubCaptureError;

impl FrameCapture for StubCapture {
  type Error = StubCaptureError;

  fn load(&mut self) -> Result<(), Self::Error> {
    self.loads += 1;
    Ok(())
  }

  fn grab(&mut self) -> Option<DynamicImage> {
    self.frame.clone()
  }
}

fn f32_tensor(shape: &[usize], data: Vec<f32>) -> Tensor {
  Tensor::Float(ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
}

fn i64_tensor(shape: &[usize], data: Vec<i64>) -> Tensor {
  Tensor::Int(ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
}

fn three_tensor_output() -> RawModelOutput {
  RawModelOutput::new()
    .with("labels", i64_tensor(&[1, 3], vec![2, 1, 2]))
    .with(
      "boxes",
      f32_tensor(
        &[1, 3, 4],
        vec![
          64.0, 64.0, 128.0, 128.0, //
          0.0, 0.0, 640.0, 640.0, //
          10.0, 10.0, 20.0, 20.0,
        ],
      ),
    )
    .with("scores", f32_tensor(&[1, 3], vec![0.9, 0.95, 0.3]))
}

fn street(width: u32, height: u32) -> DynamicImage {
  DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 40, 40])))
}

#[test]
fn detects_and_rescales_three_tensor_output() {
  let pipeline = DetectionPipeline::new(StubEngine::new(three_tensor_output()));
  let report = pipeline
    .detect_image(&street(1280, 960), &DetectOptions::default())
    .unwrap();

  let detections = report.detections();
  assert_eq!(detections.len(), 2);
  assert_eq!(detections[0].class_name(), "car");
  assert_eq!(detections[0].bbox(), [128, 96, 256, 192]);
  assert_eq!(detections[0].confidence(), 0.9);
  assert_eq!(detections[1].class_name(), "motorcycle");
  assert_eq!(detections[1].bbox(), [0, 0, 1279, 959]);
  assert_eq!(report.image_size(), (1280, 960));
  assert!(report.annotated().is_none());
  assert_eq!(pipeline.engine_name(), "stub");
}

#[test]
fn sorts_when_requested() {
  let pipeline = DetectionPipeline::new(StubEngine::new(three_tensor_output()));
  let options = DetectOptions::default().with_sort_by_confidence(true);
  let report = pipeline.detect_image(&street(1280, 960), &options).unwrap();

  let names: Vec<_> = report.detections().iter().map(|d| d.class_name()).collect();
  assert_eq!(names, vec!["motorcycle", "car"]);
}

#[test]
fn two_tensor_per_class_scores_use_arg_max() {
  let outputs = RawModelOutput::new()
    .with(
      "boxes",
      f32_tensor(&[2, 4], vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.5, 0.9, 0.9]),
    )
    .with("scores", f32_tensor(&[2, 2], vec![0.2, 0.8, 0.7, 0.1]));
  let pipeline = DetectionPipeline::new(StubEngine::new(outputs));

  let report = pipeline
    .detect_image(&street(640, 640), &DetectOptions::default())
    .unwrap();
  let detections = report.detections();
  assert_eq!(detections.len(), 2);
  assert_eq!(detections[0].class_name(), "car");
  assert_eq!(detections[0].confidence(), 0.8);
  assert_eq!(detections[0].bbox(), [64, 128, 192, 256]);
  assert_eq!(detections[1].class_name(), "motorcycle");
  assert_eq!(detections[1].confidence(), 0.7);
}

#[test]
fn unrecognized_output_is_an_error_not_an_empty_result() {
  let outputs: RawModelOutput = (0..5)
    .map(|i| (format!("out{}", i), f32_tensor(&[1, 4], vec![0.0; 4])))
    .collect();
  let pipeline = DetectionPipeline::new(StubEngine::new(outputs));

  let result = pipeline.detect_image(&street(640, 480), &DetectOptions::default());
  assert!(matches!(result, Err(DetectError::UnrecognizedOutputFormat(_))));
  assert_eq!(pipeline.stats().snapshot().batches, 0);
}

#[test]
fn invalid_threshold_is_rejected_before_inference() {
  let engine = StubEngine::new(three_tensor_output());
  let calls = Arc::clone(&engine.calls);
  let pipeline = DetectionPipeline::new(engine);

  for confidence in [-0.1, 1.5, f32::NAN] {
    let result = pipeline.detect_image_with_confidence(&street(640, 480), confidence);
    assert!(matches!(result, Err(DetectError::Config(_))));
  }
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  assert!(
    pipeline
      .detect_image_with_confidence(&street(640, 480), 0.5)
      .is_ok()
  );
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn malformed_image_is_rejected_before_inference() {
  let engine = StubEngine::new(three_tensor_output());
  let calls = Arc::clone(&engine.calls);
  let pipeline = DetectionPipeline::new(engine);

  let gray = DynamicImage::ImageLuma8(GrayImage::new(32, 32));
  let result = pipeline.detect_image(&gray, &DetectOptions::default());
  assert!(matches!(result, Err(DetectError::Input(_))));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn engine_failure_is_reported() {
  let pipeline = DetectionPipeline::new(StubEngine::failing());
  let result = pipeline.detect_image(&street(64, 64), &DetectOptions::default());
  assert!(matches!(result, Err(DetectError::Inference(_))));
}

#[test]
fn annotation_is_drawn_on_a_copy() {
  let pipeline = DetectionPipeline::new(StubEngine::new(three_tensor_output()));
  let image = street(1280, 960);
  let options = DetectOptions::default().with_annotation(true);

  let report = pipeline.detect_image(&image, &options).unwrap();
  let annotated = report.annotated().unwrap();
  assert_eq!(*annotated.get_pixel(128, 96), CAR_COLOR);
  assert_eq!(*annotated.get_pixel(0, 500), MOTORCYCLE_COLOR);
  assert_eq!(image, street(1280, 960));
}

#[test]
fn stats_accumulate_across_batches() {
  let stats = Arc::new(TrafficStats::new());
  let pipeline =
    DetectionPipeline::new(StubEngine::new(three_tensor_output())).with_stats(Arc::clone(&stats));

  for _ in 0..3 {
    pipeline
      .detect_image(&street(1280, 960), &DetectOptions::default())
      .unwrap();
  }

  let snapshot = stats.snapshot();
  assert_eq!(snapshot.batches, 3);
  assert_eq!(snapshot.traffic_stats.get("car"), Some(&3));
  assert_eq!(snapshot.traffic_stats.get("motorcycle"), Some(&3));
}

#[test]
fn capture_failure_is_distinct_from_empty_frame() {
  let pipeline = DetectionPipeline::new(StubEngine::new(three_tensor_output()));

  let mut missing = CaptureSession::new(StubCapture {
    frame: None,
    loads: 0,
  });
  let outcome = pipeline
    .detect_capture(&mut missing, &DetectOptions::default(), false)
    .unwrap();
  assert!(matches!(outcome, CaptureOutcome::Failed));

  let empty = RawModelOutput::new()
    .with("boxes", f32_tensor(&[1, 0, 4], vec![]))
    .with("scores", f32_tensor(&[1, 0], vec![]));
  let pipeline = DetectionPipeline::new(StubEngine::new(empty));
  let mut session = CaptureSession::new(StubCapture {
    frame: Some(street(1920, 1080)),
    loads: 0,
  });
  match pipeline
    .detect_capture(&mut session, &DetectOptions::default(), false)
    .unwrap()
  {
    CaptureOutcome::Inspected(report) => {
      assert_eq!(report.total_count(), 0);
      assert_eq!(report.avg_confidence(), 0.0);
    }
    CaptureOutcome::Failed => panic!("frame was available"),
  }
}

#[test]
fn capture_counts_vehicles_in_stretched_frame() {
  let pipeline = DetectionPipeline::new(StubEngine::new(three_tensor_output()));
  let mut session = CaptureSession::new(StubCapture {
    frame: Some(street(1920, 1080)),
    loads: 0,
  });

  let options = DetectOptions::default();
  pipeline.detect_capture(&mut session, &options, false).unwrap();
  let outcome = pipeline.detect_capture(&mut session, &options, true).unwrap();

  let CaptureOutcome::Inspected(report) = outcome else {
    panic!("frame was available");
  };
  assert_eq!(report.car_count(), 1);
  assert_eq!(report.motorcycle_count(), 1);
  assert_eq!(report.total_count(), 2);
  assert!((report.avg_confidence() - 0.925).abs() < 1e-6);
  assert_eq!(session.into_inner().loads, 2);
}

#[test]
fn custom_preprocessor_is_used_for_both_paths() {
  let pipeline = DetectionPipeline::new(StubEngine::new(three_tensor_output()))
    .with_preprocessor(Preprocessor::default().with_filter(FilterType::Nearest));

  let report = pipeline
    .detect_image(&street(1280, 960), &DetectOptions::default())
    .unwrap();
  assert_eq!(report.detections()[0].bbox(), [128, 96, 256, 192]);

  let mut session = CaptureSession::new(StubCapture {
    frame: Some(street(1920, 1080)),
    loads: 0,
  });
  let outcome = pipeline
    .detect_capture(&mut session, &DetectOptions::default(), false)
    .unwrap();
  assert!(matches!(outcome, CaptureOutcome::Inspected(ref r) if r.total_count() == 2));
}

#[test]
fn reported_classes_are_known() {
  let pipeline = DetectionPipeline::new(StubEngine::new(three_tensor_output()));
  let report = pipeline
    .detect_image(&street(1280, 960), &DetectOptions::default())
    .unwrap();
  let known = VehicleLabel::known_classes();
  assert!(
    report
      .detections()
      .iter()
      .all(|d| known.contains(&d.class_name()))
  );
}
