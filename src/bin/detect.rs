// 该文件是 Cheliu （车流） 项目的一部分。
// src/bin/detect.rs - 车流检测命令行程序
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

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use cheliu::{
  DetectOptions, DetectionPipeline, FromUrl,
  input::{CaptureSession, ImageFileCapture},
  model::{ReplayEngine, VehicleLabel},
  output::{Annotator, SaveImageFileOutput},
  task::{ContinuousTask, OneShotTask, Task},
};

/// Cheliu 车流检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理引擎，例如 replay:///path/to/outputs.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 画面来源，例如 image:///path/to/frame.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 标注图像输出路径，例如 image:///path/to/out.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 置信度阈值，取值 [0, 1]
  #[arg(long, default_value_t = 0.5)]
  pub confidence: f32,
  /// 按置信度降序输出检测结果
  #[arg(long)]
  pub sort: bool,
  /// 标签字体文件（TTF/OTF），不指定时只绘制边框
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 每次截图都重新加载画面来源
  #[arg(long)]
  pub reload: bool,
  /// 持续截图检测，直到 Ctrl-C
  #[arg(long)]
  pub continuous: bool,
  /// 持续模式下处理的最大帧数
  #[arg(long)]
  pub frame_number: Option<usize>,
  /// 持续模式下两次截图的间隔（毫秒）
  #[arg(long, default_value_t = 1000)]
  pub interval_ms: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理引擎: {}", args.model);
  info!("画面来源: {}", args.input);
  info!("置信度阈值: {}", args.confidence);

  // 阈值不合法时在加载任何组件之前退出
  let options = DetectOptions::new(args.confidence)?
    .with_sort_by_confidence(args.sort)
    .with_annotation(args.output.is_some());

  let annotator = match &args.font {
    Some(path) => Annotator::default().with_font_file(path)?,
    None => Annotator::default(),
  };

  let engine = ReplayEngine::from_url(&args.model)?;
  let pipeline = DetectionPipeline::new(engine).with_annotator(annotator);
  info!("模型类型: {}", pipeline.engine_name());
  info!("支持的类别: {:?}", VehicleLabel::known_classes());

  let mut session = CaptureSession::new(ImageFileCapture::from_url(&args.input)?);
  let output = args
    .output
    .as_ref()
    .map(SaveImageFileOutput::from_url)
    .transpose()?;

  if args.continuous {
    ContinuousTask::new(options)
      .with_frame_number(args.frame_number)
      .with_interval(Duration::from_millis(args.interval_ms))
      .with_reload(args.reload)
      .run_task(&mut session, &pipeline, output)?;
  } else {
    OneShotTask::new(options).run_task(&mut session, &pipeline, output)?;
  }

  info!(
    "累计统计: {}",
    serde_json::to_string(&pipeline.stats().snapshot())?
  );

  Ok(())
}
