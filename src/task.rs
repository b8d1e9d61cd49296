// 该文件是 Cheliu （车流） 项目的一部分。
// src/task.rs - 检测任务
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

use std::{thread, time::Duration};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  config::DetectOptions,
  input::{CaptureSession, FrameCapture},
  model::InferenceEngine,
  output::Render,
  pipeline::{CaptureOutcome, CaptureReport, DetectionPipeline, DetectionReport},
};

pub trait Task<C, E, O>: Sized {
  type Error;
  fn run_task(
    self,
    session: &mut CaptureSession<C>,
    pipeline: &DetectionPipeline<E>,
    output: O,
  ) -> Result<(), Self::Error>;
}

/// 截取一帧，检测并输出
#[derive(Debug, Default)]
pub struct OneShotTask {
  options: DetectOptions,
}

impl OneShotTask {
  pub fn new(options: DetectOptions) -> Self {
    Self { options }
  }
}

impl<
  C: FrameCapture,
  E: InferenceEngine,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<DetectionReport, Error = RE>,
> Task<C, E, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    session: &mut CaptureSession<C>,
    pipeline: &DetectionPipeline<E>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = session
      .capture(false)
      .ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始检测...");
    let now = std::time::Instant::now();
    let report = pipeline.detect_image(&frame, &self.options)?;
    info!("检测完成，耗时: {:.2?}", now.elapsed());

    println!("{}", serde_json::to_string(&report)?);
    output.render_result(&report)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 周期性截图检测，直到收到中断信号或达到指定帧数
#[derive(Debug)]
pub struct ContinuousTask {
  options: DetectOptions,
  frame_number: Option<usize>,
  interval: Duration,
  reload: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      options: DetectOptions::default(),
      frame_number: None,
      interval: Duration::from_secs(1),
      reload: false,
    }
  }
}

impl ContinuousTask {
  pub fn new(options: DetectOptions) -> Self {
    Self {
      options,
      ..Default::default()
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  /// 每一帧都重新加载画面来源
  pub fn with_reload(mut self, reload: bool) -> Self {
    self.reload = reload;
    self
  }
}

impl<
  C: FrameCapture,
  E: InferenceEngine,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<CaptureReport, Error = RE>,
> Task<C, E, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    session: &mut CaptureSession<C>,
    pipeline: &DetectionPipeline<E>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("设置 Ctrl-C 处理函数失败")?;

    let mut frame_index = 0usize;
    loop {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧画面", frame_index);
      let now = std::time::Instant::now();
      match pipeline.detect_capture(session, &self.options, self.reload)? {
        CaptureOutcome::Failed => warn!("第 {} 帧截图失败", frame_index),
        CaptureOutcome::Inspected(report) => {
          println!("{}", serde_json::to_string(&report)?);
          output.render_result(&report)?;
          info!("检测完成，耗时: {:.2?}", now.elapsed());
        }
      }

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.recv_timeout(self.interval).is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，退出");
    Ok(())
  }
}
