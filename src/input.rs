// 该文件是 Cheliu （车流） 项目的一部分。
// src/input.rs - 画面截取
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

use image::DynamicImage;
use tracing::{debug, error, warn};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileCapture, ImageFileCaptureError};

/// 外部画面来源，例如监视器网页截图
pub trait FrameCapture {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 打开或重新打开画面来源
  fn load(&mut self) -> Result<(), Self::Error>;

  /// 截取当前画面，没有可用画面时返回 None
  fn grab(&mut self) -> Option<DynamicImage>;
}

/// 截图会话，持有画面来源及其“已加载”状态
///
/// 新建的会话处于未加载状态，第一次截图时加载；`force_reload` 或 [`CaptureSession::reset`]
/// 之后会重新加载。加载失败时会话回到未加载状态。
pub struct CaptureSession<C> {
  capture: C,
  loaded: bool,
}

impl<C: FrameCapture> CaptureSession<C> {
  pub fn new(capture: C) -> Self {
    Self {
      capture,
      loaded: false,
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.loaded
  }

  pub fn reset(&mut self) {
    self.loaded = false;
  }

  pub fn capture(&mut self, force_reload: bool) -> Option<DynamicImage> {
    if force_reload || !self.loaded {
      debug!("加载画面来源 (强制重新加载: {})", force_reload);
      if let Err(e) = self.capture.load() {
        error!("画面来源加载失败: {}", e);
        self.loaded = false;
        return None;
      }
      self.loaded = true;
    }

    let frame = self.capture.grab();
    if frame.is_none() {
      warn!("画面截取失败: 没有可用画面");
    }
    frame
  }

  pub fn into_inner(self) -> C {
    self.capture
  }
}
