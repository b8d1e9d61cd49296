// 该文件是 Cheliu （车流） 项目的一部分。
// src/input/read_image_file.rs - 图像文件画面来源
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

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::FrameCapture};

#[derive(Error, Debug)]
pub enum ImageFileCaptureError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Path decoding error: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 从图像文件读取画面，每次加载都会重新读取文件
pub struct ImageFileCapture {
  path: PathBuf,
  image: Option<DynamicImage>,
}

impl FromUrlWithScheme for ImageFileCapture {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileCapture {
  type Error = ImageFileCaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileCaptureError::SchemaMismatch);
    }

    Ok(Self::new(crate::url_file_path(url)?))
  }
}

impl ImageFileCapture {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      image: None,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl FrameCapture for ImageFileCapture {
  type Error = ImageFileCaptureError;

  fn load(&mut self) -> Result<(), Self::Error> {
    self.image = None;
    let image = ImageReader::open(&self.path)?.decode()?;
    info!(
      "读取图像文件: {} ({}x{})",
      self.path.display(),
      image.width(),
      image.height()
    );
    self.image = Some(image);
    Ok(())
  }

  fn grab(&mut self) -> Option<DynamicImage> {
    self.image.clone()
  }
}
