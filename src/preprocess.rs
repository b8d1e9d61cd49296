// 该文件是 Cheliu （车流） 项目的一部分。
// src/preprocess.rs - 图像预处理
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

use image::{ColorType, DynamicImage, GenericImageView, imageops::FilterType};
use ndarray::{Array2, Array4};
use thiserror::Error;
use tracing::debug;

use crate::frame::{IMAGES_INPUT, InferenceInputs, ORIG_TARGET_SIZES_INPUT};

pub const MODEL_INPUT_WIDTH: u32 = 640;
pub const MODEL_INPUT_HEIGHT: u32 = 640;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
  #[error("图像尺寸为空: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("图像通道数不正确: 期望彩色图像, 实际为 {channels} 通道 ({color:?})")]
  UnsupportedColor { color: ColorType, channels: u8 },
}

/// 推理坐标系到原始图像坐标系的映射
///
/// 预处理直接拉伸到模型输入尺寸，不保持宽高比，因此 X 与 Y 方向使用各自独立的缩放系数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleContext {
  original_height: u32,
  original_width: u32,
  scale_x: f32,
  scale_y: f32,
}

impl ScaleContext {
  pub fn new(original_width: u32, original_height: u32, input_width: u32, input_height: u32) -> Self {
    Self {
      original_height,
      original_width,
      scale_x: original_width as f32 / input_width as f32,
      scale_y: original_height as f32 / input_height as f32,
    }
  }

  /// 以默认 640x640 模型输入尺寸构造
  pub fn for_model_input(original_width: u32, original_height: u32) -> Self {
    Self::new(
      original_width,
      original_height,
      MODEL_INPUT_WIDTH,
      MODEL_INPUT_HEIGHT,
    )
  }

  pub fn original_height(&self) -> u32 {
    self.original_height
  }

  pub fn original_width(&self) -> u32 {
    self.original_width
  }

  pub fn scale_x(&self) -> f32 {
    self.scale_x
  }

  pub fn scale_y(&self) -> f32 {
    self.scale_y
  }
}

/// 预处理结果：NCHW 张量与坐标映射
#[derive(Debug, Clone)]
pub struct PreprocessedFrame {
  tensor: Array4<f32>,
  scale: ScaleContext,
}

impl PreprocessedFrame {
  pub fn tensor(&self) -> &Array4<f32> {
    &self.tensor
  }

  pub fn scale(&self) -> ScaleContext {
    self.scale
  }

  /// 构造推理引擎输入：`images` 与 `orig_target_sizes`
  pub fn inputs(&self) -> InferenceInputs {
    let sizes = Array2::from_shape_fn((1, 2), |(_, i)| match i {
      0 => self.scale.original_height as i64,
      _ => self.scale.original_width as i64,
    });
    InferenceInputs::new()
      .with(IMAGES_INPUT, self.tensor.clone().into_dyn())
      .with(ORIG_TARGET_SIZES_INPUT, sizes.into_dyn())
  }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
  width: u32,
  height: u32,
  filter: FilterType,
}

impl Default for Preprocessor {
  fn default() -> Self {
    Self {
      width: MODEL_INPUT_WIDTH,
      height: MODEL_INPUT_HEIGHT,
      filter: FilterType::Triangle,
    }
  }
}

impl Preprocessor {
  pub fn with_filter(mut self, filter: FilterType) -> Self {
    self.filter = filter;
    self
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn preprocess(&self, image: &DynamicImage) -> Result<PreprocessedFrame, InputError> {
    let (orig_width, orig_height) = image.dimensions();
    if orig_width == 0 || orig_height == 0 {
      return Err(InputError::EmptyImage {
        width: orig_width,
        height: orig_height,
      });
    }

    let color = image.color();
    if !color.has_color() {
      return Err(InputError::UnsupportedColor {
        color,
        channels: color.channel_count(),
      });
    }

    debug!(
      "预处理图像: {}x{} -> {}x{}",
      orig_width, orig_height, self.width, self.height
    );

    // 透明通道直接丢弃
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, self.width, self.height, self.filter);

    let tensor = Array4::from_shape_fn(
      (1, RGB_CHANNELS, self.height as usize, self.width as usize),
      |(_, c, y, x)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
    );

    Ok(PreprocessedFrame {
      tensor,
      scale: ScaleContext::new(orig_width, orig_height, self.width, self.height),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Tensor;
  use image::{GrayImage, Rgb, RgbImage, RgbaImage};

  #[test]
  fn stretches_to_model_input_in_chw_layout() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(1280, 960, Rgb([255, 0, 51])));
    let frame = Preprocessor::default().preprocess(&image).unwrap();

    assert_eq!(frame.tensor().shape(), &[1, 3, 640, 640]);
    assert!((frame.tensor()[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
    assert_eq!(frame.tensor()[[0, 1, 320, 320]], 0.0);
    assert!((frame.tensor()[[0, 2, 639, 639]] - 0.2).abs() < 1e-6);
    assert!(frame.tensor().iter().all(|v| (0.0..=1.0).contains(v)));

    let scale = frame.scale();
    assert_eq!(scale.original_width(), 1280);
    assert_eq!(scale.original_height(), 960);
    assert_eq!(scale.scale_x(), 2.0);
    assert_eq!(scale.scale_y(), 1.5);
  }

  #[test]
  fn nearest_filter_does_not_blend_pixels() {
    let mut source = RgbImage::new(2, 1);
    source.put_pixel(1, 0, Rgb([255, 255, 255]));
    let image = DynamicImage::ImageRgb8(source);

    let preprocessor = Preprocessor::default().with_filter(FilterType::Nearest);
    assert_eq!(preprocessor.input_size(), (640, 640));

    let frame = preprocessor.preprocess(&image).unwrap();
    assert!(frame.tensor().iter().all(|&v| v == 0.0 || v == 1.0));
    assert!(frame.tensor().iter().any(|&v| v == 1.0));
  }

  #[test]
  fn alpha_channel_is_dropped() {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 16, image::Rgba([0, 255, 0, 7])));
    let frame = Preprocessor::default().preprocess(&image).unwrap();
    assert_eq!(frame.tensor().shape(), &[1, 3, 640, 640]);
    assert!((frame.tensor()[[0, 1, 0, 0]] - 1.0).abs() < 1e-6);
  }

  #[test]
  fn rejects_grayscale_images() {
    let image = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
    let err = Preprocessor::default().preprocess(&image).unwrap_err();
    assert!(matches!(err, InputError::UnsupportedColor { channels: 1, .. }));
  }

  #[test]
  fn rejects_empty_images() {
    let image = DynamicImage::ImageRgb8(RgbImage::new(0, 12));
    let err = Preprocessor::default().preprocess(&image).unwrap_err();
    assert_eq!(err, InputError::EmptyImage { width: 0, height: 12 });
  }

  #[test]
  fn inputs_carry_original_size() {
    let image = DynamicImage::ImageRgb8(RgbImage::new(300, 200));
    let inputs = Preprocessor::default().preprocess(&image).unwrap().inputs();

    assert_eq!(inputs.get(IMAGES_INPUT).map(Tensor::shape), Some(&[1usize, 3, 640, 640][..]));
    match inputs.get(ORIG_TARGET_SIZES_INPUT) {
      Some(Tensor::Int(sizes)) => {
        assert_eq!(sizes.iter().copied().collect::<Vec<_>>(), vec![200, 300]);
      }
      other => panic!("unexpected orig_target_sizes: {:?}", other.map(Tensor::shape)),
    }
  }
}
