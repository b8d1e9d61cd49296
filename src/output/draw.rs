// 该文件是 Cheliu （车流） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

#[cfg(feature = "label_font")]
use std::path::Path;

#[cfg(feature = "label_font")]
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
#[cfg(feature = "label_font")]
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use thiserror::Error;
#[cfg(feature = "label_font")]
use tracing::debug;
use tracing::warn;

use crate::model::{
  Detection,
  label::{CAR, MOTORCYCLE},
};

// 文本渲染常量
#[cfg(feature = "label_font")]
const LABEL_FONT_SIZE: f32 = 20.0;
#[cfg(feature = "label_font")]
const LABEL_TEXT_HEIGHT: i32 = 24;
#[cfg(feature = "label_font")]
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
#[cfg(feature = "label_font")]
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

pub const CAR_COLOR: Rgb<u8> = Rgb([255, 0, 0]); // 红色
pub const MOTORCYCLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]); // 绿色
pub const OTHER_COLOR: Rgb<u8> = Rgb([255, 255, 0]); // 黄色

#[derive(Error, Debug)]
pub enum AnnotateError {
  #[error("图像尺寸为空: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("检测框 {bbox:?} 超出图像范围 {width}x{height}")]
  OutOfBounds {
    bbox: [i32; 4],
    width: u32,
    height: u32,
  },
  #[cfg(feature = "label_font")]
  #[error("字体文件读取错误: {0}")]
  FontIo(#[from] std::io::Error),
  #[cfg(feature = "label_font")]
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 边框颜色只由类别名称决定
pub fn class_color(class_name: &str) -> Rgb<u8> {
  match class_name {
    CAR => CAR_COLOR,
    MOTORCYCLE => MOTORCYCLE_COLOR,
    _ => OTHER_COLOR,
  }
}

/// 在图像副本上绘制检测框
///
/// 配置字体后（`label_font` 特性）会在框上方绘制 `类别 置信度` 标签，否则只绘制边框。
#[derive(Clone, Default)]
pub struct Annotator {
  #[cfg(feature = "label_font")]
  font: Option<FontArc>,
}

impl Annotator {
  #[cfg(feature = "label_font")]
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  #[cfg(feature = "label_font")]
  pub fn with_font_file(self, path: &Path) -> Result<Self, AnnotateError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    debug!("加载标签字体: {}", path.display());
    Ok(self.with_font(font))
  }

  /// 绘制失败时记录警告并返回原始图像
  pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
    match self.try_annotate(image, detections) {
      Ok(annotated) => annotated,
      Err(e) => {
        warn!("绘制检测结果失败, 返回原始图像: {}", e);
        image.clone()
      }
    }
  }

  pub fn try_annotate(
    &self,
    image: &RgbImage,
    detections: &[Detection],
  ) -> Result<RgbImage, AnnotateError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(AnnotateError::EmptyImage(width, height));
    }

    // 先整体校验，避免只绘制了一部分
    for detection in detections {
      let [x1, y1, x2, y2] = detection.bbox();
      let inside = x1 >= 0
        && y1 >= 0
        && x1 < x2
        && y1 < y2
        && (x2 as u32) < width
        && (y2 as u32) < height;
      if !inside {
        return Err(AnnotateError::OutOfBounds {
          bbox: detection.bbox(),
          width,
          height,
        });
      }
    }

    let mut canvas = image.clone();
    for detection in detections {
      let color = class_color(detection.class_name());
      draw_bbox(&mut canvas, detection.bbox(), color);
      #[cfg(feature = "label_font")]
      if let Some(font) = &self.font {
        draw_label(&mut canvas, detection, color, font);
      }
    }
    Ok(canvas)
  }
}

fn draw_bbox(image: &mut RgbImage, bbox: [i32; 4], color: Rgb<u8>) {
  let [x_min, y_min, x_max, y_max] = bbox;

  for thickness in 0..BOX_THICKNESS {
    let x_min_t = (x_min + thickness).min(x_max);
    let y_min_t = (y_min + thickness).min(y_max);
    let x_max_t = (x_max - thickness).max(x_min);
    let y_max_t = (y_max - thickness).max(y_min);

    for x in x_min_t..=x_max_t {
      image.put_pixel(x as u32, y_min_t as u32, color);
      image.put_pixel(x as u32, y_max_t as u32, color);
    }
    for y in y_min_t..=y_max_t {
      image.put_pixel(x_min_t as u32, y as u32, color);
      image.put_pixel(x_max_t as u32, y as u32, color);
    }
  }
}

#[cfg(feature = "label_font")]
fn draw_label(image: &mut RgbImage, detection: &Detection, color: Rgb<u8>, font: &FontArc) {
  let [x_min, y_min, _, _] = detection.bbox();
  let label = format!("{} {:.2}", detection.class_name(), detection.confidence());

  let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;
  let label_x = x_min;
  let label_y = (y_min - LABEL_TEXT_HEIGHT).max(0);

  let max_width = (image.width() as i32 - label_x).max(0);
  let label_width = text_width.min(max_width) as u32;
  if label_width == 0 {
    return;
  }

  let rect =
    imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, LABEL_TEXT_HEIGHT as u32);
  draw_filled_rect_mut(image, rect, color);
  draw_text_mut(
    image,
    Rgb([0u8, 0u8, 0u8]),
    label_x,
    label_y + LABEL_TEXT_VERTICAL_PADDING,
    PxScale::from(LABEL_FONT_SIZE),
    font,
    &label,
  );
}
