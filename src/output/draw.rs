// 该文件是 Tianjing （天镜） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};

use crate::postprocess::Detection;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: u32 = 2;

const PALETTE: [[u8; 3]; 8] = [
  [255, 56, 56],
  [72, 249, 10],
  [0, 194, 255],
  [255, 157, 151],
  [146, 204, 23],
  [132, 56, 255],
  [255, 178, 29],
  [0, 24, 236],
];

/// 同一标签总是得到同一种颜色
pub fn label_color(label: &str) -> [u8; 3] {
  let hash = label
    .bytes()
    .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
  PALETTE[hash % PALETTE.len()]
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new()
  }
}

impl Draw {
  /// 仅绘制边框，不绘制标签文本
  pub fn new() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
    }
  }

  /// 从 TrueType 字体文件加载标签字体
  pub fn with_font_file(path: &Path) -> std::io::Result<Self> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(Self {
      font: Some(font),
      font_size: LABEL_FONT_SIZE,
    })
  }

  pub fn font_size(mut self, size: f32) -> Self {
    self.font_size = size;
    self
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
      return;
    }

    let [x0, y0, x1, y1] = detection.bbox;
    let x_min = x0.min(w - 1);
    let y_min = y0.min(h - 1);
    let x_max = x1.min(w - 1);
    let y_max = y1.min(h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Rgb(label_color(&detection.label));

    // 边框向内加粗
    for t in 0..BOX_THICKNESS {
      if x_min + t >= x_max.saturating_sub(t) || y_min + t >= y_max.saturating_sub(t) {
        break;
      }
      let rect = Rect::at((x_min + t) as i32, (y_min + t) as i32)
        .of_size(x_max - x_min - 2 * t + 1, y_max - y_min - 2 * t + 1);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", detection.label, detection.confidence);
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, font, &label);
    let tag_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签放在边框上方，空间不足时贴着图像顶部
    let label_x = x_min as i32;
    let label_y = (y_min as i32 - tag_h).max(0);
    let tag_w = (text_w as i32 + 2).min(w as i32 - label_x);
    if tag_w <= 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(tag_w as u32, tag_h as u32);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      Rgb([255u8, 255u8, 255u8]),
      label_x + 1,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      scale,
      font,
      &label,
    );
  }

  /// 在图像副本上绘制检测结果
  pub fn draw_detections(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.clone();
    for detection in detections {
      self.draw_bbox_with_label(&mut canvas, detection);
    }
    canvas
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(bbox: [u32; 4], label: &str) -> Detection {
    Detection {
      bbox,
      label: label.to_string(),
      confidence: 0.9,
    }
  }

  #[test]
  fn boxes_are_drawn_in_label_color() {
    let image = RgbImage::new(40, 40);
    let out = Draw::new().draw_detections(&image, &[detection([5, 5, 20, 30], "face")]);

    let color = label_color("face");
    assert_eq!(out.get_pixel(5, 5).0, color);
    assert_eq!(out.get_pixel(20, 30).0, color);
    assert_eq!(out.get_pixel(6, 17).0, color);
    assert_eq!(out.get_pixel(12, 17).0, [0, 0, 0]);
    // 原图保持不变
    assert_eq!(image.get_pixel(5, 5).0, [0, 0, 0]);
  }

  #[test]
  fn degenerate_and_out_of_range_boxes_are_safe() {
    let image = RgbImage::new(10, 10);
    let out = Draw::new().draw_detections(
      &image,
      &[detection([5, 4, 5, 7], "a"), detection([2, 2, 50, 50], "b")],
    );
    assert_eq!(out.get_pixel(5, 5).0, [0, 0, 0]);
    assert_eq!(out.get_pixel(9, 9).0, label_color("b"));
  }

  #[test]
  fn label_colors_are_stable() {
    assert_eq!(label_color("head"), label_color("head"));
    assert!(PALETTE.contains(&label_color("")));
  }
}
