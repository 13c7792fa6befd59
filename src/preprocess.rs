// 该文件是 Tianjing （天镜） 项目的一部分。
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

use image::{RgbImage, imageops::FilterType};
use tracing::debug;

/// 网络输入尺寸的对齐倍数
pub const DEFAULT_ALIGN: u32 = 32;

/// 预处理结果
#[derive(Debug, Clone)]
pub struct PreprocessResult {
  /// 缩放后的图像
  pub image: RgbImage,
  /// 原始尺寸 (宽, 高)
  pub original_size: (u32, u32),
  /// 缩放后尺寸 (宽, 高)
  pub resized_size: (u32, u32),
}

/// 计算预处理后的尺寸
///
/// 长边超过 `max_infer_size` 时等比缩小（从不放大），随后宽高各自向上取整到
/// `align` 的倍数，因此实际输入可能略大于 `max_infer_size`。
pub fn resized_size(original: (u32, u32), max_infer_size: u32, align: u32) -> (u32, u32) {
  assert!(align > 0, "对齐倍数必须大于 0");
  let (width, height) = original;
  let longest = width.max(height) as f64;
  let limit = max_infer_size as f64;

  let (mut new_w, mut new_h) = (width as f64, height as f64);
  if limit < longest {
    // 先乘后除，保证长边恰好落在 max_infer_size 上
    new_w = new_w * limit / longest;
    new_h = new_h * limit / longest;
  }

  let align = align as f64;
  (
    ((new_w / align).ceil() * align) as u32,
    ((new_h / align).ceil() * align) as u32,
  )
}

/// 将图像缩放到对齐后的推理尺寸
pub fn preprocess(image: &RgbImage, max_infer_size: u32, align: u32) -> PreprocessResult {
  let original_size = image.dimensions();
  let resized_size = resized_size(original_size, max_infer_size, align);
  debug!(
    "预处理: {}x{} -> {}x{} (max_infer_size={}, align={})",
    original_size.0, original_size.1, resized_size.0, resized_size.1, max_infer_size, align
  );

  let image = if resized_size == original_size {
    image.clone()
  } else {
    image::imageops::resize(image, resized_size.0, resized_size.1, FilterType::Triangle)
  };

  PreprocessResult {
    image,
    original_size,
    resized_size,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn large_image_matches_reference_example() {
    assert_eq!(resized_size((1000, 800), 1216, 32), (1024, 800));
    assert_eq!(resized_size((2000, 1600), 1216, 32), (1216, 992));
  }

  #[test]
  fn dimensions_are_aligned_and_bounded() {
    let cap = |m: u32, a: u32| m.div_ceil(a) * a;
    for &(w, h) in &[
      (1, 1),
      (31, 33),
      (640, 640),
      (641, 100),
      (1920, 1080),
      (1080, 1920),
      (4097, 3),
      (999, 1001),
    ] {
      for &(max_size, align) in &[(640u32, 32u32), (1216, 32), (500, 32), (320, 64)] {
        let (nw, nh) = resized_size((w, h), max_size, align);
        assert_eq!(nw % align, 0, "{w}x{h} -> {nw}x{nh}");
        assert_eq!(nh % align, 0, "{w}x{h} -> {nw}x{nh}");
        if w.max(h) >= max_size {
          assert!(nw <= cap(max_size, align), "{w}x{h} -> {nw}x{nh}");
          assert!(nh <= cap(max_size, align), "{w}x{h} -> {nw}x{nh}");
        }
      }
    }
  }

  #[test]
  fn small_images_are_never_downscaled() {
    for &(w, h) in &[(1, 1), (100, 37), (640, 480), (639, 640)] {
      let (nw, nh) = resized_size((w, h), 640, 32);
      assert_eq!(nw, w.div_ceil(32) * 32);
      assert_eq!(nh, h.div_ceil(32) * 32);
    }
  }

  #[test]
  fn scaled_points_round_trip_within_a_pixel() {
    let original = (1333u32, 751u32);
    let resized = resized_size(original, 640, 32);
    for &(x, y) in &[(0u32, 0u32), (17, 400), (1000, 750), (1333, 751), (666, 1)] {
      let fx = x as f32 / original.0 as f32 * resized.0 as f32;
      let fy = y as f32 / original.1 as f32 * resized.1 as f32;
      let (bx, by) = crate::postprocess::map_point(fx, fy, original, resized);
      assert!((bx as i64 - x as i64).abs() <= 1);
      assert!((by as i64 - y as i64).abs() <= 1);
    }
  }

  #[test]
  fn preprocess_resizes_deterministically() {
    let image = RgbImage::from_fn(100, 50, |x, y| Rgb([x as u8, y as u8, 7]));
    let a = preprocess(&image, 64, 32);
    let b = preprocess(&image, 64, 32);
    assert_eq!(a.original_size, (100, 50));
    assert_eq!(a.resized_size, (64, 32));
    assert_eq!(a.image.dimensions(), (64, 32));
    assert_eq!(a.image.as_raw(), b.image.as_raw());
  }
}
