// 该文件是 Tianjing （天镜） 项目的一部分。
// src/frame.rs - NCHW 张量帧定义
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

use image::RgbImage;

const RGB_CHANNELS: usize = 3;

/// 归一化到 [0, 1] 的 RGB 浮点帧，按 CHW 排列，批大小为 1
#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  data: Box<[f32]>,
  width: usize,
  height: usize,
}

impl RgbNchwFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0f32; RGB_CHANNELS * width * height].into_boxed_slice();
    Self {
      data,
      width,
      height,
    }
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 张量形状 `[1, C, H, W]`
  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height, self.width]
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }

  pub fn into_data(self) -> Vec<f32> {
    self.data.into_vec()
  }
}

impl AsMut<[f32]> for RgbNchwFrame {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

impl From<&RgbImage> for RgbNchwFrame {
  fn from(image: &RgbImage) -> Self {
    let mut frame = {
      let (width, height) = image.dimensions();
      RgbNchwFrame::with_shape(height as usize, width as usize)
    };

    let plane = frame.height() * frame.width();
    let width = frame.width();
    let slice = frame.as_mut();

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = y as usize * width + x as usize;
      for c in 0..RGB_CHANNELS {
        slice[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }
    frame
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn encodes_planes_in_rgb_order() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([255, 0, 51]));
    image.put_pixel(1, 0, Rgb([0, 255, 0]));

    let frame = RgbNchwFrame::from(&image);
    assert_eq!(frame.shape(), [1, 3, 1, 2]);
    assert_eq!(frame.as_nchw(), &[1.0, 0.0, 0.0, 1.0, 0.2, 0.0]);
  }
}
