// 该文件是 Tianjing （天镜） 项目的一部分。
// src/input.rs - 图像输入
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

use std::{
  io::{BufReader, Cursor, Read, Seek},
  path::{Path, PathBuf},
};

use image::{DynamicImage, ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

mod read_image_file;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
  #[error("图像尺寸为空: {0}x{1}")]
  EmptyImage(u32, u32),
}

/// 可读且可定位的字节流
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// 检测输入图像
pub enum ImageInput {
  /// 本地图像文件
  Path(PathBuf),
  /// 已编码的图像字节（PNG、JPEG 等）
  Bytes(Vec<u8>),
  /// 已编码图像的字节流
  Stream(Box<dyn ReadSeek>),
  /// 已解码图像
  Decoded(DynamicImage),
}

impl std::fmt::Debug for ImageInput {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ImageInput::Path(path) => f.debug_tuple("Path").field(path).finish(),
      ImageInput::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
      ImageInput::Stream(_) => f.write_str("Stream(..)"),
      ImageInput::Decoded(image) => write!(f, "Decoded({}x{})", image.width(), image.height()),
    }
  }
}

impl ImageInput {
  /// 解码为 RGB 三通道图像，透明通道直接丢弃
  pub fn load_image(self) -> Result<RgbImage, InputError> {
    let image = match self {
      ImageInput::Path(path) => {
        debug!("读取图像文件: {}", path.display());
        ImageReader::open(&path)?.with_guessed_format()?.decode()?
      }
      ImageInput::Bytes(bytes) => {
        debug!("解码图像字节: {} 字节", bytes.len());
        ImageReader::new(Cursor::new(bytes))
          .with_guessed_format()?
          .decode()?
      }
      ImageInput::Stream(stream) => ImageReader::new(BufReader::new(stream))
        .with_guessed_format()?
        .decode()?,
      ImageInput::Decoded(image) => image,
    };

    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
      return Err(InputError::EmptyImage(width, height));
    }

    Ok(match image {
      DynamicImage::ImageRgb8(rgb) => rgb,
      other => other.to_rgb8(),
    })
  }
}

impl From<PathBuf> for ImageInput {
  fn from(path: PathBuf) -> Self {
    ImageInput::Path(path)
  }
}

impl From<&Path> for ImageInput {
  fn from(path: &Path) -> Self {
    ImageInput::Path(path.to_path_buf())
  }
}

impl From<&str> for ImageInput {
  fn from(path: &str) -> Self {
    ImageInput::Path(PathBuf::from(path))
  }
}

impl From<String> for ImageInput {
  fn from(path: String) -> Self {
    ImageInput::Path(PathBuf::from(path))
  }
}

impl From<Vec<u8>> for ImageInput {
  fn from(bytes: Vec<u8>) -> Self {
    ImageInput::Bytes(bytes)
  }
}

impl From<&[u8]> for ImageInput {
  fn from(bytes: &[u8]) -> Self {
    ImageInput::Bytes(bytes.to_vec())
  }
}

impl From<DynamicImage> for ImageInput {
  fn from(image: DynamicImage) -> Self {
    ImageInput::Decoded(image)
  }
}

impl From<RgbImage> for ImageInput {
  fn from(image: RgbImage) -> Self {
    ImageInput::Decoded(DynamicImage::ImageRgb8(image))
  }
}
