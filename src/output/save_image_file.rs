// 该文件是 Tianjing （天镜） 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use image::RgbImage;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Render, draw::Draw},
  postprocess::Detection,
  url_file_path,
};

const FONT_QUERY_KEY: &str = "font";

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("无法加载字体 {path}: {source}")]
  FontError {
    path: String,
    source: std::io::Error,
  },
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let font = uri
      .query_pairs()
      .find(|(k, _)| k == FONT_QUERY_KEY)
      .map(|(_, v)| v.into_owned());
    let draw = match font {
      Some(path) => Draw::with_font_file(Path::new(&path))
        .map_err(|source| SaveImageFileError::FontError { path, source })?,
      None => Draw::new(),
    };

    Ok(SaveImageFileOutput {
      path: PathBuf::from(url_file_path(uri)),
      draw,
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>, draw: Draw) -> Self {
    Self {
      path: path.into(),
      draw,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    warn!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, image: &RgbImage, detections: &[Detection]) -> Result<(), Self::Error> {
    let image = self.draw.draw_detections(image, detections);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn saves_annotated_image_creating_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.png");
    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();

    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), path.as_path());

    let image = RgbImage::new(32, 24);
    let detections = [Detection {
      bbox: [2, 2, 20, 20],
      label: "face".to_string(),
      confidence: 0.8,
    }];
    output.render_result(&image, &detections).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (32, 24));
    assert_ne!(saved.get_pixel(2, 2).0, [0, 0, 0]);
  }

  #[test]
  fn missing_font_file_is_reported() {
    let url = Url::parse("image:///tmp/out.png?font=/nonexistent/font.ttf").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::FontError { .. })
    ));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("json:///tmp/out.json").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
