// 该文件是 Tianjing （天镜） 项目的一部分。
// src/output/json_record.rs - JSON 检测记录输出
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

use chrono::Utc;
use image::RgbImage;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, output::Render, postprocess::Detection, url_file_path,
};

#[derive(Error, Debug)]
pub enum JsonRecordError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 将检测结果写为 JSON 文件，不保存图像
pub struct JsonRecordOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonRecordError::SchemeMismatch(uri.scheme().to_string()));
    }
    Ok(JsonRecordOutput {
      path: PathBuf::from(url_file_path(uri)),
    })
  }
}

impl JsonRecordOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

pub fn detections_to_json(detections: &[Detection]) -> Value {
  let items: Vec<Value> = detections
    .iter()
    .map(|d| {
      json!({
        "bbox": d.bbox,
        "label": d.label,
        "confidence": d.confidence,
      })
    })
    .collect();

  json!({
    "created_at": Utc::now().to_rfc3339(),
    "detections": items,
  })
}

impl Render for JsonRecordOutput {
  type Error = JsonRecordError;

  fn render_result(&self, _image: &RgbImage, detections: &[Detection]) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let record = serde_json::to_string_pretty(&detections_to_json(detections))?;
    std::fs::write(&self.path, record)?;

    warn!(
      "保存 {} 条检测记录到文件: {}",
      detections.len(),
      self.path.display()
    );
    Ok(())
  }
}
