// 该文件是 Tianjing （天镜） 项目的一部分。
// src/model.rs - 模型
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

mod cache;
mod metadata;

pub use self::cache::ModelCache;
pub use self::metadata::{
  DEFAULT_MAX_INFER_SIZE, MetadataError, parse_imgsz, parse_model_metadata, parse_names,
};

/// 已加载的模型及其元数据，创建后不可变
#[derive(Debug)]
pub struct ModelHandle<S> {
  session: S,
  max_infer_size: u32,
  labels: Vec<String>,
}

impl<S> ModelHandle<S> {
  pub fn new(session: S, max_infer_size: u32, labels: Vec<String>) -> Self {
    Self {
      session,
      max_infer_size,
      labels,
    }
  }

  pub fn session(&self) -> &S {
    &self.session
  }

  pub fn max_infer_size(&self) -> u32 {
    self.max_infer_size
  }

  pub fn labels(&self) -> &[String] {
    &self.labels
  }
}

#[derive(Error, Debug)]
pub enum ModelRefError {
  #[error("模型路径必须使用 {0} 方案")]
  SchemeMismatch(&'static str),
  #[error("模型路径格式应为 hf://<owner>/<repo>/<variant>: {0}")]
  Malformed(String),
}

/// 仓库中的某个模型变体，如 `hf://deepghs/anime_face_detection/face_detect_v1.4_s`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
  pub repo_id: String,
  pub variant: String,
}

impl ModelRef {
  pub fn new(repo_id: impl Into<String>, variant: impl Into<String>) -> Self {
    Self {
      repo_id: repo_id.into(),
      variant: variant.into(),
    }
  }
}

impl std::fmt::Display for ModelRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}://{}/{}", Self::SCHEME, self.repo_id, self.variant)
  }
}

impl FromUrlWithScheme for ModelRef {
  const SCHEME: &'static str = "hf";
}

impl FromUrl for ModelRef {
  type Error = ModelRefError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelRefError::SchemeMismatch(Self::SCHEME));
    }

    let malformed = || ModelRefError::Malformed(url.to_string());
    let owner = url.host_str().filter(|h| !h.is_empty()).ok_or_else(malformed)?;
    let mut segments = url.path_segments().ok_or_else(malformed)?;
    let repo = segments.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
    let variant = segments.collect::<Vec<_>>().join("/");
    if variant.is_empty() || variant.ends_with('/') {
      return Err(malformed());
    }

    Ok(ModelRef::new(format!("{owner}/{repo}"), variant))
  }
}
