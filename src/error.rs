// 该文件是 Tianjing （天镜） 项目的一部分。
// src/error.rs - 检测流程错误定义
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

use crate::{
  engine::EngineError,
  input::InputError,
  model::{MetadataError, ModelRefError},
  registry::RegistryError,
};

/// 检测流程对外暴露的错误
#[derive(Error, Debug)]
pub enum DetectError {
  #[error("参数无效: {0}")]
  InvalidArgument(String),
  #[error("仓库 {repo_id:?} 中不存在模型 {variant:?}，可用模型: {available:?}")]
  UnknownVariant {
    repo_id: String,
    variant: String,
    available: Vec<String>,
  },
  #[error("模型下载失败: {0}")]
  DownloadError(#[from] RegistryError),
  #[error("模型元数据损坏: {0}")]
  CorruptMetadata(#[from] MetadataError),
  #[error("图像解码失败: {0}")]
  DecodeError(image::ImageError),
  #[error("推理引擎错误: {0}")]
  Inference(#[from] EngineError),
}

impl From<InputError> for DetectError {
  fn from(err: InputError) -> Self {
    match err {
      InputError::Decode(e) => DetectError::DecodeError(e),
      other => DetectError::InvalidArgument(other.to_string()),
    }
  }
}

impl From<ModelRefError> for DetectError {
  fn from(err: ModelRefError) -> Self {
    DetectError::InvalidArgument(err.to_string())
  }
}

impl DetectError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    DetectError::InvalidArgument(msg.into())
  }
}
