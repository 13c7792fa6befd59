// 该文件是 Tianjing （天镜） 项目的一部分。
// src/registry.rs - 模型仓库
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

use std::{path::PathBuf, sync::Arc};

use thiserror::Error;

mod hugging_face;
pub use self::hugging_face::HfHubRegistry;

/// 每个模型变体在仓库中的文件名，路径为 `<变体>/model.onnx`
pub const MODEL_FILENAME: &str = "model.onnx";

/// 未显式提供令牌时读取的环境变量
pub const HF_TOKEN_ENV: &str = "HF_TOKEN";

#[derive(Error, Debug)]
pub enum RegistryError {
  #[error("无法列出仓库 {repo_id} 的文件: {reason}")]
  Listing { repo_id: String, reason: String },
  #[error("无法下载 {repo_id}/{filename}: {reason}")]
  Download {
    repo_id: String,
    filename: String,
    reason: String,
  },
  #[error("仓库客户端初始化失败: {0}")]
  Client(String),
}

/// 远端模型仓库
///
/// `token` 为本次调用显式提供的访问令牌；为 `None` 时由实现自行决定，
/// 通常经 [`resolve_token`] 回退到 `HF_TOKEN`。
pub trait ModelRegistry: Send + Sync {
  /// 列出仓库中发布的模型变体
  fn list_variants(&self, repo_id: &str, token: Option<&str>)
  -> Result<Vec<String>, RegistryError>;

  /// 下载（或命中本地缓存）仓库中的文件，返回本地路径
  fn download(
    &self,
    repo_id: &str,
    filename: &str,
    token: Option<&str>,
  ) -> Result<PathBuf, RegistryError>;
}

impl<R: ModelRegistry + ?Sized> ModelRegistry for Arc<R> {
  fn list_variants(
    &self,
    repo_id: &str,
    token: Option<&str>,
  ) -> Result<Vec<String>, RegistryError> {
    (**self).list_variants(repo_id, token)
  }

  fn download(
    &self,
    repo_id: &str,
    filename: &str,
    token: Option<&str>,
  ) -> Result<PathBuf, RegistryError> {
    (**self).download(repo_id, filename, token)
  }
}

/// 变体对应的模型文件路径
pub fn model_path(variant: &str) -> String {
  format!("{}/{}", variant, MODEL_FILENAME)
}

/// 若仓库文件形如 `<变体>/model.onnx`（仅一级目录），返回变体名
pub fn variant_of(path: &str) -> Option<&str> {
  let variant = path.strip_suffix(MODEL_FILENAME)?.strip_suffix('/')?;
  if variant.is_empty() || variant.contains('/') {
    None
  } else {
    Some(variant)
  }
}

/// 显式令牌优先，否则在调用时读取 `HF_TOKEN`
pub fn resolve_token(explicit: Option<&str>) -> Option<String> {
  explicit
    .map(str::to_string)
    .or_else(|| std::env::var(HF_TOKEN_ENV).ok())
    .filter(|token| !token.is_empty())
}
