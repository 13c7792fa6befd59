// 该文件是 Tianjing （天镜） 项目的一部分。
// src/registry/hugging_face.rs - Hugging Face 模型仓库
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

use std::path::PathBuf;

use hf_hub::api::sync::{Api, ApiBuilder};
use tracing::{debug, info};

use super::{ModelRegistry, RegistryError, resolve_token, variant_of};

/// 基于 `hf-hub` 的模型仓库，下载文件落在 Hugging Face 本地缓存中
#[derive(Debug, Clone, Default)]
pub struct HfHubRegistry {
  token: Option<String>,
  cache_dir: Option<PathBuf>,
}

impl HfHubRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn token(mut self, token: Option<String>) -> Self {
    self.token = token;
    self
  }

  pub fn cache_dir(mut self, dir: PathBuf) -> Self {
    self.cache_dir = Some(dir);
    self
  }

  /// 单次调用的令牌优先于构造时配置的令牌，两者都没有时读取 `HF_TOKEN`
  fn api(&self, token: Option<&str>) -> Result<Api, RegistryError> {
    let mut builder = ApiBuilder::new()
      .with_progress(false)
      .with_token(resolve_token(token.or(self.token.as_deref())));
    if let Some(dir) = &self.cache_dir {
      builder = builder.with_cache_dir(dir.clone());
    }
    builder
      .build()
      .map_err(|e| RegistryError::Client(e.to_string()))
  }
}

impl ModelRegistry for HfHubRegistry {
  fn list_variants(
    &self,
    repo_id: &str,
    token: Option<&str>,
  ) -> Result<Vec<String>, RegistryError> {
    debug!("查询仓库文件列表: {}", repo_id);
    let info = self
      .api(token)?
      .model(repo_id.to_string())
      .info()
      .map_err(|e| RegistryError::Listing {
        repo_id: repo_id.to_string(),
        reason: e.to_string(),
      })?;

    let variants: Vec<String> = info
      .siblings
      .iter()
      .filter_map(|sibling| variant_of(&sibling.rfilename))
      .map(str::to_string)
      .collect();
    debug!("仓库 {} 共有 {} 个模型变体", repo_id, variants.len());
    Ok(variants)
  }

  fn download(
    &self,
    repo_id: &str,
    filename: &str,
    token: Option<&str>,
  ) -> Result<PathBuf, RegistryError> {
    info!("下载模型文件: {}/{}", repo_id, filename);
    let path = self
      .api(token)?
      .model(repo_id.to_string())
      .get(filename)
      .map_err(|e| RegistryError::Download {
        repo_id: repo_id.to_string(),
        filename: filename.to_string(),
        reason: e.to_string(),
      })?;
    debug!("模型文件已缓存到: {}", path.display());
    Ok(path)
  }
}
