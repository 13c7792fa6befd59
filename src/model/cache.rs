// 该文件是 Tianjing （天镜） 项目的一部分。
// src/model/cache.rs - 模型缓存
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
  collections::HashMap,
  sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
  },
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use super::{ModelHandle, metadata::parse_model_metadata};
use crate::{
  engine::{InferenceEngine, InferenceSession},
  error::DetectError,
  registry::{ModelRegistry, model_path},
};

type CacheKey = (String, String);

/// 单个 (仓库, 变体) 的缓存槽
///
/// 加载完成后读取只需 `OnceLock::get`；`loading` 保证同一时刻只有一个线程在加载。
/// `evicted` 表示加载期间缓存已被清空，加载者完成后负责把该槽移出缓存。
struct Slot<S> {
  handle: OnceLock<Arc<ModelHandle<S>>>,
  loading: Mutex<()>,
  evicted: AtomicBool,
}

impl<S> Slot<S> {
  fn new() -> Self {
    Self {
      handle: OnceLock::new(),
      loading: Mutex::new(()),
      evicted: AtomicBool::new(false),
    }
  }
}

/// 按 (仓库, 变体) 懒加载的模型缓存
///
/// 首次使用时下载并加载模型，之后一直复用，直到调用 [`ModelCache::clear`]。
/// 已加载的模型在 `clear` 时立即移除；正在加载的槽留在缓存中，
/// 新的调用方继续等待它，加载完成后该槽随即被移除。
///
/// 命中已加载模型时只取映射的共享读锁，加载过程从不持有映射锁，
/// 因此读取不会等待任何加载。
pub struct ModelCache<R, E: InferenceEngine> {
  registry: R,
  engine: E,
  variants: RwLock<HashMap<String, Arc<[String]>>>,
  entries: RwLock<HashMap<CacheKey, Arc<Slot<E::Session>>>>,
}

impl<R: ModelRegistry, E: InferenceEngine> ModelCache<R, E> {
  pub fn new(registry: R, engine: E) -> Self {
    Self {
      registry,
      engine,
      variants: RwLock::new(HashMap::new()),
      entries: RwLock::new(HashMap::new()),
    }
  }

  pub fn registry(&self) -> &R {
    &self.registry
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  /// 仓库中发布的模型变体，每个仓库只查询一次
  pub fn variants(&self, repo_id: &str) -> Result<Arc<[String]>, DetectError> {
    self.variants_with_token(repo_id, None)
  }

  pub fn variants_with_token(
    &self,
    repo_id: &str,
    token: Option<&str>,
  ) -> Result<Arc<[String]>, DetectError> {
    if let Some(variants) = self.variants.read().get(repo_id) {
      return Ok(variants.clone());
    }

    let listed: Arc<[String]> = self.registry.list_variants(repo_id, token)?.into();
    debug!("仓库 {} 的模型变体: {:?}", repo_id, listed);
    Ok(
      self
        .variants
        .write()
        .entry(repo_id.to_string())
        .or_insert(listed)
        .clone(),
    )
  }

  /// 取出已加载的模型，不存在时下载并加载
  pub fn get_or_load(
    &self,
    repo_id: &str,
    variant: &str,
  ) -> Result<Arc<ModelHandle<E::Session>>, DetectError> {
    self.get_or_load_with_token(repo_id, variant, None)
  }

  /// 同 [`ModelCache::get_or_load`]，查询与下载时使用给定的访问令牌
  pub fn get_or_load_with_token(
    &self,
    repo_id: &str,
    variant: &str,
    token: Option<&str>,
  ) -> Result<Arc<ModelHandle<E::Session>>, DetectError> {
    let key: CacheKey = (repo_id.to_string(), variant.to_string());

    if let Some(handle) = self.loaded(&key) {
      return Ok(handle);
    }

    let variants = self.variants_with_token(repo_id, token)?;
    if !variants.iter().any(|v| v == variant) {
      error!("仓库 {} 中不存在模型 {}", repo_id, variant);
      return Err(DetectError::UnknownVariant {
        repo_id: repo_id.to_string(),
        variant: variant.to_string(),
        available: variants.to_vec(),
      });
    }

    loop {
      let slot = self
        .entries
        .write()
        .entry(key.clone())
        .or_insert_with(|| Arc::new(Slot::new()))
        .clone();

      let _loading = slot.loading.lock();
      if let Some(handle) = slot.handle.get() {
        return Ok(handle.clone());
      }
      // 上一个加载者失败后移除了该槽，换用新槽重试
      if !self.is_current(&key, &slot) {
        continue;
      }

      return match self.load(repo_id, variant, token) {
        Ok(handle) => {
          let handle = slot.handle.get_or_init(|| Arc::new(handle)).clone();
          // 与 clear 互斥：clear 要么已看到 handle 并移除该槽，要么已设置 evicted
          let mut entries = self.entries.write();
          if slot.evicted.load(Ordering::Acquire) {
            debug!("{}/{} 加载期间缓存已清空, 不再保留", repo_id, variant);
            self.remove_slot(&mut entries, &key, &slot);
          }
          Ok(handle)
        }
        Err(err) => {
          self.remove_slot(&mut self.entries.write(), &key, &slot);
          Err(err)
        }
      };
    }
  }

  /// 清空已加载的模型，释放推理会话
  ///
  /// 正在加载的模型不会被重复加载：其槽被标记为待移除，加载完成后由加载者移除。
  pub fn clear(&self) {
    let mut entries = self.entries.write();
    let before = entries.len();
    entries.retain(|_, slot| {
      if slot.handle.get().is_some() {
        return false;
      }
      slot.evicted.store(true, Ordering::Release);
      true
    });
    info!(
      "清空模型缓存, 移除 {} 项, {} 项加载中",
      before - entries.len(),
      entries.len()
    );
  }

  /// 已加载完成的模型数量
  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .values()
      .filter(|slot| slot.handle.get().is_some())
      .count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains(&self, repo_id: &str, variant: &str) -> bool {
    self
      .loaded(&(repo_id.to_string(), variant.to_string()))
      .is_some()
  }

  fn loaded(&self, key: &CacheKey) -> Option<Arc<ModelHandle<E::Session>>> {
    let slot = self.entries.read().get(key)?.clone();
    slot.handle.get().cloned()
  }

  fn is_current(&self, key: &CacheKey, slot: &Arc<Slot<E::Session>>) -> bool {
    self
      .entries
      .read()
      .get(key)
      .is_some_and(|current| Arc::ptr_eq(current, slot))
  }

  fn remove_slot(
    &self,
    entries: &mut HashMap<CacheKey, Arc<Slot<E::Session>>>,
    key: &CacheKey,
    slot: &Arc<Slot<E::Session>>,
  ) {
    if entries
      .get(key)
      .is_some_and(|current| Arc::ptr_eq(current, slot))
    {
      entries.remove(key);
    }
  }

  fn load(
    &self,
    repo_id: &str,
    variant: &str,
    token: Option<&str>,
  ) -> Result<ModelHandle<E::Session>, DetectError> {
    info!("加载模型 {}/{}", repo_id, variant);
    let path = self
      .registry
      .download(repo_id, &model_path(variant), token)?;
    let session = self.engine.load(&path)?;
    let (max_infer_size, labels) = parse_model_metadata(&session.metadata()?)?;
    info!(
      "模型 {}/{} 加载完成, 最大推理尺寸 {}, 类别 {:?}",
      repo_id, variant, max_infer_size, labels
    );
    Ok(ModelHandle::new(session, max_infer_size, labels))
  }
}
