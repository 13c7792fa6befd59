// 该文件是 Tianjing （天镜） 项目的一部分。
// src/detector.rs - YOLO 目标检测器
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

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::{
  engine::{EngineError, InferenceEngine, InferenceSession, OnnxEngine},
  error::DetectError,
  frame::RgbNchwFrame,
  input::ImageInput,
  model::{ModelCache, ModelRef},
  postprocess::{Detection, postprocess},
  preprocess::{DEFAULT_ALIGN, preprocess},
  registry::{HfHubRegistry, ModelRegistry},
};

/// 置信度与 NMS 阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
  /// 置信度阈值，仅保留最高类别分数严格大于该值的候选
  pub confidence: f32,
  /// NMS IoU 阈值，仅抑制 IoU 严格大于该值的框
  pub iou: f32,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      confidence: 0.25,
      iou: 0.7,
    }
  }
}

impl Thresholds {
  pub fn new(confidence: f32, iou: f32) -> Self {
    Self { confidence, iou }
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    self.iou = iou;
    self
  }

  pub fn validate(&self) -> Result<(), DetectError> {
    for (name, value) in [("conf_threshold", self.confidence), ("iou_threshold", self.iou)] {
      if !(0.0..=1.0).contains(&value) {
        error!("{} 超出 [0, 1] 范围: {}", name, value);
        return Err(DetectError::invalid(format!(
          "{name} 必须在 [0, 1] 范围内, 实际为 {value}"
        )));
      }
    }
    Ok(())
  }
}

/// YOLO 目标检测器
///
/// 组合模型缓存、预处理、推理与后处理；同一检测器可在多个线程间共享。
pub struct YoloDetector<R, E: InferenceEngine> {
  cache: ModelCache<R, E>,
  align: u32,
}

impl YoloDetector<HfHubRegistry, OnnxEngine> {
  /// 使用 Hugging Face 仓库与 ONNX Runtime 的检测器
  pub fn hugging_face(token: Option<String>) -> Self {
    Self::new(HfHubRegistry::new().token(token), OnnxEngine::default())
  }
}

impl<R: ModelRegistry, E: InferenceEngine> YoloDetector<R, E> {
  pub fn new(registry: R, engine: E) -> Self {
    Self::with_cache(ModelCache::new(registry, engine))
  }

  pub fn with_cache(cache: ModelCache<R, E>) -> Self {
    Self {
      cache,
      align: DEFAULT_ALIGN,
    }
  }

  pub fn align(mut self, align: u32) -> Self {
    self.align = align.max(1);
    self
  }

  pub fn cache(&self) -> &ModelCache<R, E> {
    &self.cache
  }

  /// 仓库中可用的模型变体
  pub fn variants(&self, repo_id: &str) -> Result<Arc<[String]>, DetectError> {
    self.cache.variants(repo_id)
  }

  pub fn variants_with_token(
    &self,
    repo_id: &str,
    token: Option<&str>,
  ) -> Result<Arc<[String]>, DetectError> {
    self.cache.variants_with_token(repo_id, token)
  }

  /// 对一张图像执行检测
  pub fn predict(
    &self,
    image: impl Into<ImageInput>,
    repo_id: &str,
    variant: &str,
    thresholds: Thresholds,
  ) -> Result<Vec<Detection>, DetectError> {
    self.predict_with_token(image, repo_id, variant, thresholds, None)
  }

  /// 对一张图像执行检测，模型尚未加载时用 `token` 访问仓库
  ///
  /// `token` 为 `None` 时使用仓库自身的配置，再回退到 `HF_TOKEN`。
  pub fn predict_with_token(
    &self,
    image: impl Into<ImageInput>,
    repo_id: &str,
    variant: &str,
    thresholds: Thresholds,
    token: Option<&str>,
  ) -> Result<Vec<Detection>, DetectError> {
    thresholds.validate()?;

    let model = self.cache.get_or_load_with_token(repo_id, variant, token)?;
    let image = image.into().load_image()?;
    let prepared = preprocess(&image, model.max_infer_size(), self.align);
    let input = RgbNchwFrame::from(&prepared.image);

    let now = std::time::Instant::now();
    let output = model.session().run(&input)?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    if output.num_classes() != model.labels().len() {
      error!(
        "输出类别数 {} 与模型标签数 {} 不一致",
        output.num_classes(),
        model.labels().len()
      );
      return Err(DetectError::Inference(EngineError::OutputShape(vec![
        output.num_classes() as i64 + 4,
        output.num_candidates() as i64,
      ])));
    }

    let detections = postprocess(
      &output,
      thresholds.confidence,
      thresholds.iou,
      prepared.original_size,
      prepared.resized_size,
      model.labels(),
    );
    info!(
      "{}/{}: 检测到 {} 个目标",
      repo_id,
      variant,
      detections.len()
    );
    Ok(detections)
  }

  /// 按模型引用执行检测
  pub fn predict_ref(
    &self,
    image: impl Into<ImageInput>,
    model: &ModelRef,
    thresholds: Thresholds,
  ) -> Result<Vec<Detection>, DetectError> {
    self.predict(image, &model.repo_id, &model.variant, thresholds)
  }

  pub fn predict_ref_with_token(
    &self,
    image: impl Into<ImageInput>,
    model: &ModelRef,
    thresholds: Thresholds,
    token: Option<&str>,
  ) -> Result<Vec<Detection>, DetectError> {
    self.predict_with_token(image, &model.repo_id, &model.variant, thresholds, token)
  }

  pub fn clear(&self) {
    self.cache.clear();
  }
}
