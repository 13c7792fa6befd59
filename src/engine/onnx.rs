// 该文件是 Tianjing （天镜） 项目的一部分。
// src/engine/onnx.rs - ONNX Runtime 推理引擎
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

use std::{collections::HashMap, path::Path};

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{
  EngineError, INPUT_NAME, InferenceEngine, InferenceSession, OUTPUT_NAME, raw_output_from_shape,
};
use crate::{frame::RgbNchwFrame, postprocess::RawOutput};

/// ONNX Runtime 引擎
#[derive(Debug, Clone)]
pub struct OnnxEngine {
  intra_threads: usize,
}

impl Default for OnnxEngine {
  fn default() -> Self {
    Self { intra_threads: 4 }
  }
}

impl OnnxEngine {
  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = threads.max(1);
    self
  }
}

/// ONNX Runtime 会话
///
/// 同一会话上的推理调用通过互斥锁串行执行。
pub struct OnnxSession {
  session: Mutex<Session>,
  metadata: HashMap<String, String>,
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> EngineError {
  EngineError::Load {
    path: path.display().to_string(),
    reason: e.to_string(),
  }
}

impl InferenceEngine for OnnxEngine {
  type Session = OnnxSession;

  fn load(&self, path: &Path) -> Result<Self::Session, EngineError> {
    info!("加载模型文件: {}", path.display());
    let session = Session::builder()
      .map_err(|e| load_error(path, e))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| load_error(path, e))?
      .with_intra_threads(self.intra_threads)
      .map_err(|e| load_error(path, e))?
      .commit_from_file(path)
      .map_err(|e| load_error(path, e))?;

    let metadata = {
      let model_metadata = session
        .metadata()
        .map_err(|e| EngineError::Metadata(e.to_string()))?;
      let mut metadata = HashMap::new();
      for key in model_metadata
        .custom_keys()
        .map_err(|e| EngineError::Metadata(e.to_string()))?
      {
        if let Some(value) = model_metadata
          .custom(&key)
          .map_err(|e| EngineError::Metadata(e.to_string()))?
        {
          metadata.insert(key, value);
        }
      }
      metadata
    };
    debug!("模型元数据键: {:?}", metadata.keys().collect::<Vec<_>>());
    info!("模型加载完成");

    Ok(OnnxSession {
      session: Mutex::new(session),
      metadata,
    })
  }
}

impl InferenceSession for OnnxSession {
  fn metadata(&self) -> Result<HashMap<String, String>, EngineError> {
    Ok(self.metadata.clone())
  }

  fn run(&self, input: &RgbNchwFrame) -> Result<RawOutput, EngineError> {
    let tensor = Tensor::from_array((input.shape(), input.as_nchw().to_vec()))
      .map_err(|e| EngineError::Run(format!("无法创建输入张量: {e}")))?;

    debug!("执行模型推理, 输入形状: {:?}", input.shape());
    let mut session = self.session.lock();
    let outputs = session
      .run(ort::inputs![INPUT_NAME => tensor])
      .map_err(|e| EngineError::Run(e.to_string()))?;

    let output = outputs
      .get(OUTPUT_NAME)
      .ok_or_else(|| EngineError::Run(format!("模型没有名为 {OUTPUT_NAME} 的输出")))?;
    let (shape, data) = output
      .try_extract_tensor::<f32>()
      .map_err(|e| EngineError::Run(e.to_string()))?;

    let shape: Vec<i64> = shape.iter().copied().collect();
    debug!("模型输出形状: {:?}", shape);
    raw_output_from_shape(&shape, data)
  }
}
