// 该文件是 Tianjing （天镜） 项目的一部分。
// src/engine.rs - 推理引擎接口
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

use thiserror::Error;

use crate::{frame::RgbNchwFrame, postprocess::RawOutput};

mod onnx;
pub use self::onnx::{OnnxEngine, OnnxSession};

/// 模型输入张量名称
pub const INPUT_NAME: &str = "images";
/// 模型输出张量名称
pub const OUTPUT_NAME: &str = "output0";

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型加载错误: {path}, 错误: {reason}")]
  Load { path: String, reason: String },
  #[error("读取模型元数据失败: {0}")]
  Metadata(String),
  #[error("推理失败: {0}")]
  Run(String),
  #[error("输出张量形状不符合 [1, 4 + 类别数, 候选数]: {0:?}")]
  OutputShape(Vec<i64>),
}

/// 已加载的模型，可多线程共享
pub trait InferenceSession: Send + Sync {
  /// 模型文件中的自定义元数据
  fn metadata(&self) -> Result<HashMap<String, String>, EngineError>;

  /// 执行一次推理，返回去掉批维度的原始输出
  fn run(&self, input: &RgbNchwFrame) -> Result<RawOutput, EngineError>;
}

/// 从本地文件加载模型的推理引擎
pub trait InferenceEngine: Send + Sync {
  type Session: InferenceSession;

  fn load(&self, path: &Path) -> Result<Self::Session, EngineError>;
}

/// 校验输出形状并去掉批维度
pub(crate) fn raw_output_from_shape(shape: &[i64], data: &[f32]) -> Result<RawOutput, EngineError> {
  let (rows, cols) = match shape {
    [1, rows, cols] | [rows, cols] => (*rows, *cols),
    _ => return Err(EngineError::OutputShape(shape.to_vec())),
  };
  if rows < 4 || cols < 0 || (rows * cols) as usize != data.len() {
    return Err(EngineError::OutputShape(shape.to_vec()));
  }
  Ok(RawOutput::new(rows as usize, cols as usize, data.to_vec()))
}
