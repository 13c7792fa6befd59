// 该文件是 Tianjing （天镜） 项目的一部分。
// src/main.rs - 项目主程序
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use tianjing::{
  DetectError, FromUrl, ImageInput, ModelRef, Thresholds, YoloDetector,
  engine::OnnxEngine,
  output::{OutputWrapper, Render},
  registry::HfHubRegistry,
};

/// Tianjing 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，如 hf://deepghs/anime_face_detection/face_detect_v1.4_s
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入图像，如 image:///path/to/image.png
  #[arg(long, value_name = "SOURCE", required_unless_present = "list_variants")]
  pub input: Option<Url>,

  /// 输出路径：image:///out.png（可附加 ?font=字体文件）或 json:///out.json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub conf: f32,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.7", value_name = "THRESHOLD")]
  pub iou: f32,

  /// Hugging Face 访问令牌，缺省时读取 HF_TOKEN 环境变量
  #[arg(long, value_name = "TOKEN")]
  pub token: Option<String>,

  /// ONNX Runtime 算子内并行线程数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub threads: usize,

  /// Hugging Face 本地缓存目录
  #[arg(long, value_name = "DIR")]
  pub cache_dir: Option<PathBuf>,

  /// 列出仓库中的模型变体后退出
  #[arg(long)]
  pub list_variants: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  let model = ModelRef::from_url(&args.model).map_err(DetectError::from)?;

  let mut registry = HfHubRegistry::new();
  if let Some(dir) = args.cache_dir.clone() {
    registry = registry.cache_dir(dir);
  }
  let engine = OnnxEngine::default().intra_threads(args.threads);
  let detector = YoloDetector::new(registry, engine);
  let token = args.token.as_deref();

  if args.list_variants {
    for variant in detector.variants_with_token(&model.repo_id, token)?.iter() {
      info!("{}/{}", model.repo_id, variant);
    }
    return Ok(());
  }

  let Some(input) = args.input.as_ref() else {
    anyhow::bail!("缺少输入来源 --input");
  };

  info!("模型: {}", model);
  info!("输入来源: {}", input);
  if let Some(output) = &args.output {
    info!("输出路径: {}", output);
  }

  let output = args.output.as_ref().map(OutputWrapper::from_url).transpose()?;
  let image = ImageInput::from_url(input)?.load_image()?;
  let thresholds = Thresholds::new(args.conf, args.iou);

  info!("开始推理...");
  let now = std::time::Instant::now();
  let detections = detector.predict_ref_with_token(image.clone(), &model, thresholds, token)?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  for detection in &detections {
    let [x0, y0, x1, y1] = detection.bbox;
    info!(
      "{} {:.4} [{}, {}, {}, {}]",
      detection.label, detection.confidence, x0, y0, x1, y1
    );
  }

  if let Some(output) = output {
    output.render_result(&image, &detections)?;
  }

  Ok(())
}
