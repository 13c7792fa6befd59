// 该文件是 Tianjing （天镜） 项目的一部分。
// src/postprocess.rs - YOLO 输出后处理
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

use std::cmp::Ordering;

use tracing::debug;

/// 模型原始输出，形状为 `[4 + 类别数, 候选数]`，按行优先存储
#[derive(Debug, Clone)]
pub struct RawOutput {
  rows: usize,
  cols: usize,
  data: Vec<f32>,
}

impl RawOutput {
  pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Self {
    assert_eq!(
      rows * cols,
      data.len(),
      "数据长度不匹配: 期望长度 {}, 实际长度 {}",
      rows * cols,
      data.len()
    );
    assert!(rows >= 4, "输出至少需要 4 行边界框编码, 实际为 {}", rows);
    Self { rows, cols, data }
  }

  /// 由候选框按列组装，每个候选为 `[cx, cy, w, h, score_0, score_1, ...]`
  pub fn from_candidates<const N: usize>(candidates: &[[f32; N]]) -> Self {
    let cols = candidates.len();
    let mut data = vec![0f32; N * cols];
    for (c, candidate) in candidates.iter().enumerate() {
      for (r, value) in candidate.iter().enumerate() {
        data[r * cols + c] = *value;
      }
    }
    Self::new(N, cols, data)
  }

  pub fn num_classes(&self) -> usize {
    self.rows - 4
  }

  pub fn num_candidates(&self) -> usize {
    self.cols
  }

  fn at(&self, row: usize, col: usize) -> f32 {
    self.data[row * self.cols + col]
  }

  fn class_scores(&self, col: usize) -> impl Iterator<Item = f32> + '_ {
    (4..self.rows).map(move |row| self.at(row, col))
  }
}

/// 检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// 原图像素坐标 [x0, y0, x1, y1]
  pub bbox: [u32; 4],
  /// 类别名称
  pub label: String,
  /// 置信度
  pub confidence: f32,
}

/// (中心 x, 中心 y, 宽, 高) 转 (x_min, y_min, x_max, y_max)
pub fn xywh_to_xyxy([cx, cy, w, h]: [f32; 4]) -> [f32; 4] {
  [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

fn inclusive_area(b: &[f32; 4]) -> f32 {
  (b[2] - b[0] + 1.0) * (b[3] - b[1] + 1.0)
}

/// 两个框的 IoU，宽高按包含端点的像素计数（+1）
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let w = (a[2].min(b[2]) - a[0].max(b[0]) + 1.0).max(0.0);
  let h = (a[3].min(b[3]) - a[1].max(b[1]) + 1.0).max(0.0);
  let inter = w * h;
  inter / (inclusive_area(a) + inclusive_area(b) - inter)
}

/// 贪心非极大值抑制，返回保留框的下标（按保留顺序）
///
/// 分数相同时先出现的候选优先；IoU 恰好等于阈值的框会被保留。
pub fn nms(boxes: &[[f32; 4]], scores: &[f32], threshold: f32) -> Vec<usize> {
  assert_eq!(boxes.len(), scores.len());

  let mut order: Vec<usize> = (0..boxes.len()).collect();
  order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

  let mut keep = Vec::new();
  while let Some((&best, rest)) = order.split_first() {
    keep.push(best);
    order = rest
      .iter()
      .copied()
      .filter(|&other| iou(&boxes[best], &boxes[other]) <= threshold)
      .collect();
  }
  keep
}

/// 将缩放后图像上的点映射回原图，四舍六入五取偶后裁剪到 [0, 原尺寸]
pub fn map_point(x: f32, y: f32, original: (u32, u32), resized: (u32, u32)) -> (u32, u32) {
  let (old_w, old_h) = (original.0 as f32, original.1 as f32);
  let (new_w, new_h) = (resized.0 as f32, resized.1 as f32);
  let x = (x / new_w * old_w).clamp(0.0, old_w).round_ties_even();
  let y = (y / new_h * old_h).clamp(0.0, old_h).round_ties_even();
  (x as u32, y as u32)
}

fn argmax(scores: impl Iterator<Item = f32>) -> (usize, f32) {
  let mut best = (0usize, f32::NEG_INFINITY);
  for (idx, score) in scores.enumerate() {
    if idx == 0 || score > best.1 {
      best = (idx, score);
    }
  }
  best
}

/// 置信度过滤、NMS，并把坐标还原到原图空间
pub fn postprocess(
  output: &RawOutput,
  conf_threshold: f32,
  iou_threshold: f32,
  original_size: (u32, u32),
  resized_size: (u32, u32),
  labels: &[String],
) -> Vec<Detection> {
  assert_eq!(
    output.num_classes(),
    labels.len(),
    "输出类别数 {} 与标签数 {} 不一致",
    output.num_classes(),
    labels.len()
  );

  let mut boxes = Vec::new();
  let mut best = Vec::new();
  for col in 0..output.num_candidates() {
    let (class_id, score) = argmax(output.class_scores(col));
    if score > conf_threshold {
      let xywh = [
        output.at(0, col),
        output.at(1, col),
        output.at(2, col),
        output.at(3, col),
      ];
      boxes.push(xywh_to_xyxy(xywh));
      best.push((class_id, score));
    }
  }
  debug!(
    "候选框 {} 个, 置信度过滤后剩余 {} 个",
    output.num_candidates(),
    boxes.len()
  );

  if boxes.is_empty() {
    return Vec::new();
  }

  let scores: Vec<f32> = best.iter().map(|&(_, score)| score).collect();
  let keep = nms(&boxes, &scores, iou_threshold);
  debug!("NMS 后保留 {} 个", keep.len());

  keep
    .into_iter()
    .map(|idx| {
      let b = boxes[idx];
      let (x0, y0) = map_point(b[0], b[1], original_size, resized_size);
      let (x1, y1) = map_point(b[2], b[3], original_size, resized_size);
      let (class_id, confidence) = best[idx];
      Detection {
        bbox: [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)],
        label: labels[class_id].clone(),
        confidence,
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn single_candidate_is_mapped_back() {
    let output = RawOutput::from_candidates(&[[10.0, 10.0, 20.0, 20.0, 0.9, 0.1]]);
    let detections = postprocess(
      &output,
      0.5,
      0.7,
      (100, 100),
      (128, 128),
      &labels(&["cat", "dog"]),
    );

    assert_eq!(detections.len(), 1);
    let det = &detections[0];
    assert_eq!(det.label, "cat");
    assert_eq!(det.confidence, 0.9);
    // (10±10) / 128 * 100 => 0.0 与 15.625
    assert_eq!(det.bbox, [0, 0, 16, 16]);
  }

  #[test]
  fn everything_below_threshold_yields_nothing() {
    let output = RawOutput::from_candidates(&[
      [10.0, 10.0, 20.0, 20.0, 0.2, 0.1],
      [50.0, 50.0, 20.0, 20.0, 0.25, 0.25],
    ]);
    let detections = postprocess(&output, 0.25, 0.7, (64, 64), (64, 64), &labels(&["a", "b"]));
    assert!(detections.is_empty());
  }

  #[test]
  fn empty_output_yields_nothing() {
    let output = RawOutput::new(6, 0, Vec::new());
    let detections = postprocess(&output, 0.25, 0.7, (64, 64), (64, 64), &labels(&["a", "b"]));
    assert!(detections.is_empty());
  }

  #[test]
  fn label_follows_argmax_class() {
    let output = RawOutput::from_candidates(&[[32.0, 32.0, 8.0, 8.0, 0.1, 0.3, 0.8]]);
    let detections = postprocess(
      &output,
      0.25,
      0.7,
      (64, 64),
      (64, 64),
      &labels(&["face", "head", "halfbody"]),
    );
    assert_eq!(detections[0].label, "halfbody");
    assert_eq!(detections[0].confidence, 0.8);
    assert_eq!(detections[0].bbox, [28, 28, 36, 36]);
  }

  #[test]
  fn reference_nms_example() {
    let boxes = [
      [0.0, 0.0, 10.0, 10.0],
      [1.0, 1.0, 11.0, 11.0],
      [20.0, 20.0, 30.0, 30.0],
    ];
    assert_eq!(nms(&boxes, &[0.9, 0.8, 0.7], 0.5), vec![0, 2]);
  }

  #[test]
  fn iou_at_threshold_is_kept() {
    // 包含端点面积: 10x10 = 100 与 10x5 = 50，交集 50，IoU 恰为 0.5
    let boxes = [[0.0, 0.0, 9.0, 9.0], [0.0, 0.0, 9.0, 4.0]];
    assert_eq!(iou(&boxes[0], &boxes[1]), 0.5);
    assert_eq!(nms(&boxes, &[0.9, 0.8], 0.5), vec![0, 1]);
    assert_eq!(nms(&boxes, &[0.9, 0.8], 0.49), vec![0]);
  }

  #[test]
  fn equal_scores_keep_first_seen() {
    let boxes = [[5.0, 5.0, 15.0, 15.0], [5.0, 5.0, 15.0, 15.0]];
    assert_eq!(nms(&boxes, &[0.6, 0.6], 0.5), vec![0]);
  }

  #[test]
  fn keep_order_follows_score() {
    let boxes = [
      [0.0, 0.0, 10.0, 10.0],
      [100.0, 100.0, 110.0, 110.0],
      [200.0, 200.0, 210.0, 210.0],
    ];
    assert_eq!(nms(&boxes, &[0.3, 0.9, 0.6], 0.5), vec![1, 2, 0]);
  }

  #[test]
  fn nms_is_idempotent() {
    let boxes = vec![
      [0.0, 0.0, 10.0, 10.0],
      [2.0, 2.0, 12.0, 12.0],
      [8.0, 8.0, 30.0, 30.0],
      [9.0, 9.0, 31.0, 29.0],
      [50.0, 0.0, 60.0, 10.0],
      [51.0, 1.0, 61.0, 9.0],
    ];
    let scores = vec![0.9, 0.85, 0.7, 0.75, 0.4, 0.5];
    let first = nms(&boxes, &scores, 0.45);

    let kept_boxes: Vec<[f32; 4]> = first.iter().map(|&i| boxes[i]).collect();
    let kept_scores: Vec<f32> = first.iter().map(|&i| scores[i]).collect();
    let second = nms(&kept_boxes, &kept_scores, 0.45);
    assert_eq!(second, (0..first.len()).collect::<Vec<_>>());
  }

  #[test]
  fn points_are_clipped_to_image() {
    assert_eq!(map_point(-5.0, 700.0, (100, 50), (128, 64)), (0, 50));
  }

  #[test]
  fn rounding_is_half_to_even() {
    // 2.5 -> 2, 3.5 -> 4
    assert_eq!(map_point(5.0, 7.0, (50, 50), (100, 100)), (2, 4));
  }

  #[test]
  fn overlapping_candidates_are_suppressed_end_to_end() {
    let output = RawOutput::from_candidates(&[
      [50.0, 50.0, 40.0, 40.0, 0.6, 0.0],
      [51.0, 51.0, 40.0, 40.0, 0.0, 0.9],
      [200.0, 200.0, 20.0, 20.0, 0.5, 0.0],
    ]);
    let detections = postprocess(&output, 0.25, 0.7, (256, 256), (256, 256), &labels(&["a", "b"]));
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].label, "b");
    assert_eq!(detections[1].label, "a");
    assert_eq!(detections[1].bbox, [190, 190, 210, 210]);
  }
}
