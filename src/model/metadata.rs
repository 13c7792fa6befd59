// 该文件是 Tianjing （天镜） 项目的一部分。
// src/model/metadata.rs - 模型元数据解析
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

use std::{collections::HashMap, iter::Peekable, str::CharIndices};

use serde_json::Value;
use thiserror::Error;

/// 元数据中没有 `imgsz` 时使用的最大推理尺寸
pub const DEFAULT_MAX_INFER_SIZE: u32 = 640;

const IMGSZ_KEY: &str = "imgsz";
const NAMES_KEY: &str = "names";

#[derive(Error, Debug, PartialEq)]
pub enum MetadataError {
  #[error("缺少元数据字段: {0}")]
  MissingField(&'static str),
  #[error("imgsz 无效: {0}")]
  InvalidImgsz(String),
  #[error("names 在位置 {pos} 处无法解析: {reason}")]
  InvalidNames { pos: usize, reason: String },
  #[error("类别编号重复: {0}")]
  DuplicateLabel(usize),
  #[error("类别编号不连续, 缺少 {missing}（共 {count} 个类别）")]
  NonContiguousLabels { missing: usize, count: usize },
}

/// 解析 `imgsz`（整数或整数数组），取最大值作为最大推理尺寸
pub fn parse_imgsz(raw: Option<&str>) -> Result<u32, MetadataError> {
  let Some(raw) = raw else {
    return Ok(DEFAULT_MAX_INFER_SIZE);
  };
  let invalid = || MetadataError::InvalidImgsz(raw.to_string());

  let value: Value = serde_json::from_str(raw).map_err(|_| invalid())?;
  let size = match value {
    Value::Number(n) => n.as_u64(),
    Value::Array(items) => items
      .iter()
      .map(Value::as_u64)
      .collect::<Option<Vec<u64>>>()
      .and_then(|sizes| sizes.into_iter().max()),
    _ => None,
  };

  size
    .filter(|&s| s > 0)
    .and_then(|s| u32::try_from(s).ok())
    .ok_or_else(invalid)
}

struct NamesParser<'a> {
  src: &'a str,
  chars: Peekable<CharIndices<'a>>,
}

impl<'a> NamesParser<'a> {
  fn new(src: &'a str) -> Self {
    Self {
      src,
      chars: src.char_indices().peekable(),
    }
  }

  fn pos(&mut self) -> usize {
    self
      .chars
      .peek()
      .map(|&(i, _)| i)
      .unwrap_or(self.src.len())
  }

  fn fail<T>(&mut self, reason: impl Into<String>) -> Result<T, MetadataError> {
    Err(MetadataError::InvalidNames {
      pos: self.pos(),
      reason: reason.into(),
    })
  }

  fn skip_ws(&mut self) {
    while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
  }

  fn expect(&mut self, expected: char) -> Result<(), MetadataError> {
    self.skip_ws();
    match self.chars.peek() {
      Some(&(_, c)) if c == expected => {
        self.chars.next();
        Ok(())
      }
      _ => self.fail(format!("期望 '{expected}'")),
    }
  }

  fn key(&mut self) -> Result<usize, MetadataError> {
    self.skip_ws();
    let mut digits = String::new();
    while let Some((_, c)) = self.chars.next_if(|(_, c)| c.is_ascii_digit()) {
      digits.push(c);
    }
    if digits.is_empty() {
      return self.fail("期望非负整数键");
    }
    match digits.parse::<u16>() {
      Ok(key) => Ok(key as usize),
      Err(_) => self.fail(format!("键 {digits} 超出范围")),
    }
  }

  fn string(&mut self) -> Result<String, MetadataError> {
    self.skip_ws();
    let quote = match self.chars.peek() {
      Some(&(_, c @ ('\'' | '"'))) => c,
      _ => return self.fail("期望字符串值"),
    };
    self.chars.next();

    let mut value = String::new();
    loop {
      match self.chars.next() {
        Some((_, c)) if c == quote => return Ok(value),
        Some((_, '\\')) => match self.chars.next() {
          Some((_, '\\')) => value.push('\\'),
          Some((_, '\'')) => value.push('\''),
          Some((_, '"')) => value.push('"'),
          Some((_, 'n')) => value.push('\n'),
          Some((_, 't')) => value.push('\t'),
          _ => return self.fail("不支持的转义序列"),
        },
        Some((_, c)) => value.push(c),
        None => return self.fail("字符串未结束"),
      }
    }
  }

  fn parse(mut self) -> Result<Vec<(usize, String)>, MetadataError> {
    let mut entries = Vec::new();
    self.expect('{')?;
    self.skip_ws();
    if self.chars.next_if(|&(_, c)| c == '}').is_none() {
      loop {
        let key = self.key()?;
        self.expect(':')?;
        let value = self.string()?;
        entries.push((key, value));

        self.skip_ws();
        match self.chars.next() {
          Some((_, ',')) => {
            self.skip_ws();
            if self.chars.next_if(|&(_, c)| c == '}').is_some() {
              break;
            }
          }
          Some((_, '}')) => break,
          _ => return self.fail("期望 ',' 或 '}'"),
        }
      }
    }
    self.skip_ws();
    if self.chars.peek().is_some() {
      return self.fail("映射之后存在多余内容");
    }
    Ok(entries)
  }
}

/// 严格解析 `names`：只接受 `{整数: '字符串', ...}`，编号必须从 0 连续
pub fn parse_names(raw: &str) -> Result<Vec<String>, MetadataError> {
  let entries = NamesParser::new(raw).parse()?;
  let count = entries.len();

  let mut labels: Vec<Option<String>> = vec![None; count];
  for (key, value) in entries {
    match labels.get_mut(key) {
      Some(slot @ None) => *slot = Some(value),
      Some(Some(_)) => return Err(MetadataError::DuplicateLabel(key)),
      None => {
        let missing = labels.iter().position(Option::is_none).unwrap_or(count);
        return Err(MetadataError::NonContiguousLabels { missing, count });
      }
    }
  }

  // 键数等于类别数且无重复、无越界，此处必然全部填满
  Ok(labels.into_iter().flatten().collect())
}

/// 从模型元数据中取出最大推理尺寸与类别标签
pub fn parse_model_metadata(
  metadata: &HashMap<String, String>,
) -> Result<(u32, Vec<String>), MetadataError> {
  let max_infer_size = parse_imgsz(metadata.get(IMGSZ_KEY).map(String::as_str))?;
  let names = metadata
    .get(NAMES_KEY)
    .ok_or(MetadataError::MissingField(NAMES_KEY))?;
  Ok((max_infer_size, parse_names(names)?))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn imgsz_defaults_and_takes_maximum() {
    assert_eq!(parse_imgsz(None), Ok(640));
    assert_eq!(parse_imgsz(Some("[1216, 1216]")), Ok(1216));
    assert_eq!(parse_imgsz(Some("[640, 960]")), Ok(960));
    assert_eq!(parse_imgsz(Some("1024")), Ok(1024));
  }

  #[test]
  fn malformed_imgsz_is_rejected() {
    for raw in ["[]", "\"640\"", "[640, \"a\"]", "nope", "0", "[-1]"] {
      assert!(
        matches!(parse_imgsz(Some(raw)), Err(MetadataError::InvalidImgsz(_))),
        "{raw}"
      );
    }
  }

  #[test]
  fn names_in_python_literal_form() {
    assert_eq!(
      parse_names("{0: 'face', 1: \"head\", 2: 'it\\'s'}").unwrap(),
      vec!["face", "head", "it's"]
    );
  }

  #[test]
  fn names_may_be_unordered_with_trailing_comma() {
    assert_eq!(
      parse_names(" { 1 : 'b' , 0 : 'a' , } ").unwrap(),
      vec!["a", "b"]
    );
    assert_eq!(parse_names("{}").unwrap(), Vec::<String>::new());
  }

  #[test]
  fn names_must_be_contiguous() {
    assert_eq!(
      parse_names("{0: 'a', 2: 'c'}"),
      Err(MetadataError::NonContiguousLabels {
        missing: 1,
        count: 2
      })
    );
    assert_eq!(
      parse_names("{0: 'a', 0: 'b'}"),
      Err(MetadataError::DuplicateLabel(0))
    );
  }

  #[test]
  fn anything_but_int_to_string_is_rejected() {
    for raw in [
      "{'a': 'b'}",
      "{0: 1}",
      "{0: 'a'",
      "[0, 1]",
      "{0: 'a'} extra",
      "{0: __import__('os')}",
      "{-1: 'a'}",
      "{0: 'a\\x41'}",
    ] {
      assert!(
        matches!(parse_names(raw), Err(MetadataError::InvalidNames { .. })),
        "{raw}"
      );
    }
  }

  #[test]
  fn model_metadata_requires_names() {
    let mut metadata = HashMap::new();
    metadata.insert("imgsz".to_string(), "[1216, 1216]".to_string());
    assert_eq!(
      parse_model_metadata(&metadata),
      Err(MetadataError::MissingField("names"))
    );

    metadata.insert("names".to_string(), "{0: 'face'}".to_string());
    assert_eq!(
      parse_model_metadata(&metadata),
      Ok((1216, vec!["face".to_string()]))
    );
  }
}
