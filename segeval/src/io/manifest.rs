//! decathlon格式的`dataset.json`清单。

use crate::error::{EvalError, Result};
use json::JsonValue;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// 清单文件名。
pub const MANIFEST_FILE: &str = "dataset.json";

/// 清单中的数据划分。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Split {
    Training,
    Validation,
    Test,
}

impl Split {
    /// 清单中对应的键名。
    pub fn key(self) -> &'static str {
        match self {
            Split::Training => "training",
            Split::Validation => "validation",
            Split::Test => "test",
        }
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "training" => Ok(Split::Training),
            "validation" => Ok(Split::Validation),
            "test" => Ok(Split::Test),
            _ => Err(format!("未知的数据划分 `{s}`，可选 training / validation / test")),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 一个样本的图像与（可选的）标签路径，均已相对数据集根目录解析。
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ImageLabelPair {
    pub image: PathBuf,
    pub label: Option<PathBuf>,
}

/// 去掉`.`，并在可能时消去`..`，不访问文件系统。
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// 已解析的清单。
#[derive(Clone, Debug)]
pub struct Manifest {
    root: PathBuf,
    path: PathBuf,
    doc: JsonValue,
}

impl Manifest {
    /// 读取`root/dataset.json`。相对的`root`先相对当前目录转为绝对路径，样本路径因此都是绝对路径。
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = normalize(&std::path::absolute(root.as_ref())?);
        let path = root.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(|e| EvalError::Manifest {
            path: path.clone(),
            msg: e.to_string(),
        })?;
        Self::parse(&root, path, &text)
    }

    /// 从字符串解析，路径相对`root`解析。
    pub fn from_text(root: impl AsRef<Path>, text: &str) -> Result<Self> {
        let root = root.as_ref();
        Self::parse(root, root.join(MANIFEST_FILE), text)
    }

    fn parse(root: &Path, path: PathBuf, text: &str) -> Result<Self> {
        let doc = json::parse(text).map_err(|e| EvalError::Manifest {
            path: path.clone(),
            msg: e.to_string(),
        })?;
        if !doc.is_object() {
            return Err(EvalError::Manifest {
                path,
                msg: "顶层不是对象".into(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
            path,
            doc,
        })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn error(&self, msg: String) -> EvalError {
        EvalError::Manifest {
            path: self.path.clone(),
            msg,
        }
    }

    fn resolve(&self, value: &JsonValue, what: &str, idx: usize, split: Split) -> Result<PathBuf> {
        value
            .as_str()
            .map(|s| normalize(&self.root.join(s)))
            .ok_or_else(|| self.error(format!("{split}[{idx}] 的 `{what}` 不是字符串")))
    }

    /// 给定划分的全部样本，保持清单中的顺序。
    ///
    /// 条目可以是`{"image": .., "label": ..}`对象，也可以是单独的图像路径（测试集常见）。
    pub fn pairs(&self, split: Split) -> Result<Vec<ImageLabelPair>> {
        let list = &self.doc[split.key()];
        if !list.is_array() {
            return Err(self.error(format!("缺少数组 `{split}`")));
        }
        list.members()
            .enumerate()
            .map(|(idx, entry)| {
                if entry.is_string() {
                    return Ok(ImageLabelPair {
                        image: self.resolve(entry, "image", idx, split)?,
                        label: None,
                    });
                }
                if !entry.is_object() {
                    return Err(self.error(format!("{split}[{idx}] 既不是对象也不是路径")));
                }
                let image = self.resolve(&entry["image"], "image", idx, split)?;
                let label = match &entry["label"] {
                    JsonValue::Null => None,
                    v => Some(self.resolve(v, "label", idx, split)?),
                };
                Ok(ImageLabelPair { image, label })
            })
            .collect()
    }

    /// 清单声明的类别数（`labels`对象的键数），未声明时为`None`。
    pub fn declared_classes(&self) -> Option<usize> {
        let labels = &self.doc["labels"];
        labels.is_object().then(|| labels.len())
    }
}
