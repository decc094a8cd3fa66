//! 支持的数据集及其评估约定。

use crate::error::Result;
use crate::io::{Preprocess, Split};
use crate::metric::Reduction;
use crate::post::LabelMap;
use crate::prep::Orientation;
use std::fmt;
use std::str::FromStr;

/// iseg2017四个类别在磁盘上的原始取值。
const ISEG_RAW_VALUES: [u8; 4] = [0, 10, 150, 250];

/// 数据集种类。启动时选定一次，决定方向、聚合方式与保存时的标签映射。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DatasetKind {
    /// 婴儿脑MRI，4类（背景、脑脊液、灰质、白质）。
    Iseg2017,
    /// Medical Segmentation Decathlon Task02，左心房。
    Task02Heart,
    /// Medical Segmentation Decathlon Task04，海马体前后部。
    Task04Hippocampus,
    /// LUNA16肺部CT。
    Luna16,
    /// SHREC冷冻电镜断层。
    Shrec,
    /// 体外冷冻电镜断层。
    Invitro,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 6] = [
        DatasetKind::Iseg2017,
        DatasetKind::Task02Heart,
        DatasetKind::Task04Hippocampus,
        DatasetKind::Luna16,
        DatasetKind::Shrec,
        DatasetKind::Invitro,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Iseg2017 => "iseg2017",
            DatasetKind::Task02Heart => "task02_heart",
            DatasetKind::Task04Hippocampus => "task04_hippocampus",
            DatasetKind::Luna16 => "luna16",
            DatasetKind::Shrec => "shrec",
            DatasetKind::Invitro => "invitro",
        }
    }

    /// iseg2017报告平均值，其余数据集报告中位数。
    #[inline]
    pub fn default_reduction(self) -> Reduction {
        match self {
            DatasetKind::Iseg2017 => Reduction::Mean,
            _ => Reduction::Median,
        }
    }

    /// 推理前统一到的方向。
    pub fn axcodes(self) -> &'static str {
        match self {
            DatasetKind::Shrec | DatasetKind::Invitro => "LPI",
            _ => "RAS",
        }
    }

    /// 不指定时评估的清单划分。冷冻电镜数据集只有`training`与`test`两个划分。
    pub fn default_split(self) -> Split {
        match self {
            DatasetKind::Shrec | DatasetKind::Invitro => Split::Training,
            _ => Split::Validation,
        }
    }

    /// 保存预测前的标签值映射。
    pub fn save_label_map(self) -> Option<LabelMap> {
        match self {
            DatasetKind::Iseg2017 => LabelMap::new(&[0, 1, 2, 3], &ISEG_RAW_VALUES).ok(),
            _ => None,
        }
    }

    /// 加载时把磁盘上的标签取值映射为类别索引，是[`DatasetKind::save_label_map`]的逆映射。
    pub fn load_label_map(self) -> Option<LabelMap> {
        match self {
            DatasetKind::Iseg2017 => LabelMap::new(&ISEG_RAW_VALUES, &[0, 1, 2, 3]).ok(),
            _ => None,
        }
    }

    /// 加载时的预处理。
    pub fn preprocess(self) -> Result<Preprocess> {
        Ok(Preprocess {
            axcodes: Some(Orientation::from_axcodes(self.axcodes())?),
            scale_intensity: true,
            label_map: self.load_label_map(),
        })
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DatasetKind::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = DatasetKind::ALL.iter().map(|d| d.name()).collect();
                format!("未知的数据集 `{s}`，可选 {}", names.join(" / "))
            })
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
