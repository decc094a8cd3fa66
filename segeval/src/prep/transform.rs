//! 确定性的体数据变换：强度缩放、填充与裁剪。

use ndarray::{s, Array4, ArrayView4};
use std::fmt;
use std::str::FromStr;

/// 将整个图像线性缩放到`[0, 1]`。常数图像被置为0。
pub fn scale_intensity(image: &mut Array4<f32>) {
    let (min, max) = image
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if min >= max {
        image.fill(0.0);
        return;
    }
    let range = max - min;
    image.mapv_inplace(|v| (v - min) / range);
}

/// 填充方式。
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PadMode {
    /// 复制边缘体素。
    #[default]
    Edge,
    /// 填充0。
    Constant,
}

impl FromStr for PadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edge" => Ok(PadMode::Edge),
            "constant" => Ok(PadMode::Constant),
            _ => Err(format!("未知的填充方式 `{s}`，可选 edge / constant")),
        }
    }
}

impl fmt::Display for PadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PadMode::Edge => "edge",
            PadMode::Constant => "constant",
        })
    }
}

/// 各轴前后的填充量。
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Padding {
    pub before: [usize; 3],
    pub after: [usize; 3],
}

impl Padding {
    /// 使`shape`的每个轴至少达到`patch`大小的对称填充；缺额为奇数时后侧多一个。
    pub fn to_fit(shape: [usize; 3], patch: [usize; 3]) -> Self {
        let mut p = Self::default();
        for axis in 0..3 {
            let deficit = patch[axis].saturating_sub(shape[axis]);
            p.before[axis] = deficit / 2;
            p.after[axis] = deficit - deficit / 2;
        }
        p
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.before == [0; 3] && self.after == [0; 3]
    }

    #[inline]
    pub fn padded_shape(&self, shape: [usize; 3]) -> [usize; 3] {
        [
            shape[0] + self.before[0] + self.after[0],
            shape[1] + self.before[1] + self.after[1],
            shape[2] + self.before[2] + self.after[2],
        ]
    }
}

/// 按`padding`填充`[C, X, Y, Z]`数组的空间轴。
pub fn pad(array: ArrayView4<f32>, padding: &Padding, mode: PadMode) -> Array4<f32> {
    if padding.is_empty() {
        return array.to_owned();
    }
    let (c, x, y, z) = array.dim();
    let shape = [x, y, z];
    let [px, py, pz] = padding.padded_shape(shape);
    let source = |o: usize, axis: usize| -> Option<usize> {
        let i = o as isize - padding.before[axis] as isize;
        let n = shape[axis] as isize;
        match mode {
            _ if (0..n).contains(&i) => Some(i as usize),
            PadMode::Edge => Some(i.clamp(0, n - 1) as usize),
            PadMode::Constant => None,
        }
    };
    Array4::from_shape_fn((c, px, py, pz), |(ch, i, j, k)| {
        match (source(i, 0), source(j, 1), source(k, 2)) {
            (Some(a), Some(b), Some(d)) => array[[ch, a, b, d]],
            _ => 0.0,
        }
    })
}

/// `pad`的逆操作：裁掉填充部分。
pub fn crop(array: Array4<f32>, padding: &Padding) -> Array4<f32> {
    if padding.is_empty() {
        return array;
    }
    let (_, x, y, z) = array.dim();
    let b = padding.before;
    let e = [x - padding.after[0], y - padding.after[1], z - padding.after[2]];
    array
        .slice(s![.., b[0]..e[0], b[1]..e[1], b[2]..e[2]])
        .to_owned()
}
