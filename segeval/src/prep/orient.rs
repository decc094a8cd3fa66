//! 体数据方向（axcodes）与重定向。
//!
//! 世界坐标采用RAS+约定：axcode字母表示该体素轴索引递增时指向的方向，
//! `L/R`对应世界x轴，`P/A`对应y轴，`I/S`对应z轴。

use crate::error::{EvalError, Result};
use crate::volume::{affine_mul, Affine};
use ndarray::{Array3, Array4, Axis};

const AXIS_LABELS: [(char, char); 3] = [('L', 'R'), ('P', 'A'), ('I', 'S')];

/// 单个体素轴对应的世界轴，以及是否与世界轴正方向相反。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AxisCode {
    pub world: usize,
    pub flipped: bool,
}

impl AxisCode {
    #[inline]
    pub fn letter(self) -> char {
        let (neg, pos) = AXIS_LABELS[self.world];
        if self.flipped {
            neg
        } else {
            pos
        }
    }
}

/// 三个体素轴的方向。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Orientation(pub [AxisCode; 3]);

impl Orientation {
    /// 由仿射矩阵推断方向：反复取旋转缩放部分绝对值最大的元素，确定一对（世界轴，体素轴）。
    pub fn from_affine(affine: &Affine) -> Self {
        let mut codes: [Option<AxisCode>; 3] = [None; 3];
        let mut world_used = [false; 3];
        for _ in 0..3 {
            let mut best: Option<(usize, usize, f64)> = None;
            for (w, row) in affine.iter().take(3).enumerate() {
                if world_used[w] {
                    continue;
                }
                for (v, &value) in row.iter().take(3).enumerate() {
                    if codes[v].is_some() {
                        continue;
                    }
                    if best.map_or(true, |(_, _, b)| value.abs() > b.abs()) {
                        best = Some((w, v, value));
                    }
                }
            }
            if let Some((w, v, value)) = best {
                world_used[w] = true;
                codes[v] = Some(AxisCode {
                    world: w,
                    flipped: value < 0.0,
                });
            }
        }
        let mut out = [AxisCode {
            world: 0,
            flipped: false,
        }; 3];
        for (v, code) in codes.iter().enumerate() {
            // 退化矩阵（整列为零）时按顺序补齐
            out[v] = code.unwrap_or(AxisCode {
                world: v,
                flipped: false,
            });
        }
        Self(out)
    }

    /// 解析形如`"LPI"`、`"RAS"`的三字母代码。
    pub fn from_axcodes(codes: &str) -> Result<Self> {
        let err = || EvalError::Config(format!("非法的方向代码 `{codes}`"));
        let chars: Vec<char> = codes.chars().map(|c| c.to_ascii_uppercase()).collect();
        if chars.len() != 3 {
            return Err(err());
        }
        let mut out = [AxisCode {
            world: 0,
            flipped: false,
        }; 3];
        let mut seen = [false; 3];
        for (v, c) in chars.into_iter().enumerate() {
            let (world, flipped) = AXIS_LABELS
                .iter()
                .enumerate()
                .find_map(|(w, &(neg, pos))| match c {
                    _ if c == neg => Some((w, true)),
                    _ if c == pos => Some((w, false)),
                    _ => None,
                })
                .ok_or_else(err)?;
            if seen[world] {
                return Err(err());
            }
            seen[world] = true;
            out[v] = AxisCode { world, flipped };
        }
        Ok(Self(out))
    }

    pub fn axcodes(&self) -> String {
        self.0.iter().map(|c| c.letter()).collect()
    }
}

/// 先置换、后翻转的轴变换：新轴`j`取自旧轴`perm[j]`，若`flip[j]`则沿新轴`j`翻转。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Reorientation {
    pub perm: [usize; 3],
    pub flip: [bool; 3],
}

impl Reorientation {
    #[inline]
    pub const fn identity() -> Self {
        Self {
            perm: [0, 1, 2],
            flip: [false; 3],
        }
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// 从方向`from`变换到方向`to`所需的轴变换。
    pub fn between(from: Orientation, to: Orientation) -> Self {
        let mut perm = [0; 3];
        let mut flip = [false; 3];
        for (j, target) in to.0.iter().enumerate() {
            // `to`的三个世界轴互不相同，`from`同样如此，因此总能找到
            let i = from
                .0
                .iter()
                .position(|c| c.world == target.world)
                .unwrap_or(j);
            perm[j] = i;
            flip[j] = from.0[i].flipped != target.flipped;
        }
        Self { perm, flip }
    }

    /// 逆变换。
    pub fn inverse(&self) -> Self {
        let mut perm = [0; 3];
        for (j, &i) in self.perm.iter().enumerate() {
            perm[i] = j;
        }
        let flip = [
            self.flip[perm[0]],
            self.flip[perm[1]],
            self.flip[perm[2]],
        ];
        Self { perm, flip }
    }

    /// 变换后的空间形状。
    pub fn shape_after(&self, shape: [usize; 3]) -> [usize; 3] {
        [shape[self.perm[0]], shape[self.perm[1]], shape[self.perm[2]]]
    }

    /// 对`[X, Y, Z]`数组施加变换。
    pub fn apply3<A: Clone>(&self, array: Array3<A>) -> Array3<A> {
        if self.is_identity() {
            return array;
        }
        let mut v = array.permuted_axes(self.perm);
        for (j, &f) in self.flip.iter().enumerate() {
            if f {
                v.invert_axis(Axis(j));
            }
        }
        v.as_standard_layout().into_owned()
    }

    /// 对`[C, X, Y, Z]`数组的空间轴施加变换，通道轴不动。
    pub fn apply4<A: Clone>(&self, array: Array4<A>) -> Array4<A> {
        if self.is_identity() {
            return array;
        }
        let p = self.perm;
        let mut v = array.permuted_axes([0, p[0] + 1, p[1] + 1, p[2] + 1]);
        for (j, &f) in self.flip.iter().enumerate() {
            if f {
                v.invert_axis(Axis(j + 1));
            }
        }
        v.as_standard_layout().into_owned()
    }

    /// 变换后网格对应的仿射矩阵。`shape`为变换前的空间形状。
    pub fn affine_after(&self, affine: &Affine, shape: [usize; 3]) -> Affine {
        // m: 新体素坐标 -> 旧体素坐标
        let mut m = [[0.0; 4]; 4];
        m[3][3] = 1.0;
        for (j, &i) in self.perm.iter().enumerate() {
            if self.flip[j] {
                m[i][j] = -1.0;
                m[i][3] = shape[i] as f64 - 1.0;
            } else {
                m[i][j] = 1.0;
            }
        }
        affine_mul(affine, &m)
    }
}

impl Default for Reorientation {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::IDENTITY_AFFINE;

    fn diag(x: f64, y: f64, z: f64) -> Affine {
        [
            [x, 0.0, 0.0, 0.0],
            [0.0, y, 0.0, 0.0],
            [0.0, 0.0, z, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    #[test]
    fn test_axcodes_from_affine() {
        assert_eq!(Orientation::from_affine(&IDENTITY_AFFINE).axcodes(), "RAS");
        assert_eq!(Orientation::from_affine(&diag(-1.0, -2.0, 3.0)).axcodes(), "LPS");
        let swapped: Affine = [
            [0.0, 0.0, -1.5, 0.0],
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        assert_eq!(Orientation::from_affine(&swapped).axcodes(), "ASL");
    }

    #[test]
    fn test_parse_axcodes() {
        let o = Orientation::from_axcodes("lpi").unwrap();
        assert_eq!(o.axcodes(), "LPI");
        assert!(Orientation::from_axcodes("LRI").is_err());
        assert!(Orientation::from_axcodes("LP").is_err());
        assert!(Orientation::from_axcodes("XYZ").is_err());
    }

    #[test]
    fn test_reorient_flip_and_back() {
        let from = Orientation::from_affine(&diag(1.0, 1.0, 1.0));
        let to = Orientation::from_axcodes("LPI").unwrap();
        let r = Reorientation::between(from, to);
        assert_eq!(r.perm, [0, 1, 2]);
        assert_eq!(r.flip, [true, true, true]);

        let a = Array3::from_shape_fn((2, 3, 4), |(x, y, z)| (x * 100 + y * 10 + z) as u16);
        let b = r.apply3(a.clone());
        assert_eq!(b[[0, 0, 0]], a[[1, 2, 3]]);
        assert_eq!(r.inverse().apply3(b), a);
    }

    #[test]
    fn test_reorient_permutation_roundtrip() {
        let from = Orientation::from_axcodes("SRA").unwrap();
        let to = Orientation::from_axcodes("LPI").unwrap();
        let r = Reorientation::between(from, to);
        assert_eq!(r.perm, [1, 2, 0]);
        assert_eq!(r.shape_after([5, 6, 7]), [6, 7, 5]);

        let a = Array4::from_shape_fn((2, 5, 6, 7), |(c, x, y, z)| (c * 1000 + x * 100 + y * 10 + z) as i32);
        let b = r.apply4(a.clone());
        assert_eq!(b.dim(), (2, 6, 7, 5));
        assert_eq!(r.inverse().apply4(b), a);
    }

    #[test]
    fn test_affine_after_keeps_world_position() {
        let affine: Affine = [
            [2.0, 0.0, 0.0, -10.0],
            [0.0, 2.0, 0.0, 4.0],
            [0.0, 0.0, 3.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let shape = [4, 5, 6];
        let r = Reorientation::between(
            Orientation::from_affine(&affine),
            Orientation::from_axcodes("LPI").unwrap(),
        );
        let new_affine = r.affine_after(&affine, shape);
        assert_eq!(Orientation::from_affine(&new_affine).axcodes(), "LPI");
        // 新网格原点是旧网格(3, 4, 5)
        assert_eq!(new_affine[0][3], 2.0 * 3.0 - 10.0);
        assert_eq!(new_affine[1][3], 2.0 * 4.0 + 4.0);
        assert_eq!(new_affine[2][3], 3.0 * 5.0 + 1.0);
    }
}
