//! 滑动窗口补丁调度。

use super::blend::{weight_map, BlendMode};
use super::iter::GridIter;
use crate::error::{EvalError, Result};
use ndarray::{s, Array3, SliceInfo, SliceInfoElem, Ix3, Ix4};
use std::ops::Range;

/// 体数据中的一个补丁位置（轴对齐包围盒）。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PatchPlacement {
    pub start: [usize; 3],
    pub size: [usize; 3],
}

impl PatchPlacement {
    #[inline]
    pub fn new(start: [usize; 3], size: [usize; 3]) -> Self {
        Self { start, size }
    }

    /// 终点（不含）。
    #[inline]
    pub fn end(&self) -> [usize; 3] {
        [
            self.start[0] + self.size[0],
            self.start[1] + self.size[1],
            self.start[2] + self.size[2],
        ]
    }

    #[inline]
    pub fn range(&self, axis: usize) -> Range<usize> {
        self.start[axis]..self.start[axis] + self.size[axis]
    }

    #[inline]
    pub fn contains(&self, index: [usize; 3]) -> bool {
        (0..3).all(|a| self.range(a).contains(&index[a]))
    }

    /// 用于`[X, Y, Z]`数组的切片。
    pub fn slice3(&self) -> SliceInfo<[SliceInfoElem; 3], Ix3, Ix3> {
        s![self.range(0), self.range(1), self.range(2)]
    }

    /// 用于`[C, X, Y, Z]`数组的切片（保留全部通道）。
    pub fn slice4(&self) -> SliceInfo<[SliceInfoElem; 4], Ix4, Ix4> {
        s![.., self.range(0), self.range(1), self.range(2)]
    }
}

/// 给定补丁大小与重叠率，为体数据生成覆盖全体素的补丁序列。
#[derive(Clone, Debug, PartialEq)]
pub struct PatchScheduler {
    patch: [usize; 3],
    overlap: f64,
    blend: BlendMode,
}

impl PatchScheduler {
    /// `overlap`必须在`[0, 1)`内，补丁各轴必须为正。
    pub fn new(patch: [usize; 3], overlap: f64) -> Result<Self> {
        if patch.contains(&0) {
            return Err(EvalError::geometry(format!("补丁大小 {patch:?} 含有0")));
        }
        if !(0.0..1.0).contains(&overlap) {
            return Err(EvalError::geometry(format!(
                "重叠率 {overlap} 不在 [0, 1) 内"
            )));
        }
        Ok(Self {
            patch,
            overlap,
            blend: BlendMode::default(),
        })
    }

    #[inline]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    #[inline]
    pub fn patch_size(&self) -> [usize; 3] {
        self.patch
    }

    #[inline]
    pub fn overlap(&self) -> f64 {
        self.overlap
    }

    #[inline]
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    /// 各轴步长`round(P * (1 - o))`，至少为1。取整采用“四舍六入五成双”。
    pub fn strides(&self) -> [usize; 3] {
        self.patch.map(|p| {
            let s = (p as f64 * (1.0 - self.overlap)).round_ties_even() as usize;
            s.max(1)
        })
    }

    /// 补丁的融合权重图。
    #[inline]
    pub fn weight_map(&self) -> Array3<f32> {
        weight_map(self.patch, self.blend)
    }

    /// 单个轴上的补丁起点。最后一个起点回拉到`len - patch`，使其恰好止于边界。
    fn axis_starts(len: usize, patch: usize, stride: usize) -> Vec<usize> {
        let mut starts = Vec::with_capacity((len - patch) / stride + 2);
        let mut s = 0;
        loop {
            if s + patch >= len {
                starts.push(len - patch);
                break;
            }
            starts.push(s);
            s += stride;
        }
        starts
    }

    /// 生成补丁序列：轴0最外层、轴2最内层。要求各轴`shape >= patch`（否则先填充）。
    pub fn schedule(&self, shape: [usize; 3]) -> Result<Vec<PatchPlacement>> {
        if (0..3).any(|a| self.patch[a] > shape[a]) {
            return Err(EvalError::geometry(format!(
                "补丁大小 {:?} 超出体数据形状 {shape:?}",
                self.patch
            )));
        }
        let strides = self.strides();
        let starts: Vec<Vec<usize>> = (0..3)
            .map(|a| Self::axis_starts(shape[a], self.patch[a], strides[a]))
            .collect();
        let counts = [starts[0].len(), starts[1].len(), starts[2].len()];
        Ok(GridIter::new(counts)
            .map(|[i, j, k]| {
                PatchPlacement::new([starts[0][i], starts[1][j], starts[2][k]], self.patch)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage(shape: [usize; 3], placements: &[PatchPlacement]) -> Array3<u32> {
        let mut count = Array3::<u32>::zeros((shape[0], shape[1], shape[2]));
        for p in placements {
            count.slice_mut(p.slice3()).mapv_inplace(|v| v + 1);
        }
        count
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(PatchScheduler::new([4, 4, 4], 1.0).is_err());
        assert!(PatchScheduler::new([4, 4, 4], -0.1).is_err());
        assert!(PatchScheduler::new([0, 4, 4], 0.5).is_err());
        let s = PatchScheduler::new([4, 4, 4], 0.25).unwrap();
        assert!(matches!(
            s.schedule([3, 8, 8]),
            Err(EvalError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_one_dimensional_overlap() {
        let s = PatchScheduler::new([4, 1, 1], 0.5).unwrap();
        let p = s.schedule([6, 1, 1]).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p[0].range(0), 0..4);
        assert_eq!(p[1].range(0), 2..6);
    }

    #[test]
    fn test_last_start_pulled_back() {
        let s = PatchScheduler::new([4, 4, 4], 0.0).unwrap();
        let p = s.schedule([10, 4, 8]).unwrap();
        assert_eq!(p.iter().map(|p| p.start[0]).max(), Some(6));
        assert_eq!(p.len(), 6);
        assert_eq!(p[0].start, [0, 0, 0]);
        assert_eq!(p[1].start, [0, 0, 4]);
        assert_eq!(p[5].start, [6, 0, 4]);
    }

    #[test]
    fn test_strides_round_half_even() {
        assert_eq!(PatchScheduler::new([4, 5, 1], 0.5).unwrap().strides(), [2, 2, 1]);
        assert_eq!(PatchScheduler::new([64, 64, 64], 0.25).unwrap().strides(), [48, 48, 48]);
        assert_eq!(PatchScheduler::new([3, 3, 3], 0.9).unwrap().strides(), [1, 1, 1]);
    }

    #[test]
    fn test_coverage_and_bounds() {
        for (shape, patch, overlap) in [
            ([6, 6, 6], [4, 4, 4], 0.5),
            ([17, 9, 33], [8, 9, 5], 0.25),
            ([13, 13, 13], [13, 2, 7], 0.0),
            ([20, 11, 5], [3, 3, 3], 0.7),
        ] {
            let s = PatchScheduler::new(patch, overlap).unwrap();
            let p = s.schedule(shape).unwrap();
            for pl in p.iter() {
                let end = pl.end();
                assert!((0..3).all(|a| end[a] <= shape[a]));
            }
            assert!(coverage(shape, &p).iter().all(|&c| c >= 1));
        }
    }

    #[test]
    fn test_deterministic() {
        let s = PatchScheduler::new([5, 6, 7], 0.4).unwrap();
        assert_eq!(s.schedule([31, 20, 18]).unwrap(), s.schedule([31, 20, 18]).unwrap());
    }
}
