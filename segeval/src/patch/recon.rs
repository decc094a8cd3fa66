//! 补丁推理与整体重建。

use super::sched::{PatchPlacement, PatchScheduler};
use crate::error::EvalError;
use crate::prep::Padding;
use crate::volume::SpatialMeta;
use ndarray::{Array3, Array4, Array5, ArrayView4, ArrayView5, Axis, Zip};
use tracing::debug;

/// 补丁级推理函数，由模型后端实现。
pub trait Inference {
    type Error: std::error::Error + Send + Sync + 'static;

    /// 开始处理一个新的体数据。`padding`是调度前施加在图像上的填充，补丁位置以填充后的网格计。
    fn begin_volume(&mut self, _meta: &SpatialMeta, _padding: &Padding) -> Result<(), Self::Error> {
        Ok(())
    }

    /// 输入`[N, C_in, px, py, pz]`，输出同空间大小的类别分数`[N, C_out, px, py, pz]`。
    ///
    /// `placements[n]`是第`n`个补丁在（填充后）体数据中的位置；只看补丁内容的模型可以忽略它。
    fn infer(
        &mut self,
        patches: ArrayView5<'_, f32>,
        placements: &[PatchPlacement],
    ) -> Result<Array5<f32>, Self::Error>;
}

impl<T: Inference + ?Sized> Inference for &mut T {
    type Error = T::Error;

    #[inline]
    fn begin_volume(&mut self, meta: &SpatialMeta, padding: &Padding) -> Result<(), Self::Error> {
        (**self).begin_volume(meta, padding)
    }

    #[inline]
    fn infer(
        &mut self,
        patches: ArrayView5<'_, f32>,
        placements: &[PatchPlacement],
    ) -> Result<Array5<f32>, Self::Error> {
        (**self).infer(patches, placements)
    }
}

#[inline]
fn inference_failure(msg: String) -> EvalError {
    EvalError::InferenceFailure(msg.into())
}

/// 逐批推理补丁，按融合权重累加后归一化，得到整体分数。
pub struct InferenceReconstructor {
    scheduler: PatchScheduler,
    batch_size: usize,
    weights: Array3<f32>,
}

impl InferenceReconstructor {
    /// `batch_size`为每次推理调用的补丁数，至少为1；它只影响吞吐，不影响结果。
    pub fn new(scheduler: PatchScheduler, batch_size: usize) -> Self {
        let weights = scheduler.weight_map();
        Self {
            scheduler,
            batch_size: batch_size.max(1),
            weights,
        }
    }

    #[inline]
    pub fn scheduler(&self) -> &PatchScheduler {
        &self.scheduler
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 对`[C_in, X, Y, Z]`图像做滑动窗口推理，返回`[C_out, X, Y, Z]`分数。不修改输入。
    pub fn reconstruct<M: Inference>(
        &self,
        image: ArrayView4<f32>,
        model: &mut M,
    ) -> Result<Array4<f32>, EvalError> {
        let (c_in, x, y, z) = image.dim();
        let shape = [x, y, z];
        let placements = self.scheduler.schedule(shape)?;
        let [px, py, pz] = self.scheduler.patch_size();
        debug!("体数据 {shape:?} 共 {} 个补丁", placements.len());

        let mut scores: Option<Array4<f32>> = None;
        let mut norm = Array3::<f32>::zeros((x, y, z));

        for chunk in placements.chunks(self.batch_size) {
            let mut batch = Array5::<f32>::zeros((chunk.len(), c_in, px, py, pz));
            for (n, p) in chunk.iter().enumerate() {
                batch
                    .index_axis_mut(Axis(0), n)
                    .assign(&image.slice(p.slice4()));
            }

            let out = model
                .infer(batch.view(), chunk)
                .map_err(|e| EvalError::InferenceFailure(Box::new(e)))?;
            let (n_out, c_out, ox, oy, oz) = out.dim();
            if n_out != chunk.len() || [ox, oy, oz] != [px, py, pz] {
                return Err(inference_failure(format!(
                    "模型输出形状 {:?} 与输入补丁 ({}, _, {px}, {py}, {pz}) 不符",
                    out.shape(),
                    chunk.len()
                )));
            }
            let acc = scores.get_or_insert_with(|| Array4::zeros((c_out, x, y, z)));
            if acc.dim().0 != c_out {
                return Err(inference_failure(format!(
                    "模型输出通道数在批次间变化: {} -> {c_out}",
                    acc.dim().0
                )));
            }

            for (n, p) in chunk.iter().enumerate() {
                let patch_scores = out.index_axis(Axis(0), n);
                Zip::from(acc.slice_mut(p.slice4()))
                    .and(&patch_scores)
                    .and_broadcast(&self.weights)
                    .for_each(|a, &s, &w| *a += s * w);
                let mut n_region = norm.slice_mut(p.slice3());
                n_region += &self.weights;
            }
        }

        let mut scores =
            scores.ok_or_else(|| EvalError::geometry(format!("体数据 {shape:?} 没有任何补丁")))?;
        // 每个体素至少被一个补丁覆盖且权重为正，分母不为0
        Zip::from(&mut scores)
            .and_broadcast(&norm)
            .for_each(|s, &w| *s /= w);
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::BlendMode;
    use ndarray::s;
    use std::fmt;

    #[derive(Debug)]
    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("broken patch")
        }
    }

    impl std::error::Error for Broken {}

    /// 对任何补丁输出常数。
    struct ConstModel {
        value: f32,
        channels: usize,
        calls: usize,
    }

    impl Inference for ConstModel {
        type Error = Broken;

        fn infer(
            &mut self,
            patches: ArrayView5<'_, f32>,
            _placements: &[PatchPlacement],
        ) -> Result<Array5<f32>, Self::Error> {
            self.calls += 1;
            let (n, _, x, y, z) = patches.dim();
            Ok(Array5::from_elem((n, self.channels, x, y, z), self.value))
        }
    }

    /// 原样返回输入补丁。
    struct Identity;

    impl Inference for Identity {
        type Error = Broken;

        fn infer(
            &mut self,
            patches: ArrayView5<'_, f32>,
            _placements: &[PatchPlacement],
        ) -> Result<Array5<f32>, Self::Error> {
            Ok(patches.to_owned())
        }
    }

    /// 第`fail_at`次调用返回错误。
    struct FailAt {
        fail_at: usize,
        calls: usize,
    }

    impl Inference for FailAt {
        type Error = Broken;

        fn infer(
            &mut self,
            patches: ArrayView5<'_, f32>,
            _placements: &[PatchPlacement],
        ) -> Result<Array5<f32>, Self::Error> {
            self.calls += 1;
            if self.calls == self.fail_at {
                return Err(Broken);
            }
            Ok(patches.to_owned())
        }
    }

    fn ramp(c: usize, shape: [usize; 3]) -> Array4<f32> {
        Array4::from_shape_fn((c, shape[0], shape[1], shape[2]), |(c, i, j, k)| {
            (c * 1000 + i * 100 + j * 10 + k) as f32
        })
    }

    #[test]
    fn test_overlap_is_averaged_not_summed() {
        let sched = PatchScheduler::new([4, 1, 1], 0.5).unwrap();
        let r = InferenceReconstructor::new(sched, 1);
        let image = Array4::<f32>::zeros((1, 6, 1, 1));
        let mut m = ConstModel {
            value: 1.0,
            channels: 1,
            calls: 0,
        };
        let out = r.reconstruct(image.view(), &mut m).unwrap();
        assert_eq!(m.calls, 2);
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!((out[[0, 2, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((out[[0, 3, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_identity_all_blends_and_batches() {
        for blend in [BlendMode::Constant, BlendMode::Cosine, BlendMode::Gaussian] {
            for batch in [1, 3, 64] {
                let sched = PatchScheduler::new([4, 5, 3], 0.4)
                    .unwrap()
                    .with_blend(blend);
                let r = InferenceReconstructor::new(sched, batch);
                let image = ramp(2, [9, 11, 7]);
                let mut m = ConstModel {
                    value: 0.375,
                    channels: 3,
                    calls: 0,
                };
                let out = r.reconstruct(image.view(), &mut m).unwrap();
                assert_eq!(out.dim(), (3, 9, 11, 7));
                assert!(out.iter().all(|&v| (v - 0.375).abs() < 1e-5), "{blend} {batch}");
            }
        }
    }

    #[test]
    fn test_identity_model_reconstructs_input() {
        let image = ramp(2, [10, 7, 6]);
        let sched = PatchScheduler::new([4, 4, 4], 0.5)
            .unwrap()
            .with_blend(BlendMode::Gaussian);
        let r = InferenceReconstructor::new(sched, 2);
        let out = r.reconstruct(image.view(), &mut Identity).unwrap();
        Zip::from(&out).and(&image).for_each(|&a, &b| {
            assert!((a - b).abs() <= 1e-3 * b.abs().max(1.0));
        });
    }

    #[test]
    fn test_batching_matches_single() {
        let image = ramp(1, [12, 9, 8]);
        let sched = PatchScheduler::new([5, 4, 4], 0.3)
            .unwrap()
            .with_blend(BlendMode::Cosine);
        let one = InferenceReconstructor::new(sched.clone(), 1)
            .reconstruct(image.view(), &mut Identity)
            .unwrap();
        let many = InferenceReconstructor::new(sched, 7)
            .reconstruct(image.view(), &mut Identity)
            .unwrap();
        Zip::from(&one).and(&many).for_each(|&a, &b| {
            assert!((a - b).abs() <= 1e-4 * a.abs().max(1.0));
        });
    }

    #[test]
    fn test_input_not_mutated() {
        let image = ramp(1, [6, 6, 6]);
        let before = image.clone();
        let sched = PatchScheduler::new([4, 4, 4], 0.5).unwrap();
        InferenceReconstructor::new(sched, 2)
            .reconstruct(image.view(), &mut Identity)
            .unwrap();
        assert_eq!(image, before);
    }

    #[test]
    fn test_inference_error_is_fatal() {
        let image = ramp(1, [8, 8, 8]);
        let sched = PatchScheduler::new([4, 4, 4], 0.0).unwrap();
        let mut m = FailAt {
            fail_at: 3,
            calls: 0,
        };
        let err = InferenceReconstructor::new(sched, 1)
            .reconstruct(image.view(), &mut m)
            .unwrap_err();
        assert!(err.is_inference_failure());
        assert_eq!(m.calls, 3);
    }

    #[test]
    fn test_wrong_output_shape_rejected() {
        struct Shrink;
        impl Inference for Shrink {
            type Error = Broken;
            fn infer(
                &mut self,
                patches: ArrayView5<'_, f32>,
                _placements: &[PatchPlacement],
            ) -> Result<Array5<f32>, Self::Error> {
                Ok(patches.slice(s![.., .., ..2, .., ..]).to_owned())
            }
        }
        let image = ramp(1, [4, 4, 4]);
        let sched = PatchScheduler::new([4, 4, 4], 0.0).unwrap();
        let err = InferenceReconstructor::new(sched, 1)
            .reconstruct(image.view(), &mut Shrink)
            .unwrap_err();
        assert!(err.is_inference_failure());
    }

    #[test]
    fn test_patch_larger_than_volume() {
        let image = ramp(1, [3, 8, 8]);
        let sched = PatchScheduler::new([4, 4, 4], 0.0).unwrap();
        let err = InferenceReconstructor::new(sched, 1)
            .reconstruct(image.view(), &mut Identity)
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidGeometry(_)));
    }
}
