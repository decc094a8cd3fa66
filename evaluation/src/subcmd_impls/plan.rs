use clap::Args;
use ndarray::Array3;
use segeval::prelude::*;
use std::fmt;

#[derive(Args, Debug)]
pub struct Plan {
    /// 体数据空间形状，如`240,240,155`。
    #[arg(long, short, value_parser = super::utils::positive_triple)]
    shape: [usize; 3],
    /// 补丁大小。
    #[arg(long, short, default_value = "32,32,32", value_parser = super::utils::positive_triple)]
    patch: [usize; 3],
    /// 相邻补丁的重叠率。
    #[arg(long, default_value_t = 0.25, value_parser = super::utils::overlap_in_range)]
    overlap: f64,
    /// 补丁融合权重。
    #[arg(long, default_value_t = BlendMode::Constant)]
    blend: BlendMode,
    /// 按模型约定调整补丁（`segcaps-2d`深度为1）。
    #[arg(long, short)]
    model: Option<ModelKind>,
    /// 逐个列出补丁位置。
    #[arg(long, short)]
    list: bool,
}

/// 一次调度的覆盖统计。
struct PlanReport {
    patch: [usize; 3],
    padding: Padding,
    strides: [usize; 3],
    placements: Vec<PatchPlacement>,
    min_cover: u32,
    max_cover: u32,
    min_weight: f32,
}

impl Plan {
    fn report(&self) -> segeval::error::Result<PlanReport> {
        let patch = self.model.map_or(self.patch, |m| m.patch_for(self.patch));
        let scheduler = PatchScheduler::new(patch, self.overlap)?.with_blend(self.blend);
        let padding = Padding::to_fit(self.shape, patch);
        let [x, y, z] = padding.padded_shape(self.shape);
        let placements = scheduler.schedule([x, y, z])?;

        let weights = scheduler.weight_map();
        let mut cover = Array3::<u32>::zeros((x, y, z));
        let mut acc = Array3::<f32>::zeros((x, y, z));
        for p in placements.iter() {
            cover.slice_mut(p.slice3()).mapv_inplace(|v| v + 1);
            acc.slice_mut(p.slice3()).scaled_add(1.0, &weights);
        }
        Ok(PlanReport {
            patch,
            padding,
            strides: scheduler.strides(),
            min_cover: cover.iter().copied().min().unwrap_or(0),
            max_cover: cover.iter().copied().max().unwrap_or(0),
            min_weight: acc.iter().copied().fold(f32::INFINITY, f32::min),
            placements,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let report = self.report()?;
        println!("{report}");
        if self.list {
            for (i, p) in report.placements.iter().enumerate() {
                println!("{i:>6}: {:?} .. {:?}", p.start, p.end());
            }
        }
        Ok(())
    }
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "patch: {:?}", self.patch)?;
        writeln!(f, "strides: {:?}", self.strides)?;
        if !self.padding.is_empty() {
            writeln!(
                f,
                "padding: before {:?} after {:?}",
                self.padding.before, self.padding.after
            )?;
        }
        writeln!(f, "placements: {}", self.placements.len())?;
        writeln!(f, "coverage: {} ..= {}", self.min_cover, self.max_cover)?;
        write!(f, "min accumulated weight: {:.6}", self.min_weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(shape: [usize; 3], patch: [usize; 3], overlap: f64) -> Plan {
        Plan {
            shape,
            patch,
            overlap,
            blend: BlendMode::Gaussian,
            model: None,
            list: false,
        }
    }

    #[test]
    fn test_full_coverage() {
        let r = plan([10, 9, 7], [4, 4, 4], 0.25).report().unwrap();
        assert_eq!(r.strides, [3, 3, 3]);
        assert_eq!(r.placements.len(), 3 * 3 * 2);
        assert!(r.min_cover >= 1);
        assert!(r.min_weight > 0.0);
        assert!(r.padding.is_empty());
    }

    #[test]
    fn test_small_volume_padded() {
        let r = plan([3, 5, 6], [4, 4, 4], 0.5).report().unwrap();
        assert_eq!(r.padding.before, [0, 0, 0]);
        assert_eq!(r.padding.after, [1, 0, 0]);
        assert!(r.min_cover >= 1);
        assert!(r.to_string().contains("padding: before [0, 0, 0] after [1, 0, 0]"));
    }

    #[test]
    fn test_slice_wise_model() {
        let mut p = plan([8, 8, 5], [4, 4, 4], 0.0);
        p.model = Some(ModelKind::Segcaps2d);
        let r = p.report().unwrap();
        assert_eq!(r.patch, [4, 4, 1]);
        assert_eq!(r.placements.len(), 2 * 2 * 5);
        assert_eq!((r.min_cover, r.max_cover), (1, 1));
    }
}
