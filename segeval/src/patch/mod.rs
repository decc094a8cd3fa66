//! 滑动窗口补丁调度、融合权重与整体重建。

pub mod blend;
pub mod iter;
pub mod recon;
pub mod sched;

pub use blend::BlendMode;
pub use iter::GridIter;
pub use recon::{Inference, InferenceReconstructor};
pub use sched::{PatchPlacement, PatchScheduler};
