//! 体数据的加载、预处理与按清单顺序的预取。

use super::manifest::ImageLabelPair;
use super::nii::read_volume;
use crate::error::{EvalError, Result};
use crate::post::{LabelMap, MAX_CLASSES};
use crate::prep::{scale_intensity, Orientation, Reorientation};
use crate::volume::{SpatialMeta, Volume};
use ndarray::{Array3, Axis};
use std::collections::BTreeMap;
use std::io;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use threadpool::ThreadPool;
use tracing::debug;

/// 加载后、推理前施加的确定性变换。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Preprocess {
    /// 目标方向；`None`表示保持磁盘上的方向。
    pub axcodes: Option<Orientation>,
    /// 是否把图像强度缩放到`[0, 1]`。
    pub scale_intensity: bool,
    /// 把磁盘上的标签取值映射为类别索引。
    pub label_map: Option<LabelMap>,
}

/// 标签必须是`[0, 255]`内的整数。
pub(crate) fn to_label(raw: Array3<f32>) -> Result<Array3<u8>> {
    if let Some(&bad) = raw
        .iter()
        .find(|&&v| !(v.fract() == 0.0 && (0.0..MAX_CLASSES as f32).contains(&v)))
    {
        return Err(EvalError::LabelOutOfRange {
            value: f64::from(bad),
            n_classes: MAX_CLASSES,
        });
    }
    Ok(raw.mapv(|v| v as u8))
}

impl Preprocess {
    /// 读取一个样本：映射标签取值、加通道轴、重定向、强度缩放。
    pub fn load(&self, pair: &ImageLabelPair) -> Result<Volume> {
        let (image, image_affine) = read_volume(&pair.image)?;
        let (label, source, affine) = match &pair.label {
            Some(path) => {
                let (raw, affine) = read_volume(path)?;
                if raw.dim() != image.dim() {
                    return Err(EvalError::shape(format!(
                        "图像 `{}` {:?} 与标签 `{}` {:?} 形状不一致",
                        pair.image.display(),
                        image.shape(),
                        path.display(),
                        raw.shape()
                    )));
                }
                let mut label = to_label(raw)?;
                if let Some(map) = self.label_map.as_ref() {
                    label = map.apply(label.view());
                }
                (Some(label), path.clone(), affine)
            }
            None => (None, pair.image.clone(), image_affine),
        };

        let (x, y, z) = image.dim();
        let mut meta = SpatialMeta::identity(source, affine, [x, y, z]);
        let mut image = image.insert_axis(Axis(0));
        let mut label = label;
        if let Some(target) = self.axcodes {
            let reo = Reorientation::between(Orientation::from_affine(&affine), target);
            if !reo.is_identity() {
                image = reo.apply4(image);
                label = label.map(|l| reo.apply3(l));
                meta.affine = reo.affine_after(&affine, meta.original_shape);
                meta.shape = reo.shape_after(meta.original_shape);
                meta.reorientation = reo;
            }
        }
        if self.scale_intensity {
            scale_intensity(&mut image);
        }
        Volume::new(image, label, meta)
    }
}

/// 按清单顺序产出预处理后的体数据。`workers > 1`时在线程池中预取。
#[derive(Clone, Debug)]
pub struct VolumeSource {
    pairs: Vec<ImageLabelPair>,
    preprocess: Preprocess,
    workers: usize,
}

impl VolumeSource {
    pub fn new(pairs: Vec<ImageLabelPair>, preprocess: Preprocess) -> Self {
        Self {
            pairs,
            preprocess,
            workers: num_cpus::get(),
        }
    }

    /// 同时在途的加载任务数上限，至少为1（即同步加载）。
    #[inline]
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[inline]
    pub fn pairs(&self) -> &[ImageLabelPair] {
        &self.pairs
    }

    pub fn iter(&self) -> Prefetch {
        let pool = (self.workers > 1 && self.pairs.len() > 1).then(|| {
            let (tx, rx) = channel();
            (ThreadPool::new(self.workers), tx, rx)
        });
        let mut it = Prefetch {
            pairs: self.pairs.clone(),
            preprocess: self.preprocess.clone(),
            window: self.workers,
            next_submit: 0,
            next_yield: 0,
            ready: BTreeMap::new(),
            pool,
        };
        it.fill();
        it
    }
}

type Loaded = (usize, Result<Volume>);

/// [`VolumeSource::iter`]返回的迭代器。
pub struct Prefetch {
    pairs: Vec<ImageLabelPair>,
    preprocess: Preprocess,
    window: usize,
    next_submit: usize,
    next_yield: usize,
    ready: BTreeMap<usize, Result<Volume>>,
    pool: Option<(ThreadPool, Sender<Loaded>, Receiver<Loaded>)>,
}

impl Prefetch {
    /// 提交任务，直到在途数达到窗口大小。
    fn fill(&mut self) {
        let Some((pool, tx, _)) = &self.pool else {
            return;
        };
        while self.next_submit < self.pairs.len() && self.next_submit - self.next_yield < self.window {
            let idx = self.next_submit;
            let pair = self.pairs[idx].clone();
            let preprocess = self.preprocess.clone();
            let tx = tx.clone();
            pool.execute(move || {
                // 接收端提前释放时结果无人需要
                let _ = tx.send((idx, preprocess.load(&pair)));
            });
            self.next_submit += 1;
        }
    }

    fn wait_for(&mut self, idx: usize) -> Result<Volume> {
        loop {
            if let Some(v) = self.ready.remove(&idx) {
                return v;
            }
            let Some((pool, _, rx)) = &self.pool else {
                return self.preprocess.load(&self.pairs[idx]);
            };
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok((i, v)) => {
                    self.ready.insert(i, v);
                }
                Err(RecvTimeoutError::Timeout) if pool.panic_count() == 0 => {}
                Err(_) => {
                    return Err(EvalError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        format!("加载 `{}` 的线程异常退出", self.pairs[idx].image.display()),
                    )))
                }
            }
        }
    }
}

impl Iterator for Prefetch {
    type Item = Result<Volume>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_yield >= self.pairs.len() {
            return None;
        }
        let idx = self.next_yield;
        let v = self.wait_for(idx);
        self.next_yield += 1;
        self.fill();
        debug!("已加载第 {} / {} 个体数据", idx + 1, self.pairs.len());
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.pairs.len() - self.next_yield;
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for Prefetch {}
