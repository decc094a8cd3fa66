//! 一次完整的评估运行：加载、滑动窗口推理、离散化、指标累积与预测落盘。

use crate::dataset::DatasetKind;
use crate::error::{EvalError, Result};
use crate::io::{Manifest, PredictionWriter, Split, VolumeSource};
use crate::metric::{MetricAggregator, MetricSummary, Reduction};
use crate::model::ModelKind;
use crate::patch::{BlendMode, Inference, InferenceReconstructor, PatchScheduler};
use crate::post::{to_discrete_labels, to_one_hot, MAX_CLASSES};
use crate::prep::{crop, pad, AccTimer, PadMode, Padding};
use crate::volume::Volume;
use ndarray::Array3;
use std::path::PathBuf;
use tracing::{debug, info};

/// 评估配置，由命令行构造。
#[derive(Clone, Debug, PartialEq)]
pub struct EvalConfig {
    /// 数据集根目录，含`dataset.json`。
    pub root_dir: PathBuf,
    pub dataset: DatasetKind,
    /// 为`None`时使用数据集的默认划分。
    pub split: Option<Split>,
    pub model: ModelKind,
    pub checkpoint: PathBuf,
    pub patch_size: [usize; 3],
    pub overlap: f64,
    pub sw_batch_size: usize,
    pub blend: BlendMode,
    pub pad_mode: PadMode,
    /// 包括背景的类别数；为`None`时取模型输出的通道数。
    pub n_classes: Option<usize>,
    /// 为`None`时使用数据集的默认聚合方式。
    pub reduction: Option<Reduction>,
    pub output_dir: PathBuf,
    pub save_prediction: bool,
    /// 为`None`时为`<model>_prediction`。
    pub postfix: Option<String>,
    pub workers: usize,
}

impl EvalConfig {
    /// 其余字段取默认值。
    pub fn new(
        root_dir: impl Into<PathBuf>,
        dataset: DatasetKind,
        model: ModelKind,
        checkpoint: impl Into<PathBuf>,
    ) -> Self {
        let root_dir = root_dir.into();
        Self {
            output_dir: root_dir.join("output"),
            root_dir,
            dataset,
            split: None,
            model,
            checkpoint: checkpoint.into(),
            patch_size: [32, 32, 32],
            overlap: 0.25,
            sw_batch_size: 1,
            blend: BlendMode::default(),
            pad_mode: PadMode::default(),
            n_classes: None,
            reduction: None,
            save_prediction: false,
            postfix: None,
            workers: num_cpus::get(),
        }
    }

    #[inline]
    pub fn split(&self) -> Split {
        self.split.unwrap_or_else(|| self.dataset.default_split())
    }

    #[inline]
    pub fn reduction(&self) -> Reduction {
        self.reduction
            .unwrap_or_else(|| self.dataset.default_reduction())
    }

    pub fn postfix(&self) -> String {
        self.postfix
            .clone()
            .unwrap_or_else(|| format!("{}_prediction", self.model))
    }

    /// 模型实际使用的补丁大小。
    #[inline]
    pub fn patch(&self) -> [usize; 3] {
        self.model.patch_for(self.patch_size)
    }

    /// 在加载任何数据之前检查取值范围。
    pub fn validate(&self) -> Result<()> {
        if self.patch_size.contains(&0) {
            return Err(EvalError::geometry(format!(
                "补丁大小 {:?} 含有0",
                self.patch_size
            )));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(EvalError::geometry(format!(
                "重叠率 {} 不在 [0, 1) 内",
                self.overlap
            )));
        }
        if self.sw_batch_size == 0 {
            return Err(EvalError::Config("sw_batch_size 必须为正".into()));
        }
        if self.workers == 0 {
            return Err(EvalError::Config("workers 必须为正".into()));
        }
        if let Some(n) = self.n_classes {
            if !(2..=MAX_CLASSES).contains(&n) {
                return Err(EvalError::Config(format!(
                    "类别数 {n} 不在 [2, {MAX_CLASSES}] 内"
                )));
            }
        }
        if self.postfix.as_deref().map_or(false, str::is_empty) {
            return Err(EvalError::Config("输出后缀不能为空".into()));
        }
        if !self.root_dir.is_dir() {
            return Err(EvalError::Config(format!(
                "数据集根目录 `{}` 不存在",
                self.root_dir.display()
            )));
        }
        if !self.checkpoint.exists() {
            return Err(EvalError::Checkpoint {
                path: self.checkpoint.clone(),
                msg: "文件不存在".into(),
            });
        }
        Ok(())
    }
}

/// 逐个体数据执行评估，并在整个运行中累积指标。
pub struct Evaluator<M: Inference> {
    reconstructor: InferenceReconstructor,
    model: M,
    n_classes: Option<usize>,
    pad_mode: PadMode,
    writer: Option<PredictionWriter>,
    aggregator: Option<MetricAggregator>,
    infer_timer: AccTimer,
    metric_timer: AccTimer,
    processed: usize,
}

impl<M: Inference> Evaluator<M> {
    pub fn new(reconstructor: InferenceReconstructor, model: M, n_classes: Option<usize>) -> Self {
        Self {
            reconstructor,
            model,
            n_classes,
            pad_mode: PadMode::default(),
            writer: None,
            aggregator: n_classes.map(MetricAggregator::new),
            infer_timer: AccTimer::new(),
            metric_timer: AccTimer::new(),
            processed: 0,
        }
    }

    #[inline]
    pub fn with_writer(mut self, writer: PredictionWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    #[inline]
    pub fn with_pad_mode(mut self, mode: PadMode) -> Self {
        self.pad_mode = mode;
        self
    }

    /// 已处理的体数据数。
    #[inline]
    pub fn processed(&self) -> usize {
        self.processed
    }

    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// 对一个体数据做滑动窗口推理并离散化，返回与`volume`同网格的标签。
    pub fn predict(&mut self, volume: &Volume) -> Result<Array3<u8>> {
        let patch = self.reconstructor.scheduler().patch_size();
        let padding = Padding::to_fit(volume.spatial_shape(), patch);
        if !padding.is_empty() {
            debug!("体数据 {:?} 小于补丁 {patch:?}，填充 {padding:?}", volume.spatial_shape());
        }
        let padded = pad(volume.image.view(), &padding, self.pad_mode);
        self.model
            .begin_volume(&volume.meta, &padding)
            .map_err(|e| EvalError::InferenceFailure(Box::new(e)))?;

        let scores = self
            .infer_timer
            .measure(|| self.reconstructor.reconstruct(padded.view(), &mut self.model))?;
        let scores = crop(scores, &padding);
        let channels = scores.dim().0;
        match self.n_classes {
            Some(n) if n != channels => {
                return Err(EvalError::shape(format!(
                    "模型输出 {channels} 个通道，而类别数为 {n}"
                )))
            }
            Some(_) => {}
            None => {
                self.n_classes = Some(channels);
                self.aggregator = Some(MetricAggregator::new(channels));
            }
        }
        to_discrete_labels(scores.view())
    }

    /// 处理一个体数据：推理、（有标签时）更新指标、（配置了输出时）写出预测。
    ///
    /// 返回写出的预测路径。
    pub fn process(&mut self, volume: &Volume) -> Result<Option<PathBuf>> {
        let labels = self.predict(volume)?;
        if let Some(truth) = volume.label.as_ref() {
            let n = labels_classes(self.n_classes)?;
            let aggregator = self
                .aggregator
                .get_or_insert_with(|| MetricAggregator::new(n));
            let pred_oh = to_one_hot(labels.view(), n)?;
            let truth_oh = to_one_hot(truth.view(), n)?;
            self.metric_timer
                .measure(|| aggregator.update(pred_oh.view(), truth_oh.view()))?;
        } else {
            debug!("`{}` 没有标签，跳过指标", volume.meta.source.display());
        }
        let written = match &self.writer {
            Some(w) => Some(w.write(labels.view(), &volume.meta)?),
            None => None,
        };
        self.processed += 1;
        info!(
            "完成第 {} 个体数据 `{}` {:?}",
            self.processed,
            volume.meta.source.display(),
            volume.spatial_shape()
        );
        Ok(written)
    }

    /// 结束运行并聚合指标。
    pub fn finish(self, reduction: Reduction) -> MetricSummary {
        info!(
            "共 {} 个体数据；推理 {} ms（平均 {:.1} ms），指标 {} 次共 {} ms",
            self.processed,
            self.infer_timer.total_ms(),
            self.infer_timer.mean_ms(),
            self.metric_timer.laps(),
            self.metric_timer.total_ms()
        );
        self.aggregator
            .unwrap_or_else(|| MetricAggregator::new(self.n_classes.unwrap_or(0)))
            .finalize(reduction)
    }
}

#[inline]
fn labels_classes(n_classes: Option<usize>) -> Result<usize> {
    n_classes.ok_or_else(|| EvalError::Config("类别数未知".into()))
}

/// 按配置执行完整评估，返回指标汇总。
pub fn run(config: &EvalConfig) -> Result<MetricSummary> {
    config.validate()?;
    let split = config.split();
    let manifest = Manifest::open(&config.root_dir)?;
    let pairs = manifest.pairs(split)?;
    info!(
        "{} / {}: {} 个体数据，模型 {}，补丁 {:?}，重叠率 {}",
        config.dataset,
        split,
        pairs.len(),
        config.model,
        config.patch(),
        config.overlap
    );

    let source = VolumeSource::new(pairs, config.dataset.preprocess()?).workers(config.workers);
    let scheduler = PatchScheduler::new(config.patch(), config.overlap)?.with_blend(config.blend);
    let reconstructor = InferenceReconstructor::new(scheduler, config.sw_batch_size);
    let model = config.model.build(&config.checkpoint)?;

    let mut evaluator =
        Evaluator::new(reconstructor, model, config.n_classes).with_pad_mode(config.pad_mode);
    if config.save_prediction {
        let writer = PredictionWriter::new(&config.output_dir, config.postfix())
            .data_root(manifest.root())
            .label_map(config.dataset.save_label_map());
        evaluator = evaluator.with_writer(writer);
    }
    for volume in source.iter() {
        evaluator.process(&volume?)?;
    }
    Ok(evaluator.finish(config.reduction()))
}
