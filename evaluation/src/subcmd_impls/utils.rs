use tracing_subscriber::EnvFilter;

/// 安装全局日志。`RUST_LOG`优先；否则`verbose`为`debug`，默认`info`。
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // 重复安装（如测试中）时保持已有的订阅者。
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 解析形如`64,64,32`的三维尺寸，每个分量为正整数。
pub fn positive_triple(s: &str) -> Result<[usize; 3], &'static str> {
    const ERR: &str = "三维尺寸格式错误，应为`X,Y,Z`且均为正整数";
    let mut out = [0usize; 3];
    let mut parts = s.split(',');
    for slot in out.iter_mut() {
        let v: usize = parts.next().ok_or(ERR)?.trim().parse().map_err(|_| ERR)?;
        if v == 0 {
            return Err(ERR);
        }
        *slot = v;
    }
    if parts.next().is_some() {
        return Err(ERR);
    }
    Ok(out)
}

/// 解析`[0, 1)`内的重叠率。
pub fn overlap_in_range(s: &str) -> Result<f64, &'static str> {
    const ERR: &str = "重叠率应为`[0, 1)`内的小数";
    let v: f64 = s.trim().parse().map_err(|_| ERR)?;
    if (0.0..1.0).contains(&v) {
        Ok(v)
    } else {
        Err(ERR)
    }
}

/// `[0, n)`内的标签值均匀映射到灰度`[0, 255]`。
#[inline]
pub fn gray_level(label: u8, n_classes: usize) -> u8 {
    if n_classes <= 1 {
        return 0;
    }
    let v = (label as usize).min(n_classes - 1) * 255 / (n_classes - 1);
    v as u8
}
