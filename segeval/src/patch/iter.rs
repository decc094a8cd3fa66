/// 按行主序（最后一个轴变化最快）遍历三维网格`[0, d0) × [0, d1) × [0, d2)`。
pub struct GridIter {
    cur: [usize; 3],
    dims: [usize; 3],
    done: bool,
}

impl GridIter {
    #[inline]
    pub fn new(dims: [usize; 3]) -> Self {
        Self {
            cur: [0; 3],
            dims,
            done: dims.contains(&0),
        }
    }
}

impl Iterator for GridIter {
    type Item = [usize; 3];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let ret = self.cur;
        // 从最后一个轴开始进位
        let mut axis = 3;
        loop {
            if axis == 0 {
                self.done = true;
                break;
            }
            axis -= 1;
            self.cur[axis] += 1;
            if self.cur[axis] < self.dims[axis] {
                break;
            }
            self.cur[axis] = 0;
        }
        Some(ret)
    }
}
