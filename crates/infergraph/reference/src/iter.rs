//! Positional iteration over rectangular shapes

/// Iterates every index tuple of a shape in row-major order.
///
/// A shape containing a zero dimension yields nothing; an empty shape
/// yields the single empty tuple.
#[derive(Clone, Debug)]
pub struct Positions {
    shape: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl Positions {
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            current: vec![0; shape.len()],
            done: shape.contains(&0),
        }
    }
}

impl Iterator for Positions {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.shape.is_empty() {
            self.done = true;
            return Some(Vec::new());
        }

        let result = self.current.clone();

        // Odometer advance, last axis fastest
        for i in (0..self.shape.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.shape[i] {
                return Some(result);
            }
            self.current[i] = 0;
        }
        self.done = true;
        Some(result)
    }
}

/// Row-major strides for a shape.
pub(crate) fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Number of cells a shape addresses.
pub(crate) fn volume(shape: &[usize]) -> usize {
    shape.iter().product()
}
