use std::collections::VecDeque;
/// Rolling buffer that keeps the most recent current readings per channel.
///
/// Readings beyond `capacity` evict the oldest value, so the buffer never
/// grows no matter how long the monitor runs.
#[derive(Clone, Debug)]
pub struct CurrentHistory {
    per_channel: Vec<VecDeque<f64>>, // channel -> readings (mA)
    capacity: usize,
}
impl CurrentHistory {
    /// Every channel starts with a single `0.0` reading so the plots have
    /// something to draw before the first measurement arrives.
    pub fn new(channels: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let per_channel = (0..channels)
            .map(|_| {
                let mut queue = VecDeque::with_capacity(capacity);
                queue.push_back(0.0);
                queue
            })
            .collect();
        Self {
            per_channel,
            capacity,
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn num_channels(&self) -> usize {
        self.per_channel.len()
    }
    /// Appends one reading per channel. Extra values are ignored; missing
    /// channels are left untouched.
    pub fn push(&mut self, readings: &[f64]) {
        for (queue, &value) in self.per_channel.iter_mut().zip(readings) {
            if queue.len() == self.capacity {
                queue.pop_front();
            }
            queue.push_back(value);
        }
    }
    pub fn channel(&self, index: usize) -> Option<&VecDeque<f64>> {
        self.per_channel.get(index)
    }
    pub fn latest(&self, index: usize) -> Option<f64> {
        self.per_channel.get(index).and_then(|q| q.back().copied())
    }
    /// Points ready for a line plot: x is the position inside the window.
    pub fn plot_points(&self, index: usize) -> Vec<[f64; 2]> {
        self.per_channel
            .get(index)
            .map(|q| {
                q.iter()
                    .enumerate()
                    .map(|(i, v)| [i as f64, *v])
                    .collect()
            })
            .unwrap_or_default()
    }
    pub fn clear(&mut self) {
        for queue in &mut self.per_channel {
            queue.clear();
            queue.push_back(0.0);
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn starts_with_zero_reading() {
        let history = CurrentHistory::new(4, 20);
        assert_eq!(history.num_channels(), 4);
        for ch in 0..4 {
            assert_eq!(history.latest(ch), Some(0.0));
            assert_eq!(history.channel(ch).unwrap().len(), 1);
        }
    }
    #[test]
    fn evicts_oldest_at_capacity() {
        let mut history = CurrentHistory::new(2, 3);
        for i in 1..=10 {
            history.push(&[i as f64, -(i as f64)]);
        }
        let ch0: Vec<f64> = history.channel(0).unwrap().iter().copied().collect();
        assert_eq!(ch0, vec![8.0, 9.0, 10.0]);
        assert_eq!(history.latest(1), Some(-10.0));
        assert_eq!(history.plot_points(0), vec![[0.0, 8.0], [1.0, 9.0], [2.0, 10.0]]);
    }
    #[test]
    fn clear_resets_to_zero() {
        let mut history = CurrentHistory::new(1, 5);
        history.push(&[12.5]);
        history.clear();
        assert_eq!(history.plot_points(0), vec![[0.0, 0.0]]);
        assert!(history.channel(3).is_none());
    }
}
