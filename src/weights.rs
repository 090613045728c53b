// src/weights.rs
//
// Weight slots shared by actor and critic.
//
// working   : weights used for evaluation right now (may hold a staged
//             candidate between `update_weights` and `cache_weights`)
// cached    : last committed, known-good weights
// candidate : output of the most recent optimizer run
// old       : previous cached snapshot, kept for diagnostics only

#[derive(Debug, Clone, PartialEq)]
pub struct WeightSlots {
    working: Vec<f64>,
    cached: Vec<f64>,
    candidate: Vec<f64>,
    old: Vec<f64>,
}

impl WeightSlots {
    pub fn new(initial: Vec<f64>) -> Self {
        Self {
            working: initial.clone(),
            cached: initial.clone(),
            candidate: initial.clone(),
            old: initial,
        }
    }

    pub fn len(&self) -> usize {
        self.cached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }

    pub fn working(&self) -> &[f64] {
        &self.working
    }

    pub fn cached(&self) -> &[f64] {
        &self.cached
    }

    pub fn candidate(&self) -> &[f64] {
        &self.candidate
    }

    pub fn old(&self) -> &[f64] {
        &self.old
    }

    pub fn set_candidate(&mut self, weights: Vec<f64>) {
        self.candidate = weights;
    }

    /// Drop the candidate in favor of the committed weights.
    pub fn discard_candidate(&mut self) {
        self.candidate = self.cached.clone();
    }

    /// working := candidate
    pub fn update(&mut self) {
        self.working = self.candidate.clone();
    }

    /// old := cached, cached := working
    pub fn cache(&mut self) {
        self.old = std::mem::replace(&mut self.cached, self.working.clone());
    }

    /// working := cached
    pub fn restore(&mut self) {
        self.working = self.cached.clone();
    }

    /// old := cached, cached := candidate, working := candidate
    pub fn update_and_cache(&mut self) {
        self.old = std::mem::replace(&mut self.cached, self.candidate.clone());
        self.working = self.candidate.clone();
    }

    /// `‖cached − candidate‖₂`
    pub fn displacement(&self) -> f64 {
        self.cached
            .iter()
            .zip(self.candidate.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_phase_commit() {
        let mut w = WeightSlots::new(vec![1.0]);
        w.set_candidate(vec![2.0]);
        assert_eq!(w.working(), &[1.0]);
        w.update();
        assert_eq!(w.working(), &[2.0]);
        assert_eq!(w.cached(), &[1.0]);
        w.cache();
        assert_eq!(w.cached(), &[2.0]);
        assert_eq!(w.old(), &[1.0]);
    }

    #[test]
    fn restore_reverts_staged_candidate() {
        let mut w = WeightSlots::new(vec![1.0, 1.0]);
        w.set_candidate(vec![3.0, 3.0]);
        w.update();
        w.restore();
        assert_eq!(w.working(), &[1.0, 1.0]);
        assert_eq!(w.cached(), &[1.0, 1.0]);
    }

    #[test]
    fn update_and_cache_promotes_candidate() {
        let mut w = WeightSlots::new(vec![0.0]);
        w.set_candidate(vec![4.0]);
        assert!((w.displacement() - 4.0).abs() < 1e-12);
        w.update_and_cache();
        assert_eq!(w.working(), &[4.0]);
        assert_eq!(w.cached(), &[4.0]);
        assert_eq!(w.old(), &[0.0]);
    }
}
