//! Bounded breeding stock, sorted best-first.

#[derive(Clone, Debug)]
pub struct EliteEntry<G> {
    pub genome: G,
    pub fitness: f32,
    /// Insertion order; among equal fitness the older entry is evicted first.
    pub sequence: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Admission {
    Admitted { rank: usize },
    AdmittedWithEviction { rank: usize, evicted_fitness: f32 },
    Rejected,
}

impl Admission {
    pub fn admitted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

#[derive(Clone, Debug)]
pub struct ElitePool<G> {
    capacity: usize,
    entries: Vec<EliteEntry<G>>,
    next_sequence: u64,
}

impl<G> ElitePool<G> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            next_sequence: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn entries(&self) -> &[EliteEntry<G>] {
        &self.entries
    }

    pub fn get(&self, rank: usize) -> Option<&EliteEntry<G>> {
        self.entries.get(rank)
    }

    pub fn best(&self) -> Option<&EliteEntry<G>> {
        self.entries.first()
    }

    pub fn min_fitness(&self) -> Option<f32> {
        self.entries.last().map(|e| e.fitness)
    }

    pub fn fitnesses(&self) -> Vec<f32> {
        self.entries.iter().map(|e| e.fitness).collect()
    }

    /// Whether `fitness` would be admitted right now.
    pub fn qualifies(&self, fitness: f32) -> bool {
        if fitness.is_nan() || self.capacity == 0 {
            return false;
        }
        match self.min_fitness() {
            Some(min) if self.is_full() => fitness > min,
            _ => true,
        }
    }

    pub fn offer(&mut self, genome: G, fitness: f32) -> Admission {
        if !self.qualifies(fitness) {
            return Admission::Rejected;
        }

        let evicted_fitness = if self.is_full() {
            self.entries.pop().map(|e| e.fitness)
        } else {
            None
        };

        // Newer entries go ahead of older ones with equal fitness, which keeps
        // the oldest of a tie at the tail where eviction happens.
        let rank = self
            .entries
            .iter()
            .position(|e| e.fitness <= fitness)
            .unwrap_or(self.entries.len());
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(
            rank,
            EliteEntry {
                genome,
                fitness,
                sequence,
            },
        );

        match evicted_fitness {
            Some(evicted_fitness) => Admission::AdmittedWithEviction {
                rank,
                evicted_fitness,
            },
            None => Admission::Admitted { rank },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sorted<G>(pool: &ElitePool<G>) {
        let f = pool.fitnesses();
        assert!(f.windows(2).all(|w| w[0] >= w[1]), "not sorted: {f:?}");
    }

    #[test]
    fn fills_then_evicts_lowest() {
        let mut pool = ElitePool::new(3);
        assert_eq!(pool.offer("a", 5.0), Admission::Admitted { rank: 0 });
        assert_eq!(pool.offer("b", 9.0), Admission::Admitted { rank: 0 });
        assert_eq!(pool.offer("c", 1.0), Admission::Admitted { rank: 2 });
        assert_eq!(
            pool.offer("d", 7.0),
            Admission::AdmittedWithEviction {
                rank: 1,
                evicted_fitness: 1.0
            }
        );
        assert_eq!(pool.fitnesses(), vec![9.0, 7.0, 5.0]);
        assert_eq!(pool.best().map(|e| e.genome), Some("b"));
    }

    #[test]
    fn full_pool_rejects_equal_or_worse() {
        let mut pool = ElitePool::new(2);
        pool.offer(1, 3.0);
        pool.offer(2, 4.0);
        assert_eq!(pool.offer(3, 3.0), Admission::Rejected);
        assert_eq!(pool.offer(4, -1.0), Admission::Rejected);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn tie_evicts_earlier_inserted() {
        let mut pool = ElitePool::new(2);
        pool.offer("old", 2.0);
        pool.offer("new", 2.0);
        assert_eq!(pool.entries()[0].genome, "new");
        pool.offer("better", 3.0);
        let genomes: Vec<_> = pool.entries().iter().map(|e| e.genome).collect();
        assert_eq!(genomes, vec!["better", "new"]);
    }

    #[test]
    fn nan_and_zero_capacity_never_admit() {
        let mut pool = ElitePool::new(2);
        assert_eq!(pool.offer(0, f32::NAN), Admission::Rejected);
        let mut empty = ElitePool::new(0);
        assert_eq!(empty.offer(0, 100.0), Admission::Rejected);
    }

    #[test]
    fn arbitrary_sequences_stay_bounded_and_sorted() {
        let mut rng = crate::rng::SeededRng::new(31);
        let mut pool = ElitePool::new(5);
        let mut seen = Vec::new();
        for i in 0..400 {
            let fitness = rng.next_range_f32(-50.0, 50.0).round();
            seen.push(fitness);
            pool.offer(i, fitness);
            assert!(pool.len() <= 5);
            assert_sorted(&pool);
        }
        seen.sort_by(|a, b| b.total_cmp(a));
        seen.truncate(5);
        assert_eq!(pool.fitnesses(), seen);
    }
}
