/// Xorshift32 generator. Every stochastic choice in the engine (track shape,
/// parent selection) draws from one of these so a seed reproduces a run.
#[derive(Clone, Copy, Debug)]
pub struct SeededRng {
    state: u32,
}

impl SeededRng {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0xDEAD_BEEF } else { seed },
        }
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    pub fn next(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        self.state
    }

    pub fn next_int(&mut self, max: u32) -> u32 {
        self.next() % max
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn next_index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        self.next_int(len as u32) as usize
    }

    /// Uniform value in `[0, 1)` built from the top 24 bits.
    pub fn next_f32(&mut self) -> f32 {
        (self.next() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform value in `[min, max)`.
    pub fn next_range_f32(&mut self, min: f32, max: f32) -> f32 {
        debug_assert!(max >= min);
        min + (max - min) * self.next_f32()
    }

    /// Standard normal sample (Box-Muller, one branch).
    pub fn next_gaussian(&mut self) -> f32 {
        let u1 = self.next_f32().max(f32::MIN_POSITIVE);
        let u2 = self.next_f32();
        (-2.0 * u1.ln()).sqrt() * (core::f32::consts::TAU * u2).cos()
    }

    /// Two distinct indices in `0..len`. `len` must be at least 2.
    pub fn next_distinct_pair(&mut self, len: usize) -> (usize, usize) {
        debug_assert!(len >= 2);
        let first = self.next_index(len);
        let mut second = self.next_index(len - 1);
        if second >= first {
            second += 1;
        }
        (first, second)
    }
}
