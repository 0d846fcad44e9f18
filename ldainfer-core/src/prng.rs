// PCG32: small, fast and deterministic. Every sampling thread owns one.
#[derive(Clone, Debug)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    pub fn new(seed: u64, seq: u64) -> Self {
        let mut pcg = Pcg32 {
            state: 0,
            inc: (seq << 1) | 1,
        };
        pcg.next_u32();
        pcg.state = pcg.state.wrapping_add(seed);
        pcg.next_u32();
        pcg
    }

    // Independent child stream; advances this one.
    pub fn split(&mut self) -> Self {
        let seed = ((self.next_u32() as u64) << 32) | self.next_u32() as u64;
        let seq = ((self.next_u32() as u64) << 32) | self.next_u32() as u64;
        Pcg32::new(seed, seq)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let oldstate = self.state;
        self.state = oldstate
            .wrapping_mul(6364136223846793005)
            .wrapping_add(self.inc);
        let xorshifted = (((oldstate >> 18) ^ oldstate) >> 27) as u32;
        let rot = (oldstate >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Uniform in `[0, 1)` with 53 bits of precision.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        let hi = (self.next_u32() >> 5) as u64;
        let lo = (self.next_u32() >> 6) as u64;
        ((hi << 26) | lo) as f64 / (1u64 << 53) as f64
    }

    /// Unbiased integer in `[0, k)`; `k == 0` yields 0.
    #[inline]
    pub fn rand_k(&mut self, k: usize) -> usize {
        if k == 0 {
            return 0;
        }
        let m = (u32::MAX as u64 + 1) / (k as u64);
        let t = m * (k as u64);
        loop {
            let x = self.next_u32() as u64;
            if x < t {
                return (x / m) as usize;
            }
        }
    }
}
