use std::sync::atomic::{AtomicI32, Ordering};

/// A trigger that fires once every `ubound` calls to [`CyclicCounter::spin`].
///
/// `ubound == 0` never fires; `ubound == 1` always fires. Used to interleave
/// claim sweeps with ordinary reads at a fixed rate.
pub struct CyclicCounter {
    ubound: i32,
    value: AtomicI32,
}

impl CyclicCounter {
    pub fn new(ubound: i32) -> Self {
        CyclicCounter {
            ubound,
            value: AtomicI32::new(0),
        }
    }

    /// Advance the counter by one tick, returning `true` iff it just wrapped.
    pub fn spin(&self) -> bool {
        match self.ubound {
            0 => false,
            1 => true,
            ubound => {
                let next = self.value.fetch_add(1, Ordering::SeqCst) + 1;
                if next >= ubound {
                    self.value
                        .compare_exchange(next, 0, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                } else {
                    false
                }
            }
        }
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ubound_never_fires() {
        let counter = CyclicCounter::new(0);
        for _ in 0..10 {
            assert!(!counter.spin());
        }
    }

    #[test]
    fn one_ubound_always_fires() {
        let counter = CyclicCounter::new(1);
        for _ in 0..10 {
            assert!(counter.spin());
        }
    }

    #[test]
    fn fires_every_ubound_calls() {
        let counter = CyclicCounter::new(3);
        let mut fired_at = Vec::new();
        for i in 1..=9 {
            if counter.spin() {
                fired_at.push(i);
            }
        }
        assert_eq!(fired_at, vec![3, 6, 9]);
    }

    #[test]
    fn reset_restarts_the_cycle() {
        let counter = CyclicCounter::new(3);
        assert!(!counter.spin());
        assert!(!counter.spin());
        counter.reset();
        assert!(!counter.spin());
        assert!(!counter.spin());
        assert!(counter.spin());
    }
}
