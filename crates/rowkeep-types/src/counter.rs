//! Delta-buffered counters.
//!
//! A [`Counter`] never holds the authoritative total of a counter column.
//! The store does. The in-memory value only remembers what was read at the
//! last hydration ([`Counter::stored`]) and the deltas applied since the last
//! save. Saving sends the deltas, never an absolute value, which is what
//! makes concurrent increments from different writers safe.

/// Accumulator for a counter column.
///
/// # Lifecycle
///
/// 1. Created empty on entity construction, or from the stored total on
///    hydration ([`Counter::from_stored`]).
/// 2. [`increment`](Counter::increment) / [`decrement`](Counter::decrement)
///    accumulate pending deltas.
/// 3. After the store applied the delta, [`commit`](Counter::commit) clears
///    the pending deltas. The stored baseline is left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Counter {
    stored: i64,
    increments: i64,
    decrements: i64,
}

impl Counter {
    /// Create an empty counter with no stored baseline and no deltas.
    pub const fn new() -> Self {
        Self {
            stored: 0,
            increments: 0,
            decrements: 0,
        }
    }

    /// Create a counter from the total read out of a store.
    pub const fn from_stored(stored: i64) -> Self {
        Self {
            stored,
            increments: 0,
            decrements: 0,
        }
    }

    /// Add `amount` to the pending delta.
    ///
    /// A negative amount is recorded as a decrement.
    pub const fn increment(&mut self, amount: i64) -> &mut Self {
        if amount >= 0 {
            self.increments = self.increments.saturating_add(amount);
        } else {
            self.decrements = self.decrements.saturating_add(amount);
        }
        self
    }

    /// Subtract `amount` from the pending delta.
    ///
    /// A negative amount is recorded as an increment.
    pub const fn decrement(&mut self, amount: i64) -> &mut Self {
        if amount >= 0 {
            self.decrements = self.decrements.saturating_sub(amount);
        } else {
            self.increments = self.increments.saturating_add(amount.saturating_neg());
        }
        self
    }

    /// Total read from the store at the last hydration.
    pub const fn stored(&self) -> i64 {
        self.stored
    }

    /// Sum of all positive deltas since the last commit.
    pub const fn increments(&self) -> i64 {
        self.increments
    }

    /// Sum of all negative deltas since the last commit (zero or less).
    pub const fn decrements(&self) -> i64 {
        self.decrements
    }

    /// Net delta waiting to be written.
    pub const fn pending(&self) -> i64 {
        self.increments.saturating_add(self.decrements)
    }

    /// Whether there is a non-zero delta waiting to be written.
    pub const fn is_dirty(&self) -> bool {
        self.pending() != 0
    }

    /// Stored baseline plus pending deltas.
    pub const fn calculated(&self) -> i64 {
        self.stored.saturating_add(self.pending())
    }

    /// Clear the pending deltas after the store applied them.
    ///
    /// Returns the delta that was committed. The stored baseline does not
    /// move: only a reload brings the store's total back.
    pub const fn commit(&mut self) -> i64 {
        let delta = self.pending();
        self.increments = 0;
        self.decrements = 0;
        delta
    }

    /// Discard pending deltas without writing them.
    pub const fn reset(&mut self) {
        self.increments = 0;
        self.decrements = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_counter_is_clean() {
        let counter = Counter::new();
        assert_eq!(counter.calculated(), 0);
        assert!(!counter.is_dirty());
    }

    #[test]
    fn increments_and_decrements_accumulate_separately() {
        let mut counter = Counter::new();
        counter.increment(10).decrement(5);
        assert_eq!(counter.increments(), 10);
        assert_eq!(counter.decrements(), -5);
        assert_eq!(counter.pending(), 5);
        assert_eq!(counter.calculated(), 5);
    }

    #[test]
    fn negative_amounts_flip_direction() {
        let mut counter = Counter::new();
        counter.increment(-3);
        counter.decrement(-4);
        assert_eq!(counter.increments(), 4);
        assert_eq!(counter.decrements(), -3);
        assert_eq!(counter.pending(), 1);
    }

    #[test]
    fn commit_clears_deltas_but_keeps_baseline() {
        let mut counter = Counter::from_stored(100);
        counter.increment(7);
        assert_eq!(counter.calculated(), 107);

        assert_eq!(counter.commit(), 7);
        assert!(!counter.is_dirty());
        assert_eq!(counter.calculated(), 100);

        counter.decrement(2);
        assert_eq!(counter.calculated(), 98);
    }

    #[test]
    fn reset_discards_pending() {
        let mut counter = Counter::from_stored(3);
        counter.increment(5);
        counter.reset();
        assert_eq!(counter.calculated(), 3);
        assert!(!counter.is_dirty());
    }

    #[test]
    fn balanced_deltas_are_not_dirty() {
        let mut counter = Counter::new();
        counter.increment(2).decrement(2);
        assert!(!counter.is_dirty());
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let mut counter = Counter::from_stored(i64::MAX);
        counter.increment(i64::MAX);
        assert_eq!(counter.calculated(), i64::MAX);
        counter.decrement(i64::MIN);
        assert_eq!(counter.increments(), i64::MAX);
    }
}
