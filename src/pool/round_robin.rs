//! Round-robin slot selection.

use crate::pool::slot::PoolSlot;

/// Round-robin selector.
/// Stores a cursor to rotate through pool members so that load spreads
/// evenly instead of always hitting the first free wallet.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first free slot at or after the cursor, wrapping once.
    /// Advances the cursor past the chosen slot.
    pub fn next_free(&mut self, slots: &[PoolSlot]) -> Option<usize> {
        let len = slots.len();
        if len == 0 {
            return None;
        }

        let start = self.cursor % len;
        for i in 0..len {
            let index = (start + i) % len;
            if slots[index].is_free() {
                self.cursor = (index + 1) % len;
                return Some(index);
            }
        }
        None
    }

    /// Keep the cursor pointing at the same logical position after the slot
    /// at `removed` leaves a roster that now has `len` members.
    pub fn on_removed(&mut self, removed: usize, len: usize) {
        if removed < self.cursor {
            self.cursor -= 1;
        }
        if len == 0 {
            self.cursor = 0;
        } else {
            self.cursor %= len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::slot::Lease;
    use crate::vault::Identity;
    use alloy::signers::local::PrivateKeySigner;

    fn slots(n: usize) -> Vec<PoolSlot> {
        (0..n)
            .map(|i| {
                PoolSlot::new(Identity::new(
                    format!("pool-wallet-{}", i + 1),
                    PrivateKeySigner::random(),
                ))
            })
            .collect()
    }

    #[test]
    fn test_round_robin() {
        let mut rr = RoundRobin::new();
        let slots = slots(2);

        assert_eq!(rr.next_free(&slots), Some(0));
        assert_eq!(rr.next_free(&slots), Some(1));
        assert_eq!(rr.next_free(&slots), Some(0));
    }

    #[tokio::test]
    async fn test_skips_busy_slots() {
        let mut rr = RoundRobin::new();
        let mut slots = slots(3);
        let timer = tokio::spawn(std::future::pending::<()>());
        slots[0].occupy(Lease::new(1, timer.abort_handle()));

        assert_eq!(rr.next_free(&slots), Some(1));
        assert_eq!(rr.next_free(&slots), Some(2));
        assert_eq!(rr.next_free(&slots), Some(1));
    }

    #[test]
    fn test_empty() {
        let mut rr = RoundRobin::new();
        assert_eq!(rr.next_free(&[]), None);
    }

    #[test]
    fn test_cursor_after_removal() {
        let mut rr = RoundRobin::new();
        let mut slots = slots(3);
        assert_eq!(rr.next_free(&slots), Some(0));
        assert_eq!(rr.next_free(&slots), Some(1));

        // cursor now at 2; removing index 0 shifts it to 1
        slots.remove(0);
        rr.on_removed(0, slots.len());
        assert_eq!(slots[rr.next_free(&slots).unwrap()].id(), "pool-wallet-3");
    }
}
