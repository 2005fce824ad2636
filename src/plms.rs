use std::collections::VecDeque;

use log::trace;
use ndarray::Array4;

/// The amount of past direction estimates kept for extrapolation.
pub const HISTORY_CAPACITY: usize = 3;

/// The extrapolation order picked from the size of the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// No history yet: average the estimate with one at a provisional next state.
    Bootstrap,
    Second,
    Third,
    /// Steady state, once the history is full.
    Fourth,
}

impl Order {
    pub fn from_history_len(len: usize) -> Self {
        match len {
            0 => Order::Bootstrap,
            1 => Order::Second,
            2 => Order::Third,
            _ => Order::Fourth,
        }
    }

    pub fn as_usize(self) -> usize {
        match self {
            Order::Bootstrap => 1,
            Order::Second => 2,
            Order::Third => 3,
            Order::Fourth => 4,
        }
    }
}

/// A bounded history of raw direction estimates, oldest first.
#[derive(Debug, Clone, Default)]
pub struct DirectionHistory {
    estimates: VecDeque<Array4<f32>>,
}

impl DirectionHistory {
    pub fn new() -> Self {
        Self {
            estimates: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
        }
    }

    pub fn len(&self) -> usize {
        self.estimates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty()
    }

    pub fn order(&self) -> Order {
        Order::from_history_len(self.len())
    }

    /// Appends a raw estimate, evicting the oldest one beyond capacity.
    pub fn push(&mut self, estimate: Array4<f32>) {
        self.estimates.push_back(estimate);
        if self.estimates.len() > HISTORY_CAPACITY {
            self.estimates.pop_front();
        }
    }

    /// The stored estimates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Array4<f32>> {
        self.estimates.iter()
    }

    /// The `k`-th most recent estimate, `0` being the newest.
    fn back(&self, k: usize) -> &Array4<f32> {
        &self.estimates[self.estimates.len() - 1 - k]
    }

    /// Combines the current estimate with the history using the Adams-Bashforth weights of the
    /// current order.
    ///
    /// # Returns
    /// The extrapolated estimate, or `None` while bootstrapping, when the caller has to evaluate
    /// the model a second time and use [`bootstrap`].
    pub fn extrapolate(&self, e_t: &Array4<f32>) -> Option<Array4<f32>> {
        let order = self.order();
        trace!("extrapolating the direction with order {}", order.as_usize());

        match order {
            Order::Bootstrap => None,
            Order::Second => Some((e_t * 3.0 - self.back(0)) / 2.0),
            Order::Third => {
                Some((e_t * 23.0 - self.back(0) * 16.0 + self.back(1) * 5.0) / 12.0)
            }
            Order::Fourth => Some(
                (e_t * 55.0 - self.back(0) * 59.0 + self.back(1) * 37.0 - self.back(2) * 9.0)
                    / 24.0,
            ),
        }
    }
}

/// The first step's estimate: the mean of the estimates at the current and the provisional next
/// state.
pub fn bootstrap(e_t: &Array4<f32>, e_next: &Array4<f32>) -> Array4<f32> {
    (e_t + e_next) / 2.0
}
