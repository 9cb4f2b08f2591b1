/// Bounded retry counter passed explicitly to the loop that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    limit: u32,
    used: u32,
}

impl AttemptBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Take one attempt from the budget; false once it is exhausted
    pub fn consume(&mut self) -> bool {
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_consume() {
        let mut budget = AttemptBudget::new(2);
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(!budget.consume());
        assert_eq!(budget.used(), 2);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_zero_budget() {
        let mut budget = AttemptBudget::new(0);
        assert_eq!(budget.remaining(), 0);
        assert!(!budget.consume());
    }
}
