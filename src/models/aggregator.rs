//! Vote aggregation for the tree ensemble

use crate::types::transaction::Label;

/// Per-class vote counts collected from the trees of a forest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    legitimate: usize,
    fraud: usize,
}

impl VoteTally {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every vote in `votes`
    pub fn from_votes<I: IntoIterator<Item = Label>>(votes: I) -> Self {
        let mut tally = Self::new();
        for vote in votes {
            tally.record(vote);
        }
        tally
    }

    /// Record one tree's vote
    pub fn record(&mut self, vote: Label) {
        match vote {
            Label::Legitimate => self.legitimate += 1,
            Label::Fraud => self.fraud += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.legitimate + self.fraud
    }

    pub fn votes_for(&self, label: Label) -> usize {
        match label {
            Label::Legitimate => self.legitimate,
            Label::Fraud => self.fraud,
        }
    }

    /// Majority label; fraud needs strictly more than half of the votes.
    pub fn majority(&self) -> Label {
        if self.fraud > self.legitimate {
            Label::Fraud
        } else {
            Label::Legitimate
        }
    }

    /// Fraction of trees voting fraud (0.0 when there are no votes).
    pub fn fraud_share(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.fraud as f64 / self.total() as f64
    }
}
