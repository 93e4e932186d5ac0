use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic run counter shared by a pipeline and all of its in-flight tasks.
///
/// Starting a new run bumps the generation; every token minted for an older generation then
/// reports itself cancelled.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new run and returns the token that belongs to it.
    pub fn advance(&self) -> CancelToken {
        let mine = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        CancelToken {
            current: Arc::clone(&self.0),
            mine,
        }
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    current: Arc<AtomicU64>,
    mine: u64,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Generation::new().advance()
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.mine
    }

    pub fn generation(&self) -> u64 {
        self.mine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_cancels_previous_tokens() {
        let generation = Generation::new();
        let first = generation.advance();
        assert!(!first.is_cancelled());

        let second = generation.advance();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(generation.current(), second.generation());
    }

    #[test]
    fn never_token_stays_live() {
        assert!(!CancelToken::never().is_cancelled());
    }
}
