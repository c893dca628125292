//! Conjunction of several wait strategies.

use crate::errors::BerthResult;
use crate::wait::{WaitStrategy, WaitTarget};
use async_trait::async_trait;
use futures::future::try_join_all;

/// All inner strategies must report ready. They run concurrently and no
/// ordering between them is assumed; the first failure ends the wait.
pub struct CompositeWaitStrategy {
    strategies: Vec<Box<dyn WaitStrategy>>,
}

impl CompositeWaitStrategy {
    pub fn new(strategies: Vec<Box<dyn WaitStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn and(mut self, strategy: impl WaitStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }
}

#[async_trait]
impl WaitStrategy for CompositeWaitStrategy {
    fn name(&self) -> &'static str {
        "composite"
    }

    async fn wait_until_ready(&self, target: &WaitTarget) -> BerthResult<()> {
        try_join_all(
            self.strategies
                .iter()
                .map(|s| s.wait_until_ready(target)),
        )
        .await?;
        Ok(())
    }
}
