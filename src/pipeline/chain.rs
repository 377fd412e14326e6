//! Ordered, short-circuiting stage chains

use crate::{Result, TidemarkError};
use async_trait::async_trait;

/// Context a chain runs over
pub trait StageContext: Send {
    /// Returns true once a stop was requested
    fn is_stop_requested(&self) -> bool;
}

/// One step of a chain
///
/// A stage returning `false` must already have set a terminal state on the
/// context and fired the matching rejection event.
#[async_trait]
pub trait Stage<C: StageContext>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C) -> Result<bool>;
}

/// An ordered list of stages run as a short-circuit AND
#[derive(Debug, Clone)]
pub struct StageChain<S> {
    name: &'static str,
    stages: Vec<S>,
}

impl<S> StageChain<S> {
    pub fn new(name: &'static str, stages: Vec<S>) -> Self {
        Self { name, stages }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stages(&self) -> &[S] {
        &self.stages
    }

    /// Runs every stage in order until one returns `false`
    ///
    /// The stop flag is checked before each stage.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Every stage passed
    /// * `Ok(false)` - A stage rejected the context
    /// * `Err(TidemarkError::Interrupted)` - A stop was requested mid-chain
    pub async fn run<C>(&self, ctx: &mut C) -> Result<bool>
    where
        S: Stage<C>,
        C: StageContext,
    {
        for stage in &self.stages {
            if ctx.is_stop_requested() {
                tracing::debug!("{} interrupted before {}", self.name, stage.name());
                return Err(TidemarkError::Interrupted);
            }
            if !stage.execute(ctx).await? {
                tracing::trace!("{} stopped at {}", self.name, stage.name());
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Trace {
        visited: Vec<&'static str>,
        stop_after: Option<usize>,
    }

    impl StageContext for Trace {
        fn is_stop_requested(&self) -> bool {
            self.stop_after
                .map(|n| self.visited.len() >= n)
                .unwrap_or(false)
        }
    }

    enum Step {
        Pass(&'static str),
        Reject(&'static str),
        Fail,
    }

    #[async_trait]
    impl Stage<Trace> for Step {
        fn name(&self) -> &'static str {
            match self {
                Self::Pass(name) | Self::Reject(name) => *name,
                Self::Fail => "fail",
            }
        }

        async fn execute(&self, ctx: &mut Trace) -> Result<bool> {
            ctx.visited.push(self.name());
            match self {
                Self::Pass(_) => Ok(true),
                Self::Reject(_) => Ok(false),
                Self::Fail => Err(TidemarkError::Processing {
                    reference: "ref".to_string(),
                    message: "failed".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_all_stages_pass() {
        let chain = StageChain::new("test", vec![Step::Pass("a"), Step::Pass("b")]);
        let mut trace = Trace::default();
        assert!(chain.run(&mut trace).await.unwrap());
        assert_eq!(trace.visited, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_first_rejection_short_circuits() {
        let chain = StageChain::new(
            "test",
            vec![Step::Pass("a"), Step::Reject("b"), Step::Pass("c")],
        );
        let mut trace = Trace::default();
        assert!(!chain.run(&mut trace).await.unwrap());
        assert_eq!(trace.visited, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let chain = StageChain::new("test", vec![Step::Fail, Step::Pass("b")]);
        let mut trace = Trace::default();
        assert!(chain.run(&mut trace).await.unwrap_err().is_document_error());
        assert_eq!(trace.visited, vec!["fail"]);
    }

    #[tokio::test]
    async fn test_stop_interrupts_between_stages() {
        let chain = StageChain::new("test", vec![Step::Pass("a"), Step::Pass("b")]);
        let mut trace = Trace {
            stop_after: Some(1),
            ..Default::default()
        };
        let result = chain.run(&mut trace).await;
        assert!(matches!(result, Err(TidemarkError::Interrupted)));
        assert_eq!(trace.visited, vec!["a"]);
    }

    #[tokio::test]
    async fn test_empty_chain_passes() {
        let chain: StageChain<Step> = StageChain::new("empty", Vec::new());
        assert!(chain.run(&mut Trace::default()).await.unwrap());
    }
}
