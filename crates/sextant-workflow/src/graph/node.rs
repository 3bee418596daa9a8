use futures::future::BoxFuture;

use sextant_core::error::Result;

use super::state::WorkflowState;

/// A named unit of computation in a workflow graph.
///
/// A node reads the current state and returns a partial update. Returning
/// `Err` halts the run: the engine records the error on the state and keeps
/// everything accumulated so far.
pub trait Node<S: WorkflowState>: Send + Sync {
    fn run<'a>(&'a self, state: &'a S) -> BoxFuture<'a, Result<S::Update>>;
}

/// Adapts a synchronous closure into a [`Node`].
pub struct FnNode<F>(F);

impl<F> FnNode<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<S, F> Node<S> for FnNode<F>
where
    S: WorkflowState,
    F: Fn(&S) -> Result<S::Update> + Send + Sync,
{
    fn run<'a>(&'a self, state: &'a S) -> BoxFuture<'a, Result<S::Update>> {
        let result = (self.0)(state);
        Box::pin(async move { result })
    }
}
