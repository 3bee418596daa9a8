/// State threaded through every stage of one workflow run.
///
/// Nodes never mutate the state directly; they return an `Update` which the
/// engine merges with [`apply`](WorkflowState::apply) once the node finishes.
pub trait WorkflowState: Send + Sync + 'static {
    /// Partial update produced by a single node.
    type Update: Send + 'static;

    /// Merge a node's update into the state.
    fn apply(&mut self, update: Self::Update);

    /// The recorded error, if the run failed.
    fn error(&self) -> Option<&str>;

    fn set_error(&mut self, error: String);
}
