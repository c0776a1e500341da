/// Supplies the host's current call stack, innermost frame first.
pub trait StackProvider: Send + Sync {
    fn get_stack(&self) -> Vec<String>;
}

impl<F> StackProvider for F
where
    F: Fn() -> Vec<String> + Send + Sync,
{
    fn get_stack(&self) -> Vec<String> {
        self()
    }
}

/// Provider for hosts that cannot capture a stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStack;

impl StackProvider for NoStack {
    fn get_stack(&self) -> Vec<String> {
        Vec::new()
    }
}
