use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Load,
    Parse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(pub u64);

/// Hands out monotonically increasing tokens per operation class.
///
/// Starting an operation invalidates every earlier token of the same class.
/// Nothing is cancelled; late results are dropped by [`RequestCoordinator::is_current`],
/// which callers must check right before mutating visible state.
#[derive(Debug, Default)]
pub struct RequestCoordinator {
    counters: HashMap<OperationClass, u64>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, class: OperationClass) -> RequestToken {
        let counter = self.counters.entry(class).or_insert(0);
        *counter += 1;
        RequestToken(*counter)
    }

    pub fn is_current(&self, class: OperationClass, token: RequestToken) -> bool {
        self.counters.get(&class).copied() == Some(token.0)
    }
}
