use std::any::Any;
use std::fmt;

use static_assertions::assert_impl_all;

/// Boxed error returned by failing task computations.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Wraps a caught panic payload.
pub struct PanicError {
    panicked: Box<dyn Any + Send + 'static>,
}

assert_impl_all!(PanicError: Send);

impl PanicError {
    pub(crate) fn new(panicked: Box<dyn Any + Send + 'static>) -> Self {
        PanicError { panicked }
    }

    /// Returns panic message if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        let panicked = self.panicked.as_ref();
        if let Some(s) = panicked.downcast_ref::<&str>() {
            Some(s)
        } else if let Some(s) = panicked.downcast_ref::<String>() {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// Converts this error to panicked object.
    pub fn into_panic(self) -> Box<dyn Any + Send + 'static> {
        self.panicked
    }
}

impl fmt::Debug for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            None => write!(f, "PanicError({:?})", self.panicked.as_ref().type_id()),
            Some(s) => write!(f, "PanicError({:?})", s),
        }
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic({:?})", self.as_str().unwrap_or(".."))
    }
}

impl std::error::Error for PanicError {}

/// Uncaught failure of one task step.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(PanicError),
    #[error("task failed: {0}")]
    Failed(BoxError),
}

impl TaskError {
    /// Returns the panic message if this failure is a panic with string payload.
    pub fn panic_message(&self) -> Option<&str> {
        match self {
            TaskError::Panicked(err) => err.as_str(),
            TaskError::Failed(_) => None,
        }
    }

    /// Downcasts returned error to concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            TaskError::Failed(err) => err.downcast_ref::<E>(),
            TaskError::Panicked(_) => None,
        }
    }
}

/// Malformed select or channel operation detected before any suspension.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("two default clauses in the same select")]
    DuplicateDefault,
    #[error("unknown channel operation: {0:?}")]
    UnknownOperation(String),
    #[error("send case without value")]
    MissingValue,
}

/// Error for [crate::runtime::Runtime::block_on].
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error(transparent)]
    Failed(#[from] TaskError),
    #[error("runtime stalled before task completion")]
    Stalled,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn panic_error_message() {
        let err = PanicError::new(Box::new("oooooops"));
        assert_eq!(err.as_str(), Some("oooooops"));
        assert_eq!(err.to_string(), "panic(\"oooooops\")");

        let err = PanicError::new(Box::new(String::from("owned")));
        assert_eq!(format!("{:?}", err), "PanicError(\"owned\")");

        let err = PanicError::new(Box::new(5));
        assert_eq!(err.as_str(), None);
        assert_eq!(err.to_string(), "panic(\"..\")");
    }

    #[test]
    fn task_error_downcast() {
        let err = TaskError::Failed(Box::new(SelectError::DuplicateDefault));
        assert_eq!(err.downcast_ref::<SelectError>(), Some(&SelectError::DuplicateDefault));
        assert_eq!(err.panic_message(), None);
        assert_eq!(err.to_string(), "task failed: two default clauses in the same select");
    }
}
