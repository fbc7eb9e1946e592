use std::cell::RefCell;

use tracing::debug;

use super::{
    Builder,
    errors::{BuilderError, Result},
};

thread_local! {
    static CURRENT: RefCell<Option<Builder>> = const { RefCell::new(None) };
}

/// The thread-scoped current builder, for hosts that cannot thread a `&mut Builder`
/// through their calls. Sessions on different threads never share a builder.
impl Builder {
    /// Makes `builder` the current builder of this thread.
    pub fn begin(builder: Builder) -> Result<()> {
        CURRENT.with(|current| {
            let mut current = current
                .try_borrow_mut()
                .map_err(|_| BuilderError::BuilderInUse { operation: "begin" })?;
            if current.is_some() {
                return Err(BuilderError::BuilderAlreadyActive { operation: "begin" });
            }
            debug!("builder session started");
            *current = Some(builder);
            Ok(())
        })
    }

    /// Ends the session of this thread, handing back its builder.
    pub fn end() -> Result<Builder> {
        CURRENT.with(|current| {
            let mut current = current
                .try_borrow_mut()
                .map_err(|_| BuilderError::BuilderInUse { operation: "end" })?;
            let builder = current
                .take()
                .ok_or(BuilderError::NoActiveBuilder { operation: "end" })?;
            debug!("builder session ended");
            Ok(builder)
        })
    }

    pub fn is_active() -> bool {
        CURRENT.with(|current| current.try_borrow().is_ok_and(|current| current.is_some()))
    }

    /// Runs `f` with the current builder of this thread.
    ///
    /// `f` must not call back into `with_current`.
    pub fn with_current<T>(f: impl FnOnce(&mut Builder) -> Result<T>) -> Result<T> {
        CURRENT.with(|current| {
            let mut current = current.try_borrow_mut().map_err(|_| BuilderError::BuilderInUse {
                operation: "current",
            })?;
            let builder = current.as_mut().ok_or(BuilderError::NoActiveBuilder {
                operation: "current",
            })?;
            f(builder)
        })
    }
}
