use tracing::{debug, instrument};

use super::{
    Builder, Frame,
    errors::{BuilderError, Result},
    function::FunctionFrame,
};
use crate::ir::Assembler;

/// A region of bindings inside a function.
///
/// Block frames have no identity beyond their position on the frame stack, so they
/// are never compared with each other.
#[derive(Debug, Clone, Copy)]
pub struct BlockFrame {
    is_dataflow: bool,
}

impl BlockFrame {
    pub fn dataflow() -> Self {
        Self { is_dataflow: true }
    }

    pub fn binding() -> Self {
        Self { is_dataflow: false }
    }

    pub fn is_dataflow(&self) -> bool {
        self.is_dataflow
    }

    fn operation(&self) -> &'static str {
        if self.is_dataflow {
            "dataflow"
        } else {
            "binding_block"
        }
    }

    fn begin(&self, assembler: &mut dyn Assembler) {
        if self.is_dataflow {
            assembler.begin_dataflow_block();
        } else {
            assembler.begin_binding_block();
        }
    }

    /// Runs right after this frame is pushed.
    ///
    /// An enclosing block is suspended: what it holds so far is recorded, so the
    /// function's blocks stay in emission order.
    #[instrument(level = "debug", skip_all, fields(dataflow = self.is_dataflow))]
    pub(crate) fn enter(self, builder: &mut Builder) -> Result<()> {
        let operation = self.operation();
        let outer = builder
            .frames
            .len()
            .checked_sub(2)
            .and_then(|depth| match &builder.frames[depth] {
                Frame::Block(block) => Some(*block),
                _ => None,
            });

        let func = builder
            .find_frame_mut::<FunctionFrame>()
            .ok_or(BuilderError::NotInFunctionScope { operation })?;

        if outer.is_some() {
            let suspended = func.assembler.end_block()?;
            debug!("suspending enclosing block");
            func.record_block(suspended);
        }
        self.begin(func.assembler.as_mut());

        Ok(())
    }

    /// Runs right after this frame is popped.
    #[instrument(level = "debug", skip_all, fields(dataflow = self.is_dataflow))]
    pub(crate) fn exit(self, builder: &mut Builder) -> Result<()> {
        let operation = self.operation();
        let outer = match builder.frames.last() {
            Some(Frame::Block(block)) => Some(*block),
            _ => None,
        };

        let func = builder
            .find_frame_mut::<FunctionFrame>()
            .ok_or(BuilderError::NotInFunctionScope { operation })?;

        let block = func.assembler.end_block()?;
        func.record_block(block);

        if let Some(outer) = outer {
            debug!("resuming enclosing block");
            outer.begin(func.assembler.as_mut());
        }

        Ok(())
    }
}
