//! The scope-structured builder.
//!
//! A [`Builder`] keeps a stack of open frames. Opening a scope pushes a frame,
//! closing it pops the frame and runs its assembly: blocks are handed to their
//! function, functions to their module, and the outermost frame produces the
//! builder result.
//!
//! ```text
//! open_module
//!   open_function          -> pushes the function and its default block
//!     set_func_name / add_param / set_return_type
//!     open_block(dataflow) -> emit ... close_scope
//!     add_output
//!   close_scope            -> function registered in the module
//! close_scope              -> module is the result
//! ```

use tracing::{debug, instrument, trace};

use crate::{
    config::BuilderConfig,
    ir::{
        Assembler, Attrs, BlockBuilder, DataType, Expr, Function, GlobalVar, IRModule, PrimExpr,
        Type, Var, op,
    },
};

mod block;
mod context;
mod errors;
mod function;
mod module;
mod naming;

pub use block::BlockFrame;
pub use errors::{BuilderError, ErrorCategory, Result};
pub use function::FunctionFrame;
pub use module::ModuleFrame;
pub use naming::{IdentityNames, NameSupply, Namer, Renamer, SuffixNames};

/// Creates the assembler a new function frame owns.
pub type AssemblerFactory = fn(&BuilderConfig) -> Box<dyn Assembler>;

fn default_assembler(config: &BuilderConfig) -> Box<dyn Assembler> {
    Box::new(BlockBuilder::new(
        config.binding_var_prefix.clone(),
        config.dataflow_var_prefix.clone(),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Module,
    Function,
    Block,
}

#[derive(Debug)]
pub enum Frame {
    Module(ModuleFrame),
    Function(FunctionFrame),
    Block(BlockFrame),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Module(_) => FrameKind::Module,
            Frame::Function(_) => FrameKind::Function,
            Frame::Block(_) => FrameKind::Block,
        }
    }
}

/// A concrete frame type, used to look frames up by kind.
pub trait FrameVariant: Sized {
    const KIND: FrameKind;

    fn from_frame(frame: &Frame) -> Option<&Self>;

    fn from_frame_mut(frame: &mut Frame) -> Option<&mut Self>;
}

macro_rules! frame_variant {
    ($ty:ty, $variant:ident) => {
        impl FrameVariant for $ty {
            const KIND: FrameKind = FrameKind::$variant;

            fn from_frame(frame: &Frame) -> Option<&Self> {
                match frame {
                    Frame::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_frame_mut(frame: &mut Frame) -> Option<&mut Self> {
                match frame {
                    Frame::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

frame_variant!(ModuleFrame, Module);
frame_variant!(FunctionFrame, Function);
frame_variant!(BlockFrame, Block);

/// Names an open scope so that it can be closed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeHandle {
    pub depth: usize,
    pub kind: FrameKind,
}

/// What a construction session produces.
#[derive(Debug, Clone)]
pub enum Artifact {
    Module(IRModule),
    Function(Function),
}

impl Artifact {
    pub fn as_module(&self) -> Option<&IRModule> {
        match self {
            Artifact::Module(module) => Some(module),
            Artifact::Function(_) => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Artifact::Function(func) => Some(func),
            Artifact::Module(_) => None,
        }
    }
}

/// Context of one construction session.
///
/// Every operation returns an error on misuse. After the first error the session
/// is over: later operations fail with [`BuilderError::SessionFailed`] and the caller
/// is expected to [`Builder::abort`] the remaining frames.
#[derive(Debug)]
pub struct Builder {
    frames: Vec<Frame>,
    result: Option<Artifact>,
    config: BuilderConfig,
    namer: Namer,
    assembler_factory: AssemblerFactory,
    failed: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::with_config(BuilderConfig::default())
    }

    pub fn with_config(config: BuilderConfig) -> Self {
        Self {
            frames: Vec::new(),
            result: None,
            config,
            namer: Namer::default(),
            assembler_factory: default_assembler,
            failed: false,
        }
    }

    /// Replaces the assembler given to each new function.
    pub fn with_assembler(mut self, factory: AssemblerFactory) -> Self {
        self.assembler_factory = factory;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn namer_mut(&mut self) -> &mut Namer {
        &mut self.namer
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// The kinds of the open frames, outermost first.
    pub fn frame_kinds(&self) -> Vec<FrameKind> {
        self.frames.iter().map(Frame::kind).collect()
    }

    pub fn result(&self) -> Option<&Artifact> {
        self.result.as_ref()
    }

    /// Moves the result out once every scope is closed.
    pub fn take_result(&mut self) -> Option<Artifact> {
        if !self.frames.is_empty() {
            return None;
        }
        self.result.take()
    }

    /// The nearest open frame of type `F`.
    pub fn find_frame<F: FrameVariant>(&self) -> Option<&F> {
        self.frames.iter().rev().find_map(F::from_frame)
    }

    pub fn find_frame_mut<F: FrameVariant>(&mut self) -> Option<&mut F> {
        self.frames.iter_mut().rev().find_map(F::from_frame_mut)
    }

    /// The innermost frame, if it is of type `F`.
    pub fn last_frame<F: FrameVariant>(&self) -> Option<&F> {
        self.frames.last().and_then(F::from_frame)
    }

    fn frame_depth<F: FrameVariant>(&self) -> Option<usize> {
        self.frames.iter().rposition(|frame| frame.kind() == F::KIND)
    }

    /// Depth of the scope a close would end. A function's default block is closed
    /// together with its function, so the function is the innermost scope then.
    fn innermost_scope(&self) -> Option<usize> {
        let top = self.frames.len().checked_sub(1)?;
        match (&self.frames[top], top.checked_sub(1).map(|depth| &self.frames[depth])) {
            (Frame::Block(_), Some(Frame::Function(_))) => Some(top - 1),
            _ => Some(top),
        }
    }

    fn guard<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.failed {
            return Err(BuilderError::SessionFailed { operation });
        }
        let result = f(self);
        if let Err(error) = &result {
            debug!(operation, %error, "construction failed");
            self.failed = true;
        }
        result
    }

    /// Pushes `frame` and runs its entry.
    pub fn push(&mut self, frame: Frame) -> Result<ScopeHandle> {
        self.guard("push", |builder| builder.enter(frame))
    }

    /// Closes the scope named by `handle`, which must be the innermost one.
    pub fn pop(&mut self, handle: ScopeHandle) -> Result<()> {
        self.guard("close", |builder| builder.close_inner(handle, "close"))
    }

    /// Closes the innermost scope.
    pub fn close_scope(&mut self) -> Result<()> {
        self.guard("close_scope", |builder| {
            let depth = builder
                .innermost_scope()
                .ok_or(BuilderError::EmptyStack {
                    operation: "close_scope",
                })?;
            let kind = builder.frames[depth].kind();
            builder.close_inner(ScopeHandle { depth, kind }, "close_scope")
        })
    }

    /// Alias of [`Builder::pop`].
    pub fn close(&mut self, handle: ScopeHandle) -> Result<()> {
        self.pop(handle)
    }

    /// Drops every open frame without assembling anything, returning how many were
    /// dropped. The builder stays unusable afterwards unless it was empty.
    pub fn abort(&mut self) -> usize {
        let dropped = self.frames.len();
        if dropped > 0 {
            debug!(dropped, "aborting construction");
            self.failed = true;
        }
        self.frames.clear();
        dropped
    }

    pub fn set_result(&mut self, artifact: Artifact) -> Result<()> {
        self.guard("set_result", |builder| {
            builder.set_result_inner(artifact, "set_result")
        })
    }

    fn set_result_inner(&mut self, artifact: Artifact, operation: &'static str) -> Result<()> {
        if self.result.is_some() {
            return Err(BuilderError::ResultAlreadySet { operation });
        }
        self.result = Some(artifact);
        Ok(())
    }

    fn enter(&mut self, frame: Frame) -> Result<ScopeHandle> {
        let handle = ScopeHandle {
            depth: self.frames.len(),
            kind: frame.kind(),
        };
        debug!(kind = ?handle.kind, depth = handle.depth, "push frame");
        self.frames.push(frame);

        match self.frames.last() {
            Some(Frame::Function(func)) => {
                let default_block = func.default_block;
                self.enter(Frame::Block(default_block))?;
            }
            Some(Frame::Block(block)) => {
                let block = *block;
                block.enter(self)?;
            }
            _ => {}
        }

        Ok(handle)
    }

    fn close_inner(&mut self, handle: ScopeHandle, operation: &'static str) -> Result<()> {
        let innermost = self.innermost_scope();
        if innermost.is_none() {
            return Err(BuilderError::EmptyStack { operation });
        }
        if innermost != Some(handle.depth) || self.frames[handle.depth].kind() != handle.kind {
            return Err(BuilderError::UnbalancedScope {
                operation,
                kind: handle.kind,
                depth: handle.depth,
                innermost,
            });
        }

        if handle.kind == FrameKind::Function {
            // The default block goes first.
            self.exit_top(operation)?;
        }
        self.exit_top(operation)
    }

    fn exit_top(&mut self, operation: &'static str) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or(BuilderError::EmptyStack { operation })?;
        debug!(kind = ?frame.kind(), depth = self.frames.len(), "pop frame");

        match frame {
            Frame::Module(module) => module.exit(self),
            Frame::Function(func) => func.exit(self),
            Frame::Block(block) => block.exit(self),
        }
    }

    fn find_module_frame(&mut self, operation: &'static str) -> Result<&mut ModuleFrame> {
        let depth = self
            .frame_depth::<ModuleFrame>()
            .ok_or(BuilderError::ModuleNotFound { operation })?;
        if depth + 1 != self.frames.len() {
            return Err(BuilderError::NotImmediatelyInModule { operation });
        }
        ModuleFrame::from_frame_mut(&mut self.frames[depth])
            .ok_or(BuilderError::ModuleNotFound { operation })
    }

    /// The innermost function, provided its body scope is the innermost scope: only
    /// its default block may sit above it.
    fn find_function_frame(&mut self, operation: &'static str) -> Result<&mut FunctionFrame> {
        let depth = self
            .frame_depth::<FunctionFrame>()
            .ok_or(BuilderError::NotInFunctionScope { operation })?;
        trace!(depth, operation, "found function frame");
        if depth + 2 != self.frames.len() || self.last_frame::<BlockFrame>().is_none() {
            return Err(BuilderError::NotImmediatelyInFunction { operation });
        }
        FunctionFrame::from_frame_mut(&mut self.frames[depth])
            .ok_or(BuilderError::NotInFunctionScope { operation })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn open_module(&mut self) -> Result<ScopeHandle> {
        self.guard("open_module", |builder| {
            if builder.find_frame::<ModuleFrame>().is_some() {
                return Err(BuilderError::NestedModule {
                    operation: "open_module",
                });
            }
            let names = naming::name_supply(&builder.config);
            builder.enter(Frame::Module(ModuleFrame::new(names)))
        })
    }

    /// Reserves `name` in the innermost module, optionally with its definition.
    pub fn register_function(
        &mut self,
        name: &str,
        func: Option<Function>,
        allow_rename: bool,
    ) -> Result<GlobalVar> {
        self.guard("add_function", |builder| {
            builder
                .find_module_frame("add_function")?
                .register_function(name, func, allow_rename, "add_function")
        })
    }

    pub fn update_function(
        &mut self,
        name: &str,
        func: Function,
        require_first_define: bool,
    ) -> Result<()> {
        self.guard("update_function", |builder| {
            builder.find_module_frame("update_function")?.update_function(
                name,
                func,
                require_first_define,
                "update_function",
            )
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn open_function(&mut self) -> Result<ScopeHandle> {
        self.guard("function", |builder| {
            let assembler = (builder.assembler_factory)(&builder.config);
            builder.enter(Frame::Function(FunctionFrame::new(assembler)))
        })
    }

    /// Names `var` and appends it to the parameters of the current function.
    pub fn add_param(&mut self, name: &str, var: Var) -> Result<Var> {
        self.guard("arg", |builder| {
            builder.find_function_frame("arg")?;
            let mut node = Expr::Var(var);
            builder.namer.name(&mut node, name)?;
            let kind = node.kind();
            let Expr::Var(var) = node else {
                // A custom renamer replaced the var with another kind of node.
                return Err(BuilderError::NoRenamerRegistered {
                    kind,
                    name: name.to_string(),
                });
            };
            builder.find_function_frame("arg")?.params.push(var.clone());
            Ok(var)
        })
    }

    pub fn set_func_name(&mut self, name: &str) -> Result<()> {
        self.guard("func_name", |builder| {
            builder
                .find_function_frame("func_name")?
                .set_name(name, "func_name")
        })
    }

    pub fn set_func_attrs(&mut self, attrs: Attrs) -> Result<()> {
        self.guard("func_attr", |builder| {
            builder
                .find_function_frame("func_attr")?
                .set_attrs(attrs, "func_attr")
        })
    }

    pub fn set_return_type(&mut self, ty: Type) -> Result<Type> {
        self.guard("ret_type", |builder| {
            builder
                .find_function_frame("ret_type")?
                .set_return_type(ty, "ret_type")
        })
    }

    /// The return type of the innermost function, if set.
    pub fn return_type(&self) -> Option<&Type> {
        self.find_frame::<FunctionFrame>()?.return_type()
    }

    /// Adds a return value. Several outputs are returned as a tuple.
    pub fn add_output(&mut self, value: Expr) -> Result<()> {
        self.guard("return", |builder| {
            builder.find_function_frame("return")?.outputs.push(value);
            Ok(())
        })
    }

    pub fn open_block(&mut self, is_dataflow: bool) -> Result<ScopeHandle> {
        let frame = if is_dataflow {
            BlockFrame::dataflow()
        } else {
            BlockFrame::binding()
        };
        self.guard("block", |builder| {
            if builder.find_frame::<FunctionFrame>().is_none() {
                return Err(BuilderError::NotInFunctionScope { operation: "block" });
            }
            builder.enter(Frame::Block(frame))
        })
    }

    /// Binds `value` to a fresh var in the innermost open block.
    pub fn emit(&mut self, value: Expr) -> Result<Var> {
        self.guard("emit", |builder| {
            let func = builder
                .find_frame_mut::<FunctionFrame>()
                .ok_or(BuilderError::NotInFunctionScope { operation: "emit" })?;
            Ok(func.assembler.emit(value)?)
        })
    }

    /// Emits a [`op::call_tir`] call.
    pub fn call_tir(
        &mut self,
        func: Expr,
        args: Vec<Expr>,
        shape: Vec<PrimExpr>,
        dtype: DataType,
        packed_ints: Option<Expr>,
    ) -> Result<Var> {
        self.emit(op::call_tir(func, args, shape, dtype, packed_ints))
    }

    /// Runs `f` inside a new module scope, closing it if `f` succeeds.
    pub fn module<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let handle = self.open_module()?;
        let value = f(self)?;
        self.pop(handle)?;
        Ok(value)
    }

    /// Runs `f` inside a new function scope, closing it if `f` succeeds.
    pub fn function<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let handle = self.open_function()?;
        let value = f(self)?;
        self.pop(handle)?;
        Ok(value)
    }

    /// Runs `f` inside a new block scope, closing it if `f` succeeds.
    pub fn block<T>(
        &mut self,
        is_dataflow: bool,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let handle = self.open_block(is_dataflow)?;
        let value = f(self)?;
        self.pop(handle)?;
        Ok(value)
    }
}
