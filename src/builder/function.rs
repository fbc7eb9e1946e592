use tracing::{debug, instrument, trace};

use super::{
    Artifact, Builder,
    block::BlockFrame,
    errors::{BuilderError, Result},
    module::ModuleFrame,
};
use crate::ir::{
    Assembler, AttrValue, Attrs, BindingBlock, Expr, Function, GLOBAL_SYMBOL, Type, Var,
};

/// Collects the pieces of a function until its scope closes.
#[derive(Debug)]
pub struct FunctionFrame {
    pub(crate) name: Option<String>,
    pub(crate) params: Vec<Var>,
    pub(crate) ret_type: Option<Type>,
    pub(crate) attrs: Attrs,
    pub(crate) blocks: Vec<BindingBlock>,
    pub(crate) outputs: Vec<Expr>,
    pub(crate) assembler: Box<dyn Assembler>,
    /// The block bracketing every statement not nested in an explicit block. It is
    /// entered with the function and closed first when the function closes.
    pub(crate) default_block: BlockFrame,
}

impl FunctionFrame {
    pub(crate) fn new(assembler: Box<dyn Assembler>) -> Self {
        Self {
            name: None,
            params: Vec::new(),
            ret_type: None,
            attrs: Attrs::new(),
            blocks: Vec::new(),
            outputs: Vec::new(),
            assembler,
            default_block: BlockFrame::binding(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn params(&self) -> &[Var] {
        &self.params
    }

    pub fn return_type(&self) -> Option<&Type> {
        self.ret_type.as_ref()
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    /// The non-empty blocks closed so far.
    pub fn blocks(&self) -> &[BindingBlock] {
        &self.blocks
    }

    pub fn outputs(&self) -> &[Expr] {
        &self.outputs
    }

    /// Keeps `block` unless it has no bindings.
    pub(crate) fn record_block(&mut self, block: BindingBlock) {
        if block.is_empty() {
            trace!("dropping empty block");
            return;
        }
        debug!(
            bindings = block.bindings.len(),
            dataflow = block.is_dataflow,
            "recording block"
        );
        self.blocks.push(block);
    }

    pub(crate) fn set_name(&mut self, name: &str, operation: &'static str) -> Result<()> {
        if let Some(previous) = &self.name {
            return Err(BuilderError::DuplicateName {
                previous: previous.clone(),
                operation,
            });
        }
        self.name = Some(name.to_string());
        Ok(())
    }

    pub(crate) fn set_attrs(&mut self, attrs: Attrs, operation: &'static str) -> Result<()> {
        if !self.attrs.is_empty() {
            return Err(BuilderError::DuplicateAttrs {
                count: self.attrs.len(),
                operation,
            });
        }
        self.attrs = attrs;
        Ok(())
    }

    pub(crate) fn set_return_type(&mut self, ty: Type, operation: &'static str) -> Result<Type> {
        if let Some(previous) = &self.ret_type {
            return Err(BuilderError::DuplicateReturnType {
                previous: previous.clone(),
                operation,
            });
        }
        self.ret_type = Some(ty.clone());
        Ok(ty)
    }

    /// Assembles the function and hands it to the enclosing module, or makes it the
    /// builder result when nothing encloses it.
    ///
    /// Runs after both the function frame and its default block are popped. An
    /// enclosing module must then be the innermost open frame.
    #[instrument(level = "debug", skip_all, fields(name = ?self.name))]
    pub(crate) fn exit(mut self, builder: &mut Builder) -> Result<()> {
        let name = self.name.clone().unwrap_or_default();

        let mut outputs = std::mem::take(&mut self.outputs);
        let output = match outputs.len() {
            0 => return Err(BuilderError::MissingOutput { name }),
            1 => outputs.remove(0),
            _ => Expr::tuple(outputs),
        };
        let output = self.assembler.normalize(output);
        let body = self
            .assembler
            .normalize(Expr::seq(std::mem::take(&mut self.blocks), output));

        let ret_type = self
            .ret_type
            .take()
            .ok_or_else(|| BuilderError::MissingReturnType { name: name.clone() })?;

        let mut attrs = self.attrs;
        if builder.config.global_symbol_attr {
            if let Some(symbol) = &self.name {
                attrs.insert(GLOBAL_SYMBOL.to_string(), AttrValue::Str(symbol.clone()));
            }
        }

        let func = Function {
            params: self.params,
            body,
            ret_type,
            attrs,
        };

        if builder.frames.is_empty() {
            debug!("function is the builder result");
            return builder.set_result_inner(Artifact::Function(func), "close function");
        }

        if builder.find_frame::<ModuleFrame>().is_none() {
            return Err(BuilderError::NoInsertionTarget { name });
        }
        let module = builder.find_module_frame("close function")?;

        if module.contains(&name) {
            module.update_function(&name, func, true, "close function")
        } else {
            module
                .register_function(&name, Some(func), false, "close function")
                .map(|_| ())
        }
    }
}
