use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};

use super::{Binding, BindingBlock, Call, Expr, SeqExpr, Tuple, Type, Var};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("no binding block is open for {operation}")]
    NoOpenBlock { operation: &'static str },
}

/// Accumulates bindings into blocks and normalizes expressions.
///
/// Blocks nest: a `begin_*` call opens a block that the matching `end_block` closes.
pub trait Assembler: fmt::Debug {
    fn begin_dataflow_block(&mut self);

    fn begin_binding_block(&mut self);

    /// Binds `expr` to a fresh var in the innermost open block.
    fn emit(&mut self, expr: Expr) -> Result<Var, AssemblerError>;

    fn end_block(&mut self) -> Result<BindingBlock, AssemblerError>;

    /// Fills in the inferred types of `expr`. Normalizing twice is a no-op.
    fn normalize(&mut self, expr: Expr) -> Expr;
}

/// The default [`Assembler`].
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    open: Vec<BindingBlock>,
    binding_prefix: String,
    dataflow_prefix: String,
    binding_count: usize,
    dataflow_count: usize,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new("gv", "lv")
    }
}

impl BlockBuilder {
    pub fn new(binding_prefix: impl Into<String>, dataflow_prefix: impl Into<String>) -> Self {
        Self {
            open: Vec::new(),
            binding_prefix: binding_prefix.into(),
            dataflow_prefix: dataflow_prefix.into(),
            binding_count: 0,
            dataflow_count: 0,
        }
    }

    /// Number of currently open blocks.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    fn begin(&mut self, is_dataflow: bool) {
        trace!(is_dataflow, depth = self.open.len(), "begin block");
        self.open.push(BindingBlock {
            bindings: Vec::new(),
            is_dataflow,
        });
    }

    fn fresh_var(&mut self, is_dataflow: bool, ty: Option<Type>) -> Var {
        if is_dataflow {
            let name = format!("{}{}", self.dataflow_prefix, self.dataflow_count);
            self.dataflow_count += 1;
            Var::dataflow(name, ty)
        } else {
            let name = format!("{}{}", self.binding_prefix, self.binding_count);
            self.binding_count += 1;
            Var::new(name, ty)
        }
    }
}

impl Assembler for BlockBuilder {
    fn begin_dataflow_block(&mut self) {
        self.begin(true);
    }

    fn begin_binding_block(&mut self) {
        self.begin(false);
    }

    fn emit(&mut self, expr: Expr) -> Result<Var, AssemblerError> {
        let is_dataflow = self
            .open
            .last()
            .map(|block| block.is_dataflow)
            .ok_or(AssemblerError::NoOpenBlock { operation: "emit" })?;

        let value = self.normalize(expr);
        let var = self.fresh_var(is_dataflow, value.checked_type().cloned());
        debug!("emit {} = {}", var, value);

        let block = self
            .open
            .last_mut()
            .ok_or(AssemblerError::NoOpenBlock { operation: "emit" })?;
        block.bindings.push(Binding {
            var: var.clone(),
            value,
        });

        Ok(var)
    }

    fn end_block(&mut self) -> Result<BindingBlock, AssemblerError> {
        let block = self.open.pop().ok_or(AssemblerError::NoOpenBlock {
            operation: "end_block",
        })?;
        trace!(bindings = block.bindings.len(), "end block");
        Ok(block)
    }

    fn normalize(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::Tuple(Tuple { fields, .. }) => {
                let fields: Vec<Expr> = fields.into_iter().map(|x| self.normalize(x)).collect();
                let checked_type = fields
                    .iter()
                    .map(|x| x.checked_type().cloned())
                    .collect::<Option<Vec<_>>>()
                    .map(Type::Tuple);
                Expr::Tuple(Tuple {
                    fields,
                    checked_type,
                })
            }
            Expr::Call(Call {
                op,
                args,
                attrs,
                type_args,
                checked_type,
            }) => {
                let args = args.into_iter().map(|x| self.normalize(x)).collect();
                let checked_type = match (checked_type, type_args.as_slice()) {
                    (Some(ty), _) => Some(ty),
                    (None, [ty]) => Some(ty.clone()),
                    (None, _) => None,
                };
                Expr::Call(Call {
                    op,
                    args,
                    attrs,
                    type_args,
                    checked_type,
                })
            }
            Expr::Seq(SeqExpr { blocks, body, .. }) => {
                let body = self.normalize(*body);
                let checked_type = body.checked_type().cloned();
                Expr::Seq(SeqExpr {
                    blocks,
                    body: Box::new(body),
                    checked_type,
                })
            }
            expr => expr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Assembler, AssemblerError, BlockBuilder};
    use crate::ir::{Expr, Type, Var};

    fn tensor_var(name: &str) -> Var {
        Var::new(name, Some(Type::tensor(2, "float32")))
    }

    #[test]
    fn emit_outside_block_fails() {
        let mut builder = BlockBuilder::default();
        let error = builder
            .emit(Expr::from(tensor_var("x")))
            .expect_err("expected error");
        assert_eq!(error, AssemblerError::NoOpenBlock { operation: "emit" });
    }

    #[test]
    fn emitted_vars_follow_block_kind() {
        let mut builder = BlockBuilder::default();
        builder.begin_binding_block();
        let gv = builder.emit(Expr::from(tensor_var("x"))).unwrap();
        builder.begin_dataflow_block();
        let lv = builder.emit(Expr::from(tensor_var("y"))).unwrap();

        assert_eq!(gv.name_hint, "gv0");
        assert!(!gv.dataflow);
        assert_eq!(lv.name_hint, "lv0");
        assert!(lv.dataflow);
        assert_eq!(lv.ty, Some(Type::tensor(2, "float32")));

        let inner = builder.end_block().unwrap();
        assert!(inner.is_dataflow);
        assert_eq!(inner.bindings.len(), 1);
        let outer = builder.end_block().unwrap();
        assert!(!outer.is_dataflow);
        assert_eq!(outer.bindings[0].var, gv);
        assert_eq!(builder.depth(), 0);
    }

    #[test]
    fn normalize_infers_tuple_and_seq_types() {
        let mut builder = BlockBuilder::default();
        let x = tensor_var("x");
        let y = Var::new("y", Some(Type::Shape));
        let tuple = builder.normalize(Expr::tuple(vec![x.into(), y.into()]));
        let expected = Type::Tuple(vec![Type::tensor(2, "float32"), Type::Shape]);
        assert_eq!(tuple.checked_type(), Some(&expected));

        let seq = builder.normalize(Expr::seq(Vec::new(), tuple.clone()));
        assert_eq!(seq.checked_type(), Some(&expected));
        assert_eq!(builder.normalize(seq.clone()), seq);
    }

    #[test]
    fn normalize_leaves_untyped_tuple_untyped() {
        let mut builder = BlockBuilder::default();
        let tuple = builder.normalize(Expr::tuple(vec![
            Expr::extern_func("f"),
            Var::new("x", None).into(),
        ]));
        assert_eq!(tuple.checked_type(), None);
    }
}
