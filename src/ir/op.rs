//! Constructors for the operator calls a front-end emits most often.

use super::{DataType, Expr, PrimExpr, Type, Var};

pub const CALL_TIR: &str = "relax.call_tir";

/// An unnamed tensor var of the given shape, to be named when bound as a parameter.
pub fn tensor(shape: Vec<PrimExpr>, dtype: DataType) -> Var {
    let ty = Type::DynTensor {
        ndim: shape.len() as i64,
        dtype,
    };
    Var::new("", Some(ty)).with_shape(shape)
}

/// A call into a low-level kernel `func`, producing a tensor of `shape` and `dtype`.
///
/// `packed_ints`, when present, is passed after the output shape.
pub fn call_tir(
    func: Expr,
    args: Vec<Expr>,
    shape: Vec<PrimExpr>,
    dtype: DataType,
    packed_ints: Option<Expr>,
) -> Expr {
    let ty = Type::DynTensor {
        ndim: shape.len() as i64,
        dtype,
    };

    let mut call_args = vec![func, Expr::tuple(args), Expr::Shape(shape)];
    call_args.extend(packed_ints);

    Expr::call(Expr::Op(CALL_TIR.to_string()), call_args, vec![ty])
}
