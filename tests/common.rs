use irscope::{
    Artifact, Builder, BuilderConfig,
    builder::Result,
    ir::{DataType, Expr, Function, PrimExpr, Type, Var, op},
};
use tracing_subscriber::EnvFilter;

/// Installs a subscriber honoring `RUST_LOG`, once per test binary.
#[allow(unused)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(unused)]
pub fn tensor_type() -> Type {
    Type::tensor(2, "float32")
}

/// An unnamed `(128, 128)` float tensor, ready to be bound as a parameter.
#[allow(unused)]
pub fn tensor_param() -> Var {
    op::tensor(
        vec![PrimExpr::Int(128), PrimExpr::Int(128)],
        DataType::new("float32"),
    )
}

/// Fills the current function: named `name`, one tensor parameter `x`, returning
/// `x` unchanged.
#[allow(unused)]
pub fn identity_body(builder: &mut Builder, name: &str) -> Result<Var> {
    builder.set_func_name(name)?;
    let x = builder.add_param("x", tensor_param())?;
    builder.set_return_type(tensor_type())?;
    builder.add_output(Expr::from(x.clone()))?;
    Ok(x)
}

/// Builds a complete identity function named `name` in the current scope.
#[allow(unused)]
pub fn identity_function(builder: &mut Builder, name: &str) -> Result<Var> {
    builder.function(|builder| identity_body(builder, name))
}

/// An unnamed function taking one tensor parameter named `param`, built apart from
/// any session.
#[allow(unused)]
pub fn standalone_function(config: &BuilderConfig, param: &str) -> Function {
    let mut builder = Builder::with_config(config.clone());
    builder
        .function(|builder| {
            let x = builder.add_param(param, tensor_param())?;
            builder.set_return_type(tensor_type())?;
            builder.add_output(x.into())
        })
        .unwrap();
    match builder.take_result() {
        Some(Artifact::Function(func)) => func,
        other => panic!("expected a function, got {other:?}"),
    }
}
