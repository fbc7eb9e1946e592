use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use educe::Educe;
use indexmap::IndexMap;
use itertools::Itertools;
use typed_generational_arena::{SmallSlab, SmallSlabIndex};

pub mod assembler;
pub mod op;

pub use assembler::{Assembler, AssemblerError, BlockBuilder};

/// Slot of a function reserved inside a module under construction.
pub type FnIndex = SmallSlabIndex<Option<Function>>;
/// Function slots of a module under construction, filled as definitions arrive.
pub type Functions = SmallSlab<Option<Function>>;

/// Function attributes, e.g. `global_symbol`.
pub type Attrs = BTreeMap<String, AttrValue>;

/// Attribute name under which a function's own name is recorded.
pub const GLOBAL_SYMBOL: &str = "global_symbol";

/// The element type of a tensor, e.g. `float32`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataType(pub String);

impl DataType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single dimension of a shape, either known or symbolic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimExpr {
    Int(i64),
    Var(String),
}

impl From<i64> for PrimExpr {
    fn from(value: i64) -> Self {
        PrimExpr::Int(value)
    }
}

impl From<&str> for PrimExpr {
    fn from(value: &str) -> Self {
        PrimExpr::Var(value.to_string())
    }
}

impl fmt::Display for PrimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimExpr::Int(value) => write!(f, "{value}"),
            PrimExpr::Var(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Object,
    Shape,
    /// A tensor of rank `ndim` (`-1` when the rank is unknown).
    DynTensor {
        ndim: i64,
        dtype: DataType,
    },
    Tuple(Vec<Type>),
    Func {
        params: Vec<Type>,
        ret: Box<Type>,
    },
}

impl Type {
    pub fn tensor(ndim: i64, dtype: impl Into<String>) -> Self {
        Type::DynTensor {
            ndim,
            dtype: DataType::new(dtype),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object => f.write_str("Object"),
            Type::Shape => f.write_str("Shape"),
            Type::DynTensor { ndim, dtype } => write!(f, "Tensor(ndim={ndim}, {dtype})"),
            Type::Tuple(fields) => write!(f, "({})", fields.iter().join(", ")),
            Type::Func { params, ret } => write!(f, "fn({}) -> {ret}", params.iter().join(", ")),
        }
    }
}

/// Identity of a variable, unique for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u64);

impl VarId {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        VarId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A local variable.
///
/// Two vars are the same var only when they share a [`VarId`]. The name is a hint
/// and can be changed (see [`crate::builder::Namer`]) without changing identity.
#[derive(Debug, Clone, Educe)]
#[educe(PartialEq, Eq, Hash)]
pub struct Var {
    pub id: VarId,
    #[educe(PartialEq(ignore), Hash(ignore))]
    pub name_hint: String,
    /// Whether this var is only visible inside its dataflow block.
    #[educe(PartialEq(ignore), Hash(ignore))]
    pub dataflow: bool,
    #[educe(PartialEq(ignore), Hash(ignore))]
    pub shape: Option<Vec<PrimExpr>>,
    #[educe(PartialEq(ignore), Hash(ignore))]
    pub ty: Option<Type>,
}

impl Var {
    pub fn new(name_hint: impl Into<String>, ty: Option<Type>) -> Self {
        Self {
            id: VarId::fresh(),
            name_hint: name_hint.into(),
            dataflow: false,
            shape: None,
            ty,
        }
    }

    pub fn dataflow(name_hint: impl Into<String>, ty: Option<Type>) -> Self {
        Self {
            dataflow: true,
            ..Self::new(name_hint, ty)
        }
    }

    pub fn with_shape(mut self, shape: Vec<PrimExpr>) -> Self {
        self.shape = Some(shape);
        self
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name_hint.is_empty() {
            write!(f, "%{}", self.id.0)
        } else {
            f.write_str(&self.name_hint)
        }
    }
}

/// A module-level name, bound to a function slot of the module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalVar {
    pub name_hint: String,
    pub index: FnIndex,
}

impl fmt::Display for GlobalVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name_hint)
    }
}

static SHAPE_TYPE: Type = Type::Shape;

/// The dynamic kind of an expression node, used to dispatch node-generic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Var,
    DataflowVar,
    GlobalVar,
    ExternFunc,
    Op,
    Shape,
    Tuple,
    Call,
    Seq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var(Var),
    GlobalVar(GlobalVar),
    /// A function provided outside the module, referenced by symbol.
    ExternFunc(String),
    /// A builtin operator, e.g. `relax.call_tir`.
    Op(String),
    Shape(Vec<PrimExpr>),
    Tuple(Tuple),
    Call(Call),
    Seq(SeqExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    pub fields: Vec<Expr>,
    pub checked_type: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Box<Expr>,
    pub args: Vec<Expr>,
    pub attrs: Attrs,
    pub type_args: Vec<Type>,
    pub checked_type: Option<Type>,
}

/// A sequence of binding blocks followed by the expression they compute.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqExpr {
    pub blocks: Vec<BindingBlock>,
    pub body: Box<Expr>,
    pub checked_type: Option<Type>,
}

impl Expr {
    pub fn tuple(fields: Vec<Expr>) -> Self {
        Expr::Tuple(Tuple {
            fields,
            checked_type: None,
        })
    }

    pub fn call(op: Expr, args: Vec<Expr>, type_args: Vec<Type>) -> Self {
        Expr::Call(Call {
            op: Box::new(op),
            args,
            attrs: Attrs::new(),
            type_args,
            checked_type: None,
        })
    }

    pub fn seq(blocks: Vec<BindingBlock>, body: Expr) -> Self {
        Expr::Seq(SeqExpr {
            blocks,
            body: Box::new(body),
            checked_type: None,
        })
    }

    pub fn extern_func(name: impl Into<String>) -> Self {
        Expr::ExternFunc(name.into())
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Var(var) if var.dataflow => NodeKind::DataflowVar,
            Expr::Var(_) => NodeKind::Var,
            Expr::GlobalVar(_) => NodeKind::GlobalVar,
            Expr::ExternFunc(_) => NodeKind::ExternFunc,
            Expr::Op(_) => NodeKind::Op,
            Expr::Shape(_) => NodeKind::Shape,
            Expr::Tuple(_) => NodeKind::Tuple,
            Expr::Call(_) => NodeKind::Call,
            Expr::Seq(_) => NodeKind::Seq,
        }
    }

    /// The type inferred for this expression, if it has been normalized.
    pub fn checked_type(&self) -> Option<&Type> {
        match self {
            Expr::Var(var) => var.ty.as_ref(),
            Expr::Tuple(tuple) => tuple.checked_type.as_ref(),
            Expr::Call(call) => call.checked_type.as_ref(),
            Expr::Seq(seq) => seq.checked_type.as_ref(),
            Expr::Shape(_) => Some(&SHAPE_TYPE),
            Expr::GlobalVar(_) | Expr::ExternFunc(_) | Expr::Op(_) => None,
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Expr::Var(var) => Some(var),
            _ => None,
        }
    }
}

impl From<Var> for Expr {
    fn from(var: Var) -> Self {
        Expr::Var(var)
    }
}

impl From<GlobalVar> for Expr {
    fn from(var: GlobalVar) -> Self {
        Expr::GlobalVar(var)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(var) => write!(f, "{var}"),
            Expr::GlobalVar(var) => write!(f, "{var}"),
            Expr::ExternFunc(name) => write!(f, "{name:?}"),
            Expr::Op(name) => f.write_str(name),
            Expr::Shape(dims) => write!(f, "shape({})", dims.iter().join(", ")),
            Expr::Tuple(tuple) => write!(f, "({})", tuple.fields.iter().join(", ")),
            Expr::Call(call) => write!(f, "{}({})", call.op, call.args.iter().join(", ")),
            Expr::Seq(seq) => {
                let bindings = seq.blocks.iter().map(|block| block.bindings.len()).sum::<usize>();
                write!(f, "{{ {bindings} bindings; {} }}", seq.body)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub var: Var,
    pub value: Expr,
}

/// A straight-line run of bindings. Dataflow blocks are side-effect free and their
/// vars are not visible outside the block.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingBlock {
    pub bindings: Vec<Binding>,
    pub is_dataflow: bool,
}

impl BindingBlock {
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(value) => write!(f, "{value:?}"),
            AttrValue::Int(value) => write!(f, "{value}"),
            AttrValue::Float(value) => write!(f, "{value}"),
            AttrValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// A finished function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub params: Vec<Var>,
    /// Always a normalized [`Expr::Seq`] when produced by the builder.
    pub body: Expr,
    pub ret_type: Type,
    pub attrs: Attrs,
}

impl Function {
    /// The symbol recorded in the `global_symbol` attribute, if any.
    pub fn global_symbol(&self) -> Option<&str> {
        match self.attrs.get(GLOBAL_SYMBOL) {
            Some(AttrValue::Str(name)) => Some(name),
            _ => None,
        }
    }

    /// The blocks of the body, empty blocks excluded.
    pub fn blocks(&self) -> &[BindingBlock] {
        match &self.body {
            Expr::Seq(seq) => &seq.blocks,
            _ => &[],
        }
    }

    /// The value the function returns.
    pub fn output(&self) -> &Expr {
        match &self.body {
            Expr::Seq(seq) => &seq.body,
            body => body,
        }
    }
}

/// A finished module, functions in registration order.
#[derive(Debug, Clone, Default)]
pub struct IRModule {
    pub functions: IndexMap<GlobalVar, Function>,
}

impl IRModule {
    pub fn new(functions: IndexMap<GlobalVar, Function>) -> Self {
        Self { functions }
    }

    pub fn get_global_var(&self, name: &str) -> Option<&GlobalVar> {
        self.functions.keys().find(|var| var.name_hint == name)
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find_map(|(var, func)| (var.name_hint == name).then_some(func))
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions
            .keys()
            .map(|var| var.name_hint.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
