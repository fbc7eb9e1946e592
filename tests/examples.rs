use irscope::{
    Artifact, Builder, BuilderConfig, FrameKind, NamingPolicy,
    ir::{
        Assembler, AttrValue, BlockBuilder, DataType, Expr, GLOBAL_SYMBOL, NodeKind,
        PrimExpr, Type, Var,
    },
};
use test_case::test_case;

use crate::common::{
    identity_body, identity_function, init_tracing, standalone_function, tensor_param, tensor_type,
};

mod common;

#[test]
fn module_with_one_function() {
    init_tracing();
    let mut builder = Builder::new();

    let module = builder.open_module().unwrap();
    let func = builder.open_function().unwrap();
    assert_eq!(
        builder.frame_kinds(),
        vec![FrameKind::Module, FrameKind::Function, FrameKind::Block]
    );

    let x = identity_body(&mut builder, "f").unwrap();
    builder.close(func).unwrap();
    assert_eq!(builder.frame_kinds(), vec![FrameKind::Module]);
    builder.close(module).unwrap();
    assert!(builder.is_empty());

    let Some(Artifact::Module(module)) = builder.take_result() else {
        panic!("expected a module");
    };
    assert_eq!(module.names(), vec!["f"]);

    let f = module.get_function("f").unwrap();
    assert_eq!(f.params, vec![x.clone()]);
    assert_eq!(f.params[0].name_hint, "x");
    assert_eq!(f.ret_type, tensor_type());
    assert!(f.blocks().is_empty());
    assert_eq!(f.output(), &Expr::from(x));
    assert_eq!(f.body.checked_type(), Some(&tensor_type()));
    assert_eq!(f.global_symbol(), Some("f"));
}

#[test]
fn function_without_module_returns_tuple() {
    let mut builder = Builder::new();

    builder
        .function(|builder| {
            let x = builder.add_param("x", tensor_param())?;
            let y = builder.add_param("y", Var::new("", Some(Type::Shape)))?;
            builder.set_return_type(Type::Tuple(vec![tensor_type(), Type::Shape]))?;
            builder.add_output(x.into())?;
            builder.add_output(y.into())?;
            Ok(())
        })
        .unwrap();

    let Some(Artifact::Function(func)) = builder.result() else {
        panic!("expected a function");
    };
    let Expr::Tuple(tuple) = func.output() else {
        panic!("expected a tuple, got {}", func.output());
    };
    assert_eq!(tuple.fields.len(), 2);
    assert_eq!(tuple.fields[0], Expr::from(func.params[0].clone()));
    assert_eq!(tuple.fields[1], Expr::from(func.params[1].clone()));
    assert_eq!(
        tuple.checked_type,
        Some(Type::Tuple(vec![tensor_type(), Type::Shape]))
    );
    assert_eq!(func.global_symbol(), None);
}

#[test]
fn well_nested_scopes_set_result_once() {
    let mut builder = Builder::new();

    builder
        .module(|builder| {
            identity_function(builder, "a")?;
            builder.function(|builder| {
                let x = identity_body(builder, "b")?;
                builder.block(true, |builder| {
                    builder.emit(x.into())?;
                    builder.block(false, |builder| builder.emit(Expr::extern_func("k")))
                })?;
                Ok(())
            })?;
            identity_function(builder, "c")
        })
        .unwrap();

    assert!(builder.is_empty());
    let module = builder.result().and_then(Artifact::as_module).unwrap();
    assert_eq!(module.names(), vec!["a", "b", "c"]);
    assert_eq!(module.get_function("b").unwrap().blocks().len(), 2);
}

#[test]
fn call_tir_is_emitted_in_default_block() {
    let mut builder = Builder::new();

    builder
        .function(|builder| {
            builder.set_func_name("main")?;
            let x = builder.add_param("x", tensor_param())?;
            builder.set_return_type(Type::tensor(2, "float32"))?;
            let gv0 = builder.call_tir(
                Expr::extern_func("extern_func"),
                vec![x.into()],
                vec![PrimExpr::Int(128), PrimExpr::Var("n".to_string())],
                DataType::new("float32"),
                None,
            )?;
            builder.add_output(gv0.into())
        })
        .unwrap();

    let func = builder.result().and_then(Artifact::as_function).unwrap();
    let blocks = func.blocks();
    assert_eq!(blocks.len(), 1);
    assert!(!blocks[0].is_dataflow);

    let binding = &blocks[0].bindings[0];
    assert_eq!(binding.var.name_hint, "gv0");
    assert_eq!(binding.var.ty, Some(Type::tensor(2, "float32")));
    let Expr::Call(call) = &binding.value else {
        panic!("expected a call, got {}", binding.value);
    };
    assert_eq!(*call.op, Expr::Op("relax.call_tir".to_string()));
    assert_eq!(call.args.len(), 3);
    assert_eq!(func.output(), &Expr::from(binding.var.clone()));
}

#[test]
fn blocks_are_recorded_in_emission_order() {
    let mut builder = Builder::new();

    builder
        .function(|builder| {
            let x = builder.add_param("x", tensor_param())?;
            builder.set_return_type(tensor_type())?;
            let a = builder.emit(x.into())?;
            let b = builder.block(true, |builder| builder.emit(a.into()))?;
            let c = builder.emit(b.into())?;
            builder.add_output(c.into())
        })
        .unwrap();

    let func = builder.result().and_then(Artifact::as_function).unwrap();
    let shape = func
        .blocks()
        .iter()
        .map(|block| (block.is_dataflow, block.bindings[0].var.name_hint.clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        shape,
        vec![
            (false, "gv0".to_string()),
            (true, "lv0".to_string()),
            (false, "gv1".to_string()),
        ]
    );
}

#[test]
fn empty_block_is_not_recorded() {
    let mut builder = Builder::new();

    builder
        .function(|builder| {
            let x = builder.add_param("x", tensor_param())?;
            builder.set_return_type(tensor_type())?;
            let block = builder.open_block(true)?;
            builder.close(block)?;
            builder.block(false, |_| Ok(()))?;
            builder.add_output(x.into())
        })
        .unwrap();

    let func = builder.result().and_then(Artifact::as_function).unwrap();
    assert!(func.blocks().is_empty());
}

#[test]
fn forward_declared_function_is_defined_on_close() {
    let mut builder = Builder::new();

    builder
        .module(|builder| {
            let g = builder.register_function("g", None, false)?;
            builder.function(|builder| {
                let x = identity_body(builder, "main")?;
                builder.emit(Expr::call(g.into(), vec![x.into()], vec![tensor_type()]))
            })?;
            identity_function(builder, "g")
        })
        .unwrap();

    let module = builder.result().and_then(Artifact::as_module).unwrap();
    assert_eq!(module.names(), vec!["g", "main"]);
    let main = module.get_function("main").unwrap();
    let Expr::Call(call) = &main.blocks()[0].bindings[0].value else {
        panic!("expected a call");
    };
    assert_eq!(*call.op, Expr::from(module.get_global_var("g").unwrap().clone()));
}

#[test]
fn update_replaces_a_defined_function() {
    let mut builder = Builder::new();
    let replacement = standalone_function(builder.config(), "y");

    builder
        .module(|builder| {
            identity_function(builder, "f")?;
            builder.update_function("f", replacement, false)
        })
        .unwrap();

    let module = builder.result().and_then(Artifact::as_module).unwrap();
    assert_eq!(module.names(), vec!["f"]);
    let func = module.get_function("f").unwrap();
    assert_eq!(func.params[0].name_hint, "y");
    assert_eq!(func.global_symbol(), None);
}

#[test]
fn update_defines_a_reserved_function() {
    let mut builder = Builder::new();
    let definition = standalone_function(builder.config(), "y");

    let g = builder
        .module(|builder| {
            let g = builder.register_function("g", None, false)?;
            builder.update_function("g", definition, true)?;
            Ok(g)
        })
        .unwrap();

    let module = builder.result().and_then(Artifact::as_module).unwrap();
    assert_eq!(module.get_global_var("g"), Some(&g));
    assert_eq!(module.get_function("g").unwrap().params[0].name_hint, "y");
}

#[test_case(NamingPolicy::Suffix, vec!["f", "f_1"], "f_1" ; "suffix keeps both definitions")]
#[test_case(NamingPolicy::Identity, vec!["f"], "f" ; "identity rebinds the name")]
fn register_with_rename(naming: NamingPolicy, names: Vec<&str>, registered: &str) {
    let config = BuilderConfig {
        naming,
        ..BuilderConfig::default()
    };
    let replacement = standalone_function(&config, "y");
    let mut builder = Builder::with_config(config);

    let var = builder
        .module(|builder| {
            identity_function(builder, "f")?;
            builder.register_function("f", Some(replacement), true)
        })
        .unwrap();
    assert_eq!(var.name_hint, registered);

    let module = builder.result().and_then(Artifact::as_module).unwrap();
    assert_eq!(module.names(), names);
    let func = module.get_function(registered).unwrap();
    assert_eq!(func.params[0].name_hint, "y");
}

#[test]
fn attributes_and_global_symbol() {
    let mut builder = Builder::new();

    builder
        .function(|builder| {
            identity_body(builder, "main")?;
            builder.set_func_attrs(
                [("num_input".to_string(), AttrValue::Int(1))]
                    .into_iter()
                    .collect(),
            )
        })
        .unwrap();

    let func = builder.result().and_then(Artifact::as_function).unwrap();
    assert_eq!(func.attrs.get("num_input"), Some(&AttrValue::Int(1)));
    assert_eq!(
        func.attrs.get(GLOBAL_SYMBOL),
        Some(&AttrValue::Str("main".to_string()))
    );
}

#[test]
fn global_symbol_can_be_disabled() {
    let config = BuilderConfig {
        global_symbol_attr: false,
        ..BuilderConfig::default()
    };
    let mut builder = Builder::with_config(config);
    identity_function(&mut builder, "main").unwrap();

    let func = builder.result().and_then(Artifact::as_function).unwrap();
    assert!(func.attrs.is_empty());
}

#[test]
fn return_type_reads_back() {
    let mut builder = Builder::new();
    builder.open_function().unwrap();
    assert_eq!(builder.return_type(), None);

    let ty = builder.set_return_type(tensor_type()).unwrap();
    assert_eq!(ty, tensor_type());
    assert_eq!(builder.return_type(), Some(&tensor_type()));
}

#[test]
fn custom_var_prefixes() {
    let config = BuilderConfig {
        binding_var_prefix: "v".to_string(),
        dataflow_var_prefix: "d".to_string(),
        ..BuilderConfig::default()
    };
    let mut builder = Builder::with_config(config);

    let (v, d) = builder
        .function(|builder| {
            let x = builder.add_param("x", tensor_param())?;
            builder.set_return_type(tensor_type())?;
            let v = builder.emit(x.into())?;
            let d = builder.block(true, |builder| builder.emit(v.clone().into()))?;
            builder.add_output(d.clone().into())?;
            Ok((v, d))
        })
        .unwrap();

    assert_eq!(v.name_hint, "v0");
    assert_eq!(d.name_hint, "d0");
    assert!(d.dataflow);
}

fn numbered_assembler(_: &BuilderConfig) -> Box<dyn Assembler> {
    Box::new(BlockBuilder::new("t", "d"))
}

#[test]
fn custom_assembler_is_used_per_function() {
    let mut builder = Builder::new().with_assembler(numbered_assembler);

    let t = builder
        .function(|builder| {
            let x = builder.add_param("x", tensor_param())?;
            builder.set_return_type(tensor_type())?;
            let t = builder.emit(x.into())?;
            builder.add_output(t.clone().into())?;
            Ok(t)
        })
        .unwrap();
    assert_eq!(t.name_hint, "t0");
}

fn shouting_renamer(node: &mut Expr, name: &str) {
    if let Expr::Var(var) = node {
        var.name_hint = name.to_uppercase();
    }
}

#[test]
fn custom_renamer_names_params() {
    let mut builder = Builder::new();
    let previous = builder.namer_mut().register(NodeKind::Var, shouting_renamer);
    assert!(previous.is_some());

    let x = builder
        .function(|builder| identity_body(builder, "f"))
        .unwrap();
    assert_eq!(x.name_hint, "X");
}

#[test]
fn take_result_empties_the_slot() {
    let mut builder = Builder::new();
    identity_function(&mut builder, "f").unwrap();

    assert!(matches!(builder.take_result(), Some(Artifact::Function(_))));
    assert!(builder.result().is_none());

    // With the slot empty a new artifact may be built.
    identity_function(&mut builder, "g").unwrap();
    let func = builder.result().and_then(Artifact::as_function).unwrap();
    assert_eq!(func.global_symbol(), Some("g"));
}

#[test]
fn current_builder_session() {
    Builder::begin(Builder::new()).unwrap();

    let handle = Builder::with_current(|builder| builder.open_module()).unwrap();
    Builder::with_current(|builder| identity_function(builder, "main")).unwrap();
    Builder::with_current(|builder| identity_function(builder, "helper")).unwrap();
    Builder::with_current(|builder| builder.close(handle)).unwrap();

    let mut builder = Builder::end().unwrap();
    let Some(Artifact::Module(module)) = builder.take_result() else {
        panic!("expected a module");
    };
    assert_eq!(module.names(), vec!["main", "helper"]);
    assert_eq!(module.len(), 2);
}

#[test]
fn sessions_on_different_threads_are_independent() {
    let workers = ["left", "right"].map(|name| {
        std::thread::spawn(move || {
            Builder::begin(Builder::new())?;
            let handle = Builder::with_current(|builder| builder.open_module())?;
            Builder::with_current(|builder| identity_function(builder, name))?;
            Builder::with_current(|builder| builder.close(handle))?;
            let mut builder = Builder::end()?;
            Ok::<_, irscope::BuilderError>(builder.take_result())
        })
    });
    assert!(!Builder::is_active());

    for (worker, name) in workers.into_iter().zip(["left", "right"]) {
        let Some(Artifact::Module(module)) = worker.join().unwrap().unwrap() else {
            panic!("expected a module from {name}");
        };
        assert_eq!(module.names(), vec![name]);
    }
    assert!(!Builder::is_active());
}
