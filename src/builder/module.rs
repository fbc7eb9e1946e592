use indexmap::IndexMap;
use tracing::{debug, instrument};

use super::{
    Artifact, Builder,
    errors::{BuilderError, Result},
    naming::NameSupply,
};
use crate::ir::{Function, Functions, GlobalVar, IRModule};

/// Collects the functions of a module. Names may be reserved before their
/// definition arrives, but every reserved name must be defined by the time the
/// module closes.
#[derive(Debug)]
pub struct ModuleFrame {
    functions: Functions,
    global_vars: IndexMap<String, GlobalVar>,
    names: Box<dyn NameSupply>,
}

impl ModuleFrame {
    pub(crate) fn new(names: Box<dyn NameSupply>) -> Self {
        Self {
            functions: Functions::new(),
            global_vars: IndexMap::new(),
            names,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.global_vars.contains_key(name)
    }

    pub fn global_var(&self, name: &str) -> Option<&GlobalVar> {
        self.global_vars.get(name)
    }

    /// Whether `name` is registered and has a definition.
    pub fn is_defined(&self, name: &str) -> bool {
        self.global_vars
            .get(name)
            .is_some_and(|var| self.functions[var.index].is_some())
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.global_vars.keys().map(String::as_str)
    }

    #[instrument(level = "debug", skip(self, func), fields(defined = func.is_some()))]
    pub(crate) fn register_function(
        &mut self,
        name: &str,
        func: Option<Function>,
        allow_rename: bool,
        operation: &'static str,
    ) -> Result<GlobalVar> {
        if !allow_rename && self.contains(name) {
            return Err(BuilderError::DuplicateFunction {
                name: name.to_string(),
                operation,
            });
        }

        let unique = self
            .names
            .fresh(name, &|candidate| self.global_vars.contains_key(candidate));

        // The naming policy may hand back a taken name, then the name is rebound in place.
        if let Some(var) = self.global_vars.get(&unique) {
            debug!("rebinding function {:?}", unique);
            self.functions[var.index] = func;
            return Ok(var.clone());
        }

        let index = self.functions.insert(func);
        let var = GlobalVar {
            name_hint: unique.clone(),
            index,
        };
        debug!("registered function {:?}", unique);
        self.global_vars.insert(unique, var.clone());

        Ok(var)
    }

    #[instrument(level = "debug", skip(self, func))]
    pub(crate) fn update_function(
        &mut self,
        name: &str,
        func: Function,
        require_first_define: bool,
        operation: &'static str,
    ) -> Result<()> {
        let var = self
            .global_vars
            .get(name)
            .ok_or_else(|| BuilderError::UnknownName {
                name: name.to_string(),
                operation,
            })?;

        let slot = &mut self.functions[var.index];
        if require_first_define && slot.is_some() {
            return Err(BuilderError::AlreadyDefined {
                name: name.to_string(),
                operation,
            });
        }
        *slot = Some(func);

        Ok(())
    }

    /// Assembles the module and makes it the builder result.
    #[instrument(level = "debug", skip_all, fields(functions = self.global_vars.len()))]
    pub(crate) fn exit(mut self, builder: &mut Builder) -> Result<()> {
        let mut functions = IndexMap::with_capacity(self.global_vars.len());

        for (name, var) in self.global_vars {
            let func = self.functions[var.index]
                .take()
                .ok_or(BuilderError::UndefinedFunction { name })?;
            functions.insert(var, func);
        }

        debug!("assembled module with {} functions", functions.len());
        builder.set_result_inner(Artifact::Module(IRModule::new(functions)), "close module")
    }
}
