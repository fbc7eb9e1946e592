use std::{collections::HashMap, fmt};

use tracing::trace;

use super::errors::{BuilderError, Result};
use crate::{
    config::{BuilderConfig, NamingPolicy},
    ir::{Expr, NodeKind},
};

/// Renames a node of the kind it is registered for.
pub type Renamer = fn(&mut Expr, &str);

/// Registry of rename operations, dispatched on the node's [`NodeKind`].
#[derive(Debug, Clone)]
pub struct Namer {
    renamers: HashMap<NodeKind, Renamer>,
}

impl Default for Namer {
    /// A registry that knows how to rename vars and global vars.
    fn default() -> Self {
        let mut namer = Self::empty();
        namer.register(NodeKind::Var, rename_var);
        namer.register(NodeKind::DataflowVar, rename_var);
        namer.register(NodeKind::GlobalVar, rename_global_var);
        namer
    }
}

impl Namer {
    pub fn empty() -> Self {
        Self {
            renamers: HashMap::new(),
        }
    }

    /// Registers `renamer` for `kind`, returning the one it replaces.
    pub fn register(&mut self, kind: NodeKind, renamer: Renamer) -> Option<Renamer> {
        self.renamers.insert(kind, renamer)
    }

    pub fn name(&self, node: &mut Expr, name: &str) -> Result<()> {
        let kind = node.kind();
        let renamer = self
            .renamers
            .get(&kind)
            .ok_or_else(|| BuilderError::NoRenamerRegistered {
                kind,
                name: name.to_string(),
            })?;
        trace!(?kind, name, "renaming node");
        renamer(node, name);
        Ok(())
    }
}

fn rename_var(node: &mut Expr, name: &str) {
    if let Expr::Var(var) = node {
        var.name_hint = name.to_string();
    }
}

fn rename_global_var(node: &mut Expr, name: &str) {
    if let Expr::GlobalVar(var) = node {
        var.name_hint = name.to_string();
    }
}

/// Picks the name a module registers a function under.
pub trait NameSupply: fmt::Debug {
    /// Returns a name for `name`, given a predicate telling which names are taken.
    fn fresh(&self, name: &str, is_taken: &dyn Fn(&str) -> bool) -> String;
}

/// Uses every name as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNames;

impl NameSupply for IdentityNames {
    fn fresh(&self, name: &str, _is_taken: &dyn Fn(&str) -> bool) -> String {
        name.to_string()
    }
}

/// Appends the first free counter to taken names.
#[derive(Debug, Clone)]
pub struct SuffixNames {
    separator: String,
}

impl SuffixNames {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl NameSupply for SuffixNames {
    fn fresh(&self, name: &str, is_taken: &dyn Fn(&str) -> bool) -> String {
        if !is_taken(name) {
            return name.to_string();
        }

        let mut counter = 1usize;
        loop {
            let candidate = format!("{name}{}{counter}", self.separator);
            if !is_taken(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

pub(crate) fn name_supply(config: &BuilderConfig) -> Box<dyn NameSupply> {
    match config.naming {
        NamingPolicy::Identity => Box::new(IdentityNames),
        NamingPolicy::Suffix => Box::new(SuffixNames::new(config.suffix_separator.clone())),
    }
}
