//! The module owner tree.
//!
//! Modules group variables and submodules; the root is the application
//! itself. The tree only affects naming (and which worker a variable
//! belongs to), never the wiring: a level flagged `eliminate_hierarchy` is
//! skipped when qualified names are composed.

use sf_core::{ModuleId, NodeId};

use crate::error::{GraphError, GraphResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// The root of the tree.
    Application,
    /// A grouping level without its own worker thread.
    Group,
    /// An application module with a worker thread.
    Module,
}

#[derive(Debug, Clone)]
pub struct ModuleEntry {
    pub id: ModuleId,
    pub name: String,
    pub description: String,
    pub parent: Option<ModuleId>,
    pub kind: ModuleKind,
    pub eliminate_hierarchy: bool,
    pub nodes: Vec<NodeId>,
}

/// Arena of all modules, rooted at the application.
#[derive(Debug)]
pub struct ModuleTree {
    entries: Vec<ModuleEntry>,
}

const LEGAL_NAME_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890_";

impl ModuleTree {
    /// Create the tree with the application at the root.
    ///
    /// The application name may only contain alphanumeric characters and
    /// underscores and must not be empty.
    pub fn new(application_name: &str) -> GraphResult<Self> {
        if application_name.is_empty() {
            return Err(GraphError::IllegalParameter {
                what: "the application name must not be empty".to_string(),
            });
        }
        if application_name
            .chars()
            .any(|c| !LEGAL_NAME_CHARS.contains(c))
        {
            return Err(GraphError::IllegalParameter {
                what: "the application name may only contain alphanumeric characters \
                       and underscores"
                    .to_string(),
            });
        }
        Ok(Self {
            entries: vec![ModuleEntry {
                id: ModuleId::from_index(0),
                name: application_name.to_string(),
                description: String::new(),
                parent: None,
                kind: ModuleKind::Application,
                eliminate_hierarchy: false,
                nodes: Vec::new(),
            }],
        })
    }

    pub fn root(&self) -> ModuleId {
        ModuleId::from_index(0)
    }

    pub fn module(&self, id: ModuleId) -> &ModuleEntry {
        &self.entries[id.index() as usize]
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.entries.iter()
    }

    fn add_entry(
        &mut self,
        parent: ModuleId,
        name: &str,
        description: &str,
        kind: ModuleKind,
    ) -> GraphResult<ModuleId> {
        if name.is_empty() || name.contains('/') {
            return Err(GraphError::IllegalParameter {
                what: format!("illegal module name '{name}'"),
            });
        }
        if parent.index() as usize >= self.entries.len() {
            return Err(GraphError::IllegalParameter {
                what: format!("unknown parent module {parent}"),
            });
        }
        let id = ModuleId::from_index(self.entries.len() as u32);
        self.entries.push(ModuleEntry {
            id,
            name: name.to_string(),
            description: description.to_string(),
            parent: Some(parent),
            kind,
            eliminate_hierarchy: false,
            nodes: Vec::new(),
        });
        Ok(id)
    }

    /// Add a grouping level under `parent`.
    pub fn add_group(
        &mut self,
        parent: ModuleId,
        name: &str,
        description: &str,
    ) -> GraphResult<ModuleId> {
        self.add_entry(parent, name, description, ModuleKind::Group)
    }

    /// Add an application module. Modules may only be owned by groups or by
    /// the application root, not by other modules.
    pub fn add_module(
        &mut self,
        parent: ModuleId,
        name: &str,
        description: &str,
    ) -> GraphResult<ModuleId> {
        match self.module(parent).kind {
            ModuleKind::Application | ModuleKind::Group => {}
            ModuleKind::Module => {
                return Err(GraphError::IllegalParameter {
                    what: "application modules must be owned by module groups or the \
                           application"
                        .to_string(),
                });
            }
        }
        self.add_entry(parent, name, description, ModuleKind::Module)
    }

    /// Skip this level when composing exported names. Wiring is unaffected.
    pub fn set_eliminate_hierarchy(&mut self, id: ModuleId) {
        self.entries[id.index() as usize].eliminate_hierarchy = true;
    }

    pub fn register_node(&mut self, module: ModuleId, node: NodeId) {
        self.entries[module.index() as usize].nodes.push(node);
    }

    /// Fully qualified name of a module, e.g. `/App/Group/Module`.
    pub fn qualified_module_name(&self, id: ModuleId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(module_id) = current {
            let entry = self.module(module_id);
            // the root is never eliminated
            if !entry.eliminate_hierarchy || entry.parent.is_none() {
                parts.push(entry.name.clone());
            }
            current = entry.parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Fully qualified name of a variable owned by `module`.
    pub fn qualified_variable_name(&self, module: ModuleId, variable: &str) -> String {
        format!("{}/{}", self.qualified_module_name(module), variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_name_is_validated() {
        assert!(ModuleTree::new("demo_app1").is_ok());
        assert!(ModuleTree::new("").is_err());
        assert!(ModuleTree::new("bad name").is_err());
        assert!(ModuleTree::new("bad/name").is_err());
    }

    #[test]
    fn qualified_names_follow_the_tree() {
        let mut tree = ModuleTree::new("app").unwrap();
        let group = tree.add_group(tree.root(), "group", "").unwrap();
        let module = tree.add_module(group, "ctrl", "").unwrap();
        assert_eq!(tree.qualified_module_name(module), "/app/group/ctrl");
        assert_eq!(
            tree.qualified_variable_name(module, "setpoint"),
            "/app/group/ctrl/setpoint"
        );
    }

    #[test]
    fn eliminated_levels_vanish_from_names() {
        let mut tree = ModuleTree::new("app").unwrap();
        let group = tree.add_group(tree.root(), "group", "").unwrap();
        let module = tree.add_module(group, "ctrl", "").unwrap();
        tree.set_eliminate_hierarchy(group);
        assert_eq!(tree.qualified_module_name(module), "/app/ctrl");
    }

    #[test]
    fn modules_cannot_own_modules() {
        let mut tree = ModuleTree::new("app").unwrap();
        let module = tree.add_module(tree.root(), "ctrl", "").unwrap();
        assert!(tree.add_module(module, "inner", "").is_err());
    }
}
