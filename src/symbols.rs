use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ast::NodeId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapacityError {
    #[error("Table of {table} is full: capacity {capacity} exceeded by '{name}'")]
    Symbols {
        table: String,
        name: String,
        capacity: usize,
    },
    #[error("Function table is full: capacity {capacity} exceeded by '{name}'")]
    Functions { name: String, capacity: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    /// Set once the name is declared; checked before every use.
    pub initialized: bool,
}

/// Ordered name registry with a hard capacity.
///
/// Indices are stable for the lifetime of the table and are what `Variable`
/// and `FunctionRef` nodes carry as payload.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    label: String,
    capacity: usize,
    symbols: Vec<Symbol>,
    index: FxHashMap<String, usize>,
}

impl SymbolTable {
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        Self {
            label: label.into(),
            capacity,
            symbols: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the index of `name`, registering it first if needed.
    pub fn intern(&mut self, name: &str) -> Result<usize, CapacityError> {
        if let Some(index) = self.find(name) {
            return Ok(index);
        }
        if self.symbols.len() >= self.capacity {
            return Err(CapacityError::Symbols {
                table: self.label.clone(),
                name: name.to_string(),
                capacity: self.capacity,
            });
        }
        let index = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            initialized: false,
        });
        self.index.insert(name.to_string(), index);
        Ok(index)
    }

    /// Registers `name` and marks it declared in one step.
    pub fn declare(&mut self, name: &str) -> Result<usize, CapacityError> {
        let index = self.intern(name)?;
        self.symbols[index].initialized = true;
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.get(index).map(|symbol| symbol.name.as_str())
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.find(name)
            .and_then(|index| self.get(index))
            .is_some_and(|symbol| symbol.initialized)
    }

    pub fn mark_initialized(&mut self, index: usize) {
        if let Some(symbol) = self.symbols.get_mut(index) {
            symbol.initialized = true;
        }
    }

    pub fn mark_all_initialized(&mut self) {
        for symbol in &mut self.symbols {
            symbol.initialized = true;
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Index of the function's name in the unit's variable table.
    pub name_index: usize,
    /// Parameter names in declaration order.
    pub params: Vec<String>,
    pub body: Option<NodeId>,
    /// Private table holding parameters first, then `var` declarations.
    pub locals: SymbolTable,
}

#[derive(Debug, Clone)]
pub struct FunctionTable {
    capacity: usize,
    functions: Vec<Function>,
    by_name_index: FxHashMap<usize, usize>,
}

impl FunctionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            functions: Vec::new(),
            by_name_index: FxHashMap::default(),
        }
    }

    /// Adds a function with an empty private table of `locals_capacity`.
    ///
    /// Callers check for redeclaration with [`FunctionTable::find`] first.
    pub fn declare(
        &mut self,
        name: &str,
        name_index: usize,
        locals_capacity: usize,
    ) -> Result<usize, CapacityError> {
        if self.functions.len() >= self.capacity {
            return Err(CapacityError::Functions {
                name: name.to_string(),
                capacity: self.capacity,
            });
        }
        let id = self.functions.len();
        self.functions.push(Function {
            name: name.to_string(),
            name_index,
            params: Vec::new(),
            body: None,
            locals: SymbolTable::new(format!("locals of '{name}'"), locals_capacity),
        });
        self.by_name_index.insert(name_index, id);
        Ok(id)
    }

    /// Looks a function up by the variable-table index of its name.
    pub fn find(&self, name_index: usize) -> Option<usize> {
        self.by_name_index.get(&name_index).copied()
    }

    pub fn get(&self, id: usize) -> Option<&Function> {
        self.functions.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Function> {
        self.functions.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent_and_ordered() {
        let mut table = SymbolTable::new("variables", 4);
        assert_eq!(table.intern("x").expect("room"), 0);
        assert_eq!(table.intern("y").expect("room"), 1);
        assert_eq!(table.intern("x").expect("room"), 0);
        assert_eq!(table.name(1), Some("y"));
        assert!(!table.is_initialized("x"));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut table = SymbolTable::new("variables", 1);
        table.intern("a").expect("room");
        let err = table.intern("b").expect_err("table full");
        assert_eq!(
            err.to_string(),
            "Table of variables is full: capacity 1 exceeded by 'b'"
        );
        // Existing names still resolve once the table is full.
        assert_eq!(table.intern("a"), Ok(0));
    }

    #[test]
    fn functions_resolve_by_name_index() {
        let mut functions = FunctionTable::new(1);
        let id = functions.declare("main", 3, 10).expect("room");
        assert_eq!(functions.find(3), Some(id));
        assert_eq!(functions.find(0), None);
        assert_eq!(
            functions.iter().map(|f| (f.name.as_str(), f.name_index)).collect::<Vec<_>>(),
            vec![("main", 3)]
        );
        assert!(matches!(
            functions.declare("other", 4, 10),
            Err(CapacityError::Functions { capacity: 1, .. })
        ));
    }
}
