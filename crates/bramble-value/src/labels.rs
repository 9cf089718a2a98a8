use std::collections::HashSet;

use crate::error::ValueResult;
use crate::global::Definition;
use crate::value::{Label, Value};

impl Value {
    /// Call `visitor` for every label embedded in this value, decoding lazily
    /// encoded containers along the way. Containers reachable more than once
    /// are walked once.
    pub fn visit_labels(&self, visitor: &mut dyn FnMut(&Label) -> ValueResult<()>) -> ValueResult<()> {
        LabelWalker {
            visitor,
            visited: HashSet::new(),
        }
        .walk(self)
    }
}

struct LabelWalker<'v> {
    visitor: &'v mut dyn FnMut(&Label) -> ValueResult<()>,
    visited: HashSet<usize>,
}

impl LabelWalker<'_> {
    fn walk(&mut self, value: &Value) -> ValueResult<()> {
        match value {
            Value::Label(label) => (self.visitor)(label),
            Value::List(list) => {
                if self.visited.insert(list.id()) {
                    for element in list.elements()? {
                        self.walk(&element)?;
                    }
                }
                Ok(())
            }
            Value::Dict(dict) => {
                if self.visited.insert(dict.id()) {
                    for (key, value) in dict.entries()? {
                        self.walk(&key)?;
                        self.walk(&value)?;
                    }
                }
                Ok(())
            }
            Value::Tuple(elements) => {
                for element in elements.iter() {
                    self.walk(element)?;
                }
                Ok(())
            }
            Value::Struct(s) => {
                for index in 0..s.len() {
                    let field = s.field_at(index).map_err(|e| e.in_field(s.keys()[index].as_str()))?;
                    self.walk(&field)?;
                }
                Ok(())
            }
            Value::Depset(depset) => {
                for element in depset.to_list()? {
                    self.walk(&element)?;
                }
                Ok(())
            }
            Value::Attr(attr) => match &attr.default {
                Some(default) => self.walk(default),
                None => Ok(()),
            },
            Value::Global(global) => match global.resolved() {
                Some(definition) => self.walk_definition(definition),
                None => Ok(()),
            },
            Value::Opaque(opaque) => match opaque.lower() {
                Some(lowered) => self.walk(&lowered),
                None => Ok(()),
            },
            Value::None
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Str(_)
            | Value::Bytes(_)
            | Value::Function(_)
            | Value::Builtin(_) => Ok(()),
        }
    }

    fn walk_definition(&mut self, definition: &Definition) -> ValueResult<()> {
        for (_, attr) in &definition.attrs {
            if let Some(default) = &attr.default {
                self.walk(default)?;
            }
        }
        Ok(())
    }
}
