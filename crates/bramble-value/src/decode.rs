use std::sync::Arc;

use bramble_btree::{resolve_parent, AllLeaves, Node};
use bramble_store::Message;
use bramble_types::{DecodableReference, LocalReference};
use tracing::debug;

use crate::depset::{Depset, DepsetChild, DepsetOrder, EncodedParent};
use crate::error::{ValueError, ValueResult};
use crate::global::{Attr, AttrKind, BuildSetting, BuildSettingKind, Definition, Global, GlobalKind};
use crate::options::DecodingOptions;
use crate::value::{Dict, DictEntries, EncodedTree, Function, List, Struct, Value};
use crate::wire::{
    AttrMsg, DefinitionMsg, DictEntryMsg, FunctionMsg, GlobalMsg, StructMsg, TreeMsg, ValueMsg,
};

/// Decode a value message whose reference indices resolve against
/// `message.references`.
///
/// Lists, dicts and struct fields are decoded lazily. A global definition
/// can only be decoded when `current_identifier` names the global it
/// belongs to.
pub fn decode_value(
    message: &Message<ValueMsg>,
    current_identifier: Option<&str>,
    options: &DecodingOptions,
) -> ValueResult<Value> {
    Decoder {
        options,
        current_identifier,
    }
    .decode(&message.message, &message.references)
}

/// Read a value from the root object it was stored in.
pub fn decode_top_level_value(
    reference: &DecodableReference,
    current_identifier: Option<&str>,
    options: &DecodingOptions,
) -> ValueResult<Value> {
    let message = options.reader.read_decodable::<ValueMsg>(reference)?;
    debug!(reference = %reference, "decoding top-level value");
    decode_value(&message, current_identifier, options)
}

pub(crate) fn decode_list(tree: &EncodedTree<ValueMsg>) -> ValueResult<Vec<Value>> {
    let decoder = Decoder {
        options: &tree.options,
        current_identifier: tree.current_identifier.as_deref(),
    };
    AllLeaves::new(&tree.options.reader, tree.root.clone(), resolve_parent)
        .enumerate()
        .map(|(index, leaf)| {
            let leaf = leaf?;
            decoder
                .decode(&leaf.message, &leaf.references)
                .map_err(|e| e.at_index(index))
        })
        .collect()
}

pub(crate) fn decode_dict(tree: &EncodedTree<DictEntryMsg>) -> ValueResult<DictEntries> {
    let decoder = Decoder {
        options: &tree.options,
        current_identifier: tree.current_identifier.as_deref(),
    };
    let mut entries = DictEntries::default();
    for leaf in AllLeaves::new(&tree.options.reader, tree.root.clone(), resolve_parent) {
        let leaf = leaf?;
        let key = decoder.decode(&leaf.message.key, &leaf.references)?;
        let value = decoder
            .decode(&leaf.message.value, &leaf.references)
            .map_err(|e| e.at_key(key.describe()))?;
        entries.insert(key, value)?;
    }
    Ok(entries)
}

struct Decoder<'a> {
    options: &'a DecodingOptions,
    current_identifier: Option<&'a str>,
}

impl Decoder<'_> {
    fn decode(&self, msg: &ValueMsg, references: &Arc<[LocalReference]>) -> ValueResult<Value> {
        Ok(match msg {
            ValueMsg::None => Value::None,
            ValueMsg::Bool(b) => Value::Bool(*b),
            ValueMsg::Int(i) => Value::Int(i.to_bigint()),
            ValueMsg::Str(s) => Value::Str(Arc::from(s.as_str())),
            ValueMsg::Bytes(b) => Value::Bytes(Arc::from(b.as_slice())),
            ValueMsg::List(tree) => Value::List(List::encoded(self.tree(tree, references))),
            ValueMsg::Dict(tree) => Value::Dict(Dict::encoded(self.tree(tree, references))),
            ValueMsg::Tuple(elements) => {
                let decoded = elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| {
                        self.decode(element, references)
                            .map_err(|e| e.at_index(index))
                    })
                    .collect::<ValueResult<Vec<_>>>()?;
                Value::Tuple(decoded.into())
            }
            ValueMsg::Struct(s) => Value::Struct(self.decode_struct(s, references)?),
            ValueMsg::Depset(d) => {
                let order = DepsetOrder::from_code(d.order)?;
                let children = d
                    .elements
                    .iter()
                    .map(|node| self.decode_depset_child(node, d.needs_code, references))
                    .collect::<ValueResult<Vec<_>>>()?;
                Value::Depset(Depset::from_encoded(children, order))
            }
            ValueMsg::Label(label) => Value::Label((self.options.label_creator)(label)?),
            ValueMsg::Function(FunctionMsg::Named(name)) => {
                Value::Function(Function::Named(Arc::from(name.as_str())))
            }
            ValueMsg::Function(FunctionMsg::Closure { name, code }) => {
                Value::Function(Function::Closure {
                    name: Arc::from(name.as_str()),
                    code: Arc::from(code.as_slice()),
                })
            }
            ValueMsg::Builtin(name) => (self.options.builtins)(name)?,
            ValueMsg::Global(GlobalMsg::Reference { kind, identifier }) => Value::Global(
                Global::reference(
                    GlobalKind::from_code(*kind)?,
                    identifier.as_str(),
                    self.options.global_resolver.clone(),
                ),
            ),
            ValueMsg::Global(GlobalMsg::Definition { kind, definition }) => {
                let kind = GlobalKind::from_code(*kind)?;
                let identifier = self.current_identifier.ok_or_else(|| {
                    ValueError::Corrupt(format!(
                        "{} definition found outside of its own identifier",
                        kind.name()
                    ))
                })?;
                let nested = Decoder {
                    options: self.options,
                    current_identifier: None,
                };
                let definition = nested.decode_definition(definition, references)?;
                Value::Global(Global::declare(kind, identifier, definition))
            }
            ValueMsg::Attr(attr) => Value::Attr(self.decode_attr(attr, references)?),
        })
    }

    fn tree<N: Clone>(&self, tree: &TreeMsg<N>, references: &Arc<[LocalReference]>) -> EncodedTree<N> {
        EncodedTree {
            root: Message::new(tree.nodes.clone(), Arc::clone(references)),
            needs_code: tree.needs_code,
            options: self.options.clone(),
            current_identifier: self.current_identifier.map(Arc::from),
        }
    }

    fn decode_struct(&self, msg: &StructMsg, references: &Arc<[LocalReference]>) -> ValueResult<Struct> {
        if msg.keys.len() != msg.values.len() {
            return Err(ValueError::KeyValueCountMismatch {
                keys: msg.keys.len(),
                values: msg.values.len(),
            });
        }
        if msg.keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ValueError::Corrupt("struct keys are not sorted and unique".into()));
        }
        let provider = msg.provider.as_deref().map(|identifier| {
            Global::reference(
                GlobalKind::Provider,
                identifier,
                self.options.global_resolver.clone(),
            )
        });
        let values = msg
            .values
            .iter()
            .map(|value| Message::new(value.clone(), Arc::clone(references)))
            .collect();
        Ok(Struct::encoded(
            provider,
            msg.keys.clone(),
            values,
            self.options.clone(),
            self.current_identifier.map(Arc::from),
        ))
    }

    fn decode_depset_child(
        &self,
        node: &Node<ValueMsg>,
        needs_code: bool,
        references: &Arc<[LocalReference]>,
    ) -> ValueResult<DepsetChild> {
        match node {
            Node::Leaf(leaf) => Ok(DepsetChild::Value(self.decode(leaf, references)?)),
            Node::Parent(parent) => {
                let reference = references.get(parent.reference as usize).copied().ok_or_else(|| {
                    ValueError::Corrupt(format!(
                        "depset refers to outgoing reference {} of {}",
                        parent.reference,
                        references.len()
                    ))
                })?;
                Ok(DepsetChild::Encoded(EncodedParent {
                    reference,
                    count: parent.count,
                    needs_code,
                    options: self.options.clone(),
                }))
            }
        }
    }

    fn decode_attr(&self, msg: &AttrMsg, references: &Arc<[LocalReference]>) -> ValueResult<Attr> {
        let default = match &msg.default {
            Some(default) => Some(Box::new(self.decode(default, references)?)),
            None => None,
        };
        Ok(Attr {
            kind: AttrKind::from_code(msg.kind)?,
            mandatory: msg.mandatory,
            default,
        })
    }

    fn decode_definition(
        &self,
        msg: &DefinitionMsg,
        references: &Arc<[LocalReference]>,
    ) -> ValueResult<Definition> {
        let attrs = msg
            .attrs
            .iter()
            .map(|named| {
                let attr = self
                    .decode_attr(&named.attr, references)
                    .map_err(|e| e.in_field(named.name.as_str()))?;
                Ok((named.name.clone(), attr))
            })
            .collect::<ValueResult<Vec<_>>>()?;
        let build_setting = match msg.build_setting {
            Some(setting) => Some(BuildSetting {
                kind: BuildSettingKind::from_code(setting.kind)?,
                flag: setting.flag,
            }),
            None => None,
        };
        let implementation = match &msg.implementation {
            Some(implementation) => Some(
                self.decode(implementation, references)
                    .map_err(|e| e.in_field("implementation"))?,
            ),
            None => None,
        };
        Ok(Definition {
            doc: msg.doc.clone(),
            fields: msg.fields.clone(),
            attrs,
            build_setting,
            implementation,
        })
    }
}

#[cfg(test)]
mod tests {
    use bramble_btree::ParentNode;
    use bramble_store::{InMemoryObjectStore, ObjectEncoding, ObjectReader};

    use super::*;
    use crate::value::Label;
    use crate::wire::{DepsetMsg, IntMsg, NamedAttrMsg};

    fn options() -> DecodingOptions {
        let store = Arc::new(InMemoryObjectStore::new());
        DecodingOptions::new(ObjectReader::new(store, ObjectEncoding::default()))
    }

    fn decode(msg: ValueMsg) -> ValueResult<Value> {
        decode_value(&Message::detached(msg), None, &options())
    }

    #[test]
    fn scalars() {
        assert!(matches!(decode(ValueMsg::None).unwrap(), Value::None));
        assert!(decode(ValueMsg::Int(IntMsg::Small(3)))
            .unwrap()
            .equals(&Value::int(3))
            .unwrap());
        assert!(decode(ValueMsg::Str("s".into()))
            .unwrap()
            .equals(&Value::str("s"))
            .unwrap());
    }

    #[test]
    fn struct_key_value_mismatch() {
        let err = decode(ValueMsg::Struct(StructMsg {
            provider: None,
            keys: vec!["a".into(), "b".into()],
            values: vec![ValueMsg::None],
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ValueError::KeyValueCountMismatch { keys: 2, values: 1 }
        ));
        assert!(err.to_string().starts_with("number of keys does not match number of values"));
    }

    #[test]
    fn struct_keys_must_be_sorted() {
        let err = decode(ValueMsg::Struct(StructMsg {
            provider: None,
            keys: vec!["b".into(), "a".into()],
            values: vec![ValueMsg::None, ValueMsg::None],
        }))
        .unwrap_err();
        assert!(matches!(err, ValueError::Corrupt(_)));
    }

    #[test]
    fn struct_fields_decode_lazily() {
        let value = decode(ValueMsg::Struct(StructMsg {
            provider: Some("//p:defs.bzl%Info".into()),
            keys: vec!["bad".into(), "good".into()],
            values: vec![
                ValueMsg::Label("not a label".into()),
                ValueMsg::Bool(true),
            ],
        }))
        .unwrap();
        let Value::Struct(s) = value else {
            panic!("expected a struct");
        };
        assert_eq!(s.provider().unwrap().identifier(), "//p:defs.bzl%Info");
        assert!(matches!(s.get("good").unwrap(), Value::Bool(true)));
        let err = s.get("bad").unwrap_err();
        assert!(err.to_string().starts_with("field bad: "));
        assert!(matches!(err.root_cause(), ValueError::InvalidLabel(_)));
    }

    #[test]
    fn unknown_depset_order() {
        let err = decode(ValueMsg::Depset(DepsetMsg {
            order: 9,
            elements: vec![],
            needs_code: false,
        }))
        .unwrap_err();
        assert!(matches!(err, ValueError::UnknownDepsetOrder(9)));
    }

    #[test]
    fn depset_parent_out_of_range() {
        let err = decode(ValueMsg::Depset(DepsetMsg {
            order: 0,
            elements: vec![Node::Parent(ParentNode {
                reference: 0,
                count: 3,
            })],
            needs_code: false,
        }))
        .unwrap_err();
        assert!(matches!(err, ValueError::Corrupt(_)));
    }

    #[test]
    fn tuple_errors_carry_index() {
        let err = decode(ValueMsg::Tuple(vec![
            ValueMsg::None,
            ValueMsg::Attr(AttrMsg {
                kind: 42,
                mandatory: false,
                default: None,
            }),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "index 1: unknown attr kind 42");
    }

    #[test]
    fn custom_label_creator() {
        let options = options().with_label_creator(Arc::new(|s: &str| {
            Label::parse(&format!("@main{s}"))
        }));
        let value = decode_value(
            &Message::detached(ValueMsg::Label("//pkg:x".into())),
            None,
            &options,
        )
        .unwrap();
        assert!(matches!(value, Value::Label(label) if label.as_str() == "@main//pkg:x"));
    }

    #[test]
    fn definitions_need_an_identifier() {
        let msg = ValueMsg::Global(GlobalMsg::Definition {
            kind: GlobalKind::Rule.code(),
            definition: Box::new(DefinitionMsg {
                doc: Some("a rule".into()),
                fields: vec![],
                attrs: vec![NamedAttrMsg {
                    name: "srcs".into(),
                    attr: AttrMsg {
                        kind: AttrKind::LabelList.code(),
                        mandatory: true,
                        default: None,
                    },
                }],
                build_setting: None,
                implementation: None,
            }),
        });
        assert!(matches!(decode(msg.clone()), Err(ValueError::Corrupt(_))));

        let value = decode_value(&Message::detached(msg), Some("//r:defs.bzl%my_rule"), &options())
            .unwrap();
        let Value::Global(global) = value else {
            panic!("expected a global");
        };
        assert_eq!(global.identifier(), "//r:defs.bzl%my_rule");
        let definition = global.resolved().unwrap();
        assert_eq!(definition.attrs[0].0, "srcs");
        assert!(definition.attrs[0].1.mandatory);
    }

    #[test]
    fn global_references_stay_unresolved() {
        let value = decode(ValueMsg::Global(GlobalMsg::Reference {
            kind: GlobalKind::Aspect.code(),
            identifier: "//a:b.bzl%asp".into(),
        }))
        .unwrap();
        let Value::Global(global) = value else {
            panic!("expected a global");
        };
        assert_eq!(global.kind(), GlobalKind::Aspect);
        assert!(global.resolved().is_none());
    }
}
