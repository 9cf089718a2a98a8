use std::collections::HashSet;

use bramble_btree::{Builder, Node, ParentNode};
use bramble_store::{
    Message, ObjectCapturer, PatchedMessage, ReferenceMessagePatcher, StoreError, VisitReferences,
};
use bramble_types::{DecodableReference, LocalReference};
use tracing::debug;

use crate::depset::{Depset, DepsetChild};
use crate::error::{ValueError, ValueResult};
use crate::global::{Attr, Definition, Global};
use crate::options::EncodingOptions;
use crate::path::VisitedPath;
use crate::value::{Dict, DictSnapshot, Function, List, ListSnapshot, Struct, Value};
use crate::wire::{
    AttrMsg, BuildSettingMsg, DefinitionMsg, DepsetMsg, DictEntryMsg, FunctionMsg, GlobalMsg,
    IntMsg, NamedAttrMsg, StructMsg, TreeMsg, ValueMsg,
};

/// An encoded value and whether decoding it requires compiled code
/// (closures) to be available.
pub type EncodedValue<M> = (PatchedMessage<ValueMsg, M>, bool);

/// Encode a value into a message. Large lists, dicts and depsets are split
/// into objects handed to the capturer; the returned message refers to
/// them.
///
/// `current_identifier` names the global being stored, if any. That global
/// is encoded with its full definition, every other one by identifier.
pub fn encode_value<M: Send + Sync>(
    value: &Value,
    current_identifier: Option<&str>,
    options: &EncodingOptions<M>,
) -> ValueResult<EncodedValue<M>> {
    ValueEncoder::new(options, current_identifier).encode(value)
}

/// Encode a value into a root object of its own.
///
/// Returns the reference to the root, the capturer's metadata for it, and
/// whether decoding requires compiled code.
pub fn encode_top_level_value<M: Send + Sync>(
    value: &Value,
    current_identifier: Option<&str>,
    options: &EncodingOptions<M>,
) -> ValueResult<(DecodableReference, M, bool)> {
    let (message, needs_code) = encode_value(value, current_identifier, options)?;
    let (created, decoding_parameters) = options.encoding.create_object(message)?;
    let reference = created.contents.reference();
    let metadata = options.capturer.capture_created_object(created)?;
    debug!(
        reference = %reference.short_hex(),
        needs_code,
        "encoded top-level value"
    );
    Ok((
        DecodableReference::new(reference, decoding_parameters),
        metadata,
        needs_code,
    ))
}

/// Walks a value depth first, turning it into wire messages.
pub struct ValueEncoder<'a, M> {
    options: &'a EncodingOptions<M>,
    current_identifier: Option<&'a str>,
    path: VisitedPath,
}

impl<M> AsMut<VisitedPath> for ValueEncoder<'_, M> {
    fn as_mut(&mut self) -> &mut VisitedPath {
        &mut self.path
    }
}

impl<'a, M: Send + Sync> ValueEncoder<'a, M> {
    pub fn new(options: &'a EncodingOptions<M>, current_identifier: Option<&'a str>) -> Self {
        Self {
            options,
            current_identifier,
            path: VisitedPath::new(),
        }
    }

    pub fn encode(&mut self, value: &Value) -> ValueResult<EncodedValue<M>> {
        match value {
            Value::None => scalar(ValueMsg::None),
            Value::Bool(b) => scalar(ValueMsg::Bool(*b)),
            Value::Int(i) => scalar(ValueMsg::Int(IntMsg::from_bigint(i))),
            Value::Str(s) => scalar(ValueMsg::Str(s.to_string())),
            Value::Bytes(b) => scalar(ValueMsg::Bytes(b.to_vec())),
            Value::Label(label) => scalar(ValueMsg::Label(label.as_str().to_string())),
            Value::Builtin(name) => scalar(ValueMsg::Builtin(name.to_string())),
            Value::Function(Function::Named(name)) => {
                scalar(ValueMsg::Function(FunctionMsg::Named(name.to_string())))
            }
            Value::Function(Function::Closure { name, code }) => Ok((
                PatchedMessage::new(ValueMsg::Function(FunctionMsg::Closure {
                    name: name.to_string(),
                    code: code.to_vec(),
                })),
                true,
            )),
            Value::Tuple(elements) => self.encode_tuple(elements),
            Value::List(list) => {
                VisitedPath::scoped(self, list.id(), |encoder| encoder.encode_list(list))
            }
            Value::Dict(dict) => {
                VisitedPath::scoped(self, dict.id(), |encoder| encoder.encode_dict(dict))
            }
            Value::Struct(s) => self.encode_struct(s),
            Value::Depset(depset) => self.encode_depset(depset),
            Value::Global(global) => self.encode_global(global),
            Value::Attr(attr) => {
                let (attr, needs_code) = self.encode_attr(attr)?;
                Ok((attr.map(ValueMsg::Attr), needs_code))
            }
            Value::Opaque(opaque) => match opaque.lower() {
                Some(lowered) => self.encode(&lowered),
                None => Err(ValueError::CannotEncode(opaque.type_name().to_string())),
            },
        }
    }

    fn encode_tuple(&mut self, elements: &[Value]) -> ValueResult<EncodedValue<M>> {
        let mut patcher = ReferenceMessagePatcher::new();
        let mut needs_code = false;
        let mut encoded = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let (message, element_code) = self.encode(element).map_err(|e| e.at_index(index))?;
            needs_code |= element_code;
            encoded.push(patcher.absorb(message));
        }
        Ok((
            PatchedMessage {
                message: ValueMsg::Tuple(encoded),
                patcher,
            },
            needs_code,
        ))
    }

    fn encode_list(&mut self, list: &List) -> ValueResult<EncodedValue<M>> {
        let elements = match list.snapshot() {
            ListSnapshot::Encoded(tree) => {
                let needs_code = tree.needs_code;
                let reattached = reattach(&tree.root, &*self.options.capturer)?;
                let message = reattached.map(|nodes| ValueMsg::List(TreeMsg { nodes, needs_code }));
                return Ok((message, needs_code));
            }
            ListSnapshot::Materialized(elements) => elements,
        };
        let options = self.options;
        let mut builder = Builder::new(options.limits, &options.encoding, &*options.capturer);
        let mut needs_code = false;
        for (index, element) in elements.iter().enumerate() {
            let (message, element_code) = self.encode(element).map_err(|e| e.at_index(index))?;
            needs_code |= element_code;
            builder.push_child(message.map(Node::Leaf))?;
        }
        let message = builder
            .finalize_list()?
            .map(|nodes| ValueMsg::List(TreeMsg { nodes, needs_code }));
        Ok((message, needs_code))
    }

    fn encode_dict(&mut self, dict: &Dict) -> ValueResult<EncodedValue<M>> {
        let entries = match dict.snapshot() {
            DictSnapshot::Encoded(tree) => {
                let needs_code = tree.needs_code;
                let reattached = reattach(&tree.root, &*self.options.capturer)?;
                let message = reattached.map(|nodes| ValueMsg::Dict(TreeMsg { nodes, needs_code }));
                return Ok((message, needs_code));
            }
            DictSnapshot::Materialized(entries) => entries,
        };
        let mut needs_code = false;
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            let (key_message, key_code) = self.encode(key).map_err(|e| e.at_key(key.describe()))?;
            let (value_message, value_code) =
                self.encode(value).map_err(|e| e.at_key(key.describe()))?;
            needs_code |= key_code || value_code;
            let sort_key = bincode::serialize(&key_message.message)
                .map_err(|e| ValueError::Serialization(e.to_string()))?;
            encoded.push((sort_key, key_message, value_message));
        }
        encoded.sort_by(|a, b| a.0.cmp(&b.0));

        let options = self.options;
        let mut builder = Builder::new(options.limits, &options.encoding, &*options.capturer);
        for (_, key_message, value_message) in encoded {
            let PatchedMessage {
                message: key,
                mut patcher,
            } = key_message;
            let value = patcher.absorb(value_message);
            builder.push_child(PatchedMessage {
                message: Node::Leaf(DictEntryMsg { key, value }),
                patcher,
            })?;
        }
        let message = builder
            .finalize_list()?
            .map(|nodes| ValueMsg::Dict(TreeMsg { nodes, needs_code }));
        Ok((message, needs_code))
    }

    fn encode_struct(&mut self, s: &Struct) -> ValueResult<EncodedValue<M>> {
        let mut patcher = ReferenceMessagePatcher::new();
        let mut needs_code = false;
        let mut values = Vec::with_capacity(s.len());
        for (key, field) in s.fields() {
            let message = match (field.decoded(), field.encoded()) {
                (Some(value), _) => {
                    let (message, field_code) = self.encode(value).map_err(|e| e.in_field(key))?;
                    needs_code |= field_code;
                    message
                }
                (None, Some(encoded)) => {
                    needs_code |= encoded.message.needs_code();
                    reattach(encoded, &*self.options.capturer).map_err(|e| e.in_field(key))?
                }
                (None, None) => return Err(ValueError::StructFieldNotFound(key.to_string())),
            };
            values.push(patcher.absorb(message));
        }
        let message = ValueMsg::Struct(StructMsg {
            provider: s.provider().map(|provider| provider.identifier().to_string()),
            keys: s.keys().to_vec(),
            values,
        });
        Ok((PatchedMessage { message, patcher }, needs_code))
    }

    fn encode_depset(&mut self, depset: &Depset) -> ValueResult<EncodedValue<M>> {
        let options = self.options;
        let mut builder = Builder::new(options.limits, &options.encoding, &*options.capturer);
        let mut seen = DepsetSeen::default();
        let needs_code = self.push_depset_children(&mut builder, depset.children(), &mut seen)?;
        let order = depset.order().code();
        let message = builder
            .finalize_list()?
            .map(|elements| {
                ValueMsg::Depset(DepsetMsg {
                    order,
                    elements,
                    needs_code,
                })
            });
        Ok((message, needs_code))
    }

    fn push_depset_children(
        &mut self,
        builder: &mut Builder<'a, ValueMsg, M>,
        children: &[DepsetChild],
        seen: &mut DepsetSeen,
    ) -> ValueResult<bool> {
        let options = self.options;
        let capturer = &*options.capturer;
        let mut needs_code = false;
        for child in children {
            match child {
                DepsetChild::Value(value) => {
                    let (message, value_code) = self.encode(value)?;
                    needs_code |= value_code;
                    builder.push_child(message.map(Node::Leaf))?;
                }
                DepsetChild::Encoded(parent) => {
                    if seen.lists.insert(parent.reference) {
                        needs_code |= parent.needs_code;
                        let count = parent.count;
                        builder.push_child(PatchedMessage::with_reference(
                            parent.reference,
                            capturer.capture_existing_object(parent.reference),
                            |reference| Node::Parent(ParentNode { reference, count }),
                        ))?;
                    }
                }
                DepsetChild::Children(nested) => {
                    let id = std::sync::Arc::as_ptr(nested) as *const () as usize;
                    if seen.depsets.insert(id) {
                        needs_code |= self.push_depset_children(builder, nested, seen)?;
                    }
                }
            }
        }
        Ok(needs_code)
    }

    fn encode_global(&mut self, global: &Global) -> ValueResult<EncodedValue<M>> {
        let kind = global.kind().code();
        if self.current_identifier != Some(global.identifier()) {
            let message = ValueMsg::Global(GlobalMsg::Reference {
                kind,
                identifier: global.identifier().to_string(),
            });
            return Ok((PatchedMessage::new(message), false));
        }
        let definition = global.definition()?;
        let saved = self.current_identifier.take();
        let result = self.encode_definition(&definition);
        self.current_identifier = saved;
        let (definition, needs_code) = result?;
        Ok((
            definition.map(|definition| {
                ValueMsg::Global(GlobalMsg::Definition {
                    kind,
                    definition: Box::new(definition),
                })
            }),
            needs_code,
        ))
    }

    fn encode_definition(
        &mut self,
        definition: &Definition,
    ) -> ValueResult<(PatchedMessage<DefinitionMsg, M>, bool)> {
        let mut patcher = ReferenceMessagePatcher::new();
        let mut needs_code = false;
        let mut attrs = Vec::with_capacity(definition.attrs.len());
        for (name, attr) in &definition.attrs {
            let (message, attr_code) = self.encode_attr(attr).map_err(|e| e.in_field(name.as_str()))?;
            needs_code |= attr_code;
            attrs.push(NamedAttrMsg {
                name: name.clone(),
                attr: patcher.absorb(message),
            });
        }
        let implementation = match &definition.implementation {
            Some(implementation) => {
                let (message, implementation_code) = self
                    .encode(implementation)
                    .map_err(|e| e.in_field("implementation"))?;
                needs_code |= implementation_code;
                Some(Box::new(patcher.absorb(message)))
            }
            None => None,
        };
        let message = DefinitionMsg {
            doc: definition.doc.clone(),
            fields: definition.fields.clone(),
            attrs,
            build_setting: definition.build_setting.map(|setting| BuildSettingMsg {
                kind: setting.kind.code(),
                flag: setting.flag,
            }),
            implementation,
        };
        Ok((PatchedMessage { message, patcher }, needs_code))
    }

    fn encode_attr(&mut self, attr: &Attr) -> ValueResult<(PatchedMessage<AttrMsg, M>, bool)> {
        let kind = attr.kind.code();
        let mandatory = attr.mandatory;
        let Some(default) = &attr.default else {
            return Ok((
                PatchedMessage::new(AttrMsg {
                    kind,
                    mandatory,
                    default: None,
                }),
                false,
            ));
        };
        let (message, needs_code) = self.encode(default).map_err(|e| e.in_field("default"))?;
        Ok((
            message.map(|default| AttrMsg {
                kind,
                mandatory,
                default: Some(Box::new(default)),
            }),
            needs_code,
        ))
    }
}

fn scalar<M>(message: ValueMsg) -> ValueResult<EncodedValue<M>> {
    Ok((PatchedMessage::new(message), false))
}

#[derive(Default)]
struct DepsetSeen {
    lists: HashSet<LocalReference>,
    depsets: HashSet<usize>,
}

/// Re-home a message decoded from an existing object into a new patcher,
/// so it can be embedded without decoding it.
fn reattach<T, M: Send + Sync>(
    message: &Message<T>,
    capturer: &dyn ObjectCapturer<Metadata = M>,
) -> ValueResult<PatchedMessage<T, M>>
where
    T: Clone + VisitReferences,
{
    let mut patcher = ReferenceMessagePatcher::new();
    let mut copy = message.message.clone();
    let mut failure: Option<StoreError> = None;
    copy.visit_references(&mut |index| match message.outgoing_reference(*index) {
        Ok(reference) => {
            *index = patcher.add_reference(reference, capturer.capture_existing_object(reference));
        }
        Err(e) => {
            failure.get_or_insert(e);
        }
    });
    if let Some(e) = failure {
        return Err(e.into());
    }
    Ok(PatchedMessage {
        message: copy,
        patcher,
    })
}
