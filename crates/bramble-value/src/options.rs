use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bramble_btree::ObjectSizeLimits;
use bramble_store::{ObjectCapturer, ObjectEncoding, ObjectReader};

use crate::error::{ValueError, ValueResult};
use crate::global::GlobalResolver;
use crate::value::{Label, Value};

pub type LabelCreator = Arc<dyn Fn(&str) -> ValueResult<Label> + Send + Sync>;
pub type BuiltinResolver = Arc<dyn Fn(&str) -> ValueResult<Value> + Send + Sync>;

/// Everything needed to turn values into objects.
pub struct EncodingOptions<M> {
    pub limits: ObjectSizeLimits,
    pub encoding: ObjectEncoding,
    pub capturer: Arc<dyn ObjectCapturer<Metadata = M>>,
}

impl<M> EncodingOptions<M> {
    pub fn new(
        limits: ObjectSizeLimits,
        encoding: ObjectEncoding,
        capturer: Arc<dyn ObjectCapturer<Metadata = M>>,
    ) -> Self {
        Self {
            limits,
            encoding,
            capturer,
        }
    }
}

impl<M> Clone for EncodingOptions<M> {
    fn clone(&self) -> Self {
        Self {
            limits: self.limits,
            encoding: self.encoding.clone(),
            capturer: Arc::clone(&self.capturer),
        }
    }
}

impl<M> fmt::Debug for EncodingOptions<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodingOptions")
            .field("limits", &self.limits)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

/// Everything needed to turn objects back into values.
///
/// Lazily decoded lists, dicts, structs and depsets keep a clone of the
/// options they were decoded with, so cloning must stay cheap.
#[derive(Clone)]
pub struct DecodingOptions {
    pub reader: ObjectReader,
    pub label_creator: LabelCreator,
    pub global_resolver: Option<Arc<dyn GlobalResolver>>,
    pub builtins: BuiltinResolver,
}

impl DecodingOptions {
    /// Options that parse labels with [`Label::parse`], leave globals
    /// unresolved and keep builtins as plain names.
    pub fn new(reader: ObjectReader) -> Self {
        Self {
            reader,
            label_creator: Arc::new(Label::parse),
            global_resolver: None,
            builtins: Arc::new(|name: &str| Ok::<_, ValueError>(Value::Builtin(Arc::from(name)))),
        }
    }

    pub fn with_label_creator(mut self, label_creator: LabelCreator) -> Self {
        self.label_creator = label_creator;
        self
    }

    pub fn with_global_resolver(mut self, resolver: Arc<dyn GlobalResolver>) -> Self {
        self.global_resolver = Some(resolver);
        self
    }

    pub fn with_builtins(mut self, builtins: BuiltinResolver) -> Self {
        self.builtins = builtins;
        self
    }

    /// Accept only the named builtins; any other name fails to decode with
    /// [`ValueError::UnknownBuiltin`].
    pub fn with_known_builtins<S: Into<Arc<str>>>(self, names: impl IntoIterator<Item = S>) -> Self {
        let known: HashSet<Arc<str>> = names.into_iter().map(Into::into).collect();
        self.with_builtins(Arc::new(move |name: &str| match known.get(name) {
            Some(name) => Ok(Value::Builtin(Arc::clone(name))),
            None => Err(ValueError::UnknownBuiltin(name.to_string())),
        }))
    }
}

impl fmt::Debug for DecodingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodingOptions")
            .field("reader", &self.reader)
            .field("global_resolver", &self.global_resolver.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bramble_store::{InMemoryObjectStore, Message};

    use super::*;
    use crate::decode::decode_value;
    use crate::wire::ValueMsg;

    fn options() -> DecodingOptions {
        let store = Arc::new(InMemoryObjectStore::new());
        DecodingOptions::new(ObjectReader::new(store, ObjectEncoding::default()))
    }

    fn decode_builtin(options: &DecodingOptions, name: &str) -> ValueResult<Value> {
        decode_value(&Message::detached(ValueMsg::Builtin(name.into())), None, options)
    }

    #[test]
    fn builtins_default_to_plain_names() {
        let value = decode_builtin(&options(), "anything").unwrap();
        assert!(matches!(value, Value::Builtin(name) if &*name == "anything"));
    }

    #[test]
    fn known_builtins_reject_other_names() {
        let options = options().with_known_builtins(["len", "select"]);
        let value = decode_builtin(&options, "select").unwrap();
        assert!(matches!(value, Value::Builtin(name) if &*name == "select"));

        let err = decode_builtin(&options, "eval").unwrap_err();
        assert!(matches!(err, ValueError::UnknownBuiltin(ref name) if name == "eval"));
        assert_eq!(err.to_string(), "unknown builtin: eval");
    }
}
