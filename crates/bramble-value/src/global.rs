use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{ValueError, ValueResult};
use crate::value::Value;

/// The kinds of named, self-referential entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalKind {
    Provider,
    Rule,
    Aspect,
    Subrule,
    Transition,
}

impl GlobalKind {
    pub fn code(self) -> u32 {
        match self {
            Self::Provider => 0,
            Self::Rule => 1,
            Self::Aspect => 2,
            Self::Subrule => 3,
            Self::Transition => 4,
        }
    }

    pub fn from_code(code: u32) -> ValueResult<Self> {
        match code {
            0 => Ok(Self::Provider),
            1 => Ok(Self::Rule),
            2 => Ok(Self::Aspect),
            3 => Ok(Self::Subrule),
            4 => Ok(Self::Transition),
            other => Err(ValueError::UnknownValueKind(other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Rule => "rule",
            Self::Aspect => "aspect",
            Self::Subrule => "subrule",
            Self::Transition => "transition",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttrKind {
    Bool,
    Int,
    IntList,
    Label,
    LabelKeyedStringDict,
    LabelList,
    Output,
    OutputList,
    String,
    StringDict,
    StringList,
    StringListDict,
}

impl AttrKind {
    const ALL: [AttrKind; 12] = [
        Self::Bool,
        Self::Int,
        Self::IntList,
        Self::Label,
        Self::LabelKeyedStringDict,
        Self::LabelList,
        Self::Output,
        Self::OutputList,
        Self::String,
        Self::StringDict,
        Self::StringList,
        Self::StringListDict,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> ValueResult<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(ValueError::UnknownAttrKind(code))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildSettingKind {
    Bool,
    Int,
    String,
    StringList,
    Label,
    LabelList,
}

impl BuildSettingKind {
    const ALL: [BuildSettingKind; 6] = [
        Self::Bool,
        Self::Int,
        Self::String,
        Self::StringList,
        Self::Label,
        Self::LabelList,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> ValueResult<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(ValueError::UnknownBuildSettingKind(code))
    }
}

/// An attribute declaration, as returned by the `attr.*` constructors.
#[derive(Clone, Debug)]
pub struct Attr {
    pub kind: AttrKind,
    pub mandatory: bool,
    pub default: Option<Box<Value>>,
}

impl Attr {
    pub fn new(kind: AttrKind) -> Self {
        Self {
            kind,
            mandatory: false,
            default: None,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(Box::new(default));
        self
    }

    pub(crate) fn equals(&self, other: &Attr) -> ValueResult<bool> {
        if self.kind != other.kind || self.mandatory != other.mandatory {
            return Ok(false);
        }
        match (&self.default, &other.default) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => a.equals(b),
            _ => Ok(false),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildSetting {
    pub kind: BuildSettingKind,
    pub flag: bool,
}

/// The full definition behind a [`Global`].
#[derive(Clone, Debug, Default)]
pub struct Definition {
    pub doc: Option<String>,
    /// Declared fields of a provider.
    pub fields: Vec<String>,
    /// Attributes of a rule, aspect or subrule, in declaration order.
    pub attrs: Vec<(String, Attr)>,
    pub build_setting: Option<BuildSetting>,
    pub implementation: Option<Value>,
}

/// Looks up the full definition of a global by its canonical identifier.
pub trait GlobalResolver: Send + Sync {
    fn resolve_global(&self, kind: GlobalKind, identifier: &str) -> ValueResult<Arc<Definition>>;
}

impl<F> GlobalResolver for F
where
    F: Fn(GlobalKind, &str) -> ValueResult<Arc<Definition>> + Send + Sync,
{
    fn resolve_global(&self, kind: GlobalKind, identifier: &str) -> ValueResult<Arc<Definition>> {
        self(kind, identifier)
    }
}

struct GlobalInner {
    kind: GlobalKind,
    identifier: Arc<str>,
    definition: OnceLock<Arc<Definition>>,
    resolver: Option<Arc<dyn GlobalResolver>>,
}

/// A provider, rule, aspect, subrule or transition.
///
/// A global is either declared with its definition, or is a placeholder
/// holding only its identifier. Placeholders resolve their definition on
/// first use; concurrent resolutions converge on a single stored result.
#[derive(Clone)]
pub struct Global(Arc<GlobalInner>);

impl Global {
    pub fn declare(kind: GlobalKind, identifier: impl Into<Arc<str>>, definition: Definition) -> Self {
        Self(Arc::new(GlobalInner {
            kind,
            identifier: identifier.into(),
            definition: OnceLock::from(Arc::new(definition)),
            resolver: None,
        }))
    }

    pub fn reference(
        kind: GlobalKind,
        identifier: impl Into<Arc<str>>,
        resolver: Option<Arc<dyn GlobalResolver>>,
    ) -> Self {
        Self(Arc::new(GlobalInner {
            kind,
            identifier: identifier.into(),
            definition: OnceLock::new(),
            resolver,
        }))
    }

    pub fn kind(&self) -> GlobalKind {
        self.0.kind
    }

    pub fn identifier(&self) -> &str {
        &self.0.identifier
    }

    /// The definition, if it is already known.
    pub fn resolved(&self) -> Option<&Arc<Definition>> {
        self.0.definition.get()
    }

    /// The definition, resolving it on first call.
    pub fn definition(&self) -> ValueResult<Arc<Definition>> {
        if let Some(definition) = self.0.definition.get() {
            return Ok(Arc::clone(definition));
        }
        let resolver = self
            .0
            .resolver
            .as_ref()
            .ok_or_else(|| ValueError::UnresolvedGlobal(self.0.identifier.to_string()))?;
        let resolved = resolver.resolve_global(self.0.kind, &self.0.identifier)?;
        Ok(Arc::clone(self.0.definition.get_or_init(|| resolved)))
    }

    pub fn ptr_eq(&self, other: &Global) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Global {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind == other.0.kind && self.0.identifier == other.0.identifier
    }
}

impl Eq for Global {}

impl fmt::Debug for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Global")
            .field("kind", &self.0.kind)
            .field("identifier", &self.0.identifier)
            .field("resolved", &self.0.definition.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        for kind in [
            GlobalKind::Provider,
            GlobalKind::Rule,
            GlobalKind::Aspect,
            GlobalKind::Subrule,
            GlobalKind::Transition,
        ] {
            assert_eq!(GlobalKind::from_code(kind.code()).unwrap(), kind);
        }
        for kind in AttrKind::ALL {
            assert_eq!(AttrKind::from_code(kind.code()).unwrap(), kind);
        }
        for kind in BuildSettingKind::ALL {
            assert_eq!(BuildSettingKind::from_code(kind.code()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert!(matches!(GlobalKind::from_code(99), Err(ValueError::UnknownValueKind(99))));
        assert!(matches!(AttrKind::from_code(12), Err(ValueError::UnknownAttrKind(12))));
        assert!(matches!(
            BuildSettingKind::from_code(6),
            Err(ValueError::UnknownBuildSettingKind(6))
        ));
    }

    #[test]
    fn declared_global_is_resolved() {
        let global = Global::declare(GlobalKind::Provider, "//a:b.bzl%Info", Definition::default());
        assert!(global.resolved().is_some());
        assert!(global.definition().is_ok());
    }

    #[test]
    fn placeholder_without_resolver_fails() {
        let global = Global::reference(GlobalKind::Rule, "//a:b.bzl%my_rule", None);
        assert!(matches!(global.definition(), Err(ValueError::UnresolvedGlobal(_))));
    }

    #[test]
    fn placeholder_resolves_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resolver = move |kind: GlobalKind, identifier: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert_eq!(kind, GlobalKind::Provider);
            Ok::<_, ValueError>(Arc::new(Definition {
                doc: Some(identifier.to_string()),
                ..Definition::default()
            }))
        };
        let resolver: Arc<dyn GlobalResolver> = Arc::new(resolver);
        let global = Global::reference(GlobalKind::Provider, "//x:y.bzl%Z", Some(resolver));
        assert!(global.resolved().is_none());
        let first = global.definition().unwrap();
        let second = global.definition().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.doc.as_deref(), Some("//x:y.bzl%Z"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn globals_compare_by_identifier() {
        let a = Global::reference(GlobalKind::Rule, "//p:r.bzl%r", None);
        let b = Global::declare(GlobalKind::Rule, "//p:r.bzl%r", Definition::default());
        let c = Global::reference(GlobalKind::Aspect, "//p:r.bzl%r", None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.ptr_eq(&b));
    }
}
