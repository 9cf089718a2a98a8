use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bramble_btree::{AllLeaves, Node, ParentNode};
use bramble_store::Message;
use bramble_types::LocalReference;
use tracing::debug;

use crate::decode;
use crate::error::{ValueError, ValueResult};
use crate::options::DecodingOptions;
use crate::value::Value;
use crate::valueset::ValueSet;
use crate::wire::ValueMsg;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepsetOrder {
    #[default]
    Default,
    Preorder,
    Postorder,
    Topological,
}

impl DepsetOrder {
    pub fn code(self) -> u32 {
        match self {
            Self::Default => 0,
            Self::Preorder => 1,
            Self::Postorder => 2,
            Self::Topological => 3,
        }
    }

    pub fn from_code(code: u32) -> ValueResult<Self> {
        match code {
            0 => Ok(Self::Default),
            1 => Ok(Self::Preorder),
            2 => Ok(Self::Postorder),
            3 => Ok(Self::Topological),
            other => Err(ValueError::UnknownDepsetOrder(other)),
        }
    }
}

impl fmt::Display for DepsetOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Preorder => "preorder",
            Self::Postorder => "postorder",
            Self::Topological => "topological",
        })
    }
}

impl FromStr for DepsetOrder {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "preorder" => Ok(Self::Preorder),
            "postorder" => Ok(Self::Postorder),
            "topological" => Ok(Self::Topological),
            other => Err(ValueError::Corrupt(format!("unknown depset order {other:?}"))),
        }
    }
}

/// Part of a stored depset subtree that has not been read yet.
#[derive(Clone)]
pub(crate) struct EncodedParent {
    pub reference: LocalReference,
    pub count: u64,
    /// Copied from the depset root the subtree was found in.
    pub needs_code: bool,
    pub options: DecodingOptions,
}

#[derive(Clone)]
pub(crate) enum DepsetChild {
    Value(Value),
    Encoded(EncodedParent),
    /// The children of a transitive depset, shared rather than copied.
    Children(Arc<[DepsetChild]>),
}

impl DepsetChild {
    fn len_hint(&self) -> u64 {
        match self {
            Self::Value(_) => 1,
            Self::Encoded(parent) => parent.count,
            Self::Children(children) => children
                .iter()
                .fold(0u64, |total, child| total.saturating_add(child.len_hint())),
        }
    }
}

enum Children {
    Empty,
    Single(DepsetChild),
    List(Arc<[DepsetChild]>),
}

struct DepsetInner {
    children: Children,
    order: DepsetOrder,
    hash: u64,
}

/// An immutable, lazily flattened set of values.
///
/// Children are stored in visiting order: for topological depsets that is
/// back to front, and [`to_list`](Self::to_list) reverses the result.
/// Depsets compare by identity.
#[derive(Clone)]
pub struct Depset(Arc<DepsetInner>);

impl Depset {
    pub fn empty(order: DepsetOrder) -> Self {
        Self::from_children(Children::Empty, order)
    }

    /// Build a depset from direct elements and transitive depsets.
    ///
    /// When `order` is [`DepsetOrder::Default`] the first non-default order
    /// among `transitive` is adopted. Two different non-default orders are
    /// an error.
    pub fn new(direct: Vec<Value>, transitive: Vec<Depset>, order: DepsetOrder) -> ValueResult<Self> {
        let order = effective_order(order, &transitive)?;
        let mut builder = ChildrenBuilder::default();
        match order {
            DepsetOrder::Preorder => {
                builder.add_direct(direct)?;
                builder.add_transitive(&transitive)?;
            }
            DepsetOrder::Default | DepsetOrder::Postorder => {
                builder.add_transitive(&transitive)?;
                builder.add_direct(direct)?;
            }
            DepsetOrder::Topological => {
                builder.add_direct(direct.into_iter().rev())?;
                builder.add_transitive(transitive.iter().rev())?;
            }
        }
        debug!(%order, children = builder.children.len(), "constructed depset");
        Ok(Self::from_children(builder.finish(), order))
    }

    pub(crate) fn from_encoded(children: Vec<DepsetChild>, order: DepsetOrder) -> Self {
        Self::from_children(children_from_vec(children), order)
    }

    fn from_children(children: Children, order: DepsetOrder) -> Self {
        Self(Arc::new(DepsetInner {
            children,
            order,
            hash: rand::random(),
        }))
    }

    pub fn order(&self) -> DepsetOrder {
        self.0.order
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.0.children, Children::Empty)
    }

    /// Upper bound on the number of elements, counting duplicates and
    /// saturating at `u64::MAX`. Never reads from storage.
    pub fn len_hint(&self) -> u64 {
        self.children()
            .iter()
            .fold(0u64, |total, child| total.saturating_add(child.len_hint()))
    }

    pub(crate) fn children(&self) -> &[DepsetChild] {
        match &self.0.children {
            Children::Empty => &[],
            Children::Single(child) => std::slice::from_ref(child),
            Children::List(children) => children,
        }
    }

    /// Flatten into a deduplicated list, reading stored subtrees as needed.
    pub fn to_list(&self) -> ValueResult<Vec<Value>> {
        let mut flattener = Flattener::default();
        for child in self.children() {
            flattener.visit(child)?;
        }
        let mut list = flattener.values;
        if self.0.order == DepsetOrder::Topological {
            list.reverse();
        }
        Ok(list)
    }

    pub(crate) fn hash_seed(&self) -> u64 {
        self.0.hash
    }

    pub fn ptr_eq(&self, other: &Depset) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Depset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Depset")
            .field("order", &self.0.order)
            .field("len_hint", &self.len_hint())
            .finish()
    }
}

fn effective_order(order: DepsetOrder, transitive: &[Depset]) -> ValueResult<DepsetOrder> {
    let mut effective = order;
    for depset in transitive {
        match depset.order() {
            DepsetOrder::Default => {}
            other if effective == DepsetOrder::Default => effective = other,
            other if other != effective => {
                return Err(ValueError::IncompatibleDepsetOrders(effective, other));
            }
            _ => {}
        }
    }
    Ok(effective)
}

fn children_from_vec(mut children: Vec<DepsetChild>) -> Children {
    match children.len() {
        0 => Children::Empty,
        1 => match children.pop() {
            Some(child) => Children::Single(child),
            None => Children::Empty,
        },
        _ => Children::List(children.into()),
    }
}

fn children_id(children: &Arc<[DepsetChild]>) -> usize {
    Arc::as_ptr(children) as *const () as usize
}

/// Collects the children of a new depset, dropping those that are already
/// known to be present.
#[derive(Default)]
struct ChildrenBuilder {
    children: Vec<DepsetChild>,
    values: ValueSet,
    lists_seen: HashSet<LocalReference>,
    depsets_seen: HashSet<usize>,
}

impl ChildrenBuilder {
    fn add_direct(&mut self, direct: impl IntoIterator<Item = Value>) -> ValueResult<()> {
        for value in direct {
            if !self.values.test_and_add(&value)? {
                self.children.push(DepsetChild::Value(value));
            }
        }
        Ok(())
    }

    fn add_transitive<'d>(&mut self, transitive: impl IntoIterator<Item = &'d Depset>) -> ValueResult<()> {
        for depset in transitive {
            match &depset.0.children {
                Children::Empty => {}
                Children::Single(child) => self.add_child(child)?,
                Children::List(children) => {
                    if self.depsets_seen.insert(children_id(children)) {
                        self.children
                            .push(DepsetChild::Children(Arc::clone(children)));
                    }
                }
            }
        }
        Ok(())
    }

    fn add_child(&mut self, child: &DepsetChild) -> ValueResult<()> {
        let is_new = match child {
            DepsetChild::Value(value) => !self.values.test_and_add(value)?,
            DepsetChild::Encoded(parent) => self.lists_seen.insert(parent.reference),
            DepsetChild::Children(children) => self.depsets_seen.insert(children_id(children)),
        };
        if is_new {
            self.children.push(child.clone());
        }
        Ok(())
    }

    fn finish(self) -> Children {
        children_from_vec(self.children)
    }
}

/// Walks children depth first, keeping the first occurrence of each value.
#[derive(Default)]
struct Flattener {
    seen: ValueSet,
    lists_seen: HashSet<LocalReference>,
    depsets_seen: HashSet<usize>,
    values: Vec<Value>,
}

impl Flattener {
    fn visit(&mut self, child: &DepsetChild) -> ValueResult<()> {
        match child {
            DepsetChild::Value(value) => self.add(value.clone()),
            DepsetChild::Encoded(parent) => {
                if self.lists_seen.insert(parent.reference) {
                    self.visit_encoded(parent)?;
                }
                Ok(())
            }
            DepsetChild::Children(children) => {
                if self.depsets_seen.insert(children_id(children)) {
                    for child in children.iter() {
                        self.visit(child)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn add(&mut self, value: Value) -> ValueResult<()> {
        if !self.seen.test_and_add(&value)? {
            self.values.push(value);
        }
        Ok(())
    }

    fn visit_encoded(&mut self, parent: &EncodedParent) -> ValueResult<()> {
        let reader = &parent.options.reader;
        let root = reader.read_message::<Vec<Node<ValueMsg>>>(&parent.reference)?;
        let Self {
            seen,
            lists_seen,
            values,
            ..
        } = self;
        let leaves = AllLeaves::new(reader, root, |node: &Message<ParentNode>| {
            let reference = node.outgoing_reference(node.message.reference)?;
            Ok(lists_seen.insert(reference).then_some(reference))
        });
        for leaf in leaves {
            let value = decode::decode_value(&leaf?, None, &parent.options)?;
            if !seen.test_and_add(&value)? {
                values.push(value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::int).collect()
    }

    fn as_ints(values: &[Value]) -> Vec<i64> {
        values
            .iter()
            .map(|value| match value {
                Value::Int(i) => i64::try_from(i).unwrap(),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    fn depset(direct: &[i64], transitive: Vec<Depset>, order: DepsetOrder) -> Depset {
        Depset::new(ints(direct), transitive, order).unwrap()
    }

    #[test]
    fn preorder_puts_direct_first() {
        let child = depset(&[3, 4], vec![], DepsetOrder::Preorder);
        let parent = depset(&[1, 2], vec![child], DepsetOrder::Preorder);
        assert_eq!(as_ints(&parent.to_list().unwrap()), vec![1, 2, 3, 4]);
    }

    #[test]
    fn postorder_puts_direct_last() {
        for order in [DepsetOrder::Postorder, DepsetOrder::Default] {
            let child = depset(&[3, 4], vec![], order);
            let parent = depset(&[1, 2], vec![child], order);
            assert_eq!(as_ints(&parent.to_list().unwrap()), vec![3, 4, 1, 2]);
        }
    }

    #[test]
    fn topological_keeps_last_contributor() {
        let a = depset(&[1, 9], vec![], DepsetOrder::Topological);
        let b = depset(&[9, 2], vec![], DepsetOrder::Topological);
        let top = depset(&[], vec![a, b], DepsetOrder::Topological);
        let list = as_ints(&top.to_list().unwrap());
        assert_eq!(list.iter().filter(|&&v| v == 9).count(), 1);
        assert_eq!(list, vec![1, 9, 2]);
    }

    #[test]
    fn topological_places_direct_after_transitive() {
        let a = depset(&[1], vec![], DepsetOrder::Topological);
        let top = depset(&[2, 3], vec![a], DepsetOrder::Topological);
        assert_eq!(as_ints(&top.to_list().unwrap()), vec![1, 2, 3]);
    }

    #[test]
    fn incompatible_orders_are_rejected() {
        let pre = depset(&[1], vec![], DepsetOrder::Preorder);
        let post = depset(&[2], vec![], DepsetOrder::Postorder);
        let err = Depset::new(vec![], vec![pre, post], DepsetOrder::Default).unwrap_err();
        assert!(matches!(err, ValueError::IncompatibleDepsetOrders(_, _)));
        assert!(err.to_string().contains("incompatible orders"));
    }

    #[test]
    fn default_adopts_transitive_order() {
        let pre = depset(&[1], vec![], DepsetOrder::Preorder);
        let plain = depset(&[2], vec![], DepsetOrder::Default);
        let combined = depset(&[0], vec![plain, pre], DepsetOrder::Default);
        assert_eq!(combined.order(), DepsetOrder::Preorder);
        assert_eq!(as_ints(&combined.to_list().unwrap()), vec![0, 2, 1]);
    }

    #[test]
    fn duplicates_are_removed() {
        let a = depset(&[1, 2, 2], vec![], DepsetOrder::Default);
        let b = depset(&[2, 3], vec![a.clone()], DepsetOrder::Default);
        let c = depset(&[3, 4], vec![a, b], DepsetOrder::Default);
        assert_eq!(as_ints(&c.to_list().unwrap()), vec![1, 2, 3, 4]);
    }

    #[test]
    fn shared_children_are_visited_once() {
        let shared = depset(&[1, 2, 3], vec![], DepsetOrder::Default);
        let a = depset(&[], vec![shared.clone()], DepsetOrder::Default);
        let top = depset(&[], vec![shared, a], DepsetOrder::Default);
        assert_eq!(top.children().len(), 1);
        assert_eq!(as_ints(&top.to_list().unwrap()), vec![1, 2, 3]);
    }

    #[test]
    fn to_list_is_repeatable() {
        let d = depset(&[5, 6], vec![depset(&[7], vec![], DepsetOrder::Default)], DepsetOrder::Default);
        assert_eq!(as_ints(&d.to_list().unwrap()), as_ints(&d.to_list().unwrap()));
    }

    #[test]
    fn len_hint_and_emptiness() {
        let empty = Depset::empty(DepsetOrder::Default);
        assert!(empty.is_empty());
        assert_eq!(empty.len_hint(), 0);
        let only_empty = depset(&[], vec![empty], DepsetOrder::Default);
        assert!(only_empty.is_empty());
        let d = depset(&[1, 2], vec![depset(&[3, 4], vec![], DepsetOrder::Default)], DepsetOrder::Default);
        assert_eq!(d.len_hint(), 4);
    }

    #[test]
    fn depsets_compare_by_identity() {
        let a = depset(&[1], vec![], DepsetOrder::Default);
        let b = depset(&[1], vec![], DepsetOrder::Default);
        assert!(Value::Depset(a.clone()).equals(&Value::Depset(a.clone())).unwrap());
        assert!(!Value::Depset(a).equals(&Value::Depset(b)).unwrap());
    }

    #[test]
    fn unhashable_elements_are_rejected() {
        assert!(Depset::new(vec![Value::list(vec![])], vec![], DepsetOrder::Default).is_err());
    }

    #[test]
    fn order_codes_round_trip() {
        for order in [
            DepsetOrder::Default,
            DepsetOrder::Preorder,
            DepsetOrder::Postorder,
            DepsetOrder::Topological,
        ] {
            assert_eq!(DepsetOrder::from_code(order.code()).unwrap(), order);
            assert_eq!(order.to_string().parse::<DepsetOrder>().unwrap(), order);
        }
        assert!(matches!(DepsetOrder::from_code(7), Err(ValueError::UnknownDepsetOrder(7))));
    }
}
