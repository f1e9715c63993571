//! Declarative description of collection content.
//!
//! Content is a tree of [`Node`]s. A node is either a literal, a reactive
//! node that maps a source's current value through a builder, or a group of
//! nodes. The same shape is used at two levels: the collection body is a
//! tree of [`SectionDecl`]s, and each section body is a tree of
//! [`BodyElement`]s. [`crate::flatten`] turns the tree into a [`Snapshot`].
//!
//! [`Snapshot`]: crate::Snapshot

use std::fmt;
use std::rc::Rc;

use crate::identity::{Identifiable, Identity};
use crate::model::{Item, Supplementary};
use crate::state::{MutableState, ReactiveSource};

pub enum Node<L> {
    Literal(L),
    Reactive(ReactiveNode<L>),
    Group(Vec<Node<L>>),
}

/// Reactive value mapped through a builder. Evaluated on every flatten.
pub struct ReactiveNode<L> {
    source: Rc<dyn ReactiveSource>,
    build: Rc<dyn Fn() -> Node<L>>,
}

impl<L> ReactiveNode<L> {
    pub fn source(&self) -> &Rc<dyn ReactiveSource> {
        &self.source
    }

    pub fn evaluate(&self) -> Node<L> {
        (self.build)()
    }
}

impl<L> Clone for ReactiveNode<L> {
    fn clone(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
            build: Rc::clone(&self.build),
        }
    }
}

impl<L: Clone> Clone for Node<L> {
    fn clone(&self) -> Self {
        match self {
            Node::Literal(literal) => Node::Literal(literal.clone()),
            Node::Reactive(reactive) => Node::Reactive(reactive.clone()),
            Node::Group(children) => Node::Group(children.clone()),
        }
    }
}

impl<L: fmt::Debug> fmt::Debug for Node<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(literal) => f.debug_tuple("Literal").field(literal).finish(),
            Node::Reactive(reactive) => f
                .debug_tuple("Reactive")
                .field(&reactive.source.source_id())
                .finish(),
            Node::Group(children) => f.debug_tuple("Group").field(children).finish(),
        }
    }
}

impl<L: 'static> Node<L> {
    pub fn literal(literal: L) -> Self {
        Node::Literal(literal)
    }

    pub fn group(children: impl IntoIterator<Item = Node<L>>) -> Self {
        Node::Group(children.into_iter().collect())
    }

    pub fn empty() -> Self {
        Node::Group(Vec::new())
    }

    /// Conditional branch: `content` when `condition` holds, nothing otherwise.
    pub fn when(condition: bool, content: impl FnOnce() -> Node<L>) -> Self {
        if condition {
            content()
        } else {
            Node::empty()
        }
    }

    /// Maps the current value of `state` through `builder`.
    ///
    /// The builder works on a clone of the value, so it may freely read or
    /// write other states.
    pub fn reactive<T>(state: &MutableState<T>, builder: impl Fn(&T) -> Node<L> + 'static) -> Self
    where
        T: Clone + PartialEq + 'static,
    {
        let source = state.clone();
        Node::Reactive(ReactiveNode {
            source: Rc::new(state.clone()),
            build: Rc::new(move || builder(&source.value())),
        })
    }

    /// Dynamic repeated group: one subtree per element of `state`.
    pub fn each<T>(
        state: &MutableState<Vec<T>>,
        builder: impl Fn(usize, &T) -> Node<L> + 'static,
    ) -> Self
    where
        T: Clone + PartialEq + 'static,
    {
        Node::reactive(state, move |elements| {
            Node::group(
                elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| builder(index, element)),
            )
        })
    }
}

impl<L> From<Option<Node<L>>> for Node<L> {
    fn from(node: Option<Node<L>>) -> Self {
        node.unwrap_or(Node::Group(Vec::new()))
    }
}

/// Element of a section body once resolved.
#[derive(Clone, Debug)]
pub enum BodyElement {
    Supplementary(Supplementary),
    Item(Item),
}

pub type BodyNode = Node<BodyElement>;

impl Node<BodyElement> {
    pub fn item<T: Identifiable>(payload: T) -> Self {
        Node::Literal(BodyElement::Item(Item::new(payload)))
    }

    pub fn supplementary<T: Identifiable>(payload: T) -> Self {
        Node::Literal(BodyElement::Supplementary(Supplementary::new(payload)))
    }
}

impl From<Item> for BodyNode {
    fn from(item: Item) -> Self {
        Node::Literal(BodyElement::Item(item))
    }
}

impl From<Supplementary> for BodyNode {
    fn from(supplementary: Supplementary) -> Self {
        Node::Literal(BodyElement::Supplementary(supplementary))
    }
}

/// Declared section: an identity plus an unflattened body.
#[derive(Clone, Debug)]
pub struct SectionDecl {
    identity: Identity,
    body: Vec<BodyNode>,
}

pub type SectionNode = Node<SectionDecl>;

impl SectionDecl {
    pub fn new(identity: Identity, body: impl IntoIterator<Item = BodyNode>) -> Self {
        Self {
            identity,
            body: body.into_iter().collect(),
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn body(&self) -> &[BodyNode] {
        &self.body
    }
}

impl Node<SectionDecl> {
    pub fn section(identity: Identity, body: impl IntoIterator<Item = BodyNode>) -> Self {
        Node::Literal(SectionDecl::new(identity, body))
    }
}
