//! Flat snapshot model: sections, items, supplementaries and index paths.

use std::fmt;
use std::rc::Rc;

use crate::identity::{ErasedContent, Identifiable, Identity};

/// Position of an item inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexPath {
    pub section: usize,
    pub item: usize,
}

impl IndexPath {
    #[inline]
    pub const fn new(section: usize, item: usize) -> Self {
        Self { section, item }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.item)
    }
}

/// Optional capability for items that can be picked up and dragged.
pub trait DragSource {
    fn can_drag(&self, _at: IndexPath) -> bool {
        true
    }

    /// Serialized payload handed to the drop target.
    fn drag_payload(&self, at: IndexPath) -> Option<String>;
}

/// Optional capability for items that observe display and selection.
pub trait LifecycleObserver {
    fn will_display(&self, _at: IndexPath) {}

    fn did_end_display(&self, _at: IndexPath) {}

    fn did_select(&self, _at: IndexPath) {}

    fn should_highlight(&self, _at: IndexPath) -> bool {
        true
    }
}

/// A single row of a section.
///
/// The payload is shared, so cloning an item (and therefore a whole snapshot)
/// only bumps reference counts.
#[derive(Clone)]
pub struct Item {
    content: Rc<dyn ErasedContent>,
    drag: Option<Rc<dyn DragSource>>,
    lifecycle: Option<Rc<dyn LifecycleObserver>>,
}

impl Item {
    pub fn new<T: Identifiable>(payload: T) -> Self {
        Self {
            content: Rc::new(payload),
            drag: None,
            lifecycle: None,
        }
    }

    pub fn with_drag(mut self, drag: impl DragSource + 'static) -> Self {
        self.drag = Some(Rc::new(drag));
        self
    }

    pub fn with_lifecycle(mut self, observer: impl LifecycleObserver + 'static) -> Self {
        self.lifecycle = Some(Rc::new(observer));
        self
    }

    #[inline]
    pub fn identity(&self) -> Identity {
        self.content.identity()
    }

    pub fn content_eq(&self, other: &Item) -> bool {
        self.content.content_eq_erased(other.content.as_ref())
    }

    /// Borrows the payload if it has type `T`.
    pub fn payload<T: Identifiable>(&self) -> Option<&T> {
        self.content.as_any().downcast_ref::<T>()
    }

    pub fn drag(&self) -> Option<&dyn DragSource> {
        self.drag.as_deref()
    }

    pub fn lifecycle(&self) -> Option<&dyn LifecycleObserver> {
        self.lifecycle.as_deref()
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("identity", &self.identity())
            .field("payload", &self.content.type_name())
            .field("drag", &self.drag.is_some())
            .field("lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}

/// Header or footer view descriptor of a section.
#[derive(Clone)]
pub struct Supplementary {
    content: Rc<dyn ErasedContent>,
}

impl Supplementary {
    pub fn new<T: Identifiable>(payload: T) -> Self {
        Self {
            content: Rc::new(payload),
        }
    }

    #[inline]
    pub fn identity(&self) -> Identity {
        self.content.identity()
    }

    pub fn content_eq(&self, other: &Supplementary) -> bool {
        self.content.content_eq_erased(other.content.as_ref())
    }

    pub fn payload<T: Identifiable>(&self) -> Option<&T> {
        self.content.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for Supplementary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supplementary")
            .field("identity", &self.identity())
            .field("payload", &self.content.type_name())
            .finish()
    }
}

fn supplementary_eq(lhs: Option<&Supplementary>, rhs: Option<&Supplementary>) -> bool {
    match (lhs, rhs) {
        (None, None) => true,
        (Some(lhs), Some(rhs)) => lhs.identity() == rhs.identity() && lhs.content_eq(rhs),
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub struct Section {
    identity: Identity,
    header: Option<Supplementary>,
    items: Vec<Item>,
    footer: Option<Supplementary>,
}

impl Section {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            header: None,
            items: Vec::new(),
            footer: None,
        }
    }

    pub fn with_header(mut self, header: Supplementary) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_footer(mut self, footer: Supplementary) -> Self {
        self.footer = Some(footer);
        self
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = Item>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn push_item(&mut self, item: Item) {
        self.items.push(item);
    }

    #[inline]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn header(&self) -> Option<&Supplementary> {
        self.header.as_ref()
    }

    pub fn footer(&self) -> Option<&Supplementary> {
        self.footer.as_ref()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_identities(&self) -> impl Iterator<Item = Identity> + '_ {
        self.items.iter().map(Item::identity)
    }

    /// Header and footer match by identity and content.
    pub fn supplementaries_eq(&self, other: &Section) -> bool {
        supplementary_eq(self.header(), other.header())
            && supplementary_eq(self.footer(), other.footer())
    }

    pub fn same_item_sequence(&self, other: &Section) -> bool {
        self.item_identities().eq(other.item_identities())
    }

    /// Same identity, supplementaries, item identities and item content.
    pub fn content_eq(&self, other: &Section) -> bool {
        self.identity == other.identity
            && self.supplementaries_eq(other)
            && self.same_item_sequence(other)
            && self
                .items
                .iter()
                .zip(other.items.iter())
                .all(|(lhs, rhs)| lhs.content_eq(rhs))
    }

    pub fn items_mut(&mut self) -> &mut Vec<Item> {
        &mut self.items
    }
}

/// One complete, flattened rendering of a collection.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    sections: Vec<Section>,
}

impl Snapshot {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn item(&self, path: IndexPath) -> Option<&Item> {
        self.sections.get(path.section)?.item(path.item)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn item_count(&self, section: usize) -> Option<usize> {
        self.sections.get(section).map(Section::len)
    }

    pub fn total_items(&self) -> usize {
        self.sections.iter().map(Section::len).sum()
    }

    pub fn section_identities(&self) -> impl Iterator<Item = Identity> + '_ {
        self.sections.iter().map(Section::identity)
    }

    /// Finds the index path of the first item with `identity`.
    pub fn locate(&self, identity: Identity) -> Option<IndexPath> {
        self.sections
            .iter()
            .enumerate()
            .find_map(|(section, entry)| {
                entry
                    .item_identities()
                    .position(|candidate| candidate == identity)
                    .map(|item| IndexPath::new(section, item))
            })
    }

    /// Observable equality: same ordered identities and content everywhere.
    pub fn content_eq(&self, other: &Snapshot) -> bool {
        self.sections.len() == other.sections.len()
            && self
                .sections
                .iter()
                .zip(other.sections.iter())
                .all(|(lhs, rhs)| lhs.content_eq(rhs))
    }

    pub fn into_sections(self) -> Vec<Section> {
        self.sections
    }
}

impl FromIterator<Section> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Section>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
