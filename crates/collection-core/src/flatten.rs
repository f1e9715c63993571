//! Depth-first flattening of the declarative tree into a [`Snapshot`].

use std::rc::Rc;

use crate::collections::IndexMap;
use crate::model::{Section, Snapshot, Supplementary};
use crate::node::{BodyElement, Node, SectionDecl, SectionNode};
use crate::state::{ReactiveSource, SourceId};

/// Result of one flatten pass.
pub struct Flattened {
    pub snapshot: Snapshot,
    /// Every reactive source reached while flattening, in first-seen order.
    pub sources: Vec<Rc<dyn ReactiveSource>>,
}

impl Flattened {
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|source| source.source_id()).collect()
    }
}

/// Flattens the collection body into an ordered list of sections.
pub fn flatten(content: &[SectionNode]) -> Flattened {
    let mut flattener = Flattener::default();
    let mut decls = Vec::new();
    for node in content {
        flattener.visit(node, &mut decls);
    }
    let sections = decls
        .iter()
        .map(|decl| flattener.section(decl))
        .collect::<Vec<_>>();
    Flattened {
        snapshot: Snapshot::new(sections),
        sources: flattener.sources.into_values().collect(),
    }
}

#[derive(Default)]
struct Flattener {
    sources: IndexMap<SourceId, Rc<dyn ReactiveSource>>,
}

impl Flattener {
    fn visit<L: Clone>(&mut self, node: &Node<L>, out: &mut Vec<L>) {
        match node {
            Node::Literal(literal) => out.push(literal.clone()),
            Node::Group(children) => {
                for child in children {
                    self.visit(child, out);
                }
            }
            Node::Reactive(reactive) => {
                let source = reactive.source();
                self.sources
                    .entry(source.source_id())
                    .or_insert_with(|| Rc::clone(source));
                let resolved = reactive.evaluate();
                self.visit(&resolved, out);
            }
        }
    }

    fn section(&mut self, decl: &SectionDecl) -> Section {
        let mut elements = Vec::new();
        for node in decl.body() {
            self.visit(node, &mut elements);
        }
        assemble_section(decl, elements)
    }
}

/// Header is the first resolved element if supplementary, footer the last
/// one. A lone supplementary is both. Everything else that is an item, in
/// order, becomes the section's items.
fn assemble_section(decl: &SectionDecl, elements: Vec<BodyElement>) -> Section {
    let last = elements.len().saturating_sub(1);
    let mut header: Option<Supplementary> = None;
    let mut footer: Option<Supplementary> = None;
    let mut section = Section::new(decl.identity());

    for (index, element) in elements.into_iter().enumerate() {
        match element {
            BodyElement::Item(item) => section.push_item(item),
            BodyElement::Supplementary(supplementary) if index == 0 => {
                if index == last {
                    footer = Some(supplementary.clone());
                }
                header = Some(supplementary);
            }
            BodyElement::Supplementary(supplementary) if index == last => {
                footer = Some(supplementary);
            }
            BodyElement::Supplementary(supplementary) => {
                log::warn!(
                    "section {}: dropping supplementary {} at body position {}",
                    decl.identity(),
                    supplementary.identity(),
                    index
                );
            }
        }
    }

    if let Some(header) = header {
        section = section.with_header(header);
    }
    if let Some(footer) = footer {
        section = section.with_footer(footer);
    }
    section
}
