//! Document outline (bookmarks) reading, writing and editing.

use crate::engine::{self, resolve};
use crate::error::EngineError;
use crate::host::{HostedTool, Readiness};
use crate::session::Session;
use crate::text;
use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Deepest outline nesting that is followed or written.
const MAX_DEPTH: usize = 32;

/// One outline entry.
///
/// `page` is 1-indexed; `None` when the destination could not be resolved to
/// a page of this document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub title: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Bookmark>,
}

impl Bookmark {
    pub fn new(title: impl Into<String>, page: u32) -> Self {
        Bookmark {
            title: title.into(),
            page: Some(page),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Bookmark>) -> Self {
        self.children = children;
        self
    }
}

/// Read the document outline.
pub fn read_outline(doc: &Document) -> Result<Vec<Bookmark>, EngineError> {
    let catalog = doc.catalog()?;
    let Some(outlines) = catalog
        .get(b"Outlines")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
    else {
        return Ok(Vec::new());
    };

    let pages: HashMap<ObjectId, u32> = doc
        .get_pages()
        .into_iter()
        .map(|(number, id)| (id, number))
        .collect();
    let mut visited = HashSet::new();
    let first = outlines.get(b"First").ok().and_then(|f| f.as_reference().ok());
    Ok(read_siblings(doc, first, 0, &pages, &mut visited))
}

fn read_siblings(
    doc: &Document,
    mut next: Option<ObjectId>,
    depth: usize,
    pages: &HashMap<ObjectId, u32>,
    visited: &mut HashSet<ObjectId>,
) -> Vec<Bookmark> {
    let mut items = Vec::new();
    if depth >= MAX_DEPTH {
        return items;
    }
    while let Some(id) = next {
        // Malformed outlines can loop back on themselves.
        if !visited.insert(id) {
            break;
        }
        let Ok(item) = doc.get_dictionary(id) else {
            break;
        };
        let title = item
            .get(b"Title")
            .ok()
            .and_then(|t| resolve(doc, t).as_str().ok())
            .map(text::decode_text_string)
            .unwrap_or_default();
        let page = destination_page(doc, item, pages);
        let first_child = item.get(b"First").ok().and_then(|f| f.as_reference().ok());
        let children = read_siblings(doc, first_child, depth + 1, pages, visited);
        items.push(Bookmark {
            title,
            page,
            children,
        });
        next = item.get(b"Next").ok().and_then(|n| n.as_reference().ok());
    }
    items
}

/// Page number targeted by an outline item's `/Dest` or GoTo `/A`.
fn destination_page(doc: &Document, item: &Dictionary, pages: &HashMap<ObjectId, u32>) -> Option<u32> {
    let dest = match item.get(b"Dest") {
        Ok(dest) => resolve(doc, dest),
        Err(_) => {
            let action = resolve(doc, item.get(b"A").ok()?).as_dict().ok()?;
            if action.get(b"S").ok()?.as_name().ok()? != b"GoTo" {
                return None;
            }
            resolve(doc, action.get(b"D").ok()?)
        }
    };
    page_of_destination(doc, dest, pages, 0)
}

fn page_of_destination(
    doc: &Document,
    dest: &Object,
    pages: &HashMap<ObjectId, u32>,
    hops: usize,
) -> Option<u32> {
    if hops > 4 {
        return None;
    }
    match dest {
        Object::Array(parts) => {
            let target = parts.first()?;
            match target {
                Object::Reference(id) => pages.get(id).copied(),
                // Remote-style destinations use a 0-based page index.
                Object::Integer(index) => u32::try_from(*index)
                    .ok()
                    .and_then(|i| i.checked_add(1))
                    .filter(|&page| page as usize <= pages.len()),
                _ => None,
            }
        }
        // `/D` wrapper used by named destination values
        Object::Dictionary(dict) => {
            page_of_destination(doc, resolve(doc, dict.get(b"D").ok()?), pages, hops + 1)
        }
        Object::Name(name) | Object::String(name, _) => {
            let target = named_destination(doc, name)?;
            page_of_destination(doc, target, pages, hops + 1)
        }
        _ => None,
    }
}

/// Look a named destination up in the catalog's `/Dests` dictionary or the
/// `/Names /Dests` name tree.
fn named_destination<'a>(doc: &'a Document, name: &[u8]) -> Option<&'a Object> {
    let catalog = doc.catalog().ok()?;
    if let Some(dests) = catalog.get(b"Dests").ok().and_then(|d| resolve(doc, d).as_dict().ok()) {
        if let Ok(found) = dests.get(name) {
            return Some(resolve(doc, found));
        }
    }
    let names = resolve(doc, catalog.get(b"Names").ok()?).as_dict().ok()?;
    let tree = resolve(doc, names.get(b"Dests").ok()?).as_dict().ok()?;
    search_name_tree(doc, tree, name, 0)
}

fn search_name_tree<'a>(
    doc: &'a Document,
    node: &'a Dictionary,
    name: &[u8],
    depth: usize,
) -> Option<&'a Object> {
    if depth > MAX_DEPTH {
        return None;
    }
    if let Some(pairs) = node.get(b"Names").ok().and_then(|n| resolve(doc, n).as_array().ok()) {
        for pair in pairs.chunks(2) {
            if let [key, value] = pair {
                if resolve(doc, key).as_str().ok() == Some(name) {
                    return Some(resolve(doc, value));
                }
            }
        }
    }
    let kids = node.get(b"Kids").ok().and_then(|k| resolve(doc, k).as_array().ok())?;
    kids.iter()
        .filter_map(|kid| resolve(doc, kid).as_dict().ok())
        .find_map(|kid| search_name_tree(doc, kid, name, depth + 1))
}

/// Replace the document outline. An empty slice removes it.
pub fn write_outline(doc: &mut Document, outline: &[Bookmark]) -> Result<(), EngineError> {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    validate(outline, pages.len(), 0)?;

    let root = engine::root_id(doc)?;
    if outline.is_empty() {
        let catalog = doc.get_dictionary_mut(root)?;
        catalog.remove(b"Outlines");
        catalog.remove(b"PageMode");
        doc.prune_objects();
        return Ok(());
    }

    let outlines_id = doc.new_object_id();
    let (first, last, count) = write_siblings(doc, outline, outlines_id, &pages);
    doc.objects.insert(
        outlines_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => first,
            "Last" => last,
            "Count" => count,
        }),
    );

    let catalog = doc.get_dictionary_mut(root)?;
    catalog.set("Outlines", outlines_id);
    catalog.set("PageMode", "UseOutlines");
    doc.prune_objects();
    debug!(entries = count, "wrote outline");
    Ok(())
}

fn validate(items: &[Bookmark], page_count: usize, depth: usize) -> Result<(), EngineError> {
    if depth >= MAX_DEPTH && !items.is_empty() {
        return Err(EngineError::InvalidBookmark(format!(
            "outline is nested deeper than {} levels",
            MAX_DEPTH
        )));
    }
    for item in items {
        if let Some(page) = item.page {
            if page == 0 || page as usize > page_count {
                return Err(EngineError::InvalidBookmark(format!(
                    "\"{}\" points to page {} but the document has {} pages",
                    item.title, page, page_count
                )));
            }
        }
        validate(&item.children, page_count, depth + 1)?;
    }
    Ok(())
}

/// Write one level of outline items; returns (first, last, visible count).
fn write_siblings(
    doc: &mut Document,
    items: &[Bookmark],
    parent: ObjectId,
    pages: &[ObjectId],
) -> (ObjectId, ObjectId, i64) {
    let ids: Vec<ObjectId> = items.iter().map(|_| doc.new_object_id()).collect();
    let mut count = items.len() as i64;

    for (i, item) in items.iter().enumerate() {
        let mut dict = dictionary! {
            "Title" => Object::String(text::encode_text_string(&item.title), lopdf::StringFormat::Literal),
            "Parent" => parent,
        };
        if i > 0 {
            dict.set("Prev", ids[i - 1]);
        }
        if i + 1 < ids.len() {
            dict.set("Next", ids[i + 1]);
        }
        if let Some(page) = item.page {
            let page_id = pages[page as usize - 1];
            dict.set("Dest", vec![Object::Reference(page_id), "Fit".into()]);
        }
        if !item.children.is_empty() {
            let (first, last, child_count) = write_siblings(doc, &item.children, ids[i], pages);
            dict.set("First", first);
            dict.set("Last", last);
            dict.set("Count", child_count);
            count += child_count;
        }
        doc.objects.insert(ids[i], Object::Dictionary(dict));
    }

    (ids[0], ids[ids.len() - 1], count)
}

/// Parse a dotted index path such as `0.2.1`; the empty string is the root.
pub fn parse_path(path: &str) -> Result<Vec<usize>, EditError> {
    if path.trim().is_empty() {
        return Ok(Vec::new());
    }
    path.split('.')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| EditError::BadPath(path.to_string()))
        })
        .collect()
}

#[derive(Debug, Error, PartialEq)]
pub enum EditError {
    #[error("no bookmark at {0:?}")]
    NoSuchEntry(Vec<usize>),
    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("a bookmark path must not be empty")]
    EmptyPath,
    #[error("invalid bookmark path {0:?}")]
    BadPath(String),
    #[error("the editor has no document loaded")]
    NotLoaded,
}

/// Editable outline state for one document.
///
/// The editor is a [`HostedTool`]: mounting it loads the outline of the
/// session's document, unmounting discards the pending edits.
#[derive(Debug, Default)]
pub struct BookmarkEditor {
    entries: Vec<Bookmark>,
    page_count: u32,
    loaded: bool,
    dirty: bool,
}

impl BookmarkEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// An editor over an existing outline.
    pub fn with_entries(entries: Vec<Bookmark>, page_count: u32) -> Self {
        BookmarkEditor {
            entries,
            page_count,
            loaded: true,
            dirty: false,
        }
    }

    pub fn entries(&self) -> &[Bookmark] {
        &self.entries
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn into_entries(self) -> Vec<Bookmark> {
        self.entries
    }

    /// Append `bookmark` as the last child of `parent` (empty path = top level).
    pub fn add(&mut self, parent: &[usize], bookmark: Bookmark) -> Result<(), EditError> {
        self.check_loaded()?;
        self.check_tree(&bookmark)?;
        let siblings = if parent.is_empty() {
            &mut self.entries
        } else {
            &mut entry_mut(&mut self.entries, parent)?.children
        };
        siblings.push(bookmark);
        self.dirty = true;
        Ok(())
    }

    pub fn remove(&mut self, path: &[usize]) -> Result<Bookmark, EditError> {
        self.check_loaded()?;
        let (&index, parent) = path.split_last().ok_or(EditError::EmptyPath)?;
        let siblings = if parent.is_empty() {
            &mut self.entries
        } else {
            &mut entry_mut(&mut self.entries, parent)?.children
        };
        if index >= siblings.len() {
            return Err(EditError::NoSuchEntry(path.to_vec()));
        }
        self.dirty = true;
        Ok(siblings.remove(index))
    }

    pub fn rename(&mut self, path: &[usize], title: impl Into<String>) -> Result<(), EditError> {
        self.check_loaded()?;
        entry_mut(&mut self.entries, path)?.title = title.into();
        self.dirty = true;
        Ok(())
    }

    pub fn retarget(&mut self, path: &[usize], page: u32) -> Result<(), EditError> {
        self.check_loaded()?;
        self.check_page(page)?;
        entry_mut(&mut self.entries, path)?.page = Some(page);
        self.dirty = true;
        Ok(())
    }

    fn check_loaded(&self) -> Result<(), EditError> {
        if self.loaded { Ok(()) } else { Err(EditError::NotLoaded) }
    }

    fn check_page(&self, page: u32) -> Result<(), EditError> {
        if page == 0 || page > self.page_count {
            return Err(EditError::PageOutOfRange {
                page,
                page_count: self.page_count,
            });
        }
        Ok(())
    }

    fn check_tree(&self, bookmark: &Bookmark) -> Result<(), EditError> {
        if let Some(page) = bookmark.page {
            self.check_page(page)?;
        }
        bookmark
            .children
            .iter()
            .try_for_each(|child| self.check_tree(child))
    }
}

fn entry_mut<'a>(entries: &'a mut [Bookmark], path: &[usize]) -> Result<&'a mut Bookmark, EditError> {
    let (&first, rest) = path.split_first().ok_or(EditError::EmptyPath)?;
    let mut current = entries
        .get_mut(first)
        .ok_or_else(|| EditError::NoSuchEntry(path.to_vec()))?;
    for &index in rest {
        current = current
            .children
            .get_mut(index)
            .ok_or_else(|| EditError::NoSuchEntry(path.to_vec()))?;
    }
    Ok(current)
}

impl HostedTool for BookmarkEditor {
    fn name(&self) -> &str {
        "bookmark-editor"
    }

    fn try_init(&mut self, session: &Session) -> Readiness {
        let Some(doc) = session.document() else {
            return Readiness::Pending;
        };
        match read_outline(doc.document()) {
            Ok(entries) => {
                self.entries = entries;
                self.page_count = doc.page_count() as u32;
                self.loaded = true;
                self.dirty = false;
                Readiness::Ready
            }
            Err(err) => {
                debug!(error = %err, "outline not readable yet");
                Readiness::Pending
            }
        }
    }

    fn teardown(&mut self) {
        self.entries.clear();
        self.page_count = 0;
        self.loaded = false;
        self.dirty = false;
    }
}
