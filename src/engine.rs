//! Document engine seam.
//!
//! The pipeline only needs a handful of document capabilities: parse bytes,
//! start an empty document, flatten its form, add an image page, append
//! another document, read or replace the outline, and serialise. They are
//! collected in [`DocumentEngine`]; [`LopdfEngine`] implements them on top of
//! `lopdf`.

use crate::bookmarks::{self, Bookmark};
use crate::error::EngineError;
use crate::flatten;
use crate::raster::{self, RasterImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::debug;

/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Upper bound on page-tree depth when following `/Parent` links.
pub(crate) const MAX_TREE_DEPTH: usize = 64;

/// A parsed, in-memory PDF document.
#[derive(Debug, Clone)]
pub struct PdfHandle {
    doc: Document,
}

impl PdfHandle {
    pub fn from_document(doc: Document) -> Self {
        PdfHandle { doc }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Whether the catalog carries an `/AcroForm` entry.
    pub fn has_form(&self) -> bool {
        self.doc
            .catalog()
            .map(|catalog| catalog.has(b"AcroForm"))
            .unwrap_or(false)
    }

    /// Width and height of every page's media box, in page order.
    pub fn page_sizes(&self) -> Vec<(f32, f32)> {
        self.doc
            .get_pages()
            .values()
            .map(|&page_id| {
                inherited_attribute(&self.doc, page_id, b"MediaBox")
                    .and_then(|obj| resolve(&self.doc, &obj).as_array().ok().cloned())
                    .and_then(|arr| rect_from_array(&arr))
                    .map(|r| (r.width(), r.height()))
                    .unwrap_or((0.0, 0.0))
            })
            .collect()
    }
}

/// Operations the pipeline needs from a PDF library.
pub trait DocumentEngine {
    fn parse(&self, bytes: &[u8]) -> Result<PdfHandle, EngineError>;

    /// A new document with an empty page tree.
    fn blank(&self) -> PdfHandle;

    /// Paint every form widget into its page and drop the interactive form.
    /// Returns the number of widgets flattened.
    fn flatten_form(&self, doc: &mut PdfHandle) -> Result<usize, EngineError>;

    /// Append a page sized to the image's pixel dimensions, showing the image.
    fn embed_image_page(&self, doc: &mut PdfHandle, image: &RasterImage)
    -> Result<(), EngineError>;

    /// Append all pages of `source` to `target`, in order.
    fn append_document(&self, target: &mut PdfHandle, source: PdfHandle)
    -> Result<(), EngineError>;

    fn read_outline(&self, doc: &PdfHandle) -> Result<Vec<Bookmark>, EngineError>;

    fn write_outline(&self, doc: &mut PdfHandle, outline: &[Bookmark])
    -> Result<(), EngineError>;

    /// Serialise without modifying `doc`, so equal documents give equal bytes.
    fn serialize(&self, doc: &PdfHandle) -> Result<Vec<u8>, EngineError>;
}

/// [`DocumentEngine`] backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfEngine;

impl DocumentEngine for LopdfEngine {
    fn parse(&self, bytes: &[u8]) -> Result<PdfHandle, EngineError> {
        let doc = Document::load_mem(bytes)?;
        if doc.is_encrypted() {
            return Err(EngineError::Parse("document is encrypted".into()));
        }
        debug!(pages = doc.get_pages().len(), "parsed document");
        Ok(PdfHandle { doc })
    }

    fn blank(&self) -> PdfHandle {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        PdfHandle { doc }
    }

    fn flatten_form(&self, doc: &mut PdfHandle) -> Result<usize, EngineError> {
        flatten::flatten_form(&mut doc.doc)
    }

    fn embed_image_page(
        &self,
        doc: &mut PdfHandle,
        image: &RasterImage,
    ) -> Result<(), EngineError> {
        let doc = &mut doc.doc;
        let pages_id = pages_root(doc)?;
        let (mut main, mask) = image.to_streams()?;
        if let Some(mask) = mask {
            let mask_id = doc.add_object(mask);
            main.dict.set("SMask", mask_id);
        }
        let image_id = doc.add_object(main);

        let (w, h) = (image.width as f32, image.height as f32);
        let content = raster::create_image_content_stream(0.0, 0.0, w, h, "Im1");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), (image.width as i64).into(), (image.height as i64).into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        push_kids(doc, pages_id, &[page_id])?;
        debug!(image = %image.name, width = image.width, height = image.height, "embedded image page");
        Ok(())
    }

    fn append_document(
        &self,
        target: &mut PdfHandle,
        source: PdfHandle,
    ) -> Result<(), EngineError> {
        let mut source = source.doc;

        // Pages leave their original tree, so inherited attributes must be explicit.
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();
        for &page_id in &source_pages {
            for key in INHERITABLE {
                let own = source
                    .get_dictionary(page_id)
                    .map(|d| d.has(key))
                    .unwrap_or(true);
                if own {
                    continue;
                }
                if let Some(value) = inherited_attribute(&source, page_id, key) {
                    source.get_dictionary_mut(page_id)?.set(key, value);
                }
            }
        }

        source.renumber_objects_with(target.doc.max_id + 1);
        let source_root = source.trailer.get(b"Root")?.as_reference()?;
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();

        let target_doc = &mut target.doc;
        let target_pages = pages_root(target_doc)?;
        for (id, object) in source.objects {
            if id != source_root {
                target_doc.objects.insert(id, object);
            }
        }
        target_doc.max_id = target_doc.max_id.max(source.max_id);

        for &page_id in &source_pages {
            target_doc
                .get_dictionary_mut(page_id)?
                .set("Parent", target_pages);
        }
        push_kids(target_doc, target_pages, &source_pages)?;
        target_doc.prune_objects();
        debug!(pages = source_pages.len(), "appended document");
        Ok(())
    }

    fn read_outline(&self, doc: &PdfHandle) -> Result<Vec<Bookmark>, EngineError> {
        bookmarks::read_outline(&doc.doc)
    }

    fn write_outline(
        &self,
        doc: &mut PdfHandle,
        outline: &[Bookmark],
    ) -> Result<(), EngineError> {
        bookmarks::write_outline(&mut doc.doc, outline)
    }

    fn serialize(&self, doc: &PdfHandle) -> Result<Vec<u8>, EngineError> {
        // Saving allocates an xref stream id on the document it is called on.
        let mut copy = doc.doc.clone();
        let mut out = Vec::new();
        copy.save_to(&mut out)
            .map_err(|e| EngineError::Other(format!("failed to serialise document: {}", e)))?;
        Ok(out)
    }
}

// --- Shared lopdf helpers ---

/// Follow a reference to its target; non-references are returned as-is.
/// Dangling references resolve to `Null`.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    const NULL: &Object = &Object::Null;
    match doc.dereference(obj) {
        Ok((_, target)) => target,
        Err(_) => NULL,
    }
}

/// Numeric value of an integer or real object.
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Look up `key` on a page, walking `/Parent` links when it is inherited.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub(crate) fn pages_root(doc: &Document) -> Result<ObjectId, EngineError> {
    Ok(doc.catalog()?.get(b"Pages")?.as_reference()?)
}

pub(crate) fn root_id(doc: &Document) -> Result<ObjectId, EngineError> {
    Ok(doc.trailer.get(b"Root")?.as_reference()?)
}

fn push_kids(doc: &mut Document, pages_id: ObjectId, kids: &[ObjectId]) -> Result<(), EngineError> {
    let pages = doc.get_dictionary_mut(pages_id)?;
    let mut all = match pages.get(b"Kids") {
        Ok(Object::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    all.extend(kids.iter().map(|&id| Object::Reference(id)));
    let count = pages.get(b"Count").ok().and_then(|c| c.as_i64().ok()).unwrap_or(0);
    pages.set("Kids", all);
    pages.set("Count", count + kids.len() as i64);
    Ok(())
}

/// Axis-aligned rectangle in user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Normalised rectangle from a four-number array.
pub(crate) fn rect_from_array(arr: &[Object]) -> Option<Rect> {
    if arr.len() != 4 {
        return None;
    }
    let v: Vec<f32> = arr.iter().filter_map(number).collect();
    if v.len() != 4 {
        return None;
    }
    Some(Rect {
        x1: v[0].min(v[2]),
        y1: v[1].min(v[3]),
        x2: v[0].max(v[2]),
        y2: v[1].max(v[3]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Pixels;

    fn gray_image(name: &str, width: u32, height: u32) -> RasterImage {
        RasterImage {
            name: name.to_string(),
            width,
            height,
            pixels: Pixels::Raw {
                samples: vec![128; (width * height) as usize],
                gray: true,
                alpha: None,
            },
        }
    }

    #[test]
    fn test_blank_has_no_pages() {
        let engine = LopdfEngine;
        let doc = engine.blank();
        assert_eq!(doc.page_count(), 0);
        let bytes = engine.serialize(&doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
    }

    #[test]
    fn test_embed_image_pages_in_order() {
        let engine = LopdfEngine;
        let mut doc = engine.blank();
        engine.embed_image_page(&mut doc, &gray_image("a", 10, 20)).unwrap();
        engine.embed_image_page(&mut doc, &gray_image("b", 30, 5)).unwrap();

        let bytes = engine.serialize(&doc).unwrap();
        let reopened = engine.parse(&bytes).unwrap();
        assert_eq!(reopened.page_sizes(), vec![(10.0, 20.0), (30.0, 5.0)]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = LopdfEngine.parse(b"not a pdf").unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_append_document_keeps_inherited_media_box() {
        let engine = LopdfEngine;

        // Source whose page inherits its MediaBox from the page tree root.
        let mut src = Document::with_version("1.5");
        let pages_id = src.new_object_id();
        let page_id = src.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        src.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
            }),
        );
        let catalog_id = src.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        src.trailer.set("Root", catalog_id);

        let mut target = engine.blank();
        engine.embed_image_page(&mut target, &gray_image("first", 4, 4)).unwrap();
        engine
            .append_document(&mut target, PdfHandle::from_document(src))
            .unwrap();

        assert_eq!(target.page_count(), 2);
        assert_eq!(target.page_sizes(), vec![(4.0, 4.0), (200.0, 100.0)]);
    }

    #[test]
    fn test_rect_from_array_normalises() {
        let arr = vec![Object::Integer(100), Object::Real(50.0), 10.into(), 5.into()];
        let r = rect_from_array(&arr).unwrap();
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (10.0, 5.0, 100.0, 50.0));
        assert!(rect_from_array(&arr[..3]).is_none());
    }

    #[test]
    fn test_number() {
        assert_eq!(number(&Object::Integer(3)), Some(3.0));
        assert_eq!(number(&Object::Real(1.5)), Some(1.5));
        assert_eq!(number(&Object::Null), None);
    }
}
