//! Interactive form flattening.
//!
//! Every visible widget annotation is painted into its page as a Form
//! XObject built from the widget's normal appearance, then the widgets and
//! the catalog's `/AcroForm` are removed.

use crate::engine::{self, MAX_TREE_DEPTH, Rect, number, rect_from_array, resolve};
use crate::error::EngineError;
use crate::text;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::debug;

/// Annotation flags that keep a widget from being drawn.
const FLAG_HIDDEN: i64 = 1 << 1;
const FLAG_NO_VIEW: i64 = 1 << 5;

const DEFAULT_FONT_SIZE: f32 = 12.0;

/// Flatten the document's form in place and return the number of widgets painted.
///
/// A document without `/AcroForm` is left untouched. An `/AcroForm` entry that
/// cannot be resolved to a dictionary is reported as
/// [`EngineError::FormUnavailable`].
pub fn flatten_form(doc: &mut Document) -> Result<usize, EngineError> {
    let Some(acroform) = acroform(doc)? else {
        debug!("document has no AcroForm, nothing to flatten");
        return Ok(0);
    };
    let form_da = acroform
        .get(b"DA")
        .ok()
        .and_then(|o| o.as_str().ok())
        .map(|s| String::from_utf8_lossy(s).into_owned());

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let mut painted = 0;
    let mut next_name = 0usize;

    for page_id in pages {
        let annots = page_annotations(doc, page_id);
        if annots.is_empty() {
            continue;
        }

        let mut kept = Vec::new();
        let mut placements: Vec<(String, ObjectId, String)> = Vec::new();
        let mut saw_widget = false;

        for annot in annots {
            let resolved = resolve(doc, &annot).as_dict().ok().cloned();
            let Some(dict) = resolved else {
                kept.push(annot);
                continue;
            };
            if !is_widget(&dict) {
                kept.push(annot);
                continue;
            }
            saw_widget = true;

            let flags = dict.get(b"F").ok().and_then(|f| f.as_i64().ok()).unwrap_or(0);
            if flags & (FLAG_HIDDEN | FLAG_NO_VIEW) != 0 {
                continue;
            }
            let Some(rect) = dict
                .get(b"Rect")
                .ok()
                .and_then(|r| resolve(doc, r).as_array().ok())
                .and_then(|arr| rect_from_array(arr))
            else {
                continue;
            };

            let appearance = match appearance_stream(doc, &dict) {
                Some(found) => Some(found),
                None => synthesize_text_appearance(doc, &dict, rect, form_da.as_deref())
                    .map(Appearance::Owned),
            };
            let Some(appearance) = appearance else {
                continue;
            };

            let xobject_id = install_xobject(doc, appearance)?;
            let Some(matrix) = placement_matrix(doc, xobject_id, rect) else {
                continue;
            };

            next_name += 1;
            let name = format!("FlatFx{}", next_name);
            let ops = format!(
                "q {} {} {} {} {} {} cm /{} Do Q\n",
                matrix[0], matrix[1], matrix[2], matrix[3], matrix[4], matrix[5], name
            );
            placements.push((name, xobject_id, ops));
        }

        if !saw_widget {
            continue;
        }

        if !placements.is_empty() {
            let names: Vec<(String, ObjectId)> = placements
                .iter()
                .map(|(name, id, _)| (name.clone(), *id))
                .collect();
            add_xobjects(doc, page_id, &names)?;
            let ops: String = placements.iter().map(|(_, _, ops)| ops.as_str()).collect();
            wrap_contents(doc, page_id, ops.into_bytes())?;
            painted += placements.len();
        }

        let page = doc.get_dictionary_mut(page_id)?;
        if kept.is_empty() {
            page.remove(b"Annots");
        } else {
            page.set("Annots", kept);
        }
    }

    let root = engine::root_id(doc)?;
    doc.get_dictionary_mut(root)?.remove(b"AcroForm");
    doc.prune_objects();
    debug!(widgets = painted, "flattened form");
    Ok(painted)
}

fn acroform(doc: &Document) -> Result<Option<Dictionary>, EngineError> {
    let catalog = doc.catalog()?;
    let Ok(entry) = catalog.get(b"AcroForm") else {
        return Ok(None);
    };
    let (_, target) = doc
        .dereference(entry)
        .map_err(|e| EngineError::FormUnavailable(e.to_string()))?;
    match target {
        Object::Dictionary(dict) => Ok(Some(dict.clone())),
        _ => Err(EngineError::FormUnavailable(
            "AcroForm entry is not a dictionary".into(),
        )),
    }
}

fn page_annotations(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    doc.get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Annots").ok())
        .and_then(|annots| resolve(doc, annots).as_array().ok().cloned())
        .unwrap_or_default()
}

fn is_widget(dict: &Dictionary) -> bool {
    dict.get(b"Subtype")
        .ok()
        .and_then(|s| s.as_name().ok())
        .is_some_and(|name| name == b"Widget")
}

enum Appearance {
    Shared(ObjectId),
    Owned(Stream),
}

/// The widget's normal appearance, selecting the `/AS` state when `/N` is a
/// dictionary of states.
fn appearance_stream(doc: &Document, widget: &Dictionary) -> Option<Appearance> {
    let ap = resolve(doc, widget.get(b"AP").ok()?).as_dict().ok()?;
    let normal = ap.get(b"N").ok()?;
    let (id, target) = doc.dereference(normal).ok()?;
    match target {
        Object::Stream(stream) => Some(match id {
            Some(id) => Appearance::Shared(id),
            None => Appearance::Owned(stream.clone()),
        }),
        Object::Dictionary(states) => {
            let state = widget.get(b"AS").ok()?.as_name().ok()?;
            let (id, target) = doc.dereference(states.get(state).ok()?).ok()?;
            let stream = target.as_stream().ok()?;
            Some(match id {
                Some(id) => Appearance::Shared(id),
                None => Appearance::Owned(stream.clone()),
            })
        }
        _ => None,
    }
}

/// Look up a field attribute on the widget or, through `/Parent`, its field.
fn field_attribute(doc: &Document, widget: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut current = widget.clone();
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value).clone());
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?.clone();
    }
    None
}

/// Build a plain appearance for a text field that has a value but no `/AP`.
fn synthesize_text_appearance(
    doc: &Document,
    widget: &Dictionary,
    rect: Rect,
    form_da: Option<&str>,
) -> Option<Stream> {
    let field_type = field_attribute(doc, widget, b"FT")?;
    if field_type.as_name().ok()? != b"Tx" {
        return None;
    }
    let value = match field_attribute(doc, widget, b"V")? {
        Object::String(bytes, _) => text::decode_text_string(&bytes),
        _ => return None,
    };
    if value.is_empty() {
        return None;
    }

    let da = field_attribute(doc, widget, b"DA")
        .and_then(|o| o.as_str().ok().map(|s| String::from_utf8_lossy(s).into_owned()))
        .or_else(|| form_da.map(str::to_string));
    let (w, h) = (rect.width(), rect.height());
    let size = match da.as_deref().and_then(font_size_from_da) {
        Some(size) if size > 0.0 => size,
        // Auto-sized text: fit the box height.
        _ => (h * 0.7).clamp(4.0, DEFAULT_FONT_SIZE),
    };
    let baseline = ((h - size) / 2.0 + size * 0.22).max(0.0);
    let line = value.lines().next().unwrap_or_default();

    let content = format!(
        "/Tx BMC\nq\nBT\n/Helv {} Tf\n0 g\n2 {} Td\n<{}> Tj\nET\nQ\nEMC\n",
        size,
        baseline,
        text::encode_hex_string(&text::to_latin1(line))
    );
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => vec![0.into(), 0.into(), w.into(), h.into()],
        "Resources" => dictionary! {
            "Font" => dictionary! {
                "Helv" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                },
            },
        },
    };
    Some(Stream::new(dict, content.into_bytes()))
}

/// Font size from a default-appearance string such as `/Helv 10 Tf 0 g`.
fn font_size_from_da(da: &str) -> Option<f32> {
    let tokens: Vec<&str> = da.split_whitespace().collect();
    let tf = tokens.iter().position(|t| *t == "Tf")?;
    tokens.get(tf.checked_sub(1)?)?.parse().ok()
}

/// Make sure the appearance is an indirect Form XObject and return its id.
fn install_xobject(doc: &mut Document, appearance: Appearance) -> Result<ObjectId, EngineError> {
    match appearance {
        Appearance::Shared(id) => {
            if let Object::Stream(stream) = doc.get_object_mut(id)? {
                stream.dict.set("Type", "XObject");
                stream.dict.set("Subtype", "Form");
            }
            Ok(id)
        }
        Appearance::Owned(mut stream) => {
            stream.dict.set("Type", "XObject");
            stream.dict.set("Subtype", "Form");
            Ok(doc.add_object(stream))
        }
    }
}

/// Matrix mapping the appearance's transformed bounding box onto `rect`.
fn placement_matrix(doc: &Document, xobject_id: ObjectId, rect: Rect) -> Option<[f32; 6]> {
    let stream = doc.get_object(xobject_id).ok()?.as_stream().ok()?;
    let bbox = stream
        .dict
        .get(b"BBox")
        .ok()
        .and_then(|b| resolve(doc, b).as_array().ok())
        .and_then(|arr| rect_from_array(arr))
        .unwrap_or(Rect {
            x1: 0.0,
            y1: 0.0,
            x2: rect.width(),
            y2: rect.height(),
        });
    let matrix = stream
        .dict
        .get(b"Matrix")
        .ok()
        .and_then(|m| resolve(doc, m).as_array().ok())
        .map(|arr| arr.iter().filter_map(number).collect::<Vec<f32>>())
        .filter(|m| m.len() == 6)
        .unwrap_or_else(|| vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    let bounds = transform_bbox(bbox, &matrix);
    if bounds.width().abs() < f32::EPSILON || bounds.height().abs() < f32::EPSILON {
        return None;
    }
    let sx = rect.width() / bounds.width();
    let sy = rect.height() / bounds.height();
    Some([sx, 0.0, 0.0, sy, rect.x1 - bounds.x1 * sx, rect.y1 - bounds.y1 * sy])
}

fn transform_bbox(bbox: Rect, m: &[f32]) -> Rect {
    let corners = [
        (bbox.x1, bbox.y1),
        (bbox.x2, bbox.y1),
        (bbox.x1, bbox.y2),
        (bbox.x2, bbox.y2),
    ];
    let mut out = Rect {
        x1: f32::INFINITY,
        y1: f32::INFINITY,
        x2: f32::NEG_INFINITY,
        y2: f32::NEG_INFINITY,
    };
    for (x, y) in corners {
        let tx = m[0] * x + m[2] * y + m[4];
        let ty = m[1] * x + m[3] * y + m[5];
        out.x1 = out.x1.min(tx);
        out.y1 = out.y1.min(ty);
        out.x2 = out.x2.max(tx);
        out.y2 = out.y2.max(ty);
    }
    out
}

/// Register XObjects in the page's own resource dictionary.
fn add_xobjects(
    doc: &mut Document,
    page_id: ObjectId,
    entries: &[(String, ObjectId)],
) -> Result<(), EngineError> {
    let mut resources = engine::inherited_attribute(doc, page_id, b"Resources")
        .and_then(|r| resolve(doc, &r).as_dict().ok().cloned())
        .unwrap_or_default();
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|x| resolve(doc, x).as_dict().ok().cloned())
        .unwrap_or_default();
    for (name, id) in entries {
        xobjects.set(name.as_bytes(), *id);
    }
    resources.set("XObject", xobjects);
    doc.get_dictionary_mut(page_id)?.set("Resources", resources);
    Ok(())
}

/// Isolate the existing content in `q`/`Q` and append `ops` after it.
fn wrap_contents(doc: &mut Document, page_id: ObjectId, ops: Vec<u8>) -> Result<(), EngineError> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Array(parts)) => parts.clone(),
        Ok(reference @ Object::Reference(_)) => match resolve(doc, reference) {
            Object::Array(parts) => parts.clone(),
            _ => vec![reference.clone()],
        },
        _ => Vec::new(),
    };

    let mut tail = b"Q\n".to_vec();
    tail.extend_from_slice(&ops);
    let head_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let tail_id = doc.add_object(Stream::new(Dictionary::new(), tail));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(head_id));
    contents.extend(existing);
    contents.push(Object::Reference(tail_id));
    doc.get_dictionary_mut(page_id)?.set("Contents", contents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One page with a text widget that has an appearance stream, a text
    /// widget with only a value, a hidden widget and a link annotation.
    fn form_document() -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let ap_id = doc.add_object(Stream::new(
            dictionary! {
                "BBox" => vec![0.into(), 0.into(), 100.into(), 20.into()],
            },
            b"0 0 1 rg 0 0 100 20 re f".to_vec(),
        ));
        let field_with_ap = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal("name"),
            "Rect" => vec![50.into(), 700.into(), 150.into(), 720.into()],
            "AP" => dictionary! { "N" => ap_id },
        });
        let field_value_only = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal("city"),
            "V" => Object::string_literal("Lisbon"),
            "DA" => Object::string_literal("/Helv 10 Tf 0 g"),
            "Rect" => vec![50.into(), 600.into(), 250.into(), 620.into()],
        });
        let hidden = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "F" => 2,
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
            "AP" => dictionary! { "N" => ap_id },
        });
        let link = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
        });

        let content_id = doc.add_object(Stream::new(Dictionary::new(), b"BT ET".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Annots" => vec![field_with_ap.into(), field_value_only.into(), hidden.into(), link.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let acroform = doc.add_object(dictionary! {
            "Fields" => vec![field_with_ap.into(), field_value_only.into(), hidden.into()],
        });
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => acroform,
        });
        doc.trailer.set("Root", catalog);
        doc
    }

    fn first_page(doc: &Document) -> &Dictionary {
        let id = *doc.get_pages().values().next().unwrap();
        doc.get_dictionary(id).unwrap()
    }

    #[test]
    fn test_flatten_paints_visible_widgets() {
        let mut doc = form_document();
        let painted = flatten_form(&mut doc).unwrap();
        assert_eq!(painted, 2);

        assert!(!doc.catalog().unwrap().has(b"AcroForm"));
        let page = first_page(&doc);
        let annots = page.get(b"Annots").unwrap().as_array().unwrap();
        assert_eq!(annots.len(), 1, "only the link annotation survives");

        let xobjects = page
            .get(b"Resources")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"XObject")
            .unwrap()
            .as_dict()
            .unwrap();
        assert_eq!(xobjects.len(), 2);

        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 3);
    }

    #[test]
    fn test_flatten_without_acroform_is_noop() {
        let mut doc = form_document();
        flatten_form(&mut doc).unwrap();
        let before = doc.objects.len();
        assert_eq!(flatten_form(&mut doc).unwrap(), 0);
        assert_eq!(doc.objects.len(), before);
    }

    #[test]
    fn test_flatten_malformed_acroform() {
        let mut doc = form_document();
        let root = engine::root_id(&doc).unwrap();
        doc.get_dictionary_mut(root)
            .unwrap()
            .set("AcroForm", Object::Integer(7));
        let err = flatten_form(&mut doc).unwrap_err();
        assert!(matches!(err, EngineError::FormUnavailable(_)));
    }

    #[test]
    fn test_font_size_from_da() {
        assert_eq!(font_size_from_da("/Helv 10 Tf 0 g"), Some(10.0));
        assert_eq!(font_size_from_da("0 g /F1 0 Tf"), Some(0.0));
        assert_eq!(font_size_from_da("Tf"), None);
        assert_eq!(font_size_from_da("0 g"), None);
    }

    #[test]
    fn test_placement_matrix_scales_bbox_to_rect() {
        let mut doc = Document::with_version("1.7");
        let id = doc.add_object(Stream::new(
            dictionary! { "BBox" => vec![0.into(), 0.into(), 50.into(), 10.into()] },
            Vec::new(),
        ));
        let rect = Rect {
            x1: 10.0,
            y1: 20.0,
            x2: 110.0,
            y2: 40.0,
        };
        let m = placement_matrix(&doc, id, rect).unwrap();
        assert_eq!(m, [2.0, 0.0, 0.0, 2.0, 10.0, 20.0]);
    }

    #[test]
    fn test_transform_bbox_rotated() {
        let bbox = Rect {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 5.0,
        };
        // 90 degree rotation
        let r = transform_bbox(bbox, &[0.0, 1.0, -1.0, 0.0, 0.0, 0.0]);
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (-5.0, 0.0, 0.0, 10.0));
    }
}
