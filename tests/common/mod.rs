#![allow(dead_code)]

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::io::Cursor;

/// A one-page PDF with a filled text field, a checked checkbox and a link.
pub fn form_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let text_ap = doc.add_object(Stream::new(
        dictionary! { "BBox" => vec![0.into(), 0.into(), 120.into(), 18.into()] },
        b"0 0 0 rg BT /Helv 12 Tf 2 4 Td (Ada) Tj ET".to_vec(),
    ));
    let on_ap = doc.add_object(Stream::new(
        dictionary! { "BBox" => vec![0.into(), 0.into(), 12.into(), 12.into()] },
        b"0 0 12 12 re f".to_vec(),
    ));
    let off_ap = doc.add_object(Stream::new(
        dictionary! { "BBox" => vec![0.into(), 0.into(), 12.into(), 12.into()] },
        Vec::new(),
    ));

    let text_field = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => Object::string_literal("name"),
        "V" => Object::string_literal("Ada"),
        "Rect" => vec![72.into(), 700.into(), 192.into(), 718.into()],
        "AP" => dictionary! { "N" => text_ap },
    });
    let checkbox = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "T" => Object::string_literal("agree"),
        "V" => "Yes",
        "AS" => "Yes",
        "Rect" => vec![72.into(), 650.into(), 84.into(), 662.into()],
        "AP" => dictionary! { "N" => dictionary! { "Yes" => on_ap, "Off" => off_ap } },
    });
    let link = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => vec![0.into(), 0.into(), 50.into(), 10.into()],
    });

    let content = doc.add_object(Stream::new(
        Dictionary::new(),
        b"BT /F1 12 Tf 72 740 Td (Application) Tj ET".to_vec(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content,
        "Annots" => vec![text_field.into(), checkbox.into(), link.into()],
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
        "Fields" => vec![text_field.into(), checkbox.into()],
        "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
    });
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform,
    });
    doc.trailer.set("Root", catalog);
    save(doc)
}

/// A PDF with one near-empty page per entry of `sizes`.
pub fn pdf_with_pages(sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<ObjectId> = sizes
        .iter()
        .map(|&(w, h)| {
            let content = doc.add_object(Stream::new(Dictionary::new(), b"0 0 m".to_vec()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
                "Contents" => content,
            })
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.iter().map(|&id| Object::Reference(id)).collect::<Vec<_>>(),
            "Count" => kids.len() as i64,
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog);
    save(doc)
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 7) as u8, (y * 11) as u8, 90, if x % 2 == 0 { 255 } else { 128 }])
    });
    encode(image::DynamicImage::ImageRgba8(img), image::ImageFormat::Png)
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
    encode(image::DynamicImage::ImageRgb8(img), image::ImageFormat::Jpeg)
}

fn encode(img: image::DynamicImage, format: image::ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
