use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream, StringFormat};

use crate::error::{AppError, AppResult};

use super::layout::{Document, Element, ImageElement, TextElement, PAGE_HEIGHT, PAGE_WIDTH};
use super::signature::ImageData;

const MM_TO_PT: f32 = 72.0 / 25.4;
const FONT_NAME: &str = "F1";

fn pt(mm: f32) -> f32 {
    mm * MM_TO_PT
}

/// Helvetica is set up with WinAnsiEncoding; Latin-1 maps onto it directly.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            _ => b'?',
        })
        .collect()
}

fn text_ops(ops: &mut Vec<Operation>, text: &TextElement) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(FONT_NAME.as_bytes().to_vec()), text.size.into()],
    ));
    ops.push(Operation::new(
        "Td",
        vec![pt(text.x).into(), pt(PAGE_HEIGHT - text.y).into()],
    ));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(win_ansi(&text.text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

fn image_stream(element: &ImageElement) -> Stream {
    let image = &element.image;
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(image.width),
        "Height" => i64::from(image.height),
        "BitsPerComponent" => 8i64,
    };
    match &image.data {
        ImageData::Jpeg { bytes, components } => {
            let space = match components {
                1 => "DeviceGray",
                4 => "DeviceCMYK",
                _ => "DeviceRGB",
            };
            dict.set("ColorSpace", space);
            dict.set("Filter", "DCTDecode");
            Stream::new(dict, bytes.clone()).with_compression(false)
        }
        ImageData::Rgb(pixels) => {
            dict.set("ColorSpace", "DeviceRGB");
            Stream::new(dict, pixels.clone())
        }
    }
}

fn image_ops(ops: &mut Vec<Operation>, name: &str, element: &ImageElement) {
    let bottom = PAGE_HEIGHT - element.y - element.height;
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "cm",
        vec![
            pt(element.width).into(),
            0i64.into(),
            0i64.into(),
            pt(element.height).into(),
            pt(element.x).into(),
            pt(bottom).into(),
        ],
    ));
    ops.push(Operation::new(
        "Do",
        vec![Object::Name(name.as_bytes().to_vec())],
    ));
    ops.push(Operation::new("Q", vec![]));
}

fn export_err(e: impl std::fmt::Display) -> AppError {
    AppError::Export(format!("PDF encoding failed: {}", e))
}

/// Writes a laid-out document as PDF bytes.
pub fn render(document: &Document) -> AppResult<Vec<u8>> {
    if document.pages.is_empty() {
        return Err(AppError::Export("document has no pages".to_string()));
    }

    let mut pdf = lopdf::Document::with_version("1.5");
    let pages_id = pdf.new_object_id();
    let font_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        let mut ops = Vec::new();
        let mut xobjects = Dictionary::new();

        for (index, element) in page.elements.iter().enumerate() {
            match element {
                Element::Text(text) => text_ops(&mut ops, text),
                Element::Image(image) => {
                    let name = format!("Im{}", index);
                    let image_id: ObjectId = pdf.add_object(image_stream(image));
                    xobjects.set(name.as_bytes().to_vec(), image_id);
                    image_ops(&mut ops, &name, image);
                }
            }
        }

        let content = Content { operations: ops };
        let content_id = pdf.add_object(Stream::new(
            Dictionary::new(),
            content.encode().map_err(export_err)?,
        ));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { FONT_NAME => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    pdf.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![
                0i64.into(),
                0i64.into(),
                pt(PAGE_WIDTH).into(),
                pt(PAGE_HEIGHT).into(),
            ],
        }),
    );
    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    pdf.trailer.set("Root", catalog_id);
    pdf.compress();

    let mut out = Vec::new();
    pdf.save_to(&mut out).map_err(export_err)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::layout::{layout, tests::record_with, LayoutOptions};
    use crate::export::signature::tests::png_data_url;

    #[test]
    fn test_win_ansi() {
        assert_eq!(win_ansi("Café"), b"Caf\xe9".to_vec());
        assert_eq!(win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn test_render_single_page() {
        let record = record_with(2, 3);
        let bytes = render(&layout(&record, &LayoutOptions::default())).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let text = pdf_extract::extract_text_from_mem(&bytes).unwrap();
        assert!(text.contains("Inspection Report"));
        assert!(text.contains("Corolla"));
        assert!(text.contains("item_1_2"));
    }

    #[test]
    fn test_render_page_count_matches_layout() {
        let record = record_with(6, 20);
        let document = layout(&record, &LayoutOptions::default());
        let bytes = render(&document).unwrap();

        let parsed = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), document.page_count());
        let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes).unwrap();
        assert_eq!(pages.len(), document.page_count());
    }

    #[test]
    fn test_render_with_signature_image() {
        let mut record = record_with(1, 2);
        record.signature_data_url = Some(png_data_url());
        let document = layout(&record, &LayoutOptions::default());
        assert!(document
            .pages
            .iter()
            .any(|p| p.elements.iter().any(|e| matches!(e, Element::Image(_)))));

        let bytes = render(&document).unwrap();
        let parsed = lopdf::Document::load_mem(&bytes).unwrap();
        let has_image = parsed.objects.values().any(|o| {
            o.as_stream()
                .ok()
                .and_then(|s| s.dict.get(b"Subtype").ok())
                .and_then(|s| s.as_name().ok())
                == Some(b"Image".as_slice())
        });
        assert!(has_image);
    }

    #[test]
    fn test_render_empty_document_fails() {
        let err = render(&Document { pages: vec![] }).unwrap_err();
        assert!(matches!(err, AppError::Export(_)));
    }
}
