//! Bake signature overlays into page content
//!
//! Overlays are drawn into the page content stream rather than added as
//! annotations, so the page hash computed afterwards covers them. The page's
//! existing content is wrapped in `q`/`Q` to keep its graphics state from
//! leaking into the overlay.

use crate::builder::{number, to_pdf_text};
use crate::error::PdfError;
use crate::parser::PdfDocument;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use shared_types::{OverlayKind, Placement};
use std::collections::BTreeMap;
use std::io::Write;
use tracing::debug;

/// Apply all placements and return the new PDF bytes.
///
/// With no placements the input is returned untouched.
pub fn apply_overlays(pdf_bytes: &[u8], placements: &[Placement]) -> Result<Vec<u8>, PdfError> {
    if placements.is_empty() {
        return Ok(pdf_bytes.to_vec());
    }

    let mut pdf = PdfDocument::from_bytes(pdf_bytes)?;

    let mut by_page: BTreeMap<u32, Vec<&Placement>> = BTreeMap::new();
    for placement in placements {
        validate_placement(&pdf, placement)?;
        by_page.entry(placement.page).or_default().push(placement);
    }

    for (page_num, page_placements) in by_page {
        let page_id = pdf
            .page_id(page_num)
            .ok_or(PdfError::PageNotFound(page_num))?;
        own_resources(&mut pdf, page_id)?;

        let mut operations = Vec::new();
        for placement in page_placements {
            operations.extend(overlay_operations(pdf.doc_mut(), page_id, placement)?);
        }
        append_content(pdf.doc_mut(), page_id, operations)?;
        debug!(page = page_num, "Baked overlays into page content");
    }

    pdf.save_to_bytes()
}

/// Check that a placement targets an existing page and fits inside it
pub fn validate_placement(pdf: &PdfDocument, placement: &Placement) -> Result<(), PdfError> {
    if pdf.page_id(placement.page).is_none() {
        return Err(PdfError::InvalidPlacement(format!(
            "page {} does not exist",
            placement.page
        )));
    }
    let font_size = match &placement.kind {
        OverlayKind::Text { font_size, .. } => Some(*font_size),
        OverlayKind::Image { .. } => None,
    };
    let finite = [placement.x, placement.y, placement.width, placement.height]
        .into_iter()
        .chain(font_size)
        .all(f64::is_finite);
    if !finite {
        return Err(PdfError::InvalidPlacement(
            "coordinates and sizes must be finite numbers".to_string(),
        ));
    }
    if !(placement.width > 0.0 && placement.height > 0.0) {
        return Err(PdfError::InvalidPlacement(
            "dimensions must be positive".to_string(),
        ));
    }

    let [x0, y0, width, height] = pdf.page_dimensions(placement.page)?;
    if placement.x < x0
        || placement.y < y0
        || placement.x + placement.width > x0 + width
        || placement.y + placement.height > y0 + height
    {
        return Err(PdfError::InvalidPlacement(format!(
            "rect [{}, {}, {}, {}] extends beyond page {}",
            placement.x, placement.y, placement.width, placement.height, placement.page
        )));
    }

    if let OverlayKind::Text { text, font_size } = &placement.kind {
        if text.trim().is_empty() {
            return Err(PdfError::InvalidPlacement(
                "text overlay must not be empty".to_string(),
            ));
        }
        if *font_size <= 0.0 {
            return Err(PdfError::InvalidPlacement(
                "font size must be positive".to_string(),
            ));
        }
    }
    Ok(())
}

fn overlay_operations(
    doc: &mut Document,
    page_id: ObjectId,
    placement: &Placement,
) -> Result<Vec<Operation>, PdfError> {
    match &placement.kind {
        OverlayKind::Text { text, font_size } => {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            });
            let font_name = format!("NtF{}", font_id.0);
            insert_resource(doc, page_id, "Font", &font_name, font_id.into())?;

            let baseline = placement.y + ((placement.height - font_size) / 2.0).max(0.0);
            Ok(vec![
                Operation::new("q", vec![]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(font_name.into_bytes()), number(*font_size)],
                ),
                Operation::new("rg", vec![number(0.0), number(0.0), number(0.0)]),
                Operation::new("Td", vec![number(placement.x), number(baseline)]),
                Operation::new("Tj", vec![Object::string_literal(to_pdf_text(text))]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ])
        }
        OverlayKind::Image { png } => {
            let image_id = embed_png(doc, png)?;
            let image_name = format!("NtIm{}", image_id.0);
            insert_resource(doc, page_id, "XObject", &image_name, image_id.into())?;

            Ok(vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        number(placement.width),
                        number(0.0),
                        number(0.0),
                        number(placement.height),
                        number(placement.x),
                        number(placement.y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(image_name.into_bytes())]),
                Operation::new("Q", vec![]),
            ])
        }
    }
}

/// Wrap existing content in q/Q and append the overlay stream
fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<(), PdfError> {
    let overlay = Content { operations }
        .encode()
        .map_err(|e| PdfError::Save(e.to_string()))?;

    let existing: Vec<Object> = {
        let page = doc.get_object(page_id)?.as_dict()?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    if existing.is_empty() {
        let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));
        contents.push(overlay_id.into());
    } else {
        let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let mut tail = b"Q\n".to_vec();
        tail.extend_from_slice(&overlay);
        let close_id = doc.add_object(Stream::new(Dictionary::new(), tail));

        contents.push(open_id.into());
        contents.extend(existing);
        contents.push(close_id.into());
    }

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Give the page its own Resources entry, copying inherited resources down.
///
/// Referenced resource dictionaries are left shared; adding a uniquely named
/// entry to them cannot disturb the other pages that use them.
fn own_resources(pdf: &mut PdfDocument, page_id: ObjectId) -> Result<(), PdfError> {
    let has_own = pdf
        .doc()
        .get_object(page_id)?
        .as_dict()?
        .has(b"Resources");
    if has_own {
        return Ok(());
    }

    let inherited = match pdf.inherited_attribute(page_id, b"Resources")? {
        Some(obj) => pdf.resolve_dict(obj)?.clone(),
        None => Dictionary::new(),
    };
    pdf.doc_mut()
        .get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", Object::Dictionary(inherited));
    Ok(())
}

fn resources_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, PdfError> {
    let shared = match doc.get_object(page_id)?.as_dict()?.get(b"Resources") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    let dict = match shared {
        Some(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        None => doc
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .get_mut(b"Resources")?
            .as_dict_mut()?,
    };
    Ok(dict)
}

fn insert_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    value: Object,
) -> Result<(), PdfError> {
    let category_ref = {
        let resources = resources_mut(doc, page_id)?;
        match resources.get(category.as_bytes()) {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(Object::Dictionary(_)) => None,
            _ => {
                resources.set(category, Dictionary::new());
                None
            }
        }
    };

    let target = match category_ref {
        Some(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        None => resources_mut(doc, page_id)?
            .get_mut(category.as_bytes())?
            .as_dict_mut()?,
    };
    target.set(name, value);
    Ok(())
}

struct DecodedImage {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

fn decode_png(bytes: &[u8]) -> Result<DecodedImage, PdfError> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| PdfError::Image(e.to_string()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| PdfError::Image(e.to_string()))?;
    let data = &buf[..info.buffer_size()];

    let (rgb, alpha) = match info.color_type {
        png::ColorType::Rgb => (data.to_vec(), None),
        png::ColorType::Rgba => {
            let mut rgb = Vec::with_capacity(data.len() / 4 * 3);
            let mut alpha = Vec::with_capacity(data.len() / 4);
            for px in data.chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
                alpha.push(px[3]);
            }
            (rgb, Some(alpha))
        }
        png::ColorType::Grayscale => (data.iter().flat_map(|&g| [g, g, g]).collect(), None),
        png::ColorType::GrayscaleAlpha => {
            let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
            let mut alpha = Vec::with_capacity(data.len() / 2);
            for px in data.chunks_exact(2) {
                rgb.extend_from_slice(&[px[0], px[0], px[0]]);
                alpha.push(px[1]);
            }
            (rgb, Some(alpha))
        }
        other => {
            return Err(PdfError::Image(format!(
                "unsupported color type {:?}",
                other
            )))
        }
    };

    Ok(DecodedImage {
        width: info.width,
        height: info.height,
        rgb,
        alpha,
    })
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PdfError::Image(e.to_string()))?;
    encoder.finish().map_err(|e| PdfError::Image(e.to_string()))
}

/// Add the PNG as an image XObject (with soft mask for alpha)
fn embed_png(doc: &mut Document, png: &[u8]) -> Result<ObjectId, PdfError> {
    let image = decode_png(png)?;

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    if let Some(alpha) = &image.alpha {
        let mask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(alpha)?,
        ));
        image_dict.set("SMask", mask_id);
    }

    Ok(doc.add_object(Stream::new(image_dict, deflate(&image.rgb)?)))
}
