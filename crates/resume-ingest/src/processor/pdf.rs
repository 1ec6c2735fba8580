use std::io::Cursor;
use std::path::Path;
use std::process::Command;

use crate::config::ConversionConfig;
use crate::error::ConversionError;
use crate::processor::PageImage;

/// Extracts the embedded text layer of every page, in page order.
pub fn extract_text(path: &Path) -> Result<String, ConversionError> {
    let pdf_bytes = std::fs::read(path).map_err(|e| ConversionError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })?;

    let doc = lopdf::Document::load_mem(&pdf_bytes)
        .map_err(|e| ConversionError::Pdf(format!("Failed to load PDF: {}", e)))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                tracing::debug!("Skipping page {} without extractable text: {}", page_num, e);
            }
        }
    }

    Ok(text)
}

/// Renders all pages with `pdftoppm` and bounds each image to
/// `config.max_image_edge` pixels on its longest side.
pub fn rasterize(pdf_path: &Path, config: &ConversionConfig) -> Result<Vec<PageImage>, ConversionError> {
    let scratch = tempfile::tempdir()
        .map_err(|e| ConversionError::Rasterize(format!("Failed to create scratch dir: {}", e)))?;
    let output_prefix = scratch.path().join("page");

    let output = Command::new(&config.pdftoppm_path)
        .arg("-png")
        .arg("-r")
        .arg(config.dpi.to_string())
        .arg(pdf_path)
        .arg(&output_prefix)
        .output()
        .map_err(|e| {
            ConversionError::Rasterize(format!(
                "Failed to run {}: {}. Make sure poppler-utils is installed.",
                config.pdftoppm_path, e
            ))
        })?;

    if !output.status.success() {
        return Err(ConversionError::Rasterize(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    // pdftoppm zero-pads the page suffix to the width of the page count.
    let mut rendered: Vec<(u32, std::path::PathBuf)> = std::fs::read_dir(scratch.path())
        .map_err(|e| ConversionError::Rasterize(format!("Failed to list rendered pages: {}", e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| page_number_of(&path).map(|n| (n, path)))
        .collect();
    rendered.sort_by_key(|(n, _)| *n);

    if rendered.is_empty() {
        return Err(ConversionError::Rasterize(
            "pdftoppm produced no pages".to_string(),
        ));
    }

    let mut pages = Vec::with_capacity(rendered.len());
    for (page_number, path) in rendered {
        let raw = std::fs::read(&path).map_err(|e| {
            ConversionError::Rasterize(format!("Failed to read rendered page: {}", e))
        })?;
        pages.push(PageImage {
            page_number,
            mime_type: "image/png",
            bytes: bound_image(&raw, config.max_image_edge)?,
        });
    }

    tracing::debug!("Rasterized {} pages", pages.len());
    Ok(pages)
}

/// Parses the page number out of a `page-<n>.png` file name.
fn page_number_of(path: &Path) -> Option<u32> {
    if path.extension().and_then(|e| e.to_str()) != Some("png") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('-')?.1.parse().ok()
}

/// Downscales a PNG so neither edge exceeds `max_edge`; smaller images pass through.
pub fn bound_image(png_bytes: &[u8], max_edge: u32) -> Result<Vec<u8>, ConversionError> {
    let img = image::load_from_memory(png_bytes)
        .map_err(|e| ConversionError::Image(format!("Failed to decode page image: {}", e)))?;

    if img.width() <= max_edge && img.height() <= max_edge {
        return Ok(png_bytes.to_vec());
    }

    let resized = img.resize(max_edge, max_edge, image::imageops::FilterType::Triangle);
    let mut buf = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ConversionError::Image(format!("Failed to encode page image: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Builds a one-page PDF whose text layer contains `text`.
    pub(crate) fn pdf_with_text(text: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.new_object_id();
        let resources_id = doc.new_object_id();
        let content_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        doc.objects.insert(
            font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Courier",
            }),
        );
        doc.objects.insert(
            resources_id,
            Object::Dictionary(dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            }),
        );

        let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
        doc.objects.insert(
            content_id,
            Object::Stream(Stream::new(dictionary! {}, content.into_bytes())),
        );
        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut pdf_bytes = Vec::new();
        doc.save_to(&mut pdf_bytes).unwrap();
        pdf_bytes
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_extract_text_from_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, pdf_with_text("Jane Doe Rust Engineer")).unwrap();

        let text = extract_text(&path).unwrap();
        assert!(text.contains("Jane Doe"), "unexpected text: {:?}", text);
    }

    #[test]
    fn test_corrupted_pdf_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a valid pdf content").unwrap();

        match extract_text(&path) {
            Err(ConversionError::Pdf(msg)) => assert!(msg.contains("Failed to load PDF")),
            other => panic!("Expected Pdf error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_pdf_error() {
        let result = extract_text(Path::new("/nonexistent/resume.pdf"));
        assert!(matches!(result, Err(ConversionError::ReadDocument { .. })));
    }

    #[test]
    fn test_rasterize_with_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, pdf_with_text("x")).unwrap();

        let config = ConversionConfig {
            pdftoppm_path: "/nonexistent/pdftoppm".to_string(),
            ..ConversionConfig::default()
        };
        assert!(matches!(
            rasterize(&path, &config),
            Err(ConversionError::Rasterize(_))
        ));
    }

    #[test]
    fn test_page_number_parsing() {
        assert_eq!(page_number_of(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_number_of(Path::new("/tmp/x/page-07.png")), Some(7));
        assert_eq!(page_number_of(Path::new("/tmp/x/page-012.png")), Some(12));
        assert_eq!(page_number_of(Path::new("/tmp/x/page-1.ppm")), None);
        assert_eq!(page_number_of(Path::new("/tmp/x/notes.png")), None);
    }

    #[test]
    fn test_bound_image_passes_small_images_through() {
        let small = png(100, 50);
        assert_eq!(bound_image(&small, 2048).unwrap(), small);
    }

    #[test]
    fn test_bound_image_downscales_large_images() {
        let large = png(400, 200);
        let bounded = bound_image(&large, 100).unwrap();
        let decoded = image::load_from_memory(&bounded).unwrap();
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 50);
    }

    #[test]
    fn test_bound_image_rejects_garbage() {
        assert!(matches!(
            bound_image(b"not an image", 100),
            Err(ConversionError::Image(_))
        ));
    }
}
