use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat, Luma, RgbaImage};
use log::warn;
use qrcode::{EcLevel, QrCode};

const MIN_CODE_DIMENSIONS: u32 = 300;

/// Renders an entity reference into a scannable JPEG. When a ticket
/// template image is configured and loadable, the code is composited onto
/// its center; otherwise the bare code is returned.
pub struct QrGenerator {
    ticket_template: Option<PathBuf>,
}

impl QrGenerator {
    pub fn new(ticket_template: Option<PathBuf>) -> Self {
        Self { ticket_template }
    }

    pub fn generate(&self, reference: &str) -> Result<Vec<u8>, String> {
        let code = QrCode::with_error_correction_level(reference.as_bytes(), EcLevel::H)
            .map_err(|e| format!("Failed to encode QR payload: {}", e))?;

        let code_image = code
            .render::<Luma<u8>>()
            .min_dimensions(MIN_CODE_DIMENSIONS, MIN_CODE_DIMENSIONS)
            .build();
        let code_rgba = DynamicImage::ImageLuma8(code_image).to_rgba8();

        let composed = match self.load_template() {
            Some(template) => composite_centered(template, &code_rgba),
            None => code_rgba,
        };

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(composed).to_rgb8())
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .map_err(|e| format!("Failed to encode QR image: {}", e))?;

        Ok(buffer.into_inner())
    }

    fn load_template(&self) -> Option<RgbaImage> {
        let path = self.ticket_template.as_ref()?;
        match image::open(path) {
            Ok(template) => Some(template.to_rgba8()),
            Err(e) => {
                warn!("Ticket template not usable at {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn composite_centered(mut template: RgbaImage, code: &RgbaImage) -> RgbaImage {
    if template.width() < code.width() || template.height() < code.height() {
        warn!(
            "Ticket template {}x{} smaller than code {}x{}, using bare code",
            template.width(),
            template.height(),
            code.width(),
            code.height()
        );
        return code.clone();
    }

    let x = i64::from((template.width() - code.width()) / 2);
    let y = i64::from((template.height() - code.height()) / 2);
    image::imageops::overlay(&mut template, code, x, y);
    template
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_reference_yields_same_bytes() {
        let generator = QrGenerator::new(None);
        let first = generator.generate("p_42").unwrap();
        let second = generator.generate("p_42").unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_references_differ() {
        let generator = QrGenerator::new(None);
        assert_ne!(
            generator.generate("p_42").unwrap(),
            generator.generate("t_42").unwrap()
        );
    }

    #[test]
    fn missing_template_falls_back_to_bare_code() {
        let bare = QrGenerator::new(None).generate("t_9").unwrap();
        let fallback = QrGenerator::new(Some(PathBuf::from("/nonexistent/ticket.png")))
            .generate("t_9")
            .unwrap();

        assert_eq!(bare, fallback);
    }
}
