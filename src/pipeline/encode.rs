//! Image encoding: page PNG → base64 wrapped in `ImageData`.
//!
//! VLM APIs (OpenAI, Anthropic, Gemini) accept images as base64 data-URIs
//! embedded in the JSON request body. The rasteriser already wrote lossless
//! PNGs, so the file bytes are forwarded unchanged; re-encoding would only
//! cost time.

use crate::pipeline::render::PageArtifact;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap PNG bytes for a multimodal request.
///
/// `detail: "high"` keeps small print legible on providers that tile images.
pub fn encode_png(bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}

/// Read a rendered page from disk and encode it.
pub async fn encode_page(page: &PageArtifact) -> std::io::Result<ImageData> {
    let bytes = tokio::fs::read(&page.path).await?;
    Ok(encode_png(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn encode_rendered_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page_0001.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let data = encode_page(&PageArtifact { page_num: 1, path })
            .await
            .expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[tokio::test]
    async fn missing_page_file_is_an_io_error() {
        let page = PageArtifact {
            page_num: 3,
            path: "/nonexistent/page_0003.png".into(),
        };
        assert!(encode_page(&page).await.is_err());
    }
}
