//! PDF rasterisation: render selected pages to PNG files via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why files, not images in memory?
//!
//! A 300-page book at 200 DPI is several gigabytes of decoded bitmaps. The
//! orchestrator rasterises one batch at a time into a work directory and
//! deletes each PNG as soon as its page is extracted, so disk and memory
//! stay bounded by the batch size.

use crate::error::Pdf2EpubError;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A rendered page image waiting for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArtifact {
    /// 1-indexed document page.
    pub page_num: usize,
    pub path: PathBuf,
}

/// What the rasteriser can tell about a document without rendering it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub page_count: usize,
}

/// Turns source pages into page images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Open the document and read its metadata. Fails if the source is unreadable.
    async fn document_info(&self, source: &Path) -> Result<DocumentInfo, Pdf2EpubError>;

    async fn page_count(&self, source: &Path) -> Result<usize, Pdf2EpubError> {
        Ok(self.document_info(source).await?.page_count)
    }

    /// Render `pages` (1-indexed) at `dpi` into `work_dir`, in the given order.
    async fn rasterize(
        &self,
        source: &Path,
        dpi: u32,
        pages: &[usize],
        work_dir: &Path,
    ) -> Result<Vec<PageArtifact>, Pdf2EpubError>;
}

/// Production rasteriser backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    /// Cap on the longest rendered edge in pixels.
    pub max_rendered_pixels: u32,
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 3000,
        }
    }
}

impl PdfiumRasterizer {
    pub fn new(max_rendered_pixels: u32) -> Self {
        Self {
            max_rendered_pixels,
        }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn document_info(&self, source: &Path) -> Result<DocumentInfo, Pdf2EpubError> {
        let path = source.to_path_buf();
        tokio::task::spawn_blocking(move || document_info_blocking(&path))
            .await
            .map_err(|e| Pdf2EpubError::Internal(format!("Metadata task panicked: {}", e)))?
    }

    async fn rasterize(
        &self,
        source: &Path,
        dpi: u32,
        pages: &[usize],
        work_dir: &Path,
    ) -> Result<Vec<PageArtifact>, Pdf2EpubError> {
        let path = source.to_path_buf();
        let out_dir = work_dir.to_path_buf();
        let pages = pages.to_vec();
        let max_pixels = self.max_rendered_pixels;

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(&path, dpi, max_pixels, &pages, &out_dir)
        })
        .await
        .map_err(|e| Pdf2EpubError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Bind pdfium: `PDFIUM_LIB_PATH` first, then the system library.
fn bind_pdfium() -> Result<Pdfium, Pdf2EpubError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(lib) if !lib.is_empty() => Pdfium::bind_to_library(Path::new(&lib)),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Pdf2EpubError::RasterisationFailed {
        page: 0,
        detail: format!(
            "could not load the pdfium library ({e}).\n\
Install libpdfium or set PDFIUM_LIB_PATH=/path/to/libpdfium"
        ),
    })?;
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(pdfium: &'a Pdfium, pdf_path: &Path) -> Result<PdfDocument<'a>, Pdf2EpubError> {
    pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| Pdf2EpubError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    pages_wanted: &[usize],
    out_dir: &Path,
) -> Result<Vec<PageArtifact>, Pdf2EpubError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut artifacts = Vec::with_capacity(pages_wanted.len());

    for &page_num in pages_wanted {
        if page_num == 0 || page_num > total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                page_num, total_pages
            );
            continue;
        }

        let page = pages
            .get((page_num - 1) as u16)
            .map_err(|e| Pdf2EpubError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            Pdf2EpubError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            }
        })?;

        let img = bitmap.as_image();
        let path = out_dir.join(format!("page_{:04}.png", page_num));
        img.save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| Pdf2EpubError::RasterisationFailed {
                page: page_num,
                detail: format!("could not write {}: {}", path.display(), e),
            })?;

        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            img.width(),
            img.height()
        );
        artifacts.push(PageArtifact { page_num, path });
    }

    info!("Rasterised {} pages at {} DPI", artifacts.len(), dpi);
    Ok(artifacts)
}

fn document_info_blocking(pdf_path: &Path) -> Result<DocumentInfo, Pdf2EpubError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    let info = DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        page_count: document.pages().len() as usize,
    };
    info!("PDF loaded: {} pages", info.page_count);
    Ok(info)
}
