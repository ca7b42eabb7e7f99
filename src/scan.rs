use image::GrayImage;
use tracing::{debug, info, warn};

use crate::assembler::{IndexAssembler, LineOrigin};
use crate::classify::LineClassifier;
use crate::geometry::{GeometryError, GeometryParams, PageLayout, segment_page};
use crate::lines::{ColumnLines, LineParams, extract_lines};
use crate::ocr::LineRecognizer;

pub struct PageScanner<'a> {
    pub classifier: &'a LineClassifier,
    pub recognizer: &'a dyn LineRecognizer,
    pub geometry: GeometryParams,
    pub lines: LineParams,
}

pub struct ScannedPage {
    pub layout: PageLayout,
    pub columns: Vec<ColumnLines>,
    pub lines_read: usize,
}

impl PageScanner<'_> {
    /// Reads one page into the assembler, column by column and top to bottom.
    ///
    /// `dispatch` receives every name the assembler wants verified. A page
    /// whose geometry cannot be recovered contributes nothing.
    pub fn scan_page(
        &self,
        page: u32,
        image: &GrayImage,
        assembler: &mut IndexAssembler,
        dispatch: &mut dyn FnMut(String),
    ) -> Result<ScannedPage, GeometryError> {
        let layout = segment_page(image, &self.geometry)?;
        info!(
            page,
            rotation = layout.rotation_degrees,
            region = ?layout.text_region,
            "page segmented"
        );

        let mut columns = Vec::with_capacity(layout.columns.len());
        let mut lines_read = 0;
        for (index, column_image) in layout.columns.iter().enumerate() {
            let column = (index + 1) as u8;
            let found = extract_lines(column_image, &self.lines);
            info!(
                page,
                column,
                lines = found.lines.len(),
                start_column = found.start_column,
                "processing column"
            );

            for candidate in &found.lines {
                let text = match self.recognizer.recognize(&found.line_image(candidate)) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(page, column, line = candidate.line, error = %err, "ocr failed");
                        String::new()
                    }
                };
                let classified = self.classifier.classify(&text, candidate.role);
                debug!(
                    page,
                    column,
                    line = candidate.line,
                    text = %text,
                    line_type = ?classified.line_type,
                    "line read"
                );
                let origin = LineOrigin {
                    page,
                    column,
                    line: candidate.line,
                    bounding_box: candidate.bounding_box,
                };
                if let Some(name) = assembler.push(classified, candidate.role, origin) {
                    dispatch(name);
                }
                lines_read += 1;
            }

            columns.push(found);
        }

        Ok(ScannedPage {
            layout,
            columns,
            lines_read,
        })
    }
}
