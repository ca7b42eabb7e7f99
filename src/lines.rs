use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::edges::canny;
use imageproc::filter::median_filter;
use imageproc::rect::Rect;

use crate::imaging::{bounding_rect, column_sums, crop, dilate_rect, external_contours};
use crate::model::{BoundingBox, LineRole};

#[derive(Debug, Clone)]
pub struct LineParams {
    pub denoise_radius: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Edge energy (sum of 0/255 edge pixels in one image column) marking the
    /// first column of text.
    pub start_edge_threshold: u32,
    /// The line-merging kernel is `width / kernel_width_divisor` wide.
    pub kernel_width_divisor: u32,
    /// Only the left `width / search_width_divisor` pixels are searched for lines.
    pub search_width_divisor: u32,
    /// Noise floor, applied after padding.
    pub min_line_height: u32,
    pub pad_top: u32,
    pub pad_height: u32,
    /// A box starting at or left of `start_column * num / den` is a genus entry.
    pub indent_ratio: (u32, u32),
}

impl Default for LineParams {
    fn default() -> Self {
        Self {
            denoise_radius: 1,
            canny_low: 100.0,
            canny_high: 200.0,
            start_edge_threshold: 2000,
            kernel_width_divisor: 5,
            search_width_divisor: 2,
            min_line_height: 10,
            pad_top: 2,
            pad_height: 2,
            indent_ratio: (2, 3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCandidate {
    /// 1-based position among every blob found in the column, noise included.
    pub line: usize,
    pub bounding_box: BoundingBox,
    pub role: LineRole,
}

#[derive(Debug, Clone)]
pub struct ColumnLines {
    pub denoised: GrayImage,
    pub start_column: u32,
    pub lines: Vec<LineCandidate>,
}

impl ColumnLines {
    // Full-width band so a clipped blob never cuts off trailing page numbers.
    pub fn line_image(&self, candidate: &LineCandidate) -> GrayImage {
        let bbox = candidate.bounding_box;
        crop(
            &self.denoised,
            BoundingBox::new(0, bbox.y, self.denoised.width(), bbox.height),
        )
    }
}

pub fn extract_lines(column: &GrayImage, params: &LineParams) -> ColumnLines {
    let denoised = if params.denoise_radius == 0 {
        column.clone()
    } else {
        median_filter(column, params.denoise_radius, params.denoise_radius)
    };
    let edges = canny(&denoised, params.canny_low, params.canny_high);

    let start_column = column_sums(&edges)
        .iter()
        .position(|&sum| sum > params.start_edge_threshold)
        .unwrap_or(0) as u32;

    let (width, height) = edges.dimensions();
    let kernel_width = (width / params.kernel_width_divisor.max(1)).max(1);
    let dilated = dilate_rect(&edges, kernel_width, 1);
    let search_width = width / params.search_width_divisor.max(1);

    let mut boxes: Vec<BoundingBox> = if search_width == 0 || height == 0 {
        Vec::new()
    } else {
        external_contours(&crop(&dilated, BoundingBox::new(0, 0, search_width, height)))
            .iter()
            .map(|contour| bounding_rect(contour))
            .collect()
    };
    boxes.sort_by_key(|bbox| bbox.y);

    let (numerator, denominator) = params.indent_ratio;
    let indent_limit = numerator * start_column / denominator.max(1);

    let mut lines = Vec::new();
    for (index, bbox) in boxes.into_iter().enumerate() {
        let padded = BoundingBox::new(
            bbox.x,
            bbox.y.saturating_sub(params.pad_top),
            bbox.width,
            bbox.height + params.pad_height,
        );
        if padded.height < params.min_line_height {
            continue;
        }

        let role = if padded.x <= indent_limit {
            LineRole::Genus
        } else {
            LineRole::Species
        };
        lines.push(LineCandidate {
            line: index + 1,
            bounding_box: padded,
            role,
        });
    }

    ColumnLines {
        denoised,
        start_column,
        lines,
    }
}

pub fn draw_line_overlay(column: &ColumnLines) -> RgbImage {
    let mut canvas = image::DynamicImage::ImageLuma8(column.denoised.clone()).to_rgb8();
    for candidate in &column.lines {
        let bbox = candidate.bounding_box;
        let color = match candidate.role {
            LineRole::Genus => Rgb([255, 0, 0]),
            LineRole::Species => Rgb([0, 255, 0]),
        };
        draw_hollow_rect_mut(
            &mut canvas,
            Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width.max(1), bbox.height.max(1)),
            color,
        );
    }
    canvas
}
