use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::edges::canny;
use imageproc::geometric_transformations::{Interpolation, Projection, warp};
use imageproc::point::Point;
use imageproc::rect::Rect;
use thiserror::Error;

use crate::imaging::{
    Contour, bounding_rect, contour_area, crop, dilate_rect, external_contours, extremities,
};
use crate::model::BoundingBox;

pub const COLUMN_COUNT: usize = 3;
pub const SEPARATOR_COUNT: usize = 2;

/// Pixel thresholds for locating the index columns on a scanned page.
///
/// The defaults were calibrated on 300 DPI scans of the Challenger summary
/// index and scale with source resolution.
#[derive(Debug, Clone)]
pub struct GeometryParams {
    pub margin_top: u32,
    pub margin_bottom: u32,
    pub margin_left: u32,
    pub margin_right: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Fuses the body text into one blob.
    pub text_kernel: (u32, u32),
    /// Keeps vertical gutters and rules apart while joining column text.
    pub separator_kernel: (u32, u32),
    /// Rows dropped from the bottom of the text region before the separator
    /// search, so footer text cannot bridge two columns.
    pub bottom_strip: u32,
    pub min_non_column_contours: usize,
    /// Trimmed after every cut to remove rule-line residue.
    pub column_cut_margin: u32,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            margin_top: 350,
            margin_bottom: 350,
            margin_left: 200,
            margin_right: 150,
            canny_low: 100.0,
            canny_high: 200.0,
            text_kernel: (65, 20),
            separator_kernel: (1, 30),
            bottom_strip: 100,
            min_non_column_contours: 3,
            column_cut_margin: 10,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("page {width}x{height} is smaller than the configured margins")]
    PageTooSmall { width: u32, height: u32 },
    #[error("no text region found on page")]
    NoTextRegion,
    #[error("expected at least {expected} column contours, found {found}")]
    TooFewColumns { expected: usize, found: usize },
    #[error("expected at least {expected} non-column contours, found {found}")]
    TooFewSeparators { expected: usize, found: usize },
    #[error("separator cuts at x={left} and x={right} leave an empty column (width {width})")]
    DegenerateColumns { left: i32, right: i32, width: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparatorLine {
    pub top: Point<i32>,
    pub bottom: Point<i32>,
}

impl SeparatorLine {
    // Degrees from vertical; positive when the bottom end leans left.
    pub fn skew_degrees(&self) -> f64 {
        let dx = f64::from(self.bottom.x - self.top.x);
        let dy = f64::from(self.bottom.y - self.top.y);
        dy.atan2(dx).to_degrees() - 90.0
    }

    pub fn cut_x(&self) -> i32 {
        self.top.x.max(self.bottom.x)
    }
}

// 2x3 affine matrix of a rotation by `angle_degrees` (counter-clockwise on
// screen) about `center`, matching the usual image-library convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    matrix: [[f64; 3]; 2],
}

impl Rotation {
    pub fn about(center: (f64, f64), angle_degrees: f64) -> Self {
        let (sin, cos) = angle_degrees.to_radians().sin_cos();
        let (cx, cy) = center;
        Self {
            matrix: [
                [cos, sin, (1.0 - cos) * cx - sin * cy],
                [-sin, cos, sin * cx + (1.0 - cos) * cy],
            ],
        }
    }

    pub fn apply(&self, point: Point<i32>) -> Point<i32> {
        let (x, y) = (f64::from(point.x), f64::from(point.y));
        let [row_x, row_y] = self.matrix;
        Point::new(
            (row_x[0] * x + row_x[1] * y + row_x[2]) as i32,
            (row_y[0] * x + row_y[1] * y + row_y[2]) as i32,
        )
    }

    pub fn warp(&self, image: &GrayImage) -> GrayImage {
        let [row_x, row_y] = self.matrix;
        let projection = Projection::from_matrix([
            row_x[0] as f32,
            row_x[1] as f32,
            row_x[2] as f32,
            row_y[0] as f32,
            row_y[1] as f32,
            row_y[2] as f32,
            0.0,
            0.0,
            1.0,
        ]);
        match projection {
            Some(projection) => warp(image, &projection, Interpolation::Bilinear, Luma([255])),
            None => image.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageLayout {
    pub text_region: BoundingBox,
    pub rotation_degrees: f64,
    pub separators: [SeparatorLine; SEPARATOR_COUNT],
    pub rotated: GrayImage,
    pub columns: Vec<GrayImage>,
}

pub fn segment_page(page: &GrayImage, params: &GeometryParams) -> Result<PageLayout, GeometryError> {
    let (width, height) = page.dimensions();
    if width <= params.margin_left + params.margin_right
        || height <= params.margin_top + params.margin_bottom
    {
        return Err(GeometryError::PageTooSmall { width, height });
    }

    let page_body = crop(
        page,
        BoundingBox::new(
            params.margin_left,
            params.margin_top,
            width - params.margin_left - params.margin_right,
            height - params.margin_top - params.margin_bottom,
        ),
    );

    let text_region = locate_text_region(&page_body, params)?;
    let text = crop(&page_body, text_region);

    let raw_separators = find_separators(&text, params)?;
    let rotation_degrees = raw_separators
        .iter()
        .map(SeparatorLine::skew_degrees)
        .sum::<f64>()
        / raw_separators.len() as f64;

    let (text_width, text_height) = text.dimensions();
    let rotation = Rotation::about(
        (f64::from(text_width / 2), f64::from(text_height / 2)),
        rotation_degrees,
    );
    let rotated = rotation.warp(&text);

    let mut separators = raw_separators.map(|line| SeparatorLine {
        top: rotation.apply(line.top),
        bottom: rotation.apply(line.bottom),
    });
    separators.sort_by_key(|line| (line.top.x, line.bottom.x));

    let columns = cut_columns(&rotated, &separators, params.column_cut_margin)?;

    Ok(PageLayout {
        text_region: BoundingBox::new(
            text_region.x + params.margin_left,
            text_region.y + params.margin_top,
            text_region.width,
            text_region.height,
        ),
        rotation_degrees,
        separators,
        rotated,
        columns,
    })
}

fn locate_text_region(body: &GrayImage, params: &GeometryParams) -> Result<BoundingBox, GeometryError> {
    let edges = canny(body, params.canny_low, params.canny_high);
    let (kernel_width, kernel_height) = params.text_kernel;
    let blobs = external_contours(&dilate_rect(&edges, kernel_width, kernel_height));

    let mut largest: Option<(&Contour, f64)> = None;
    for contour in &blobs {
        let area = contour_area(contour);
        if largest.is_none_or(|(_, best)| area > best) {
            largest = Some((contour, area));
        }
    }

    largest
        .map(|(contour, _)| bounding_rect(contour))
        .filter(|region| region.width > 0 && region.height > 0)
        .ok_or(GeometryError::NoTextRegion)
}

fn find_separators(
    text: &GrayImage,
    params: &GeometryParams,
) -> Result<[SeparatorLine; SEPARATOR_COUNT], GeometryError> {
    let edges = canny(text, params.canny_low, params.canny_high);
    let (kernel_width, kernel_height) = params.separator_kernel;
    let dilated = dilate_rect(&edges, kernel_width, kernel_height);

    let (width, height) = dilated.dimensions();
    let search_height = height.saturating_sub(params.bottom_strip);
    let mut contours = if search_height == 0 {
        Vec::new()
    } else {
        external_contours(&crop(&dilated, BoundingBox::new(0, 0, width, search_height)))
    };

    if contours.len() < COLUMN_COUNT {
        return Err(GeometryError::TooFewColumns {
            expected: COLUMN_COUNT,
            found: contours.len(),
        });
    }

    contours.sort_by(|a, b| contour_area(b).total_cmp(&contour_area(a)));
    let mut candidates = contours.split_off(COLUMN_COUNT);

    let required = params.min_non_column_contours.max(SEPARATOR_COUNT);
    if candidates.len() < required {
        return Err(GeometryError::TooFewSeparators {
            expected: required,
            found: candidates.len(),
        });
    }

    candidates.sort_by_key(|contour| std::cmp::Reverse(bounding_rect(contour).height));

    let mut lines = Vec::with_capacity(SEPARATOR_COUNT);
    for contour in candidates.iter().take(SEPARATOR_COUNT) {
        if let Some(ends) = extremities(contour) {
            lines.push(SeparatorLine {
                top: ends.topmost,
                bottom: ends.bottommost,
            });
        }
    }

    let found = lines.len();
    lines.try_into().map_err(|_| GeometryError::TooFewSeparators {
        expected: SEPARATOR_COUNT,
        found,
    })
}

fn cut_columns(
    rotated: &GrayImage,
    separators: &[SeparatorLine; SEPARATOR_COUNT],
    margin: u32,
) -> Result<Vec<GrayImage>, GeometryError> {
    let (width, height) = rotated.dimensions();
    let [left, right] = separators;
    let clamp = |x: i64| x.clamp(0, i64::from(width)) as u32;

    let margin = i64::from(margin);
    let left_cut = i64::from(left.cut_x());
    let right_cut = i64::from(right.cut_x());
    let spans = [
        (margin, left_cut),
        (left_cut + margin, right_cut),
        (right_cut + margin, i64::from(width)),
    ];

    let mut columns = Vec::with_capacity(COLUMN_COUNT);
    for (start, end) in spans {
        let (start, end) = (clamp(start), clamp(end));
        if start >= end {
            return Err(GeometryError::DegenerateColumns {
                left: left.cut_x(),
                right: right.cut_x(),
                width,
            });
        }
        columns.push(crop(rotated, BoundingBox::new(start, 0, end - start, height)));
    }

    Ok(columns)
}

pub fn draw_layout(layout: &PageLayout) -> RgbImage {
    let mut canvas = image::DynamicImage::ImageLuma8(layout.rotated.clone()).to_rgb8();
    let (width, height) = canvas.dimensions();

    draw_hollow_rect_mut(
        &mut canvas,
        Rect::at(0, 0).of_size(width.max(1), height.max(1)),
        Rgb([255, 0, 0]),
    );
    for line in &layout.separators {
        draw_line_segment_mut(
            &mut canvas,
            (line.top.x as f32, line.top.y as f32),
            (line.bottom.x as f32, line.bottom.y as f32),
            Rgb([0, 200, 0]),
        );
        for point in [line.top, line.bottom] {
            draw_filled_circle_mut(&mut canvas, (point.x, point.y), 15, Rgb([0, 0, 255]));
        }
    }

    canvas
}

#[cfg(test)]
mod tests;
