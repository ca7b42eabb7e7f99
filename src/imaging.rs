use image::{GrayImage, Luma, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;

use crate::model::BoundingBox;

pub type Contour = Vec<Point<i32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extremities {
    pub leftmost: Point<i32>,
    pub topmost: Point<i32>,
    pub bottommost: Point<i32>,
    pub rightmost: Point<i32>,
}

// Binary dilation with a `kernel_width` x `kernel_height` rectangle anchored at
// the kernel centre. Any non-zero pixel counts as foreground; output is 0/255.
// The rectangle is separable, so it runs as a row pass then a column pass.
pub fn dilate_rect(image: &GrayImage, kernel_width: u32, kernel_height: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut horizontal = GrayImage::new(width, height);
    for y in 0..height {
        let row: Vec<bool> = (0..width).map(|x| image.get_pixel(x, y)[0] > 0).collect();
        for (x, set) in dilate_run(&row, kernel_width).into_iter().enumerate() {
            if set {
                horizontal.put_pixel(x as u32, y, Luma([255]));
            }
        }
    }

    let mut output = GrayImage::new(width, height);
    for x in 0..width {
        let column: Vec<bool> = (0..height)
            .map(|y| horizontal.get_pixel(x, y)[0] > 0)
            .collect();
        for (y, set) in dilate_run(&column, kernel_height).into_iter().enumerate() {
            if set {
                output.put_pixel(x, y as u32, Luma([255]));
            }
        }
    }

    output
}

fn dilate_run(values: &[bool], kernel: u32) -> Vec<bool> {
    let kernel = i64::from(kernel.max(1));
    let anchor = kernel / 2;
    let len = values.len() as i64;

    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0_u32);
    for &value in values {
        let last = prefix.last().copied().unwrap_or(0);
        prefix.push(last + u32::from(value));
    }

    (0..len)
        .map(|position| {
            let start = (position - anchor).clamp(0, len) as usize;
            let end = (position - anchor + kernel).clamp(0, len) as usize;
            prefix[end] > prefix[start]
        })
        .collect()
}

// Outermost borders only, the equivalent of an external-retrieval contour pass.
// The image is traced inside a one pixel background frame so that blobs
// touching the image edge still report an outer border.
pub fn external_contours(image: &GrayImage) -> Vec<Contour> {
    let (width, height) = image.dimensions();
    let mut framed = GrayImage::new(width + 2, height + 2);
    imageops::replace(&mut framed, image, 1, 1);

    find_contours::<i32>(&framed)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .map(|contour| {
            contour
                .points
                .into_iter()
                .map(|point| Point::new(point.x - 1, point.y - 1))
                .collect::<Contour>()
        })
        .filter(|points| !points.is_empty())
        .collect()
}

pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let doubled: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    doubled.abs() as f64 / 2.0
}

pub fn bounding_rect(points: &[Point<i32>]) -> BoundingBox {
    let Some(first) = points.first() else {
        return BoundingBox::default();
    };

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    BoundingBox::new(
        min_x.max(0) as u32,
        min_y.max(0) as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    )
}

// Ties resolve to the earliest point along the contour.
pub fn extremities(points: &[Point<i32>]) -> Option<Extremities> {
    Some(Extremities {
        leftmost: *points.iter().min_by_key(|point| point.x)?,
        topmost: *points.iter().min_by_key(|point| point.y)?,
        bottommost: *points.iter().rev().max_by_key(|point| point.y)?,
        rightmost: *points.iter().rev().max_by_key(|point| point.x)?,
    })
}

pub fn crop(image: &GrayImage, region: BoundingBox) -> GrayImage {
    let (width, height) = image.dimensions();
    let x = region.x.min(width);
    let y = region.y.min(height);
    let w = region.width.min(width - x);
    let h = region.height.min(height - y);
    imageops::crop_imm(image, x, y, w, h).to_image()
}

pub fn column_sums(image: &GrayImage) -> Vec<u32> {
    let (width, _) = image.dimensions();
    let mut sums = vec![0_u32; width as usize];
    for (x, _, pixel) in image.enumerate_pixels() {
        sums[x as usize] += u32::from(pixel[0]);
    }
    sums
}
