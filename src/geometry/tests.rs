use image::{GrayImage, Luma};

use super::*;

fn test_params() -> GeometryParams {
    GeometryParams {
        margin_top: 10,
        margin_bottom: 10,
        margin_left: 10,
        margin_right: 10,
        canny_low: 50.0,
        canny_high: 100.0,
        text_kernel: (31, 9),
        separator_kernel: (5, 9),
        bottom_strip: 10,
        min_non_column_contours: 3,
        column_cut_margin: 2,
    }
}

fn fill(image: &mut GrayImage, x: u32, y: u32, width: u32, height: u32) {
    for yy in y..y + height {
        for xx in x..x + width {
            image.put_pixel(xx, yy, Luma([0]));
        }
    }
}

// Three columns of text bars split by two rules. The optional mark in the
// first gutter is the third non-column contour.
fn index_page(with_mark: bool) -> GrayImage {
    let mut page = GrayImage::from_pixel(420, 300, Luma([255]));
    for column_x in [40, 170, 300] {
        let mut y = 40;
        while y < 250 {
            fill(&mut page, column_x, y, 70, 6);
            y += 12;
        }
    }
    fill(&mut page, 140, 36, 2, 218);
    fill(&mut page, 270, 36, 2, 218);
    if with_mark {
        fill(&mut page, 124, 100, 3, 4);
    }
    page
}

fn longest_dark_run(image: &GrayImage, y: u32) -> u32 {
    let (mut longest, mut current) = (0, 0);
    for x in 0..image.width() {
        if image.get_pixel(x, y)[0] < 128 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn assert_single_text_column(column: &GrayImage) {
    let runs: Vec<u32> = (0..column.height())
        .map(|y| longest_dark_run(column, y))
        .collect();
    let text_rows = runs.iter().filter(|&&run| run >= 50).count();
    let widest = runs.iter().copied().max().unwrap_or(0);

    assert!(text_rows >= 90, "only {text_rows} rows of text in column");
    assert!(widest <= 80, "column holds a {widest}px dark run");
}

#[test]
fn segment_page_splits_three_columns() {
    let layout = segment_page(&index_page(true), &test_params()).unwrap();

    assert_eq!(layout.columns.len(), COLUMN_COUNT);
    assert!(layout.rotation_degrees.abs() < 0.5);
    assert!(layout.separators[0].cut_x() < layout.separators[1].cut_x());
    for column in &layout.columns {
        assert!(column.width() > 40, "column too narrow: {}", column.width());
        assert_eq!(column.height(), layout.rotated.height());
        assert_single_text_column(column);
    }
}

#[test]
fn skewed_page_is_straightened_before_cutting() {
    for lean in [3.0, -2.0] {
        let page = Rotation::about((210.0, 150.0), lean).warp(&index_page(true));
        let layout = segment_page(&page, &test_params()).unwrap();

        assert!(
            (layout.rotation_degrees + lean).abs() < 0.75,
            "lean {lean} measured as {}",
            layout.rotation_degrees
        );
        for separator in &layout.separators {
            assert!(
                (separator.top.x - separator.bottom.x).abs() <= 1,
                "separator {separator:?} still leans at {lean}"
            );
        }
        assert_eq!(layout.columns.len(), COLUMN_COUNT);
        for column in &layout.columns {
            assert_single_text_column(column);
        }
    }
}

#[test]
fn column_touching_the_text_region_edge_is_still_counted() {
    let layout = segment_page(&index_page(true), &test_params()).unwrap();
    let first_cut = layout.separators[0].cut_x();

    assert!(first_cut > 60, "first column lost, cut at {first_cut}");
    assert_single_text_column(&layout.columns[0]);
}

#[test]
fn page_without_spare_contours_is_rejected() {
    let error = segment_page(&index_page(false), &test_params()).unwrap_err();
    assert_eq!(
        error,
        GeometryError::TooFewSeparators {
            expected: 3,
            found: 2
        }
    );
}

#[test]
fn blank_page_has_no_text_region() {
    let page = GrayImage::from_pixel(200, 200, Luma([255]));
    assert_eq!(
        segment_page(&page, &test_params()).unwrap_err(),
        GeometryError::NoTextRegion
    );
}

#[test]
fn single_block_page_has_too_few_columns() {
    let mut page = GrayImage::from_pixel(200, 200, Luma([255]));
    fill(&mut page, 50, 50, 80, 80);
    let error = segment_page(&page, &test_params()).unwrap_err();
    assert!(matches!(error, GeometryError::TooFewColumns { expected: 3, .. }));
}

#[test]
fn page_smaller_than_margins_is_rejected() {
    let page = GrayImage::from_pixel(300, 600, Luma([255]));
    assert_eq!(
        segment_page(&page, &GeometryParams::default()).unwrap_err(),
        GeometryError::PageTooSmall {
            width: 300,
            height: 600
        }
    );
}

#[test]
fn vertical_separator_has_no_skew() {
    let line = SeparatorLine {
        top: Point::new(100, 0),
        bottom: Point::new(100, 100),
    };
    assert!(line.skew_degrees().abs() < 1e-9);
    assert_eq!(line.cut_x(), 100);
}

#[test]
fn separator_leaning_left_at_the_bottom_has_positive_skew() {
    let line = SeparatorLine {
        top: Point::new(100, 0),
        bottom: Point::new(90, 100),
    };
    let skew = line.skew_degrees();
    assert!((skew - 5.7106).abs() < 1e-3, "skew was {skew}");
    assert_eq!(line.cut_x(), 100);
}

#[test]
fn rotation_maps_points_counter_clockwise_on_screen() {
    let identity = Rotation::about((50.0, 50.0), 0.0);
    assert_eq!(identity.apply(Point::new(7, 9)), Point::new(7, 9));

    let quarter = Rotation::about((0.0, 0.0), 90.0);
    assert_eq!(quarter.apply(Point::new(10, 0)), Point::new(0, -10));
}

#[test]
fn rotation_straightens_a_leaning_separator() {
    let line = SeparatorLine {
        top: Point::new(100, 0),
        bottom: Point::new(90, 100),
    };
    let rotation = Rotation::about((100.0, 50.0), line.skew_degrees());
    let top = rotation.apply(line.top);
    let bottom = rotation.apply(line.bottom);
    assert!((top.x - bottom.x).abs() <= 1, "top {top:?} bottom {bottom:?}");
}

#[test]
fn warp_keeps_dimensions_and_fills_with_white() {
    let image = GrayImage::from_pixel(40, 20, Luma([0]));
    let rotated = Rotation::about((20.0, 10.0), 30.0).warp(&image);

    assert_eq!(rotated.dimensions(), (40, 20));
    assert_eq!(rotated.get_pixel(0, 0)[0], 255);
}

#[test]
fn degenerate_cuts_are_rejected() {
    let image = GrayImage::from_pixel(100, 10, Luma([255]));
    let separators = [
        SeparatorLine {
            top: Point::new(60, 0),
            bottom: Point::new(60, 9),
        },
        SeparatorLine {
            top: Point::new(61, 0),
            bottom: Point::new(61, 9),
        },
    ];
    assert!(matches!(
        cut_columns(&image, &separators, 10),
        Err(GeometryError::DegenerateColumns { .. })
    ));
}
