use std::path::Path;

use anyhow::{Context, Result, bail};
use image::GrayImage;
use tracing::{info, warn};

use crate::artifacts::{ArtifactPaths, save_errors, save_extra, save_index};
use crate::assembler::IndexAssembler;
use crate::classify::LineClassifier;
use crate::cli::ProcessSpeciesArgs;
use crate::commands::shared::{RunRecorder, VerificationSetup, verification_setup};
use crate::extra_info::{enrich_all, load_data_sources};
use crate::geometry::{GeometryParams, draw_layout};
use crate::http::JsonClient;
use crate::lines::{LineParams, draw_line_overlay};
use crate::model::{PageImageEntry, SpeciesExtraFile};
use crate::ocr::{TesseractLineRecognizer, tesseract_version};
use crate::scan::{PageScanner, ScannedPage};
use crate::util::{ensure_directory, sha256_file};
use crate::verification::{VerificationStore, resolve_matches};

pub fn run(args: ProcessSpeciesArgs, debug: bool) -> Result<()> {
    if args.first_page > args.last_page {
        bail!(
            "first page {} is after last page {}",
            args.first_page,
            args.last_page
        );
    }

    let paths = ArtifactPaths::new(&args.output_dir);
    ensure_directory(paths.root())?;
    if debug {
        ensure_directory(&paths.debug_dir())?;
    }

    let mut recorder = RunRecorder::start("process-species");
    recorder.counts.pages_requested = (args.last_page - args.first_page + 1) as usize;

    match tesseract_version() {
        Some(version) => info!(version = %version, lang = %args.ocr_lang, "tesseract available"),
        None => warn!("tesseract not found on PATH; every line will be recorded as an error"),
    }

    let classifier = LineClassifier::new()?;
    let recognizer = TesseractLineRecognizer::new(args.ocr_lang.clone());
    let scanner = PageScanner {
        classifier: &classifier,
        recognizer: &recognizer,
        geometry: GeometryParams::default(),
        lines: LineParams::default(),
    };

    let VerificationSetup {
        runner,
        pool,
        metadata,
    } = verification_setup(&args.verifier, &paths, VerificationStore::default())?;
    recorder.verifier_version = metadata.verifier_version.clone();

    let mut assembler = IndexAssembler::new();
    pool.in_place_scope(|scope| {
        for page in args.first_page..=args.last_page {
            let Some(image) = load_page(&args.images_dir, page, &mut recorder) else {
                recorder.counts.pages_skipped += 1;
                continue;
            };

            let outcome = scanner.scan_page(page, &image, &mut assembler, &mut |name| {
                runner.dispatch(scope, name)
            });
            match outcome {
                Ok(scanned) => {
                    recorder.counts.pages_processed += 1;
                    info!(
                        page,
                        lines = scanned.lines_read,
                        genera = assembler.genus_count(),
                        "page processed"
                    );
                    if debug {
                        dump_debug_images(&paths, page, &scanned, &mut recorder);
                    }
                }
                Err(err) => {
                    warn!(page, error = %err, "page skipped");
                    recorder.counts.pages_skipped += 1;
                    recorder.warn(format!("page {page} skipped: {err}"));
                }
            }
        }
    });
    info!(
        requests = runner.dispatched_count(),
        "all verification requests finished"
    );

    let mut index = assembler.finish();
    let unmatched = resolve_matches(&mut index.genera, runner.store());
    let verification_requests = runner.dispatched_count();
    let verified = runner.into_store().into_records();

    recorder.counts.genera = index.genera.len();
    recorder.counts.species = index.genera.iter().map(|genus| genus.species.len()).sum();
    recorder.counts.unverified_lines = index.errors.len();
    recorder.counts.dropped_lines = index.dropped_lines;
    recorder.counts.verification_requests = verification_requests;
    recorder.counts.verified_records = verified.len();
    recorder.counts.unmatched_entries = unmatched;

    save_errors(&paths, &index.errors)?;

    if args.skip_extra {
        info!("skipping extra species information");
        save_extra(&paths, &SpeciesExtraFile::default())?;
    } else {
        let sources = load_data_sources(args.extra.data_sources_path.as_deref())?;
        let client = JsonClient::new(args.verifier.timeout());
        let extra = enrich_all(&pool, &client, &sources, &verified, Default::default(), false);
        recorder.counts.extra_missing = extra.metadata.missing_count;
        save_extra(&paths, &extra)?;
    }

    save_index(&paths, &metadata, index.genera, verified)?;
    recorder.finish(&paths)
}

fn load_page(images_dir: &Path, page: u32, recorder: &mut RunRecorder) -> Option<GrayImage> {
    let filename = format!("{page:08}.png");
    let path = images_dir.join(&filename);
    if !path.exists() {
        warn!(page, path = %path.display(), "page image missing");
        recorder.warn(format!("page {page} skipped: {} missing", path.display()));
        return None;
    }

    let sha256 = match sha256_file(&path) {
        Ok(digest) => digest,
        Err(err) => {
            warn!(page, path = %path.display(), error = %err, "page image unreadable");
            recorder.warn(format!("page {page} skipped: {err:#}"));
            return None;
        }
    };
    recorder.page_images.push(PageImageEntry {
        page,
        filename,
        sha256,
    });

    match image::open(&path) {
        Ok(image) => Some(image.to_luma8()),
        Err(err) => {
            warn!(page, path = %path.display(), error = %err, "page image unreadable");
            recorder.warn(format!("page {page} skipped: {err}"));
            None
        }
    }
}

// A failed dump costs the page its debug images, never its index entries.
fn dump_debug_images(
    paths: &ArtifactPaths,
    page: u32,
    scanned: &ScannedPage,
    recorder: &mut RunRecorder,
) {
    if let Err(err) = write_debug_images(paths, page, scanned) {
        warn!(page, error = %err, "debug images not written");
        recorder.warn(format!("page {page} debug images not written: {err:#}"));
    }
}

fn write_debug_images(paths: &ArtifactPaths, page: u32, scanned: &ScannedPage) -> Result<()> {
    let page_path = paths.page_debug_image(page);
    draw_layout(&scanned.layout)
        .save(&page_path)
        .with_context(|| format!("failed to write {}", page_path.display()))?;

    for (index, column) in scanned.columns.iter().enumerate() {
        let column_path = paths.column_debug_image(page, (index + 1) as u8);
        draw_line_overlay(column)
            .save(&column_path)
            .with_context(|| format!("failed to write {}", column_path.display()))?;
    }
    Ok(())
}
