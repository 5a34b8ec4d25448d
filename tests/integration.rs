use std::fs;
use std::path::Path;

use bgwipe::sprite::{load_sprite_frames, SpriteOptions};
use bgwipe::{
    remove_background_batch, remove_watermark_batch, BackgroundOptions, BatchJob, CompositeMode,
};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

fn sprite(size: u32, lo: u32, hi: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Rgba([220, 20, 20, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

fn watermarked() -> RgbImage {
    RgbImage::from_fn(100, 100, |x, y| {
        if x < 8 && (40..60).contains(&y) {
            Rgb([240, 240, 240])
        } else {
            Rgb([20, 80, 160])
        }
    })
}

fn write_tiny_pngs(dir: &Path, count: usize) {
    let img = sprite(4, 1, 3);
    for i in 0..count {
        img.save(dir.join(format!("frame_{i:03}.png"))).unwrap();
    }
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).map_or(0, |rd| rd.filter_map(Result::ok).count())
}

#[test]
fn background_batch_round_trip() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    sprite(64, 24, 40).save(src.path().join("hero.png")).unwrap();

    let result = remove_background_batch(&BatchJob::new(src.path(), dst.path()));
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 0);

    let out = image::open(dst.path().join("hero.png")).unwrap().to_rgba8();
    assert_eq!(out.dimensions(), (64, 64));
    for (x, y, p) in out.enumerate_pixels() {
        let inside = (24..40).contains(&x) && (24..40).contains(&y);
        // one-pixel ring kept by the edge shrink
        let near = (23..41).contains(&x) && (23..41).contains(&y);
        if inside {
            assert_eq!(*p, Rgba([220, 20, 20, 255]), "subject pixel ({x}, {y})");
        } else if !near {
            assert_eq!(p[3], 0, "background pixel ({x}, {y})");
        }
    }
}

#[test]
fn background_batch_fill_mode_is_opaque() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    sprite(32, 10, 20).save(src.path().join("a.png")).unwrap();

    let mut job = BatchJob::new(src.path(), dst.path());
    job.background = BackgroundOptions {
        mode: CompositeMode::Fill(Rgb([1, 2, 3])),
        ..BackgroundOptions::default()
    };
    assert_eq!(remove_background_batch(&job).succeeded, 1);

    let out = image::open(dst.path().join("a.png")).unwrap().to_rgba8();
    assert_eq!(*out.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
    assert!(out.pixels().all(|p| p[3] == 255));
}

#[test]
fn batch_is_capped_at_limit() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_tiny_pngs(src.path(), 500);

    let result = remove_background_batch(&BatchJob::new(src.path(), dst.path()));
    assert_eq!(result.attempted(), 300);
    assert_eq!(result.succeeded, 300);
    assert_eq!(count_files(dst.path()), 300);
    // sorted by name, so the first 300 are taken
    assert!(dst.path().join("frame_299.png").exists());
    assert!(!dst.path().join("frame_300.png").exists());
}

#[test]
fn corrupt_file_does_not_stop_the_batch() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_tiny_pngs(src.path(), 5);
    fs::write(src.path().join("broken.png"), b"definitely not a png").unwrap();

    let result = remove_background_batch(&BatchJob::new(src.path(), dst.path()));
    assert_eq!(result.succeeded, 5);
    assert_eq!(result.failed, 1);
    assert_eq!(count_files(dst.path()), 5);
}

#[test]
fn missing_source_directory_processes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let job = BatchJob::new(tmp.path().join("nope"), tmp.path().join("out"));

    let result = remove_background_batch(&job);
    assert_eq!((result.succeeded, result.failed), (0, 0));
    let result = remove_watermark_batch(&job);
    assert_eq!(result.attempted(), 0);
}

#[test]
fn destination_is_created() {
    let src = tempfile::tempdir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    write_tiny_pngs(src.path(), 2);
    let dst = tmp.path().join("nested").join("out");

    let result = remove_background_batch(&BatchJob::new(src.path(), &dst));
    assert_eq!(result.succeeded, 2);
    assert_eq!(count_files(&dst), 2);
}

#[test]
fn non_recursive_batch_skips_subdirectories() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_tiny_pngs(src.path(), 2);
    let sub = src.path().join("sub");
    fs::create_dir(&sub).unwrap();
    sprite(4, 1, 3).save(sub.join("deep.png")).unwrap();

    let mut job = BatchJob::new(src.path(), dst.path());
    job.recursive = false;
    assert_eq!(remove_background_batch(&job).attempted(), 2);

    job.recursive = true;
    assert_eq!(remove_background_batch(&job).attempted(), 3);
    assert!(dst.path().join("deep.png").exists());
}

#[test]
fn colliding_output_names_are_written_once() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    for sub in ["a", "b", "c", "d"] {
        let dir = src.path().join(sub);
        fs::create_dir(&dir).unwrap();
        sprite(4, 1, 3).save(dir.join("frame.png")).unwrap();
    }
    sprite(4, 1, 3).save(src.path().join("hero.png")).unwrap();
    image::DynamicImage::ImageRgba8(sprite(4, 1, 3))
        .to_rgb8()
        .save(src.path().join("hero.jpg"))
        .unwrap();

    let result = remove_background_batch(&BatchJob::new(src.path(), dst.path()));
    assert_eq!(result.attempted(), 6);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed, 4);
    assert_eq!(count_files(dst.path()), 2);
    assert!(image::open(dst.path().join("frame.png")).is_ok());
    assert!(image::open(dst.path().join("hero.png")).is_ok());
}

#[test]
fn batches_filter_by_extension() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_tiny_pngs(src.path(), 1);
    sprite(4, 1, 3).save(src.path().join("anim.gif")).unwrap();
    fs::write(src.path().join("notes.txt"), "hello").unwrap();

    // gif is a sprite format but not a watermark one
    let job = BatchJob::new(src.path(), dst.path());
    assert_eq!(remove_background_batch(&job).attempted(), 2);
    assert_eq!(remove_watermark_batch(&job).attempted(), 1);
}

#[test]
fn watermark_batch_inpaints_border_patch() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    watermarked().save(src.path().join("photo.png")).unwrap();

    let mut job = BatchJob::new(src.path(), dst.path());
    job.limit = 200;
    let result = remove_watermark_batch(&job);
    assert_eq!(result.succeeded, 1);

    let out = image::open(dst.path().join("photo.png")).unwrap().to_rgb8();
    let p = out.get_pixel(3, 50);
    for (got, want) in p.0.iter().zip([20u8, 80, 160]) {
        assert!(got.abs_diff(want) <= 2, "got {p:?}");
    }
    assert_eq!(*out.get_pixel(50, 50), Rgb([20, 80, 160]));
}

#[test]
fn watermark_batch_keeps_transparency() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let base = watermarked();
    let img = RgbaImage::from_fn(100, 100, |x, y| {
        let p = base.get_pixel(x, y);
        Rgba([p[0], p[1], p[2], if x > 90 { 128 } else { 255 }])
    });
    img.save(src.path().join("layer.png")).unwrap();

    assert_eq!(remove_watermark_batch(&BatchJob::new(src.path(), dst.path())).succeeded, 1);
    let out = image::open(dst.path().join("layer.png")).unwrap().to_rgba8();
    assert_eq!(out.get_pixel(95, 10)[3], 128);
    assert_eq!(out.get_pixel(10, 10)[3], 255);
}

#[test]
fn sprite_frames_are_loaded_in_order_and_resized() {
    let dir = tempfile::tempdir().unwrap();
    sprite(40, 10, 30).save(dir.path().join("b.png")).unwrap();
    sprite(40, 15, 25).save(dir.path().join("a.png")).unwrap();
    fs::write(dir.path().join("c.png"), b"garbage").unwrap();

    let options = SpriteOptions {
        width: Some(20),
        ..SpriteOptions::default()
    };
    let frames = load_sprite_frames(dir.path(), &options).unwrap();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.dimensions() == (20, 20)));
    assert_eq!(frames[0].get_pixel(0, 0)[3], 0);
    // a.png has the smaller subject
    let opaque = |f: &RgbaImage| f.pixels().filter(|p| p[3] == 255).count();
    assert!(opaque(&frames[0]) < opaque(&frames[1]));
}

#[test]
fn sprite_frames_from_missing_directory_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = load_sprite_frames(&tmp.path().join("missing"), &SpriteOptions::default());
    assert!(matches!(err, Err(bgwipe::Error::SourceDirMissing(_))));
}
