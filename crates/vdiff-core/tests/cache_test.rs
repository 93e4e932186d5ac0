use std::fs;
use std::path::{Path, PathBuf};
use vdiff_core::cache::{INDEX_FILE_NAME, file_hash};
use vdiff_core::image::{Rgba, RgbaImage};
use vdiff_core::{Backend, ImageCache};

fn write_svg(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(
        &path,
        format!(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10">{body}</svg>"#),
    )
    .expect("write svg");
    path
}

fn sample_image() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(6, 4, Rgba([255, 255, 255, 0]));
    img.put_pixel(1, 2, Rgba([200, 0, 0, 255]));
    img.put_pixel(5, 3, Rgba([0, 0, 200, 77]));
    img
}

#[test]
fn put_then_get_round_trips_pixels() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svg = write_svg(tmp.path(), "a.svg", "<rect width='5' height='5'/>");
    let cache = ImageCache::open(&tmp.path().join("work")).expect("open");

    assert!(cache.get(Backend::Chrome, &svg).is_none());

    let img = sample_image();
    cache.put(Backend::Chrome, &svg, &img).expect("put");

    assert_eq!(cache.get(Backend::Chrome, &svg), Some(img));
    assert!(cache.get(Backend::Firefox, &svg).is_none());
}

#[test]
fn changed_svg_invalidates_entry_and_blob() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svg = write_svg(tmp.path(), "a.svg", "<rect width='5' height='5'/>");
    let cache = ImageCache::open(&tmp.path().join("work")).expect("open");

    cache.put(Backend::Batik, &svg, &sample_image()).expect("put");
    let entry = cache.entry(Backend::Batik, &svg).expect("entry");
    assert!(entry.png_path.exists());
    assert_eq!(entry.hash, file_hash(&svg).expect("hash"));

    write_svg(tmp.path(), "a.svg", "<circle r='3'/>");

    assert!(cache.get(Backend::Batik, &svg).is_none());
    assert!(cache.entry(Backend::Batik, &svg).is_none());
    assert!(!entry.png_path.exists());
    assert!(cache.is_empty());
}

#[test]
fn put_replaces_previous_blob() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svg = write_svg(tmp.path(), "a.svg", "");
    let cache = ImageCache::open(&tmp.path().join("work")).expect("open");

    cache.put(Backend::Inkscape, &svg, &sample_image()).expect("put");
    let first = cache.entry(Backend::Inkscape, &svg).expect("entry");

    let second_img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
    cache.put(Backend::Inkscape, &svg, &second_img).expect("put");
    let second = cache.entry(Backend::Inkscape, &svg).expect("entry");

    assert_ne!(first.png_path, second.png_path);
    assert!(!first.png_path.exists());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(Backend::Inkscape, &svg), Some(second_img));
}

#[test]
fn entries_survive_reopen_and_compaction() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let work = tmp.path().join("work");
    let a = write_svg(tmp.path(), "a.svg", "");
    let b = write_svg(tmp.path(), "b.svg", "<rect width='1' height='1'/>");

    let cache = ImageCache::open(&work).expect("open");
    cache.put(Backend::Chrome, &a, &sample_image()).expect("put");
    cache.put(Backend::Chrome, &b, &sample_image()).expect("put");
    cache.put(Backend::Chrome, &a, &sample_image()).expect("put");
    write_svg(tmp.path(), "b.svg", "<rect width='2' height='2'/>");
    assert!(cache.get(Backend::Chrome, &b).is_none());
    cache.close().expect("close");

    let journal = fs::read_to_string(work.join(INDEX_FILE_NAME)).expect("journal");
    assert_eq!(journal.lines().count(), 1, "journal:\n{journal}");

    let cache = ImageCache::open(&work).expect("reopen");
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(Backend::Chrome, &a), Some(sample_image()));
}

#[test]
fn corrupt_journal_lines_are_skipped() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let work = tmp.path().join("work");
    let svg = write_svg(tmp.path(), "a.svg", "");

    let cache = ImageCache::open(&work).expect("open");
    cache.put(Backend::Safari, &svg, &sample_image()).expect("put");
    drop(cache);

    let index = work.join(INDEX_FILE_NAME);
    let mut journal = fs::read_to_string(&index).expect("journal");
    journal.push_str("{\"op\":\"insert\",\"svg_pa");
    fs::write(&index, journal).expect("write journal");

    let cache = ImageCache::open(&work).expect("reopen");
    assert_eq!(cache.get(Backend::Safari, &svg), Some(sample_image()));
}

#[test]
fn concurrent_readers_and_writers_on_distinct_keys() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svg = write_svg(tmp.path(), "a.svg", "");
    let cache = ImageCache::open(&tmp.path().join("work")).expect("open");
    let backends = [
        Backend::Chrome,
        Backend::Firefox,
        Backend::Safari,
        Backend::Batik,
        Backend::Inkscape,
        Backend::SvgNet,
    ];

    std::thread::scope(|s| {
        for backend in backends {
            let cache = &cache;
            let svg = &svg;
            s.spawn(move || {
                assert!(cache.get(backend, svg).is_none());
                cache.put(backend, svg, &sample_image()).expect("put");
                assert_eq!(cache.get(backend, svg), Some(sample_image()));
            });
        }
    });

    assert_eq!(cache.len(), backends.len());
}
