#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use vdiff_core::canvas;
use vdiff_core::image::{Rgba, RgbaImage};
use vdiff_core::{Backend, BackendError, BackendSettings, CancelToken, RenderConfig, RenderTask, Size};
use vdiff_render::Catalog;

/// Writes an executable shell script standing in for a converter.
fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod");
    path
}

fn task(backend: Backend, tool: &Path, work_dir: &Path, image_size: Size) -> RenderTask {
    let config = RenderConfig {
        view_size: 40,
        work_dir: work_dir.to_path_buf(),
        backends: vec![BackendSettings::new(backend).with_path(tool.to_string_lossy())],
        ..Default::default()
    };
    RenderTask::new(backend, work_dir.join("in.svg"), image_size, &config)
}

#[test]
fn qtsvg_output_is_loaded_and_scratch_removed() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let fixture = tmp.path().join("fixture.png");
    canvas::save_png(&RgbaImage::from_pixel(40, 40, Rgba([0, 128, 0, 255])), &fixture)
        .expect("fixture");
    // qtsvgrender <svg> <out> <size>
    let tool = fake_tool(tmp.path(), "qtsvgrender", &format!("cp '{}' \"$2\"", fixture.display()));
    let work = tmp.path().join("work");

    let t = task(Backend::QtSvg, &tool, &work, Size::square(40));
    let img = Catalog::standard()
        .render(&t, &CancelToken::never())
        .expect("render");
    assert_eq!(img.get_pixel(20, 20), &Rgba([0, 128, 0, 255]));
    assert_eq!(fs::read_dir(&work).expect("work dir").count(), 0);
}

#[test]
fn batik_screenshot_is_center_cropped() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut square = RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]));
    for x in 0..40 {
        for y in 10..30 {
            square.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
    let fixture = tmp.path().join("fixture.png");
    canvas::save_png(&square, &fixture).expect("fixture");
    // batik -scriptSecurityOff <svg> -d <out> -w N -h N
    let tool = fake_tool(tmp.path(), "batik", &format!("cp '{}' \"$4\"\necho success", fixture.display()));

    let t = task(Backend::Batik, &tool, &tmp.path().join("work"), Size::new(40, 20));
    let img = Catalog::standard()
        .render(&t, &CancelToken::never())
        .expect("render");
    assert_eq!(img.dimensions(), (40, 20));
    assert!(img.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
}

#[test]
fn tool_that_writes_nothing_is_an_invalid_image() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let tool = fake_tool(tmp.path(), "rsvg-convert", "echo 'cannot render' >&2\nexit 1");

    let t = task(Backend::Librsvg, &tool, &tmp.path().join("work"), Size::square(40));
    let err = Catalog::standard()
        .render(&t, &CancelToken::never())
        .expect_err("must fail");
    assert!(
        err.to_string().starts_with("Invalid image: "),
        "unexpected error: {err}"
    );
    assert!(err.to_string().contains("exited with code 1"), "{err}");
}

#[test]
fn hung_tool_times_out() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let tool = fake_tool(tmp.path(), "wxsvgrender", "exec sleep 5");

    let mut t = task(Backend::WxSvg, &tool, &tmp.path().join("work"), Size::square(40));
    t.timeout = Some(std::time::Duration::from_millis(100));
    let started = std::time::Instant::now();
    let err = Catalog::standard()
        .render(&t, &CancelToken::never())
        .expect_err("must time out");
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
    assert!(matches!(err, BackendError::InvalidImage { .. }));
    assert!(err.to_string().contains("timed out"), "{err}");
}
