#![forbid(unsafe_code)]

//! Embedded SVG rasterization via `usvg` + `resvg`.

use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use vdiff_core::Size;

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse SVG: {0}")]
    SvgParse(String),
    #[error("SVG has an empty or invalid size")]
    EmptySize,
    #[error("failed to allocate pixmap for raster rendering")]
    PixmapAlloc,
}

pub type Result<T> = std::result::Result<T, RasterError>;

/// Tried in order for the generic `sans-serif` family before falling back to any loaded face.
const SANS_SERIF_FAMILIES: [&str; 6] = [
    "Arial",
    "Helvetica",
    "DejaVu Sans",
    "Noto Sans",
    "Liberation Sans",
    "FreeSans",
];

/// System fonts, loaded once per process.
///
/// `sans-serif` is pointed at a family that is actually installed; fontdb maps it to Arial
/// otherwise, and text silently disappears on hosts without it.
pub fn shared_fontdb() -> Arc<usvg::fontdb::Database> {
    static FONTDB: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    Arc::clone(FONTDB.get_or_init(|| {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        match sans_serif_family(&db) {
            Some(family) => {
                tracing::debug!(family = %family, "using sans-serif font");
                db.set_sans_serif_family(family);
            }
            None => tracing::warn!("no system fonts found; text will not be rendered"),
        }
        Arc::new(db)
    }))
}

fn has_family(db: &usvg::fontdb::Database, name: &str) -> bool {
    db.faces()
        .any(|face| face.families.iter().any(|(family, _)| family == name))
}

/// First preferred sans-serif family present in `db`, else the family of the first face.
pub fn sans_serif_family(db: &usvg::fontdb::Database) -> Option<String> {
    SANS_SERIF_FAMILIES
        .iter()
        .find(|name| has_family(db, name))
        .map(|name| name.to_string())
        .or_else(|| {
            db.faces()
                .find_map(|face| face.families.first().map(|(family, _)| family.clone()))
        })
}

fn options(resources_dir: Option<&Path>, with_fonts: bool) -> usvg::Options<'static> {
    let mut opt = usvg::Options {
        resources_dir: resources_dir.map(Path::to_path_buf),
        ..Default::default()
    };
    if with_fonts {
        opt.fontdb = shared_fontdb();
    }
    opt
}

fn parse_file(path: &Path, with_fonts: bool) -> Result<usvg::Tree> {
    let data = std::fs::read(path).map_err(|source| RasterError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let opt = options(path.parent(), with_fonts);
    usvg::Tree::from_data(&data, &opt).map_err(|err| RasterError::SvgParse(err.to_string()))
}

/// Intrinsic size of the SVG at `path`, in user units.
///
/// Text is not shaped, so this stays cheap enough to run once per render call.
pub fn intrinsic_size(path: &Path) -> Result<(f32, f32)> {
    let tree = parse_file(path, false)?;
    let size = tree.size();
    let (w, h) = (size.width(), size.height());
    if w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0 {
        Ok((w, h))
    } else {
        Err(RasterError::EmptySize)
    }
}

/// Pixel size the SVG at `path` occupies when scaled to `width` pixels wide.
pub fn expected_size(path: &Path, width: u32) -> Result<Size> {
    let (w, h) = intrinsic_size(path)?;
    Ok(Size::fit_width(w, h, width))
}

/// Renders the SVG file scaled so its width equals `width` pixels.
pub fn render_file_to_width(path: &Path, width: u32) -> Result<RgbaImage> {
    let tree = parse_file(path, true)?;
    let size = tree.size();
    let target = Size::fit_width(size.width(), size.height(), width);
    let scale = target.width as f32 / size.width();
    render_tree(&tree, target, tiny_skia::Transform::from_scale(scale, scale))
}

/// Renders SVG source into a canvas of exactly `canvas` pixels at 1:1 scale.
pub fn render_str(svg: &str, canvas: Size) -> Result<RgbaImage> {
    let opt = options(None, true);
    let tree =
        usvg::Tree::from_str(svg, &opt).map_err(|err| RasterError::SvgParse(err.to_string()))?;
    render_tree(&tree, canvas, tiny_skia::Transform::identity())
}

fn render_tree(
    tree: &usvg::Tree,
    canvas: Size,
    transform: tiny_skia::Transform,
) -> Result<RgbaImage> {
    let mut pixmap =
        tiny_skia::Pixmap::new(canvas.width, canvas.height).ok_or(RasterError::PixmapAlloc)?;
    resvg::render(tree, transform, &mut pixmap.as_mut());
    Ok(pixmap_to_rgba(&pixmap))
}

/// tiny-skia stores premultiplied RGBA; the canonical format is straight alpha.
pub fn pixmap_to_rgba(pixmap: &tiny_skia::Pixmap) -> RgbaImage {
    let mut out = RgbaImage::new(pixmap.width(), pixmap.height());
    for (src, dst) in pixmap.pixels().iter().zip(out.pixels_mut()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><rect width="10" height="10" fill="black"/></svg>"#;

    #[test]
    fn render_str_fills_the_canvas() {
        let img = render_str(SQUARE, Size::new(10, 10)).unwrap();
        assert_eq!(img.dimensions(), (10, 10));
        assert_eq!(img.get_pixel(5, 5), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn render_file_scales_to_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.svg");
        std::fs::write(
            &path,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50" viewBox="0 0 100 50"><rect width="100" height="50" fill="red"/></svg>"#,
        )
        .unwrap();

        assert_eq!(intrinsic_size(&path).unwrap(), (100.0, 50.0));
        let img = render_file_to_width(&path, 300).unwrap();
        assert_eq!(img.dimensions(), (300, 150));
        assert_eq!(img.get_pixel(150, 75), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn broken_svg_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.svg");
        std::fs::write(&path, "<svg").unwrap();
        assert!(matches!(
            intrinsic_size(&path),
            Err(RasterError::SvgParse(_))
        ));
        assert!(matches!(
            intrinsic_size(&dir.path().join("missing.svg")),
            Err(RasterError::Read { .. })
        ));
    }

    #[test]
    fn empty_font_database_has_no_sans_serif_family() {
        assert_eq!(sans_serif_family(&usvg::fontdb::Database::new()), None);
    }

    #[test]
    fn generic_sans_serif_resolves_to_an_installed_face() {
        let db = shared_fontdb();
        if db.faces().next().is_none() {
            return;
        }
        let query = usvg::fontdb::Query {
            families: &[usvg::fontdb::Family::SansSerif],
            ..Default::default()
        };
        assert!(db.query(&query).is_some());
    }

    #[test]
    fn premultiplied_pixels_are_demultiplied() {
        let mut pixmap = tiny_skia::Pixmap::new(1, 1).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(200, 100, 50, 128));
        let img = pixmap_to_rgba(&pixmap);
        let Rgba([r, g, b, a]) = *img.get_pixel(0, 0);
        assert_eq!(a, 128);
        assert!(r.abs_diff(200) <= 2 && g.abs_diff(100) <= 2 && b.abs_diff(50) <= 2);
    }
}
