//! Stand-in image for a backend that failed: a white canvas with the error text word-wrapped
//! from the top-left corner.

use crate::raster;
use std::fmt::Write as _;
use vdiff_core::canvas::{self, Rgba};
use vdiff_core::image::RgbaImage;
use vdiff_core::Size;

/// 12pt at 96 dpi.
const FONT_SIZE_PX: f32 = 16.0;
const LINE_HEIGHT_PX: f32 = FONT_SIZE_PX * 1.25;
/// Average advance of a sans-serif glyph; deliberately on the wide side so lines never clip.
const CHAR_WIDTH_PX: f32 = FONT_SIZE_PX * 0.6;
const MARGIN_PX: f32 = 2.0;

/// Synthesizes the placeholder for a failed backend.
///
/// Never fails: if text rasterization itself breaks, a plain white canvas is returned.
pub fn error_image(size: Size, message: &str) -> RgbaImage {
    let size = if size.is_empty() { Size::square(1) } else { size };
    let svg = placeholder_svg(size, message);
    match raster::render_str(&svg, size) {
        Ok(image) => image,
        Err(err) => {
            tracing::warn!(error = %err, "failed to draw placeholder text");
            canvas::filled(size, Rgba([255, 255, 255, 255]))
        }
    }
}

fn placeholder_svg(size: Size, message: &str) -> String {
    let max_chars = (((size.width as f32 - 2.0 * MARGIN_PX) / CHAR_WIDTH_PX).floor() as usize).max(1);
    let max_lines = ((size.height as f32 / LINE_HEIGHT_PX).floor() as usize).max(1);

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="{w}" height="{h}" fill="white"/><text font-family="sans-serif" font-size="{FONT_SIZE_PX}" fill="black">"#,
        w = size.width,
        h = size.height,
    );
    for (idx, line) in wrap_text(message, max_chars).iter().take(max_lines).enumerate() {
        let y = FONT_SIZE_PX + idx as f32 * LINE_HEIGHT_PX;
        let _ = write!(
            svg,
            r#"<tspan x="{MARGIN_PX}" y="{y}">{}</tspan>"#,
            escape_xml(line)
        );
    }
    svg.push_str("</text></svg>");
    svg
}

/// Greedy word wrap; words longer than a line (typically paths) are split by character.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_len = 0usize;
        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            let needed = if line_len == 0 { chars.len() } else { line_len + 1 + chars.len() };
            if needed <= max_chars {
                if line_len > 0 {
                    line.push(' ');
                    line_len += 1;
                }
                line.extend(chars.iter());
                line_len += chars.len();
                continue;
            }
            if line_len > 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            while chars.len() > max_chars {
                let rest = chars.split_off(max_chars);
                lines.push(chars.into_iter().collect());
                chars = rest;
            }
            line_len = chars.len();
            line = chars.into_iter().collect();
        }
        if line_len > 0 || lines.is_empty() {
            lines.push(line);
        }
    }
    lines
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(
            wrap_text("Invalid image: /tmp/out.png", 15),
            vec!["Invalid image:", "/tmp/out.png"]
        );
        assert_eq!(wrap_text("a b c", 3), vec!["a b", "c"]);
    }

    #[test]
    fn splits_words_longer_than_a_line() {
        assert_eq!(
            wrap_text("x /aaaaaaaaaa", 4),
            vec!["x", "/aaa", "aaaa", "aaa"]
        );
    }

    #[test]
    fn escapes_markup_in_messages() {
        let svg = placeholder_svg(Size::square(300), "<bad> & \"quoted\"");
        assert!(svg.contains("&lt;bad&gt; &amp; &quot;quoted&quot;"));
        assert_eq!(svg.matches("<tspan").count(), svg.matches("</tspan>").count());
    }

    #[test]
    fn placeholder_is_a_mostly_white_canvas_of_the_requested_size() {
        let img = error_image(Size::square(300), "Invalid image: /tmp/chrome.png");
        assert_eq!(img.dimensions(), (300, 300));
        assert_eq!(img.get_pixel(299, 299), &Rgba([255, 255, 255, 255]));
        let white = img
            .pixels()
            .filter(|p| **p == Rgba([255, 255, 255, 255]))
            .count();
        assert!(white > 300 * 300 * 9 / 10);
    }

    #[test]
    fn placeholder_draws_the_error_text() {
        if raster::shared_fontdb().faces().next().is_none() {
            return;
        }
        let img = error_image(
            Size::square(300),
            "Invalid image: /tmp/chrome.png (failed to start)",
        );
        let inked = img
            .pixels()
            .filter(|p| **p != Rgba([255, 255, 255, 255]))
            .count();
        assert!(inked > 100, "only {inked} non-white pixels");
        // Text starts in the top-left corner.
        let top_band = (0..300)
            .flat_map(|x| (0..20).map(move |y| (x, y)))
            .filter(|&(x, y)| img.get_pixel(x, y) != &Rgba([255, 255, 255, 255]))
            .count();
        assert!(top_band > 0);
    }
}
