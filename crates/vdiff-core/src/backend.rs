//! Closed set of rendering backends under test.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One rendering engine/configuration.
///
/// The set is closed: adapters for every variant are registered once at startup and never
/// change at runtime. Declaration order doubles as the surrogate ground-truth priority used by
/// reference-less (`custom`) test suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    Reference,
    Chrome,
    Firefox,
    Safari,
    /// Embedded `resvg`, rendered in-process.
    Resvg,
    ResvgCairo,
    ResvgQt,
    ResvgRaqote,
    ResvgSkia,
    Batik,
    Inkscape,
    Librsvg,
    #[serde(rename = "qtsvg")]
    QtSvg,
    #[serde(rename = "wxsvg")]
    WxSvg,
    #[serde(rename = "svgnet")]
    SvgNet,
}

impl Backend {
    pub const ALL: [Backend; 15] = [
        Backend::Reference,
        Backend::Chrome,
        Backend::Firefox,
        Backend::Safari,
        Backend::Resvg,
        Backend::ResvgCairo,
        Backend::ResvgQt,
        Backend::ResvgRaqote,
        Backend::ResvgSkia,
        Backend::Batik,
        Backend::Inkscape,
        Backend::Librsvg,
        Backend::QtSvg,
        Backend::WxSvg,
        Backend::SvgNet,
    ];

    /// Stable identifier used in config files, cache keys and output file names.
    pub fn name(self) -> &'static str {
        match self {
            Backend::Reference => "reference",
            Backend::Chrome => "chrome",
            Backend::Firefox => "firefox",
            Backend::Safari => "safari",
            Backend::Resvg => "resvg",
            Backend::ResvgCairo => "resvg-cairo",
            Backend::ResvgQt => "resvg-qt",
            Backend::ResvgRaqote => "resvg-raqote",
            Backend::ResvgSkia => "resvg-skia",
            Backend::Batik => "batik",
            Backend::Inkscape => "inkscape",
            Backend::Librsvg => "librsvg",
            Backend::QtSvg => "qtsvg",
            Backend::WxSvg => "wxsvg",
            Backend::SvgNet => "svgnet",
        }
    }

    /// Human-readable label for reports.
    pub fn title(self) -> &'static str {
        match self {
            Backend::Reference => "Reference",
            Backend::Chrome => "Chrome",
            Backend::Firefox => "Firefox",
            Backend::Safari => "Safari",
            Backend::Resvg => "resvg",
            Backend::ResvgCairo => "resvg (cairo)",
            Backend::ResvgQt => "resvg (Qt)",
            Backend::ResvgRaqote => "resvg (raqote)",
            Backend::ResvgSkia => "resvg (Skia)",
            Backend::Batik => "Batik",
            Backend::Inkscape => "Inkscape",
            Backend::Librsvg => "librsvg",
            Backend::QtSvg => "QtSvg",
            Backend::WxSvg => "wxSVG",
            Backend::SvgNet => "SVG.NET",
        }
    }

    /// Backends whose output is slow to produce and stable for a fixed input and tool version.
    pub fn is_cacheable(self) -> bool {
        matches!(
            self,
            Backend::Chrome
                | Backend::Firefox
                | Backend::Safari
                | Backend::Batik
                | Backend::Inkscape
                | Backend::SvgNet
        )
    }

    /// Backends that always produce a full rectangular canvas regardless of the SVG aspect
    /// ratio; their output is center-cropped to the expected size.
    pub fn has_rectangular_canvas(self) -> bool {
        matches!(self, Backend::Firefox | Backend::Safari | Backend::Batik)
    }

    pub fn is_in_process(self) -> bool {
        matches!(self, Backend::Reference | Backend::Resvg)
    }

    /// The `--backend` value understood by `rendersvg` for resvg variants.
    pub fn resvg_variant(self) -> Option<&'static str> {
        match self {
            Backend::ResvgCairo => Some("cairo"),
            Backend::ResvgQt => Some("qt"),
            Backend::ResvgRaqote => Some("raqote"),
            Backend::ResvgSkia => Some("skia"),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend: {0}")]
pub struct UnknownBackend(pub String);

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Backend::ALL
            .into_iter()
            .find(|b| b.name() == needle)
            .ok_or(UnknownBackend(s.to_string()))
    }
}

/// Which test set an input belongs to; affects reference lookup, caching and tool flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestSuite {
    /// The project's own tests, rendered with bundled fonts.
    #[default]
    Own,
    Official,
    /// Arbitrary files without pre-rendered references.
    Custom,
}

impl TestSuite {
    pub fn name(self) -> &'static str {
        match self {
            TestSuite::Own => "own",
            TestSuite::Official => "official",
            TestSuite::Custom => "custom",
        }
    }

    pub fn has_reference(self) -> bool {
        self != TestSuite::Custom
    }
}

impl fmt::Display for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestSuite {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "own" | "results" => Ok(Self::Own),
            "official" => Ok(Self::Official),
            "custom" => Ok(Self::Custom),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back_and_match_serde() {
        for backend in Backend::ALL {
            assert_eq!(backend.name().parse::<Backend>().unwrap(), backend);
            let json = serde_json::to_string(&backend).unwrap();
            assert_eq!(json, format!("\"{}\"", backend.name()));
        }
    }

    #[test]
    fn reference_is_never_cached_or_cropped() {
        assert!(!Backend::Reference.is_cacheable());
        assert!(!Backend::Reference.has_rectangular_canvas());
        assert!(Backend::Reference.is_in_process());
    }

    #[test]
    fn unknown_backend_is_reported_verbatim() {
        let err = "netscape".parse::<Backend>().unwrap_err();
        assert_eq!(err.to_string(), "unknown backend: netscape");
    }
}
