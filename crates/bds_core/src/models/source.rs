//! Source item identification.
//!
//! A source item is one unit of input media: a disc index, a disc image,
//! a Matroska remux, or a raw AVCHD/Blu-ray transport stream.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Disc image file extensions MakeMKV can open via `iso:`.
pub const IMAGE_EXTENSIONS: &[&str] = &["iso", "img", "bin"];

/// Raw transport stream extensions that bypass the MakeMKV rip.
pub const STREAM_EXTENSIONS: &[&str] = &["mts", "m2ts"];

/// One unit of input media for the conversion pipeline.
///
/// Identity is the resolved path (or disc index); items are immutable
/// once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceItem {
    /// Physical disc by MakeMKV disc index (`disc:N`).
    Disc(u32),
    /// Disc image file (.iso, .img, .bin).
    Image(PathBuf),
    /// Matroska file, typically a prior MakeMKV rip.
    Mkv(PathBuf),
    /// Raw MVC transport stream (.mts, .m2ts).
    Stream(PathBuf),
}

impl SourceItem {
    /// Resolve a CLI source spec: `disc:N` or a file path.
    ///
    /// Paths are classified by extension; unknown extensions are rejected
    /// so a typo fails before any stage runs.
    pub fn from_spec(spec: &str) -> Result<Self, String> {
        if let Some(index) = spec.strip_prefix("disc:") {
            return index
                .parse::<u32>()
                .map(SourceItem::Disc)
                .map_err(|_| format!("invalid disc index in '{spec}'"));
        }
        let path = PathBuf::from(spec);
        Self::from_path(&path).ok_or_else(|| {
            format!(
                "unsupported source '{spec}' (expected disc:N, {}, .mkv, or {})",
                IMAGE_EXTENSIONS.join("/"),
                STREAM_EXTENSIONS.join("/")
            )
        })
    }

    /// Classify a file path by extension. Returns `None` for unsupported
    /// extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceItem::Image(path.to_path_buf()))
        } else if STREAM_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceItem::Stream(path.to_path_buf()))
        } else if ext == "mkv" {
            Some(SourceItem::Mkv(path.to_path_buf()))
        } else {
            None
        }
    }

    /// The file path, if this item is file-backed.
    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceItem::Disc(_) => None,
            SourceItem::Image(p) | SourceItem::Mkv(p) | SourceItem::Stream(p) => Some(p),
        }
    }

    /// Source argument in the form `makemkvcon` expects.
    pub fn makemkv_arg(&self) -> String {
        match self {
            SourceItem::Disc(n) => format!("disc:{n}"),
            SourceItem::Image(p) => format!("iso:{}", p.display()),
            SourceItem::Mkv(p) | SourceItem::Stream(p) => p.display().to_string(),
        }
    }

    /// Whether the item is a raw transport stream (decoded directly,
    /// no rip step).
    pub fn is_stream(&self) -> bool {
        matches!(self, SourceItem::Stream(_))
    }

    /// Whether the item already is a Matroska remux.
    pub fn is_mkv(&self) -> bool {
        matches!(self, SourceItem::Mkv(_))
    }

    /// Whether scanning the disc is needed (`disc:` sources only).
    pub fn needs_disc_scan(&self) -> bool {
        matches!(self, SourceItem::Disc(_))
    }

    /// Display name used when disc metadata carries no title.
    pub fn fallback_name(&self) -> String {
        match self {
            SourceItem::Disc(n) => format!("disc_{n}"),
            SourceItem::Image(p) | SourceItem::Mkv(p) | SourceItem::Stream(p) => p
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl std::fmt::Display for SourceItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceItem::Disc(n) => write!(f, "disc:{n}"),
            SourceItem::Image(p) | SourceItem::Mkv(p) | SourceItem::Stream(p) => {
                write!(f, "{}", p.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disc_spec_parses() {
        assert_eq!(SourceItem::from_spec("disc:0").unwrap(), SourceItem::Disc(0));
        assert_eq!(SourceItem::from_spec("disc:3").unwrap(), SourceItem::Disc(3));
        assert!(SourceItem::from_spec("disc:abc").is_err());
    }

    #[test]
    fn paths_classify_by_extension() {
        assert!(matches!(
            SourceItem::from_spec("/movies/AVATAR.ISO").unwrap(),
            SourceItem::Image(_)
        ));
        assert!(matches!(
            SourceItem::from_spec("/movies/rip.mkv").unwrap(),
            SourceItem::Mkv(_)
        ));
        assert!(matches!(
            SourceItem::from_spec("/movies/00001.m2ts").unwrap(),
            SourceItem::Stream(_)
        ));
        assert!(SourceItem::from_spec("/movies/readme.txt").is_err());
    }

    #[test]
    fn makemkv_arg_forms() {
        assert_eq!(SourceItem::Disc(1).makemkv_arg(), "disc:1");
        assert_eq!(
            SourceItem::Image(PathBuf::from("/a/b.iso")).makemkv_arg(),
            "iso:/a/b.iso"
        );
        assert_eq!(
            SourceItem::Mkv(PathBuf::from("/a/b.mkv")).makemkv_arg(),
            "/a/b.mkv"
        );
    }

    #[test]
    fn fallback_name_from_stem() {
        let item = SourceItem::Stream(PathBuf::from("/discs/00001.mts"));
        assert_eq!(item.fallback_name(), "00001");
        assert_eq!(SourceItem::Disc(2).fallback_name(), "disc_2");
    }
}
