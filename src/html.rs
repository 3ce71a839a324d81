// HTML post-processing: every `<img>` whose src points at a local file is
// uploaded through an `ImageUploader` and its src replaced with the hosted
// URL. Remote and data URIs are left alone.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::error::{PublishError, Result};
use crate::media::ImageUploader;

/// Final article HTML plus how many local images were replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedHtml {
    pub html: String,
    pub images_replaced: usize,
}

fn img_src_regex() -> &'static Regex {
    static IMG_SRC: OnceLock<Regex> = OnceLock::new();
    IMG_SRC.get_or_init(|| {
        Regex::new(r#"(?i)(<img\b[^>]*?\ssrc\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid regex")
    })
}

/// The src value, whichever quoting style matched.
fn src_value<'h>(caps: &regex::Captures<'h>) -> Option<regex::Match<'h>> {
    caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))
}

/// True for srcs that refer to a file on disk.
pub fn is_local_src(src: &str) -> bool {
    let lower = src.trim().to_ascii_lowercase();
    !(lower.is_empty()
        || lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("//")
        || lower.starts_with("data:"))
}

/// All local image srcs in document order (duplicates kept).
pub fn local_image_srcs(html: &str) -> Vec<String> {
    img_src_regex()
        .captures_iter(html)
        .filter_map(|caps| src_value(&caps))
        .map(|m| m.as_str().to_string())
        .filter(|src| is_local_src(src))
        .collect()
}

/// Replace local image srcs with uploaded URLs and prepend the stylesheet.
pub fn process_html(
    html: &str,
    base_dir: &Path,
    uploader: &mut dyn ImageUploader,
    css: Option<&str>,
) -> Result<ProcessedHtml> {
    let re = img_src_regex();
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    let mut images_replaced = 0;

    for caps in re.captures_iter(html) {
        let (Some(whole), Some(prefix)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(src) = src_value(&caps) else {
            continue;
        };
        if caps.get(4).is_some() {
            debug!(src = %abbreviate(src.as_str()), "unquoted img src");
        }
        if !is_local_src(src.as_str()) {
            debug!(src = %abbreviate(src.as_str()), "skipping remote image");
            continue;
        }

        let local_path = resolve_src(src.as_str(), base_dir);
        if !local_path.is_file() {
            return Err(PublishError::not_found(format!(
                "Image referenced in markdown not found: {}",
                local_path.display()
            )));
        }

        info!(src = %src.as_str(), path = %local_path.display(), "uploading local image");
        let url = uploader.upload_image(&local_path)?;

        out.push_str(&html[last..whole.start()]);
        out.push_str(prefix.as_str());
        out.push('"');
        out.push_str(&url.replace('"', "&quot;"));
        out.push('"');
        last = whole.end();
        images_replaced += 1;
    }
    out.push_str(&html[last..]);

    info!(images_replaced, "html processing finished");

    let html = match css {
        Some(css) => format!("<style>\n{css}\n</style>\n{out}"),
        None => out,
    };
    Ok(ProcessedHtml {
        html,
        images_replaced,
    })
}

/// Read the CSS template, failing with `NotFound` if it is missing.
pub fn read_css(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(PublishError::not_found(format!(
            "CSS template not found: {}",
            path.display()
        )));
    }
    std::fs::read_to_string(path)
        .map_err(|e| PublishError::io(format!("failed to read {}", path.display()), e))
}

/// The renderer writes srcs as escaped HTML with unsafe characters
/// percent-encoded; undo both before touching the filesystem.
fn resolve_src(src: &str, base_dir: &Path) -> PathBuf {
    let unescaped = html_escape::decode_html_entities(src.trim()).into_owned();
    let decoded = urlencoding::decode(&unescaped)
        .map(|s| s.into_owned())
        .unwrap_or(unescaped);
    let path = Path::new(&decoded);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn abbreviate(src: &str) -> String {
    src.chars().take(50).collect()
}
