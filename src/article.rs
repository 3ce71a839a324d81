// Article input: YAML front matter and the Markdown body that follows it.

use pulldown_cmark::{html, Options, Parser};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PublishError, Result};

/// Metadata an article must declare in its front matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleMetadata {
    pub title: String,
    /// Cover image, resolved against the Markdown file's directory.
    pub cover_image_path: PathBuf,
    pub author: Option<String>,
    pub digest: Option<String>,
    pub content_source_url: Option<String>,
    pub need_open_comment: bool,
    pub only_fans_can_comment: bool,
}

/// A parsed Markdown file.
#[derive(Debug, Clone)]
pub struct Article {
    pub path: PathBuf,
    pub metadata: ArticleMetadata,
    pub markdown: String,
}

impl Article {
    /// Directory that relative image paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[derive(Deserialize, Default)]
struct FrontMatter {
    title: Option<String>,
    #[serde(alias = "cover")]
    cover_image_path: Option<String>,
    author: Option<String>,
    #[serde(alias = "description")]
    digest: Option<String>,
    #[serde(alias = "source_url")]
    content_source_url: Option<String>,
    need_open_comment: Option<Flag>,
    only_fans_can_comment: Option<Flag>,
}

/// Comment flags show up as `true`/`false` or `1`/`0`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn enabled(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

/// Read a Markdown file and its front matter.
pub fn read_article(path: &Path) -> Result<Article> {
    if !path.is_file() {
        return Err(PublishError::not_found(format!(
            "Markdown file not found: {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| PublishError::io(format!("failed to read {}", path.display()), e))?;
    let (front, body) = split_front_matter(&text).ok_or_else(|| {
        PublishError::validation(format!("{} has no YAML front matter", path.display()))
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let metadata = parse_metadata(front, base_dir)?;
    info!(title = %metadata.title, "article metadata loaded");
    Ok(Article {
        path: path.to_path_buf(),
        metadata,
        markdown: body.to_string(),
    })
}

/// Parse front matter text into metadata, resolving the cover path.
pub fn parse_metadata(front_matter: &str, base_dir: &Path) -> Result<ArticleMetadata> {
    let raw: FrontMatter = if front_matter.trim().is_empty() {
        FrontMatter::default()
    } else {
        serde_yaml::from_str(front_matter)
            .map_err(|e| PublishError::validation(format!("invalid front matter: {e}")))?
    };

    let title = raw
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| PublishError::validation("front matter is missing 'title'"))?;
    let cover = raw
        .cover_image_path
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| PublishError::validation("front matter is missing 'cover_image_path'"))?;
    let cover = Path::new(&cover);
    let cover_image_path = if cover.is_absolute() {
        cover.to_path_buf()
    } else {
        base_dir.join(cover)
    };

    Ok(ArticleMetadata {
        title,
        cover_image_path,
        author: raw.author,
        digest: raw.digest,
        content_source_url: raw.content_source_url,
        need_open_comment: raw.need_open_comment.map(|f| f.enabled()).unwrap_or(false),
        only_fans_can_comment: raw.only_fans_can_comment.map(|f| f.enabled()).unwrap_or(false),
    })
}

/// Split `---`-delimited front matter from the body. `None` when the text
/// does not open with a front matter block.
pub fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let first_line_end = text.find('\n')?;
    if text[..first_line_end].trim_end() != "---" {
        return None;
    }
    let rest = &text[first_line_end + 1..];

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((front, body));
        }
        offset += line.len();
    }
    None
}

/// CommonMark to an HTML fragment, with tables, strikethrough and footnotes.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    debug!(bytes = out.len(), "markdown rendered");
    out
}
