//! Screen reading: a screenshot through `grim`/`hyprshot`, words and boxes
//! through `tesseract`'s TSV output.

use crate::desktop::{command_exists, pick_backend, run_checked};
use crate::params::{optional_bool, optional_str, optional_u64, required_str};
use crate::traits::{ActionOutcome, Capability, CapabilityError, Parameters};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tracing::debug;

type Result<T> = std::result::Result<T, CapabilityError>;

/// Matches shown by `find_text` when no `limit` is given; 0 means all.
const DEFAULT_FIND_LIMIT: u64 = 20;

/// Words below this tesseract confidence are ignored by `find_text`.
const DEFAULT_MIN_CONFIDENCE: u64 = 60;

static CAPTURES: AtomicU64 = AtomicU64::new(0);

fn invalid(msg: impl Into<String>) -> CapabilityError {
    CapabilityError::InvalidParameters(msg.into())
}

/// A recognised word and its bounding box in screen pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub center_x: i32,
    pub center_y: i32,
}

/// Tesseract language codes such as `eng` or `eng+deu`.
fn validate_lang(lang: &str) -> Result<()> {
    if lang.is_empty() || lang.len() > 32 {
        return Err(invalid("lang must be 1-32 characters"));
    }
    if !lang
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '_')
    {
        return Err(invalid(format!("invalid lang: {lang}")));
    }
    Ok(())
}

fn validate_image_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(invalid("path cannot be empty"));
    }
    if path.contains('\0') || path.starts_with('-') {
        return Err(invalid(format!("invalid path: {path}")));
    }
    Ok(())
}

fn min_confidence(params: &Parameters, default: u64) -> Result<f32> {
    let value = optional_u64(params, "min_confidence", default)?;
    if value > 100 {
        return Err(invalid("min_confidence must be within 0-100"));
    }
    Ok(value as f32)
}

/// Word rows of `tesseract ... tsv`. Rows without text, with a negative
/// confidence or with an empty box are skipped.
pub fn parse_tesseract_tsv(tsv: &str) -> Vec<OcrWord> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            let confidence = cols[10].trim().parse::<f32>().unwrap_or(-1.0);
            if confidence < 0.0 {
                return None;
            }
            let field = |i: usize, fallback: i32| cols[i].trim().parse::<i32>().unwrap_or(fallback);
            let (x, y, width, height) = (field(6, -1), field(7, -1), field(8, 0), field(9, 0));
            if x < 0 || y < 0 || width <= 0 || height <= 0 {
                return None;
            }
            Some(OcrWord {
                text: text.to_string(),
                confidence,
                x,
                y,
                width,
                height,
                center_x: x + width / 2,
                center_y: y + height / 2,
            })
        })
        .collect()
}

/// Words containing `query`, in reading order, at most `limit` (0 = all).
fn matching_words(
    words: Vec<OcrWord>,
    query: &str,
    case_sensitive: bool,
    limit: usize,
    min_confidence: f32,
) -> Vec<OcrWord> {
    let needle = if case_sensitive {
        query.to_string()
    } else {
        query.to_lowercase()
    };
    let hits = words.into_iter().filter(|word| {
        word.confidence >= min_confidence
            && if case_sensitive {
                word.text.contains(&needle)
            } else {
                word.text.to_lowercase().contains(&needle)
            }
    });
    if limit == 0 {
        hits.collect()
    } else {
        hits.take(limit).collect()
    }
}

/// Image handed to tesseract. Screenshots taken here are removed on drop,
/// including when the invocation is aborted.
struct ScreenImage {
    path: PathBuf,
    owned: bool,
}

impl ScreenImage {
    fn existing(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            owned: false,
        }
    }

    async fn capture() -> Result<Self> {
        let name = format!(
            "kalki-shot-{}-{}-{}.png",
            std::process::id(),
            chrono::Utc::now().timestamp_millis(),
            CAPTURES.fetch_add(1, Ordering::Relaxed)
        );
        let image = Self {
            path: std::env::temp_dir().join(name),
            owned: true,
        };
        let target = image.path_str()?;
        match pick_backend(&["grim", "hyprshot"]).await? {
            "hyprshot" => run_checked("hyprshot", &["-m", "output", "-o", target]).await?,
            backend => run_checked(backend, &[target]).await?,
        }
        Ok(image)
    }

    fn path_str(&self) -> Result<&str> {
        self.path
            .to_str()
            .ok_or_else(|| CapabilityError::ExecutionFailed("non UTF-8 image path".to_string()))
    }
}

impl Drop for ScreenImage {
    fn drop(&mut self) {
        if self.owned {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "Screenshot not removed");
            }
        }
    }
}

async fn run_tesseract(image: &Path, lang: Option<&str>) -> Result<String> {
    let mut command = Command::new("tesseract");
    command.arg(image).args(["stdout", "tsv"]);
    if let Some(lang) = lang {
        command.args(["-l", lang]);
    }
    debug!(image = %image.display(), ?lang, "Running OCR");
    let output = command.kill_on_drop(true).output().await?;
    if !output.status.success() {
        return Err(CapabilityError::ExecutionFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Screenshot (unless `path` names an image) and OCR it.
async fn ocr_words(path: Option<&str>, lang: Option<&str>) -> Result<Vec<OcrWord>> {
    if !command_exists("tesseract").await {
        return Err(CapabilityError::Unavailable(
            "tesseract is not installed".to_string(),
        ));
    }
    let image = match path {
        Some(path) => ScreenImage::existing(path),
        None => ScreenImage::capture().await?,
    };
    let tsv = run_tesseract(&image.path, lang).await?;
    Ok(parse_tesseract_tsv(&tsv))
}

pub struct ReadScreenCapability;

#[async_trait]
impl Capability for ReadScreenCapability {
    fn name(&self) -> &str {
        "read_screen"
    }

    fn description(&self) -> &str {
        "Read the text on screen with word positions. params: {\"path\"?: image file, \"lang\"?: tesseract language, \"min_confidence\"?: 0-100}"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome> {
        let path = optional_str(&params, "path");
        if let Some(path) = path {
            validate_image_path(path)?;
        }
        let lang = optional_str(&params, "lang");
        if let Some(lang) = lang {
            validate_lang(lang)?;
        }
        let threshold = min_confidence(&params, 0)?;

        let words: Vec<OcrWord> = ocr_words(path, lang)
            .await?
            .into_iter()
            .filter(|word| word.confidence >= threshold)
            .collect();
        let text = words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(ActionOutcome::ok(json!({ "text": text, "words": words })))
    }
}

pub struct FindTextCapability;

#[async_trait]
impl Capability for FindTextCapability {
    fn name(&self) -> &str {
        "find_text"
    }

    fn description(&self) -> &str {
        "Locate text on screen; matches carry click coordinates (center_x, center_y). params: {\"query\": string, \"case_sensitive\"?: bool, \"limit\"?: int, \"lang\"?: string, \"min_confidence\"?: 0-100}"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome> {
        let query = required_str(&params, "query")?;
        if query.trim().is_empty() {
            return Err(invalid("query cannot be empty"));
        }
        let case_sensitive = optional_bool(&params, "case_sensitive", false)?;
        let limit = usize::try_from(optional_u64(&params, "limit", DEFAULT_FIND_LIMIT)?)
            .map_err(|_| invalid("limit is too large"))?;
        let lang = optional_str(&params, "lang");
        if let Some(lang) = lang {
            validate_lang(lang)?;
        }
        let threshold = min_confidence(&params, DEFAULT_MIN_CONFIDENCE)?;

        let words = ocr_words(None, lang).await?;
        let matches = matching_words(words, query, case_sensitive, limit, threshold);
        debug!(query, found = matches.len(), "Text search on screen");
        Ok(ActionOutcome::ok(json!({
            "query": query,
            "found": !matches.is_empty(),
            "matches": matches,
        })))
    }
}
