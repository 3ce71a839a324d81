// UI layer: spinners while the network is busy, a confirmation prompt
// before a draft is created, and the colored summary printed at the end.
// Nothing here talks to the API; the functions only present results.

use anyhow::Result;
use crossterm::style::Stylize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

use crate::error::PublishError;
use crate::publish::{PreparedDraft, PublishOutcome};

/// Run `work` behind a spinner showing `message`. The spinner only draws
/// when stderr is a terminal.
pub fn with_spinner<T, E>(message: &str, work: impl FnOnce() -> std::result::Result<T, E>) -> std::result::Result<T, E> {
    let spinner = if std::io::stderr().is_terminal() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = work();
    spinner.finish_and_clear();
    result
}

/// Ask before creating the draft. Skipped (treated as yes) when
/// `assume_yes` is set or stdin is not interactive.
pub fn confirm_submission(prepared: &PreparedDraft, assume_yes: bool) -> Result<bool> {
    if assume_yes || !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    let prompt = format!(
        "Create draft '{}' ({} local image(s), {} new upload(s))?",
        prepared.title, prepared.local_images, prepared.uploads
    );
    Ok(Confirm::new().with_prompt(prompt).default(true).interact()?)
}

pub fn print_success(outcome: &PublishOutcome) {
    println!();
    println!(
        "{} Article '{}' uploaded as draft.",
        "Success!".green().bold(),
        outcome.title
    );
    println!("Draft Media ID: {}", outcome.draft_media_id);
    println!("Cover Media ID: {}", outcome.thumb_media_id);
    println!("New uploads:    {}", outcome.uploads);
}

pub fn print_failure(err: &PublishError) {
    eprintln!();
    eprintln!(
        "{} Processing failed ({:?}). {}",
        "Error:".red().bold(),
        err.kind(),
        err
    );
    if err.kind().is_retryable() {
        eprintln!("{}", "This looks transient; running again may succeed.".yellow());
    }
}

pub fn print_cancelled() {
    println!("{}", "Cancelled, no draft created.".yellow());
}

/// Print cache entries as `path -> identifier`.
pub fn print_cache_entries(label: &str, entries: &[(String, String)]) {
    println!("{} ({} entries)", label.bold(), entries.len());
    for (path, id) in entries {
        println!("  {path} -> {id}");
    }
}
