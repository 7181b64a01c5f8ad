use std::fmt::Write as _;
use std::path::Path;

use serde::ser;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::AppResult;
use crate::cli::OutputFormat;
use crate::git::{Commit, FileAction, SyncReport};

/// Write a sync report in the requested format to a file or stdout.
#[tracing::instrument(name = "Writing sync report", level = "debug", skip(report))]
pub async fn write_report(
    output: Option<&Path>,
    format: &OutputFormat,
    report: &SyncReport,
) -> AppResult<()> {
    let data = match format {
        OutputFormat::Json => to_json(report)?,
        OutputFormat::Summary => {
            let mut text = String::new();
            let version = if report.version.is_empty() {
                "(untagged)"
            } else {
                report.version.as_str()
            };
            writeln!(text, "head {} {}", report.branch_head, version)?;
            writeln!(text)?;
            text.push_str(&render_summary(&report.commits)?);
            text
        }
    };
    write_text(output, data).await
}

/// Write bare commit records in the requested format to a file or stdout.
#[tracing::instrument(name = "Writing commits", level = "debug", skip(commits))]
pub async fn write_commits(
    output: Option<&Path>,
    format: &OutputFormat,
    commits: &[Commit],
) -> AppResult<()> {
    let data = match format {
        OutputFormat::Json => to_json(&commits)?,
        OutputFormat::Summary => render_summary(commits)?,
    };
    write_text(output, data).await
}

fn to_json<S: ser::Serialize>(obj: &S) -> AppResult<String> {
    let mut data = serde_json::to_string_pretty(obj)?;
    data.push('\n');
    Ok(data)
}

/// `git log --stat` style rendering, one block per commit.
pub fn render_summary(commits: &[Commit]) -> AppResult<String> {
    let mut out = String::new();
    for commit in commits {
        writeln!(out, "{} {}", &commit.hash[..7.min(commit.hash.len())], commit.short_message)?;
        let names: Vec<String> = commit
            .files
            .iter()
            .map(|file| match (&file.action, &file.from) {
                (FileAction::Rename, Some(from)) => format!("{from} => {}", file.name),
                _ => file.name.clone(),
            })
            .collect();
        let width = names.iter().map(String::len).max().unwrap_or(0);
        for (name, file) in names.iter().zip(&commit.files) {
            writeln!(out, " {name:<width$} | {}", file.stat)?;
        }
        writeln!(
            out,
            " {} file(s) changed, {} line(s) modified",
            commit.files.len(),
            commit.modified_lines
        )?;
        writeln!(out)?;
    }
    Ok(out)
}

/// Write text to `output`, or stdout when no file is given.
pub async fn write_text(output: Option<&Path>, data: String) -> AppResult<()> {
    match output {
        Some(path) => write_file(path, data).await,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(data.as_bytes()).await?;
            stdout.flush().await?;
            Ok(())
        }
    }
}

/// Write raw string data to a file, overwriting any existing content.
async fn write_file(output: &Path, data: String) -> AppResult<()> {
    debug!("Writing {} bytes to {}", data.len(), output.display());
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output)
        .await?;
    file.write_all(data.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
