use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Color, Style, Styles};
use clap::{ArgAction, Args, ColorChoice, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::{Generator, Shell, generate};
use clap_complete_nushell::Nushell;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{debug, info};

use crate::git::{self, Credentials, RepoHandle, SyncOptions};
use crate::io_utils;
use crate::{AppError, AppResult};

const STYLES: Styles = Styles::styled()
    .header(Style::new().bold())
    .usage(Style::new().bold())
    .error(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red))))
    .literal(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
    .valid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
    .invalid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightRed))))
    .context(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Magenta))))
    .context_value(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
    );

/// Long-form CLI description shown in `--help`.
const LONG_ABOUT: &str = "repo-sync - Incremental commit summaries for remote git repositories

Each sync:
- wipes the destination and clones the remote into it, streaming transfer progress to stderr
- checks out the requested branch
- diffs every commit made after the previous sync point against the one before it
- labels the branch head relative to the closest reachable tag (e.g. v1.2.0-3-gabc1234)";

/// repo-sync - Incremental commit summaries for remote git repositories.
#[derive(Parser, Debug, Clone)]
#[command(author, version, propagate_version = true, about, long_about = Some(LONG_ABOUT), styles = STYLES)]
pub struct Cli {
    /// Color choice for the output
    #[arg(long, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Subcommand to run
    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Output format for commit records.
#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,

    /// A `git log --stat` style listing
    Summary,
}

/// Top-level commands supported by the CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Clone a remote and report every commit since the previous sync
    Sync {
        #[command(flatten)]
        remote: RemoteArgs,
        #[command(flatten)]
        auth: AuthArgs,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Report commits of an existing local repository, without fetching
    Diff {
        /// Path to the repository
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Last commit already reported; empty means the whole history
        #[arg(long, default_value = "")]
        since: String,

        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Print the tag-relative version label of a revision
    Describe {
        /// Path to the repository
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Revision to describe
        #[arg(long, default_value = "HEAD")]
        rev: String,

        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Generate shell completion for a given shell
    Completion {
        /// Output file to write the completion script to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The shell to generate the completion for
        #[arg(value_enum)]
        shell: CompletionShell,

        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },
}

/// Supported completion targets for shell auto-completion.
#[derive(ValueEnum, Clone, Debug)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
    Nushell,
}

impl Display for CompletionShell {
    /// Render the canonical shell name string.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionShell::Bash => "bash",
            CompletionShell::Zsh => "zsh",
            CompletionShell::Fish => "fish",
            CompletionShell::PowerShell => "powershell",
            CompletionShell::Elvish => "elvish",
            CompletionShell::Nushell => "nushell",
        };
        write!(f, "{}", s)
    }
}

impl Generator for &CompletionShell {
    fn generate(&self, cmd: &clap::builder::Command, buf: &mut dyn Write) {
        match self {
            CompletionShell::Bash => Shell::Bash.generate(cmd, buf),
            CompletionShell::Zsh => Shell::Zsh.generate(cmd, buf),
            CompletionShell::Fish => Shell::Fish.generate(cmd, buf),
            CompletionShell::PowerShell => Shell::PowerShell.generate(cmd, buf),
            CompletionShell::Elvish => Shell::Elvish.generate(cmd, buf),
            CompletionShell::Nushell => Nushell.generate(cmd, buf),
        }
    }

    fn file_name(&self, name: &str) -> String {
        match self {
            CompletionShell::Bash => Shell::Bash.file_name(name),
            CompletionShell::Zsh => Shell::Zsh.file_name(name),
            CompletionShell::Fish => Shell::Fish.file_name(name),
            CompletionShell::PowerShell => Shell::PowerShell.file_name(name),
            CompletionShell::Elvish => Shell::Elvish.file_name(name),
            CompletionShell::Nushell => Nushell.file_name(name),
        }
    }
}

/// Which remote to sync and where.
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// URL of the remote repository
    pub url: String,

    /// Branch to check out and describe
    #[arg(short, long, default_value = "main")]
    pub branch: String,

    /// Working copy location. Wiped on every sync!
    ///
    /// Defaults to a directory named after the repository under
    /// `$XDG_CACHE_HOME/repo-sync/checkouts`
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Last commit reported by the previous sync; empty means the whole history
    #[arg(long, default_value = "")]
    pub since: String,

    /// Maximum time the network transfer may take
    ///
    /// Accepts human readable durations such as `90s`, `5m` or `1h 30m`
    #[arg(long, default_value = "5m")]
    pub timeout: String,

    /// Skip TLS certificate verification
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub insecure: bool,
}

/// Transport credentials. Secrets are best passed through the environment.
#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    /// User name for HTTP basic authentication
    #[arg(long, env = "REPO_SYNC_USERNAME")]
    pub username: Option<String>,

    /// Password for HTTP basic authentication
    #[arg(long, env = "REPO_SYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Access token, sent as HTTP basic authentication
    #[arg(long, env = "REPO_SYNC_TOKEN", hide_env_values = true, conflicts_with_all = ["username", "password"])]
    pub token: Option<String>,

    /// Authenticate over SSH with keys from a running ssh-agent
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub ssh_agent: bool,
}

impl AuthArgs {
    pub fn credentials(&self) -> Credentials {
        if let Some(token) = &self.token {
            Credentials::Token(token.clone())
        } else if self.ssh_agent {
            Credentials::SshAgent {
                username: self.username.clone(),
            }
        } else if let Some(username) = &self.username {
            Credentials::UserPass {
                username: username.clone(),
                password: self.password.clone().unwrap_or_default(),
            }
        } else {
            Credentials::None
        }
    }
}

/// Where and how to write results.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Output file to write the results to
    /// If not provided, prints to stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Helper trait for accessing verbosity flags on commands.
pub trait GetVerbosity {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel>;
}

impl GetVerbosity for Cmd {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel> {
        match self {
            Cmd::Sync { verbosity, .. } => verbosity,
            Cmd::Diff { verbosity, .. } => verbosity,
            Cmd::Describe { verbosity, .. } => verbosity,
            Cmd::Completion { verbosity, .. } => verbosity,
        }
    }
}

/// Directory name for a remote, e.g. `repo` for `git@host:org/repo.git`.
pub fn repo_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':', '\\'])
        .next()
        .unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        "repository".to_string()
    } else {
        name.to_string()
    }
}

impl RemoteArgs {
    fn destination(&self) -> AppResult<PathBuf> {
        match &self.dest {
            Some(dest) => Ok(dest.clone()),
            None => Ok(repo_sync_dirs::checkout_dir(&repo_name(&self.url))?),
        }
    }
}

impl Cmd {
    /// Execute the chosen top-level command.
    #[tracing::instrument(name = "Running command", level = "debug", skip(self))]
    pub async fn run(&self) -> AppResult<()> {
        match self {
            Cmd::Sync {
                remote,
                auth,
                output,
                ..
            } => {
                let options = SyncOptions {
                    destination: remote.destination()?,
                    url: remote.url.clone(),
                    branch: remote.branch.clone(),
                    credentials: auth.credentials(),
                    timeout: humantime::parse_duration(&remote.timeout)?,
                    insecure_tls: remote.insecure,
                };
                debug!("Sync options: {:?}", options);
                let mut progress = tokio::io::stderr();
                let report = git::synchronize(&options, &remote.since, &mut progress).await?;
                io_utils::write_report(output.output.as_deref(), &output.format, &report).await
            }
            Cmd::Diff {
                repo, since, output, ..
            } => {
                let handle = RepoHandle::open(repo)?;
                let commits = git::compute_incremental_diffs(&handle, since)?;
                info!(
                    "Found {} commit(s) in {}",
                    commits.len(),
                    handle.path().display()
                );
                io_utils::write_commits(output.output.as_deref(), &output.format, &commits).await
            }
            Cmd::Describe { repo, rev, .. } => {
                let handle = RepoHandle::open(repo)?;
                let head = handle
                    .repository()
                    .revparse_single(rev)
                    .and_then(|object| object.peel_to_commit())
                    .map(|commit| commit.id())
                    .map_err(AppError::RefResolution)?;
                let label = git::describe(&handle, head)?;
                io_utils::write_text(None, format!("{label}\n")).await
            }
            Cmd::Completion { shell, output, .. } => {
                let mut cmd = Cli::command();
                if let Some(output_path) = output {
                    let mut file = std::fs::OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .create(true)
                        .open(output_path)?;
                    // Write completion script to the requested file.
                    generate(shell, &mut cmd, "repo-sync", &mut file);
                    info!(
                        "Generated completion script for {} at {}",
                        shell,
                        output_path.display()
                    );
                } else {
                    generate(shell, &mut cmd, "repo-sync", &mut std::io::stdout());
                }
                Ok(())
            }
        }
    }
}
