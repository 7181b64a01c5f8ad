use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    CertificateCheckStatus, Cred, CredentialType, FetchOptions, Oid, ProxyOptions,
    RemoteCallbacks, Repository,
};
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::git::RepoHandle;
use crate::git::progress::{
    PercentTracker, ProgressWriter, forward_lines, progress_channel,
};
use crate::git::refs::{self, Reference, list_references};
use crate::{AppError, AppResult};

/// Credentials are offered this many times before the transfer gives up.
const MAX_AUTH_ATTEMPTS: usize = 3;
/// User name sent along with a bearer token over HTTP basic auth.
const TOKEN_USERNAME: &str = "x-access-token";
const DEFAULT_SSH_USER: &str = "git";

/// Serializes writes to libgit2's global server timeouts.
static SERVER_TIMEOUTS: Mutex<()> = Mutex::new(());

/// How to authenticate against the remote.
#[derive(Clone, Default)]
pub enum Credentials {
    #[default]
    None,
    UserPass {
        username: String,
        password: String,
    },
    Token(String),
    SshAgent {
        username: Option<String>,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::UserPass { username, .. } => write!(f, "UserPass({username}, ***)"),
            Credentials::Token(_) => write!(f, "Token(***)"),
            Credentials::SshAgent { username } => write!(f, "SshAgent({username:?})"),
        }
    }
}

impl Credentials {
    fn to_cred(
        &self,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        match self {
            Credentials::UserPass { username, password }
                if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) =>
            {
                Cred::userpass_plaintext(username, password)
            }
            Credentials::Token(token) if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) => {
                Cred::userpass_plaintext(TOKEN_USERNAME, token)
            }
            Credentials::SshAgent { username } => {
                let user = username
                    .as_deref()
                    .or(username_from_url)
                    .unwrap_or(DEFAULT_SSH_USER);
                if allowed.contains(CredentialType::USERNAME) {
                    Cred::username(user)
                } else if allowed.contains(CredentialType::SSH_KEY) {
                    Cred::ssh_key_from_agent(user)
                } else {
                    Err(unsupported(allowed))
                }
            }
            Credentials::None => Err(git2::Error::from_str(
                "the remote requires authentication but no credentials were given",
            )),
            _ => Err(unsupported(allowed)),
        }
    }
}

fn unsupported(allowed: CredentialType) -> git2::Error {
    git2::Error::from_str(&format!(
        "the remote asked for {allowed:?} credentials which were not given"
    ))
}

/// Inputs of a sync.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub destination: PathBuf,
    pub url: String,
    pub branch: String,
    pub credentials: Credentials,
    /// Applies to the network transfer only.
    pub timeout: Duration,
    /// Accept any server certificate. Never implied.
    pub insecure_tls: bool,
}

/// A fresh working copy plus the reference snapshot taken right after cloning.
#[derive(Debug)]
pub struct SyncOutcome {
    pub repo: RepoHandle,
    pub references: Vec<Reference>,
    /// Zero when `refs/remotes/origin/<branch>` does not exist.
    pub branch_head: Oid,
    pub needs_checkout: bool,
}

/// Deadline shared by the transfer callbacks.
#[derive(Debug)]
pub(crate) struct Deadline {
    at: Instant,
}

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub(crate) fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Bound libgit2's socket connects and reads, which never reach a callback
/// while the server is silent.
fn set_server_timeouts(url: &str, timeout: Duration) -> AppResult<()> {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX).max(1);
    let _guard = SERVER_TIMEOUTS.lock().unwrap_or_else(PoisonError::into_inner);
    // SAFETY: writers are serialized by the lock. Both options are plain
    // integers that libgit2 reads when it opens a socket, so a concurrent
    // transfer sees either the old or the new value.
    let applied = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)
            .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(millis))
    };
    applied.map_err(|source| AppError::Clone {
        url: url.to_string(),
        source,
    })
}

/// Delete and recreate the destination directory.
#[tracing::instrument(level = "debug")]
async fn prepare_destination(path: &Path) -> AppResult<()> {
    let fs_err = |source| AppError::Filesystem {
        path: path.to_path_buf(),
        source,
    };
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed previous working copy at {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(fs_err(e)),
    }
    tokio::fs::create_dir_all(path).await.map_err(fs_err)
}

/// Producer side of a sync: clone while pushing progress into `writer`.
///
/// Runs on a blocking thread. `writer` is dropped on return, closing the pipe
/// whether the clone worked or not.
fn clone_repository(options: &SyncOptions, writer: ProgressWriter) -> AppResult<Repository> {
    set_server_timeouts(&options.url, options.timeout)?;
    let deadline = Deadline::after(options.timeout);
    let attempts = Cell::new(0usize);
    let mut receiving = PercentTracker::default();
    let mut resolving = PercentTracker::default();

    let mut callbacks = RemoteCallbacks::new();
    callbacks.sideband_progress(|data| {
        writer.write(data);
        !deadline.expired()
    });
    callbacks.transfer_progress(|stats| {
        if let Some(line) = receiving.report(
            "Receiving objects",
            stats.received_objects(),
            stats.total_objects(),
        ) {
            writer.write_str(&line);
        }
        if let Some(line) = resolving.report(
            "Resolving deltas",
            stats.indexed_deltas(),
            stats.total_deltas(),
        ) {
            writer.write_str(&line);
        }
        !deadline.expired()
    });
    callbacks.credentials(|_url, username_from_url, allowed| {
        attempts.set(attempts.get() + 1);
        if attempts.get() > MAX_AUTH_ATTEMPTS {
            return Err(git2::Error::from_str("credentials were rejected"));
        }
        options.credentials.to_cred(username_from_url, allowed)
    });
    if options.insecure_tls {
        warn!("TLS certificate verification is disabled for {}", options.url);
        callbacks.certificate_check(|_cert, host| {
            debug!("Accepting certificate for {} without verification", host);
            Ok(CertificateCheckStatus::CertificateOk)
        });
    }

    let mut proxy = ProxyOptions::new();
    proxy.auto();
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks).proxy_options(proxy);

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options);
    let cloned = builder.clone(&options.url, &options.destination);
    cloned.map_err(|source| {
        if deadline.expired() {
            AppError::CloneTimeout {
                url: options.url.clone(),
                timeout: options.timeout,
            }
        } else {
            AppError::Clone {
                url: options.url.clone(),
                source,
            }
        }
    })
}

/// Commit `refs/remotes/origin/<branch>` points at, or zero.
fn branch_head(references: &[Reference], branch: &str) -> Oid {
    let name = format!("refs/remotes/origin/{branch}");
    match refs::find(references, &name).and_then(Reference::target_oid) {
        Some(oid) => oid,
        None => {
            warn!("Remote branch {} not found", name);
            Oid::zero()
        }
    }
}

/// Run a blocking `produce` while forwarding its progress into `progress`.
///
/// The transfer is bounded by `timeout` from the outside. On expiry the
/// blocking thread is left to unwind on its own (libgit2's socket timeouts end
/// it) and only the progress it buffered so far is forwarded. Progress is
/// always drained before an error is returned.
async fn run_transfer<T, F, W>(
    url: &str,
    timeout: Duration,
    produce: F,
    progress: &mut W,
) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(ProgressWriter) -> AppResult<T> + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let (writer, rx) = progress_channel();
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let transfer = async move {
        let task = tokio::task::spawn_blocking(move || produce(writer));
        let joined = tokio::time::timeout(timeout, task).await;
        // The receiver may already be gone once the pipe closed on its own.
        let _ = done_tx.send(());
        joined
    };
    let stop = async move {
        let _ = done_rx.await;
    };
    let (joined, forwarded) = tokio::join!(transfer, forward_lines(rx, progress, stop));
    match forwarded {
        Ok(lines) => debug!("Forwarded {} progress line(s)", lines),
        Err(e) => warn!("Unable to write progress output: {}", e),
    }
    match joined {
        Ok(result) => result?,
        Err(_) => {
            warn!(
                "Transfer from {} did not finish within {}",
                url,
                humantime::format_duration(timeout)
            );
            Err(AppError::CloneTimeout {
                url: url.to_string(),
                timeout,
            })
        }
    }
}

/// Wipe `options.destination`, clone into it and snapshot its references.
///
/// Progress lines are written to `progress` while the transfer runs. They are
/// fully drained before any clone error is returned.
#[tracing::instrument(name = "Cloning", level = "info", skip(options, progress), fields(url = %options.url))]
pub async fn sync<W>(options: &SyncOptions, progress: &mut W) -> AppResult<SyncOutcome>
where
    W: AsyncWrite + Unpin,
{
    prepare_destination(&options.destination).await?;

    let repo = {
        let owned = options.clone();
        run_transfer(
            &options.url,
            options.timeout,
            move |writer| clone_repository(&owned, writer),
            progress,
        )
        .await?
    };
    info!("Cloned {} into {}", options.url, options.destination.display());

    let references = list_references(&repo)?;
    let branch_head = branch_head(&references, &options.branch);
    let local = format!("refs/heads/{}", options.branch);
    let needs_checkout = refs::find(&references, &local).is_none();
    debug!(
        "Branch {} at {}, checkout needed: {}",
        options.branch, branch_head, needs_checkout
    );

    Ok(SyncOutcome {
        repo: RepoHandle::from_parts(repo, options.destination.clone()),
        references,
        branch_head,
        needs_checkout,
    })
}

/// Create the local branch at `head` and check it out.
///
/// A no-op unless `needs_checkout` is set and `head` is non-zero.
#[tracing::instrument(level = "debug", skip(handle))]
pub fn checkout(handle: &RepoHandle, branch: &str, head: Oid, needs_checkout: bool) -> AppResult<()> {
    if !needs_checkout || head.is_zero() {
        debug!("Nothing to check out for {}", branch);
        return Ok(());
    }
    let checkout_err = |source| AppError::Checkout {
        branch: branch.to_string(),
        source,
    };
    let repo = handle.repository();
    let commit = repo.find_commit(head).map_err(checkout_err)?;
    let mut local = repo.branch(branch, &commit, false).map_err(checkout_err)?;
    local
        .set_upstream(Some(&format!("origin/{branch}")))
        .map_err(checkout_err)?;
    repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
        .map_err(checkout_err)?;
    repo.set_head(&format!("refs/heads/{branch}"))
        .map_err(checkout_err)?;
    info!("Checked out {} at {}", branch, head);
    Ok(())
}
