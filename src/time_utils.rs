use time::{OffsetDateTime, UtcOffset};
use tracing::trace;

use crate::AppResult;

/// Convert a libgit2 timestamp into a datetime carrying the author's offset.
#[tracing::instrument(level = "trace", skip_all)]
pub fn git_time_to_datetime(time: git2::Time) -> AppResult<OffsetDateTime> {
    let offset = UtcOffset::from_whole_seconds(time.offset_minutes() * 60)?;
    let dt = OffsetDateTime::from_unix_timestamp(time.seconds())?.to_offset(offset);
    trace!("Converted git time {}s to datetime {}", time.seconds(), dt);
    Ok(dt)
}
