use std::time::Duration;
use tokio::time::Instant;

use crate::Error;

/// Default polling interval for [`wait_for_states`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Anything an attribute value can be read from.
#[async_trait::async_trait]
pub trait AttributeSource: Send {
    async fn read_attribute(&mut self, name: &str) -> Result<String, Error>;
}

/// Returns `true` if `value` equals one of `accepted`, ignoring surrounding whitespace
/// and ASCII case.
pub fn state_matches(value: &str, accepted: &[&str]) -> bool {
    let value = value.trim();
    accepted.iter().any(|a| a.trim().eq_ignore_ascii_case(value))
}

/// Polls `attribute` every `interval` until its value is one of `accepted`, and returns
/// that value.
///
/// Acknowledgement of a command and the state it requests are separate guarantees in
/// this protocol, so this is how callers wait for the latter. The attribute is always
/// read at least once, and once more at the deadline. Errors from the source are
/// returned as-is; only a value outside `accepted` is retried.
pub async fn wait_for_states<S>(
    source: &mut S,
    attribute: &str,
    timeout: Duration,
    interval: Duration,
    accepted: &[&str],
) -> Result<String, Error>
where
    S: AttributeSource + ?Sized,
{
    let deadline = Instant::now() + timeout;

    loop {
        let value = source.read_attribute(attribute).await?;
        if state_matches(&value, accepted) {
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(attribute, value = %value, ?accepted, "State wait timed out");
            return Err(Error::StateTimeout {
                attribute: attribute.to_string(),
                last: Some(value),
                accepted: accepted.iter().map(ToString::to_string).collect(),
            });
        }

        tracing::trace!(attribute, value = %value, "Waiting for state");
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
