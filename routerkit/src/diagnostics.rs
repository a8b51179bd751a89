//! Helpers for reading diagnostic command output.

use std::sync::LazyLock;

use log::warn;
use regex::Regex;

static PACKET_LOSS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)% packet loss").ok());

/// Extract the packet loss percentage from `ping` output.
///
/// ```
/// use routerkit::diagnostics::packet_loss;
///
/// let output = "3 packets transmitted, 3 received, 0% packet loss, time 2003ms";
/// assert_eq!(packet_loss(output), Some(0.0));
/// ```
pub fn packet_loss(output: &str) -> Option<f64> {
    let loss = PACKET_LOSS
        .as_ref()?
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok());

    if loss.is_none() {
        warn!("no packet loss figure in ping output: {:?}", output);
    }
    loss
}

/// The `ping` invocation used by [`crate::session::Session::ping`].
pub(crate) fn ping_command(ip: &str, count: u32, wait_secs: u64) -> String {
    format!("ping -c {count} -W {wait_secs} {ip}")
}
