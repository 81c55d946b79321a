//! Streaming event vocabulary and wire framing.
//!
//! Stream mode surfaces fan-out progress over a persistent connection as
//! newline-delimited frames. Data events ride in `data:` frames; the
//! heartbeat is a comment frame (`: ping`) so intermediary proxies keep
//! the connection alive without mistaking it for payload.

use serde::{Deserialize, Serialize};

use quorum_core::GovernanceLog;

/// One event in a streaming analysis.
///
/// Ordering contract: `Start` precedes every `Result`; `Complete` follows
/// all of them; `Ping` may interleave anywhere in between. `Error` replaces
/// the run when aggregation itself faults before branches can proceed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Declares the total number of results the caller should expect.
    Start { total: usize },

    /// One completed invocation, emitted in completion order.
    Result { log: GovernanceLog },

    /// Idle heartbeat; carries no payload and signals no progress.
    Ping,

    /// All branches have finished.
    Complete,

    /// The aggregation itself faulted; no further events follow.
    Error { message: String },
}

impl StreamEvent {
    /// Render the newline-delimited wire frame for this event.
    pub fn encode_frame(&self) -> String {
        match self {
            // Comment framing keeps pings distinguishable from data at the
            // transport level.
            StreamEvent::Ping => ": ping\n\n".to_string(),
            event => {
                // Serialization of our own enum cannot fail.
                let json = serde_json::to_string(event).unwrap_or_default();
                format!("data: {json}\n\n")
            }
        }
    }
}
