//! Headless host for the ingestion channels.
//!
//! The CLI builds the same `AppState` as the desktop app and forwards its
//! events through a `CliRuntime` channel instead of window events.
//!
//! ```text
//! +-----------------+     +-------------+     +---------------+
//! | McpServer       |     |             |     |               |
//! | GitWatcher      | --> | CliRuntime  | --> | output.rs     |
//! | FileWatcher     |     | (emit())    |     | (print/JSON)  |
//! +-----------------+     +-------------+     +---------------+
//! ```
//!
//! Runs until Ctrl-C, then stops every channel.

mod args;
mod bootstrap;
mod output;
mod runner;

pub use args::Args;
pub use bootstrap::{initialize, CliContext};
pub use output::run_event_loop;
pub use runner::run;
