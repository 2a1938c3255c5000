//! Tracing setup: console layer on stderr plus a rotating JSON file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

const VERBOSE_FILTER: &str = "replydesk=debug,replydesk_config=debug,replydesk_llm=debug,replydesk_knowledge=debug,replydesk_tracker=debug,replydesk_mail=debug,replydesk_domain=debug,info";
const DEFAULT_FILTER: &str = "warn";
const FILE_FILTER: &str = "replydesk=trace,replydesk_config=trace,replydesk_llm=trace,replydesk_knowledge=trace,replydesk_tracker=trace,replydesk_mail=trace,replydesk_domain=trace,info";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the process. When the log directory cannot be created only the
/// console layer is installed.
pub fn init(verbose: bool, log_dir: &Path) -> Option<WorkerGuard> {
    let console_filter = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::new(console_filter));

    if std::fs::create_dir_all(log_dir).is_err() {
        tracing_subscriber::registry().with(console).init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "replydesk.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(console)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(FILE_FILTER)),
        )
        .init();

    Some(guard)
}
