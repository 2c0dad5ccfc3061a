use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber. `levels` is an `EnvFilter` directive such as
/// `info` or `zookeeper_exporter=debug,framework=info`.
///
/// Calling it more than once is harmless, later calls are ignored.
pub fn init(color: bool, json: bool, levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|err| {
        eprintln!("invalid log level directive {levels:?}: {err}, fallback to info");
        EnvFilter::new("info")
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(color))
            .try_init()
    };

    if let Err(err) = result {
        trace!(message = "tracing subscriber already installed", %err);
    }
}

#[cfg(any(test, feature = "test-util"))]
pub fn test_init() {
    let levels = std::env::var("TEST_LOG").unwrap_or_else(|_| "warn".into());

    init(false, false, &levels)
}

/// Log lines written while the guard returned by [`capture`] is alive.
#[cfg(any(test, feature = "test-util"))]
#[derive(Clone, Default)]
pub struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(any(test, feature = "test-util"))]
impl CapturedLogs {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().expect("lock captured logs");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .expect("lock captured logs")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Record every event of the current thread in plain text, until the guard
/// is dropped.
#[cfg(any(test, feature = "test-util"))]
pub fn capture() -> (tracing::subscriber::DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();

    (tracing::subscriber::set_default(subscriber), logs)
}
