use std::{
    io::{Sink, sink},
    path::PathBuf,
};

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{
        MakeWriter,
        writer::{EitherWriter, MakeWriterExt as _},
    },
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter.
///
/// Callers provide the variable name so it can differ per binary, e.g.
/// `K8S_PLUGIN_LOG`. If the variable is unset or invalid, the maximum log level
/// is INFO.
///
/// Log output is copied to a file if `{env}_DIRECTORY` (e.g.
/// `K8S_PLUGIN_LOG_DIRECTORY`) names a directory. The file is rotated
/// regularly.
///
/// Installing the subscriber fails silently if a global subscriber is already
/// set, so calling this more than once is harmless.
pub fn initialize_logging(env: &str, app_name: &str) {
    let filter = EnvFilter::try_from_env(env)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_appender = file_appender_directory.as_deref().map(|log_dir| {
        RollingFileAppender::builder()
            .filename_suffix(format!("{app_name}.log"))
            .max_log_files(6)
            .build(log_dir)
    });
    let (file_appender, file_appender_error) = match file_appender {
        Some(Ok(appender)) => (Some(appender), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout.and(OptionalMakeWriter::from(file_appender)));
    let _ = Registry::default().with(filter).with(fmt).try_init();

    // need to delay logging until after tracing is initialized
    match (file_appender_directory, file_appender_error) {
        (Some(dir), None) => tracing::info!(directory = %dir.display(), "file logging enabled"),
        (Some(dir), Some(err)) => tracing::warn!(
            directory = %dir.display(),
            error = %err,
            "file logging disabled, because the rolling file appender failed to initialize"
        ),
        (None, _) => tracing::debug!("file logging disabled, because no log directory set"),
    }
}

/// Like [`EitherWriter`] but implements [`MakeWriter`] instead of [`std::io::Write`].
/// For selecting writers depending on dynamic configuration.
enum EitherMakeWriter<A, B> {
    A(A),
    B(B),
}

impl<'a, A, B> MakeWriter<'a> for EitherMakeWriter<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = EitherWriter<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        match self {
            Self::A(a) => EitherWriter::A(a.make_writer()),
            Self::B(b) => EitherWriter::B(b.make_writer()),
        }
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        match self {
            Self::A(a) => EitherWriter::A(a.make_writer_for(meta)),
            Self::B(b) => EitherWriter::B(b.make_writer_for(meta)),
        }
    }
}

type OptionalMakeWriter<T> = EitherMakeWriter<T, fn() -> Sink>;

impl<T> From<Option<T>> for OptionalMakeWriter<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(t) => Self::A(t),
            None => Self::B(sink),
        }
    }
}
