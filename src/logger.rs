use std::{fs, fs::OpenOptions, io, path::PathBuf};

use chrono::Local;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 이 값이 살아있는 동안만 non-blocking writer가 로그를 내보낸다
pub struct TracingGuards {
    _file: WorkerGuard,
    _stdout: WorkerGuard,
}

/// stdout과 날짜별 파일 로깅을 함께 설정한다.
/// 레벨은 RUST_LOG를 따르고 없으면 info
pub fn init_tracing(log_dir: &str, prefix: &str) -> io::Result<TracingGuards> {
    let (file_writer, file_guard) = daily_file_appender(log_dir, prefix)?;
    let (stdout_writer, stdout_guard) = non_blocking(io::stdout());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // 파일에는 INFO 이상만 남긴다
    let file_filter = EnvFilter::new("info");

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(file_filter),
        )
        .with(fmt::layer().with_writer(stdout_writer).with_ansi(true))
        .init();

    Ok(TracingGuards {
        _file: file_guard,
        _stdout: stdout_guard,
    })
}

/// `logs/estate-ticker.2025-11-29.log` 형식의 파일을 연다
fn daily_file_appender(
    base_dir: &str,
    prefix: &str,
) -> io::Result<(non_blocking::NonBlocking, WorkerGuard)> {
    fs::create_dir_all(base_dir)?;
    let path = log_file_path(base_dir, prefix, &Local::now().format("%Y-%m-%d").to_string());

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(non_blocking(file))
}

fn log_file_path(base_dir: &str, prefix: &str, date: &str) -> PathBuf {
    let mut path = PathBuf::from(base_dir);
    path.push(format!("{prefix}.{date}.log"));
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path() {
        let path = log_file_path("logs", "estate-ticker", "2025-11-29");
        assert_eq!(path, PathBuf::from("logs/estate-ticker.2025-11-29.log"));
    }
}
