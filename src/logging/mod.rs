use std::io::{self, Write};

use env_logger::Builder;
use log::LevelFilter;
use tokio::{
    fs::{create_dir_all, metadata, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    runtime::Runtime,
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        watch,
    },
    task::JoinHandle,
};

use crate::{
    config, config_error,
    core::{BridgeError, BridgeResult},
};

/// `io::Write` end of the log channel handed to env_logger.
pub struct AsyncWriter {
    sender: UnboundedSender<Vec<u8>>,
}

impl Write for AsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let data = buf.to_vec();
        self.sender.send(data).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes log records to a file from a background task so request handling
/// never blocks on disk.
pub struct Logger {
    sender: UnboundedSender<Vec<u8>>,
    receiver: UnboundedReceiver<Vec<u8>>,
    config: config::Log,
}

impl Logger {
    pub fn new(config: config::Log) -> Self {
        let (sender, receiver) = unbounded_channel::<Vec<u8>>();
        Self {
            sender,
            receiver,
            config,
        }
    }

    pub fn create_async_writer(&self) -> AsyncWriter {
        AsyncWriter {
            sender: self.sender.clone(),
        }
    }

    /// Install env_logger as the global logger, piped into this writer.
    /// `RUST_LOG` still overrides the configured level per module.
    pub fn init_env_logger(&self) -> BridgeResult<()> {
        let level: LevelFilter = self
            .config
            .level
            .parse()
            .map_err(|e| config_error!("Invalid log level {}: {e}", self.config.level))?;

        let writer = self.create_async_writer();
        Builder::new()
            .filter_level(level)
            .parse_env(env_logger::Env::default())
            .target(env_logger::Target::Pipe(Box::new(writer)))
            .try_init()
            .map_err(|e| config_error!("Failed to install logger: {e}"))
    }

    /// Drain the channel into the log file until `shutdown` flips to `true`.
    /// Records already queued at shutdown are still written.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> BridgeResult<()> {
        let Logger {
            sender,
            mut receiver,
            config,
        } = self;
        // only writers handed out keep the channel open
        drop(sender);

        let log_file_path = &config.path;
        if let Some(parent) = std::path::Path::new(log_file_path).parent() {
            if !parent.as_os_str().is_empty() && metadata(parent).await.is_err() {
                create_dir_all(parent).await.map_err(|e| {
                    config_error!("Failed to create log path {}: {e}", parent.display())
                })?;
            }
        }

        let mut file = BufWriter::new(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(log_file_path)
                .await
                .map_err(|e| config_error!("Failed to open log file {log_file_path}: {e}"))?,
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },

                data = receiver.recv() => {
                    match data {
                        Some(data) => {
                            if let Err(e) = file.write_all(&data).await {
                                eprintln!("Failed to write to log file: {e}");
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        while let Ok(data) = receiver.try_recv() {
            if let Err(e) = file.write_all(&data).await {
                eprintln!("Failed to write to log file: {e}");
            }
        }

        file.flush().await?;
        Ok(())
    }
}

/// Runs a [`Logger`] on its own single-threaded runtime.
///
/// Stopping or dropping the service signals shutdown and blocks until every
/// queued record is on disk, so early returns do not lose log lines.
pub struct LogService {
    runtime: Option<Runtime>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<BridgeResult<()>>>,
}

impl LogService {
    pub fn start(logger: Logger) -> BridgeResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        let (shutdown, rx) = watch::channel(false);
        let task = runtime.spawn(logger.run(rx));
        Ok(Self {
            runtime: Some(runtime),
            shutdown,
            task: Some(task),
        })
    }

    /// Flush queued records and stop the writer task.
    pub fn stop(mut self) -> BridgeResult<()> {
        self.shutdown_and_wait()
    }

    fn shutdown_and_wait(&mut self) -> BridgeResult<()> {
        let (Some(runtime), Some(task)) = (self.runtime.take(), self.task.take()) else {
            return Ok(());
        };
        let _ = self.shutdown.send(true);
        runtime
            .block_on(task)
            .map_err(|e| BridgeError::Internal(format!("Log writer task failed: {e}")))?
    }
}

impl Drop for LogService {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_and_wait() {
            eprintln!("Failed to stop log writer: {e}");
        }
    }
}
