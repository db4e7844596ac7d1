// Copyright (C) 2024 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Capacity assumed for a pipe when `F_GETPIPE_SZ` fails.
pub const DEFAULT_PIPE_BUFFER_SIZE: usize = 1024 * 1024 * 1024;

/// How long a single portion write may block before the transfer is
/// considered stuck and aborted.
pub const PORTION_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Write end of a named pipe.
///
/// The database holds the read end. Writes larger than the kernel buffer are
/// split into portions of at most the queried buffer capacity, each guarded
/// by a timeout so a stalled reader cannot block the transfer forever.
pub struct PipeWriter {
    file: File,
    path: PathBuf,
    buffer_size: usize,
    portion_timeout: Duration,
    portion_delay: Duration,
}

impl PipeWriter {
    /// Opens the write end of the named pipe at `path`.
    ///
    /// Blocks until the reading side has opened the FIFO. `portion_delay` is
    /// slept between successive portion writes to pace a slow reader.
    pub async fn open(path: &Path, portion_delay: Duration) -> io::Result<PipeWriter> {
        let file = OpenOptions::new().write(true).open(path).await?;
        let buffer_size = pipe_buffer_size(&file);
        Ok(PipeWriter {
            file,
            path: path.to_path_buf(),
            buffer_size,
            portion_timeout: PORTION_WRITE_TIMEOUT,
            portion_delay,
        })
    }

    /// Overrides the per-portion write timeout.
    pub fn set_portion_timeout(&mut self, portion_timeout: Duration) {
        self.portion_timeout = portion_timeout;
    }

    /// The kernel buffer capacity of the pipe in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `data` to the pipe in portions of at most the pipe capacity.
    ///
    /// Each portion is fully written (short writes are retried) and flushed
    /// before the next one starts. A portion that does not complete within
    /// the portion timeout fails the whole write with `ErrorKind::TimedOut`.
    pub async fn write_chunked(&mut self, data: &[u8]) -> io::Result<()> {
        for portion in data.chunks(self.buffer_size.max(1)) {
            let portion_write = async {
                self.file.write_all(portion).await?;
                self.file.flush().await
            };
            match tokio::time::timeout(self.portion_timeout, portion_write).await {
                Ok(write_res) => write_res?,
                Err(_elapsed) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("timed out writing to pipe `{}`", self.path.display()),
                    ));
                }
            }
            if !self.portion_delay.is_zero() {
                tokio::time::sleep(self.portion_delay).await;
            }
        }
        Ok(())
    }
}

/// Queries the kernel buffer capacity of the pipe backing `file`.
fn pipe_buffer_size(file: &File) -> usize {
    let size = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETPIPE_SZ) };
    if size <= 0 {
        info!(
            fallback_num_bytes = DEFAULT_PIPE_BUFFER_SIZE,
            "failed to query the pipe buffer size, falling back to the default"
        );
        return DEFAULT_PIPE_BUFFER_SIZE;
    }
    debug!(pipe_buffer_size = size, "queried pipe buffer size");
    size as usize
}
