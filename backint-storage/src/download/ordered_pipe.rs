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

use std::collections::HashMap;

use backint_common::pipe::PipeWriter;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{StorageErrorKind, StorageResult};

/// Writes completed parts into the destination FIFO in strict part order.
///
/// Parts complete in arbitrary order; a completed part is parked in the
/// reorder map until every predecessor has been written. One mutex covers
/// the map, the next-part counter, and the pipe, and it is held across the
/// chunked pipe write: a stalled reader therefore blocks inserters behind
/// the stuck writer, which bounds the memory retained in the map.
pub struct OrderedPipeWriter {
    state: Mutex<WriterState>,
    num_parts: u64,
}

struct WriterState {
    pipe: PipeWriter,
    /// 1-based number of the next part to write to the pipe. Every key of
    /// `pending_parts` is strictly greater than this.
    next_index: u64,
    pending_parts: HashMap<u64, Bytes>,
}

impl OrderedPipeWriter {
    pub fn new(pipe: PipeWriter, num_parts: u64) -> OrderedPipeWriter {
        OrderedPipeWriter {
            state: Mutex::new(WriterState {
                pipe,
                next_index: 1,
                pending_parts: HashMap::new(),
            }),
            num_parts,
        }
    }

    /// Hands one completed part over to the writer.
    ///
    /// Drains every run of consecutive buffered parts starting at the next
    /// expected part number. Success does not imply this very part has been
    /// written: with a gap below `part_number`, the part stays parked and is
    /// drained by the worker that fills the gap.
    pub async fn submit(&self, part_number: u64, payload: Bytes) -> StorageResult<()> {
        {
            let mut state = self.state.lock().await;
            if state.next_index > self.num_parts {
                // The plan is fully written already: drop the payload rather
                // than overrun the pipe.
                debug!(
                    part_number,
                    num_parts = self.num_parts,
                    "next index beyond the part count, skipping pipe write"
                );
                return Ok(());
            }
            state.pending_parts.insert(part_number, payload);
            debug!(
                part_number,
                num_pending_parts = state.pending_parts.len(),
                next_index = state.next_index,
                "buffered part"
            );
        }
        loop {
            let mut state = self.state.lock().await;
            let WriterState {
                pipe,
                next_index,
                pending_parts,
            } = &mut *state;
            let part_to_write = *next_index;
            let Some(payload) = pending_parts.get(&part_to_write) else {
                return Ok(());
            };
            debug!(
                pipe = %pipe.path().display(),
                part_number = part_to_write,
                "writing part to pipe"
            );
            let pipe_path = pipe.path().display().to_string();
            pipe.write_chunked(payload).await.map_err(|io_err| {
                StorageErrorKind::PipeWrite
                    .with_error(io_err)
                    .add_context(format!(
                        "could not write part {part_to_write} to pipe `{pipe_path}`"
                    ))
            })?;
            pending_parts.remove(&part_to_write);
            *next_index = part_to_write + 1;
        }
    }

    /// Number of parts fully written to the pipe so far.
    pub async fn num_parts_written(&self) -> u64 {
        self.state.lock().await.next_index - 1
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use backint_common::pipe::PipeWriter;
    use bytes::Bytes;
    use nix::sys::stat::Mode;
    use nix::unistd::mkfifo;
    use tokio::io::AsyncReadExt;
    use tokio::task::JoinHandle;

    use super::OrderedPipeWriter;

    const PARTS: [&[u8]; 5] = [b"AA", b"BB", b"CC", b"DD", b"EE"];

    fn spawn_fifo_reader(fifo_path: &Path) -> JoinHandle<Vec<u8>> {
        let fifo_path = fifo_path.to_path_buf();
        tokio::spawn(async move {
            let mut fifo = tokio::fs::File::open(fifo_path).await.unwrap();
            let mut payload = Vec::new();
            fifo.read_to_end(&mut payload).await.unwrap();
            payload
        })
    }

    async fn ordered_writer(fifo_path: &PathBuf) -> OrderedPipeWriter {
        let pipe = PipeWriter::open(fifo_path, Duration::ZERO).await.unwrap();
        OrderedPipeWriter::new(pipe, PARTS.len() as u64)
    }

    #[tokio::test]
    async fn test_parts_arriving_in_order() {
        let tempdir = tempfile::tempdir().unwrap();
        let fifo_path = tempdir.path().join("in-order.fifo");
        mkfifo(&fifo_path, Mode::S_IRWXU).unwrap();
        let reader = spawn_fifo_reader(&fifo_path);

        let writer = ordered_writer(&fifo_path).await;
        for (part_idx, part_payload) in PARTS.iter().enumerate() {
            writer
                .submit(part_idx as u64 + 1, Bytes::from_static(part_payload))
                .await
                .unwrap();
            assert_eq!(writer.num_parts_written().await, part_idx as u64 + 1);
        }
        drop(writer);

        assert_eq!(reader.await.unwrap(), b"AABBCCDDEE");
    }

    #[tokio::test]
    async fn test_parts_arriving_in_reverse_order() {
        let tempdir = tempfile::tempdir().unwrap();
        let fifo_path = tempdir.path().join("reverse.fifo");
        mkfifo(&fifo_path, Mode::S_IRWXU).unwrap();
        let reader = spawn_fifo_reader(&fifo_path);

        let writer = ordered_writer(&fifo_path).await;
        for part_number in [5u64, 4, 3, 2] {
            writer
                .submit(part_number, Bytes::from_static(PARTS[part_number as usize - 1]))
                .await
                .unwrap();
            // Nothing can be written while part 1 is missing.
            assert_eq!(writer.num_parts_written().await, 0);
        }
        writer.submit(1, Bytes::from_static(PARTS[0])).await.unwrap();
        assert_eq!(writer.num_parts_written().await, 5);
        drop(writer);

        assert_eq!(reader.await.unwrap(), b"AABBCCDDEE");
    }

    #[tokio::test]
    async fn test_late_part_drains_the_run_behind_the_gap() {
        let tempdir = tempfile::tempdir().unwrap();
        let fifo_path = tempdir.path().join("gap.fifo");
        mkfifo(&fifo_path, Mode::S_IRWXU).unwrap();
        let reader = spawn_fifo_reader(&fifo_path);

        let writer = ordered_writer(&fifo_path).await;
        for part_number in [1u64, 2, 4, 5] {
            writer
                .submit(part_number, Bytes::from_static(PARTS[part_number as usize - 1]))
                .await
                .unwrap();
        }
        // Parts 4 and 5 stay parked behind the missing part 3.
        assert_eq!(writer.num_parts_written().await, 2);

        writer.submit(3, Bytes::from_static(PARTS[2])).await.unwrap();
        assert_eq!(writer.num_parts_written().await, 5);
        drop(writer);

        assert_eq!(reader.await.unwrap(), b"AABBCCDDEE");
    }

    #[tokio::test]
    async fn test_out_of_range_part_is_skipped() {
        let tempdir = tempfile::tempdir().unwrap();
        let fifo_path = tempdir.path().join("out-of-range.fifo");
        mkfifo(&fifo_path, Mode::S_IRWXU).unwrap();
        let reader = spawn_fifo_reader(&fifo_path);

        let writer = ordered_writer(&fifo_path).await;
        for (part_idx, part_payload) in PARTS.iter().enumerate() {
            writer
                .submit(part_idx as u64 + 1, Bytes::from_static(part_payload))
                .await
                .unwrap();
        }
        // The plan is complete: a part beyond the count is acknowledged
        // without touching the pipe.
        writer.submit(6, Bytes::from_static(b"FF")).await.unwrap();
        assert_eq!(writer.num_parts_written().await, 5);
        drop(writer);

        assert_eq!(reader.await.unwrap(), b"AABBCCDDEE");
    }
}
