//! Merges a process's stdout and stderr into one stream of lines.

use futures::stream::{self, Stream};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::error::RunnerError;
use super::types::{OutputLine, StreamSource};

/// Longest line emitted in one piece; longer lines are split.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Splits a byte stream on `\n`, `\r` and `\r\n`.
///
/// ffmpeg rewrites its progress line with bare `\r`, so those count as
/// terminators too.
struct LineSplitter<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    after_cr: bool,
}

impl<R: AsyncRead + Unpin> LineSplitter<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            after_cr: false,
        }
    }

    async fn next_line(&mut self) -> Option<std::io::Result<Vec<u8>>> {
        loop {
            let buf = match self.reader.fill_buf().await {
                Ok(buf) => buf,
                Err(e) => return Some(Err(e)),
            };
            if buf.is_empty() {
                if self.pending.is_empty() {
                    return None;
                }
                return Some(Ok(std::mem::take(&mut self.pending)));
            }

            let mut used = 0;
            let mut complete = false;
            for &byte in buf {
                used += 1;
                if byte == b'\n' && self.after_cr {
                    // Second half of a `\r\n`.
                    self.after_cr = false;
                    continue;
                }
                self.after_cr = byte == b'\r';
                if byte == b'\n' || byte == b'\r' {
                    complete = true;
                    break;
                }
                self.pending.push(byte);
                if self.pending.len() >= MAX_LINE_BYTES {
                    complete = true;
                    break;
                }
            }
            self.reader.consume(used);

            if complete {
                return Some(Ok(std::mem::take(&mut self.pending)));
            }
        }
    }
}

/// Reads `reader` line by line until EOF.
///
/// The final line is emitted even without a terminator. A read error is
/// yielded once and ends the stream.
pub fn read_lines<R>(
    reader: R,
    source: StreamSource,
) -> impl Stream<Item = Result<OutputLine, RunnerError>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(LineSplitter::new(reader)), move |state| async move {
        let mut splitter = match state {
            Some(splitter) => splitter,
            None => return None,
        };
        match splitter.next_line().await {
            None => None,
            Some(Ok(bytes)) => Some((Ok(OutputLine::new(decode_line(bytes), source)), Some(splitter))),
            Some(Err(e)) => Some((
                Err(RunnerError::Read {
                    stream: source,
                    source: e,
                }),
                None,
            )),
        }
    })
}

/// Interleaves the lines of both pipes by arrival.
///
/// The merged stream ends only after both pipes have reached EOF.
pub fn merge_lines<O, E>(
    stdout: O,
    stderr: E,
) -> impl Stream<Item = Result<OutputLine, RunnerError>> + Send
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    stream::select(
        read_lines(stdout, StreamSource::Stdout),
        read_lines(stderr, StreamSource::Stderr),
    )
}

fn decode_line(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
