use bytes::Bytes;
use futures::stream::StreamExt;

use crate::error::LLMError;

use super::stream::{ChatStream, StreamChunk};

/// Decodes a server-sent-event response body into normalized chunks.
///
/// The decoder buffers partial lines across network reads (a line may be
/// split anywhere, including inside a UTF-8 sequence), splits on newline
/// boundaries, and hands the payload of each complete `data:` line to the
/// provider-specific `parser`. A payload the parser cannot use yields no
/// chunks; partial and heartbeat frames are an expected part of SSE
/// transports and are dropped silently.
///
/// Termination is made deterministic here rather than in each adapter:
/// the first [`StreamChunk::Done`] ends the stream and anything after it
/// is suppressed, and if the transport ends without a terminal event a
/// `Done` is synthesized. An `Err` item is likewise terminal and is never
/// followed by a `Done`.
pub(crate) fn create_sse_stream<F>(response: reqwest::Response, parser: F) -> ChatStream
where
    F: Fn(&str) -> Vec<StreamChunk> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .map(Some)
        .chain(futures::stream::once(async { None }))
        .scan(SseState::default(), move |state, read| {
            let results = match read {
                Some(chunk) => handle_chunk(state, chunk, &parser),
                None => state.finish(),
            };
            async move { Some(results) }
        })
        .flat_map(futures::stream::iter);

    Box::pin(stream)
}

#[derive(Default)]
struct SseState {
    buffer: String,
    utf8_buffer: Vec<u8>,
    terminated: bool,
}

fn handle_chunk<F>(
    state: &mut SseState,
    chunk: Result<Bytes, reqwest::Error>,
    parser: &F,
) -> Vec<Result<StreamChunk, LLMError>>
where
    F: Fn(&str) -> Vec<StreamChunk>,
{
    let bytes = match chunk {
        Ok(bytes) => bytes,
        Err(err) => return state.fail(err.into()),
    };

    state.push_bytes(&bytes);
    state.drain_lines(parser)
}

impl SseState {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.utf8_buffer.extend_from_slice(bytes);
        match std::str::from_utf8(&self.utf8_buffer) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.utf8_buffer.clear();
            }
            Err(err) => self.consume_valid_prefix(err.valid_up_to()),
        }
    }

    fn consume_valid_prefix(&mut self, valid_up_to: usize) {
        if valid_up_to == 0 {
            return;
        }

        let valid = String::from_utf8_lossy(&self.utf8_buffer[..valid_up_to]);
        self.buffer.push_str(&valid);
        self.utf8_buffer.drain(..valid_up_to);
    }

    fn drain_lines<F>(&mut self, parser: &F) -> Vec<Result<StreamChunk, LLMError>>
    where
        F: Fn(&str) -> Vec<StreamChunk>,
    {
        let mut results = Vec::new();
        while let Some(line) = self.next_line() {
            if self.terminated {
                break;
            }
            let Some(payload) = data_payload(&line) else {
                continue;
            };
            for chunk in parser(payload) {
                let done = matches!(chunk, StreamChunk::Done);
                results.push(Ok(chunk));
                if done {
                    self.terminated = true;
                    break;
                }
            }
        }
        results
    }

    /// Pops the next complete line, retaining any trailing partial line.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.find('\n')?;
        let line = self.buffer[..pos].trim_end_matches('\r').to_string();
        self.buffer.drain(..=pos);
        Some(line)
    }

    fn fail(&mut self, err: LLMError) -> Vec<Result<StreamChunk, LLMError>> {
        if self.terminated {
            return Vec::new();
        }
        self.terminated = true;
        vec![Err(err)]
    }

    /// Flush at transport end: every stream terminates with a `Done`.
    fn finish(&mut self) -> Vec<Result<StreamChunk, LLMError>> {
        if self.terminated {
            return Vec::new();
        }
        self.terminated = true;
        vec![Ok(StreamChunk::Done)]
    }
}

/// Extracts the payload of a `data:` line, if this is one.
fn data_payload(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?;
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
