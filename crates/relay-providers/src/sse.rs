//! Server-Sent-Events framing shared by the streaming adapters.
//!
//! Providers stream completions as SSE: `data:`-prefixed lines terminated by
//! the `[DONE]` sentinel. This module turns a raw response body into a stream
//! of data payloads; each adapter parses the payloads in its own dialect.

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use relay_core::{RelayError, RelayResult};

/// Decode an SSE response into its `data:` payloads.
///
/// Non-data lines (comments, `event:` framing, blank separators) are skipped.
/// The stream ends cleanly at the `[DONE]` sentinel or when the body ends; a
/// transport failure yields exactly one `Err` item and then ends.
pub fn data_lines(
    response: reqwest::Response,
    provider: &'static str,
) -> BoxStream<'static, RelayResult<String>> {
    let stream = try_stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| {
                RelayError::streaming(format!("{provider} stream read failed: {e}"))
            })?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    return;
                }
                if !data.is_empty() {
                    yield data.to_string();
                }
            }
        }
    };

    stream.boxed()
}
