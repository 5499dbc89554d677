//! Wire protocol between the client and the engine.

pub mod decoder;
pub mod unquote;

pub use decoder::{FrameDecoder, StdoutChunk, StreamUnit};
pub use unquote::best_effort_unquote;

use futures::stream::{BoxStream, StreamExt};

use crate::error::GptscriptError;

/// Turn a raw body stream into decoded units.
///
/// A body error is yielded once and ends the stream; the partially buffered
/// fragment is discarded.
pub fn decode_stream(
    body: BoxStream<'static, Result<Vec<u8>, GptscriptError>>,
) -> BoxStream<'static, Result<StreamUnit, GptscriptError>> {
    let stream = async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        futures::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for unit in decoder.feed(&bytes) {
                yield Ok(unit);
            }
            if decoder.is_done() {
                return;
            }
        }

        for unit in decoder.finish() {
            yield Ok(unit);
        }
    };
    Box::pin(stream)
}
