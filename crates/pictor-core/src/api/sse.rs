use eventsource_stream::Eventsource;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use tokio_util::bytes::Bytes;

use crate::api::error::SseParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent, SseParseError>> + Send>>;

pub fn parse_sse_stream<S, E>(byte_stream: S) -> SseStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let events = byte_stream.eventsource().map(|result| {
        result
            .map(|event| SseEvent {
                event_type: Some(event.event).filter(|e| !e.is_empty() && e != "message"),
                data: event.data,
            })
            .map_err(SseParseError::from)
    });

    Box::pin(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn data_lines_split_across_chunks() {
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from("data: {\"a\":")),
            Ok(Bytes::from("1}\n\ndata: [DONE]\n\n")),
        ];
        let mut events = parse_sse_stream(stream::iter(chunks));

        let first = events.next().await.expect("event").expect("ok");
        assert_eq!(first.data, "{\"a\":1}");
        assert_eq!(first.event_type, None);

        let done = events.next().await.expect("event").expect("ok");
        assert_eq!(done.data, "[DONE]");
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn named_events_keep_their_type() {
        let body = "event: error\ndata: boom\n\n";
        let mut events =
            parse_sse_stream(stream::once(async move { Ok::<_, std::io::Error>(Bytes::from(body)) }));

        let event = events.next().await.expect("event").expect("ok");
        assert_eq!(event.event_type.as_deref(), Some("error"));
        assert_eq!(event.data, "boom");
    }

    #[tokio::test]
    async fn transport_errors_surface() {
        let chunks = vec![Err::<Bytes, _>(std::io::Error::other("reset"))];
        let mut events = parse_sse_stream(stream::iter(chunks));

        let err = events.next().await.expect("event").expect_err("error");
        assert!(matches!(err, SseParseError::Transport { .. }));
    }
}
