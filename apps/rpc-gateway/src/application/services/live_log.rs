//! Live call log.

use crate::application::error::CallError;
use crate::application::ports::{EventSource, StreamSink};
use crate::domain::event::CallEvent;

/// Forward events from `source` to `sink` until either side goes away.
///
/// Returns the number of events forwarded when the source closes.
///
/// # Errors
///
/// Returns `CallError::Disconnected` if the sink closes first.
pub async fn forward_events<S, K>(mut source: S, sink: &K) -> Result<u64, CallError>
where
    S: EventSource,
    K: StreamSink<CallEvent> + ?Sized,
{
    let mut forwarded = 0u64;

    loop {
        tokio::select! {
            event = source.next_event() => {
                let Some(event) = event else {
                    return Ok(forwarded);
                };
                if sink.send(event).await.is_err() {
                    return Err(CallError::Disconnected);
                }
                forwarded += 1;
            }
            () = sink.closed() => return Err(CallError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn event(consumer: &str) -> CallEvent {
        CallEvent::new("127.0.0.1:1", "/gateway.v1.Biz/Check", consumer, 0)
    }

    #[tokio::test]
    async fn forwards_until_source_closes() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        event_tx.send(event("a")).await.unwrap();
        event_tx.send(event("b")).await.unwrap();
        drop(event_tx);

        let forwarded = forward_events(event_rx, &out_tx).await.unwrap();
        assert_eq!(forwarded, 2);
        assert_eq!(out_rx.recv().await.unwrap().consumer, "a");
        assert_eq!(out_rx.recv().await.unwrap().consumer, "b");
    }

    #[tokio::test]
    async fn stops_when_sink_closes() {
        let (_event_tx, event_rx) = mpsc::channel::<CallEvent>(8);
        let (out_tx, out_rx) = mpsc::channel::<CallEvent>(8);
        drop(out_rx);

        let result = forward_events(event_rx, &out_tx).await;
        assert_eq!(result, Err(CallError::Disconnected));
    }
}
