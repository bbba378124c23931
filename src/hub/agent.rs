//! Per-connection agent
//!
//! Every connection runs two pumps: the inbound pump decodes frames and
//! hands them to the hub, the outbound pump drains the agent's bounded queue
//! to the socket and keeps the connection alive with pings. Teardown is
//! driven by the queue closing (outbound) or the socket failing (inbound).

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::coordinator::HubHandle;
use crate::config::HubConfig;
use crate::error::HubError;
use crate::models::{ClientId, Frame, Message};

/// The hub's side of a connected agent: its identity and queue sender
///
/// Dropping the handle closes the agent's outbound queue.
#[derive(Debug)]
pub struct AgentHandle {
    id: ClientId,
    queue: mpsc::Sender<Frame>,
}

impl AgentHandle {
    /// Create a handle plus the receiving end of its outbound queue
    pub fn new(id: ClientId, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (queue, rx) = mpsc::channel(capacity);
        (Self { id, queue }, rx)
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub(super) fn into_parts(self) -> (ClientId, mpsc::Sender<Frame>) {
        (self.id, self.queue)
    }
}

/// Why the inbound pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundExit {
    /// Peer closed the connection
    Closed,
    /// No pong arrived within the read deadline
    TimedOut,
    /// Transport read error
    Failed,
    /// Hub intake was saturated; the agent evicted itself
    Overloaded,
    /// Hub is no longer running
    HubClosed,
}

/// Why the outbound pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundExit {
    /// Queue closed by the hub; a close frame was sent
    QueueClosed,
    /// Writing to the socket failed or timed out
    WriteFailed,
}

/// Read frames until the connection ends, routing each message to the hub
///
/// Canvas edits go to the hub's edit intake, everything else is re-encoded
/// and broadcast verbatim. Malformed frames are dropped. Only pong frames
/// push the read deadline forward.
pub async fn inbound_pump<R>(
    mut reader: R,
    id: ClientId,
    hub: HubHandle,
    pong_wait: Duration,
) -> InboundExit
where
    R: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let frame = match timeout_at(deadline, reader.next()).await {
            Err(_) => {
                info!(client_id = %id, "Read deadline expired without pong");
                return InboundExit::TimedOut;
            }
            Ok(None) => {
                debug!(client_id = %id, "WebSocket stream ended");
                return InboundExit::Closed;
            }
            Ok(Some(Err(e))) => {
                debug!(client_id = %id, "WebSocket read error: {}", e);
                return InboundExit::Failed;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!(client_id = %id, "Dropping non UTF-8 binary frame");
                    continue;
                }
            },
            WsMessage::Pong(_) => {
                deadline = Instant::now() + pong_wait;
                continue;
            }
            // Pongs are queued by the transport itself
            WsMessage::Ping(_) => continue,
            WsMessage::Close(frame) => {
                log_close(&id, frame.as_ref());
                return InboundExit::Closed;
            }
        };

        let message = match Message::decode(&text) {
            Ok(message) => message.restamp(),
            Err(e) => {
                warn!(client_id = %id, "Dropping malformed message: {}", e);
                continue;
            }
        };

        let submitted = match message.canvas_edit() {
            Some(edit) => hub.edit_canvas(edit, id.clone()),
            None => match message.encode() {
                Ok(frame) => hub.broadcast(frame),
                Err(e) => {
                    error!(client_id = %id, "Failed to encode {} message: {}", message.kind(), e);
                    continue;
                }
            },
        };

        match submitted {
            Ok(()) => {}
            Err(HubError::Saturated) => {
                warn!(client_id = %id, "Hub intake saturated, disconnecting client");
                return InboundExit::Overloaded;
            }
            Err(e) => {
                debug!(client_id = %id, "Stopping inbound pump: {}", e);
                return InboundExit::HubClosed;
            }
        }
    }
}

fn log_close(id: &ClientId, frame: Option<&CloseFrame<'static>>) {
    match frame {
        None => debug!(client_id = %id, "Client closed connection"),
        Some(frame) if frame.code == close_code::NORMAL || frame.code == close_code::AWAY => {
            debug!(client_id = %id, code = frame.code, "Client closed connection")
        }
        Some(frame) => warn!(
            client_id = %id,
            code = frame.code,
            reason = %frame.reason,
            "Client closed connection unexpectedly"
        ),
    }
}

/// Drain the outbound queue to the socket, pinging on a fixed period
///
/// Frames already waiting behind the one just received are written in the
/// same batch and flushed once. When the queue closes a close frame is
/// sent. Any write failure stops the pump.
pub async fn outbound_pump<W>(
    mut writer: W,
    id: ClientId,
    mut queue: mpsc::Receiver<Frame>,
    config: HubConfig,
) -> OutboundExit
where
    W: Sink<WsMessage> + Unpin,
    W::Error: Display,
{
    let ping_period = config.ping_period();
    let mut ping = interval_at(Instant::now() + ping_period, ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(first) = next else {
                    let close = WsMessage::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "server closing connection".into(),
                    }));
                    if let Ok(Err(e)) = timeout(config.write_wait, writer.send(close)).await {
                        debug!(client_id = %id, "Failed to send close frame: {}", e);
                    }
                    return OutboundExit::QueueClosed;
                };

                let batch = write_batch(&mut writer, first, &mut queue, config.outbound_capacity);
                match timeout(config.write_wait, batch).await {
                    Ok(Ok(written)) => {
                        if written > 1 {
                            debug!(client_id = %id, frames = written, "Coalesced outbound frames");
                        }
                    }
                    Ok(Err(e)) => {
                        debug!(client_id = %id, "WebSocket write error: {}", e);
                        return OutboundExit::WriteFailed;
                    }
                    Err(_) => {
                        info!(client_id = %id, "WebSocket write timed out");
                        return OutboundExit::WriteFailed;
                    }
                }
            }
            _ = ping.tick() => {
                match timeout(config.write_wait, writer.send(WsMessage::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(client_id = %id, "WebSocket ping failed: {}", e);
                        return OutboundExit::WriteFailed;
                    }
                    Err(_) => {
                        info!(client_id = %id, "WebSocket ping timed out");
                        return OutboundExit::WriteFailed;
                    }
                }
            }
        }
    }
}

/// Feed `first` and whatever is already queued, then flush once
async fn write_batch<W>(
    writer: &mut W,
    first: Frame,
    queue: &mut mpsc::Receiver<Frame>,
    max_batch: usize,
) -> Result<usize, W::Error>
where
    W: Sink<WsMessage> + Unpin,
{
    writer.feed(WsMessage::Text(first.to_string())).await?;
    let mut written = 1;

    while written < max_batch {
        let Ok(next) = queue.try_recv() else { break };
        writer.feed(WsMessage::Text(next.to_string())).await?;
        written += 1;
    }

    writer.flush().await?;
    Ok(written)
}

/// Run one client connection from registration to teardown
pub async fn run_session(mut socket: WebSocket, hub: HubHandle, config: HubConfig) {
    let id = ClientId::generate();
    let (agent, queue) = AgentHandle::new(id.clone(), config.outbound_capacity);

    if let Err(e) = hub.register(agent).await {
        warn!(client_id = %id, "Rejecting connection: {}", e);
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }

    let (writer, reader) = socket.split();
    let mut outbound = tokio::spawn(outbound_pump(writer, id.clone(), queue, config.clone()));
    let mut inbound = tokio::spawn(inbound_pump(reader, id.clone(), hub.clone(), config.pong_wait));

    tokio::select! {
        exit = &mut inbound => {
            debug!(client_id = %id, ?exit, "Inbound pump finished");
            let _ = hub.unregister(id.clone()).await;
            // Give the outbound pump a chance to flush and send its close frame
            if timeout(config.write_wait, &mut outbound).await.is_err() {
                outbound.abort();
            }
        }
        exit = &mut outbound => {
            debug!(client_id = %id, ?exit, "Outbound pump finished");
            inbound.abort();
            let _ = hub.unregister(id.clone()).await;
        }
    }

    info!(client_id = %id, "Client session ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures::channel::mpsc as wire;
    use futures::stream;

    use crate::hub::canvas::Canvas;
    use crate::hub::coordinator::Hub;
    use crate::models::{Event, Point};

    fn text(raw: &str) -> Result<WsMessage, axum::Error> {
        Ok(WsMessage::Text(raw.to_string()))
    }

    fn config() -> HubConfig {
        HubConfig::default()
    }

    fn decode(frame: &Frame) -> Message {
        Message::decode(frame).unwrap()
    }

    /// Start a hub with one observing agent registered
    async fn hub_with_observer(
        config: &HubConfig,
    ) -> (HubHandle, mpsc::Receiver<Frame>, tokio::task::JoinHandle<()>) {
        let (hub, handle) = Hub::new(config, Arc::new(Canvas::default()));
        let task = tokio::spawn(hub.run());

        let (observer, mut rx) = AgentHandle::new(ClientId::from("observer"), 64);
        handle.register(observer).await.unwrap();
        // canvas_state + user_list
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        (handle, rx, task)
    }

    #[tokio::test]
    async fn test_inbound_routes_text_and_pixels() {
        let config = config();
        let (hub, mut observer, task) = hub_with_observer(&config).await;

        let reader = stream::iter(vec![
            text(r#"{"type":"text_update","content":"hi"}"#),
            text("definitely not json"),
            text(r##"{"type":"pixel_update","x":5,"y":5,"color":"#ff0000","client_id":"spoofed"}"##),
            text(r##"{"type":"pixel_update","x":99,"y":5,"color":"#ff0000"}"##),
            text(r#"{"type":"canvas_clear"}"#),
        ]);

        let exit = inbound_pump(reader, ClientId::from("painter"), hub.clone(), config.pong_wait).await;
        assert_eq!(exit, InboundExit::Closed);

        let first = decode(&observer.recv().await.unwrap());
        assert_eq!(
            first.event,
            Event::TextUpdate {
                content: "hi".to_string()
            }
        );

        let second = decode(&observer.recv().await.unwrap());
        assert_eq!(
            second.event,
            Event::PixelUpdate {
                x: 5,
                y: 5,
                color: "#ff0000".to_string(),
                client_id: Some(ClientId::from("painter")),
            }
        );

        // The out-of-range pixel produced nothing
        let third = decode(&observer.recv().await.unwrap());
        assert_eq!(third.event, Event::CanvasClear);
        assert!(hub.canvas().snapshot().is_empty());

        hub.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_inbound_binary_frames_are_decoded_as_text() {
        let config = config();
        let (hub, mut observer, task) = hub_with_observer(&config).await;

        let reader = stream::iter(vec![
            Ok(WsMessage::Binary(vec![0xff, 0xfe])),
            Ok(WsMessage::Binary(br#"{"type":"heartbeat"}"#.to_vec())),
        ]);
        inbound_pump(reader, ClientId::from("b"), hub.clone(), config.pong_wait).await;

        let message = decode(&observer.recv().await.unwrap());
        assert_eq!(message.event, Event::Heartbeat);

        hub.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_inbound_stops_on_close_frame() {
        let config = config();
        let (hub, _observer, task) = hub_with_observer(&config).await;

        let reader = stream::iter(vec![
            Ok(WsMessage::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: "boom".into(),
            }))),
            text(r#"{"type":"text_update","content":"never read"}"#),
        ]);
        let exit = inbound_pump(reader, ClientId::from("c"), hub.clone(), config.pong_wait).await;
        assert_eq!(exit, InboundExit::Closed);

        hub.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_inbound_read_error_fails() {
        let config = config();
        let (hub, _observer, task) = hub_with_observer(&config).await;

        let reader = stream::iter(vec![Err(axum::Error::new(std::io::Error::other("reset")))]);
        let exit = inbound_pump(reader, ClientId::from("d"), hub.clone(), config.pong_wait).await;
        assert_eq!(exit, InboundExit::Failed);

        hub.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_inbound_times_out_without_pong() {
        let config = config();
        let (hub, handle) = Hub::new(&config, Arc::new(Canvas::default()));
        drop(hub);

        let reader = stream::pending::<Result<WsMessage, axum::Error>>();
        let exit = inbound_pump(reader, ClientId::from("e"), handle, Duration::from_millis(50)).await;
        assert_eq!(exit, InboundExit::TimedOut);
    }

    #[tokio::test]
    async fn test_inbound_pong_refreshes_deadline() {
        let config = config();
        let (hub, handle) = Hub::new(&config, Arc::new(Canvas::default()));
        drop(hub);

        // Three pongs 120ms apart outlive a single 200ms deadline
        let reader = stream::unfold(0, |n| async move {
            if n == 3 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(120)).await;
            Some((Ok(WsMessage::Pong(Vec::new())), n + 1))
        });
        let reader = Box::pin(reader);

        let exit = inbound_pump(reader, ClientId::from("f"), handle, Duration::from_millis(200)).await;
        assert_eq!(exit, InboundExit::Closed);
    }

    #[tokio::test]
    async fn test_inbound_self_evicts_when_intake_saturated() {
        let config = HubConfig {
            control_capacity: 1,
            ..HubConfig::default()
        };
        // The hub is never run, so its intake fills after one command
        let (_hub, handle) = Hub::new(&config, Arc::new(Canvas::default()));

        let reader = stream::iter(vec![
            text(r#"{"type":"text_update","content":"one"}"#),
            text(r#"{"type":"text_update","content":"two"}"#),
            text(r#"{"type":"text_update","content":"three"}"#),
        ]);
        let exit = inbound_pump(reader, ClientId::from("g"), handle, config.pong_wait).await;
        assert_eq!(exit, InboundExit::Overloaded);
    }

    #[tokio::test]
    async fn test_inbound_stops_when_hub_closed() {
        let config = config();
        let (hub, handle) = Hub::new(&config, Arc::new(Canvas::default()));
        drop(hub);

        let reader = stream::iter(vec![text(r#"{"type":"heartbeat"}"#)]);
        let exit = inbound_pump(reader, ClientId::from("h"), handle, config.pong_wait).await;
        assert_eq!(exit, InboundExit::HubClosed);
    }

    #[tokio::test]
    async fn test_outbound_writes_in_order_then_closes() {
        let (writer, mut wire_rx) = wire::unbounded::<WsMessage>();
        let (agent, queue) = AgentHandle::new(ClientId::from("o"), 8);
        let (_, sender) = agent.into_parts();

        for i in 0..3 {
            let frame: Frame = Message::pixel_update(Point::new(i, i), "#ffffff", ClientId::from("o"))
                .encode()
                .unwrap();
            sender.try_send(frame).unwrap();
        }
        drop(sender);

        let exit = outbound_pump(writer, ClientId::from("o"), queue, config()).await;
        assert_eq!(exit, OutboundExit::QueueClosed);

        for i in 0..3 {
            match wire_rx.next().await {
                Some(WsMessage::Text(raw)) => {
                    let message = Message::decode(&raw).unwrap();
                    assert!(matches!(message.event, Event::PixelUpdate { x, .. } if x == i));
                }
                other => panic!("expected text frame, got {:?}", other),
            }
        }

        match wire_rx.next().await {
            Some(WsMessage::Close(Some(frame))) => assert_eq!(frame.code, close_code::AWAY),
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_outbound_pings_periodically() {
        let (writer, mut wire_rx) = wire::unbounded::<WsMessage>();
        let (agent, queue) = AgentHandle::new(ClientId::from("p"), 8);
        let config = HubConfig {
            pong_wait: Duration::from_millis(100),
            ..HubConfig::default()
        };

        let pump = tokio::spawn(outbound_pump(writer, ClientId::from("p"), queue, config));

        let first = wire_rx.next().await;
        assert!(matches!(first, Some(WsMessage::Ping(_))));

        drop(agent);
        assert_eq!(pump.await.unwrap(), OutboundExit::QueueClosed);
    }

    #[tokio::test]
    async fn test_outbound_stops_on_write_failure() {
        let (writer, wire_rx) = wire::unbounded::<WsMessage>();
        drop(wire_rx);

        let (agent, queue) = AgentHandle::new(ClientId::from("q"), 8);
        let (_, sender) = agent.into_parts();
        sender.try_send(Arc::from("{}")).unwrap();

        let exit = outbound_pump(writer, ClientId::from("q"), queue, config()).await;
        assert_eq!(exit, OutboundExit::WriteFailed);
    }
}
