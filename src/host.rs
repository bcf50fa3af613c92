use std::future::Future;
use std::io;
use std::pin::pin;
use std::sync::Arc;

use bytes::BytesMut;
use futures::{future, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error};

use crate::engine::{Engine, EngineError, RejectionReason};
use crate::limits::MAX_REQUEST_LINE_LEN;
use crate::model::*;

/// One request line, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Create(NewBooking),
    Extend(ExtendRequest),
    Availability(AvailabilityRequest),
    Health,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AvailabilityRequest {
    #[serde(rename = "unitID")]
    pub unit_id: String,
    pub from: Day,
    pub to: Day,
}

/// Booking as reported to clients, with the derived check-out date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    pub id: Option<BookingId>,
    #[serde(rename = "guestName")]
    pub guest_name: String,
    #[serde(rename = "unitID")]
    pub unit_id: String,
    #[serde(rename = "checkInDate")]
    pub check_in: Day,
    #[serde(rename = "checkOutDate")]
    pub check_out: Day,
    #[serde(rename = "numberOfNights")]
    pub nights: u32,
}

impl From<&Booking> for BookingView {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            guest_name: b.guest_name.clone(),
            unit_id: b.unit_id.clone(),
            check_in: b.check_in,
            check_out: b.check_out(),
            nights: b.nights,
        }
    }
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows: Option<Vec<Span>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    fn booking(b: &Booking) -> Self {
        Self {
            ok: true,
            booking: Some(b.into()),
            ..Self::default()
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            reason: Some(RejectionReason::InvalidInput),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

impl From<EngineError> for Response {
    fn from(e: EngineError) -> Self {
        Self {
            reason: e.reason(),
            retryable: e.is_retryable(),
            message: Some(e.to_string()),
            ..Self::default()
        }
    }
}

/// Parse and execute one request line.
pub async fn handle_line(engine: &Engine, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            debug!("unparseable request: {e}");
            return Response::invalid(format!("malformed request: {e}"));
        }
    };

    let result = match request {
        Request::Health => {
            return Response {
                ok: true,
                message: Some("OK".into()),
                ..Response::default()
            };
        }
        Request::Create(new) => engine.create_booking(new).await.map(|b| Response::booking(&b)),
        Request::Extend(ext) => engine
            .extend_booking(&ext.unit_id, &ext.guest_name, ext.extended_nights)
            .await
            .map(|b| Response::booking(&b)),
        Request::Availability(q) => engine
            .unit_availability(&q.unit_id, q.from, q.to)
            .await
            .map(|windows| Response {
                ok: true,
                windows: Some(windows),
                ..Response::default()
            }),
    };
    result.unwrap_or_else(Response::from)
}

/// Line framing that hands a bad line (too long, not UTF-8) up as an item.
///
/// `FramedRead` stops after a decoder error, so only read failures are left to
/// end the session; a bad line becomes one `InvalidInput` response.
struct RequestLines(LinesCodec);

impl RequestLines {
    fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_REQUEST_LINE_LEN))
    }
}

type LineResult = Result<String, LinesCodecError>;

fn line_as_item(decoded: Result<Option<String>, LinesCodecError>) -> Result<Option<LineResult>, LinesCodecError> {
    match decoded {
        Ok(line) => Ok(line.map(Ok)),
        Err(e) => Ok(Some(Err(e))),
    }
}

impl Decoder for RequestLines {
    type Item = LineResult;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<LineResult>, LinesCodecError> {
        line_as_item(self.0.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<LineResult>, LinesCodecError> {
        line_as_item(self.0.decode_eof(buf))
    }
}

/// Serve newline-delimited JSON requests from `input` until it ends or
/// `shutdown` resolves. After shutdown no new line is read, but requests
/// already in flight finish and get their response.
///
/// Up to `max_in_flight` requests run concurrently and take their locks in
/// whatever order they reach them; responses are still written in request
/// order, one line each. Blank lines are skipped.
pub async fn serve<R, W, S>(
    engine: Arc<Engine>,
    input: R,
    mut output: W,
    max_in_flight: usize,
    shutdown: S,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let lines = FramedRead::new(input, RequestLines::new());
    let responses = lines
        .take_until(shutdown)
        .take_while(|read| {
            if let Err(e) = read {
                error!("reading requests failed: {e}");
            }
            future::ready(read.is_ok())
        })
        .filter_map(|read| future::ready(read.ok()))
        .filter(|line| future::ready(!matches!(line, Ok(l) if l.trim().is_empty())))
        .map(|line| {
            let engine = engine.clone();
            async move {
                match line {
                    Ok(line) => handle_line(&engine, &line).await,
                    Err(e) => Response::invalid(format!("unreadable request: {e}")),
                }
            }
        })
        .buffered(max_in_flight.max(1));
    let mut responses = pin!(responses);

    while let Some(response) = responses.next().await {
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        output.write_all(&out).await?;
        output.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use serde_json::Value;

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::new(Arc::new(InMemoryRepository::new())))
    }

    /// Requests in flight together race for locks, so dependent sequences run one at a time.
    async fn run(engine: Arc<Engine>, input: &str, max_in_flight: usize) -> Vec<Value> {
        run_bytes(engine, input.as_bytes(), max_in_flight).await
    }

    async fn run_bytes(engine: Arc<Engine>, input: &[u8], max_in_flight: usize) -> Vec<Value> {
        let mut out = Vec::new();
        serve(engine, input, &mut out, max_in_flight, future::pending())
            .await
            .unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn health_check() {
        let out = run(engine(), "{\"op\":\"health\"}\n", 1).await;
        assert_eq!(out, vec![serde_json::json!({"ok": true, "message": "OK"})]);
    }

    #[tokio::test]
    async fn create_then_conflicting_create() {
        let input = concat!(
            r#"{"op":"create","guestName":"G1","unitID":"U1","checkInDate":"2024-01-01","numberOfNights":4}"#,
            "\n",
            r#"{"op":"create","guestName":"G2","unitID":"U1","checkInDate":"2024-01-04","numberOfNights":2}"#,
            "\n",
        );
        let out = run(engine(), input, 1).await;
        assert_eq!(out.len(), 2);

        assert_eq!(out[0]["ok"], true);
        assert_eq!(out[0]["booking"]["checkOutDate"], "2024-01-05");
        assert_eq!(out[0]["booking"]["numberOfNights"], 4);
        assert!(out[0]["booking"]["id"].is_string());

        assert_eq!(out[1]["ok"], false);
        assert_eq!(out[1]["reason"], "UnitOccupied");
        assert!(out[1].get("retryable").is_none());
    }

    #[tokio::test]
    async fn extend_and_not_found() {
        let input = concat!(
            r#"{"op":"create","guestName":"G1","unitID":"U1","checkInDate":"2024-01-01","numberOfNights":2}"#,
            "\n",
            r#"{"op":"extend","unitID":"U1","guestName":"G1","extendedNumberOfNights":4}"#,
            "\n",
            r#"{"op":"extend","unitID":"U1","guestName":"G9","extendedNumberOfNights":4}"#,
            "\n",
        );
        let out = run(engine(), input, 1).await;
        assert_eq!(out[1]["booking"]["checkOutDate"], "2024-01-05");
        assert_eq!(out[1]["booking"]["id"], out[0]["booking"]["id"]);
        assert_eq!(out[2]["reason"], "NotFound");
    }

    #[tokio::test]
    async fn malformed_lines_are_invalid_input() {
        let input = concat!(
            "not json\n",
            "\n",
            r#"{"op":"create","guestName":"G1","unitID":"U1","checkInDate":"2024-13-01","numberOfNights":1}"#,
            "\n",
            r#"{"op":"create","guestName":"G1","unitID":"U1","checkInDate":"2024-01-01","numberOfNights":0}"#,
            "\n",
            r#"{"op":"teleport"}"#,
            "\n",
        );
        let out = run(engine(), input, 4).await;
        assert_eq!(out.len(), 4); // blank line skipped
        for response in &out {
            assert_eq!(response["ok"], false);
            assert_eq!(response["reason"], "InvalidInput");
        }
    }

    #[tokio::test]
    async fn oversized_line_does_not_end_the_session() {
        let mut input = format!(r#"{{"op":"create","guestName":"{}"}}"#, "x".repeat(MAX_REQUEST_LINE_LEN + 10));
        input.push('\n');
        input.push_str("{\"op\":\"health\"}\n");

        let out = run(engine(), &input, 1).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["reason"], "InvalidInput");
        assert_eq!(out[1], serde_json::json!({"ok": true, "message": "OK"}));
    }

    #[tokio::test]
    async fn non_utf8_line_does_not_end_the_session() {
        let mut input = vec![b'{', 0xff, 0xfe, b'}', b'\n'];
        input.extend_from_slice(b"{\"op\":\"health\"}\n");

        let out = run_bytes(engine(), &input, 1).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["ok"], false);
        assert_eq!(out[0]["reason"], "InvalidInput");
        assert_eq!(out[1]["ok"], true);
    }

    #[tokio::test]
    async fn availability_windows() {
        let e = engine();
        let input = concat!(
            r#"{"op":"create","guestName":"G1","unitID":"U1","checkInDate":"2024-01-03","numberOfNights":2}"#,
            "\n",
            r#"{"op":"availability","unitID":"U1","from":"2024-01-01","to":"2024-01-07"}"#,
            "\n",
        );
        let out = run(e, input, 1).await;
        assert_eq!(
            out[1]["windows"],
            serde_json::json!([
                {"start": "2024-01-01", "end": "2024-01-03"},
                {"start": "2024-01-05", "end": "2024-01-07"}
            ])
        );
    }

    #[tokio::test]
    async fn concurrent_lines_admit_one_overlapping_stay() {
        let input: String = (0..20)
            .map(|i| {
                format!(
                    "{{\"op\":\"create\",\"guestName\":\"G{i}\",\"unitID\":\"U1\",\"checkInDate\":\"2024-01-01\",\"numberOfNights\":3}}\n"
                )
            })
            .collect();
        let out = run(engine(), &input, 8).await;
        assert_eq!(out.len(), 20);
        assert_eq!(out.iter().filter(|r| r["ok"] == true).count(), 1);
        assert!(out
            .iter()
            .filter(|r| r["ok"] == false)
            .all(|r| r["reason"] == "UnitOccupied"));
    }

    #[tokio::test]
    async fn shutdown_stops_reading_new_lines() {
        let input = concat!(r#"{"op":"health"}"#, "\n", r#"{"op":"health"}"#, "\n");
        let mut out = Vec::new();
        serve(engine(), input.as_bytes(), &mut out, 1, future::ready(()))
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
