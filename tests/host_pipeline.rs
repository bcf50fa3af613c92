use std::future;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use ulid::Ulid;

use stayd::compactor::compact_if_needed;
use stayd::engine::Engine;
use stayd::host;
use stayd::repository::{BookingRepository, WalRepository};

// ── Test infrastructure ──────────────────────────────────────

fn wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("stayd_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("bookings.wal")
}

struct Client {
    tx: WriteHalf<DuplexStream>,
    rx: Lines<BufReader<ReadHalf<DuplexStream>>>,
}

impl Client {
    async fn call(&mut self, request: Value) -> Value {
        let mut line = request.to_string();
        line.push('\n');
        self.tx.write_all(line.as_bytes()).await.unwrap();
        let reply = self.rx.next_line().await.unwrap().expect("server closed");
        serde_json::from_str(&reply).unwrap()
    }
}

fn start_server(repo: Arc<dyn BookingRepository>) -> Client {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let engine = Arc::new(Engine::new(repo));
    let (server_rx, server_tx) = tokio::io::split(server);
    tokio::spawn(async move {
        let _ = host::serve(engine, server_rx, server_tx, 8, future::pending()).await;
    });
    let (rx, tx) = tokio::io::split(client);
    Client {
        tx,
        rx: BufReader::new(rx).lines(),
    }
}

fn create(guest: &str, unit: &str, check_in: &str, nights: i64) -> Value {
    json!({
        "op": "create",
        "guestName": guest,
        "unitID": unit,
        "checkInDate": check_in,
        "numberOfNights": nights,
    })
}

fn extend(unit: &str, guest: &str, nights: i64) -> Value {
    json!({
        "op": "extend",
        "unitID": unit,
        "guestName": guest,
        "extendedNumberOfNights": nights,
    })
}

// ── Booking flow ─────────────────────────────────────────────

#[tokio::test]
async fn booking_flow_over_the_wire() {
    let repo = Arc::new(WalRepository::open(&wal_path()).unwrap());
    let mut client = start_server(repo);

    let r = client.call(json!({"op": "health"})).await;
    assert_eq!(r["ok"], true);

    let a = client.call(create("Alice", "U1", "2024-03-01", 3)).await;
    assert_eq!(a["ok"], true);
    assert_eq!(a["booking"]["checkOutDate"], "2024-03-04");

    // Overlapping stay on the same unit.
    let r = client.call(create("Bob", "U1", "2024-03-03", 2)).await;
    assert_eq!(r["reason"], "UnitOccupied");

    // Starting on Alice's check-out day is fine.
    let b = client.call(create("Bob", "U1", "2024-03-04", 2)).await;
    assert_eq!(b["ok"], true);

    // Alice cannot be in U2 while staying in U1.
    let r = client.call(create("Alice", "U2", "2024-03-02", 1)).await;
    assert_eq!(r["reason"], "GuestDoubleBooked");

    // Extending Alice into Bob's stay is refused, a shorter extension is not.
    let r = client.call(extend("U1", "Alice", 4)).await;
    assert_eq!(r["reason"], "UnitOccupied");
    let r = client.call(extend("U1", "Alice", 3)).await;
    assert_eq!(r["ok"], true);
    assert_eq!(r["booking"]["id"], a["booking"]["id"]);

    let r = client.call(extend("U9", "Alice", 3)).await;
    assert_eq!(r["reason"], "NotFound");

    let r = client
        .call(json!({"op": "availability", "unitID": "U1", "from": "2024-02-28", "to": "2024-03-08"}))
        .await;
    assert_eq!(
        r["windows"],
        json!([
            {"start": "2024-02-28", "end": "2024-03-01"},
            {"start": "2024-03-06", "end": "2024-03-08"}
        ])
    );
}

#[tokio::test]
async fn bookings_survive_restart_and_compaction() {
    let path = wal_path();

    {
        let repo = Arc::new(WalRepository::open(&path).unwrap());
        let mut client = start_server(repo.clone());
        for i in 0..5 {
            let r = client
                .call(create(&format!("G{i}"), "U1", &format!("2024-05-{:02}", 1 + i * 2), 2))
                .await;
            assert_eq!(r["ok"], true);
        }
        let r = client.call(extend("U1", "G4", 5)).await;
        assert_eq!(r["ok"], true);
        assert!(compact_if_needed(&repo, 1).await);
    }

    let repo = Arc::new(WalRepository::open(&path).unwrap());
    assert_eq!(repo.len(), 5);
    let mut client = start_server(repo);

    // G4 now holds 2024-05-09 .. 2024-05-14 after the extension.
    let r = client.call(create("H", "U1", "2024-05-13", 1)).await;
    assert_eq!(r["reason"], "UnitOccupied");
    let r = client.call(create("H", "U1", "2024-05-14", 1)).await;
    assert_eq!(r["ok"], true);
}

#[tokio::test]
async fn concurrent_clients_never_double_book() {
    let repo = Arc::new(WalRepository::open(&wal_path()).unwrap());

    let mut handles = Vec::new();
    for i in 0..10 {
        let mut client = start_server(repo.clone());
        handles.push(tokio::spawn(async move {
            let mut admitted = Vec::new();
            for day in 1..=9 {
                let r = client
                    .call(create(&format!("G{i}-{day}"), "U1", &format!("2024-07-{day:02}"), 2))
                    .await;
                if r["ok"] == true {
                    admitted.push(r["booking"].clone());
                } else {
                    assert_eq!(r["reason"], "UnitOccupied");
                }
            }
            admitted
        }));
    }

    let mut admitted = Vec::new();
    for h in handles {
        admitted.extend(h.await.unwrap());
    }
    assert!(!admitted.is_empty());

    let stays: Vec<(String, String)> = admitted
        .iter()
        .map(|b| {
            (
                b["checkInDate"].as_str().unwrap().to_string(),
                b["checkOutDate"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    for (i, a) in stays.iter().enumerate() {
        for b in &stays[i + 1..] {
            // ISO dates compare lexically.
            assert!(!(a.0 < b.1 && b.0 < a.1), "overlapping stays {a:?} and {b:?}");
        }
    }
    assert_eq!(repo.len(), admitted.len());
}
