//! Mock authorization backend
//!
//! Speaks the backend side of the station's line protocol for local runs.
//!
//! Behavior:
//! 1. Listens on a configurable port (default 8888)
//! 2. `HELLO...` -> `ACK`, then the current `SLOTS:<car>:<motor>`
//! 3. `CARD:<uid>:<n>` -> `INFO:...` then `OPEN_n`
//!    - UIDs on the deny list get `REJECT_n` instead
//!    - `--silent` answers nothing (exercises the station timeout)
//! 4. `CHECKOUT:<n>` -> `FEE:<amount>` then `OPEN_n`
//! 5. `CLOSED:<n>` -> entry takes a car slot, exit frees one; new `SLOTS` pushed
//!
//! Usage:
//!   cargo run --bin mock-backend -- --port 8888 --deny DEADBEEF

use barrier_station::domain::protocol::Outbound;
use barrier_station::domain::types::{LaneId, Uid};
use barrier_station::io::line_codec::LineCodec;
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Parser, Debug)]
#[command(name = "mock-backend")]
#[command(about = "Mock authorization backend for local station runs")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "8888")]
    port: u16,

    /// UIDs to reject (repeatable)
    #[arg(long = "deny")]
    deny: Vec<String>,

    /// Never answer card scans
    #[arg(long)]
    silent: bool,

    /// Delay before answering a scan or checkout (ms)
    #[arg(long, default_value = "300")]
    reply_delay_ms: u64,

    /// Fee charged on checkout
    #[arg(long, default_value = "25000")]
    fee: u64,

    /// Initial free car slots
    #[arg(long, default_value = "20")]
    car_slots: u32,

    /// Initial free motorbike slots
    #[arg(long, default_value = "50")]
    motor_slots: u32,
}

#[derive(Debug, Clone, Copy)]
struct Slots {
    car: u32,
    motor: u32,
}

impl Slots {
    fn line(&self) -> String {
        format!("SLOTS:{}:{}", self.car, self.motor)
    }
}

struct Backend {
    deny: Vec<Uid>,
    silent: bool,
    reply_delay: Duration,
    fee: u64,
    slots: Mutex<Slots>,
}

impl Backend {
    /// Replies for one station line, in send order
    fn answer(&self, line: &str) -> Vec<String> {
        let Some(msg) = Outbound::parse(line) else {
            println!("[MOCK] Unrecognized line: {line:?}");
            return Vec::new();
        };

        match msg {
            Outbound::Hello(greeting) => {
                println!("[MOCK] Handshake: {greeting}");
                vec!["ACK".to_string(), self.slots.lock().line()]
            }
            Outbound::Card { uid, lane } => {
                if self.silent {
                    println!("[MOCK] Card {uid} on lane {lane} (silent)");
                    Vec::new()
                } else if self.deny.contains(&uid) {
                    println!("[MOCK] Card {uid} on lane {lane} -> REJECT");
                    vec![format!("REJECT_{lane}")]
                } else {
                    println!("[MOCK] Card {uid} on lane {lane} -> OPEN");
                    vec![info_line(&uid), format!("OPEN_{lane}")]
                }
            }
            Outbound::Checkout(lane) => {
                println!("[MOCK] Checkout on lane {lane} -> FEE {}", self.fee);
                vec![format!("FEE:{}", self.fee), format!("OPEN_{lane}")]
            }
            Outbound::Closed(lane) => {
                let mut slots = self.slots.lock();
                match lane {
                    LaneId::Entry => slots.car = slots.car.saturating_sub(1),
                    LaneId::Exit => slots.car = slots.car.saturating_add(1),
                }
                println!("[MOCK] Lane {lane} closed, car slots now {}", slots.car);
                vec![slots.line()]
            }
        }
    }
}

/// Fake registration derived from the tag so repeated scans look consistent
fn info_line(uid: &Uid) -> String {
    let digits = uid.as_str();
    let tail = &digits[digits.len().saturating_sub(5)..];
    format!("INFO:29A-{tail}|CAR|A-{:02}|", digits.len())
}

/// Handle a single station connection
async fn handle_connection(mut socket: TcpStream, peer: std::net::SocketAddr, backend: Arc<Backend>) {
    println!("[MOCK] Station connected from {peer}");

    let mut codec = LineCodec::new();
    let mut temp = [0u8; 512];

    loop {
        let n = match socket.read(&mut temp).await {
            Ok(0) => {
                println!("[MOCK] Station disconnected");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                eprintln!("[MOCK] Read error: {e}");
                return;
            }
        };
        codec.push(&temp[..n]);

        while let Some(line) = codec.next_line() {
            let replies = backend.answer(&line);
            if replies.is_empty() {
                continue;
            }
            if !line.starts_with("HELLO") && !line.starts_with("CLOSED") {
                tokio::time::sleep(backend.reply_delay).await;
            }
            for reply in replies {
                if socket.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                    println!("[MOCK] Connection closed (write failed)");
                    return;
                }
                println!("[MOCK] -> {reply}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut deny = Vec::with_capacity(args.deny.len());
    for text in &args.deny {
        let uid = Uid::parse(text).ok_or_else(|| format!("invalid uid in --deny: {text:?}"))?;
        deny.push(uid);
    }

    println!("[MOCK] Port:        {}", args.port);
    println!("[MOCK] Deny list:   {:?}", args.deny);
    println!("[MOCK] Silent:      {}", args.silent);
    println!("[MOCK] Reply delay: {} ms", args.reply_delay_ms);
    println!("[MOCK] Slots:       car={} motor={}", args.car_slots, args.motor_slots);
    println!("[MOCK] Waiting for station connection...");

    let backend = Arc::new(Backend {
        deny,
        silent: args.silent,
        reply_delay: Duration::from_millis(args.reply_delay_ms),
        fee: args.fee,
        slots: Mutex::new(Slots { car: args.car_slots, motor: args.motor_slots }),
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    loop {
        let (socket, peer) = listener.accept().await?;
        tokio::spawn(handle_connection(socket, peer, backend.clone()));
    }
}
