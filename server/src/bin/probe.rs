//! Minimal command-line client: connects, flies a slow circle, fires now and
//! then and prints every event it receives as a JSON line.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{info, warn};
use shared::{Packet, Vec2, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, env = "VOIDLINE_SERVER", default_value = "127.0.0.1:8080")]
    server: String,

    /// How long to stay connected, in seconds
    #[arg(short = 'd', long, default_value = "10")]
    duration: u64,

    /// Radius of the circle flown around the origin
    #[arg(short = 'r', long, default_value = "200")]
    radius: f32,
}

async fn send(socket: &UdpSocket, packet: &Packet, server: SocketAddr) -> std::io::Result<()> {
    let data = serialize(packet).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    socket.send_to(&data, server).await?;
    Ok(())
}

fn print_packet(packet: &Packet) {
    match packet {
        Packet::Event { tick, event } => {
            let line = serde_json::json!({
                "tick": tick,
                "event": event.name(),
                "payload": event,
            });
            println!("{}", line);
        }
        Packet::Rejected { reason } => warn!("Rejected: {}", reason),
        Packet::Disconnected { reason } => warn!("Disconnected: {}", reason),
        other => info!("Received {:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let server: SocketAddr = args.server.parse()?;
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Probe bound to {}", socket.local_addr()?);

    send(
        &socket,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
        server,
    )
    .await?;

    let mut buf = [0u8; 2048];
    let client_id = loop {
        let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await??;
        match deserialize::<Packet>(&buf[..len]) {
            Ok(Packet::Connected { client_id }) => break client_id,
            Ok(Packet::Disconnected { reason }) => return Err(reason.into()),
            Ok(other) => print_packet(&other),
            Err(e) => warn!("Undecodable packet: {}", e),
        }
    };
    info!("Connected as player {}", client_id);

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration);
    let mut steer = interval(Duration::from_millis(100));
    let mut step = 0u32;

    while Instant::now() < deadline {
        tokio::select! {
            _ = steer.tick() => {
                let t = started.elapsed().as_secs_f32() * 0.2;
                let position = Vec2::from_angle(t) * args.radius;
                let velocity = Vec2::from_angle(t + std::f32::consts::FRAC_PI_2) * (args.radius * 0.2);
                send(&socket, &Packet::Move { position, velocity, rotation: t }, server).await?;

                step += 1;
                if step % 10 == 0 {
                    send(&socket, &Packet::Fire { direction: velocity.normalize() }, server).await?;
                }
            }
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match deserialize::<Packet>(&buf[..len]) {
                    Ok(packet) => print_packet(&packet),
                    Err(e) => warn!("Undecodable packet: {}", e),
                }
            }
        }
    }

    send(&socket, &Packet::Disconnect, server).await?;
    info!("Disconnected after {}s", args.duration);
    Ok(())
}
