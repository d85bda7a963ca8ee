use std::{env, time::Duration};

use xena::{Session, SessionOptions, StreamState, Tcp, DEFAULT_PASSWORD};

/// Usage: `traffic <chassis> <module/port> <module/port>`
#[tokio::main]
async fn main() -> Result<(), xena::Error> {
    let _ = tracing_subscriber::fmt::try_init();

    let mut args = env::args().skip(1);
    let chassis = args.next().unwrap_or_else(|| "192.168.1.200".to_string());
    let ports = args.map(|p| format!("{chassis}/{p}")).collect::<Vec<_>>();
    let ports = ports.iter().map(String::as_str).collect::<Vec<_>>();

    let options = SessionOptions::default().with_traffic_timeout(Duration::from_secs(10));
    let mut session = Session::with_options(Tcp::default(), options);
    session.add_chassis(&chassis, "example", DEFAULT_PASSWORD).await?;

    // takes over ports left reserved by an earlier run
    let reserved = session.reserve_ports(&ports, true).await?;
    for port in &reserved {
        session.wait_for_up(*port, Duration::from_secs(30)).await?;
        let stream = session.add_stream(*port, Some("example"), None, StreamState::Enabled).await?;
        tracing::info!(tpld = ?session.stream_tpld_id(stream), "Stream added");
    }

    session.start_traffic(&[]).await?;
    tokio::time::sleep(Duration::from_secs(5)).await;
    session.stop_traffic(&[]).await?;

    for port in &reserved {
        let stats = session.read_port_stats(*port).await?;
        let name = session.node(*port)?.name();
        println!("{name}: tx {:?}, rx {:?}", stats.get("pt_total"), stats.get("pr_total"));
    }

    session.disconnect().await
}
