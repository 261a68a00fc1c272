use clap::Parser;
use magpie_client::Session;
use tokio::sync::mpsc;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
struct Args {
    /// Display name to chat as.
    #[arg(short, long, default_value = "guest")]
    username: String,
    /// Rooms offered in the room list; the first is joined on connect.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "General,Video Games,Movies"
    )]
    rooms: Vec<String>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    // the TUI owns the terminal, so logs go to a file
    let log_file = std::sync::Mutex::new(std::fs::File::create("magpie.log")?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(log_file))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let (server_tx, server_rx) = mpsc::unbounded_channel();
    tokio::spawn(magpie_fake_server::run(
        args.username.clone(),
        args.rooms.clone(),
        client_rx,
        server_tx,
    ));

    let session = Session::new(
        args.username.into(),
        args.rooms.into_iter().map(Into::into).collect(),
    );
    magpie_tui::run(session, server_rx, client_tx).await?;
    Ok(())
}
