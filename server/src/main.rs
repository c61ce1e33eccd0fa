use log::{error, info};
use server::signal_server::SignalServer;
use shared::SIGNAL_PORT;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, default_value_t = SIGNAL_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = format!("{}:{}", args.host, args.port);

    let server = match SignalServer::bind(addr.clone()).await {
        Ok(server) => server,
        Err(e) => {
            error!("Error binding: {}", e);
            return;
        }
    };

    info!("Signaling relay listening on ws://{}", addr);

    tokio::select! {
        result = server.listen() => {
            if let Err(e) = result {
                error!("{}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
}
