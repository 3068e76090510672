use clap::Parser;
use sip_traffic_sim::cli::{init_logging, run_simulation, run_sink, show_config, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_level()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let result = match cli {
        Cli::Run { config, output, .. } => run_simulation(&config, output.as_deref())
            .await
            .map(|_| ()),
        Cli::ShowConfig { config, .. } => show_config(&config).map(|json| println!("{}", json)),
        Cli::Sink { listen, output, .. } => run_sink(listen, output.as_deref()).await.map(|_| ()),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "exiting");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
