use audioscribe::cli::Cli;
use audioscribe::config::AppConfig;
use audioscribe::server::run_server;
use clap::Parser;
use log::error;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e:#}");
            std::process::exit(1);
        }
    };

    run_server(config, cli.host, cli.port).await
}
