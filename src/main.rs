mod app;
mod apps;
mod channel;
mod config;
mod display;
mod error;
mod ipc;
mod launch;
mod notify;
mod overlay;
mod theme;
mod util;
mod views;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), iced_layershell::Error> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    app::run()
}
