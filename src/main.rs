mod cli;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(verbose: bool) {
    let fallback = if verbose { "preforge=debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let console_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    // a subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let command_line_interface = cli::CommandLineInterface::load();
    init_logging(command_line_interface.verbose());
    command_line_interface.run()
}
