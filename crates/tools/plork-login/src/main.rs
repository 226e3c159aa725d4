use clap::Parser;
use plork_login::cli::{Args, LoginApp, render_error};
use plork_login::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("❌ {}", render_error(&e));
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.load_config()?;
    init_tracing(&config.logging);
    config.log_sources();

    let app = LoginApp::from_config(&config)?;
    app.run(&args.command, &mut std::io::stdout()).await
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.format.eq_ignore_ascii_case("pretty") {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }
}
