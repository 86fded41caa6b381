//! openocd-tcl: run commands on OpenOCD through its TCL interface

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use openocd_tcl_client::{Args, ClientConfig, CommandOptions, OcdError, OpenocdClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Starting openocd-tcl v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_args(&args)?;
    let mut client = OpenocdClient::from_config(&config)?
        .connect_scoped()
        .await
        .inspect_err(|e| error!("Connection error: {}", e))?;

    let options = CommandOptions::default()
        .capture(args.capture)
        .throw(!args.no_throw);

    for command in &args.commands {
        if args.raw {
            let out = client.raw_cmd(command, None).await?;
            if args.json {
                println!("{}", serde_json::json!({ "cmd": command, "out": out }));
            } else {
                println!("{}", out);
            }
            continue;
        }

        match client.cmd_with(command, options).await {
            Ok(result) if args.json => println!("{}", serde_json::to_string(&result)?),
            Ok(result) if result.retcode != 0 => {
                println!("[error code {}] {}", result.retcode, result.out)
            }
            Ok(result) => println!("{}", result.out),
            Err(OcdError::CommandFailed(result)) => {
                error!("'{}' failed with code {}: {}", result.cmd, result.retcode, result.out);
                return Err(OcdError::CommandFailed(result).into());
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false);

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        subscriber.with_writer(file).init();
    } else {
        subscriber.with_writer(std::io::stderr).init();
    }

    debug!("Logging initialized with level: {}", args.log_level);
    Ok(())
}
