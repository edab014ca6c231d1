use std::{
    error::Error,
    io::{self, Write},
};

use clap::Parser;
use eventdbx_client::{ClientConfigBuilder, Command, CommandError, EventDbxClient, RetryPolicy, prompt};
use log::debug;

#[derive(Parser)]
#[command(version, about = "Interactive EventDBX control client", long_about = None)]
struct Cli {
    /// Server host [env: EVENTDBX_HOST]
    #[arg(long)]
    host: Option<String>,
    /// Server port [env: EVENTDBX_PORT]
    #[arg(long)]
    port: Option<u16>,
    /// Control token [env: EVENTDBX_TOKEN]
    #[arg(long)]
    token: Option<String>,
    /// Tenant id [env: EVENTDBX_TENANT_ID]
    #[arg(long)]
    tenant: Option<String>,
    /// Refuse the Noise channel
    #[arg(long)]
    no_noise: bool,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
    /// Connection attempts before giving up
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut builder = ClientConfigBuilder::from_env();
    if let Some(host) = cli.host {
        builder = builder.host(host);
    }
    if let Some(port) = cli.port {
        builder = builder.port(port);
    }
    if let Some(token) = cli.token.as_deref() {
        builder = builder.token(token);
    }
    if let Some(tenant) = cli.tenant.as_deref() {
        builder = builder.tenant_id(tenant);
    }
    if cli.no_noise {
        builder = builder.no_noise(true);
    }
    if cli.verbose {
        builder = builder.verbose(true);
    }
    let defaults = RetryPolicy::default();
    let config = builder
        .retry_policy(RetryPolicy::new(
            cli.retries,
            defaults.initial_delay(),
            defaults.max_delay(),
        ))
        .build()?;

    let filter = if config.verbose() { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let retry = config.retry_policy();
    let mut client = EventDbxClient::new(config);
    retry.run(|attempt| {
        debug!("connect attempt {attempt}");
        client.connect()
    })?;
    println!("connected to {}", client.endpoint());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        let command = match prompt(stdin.lock(), &mut stdout) {
            Ok(command) => command,
            Err(CommandError::Io(e)) => return Err(e.into()),
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        if command == Command::Exit {
            client.close();
            break;
        }

        match command.execute(&mut client) {
            Ok(Some(output)) => {
                writeln!(stdout, "{}", serde_json::to_string_pretty(&output)?)?;
            }
            Ok(None) => {}
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}
