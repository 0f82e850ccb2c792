use std::{fs, path::PathBuf, process::ExitCode, time::Duration};

use futures_util::StreamExt;
use log::{error, info, warn};
use serde::Serialize;
use slping::{
    batch::BatchProber, ping_with_fallback, LegacyPinger, ModernPinger, PingError, PingOptions,
    PingResult, Pinger, ServerAddress, ServerStatus,
};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "slping", about = "Query Minecraft servers with Server List Ping")]
struct Opt {
    /// Servers to ping, as host or host:port
    addresses: Vec<ServerAddress>,

    /// File with one server address per line (# starts a comment)
    #[structopt(short, long, parse(from_os_str))]
    batch: Option<PathBuf>,

    /// Use the pre-1.7 protocol
    #[structopt(short, long, conflicts_with = "fallback")]
    legacy: bool,

    /// Try the modern protocol, then the legacy one
    #[structopt(short, long)]
    fallback: bool,

    /// Timeout per server in milliseconds
    #[structopt(short, long, default_value = "5000")]
    timeout: u64,

    /// Protocol version announced in the handshake
    #[structopt(short, long, default_value = "47", allow_hyphen_values = true)]
    protocol: i32,

    /// Skip the _minecraft._tcp SRV lookup
    #[structopt(long)]
    no_srv: bool,

    /// Send the 1.6 MC|PingHost extension with legacy pings
    #[structopt(long)]
    ping_host: bool,

    /// Draw the server icon in the terminal
    #[structopt(long)]
    favicon: bool,

    /// At most this many pings in flight at once
    #[structopt(long)]
    max_in_flight: Option<usize>,
}

impl Opt {
    fn ping_options(&self) -> PingOptions {
        PingOptions {
            timeout: Duration::from_millis(self.timeout),
            protocol_version: self.protocol,
            srv_lookup: !self.no_srv,
            legacy_ping_host: self.ping_host,
            ..PingOptions::default()
        }
    }

    fn targets(&self) -> Result<Vec<ServerAddress>, String> {
        let mut targets = self.addresses.clone();
        if let Some(path) = &self.batch {
            let contents = fs::read_to_string(path)
                .map_err(|e| format!("could not read {}: {e}", path.display()))?;
            for (number, line) in contents.lines().enumerate() {
                let line = line.split('#').next().unwrap_or_default().trim();
                if line.is_empty() {
                    continue;
                }
                let address = line
                    .parse()
                    .map_err(|e| format!("{}:{}: {e}", path.display(), number + 1))?;
                targets.push(address);
            }
        }
        Ok(targets)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let opt = Opt::from_args();

    let targets = match opt.targets() {
        Ok(targets) if targets.is_empty() => {
            error!("no servers given");
            return ExitCode::FAILURE;
        }
        Ok(targets) => targets,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let options = opt.ping_options();
    let failures = if opt.fallback {
        run_fallback(&opt, targets, &options).await
    } else if opt.legacy {
        run_batch(&opt, LegacyPinger::new(options), targets, |_| {}).await
    } else {
        run_batch(&opt, ModernPinger::new(options), targets, |status: &PingResult| {
            if opt.favicon {
                show_favicon(status);
            }
        })
        .await
    };

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Pings every target and prints results as they arrive. Returns the number of
/// servers that failed.
async fn run_batch<P>(
    opt: &Opt,
    pinger: P,
    targets: Vec<ServerAddress>,
    on_success: impl Fn(&P::Data),
) -> usize
where
    P: Pinger + Clone + Send + Sync + 'static,
    P::Data: Serialize + Send + 'static,
{
    let mut prober = BatchProber::new(pinger);
    if let Some(limit) = opt.max_in_flight {
        prober = prober.max_in_flight(limit);
    }

    let keyed = targets.into_iter().map(|t| (t.clone(), t)).collect();
    let mut results = prober.probe_keyed(keyed, None);
    let mut failures = 0;
    while let Some((address, result)) = results.next().await {
        match result {
            Ok(status) => {
                print_status(&address, &status);
                on_success(&status);
            }
            Err(e) => {
                failures += 1;
                report_failure(&address, &e);
            }
        }
    }
    failures
}

async fn run_fallback(opt: &Opt, targets: Vec<ServerAddress>, options: &PingOptions) -> usize {
    let mut failures = 0;
    for address in targets {
        match ping_with_fallback(&address, options).await {
            Ok(status) => {
                info!("{address}: {:?} in {}ms", status.description(), status.latency_ms());
                print_status(&address, &status);
                if let (true, ServerStatus::Modern(status)) = (opt.favicon, &status) {
                    show_favicon(status);
                }
            }
            Err(e) => {
                failures += 1;
                report_failure(&address, &e);
            }
        }
    }
    failures
}

fn print_status(address: &ServerAddress, status: &impl Serialize) {
    let json = serde_json::to_value(status)
        .and_then(|value| colored_json::to_colored_json_auto(&value));
    match json {
        Ok(json) => println!("{address}\n{json}"),
        Err(e) => warn!("could not format status of {address}: {e}"),
    }
}

fn report_failure(address: &ServerAddress, err: &PingError) {
    if err.is_timeout() {
        info!("{address} timed out");
    }
    println!("{address}: offline ({err})");
}

fn show_favicon(status: &PingResult) {
    let png = match status.favicon_png() {
        Some(Ok(png)) => png,
        Some(Err(e)) => {
            warn!("favicon is not valid base64: {e}");
            return;
        }
        None => return,
    };

    let image = match image::load_from_memory(&png) {
        Ok(image) => image,
        Err(e) => {
            warn!("favicon is not a readable image: {e}");
            return;
        }
    };

    let config = viuer::Config {
        width: Some(32),
        absolute_offset: false,
        ..Default::default()
    };
    if let Err(e) = viuer::print(&image, &config) {
        warn!("could not draw favicon: {e}");
    }
}
