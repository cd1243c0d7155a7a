#[macro_use]
extern crate slog_global;

use std::process;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg, ArgMatches};

use caesar::conf::Config;

use cdb::kv::KeyValue;
use cdb::kv::DEFAULT_SIZE;
use cdb::server::run_workload;
use cdb::server::Cluster;
use cdb::server::Workload;
use cdb::setup::init_logger;

fn main() {
    let matches = App::new("caesar")
        .version("0.1.0")
        .author("openacid")
        .about("runs a key-value workload against an in-process Caesar cluster")
        .arg(
            Arg::with_name("conf")
                .long("conf")
                .takes_value(true)
                .help("cluster config in yaml. Defaults to 3 replicas"),
        )
        .arg(
            Arg::with_name("clients")
                .long("clients")
                .takes_value(true)
                .default_value("3")
                .help("number of closed-loop clients"),
        )
        .arg(
            Arg::with_name("requests")
                .long("requests")
                .takes_value(true)
                .default_value("1000")
                .help("requests per client"),
        )
        .arg(
            Arg::with_name("read-ratio")
                .long("read-ratio")
                .takes_value(true)
                .default_value("0")
                .help("probability of a read-only request, in [0, 1]"),
        )
        .arg(
            Arg::with_name("access-mode")
                .long("access-mode")
                .takes_value(true)
                .default_value("0")
                .help("0: contend on conflict_pool keys, 1: no conflict, other: random keys"),
        )
        .arg(
            Arg::with_name("batch")
                .long("batch")
                .takes_value(true)
                .default_value("1")
                .help("keys per request"),
        )
        .arg(
            Arg::with_name("size")
                .long("size")
                .takes_value(true)
                .help("number of keys of the store"),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .takes_value(true)
                .default_value("caesar.log")
                .help("log file path"),
        )
        .get_matches();

    if let Err(e) = run(&matches) {
        eprintln!("caesar: {}", e);
        process::exit(1);
    }
}

#[tokio::main]
async fn run(matches: &ArgMatches) -> Result<(), String> {
    let log = matches.value_of("log").unwrap_or("caesar.log");
    init_logger(log).map_err(|e| format!("failed to init logger {}: {}", log, e))?;

    let conf = match matches.value_of("conf") {
        Some(path) => Config::from_file(path).map_err(|e| format!("{}: {}", path, e))?,
        None => Config::new(3),
    };

    let w = Workload {
        clients: arg(matches, "clients")?,
        requests: arg(matches, "requests")?,
        read_ratio: arg(matches, "read-ratio")?,
        access_mode: arg(matches, "access-mode")?,
        batch_size: arg(matches, "batch")?,
        timeout: Duration::from_secs(30),
    };
    let size = match matches.value_of("size") {
        Some(_) => arg(matches, "size")?,
        None => DEFAULT_SIZE,
    };

    let pool = conf.conflict_pool;
    let n = conf.n_replicas();
    let mut cluster =
        Cluster::start(conf, |_| Arc::new(KeyValue::new(size, pool))).map_err(|e| e.to_string())?;

    info!("caesar: {} replicas, workload: {:?}", n, w);
    let rst = run_workload(&cluster, &w).await;

    cluster.stop();
    cluster.join().await.map_err(|e| e.to_string())?;

    let report = rst.map_err(|e| e.to_string())?;
    println!(
        "replicas: {} clients: {} completed: {} elapsed: {:?} throughput: {:.1} req/s",
        n,
        w.clients,
        report.completed,
        report.elapsed,
        report.throughput()
    );
    Ok(())
}

/// arg parses the value of a command line argument.
fn arg<T>(matches: &ArgMatches, name: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let v = matches
        .value_of(name)
        .ok_or_else(|| format!("missing --{}", name))?;
    v.parse::<T>()
        .map_err(|e| format!("invalid --{} {}: {}", name, v, e))
}
