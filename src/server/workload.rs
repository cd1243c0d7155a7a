use std::time::Duration;
use std::time::Instant;

use futures::future::try_join_all;

use caesar::replica::Application;
use caesar::request::ClientId;

use super::Cluster;
use super::ServerError;

/// Workload describes closed-loop clients: each client submits one request, waits for it to be
/// executed, then submits the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    pub clients: usize,

    /// Number of requests each client submits.
    pub requests: usize,

    /// Probability of a request being read-only.
    pub read_ratio: f64,

    pub access_mode: i32,

    pub batch_size: usize,

    /// A request not executed in time fails the workload.
    pub timeout: Duration,
}

impl Default for Workload {
    fn default() -> Self {
        Workload {
            clients: 1,
            requests: 100,
            read_ratio: 0.0,
            access_mode: 0,
            batch_size: 1,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub completed: u64,
    pub elapsed: Duration,
}

impl Report {
    /// throughput returns completed requests per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.completed as f64 / secs
    }
}

/// run_workload drives all clients concurrently. Client `c` submits through replica
/// `c % n`.
pub async fn run_workload<A: Application + 'static>(
    cluster: &Cluster<A>,
    w: &Workload,
) -> Result<Report, ServerError> {
    let start = Instant::now();

    let clients = (0..w.clients).map(|c| run_client(cluster, w, c as ClientId));
    let done = try_join_all(clients).await?;

    let report = Report {
        completed: done.into_iter().sum(),
        elapsed: start.elapsed(),
    };
    info!(
        "workload: {} requests in {:?}, {:.1} req/s",
        report.completed,
        report.elapsed,
        report.throughput()
    );
    Ok(report)
}

async fn run_client<A: Application + 'static>(
    cluster: &Cluster<A>,
    w: &Workload,
    client_id: ClientId,
) -> Result<u64, ServerError> {
    let rid = client_id as usize % cluster.n_replicas();
    let mut completed = 0;

    for _ in 0..w.requests {
        let read = rand::random::<f64>() < w.read_ratio;
        let (id, done) = cluster.submit(rid, client_id, read, w.access_mode, w.batch_size)?;

        match tokio::time::timeout(w.timeout, done).await {
            Ok(Ok(_)) => completed += 1,
            Ok(Err(_)) => return Err(ServerError::Dropped(id)),
            Err(_) => return Err(ServerError::Timeout(id)),
        }
    }

    debug!("workload: client {} done: {}", client_id, completed);
    Ok(completed)
}
