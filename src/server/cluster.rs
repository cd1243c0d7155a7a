use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::oneshot;

use caesar::conf::Config;
use caesar::replica::Application;
use caesar::replica::Replica;
use caesar::request::ClientId;
use caesar::request::Request;
use caesar::request::RequestId;
use caesar::transport::LocalNetwork;
use caesar::ReplicaId;

use super::ServerError;
use crate::client::ClientManager;

/// Cluster runs every replica of a config in this process, connected by a `LocalNetwork`.
///
/// Each replica has its own application instance and a `ClientManager` for the clients that
/// submit through it.
///
/// ```ignore
/// let mut cluster = Cluster::start(Config::new(3), |_| Arc::new(KeyValue::new(1000, 10)))?;
/// let (rid, done) = cluster.submit(0, 1, false, 0, 1)?;
/// done.await;
/// cluster.stop();
/// cluster.join().await?;
/// ```
pub struct Cluster<A: Application + 'static> {
    conf: Arc<Config>,
    net: Arc<LocalNetwork>,
    replicas: Vec<Replica>,
    apps: Vec<Arc<A>>,
    clients: Vec<Arc<ClientManager>>,
}

impl<A: Application + 'static> Cluster<A> {
    /// start spawns the replicas on the current tokio runtime.
    pub fn start<F>(conf: Config, new_app: F) -> Result<Cluster<A>, ServerError>
    where
        F: Fn(ReplicaId) -> Arc<A>,
    {
        conf.check()?;

        let conf = Arc::new(conf);
        let n = conf.n_replicas();
        let net = Arc::new(LocalNetwork::new(n));

        let mut replicas = Vec::with_capacity(n);
        let mut apps = Vec::with_capacity(n);
        let mut clients = Vec::with_capacity(n);

        for me in 0..n {
            let app = new_app(me);
            let client = Arc::new(ClientManager::new(me));

            let r = Replica::start(me, conf.clone(), net.clone(), app.clone(), client.clone())?;
            net.register(me, r.inbox())?;

            replicas.push(r);
            apps.push(app);
            clients.push(client);
        }

        info!("cluster: started {} replicas", n);

        Ok(Cluster {
            conf,
            net,
            replicas,
            apps,
            clients,
        })
    }

    pub fn conf(&self) -> &Config {
        &self.conf
    }

    pub fn n_replicas(&self) -> usize {
        self.replicas.len()
    }

    pub fn app(&self, rid: ReplicaId) -> Result<&Arc<A>, ServerError> {
        self.apps.get(rid).ok_or(ServerError::NoSuchReplica(rid))
    }

    pub fn client(&self, rid: ReplicaId) -> Result<&Arc<ClientManager>, ServerError> {
        self.clients.get(rid).ok_or(ServerError::NoSuchReplica(rid))
    }

    /// submit builds a request of a client with the application of replica `rid` and proposes
    /// it there. The receiver resolves once `rid` executed it.
    pub fn submit(
        &self,
        rid: ReplicaId,
        client_id: ClientId,
        read: bool,
        access_mode: i32,
        batch_size: usize,
    ) -> Result<(RequestId, oneshot::Receiver<RequestId>), ServerError> {
        let client = self.client(rid)?;
        let id = client.next_request_id(client_id);
        let r = self.apps[rid].create_request(id, read, access_mode, batch_size, self.n_replicas());

        let rx = self.submit_request(rid, r)?;
        Ok((id, rx))
    }

    /// submit_request proposes a prepared request through replica `rid`.
    pub fn submit_request(
        &self,
        rid: ReplicaId,
        r: Request,
    ) -> Result<oneshot::Receiver<RequestId>, ServerError> {
        let replica = self.replicas.get(rid).ok_or(ServerError::NoSuchReplica(rid))?;

        let rx = self.clients[rid].wait_for(r.id());
        replica.submit(r);
        Ok(rx)
    }

    /// crash cuts a replica off the network. It keeps running but neither sends nor receives.
    pub fn crash(&self, rid: ReplicaId) -> Result<(), ServerError> {
        if rid >= self.n_replicas() {
            return Err(ServerError::NoSuchReplica(rid));
        }
        warn!("cluster: crash replica {}", rid);
        self.net.disconnect(rid);
        Ok(())
    }

    pub fn restore(&self, rid: ReplicaId) -> Result<(), ServerError> {
        if rid >= self.n_replicas() {
            return Err(ServerError::NoSuchReplica(rid));
        }
        info!("cluster: restore replica {}", rid);
        self.net.reconnect(rid);
        Ok(())
    }

    pub fn stop(&self) {
        for r in self.replicas.iter() {
            r.stop();
        }
    }

    /// join waits for every replica to stop. It returns the first error that halted one.
    pub async fn join(&mut self) -> Result<(), ServerError> {
        let results = join_all(self.replicas.iter_mut().map(|r| r.join())).await;

        let mut first = Ok(());
        for (rid, rst) in results.into_iter().enumerate() {
            if let Err(e) = rst {
                error!("cluster: replica {} halted: {}", rid, e);
                if first.is_ok() {
                    first = Err(e.into());
                }
            }
        }
        first
    }
}

impl<A: Application + 'static> Drop for Cluster<A> {
    fn drop(&mut self) {
        self.stop();
    }
}
