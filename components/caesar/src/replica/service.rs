use super::ApplicationError;
use crate::request::Request;
use crate::request::RequestId;

/// Application is the replicated service. Every replica executes the same requests in the same
/// conflict order.
pub trait Application: Send + Sync {
    /// create_request builds a client request: its payload and the objects it touches.
    fn create_request(
        &self,
        id: RequestId,
        read: bool,
        access_mode: i32,
        batch_size: usize,
        n_replicas: usize,
    ) -> Request;

    /// execute_request applies a stable request.
    /// An error is fatal to the replica: it stops instead of diverging from the others.
    fn execute_request(&self, r: &Request) -> Result<(), ApplicationError>;

    fn total_objects(&self) -> usize;
}

/// ClientNotifier is told once about every request executed by a replica.
pub trait ClientNotifier: Send + Sync {
    fn notify_client(&self, r: &Request);
}
