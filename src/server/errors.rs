use caesar::conf::ConfError;
use caesar::replica::ReplicaError;
use caesar::request::RequestId;
use caesar::transport::TransportError;
use caesar::ReplicaId;

quick_error! {
    #[derive(Debug, PartialEq, Eq)]
    pub enum ServerError {
        Conf(e: ConfError) {
            from(e: ConfError) -> (e)
            display("config: {}", e)
        }

        Replica(e: ReplicaError) {
            from(e: ReplicaError) -> (e)
            display("replica: {}", e)
        }

        Transport(e: TransportError) {
            from(e: TransportError) -> (e)
        }

        NoSuchReplica(rid: ReplicaId) {
            display("no such replica: {}", rid)
        }

        /// The replica stopped before executing the request.
        Dropped(rid: RequestId) {
            display("request dropped: {}", rid)
        }

        Timeout(rid: RequestId) {
            display("request timeout: {}", rid)
        }

        NotStarted {}
    }
}
