use crate::request::RequestId;
use crate::ReplicaId;

quick_error! {
    /// ReplicationError is an error encountered when aggregating replies of a proposal.
    #[derive(Debug, Eq, PartialEq)]
    pub enum ReplicationError {
        /// The sender index is not in the replica set.
        NoSuchReplica(rid: ReplicaId, n: usize) {
            display("no such replica: {}, n={}", rid, n)
        }

        /// The reply is about another request.
        WrongRequest(want: RequestId, got: RequestId) {
            display("reply for {} while aggregating {}", got, want)
        }
    }
}
