use crate::message::Phase;
use crate::replication::ReplicationError;
use crate::request::RequestId;
use crate::request::View;

quick_error! {
    /// HandlerError is an error encountered when handling a message.
    /// It never stops the engine: the message is dropped and the error is logged.
    #[derive(Debug, Eq, PartialEq)]
    pub enum HandlerError {
        Replication(e: ReplicationError) {
            from(e: ReplicationError) -> (e)
        }

        /// The request is not tracked by this replica.
        UnknownRequest(rid: RequestId) {
            display("unknown request: {}", rid)
        }

        /// The request is already executed by every replica and removed.
        Retired(rid: RequestId) {
            display("retired request: {}", rid)
        }

        /// The view number is too small to proceed.
        StaleView(stale: View, last: View) {
            from(vv: (View, View)) -> (vv.0, vv.1)
            display("stale view: {}, last: {}", stale, last)
        }

        /// A reply does not belong to the round in progress.
        DelayedReply(round: Phase, reply: Phase) {
            display("round phase:{:?} while recv reply of phase: {:?}", round, reply)
        }

        /// No round is in progress for the request.
        NoRound(rid: RequestId) {
            display("no round in progress for {}", rid)
        }
    }
}
