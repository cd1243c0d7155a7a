use crate::conf::ConfError;
use crate::transport::TransportError;

quick_error! {
    /// ApplicationError is returned by an application that could not execute a request.
    #[derive(Debug, Eq, PartialEq, Clone)]
    pub enum ApplicationError {
        BadPayload(reason: String) {
            display("bad payload: {}", reason)
        }

        Failed(reason: String) {
            display("execution failed: {}", reason)
        }
    }
}

quick_error! {
    #[derive(Debug, Eq, PartialEq)]
    pub enum ReplicaError {
        Application(err: ApplicationError) {
            from(err: ApplicationError) -> (err)
            display("application: {}", err)
        }

        Transport(err: TransportError) {
            from(err: TransportError) -> (err)
        }

        Conf(err: ConfError) {
            from(err: ConfError) -> (err)
        }

        NotStarted {}

        Spawn(reason: String) {
            display("failed to spawn delivery thread: {}", reason)
        }

        Stopped {}

        Join(reason: String) {
            display("failed to join: {}", reason)
        }
    }
}
