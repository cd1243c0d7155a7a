use crate::ReplicaId;

quick_error! {
    #[derive(Debug)]
    pub enum ConfError {
        IOError(e: std::io::Error) {
            from(e: std::io::Error) -> (e)
        }

        BadYaml(e: serde_yaml::Error) {
            from(e: serde_yaml::Error) -> (e)
        }

        NoReplica {
            display("at least one replica is required")
        }

        /// Replica indexes must be exactly `0..n`.
        MissingReplica(rid: ReplicaId, n: usize) {
            display("replica {} is missing in a {} replicas cluster", rid, n)
        }

        BadValue(field: &'static str, value: usize) {
            display("invalid {}: {}", field, value)
        }
    }
}

impl PartialEq<ConfError> for ConfError {
    fn eq(&self, other: &ConfError) -> bool {
        match (self, other) {
            (Self::IOError(a), Self::IOError(b)) => a.kind() == b.kind(),
            (Self::BadYaml(_), Self::BadYaml(_)) => true,
            (Self::NoReplica, Self::NoReplica) => true,
            (Self::MissingReplica(a, b), Self::MissingReplica(x, y)) => a == x && b == y,
            (Self::BadValue(a, b), Self::BadValue(x, y)) => a == x && b == y,
            _ => false,
        }
    }
}

impl Eq for ConfError {}
